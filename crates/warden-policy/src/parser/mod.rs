//! Rule body interpretation.
//!
//! Rule bodies are free-form text written by users. [`parse_structured_text`]
//! turns them into a [`ParsedValue`] by trying, in order:
//!
//! 1. strict JSON
//! 2. JSON5 (unquoted keys, trailing commas, comments)
//! 3. inline `key:value`
//! 4. query strings (`a=b&c=d`)
//! 5. the multi-line `name: value` form (see [`parse_lines`])
//!
//! Nothing here fails loudly. Text none of the stages accept yields `None` and
//! callers keep the original text as an opaque string.

mod lines;
mod query;

pub use lines::{parse_lines, MAX_DEPTH, MAX_INDEX};
pub use query::parse_query;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Structured value produced from a rule body.
///
/// Mappings keep insertion order. `Null` only appears as an unset slot of a
/// sparse sequence built by the lines form.
pub type ParsedValue = Value;

static KEY_VALUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^:=&]+):([^=&]*)$").expect("valid key/value regex"));
static QUERY_PARAM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^/&=]+=").expect("valid query parameter regex"));

/// Parse a rule body into a structured value.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use warden_policy::parser::parse_structured_text;
///
/// assert_eq!(parse_structured_text(r#"{"a": 1}"#), Some(json!({"a": 1})));
/// assert_eq!(parse_structured_text("{a: 1,}"), Some(json!({"a": 1})));
/// assert_eq!(parse_structured_text("mode:strict"), Some(json!({"mode": "strict"})));
/// assert_eq!(parse_structured_text("a=1&b=2"), Some(json!({"a": "1", "b": "2"})));
/// assert_eq!(parse_structured_text("x: 1\ny: two"), Some(json!({"x": 1, "y": "two"})));
/// assert_eq!(parse_structured_text("   "), None);
/// ```
pub fn parse_structured_text(text: &str) -> Option<ParsedValue> {
    parse_pure_json(text, true).or_else(|| parse_lines(text))
}

/// Strict JSON, then JSON5.
///
/// Falsy scalars (`null`, `false`, `0`, `""`) count as no result so callers
/// fall through to the next interpretation.
pub fn parse_raw_json(text: &str) -> Option<ParsedValue> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    serde_json::from_str::<Value>(text)
        .ok()
        .filter(is_truthy)
        .or_else(|| json5::from_str::<Value>(text).ok().filter(is_truthy))
}

/// Stages 1 to 4: JSON, JSON5, inline `key:value` and query strings.
///
/// `is_value` marks text taken from a rule value rather than a matcher; only
/// matcher text is rejected for looking like a path.
pub fn parse_pure_json(text: &str, is_value: bool) -> Option<ParsedValue> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(value) = parse_raw_json(text) {
        return Some(value);
    }
    let parsed = parse_inline(text, is_value);
    if parsed.is_none() {
        tracing::trace!(len = text.len(), "rule body is not a single-line structure");
    }
    parsed
}

/// Single-line shorthand: `key:value` or a query string.
pub fn parse_inline(text: &str, is_value: bool) -> Option<ParsedValue> {
    if text.chars().any(char::is_whitespace) {
        return None;
    }
    let raw = text.starts_with('&');
    if !is_value && !raw && (text.contains('\\') || text.contains('/')) {
        return None;
    }

    if let Some(caps) = KEY_VALUE_RE.captures(text) {
        let mut object = Map::new();
        object.insert(caps[1].to_string(), Value::String(caps[2].to_string()));
        return Some(Value::Object(object));
    }

    if raw || QUERY_PARAM_RE.is_match(text) {
        return parse_query(text, raw);
    }
    None
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().map_or(true, |n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
