//! The multi-line `name: value` rule body form.
//!
//! ```text
//! x-user: alice
//! retries: 3
//! [headers.accept]: text/html
//! [list[1]]: second
//! body: `line one\nline two`
//! ```
//!
//! Each non-empty line contributes one entry. Bracketed names describe nested
//! paths (`[a.b.c]`) or sequence slots (`[0]`, `[name[2]]`), and repeated names
//! are deep-merged into the value already present.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

/// Largest sequence index the lines form will materialise. Entries addressing
/// a higher slot are dropped.
pub const MAX_INDEX: usize = 4096;

/// Deepest nesting a bracketed path may describe. Longer paths are dropped.
pub const MAX_DEPTH: usize = 128;

static DIGITS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?[1-9]\d*$").expect("valid integer regex"));
static NUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid number regex"));
static INDEX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[(\d+)\]$").expect("valid index regex"));
static ARRAY_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.)?\[(\d+)\]$").expect("valid array field regex"));
static PATH_SEP_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\.\s*").expect("valid path regex"));

/// Parse the lines form.
///
/// Returns `None` for empty text and for text shaped like a JSON array or
/// object, which the structured parsers own. Otherwise the result is a
/// mapping, or a sequence when the first entry established an array context.
pub fn parse_lines(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() || looks_like_container(text) {
        return None;
    }

    let mut result: Option<Container> = None;
    for line in text.split(['\r', '\n']) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (name, value) = split_line(line);
        let Some(entry) = Entry::resolve(name, coerce_value(value)) else {
            tracing::trace!(line, "lines entry addresses an out-of-range index or depth, dropped");
            continue;
        };

        let container = result.get_or_insert_with(|| {
            if entry.array_context {
                Container::Seq(Vec::new())
            } else {
                Container::Map(Map::new())
            }
        });
        container.apply(entry);
    }

    result.map(Container::into_value)
}

fn looks_like_container(text: &str) -> bool {
    (text.starts_with('[') && text.ends_with(']')) || (text.starts_with('{') && text.ends_with('}'))
}

/// Split at the first `": "`, falling back to the first `':'`.
fn split_line(line: &str) -> (&str, &str) {
    let index = line.find(": ").or_else(|| line.find(':'));
    match index {
        Some(index) => (line[..index].trim(), line[index + 1..].trim()),
        None => (line, ""),
    }
}

fn coerce_value(value: &str) -> Value {
    let mut chars = value.chars();
    let (first, last) = (chars.next(), chars.next_back());

    if let (Some(first), Some(last)) = (first, last) {
        if first == last && matches!(first, '"' | '\'' | '`') {
            let inner = &value[1..value.len() - 1];
            if first == '`' && (inner.contains("\\n") || inner.contains("\\r")) {
                return Value::String(inner.replace("\\n", "\n").replace("\\r", "\r"));
            }
            return Value::String(inner.to_string());
        }
    }

    if value == "0" {
        return Value::from(0);
    }
    if value.len() < 16 && DIGITS_RE.is_match(value) {
        if let Ok(number) = value.parse::<i64>() {
            return Value::from(number);
        }
    }
    Value::String(value.to_string())
}

fn parse_index(digits: &str) -> Option<usize> {
    digits.parse::<usize>().ok().filter(|index| *index <= MAX_INDEX)
}

/// One resolved line: the top-level slot it targets and the (possibly
/// nested) value to store there.
#[derive(Debug)]
struct Entry {
    name: String,
    /// `name[idx]` form: the value goes into slot `idx` of the field `name`.
    index: Option<usize>,
    /// The name addressed a top-level sequence slot.
    array_context: bool,
    value: Value,
}

impl Entry {
    fn resolve(name: &str, value: Value) -> Option<Self> {
        let mut entry = Entry {
            name: name.to_string(),
            index: None,
            array_context: false,
            value,
        };

        if name.len() >= 2 && name.starts_with('"') && name.ends_with('"') {
            entry.name = name[1..name.len() - 1].to_string();
            return Some(entry);
        }
        if name.len() < 2 || !name.starts_with('[') || !name.ends_with(']') {
            return Some(entry);
        }

        let inner = name[1..name.len() - 1].trim();
        if NUM_RE.is_match(inner) {
            parse_index(inner)?;
            entry.name = inner.to_string();
            entry.array_context = true;
            return Some(entry);
        }
        if let Some(caps) = INDEX_RE.captures(inner) {
            parse_index(&caps[1])?;
            entry.name = caps[1].to_string();
            entry.array_context = true;
            return Some(entry);
        }

        let mut keys = PATH_SEP_RE.split(inner);
        let head = keys.next().unwrap_or_default().trim();
        let rest: Vec<&str> = keys.collect();
        if rest.len() > MAX_DEPTH {
            return None;
        }

        entry.name = head.to_string();
        if let Some(caps) = ARRAY_FIELD_RE.captures(head) {
            let digits = &caps[2];
            let index = parse_index(digits)?;
            if caps.get(1).is_some() {
                entry.name = head[..head.len() - digits.len() - 2].to_string();
                entry.index = Some(index);
            } else {
                entry.name = digits.to_string();
                entry.array_context = true;
            }
        }

        for key in rest.iter().rev() {
            entry.value = wrap_segment(key, entry.value)?;
        }
        Some(entry)
    }
}

/// Wrap `value` in the structure one path segment describes.
fn wrap_segment(key: &str, value: Value) -> Option<Value> {
    let Some(caps) = ARRAY_FIELD_RE.captures(key) else {
        let mut object = Map::new();
        object.insert(key.to_string(), value);
        return Some(Value::Object(object));
    };

    let digits = &caps[2];
    let mut seq = Vec::new();
    set_slot(&mut seq, parse_index(digits)?, value);
    if caps.get(1).is_none() {
        return Some(Value::Array(seq));
    }

    let mut object = Map::new();
    object.insert(
        key[..key.len() - digits.len() - 2].to_string(),
        Value::Array(seq),
    );
    Some(Value::Object(object))
}

fn set_slot(seq: &mut Vec<Value>, index: usize, value: Value) {
    if seq.len() <= index {
        seq.resize(index + 1, Value::Null);
    }
    seq[index] = value;
}

/// Store `value` at `index` inside an existing mapping or sequence.
fn set_indexed(target: &mut Value, index: usize, value: Value) {
    match target {
        Value::Array(seq) => set_slot(seq, index, value),
        Value::Object(object) => {
            object.insert(index.to_string(), value);
        }
        _ => {}
    }
}

/// Deep merge `source` into `target`: nested mappings and sequences are merged
/// slot by slot, scalars from `source` replace what `target` holds. `Null`
/// slots of a sparse source sequence are skipped.
fn deep_extend(target: &mut Value, source: Value) {
    match source {
        Value::Object(fields) => {
            for (key, value) in fields {
                match target {
                    Value::Object(object) => {
                        merge_slot(object.entry(key).or_insert(Value::Null), value)
                    }
                    Value::Array(seq) => {
                        if let Some(index) = parse_index(&key) {
                            if seq.len() <= index {
                                seq.resize(index + 1, Value::Null);
                            }
                            merge_slot(&mut seq[index], value);
                        }
                    }
                    _ => return,
                }
            }
        }
        Value::Array(items) => {
            for (index, value) in items.into_iter().enumerate() {
                if value.is_null() {
                    continue;
                }
                match target {
                    Value::Array(seq) => {
                        if seq.len() <= index {
                            seq.resize(index + 1, Value::Null);
                        }
                        merge_slot(&mut seq[index], value);
                    }
                    Value::Object(object) => merge_slot(
                        object.entry(index.to_string()).or_insert(Value::Null),
                        value,
                    ),
                    _ => return,
                }
            }
        }
        _ => {}
    }
}

fn merge_slot(slot: &mut Value, value: Value) {
    match value {
        Value::Object(_) | Value::Array(_) => {
            if value.is_object() && !slot.is_object() {
                *slot = Value::Object(Map::new());
            } else if value.is_array() && !slot.is_array() {
                *slot = Value::Array(Vec::new());
            }
            deep_extend(slot, value);
        }
        scalar => *slot = scalar,
    }
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

enum Container {
    Map(Map<String, Value>),
    Seq(Vec<Value>),
}

impl Container {
    fn slot_mut(&mut self, name: &str) -> Option<&mut Value> {
        match self {
            Container::Map(map) => map.get_mut(name),
            Container::Seq(seq) => parse_index(name)
                .and_then(|index| seq.get_mut(index))
                .filter(|slot| !slot.is_null()),
        }
    }

    fn insert(&mut self, name: String, value: Value) {
        match self {
            Container::Map(map) => {
                map.insert(name, value);
            }
            Container::Seq(seq) => {
                // Named fields on a sequence have no representation.
                if let Some(index) = parse_index(&name) {
                    set_slot(seq, index, value);
                }
            }
        }
    }

    fn apply(&mut self, entry: Entry) {
        let Entry {
            name, index, value, ..
        } = entry;

        match self.slot_mut(&name) {
            None => {
                let value = match index {
                    Some(index) => {
                        let mut seq = Vec::new();
                        set_slot(&mut seq, index, value);
                        Value::Array(seq)
                    }
                    None => value,
                };
                self.insert(name, value);
            }
            Some(existing) if is_container(existing) => match index {
                Some(index) => set_indexed(existing, index, value),
                None if is_container(&value) => deep_extend(existing, value),
                None => {}
            },
            // First scalar wins.
            Some(_) => {}
        }
    }

    fn into_value(self) -> Value {
        match self {
            Container::Map(map) => Value::Object(map),
            Container::Seq(seq) => Value::Array(seq),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_lines() {
        let parsed = parse_lines("x-user: alice\nx-role: admin").unwrap();
        assert_eq!(parsed, json!({"x-user": "alice", "x-role": "admin"}));
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let parsed = parse_lines("a: 1\r\n\r\n  b: two  \r").unwrap();
        assert_eq!(parsed, json!({"a": 1, "b": "two"}));
    }

    #[test]
    fn test_colon_without_space() {
        let parsed = parse_lines("host:example.com:8080\nurl: http://x").unwrap();
        assert_eq!(
            parsed,
            json!({"host": "example.com:8080", "url": "http://x"})
        );
    }

    #[test]
    fn test_line_without_delimiter() {
        let parsed = parse_lines("flag\nother: x").unwrap();
        assert_eq!(parsed, json!({"flag": "", "other": "x"}));
    }

    #[test]
    fn test_quoted_values_are_stripped() {
        let parsed = parse_lines("a: \"1\"\nb: 'x y'\nc: `z`").unwrap();
        assert_eq!(parsed, json!({"a": "1", "b": "x y", "c": "z"}));
    }

    #[test]
    fn test_backtick_unescapes_crlf() {
        let parsed = parse_lines(r"body: `one\r\ntwo`").unwrap();
        assert_eq!(parsed, json!({"body": "one\r\ntwo"}));

        let parsed = parse_lines(r"body: 'one\ntwo'").unwrap();
        assert_eq!(parsed, json!({"body": r"one\ntwo"}));
    }

    #[test]
    fn test_integer_coercion() {
        let parsed = parse_lines("zero: 0\nn: 42\nneg: -7\nplus: +3\nlead: 007\nbig: 12345678901234567").unwrap();
        assert_eq!(
            parsed,
            json!({
                "zero": 0,
                "n": 42,
                "neg": -7,
                "plus": 3,
                "lead": "007",
                "big": "12345678901234567"
            })
        );
    }

    #[test]
    fn test_quoted_name() {
        let parsed = parse_lines("\"a: b\": c").unwrap();
        // The split happens at the first ": ", so the quotes are not balanced.
        assert_eq!(parsed, json!({"\"a": "b\": c"}));

        let parsed = parse_lines("\"x.y\": 1").unwrap();
        assert_eq!(parsed, json!({"x.y": 1}));
    }

    #[test]
    fn test_nested_path() {
        let parsed = parse_lines("[a.b.c]: 1\n[a.b.d]: 2\n[a.e]: x").unwrap();
        assert_eq!(parsed, json!({"a": {"b": {"c": 1, "d": 2}, "e": "x"}}));
    }

    #[test]
    fn test_top_level_sequence() {
        let parsed = parse_lines("[0]: first\n[2]: third").unwrap();
        assert_eq!(parsed, json!(["first", null, "third"]));

        let parsed = parse_lines("[[1]]: only").unwrap();
        assert_eq!(parsed, json!([null, "only"]));
    }

    #[test]
    fn test_sequence_of_objects() {
        let parsed = parse_lines("[[0].name]: a\n[[0].age]: 3\n[[1].name]: b").unwrap();
        assert_eq!(parsed, json!([{"name": "a", "age": 3}, {"name": "b"}]));

        // A bare leading number is an ordinary key.
        let parsed = parse_lines("[0.name]: a\n[1.name]: b").unwrap();
        assert_eq!(parsed, json!({"0": {"name": "a"}, "1": {"name": "b"}}));
    }

    #[test]
    fn test_array_field() {
        let parsed = parse_lines("[list[1]]: second\n[list[0]]: first").unwrap();
        assert_eq!(parsed, json!({"list": ["first", "second"]}));
    }

    #[test]
    fn test_array_field_in_nested_path() {
        let parsed = parse_lines("[a.items[1]]: x\n[a.items[0]]: y").unwrap();
        assert_eq!(parsed, json!({"a": {"items": ["y", "x"]}}));

        let parsed = parse_lines("[a.[1]]: x").unwrap();
        assert_eq!(parsed, json!({"a": [null, "x"]}));
    }

    #[test]
    fn test_repeated_scalar_keeps_first() {
        let parsed = parse_lines("a: 1\na: 2").unwrap();
        assert_eq!(parsed, json!({"a": 1}));
    }

    #[test]
    fn test_repeated_mapping_merges_new_wins() {
        let parsed = parse_lines("[a.x]: 1\n[a.y]: 2\n[a.x]: 3").unwrap();
        assert_eq!(parsed, json!({"a": {"x": 3, "y": 2}}));
    }

    #[test]
    fn test_index_beyond_cap_dropped() {
        let parsed = parse_lines("[999999999]: x\nkeep: y").unwrap();
        assert_eq!(parsed, json!({"keep": "y"}));
    }

    #[test]
    fn test_depth_beyond_cap_dropped() {
        let deep = vec!["a"; 10_000].join(".");
        let parsed = parse_lines(&format!("[{deep}]: 1\n[{deep}]: 2\nkeep: y")).unwrap();
        assert_eq!(parsed, json!({"keep": "y"}));

        let at_cap = vec!["a"; MAX_DEPTH + 1].join(".");
        let parsed = parse_lines(&format!("[{at_cap}]: 1")).unwrap();
        let mut depth = 0;
        let mut cursor = &parsed;
        while let Some(next) = cursor.get("a") {
            cursor = next;
            depth += 1;
        }
        assert_eq!(depth, MAX_DEPTH + 1);
        assert_eq!(cursor, &json!(1));
    }

    #[test]
    fn test_named_entry_after_array_context_dropped() {
        let parsed = parse_lines("[0]: a\nname: b\n[1]: c").unwrap();
        assert_eq!(parsed, json!(["a", "c"]));
    }

    #[test]
    fn test_json_shaped_text_rejected() {
        assert!(parse_lines("{a: 1,}").is_none());
        assert!(parse_lines("[1, 2").is_some());
        assert!(parse_lines("[broken]").is_none());
        assert!(parse_lines("   ").is_none());
    }
}
