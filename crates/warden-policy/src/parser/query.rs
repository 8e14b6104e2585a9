//! Query-string style rule bodies (`a=b&c=d`).

use serde_json::{Map, Value};

/// Parse `a=b&c=d` into a mapping.
///
/// Pairs without `=` map to an empty string and repeated keys collect into a
/// sequence in order of appearance. Keys and values are percent-decoded unless
/// `raw` is set; text that fails to decode is kept as written.
///
/// Returns `None` when no key could be extracted.
pub fn parse_query(text: &str, raw: bool) -> Option<Value> {
    let mut result = Map::new();

    for pair in text.split('&').filter(|s| !s.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let (key, value) = if raw {
            (key.to_string(), value.to_string())
        } else {
            (decode(key), decode(value))
        };
        if key.is_empty() {
            continue;
        }

        match result.get_mut(&key) {
            None => {
                result.insert(key, Value::String(value));
            }
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
        }
    }

    if result.is_empty() {
        None
    } else {
        Some(Value::Object(result))
    }
}

fn decode(text: &str) -> String {
    urlencoding::decode(text)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_simple_pairs() {
        let parsed = parse_query("a=1&b=two", false).unwrap();
        assert_eq!(parsed, json!({"a": "1", "b": "two"}));
    }

    #[test]
    fn test_parse_decodes_percent_escapes() {
        let parsed = parse_query("name=hello%20world&k%2Cy=v", false).unwrap();
        assert_eq!(parsed, json!({"name": "hello world", "k,y": "v"}));
    }

    #[test]
    fn test_parse_raw_keeps_escapes() {
        let parsed = parse_query("&name=hello%20world", true).unwrap();
        assert_eq!(parsed, json!({"name": "hello%20world"}));
    }

    #[test]
    fn test_repeated_keys_collect() {
        let parsed = parse_query("a=1&a=2&a=3", false).unwrap();
        assert_eq!(parsed, json!({"a": ["1", "2", "3"]}));
    }

    #[test]
    fn test_missing_value_is_empty() {
        let parsed = parse_query("flag&x=1", false).unwrap();
        assert_eq!(parsed, json!({"flag": "", "x": "1"}));
    }

    #[test]
    fn test_empty_input_is_absent() {
        assert!(parse_query("", false).is_none());
        assert!(parse_query("&&", false).is_none());
        assert!(parse_query("=orphan", false).is_none());
    }

    #[test]
    fn test_invalid_escape_kept_verbatim() {
        let parsed = parse_query("a=%E0%A4%A", false).unwrap();
        assert_eq!(parsed, json!({"a": "%E0%A4%A"}));
    }
}
