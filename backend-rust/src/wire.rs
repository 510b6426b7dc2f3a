//! Compact JSON encoding for spectator broadcast frames (SPEC_FULL.md §6.1),
//! grounded on the original `JSONEncoder`: booleans become 0/1, floats are
//! rounded to one decimal place and trimmed, and arrays of homogeneous
//! objects are transposed column-major with a `_t` marker.

use serde::Serialize;
use serde_json::Value;

/// Serializes `value` and re-encodes it through the compact transform,
/// returning the final wire string.
pub fn to_compact_string<T: Serialize>(value: &T) -> serde_json::Result<String> {
    let v = serde_json::to_value(value)?;
    Ok(compact(&v))
}

fn compact(v: &Value) -> String {
    match v {
        Value::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if n.is_i64() || n.is_u64() {
                    n.to_string()
                } else {
                    format_compact_float(f)
                }
            } else {
                n.to_string()
            }
        }
        Value::String(s) => serde_json::to_string(s).unwrap_or_default(),
        Value::Null => "null".to_string(),
        Value::Array(items) => {
            if !items.is_empty() && items.iter().all(|e| e.is_object()) {
                compact(&transpose(items))
            } else {
                let parts: Vec<String> = items.iter().map(compact).collect();
                format!("[{}]", parts.join(","))
            }
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}:{}", serde_json::to_string(k).unwrap_or_default(), compact(v)))
                .collect();
            format!("{{{}}}", parts.join(","))
        }
    }
}

/// Transposes a homogeneous array of objects into an object of arrays,
/// keyed by the first element's field order, tagged `_t: true`.
fn transpose(items: &[Value]) -> Value {
    let mut out = serde_json::Map::new();
    if let Some(Value::Object(first)) = items.first() {
        for key in first.keys() {
            let column: Vec<Value> = items
                .iter()
                .map(|e| e.get(key).cloned().unwrap_or(Value::Null))
                .collect();
            out.insert(key.clone(), Value::Array(column));
        }
    }
    out.insert("_t".to_string(), Value::Bool(true));
    Value::Object(out)
}

/// Rounds to one decimal place and strips the representation the way
/// Python's `%g` format does, dropping a trailing `.0`.
fn format_compact_float(f: f64) -> String {
    let rounded = (f * 10.0).round() / 10.0;
    if rounded.fract() == 0.0 {
        format!("{}", rounded as i64)
    } else {
        let s = format!("{:.1}", rounded);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bools_become_zero_one() {
        assert_eq!(compact(&json!(true)), "1");
        assert_eq!(compact(&json!(false)), "0");
    }

    #[test]
    fn floats_round_to_one_decimal() {
        assert_eq!(format_compact_float(1.23456), "1.2");
        assert_eq!(format_compact_float(3.0), "3");
        assert_eq!(format_compact_float(-0.05), "-0.1");
    }

    #[test]
    fn object_arrays_are_transposed() {
        let arr = json!([{"a": 1, "b": 2}, {"a": 3, "b": 4}]);
        let encoded = compact(&arr);
        assert!(encoded.contains("\"_t\":1"));
        assert!(encoded.contains("\"a\":[1,3]"));
        assert!(encoded.contains("\"b\":[2,4]"));
    }

    #[test]
    fn empty_array_is_not_transposed() {
        assert_eq!(compact(&json!([])), "[]");
    }
}
