use serde_json::Value;

use crate::core::error::{Error, ErrorKind, Result};
use crate::store::folder::Folder;

/// Options threaded through every (de)serialize call. `tolerant` relaxes
/// the top-level object-or-array requirement; tests use it, production
/// code never does.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonOptions {
    pub tolerant: bool,
}

const MAX_DEPTH: u32 = 200;
const INDENTATION: &str = "  ";

/// Encode a value as pretty-printed JSON: two-space indent, object keys
/// sorted, newline-terminated. Characters above ASCII are emitted as raw
/// UTF-8; control bytes are escaped.
pub fn to_json(value: &Value, opts: JsonOptions) -> Result<String> {
    if !opts.tolerant && !matches!(value, Value::Object(_) | Value::Array(_)) {
        return Err(Error::bad_argument(format!(
            "Illegal top-level JSON type: {}",
            type_name(value)
        )));
    }
    let mut out = String::with_capacity(64);
    encode(value, &mut out, 0)?;
    out.push('\n');
    Ok(out)
}

/// Parse JSON text. Surrogate `\u` escapes are rejected outright (BMP
/// escapes only; non-BMP characters must appear as raw UTF-8).
pub fn from_json(text: &str, opts: JsonOptions) -> Result<Value> {
    reject_surrogate_escapes(text)?;
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::decode(format!("JSON syntax error: {}", e)))?;
    if !opts.tolerant && !matches!(value, Value::Object(_) | Value::Array(_)) {
        return Err(Error::decode(format!(
            "Illegal top-level JSON type: {}",
            type_name(&value)
        )));
    }
    Ok(value)
}

/// Read and parse a JSON file through a folder.
pub fn slurp_json(folder: &dyn Folder, path: &str, opts: JsonOptions) -> Result<Value> {
    let mut stream = folder
        .open_in(path)
        .map_err(|e| e.add_frame(format!("slurp_json {}", path)))?;
    let raw = stream.read_all()?;
    let text = std::str::from_utf8(&raw)
        .map_err(|_| Error::decode(format!("Invalid UTF-8 in '{}'", path)))?;
    from_json(text, opts).map_err(|e| e.add_frame(format!("slurp_json {}", path)))
}

/// Encode and write a JSON file through a folder.
pub fn spew_json(value: &Value, folder: &dyn Folder, path: &str, opts: JsonOptions) -> Result<()> {
    let text = to_json(value, opts)?;
    let mut out = folder
        .open_out(path)
        .map_err(|e| e.add_frame(format!("spew_json {}", path)))?;
    out.write_bytes(text.as_bytes())?;
    out.close()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn indent(out: &mut String, depth: u32) {
    for _ in 0..depth {
        out.push_str(INDENTATION);
    }
}

fn encode(value: &Value, out: &mut String, depth: u32) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(Error::bad_argument(format!(
            "Exceeded max depth of {}",
            MAX_DEPTH
        )));
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(num) => out.push_str(&num.to_string()),
        Value::String(s) => encode_string(s, out),
        Value::Array(items) => {
            if items.is_empty() {
                out.push_str("[]");
            } else if items.len() == 1
                && !matches!(items[0], Value::Array(_) | Value::Object(_))
            {
                // Single scalar element stays on one line.
                out.push('[');
                encode(&items[0], out, depth + 1)?;
                out.push(']');
            } else {
                out.push('[');
                for (i, item) in items.iter().enumerate() {
                    out.push('\n');
                    indent(out, depth + 1);
                    encode(item, out, depth + 1)?;
                    if i + 1 < items.len() {
                        out.push(',');
                    }
                }
                out.push('\n');
                indent(out, depth);
                out.push(']');
            }
        }
        Value::Object(map) => {
            if map.is_empty() {
                out.push_str("{}");
            } else {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                out.push('{');
                for (i, key) in keys.iter().enumerate() {
                    out.push('\n');
                    indent(out, depth + 1);
                    encode_string(key, out);
                    out.push_str(": ");
                    encode(&map[key.as_str()], out, depth + 1)?;
                    if i + 1 < keys.len() {
                        out.push(',');
                    }
                }
                out.push('\n');
                indent(out, depth);
                out.push('}');
            }
        }
    }
    Ok(())
}

fn encode_string(s: &str, out: &mut String) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{8}' => out.push_str("\\b"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\u{c}' => out.push_str("\\f"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            // High characters, including those above the BMP, go out as
            // raw UTF-8.
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Scan raw JSON text for `\uXXXX` escapes in the surrogate range. Raw
/// non-BMP characters pass; escaped surrogates (paired or not) do not.
fn reject_surrogate_escapes(text: &str) -> Result<()> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            if i + 1 < bytes.len() && bytes[i + 1] == b'u' {
                let hex = bytes.get(i + 2..i + 6).ok_or_else(|| {
                    Error::decode("Truncated \\u escape".to_string())
                })?;
                let hex = std::str::from_utf8(hex)
                    .map_err(|_| Error::decode("Invalid \\u escape".to_string()))?;
                if let Ok(code_point) = u32::from_str_radix(hex, 16) {
                    if (0xD800..=0xDFFF).contains(&code_point) {
                        return Err(Error::new(
                            ErrorKind::DecodeError,
                            "Surrogate pairs not supported",
                        ));
                    }
                }
                i += 6;
            } else {
                // Skip the escaped character so `\\u` is not misread.
                i += 2;
            }
        } else {
            i += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorted_keys_two_space_indent_trailing_newline() {
        let value = json!({"b": 1, "a": 2});
        assert_eq!(
            to_json(&value, JsonOptions::default()).unwrap(),
            "{\n  \"a\": 2,\n  \"b\": 1\n}\n"
        );
    }

    #[test]
    fn scalar_top_level_needs_tolerant_mode() {
        let value = json!(42);
        assert!(to_json(&value, JsonOptions::default()).is_err());
        assert_eq!(
            to_json(&value, JsonOptions { tolerant: true }).unwrap(),
            "42\n"
        );
        assert!(from_json("42", JsonOptions::default()).is_err());
        assert_eq!(
            from_json("42", JsonOptions { tolerant: true }).unwrap(),
            value
        );
    }

    #[test]
    fn round_trip() {
        let tolerant = JsonOptions { tolerant: true };
        for value in [
            json!(null),
            json!(true),
            json!(-7),
            json!(2.5),
            json!("text with \"quotes\" and \\slashes\\"),
            json!(["a", 1, null]),
            json!({"k": {"nested": [1, 2, 3]}, "other": "v"}),
        ] {
            let text = to_json(&value, tolerant).unwrap();
            assert_eq!(from_json(&text, tolerant).unwrap(), value);
        }
    }

    #[test]
    fn control_bytes_are_escaped() {
        let value = json!(["tab\there\u{1}"]);
        let text = to_json(&value, JsonOptions::default()).unwrap();
        assert!(text.contains("tab\\there\\u0001"));
    }

    #[test]
    fn non_bmp_goes_out_raw() {
        let value = json!(["\u{1F600}"]);
        let text = to_json(&value, JsonOptions::default()).unwrap();
        assert!(text.contains('\u{1F600}'));
        assert_eq!(from_json(&text, JsonOptions::default()).unwrap(), value);
    }

    #[test]
    fn surrogate_escapes_rejected() {
        assert!(from_json("[\"\\ud83d\\ude00\"]", JsonOptions::default()).is_err());
        assert!(from_json("[\"\\uD800\"]", JsonOptions::default()).is_err());
        // A literal backslash-u in the data is not an escape.
        assert!(from_json("[\"\\\\ud800\"]", JsonOptions::default()).is_ok());
    }

    #[test]
    fn empty_and_single_element_arrays_stay_on_one_line() {
        assert_eq!(to_json(&json!([]), JsonOptions::default()).unwrap(), "[]\n");
        assert_eq!(
            to_json(&json!([5]), JsonOptions::default()).unwrap(),
            "[5]\n"
        );
        assert_eq!(
            to_json(&json!([5, 6]), JsonOptions::default()).unwrap(),
            "[\n  5,\n  6\n]\n"
        );
    }
}
