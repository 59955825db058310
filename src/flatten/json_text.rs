//! JSON text encoding for values stored in a single cell
//!
//! Cells holding a whole sub-tree use spaced separators (`", "`, `": "`) and
//! escape every non-ASCII character as `\uXXXX`, so tables extracted by
//! earlier runs compare byte for byte with new ones.

use serde::Serialize;
use serde_json::ser::Formatter;
use serde_json::Value;
use std::io;

struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W>(&mut self, writer: &mut W, fragment: &str) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if fragment.is_ascii() {
            return writer.write_all(fragment.as_bytes());
        }

        let mut units = [0u16; 2];
        for ch in fragment.chars() {
            if ch.is_ascii() {
                writer.write_all(&[ch as u8])?;
            } else {
                for unit in ch.encode_utf16(&mut units) {
                    write!(writer, "\\u{:04x}", unit)?;
                }
            }
        }
        Ok(())
    }
}

/// Encode a value as single-cell JSON text
pub fn to_json_text(value: &Value) -> serde_json::Result<String> {
    let mut buf = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
    value.serialize(&mut serializer)?;
    String::from_utf8(buf).map_err(|e| <serde_json::Error as serde::ser::Error>::custom(e))
}

/// Render a leaf as the text written into a CSV cell.
///
/// Strings are written as-is and null becomes the empty cell. Booleans are
/// `True`/`False`, as in tables written by earlier extractors; inside
/// composite values, which are encoded with [`to_json_text`], they stay JSON.
pub fn to_cell_text(value: &Value) -> serde_json::Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(true) => Ok(String::from("True")),
        Value::Bool(false) => Ok(String::from("False")),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(_) | Value::Object(_) => to_json_text(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_spaced_separators() {
        assert_eq!(to_json_text(&json!({"x": true})).unwrap(), r#"{"x": true}"#);
        assert_eq!(
            to_json_text(&json!({"a": [1, 2], "b": {"c": null}})).unwrap(),
            r#"{"a": [1, 2], "b": {"c": null}}"#
        );
        assert_eq!(to_json_text(&json!([])).unwrap(), "[]");
        assert_eq!(to_json_text(&json!({})).unwrap(), "{}");
    }

    #[test]
    fn test_non_ascii_is_escaped() {
        assert_eq!(to_json_text(&json!("café")).unwrap(), r#""caf\u00e9""#);
        assert_eq!(to_json_text(&json!("😀")).unwrap(), r#""\ud83d\ude00""#);
        assert_eq!(to_json_text(&json!("a\"b\n")).unwrap(), r#""a\"b\n""#);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(to_cell_text(&json!(null)).unwrap(), "");
        assert_eq!(to_cell_text(&json!("plain")).unwrap(), "plain");
        assert_eq!(to_cell_text(&json!(false)).unwrap(), "False");
        assert_eq!(to_cell_text(&json!(true)).unwrap(), "True");
        assert_eq!(to_cell_text(&json!({"on": true})).unwrap(), r#"{"on": true}"#);
        assert_eq!(to_cell_text(&json!(12.5)).unwrap(), "12.5");
        assert_eq!(to_cell_text(&json!(["in", "out"])).unwrap(), r#"["in", "out"]"#);
    }
}
