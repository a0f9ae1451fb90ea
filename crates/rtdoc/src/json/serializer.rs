use std::fmt::{self, Write};

use super::JsonValue;

/// Render a value as compact JSON text
pub fn stringify(value: &JsonValue) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail
    let _ = write_value(&mut out, value);
    out
}

impl fmt::Display for JsonValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self)
    }
}

fn write_value<W: Write>(out: &mut W, value: &JsonValue) -> fmt::Result {
    match value {
        JsonValue::Null => out.write_str("null"),
        JsonValue::Bool(true) => out.write_str("true"),
        JsonValue::Bool(false) => out.write_str("false"),
        JsonValue::Int(value) => write!(out, "{value}"),
        // `Display` for f64 prints the shortest text that reads back to the same value
        JsonValue::Double(value) if value.is_finite() => write!(out, "{value}"),
        JsonValue::Double(_) => out.write_str("null"),
        JsonValue::String(value) => write_string(out, value),
        JsonValue::Array(values) => {
            out.write_char('[')?;
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    out.write_char(',')?;
                }
                write_value(out, value)?;
            }
            out.write_char(']')
        }
        JsonValue::Object(entries) => {
            out.write_char('{')?;
            for (index, (key, value)) in entries.iter().enumerate() {
                if index > 0 {
                    out.write_char(',')?;
                }
                write_string(out, key)?;
                out.write_char(':')?;
                write_value(out, value)?;
            }
            out.write_char('}')
        }
    }
}

/// Quote a string, escaping exactly the characters the parser unescapes
///
/// Other control characters are written raw; the parser accepts them inside
/// strings, so the output still reads back unchanged.
fn write_string<W: Write>(out: &mut W, value: &str) -> fmt::Result {
    out.write_char('"')?;
    for c in value.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\u{8}' => out.write_str("\\b")?,
            '\u{c}' => out.write_str("\\f")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            c => out.write_char(c)?,
        }
    }
    out.write_char('"')
}
