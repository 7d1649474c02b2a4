//! Line protocol implementation used by the push sink.
//!
//! One line is `series[,tag="value"...] field=value[,field=value...] timestamp`.
//! Tag values and string fields are double quoted, integers are written
//! without quotes or type suffix, floats in their shortest round-trip form.
//!
//! ```
//! # use eqemu_exporter::encoding::line::encode;
//! # use eqemu_exporter::observation::Value;
//! let mut line = String::new();
//! encode(
//!     &mut line,
//!     "series",
//!     &[("name", "tag")],
//!     &[("a", Value::Int(5)), ("b", Value::from("x"))],
//!     1_700_000_000,
//! )
//! .unwrap();
//!
//! assert_eq!("series,name=\"tag\" a=5,b=\"x\" 1700000000", line);
//! ```

use crate::observation::Value;
use std::fmt::Write;

/// Encode one line.
///
/// `fields` should not be empty; the line protocol requires at least one
/// field per line.
pub fn encode<W, K, V, F>(
    writer: &mut W,
    series: &str,
    tags: &[(K, V)],
    fields: &[(F, Value)],
    timestamp: u64,
) -> Result<(), std::fmt::Error>
where
    W: Write,
    K: AsRef<str>,
    V: AsRef<str>,
    F: AsRef<str>,
{
    debug_assert!(!fields.is_empty(), "line without fields");

    write_escaped(writer, series, &[',', ' '])?;
    for (key, value) in tags {
        writer.write_char(',')?;
        write_escaped(writer, key.as_ref(), &[',', '=', ' '])?;
        writer.write_char('=')?;
        write_quoted(writer, value.as_ref())?;
    }

    writer.write_char(' ')?;
    for (i, (key, value)) in fields.iter().enumerate() {
        if i > 0 {
            writer.write_char(',')?;
        }
        write_escaped(writer, key.as_ref(), &[',', '=', ' '])?;
        writer.write_char('=')?;
        encode_value(writer, value)?;
    }

    writer.write_char(' ')?;
    writer.write_str(itoa::Buffer::new().format(timestamp))
}

fn encode_value<W: Write>(writer: &mut W, value: &Value) -> Result<(), std::fmt::Error> {
    match value {
        Value::Int(i) => writer.write_str(itoa::Buffer::new().format(*i)),
        Value::Float(f) => writer.write_str(dtoa::Buffer::new().format(*f)),
        Value::Str(s) => write_quoted(writer, s),
    }
}

fn write_escaped<W: Write>(writer: &mut W, s: &str, special: &[char]) -> std::fmt::Result {
    for c in s.chars() {
        if special.contains(&c) {
            writer.write_char('\\')?;
        }
        writer.write_char(c)?;
    }
    Ok(())
}

fn write_quoted<W: Write>(writer: &mut W, s: &str) -> std::fmt::Result {
    writer.write_char('"')?;
    for c in s.chars() {
        if c == '"' || c == '\\' {
            writer.write_char('\\')?;
        }
        writer.write_char(c)?;
    }
    writer.write_char('"')
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::quickcheck;

    fn line(tags: &[(&str, &str)], fields: &[(&str, Value)], ts: u64) -> String {
        let mut buffer = String::new();
        encode(&mut buffer, "series", tags, fields, ts).unwrap();
        buffer
    }

    #[test]
    fn int_and_string_fields() {
        assert_eq!(
            "series,name=\"tag\" a=5,b=\"x\" 42",
            line(
                &[("name", "tag")],
                &[("a", Value::Int(5)), ("b", Value::from("x"))],
                42
            )
        );
    }

    #[test]
    fn no_tags() {
        assert_eq!(
            "series value=2.5 7",
            line(&[], &[("value", Value::Float(2.5))], 7)
        );
    }

    #[test]
    fn several_tags() {
        assert_eq!(
            "series,category=\"dragon\",host=\"a\" value=-3 0",
            line(
                &[("category", "dragon"), ("host", "a")],
                &[("value", Value::Int(-3))],
                0
            )
        );
    }

    #[test]
    fn escaping() {
        let mut buffer = String::new();
        encode(
            &mut buffer,
            "my series,x",
            &[("k=1", "say \"hi\"")],
            &[("f f", Value::from("back\\slash"))],
            1,
        )
        .unwrap();

        assert_eq!(
            "my\\ series\\,x,k\\=1=\"say \\\"hi\\\"\" f\\ f=\"back\\\\slash\" 1",
            buffer
        );
    }

    quickcheck! {
        fn never_a_trailing_comma(values: Vec<i64>, ts: u64) -> bool {
            let fields: Vec<(String, Value)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("f{i}"), Value::Int(*v)))
                .chain(std::iter::once(("last".to_owned(), Value::Float(1.0))))
                .collect();
            let mut buffer = String::new();
            encode(&mut buffer, "series", &[("t", "v")], &fields, ts).unwrap();

            let parts: Vec<&str> = buffer.split(' ').collect();
            parts.len() == 3
                && !parts[0].ends_with(',')
                && !parts[1].ends_with(',')
                && parts[1].split(',').count() == fields.len()
                && parts[2] == ts.to_string()
        }
    }
}
