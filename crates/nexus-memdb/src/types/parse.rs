//! Text-to-value parsing used by implicit conversions from text.

use chrono::{NaiveDate, NaiveDateTime};
use nexus_common::{NexusError, NexusResult};

use super::{DataType, Value};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

fn invalid(type_name: &str, input: &str) -> NexusError {
    NexusError::query(format!(
        "invalid input syntax for type {}: \"{}\"",
        type_name, input
    ))
}

/// Parses text into a value of `target`.
pub(super) fn parse_text(s: &str, target: &DataType) -> NexusResult<Value> {
    let trimmed = s.trim();
    match target {
        DataType::Null => Ok(Value::Null),
        DataType::Text(_) => Ok(Value::Text(s.to_string())),
        DataType::Bool => match trimmed.to_lowercase().as_str() {
            "t" | "true" | "y" | "yes" | "on" | "1" => Ok(Value::Bool(true)),
            "f" | "false" | "n" | "no" | "off" | "0" => Ok(Value::Bool(false)),
            _ => Err(invalid("boolean", s)),
        },
        DataType::Int => trimmed
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| invalid("integer", s)),
        DataType::Float => trimmed
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| invalid("double precision", s)),
        DataType::Date => parse_date(trimmed).map(Value::Date),
        DataType::Timestamp => parse_timestamp(trimmed).map(Value::Timestamp),
        DataType::Json | DataType::Jsonb => serde_json::from_str(trimmed)
            .map(Value::Json)
            .map_err(|_| invalid("json", s)),
        DataType::Array(element) => {
            let raw = parse_array_literal(trimmed)?;
            convert_literal(raw, element)
        }
    }
}

/// Converts the raw text tree of an array literal into typed elements.
fn convert_literal(raw: Value, element: &DataType) -> NexusResult<Value> {
    match raw {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match (item, element) {
                (Value::Null, _) => Ok(Value::Null),
                (nested @ Value::Array(_), DataType::Array(inner)) => convert_literal(nested, inner),
                (Value::Array(_), _) => Err(NexusError::query(
                    "multidimensional arrays must have array expressions with matching dimensions",
                )),
                (Value::Text(text), ty) => parse_text(&text, ty),
                (other, ty) => DataType::text().convert_value(Value::Text(other.to_string()), ty),
            })
            .collect::<NexusResult<Vec<_>>>()
            .map(Value::Array),
        other => Err(invalid("array", &other.to_string())),
    }
}

/// Parses a date in ISO form (or the date part of a timestamp).
pub fn parse_date(s: &str) -> NexusResult<NaiveDate> {
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return Ok(d);
        }
    }
    parse_timestamp(s)
        .map(|ts| ts.date())
        .map_err(|_| invalid("date", s))
}

/// Parses a timestamp; a bare date means midnight.
pub fn parse_timestamp(s: &str) -> NexusResult<NaiveDateTime> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(ts);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, format) {
            return Ok(d.and_time(chrono::NaiveTime::MIN));
        }
    }
    Err(invalid("timestamp", s))
}

/// Parses a PostgreSQL array literal such as `{1,"a b",NULL,{2,3}}`.
///
/// Leaves are returned as text (or NULL for an unquoted `NULL`); nested
/// braces become nested arrays.
pub fn parse_array_literal(s: &str) -> NexusResult<Value> {
    let chars: Vec<char> = s.trim().chars().collect();
    let mut pos = 0;
    let value = parse_array_at(&chars, &mut pos).ok_or_else(|| invalid("array", s))?;
    skip_whitespace(&chars, &mut pos);
    if pos != chars.len() {
        return Err(invalid("array", s));
    }
    Ok(value)
}

fn skip_whitespace(chars: &[char], pos: &mut usize) {
    while *pos < chars.len() && chars[*pos].is_whitespace() {
        *pos += 1;
    }
}

fn parse_array_at(chars: &[char], pos: &mut usize) -> Option<Value> {
    skip_whitespace(chars, pos);
    if chars.get(*pos) != Some(&'{') {
        return None;
    }
    *pos += 1;

    let mut items = Vec::new();
    skip_whitespace(chars, pos);
    if chars.get(*pos) == Some(&'}') {
        *pos += 1;
        return Some(Value::Array(items));
    }

    loop {
        skip_whitespace(chars, pos);
        let item = match chars.get(*pos)? {
            '{' => parse_array_at(chars, pos)?,
            '"' => {
                *pos += 1;
                let mut text = String::new();
                loop {
                    match chars.get(*pos)? {
                        '\\' => {
                            text.push(*chars.get(*pos + 1)?);
                            *pos += 2;
                        }
                        '"' => {
                            *pos += 1;
                            break;
                        }
                        c => {
                            text.push(*c);
                            *pos += 1;
                        }
                    }
                }
                Value::Text(text)
            }
            _ => {
                let start = *pos;
                while *pos < chars.len() && !matches!(chars[*pos], ',' | '}') {
                    *pos += 1;
                }
                let text: String = chars[start..*pos].iter().collect();
                let text = text.trim();
                if text.eq_ignore_ascii_case("null") {
                    Value::Null
                } else {
                    Value::Text(text.to_string())
                }
            }
        };
        items.push(item);

        skip_whitespace(chars, pos);
        match chars.get(*pos)? {
            ',' => *pos += 1,
            '}' => {
                *pos += 1;
                return Some(Value::Array(items));
            }
            _ => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_scalars() {
        assert_eq!(parse_text(" 12 ", &DataType::Int).unwrap(), Value::Int(12));
        assert_eq!(parse_text("yes", &DataType::Bool).unwrap(), Value::Bool(true));
        assert!(parse_text("maybe", &DataType::Bool).is_err());
        assert_eq!(
            parse_text("2020-02-03", &DataType::Date).unwrap(),
            Value::Date(NaiveDate::from_ymd_opt(2020, 2, 3).unwrap())
        );
        assert!(parse_text("2020-02-03 10:11:12", &DataType::Timestamp).is_ok());
    }

    #[test]
    fn test_parse_array_literal() {
        let v = parse_text("{1,{2,3}}", &DataType::array_of(DataType::array_of(DataType::Int)));
        assert!(v.is_err());

        let v = parse_text(
            "{{1},{2,3}}",
            &DataType::array_of(DataType::array_of(DataType::Int)),
        )
        .unwrap();
        assert_eq!(
            v,
            Value::Array(vec![
                Value::Array(vec![Value::Int(1)]),
                Value::Array(vec![Value::Int(2), Value::Int(3)]),
            ])
        );

        let v = parse_text(r#"{"a b", NULL, c}"#, &DataType::array_of(DataType::text())).unwrap();
        assert_eq!(
            v,
            Value::Array(vec![Value::from("a b"), Value::Null, Value::from("c")])
        );

        assert!(parse_array_literal("{1,2").is_err());
        assert_eq!(parse_array_literal("{}").unwrap(), Value::Array(vec![]));
    }

    #[test]
    fn test_parse_json() {
        let v = parse_text(r#"{"a": [1]}"#, &DataType::Jsonb).unwrap();
        assert_eq!(v, Value::Json(serde_json::json!({"a": [1]})));
        assert!(parse_text("{nope", &DataType::Json).is_err());
    }
}
