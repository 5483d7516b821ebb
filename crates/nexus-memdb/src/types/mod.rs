//! Type system.
//!
//! [`DataType`] identifies the kind of a value and owns the rules that
//! operate on it: the implicit conversion lattice, explicit casts, and the
//! per-type equality and ordering used by expressions and indexes.

mod parse;
mod value;

use std::cmp::Ordering;
use std::fmt;

use nexus_common::{NexusError, NexusResult, FLOAT_EQUALITY_DELTA};
use serde::{Deserialize, Serialize};

pub use parse::{parse_array_literal, parse_date, parse_timestamp};
pub use value::Value;

/// A SQL data type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Type of an untyped `NULL` literal.
    Null,
    /// Boolean.
    Bool,
    /// 64-bit integer.
    Int,
    /// 64-bit floating point.
    Float,
    /// Text with an optional maximum length.
    Text(Option<u32>),
    /// Calendar date.
    Date,
    /// Date and time without zone.
    Timestamp,
    /// JSON document.
    Json,
    /// Binary JSON document.
    Jsonb,
    /// Array of an element type.
    Array(Box<DataType>),
}

impl DataType {
    /// Unbounded text.
    pub const fn text() -> Self {
        DataType::Text(None)
    }

    /// Array of `element`.
    pub fn array_of(element: DataType) -> Self {
        DataType::Array(Box::new(element))
    }

    /// Maps a SQL type name (as written in `CREATE TABLE`) to a type.
    ///
    /// Returns the type and whether the name denotes an auto-increment
    /// (`serial`) column.
    pub fn from_sql_name(name: &str) -> NexusResult<(DataType, bool)> {
        let lowered = name.trim().to_lowercase();

        if let Some(element) = lowered.strip_suffix("[]") {
            let (inner, serial) = DataType::from_sql_name(element)?;
            if serial {
                return Err(NexusError::not_supported(format!("type {}", name)));
            }
            return Ok((DataType::array_of(inner), false));
        }

        let (base, length) = match lowered.find('(') {
            Some(pos) => {
                let args = lowered[pos + 1..].trim_end_matches(')');
                let length = args.split(',').next().and_then(|a| a.trim().parse::<u32>().ok());
                (lowered[..pos].trim(), length)
            }
            None => (lowered.as_str(), None),
        };

        let ty = match base {
            "serial" | "serial4" | "serial8" | "bigserial" | "smallserial" => {
                return Ok((DataType::Int, true))
            }
            "int" | "integer" | "int2" | "int4" | "int8" | "bigint" | "smallint" => DataType::Int,
            "float" | "float4" | "float8" | "real" | "double" | "double precision" | "decimal"
            | "numeric" => DataType::Float,
            "text" | "varchar" | "character varying" | "char" | "character" | "string" => {
                DataType::Text(length)
            }
            "bool" | "boolean" => DataType::Bool,
            "date" => DataType::Date,
            "timestamp" | "timestamptz" | "timestamp without time zone"
            | "timestamp with time zone" | "datetime" => DataType::Timestamp,
            "json" => DataType::Json,
            "jsonb" => DataType::Jsonb,
            _ => return Err(NexusError::not_supported(format!("type {}", name))),
        };
        Ok((ty, false))
    }

    /// Returns true for integer and float.
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }

    /// Returns true for text of any length.
    pub fn is_text(&self) -> bool {
        matches!(self, DataType::Text(_))
    }

    /// Returns true for json and jsonb.
    pub fn is_json(&self) -> bool {
        matches!(self, DataType::Json | DataType::Jsonb)
    }

    /// Element type of an array type.
    pub fn element_type(&self) -> Option<&DataType> {
        match self {
            DataType::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Number of array dimensions (0 for scalars).
    pub fn array_depth(&self) -> usize {
        match self {
            DataType::Array(element) => 1 + element.array_depth(),
            _ => 0,
        }
    }

    /// Same type ignoring text length limits.
    pub(crate) fn same_kind(&self, other: &DataType) -> bool {
        match (self, other) {
            (DataType::Text(_), DataType::Text(_)) => true,
            (DataType::Array(a), DataType::Array(b)) => a.same_kind(b),
            (a, b) => a == b,
        }
    }

    /// Whether a value of this type implicitly converts to `to`.
    ///
    /// The lattice: identity, null to anything, int to float, text to
    /// any type by parsing, date and timestamp to each other, json and
    /// jsonb to each other, and arrays element-wise.
    pub fn can_convert(&self, to: &DataType) -> bool {
        if self.same_kind(to) {
            return true;
        }
        match (self, to) {
            (DataType::Null, _) => true,
            (DataType::Int, DataType::Float) => true,
            (DataType::Text(_), _) => true,
            (DataType::Date, DataType::Timestamp) | (DataType::Timestamp, DataType::Date) => true,
            (DataType::Json, DataType::Jsonb) | (DataType::Jsonb, DataType::Json) => true,
            (DataType::Array(a), DataType::Array(b)) => a.can_convert(b),
            _ => false,
        }
    }

    /// Whether an explicit `CAST` from this type to `to` exists.
    pub fn can_cast(&self, to: &DataType) -> bool {
        if self.can_convert(to) {
            return true;
        }
        matches!(
            (self, to),
            (_, DataType::Text(_))
                | (DataType::Float, DataType::Int)
                | (DataType::Bool, DataType::Int)
                | (DataType::Int, DataType::Bool)
        )
    }

    /// Converts a value of this type into `to`.
    ///
    /// The caller is responsible for checking [`can_convert`](Self::can_convert)
    /// or [`can_cast`](Self::can_cast); impossible conversions fail with a
    /// cast error and malformed text fails with a query error.
    pub fn convert_value(&self, value: Value, to: &DataType) -> NexusResult<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match (value, to) {
            (Value::Text(s), DataType::Text(Some(max))) => {
                if s.chars().count() > *max as usize {
                    return Err(NexusError::query(format!(
                        "value too long for type character varying({})",
                        max
                    )));
                }
                Ok(Value::Text(s))
            }
            (Value::Text(s), DataType::Text(None)) => Ok(Value::Text(s)),
            (Value::Text(s), target) => parse::parse_text(&s, target),
            (v @ Value::Bool(_), DataType::Bool) => Ok(v),
            (v @ Value::Int(_), DataType::Int) => Ok(v),
            (v @ Value::Float(_), DataType::Float) => Ok(v),
            (v @ Value::Date(_), DataType::Date) => Ok(v),
            (v @ Value::Timestamp(_), DataType::Timestamp) => Ok(v),
            (v @ Value::Json(_), DataType::Json | DataType::Jsonb) => Ok(v),
            (Value::Int(i), DataType::Float) => Ok(Value::Float(i as f64)),
            (Value::Float(f), DataType::Int) => Ok(Value::Int(f.trunc() as i64)),
            (Value::Bool(b), DataType::Int) => Ok(Value::Int(i64::from(b))),
            (Value::Int(i), DataType::Bool) => Ok(Value::Bool(i != 0)),
            (Value::Date(d), DataType::Timestamp) => Ok(Value::Timestamp(d.and_time(
                chrono::NaiveTime::MIN,
            ))),
            (Value::Timestamp(ts), DataType::Date) => Ok(Value::Date(ts.date())),
            (Value::Array(items), DataType::Array(element)) => {
                let from = self.element_type().cloned().unwrap_or(DataType::Null);
                items
                    .into_iter()
                    .map(|item| from.convert_value(item, element))
                    .collect::<NexusResult<Vec<_>>>()
                    .map(Value::Array)
            }
            (other, DataType::Text(max)) => {
                DataType::text().convert_value(Value::Text(other.to_string()), &DataType::Text(*max))
            }
            (_, target) => Err(NexusError::cast(self, target)),
        }
    }

    /// Type-specific equality of two non-null values.
    ///
    /// Floats compare with a small tolerance; JSON compares structurally.
    pub fn equals(&self, a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Float(_), _) | (_, Value::Float(_)) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => (x - y).abs() <= FLOAT_EQUALITY_DELTA,
                _ => false,
            },
            (Value::Array(xs), Value::Array(ys)) => {
                let element = self.element_type().cloned().unwrap_or(DataType::Null);
                xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|(x, y)| match (x.is_null(), y.is_null()) {
                        (true, true) => true,
                        (false, false) => element.equals(x, y),
                        _ => false,
                    })
            }
            _ => a == b,
        }
    }

    /// Type-specific ordering of two non-null values.
    pub fn compare(&self, a: &Value, b: &Value) -> Ordering {
        if self.equals(a, b) {
            return Ordering::Equal;
        }
        a.cmp(b)
    }

    /// Whether `a > b` for this type.
    pub fn gt(&self, a: &Value, b: &Value) -> bool {
        self.compare(a, b) == Ordering::Greater
    }

    /// Whether `a < b` for this type.
    pub fn lt(&self, a: &Value, b: &Value) -> bool {
        self.compare(a, b) == Ordering::Less
    }

    /// Finds a common type two operands can both be converted to.
    ///
    /// Prefers converting `b` into `a`'s type, then `a` into `b`'s type.
    pub fn unify(a: &DataType, b: &DataType) -> NexusResult<DataType> {
        if b.can_convert(a) {
            Ok(a.clone())
        } else if a.can_convert(b) {
            Ok(b.clone())
        } else {
            Err(NexusError::cast(a, b))
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Null => write!(f, "null"),
            DataType::Bool => write!(f, "bool"),
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Text(None) => write!(f, "text"),
            DataType::Text(Some(n)) => write!(f, "varchar({})", n),
            DataType::Date => write!(f, "date"),
            DataType::Timestamp => write!(f, "timestamp"),
            DataType::Json => write!(f, "json"),
            DataType::Jsonb => write!(f, "jsonb"),
            DataType::Array(element) => write!(f, "{}[]", element),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_sql_name() {
        assert_eq!(DataType::from_sql_name("INTEGER").unwrap(), (DataType::Int, false));
        assert_eq!(DataType::from_sql_name("serial").unwrap(), (DataType::Int, true));
        assert_eq!(
            DataType::from_sql_name("VARCHAR(10)").unwrap(),
            (DataType::Text(Some(10)), false)
        );
        assert_eq!(
            DataType::from_sql_name("integer[][]").unwrap().0,
            DataType::array_of(DataType::array_of(DataType::Int))
        );
        assert_eq!(DataType::from_sql_name("JSONB").unwrap().0, DataType::Jsonb);
        assert!(DataType::from_sql_name("geometry").is_err());
    }

    #[test]
    fn test_conversion_lattice() {
        assert!(DataType::Int.can_convert(&DataType::Float));
        assert!(!DataType::Float.can_convert(&DataType::Int));
        assert!(!DataType::Int.can_convert(&DataType::text()));
        assert!(DataType::text().can_convert(&DataType::Date));
        assert!(DataType::Null.can_convert(&DataType::Jsonb));
        assert!(DataType::array_of(DataType::Int).can_convert(&DataType::array_of(DataType::Float)));
        assert!(!DataType::Bool.can_convert(&DataType::Int));
        assert!(DataType::Bool.can_cast(&DataType::Int));
        assert!(DataType::Int.can_cast(&DataType::text()));
    }

    #[test]
    fn test_convert_value() {
        let v = DataType::text()
            .convert_value(Value::Text("42".into()), &DataType::Int)
            .unwrap();
        assert_eq!(v, Value::Int(42));

        let v = DataType::Int.convert_value(Value::Int(2), &DataType::Float).unwrap();
        assert_eq!(v, Value::Float(2.0));

        assert!(DataType::text()
            .convert_value(Value::Text("yo".into()), &DataType::Int)
            .is_err());

        let err = DataType::text()
            .convert_value(Value::Text("abcdef".into()), &DataType::Text(Some(3)))
            .unwrap_err();
        assert!(err.to_string().contains("too long"));
    }

    #[test]
    fn test_unify_prefers_right_to_left() {
        assert_eq!(DataType::unify(&DataType::Int, &DataType::text()).unwrap(), DataType::Int);
        assert_eq!(DataType::unify(&DataType::text(), &DataType::Int).unwrap(), DataType::Int);
        assert_eq!(DataType::unify(&DataType::Float, &DataType::Int).unwrap(), DataType::Float);
        assert!(DataType::unify(&DataType::Bool, &DataType::Date).is_err());
    }

    #[test]
    fn test_float_tolerance() {
        assert!(DataType::Float.equals(&Value::Float(1.00001), &Value::Float(1.0)));
        assert!(!DataType::Float.equals(&Value::Float(1.1), &Value::Float(1.0)));
        assert!(DataType::Float.gt(&Value::Float(2.1), &Value::Int(2)));
    }
}
