//! Scalar and aggregate functions.

use std::collections::HashSet;

use chrono::{NaiveDate, NaiveDateTime};
use nexus_common::{NexusError, NexusResult};

use super::Expression;
use crate::types::{DataType, Value};

/// Built-in scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarFunction {
    /// `lower(text)`.
    Lower,
    /// `upper(text)`.
    Upper,
    /// `length(text)`.
    Length,
    /// `concat(any, ...)`, nulls ignored.
    Concat,
    /// `coalesce(a, b, ...)`.
    Coalesce,
    /// `abs(number)`.
    Abs,
    /// `to_date(text, format)`.
    ToDate,
    /// `now()`.
    Now,
}

impl ScalarFunction {
    /// Function name as written in SQL.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarFunction::Lower => "lower",
            ScalarFunction::Upper => "upper",
            ScalarFunction::Length => "length",
            ScalarFunction::Concat => "concat",
            ScalarFunction::Coalesce => "coalesce",
            ScalarFunction::Abs => "abs",
            ScalarFunction::ToDate => "to_date",
            ScalarFunction::Now => "now",
        }
    }

    /// Volatile functions are evaluated on every call and never folded.
    pub fn is_volatile(&self) -> bool {
        matches!(self, ScalarFunction::Now)
    }

    /// Resolves a call by name, coercing the arguments.
    ///
    /// Returns the function, the coerced arguments and the result type.
    pub fn resolve(
        name: &str,
        args: Vec<Expression>,
    ) -> NexusResult<(ScalarFunction, Vec<Expression>, DataType)> {
        let no_match = |args: &[Expression]| {
            let types: Vec<_> = args.iter().map(|a| a.data_type().to_string()).collect();
            NexusError::query(format!(
                "function {}({}) does not exist",
                name,
                types.join(", ")
            ))
        };

        let func = match name {
            "lower" => ScalarFunction::Lower,
            "upper" => ScalarFunction::Upper,
            "length" | "char_length" => ScalarFunction::Length,
            "concat" => ScalarFunction::Concat,
            "coalesce" => ScalarFunction::Coalesce,
            "abs" => ScalarFunction::Abs,
            "to_date" => ScalarFunction::ToDate,
            "now" | "current_timestamp" => ScalarFunction::Now,
            _ => return Err(NexusError::not_supported(format!("function {}", name))),
        };

        match func {
            ScalarFunction::Lower | ScalarFunction::Upper | ScalarFunction::Length => {
                let [arg] = <[Expression; 1]>::try_from(args).map_err(|a| no_match(&a))?;
                let arg = arg.convert(&DataType::text())?;
                let ty = if func == ScalarFunction::Length {
                    DataType::Int
                } else {
                    DataType::text()
                };
                Ok((func, vec![arg], ty))
            }
            ScalarFunction::Concat => {
                let args = args
                    .into_iter()
                    .map(|a| a.cast(&DataType::text()))
                    .collect::<NexusResult<Vec<_>>>()?;
                Ok((func, args, DataType::text()))
            }
            ScalarFunction::Coalesce => {
                if args.is_empty() {
                    return Err(no_match(&args));
                }
                let mut ty = DataType::Null;
                for arg in &args {
                    ty = DataType::unify(&ty, arg.data_type()).or_else(|_| {
                        // a null-typed accumulator always yields to the argument
                        DataType::unify(arg.data_type(), &ty)
                    })?;
                }
                let args = args
                    .into_iter()
                    .map(|a| a.convert(&ty))
                    .collect::<NexusResult<Vec<_>>>()?;
                Ok((func, args, ty))
            }
            ScalarFunction::Abs => {
                let [arg] = <[Expression; 1]>::try_from(args).map_err(|a| no_match(&a))?;
                let ty = match arg.data_type() {
                    DataType::Null | DataType::Int => DataType::Int,
                    DataType::Float => DataType::Float,
                    DataType::Text(_) => DataType::Float,
                    _ => return Err(no_match(&[arg])),
                };
                Ok((func, vec![arg.convert(&ty)?], ty))
            }
            ScalarFunction::ToDate => {
                let [text, format] = <[Expression; 2]>::try_from(args).map_err(|a| no_match(&a))?;
                Ok((
                    func,
                    vec![text.convert(&DataType::text())?, format.convert(&DataType::text())?],
                    DataType::Date,
                ))
            }
            ScalarFunction::Now => {
                if !args.is_empty() {
                    return Err(no_match(&args));
                }
                Ok((func, args, DataType::Timestamp))
            }
        }
    }

    /// Calls the function on evaluated arguments.
    pub fn call(&self, args: Vec<Value>) -> NexusResult<Value> {
        match self {
            ScalarFunction::Lower => Ok(map_text(args, |s| s.to_lowercase())),
            ScalarFunction::Upper => Ok(map_text(args, |s| s.to_uppercase())),
            ScalarFunction::Length => Ok(match args.first() {
                Some(Value::Text(s)) => Value::Int(s.chars().count() as i64),
                _ => Value::Null,
            }),
            ScalarFunction::Concat => {
                let mut out = String::new();
                for arg in args {
                    if let Value::Text(s) = arg {
                        out.push_str(&s);
                    }
                }
                Ok(Value::Text(out))
            }
            ScalarFunction::Coalesce => {
                Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or(Value::Null))
            }
            ScalarFunction::Abs => match args.first() {
                Some(Value::Int(i)) => i
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| NexusError::query("integer out of range")),
                Some(Value::Float(f)) => Ok(Value::Float(f.abs())),
                _ => Ok(Value::Null),
            },
            ScalarFunction::ToDate => match (args.first(), args.get(1)) {
                (Some(Value::Text(text)), Some(Value::Text(format))) => {
                    to_date(text, format).map(Value::Date)
                }
                _ => Ok(Value::Null),
            },
            ScalarFunction::Now => Ok(Value::Timestamp(chrono::Local::now().naive_local())),
        }
    }
}

fn map_text(args: Vec<Value>, f: impl Fn(&str) -> String) -> Value {
    match args.first() {
        Some(Value::Text(s)) => Value::Text(f(s)),
        _ => Value::Null,
    }
}

/// Translates a PostgreSQL date template into a chrono format string.
fn translate_date_format(format: &str) -> (String, bool) {
    const TOKENS: &[(&str, &str, bool)] = &[
        ("YYYY", "%Y", false),
        ("HH24", "%H", true),
        ("MM", "%m", false),
        ("DD", "%d", false),
        ("MI", "%M", true),
        ("SS", "%S", true),
    ];

    let mut out = String::with_capacity(format.len() * 2);
    let mut has_time = false;
    let mut rest = format;
    'outer: while !rest.is_empty() {
        for (token, spec, is_time) in TOKENS {
            let matched = rest
                .get(..token.len())
                .is_some_and(|head| head.eq_ignore_ascii_case(token));
            if matched {
                out.push_str(spec);
                has_time |= is_time;
                rest = &rest[token.len()..];
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }
    (out, has_time)
}

fn to_date(text: &str, format: &str) -> NexusResult<NaiveDate> {
    let (chrono_format, has_time) = translate_date_format(format);
    let parsed = if has_time {
        NaiveDateTime::parse_from_str(text.trim(), &chrono_format).map(|ts| ts.date())
    } else {
        NaiveDate::parse_from_str(text.trim(), &chrono_format)
    };
    parsed.map_err(|_| {
        NexusError::query(format!(
            "invalid value \"{}\" for date format \"{}\"",
            text, format
        ))
    })
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    /// `count(*)`.
    CountStar,
    /// `count(expr)`.
    Count,
    /// `sum(expr)`.
    Sum,
    /// `min(expr)`.
    Min,
    /// `max(expr)`.
    Max,
    /// `avg(expr)`.
    Avg,
}

impl AggregateFunction {
    /// Looks an aggregate up by name.
    pub fn from_name(name: &str, star: bool) -> Option<Self> {
        match (name, star) {
            ("count", true) => Some(AggregateFunction::CountStar),
            ("count", false) => Some(AggregateFunction::Count),
            ("sum", false) => Some(AggregateFunction::Sum),
            ("min", false) => Some(AggregateFunction::Min),
            ("max", false) => Some(AggregateFunction::Max),
            ("avg", false) => Some(AggregateFunction::Avg),
            _ => None,
        }
    }

    /// Function name as written in SQL.
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::CountStar | AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Avg => "avg",
        }
    }

    /// Result type given the argument type.
    pub fn result_type(&self, arg: Option<&DataType>) -> NexusResult<DataType> {
        match (self, arg) {
            (AggregateFunction::CountStar | AggregateFunction::Count, _) => Ok(DataType::Int),
            (AggregateFunction::Sum, Some(DataType::Int | DataType::Null)) => Ok(DataType::Int),
            (AggregateFunction::Sum, Some(DataType::Float)) => Ok(DataType::Float),
            (AggregateFunction::Avg, Some(DataType::Int | DataType::Float | DataType::Null)) => {
                Ok(DataType::Float)
            }
            (AggregateFunction::Min | AggregateFunction::Max, Some(ty)) => Ok(ty.clone()),
            (_, Some(ty)) => Err(NexusError::query(format!(
                "function {}({}) does not exist",
                self.name(),
                ty
            ))),
            (_, None) => Err(NexusError::query(format!(
                "function {}() does not exist",
                self.name()
            ))),
        }
    }
}

/// Accumulator for aggregate functions.
#[derive(Debug, Clone)]
pub struct Accumulator {
    /// The aggregate function.
    func: AggregateFunction,
    /// Values already seen, for DISTINCT.
    seen: Option<HashSet<Value>>,
    /// Accumulated state.
    state: AccumulatorState,
}

/// State for different aggregate functions.
#[derive(Debug, Clone)]
enum AccumulatorState {
    Count(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Avg { sum: f64, count: i64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Accumulator {
    /// Creates a new accumulator.
    pub fn new(func: AggregateFunction, distinct: bool, arg_type: Option<&DataType>) -> Self {
        let state = match func {
            AggregateFunction::Count | AggregateFunction::CountStar => AccumulatorState::Count(0),
            AggregateFunction::Sum if arg_type == Some(&DataType::Float) => {
                AccumulatorState::SumFloat(None)
            }
            AggregateFunction::Sum => AccumulatorState::SumInt(None),
            AggregateFunction::Avg => AccumulatorState::Avg { sum: 0.0, count: 0 },
            AggregateFunction::Min => AccumulatorState::Min(None),
            AggregateFunction::Max => AccumulatorState::Max(None),
        };

        Self {
            func,
            seen: distinct.then(HashSet::new),
            state,
        }
    }

    /// Accumulates a value.
    pub fn accumulate(&mut self, value: &Value) -> NexusResult<()> {
        if value.is_null() && self.func != AggregateFunction::CountStar {
            return Ok(()); // Skip NULL values for most aggregates
        }
        if let Some(seen) = &mut self.seen {
            if !seen.insert(value.clone()) {
                return Ok(());
            }
        }

        match &mut self.state {
            AccumulatorState::Count(count) => *count += 1,
            AccumulatorState::SumInt(sum) => {
                if let Some(v) = value.as_i64() {
                    let total = sum
                        .unwrap_or(0)
                        .checked_add(v)
                        .ok_or_else(|| NexusError::query("integer out of range"))?;
                    *sum = Some(total);
                }
            }
            AccumulatorState::SumFloat(sum) => {
                if let Some(v) = value.as_f64() {
                    *sum = Some(sum.unwrap_or(0.0) + v);
                }
            }
            AccumulatorState::Avg { sum, count } => {
                if let Some(v) = value.as_f64() {
                    *sum += v;
                    *count += 1;
                }
            }
            AccumulatorState::Min(min) => {
                if min.as_ref().map_or(true, |m| value < m) {
                    *min = Some(value.clone());
                }
            }
            AccumulatorState::Max(max) => {
                if max.as_ref().map_or(true, |m| value > m) {
                    *max = Some(value.clone());
                }
            }
        }
        Ok(())
    }

    /// Returns the final result.
    pub fn result(&self) -> Value {
        match &self.state {
            AccumulatorState::Count(count) => Value::Int(*count),
            AccumulatorState::SumInt(sum) => sum.map_or(Value::Null, Value::Int),
            AccumulatorState::SumFloat(sum) => sum.map_or(Value::Null, Value::Float),
            AccumulatorState::Avg { sum, count } => {
                if *count == 0 {
                    Value::Null
                } else {
                    Value::Float(*sum / *count as f64)
                }
            }
            AccumulatorState::Min(v) | AccumulatorState::Max(v) => {
                v.clone().unwrap_or(Value::Null)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(func: AggregateFunction, distinct: bool, ty: &DataType, values: &[Value]) -> Value {
        let mut acc = Accumulator::new(func, distinct, Some(ty));
        for v in values {
            acc.accumulate(v).unwrap();
        }
        acc.result()
    }

    #[test]
    fn test_aggregates_skip_nulls() {
        let values = [Value::Int(3), Value::Null, Value::Int(1), Value::Int(3)];
        assert_eq!(run(AggregateFunction::Count, false, &DataType::Int, &values), Value::Int(3));
        assert_eq!(
            run(AggregateFunction::CountStar, false, &DataType::Int, &values),
            Value::Int(4)
        );
        assert_eq!(run(AggregateFunction::Sum, false, &DataType::Int, &values), Value::Int(7));
        assert_eq!(run(AggregateFunction::Sum, true, &DataType::Int, &values), Value::Int(4));
        assert_eq!(run(AggregateFunction::Min, false, &DataType::Int, &values), Value::Int(1));
        assert_eq!(run(AggregateFunction::Max, false, &DataType::Int, &values), Value::Int(3));
        assert_eq!(
            run(AggregateFunction::Avg, false, &DataType::Int, &values),
            Value::Float(7.0 / 3.0)
        );
    }

    #[test]
    fn test_empty_aggregates() {
        assert_eq!(run(AggregateFunction::Count, false, &DataType::Int, &[]), Value::Int(0));
        assert_eq!(run(AggregateFunction::Sum, false, &DataType::Int, &[]), Value::Null);
        assert_eq!(run(AggregateFunction::Avg, false, &DataType::Float, &[]), Value::Null);
    }

    #[test]
    fn test_to_date() {
        assert_eq!(
            to_date("2021/03/04", "YYYY/MM/DD").unwrap(),
            NaiveDate::from_ymd_opt(2021, 3, 4).unwrap()
        );
        assert_eq!(
            to_date("04-03-2021 10:11:12", "DD-MM-YYYY HH24:MI:SS").unwrap(),
            NaiveDate::from_ymd_opt(2021, 3, 4).unwrap()
        );
        assert!(to_date("garbage", "YYYY-MM-DD").is_err());
    }

    #[test]
    fn test_date_format_with_multibyte_literals() {
        assert_eq!(
            translate_date_format("YYYY年MM月DD日"),
            ("%Y年%m月%d日".to_string(), false)
        );
        assert_eq!(translate_date_format("日"), ("日".to_string(), false));
        assert!(to_date("x", "日").is_err());
    }

    #[test]
    fn test_scalar_calls() {
        assert_eq!(
            ScalarFunction::Lower.call(vec![Value::from("AbC")]).unwrap(),
            Value::from("abc")
        );
        assert_eq!(ScalarFunction::Lower.call(vec![Value::Null]).unwrap(), Value::Null);
        assert_eq!(
            ScalarFunction::Concat
                .call(vec![Value::from("a"), Value::Null, Value::from("b")])
                .unwrap(),
            Value::from("ab")
        );
        assert_eq!(
            ScalarFunction::Coalesce
                .call(vec![Value::Null, Value::Int(2)])
                .unwrap(),
            Value::Int(2)
        );
        assert!(ScalarFunction::Now.is_volatile());
    }
}
