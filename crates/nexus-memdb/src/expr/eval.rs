//! Expression evaluation.
//!
//! Evaluation follows SQL three-valued logic: a comparison with a null
//! operand is null, `AND`/`OR` treat null as unknown, and filters keep a
//! row only when the predicate is exactly `true`.

use nexus_common::{NexusError, NexusResult};

use super::{ArithmeticOp, ExprKind, Expression};
use crate::types::{DataType, Value};

impl Expression {
    /// Evaluates the expression against a row.
    pub fn eval(&self, row: &[Value]) -> NexusResult<Value> {
        match self.kind() {
            ExprKind::Constant(v) => Ok(v.clone()),
            ExprKind::Column(i) => row.get(*i).cloned().ok_or_else(|| {
                NexusError::internal(format!(
                    "column {} out of range for row of {}",
                    i,
                    row.len()
                ))
            }),
            ExprKind::Compare { op, left, right } => {
                let (l, r) = (left.eval(row)?, right.eval(row)?);
                if l.is_null() || r.is_null() {
                    return Ok(Value::Null);
                }
                Ok(Value::Bool(op.holds(left.data_type(), &l, &r)))
            }
            ExprKind::Arithmetic { op, left, right } => {
                arithmetic(*op, left.eval(row)?, right.eval(row)?)
            }
            ExprKind::And(left, right) => {
                let l = truth(&left.eval(row)?);
                if l == Some(false) {
                    return Ok(Value::Bool(false));
                }
                Ok(from_truth(match (l, truth(&right.eval(row)?)) {
                    (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }))
            }
            ExprKind::Or(left, right) => {
                let l = truth(&left.eval(row)?);
                if l == Some(true) {
                    return Ok(Value::Bool(true));
                }
                Ok(from_truth(match (l, truth(&right.eval(row)?)) {
                    (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }))
            }
            ExprKind::Not(expr) => Ok(from_truth(truth(&expr.eval(row)?).map(|b| !b))),
            ExprKind::Negate(expr) => match expr.eval(row)? {
                Value::Int(i) => i
                    .checked_neg()
                    .map(Value::Int)
                    .ok_or_else(|| NexusError::query("integer out of range")),
                Value::Float(f) => Ok(Value::Float(-f)),
                _ => Ok(Value::Null),
            },
            ExprKind::IsNull { expr, negated } => {
                Ok(Value::Bool(expr.eval(row)?.is_null() != *negated))
            }
            ExprKind::Between {
                expr,
                low,
                high,
                negated,
            } => {
                let ty = expr.data_type();
                let v = expr.eval(row)?;
                let above = compare_truth(ty, &v, &low.eval(row)?, |o| o.is_ge());
                let below = compare_truth(ty, &v, &high.eval(row)?, |o| o.is_le());
                let inside = match (above, below) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                };
                Ok(from_truth(if *negated {
                    inside.map(|b| !b)
                } else {
                    inside
                }))
            }
            ExprKind::InList {
                expr,
                list,
                negated,
            } => {
                let ty = expr.data_type();
                let v = expr.eval(row)?;
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in list {
                    let candidate = item.eval(row)?;
                    if candidate.is_null() {
                        saw_null = true;
                    } else if ty.equals(&v, &candidate) {
                        return Ok(Value::Bool(!*negated));
                    }
                }
                Ok(if saw_null {
                    Value::Null
                } else {
                    Value::Bool(*negated)
                })
            }
            ExprKind::Like {
                expr,
                pattern,
                case_insensitive,
                negated,
            } => match (expr.eval(row)?, pattern.eval(row)?) {
                (Value::Text(v), Value::Text(p)) => {
                    Ok(Value::Bool(like_match(&v, &p, *case_insensitive) != *negated))
                }
                _ => Ok(Value::Null),
            },
            ExprKind::Any { op, expr, array } => {
                let ty = expr.data_type();
                let v = expr.eval(row)?;
                let items = match array.eval(row)? {
                    Value::Array(items) => items,
                    _ => return Ok(Value::Null),
                };
                if v.is_null() {
                    return Ok(Value::Null);
                }
                let mut saw_null = false;
                for item in &items {
                    if item.is_null() {
                        saw_null = true;
                    } else if op.holds(ty, &v, item) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(if saw_null {
                    Value::Null
                } else {
                    Value::Bool(false)
                })
            }
            ExprKind::Convert { expr, to } => {
                expr.data_type().convert_value(expr.eval(row)?, to)
            }
            ExprKind::Concat(left, right) => match (left.eval(row)?, right.eval(row)?) {
                (Value::Text(mut l), Value::Text(r)) => {
                    l.push_str(&r);
                    Ok(Value::Text(l))
                }
                _ => Ok(Value::Null),
            },
            ExprKind::JsonMember { json, key, as_text } => {
                Ok(json_member(&json.eval(row)?, &key.eval(row)?, *as_text))
            }
            ExprKind::JsonContains(left, right) => match (left.eval(row)?, right.eval(row)?) {
                (Value::Json(l), Value::Json(r)) => Ok(Value::Bool(json_contains(&l, &r))),
                _ => Ok(Value::Null),
            },
            ExprKind::Subscript { array, indexes } => {
                let mut current = array.eval(row)?;
                for index in indexes {
                    let position = match index.eval(row)? {
                        Value::Int(i) => i,
                        _ => return Ok(Value::Null),
                    };
                    current = match current {
                        Value::Array(mut items) if position >= 1 && position as usize <= items.len() => {
                            items.swap_remove(position as usize - 1)
                        }
                        _ => return Ok(Value::Null),
                    };
                }
                // a partial subscript of a multi-dimensional array is null
                if matches!(current, Value::Array(_))
                    && indexes.len() < array.data_type().array_depth()
                {
                    return Ok(Value::Null);
                }
                Ok(current)
            }
            ExprKind::Array(items) => items
                .iter()
                .map(|item| item.eval(row))
                .collect::<NexusResult<Vec<_>>>()
                .map(Value::Array),
            ExprKind::Function { func, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.eval(row))
                    .collect::<NexusResult<Vec<_>>>()?;
                func.call(values)
            }
        }
    }
}

fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        _ => None,
    }
}

fn from_truth(truth: Option<bool>) -> Value {
    truth.map_or(Value::Null, Value::Bool)
}

fn compare_truth(
    ty: &DataType,
    a: &Value,
    b: &Value,
    test: impl Fn(std::cmp::Ordering) -> bool,
) -> Option<bool> {
    if a.is_null() || b.is_null() {
        None
    } else {
        Some(test(ty.compare(a, b)))
    }
}

fn arithmetic(op: ArithmeticOp, left: Value, right: Value) -> NexusResult<Value> {
    let out_of_range = || NexusError::query("integer out of range");
    let division_by_zero = || NexusError::query("division by zero");

    match (left, right) {
        (Value::Int(a), Value::Int(b)) => {
            let result = match op {
                ArithmeticOp::Add => a.checked_add(b).ok_or_else(out_of_range)?,
                ArithmeticOp::Subtract => a.checked_sub(b).ok_or_else(out_of_range)?,
                ArithmeticOp::Multiply => a.checked_mul(b).ok_or_else(out_of_range)?,
                ArithmeticOp::Divide => {
                    if b == 0 {
                        return Err(division_by_zero());
                    }
                    a.checked_div(b).ok_or_else(out_of_range)?
                }
                ArithmeticOp::Modulo => {
                    if b == 0 {
                        return Err(division_by_zero());
                    }
                    a.checked_rem(b).ok_or_else(out_of_range)?
                }
            };
            Ok(Value::Int(result))
        }
        (l, r) if l.is_null() || r.is_null() => Ok(Value::Null),
        (l, r) => {
            let (a, b) = match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => {
                    return Err(NexusError::query(format!(
                        "operator does not exist: {} {} {}",
                        l.data_type(),
                        op,
                        r.data_type()
                    )))
                }
            };
            let result = match op {
                ArithmeticOp::Add => a + b,
                ArithmeticOp::Subtract => a - b,
                ArithmeticOp::Multiply => a * b,
                ArithmeticOp::Divide | ArithmeticOp::Modulo if b == 0.0 => {
                    return Err(division_by_zero())
                }
                ArithmeticOp::Divide => a / b,
                ArithmeticOp::Modulo => a % b,
            };
            Ok(Value::Float(result))
        }
    }
}

fn json_member(json: &Value, key: &Value, as_text: bool) -> Value {
    let doc = match json {
        Value::Json(doc) => doc,
        _ => return Value::Null,
    };
    let member = match (doc, key) {
        (serde_json::Value::Object(map), Value::Text(k)) => map.get(k),
        (serde_json::Value::Array(items), Value::Int(i)) => {
            let len = items.len() as i64;
            let position = if *i < 0 { len + i } else { *i };
            usize::try_from(position).ok().and_then(|p| items.get(p))
        }
        _ => None,
    };
    match member {
        None => Value::Null,
        Some(serde_json::Value::Null) if as_text => Value::Null,
        Some(serde_json::Value::String(s)) if as_text => Value::Text(s.clone()),
        Some(other) if as_text => Value::Text(other.to_string()),
        Some(other) => Value::Json(other.clone()),
    }
}

/// Whether document `a` contains document `b`, as `@>` defines it.
fn json_contains(a: &serde_json::Value, b: &serde_json::Value) -> bool {
    use serde_json::Value as J;
    match (a, b) {
        (J::Object(a), J::Object(b)) => b
            .iter()
            .all(|(k, bv)| a.get(k).map_or(false, |av| json_contains(av, bv))),
        (J::Array(a), J::Array(b)) => b
            .iter()
            .all(|bv| a.iter().any(|av| json_contains(av, bv))),
        (J::Array(a), scalar) if !scalar.is_object() => a.iter().any(|av| av == scalar),
        _ => a == b,
    }
}

/// Matches `value` against a LIKE pattern (`%` any run, `_` one char,
/// `\\` escapes the next char).
pub fn like_match(value: &str, pattern: &str, case_insensitive: bool) -> bool {
    let (value, pattern) = if case_insensitive {
        (value.to_lowercase(), pattern.to_lowercase())
    } else {
        (value.to_string(), pattern.to_string())
    };
    let value_chars: Vec<char> = value.chars().collect();
    let pattern_chars: Vec<char> = pattern.chars().collect();

    fn matches(v: &[char], p: &[char]) -> bool {
        match (v.is_empty(), p.is_empty()) {
            (true, true) => true,
            (_, true) => false,
            (true, false) => p.iter().all(|&c| c == '%'),
            _ => match p[0] {
                // collapse runs of % before trying every split
                '%' if p.get(1) == Some(&'%') => matches(v, &p[1..]),
                '%' => (0..=v.len()).any(|i| matches(&v[i..], &p[1..])),
                '_' => matches(&v[1..], &p[1..]),
                '\\' if p.len() > 1 => v[0] == p[1] && matches(&v[1..], &p[2..]),
                c => v[0] == c && matches(&v[1..], &p[1..]),
            },
        }
    }

    matches(&value_chars, &pattern_chars)
}

/// Splits a LIKE pattern into its literal prefix.
///
/// Returns the prefix and whether any wildcard follows it.
pub fn like_prefix(pattern: &str) -> (String, bool) {
    match pattern.find(['%', '_']) {
        Some(pos) => (pattern[..pos].to_string(), true),
        None => (pattern.to_string(), false),
    }
}
