//! Condition evaluation for branch and loop nodes.
//!
//! Conditions compare a variable (resolved from node inputs first, then the
//! run's variable store) against a literal. Numeric operators coerce string
//! operands; equality falls back to string comparison when either side is
//! not numeric.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a condition compares its resolved variable to the expected value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    And,
    Or,
}

impl Default for LogicalOperator {
    fn default() -> Self {
        LogicalOperator::And
    }
}

/// One comparison against a variable key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    /// Variable key: an input slot name or a variable-store key
    /// (`"counter"`, `"node1.output"`).
    pub variable: String,
    pub operator: ComparisonOperator,
    #[serde(default)]
    pub value: Value,
}

/// Evaluate a condition list under a logical operator.
///
/// `resolve` maps a variable key to its current value; unresolvable keys
/// evaluate as `Null` (and therefore as empty).
pub fn evaluate_conditions<'a, F>(
    conditions: &[Condition],
    operator: LogicalOperator,
    resolve: F,
) -> bool
where
    F: Fn(&str) -> Option<&'a Value>,
{
    if conditions.is_empty() {
        return true;
    }
    match operator {
        LogicalOperator::And => conditions.iter().all(|c| evaluate_condition(c, &resolve)),
        LogicalOperator::Or => conditions.iter().any(|c| evaluate_condition(c, &resolve)),
    }
}

pub fn evaluate_condition<'a, F>(condition: &Condition, resolve: &F) -> bool
where
    F: Fn(&str) -> Option<&'a Value>,
{
    let actual = resolve(&condition.variable).unwrap_or(&Value::Null);
    let expected = &condition.value;

    match condition.operator {
        ComparisonOperator::Equals => eval_equals(actual, expected),
        ComparisonOperator::NotEquals => !eval_equals(actual, expected),
        ComparisonOperator::GreaterThan => eval_numeric(actual, expected, |a, b| a > b),
        ComparisonOperator::LessThan => eval_numeric(actual, expected, |a, b| a < b),
        ComparisonOperator::GreaterOrEqual => eval_numeric(actual, expected, |a, b| a >= b),
        ComparisonOperator::LessOrEqual => eval_numeric(actual, expected, |a, b| a <= b),
        ComparisonOperator::Contains => eval_contains(actual, expected),
        ComparisonOperator::NotContains => !eval_contains(actual, expected),
        ComparisonOperator::StartsWith => {
            value_to_string(actual).starts_with(&value_to_string(expected))
        }
        ComparisonOperator::EndsWith => {
            value_to_string(actual).ends_with(&value_to_string(expected))
        }
        ComparisonOperator::IsEmpty => is_empty(actual),
        ComparisonOperator::IsNotEmpty => !is_empty(actual),
    }
}

fn eval_equals(actual: &Value, expected: &Value) -> bool {
    match (value_to_f64(actual), value_to_f64(expected)) {
        (Some(a), Some(b)) => (a - b).abs() < f64::EPSILON,
        _ => value_to_string(actual) == value_to_string(expected),
    }
}

fn eval_numeric(actual: &Value, expected: &Value, cmp: fn(f64, f64) -> bool) -> bool {
    match (value_to_f64(actual), value_to_f64(expected)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

fn eval_contains(actual: &Value, expected: &Value) -> bool {
    match actual {
        Value::String(s) => s.contains(&value_to_string(expected)),
        Value::Array(items) => items.iter().any(|item| eval_equals(item, expected)),
        Value::Object(map) => match expected {
            Value::String(key) => map.contains_key(key),
            _ => false,
        },
        _ => false,
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

fn value_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}
