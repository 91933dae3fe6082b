//! Field/operator/value condition evaluation.
//!
//! One evaluator serves transformer filters, validator-adjacent routing,
//! conditional nodes, edge filter transformations and edge routing
//! conditions, so all of them agree on operator semantics.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Comparison operators supported by conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// Field value equals the condition value.
    Equals,
    /// Field value does not equal the condition value.
    NotEquals,
    /// Numeric field value is strictly greater than the condition value.
    GreaterThan,
    /// Numeric field value is strictly less than the condition value.
    LessThan,
    /// String field contains the condition string, or array field contains
    /// the condition value.
    Contains,
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals => write!(f, "equals"),
            Self::NotEquals => write!(f, "not_equals"),
            Self::GreaterThan => write!(f, "greater_than"),
            Self::LessThan => write!(f, "less_than"),
            Self::Contains => write!(f, "contains"),
        }
    }
}

/// A single field/operator/value condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// The record field the condition reads.
    pub field: String,
    /// The comparison operator.
    pub operator: ConditionOperator,
    /// The value compared against.
    pub value: Value,
}

impl Condition {
    /// Creates a new condition.
    #[must_use]
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
        }
    }

    /// Evaluates the condition against a single record.
    ///
    /// A missing field satisfies only `not_equals`; every other operator
    /// treats it as a non-match.
    #[must_use]
    pub fn evaluate(&self, record: &Value) -> bool {
        let field_value = record.get(&self.field);

        let Some(actual) = field_value else {
            return self.operator == ConditionOperator::NotEquals;
        };

        match self.operator {
            ConditionOperator::Equals => values_equal(actual, &self.value),
            ConditionOperator::NotEquals => !values_equal(actual, &self.value),
            ConditionOperator::GreaterThan => {
                compare_numeric(actual, &self.value).is_some_and(|ord| ord == std::cmp::Ordering::Greater)
            }
            ConditionOperator::LessThan => {
                compare_numeric(actual, &self.value).is_some_and(|ord| ord == std::cmp::Ordering::Less)
            }
            ConditionOperator::Contains => contains(actual, &self.value),
        }
    }

    /// Evaluates the condition against arbitrary node data.
    ///
    /// Objects are matched directly; for a list the condition holds if any
    /// element matches. Anything else never matches.
    #[must_use]
    pub fn evaluate_data(&self, data: &Value) -> bool {
        match data {
            Value::Object(_) => self.evaluate(data),
            Value::Array(items) => items.iter().any(|item| self.evaluate(item)),
            _ => false,
        }
    }
}

/// Equality that treats `1` and `1.0` as the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

fn compare_numeric(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    let x = a.as_f64()?;
    let y = b.as_f64()?;
    x.partial_cmp(&y)
}

fn contains(actual: &Value, needle: &Value) -> bool {
    match actual {
        Value::String(s) => needle.as_str().is_some_and(|n| s.contains(n)),
        Value::Array(items) => items.iter().any(|item| values_equal(item, needle)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_equals() {
        let cond = Condition::new("status", ConditionOperator::Equals, json!("active"));
        assert!(cond.evaluate(&json!({"status": "active"})));
        assert!(!cond.evaluate(&json!({"status": "paused"})));
    }

    #[test]
    fn test_equals_numeric_coercion() {
        let cond = Condition::new("count", ConditionOperator::Equals, json!(1));
        assert!(cond.evaluate(&json!({"count": 1.0})));
    }

    #[test]
    fn test_not_equals_missing_field() {
        let cond = Condition::new("status", ConditionOperator::NotEquals, json!("active"));
        assert!(cond.evaluate(&json!({"other": 1})));
    }

    #[test]
    fn test_greater_than() {
        let cond = Condition::new("x", ConditionOperator::GreaterThan, json!(4));
        assert!(cond.evaluate(&json!({"x": 5})));
        assert!(!cond.evaluate(&json!({"x": 4})));
        assert!(!cond.evaluate(&json!({"x": 1})));
    }

    #[test]
    fn test_less_than_non_numeric_is_false() {
        let cond = Condition::new("x", ConditionOperator::LessThan, json!(4));
        assert!(!cond.evaluate(&json!({"x": "nope"})));
    }

    #[test]
    fn test_contains_string() {
        let cond = Condition::new("name", ConditionOperator::Contains, json!("duct"));
        assert!(cond.evaluate(&json!({"name": "aqueduct"})));
        assert!(!cond.evaluate(&json!({"name": "pipeline"})));
    }

    #[test]
    fn test_contains_array() {
        let cond = Condition::new("tags", ConditionOperator::Contains, json!("etl"));
        assert!(cond.evaluate(&json!({"tags": ["etl", "batch"]})));
        assert!(!cond.evaluate(&json!({"tags": ["stream"]})));
    }

    #[test]
    fn test_evaluate_data_list_any_semantics() {
        let cond = Condition::new("x", ConditionOperator::GreaterThan, json!(10));
        assert!(cond.evaluate_data(&json!([{"x": 1}, {"x": 20}])));
        assert!(!cond.evaluate_data(&json!([{"x": 1}, {"x": 2}])));
    }

    #[test]
    fn test_serde_round_trip() {
        let cond: Condition = serde_json::from_value(json!({
            "field": "x",
            "operator": "greater_than",
            "value": 4
        }))
        .unwrap();
        assert_eq!(cond.operator, ConditionOperator::GreaterThan);
    }
}
