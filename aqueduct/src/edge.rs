//! Edge-level data transformation and routing.
//!
//! Transformations are pure: the upstream output goes in, the transformed
//! value comes out, and nothing else changes. An edge with no
//! transformation, or one whose transformation config is unrecognized,
//! passes data through unchanged.

use crate::condition::Condition;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Aggregation functions available on edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeAggregation {
    /// Sum of a numeric field (or of numeric elements).
    Sum,
    /// Element count.
    Count,
}

/// A declarative transformation applied to data crossing one edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeTransformation {
    /// Projects an object down to the mapped fields:
    /// `{target_field: source_field}`.
    FieldMapping {
        /// Target field name to source field name.
        mapping: HashMap<String, String>,
    },
    /// Keeps only list elements satisfying the condition.
    Filter {
        /// The filter condition.
        condition: Condition,
    },
    /// Reduces a list to a single number.
    Aggregation {
        /// The aggregation function.
        function: EdgeAggregation,
        /// Field summed by `sum`; bare numeric elements when absent.
        #[serde(default)]
        field: Option<String>,
    },
}

impl EdgeTransformation {
    /// Parses a transformation config.
    ///
    /// Returns `None` for missing configs and for unrecognized or malformed
    /// ones; the defined fallback is passthrough, not an error.
    #[must_use]
    pub fn from_config(config: Option<&Value>) -> Option<Self> {
        let config = config?;
        serde_json::from_value(config.clone()).ok()
    }

    /// Applies the transformation to an upstream output value.
    #[must_use]
    pub fn apply(&self, value: &Value) -> Value {
        match self {
            Self::FieldMapping { mapping } => apply_field_mapping(value, mapping),
            Self::Filter { condition } => apply_filter(value, condition),
            Self::Aggregation { function, field } => apply_aggregation(value, *function, field.as_deref()),
        }
    }
}

/// Applies an edge's raw transformation config and routing condition.
///
/// A false routing condition delivers the empty counterpart of the value's
/// shape, keeping the target's input-port shape stable.
#[must_use]
pub fn transform_edge_value(
    value: &Value,
    transformation: Option<&Value>,
    condition: Option<&Condition>,
) -> Value {
    let parsed = EdgeTransformation::from_config(transformation);
    deliver_edge_value(value, parsed.as_ref(), condition)
}

/// [`transform_edge_value`] for a transformation parsed ahead of time,
/// as the execution graph stores it.
#[must_use]
pub fn deliver_edge_value(
    value: &Value,
    transformation: Option<&EdgeTransformation>,
    condition: Option<&Condition>,
) -> Value {
    if let Some(condition) = condition {
        if !condition.evaluate_data(payload_of(value)) {
            return empty_like(value);
        }
    }

    match transformation {
        Some(transformation) => transformation.apply(value),
        None => value.clone(),
    }
}

/// The list the value carries: the value itself when it is a list, or its
/// `data` entry when it is an object wrapping one.
fn payload_of(value: &Value) -> &Value {
    match value {
        Value::Object(map) => map.get("data").unwrap_or(value),
        _ => value,
    }
}

fn empty_like(value: &Value) -> Value {
    match value {
        Value::Array(_) => json!([]),
        Value::Object(_) => json!({"data": []}),
        _ => Value::Null,
    }
}

fn apply_field_mapping(value: &Value, mapping: &HashMap<String, String>) -> Value {
    let Value::Object(source) = value else {
        return value.clone();
    };

    let mut mapped = serde_json::Map::new();
    for (target_field, source_field) in mapping {
        if let Some(field_value) = source.get(source_field) {
            mapped.insert(target_field.clone(), field_value.clone());
        }
    }
    Value::Object(mapped)
}

fn apply_filter(value: &Value, condition: &Condition) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|item| condition.evaluate(item))
                .cloned()
                .collect(),
        ),
        Value::Object(map) if map.get("data").is_some_and(Value::is_array) => {
            let mut out = map.clone();
            if let Some(data) = out.get_mut("data") {
                *data = apply_filter(&data.clone(), condition);
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}

fn apply_aggregation(value: &Value, function: EdgeAggregation, field: Option<&str>) -> Value {
    let items = match payload_of(value) {
        Value::Array(items) => items,
        _ => return value.clone(),
    };

    match function {
        EdgeAggregation::Count => json!(items.len()),
        EdgeAggregation::Sum => {
            let total: f64 = items
                .iter()
                .filter_map(|item| match field {
                    Some(field) => item.get(field).and_then(Value::as_f64),
                    None => item.as_f64(),
                })
                .sum();
            json!(total)
        }
    }
}
