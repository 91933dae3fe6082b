//! Per-kind node semantics.
//!
//! Handlers are pure over their inputs except where the kind's contract is
//! external I/O (extractor, loader). They return the node's output value or
//! a failure message; retry/timeout policy lives in the runner.

use super::config::{
    AggregateFunction, AggregatorConfig, ConditionalConfig, ExtractorConfig, FieldDataType,
    LoaderConfig, TransformerConfig, ValidationRule, ValidatorConfig,
};
use super::connector::ConnectorRegistry;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// The port single-input nodes read from.
pub const INPUT_PORT: &str = "input";

/// Extracts the record list a port value carries.
///
/// Accepts a bare array, or an object wrapping one under `data` (the shape
/// every handler produces).
#[must_use]
pub fn value_items(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

/// Number of records a node output carries, for execution accounting.
#[must_use]
pub fn record_count(value: &Value) -> u64 {
    match value {
        Value::Array(items) => items.len() as u64,
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items.len() as u64,
            _ => map
                .get("records_loaded")
                .and_then(Value::as_u64)
                .unwrap_or(0),
        },
        _ => 0,
    }
}

fn input_items(inputs: &HashMap<String, Value>) -> Vec<Value> {
    inputs.get(INPUT_PORT).map(value_items).unwrap_or_default()
}

pub(super) async fn run_extractor(
    config: &ExtractorConfig,
    connectors: &ConnectorRegistry,
) -> Result<Value, String> {
    let source = connectors.source(&config.source.connector).ok_or_else(|| {
        format!(
            "no source connector registered under '{}'",
            config.source.connector
        )
    })?;
    let records = source
        .fetch(&config.source.options)
        .await
        .map_err(|e| e.to_string())?;
    let count = records.len();
    Ok(json!({"data": records, "record_count": count}))
}

pub(super) async fn run_loader(
    config: &LoaderConfig,
    inputs: &HashMap<String, Value>,
    connectors: &ConnectorRegistry,
) -> Result<Value, String> {
    let sink = connectors.sink(&config.sink.connector).ok_or_else(|| {
        format!(
            "no sink connector registered under '{}'",
            config.sink.connector
        )
    })?;
    let records = input_items(inputs);
    let loaded = sink
        .write(&records, &config.sink.options)
        .await
        .map_err(|e| e.to_string())?;
    Ok(json!({"records_loaded": loaded}))
}

pub(super) fn run_transformer(
    config: &TransformerConfig,
    inputs: &HashMap<String, Value>,
) -> Result<Value, String> {
    let items = input_items(inputs);
    let out = match config {
        TransformerConfig::FieldMapping { mapping } => items
            .iter()
            .map(|record| {
                let mut mapped = Map::new();
                if let Value::Object(fields) = record {
                    for (target, source) in mapping {
                        if let Some(value) = fields.get(source) {
                            mapped.insert(target.clone(), value.clone());
                        }
                    }
                }
                Value::Object(mapped)
            })
            .collect::<Vec<_>>(),
        TransformerConfig::Filtering { condition } => items
            .into_iter()
            .filter(|record| condition.evaluate(record))
            .collect(),
        TransformerConfig::Aggregation {
            group_by,
            aggregations,
        } => aggregate_records(&items, group_by, aggregations),
    };
    let count = out.len();
    Ok(json!({"data": out, "record_count": count}))
}

pub(super) fn run_validator(
    config: &ValidatorConfig,
    inputs: &HashMap<String, Value>,
) -> Result<Value, String> {
    let items = input_items(inputs);
    let mut valid = Vec::new();
    let mut invalid = Vec::new();

    for record in items {
        let errors = validation_errors(&record, &config.validation_rules);
        if errors.is_empty() {
            valid.push(record);
        } else {
            let mut annotated = match record {
                Value::Object(map) => map,
                other => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), other);
                    map
                }
            };
            annotated.insert("_validation_errors".to_string(), json!(errors));
            invalid.push(Value::Object(annotated));
        }
    }

    let valid_count = valid.len();
    let invalid_count = invalid.len();
    Ok(json!({
        "data": valid.clone(),
        "valid_data": valid,
        "invalid_data": invalid,
        "valid_count": valid_count,
        "invalid_count": invalid_count,
    }))
}

fn validation_errors(record: &Value, rules: &[ValidationRule]) -> Vec<String> {
    let mut errors = Vec::new();
    for rule in rules {
        match rule {
            ValidationRule::Required { field } => {
                let present = record.get(field).is_some_and(|v| !v.is_null());
                if !present {
                    errors.push(format!("required field '{field}' is missing"));
                }
            }
            ValidationRule::DataType { field, data_type } => {
                if let Some(value) = record.get(field) {
                    let ok = match data_type {
                        FieldDataType::String => value.is_string(),
                        FieldDataType::Number => value.is_number(),
                    };
                    if !ok {
                        errors.push(format!(
                            "field '{field}' is not of type {}",
                            match data_type {
                                FieldDataType::String => "string",
                                FieldDataType::Number => "number",
                            }
                        ));
                    }
                }
            }
        }
    }
    errors
}

pub(super) fn run_aggregator(
    config: &AggregatorConfig,
    inputs: &HashMap<String, Value>,
) -> Result<Value, String> {
    let items = input_items(inputs);
    let out = aggregate_records(&items, &config.group_by, &config.aggregations);
    let count = out.len();
    Ok(json!({"data": out, "record_count": count}))
}

pub(super) fn run_conditional(
    config: &ConditionalConfig,
    inputs: &HashMap<String, Value>,
) -> Result<Value, String> {
    let items = input_items(inputs);
    let matched = config.condition.evaluate_data(&Value::Array(items.clone()));
    if matched {
        let count = items.len();
        Ok(json!({"data": items, "record_count": count, "condition_result": true}))
    } else {
        Ok(json!({"data": [], "record_count": 0, "condition_result": false}))
    }
}

pub(super) fn run_splitter(inputs: &HashMap<String, Value>) -> Result<Value, String> {
    let items = input_items(inputs);
    let count = items.len();
    Ok(json!({"data": items, "record_count": count}))
}

pub(super) fn run_joiner(inputs: &HashMap<String, Value>) -> Result<Value, String> {
    // Port order must not matter; sort by port name for determinism.
    let mut ports: Vec<_> = inputs.iter().collect();
    ports.sort_by(|a, b| a.0.cmp(b.0));

    let mut joined = Vec::new();
    for (_, value) in ports {
        joined.extend(value_items(value));
    }
    let count = joined.len();
    Ok(json!({"data": joined, "record_count": count}))
}

/// Groups and aggregates records. Shared by the aggregator node and the
/// transformer's aggregation mode.
fn aggregate_records(
    items: &[Value],
    group_by: &[String],
    aggregations: &HashMap<String, AggregateFunction>,
) -> Vec<Value> {
    if group_by.is_empty() {
        return vec![aggregate_group(None, items, aggregations)];
    }

    // Group keyed by the group-by field values, first-seen order preserved.
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<Value>> = HashMap::new();
    for record in items {
        let key = group_by
            .iter()
            .map(|field| record.get(field).cloned().unwrap_or(Value::Null).to_string())
            .collect::<Vec<_>>()
            .join("\u{1f}");
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(record.clone());
    }

    order
        .into_iter()
        .filter_map(|key| {
            let records = groups.remove(&key)?;
            let group_fields: Map<String, Value> = group_by
                .iter()
                .filter_map(|field| {
                    records
                        .first()
                        .and_then(|r| r.get(field))
                        .map(|v| (field.clone(), v.clone()))
                })
                .collect();
            Some(aggregate_group(Some(group_fields), &records, aggregations))
        })
        .collect()
}

fn aggregate_group(
    group_fields: Option<Map<String, Value>>,
    records: &[Value],
    aggregations: &HashMap<String, AggregateFunction>,
) -> Value {
    let mut out = group_fields.unwrap_or_default();

    for (field, function) in aggregations {
        let values: Vec<f64> = records
            .iter()
            .filter_map(|r| r.get(field).and_then(Value::as_f64))
            .collect();
        let key = format!("{field}_{function}");
        let aggregated = match function {
            AggregateFunction::Sum => json!(values.iter().sum::<f64>()),
            AggregateFunction::Count => json!(values.len()),
            AggregateFunction::Avg => {
                if values.is_empty() {
                    Value::Null
                } else {
                    json!(values.iter().sum::<f64>() / values.len() as f64)
                }
            }
            AggregateFunction::Max => values
                .iter()
                .copied()
                .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.max(v))))
                .map_or(Value::Null, |v| json!(v)),
            AggregateFunction::Min => values
                .iter()
                .copied()
                .fold(None::<f64>, |acc, v| Some(acc.map_or(v, |a| a.min(v))))
                .map_or(Value::Null, |v| json!(v)),
        };
        out.insert(key, aggregated);
    }

    Value::Object(out)
}
