//! Typed per-kind node configuration.
//!
//! Configs are stored as JSON blobs on the node records but parsed into
//! these types at validation/build time, so a missing required field is a
//! definition error rather than a surprise mid-run.

use crate::condition::Condition;
use crate::model::NodeKind;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;

/// External source kinds an extractor can read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// A relational database.
    Database,
    /// An HTTP API.
    Api,
    /// A file location.
    File,
}

/// Description of an external source. Access goes through the
/// [`crate::node::SourceConnector`] registered under `connector`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    /// The source kind.
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// Registry name of the connector that serves this source.
    pub connector: String,
    /// Connector-specific options (query, path, endpoint, ...).
    #[serde(default)]
    pub options: Value,
}

/// Description of an external sink, mirroring [`SourceRef`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SinkRef {
    /// The sink kind.
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// Registry name of the connector that serves this sink.
    pub connector: String,
    /// Connector-specific options.
    #[serde(default)]
    pub options: Value,
}

/// Extractor config: where to pull data from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// The external source description.
    pub source: SourceRef,
}

/// Loader config: where to write data to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// The external sink description.
    pub sink: SinkRef,
}

/// Aggregation functions applied per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateFunction {
    /// Sum of numeric values.
    Sum,
    /// Mean of numeric values.
    Avg,
    /// Count of records carrying the field.
    Count,
    /// Maximum numeric value.
    Max,
    /// Minimum numeric value.
    Min,
}

impl fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sum => write!(f, "sum"),
            Self::Avg => write!(f, "avg"),
            Self::Count => write!(f, "count"),
            Self::Max => write!(f, "max"),
            Self::Min => write!(f, "min"),
        }
    }
}

/// Transformer config, dispatched on `transformation_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "transformation_type", rename_all = "snake_case")]
pub enum TransformerConfig {
    /// Renames/projects record fields: `{target_field: source_field}`.
    FieldMapping {
        /// Target field name to source field name.
        mapping: HashMap<String, String>,
    },
    /// Keeps only records satisfying the condition.
    Filtering {
        /// The filter condition.
        condition: Condition,
    },
    /// Groups and aggregates records, same semantics as the aggregator node.
    Aggregation {
        /// Fields to group by; empty collapses the input to one record.
        #[serde(default)]
        group_by: Vec<String>,
        /// Per-field aggregation functions.
        aggregations: HashMap<String, AggregateFunction>,
    },
}

/// Primitive types checked by `data_type` validation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDataType {
    /// JSON string.
    String,
    /// JSON number.
    Number,
}

/// One validation rule applied per record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidationRule {
    /// The field must be present and non-null.
    Required {
        /// The checked field.
        field: String,
    },
    /// The field, when present, must have the given type.
    DataType {
        /// The checked field.
        field: String,
        /// The expected type.
        data_type: FieldDataType,
    },
}

/// Validator config: the rule list records are checked against.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidatorConfig {
    /// Rules applied to every record.
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
}

/// Aggregator config.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatorConfig {
    /// Fields to group by; empty collapses the input to one record.
    #[serde(default)]
    pub group_by: Vec<String>,
    /// Per-field aggregation functions.
    #[serde(default)]
    pub aggregations: HashMap<String, AggregateFunction>,
}

/// Conditional config: the gate condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalConfig {
    /// The gate condition.
    pub condition: Condition,
}

/// Parsed, kind-checked node configuration.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    /// Extractor settings.
    Extractor(ExtractorConfig),
    /// Transformer settings.
    Transformer(TransformerConfig),
    /// Loader settings.
    Loader(LoaderConfig),
    /// Validator settings.
    Validator(ValidatorConfig),
    /// Aggregator settings.
    Aggregator(AggregatorConfig),
    /// Splitters take no config.
    Splitter,
    /// Joiners take no config.
    Joiner,
    /// Conditional settings.
    Conditional(ConditionalConfig),
}

impl NodeConfig {
    /// Parses a raw config blob against the node's declared kind.
    ///
    /// # Errors
    ///
    /// Returns a message naming the missing/invalid field when the blob
    /// does not satisfy the kind's schema.
    pub fn parse(kind: NodeKind, raw: &Value) -> Result<Self, String> {
        let raw = if raw.is_null() { json!({}) } else { raw.clone() };
        match kind {
            NodeKind::Extractor => serde_json::from_value(raw)
                .map(Self::Extractor)
                .map_err(|e| e.to_string()),
            NodeKind::Transformer => serde_json::from_value(raw)
                .map(Self::Transformer)
                .map_err(|e| e.to_string()),
            NodeKind::Loader => serde_json::from_value(raw)
                .map(Self::Loader)
                .map_err(|e| e.to_string()),
            NodeKind::Validator => serde_json::from_value(raw)
                .map(Self::Validator)
                .map_err(|e| e.to_string()),
            NodeKind::Aggregator => serde_json::from_value(raw)
                .map(Self::Aggregator)
                .map_err(|e| e.to_string()),
            NodeKind::Splitter => Ok(Self::Splitter),
            NodeKind::Joiner => Ok(Self::Joiner),
            NodeKind::Conditional => serde_json::from_value(raw)
                .map(Self::Conditional)
                .map_err(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractor_requires_source() {
        assert!(NodeConfig::parse(NodeKind::Extractor, &json!({})).is_err());
        let ok = NodeConfig::parse(
            NodeKind::Extractor,
            &json!({"source": {"type": "database", "connector": "orders"}}),
        );
        assert!(matches!(ok, Ok(NodeConfig::Extractor(_))));
    }

    #[test]
    fn test_transformer_requires_transformation_type() {
        assert!(NodeConfig::parse(NodeKind::Transformer, &json!({})).is_err());
        let ok = NodeConfig::parse(
            NodeKind::Transformer,
            &json!({
                "transformation_type": "filtering",
                "condition": {"field": "x", "operator": "equals", "value": 1}
            }),
        );
        assert!(matches!(ok, Ok(NodeConfig::Transformer(_))));
    }

    #[test]
    fn test_validator_defaults_to_no_rules() {
        let parsed = NodeConfig::parse(NodeKind::Validator, &Value::Null).unwrap();
        let NodeConfig::Validator(config) = parsed else {
            panic!("wrong variant");
        };
        assert!(config.validation_rules.is_empty());
    }

    #[test]
    fn test_validation_rule_tags() {
        let config: ValidatorConfig = serde_json::from_value(json!({
            "validation_rules": [
                {"type": "required", "field": "email"},
                {"type": "data_type", "field": "age", "data_type": "number"}
            ]
        }))
        .unwrap();
        assert_eq!(config.validation_rules.len(), 2);
    }

    #[test]
    fn test_splitter_ignores_config() {
        let parsed = NodeConfig::parse(NodeKind::Splitter, &json!({"whatever": 1})).unwrap();
        assert_eq!(parsed, NodeConfig::Splitter);
    }

    #[test]
    fn test_aggregator_config_round_trip() {
        let config: AggregatorConfig = serde_json::from_value(json!({
            "group_by": ["category"],
            "aggregations": {"amount": "sum"}
        }))
        .unwrap();
        assert_eq!(config.group_by, vec!["category"]);
        assert_eq!(
            config.aggregations.get("amount"),
            Some(&AggregateFunction::Sum)
        );
    }
}
