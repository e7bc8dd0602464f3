//! Structural value schemas with path-addressed issues.
//!
//! Capability contracts describe their input/output/error payloads with
//! these schemas, and the resolver uses one to reject malformed requests
//! before any policy logic runs. Validation never aborts on the first
//! problem; every issue is reported with a JSONPath-style `path` and a
//! human-readable `message`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hash::ContentHash;

/// A single validation finding, addressed by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIssue {
    pub path: String,
    pub message: String,
}

impl SchemaIssue {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Structural schema for a JSON value.
///
/// Object fields are split into `required` and `optional`;
/// `allow_additional` controls whether unknown keys are tolerated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSchema {
    Any,
    Null,
    Bool,
    Integer,
    Number,
    String,
    Array {
        items: Box<ValueSchema>,
    },
    Object {
        required: BTreeMap<String, ValueSchema>,
        optional: BTreeMap<String, ValueSchema>,
        allow_additional: bool,
    },
}

impl ValueSchema {
    /// Convenience constructor for an object schema with no optional fields.
    pub fn object(required: BTreeMap<String, ValueSchema>) -> Self {
        Self::Object {
            required,
            optional: BTreeMap::new(),
            allow_additional: false,
        }
    }

    /// Validate a value, returning every issue found.
    pub fn validate(&self, value: &Value) -> Vec<SchemaIssue> {
        let mut issues = Vec::new();
        self.validate_at("$", value, &mut issues);
        issues
    }

    /// Validate and convert to a `Result`.
    pub fn check(&self, value: &Value) -> Result<(), Vec<SchemaIssue>> {
        let issues = self.validate(value);
        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Deterministic digest of the schema definition.
    ///
    /// `serde_json` keeps object keys sorted, so the encoding is canonical.
    pub fn canonical_hash(&self) -> ContentHash {
        let bytes = serde_json::to_vec(self).expect("schema serialization is infallible");
        ContentHash::compute(&bytes)
    }

    fn validate_at(&self, path: &str, value: &Value, issues: &mut Vec<SchemaIssue>) {
        match self {
            Self::Any => {}
            Self::Null => {
                if !value.is_null() {
                    issues.push(type_issue(path, "null", value));
                }
            }
            Self::Bool => {
                if !value.is_boolean() {
                    issues.push(type_issue(path, "boolean", value));
                }
            }
            Self::Integer => {
                if !value.is_i64() && !value.is_u64() {
                    issues.push(type_issue(path, "integer", value));
                }
            }
            Self::Number => {
                if !value.is_number() {
                    issues.push(type_issue(path, "number", value));
                }
            }
            Self::String => {
                if !value.is_string() {
                    issues.push(type_issue(path, "string", value));
                }
            }
            Self::Array { items } => match value.as_array() {
                Some(elements) => {
                    for (index, element) in elements.iter().enumerate() {
                        items.validate_at(&format!("{path}[{index}]"), element, issues);
                    }
                }
                None => issues.push(type_issue(path, "array", value)),
            },
            Self::Object {
                required,
                optional,
                allow_additional,
            } => match value.as_object() {
                Some(map) => {
                    for (key, field_schema) in required {
                        match map.get(key) {
                            Some(field) => {
                                field_schema.validate_at(&format!("{path}.{key}"), field, issues);
                            }
                            None => issues.push(SchemaIssue::new(
                                format!("{path}.{key}"),
                                "missing required field",
                            )),
                        }
                    }
                    for (key, field_schema) in optional {
                        if let Some(field) = map.get(key) {
                            field_schema.validate_at(&format!("{path}.{key}"), field, issues);
                        }
                    }
                    if !allow_additional {
                        for key in map.keys() {
                            if !required.contains_key(key) && !optional.contains_key(key) {
                                issues.push(SchemaIssue::new(
                                    format!("{path}.{key}"),
                                    "unknown field",
                                ));
                            }
                        }
                    }
                }
                None => issues.push(type_issue(path, "object", value)),
            },
        }
    }
}

fn type_issue(path: &str, expected: &str, actual: &Value) -> SchemaIssue {
    SchemaIssue::new(path, format!("expected {expected}, got {}", value_kind(actual)))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
