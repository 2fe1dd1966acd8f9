//! Parameter descriptors.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};

use crate::path::ResourcePath;
use crate::validator::Validators;

/// Declared type of a parameter.
///
/// Unknown type names fall back to [`ParameterType::Custom`], which is passed
/// through without coercion.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
pub enum ParameterType {
    String,
    Text,
    Integer,
    Float,
    Boolean,
    Datetime,
    Resource,
    #[default]
    #[serde(other)]
    Custom,
}

/// Target of a resource-typed parameter.
///
/// The path is checked against the owning description when it is built, so
/// a target obtained from a loaded description always resolves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssociationTarget {
    /// Path of the referenced resource.
    pub path: ResourcePath,
    /// Attribute of the referenced resource that holds its id.
    pub value_id: String,
    /// Attribute of the referenced resource used as a display label.
    pub value_label: String,
}

/// Description of a single input or output parameter.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "RawParameter")]
pub struct ParameterDescriptor {
    pub kind: ParameterType,
    pub required: bool,
    pub nullable: bool,
    pub protected: bool,
    pub default: Option<Value>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub validators: Validators,
    /// Present when `kind` is [`ParameterType::Resource`].
    pub association: Option<AssociationTarget>,
}

impl ParameterDescriptor {
    /// Creates a descriptor of the given type with every flag off.
    pub fn new(kind: ParameterType) -> Self {
        Self {
            kind,
            required: false,
            nullable: false,
            protected: false,
            default: None,
            label: None,
            description: None,
            validators: Validators::default(),
            association: None,
        }
    }

    /// Creates a resource-typed descriptor pointing at `path`.
    pub fn resource(path: impl Into<ResourcePath>) -> Self {
        Self {
            association: Some(AssociationTarget {
                path: path.into(),
                value_id: "id".to_string(),
                value_label: "label".to_string(),
            }),
            ..Self::new(ParameterType::Resource)
        }
    }

    /// Marks the parameter as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the parameter as nullable.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Replaces the validator set.
    pub fn with_validators(mut self, validators: Validators) -> Self {
        self.validators = validators;
        self
    }

    /// Returns `true` for resource-typed parameters.
    pub fn is_association(&self) -> bool {
        self.kind == ParameterType::Resource
    }
}

#[derive(Deserialize)]
struct RawParameter {
    #[serde(rename = "type", default)]
    kind: ParameterType,
    #[serde(default)]
    required: Option<bool>,
    #[serde(default)]
    nullable: Option<bool>,
    #[serde(default)]
    protected: Option<bool>,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    validators: Validators,
    #[serde(default)]
    resource: Option<Vec<String>>,
    #[serde(default)]
    value_id: Option<String>,
    #[serde(default)]
    value_label: Option<String>,
}

impl From<RawParameter> for ParameterDescriptor {
    fn from(raw: RawParameter) -> Self {
        let association = match (raw.kind, raw.resource) {
            (ParameterType::Resource, Some(path)) => Some(AssociationTarget {
                path: ResourcePath::from(path),
                value_id: raw.value_id.unwrap_or_else(|| "id".to_string()),
                value_label: raw.value_label.unwrap_or_else(|| "label".to_string()),
            }),
            _ => None,
        };

        // The server sends "_nil" when no default is set.
        let default = raw
            .default
            .filter(|v| !v.is_null() && v.as_str() != Some("_nil"));

        Self {
            kind: raw.kind,
            required: raw.required.unwrap_or(false),
            nullable: raw.nullable.unwrap_or(false),
            protected: raw.protected.unwrap_or(false),
            default,
            label: raw.label,
            description: raw.description,
            validators: raw.validators,
            association,
        }
    }
}
