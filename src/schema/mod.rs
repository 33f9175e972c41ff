//! Schema model and the type-to-schema compiler.

pub mod compiler;
pub mod enums;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub use compiler::{FieldType, SchemaCompiler, TypeKey};

/// Prefix of component references.
pub const COMPONENTS_PREFIX: &str = "#/components/schemas/";

/// Declared Rust type name of a component.
pub const X_RUST_TYPE: &str = "x-rust-type";
/// Source field name when the serialized name differs.
pub const X_FIELD_NAME: &str = "x-rust-field-name";
/// Number of `&`/`Box`/`Rc`/`Arc` layers around a field type.
pub const X_POINTER_DEPTH: &str = "x-pointer-depth";
/// Raw `#[validate(..)]` content.
pub const X_TAG_VALIDATE: &str = "x-tag-validate";
/// Parameter name override from `#[param(name = ..)]`.
pub const X_TAG_NAME: &str = "x-tag-name";
/// Parameter location from `#[param(..)]`.
pub const X_TAG_IN: &str = "x-tag-in";
/// Human-readable labels aligned with `enum`.
pub const X_ENUM_LABELS: &str = "x-enum-labels";
/// Sorted status-error summaries attached to an error response.
pub const X_STATUS_ERRORS: &str = "x-status-errors";

/// OpenAPI schema object with an inline vendor-extension bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "$ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Properties in declaration order
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<IndexMap<String, Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Box<Schema>>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub one_of: Option<Vec<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unique_items: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(flatten)]
    pub extensions: BTreeMap<String, Value>,
}

impl Schema {
    /// Schema of a single JSON type.
    pub fn typed(schema_type: &str) -> Self {
        Self {
            schema_type: Some(schema_type.to_string()),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: &str) -> Self {
        self.format = Some(format.to_string());
        self
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        if description.is_some() {
            self.description = description;
        }
        self
    }

    pub fn with_extension(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extensions.insert(key.to_string(), value.into());
        self
    }

    /// `$ref` to a component.
    pub fn reference(name: &str) -> Self {
        Self {
            reference: Some(format!("{}{}", COMPONENTS_PREFIX, name)),
            ..Default::default()
        }
    }

    pub fn array(items: Schema) -> Self {
        Self {
            schema_type: Some("array".to_string()),
            items: Some(Box::new(items)),
            ..Default::default()
        }
    }

    pub fn object(properties: IndexMap<String, Schema>, required: Vec<String>) -> Self {
        Self {
            schema_type: Some("object".to_string()),
            properties: Some(properties),
            required: if required.is_empty() {
                None
            } else {
                Some(required)
            },
            ..Default::default()
        }
    }

    pub fn binary() -> Self {
        Schema::typed("string").with_format("binary")
    }

    /// The component name a `$ref` points at.
    pub fn ref_name(&self) -> Option<&str> {
        self.reference
            .as_deref()
            .and_then(|r| r.strip_prefix(COMPONENTS_PREFIX))
    }

    /// `$ref` siblings are ignored by OpenAPI 3.0 tooling, so a reference that
    /// carries a description or extensions is wrapped into `allOf`.
    pub fn settle(self) -> Self {
        if self.reference.is_none() || (self.description.is_none() && self.extensions.is_empty() && self.default.is_none()) {
            return self;
        }
        let Schema {
            reference,
            description,
            extensions,
            default,
            ..
        } = self;
        Schema {
            all_of: Some(vec![Schema {
                reference,
                ..Default::default()
            }]),
            description,
            extensions,
            default,
            ..Default::default()
        }
    }
}
