//! Serialization of the generated document to JSON or YAML.
//!
//! Field order is fixed by the document model and every map in it is
//! ordered, so two runs over the same sources produce identical bytes.

use crate::openapi_builder::OpenApiDocument;
use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::Path;

/// Serializes an OpenAPI document to YAML format.
///
/// # Example
///
/// ```no_run
/// use openapi_from_operators::openapi_builder::{GeneratorConfig, OpenApiBuilder};
/// use openapi_from_operators::index::TypeIndex;
/// use openapi_from_operators::serializer::serialize_yaml;
///
/// let index = TypeIndex::new(&[]);
/// let generation = OpenApiBuilder::new(GeneratorConfig::default()).generate(&index).unwrap();
/// println!("{}", serialize_yaml(&generation.document).unwrap());
/// ```
pub fn serialize_yaml(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to YAML");
    serde_yaml::to_string(doc).context("Failed to serialize OpenAPI document to YAML")
}

/// Serializes an OpenAPI document to pretty-printed JSON.
pub fn serialize_json(doc: &OpenApiDocument) -> Result<String> {
    debug!("Serializing OpenAPI document to JSON");
    let mut json =
        serde_json::to_string_pretty(doc).context("Failed to serialize OpenAPI document to JSON")?;
    json.push('\n');
    Ok(json)
}

/// Writes string content to a file, creating parent directories as needed.
pub fn write_to_file(content: &str, path: &Path) -> Result<()> {
    debug!("Writing content to file: {}", path.display());

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    fs::write(path, content)
        .with_context(|| format!("Failed to write to file: {}", path.display()))?;

    debug!("Successfully wrote {} bytes to {}", content.len(), path.display());
    Ok(())
}
