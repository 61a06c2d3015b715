//! Structured documents (JSON, YAML)
//!
//! Scalars become leaves holding their textual form, `null` becomes an empty
//! node, arrays become sequences and objects become records. YAML mappings
//! keep document order; JSON objects are ordered by key.

use super::PropertySource;
use crate::error::SourceError;
use crate::tree::PropertyTree;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Supported document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// Guess the format from a file extension
    pub fn from_extension(path: &std::path::Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "json" => Some(DocumentFormat::Json),
            "yaml" | "yml" => Some(DocumentFormat::Yaml),
            _ => None,
        }
    }

    /// Parse `content` into a property tree
    pub fn parse(&self, content: &str) -> Result<PropertyTree, String> {
        match self {
            DocumentFormat::Json => {
                let value: serde_json::Value =
                    serde_json::from_str(content).map_err(|e| e.to_string())?;
                Ok(json_to_tree(&value))
            }
            DocumentFormat::Yaml => {
                let value: serde_yaml::Value =
                    serde_yaml::from_str(content).map_err(|e| e.to_string())?;
                yaml_to_tree(&value)
            }
        }
    }
}

pub fn json_to_tree(value: &serde_json::Value) -> PropertyTree {
    match value {
        serde_json::Value::Null => PropertyTree::Empty,
        serde_json::Value::Bool(b) => PropertyTree::leaf(b.to_string()),
        serde_json::Value::Number(n) => PropertyTree::leaf(n.to_string()),
        serde_json::Value::String(s) => PropertyTree::leaf(s.as_str()),
        serde_json::Value::Array(items) => PropertyTree::sequence(items.iter().map(json_to_tree)),
        serde_json::Value::Object(map) => {
            PropertyTree::record(map.iter().map(|(key, value)| (key.as_str(), json_to_tree(value))))
        }
    }
}

pub fn yaml_to_tree(value: &serde_yaml::Value) -> Result<PropertyTree, String> {
    Ok(match value {
        serde_yaml::Value::Null => PropertyTree::Empty,
        serde_yaml::Value::Bool(b) => PropertyTree::leaf(b.to_string()),
        serde_yaml::Value::Number(n) => PropertyTree::leaf(n.to_string()),
        serde_yaml::Value::String(s) => PropertyTree::leaf(s.as_str()),
        serde_yaml::Value::Sequence(items) => PropertyTree::Sequence(
            items
                .iter()
                .map(yaml_to_tree)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut entries = Vec::with_capacity(mapping.len());
            for (key, value) in mapping {
                entries.push((yaml_key(key)?, yaml_to_tree(value)?));
            }
            PropertyTree::record(entries)
        }
        serde_yaml::Value::Tagged(tagged) => yaml_to_tree(&tagged.value)?,
    })
}

fn yaml_key(key: &serde_yaml::Value) -> Result<String, String> {
    match key {
        serde_yaml::Value::String(s) => Ok(s.clone()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        other => Err(format!("unsupported mapping key {:?}", other)),
    }
}

#[derive(Debug, Clone)]
enum Origin {
    Inline(String),
    File(PathBuf),
}

/// JSON or YAML document, inline or read from a file at load time
#[derive(Debug, Clone)]
pub struct DocumentSource {
    name: String,
    format: DocumentFormat,
    origin: Origin,
}

impl DocumentSource {
    pub fn inline(format: DocumentFormat, content: impl Into<String>) -> Self {
        let name = match format {
            DocumentFormat::Json => "json",
            DocumentFormat::Yaml => "yaml",
        };
        Self {
            name: name.to_string(),
            format,
            origin: Origin::Inline(content.into()),
        }
    }

    pub fn file(format: DocumentFormat, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("file {}", path.display()),
            format,
            origin: Origin::File(path),
        }
    }
}

#[async_trait]
impl PropertySource for DocumentSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<PropertyTree, SourceError> {
        let content = match &self.origin {
            Origin::Inline(content) => content.clone(),
            Origin::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| SourceError::Io {
                        path: path.clone(),
                        message: e.to_string(),
                    })?
            }
        };
        self.format
            .parse(&content)
            .map_err(|message| SourceError::Parse {
                source_name: self.name.clone(),
                message,
            })
    }
}
