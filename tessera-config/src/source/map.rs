//! Flat key-value sources: in-memory maps and the process environment

use super::PropertySource;
use crate::error::SourceError;
use crate::path::Path;
use crate::tree::{MergePolicy, PropertyTree};
use async_trait::async_trait;

/// Split a raw value on `delimiter`; the result is always a sequence
pub(crate) fn split_values(raw: &str, delimiter: char) -> PropertyTree {
    PropertyTree::sequence(
        raw.split(delimiter)
            .map(|part| PropertyTree::leaf(part.trim())),
    )
}

/// Normalize flat `key = value` pairs into a tree
pub(crate) fn tree_from_pairs(
    pairs: impl IntoIterator<Item = (String, String)>,
    key_delimiter: Option<char>,
    value_delimiter: Option<char>,
) -> PropertyTree {
    PropertyTree::from_entries(
        pairs.into_iter().filter_map(|(key, value)| {
            let path = Path::from_key(&key, key_delimiter);
            if path.is_empty() {
                log::debug!("Skipping entry with empty key {:?}", key);
                return None;
            }
            let tree = match value_delimiter {
                Some(delimiter) => split_values(&value, delimiter),
                None => PropertyTree::leaf(value),
            };
            Some((path, tree))
        }),
        MergePolicy::KeepFirst,
    )
}

/// In-memory flat map
#[derive(Debug, Clone)]
pub struct MapSource {
    name: String,
    entries: Vec<(String, String)>,
    key_delimiter: Option<char>,
    value_delimiter: Option<char>,
}

impl MapSource {
    pub fn new<K, V>(
        entries: impl IntoIterator<Item = (K, V)>,
        key_delimiter: Option<char>,
        value_delimiter: Option<char>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: "map".to_string(),
            entries: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            key_delimiter,
            value_delimiter,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn tree(&self) -> PropertyTree {
        tree_from_pairs(self.entries.clone(), self.key_delimiter, self.value_delimiter)
    }
}

#[async_trait]
impl PropertySource for MapSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<PropertyTree, SourceError> {
        Ok(self.tree())
    }
}

/// In-memory map where every key carries one or more values
#[derive(Debug, Clone)]
pub struct MultiMapSource {
    entries: Vec<(String, Vec<String>)>,
    key_delimiter: Option<char>,
}

impl MultiMapSource {
    pub fn new<K, V>(entries: impl IntoIterator<Item = (K, Vec<V>)>, key_delimiter: Option<char>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(key, values)| (key.into(), values.into_iter().map(Into::into).collect()))
                .collect(),
            key_delimiter,
        }
    }

    pub fn tree(&self) -> PropertyTree {
        PropertyTree::from_entries(
            self.entries.iter().filter_map(|(key, values)| {
                let path = Path::from_key(key, self.key_delimiter);
                if path.is_empty() || values.is_empty() {
                    return None;
                }
                Some((
                    path,
                    PropertyTree::sequence(values.iter().map(|v| PropertyTree::leaf(v.as_str()))),
                ))
            }),
            MergePolicy::KeepFirst,
        )
    }
}

#[async_trait]
impl PropertySource for MultiMapSource {
    fn name(&self) -> &str {
        "multi-map"
    }

    async fn load(&self) -> Result<PropertyTree, SourceError> {
        Ok(self.tree())
    }
}

/// Process environment variables, read at load time
///
/// With a prefix only matching variables are kept and the prefix is stripped
/// (`APP_DB_HOST` with prefix `APP` becomes `DB_HOST`).
#[derive(Debug, Clone, Default)]
pub struct EnvSource {
    prefix: Option<String>,
    key_delimiter: Option<char>,
    value_delimiter: Option<char>,
    lowercase_keys: bool,
}

impl EnvSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn key_delimiter(mut self, delimiter: char) -> Self {
        self.key_delimiter = Some(delimiter);
        self
    }

    pub fn value_delimiter(mut self, delimiter: char) -> Self {
        self.value_delimiter = Some(delimiter);
        self
    }

    /// Lowercase keys after prefix stripping, so `APP_DB_HOST` reads as `db.host`
    pub fn lowercase_keys(mut self, lowercase: bool) -> Self {
        self.lowercase_keys = lowercase;
        self
    }

    /// Select and rename variables; output is sorted for deterministic trees
    pub(crate) fn select(&self, vars: impl IntoIterator<Item = (String, String)>) -> Vec<(String, String)> {
        let mut selected: Vec<(String, String)> = vars
            .into_iter()
            .filter_map(|(key, value)| {
                let key = match &self.prefix {
                    Some(prefix) => {
                        let rest = key.strip_prefix(prefix.as_str())?;
                        if !prefix.ends_with('_') && !rest.starts_with('_') {
                            return None;
                        }
                        rest.trim_start_matches('_').to_string()
                    }
                    None => key,
                };
                if key.is_empty() {
                    return None;
                }
                let key = if self.lowercase_keys {
                    key.to_lowercase()
                } else {
                    key
                };
                Some((key, value))
            })
            .collect();
        selected.sort();
        selected
    }

    pub fn tree(&self) -> PropertyTree {
        let vars = std::env::vars_os()
            .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
        tree_from_pairs(self.select(vars), self.key_delimiter, self.value_delimiter)
    }
}

#[async_trait]
impl PropertySource for EnvSource {
    fn name(&self) -> &str {
        "environment"
    }

    async fn load(&self) -> Result<PropertyTree, SourceError> {
        Ok(self.tree())
    }
}
