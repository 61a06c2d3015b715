//! Process-wide system property table
//!
//! A mutable string table shared by the whole process, independent of the
//! environment. Sources built with
//! [`ConfigSource::from_system_props`](super::ConfigSource::from_system_props)
//! snapshot it when loaded.

use super::map::tree_from_pairs;
use super::PropertySource;
use crate::error::SourceError;
use crate::tree::PropertyTree;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

static PROPERTIES: Lazy<RwLock<BTreeMap<String, String>>> =
    Lazy::new(|| RwLock::new(BTreeMap::new()));

/// Set a system property, returning the previous value
pub fn set_property(key: impl Into<String>, value: impl Into<String>) -> Option<String> {
    PROPERTIES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(key.into(), value.into())
}

pub fn property(key: &str) -> Option<String> {
    PROPERTIES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(key)
        .cloned()
}

/// Remove a system property, returning its value
pub fn clear_property(key: &str) -> Option<String> {
    PROPERTIES
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(key)
}

fn snapshot() -> Vec<(String, String)> {
    PROPERTIES
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Snapshot of the system property table
#[derive(Debug, Clone, Default)]
pub struct SystemPropertiesSource {
    key_delimiter: Option<char>,
    value_delimiter: Option<char>,
}

impl SystemPropertiesSource {
    pub fn new(key_delimiter: Option<char>, value_delimiter: Option<char>) -> Self {
        Self {
            key_delimiter,
            value_delimiter,
        }
    }
}

#[async_trait]
impl PropertySource for SystemPropertiesSource {
    fn name(&self) -> &str {
        "system properties"
    }

    async fn load(&self) -> Result<PropertyTree, SourceError> {
        Ok(tree_from_pairs(
            snapshot(),
            self.key_delimiter,
            self.value_delimiter,
        ))
    }
}
