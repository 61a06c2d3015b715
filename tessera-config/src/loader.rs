//! Configuration loading with layered sources and environment overrides

use crate::descriptor::{ConfigDescriptor, ConfigType};
use crate::error::ConfigResult;
use crate::resolver::{read_with, ReadOptions};
use crate::source::document::DocumentFormat;
use crate::source::{ConfigSource, EnvSource};
use crate::tree::{MergePolicy, PropertyTree};
use std::path::Path;

/// Application-facing loader
///
/// Sources added later override individual keys of earlier ones. With a
/// prefix, environment variables override everything: `APP_SERVER_PORT`
/// with prefix `APP` sets `server.port`.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: Option<String>,
    sources: Vec<ConfigSource>,
    options: ReadOptions,
}

impl ConfigLoader {
    /// Create a loader without environment overrides
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a loader reading `<PREFIX>_*` environment variables on top of its sources
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
            ..Self::default()
        }
    }

    /// Add a source layer
    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file layer, choosing the format from the extension
    ///
    /// `.json` and `.properties` are recognized; anything else is read as YAML.
    /// Properties keys are split on `.`.
    pub fn with_file(self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let is_properties = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("properties"));

        let source = if is_properties {
            ConfigSource::from_properties_file(path, Some('.'), None)
        } else {
            match DocumentFormat::from_extension(path) {
                Some(DocumentFormat::Json) => ConfigSource::from_json_file(path),
                Some(DocumentFormat::Yaml) => ConfigSource::from_yaml_file(path),
                None => {
                    log::debug!("Reading {} as YAML", path.display());
                    ConfigSource::from_yaml_file(path)
                }
            }
        };
        self.with_source(source)
    }

    pub fn with_options(mut self, options: ReadOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ReadOptions {
        &self.options
    }

    /// All layers combined into one source
    pub fn source(&self) -> ConfigSource {
        let mut layers = self.sources.clone();
        if let Some(prefix) = &self.prefix {
            layers.push(ConfigSource::new(
                EnvSource::new()
                    .with_prefix(prefix.clone())
                    .key_delimiter('_')
                    .lowercase_keys(true),
            ));
        }

        layers
            .into_iter()
            .reduce(|base, overlay| base.layered(&overlay, MergePolicy::KeepLast))
            .unwrap_or_else(ConfigSource::empty)
    }

    /// Materialize every layer into one tree
    pub async fn load_tree(&self) -> ConfigResult<PropertyTree> {
        let source = self.source();
        log::debug!("Loading configuration tree from {}", source.name());
        Ok(source.load().await?)
    }

    /// Read `descriptor` from the combined layers
    pub async fn load<A: ConfigType>(&self, descriptor: &ConfigDescriptor<A>) -> ConfigResult<A> {
        let source = self.source();
        log::debug!("Loading configuration from {}", source.name());

        let value = read_with(&descriptor.clone().from(source), &self.options).await?;
        Ok(value)
    }
}
