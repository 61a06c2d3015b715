//! Configuration sources
//!
//! A [`PropertySource`] fetches one [`PropertyTree`], possibly asynchronously.
//! A [`ConfigSource`] is an ordered fallback chain of providers: when it is
//! loaded, providers are tried one after another and the first successful
//! fetch wins. Fallback only happens when a fetch fails (missing file,
//! unparsable document); a key that is merely absent from a successfully
//! loaded tree never triggers it. Use [`ConfigSource::layered`] for key-level
//! overrides.

pub mod cli;
pub mod document;
pub mod map;
pub mod properties;
pub mod system;

use crate::descriptor::{ConfigDescriptor, ConfigType};
use crate::error::{ReadError, SourceError};
use crate::tree::{MergePolicy, PropertyTree};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub use cli::CommandLineSource;
pub use document::{DocumentFormat, DocumentSource};
pub use map::{EnvSource, MapSource, MultiMapSource};
pub use properties::PropertiesSource;
pub use system::SystemPropertiesSource;

/// Provider of a single property tree
#[async_trait]
pub trait PropertySource: Send + Sync {
    /// Name used in logs and error reports
    fn name(&self) -> &str;

    /// Fetch and normalize the provider's data
    async fn load(&self) -> Result<PropertyTree, SourceError>;
}

/// Fixed, pre-built tree
#[derive(Debug, Clone)]
pub struct TreeSource {
    name: String,
    tree: PropertyTree,
}

impl TreeSource {
    pub fn new(name: impl Into<String>, tree: PropertyTree) -> Self {
        Self {
            name: name.into(),
            tree,
        }
    }
}

#[async_trait]
impl PropertySource for TreeSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<PropertyTree, SourceError> {
        Ok(self.tree.clone())
    }
}

/// Two sources materialized together and merged key by key
struct LayeredSource {
    name: String,
    base: ConfigSource,
    overlay: ConfigSource,
    policy: MergePolicy,
}

#[async_trait]
impl PropertySource for LayeredSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<PropertyTree, SourceError> {
        let base = self.base.load().await?;
        let overlay = self.overlay.load().await?;
        Ok(base.merge(overlay, self.policy))
    }
}

/// Trees fetched during a single read, keyed by provider identity
pub(crate) type ProviderCache = HashMap<usize, Result<Arc<PropertyTree>, SourceError>>;

/// Ordered fallback chain of property providers
#[derive(Clone)]
pub struct ConfigSource {
    providers: Arc<Vec<Arc<dyn PropertySource>>>,
}

impl fmt::Debug for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigSource")
            .field("providers", &self.names())
            .finish()
    }
}

impl ConfigSource {
    /// Source backed by a single provider
    pub fn new(provider: impl PropertySource + 'static) -> Self {
        Self::from_provider(Arc::new(provider))
    }

    pub fn from_provider(provider: Arc<dyn PropertySource>) -> Self {
        Self {
            providers: Arc::new(vec![provider]),
        }
    }

    /// Identity of this chain, stable across clones
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.providers) as *const () as usize
    }

    /// Provider names in priority order
    pub fn names(&self) -> Vec<String> {
        self.providers
            .iter()
            .map(|provider| provider.name().to_string())
            .collect()
    }

    pub fn name(&self) -> String {
        self.names().join(" <> ")
    }

    /// Chain `other` after `self`; it is consulted only if every provider of `self` fails to load
    pub fn or_else(&self, other: &ConfigSource) -> ConfigSource {
        let providers = self
            .providers
            .iter()
            .chain(other.providers.iter())
            .cloned()
            .collect();
        Self {
            providers: Arc::new(providers),
        }
    }

    /// Materialize both sources and merge them key by key
    ///
    /// With [`MergePolicy::KeepLast`] values from `overlay` override `self`.
    /// Either side failing to load fails the layered source.
    pub fn layered(&self, overlay: &ConfigSource, policy: MergePolicy) -> ConfigSource {
        ConfigSource::new(LayeredSource {
            name: format!("{} + {}", self.name(), overlay.name()),
            base: self.clone(),
            overlay: overlay.clone(),
            policy,
        })
    }

    /// Load the first provider that fetches successfully
    pub async fn load(&self) -> Result<PropertyTree, SourceError> {
        let mut cache = ProviderCache::new();
        match self.load_cached(&mut cache).await {
            Ok(tree) => Ok(Arc::unwrap_or_clone(tree)),
            Err(errors) => Err(SourceError::Unavailable {
                source_name: self.name(),
                message: errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            }),
        }
    }

    /// Like [`load`](Self::load), fetching each provider at most once per cache
    pub(crate) async fn load_cached(
        &self,
        cache: &mut ProviderCache,
    ) -> Result<Arc<PropertyTree>, Vec<SourceError>> {
        let mut errors = Vec::new();
        for provider in self.providers.iter() {
            let key = Arc::as_ptr(provider) as *const () as usize;
            if !cache.contains_key(&key) {
                log::debug!("Loading configuration source {}", provider.name());
                let loaded = provider.load().await.map(Arc::new);
                cache.insert(key, loaded);
            }
            match cache.get(&key) {
                Some(Ok(tree)) => return Ok(Arc::clone(tree)),
                Some(Err(e)) => {
                    log::warn!(
                        "Configuration source {} failed to load, trying next: {}",
                        provider.name(),
                        e
                    );
                    errors.push(e.clone());
                }
                None => {}
            }
        }
        Err(errors)
    }

    /// Read `descriptor` with this source attached at the lowest priority
    pub async fn read<A: ConfigType>(&self, descriptor: &ConfigDescriptor<A>) -> Result<A, ReadError> {
        descriptor.clone().from(self.clone()).read().await
    }

    /// Source that always yields `tree`
    pub fn from_tree(name: impl Into<String>, tree: PropertyTree) -> Self {
        Self::new(TreeSource::new(name, tree))
    }

    /// Source that always yields an empty tree
    pub fn empty() -> Self {
        Self::from_tree("empty", PropertyTree::Empty)
    }

    /// Flat map; keys are split on `key_delimiter`, values on `value_delimiter`
    pub fn from_map<K, V>(
        entries: impl IntoIterator<Item = (K, V)>,
        key_delimiter: Option<char>,
        value_delimiter: Option<char>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(MapSource::new(entries, key_delimiter, value_delimiter))
    }

    /// Multi-valued map; every entry becomes a sequence
    pub fn from_multi_map<K, V>(
        entries: impl IntoIterator<Item = (K, Vec<V>)>,
        key_delimiter: Option<char>,
    ) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(MultiMapSource::new(entries, key_delimiter))
    }

    /// Process environment, read when the source is loaded
    pub fn from_system_env(key_delimiter: Option<char>, value_delimiter: Option<char>) -> Self {
        let mut env = EnvSource::new();
        if let Some(delimiter) = key_delimiter {
            env = env.key_delimiter(delimiter);
        }
        if let Some(delimiter) = value_delimiter {
            env = env.value_delimiter(delimiter);
        }
        Self::new(env)
    }

    /// Process-wide system property table, see [`system::set_property`]
    pub fn from_system_props(key_delimiter: Option<char>, value_delimiter: Option<char>) -> Self {
        Self::new(SystemPropertiesSource::new(key_delimiter, value_delimiter))
    }

    /// Java-style properties text
    pub fn from_properties_str(
        content: impl Into<String>,
        key_delimiter: Option<char>,
        value_delimiter: Option<char>,
    ) -> Self {
        Self::new(PropertiesSource::inline(content, key_delimiter, value_delimiter))
    }

    /// Java-style properties file, read when the source is loaded
    pub fn from_properties_file(
        path: impl Into<PathBuf>,
        key_delimiter: Option<char>,
        value_delimiter: Option<char>,
    ) -> Self {
        Self::new(PropertiesSource::file(path, key_delimiter, value_delimiter))
    }

    /// Command-line tokens, see [`cli`] for the accepted grammar
    pub fn from_command_line_args<T: Into<String>>(
        tokens: impl IntoIterator<Item = T>,
        key_delimiter: Option<char>,
        value_delimiter: Option<char>,
    ) -> Self {
        Self::new(CommandLineSource::new(tokens, key_delimiter, value_delimiter))
    }

    pub fn from_json_str(content: impl Into<String>) -> Self {
        Self::new(DocumentSource::inline(DocumentFormat::Json, content))
    }

    pub fn from_yaml_str(content: impl Into<String>) -> Self {
        Self::new(DocumentSource::inline(DocumentFormat::Yaml, content))
    }

    pub fn from_json_file(path: impl Into<PathBuf>) -> Self {
        Self::new(DocumentSource::file(DocumentFormat::Json, path))
    }

    pub fn from_yaml_file(path: impl Into<PathBuf>) -> Self {
        Self::new(DocumentSource::file(DocumentFormat::Yaml, path))
    }
}

impl std::ops::BitOr for ConfigSource {
    type Output = ConfigSource;

    fn bitor(self, other: ConfigSource) -> ConfigSource {
        self.or_else(&other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingSource;

    #[async_trait]
    impl PropertySource for FailingSource {
        fn name(&self) -> &str {
            "failing"
        }

        async fn load(&self) -> Result<PropertyTree, SourceError> {
            Err(SourceError::Unavailable {
                source_name: "failing".to_string(),
                message: "connection refused".to_string(),
            })
        }
    }

    struct CountingSource {
        loads: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PropertySource for CountingSource {
        fn name(&self) -> &str {
            "counting"
        }

        async fn load(&self) -> Result<PropertyTree, SourceError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(PropertyTree::record([("key", PropertyTree::leaf("value"))]))
        }
    }

    #[tokio::test]
    async fn test_or_else_falls_back_on_fetch_failure() {
        let source = ConfigSource::new(FailingSource)
            | ConfigSource::from_map([("port", "8080")], None, None);

        let tree = source.load().await.unwrap();
        assert_eq!(tree.get_path(&Path::from("port")), PropertyTree::leaf("8080"));
        assert_eq!(source.names(), vec!["failing", "map"]);
    }

    #[tokio::test]
    async fn test_or_else_does_not_fall_back_on_missing_keys() {
        let source = ConfigSource::from_map([("host", "localhost")], None, None)
            .or_else(&ConfigSource::from_map([("port", "8080")], None, None));

        let tree = source.load().await.unwrap();
        assert!(tree.get_path(&Path::from("port")).is_empty());
    }

    #[tokio::test]
    async fn test_all_providers_failing() {
        let source = ConfigSource::new(FailingSource) | ConfigSource::new(FailingSource);
        let error = source.load().await.unwrap_err();
        assert!(error.to_string().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_provider_loaded_once_per_cache() {
        let loads = Arc::new(AtomicUsize::new(0));
        let source = ConfigSource::new(CountingSource {
            loads: Arc::clone(&loads),
        });
        let chained = source.or_else(&ConfigSource::empty());

        let mut cache = ProviderCache::new();
        source.load_cached(&mut cache).await.unwrap();
        chained.load_cached(&mut cache).await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        source.load().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_layered_overrides_individual_keys() {
        let base = ConfigSource::from_map([("host", "localhost"), ("port", "80")], None, None);
        let overlay = ConfigSource::from_map([("port", "8080")], None, None);

        let tree = base
            .layered(&overlay, MergePolicy::KeepLast)
            .load()
            .await
            .unwrap();
        assert_eq!(tree.get_path(&Path::from("host")), PropertyTree::leaf("localhost"));
        assert_eq!(tree.get_path(&Path::from("port")), PropertyTree::leaf("8080"));
    }
}
