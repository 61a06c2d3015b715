//! Interpretation of descriptors against property trees
//!
//! [`resolve`] is pure: it walks a descriptor over one tree and returns the
//! typed value or every failure it found. [`read`] first materializes the
//! sources attached to the descriptor (all I/O happens there, each provider
//! fetched at most once) and then resolves.

use crate::descriptor::{take, ConfigDescriptor, ConfigType, Either, Node, Value};
use crate::error::{ConfigResult, ReadError};
use crate::path::{Path, Step};
use crate::source::ProviderCache;
use crate::tree::PropertyTree;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// What to do with keys that no descriptor consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownKeysPolicy {
    #[default]
    Ignore,
    /// Report every unconsumed leaf as [`ReadError::UnknownKeys`]
    Reject,
}

/// How [`collect_all`](crate::descriptor::collect_all) treats a sequence
/// whose length differs from the number of descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceLengthPolicy {
    /// Pair up to the shorter of the two
    #[default]
    Truncate,
    /// Fail with a parse error
    Exact,
}

/// Options controlling a read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadOptions {
    pub unknown_keys: UnknownKeysPolicy,
    pub sequence_length: SequenceLengthPolicy,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject unknown keys and mismatched sequence lengths
    pub fn strict() -> Self {
        Self {
            unknown_keys: UnknownKeysPolicy::Reject,
            sequence_length: SequenceLengthPolicy::Exact,
        }
    }

    pub fn with_unknown_keys(mut self, policy: UnknownKeysPolicy) -> Self {
        self.unknown_keys = policy;
        self
    }

    pub fn with_sequence_length(mut self, policy: SequenceLengthPolicy) -> Self {
        self.sequence_length = policy;
        self
    }

    pub fn from_yaml(content: &str) -> ConfigResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }
}

/// Resolve `descriptor` against `tree` with default options
pub fn resolve<A: ConfigType>(descriptor: &ConfigDescriptor<A>, tree: &PropertyTree) -> Result<A, ReadError> {
    resolve_with(descriptor, tree, &ReadOptions::default())
}

/// Resolve `descriptor` against `tree`; attached sources are ignored
pub fn resolve_with<A: ConfigType>(
    descriptor: &ConfigDescriptor<A>,
    tree: &PropertyTree,
    options: &ReadOptions,
) -> Result<A, ReadError> {
    let materialized = HashMap::new();
    let resolver = Resolver::new(options, &materialized);
    let result = resolver.eval(
        descriptor.node(),
        Root::Tree {
            tree,
            attached: true,
        },
        &Path::root(),
    );
    resolver.finish(result, &[tree])
}

/// Materialize the attached sources and resolve with default options
pub async fn read<A: ConfigType>(descriptor: &ConfigDescriptor<A>) -> Result<A, ReadError> {
    read_with(descriptor, &ReadOptions::default()).await
}

/// Materialize the attached sources and resolve
pub async fn read_with<A: ConfigType>(
    descriptor: &ConfigDescriptor<A>,
    options: &ReadOptions,
) -> Result<A, ReadError> {
    let sources = descriptor.sources();
    let mut cache = ProviderCache::new();
    let mut materialized = HashMap::new();

    for source in &sources {
        let loaded = source
            .load_cached(&mut cache)
            .await
            .map_err(|errors| Failure {
                sources: source.names(),
                message: errors
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join("; "),
            });
        if let Err(failure) = &loaded {
            log::warn!(
                "No provider of {} could be loaded: {}",
                source.name(),
                failure.message
            );
        }
        materialized.insert(source.id(), loaded);
    }
    log::debug!(
        "Materialized {} source(s) for {}",
        materialized.len(),
        std::any::type_name::<A>()
    );

    let trees: Vec<&PropertyTree> = sources
        .iter()
        .filter_map(|source| match materialized.get(&source.id()) {
            Some(Ok(tree)) => Some(tree.as_ref()),
            _ => None,
        })
        .collect();
    let resolver = Resolver::new(options, &materialized);
    let result = resolver.eval(
        descriptor.node(),
        Root::Tree {
            tree: &EMPTY,
            attached: false,
        },
        &Path::root(),
    );
    resolver.finish(result, &trees)
}

static EMPTY: PropertyTree = PropertyTree::Empty;

/// Every provider of an attached source failed to load
#[derive(Debug)]
struct Failure {
    sources: Vec<String>,
    message: String,
}

type Materialized = HashMap<usize, Result<Arc<PropertyTree>, Failure>>;

/// Tree a sub-descriptor is resolved against
#[derive(Clone, Copy)]
enum Root<'r> {
    Tree {
        tree: &'r PropertyTree,
        /// Whether the tree came from an input or attached source, as opposed to the empty default
        attached: bool,
    },
    Unavailable(&'r Failure),
}

enum Located<'r> {
    Tree(&'r PropertyTree),
    Unavailable(&'r Failure),
}

fn tree_id(tree: &PropertyTree) -> usize {
    tree as *const PropertyTree as usize
}

struct Resolver<'r> {
    options: &'r ReadOptions,
    materialized: &'r Materialized,
    /// Leaf locations read so far, whichever tree they were read from
    visited: RefCell<Vec<Path>>,
}

impl<'r> Resolver<'r> {
    fn new(options: &'r ReadOptions, materialized: &'r Materialized) -> Self {
        Self {
            options,
            materialized,
            visited: RefCell::new(Vec::new()),
        }
    }

    fn locate(&self, root: Root<'r>, path: &Path) -> Located<'r> {
        match root {
            Root::Tree { tree, .. } => Located::Tree(tree.lookup(path).unwrap_or(&EMPTY)),
            Root::Unavailable(failure) => Located::Unavailable(failure),
        }
    }

    fn visit(&self, path: &Path) {
        if self.options.unknown_keys == UnknownKeysPolicy::Reject {
            self.visited.borrow_mut().push(path.clone());
        }
    }

    fn unavailable(failure: &Failure, path: &Path) -> ReadError {
        ReadError::SourceUnavailable {
            path: path.clone(),
            sources: failure.sources.clone(),
            message: failure.message.clone(),
        }
    }

    fn eval(&self, node: &Node, root: Root<'r>, path: &Path) -> Result<Value, ReadError> {
        match node {
            Node::Primitive {
                type_name, parse, ..
            } => match self.locate(root, path) {
                Located::Unavailable(failure) => Err(Self::unavailable(failure, path)),
                Located::Tree(node) => {
                    self.visit(path);
                    match node {
                        PropertyTree::Empty => Err(ReadError::missing(path.clone())),
                        PropertyTree::Leaf(raw) => {
                            parse(raw.as_str()).map_err(|message| ReadError::parse(path.clone(), message))
                        }
                        other => Err(ReadError::parse(
                            path.clone(),
                            format!("expected a single {} value, found {}", type_name, other.kind()),
                        )),
                    }
                }
            },

            Node::Nested { path: prefix, inner } => self.eval(inner, root, &path.join(prefix)),

            Node::Zip {
                left,
                right,
                combine,
                ..
            } => {
                let left = self.eval(left, root, path);
                let right = self.eval(right, root, path);
                match (left, right) {
                    (Ok(a), Ok(b)) => {
                        combine(a, b).map_err(|message| ReadError::conversion(path.clone(), message))
                    }
                    (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
                    (Err(a), Err(b)) => Err(a.and(b)),
                }
            }

            Node::Optional {
                inner, some, none, ..
            } => match self.eval(inner, root, path) {
                Ok(value) => some(value).map_err(|message| ReadError::conversion(path.clone(), message)),
                Err(error) if error.is_missing_only() => Ok(Arc::clone(none)),
                Err(error) => Err(error),
            },

            Node::Default { inner, value } => match self.eval(inner, root, path) {
                Err(error) if error.is_missing_only() => Ok(Arc::clone(value)),
                other => other,
            },

            Node::OrElse { first, second } => self
                .alternatives(first, second, root, path)
                .map(|either| match either {
                    Either::Left(value) | Either::Right(value) => value,
                }),

            Node::OrElseEither {
                first,
                second,
                left,
                right,
                ..
            } => {
                let tagged = match self.alternatives(first, second, root, path)? {
                    Either::Left(value) => left(value),
                    Either::Right(value) => right(value),
                };
                tagged.map_err(|message| ReadError::conversion(path.clone(), message))
            }

            Node::Sequence { element, collect, .. } => match self.locate(root, path) {
                Located::Unavailable(failure) => Err(Self::unavailable(failure, path)),
                Located::Tree(node) => match node {
                    PropertyTree::Empty => Err(ReadError::missing(path.clone())),
                    PropertyTree::Sequence(items) => {
                        let values = self.all(
                            (0..items.len()).map(|index| (element, path.child(Step::Index(index)))),
                            root,
                        )?;
                        collect(values).map_err(|message| ReadError::conversion(path.clone(), message))
                    }
                    other => Err(ReadError::parse(
                        path.clone(),
                        format!("expected a sequence, found {}", other.kind()),
                    )),
                },
            },

            Node::Map { element, collect, .. } => match self.locate(root, path) {
                Located::Unavailable(failure) => Err(Self::unavailable(failure, path)),
                Located::Tree(node) => match node {
                    PropertyTree::Empty => Err(ReadError::missing(path.clone())),
                    PropertyTree::Record(record) => {
                        let keys: Vec<&str> = record.keys().collect();
                        let values = self.all(
                            keys.iter().map(|key| (element, path.child(Step::key(*key)))),
                            root,
                        )?;
                        let entries: Vec<(String, Value)> = keys
                            .into_iter()
                            .map(str::to_string)
                            .zip(values)
                            .collect();
                        collect(entries).map_err(|message| ReadError::conversion(path.clone(), message))
                    }
                    other => Err(ReadError::parse(
                        path.clone(),
                        format!("expected an object, found {}", other.kind()),
                    )),
                },
            },

            Node::CollectAll { items, collect, .. } => {
                let located = match self.locate(root, path) {
                    Located::Tree(PropertyTree::Sequence(elements)) => Some(elements.len()),
                    _ => None,
                };
                let values = match located {
                    Some(length) => {
                        if length != items.len()
                            && self.options.sequence_length == SequenceLengthPolicy::Exact
                        {
                            return Err(ReadError::parse(
                                path.clone(),
                                format!("expected {} elements, found {}", items.len(), length),
                            ));
                        }
                        self.all(
                            items
                                .iter()
                                .take(length)
                                .enumerate()
                                .map(|(index, item)| (item, path.child(Step::Index(index)))),
                            root,
                        )?
                    }
                    None => self.all(items.iter().map(|item| (item, path.clone())), root)?,
                };
                collect(values).map_err(|message| ReadError::conversion(path.clone(), message))
            }

            Node::Transform { inner, to, .. } => {
                let value = self.eval(inner, root, path)?;
                to(&value).map_err(|message| ReadError::conversion(path.clone(), message))
            }

            Node::Sourced { inner, source } => match self.materialized.get(&source.id()) {
                None => self.eval(inner, root, path),
                Some(Ok(tree)) => self.eval(
                    inner,
                    Root::Tree {
                        tree: tree.as_ref(),
                        attached: true,
                    },
                    path,
                ),
                Some(Err(failure)) => match root {
                    Root::Tree { attached: true, .. } => self.eval(inner, root, path),
                    _ => self.eval(inner, Root::Unavailable(failure), path),
                },
            },

            Node::Described { inner, doc } => self.eval(inner, root, path).map_err(|e| e.with_docs(doc)),
        }
    }

    /// Resolve `first`, falling back to `second`; both failures are kept
    fn alternatives(
        &self,
        first: &Node,
        second: &Node,
        root: Root<'r>,
        path: &Path,
    ) -> Result<Either<Value, Value>, ReadError> {
        let mark = self.visited.borrow().len();
        match self.eval(first, root, path) {
            Ok(value) => Ok(Either::Left(value)),
            Err(first_error) => {
                self.visited.borrow_mut().truncate(mark);
                match self.eval(second, root, path) {
                    Ok(value) => Ok(Either::Right(value)),
                    Err(second_error) => Err(first_error.or(second_error)),
                }
            }
        }
    }

    /// Resolve every `(node, path)` pair, accumulating all failures
    fn all<'n>(
        &self,
        items: impl Iterator<Item = (&'n Arc<Node>, Path)>,
        root: Root<'r>,
    ) -> Result<Vec<Value>, ReadError> {
        let mut values = Vec::new();
        let mut errors = Vec::new();
        for (node, path) in items {
            match self.eval(node, root, &path) {
                Ok(value) => values.push(value),
                Err(error) => errors.push(error),
            }
        }
        match ReadError::all(errors) {
            Some(error) => Err(error),
            None => Ok(values),
        }
    }

    /// Leaves of the given trees at paths no descriptor read
    ///
    /// A path read from a higher-priority source also covers the same path in
    /// every fallback tree.
    fn unknown_keys(&self, trees: &[&PropertyTree]) -> Vec<Path> {
        let visited = self.visited.borrow();
        let mut unknown = Vec::new();
        let mut seen = Vec::new();
        for tree in trees {
            let id = tree_id(tree);
            if seen.contains(&id) {
                continue;
            }
            seen.push(id);
            for (path, _) in tree.leaves() {
                let consumed = visited.iter().any(|read| read.is_prefix_of(&path));
                if !consumed && !unknown.contains(&path) {
                    unknown.push(path);
                }
            }
        }
        unknown
    }

    fn finish<A: ConfigType>(
        &self,
        result: Result<Value, ReadError>,
        trees: &[&PropertyTree],
    ) -> Result<A, ReadError> {
        let result = if self.options.unknown_keys == UnknownKeysPolicy::Reject {
            let keys = self.unknown_keys(trees);
            match (result, keys.is_empty()) {
                (result, true) => result,
                (Ok(_), false) => Err(ReadError::UnknownKeys { keys }),
                (Err(error), false) => Err(error.and(ReadError::UnknownKeys { keys })),
            }
        } else {
            result
        };

        match result {
            Ok(value) => take::<A>(value).map_err(|message| ReadError::conversion(Path::root(), message)),
            Err(error) => {
                log::debug!(
                    "Reading {} failed with {} error(s)",
                    std::any::type_name::<A>(),
                    error.len()
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        collect_all, int, list, map, nested, port, sequence, string, value, Either,
    };
    use crate::error::ReadErrorKind;
    use crate::source::map::tree_from_pairs;
    use crate::source::ConfigSource;
    use std::collections::BTreeMap;

    fn flat(entries: &[(&str, &str)], key_delimiter: Option<char>, value_delimiter: Option<char>) -> PropertyTree {
        tree_from_pairs(
            entries.iter().map(|(k, v)| (k.to_string(), v.to_string())),
            key_delimiter,
            value_delimiter,
        )
    }

    fn kinds(error: &ReadError) -> Vec<ReadErrorKind> {
        error.leaves().iter().filter_map(|leaf| leaf.kind()).collect()
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let descriptor = string("host").zip(int("port").optional());
        let tree = flat(&[("host", "localhost"), ("port", "bad")], None, None);

        let first = resolve(&descriptor, &tree);
        let second = resolve(&descriptor, &tree);
        assert_eq!(first, second);
    }

    #[test]
    fn test_zip_reports_every_missing_field() {
        let descriptor = string("host").zip(int("port"));
        let error = resolve(&descriptor, &PropertyTree::Empty).unwrap_err();

        match &error {
            ReadError::And(errors) => assert_eq!(errors.len(), 2),
            other => panic!("Expected And, got {:?}", other),
        }
        let paths: Vec<String> = error.paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["host", "port"]);
    }

    #[test]
    fn test_optional_distinguishes_missing_from_malformed() {
        let descriptor = int("X").optional();

        assert_eq!(resolve(&descriptor, &PropertyTree::Empty), Ok(None));
        assert_eq!(resolve(&descriptor, &flat(&[("X", "7")], None, None)), Ok(Some(7)));

        let error = resolve(&descriptor, &flat(&[("X", "notanumber")], None, None)).unwrap_err();
        assert_eq!(error.kind(), Some(ReadErrorKind::ParseError));
    }

    #[test]
    fn test_optional_product_with_one_field_absent_is_none() {
        let descriptor = string("host").zip(int("port")).optional();
        let tree = flat(&[("host", "localhost")], None, None);
        assert_eq!(resolve(&descriptor, &tree), Ok(None));
    }

    #[test]
    fn test_default_only_replaces_missing_values() {
        let descriptor = int("workers").with_default(4);
        assert_eq!(resolve(&descriptor, &PropertyTree::Empty), Ok(4));
        assert_eq!(resolve(&descriptor, &flat(&[("workers", "8")], None, None)), Ok(8));
        assert!(resolve(&descriptor, &flat(&[("workers", "many")], None, None)).is_err());
    }

    #[test]
    fn test_list_from_value_delimiter() {
        let descriptor = list("PORT", value::<i32>());
        let tree = flat(&[("PORT", "1222,2221")], None, Some(','));
        assert_eq!(resolve(&descriptor, &tree), Ok(vec![1222, 2221]));
    }

    #[test]
    fn test_list_against_single_value_is_a_parse_error() {
        let descriptor = list("PORT", value::<i32>());
        let error = resolve(&descriptor, &flat(&[("PORT", "1222")], None, None)).unwrap_err();
        assert_eq!(error.kind(), Some(ReadErrorKind::ParseError));
    }

    #[test]
    fn test_list_aggregates_element_failures() {
        let descriptor = list("ports", value::<u16>());
        let tree = flat(&[("ports", "80,x,70000")], None, Some(','));
        let error = resolve(&descriptor, &tree).unwrap_err();

        let paths: Vec<String> = error.paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(paths, vec!["ports[1]", "ports[2]"]);
    }

    #[test]
    fn test_product_of_three_fields() {
        let descriptor = string("LDAP").zip(int("PORT")).zip(string("DB_URL"));
        let tree = flat(
            &[("LDAP", "xyz"), ("PORT", "1222"), ("DB_URL", "postgres")],
            None,
            None,
        );
        assert_eq!(
            resolve(&descriptor, &tree),
            Ok((("xyz".to_string(), 1222), "postgres".to_string()))
        );
    }

    #[test]
    fn test_nested_records_resolve_independently() {
        let connection = || string("connection").zip(port("port"));
        let descriptor = nested("south", connection()).zip(nested("east", connection()));
        let tree = flat(
            &[
                ("south.connection", "abc.com"),
                ("south.port", "8111"),
                ("east.connection", "xyz.com"),
                ("east.port", "8888"),
            ],
            Some('.'),
            None,
        );

        let (south, east) = resolve(&descriptor, &tree).unwrap();
        assert_eq!(south, ("abc.com".to_string(), 8111));
        assert_eq!(east, ("xyz.com".to_string(), 8888));
    }

    #[test]
    fn test_scalar_against_sequence_never_takes_first_element() {
        let tree = flat(&[("hosts", "a,b")], None, Some(','));
        let error = resolve(&string("hosts"), &tree).unwrap_err();
        assert_eq!(error.kind(), Some(ReadErrorKind::ParseError));

        let single = flat(&[("host", "a")], None, Some(','));
        assert!(resolve(&string("host"), &single).is_err());
    }

    #[test]
    fn test_or_else_reports_both_attempts() {
        let descriptor = int("port").or_else(int("PORT"));
        assert_eq!(resolve(&descriptor, &flat(&[("PORT", "80")], None, None)), Ok(80));

        let error = resolve(&descriptor, &flat(&[("port", "x")], None, None)).unwrap_err();
        match &error {
            ReadError::Or(errors) => assert_eq!(errors.len(), 2),
            other => panic!("Expected Or, got {:?}", other),
        }
        assert_eq!(
            kinds(&error),
            vec![ReadErrorKind::ParseError, ReadErrorKind::MissingValue]
        );
    }

    #[test]
    fn test_or_else_either_tags_the_branch() {
        let descriptor = int("timeout").or_else_either(string("timeout"));
        assert_eq!(
            resolve(&descriptor, &flat(&[("timeout", "30")], None, None)),
            Ok(Either::Left(30))
        );
        assert_eq!(
            resolve(&descriptor, &flat(&[("timeout", "forever")], None, None)),
            Ok(Either::Right("forever".to_string()))
        );
    }

    #[test]
    fn test_transform_failure_is_a_conversion_error() {
        let descriptor = int("percent").transform_or_fail(
            |value| {
                if (0..=100).contains(&value) {
                    Ok(value as u8)
                } else {
                    Err(format!("{} is out of range", value))
                }
            },
            |value: &u8| Ok::<i32, String>(i32::from(*value)),
        );

        assert_eq!(resolve(&descriptor, &flat(&[("percent", "42")], None, None)), Ok(42u8));
        let error = resolve(&descriptor, &flat(&[("percent", "420")], None, None)).unwrap_err();
        assert_eq!(error.kind(), Some(ReadErrorKind::Conversion));
        assert!(error.to_string().contains("420 is out of range"));
    }

    #[test]
    fn test_collect_all_pairs_sequence_elements() {
        let descriptor = nested("pair", collect_all([value::<i32>(), value::<i32>()]));
        let tree = flat(&[("pair", "1,2,3")], None, Some(','));

        assert_eq!(resolve(&descriptor, &tree), Ok(vec![1, 2]));

        let strict = ReadOptions::new().with_sequence_length(SequenceLengthPolicy::Exact);
        let error = resolve_with(&descriptor, &tree, &strict).unwrap_err();
        assert_eq!(error.kind(), Some(ReadErrorKind::ParseError));
    }

    #[test]
    fn test_collect_all_over_fields() {
        let descriptor = collect_all([string("a"), string("b"), string("c")]);
        let error = resolve(&descriptor, &flat(&[("b", "2")], None, None)).unwrap_err();
        assert_eq!(error.len(), 2);

        let tree = flat(&[("a", "1"), ("b", "2"), ("c", "3")], None, None);
        assert_eq!(
            resolve(&descriptor, &tree),
            Ok(vec!["1".to_string(), "2".to_string(), "3".to_string()])
        );
    }

    #[test]
    fn test_map_reads_every_entry() {
        let descriptor = map("limits", value::<u32>());
        let tree = flat(&[("limits.cpu", "2"), ("limits.memory", "512")], Some('.'), None);

        let expected: BTreeMap<String, u32> =
            [("cpu".to_string(), 2), ("memory".to_string(), 512)].into_iter().collect();
        assert_eq!(resolve(&descriptor, &tree), Ok(expected));
    }

    #[test]
    fn test_sequence_of_records() {
        let server = string("host").zip(port("port"));
        let descriptor = nested("servers", sequence(server));
        let tree = PropertyTree::record([(
            "servers",
            PropertyTree::sequence([
                PropertyTree::record([("host", PropertyTree::leaf("a")), ("port", PropertyTree::leaf("1"))]),
                PropertyTree::record([("host", PropertyTree::leaf("b"))]),
            ]),
        )]);

        let error = resolve(&descriptor, &tree).unwrap_err();
        assert_eq!(error.paths()[0].to_string(), "servers[1].port");
    }

    #[test]
    fn test_descriptions_are_reported_with_missing_values() {
        let descriptor = port("port").describe("HTTP listener port");
        let error = resolve(&descriptor, &PropertyTree::Empty).unwrap_err();
        assert_eq!(error.to_string(), "Missing value at port (HTTP listener port)");
    }

    #[test]
    fn test_unknown_keys_are_rejected_in_strict_mode() {
        let descriptor = string("host").zip(int("port").optional());
        let tree = flat(&[("host", "a"), ("hots", "typo")], None, None);

        assert!(resolve(&descriptor, &tree).is_ok());

        let options = ReadOptions::new().with_unknown_keys(UnknownKeysPolicy::Reject);
        match resolve_with(&descriptor, &tree, &options) {
            Err(ReadError::UnknownKeys { keys }) => assert_eq!(keys, vec![Path::from("hots")]),
            other => panic!("Expected unknown keys, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_keys_are_combined_with_field_errors() {
        let descriptor = int("port");
        let tree = flat(&[("port", "x"), ("extra", "1")], None, None);
        let error = resolve_with(&descriptor, &tree, &ReadOptions::strict()).unwrap_err();
        assert_eq!(
            kinds(&error),
            vec![ReadErrorKind::ParseError, ReadErrorKind::UnknownKeys]
        );
    }

    #[test]
    fn test_read_options_from_yaml() {
        let options = ReadOptions::from_yaml("unknown_keys: reject\n").unwrap();
        assert_eq!(options.unknown_keys, UnknownKeysPolicy::Reject);
        assert_eq!(options.sequence_length, SequenceLengthPolicy::Truncate);

        assert!(ReadOptions::from_yaml("unknown_keys: maybe\n").is_err());
    }

    #[tokio::test]
    async fn test_read_from_attached_sources() {
        let descriptor = string("host")
            .zip(port("port"))
            .from(ConfigSource::from_map([("host", "localhost"), ("port", "8080")], None, None));

        assert_eq!(descriptor.read().await, Ok(("localhost".to_string(), 8080)));
    }

    #[tokio::test]
    async fn test_innermost_source_has_priority() {
        let inner = ConfigSource::from_map([("port", "1")], None, None);
        let outer = ConfigSource::from_map([("port", "2"), ("host", "h")], None, None);

        let descriptor = port("port").from(inner).zip(string("host")).from(outer);
        assert_eq!(descriptor.read().await, Ok((1, "h".to_string())));
    }

    #[tokio::test]
    async fn test_strict_read_accepts_keys_shadowed_by_inner_source() {
        let inner = ConfigSource::from_map([("port", "1")], None, None);
        let outer = ConfigSource::from_map([("port", "2"), ("host", "h")], None, None);

        let descriptor = port("port").from(inner).zip(string("host")).from(outer);
        let strict = ReadOptions::new().with_unknown_keys(UnknownKeysPolicy::Reject);
        assert_eq!(read_with(&descriptor, &strict).await, Ok((1, "h".to_string())));
    }

    #[tokio::test]
    async fn test_unknown_keys_follow_source_order() {
        let inner = ConfigSource::from_map([("port", "1"), ("alpha", "x")], None, None);
        let outer = ConfigSource::from_map([("host", "h"), ("zone", "y")], None, None);

        let descriptor = port("port").from(inner).zip(string("host")).from(outer);
        let strict = ReadOptions::new().with_unknown_keys(UnknownKeysPolicy::Reject);
        for _ in 0..3 {
            match read_with(&descriptor, &strict).await {
                Err(ReadError::UnknownKeys { keys }) => assert_eq!(
                    keys.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
                    vec!["zone", "alpha"]
                ),
                other => panic!("Expected unknown keys, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_outer_source_used_when_inner_fails_to_load() {
        let broken = ConfigSource::from_json_file("/nonexistent/tessera.json");
        let fallback = ConfigSource::from_map([("port", "2")], None, None);

        let descriptor = port("port").from(broken.clone()).from(fallback);
        assert_eq!(descriptor.read().await, Ok(2));

        let error = port("port").from(broken).read().await.unwrap_err();
        assert_eq!(error.kind(), Some(ReadErrorKind::SourceUnavailable));
    }

    #[tokio::test]
    async fn test_read_without_sources_reports_missing_values() {
        let error = string("host").read().await.unwrap_err();
        assert_eq!(error.kind(), Some(ReadErrorKind::MissingValue));
    }

    #[tokio::test]
    async fn test_resolve_ignores_attached_sources() {
        let descriptor = string("host").from(ConfigSource::from_map([("host", "a")], None, None));
        let tree = flat(&[("host", "b")], None, None);
        assert_eq!(resolve(&descriptor, &tree), Ok("b".to_string()));
        assert!(descriptor.unsourced().read().await.is_err());
    }

    #[tokio::test]
    async fn test_command_line_grammars_resolve_identically() {
        let descriptor = nested("conf", string("key1").zip(string("key2"))).zip(string("key3"));

        let delimited = ConfigSource::from_command_line_args(
            ["--conf.key1", "v1", "--conf.key2", "v2", "--key3", "v3"],
            Some('.'),
            None,
        );
        let scoped = ConfigSource::from_command_line_args(
            ["--conf", "-key1=v1", "--conf", "-key2=v2", "--key3", "v3"],
            None,
            None,
        );

        let expected = (("v1".to_string(), "v2".to_string()), "v3".to_string());
        assert_eq!(delimited.read(&descriptor).await, Ok(expected.clone()));
        assert_eq!(scoped.read(&descriptor).await, Ok(expected));
    }

    #[tokio::test]
    async fn test_strict_read_checks_materialized_trees() {
        let source = ConfigSource::from_yaml_str("host: a\nport: 80\ndebug: true\n");
        let descriptor = string("host").zip(port("port")).from(source);

        let error = read_with(&descriptor, &ReadOptions::strict()).await.unwrap_err();
        assert_eq!(error.paths()[0].to_string(), "debug");
    }
}
