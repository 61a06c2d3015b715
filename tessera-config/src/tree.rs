//! In-memory hierarchical representation of configuration data
//!
//! Every source normalizes its input into a [`PropertyTree`]. Trees are
//! immutable once produced; all transforms return new trees.

use crate::path::{Path, Step};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Policy applied when two trees disagree on the same location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The left-hand (earlier) tree wins
    #[default]
    KeepFirst,
    /// The right-hand (later) tree wins
    KeepLast,
}

/// Ordered mapping of unique names to sub-trees
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record<V = String> {
    entries: Vec<(String, PropertyTree<V>)>,
}

impl<V> Record<V> {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyTree<V>> {
        self.entries
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, tree)| tree)
    }

    /// Insert or replace an entry, keeping the original position on replace
    pub fn insert(&mut self, key: impl Into<String>, tree: PropertyTree<V>) -> Option<PropertyTree<V>> {
        let key = key.into();
        match self.entries.iter_mut().find(|(name, _)| *name == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, tree)),
            None => {
                self.entries.push((key, tree));
                None
            }
        }
    }

    /// Sub-tree under `key`, appending an empty entry when absent
    fn entry(&mut self, key: &str) -> &mut PropertyTree<V> {
        let index = match self.entries.iter().position(|(name, _)| name == key) {
            Some(index) => index,
            None => {
                self.entries.push((key.to_string(), PropertyTree::Empty));
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].1
    }

    pub fn remove(&mut self, key: &str) -> Option<PropertyTree<V>> {
        let position = self.entries.iter().position(|(name, _)| name == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyTree<V>)> {
        self.entries.iter().map(|(name, tree)| (name.as_str(), tree))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V> Default for Record<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, K: Into<String>> FromIterator<(K, PropertyTree<V>)> for Record<V> {
    fn from_iter<I: IntoIterator<Item = (K, PropertyTree<V>)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (key, tree) in iter {
            record.insert(key, tree);
        }
        record
    }
}

impl<V> IntoIterator for Record<V> {
    type Item = (String, PropertyTree<V>);
    type IntoIter = std::vec::IntoIter<(String, PropertyTree<V>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Hierarchical key-value(s) data
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PropertyTree<V = String> {
    Leaf(V),
    Record(Record<V>),
    Sequence(Vec<PropertyTree<V>>),
    #[default]
    Empty,
}

impl<V> PropertyTree<V> {
    pub fn leaf(value: impl Into<V>) -> Self {
        PropertyTree::Leaf(value.into())
    }

    pub fn record<K: Into<String>>(entries: impl IntoIterator<Item = (K, PropertyTree<V>)>) -> Self {
        PropertyTree::Record(entries.into_iter().collect())
    }

    pub fn sequence(items: impl IntoIterator<Item = PropertyTree<V>>) -> Self {
        PropertyTree::Sequence(items.into_iter().collect())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, PropertyTree::Empty)
    }

    /// Short description of the node kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyTree::Leaf(_) => "a single value",
            PropertyTree::Record(_) => "an object",
            PropertyTree::Sequence(_) => "a collection",
            PropertyTree::Empty => "nothing",
        }
    }

    /// Descend a single step; `None` when the step does not exist
    pub fn at(&self, step: &Step) -> Option<&PropertyTree<V>> {
        match (step, self) {
            (Step::Unnamed, tree) => Some(tree),
            (Step::Key(name), PropertyTree::Record(record)) => record.get(name),
            (Step::Index(index), PropertyTree::Sequence(items)) => items.get(*index),
            _ => None,
        }
    }

    /// Descend along `path`; `None` when any segment is absent
    pub fn lookup(&self, path: &Path) -> Option<&PropertyTree<V>> {
        path.steps()
            .iter()
            .try_fold(self, |tree, step| tree.at(step))
    }

    /// Structural descent returning [`PropertyTree::Empty`] for absent segments
    pub fn get_path(&self, path: &Path) -> PropertyTree<V>
    where
        V: Clone,
    {
        self.lookup(path).cloned().unwrap_or_default()
    }

    /// Place `tree` under `path`
    pub fn wrap(path: &Path, tree: PropertyTree<V>) -> PropertyTree<V> {
        path.steps().iter().rev().fold(tree, |inner, step| match step {
            Step::Key(name) => PropertyTree::record([(name.clone(), inner)]),
            Step::Index(index) => {
                let mut items: Vec<PropertyTree<V>> =
                    (0..*index).map(|_| PropertyTree::Empty).collect();
                items.push(inner);
                PropertyTree::Sequence(items)
            }
            Step::Unnamed => inner,
        })
    }

    /// Merge two trees; collisions that cannot be combined are settled by `policy`
    pub fn merge(self, other: PropertyTree<V>, policy: MergePolicy) -> PropertyTree<V> {
        let merged: Result<_, std::convert::Infallible> =
            merge_at(self, other, &Path::root(), &mut |path, left, right| {
                log::debug!("Key collision at {} resolved with {:?}", path, policy);
                Ok(match policy {
                    MergePolicy::KeepFirst => left,
                    MergePolicy::KeepLast => right,
                })
            });
        match merged {
            Ok(tree) => tree,
            Err(never) => match never {},
        }
    }

    /// Merge two trees, failing with the colliding path instead of picking a side
    pub fn try_merge(self, other: PropertyTree<V>) -> Result<PropertyTree<V>, Path> {
        merge_at(self, other, &Path::root(), &mut |path, _, _| Err(path.clone()))
    }

    /// Every leaf value with its full path
    pub fn leaves(&self) -> Vec<(Path, &V)> {
        let mut out = Vec::new();
        collect_leaves(self, Path::root(), &mut out);
        out
    }

    pub fn map<U>(self, f: &impl Fn(V) -> U) -> PropertyTree<U> {
        match self {
            PropertyTree::Leaf(value) => PropertyTree::Leaf(f(value)),
            PropertyTree::Record(record) => PropertyTree::Record(
                record
                    .into_iter()
                    .map(|(key, tree)| (key, tree.map(f)))
                    .collect(),
            ),
            PropertyTree::Sequence(items) => {
                PropertyTree::Sequence(items.into_iter().map(|tree| tree.map(f)).collect())
            }
            PropertyTree::Empty => PropertyTree::Empty,
        }
    }

    /// Build a tree from located sub-trees; overlapping entries follow `policy`
    pub fn from_entries(
        entries: impl IntoIterator<Item = (Path, PropertyTree<V>)>,
        policy: MergePolicy,
    ) -> PropertyTree<V> {
        entries
            .into_iter()
            .fold(PropertyTree::Empty, |acc, (path, tree)| {
                acc.merge(PropertyTree::wrap(&path, tree), policy)
            })
    }
}

impl<V: Clone> PropertyTree<V> {
    /// Flatten into a multi-map keyed by delimited paths.
    ///
    /// A sequence of two or more leaves contributes all of its values to one
    /// key; any other sequence contributes indexed keys, so a single-element
    /// list stays distinguishable from a plain value. Empty sequences have no
    /// values and leave no key behind.
    pub fn flatten(&self, key_delimiter: &str) -> BTreeMap<String, Vec<V>> {
        let mut out = BTreeMap::new();
        flatten_into(self, Path::root(), key_delimiter, &mut out);
        out
    }

    /// Rebuild a tree from the output of [`flatten`](Self::flatten).
    ///
    /// A key with a single value becomes a leaf, several values a sequence.
    /// Numeric key segments are sequence indices. Empty sequences do not
    /// survive flattening and come back absent. The first entry wins when two
    /// keys address the same node.
    pub fn unflatten<K: AsRef<str>>(
        entries: impl IntoIterator<Item = (K, Vec<V>)>,
        key_delimiter: Option<char>,
    ) -> PropertyTree<V> {
        let mut tree = PropertyTree::Empty;
        for (key, mut values) in entries {
            let steps: Vec<Step> = Path::from_key(key.as_ref(), key_delimiter)
                .steps()
                .iter()
                .map(|step| match step {
                    Step::Key(name) => name.parse::<usize>().map(Step::Index).unwrap_or_else(|_| step.clone()),
                    other => other.clone(),
                })
                .collect();
            let value = match values.len() {
                0 => continue,
                1 => PropertyTree::Leaf(values.remove(0)),
                _ => PropertyTree::Sequence(values.into_iter().map(PropertyTree::Leaf).collect()),
            };
            if steps.is_empty() {
                continue;
            }
            place(&mut tree, &steps, value);
        }
        tree
    }
}

impl<V: fmt::Display> PropertyTree<V> {
    /// Export as a JSON value; leaves become strings, `Empty` becomes null
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyTree::Leaf(value) => serde_json::Value::String(value.to_string()),
            PropertyTree::Record(record) => serde_json::Value::Object(
                record
                    .iter()
                    .map(|(key, tree)| (key.to_string(), tree.to_json()))
                    .collect(),
            ),
            PropertyTree::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(PropertyTree::to_json).collect())
            }
            PropertyTree::Empty => serde_json::Value::Null,
        }
    }
}

fn merge_at<V, E>(
    left: PropertyTree<V>,
    right: PropertyTree<V>,
    path: &Path,
    on_conflict: &mut impl FnMut(&Path, PropertyTree<V>, PropertyTree<V>) -> Result<PropertyTree<V>, E>,
) -> Result<PropertyTree<V>, E> {
    match (left, right) {
        (PropertyTree::Empty, tree) | (tree, PropertyTree::Empty) => Ok(tree),
        (PropertyTree::Record(mut left), PropertyTree::Record(right)) => {
            for (key, tree) in right {
                let child = path.child(Step::key(key.clone()));
                let merged = match left.remove(&key) {
                    Some(existing) => merge_at(existing, tree, &child, &mut *on_conflict)?,
                    None => tree,
                };
                left.insert(key, merged);
            }
            Ok(PropertyTree::Record(left))
        }
        (left, right) => on_conflict(path, left, right),
    }
}

fn place<V>(tree: &mut PropertyTree<V>, steps: &[Step], value: PropertyTree<V>) {
    let Some((step, rest)) = steps.split_first() else {
        if tree.is_empty() {
            *tree = value;
        }
        return;
    };
    match step {
        Step::Key(name) => {
            if tree.is_empty() {
                *tree = PropertyTree::Record(Record::new());
            }
            if let PropertyTree::Record(record) = tree {
                place(record.entry(name), rest, value);
            }
        }
        Step::Index(index) => {
            if tree.is_empty() {
                *tree = PropertyTree::Sequence(Vec::new());
            }
            if let PropertyTree::Sequence(items) = tree {
                if items.len() <= *index {
                    items.resize_with(index + 1, || PropertyTree::Empty);
                }
                place(&mut items[*index], rest, value);
            }
        }
        Step::Unnamed => place(tree, rest, value),
    }
}

fn collect_leaves<'a, V>(tree: &'a PropertyTree<V>, path: Path, out: &mut Vec<(Path, &'a V)>) {
    match tree {
        PropertyTree::Leaf(value) => out.push((path, value)),
        PropertyTree::Record(record) => {
            for (key, child) in record.iter() {
                collect_leaves(child, path.child(Step::key(key)), out);
            }
        }
        PropertyTree::Sequence(items) => {
            for (index, child) in items.iter().enumerate() {
                collect_leaves(child, path.child(Step::Index(index)), out);
            }
        }
        PropertyTree::Empty => {}
    }
}

fn flatten_into<V: Clone>(
    tree: &PropertyTree<V>,
    path: Path,
    delimiter: &str,
    out: &mut BTreeMap<String, Vec<V>>,
) {
    match tree {
        PropertyTree::Leaf(value) => out
            .entry(path.to_delimited(delimiter))
            .or_default()
            .push(value.clone()),
        PropertyTree::Record(record) => {
            for (key, child) in record.iter() {
                flatten_into(child, path.child(Step::key(key)), delimiter, out);
            }
        }
        PropertyTree::Sequence(items)
            if items.len() > 1 && items.iter().all(|item| matches!(item, PropertyTree::Leaf(_))) =>
        {
            let values: Vec<V> = items
                .iter()
                .filter_map(|item| match item {
                    PropertyTree::Leaf(value) => Some(value.clone()),
                    _ => None,
                })
                .collect();
            if !values.is_empty() {
                out.entry(path.to_delimited(delimiter))
                    .or_default()
                    .extend(values);
            }
        }
        PropertyTree::Sequence(items) => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, path.child(Step::Index(index)), delimiter, out);
            }
        }
        PropertyTree::Empty => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(value: &str) -> PropertyTree {
        PropertyTree::leaf(value)
    }

    #[test]
    fn test_get_path_returns_empty_for_absent_segments() {
        let tree = PropertyTree::record([("db", PropertyTree::record([("url", leaf("pg"))]))]);

        assert_eq!(tree.get_path(&Path::from_key("db.url", Some('.'))), leaf("pg"));
        assert_eq!(
            tree.get_path(&Path::from_key("db.port", Some('.'))),
            PropertyTree::Empty
        );
        assert_eq!(
            tree.get_path(&Path::from_key("db.url.deeper", Some('.'))),
            PropertyTree::Empty
        );
        assert_eq!(
            tree.get_path(&Path::from("db").child(Step::Index(0))),
            PropertyTree::Empty
        );
    }

    #[test]
    fn test_merge_records_recursively() {
        let left = PropertyTree::record([("a", PropertyTree::record([("x", leaf("1"))]))]);
        let right = PropertyTree::record([
            ("a", PropertyTree::record([("y", leaf("2"))])),
            ("b", leaf("3")),
        ]);

        let merged = left.merge(right, MergePolicy::KeepFirst);
        let flat = merged.flatten(".");
        assert_eq!(flat.get("a.x"), Some(&vec!["1".to_string()]));
        assert_eq!(flat.get("a.y"), Some(&vec!["2".to_string()]));
        assert_eq!(flat.get("b"), Some(&vec!["3".to_string()]));
    }

    #[test]
    fn test_merge_policy_on_collision() {
        let first = PropertyTree::record([("port", leaf("1"))]);
        let second = PropertyTree::record([("port", leaf("2"))]);

        let kept = first.clone().merge(second.clone(), MergePolicy::KeepFirst);
        assert_eq!(kept.get_path(&Path::from("port")), leaf("1"));

        let replaced = first.merge(second, MergePolicy::KeepLast);
        assert_eq!(replaced.get_path(&Path::from("port")), leaf("2"));
    }

    #[test]
    fn test_try_merge_reports_collision_path() {
        let first = PropertyTree::record([("db", PropertyTree::record([("url", leaf("a"))]))]);
        let second = PropertyTree::record([("db", PropertyTree::record([("url", leaf("b"))]))]);

        let collision = first.try_merge(second).unwrap_err();
        assert_eq!(collision.to_string(), "db.url");
    }

    #[test]
    fn test_flatten_sequences() {
        let tree = PropertyTree::record([
            ("ports", PropertyTree::sequence([leaf("80"), leaf("443")])),
            (
                "servers",
                PropertyTree::sequence([
                    PropertyTree::record([("host", leaf("a"))]),
                    PropertyTree::record([("host", leaf("b"))]),
                ]),
            ),
        ]);

        let flat = tree.flatten(".");
        assert_eq!(flat["ports"], vec!["80".to_string(), "443".to_string()]);
        assert_eq!(flat["servers.0.host"], vec!["a".to_string()]);
        assert_eq!(flat["servers.1.host"], vec!["b".to_string()]);
    }

    #[test]
    fn test_unflatten_reverses_flatten() {
        let tree = PropertyTree::record([
            ("db", PropertyTree::record([("url", leaf("pg")), ("pool", leaf("5"))])),
            ("hosts", PropertyTree::sequence([leaf("a"), leaf("b")])),
        ]);

        let rebuilt = PropertyTree::unflatten(tree.flatten("."), Some('.'));
        assert_eq!(rebuilt.get_path(&Path::from_key("db.url", Some('.'))), leaf("pg"));
        assert_eq!(
            rebuilt.get_path(&Path::from("hosts")),
            PropertyTree::sequence([leaf("a"), leaf("b")])
        );
    }

    #[test]
    fn test_unflatten_keeps_single_element_lists() {
        let tree = PropertyTree::record([
            ("name", leaf("app")),
            ("hosts", PropertyTree::sequence([leaf("a")])),
            (
                "servers",
                PropertyTree::sequence([
                    PropertyTree::record([("host", leaf("x"))]),
                    PropertyTree::record([("host", leaf("y"))]),
                ]),
            ),
        ]);

        let flat = tree.flatten(".");
        assert_eq!(flat["hosts.0"], vec!["a".to_string()]);

        let rebuilt = PropertyTree::unflatten(flat, Some('.'));
        assert_eq!(rebuilt.get_path(&Path::from("name")), leaf("app"));
        assert_eq!(
            rebuilt.get_path(&Path::from("hosts")),
            PropertyTree::sequence([leaf("a")])
        );
        assert_eq!(
            rebuilt.get_path(&Path::from("servers")),
            tree.get_path(&Path::from("servers"))
        );
    }

    #[test]
    fn test_empty_sequences_do_not_survive_flattening() {
        let tree = PropertyTree::record([
            ("name", leaf("app")),
            ("hosts", PropertyTree::<String>::Sequence(Vec::new())),
        ]);

        let flat = tree.flatten(".");
        assert_eq!(flat.len(), 1);

        let rebuilt = PropertyTree::unflatten(flat, Some('.'));
        assert!(rebuilt.get_path(&Path::from("hosts")).is_empty());
    }

    #[test]
    fn test_from_entries_preserves_insertion_order() {
        let tree = PropertyTree::from_entries(
            [
                (Path::from("zeta"), leaf("1")),
                (Path::from("alpha"), leaf("2")),
            ],
            MergePolicy::KeepFirst,
        );

        match tree {
            PropertyTree::Record(record) => {
                assert_eq!(record.keys().collect::<Vec<_>>(), vec!["zeta", "alpha"]);
            }
            other => panic!("Expected record, got {:?}", other),
        }
    }

    #[test]
    fn test_wrap_with_index_pads_sequence() {
        let tree = PropertyTree::wrap(&Path::from_steps([Step::Index(1)]), leaf("x"));
        assert_eq!(tree, PropertyTree::sequence([PropertyTree::Empty, leaf("x")]));
    }

    #[test]
    fn test_to_json() {
        let tree = PropertyTree::record([
            ("name", leaf("app")),
            ("tags", PropertyTree::sequence([leaf("a"), leaf("b")])),
            ("unset", PropertyTree::Empty),
        ]);

        let json = tree.to_json();
        assert_eq!(json["name"], "app");
        assert_eq!(json["tags"][1], "b");
        assert!(json["unset"].is_null());
    }
}
