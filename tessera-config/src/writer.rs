//! Turning typed values back into property trees
//!
//! The writer walks the same descriptor the resolver does, in reverse: a
//! value written with a descriptor resolves back to an equal value with that
//! descriptor.

use crate::descriptor::{boxed, ConfigDescriptor, ConfigType, Either, Node, Value};
use crate::error::WriteError;
use crate::path::{Path, Step};
use crate::tree::PropertyTree;
use std::collections::BTreeMap;

/// Write `value` into a tree shaped by `descriptor`
pub fn write<A: ConfigType>(descriptor: &ConfigDescriptor<A>, value: &A) -> Result<PropertyTree, WriteError> {
    write_node(descriptor.node(), &boxed(value.clone()), &Path::root())
}

/// Write `value` and flatten the tree into delimited keys
pub fn write_flat<A: ConfigType>(
    descriptor: &ConfigDescriptor<A>,
    value: &A,
    key_delimiter: &str,
) -> Result<BTreeMap<String, Vec<String>>, WriteError> {
    Ok(write(descriptor, value)?.flatten(key_delimiter))
}

fn conversion(path: &Path, message: String) -> WriteError {
    WriteError::Conversion {
        path: path.clone(),
        message,
    }
}

fn merge(left: PropertyTree, right: PropertyTree, path: &Path) -> Result<PropertyTree, WriteError> {
    left.try_merge(right).map_err(|collision| WriteError::Collision {
        path: path.join(&collision),
    })
}

/// Tree for `value` relative to the current location `path`
fn write_node(node: &Node, value: &Value, path: &Path) -> Result<PropertyTree, WriteError> {
    match node {
        Node::Primitive { print, .. } => print(value)
            .map(PropertyTree::Leaf)
            .map_err(|message| conversion(path, message)),

        Node::Nested { path: prefix, inner } => {
            let tree = write_node(inner, value, &path.join(prefix))?;
            Ok(PropertyTree::wrap(prefix, tree))
        }

        Node::Zip {
            left, right, split, ..
        } => {
            let (a, b) = split(value).map_err(|message| conversion(path, message))?;
            let left = write_node(left, &a, path)?;
            let right = write_node(right, &b, path)?;
            merge(left, right, path)
        }

        Node::Optional { inner, unwrap, .. } => {
            match unwrap(value).map_err(|message| conversion(path, message))? {
                Some(inner_value) => write_node(inner, &inner_value, path),
                None => Ok(PropertyTree::Empty),
            }
        }

        Node::Default { inner, .. }
        | Node::Sourced { inner, .. }
        | Node::Described { inner, .. } => write_node(inner, value, path),

        Node::OrElse { first, second } => match write_node(first, value, path) {
            Ok(tree) => Ok(tree),
            Err(error) => write_node(second, value, path).map_err(|_| error),
        },

        Node::OrElseEither {
            first, second, split, ..
        } => match split(value).map_err(|message| conversion(path, message))? {
            Either::Left(left) => write_node(first, &left, path),
            Either::Right(right) => write_node(second, &right, path),
        },

        Node::Sequence {
            element, uncollect, ..
        } => {
            let values = uncollect(value).map_err(|message| conversion(path, message))?;
            values
                .iter()
                .enumerate()
                .map(|(index, item)| write_node(element, item, &path.child(Step::Index(index))))
                .collect::<Result<Vec<_>, _>>()
                .map(PropertyTree::Sequence)
        }

        Node::Map {
            element, uncollect, ..
        } => {
            let entries = uncollect(value).map_err(|message| conversion(path, message))?;
            let mut record = Vec::with_capacity(entries.len());
            for (key, item) in entries {
                let tree = write_node(element, &item, &path.child(Step::key(key.as_str())))?;
                record.push((key, tree));
            }
            Ok(PropertyTree::record(record))
        }

        Node::CollectAll {
            items, uncollect, ..
        } => {
            let values = uncollect(value).map_err(|message| conversion(path, message))?;
            if values.len() != items.len() {
                return Err(conversion(
                    path,
                    format!("expected {} values, found {}", items.len(), values.len()),
                ));
            }
            let trees = items
                .iter()
                .zip(values.iter())
                .enumerate()
                .map(|(index, (item, value))| write_node(item, value, &path.child(Step::Index(index))))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(PropertyTree::Sequence(trees))
        }

        Node::Transform { inner, from, .. } => {
            let raw = from(value).map_err(|message| conversion(path, message))?;
            write_node(inner, &raw, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{
        boolean, collect_all, duration, int, list, map, nested, port, string, value,
    };
    use crate::resolver::resolve;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Database {
        url: String,
        pool: Option<i32>,
        timeout: Duration,
    }

    fn database() -> ConfigDescriptor<Database> {
        nested(
            "db",
            string("url")
                .zip(int("pool").optional())
                .zip(duration("timeout").with_default(Duration::from_secs(30))),
        )
        .transform(
            |((url, pool), timeout)| Database { url, pool, timeout },
            |db: &Database| ((db.url.clone(), db.pool), db.timeout),
        )
    }

    #[test]
    fn test_round_trip_through_tree() {
        let descriptor = database()
            .zip(list("hosts", value::<String>()))
            .zip(map("limits", value::<u32>()));
        let value = (
            (
                Database {
                    url: "postgres://localhost/app".to_string(),
                    pool: None,
                    timeout: Duration::from_secs(90),
                },
                vec!["a".to_string(), "b".to_string()],
            ),
            [("cpu".to_string(), 2)].into_iter().collect(),
        );

        let tree = write(&descriptor, &value).unwrap();
        assert_eq!(resolve(&descriptor, &tree), Ok(value));
    }

    #[test]
    fn test_write_flat() {
        let descriptor = string("host").zip(port("port")).zip(boolean("debug"));
        let flat = write_flat(&descriptor, &(("localhost".to_string(), 8080), false), ".").unwrap();

        assert_eq!(flat["host"], vec!["localhost".to_string()]);
        assert_eq!(flat["port"], vec!["8080".to_string()]);
        assert_eq!(flat["debug"], vec!["false".to_string()]);
    }

    #[test]
    fn test_flat_lists_read_back_after_unflatten() {
        let hosts = list("hosts", value::<String>());
        for written in [vec!["a".to_string()], vec!["a".to_string(), "b".to_string()]] {
            let flat = write_flat(&hosts, &written, ".").unwrap();
            let tree = PropertyTree::unflatten(flat, Some('.'));
            assert_eq!(resolve(&hosts, &tree), Ok(written));
        }

        let flat = write_flat(&hosts, &Vec::new(), ".").unwrap();
        assert!(flat.is_empty());
        let defaulted = hosts.with_default(Vec::new());
        assert_eq!(resolve(&defaulted, &PropertyTree::unflatten(flat, Some('.'))), Ok(Vec::new()));
    }

    #[test]
    fn test_optional_none_writes_nothing() {
        let descriptor = string("host").zip(int("port").optional());
        let tree = write(&descriptor, &("h".to_string(), None)).unwrap();
        assert_eq!(tree, PropertyTree::record([("host", PropertyTree::leaf("h"))]));
    }

    #[test]
    fn test_overlapping_fields_collide() {
        let descriptor = string("host").zip(string("host"));
        let error = write(&descriptor, &("a".to_string(), "b".to_string())).unwrap_err();
        assert_eq!(
            error,
            WriteError::Collision {
                path: Path::from("host")
            }
        );
    }

    #[test]
    fn test_or_else_writes_first_accepting_branch() {
        let even = int("n").validate("must be even", |n| n % 2 == 0);
        let descriptor = even.transform_or_fail(
            Ok::<i32, String>,
            |n: &i32| if n % 2 == 0 { Ok(*n) } else { Err("odd".to_string()) },
        )
        .or_else(int("m"));

        let tree = write(&descriptor, &3).unwrap();
        assert_eq!(tree, PropertyTree::record([("m", PropertyTree::leaf("3"))]));

        let tree = write(&descriptor, &4).unwrap();
        assert_eq!(tree, PropertyTree::record([("n", PropertyTree::leaf("4"))]));
    }

    #[test]
    fn test_collect_all_shapes() {
        let positional = nested("pair", collect_all([value::<i32>(), value::<i32>()]));
        let tree = write(&positional, &vec![1, 2]).unwrap();
        assert_eq!(resolve(&positional, &tree), Ok(vec![1, 2]));

        let fields = collect_all([string("a"), string("b")]);
        let written = vec!["x".to_string(), "y".to_string()];
        let tree = write(&fields, &written).unwrap();
        assert_eq!(
            tree.get_path(&Path::from_steps([Step::Index(1), Step::key("b")])),
            PropertyTree::leaf("y")
        );
        assert_eq!(resolve(&fields, &tree), Ok(written));

        assert!(write(&fields, &vec!["only".to_string()]).is_err());
    }

    #[test]
    fn test_collect_all_of_records_writes_a_sequence() {
        let server = || string("host").zip(port("port"));
        let servers = nested("servers", collect_all([server(), server()]));
        let value = vec![("a".to_string(), 1), ("b".to_string(), 2)];

        let tree = write(&servers, &value).unwrap();
        assert_eq!(
            tree.get_path(&Path::from("servers")),
            PropertyTree::sequence([
                PropertyTree::record([("host", PropertyTree::leaf("a")), ("port", PropertyTree::leaf("1"))]),
                PropertyTree::record([("host", PropertyTree::leaf("b")), ("port", PropertyTree::leaf("2"))]),
            ])
        );
        assert_eq!(resolve(&servers, &tree), Ok(value));
    }
}
