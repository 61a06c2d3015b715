//! Command-line arguments
//!
//! Two nesting grammars are accepted and may be mixed:
//!
//! * delimited keys: `--db.url value` with key delimiter `.`
//! * scopes: a bare option such as `--db` followed by options with fewer
//!   dashes opens a scope, so `--db -url=value -user admin` yields `db.url`
//!   and `db.user`. Scopes nest through the dash count
//!   (`---aws --db -url=v` yields `aws.db.url`) and close at the next option
//!   with at least as many dashes.
//!
//! Values are given as `-key=value` or `-key value`. A bare option that does
//! not open a scope is a flag with value `true`. Repeated keys accumulate
//! into a sequence. `--` ends option parsing; positional arguments are
//! ignored.

use super::map::split_values;
use super::PropertySource;
use crate::error::SourceError;
use crate::path::Path;
use crate::tree::{MergePolicy, PropertyTree};
use async_trait::async_trait;

struct Arg<'a> {
    dashes: usize,
    key: &'a str,
    value: Option<&'a str>,
}

fn option(token: &str) -> Option<Arg<'_>> {
    let dashes = token.chars().take_while(|c| *c == '-').count();
    let body = &token[dashes..];
    if dashes == 0 || body.is_empty() || body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    Some(match body.split_once('=') {
        Some((key, value)) => Arg {
            dashes,
            key,
            value: Some(value),
        },
        None => Arg {
            dashes,
            key: body,
            value: None,
        },
    })
}

/// Parse tokens into paths with every value given for them, in first-seen order
pub fn parse_args<T: AsRef<str>>(tokens: &[T], key_delimiter: Option<char>) -> Vec<(Path, Vec<String>)> {
    let mut grouped: Vec<(Path, Vec<String>)> = Vec::new();
    let mut scopes: Vec<(usize, Path)> = Vec::new();
    let mut index = 0;

    while index < tokens.len() {
        let token = tokens[index].as_ref();
        index += 1;

        if token == "--" {
            let rest = tokens.len() - index;
            if rest > 0 {
                log::debug!("Ignoring {} argument(s) after '--'", rest);
            }
            break;
        }

        let Some(current) = option(token) else {
            log::debug!("Ignoring positional argument {:?}", token);
            continue;
        };

        while scopes
            .last()
            .is_some_and(|(dashes, _)| *dashes <= current.dashes)
        {
            scopes.pop();
        }
        let base = scopes.last().map(|(_, path)| path.clone()).unwrap_or_default();
        let path = base.join(&Path::from_key(current.key, key_delimiter));
        if path.is_empty() {
            log::debug!("Ignoring option with empty key {:?}", token);
            continue;
        }

        let value = match current.value {
            Some(value) => value.to_string(),
            None => match tokens.get(index).map(|next| next.as_ref()) {
                Some(next) if next != "--" && option(next).is_none() => {
                    index += 1;
                    next.to_string()
                }
                Some(next) if option(next).is_some_and(|o| o.dashes < current.dashes) => {
                    scopes.push((current.dashes, path));
                    continue;
                }
                _ => "true".to_string(),
            },
        };

        match grouped.iter_mut().find(|(existing, _)| *existing == path) {
            Some((_, values)) => values.push(value),
            None => grouped.push((path, vec![value])),
        }
    }
    grouped
}

/// Build a tree from parsed arguments
pub fn tree_from_args<T: AsRef<str>>(
    tokens: &[T],
    key_delimiter: Option<char>,
    value_delimiter: Option<char>,
) -> PropertyTree {
    PropertyTree::from_entries(
        parse_args(tokens, key_delimiter)
            .into_iter()
            .map(|(path, values)| {
                let tree = match value_delimiter {
                    Some(delimiter) => PropertyTree::Sequence(
                        values
                            .iter()
                            .flat_map(|value| match split_values(value, delimiter) {
                                PropertyTree::Sequence(items) => items,
                                other => vec![other],
                            })
                            .collect(),
                    ),
                    None => {
                        let mut items: Vec<PropertyTree> =
                            values.into_iter().map(PropertyTree::leaf).collect();
                        if items.len() == 1 {
                            items.remove(0)
                        } else {
                            PropertyTree::Sequence(items)
                        }
                    }
                };
                (path, tree)
            }),
        MergePolicy::KeepFirst,
    )
}

/// Arguments captured at construction, parsed at load time
#[derive(Debug, Clone)]
pub struct CommandLineSource {
    tokens: Vec<String>,
    key_delimiter: Option<char>,
    value_delimiter: Option<char>,
}

impl CommandLineSource {
    pub fn new<T: Into<String>>(
        tokens: impl IntoIterator<Item = T>,
        key_delimiter: Option<char>,
        value_delimiter: Option<char>,
    ) -> Self {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            key_delimiter,
            value_delimiter,
        }
    }

    /// Arguments of the current process, program name excluded
    pub fn from_env(key_delimiter: Option<char>, value_delimiter: Option<char>) -> Self {
        Self::new(std::env::args().skip(1), key_delimiter, value_delimiter)
    }
}

#[async_trait]
impl PropertySource for CommandLineSource {
    fn name(&self) -> &str {
        "command line"
    }

    async fn load(&self) -> Result<PropertyTree, SourceError> {
        Ok(tree_from_args(
            &self.tokens,
            self.key_delimiter,
            self.value_delimiter,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(value: &str) -> PropertyTree {
        PropertyTree::leaf(value)
    }

    fn at(tree: &PropertyTree, key: &str) -> PropertyTree {
        tree.get_path(&Path::from_key(key, Some('.')))
    }

    #[test]
    fn test_delimited_and_scoped_grammars_agree() {
        let delimited = tree_from_args(
            &["--conf.key1", "v1", "--conf.key2", "v2", "--key3", "v3"],
            Some('.'),
            None,
        );
        let scoped = tree_from_args(
            &["--conf", "-key1=v1", "--conf", "-key2=v2", "--key3", "v3"],
            None,
            None,
        );

        assert_eq!(at(&delimited, "conf.key1"), leaf("v1"));
        assert_eq!(at(&delimited, "conf.key2"), leaf("v2"));
        assert_eq!(at(&delimited, "key3"), leaf("v3"));
        assert_eq!(delimited, scoped);
    }

    #[test]
    fn test_nested_scopes_by_dash_count() {
        let tree = tree_from_args(
            &["---aws", "--db", "-url=jdbc", "-user", "admin", "--region", "eu"],
            None,
            None,
        );
        assert_eq!(at(&tree, "aws.db.url"), leaf("jdbc"));
        assert_eq!(at(&tree, "aws.db.user"), leaf("admin"));
        assert_eq!(at(&tree, "aws.region"), leaf("eu"));
    }

    #[test]
    fn test_flags_default_to_true() {
        let tree = tree_from_args(&["--verbose", "--port", "80", "--dry-run"], None, None);
        assert_eq!(at(&tree, "verbose"), leaf("true"));
        assert_eq!(at(&tree, "port"), leaf("80"));
        assert_eq!(at(&tree, "dry-run"), leaf("true"));
    }

    #[test]
    fn test_repeated_keys_accumulate() {
        let tree = tree_from_args(&["--host", "a", "--port", "1", "--host", "b"], None, None);
        assert_eq!(at(&tree, "host"), PropertyTree::sequence([leaf("a"), leaf("b")]));
        assert_eq!(at(&tree, "port"), leaf("1"));
    }

    #[test]
    fn test_value_delimiter_splits_every_occurrence() {
        let tree = tree_from_args(&["--ports=1,2", "--ports", "3"], None, Some(','));
        assert_eq!(
            at(&tree, "ports"),
            PropertyTree::sequence([leaf("1"), leaf("2"), leaf("3")])
        );
    }

    #[test]
    fn test_negative_numbers_are_values() {
        let tree = tree_from_args(&["--offset", "-5", "--scale=-1.5"], None, None);
        assert_eq!(at(&tree, "offset"), leaf("-5"));
        assert_eq!(at(&tree, "scale"), leaf("-1.5"));
    }

    #[test]
    fn test_double_dash_ends_parsing() {
        let tree = tree_from_args(&["positional", "--a", "1", "--", "--b", "2"], None, None);
        assert_eq!(at(&tree, "a"), leaf("1"));
        assert!(at(&tree, "b").is_empty());
    }
}
