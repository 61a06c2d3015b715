//! Locations inside a property tree

use std::fmt;

/// A single step of a [`Path`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Step {
    /// Named child of a record
    Key(String),
    /// Positional element of a sequence
    Index(usize),
    /// Stays on the current node
    Unnamed,
}

impl Step {
    pub fn key(name: impl Into<String>) -> Self {
        Step::Key(name.into())
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Key(name) => write!(f, "{}", name),
            Step::Index(index) => write!(f, "[{}]", index),
            Step::Unnamed => write!(f, "<unnamed>"),
        }
    }
}

/// Ordered sequence of steps from the root of a tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path {
    steps: Vec<Step>,
}

impl Path {
    /// The empty path, pointing at the root
    pub fn root() -> Self {
        Self::default()
    }

    pub fn from_steps(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
        }
    }

    /// Build a path from a key, splitting it on `delimiter` when one is given.
    ///
    /// Empty segments are dropped, so `"a..b"` and `".a.b"` both yield `a.b`.
    pub fn from_key(key: &str, delimiter: Option<char>) -> Self {
        match delimiter {
            Some(delimiter) => Self::from_steps(
                key.split(delimiter)
                    .filter(|segment| !segment.is_empty())
                    .map(Step::key),
            ),
            None => Self::from_steps([Step::key(key)]),
        }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// A new path with `step` appended
    pub fn child(&self, step: Step) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { steps }
    }

    /// A new path with every step of `other` appended
    pub fn join(&self, other: &Path) -> Self {
        let mut steps = self.steps.clone();
        steps.extend(other.steps.iter().cloned());
        Self { steps }
    }

    /// Whether `self` is a prefix of `other`, ignoring unnamed steps
    pub fn is_prefix_of(&self, other: &Path) -> bool {
        let mine = self.named_steps();
        let theirs = other.named_steps();
        mine.len() <= theirs.len() && mine.iter().zip(theirs.iter()).all(|(a, b)| a == b)
    }

    /// Render the path with `delimiter` between segments, indices included as numbers
    pub fn to_delimited(&self, delimiter: &str) -> String {
        self.named_steps()
            .iter()
            .map(|step| match step {
                Step::Key(name) => name.clone(),
                Step::Index(index) => index.to_string(),
                Step::Unnamed => String::new(),
            })
            .collect::<Vec<_>>()
            .join(delimiter)
    }

    fn named_steps(&self) -> Vec<&Step> {
        self.steps
            .iter()
            .filter(|step| !matches!(step, Step::Unnamed))
            .collect()
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.steps.is_empty() {
            return write!(f, "<root>");
        }
        let mut first = true;
        for step in &self.steps {
            match step {
                Step::Key(name) => {
                    if !first {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", name)?;
                }
                Step::Index(index) => write!(f, "[{}]", index)?,
                Step::Unnamed => continue,
            }
            first = false;
        }
        Ok(())
    }
}

impl From<&str> for Path {
    fn from(key: &str) -> Self {
        Path::from_key(key, None)
    }
}

impl From<Step> for Path {
    fn from(step: Step) -> Self {
        Path::from_steps([step])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_key_splits_on_delimiter() {
        let path = Path::from_key("south.connection", Some('.'));
        assert_eq!(
            path.steps(),
            &[Step::key("south"), Step::key("connection")]
        );

        let flat = Path::from_key("south.connection", None);
        assert_eq!(flat.len(), 1);
    }

    #[test]
    fn test_empty_segments_are_dropped() {
        let path = Path::from_key(".a..b", Some('.'));
        assert_eq!(path.to_delimited("."), "a.b");
    }

    #[test]
    fn test_display() {
        let path = Path::from("servers")
            .child(Step::Index(2))
            .child(Step::key("host"));
        assert_eq!(path.to_string(), "servers[2].host");
        assert_eq!(Path::root().to_string(), "<root>");
        assert_eq!(path.to_delimited("_"), "servers_2_host");
    }

    #[test]
    fn test_prefix_ignores_unnamed() {
        let prefix = Path::from("db").child(Step::Unnamed);
        let full = Path::from("db").child(Step::key("url"));
        assert!(prefix.is_prefix_of(&full));
        assert!(!full.is_prefix_of(&prefix));
    }
}
