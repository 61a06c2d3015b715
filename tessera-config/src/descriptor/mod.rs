//! Combinators describing the shape of a configuration
//!
//! A [`ConfigDescriptor<A>`] is an immutable description of where and how a
//! value of type `A` is read. Internally it is a tree of untyped nodes over
//! type-erased values; the typed surface guarantees that every node only ever
//! sees the values it was built for. Descriptors are cheap to clone and safe
//! to share between threads and concurrent reads.
//!
//! ```
//! use tessera_config::descriptor::{int, nested, string};
//! use tessera_config::{resolve, PropertyTree};
//!
//! let connection = nested("south", string("connection").zip(int("port")));
//! let tree = PropertyTree::record([(
//!     "south",
//!     PropertyTree::record([
//!         ("connection", PropertyTree::leaf("abc.com")),
//!         ("port", PropertyTree::leaf("8111")),
//!     ]),
//! )]);
//!
//! assert_eq!(resolve(&connection, &tree).unwrap(), ("abc.com".to_string(), 8111));
//! ```

pub mod primitive;

use crate::error::{ReadError, WriteError};
use crate::path::{Path, Step};
use crate::source::ConfigSource;
use crate::tree::PropertyTree;
use derivative::Derivative;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub use primitive::Primitive;

/// Bound shared by every type a descriptor can produce
pub trait ConfigType: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> ConfigType for T {}

/// Factory interface for types that know their own descriptor
///
/// Derivation tooling targets this trait; hand-written impls are equally valid.
pub trait Configurable: ConfigType {
    fn descriptor() -> ConfigDescriptor<Self>;
}

/// Descriptor of a [`Configurable`] type
pub fn descriptor<T: Configurable>() -> ConfigDescriptor<T> {
    T::descriptor()
}

/// Tagged result of [`ConfigDescriptor::or_else_either`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Either<L, R> {
    Left(L),
    Right(R),
}

pub(crate) type Value = Arc<dyn Any + Send + Sync>;
pub(crate) type ParseFn = Arc<dyn Fn(&str) -> Result<Value, String> + Send + Sync>;
pub(crate) type PrintFn = Arc<dyn Fn(&Value) -> Result<String, String> + Send + Sync>;
pub(crate) type MapFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;
pub(crate) type WrapFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;
pub(crate) type CombineFn = Arc<dyn Fn(Value, Value) -> Result<Value, String> + Send + Sync>;
pub(crate) type SplitFn = Arc<dyn Fn(&Value) -> Result<(Value, Value), String> + Send + Sync>;
pub(crate) type UnwrapFn = Arc<dyn Fn(&Value) -> Result<Option<Value>, String> + Send + Sync>;
pub(crate) type EitherFn = Arc<dyn Fn(&Value) -> Result<Either<Value, Value>, String> + Send + Sync>;
pub(crate) type CollectFn = Arc<dyn Fn(Vec<Value>) -> Result<Value, String> + Send + Sync>;
pub(crate) type UncollectFn = Arc<dyn Fn(&Value) -> Result<Vec<Value>, String> + Send + Sync>;
pub(crate) type CollectMapFn =
    Arc<dyn Fn(Vec<(String, Value)>) -> Result<Value, String> + Send + Sync>;
pub(crate) type UncollectMapFn =
    Arc<dyn Fn(&Value) -> Result<Vec<(String, Value)>, String> + Send + Sync>;

/// Untyped descriptor node interpreted by the resolver and the writer
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub(crate) enum Node {
    /// A scalar read from the leaf at the current location
    Primitive {
        type_name: &'static str,
        #[derivative(Debug = "ignore")]
        parse: ParseFn,
        #[derivative(Debug = "ignore")]
        print: PrintFn,
    },
    Nested {
        path: Path,
        inner: Arc<Node>,
    },
    Zip {
        left: Arc<Node>,
        right: Arc<Node>,
        #[derivative(Debug = "ignore")]
        combine: CombineFn,
        #[derivative(Debug = "ignore")]
        split: SplitFn,
    },
    Optional {
        inner: Arc<Node>,
        #[derivative(Debug = "ignore")]
        some: WrapFn,
        #[derivative(Debug = "ignore")]
        none: Value,
        #[derivative(Debug = "ignore")]
        unwrap: UnwrapFn,
    },
    Default {
        inner: Arc<Node>,
        #[derivative(Debug = "ignore")]
        value: Value,
    },
    OrElse {
        first: Arc<Node>,
        second: Arc<Node>,
    },
    OrElseEither {
        first: Arc<Node>,
        second: Arc<Node>,
        #[derivative(Debug = "ignore")]
        left: WrapFn,
        #[derivative(Debug = "ignore")]
        right: WrapFn,
        #[derivative(Debug = "ignore")]
        split: EitherFn,
    },
    /// Every element of the sequence at the current location
    Sequence {
        element: Arc<Node>,
        #[derivative(Debug = "ignore")]
        collect: CollectFn,
        #[derivative(Debug = "ignore")]
        uncollect: UncollectFn,
    },
    /// Every entry of the record at the current location
    Map {
        element: Arc<Node>,
        #[derivative(Debug = "ignore")]
        collect: CollectMapFn,
        #[derivative(Debug = "ignore")]
        uncollect: UncollectMapFn,
    },
    CollectAll {
        items: Vec<Arc<Node>>,
        #[derivative(Debug = "ignore")]
        collect: CollectFn,
        #[derivative(Debug = "ignore")]
        uncollect: UncollectFn,
    },
    Transform {
        inner: Arc<Node>,
        #[derivative(Debug = "ignore")]
        to: MapFn,
        #[derivative(Debug = "ignore")]
        from: MapFn,
    },
    Sourced {
        inner: Arc<Node>,
        source: ConfigSource,
    },
    Described {
        inner: Arc<Node>,
        doc: String,
    },
}

impl Node {
    /// Copy of this node with `f` applied to each direct child
    fn map_children(&self, f: &dyn Fn(&Arc<Node>) -> Arc<Node>) -> Node {
        let mut node = self.clone();
        match &mut node {
            Node::Primitive { .. } => {}
            Node::Nested { inner, .. }
            | Node::Optional { inner, .. }
            | Node::Default { inner, .. }
            | Node::Sequence { element: inner, .. }
            | Node::Map { element: inner, .. }
            | Node::Transform { inner, .. }
            | Node::Sourced { inner, .. }
            | Node::Described { inner, .. } => *inner = f(inner),
            Node::Zip { left, right, .. } => {
                *left = f(left);
                *right = f(right);
            }
            Node::OrElse { first, second } | Node::OrElseEither { first, second, .. } => {
                *first = f(first);
                *second = f(second);
            }
            Node::CollectAll { items, .. } => {
                for item in items.iter_mut() {
                    *item = f(item);
                }
            }
        }
        node
    }

    /// Every source attached anywhere below this node, outermost first
    pub(crate) fn sources(&self, out: &mut Vec<ConfigSource>) {
        match self {
            Node::Primitive { .. } => {}
            Node::Sourced { inner, source } => {
                out.push(source.clone());
                inner.sources(out);
            }
            Node::Nested { inner, .. }
            | Node::Optional { inner, .. }
            | Node::Default { inner, .. }
            | Node::Sequence { element: inner, .. }
            | Node::Map { element: inner, .. }
            | Node::Transform { inner, .. }
            | Node::Described { inner, .. } => inner.sources(out),
            Node::Zip { left, right, .. } => {
                left.sources(out);
                right.sources(out);
            }
            Node::OrElse { first, second } | Node::OrElseEither { first, second, .. } => {
                first.sources(out);
                second.sources(out);
            }
            Node::CollectAll { items, .. } => {
                for item in items {
                    item.sources(out);
                }
            }
        }
    }
}

fn strip_sources(node: &Arc<Node>) -> Arc<Node> {
    match node.as_ref() {
        Node::Sourced { inner, .. } => strip_sources(inner),
        other => Arc::new(other.map_children(&strip_sources)),
    }
}

fn type_mismatch<A>() -> String {
    format!("expected a value of type {}", std::any::type_name::<A>())
}

pub(crate) fn boxed<A: ConfigType>(value: A) -> Value {
    Arc::new(value)
}

pub(crate) fn cast<A: ConfigType>(value: &Value) -> Result<&A, String> {
    value.downcast_ref::<A>().ok_or_else(type_mismatch::<A>)
}

pub(crate) fn take<A: ConfigType>(value: Value) -> Result<A, String> {
    match value.downcast::<A>() {
        Ok(typed) => Ok(Arc::try_unwrap(typed).unwrap_or_else(|shared| (*shared).clone())),
        Err(_) => Err(type_mismatch::<A>()),
    }
}

/// Immutable description of how to read (and write) a value of type `A`
pub struct ConfigDescriptor<A> {
    node: Arc<Node>,
    _marker: PhantomData<fn() -> A>,
}

impl<A> Clone for ConfigDescriptor<A> {
    fn clone(&self) -> Self {
        Self {
            node: Arc::clone(&self.node),
            _marker: PhantomData,
        }
    }
}

impl<A> fmt::Debug for ConfigDescriptor<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigDescriptor")
            .field("type", &std::any::type_name::<A>())
            .field("node", &self.node)
            .finish()
    }
}

impl<A> ConfigDescriptor<A> {
    fn from_node(node: Node) -> Self {
        Self {
            node: Arc::new(node),
            _marker: PhantomData,
        }
    }

    pub(crate) fn node(&self) -> &Node {
        &self.node
    }

    /// Every distinct source attached to this descriptor
    pub fn sources(&self) -> Vec<ConfigSource> {
        let mut sources = Vec::new();
        self.node.sources(&mut sources);
        let mut seen = Vec::new();
        sources.retain(|source| {
            if seen.contains(&source.id()) {
                false
            } else {
                seen.push(source.id());
                true
            }
        });
        sources
    }
}

impl<A: ConfigType> ConfigDescriptor<A> {
    /// Product of two descriptors; both sides are always resolved
    pub fn zip<B: ConfigType>(self, other: ConfigDescriptor<B>) -> ConfigDescriptor<(A, B)> {
        ConfigDescriptor::from_node(Node::Zip {
            left: self.node,
            right: other.node,
            combine: Arc::new(|a: Value, b: Value| -> Result<Value, String> {
                Ok(boxed((take::<A>(a)?, take::<B>(b)?)))
            }),
            split: Arc::new(|value: &Value| -> Result<(Value, Value), String> {
                let (a, b) = cast::<(A, B)>(value)?;
                Ok((boxed(a.clone()), boxed(b.clone())))
            }),
        })
    }

    /// `None` when the value is absent; malformed values still fail
    pub fn optional(self) -> ConfigDescriptor<Option<A>> {
        ConfigDescriptor::from_node(Node::Optional {
            inner: self.node,
            some: Arc::new(|value: Value| -> Result<Value, String> {
                Ok(boxed(Some(take::<A>(value)?)))
            }),
            none: boxed(None::<A>),
            unwrap: Arc::new(|value: &Value| -> Result<Option<Value>, String> {
                Ok(cast::<Option<A>>(value)?.clone().map(boxed))
            }),
        })
    }

    /// Substitute `value` when absent; malformed values still fail
    pub fn with_default(self, value: A) -> ConfigDescriptor<A> {
        ConfigDescriptor::from_node(Node::Default {
            inner: self.node,
            value: boxed(value),
        })
    }

    /// Try `self`, then `other` if `self` fails for any reason
    pub fn or_else(self, other: ConfigDescriptor<A>) -> ConfigDescriptor<A> {
        ConfigDescriptor::from_node(Node::OrElse {
            first: self.node,
            second: other.node,
        })
    }

    /// Like [`or_else`](Self::or_else), tagging which branch produced the value
    pub fn or_else_either<B: ConfigType>(
        self,
        other: ConfigDescriptor<B>,
    ) -> ConfigDescriptor<Either<A, B>> {
        ConfigDescriptor::from_node(Node::OrElseEither {
            first: self.node,
            second: other.node,
            left: Arc::new(|value: Value| -> Result<Value, String> {
                Ok(boxed(Either::<A, B>::Left(take::<A>(value)?)))
            }),
            right: Arc::new(|value: Value| -> Result<Value, String> {
                Ok(boxed(Either::<A, B>::Right(take::<B>(value)?)))
            }),
            split: Arc::new(|value: &Value| -> Result<Either<Value, Value>, String> {
                Ok(match cast::<Either<A, B>>(value)? {
                    Either::Left(a) => Either::Left(boxed(a.clone())),
                    Either::Right(b) => Either::Right(boxed(b.clone())),
                })
            }),
        })
    }

    /// Bidirectional mapping where `to` may reject the value
    pub fn transform_or_fail<B, E1, E2>(
        self,
        to: impl Fn(A) -> Result<B, E1> + Send + Sync + 'static,
        from: impl Fn(&B) -> Result<A, E2> + Send + Sync + 'static,
    ) -> ConfigDescriptor<B>
    where
        B: ConfigType,
        E1: fmt::Display,
        E2: fmt::Display,
    {
        ConfigDescriptor::from_node(Node::Transform {
            inner: self.node,
            to: Arc::new(move |value: &Value| -> Result<Value, String> {
                let a = cast::<A>(value)?.clone();
                to(a).map(boxed).map_err(|e| e.to_string())
            }),
            from: Arc::new(move |value: &Value| -> Result<Value, String> {
                let b = cast::<B>(value)?;
                from(b).map(boxed).map_err(|e| e.to_string())
            }),
        })
    }

    /// Bidirectional infallible mapping, e.g. wrapping a newtype
    pub fn transform<B: ConfigType>(
        self,
        to: impl Fn(A) -> B + Send + Sync + 'static,
        from: impl Fn(&B) -> A + Send + Sync + 'static,
    ) -> ConfigDescriptor<B> {
        self.transform_or_fail(
            move |a| Ok::<B, std::convert::Infallible>(to(a)),
            move |b| Ok::<A, std::convert::Infallible>(from(b)),
        )
    }

    /// Reject values for which `predicate` is false
    pub fn validate(
        self,
        message: impl Into<String>,
        predicate: impl Fn(&A) -> bool + Send + Sync + 'static,
    ) -> ConfigDescriptor<A> {
        let message = message.into();
        self.validate_with(move |value| {
            if predicate(value) {
                Ok(())
            } else {
                Err(message.clone())
            }
        })
    }

    /// Reject values for which `check` returns an error
    pub fn validate_with<E: fmt::Display>(
        self,
        check: impl Fn(&A) -> Result<(), E> + Send + Sync + 'static,
    ) -> ConfigDescriptor<A> {
        self.transform_or_fail(
            move |value| check(&value).map(|_| value),
            |value: &A| Ok::<A, std::convert::Infallible>(value.clone()),
        )
    }

    /// Attach a source; sources attached later have lower priority
    pub fn from(self, source: ConfigSource) -> ConfigDescriptor<A> {
        ConfigDescriptor::from_node(Node::Sourced {
            inner: self.node,
            source,
        })
    }

    /// Remove every source attached so far
    pub fn unsourced(self) -> ConfigDescriptor<A> {
        Self {
            node: strip_sources(&self.node),
            _marker: PhantomData,
        }
    }

    /// Attach documentation, reported alongside missing values
    pub fn describe(self, doc: impl Into<String>) -> ConfigDescriptor<A> {
        ConfigDescriptor::from_node(Node::Described {
            inner: self.node,
            doc: doc.into(),
        })
    }

    /// Resolve against an already materialized tree
    pub fn resolve(&self, tree: &PropertyTree) -> Result<A, ReadError> {
        crate::resolver::resolve(self, tree)
    }

    /// Materialize the attached sources and resolve
    pub async fn read(&self) -> Result<A, ReadError> {
        crate::resolver::read(self).await
    }

    /// Write `value` back into a tree shaped by this descriptor
    pub fn write(&self, value: &A) -> Result<PropertyTree, WriteError> {
        crate::writer::write(self, value)
    }
}

impl<A: ConfigType> ConfigDescriptor<Option<A>> {
    /// Replace `None` by `value`, for descriptors that are already optional
    pub fn or_default_value(self, value: A) -> ConfigDescriptor<A> {
        let fallback = value.clone();
        self.transform(
            move |maybe| maybe.unwrap_or_else(|| fallback.clone()),
            |value: &A| Some(value.clone()),
        )
    }
}

/// A primitive at the current location, used as the element of collections
pub fn value<A: Primitive>() -> ConfigDescriptor<A> {
    ConfigDescriptor::from_node(Node::Primitive {
        type_name: A::TYPE_NAME,
        parse: Arc::new(|raw: &str| -> Result<Value, String> { A::parse(raw).map(boxed) }),
        print: Arc::new(|value: &Value| -> Result<String, String> {
            Ok(cast::<A>(value)?.print())
        }),
    })
}

/// A primitive at `key`
pub fn primitive<A: Primitive>(key: impl Into<String>) -> ConfigDescriptor<A> {
    nested(key, value::<A>())
}

pub fn string(key: impl Into<String>) -> ConfigDescriptor<String> {
    primitive(key)
}

pub fn boolean(key: impl Into<String>) -> ConfigDescriptor<bool> {
    primitive(key)
}

pub fn int(key: impl Into<String>) -> ConfigDescriptor<i32> {
    primitive(key)
}

pub fn long(key: impl Into<String>) -> ConfigDescriptor<i64> {
    primitive(key)
}

pub fn double(key: impl Into<String>) -> ConfigDescriptor<f64> {
    primitive(key)
}

pub fn port(key: impl Into<String>) -> ConfigDescriptor<u16> {
    primitive(key)
}

pub fn url(key: impl Into<String>) -> ConfigDescriptor<url::Url> {
    primitive(key)
}

pub fn duration(key: impl Into<String>) -> ConfigDescriptor<std::time::Duration> {
    primitive(key)
}

pub fn date(key: impl Into<String>) -> ConfigDescriptor<chrono::NaiveDate> {
    primitive(key)
}

pub fn datetime(key: impl Into<String>) -> ConfigDescriptor<chrono::DateTime<chrono::FixedOffset>> {
    primitive(key)
}

/// Read `descriptor` under `key`
pub fn nested<A>(key: impl Into<String>, descriptor: ConfigDescriptor<A>) -> ConfigDescriptor<A> {
    nested_path(Path::from_steps([Step::Key(key.into())]), descriptor)
}

/// Read `descriptor` under a multi-segment `path`
pub fn nested_path<A>(path: Path, descriptor: ConfigDescriptor<A>) -> ConfigDescriptor<A> {
    ConfigDescriptor::from_node(Node::Nested {
        path,
        inner: descriptor.node,
    })
}

/// Every element of the sequence at `key`
pub fn list<A: ConfigType>(key: impl Into<String>, element: ConfigDescriptor<A>) -> ConfigDescriptor<Vec<A>> {
    nested(key, sequence(element))
}

/// Every element of the sequence at the current location
pub fn sequence<A: ConfigType>(element: ConfigDescriptor<A>) -> ConfigDescriptor<Vec<A>> {
    ConfigDescriptor::from_node(Node::Sequence {
        element: element.node,
        collect: collect_vec::<A>(),
        uncollect: uncollect_vec::<A>(),
    })
}

/// Every entry of the record at `key`
pub fn map<A: ConfigType>(
    key: impl Into<String>,
    element: ConfigDescriptor<A>,
) -> ConfigDescriptor<BTreeMap<String, A>> {
    nested(
        key,
        ConfigDescriptor::from_node(Node::Map {
            element: element.node,
            collect: Arc::new(|entries: Vec<(String, Value)>| -> Result<Value, String> {
                let typed = entries
                    .into_iter()
                    .map(|(key, value)| take::<A>(value).map(|value| (key, value)))
                    .collect::<Result<BTreeMap<String, A>, String>>()?;
                Ok(boxed(typed))
            }),
            uncollect: Arc::new(|value: &Value| -> Result<Vec<(String, Value)>, String> {
                Ok(cast::<BTreeMap<String, A>>(value)?
                    .iter()
                    .map(|(key, value)| (key.clone(), boxed(value.clone())))
                    .collect())
            }),
        }),
    )
}

/// Sequence of same-typed descriptors collected into one ordered list
pub fn collect_all<A: ConfigType>(
    descriptors: impl IntoIterator<Item = ConfigDescriptor<A>>,
) -> ConfigDescriptor<Vec<A>> {
    ConfigDescriptor::from_node(Node::CollectAll {
        items: descriptors.into_iter().map(|d| d.node).collect(),
        collect: collect_vec::<A>(),
        uncollect: uncollect_vec::<A>(),
    })
}

fn collect_vec<A: ConfigType>() -> CollectFn {
    Arc::new(|values: Vec<Value>| -> Result<Value, String> {
        let typed = values
            .into_iter()
            .map(take::<A>)
            .collect::<Result<Vec<A>, String>>()?;
        Ok(boxed(typed))
    })
}

fn uncollect_vec<A: ConfigType>() -> UncollectFn {
    Arc::new(|value: &Value| -> Result<Vec<Value>, String> {
        Ok(cast::<Vec<A>>(value)?.iter().cloned().map(boxed).collect())
    })
}
