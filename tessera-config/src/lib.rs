//! Declarative configuration descriptors for Tessera
//!
//! Describe the shape of a configuration once with [`ConfigDescriptor`]
//! combinators, then read it from maps, the environment, property files,
//! JSON/YAML documents or command-line arguments. Every failure of a read is
//! reported at once in a single [`ReadError`].

pub mod descriptor;
pub mod error;
pub mod loader;
pub mod path;
pub mod resolver;
pub mod source;
pub mod tree;
pub mod validation;
pub mod writer;

// Re-export main types
pub use descriptor::{ConfigDescriptor, ConfigType, Configurable, Either, Primitive};
pub use error::{ConfigError, ConfigResult, ReadError, ReadErrorKind, SourceError, WriteError};
pub use loader::ConfigLoader;
pub use path::{Path, Step};
pub use resolver::{read, read_with, resolve, resolve_with, ReadOptions, SequenceLengthPolicy, UnknownKeysPolicy};
pub use source::{ConfigSource, PropertySource};
pub use tree::{MergePolicy, PropertyTree};
pub use writer::{write, write_flat};
