//! Garnet project analysis: indexing a directory of Ruby files and
//! answering position queries against the solved result.
//!
//! - [`config`]: garnet.toml
//! - [`discovery`]: which files belong to the project
//! - [`project`]: parse, build and solve every file
//! - [`query`]: type, definition and completion lookups
//! - [`diagnostics`]: rendering of skipped files

pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod error;
pub mod project;
pub mod query;

pub use config::Config;
pub use error::{ConfigError, IndexError};
pub use project::{FileWarning, Project, SourceFile};
pub use query::{completions_at_position, definitions_at_position, type_at_position};
