//! Errors of project indexing.
//!
//! Only configuration and directory-walk failures stop an index run. A
//! file that cannot be read, parsed or built is dropped from the analysis
//! and reported as a [`crate::project::FileWarning`] carrying one of these
//! errors.

use std::io;
use std::path::PathBuf;

use garnet_syntax::ParseError;
use garnet_typeck::error::BuildError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Build(#[from] BuildError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl IndexError {
    /// Stable diagnostic code, for errors that have a source position.
    pub fn code(&self) -> Option<&'static str> {
        match self {
            IndexError::Parse(_) => Some("P0001"),
            IndexError::Build(err) => Some(err.code()),
            IndexError::Io { .. } | IndexError::Config(_) => None,
        }
    }
}
