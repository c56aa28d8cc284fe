//! Shared value types for the garnet analyzer.
//!
//! Everything that refers back to source text lives here: byte spans,
//! 0-based query positions, and file-qualified locations.

pub mod location;
pub mod span;

pub use location::{FileId, Location};
pub use span::{LineIndex, Position, PositionRange, Span};
