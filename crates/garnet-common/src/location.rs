use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::span::{LineIndex, Position, PositionRange, Span};

/// Identity of a source file: its path as given to the indexer.
///
/// Cheap to clone; every location of a file shares one allocation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileId(Arc<str>);

impl FileId {
    pub fn new(path: impl AsRef<str>) -> Self {
        FileId(Arc::from(path.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(path: &str) -> Self {
        FileId::new(path)
    }
}

/// A file-qualified source range, carried by graph nodes and definitions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    pub file: FileId,
    pub span: Span,
    pub range: PositionRange,
}

impl Location {
    /// Build a location for `span`, computing its positions through `index`.
    pub fn new(file: FileId, span: Span, index: &LineIndex) -> Self {
        Location {
            range: index.range(span),
            file,
            span,
        }
    }

    /// Whether this location is in `file` and covers `position`.
    pub fn contains(&self, file: &FileId, position: Position) -> bool {
        &self.file == file && self.range.contains(position)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_positions_from_span() {
        let src = "class Foo\nend\n";
        let index = LineIndex::new(src);
        let loc = Location::new(FileId::new("foo.rb"), Span::new(6, 9), &index);
        assert_eq!(loc.range.start, Position::new(0, 6));
        assert_eq!(loc.range.end, Position::new(0, 9));
        assert_eq!(loc.to_string(), "foo.rb:0:6-0:9");
    }

    #[test]
    fn contains_checks_file_identity() {
        let index = LineIndex::new("42");
        let loc = Location::new(FileId::new("a.rb"), Span::new(0, 2), &index);
        assert!(loc.contains(&FileId::new("a.rb"), Position::new(0, 1)));
        assert!(!loc.contains(&FileId::new("b.rb"), Position::new(0, 1)));
    }
}
