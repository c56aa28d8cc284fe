//! Errors raised while building the dataflow graph for one file.
//!
//! Both variants are fatal for the file being built and for nothing else:
//! the caller drops that file from the analysis and keeps going.

use garnet_common::Span;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// The syntax tree contains a construct with no translation rule.
    #[error("unsupported construct `{kind}`")]
    Unsupported { kind: String, span: Span },
    /// Two branches of a conditional left the builder in different
    /// definition contexts (class, method, nesting or self).
    #[error("branches of this expression end in different definition contexts")]
    ContextMismatch { span: Span },
}

impl BuildError {
    pub fn span(&self) -> Span {
        match self {
            BuildError::Unsupported { span, .. } | BuildError::ContextMismatch { span } => *span,
        }
    }

    /// Stable diagnostic code.
    pub fn code(&self) -> &'static str {
        match self {
            BuildError::Unsupported { .. } => "B0001",
            BuildError::ContextMismatch { .. } => "B0002",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_messages() {
        let err = BuildError::Unsupported {
            kind: "case_match".into(),
            span: Span::new(0, 4),
        };
        assert_eq!(err.code(), "B0001");
        assert_eq!(err.to_string(), "unsupported construct `case_match`");
        assert_eq!(err.span(), Span::new(0, 4));

        let err = BuildError::ContextMismatch { span: Span::new(2, 3) };
        assert_eq!(err.code(), "B0002");
    }
}
