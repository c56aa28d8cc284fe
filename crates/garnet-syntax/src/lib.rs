//! Garnet syntax: Ruby source to an owned abstract syntax tree.
//!
//! Parsing is delegated to the tree-sitter Ruby grammar. The concrete tree
//! is then lowered into [`Ast`], resolving the one piece of context the
//! grammar leaves open: whether a bare identifier reads a local variable or
//! calls a method.

pub mod ast;
pub mod error;
mod lower;
mod sexp;

use garnet_common::Span;

pub use ast::{
    Ast, AstKind, ConstPath, MethodDef, Param, ParamKind, Params, ResBody, Send, When,
    FORWARDED_BLOCK, FORWARDED_KWREST, FORWARDED_REST,
};
pub use error::ParseError;
pub use sexp::debug_tree;

/// Deepest expression nesting [`parse`] accepts.
pub const MAX_NESTING: usize = 128;

/// Parse a Ruby source file.
///
/// A tree containing error or missing nodes is rejected with the first
/// error found. Constructs the analyzer has no rule for are kept as
/// `AstKind::Unsupported` rather than failing here. Expressions nested
/// more than [`MAX_NESTING`] levels deep are an error.
pub fn parse(source: &str) -> Result<Ast, ParseError> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_ruby::language())
        .map_err(|e| ParseError::new(format!("cannot load the Ruby grammar: {e}"), Span::new(0, 0)))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseError::new("parser produced no tree", Span::new(0, source.len() as u32)))?;
    let root = tree.root_node();
    if let Some(node) = lower::first_error(root) {
        return Err(lower::error_at(node, source));
    }
    lower::Lowerer::new(source).program(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_is_empty_begin() {
        let ast = parse("").unwrap();
        assert_eq!(ast.kind, AstKind::Begin(Vec::new()));
    }

    #[test]
    fn single_statement_is_unwrapped() {
        let ast = parse("42").unwrap();
        assert_eq!(ast.kind, AstKind::Int);
        assert_eq!(ast.span, Span::new(0, 2));
    }

    #[test]
    fn syntax_error_is_reported() {
        let err = parse("def foo(\n").unwrap_err();
        assert!(!err.message.is_empty());
    }

    #[test]
    fn nesting_limit_is_an_error() {
        let source = format!("{}1{}", "[".repeat(1000), "]".repeat(1000));
        let err = parse(&source).unwrap_err();
        assert!(err.message.contains("nested"), "{}", err.message);
    }

    #[test]
    fn nesting_below_limit_parses() {
        let depth = MAX_NESTING / 2;
        let source = format!("{}1{}", "[".repeat(depth), "]".repeat(depth));
        assert!(parse(&source).is_ok());
    }
}
