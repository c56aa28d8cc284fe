//! Garnet type inference: dataflow graph construction and fixpoint solving.
//!
//! Every expression becomes a node in a single program-wide [`graph::Graph`]
//! whose edges say where values may flow. Classes, modules, methods and
//! lambdas are recorded in the [`tree::GlobalTree`]; calls are queued in the
//! [`worklist::Worklist`] because their targets depend on inferred types.
//! [`solver::solve`] then propagates types along the edges, dispatching
//! queued calls as receiver types become known, until nothing changes.
//!
//! # Architecture
//!
//! - [`ty`]: The type lattice
//! - [`scope`]: Constant names, lexical nesting and definition scopes
//! - [`node`] / [`graph`]: The dataflow graph
//! - [`tree`]: The symbol table of definitions, methods and constants
//! - [`context`]: The builder's state at a program point
//! - [`builder`]: AST to graph translation
//! - [`builtins`]: Core classes known before any file is read
//! - [`solver`]: Fixpoint type propagation

pub mod builder;
pub mod builtins;
pub mod context;
pub mod error;
pub mod graph;
pub mod node;
pub mod scope;
pub mod solver;
pub mod tree;
pub mod ty;
pub mod worklist;

use garnet_common::FileId;
use garnet_syntax::{Ast, ParseError};
use thiserror::Error;
use tracing::debug;

use crate::builder::Builder;
use crate::error::BuildError;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::solver::Typing;
use crate::tree::GlobalTree;
use crate::ty::Type;
use crate::worklist::Worklist;

/// The whole-program state shared by every analyzed file.
#[derive(Debug)]
pub struct Analysis {
    graph: Graph,
    tree: GlobalTree,
    worklist: Worklist,
}

impl Default for Analysis {
    fn default() -> Self {
        Analysis::new()
    }
}

impl Analysis {
    /// An analysis holding only the core classes.
    pub fn new() -> Self {
        let mut graph = Graph::new();
        let mut tree = GlobalTree::new();
        builtins::register(&mut graph, &mut tree);
        Analysis {
            graph,
            tree,
            worklist: Worklist::new(),
        }
    }

    /// Translate one parsed file into the shared graph, returning the node
    /// of its last expression. On error nothing the file added is kept.
    pub fn add_file(&mut self, file: FileId, source: &str, ast: &Ast) -> Result<NodeId, BuildError> {
        let graph_checkpoint = self.graph.checkpoint();
        let tree_checkpoint = self.tree.checkpoint();
        let sends = self.worklist.len();

        let built = Builder::new(
            &mut self.graph,
            &mut self.tree,
            &mut self.worklist,
            file.clone(),
            source,
        )
        .process_file(ast);

        if let Err(err) = &built {
            debug!(file = %file, code = err.code(), "rolling back file");
            self.graph.rollback(graph_checkpoint);
            self.tree.rollback(tree_checkpoint);
            self.worklist.truncate(sends);
        }
        built
    }

    /// Run the solver to its fixpoint or for at most `max_rounds` rounds.
    pub fn solve(&mut self, max_rounds: usize) -> Typing {
        solver::solve(&mut self.graph, &self.tree, &self.worklist, max_rounds)
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn tree(&self) -> &GlobalTree {
        &self.tree
    }

    pub fn worklist(&self) -> &Worklist {
        &self.worklist
    }
}

/// Failure of [`check`] on a single source text.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Build(#[from] BuildError),
}

/// The solved analysis of a single source text.
#[derive(Debug)]
pub struct TypeckResult {
    pub analysis: Analysis,
    pub typing: Typing,
    /// Node of the program's last expression.
    pub result: NodeId,
}

impl TypeckResult {
    /// The inferred type of the program's last expression.
    pub fn result_type(&self) -> &Type {
        self.typing.type_of(self.result)
    }

    pub fn type_of(&self, node: NodeId) -> &Type {
        self.typing.type_of(node)
    }
}

/// Parse, build and solve `source` as a lone file named `main.rb`.
pub fn check(source: &str) -> Result<TypeckResult, CheckError> {
    let ast = garnet_syntax::parse(source)?;
    let mut analysis = Analysis::new();
    let result = analysis.add_file(FileId::new("main.rb"), source, &ast)?;
    let typing = analysis.solve(solver::DEFAULT_MAX_ROUNDS);
    Ok(TypeckResult {
        analysis,
        typing,
        result,
    })
}
