//! Syntax tree to dataflow graph translation.
//!
//! One recursive walk per file. Every rule takes the [`Context`] before the
//! expression and returns the node representing the expression's value
//! together with the context after it. Calls are not resolved here: each
//! one becomes a [`PendingSend`] on the worklist for the solver.
//!
//! Loops are walked once with no back edge. Compound assignments are
//! rewritten into plain assignments and walked again.

use garnet_common::{FileId, LineIndex, Location, Span};
use garnet_syntax::{
    Ast, AstKind, ConstPath, MethodDef, Param, ParamKind, Params, ResBody, FORWARDED_BLOCK,
    FORWARDED_KWREST, FORWARDED_REST,
};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::context::{merge_contexts, Context, Selfie};
use crate::error::BuildError;
use crate::graph::Graph;
use crate::node::{NodeId, NodeKind};
use crate::scope::{ConstRef, Nesting};
use crate::tree::{
    Arg, ArgKind, ArgumentsTree, DefinitionId, DefinitionKind, GlobalTree, Visibility, YieldSite,
};
use crate::worklist::{
    Block, CallArg, CallArgKind, MessageSend, PendingSend, SendId, Super0Send, SuperSend, Worklist,
};

/// Value node and successor context of one expression.
#[derive(Debug)]
pub struct Processed {
    pub node: NodeId,
    pub ctx: Context,
    /// The pending send this expression created, for attaching a block.
    pub send: Option<SendId>,
}

impl Processed {
    fn new(node: NodeId, ctx: Context) -> Self {
        Processed {
            node,
            ctx,
            send: None,
        }
    }
}

type BuildResult = Result<Processed, BuildError>;

/// Positional arguments, optional block and context after a call's
/// argument list.
struct CallArgs {
    args: Vec<CallArg>,
    block: Option<Block>,
    ctx: Context,
}

/// Deepest expression nesting the builder follows. Parsed trees rarely
/// come near it since parsing has its own limit.
pub const MAX_DEPTH: usize = 2 * garnet_syntax::MAX_NESTING;

pub struct Builder<'a> {
    graph: &'a mut Graph,
    tree: &'a mut GlobalTree,
    worklist: &'a mut Worklist,
    file: FileId,
    lines: LineIndex,
    source: &'a str,
    /// Expressions currently being processed.
    depth: usize,
}

impl<'a> Builder<'a> {
    pub fn new(
        graph: &'a mut Graph,
        tree: &'a mut GlobalTree,
        worklist: &'a mut Worklist,
        file: FileId,
        source: &'a str,
    ) -> Self {
        Builder {
            graph,
            tree,
            worklist,
            file,
            lines: LineIndex::new(source),
            source,
            depth: 0,
        }
    }

    /// Translate a whole file. Nothing is built when the tree contains an
    /// unsupported construct.
    pub fn process_file(&mut self, ast: &Ast) -> Result<NodeId, BuildError> {
        if let Some((kind, span)) = ast.first_unsupported() {
            return Err(BuildError::Unsupported {
                kind: kind.to_string(),
                span,
            });
        }
        let nodes_before = self.graph.len();
        let result = self.process(ast, Context::top_level(self.file.clone()))?;
        trace!(
            file = %self.file,
            nodes = self.graph.len() - nodes_before,
            sends = self.worklist.len(),
            "built file"
        );
        Ok(result.node)
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn location(&self, span: Span) -> Location {
        Location::new(self.file.clone(), span, &self.lines)
    }

    fn add(&mut self, kind: NodeKind, span: Option<Span>) -> NodeId {
        let location = span.map(|s| self.location(s));
        self.graph.add_node(kind, location)
    }

    fn edge(&mut self, from: NodeId, to: NodeId) {
        self.graph.add_edge(from, to);
    }

    fn text(&self, span: Span) -> &str {
        self.source
            .get(span.start as usize..span.end as usize)
            .unwrap_or("")
    }

    /// Process `ast`, then give its value node the expression's range
    /// unless a rule already located it.
    fn process(&mut self, ast: &Ast, ctx: Context) -> BuildResult {
        if self.depth >= MAX_DEPTH {
            return Err(BuildError::Unsupported {
                kind: "deeply nested expression".to_string(),
                span: ast.span,
            });
        }
        self.depth += 1;
        let processed = self.dispatch(ast, ctx);
        self.depth -= 1;
        let processed = processed?;
        let location = self.location(ast.span);
        self.graph.locate(processed.node, location);
        Ok(processed)
    }

    /// Process an optional expression; a missing one is `nil`.
    fn process_opt(&mut self, ast: Option<&Ast>, ctx: Context) -> BuildResult {
        match ast {
            Some(ast) => self.process(ast, ctx),
            None => Ok(Processed::new(self.add(NodeKind::Nil, None), ctx)),
        }
    }

    fn process_all(&mut self, asts: &[Ast], ctx: Context) -> Result<(Vec<NodeId>, Context), BuildError> {
        let mut nodes = Vec::with_capacity(asts.len());
        let mut ctx = ctx;
        for ast in asts {
            let processed = self.process(ast, ctx)?;
            nodes.push(processed.node);
            ctx = processed.ctx;
        }
        Ok((nodes, ctx))
    }

    fn leaf(&mut self, kind: NodeKind, ast: &Ast, ctx: Context) -> BuildResult {
        Ok(Processed::new(self.add(kind, Some(ast.span)), ctx))
    }

    fn dispatch(&mut self, ast: &Ast, ctx: Context) -> BuildResult {
        match &ast.kind {
            // Literals
            AstKind::Int | AstKind::LineNumber => self.leaf(NodeKind::Int, ast, ctx),
            AstKind::Float => self.leaf(NodeKind::Float, ast, ctx),
            AstKind::Rational => self.leaf(NodeKind::Rational, ast, ctx),
            AstKind::Imaginary => self.leaf(NodeKind::Complex, ast, ctx),
            AstKind::True | AstKind::False => self.leaf(NodeKind::Bool, ast, ctx),
            AstKind::Nil => self.leaf(NodeKind::Nil, ast, ctx),
            AstKind::Str | AstKind::FileName => self.leaf(NodeKind::Str, ast, ctx),
            AstKind::Sym(name) => self.leaf(NodeKind::Sym(name.clone()), ast, ctx),
            AstKind::NthRef(n) => self.leaf(NodeKind::NthRef(*n), ast, ctx),
            AstKind::BackRef(name) => self.leaf(NodeKind::BackRef(name.clone()), ast, ctx),
            AstKind::Defined(_) => self.leaf(NodeKind::Defined, ast, ctx),
            AstKind::DStr(parts) => self.fed_by_parts(NodeKind::DStr, parts, ctx),
            AstKind::XStr(parts) => self.fed_by_parts(NodeKind::XStr, parts, ctx),
            AstKind::DSym(parts) => self.fed_by_parts(NodeKind::DSym, parts, ctx),
            AstKind::Regexp(parts) => self.fed_by_parts(NodeKind::Regexp, parts, ctx),
            AstKind::SelfRef => self.leaf(NodeKind::Self_(ctx.selfie.clone()), ast, ctx),
            AstKind::Array(elems) => self.handle_array(elems, ctx),
            AstKind::Hash { pairs, .. } => self.handle_hash(pairs, ctx),
            AstKind::Pair { .. } | AstKind::KwSplat(_) => Err(BuildError::Unsupported {
                kind: "pair outside of a hash".to_string(),
                span: ast.span,
            }),
            AstKind::Range { from, to, inclusive } => {
                self.handle_range(from.as_deref(), to.as_deref(), *inclusive, ctx)
            }

            // Variables
            AstKind::Lvar(name) => {
                let node = self.add(NodeKind::Lvar(name.clone()), Some(ast.span));
                for &source in ctx.lookup(name) {
                    self.edge(source, node);
                }
                Ok(Processed::new(node, ctx))
            }
            AstKind::Ivar(name) => {
                let storage = self.ivar_storage(&ctx, name);
                self.read(NodeKind::Ivar(name.clone()), storage, ast, ctx)
            }
            AstKind::Cvar(name) => {
                let storage = self.graph.cvar_definition(&ctx.scope(), name);
                self.read(NodeKind::Cvar(name.clone()), storage, ast, ctx)
            }
            AstKind::Gvar(name) => {
                let storage = self.graph.gvar_definition(name);
                self.read(NodeKind::Gvar(name.clone()), storage, ast, ctx)
            }
            AstKind::Const(path) => {
                let const_ref = ConstRef::from_path(path, &ctx.nesting);
                self.leaf(NodeKind::Const(const_ref), ast, ctx)
            }
            AstKind::Lvasgn { value, .. }
            | AstKind::Ivasgn { value, .. }
            | AstKind::Cvasgn { value, .. }
            | AstKind::Gvasgn { value, .. } => {
                let processed = self.process_opt(value.as_deref(), ctx)?;
                let (node, ctx) = self.write_target(ast, processed.node, processed.ctx)?;
                Ok(Processed::new(node, ctx))
            }
            AstKind::Casgn { path, value } => self.handle_casgn(ast, path, value.as_deref(), ctx),

            // Calls
            AstKind::Send(send) => self.handle_send(send, ctx),
            AstKind::Splat(inner) => {
                let array = self.add(NodeKind::Array, None);
                let mut ctx = ctx;
                if let Some(inner) = inner {
                    let processed = self.process(inner, ctx)?;
                    let splat = self.add(NodeKind::SplatArray, None);
                    self.edge(processed.node, splat);
                    self.edge(splat, array);
                    ctx = processed.ctx;
                }
                Ok(Processed::new(array, ctx))
            }
            AstKind::BlockPass(inner) => self.process_opt(inner.as_deref(), ctx),
            AstKind::Block { call, params, body } => self.handle_block(call, params, body.as_deref(), ctx),
            AstKind::Lambda { params, body } => {
                let (lambda, ctx) = self.build_lambda(params, body.as_deref(), ctx)?;
                Ok(Processed::new(self.add(NodeKind::Lambda(lambda), None), ctx))
            }
            AstKind::Super(args) => {
                let call = self.process_call_args(args, ctx)?;
                let result = self.add(NodeKind::CallResult { csend: false }, None);
                let method = call.ctx.analyzed_method;
                let send = self.worklist.add(PendingSend::Super(SuperSend {
                    args: call.args,
                    result,
                    block: call.block,
                    method,
                    keyword: Some(self.keyword_location(ast.span, "super")),
                }));
                Ok(Processed {
                    node: result,
                    ctx: call.ctx,
                    send: Some(send),
                })
            }
            AstKind::ZSuper => {
                let result = self.add(NodeKind::CallResult { csend: false }, None);
                let send = self.worklist.add(PendingSend::Super0(Super0Send {
                    result,
                    block: None,
                    method: ctx.analyzed_method,
                    keyword: Some(self.keyword_location(ast.span, "super")),
                }));
                Ok(Processed {
                    node: result,
                    ctx,
                    send: Some(send),
                })
            }
            AstKind::Yield(args) => {
                let call = self.process_call_args(args, ctx)?;
                let result = self.add(NodeKind::YieldResult, None);
                if let Some(method) = call.ctx.analyzed_method {
                    self.tree.add_yield(
                        method,
                        YieldSite {
                            args: call.args,
                            result,
                        },
                    );
                }
                Ok(Processed::new(result, call.ctx))
            }

            // Definitions
            AstKind::Def(def) => self.handle_def(def, ast.span, ctx, false),
            AstKind::Defs { receiver, def } => {
                let processed = self.process(receiver, ctx)?;
                self.handle_def(def, ast.span, processed.ctx, true)
            }
            AstKind::Class {
                name,
                superclass,
                body,
            } => self.handle_class(name, superclass.as_deref(), body.as_deref(), ctx),
            AstKind::Module { name, body } => self.handle_module(name, body.as_deref(), ctx),
            AstKind::SClass { target, body } => {
                let processed = self.process(target, ctx)?;
                let outer = processed.ctx;
                let inner_ctx = outer
                    .clone()
                    .with_selfie(Selfie::Klass(outer.scope()))
                    .with_nesting(outer.nesting.increase_nesting_self())
                    .with_analyzed_method(None)
                    .with_lenv(FxHashMap::default());
                self.process_opt(body.as_deref(), inner_ctx)?;
                Ok(Processed::new(self.add(NodeKind::Nil, None), outer))
            }
            AstKind::Alias | AstKind::Undef => self.leaf(NodeKind::Nil, ast, ctx),

            // Control flow
            AstKind::Begin(stmts) | AstKind::KwBegin(stmts) => {
                let (nodes, ctx) = self.process_all(stmts, ctx)?;
                match nodes.last() {
                    Some(&last) => Ok(Processed::new(last, ctx)),
                    None => Ok(Processed::new(self.add(NodeKind::Nil, None), ctx)),
                }
            }
            AstKind::And(left, right) => self.handle_binary(NodeKind::And, left, right, ctx),
            AstKind::Or(left, right) => self.handle_binary(NodeKind::Or, left, right, ctx),
            AstKind::Not(operand) => {
                let processed = self.process(operand, ctx)?;
                Ok(Processed::new(self.add(NodeKind::Not, None), processed.ctx))
            }
            AstKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.handle_if(ast, cond, then_branch.as_deref(), else_branch.as_deref(), ctx),
            AstKind::Case {
                subject,
                whens,
                else_branch,
            } => {
                let mut ctx = ctx;
                if let Some(subject) = subject {
                    ctx = self.process(subject, ctx)?.ctx;
                }
                let result = self.add(NodeKind::CaseResult, None);
                let mut branches = Vec::with_capacity(whens.len() + 1);
                for when in whens {
                    let (_, pattern_ctx) = self.process_all(&when.patterns, ctx.clone())?;
                    let body = self.process_opt(when.body.as_deref(), pattern_ctx)?;
                    self.edge(body.node, result);
                    branches.push(body.ctx);
                }
                let otherwise = self.process_opt(else_branch.as_deref(), ctx)?;
                self.edge(otherwise.node, result);
                branches.push(otherwise.ctx);
                let ctx = self.merge_all(branches, ast.span)?;
                Ok(Processed::new(result, ctx))
            }
            AstKind::While { cond, body, .. } => {
                let after_cond = self.process(cond, ctx)?.ctx;
                let after_body = self.process_opt(body.as_deref(), after_cond.clone())?.ctx;
                let ctx = merge_contexts(after_cond, after_body, ast.span)?;
                Ok(Processed::new(self.add(NodeKind::Nil, None), ctx))
            }
            AstKind::For { target, iter, body } => {
                let iterated = self.process(iter, ctx)?;
                let element = self.add(NodeKind::UnwrapArray, None);
                self.edge(iterated.node, element);
                let (_, before_body) = self.write_target(target, element, iterated.ctx)?;
                let after_body = self.process_opt(body.as_deref(), before_body.clone())?.ctx;
                let ctx = merge_contexts(before_body, after_body, ast.span)?;
                Ok(Processed::new(iterated.node, ctx))
            }
            AstKind::Break(value) | AstKind::Next(value) => {
                let mut ctx = ctx;
                if let Some(value) = value {
                    ctx = self.process(value, ctx)?.ctx;
                }
                self.leaf(NodeKind::Bottom, ast, ctx)
            }
            AstKind::Redo | AstKind::Retry => self.leaf(NodeKind::Bottom, ast, ctx),
            AstKind::Return(values) => {
                let (nodes, ctx) = self.process_all(values, ctx)?;
                let value = match nodes.as_slice() {
                    [] => self.add(NodeKind::Nil, None),
                    [single] => *single,
                    many => {
                        let array = self.add(NodeKind::Array, None);
                        for &node in many {
                            self.edge(node, array);
                        }
                        array
                    }
                };
                if let Some(method) = ctx.analyzed_method {
                    let result = self.tree.method(method).result;
                    self.edge(value, result);
                }
                self.leaf(NodeKind::Bottom, ast, ctx)
            }
            AstKind::Rescue {
                body,
                handlers,
                else_branch,
            } => self.handle_rescue(ast, body.as_deref(), handlers, else_branch.as_deref(), ctx),
            AstKind::Ensure { body, ensure } => {
                let body = self.process_opt(body.as_deref(), ctx)?;
                let node = self.add(NodeKind::Ensure, None);
                self.edge(body.node, node);
                let ctx = self.process_opt(ensure.as_deref(), body.ctx)?.ctx;
                Ok(Processed::new(node, ctx))
            }

            // Assignment forms
            AstKind::MAsgn { targets, value } => {
                let value = self.process(value, ctx)?;
                let items: &[Ast] = match &targets.kind {
                    AstKind::Mlhs(items) => items,
                    _ => std::slice::from_ref(targets.as_ref()),
                };
                self.destructure(items, value.node, value.ctx)
            }
            AstKind::Mlhs(_) => Err(BuildError::Unsupported {
                kind: "mlhs outside of an assignment".to_string(),
                span: ast.span,
            }),
            AstKind::OpAsgn { target, op, value } => {
                let rewritten = rewrite_compound(target, ast.span, |read| {
                    Ast::new(
                        AstKind::Send(Box::new(garnet_syntax::Send {
                            receiver: Some(Box::new(read)),
                            name: op.clone(),
                            selector: Span::default(),
                            args: vec![value.as_ref().clone()],
                            safe_navigation: false,
                        })),
                        ast.span,
                    )
                });
                self.process_rewritten(rewritten, ast, ctx)
            }
            AstKind::OrAsgn { target, value } => {
                let rewritten = rewrite_compound(target, ast.span, |read| {
                    Ast::new(AstKind::Or(Box::new(read), value.clone()), ast.span)
                });
                self.process_rewritten(rewritten, ast, ctx)
            }
            AstKind::AndAsgn { target, value } => {
                let rewritten = rewrite_compound(target, ast.span, |read| {
                    Ast::new(AstKind::And(Box::new(read), value.clone()), ast.span)
                });
                self.process_rewritten(rewritten, ast, ctx)
            }

            AstKind::Unsupported(kind) => Err(BuildError::Unsupported {
                kind: kind.clone(),
                span: ast.span,
            }),
        }
    }

    // ── Literals and containers ────────────────────────────────────────

    fn fed_by_parts(&mut self, kind: NodeKind, parts: &[Ast], ctx: Context) -> BuildResult {
        // Interpolated parts only matter for the bindings they make.
        let (_, ctx) = self.process_all(parts, ctx)?;
        Ok(Processed::new(self.add(kind, None), ctx))
    }

    fn handle_array(&mut self, elems: &[Ast], ctx: Context) -> BuildResult {
        let array = self.add(NodeKind::Array, None);
        let mut ctx = ctx;
        for elem in elems {
            match &elem.kind {
                AstKind::Splat(Some(inner)) => {
                    let processed = self.process(inner, ctx)?;
                    let splat = self.add(NodeKind::SplatArray, Some(elem.span));
                    self.edge(processed.node, splat);
                    self.edge(splat, array);
                    ctx = processed.ctx;
                }
                AstKind::Splat(None) => {}
                _ => {
                    let processed = self.process(elem, ctx)?;
                    self.edge(processed.node, array);
                    ctx = processed.ctx;
                }
            }
        }
        Ok(Processed::new(array, ctx))
    }

    fn handle_hash(&mut self, pairs: &[Ast], ctx: Context) -> BuildResult {
        let keys = self.add(NodeKind::HashKeys, None);
        let values = self.add(NodeKind::HashValues, None);
        let hash = self.add(NodeKind::Hash { keys, values }, None);
        self.edge(keys, hash);
        self.edge(values, hash);

        let mut ctx = ctx;
        for pair in pairs {
            match &pair.kind {
                AstKind::Pair { key, value } => {
                    let key = self.process(key, ctx)?;
                    let value = self.process(value, key.ctx)?;
                    self.edge(key.node, keys);
                    self.edge(value.node, values);
                    ctx = value.ctx;
                }
                AstKind::KwSplat(inner) => {
                    let inner = self.process(inner, ctx)?;
                    let inner_keys = self.add(NodeKind::UnwrapHashKeys, None);
                    let inner_values = self.add(NodeKind::UnwrapHashValues, None);
                    self.edge(inner.node, inner_keys);
                    self.edge(inner.node, inner_values);
                    self.edge(inner_keys, keys);
                    self.edge(inner_values, values);
                    ctx = inner.ctx;
                }
                _ => {
                    return Err(BuildError::Unsupported {
                        kind: "hash element".to_string(),
                        span: pair.span,
                    })
                }
            }
        }
        Ok(Processed::new(hash, ctx))
    }

    fn handle_range(&mut self, from: Option<&Ast>, to: Option<&Ast>, inclusive: bool, ctx: Context) -> BuildResult {
        let range = self.add(NodeKind::Range { inclusive }, None);
        let mut ctx = ctx;
        for (end, kind) in [(from, NodeKind::RangeFrom), (to, NodeKind::RangeTo)] {
            if let Some(end) = end {
                let processed = self.process(end, ctx)?;
                let node = self.add(kind, None);
                self.edge(processed.node, node);
                self.edge(node, range);
                ctx = processed.ctx;
            }
        }
        Ok(Processed::new(range, ctx))
    }

    // ── Variables ──────────────────────────────────────────────────────

    /// Storage behind `@name` for the current `self`.
    fn ivar_storage(&mut self, ctx: &Context, name: &str) -> NodeId {
        match &ctx.selfie {
            Selfie::Main => self.graph.main_ivar_definition(name),
            Selfie::Instance(scope) => self.graph.ivar_definition(scope, name),
            Selfie::Klass(scope) => self.graph.class_ivar_definition(scope, name),
        }
    }

    fn read(&mut self, kind: NodeKind, storage: NodeId, ast: &Ast, ctx: Context) -> BuildResult {
        let node = self.add(kind, Some(ast.span));
        self.edge(storage, node);
        Ok(Processed::new(node, ctx))
    }

    /// Store `value` into an assignment target (a valueless assignment, an
    /// attribute writer, a splat or a nested target list). Returns the node
    /// standing for the assignment.
    fn write_target(&mut self, target: &Ast, value: NodeId, ctx: Context) -> Result<(NodeId, Context), BuildError> {
        let span = Some(target.span);
        match &target.kind {
            AstKind::Lvasgn { name, .. } => {
                let node = self.add(NodeKind::Lvasgn(name.clone()), span);
                self.edge(value, node);
                Ok((node, ctx.bind(name, vec![node])))
            }
            AstKind::Ivasgn { name, .. } => {
                let node = self.add(NodeKind::Ivasgn(name.clone()), span);
                self.edge(value, node);
                let storage = self.ivar_storage(&ctx, name);
                self.edge(node, storage);
                Ok((node, ctx))
            }
            AstKind::Cvasgn { name, .. } => {
                let node = self.add(NodeKind::Cvasgn(name.clone()), span);
                self.edge(value, node);
                let storage = self.graph.cvar_definition(&ctx.scope(), name);
                self.edge(node, storage);
                Ok((node, ctx))
            }
            AstKind::Gvasgn { name, .. } => {
                let node = self.add(NodeKind::Gvasgn(name.clone()), span);
                self.edge(value, node);
                let storage = self.graph.gvar_definition(name);
                self.edge(node, storage);
                Ok((node, ctx))
            }
            AstKind::Casgn { path, .. } => {
                let node = self.assign_constant(path, value, &ctx);
                Ok((node, ctx))
            }
            AstKind::Send(send) => {
                let (receiver, ctx) = self.receiver(send.receiver.as_deref(), ctx)?;
                let call = self.process_call_args(&send.args, ctx)?;
                let mut args = call.args;
                let arg = self.add(NodeKind::CallArg, None);
                self.edge(value, arg);
                args.push(CallArg::regular(arg));
                let (result, _) = self.message_send(send, receiver, args, call.block);
                Ok((result, call.ctx))
            }
            AstKind::Splat(Some(inner)) => {
                let list = self.splatted(value);
                self.write_target(inner, list, ctx)
            }
            AstKind::Splat(None) => Ok((value, ctx)),
            AstKind::Mlhs(items) => {
                let processed = self.destructure(items, value, ctx)?;
                Ok((processed.node, processed.ctx))
            }
            _ => Err(BuildError::Unsupported {
                kind: "assignment target".to_string(),
                span: target.span,
            }),
        }
    }

    /// An array of the element types of `value`.
    fn splatted(&mut self, value: NodeId) -> NodeId {
        let elements = self.add(NodeKind::UnwrapArray, None);
        self.edge(value, elements);
        let list = self.add(NodeKind::Array, None);
        self.edge(elements, list);
        list
    }

    fn assign_constant(&mut self, path: &ConstPath, value: NodeId, ctx: &Context) -> NodeId {
        let const_ref = ConstRef::from_path(path, &ctx.nesting);
        let full = ctx.scope().increase_by_ref(&const_ref);
        self.tree.add_constant(crate::tree::Constant {
            name: const_ref.name().to_string(),
            scope: full.decrease(),
            location: Some(self.location(path.name_span)),
            definition: None,
        });
        let node = self.add(NodeKind::Casgn(const_ref), None);
        self.edge(value, node);
        let storage = self.graph.constant_definition(&full.to_const_name().to_string());
        self.edge(node, storage);
        node
    }

    fn handle_casgn(&mut self, ast: &Ast, path: &ConstPath, value: Option<&Ast>, ctx: Context) -> BuildResult {
        let Some(value) = value else {
            let nil = self.add(NodeKind::Nil, None);
            let (node, ctx) = self.write_target(ast, nil, ctx)?;
            return Ok(Processed::new(node, ctx));
        };
        if let Some((kind, body)) = self.dynamic_definition(value, &ctx) {
            let const_ref = ConstRef::from_path(path, &ctx.nesting);
            let definition = self.register_definition(path, kind, &ctx);
            if let Some(body) = body {
                self.process_definition_body(definition, &const_ref, Some(body), &ctx)?;
            }
            return self.leaf(NodeKind::Const(const_ref), ast, ctx);
        }
        let value = self.process(value, ctx)?;
        let node = self.assign_constant(path, value.node, &value.ctx);
        Ok(Processed::new(node, value.ctx))
    }

    /// `Class.new(Parent)` or `Module.new`, with an optional body block.
    fn dynamic_definition<'t>(&self, value: &'t Ast, ctx: &Context) -> Option<(DefinitionKind, Option<&'t Ast>)> {
        let (call, body) = match &value.kind {
            AstKind::Block { call, body, .. } => (call.as_ref(), body.as_deref()),
            _ => (value, None),
        };
        let AstKind::Send(send) = &call.kind else {
            return None;
        };
        if send.name != "new" {
            return None;
        }
        let Some(AstKind::Const(receiver)) = send.receiver.as_deref().map(|r| &r.kind) else {
            return None;
        };
        match receiver.segments.as_slice() {
            [name] if name == "Class" => {
                let parent = send.args.first().and_then(|arg| match &arg.kind {
                    AstKind::Const(path) => Some(ConstRef::from_path(path, &ctx.nesting)),
                    _ => None,
                });
                Some((DefinitionKind::Klass { parent }, body))
            }
            [name] if name == "Module" => Some((DefinitionKind::Mod, body)),
            _ => None,
        }
    }

    // ── Calls ──────────────────────────────────────────────────────────

    fn receiver(&mut self, receiver: Option<&Ast>, ctx: Context) -> Result<(NodeId, Context), BuildError> {
        match receiver {
            Some(receiver) => {
                let processed = self.process(receiver, ctx)?;
                Ok((processed.node, processed.ctx))
            }
            None => Ok((self.add(NodeKind::Self_(ctx.selfie.clone()), None), ctx)),
        }
    }

    fn process_call_args(&mut self, asts: &[Ast], ctx: Context) -> Result<CallArgs, BuildError> {
        let mut args = Vec::with_capacity(asts.len());
        let mut block = None;
        let mut ctx = ctx;
        for ast in asts {
            let (value, kind) = match &ast.kind {
                AstKind::Splat(None) | AstKind::BlockPass(None) => continue,
                AstKind::BlockPass(Some(inner)) => {
                    block = Some(match &inner.kind {
                        AstKind::Sym(name) => Block::Symbol(name.clone()),
                        _ => {
                            let processed = self.process(inner, ctx)?;
                            ctx = processed.ctx;
                            Block::Pass(processed.node)
                        }
                    });
                    continue;
                }
                AstKind::Splat(Some(inner)) => (inner.as_ref(), CallArgKind::Splat),
                AstKind::Hash { braces: false, pairs } if forwards_keywords(pairs) => {
                    (ast, CallArgKind::ForwardedKeywords)
                }
                AstKind::Hash { braces: false, .. } => (ast, CallArgKind::Keywords),
                _ => (ast, CallArgKind::Regular),
            };
            let processed = self.process(value, ctx)?;
            let node = self.add(NodeKind::CallArg, None);
            self.edge(processed.node, node);
            args.push(CallArg { node, kind });
            ctx = processed.ctx;
        }
        Ok(CallArgs { args, block, ctx })
    }

    /// Queue a message send and return its result node.
    fn message_send(
        &mut self,
        send: &garnet_syntax::Send,
        receiver: NodeId,
        args: Vec<CallArg>,
        block: Option<Block>,
    ) -> (NodeId, SendId) {
        let call_obj = self.add(NodeKind::CallObj, None);
        self.edge(receiver, call_obj);
        let result = self.add(
            NodeKind::CallResult {
                csend: send.safe_navigation,
            },
            None,
        );
        let selector = (!send.selector.is_empty()).then(|| self.location(send.selector));
        let id = self.worklist.add(PendingSend::Message(MessageSend {
            name: send.name.clone(),
            receiver: call_obj,
            args,
            result,
            block,
            csend: send.safe_navigation,
            selector,
        }));
        (result, id)
    }

    fn handle_send(&mut self, send: &garnet_syntax::Send, ctx: Context) -> BuildResult {
        let (receiver, ctx) = self.receiver(send.receiver.as_deref(), ctx)?;
        let call = self.process_call_args(&send.args, ctx)?;

        if send.receiver.is_none() {
            if let Some(visibility) = Visibility::from_name(&send.name) {
                return Ok(self.handle_visibility(visibility, &send.args, call.ctx));
            }
            match send.name.as_str() {
                "attr_reader" | "attr_writer" | "attr_accessor" => {
                    return Ok(self.handle_attr(send, call.ctx));
                }
                "__method__" => {
                    let kind = match call.ctx.analyzed_method {
                        Some(method) => NodeKind::Sym(self.tree.method(method).name.clone()),
                        None => NodeKind::Nil,
                    };
                    return Ok(Processed::new(self.add(kind, None), call.ctx));
                }
                _ => {}
            }
        }
        if call.args.is_empty() && call.block.is_none() {
            let reflected = match send.name.as_str() {
                "class" => Some(NodeKind::ExtractClass),
                "freeze" => Some(NodeKind::Freeze),
                _ => None,
            };
            if let Some(kind) = reflected {
                let node = self.add(kind, None);
                self.edge(receiver, node);
                return Ok(Processed::new(node, call.ctx));
            }
        }

        let (result, send_id) = self.message_send(send, receiver, call.args, call.block);
        Ok(Processed {
            node: result,
            ctx: call.ctx,
            send: Some(send_id),
        })
    }

    /// `private`, `public`, `protected` without a receiver.
    fn handle_visibility(&mut self, visibility: Visibility, args: &[Ast], ctx: Context) -> Processed {
        let class_name = match ctx.analyzed_klass.definition {
            Some(definition) => self.tree.definition(definition).name.clone(),
            None => "Object".to_string(),
        };
        let node = self.add(
            NodeKind::Const(ConstRef::from_full_name(&class_name, Nesting::empty())),
            None,
        );
        if ctx.analyzed_klass.definition.is_none() {
            return Processed::new(node, ctx);
        }
        if args.is_empty() {
            return Processed::new(node, ctx.with_visibility(visibility));
        }
        let scope = ctx.scope();
        for arg in args {
            let name = match &arg.kind {
                AstKind::Sym(name) => Some(name.clone()),
                AstKind::Str => Some(unquote(self.text(arg.span)).to_string()),
                AstKind::Def(def) => Some(def.name.clone()),
                _ => None,
            };
            if let Some(name) = name {
                self.tree.change_method_visibility(&scope, &name, visibility);
            }
        }
        Processed::new(node, ctx)
    }

    fn handle_attr(&mut self, send: &garnet_syntax::Send, ctx: Context) -> Processed {
        let location = self.location(send.selector);
        let scope = ctx.scope();
        let owner = self.method_owner(&ctx);
        let reader = send.name != "attr_writer";
        let writer = send.name != "attr_reader";
        for arg in &send.args {
            let name = match &arg.kind {
                AstKind::Sym(name) => name.clone(),
                AstKind::Str => unquote(self.text(arg.span)).to_string(),
                _ => continue,
            };
            let storage = self.graph.ivar_definition(&scope, &format!("@{name}"));
            if reader {
                let result = self.add(NodeKind::MethodResult, None);
                self.edge(storage, result);
                self.tree.add_method(
                    owner,
                    scope.clone(),
                    &name,
                    Some(location.clone()),
                    ctx.analyzed_klass.visibility,
                    ArgumentsTree::default(),
                    result,
                );
            }
            if writer {
                let formal_name = "_attr_writer";
                let formal = self.add(NodeKind::FormalArg(formal_name.to_string()), None);
                let result = self.add(NodeKind::MethodResult, None);
                self.edge(formal, storage);
                self.edge(storage, result);
                let args = ArgumentsTree {
                    args: vec![Arg {
                        name: Some(formal_name.to_string()),
                        kind: ArgKind::Regular,
                        node: formal,
                    }],
                    ..ArgumentsTree::default()
                };
                self.tree.add_method(
                    owner,
                    scope.clone(),
                    &format!("{name}="),
                    Some(location.clone()),
                    ctx.analyzed_klass.visibility,
                    args,
                    result,
                );
            }
        }
        Processed::new(self.add(NodeKind::Nil, None), ctx)
    }

    fn handle_block(&mut self, call: &Ast, params: &Params, body: Option<&Ast>, ctx: Context) -> BuildResult {
        if is_lambda_call(call) {
            let (lambda, ctx) = self.build_lambda(params, body, ctx)?;
            return Ok(Processed::new(self.add(NodeKind::Lambda(lambda), None), ctx));
        }
        let call = self.process(call, ctx)?;
        let (lambda, ctx) = self.build_lambda(params, body, call.ctx)?;
        if let Some(send) = call.send {
            self.worklist.set_block(send, Block::Literal(lambda));
        }
        Ok(Processed {
            node: call.node,
            ctx,
            send: call.send,
        })
    }

    /// Register a block or lambda body. Assignments inside it to variables
    /// that already exist outside stay visible after it.
    fn build_lambda(&mut self, params: &Params, body: Option<&Ast>, ctx: Context) -> Result<(crate::tree::LambdaId, Context), BuildError> {
        let (args, body_ctx) = self.build_args(params, ctx.clone())?;
        let body = self.process_opt(body, body_ctx)?;
        let result = self.add(NodeKind::BlockResult, None);
        self.edge(body.node, result);
        let lambda = self.tree.add_lambda(args, result);

        let mut lenv = ctx.lenv.clone();
        for (name, nodes) in lenv.iter_mut() {
            for &node in body.ctx.lookup(name) {
                if !nodes.contains(&node) {
                    nodes.push(node);
                }
            }
        }
        Ok((lambda, ctx.with_lenv(lenv)))
    }

    // ── Definitions ────────────────────────────────────────────────────

    /// Where an instance method defined here lives: the class being
    /// defined, its eigenclass inside `class << self`, or `Object`.
    fn method_owner(&mut self, ctx: &Context) -> DefinitionId {
        let base = match ctx.analyzed_klass.definition {
            Some(definition) => definition,
            None => self.tree.object(),
        };
        if ctx.scope().is_metaklass() {
            self.tree.eigenclass_of(base)
        } else {
            base
        }
    }

    fn handle_def(&mut self, def: &MethodDef, span: Span, ctx: Context, singleton: bool) -> BuildResult {
        let (scope, owner, selfie) = if singleton {
            let base = match ctx.analyzed_klass.definition {
                Some(definition) => definition,
                None => self.tree.object(),
            };
            let owner = self.tree.eigenclass_of(base);
            (ctx.scope().increase_by_metaklass(), owner, Selfie::Klass(ctx.scope().without_metaklass()))
        } else {
            let scope = ctx.scope();
            let owner = self.method_owner(&ctx);
            (scope.clone(), owner, Selfie::instance(scope))
        };

        let result = self.add(NodeKind::MethodResult, None);
        let location = self.location(span);
        let method = self.tree.add_method(
            owner,
            scope,
            &def.name,
            Some(location),
            ctx.analyzed_klass.visibility,
            ArgumentsTree::default(),
            result,
        );

        let body_ctx = ctx
            .clone()
            .with_selfie(selfie)
            .with_analyzed_method(Some(method))
            .with_lenv(FxHashMap::default());
        let (args, body_ctx) = self.build_args(&def.params, body_ctx)?;
        self.tree.set_method_args(method, args);
        let body = self.process_opt(def.body.as_deref(), body_ctx)?;
        self.edge(body.node, result);

        let node = self.add(NodeKind::Sym(def.name.clone()), Some(def.name_span));
        Ok(Processed::new(node, ctx))
    }

    fn register_definition(&mut self, name: &ConstPath, kind: DefinitionKind, ctx: &Context) -> DefinitionId {
        let const_ref = ConstRef::from_path(name, &ctx.nesting);
        let full = ctx.scope().increase_by_ref(&const_ref);
        let location = self.location(name.name_span);
        self.tree.define(full.decrease(), const_ref.name(), kind, Some(location))
    }

    fn process_definition_body(
        &mut self,
        definition: DefinitionId,
        const_ref: &ConstRef,
        body: Option<&Ast>,
        ctx: &Context,
    ) -> Result<(), BuildError> {
        let nesting = ctx.nesting.increase_nesting_const(const_ref.clone());
        let body_ctx = ctx
            .clone()
            .with_selfie(Selfie::Klass(nesting.to_scope()))
            .with_nesting(nesting)
            .with_analyzed_klass(Some(definition))
            .with_analyzed_method(None)
            .with_lenv(FxHashMap::default());
        self.process_opt(body, body_ctx)?;
        Ok(())
    }

    fn handle_class(&mut self, name: &ConstPath, superclass: Option<&Ast>, body: Option<&Ast>, ctx: Context) -> BuildResult {
        let mut ctx = ctx;
        let parent = match superclass {
            Some(Ast {
                kind: AstKind::Const(path),
                ..
            }) => Some(ConstRef::from_path(path, &ctx.nesting)),
            Some(other) => {
                ctx = self.process(other, ctx)?.ctx;
                None
            }
            None => None,
        };
        let const_ref = ConstRef::from_path(name, &ctx.nesting);
        let definition = self.register_definition(name, DefinitionKind::Klass { parent }, &ctx);
        self.process_definition_body(definition, &const_ref, body, &ctx)?;
        Ok(Processed::new(self.add(NodeKind::Nil, None), ctx))
    }

    fn handle_module(&mut self, name: &ConstPath, body: Option<&Ast>, ctx: Context) -> BuildResult {
        let const_ref = ConstRef::from_path(name, &ctx.nesting);
        let definition = self.register_definition(name, DefinitionKind::Mod, &ctx);
        self.process_definition_body(definition, &const_ref, body, &ctx)?;
        Ok(Processed::new(self.add(NodeKind::Nil, None), ctx))
    }

    /// Formal parameters of a method, block or lambda, bound in `ctx`.
    fn build_args(&mut self, params: &Params, ctx: Context) -> Result<(ArgumentsTree, Context), BuildError> {
        let mut tree = ArgumentsTree::default();
        let mut ctx = ctx;
        for param in &params.0 {
            ctx = self.build_param(param, &mut tree, ctx)?;
        }
        Ok((tree, ctx))
    }

    fn build_param(&mut self, param: &Param, tree: &mut ArgumentsTree, ctx: Context) -> Result<Context, BuildError> {
        let span = Some(param.span);
        let formal = |kind: ArgKind, name: &Option<String>, node: NodeId| Arg {
            name: name.clone(),
            kind,
            node,
        };
        let bind = |ctx: Context, name: &Option<String>, node: NodeId| match name {
            Some(name) => ctx.bind(name, vec![node]),
            None => ctx,
        };
        match &param.kind {
            ParamKind::Arg(name) => {
                let node = self.add(NodeKind::FormalArg(name.clone()), span);
                let name = Some(name.clone());
                tree.args.push(formal(ArgKind::Regular, &name, node));
                Ok(bind(ctx, &name, node))
            }
            ParamKind::OptArg(name, default) => {
                let default = self.process(default, ctx)?;
                let node = self.add(NodeKind::FormalOptArg(name.clone()), span);
                self.edge(default.node, node);
                let name = Some(name.clone());
                tree.args.push(formal(ArgKind::Optional, &name, node));
                Ok(bind(default.ctx, &name, node))
            }
            ParamKind::RestArg(name) => {
                let node = self.add(NodeKind::FormalRestArg(name.clone()), span);
                tree.args.push(formal(ArgKind::Splat, name, node));
                Ok(bind(ctx, name, node))
            }
            ParamKind::KwArg(name) => {
                let node = self.add(NodeKind::FormalKwArg(name.clone()), span);
                let name = Some(name.clone());
                tree.kwargs.push(formal(ArgKind::Keyword, &name, node));
                Ok(bind(ctx, &name, node))
            }
            ParamKind::KwOptArg(name, default) => {
                let default = self.process(default, ctx)?;
                let node = self.add(NodeKind::FormalKwOptArg(name.clone()), span);
                self.edge(default.node, node);
                let name = Some(name.clone());
                tree.kwargs.push(formal(ArgKind::KeywordOptional, &name, node));
                Ok(bind(default.ctx, &name, node))
            }
            ParamKind::KwRestArg(name) => {
                let node = self.add(NodeKind::FormalKwRestArg(name.clone()), span);
                tree.kwargs.push(formal(ArgKind::KeywordSplat, name, node));
                Ok(bind(ctx, name, node))
            }
            ParamKind::BlockArg(name) => {
                let node = self.add(NodeKind::FormalBlockArg(name.clone()), span);
                tree.block = Some(formal(ArgKind::Block, name, node));
                Ok(bind(ctx, name, node))
            }
            ParamKind::Mlhs(nested) => {
                let node = self.add(NodeKind::FormalMlhs, span);
                let (args, ctx) = self.build_nested(nested, node, ctx)?;
                tree.args.push(formal(ArgKind::Nested(args), &None, node));
                Ok(ctx)
            }
            ParamKind::Forward => {
                let rest = self.add(NodeKind::FormalRestArg(None), span);
                let kwrest = self.add(NodeKind::FormalKwRestArg(None), span);
                let block = self.add(NodeKind::FormalBlockArg(None), span);
                tree.args.push(formal(ArgKind::Splat, &None, rest));
                tree.kwargs.push(formal(ArgKind::KeywordSplat, &None, kwrest));
                tree.block = Some(formal(ArgKind::Block, &None, block));
                Ok(ctx
                    .bind(FORWARDED_REST, vec![rest])
                    .bind(FORWARDED_KWREST, vec![kwrest])
                    .bind(FORWARDED_BLOCK, vec![block]))
            }
        }
    }

    /// Parameters inside a destructuring parameter, fed by the elements of
    /// the value reaching `outer`.
    fn build_nested(&mut self, params: &[Param], outer: NodeId, ctx: Context) -> Result<(Vec<Arg>, Context), BuildError> {
        let elements = self.add(NodeKind::UnwrapArray, None);
        self.edge(outer, elements);
        let mut args = Vec::with_capacity(params.len());
        let mut ctx = ctx;
        for param in params {
            let span = Some(param.span);
            match &param.kind {
                ParamKind::Mlhs(inner) => {
                    let node = self.add(NodeKind::FormalMlhs, span);
                    self.edge(elements, node);
                    let (inner_args, next) = self.build_nested(inner, node, ctx)?;
                    args.push(Arg {
                        name: None,
                        kind: ArgKind::Nested(inner_args),
                        node,
                    });
                    ctx = next;
                }
                ParamKind::RestArg(name) => {
                    let node = self.add(NodeKind::FormalRestArg(name.clone()), span);
                    self.edge(elements, node);
                    args.push(Arg {
                        name: name.clone(),
                        kind: ArgKind::Splat,
                        node,
                    });
                    if let Some(name) = name {
                        ctx = ctx.bind(name, vec![node]);
                    }
                }
                other => {
                    let name = match other {
                        ParamKind::Arg(name) | ParamKind::OptArg(name, _) => Some(name.clone()),
                        _ => None,
                    };
                    let node = self.add(NodeKind::FormalArg(name.clone().unwrap_or_default()), span);
                    self.edge(elements, node);
                    if let Some(name) = &name {
                        ctx = ctx.bind(name, vec![node]);
                    }
                    args.push(Arg {
                        name,
                        kind: ArgKind::Regular,
                        node,
                    });
                }
            }
        }
        Ok((args, ctx))
    }

    // ── Control flow ───────────────────────────────────────────────────

    fn merge_all(&self, contexts: Vec<Context>, span: Span) -> Result<Context, BuildError> {
        let mut contexts = contexts.into_iter();
        let Some(first) = contexts.next() else {
            return Err(BuildError::ContextMismatch { span });
        };
        contexts.try_fold(first, |merged, next| merge_contexts(merged, next, span))
    }

    fn handle_binary(&mut self, kind: NodeKind, left: &Ast, right: &Ast, ctx: Context) -> BuildResult {
        let left = self.process(left, ctx)?;
        let right = self.process(right, left.ctx)?;
        let node = self.add(kind, None);
        self.edge(left.node, node);
        self.edge(right.node, node);
        Ok(Processed::new(node, right.ctx))
    }

    fn handle_if(
        &mut self,
        ast: &Ast,
        cond: &Ast,
        then_branch: Option<&Ast>,
        else_branch: Option<&Ast>,
        ctx: Context,
    ) -> BuildResult {
        let cond = self.process(cond, ctx)?;
        let then_branch = self.process_opt(then_branch, cond.ctx.clone())?;
        let else_branch = self.process_opt(else_branch, cond.ctx)?;
        let node = self.add(NodeKind::IfResult, None);
        self.edge(then_branch.node, node);
        self.edge(else_branch.node, node);
        let ctx = merge_contexts(then_branch.ctx, else_branch.ctx, ast.span)?;
        Ok(Processed::new(node, ctx))
    }

    fn handle_rescue(
        &mut self,
        ast: &Ast,
        body: Option<&Ast>,
        handlers: &[ResBody],
        else_branch: Option<&Ast>,
        ctx: Context,
    ) -> BuildResult {
        let body = self.process_opt(body, ctx)?;
        let node = self.add(NodeKind::Rescue, None);
        let mut branches = Vec::with_capacity(handlers.len() + 1);
        for handler in handlers {
            let handled = self.handle_resbody(handler, body.ctx.clone())?;
            self.edge(handled.node, node);
            branches.push(handled.ctx);
        }
        match else_branch {
            Some(else_branch) => {
                let otherwise = self.process(else_branch, body.ctx)?;
                self.edge(otherwise.node, node);
                branches.push(otherwise.ctx);
            }
            None => {
                self.edge(body.node, node);
                branches.push(body.ctx);
            }
        }
        let ctx = self.merge_all(branches, ast.span)?;
        Ok(Processed::new(node, ctx))
    }

    fn handle_resbody(&mut self, handler: &ResBody, ctx: Context) -> BuildResult {
        let mut ctx = ctx;
        let rescued = match &handler.exceptions {
            Some(exceptions) => {
                let (nodes, next) = self.process_all(exceptions, ctx)?;
                ctx = next;
                let rescued = self.add(NodeKind::Rescued { declared: true }, None);
                for exception in nodes {
                    self.edge(exception, rescued);
                }
                rescued
            }
            None => self.add(NodeKind::Rescued { declared: false }, None),
        };
        if let Some(variable) = &handler.variable {
            ctx = self.write_target(variable, rescued, ctx)?.1;
        }
        self.process_opt(handler.body.as_deref(), ctx)
    }

    // ── Assignment forms ───────────────────────────────────────────────

    /// Assign element `i` of `value` to target `i`. A splat target takes
    /// the elements as an array. The value is the array of all targets.
    fn destructure(&mut self, targets: &[Ast], value: NodeId, ctx: Context) -> BuildResult {
        let array = self.add(NodeKind::Array, None);
        let mut ctx = ctx;
        for target in targets {
            let element = match &target.kind {
                AstKind::Splat(_) => value,
                _ => self.index_send(value),
            };
            let (written, next) = self.write_target(target, element, ctx)?;
            self.edge(written, array);
            ctx = next;
        }
        Ok(Processed::new(array, ctx))
    }

    /// `value[i]`, queued without a selector.
    fn index_send(&mut self, value: NodeId) -> NodeId {
        let call_obj = self.add(NodeKind::CallObj, None);
        self.edge(value, call_obj);
        let literal = self.add(NodeKind::Int, None);
        let arg = self.add(NodeKind::CallArg, None);
        self.edge(literal, arg);
        let result = self.add(NodeKind::CallResult { csend: false }, None);
        self.worklist.add(PendingSend::Message(MessageSend {
            name: "[]".to_string(),
            receiver: call_obj,
            args: vec![CallArg::regular(arg)],
            result,
            block: None,
            csend: false,
            selector: None,
        }));
        result
    }

    fn process_rewritten(&mut self, rewritten: Option<Ast>, original: &Ast, ctx: Context) -> BuildResult {
        match rewritten {
            Some(rewritten) => self.process(&rewritten, ctx),
            None => Err(BuildError::Unsupported {
                kind: "compound assignment target".to_string(),
                span: original.span,
            }),
        }
    }

    fn keyword_location(&self, span: Span, keyword: &str) -> Location {
        let end = (span.start + keyword.len() as u32).min(span.end);
        self.location(Span::new(span.start, end))
    }
}

/// Rewrite `target op= value` into a plain assignment whose value is
/// `combine(read of target)`.
fn rewrite_compound(target: &Ast, span: Span, combine: impl FnOnce(Ast) -> Ast) -> Option<Ast> {
    let read_kind = match &target.kind {
        AstKind::Lvasgn { name, .. } => AstKind::Lvar(name.clone()),
        AstKind::Ivasgn { name, .. } => AstKind::Ivar(name.clone()),
        AstKind::Cvasgn { name, .. } => AstKind::Cvar(name.clone()),
        AstKind::Gvasgn { name, .. } => AstKind::Gvar(name.clone()),
        AstKind::Casgn { path, .. } => AstKind::Const(path.clone()),
        AstKind::Send(send) => {
            let reader = Ast::new(AstKind::Send(send.clone()), target.span);
            let value = combine(reader);
            let mut args = send.args.clone();
            args.push(value);
            let writer = garnet_syntax::Send {
                receiver: send.receiver.clone(),
                name: format!("{}=", send.name),
                selector: Span::default(),
                args,
                safe_navigation: send.safe_navigation,
            };
            return Some(Ast::new(AstKind::Send(Box::new(writer)), span));
        }
        _ => return None,
    };
    let value = Some(Box::new(combine(Ast::new(read_kind, target.span))));
    let kind = match &target.kind {
        AstKind::Lvasgn { name, .. } => AstKind::Lvasgn { name: name.clone(), value },
        AstKind::Ivasgn { name, .. } => AstKind::Ivasgn { name: name.clone(), value },
        AstKind::Cvasgn { name, .. } => AstKind::Cvasgn { name: name.clone(), value },
        AstKind::Gvasgn { name, .. } => AstKind::Gvasgn { name: name.clone(), value },
        AstKind::Casgn { path, .. } => AstKind::Casgn { path: path.clone(), value },
        _ => return None,
    };
    Some(Ast::new(kind, span))
}

/// `lambda` with no receiver or arguments, as in `lambda { |x| x }`.
fn is_lambda_call(call: &Ast) -> bool {
    matches!(&call.kind, AstKind::Send(send)
        if send.receiver.is_none() && send.name == "lambda" && send.args.is_empty())
}

/// The keyword list a `...` argument expands to.
fn forwards_keywords(pairs: &[Ast]) -> bool {
    matches!(pairs, [Ast { kind: AstKind::KwSplat(inner), .. }]
        if matches!(&inner.kind, AstKind::Lvar(name) if name == FORWARDED_KWREST))
}

fn unquote(text: &str) -> &str {
    text.trim_matches(|c| c == '"' || c == '\'')
}
