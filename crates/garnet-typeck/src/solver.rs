//! The fixpoint solver.
//!
//! Types flow along graph edges from a FIFO dirty queue. Once the queue is
//! drained, every pending send is dispatched on the current type of its
//! receiver, which may add edges (argument wiring, result wiring, block
//! wiring) and so make more nodes dirty. Rounds repeat until a round adds
//! nothing.
//!
//! Formal arguments and method results are shared by every call site, so
//! a parameter's type is the union over all callers.

use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, warn};

use crate::graph::{Derived, Graph};
use crate::node::{NodeId, NodeKind};
use crate::context::Selfie;
use crate::tree::{Arg, ArgKind, ArgumentsTree, GlobalTree, LambdaId, MethodId};
use crate::ty::Type;
use crate::worklist::{Block, CallArg, CallArgKind, PendingSend, Super0Send, SuperSend, Worklist};

/// Default bound on solver rounds.
pub const DEFAULT_MAX_ROUNDS: usize = 10_000;

/// The inferred type of every node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Typing {
    types: Vec<Type>,
    rounds: usize,
}

impl Typing {
    /// Type of `id`; nodes created after solving are `Bottom`.
    pub fn type_of(&self, id: NodeId) -> &Type {
        self.types.get(id.index()).unwrap_or(&Type::Bottom)
    }

    pub fn types(&self) -> &[Type] {
        &self.types
    }

    /// Rounds the solver ran before reaching its fixpoint or its bound.
    pub fn rounds(&self) -> usize {
        self.rounds
    }
}

/// A message send in solver form. Symbol blocks (`&:succ`) turn into
/// extra calls of this shape with no arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Call {
    name: String,
    receiver: NodeId,
    args: Vec<CallArg>,
    result: NodeId,
    block: Option<Block>,
}

pub fn solve(graph: &mut Graph, tree: &GlobalTree, worklist: &Worklist, max_rounds: usize) -> Typing {
    let mut solver = Solver::new(graph, tree, worklist);
    solver.run(max_rounds)
}

struct Solver<'a> {
    graph: &'a mut Graph,
    tree: &'a GlobalTree,
    types: Vec<Type>,
    queued: Vec<bool>,
    queue: VecDeque<NodeId>,
    /// Constants resolved to classes, by node.
    fixed: FxHashMap<NodeId, Type>,
    calls: Vec<Call>,
    known_calls: FxHashSet<Call>,
    supers: Vec<PendingSend>,
    /// Blocks passed to each method so far, forwarded by `super`.
    method_blocks: FxHashMap<MethodId, Vec<Block>>,
    /// Edges and calls added in the current round.
    changes: usize,
}

impl<'a> Solver<'a> {
    fn new(graph: &'a mut Graph, tree: &'a GlobalTree, worklist: &Worklist) -> Self {
        let mut calls = Vec::new();
        let mut supers = Vec::new();
        for send in worklist.sends() {
            match send {
                PendingSend::Message(send) => calls.push(Call {
                    name: send.name.clone(),
                    receiver: send.receiver,
                    args: send.args.clone(),
                    result: send.result,
                    block: send.block.clone(),
                }),
                other => supers.push(other.clone()),
            }
        }
        let known_calls = calls.iter().cloned().collect();
        let len = graph.len();
        Solver {
            graph,
            tree,
            types: vec![Type::Bottom; len],
            queued: vec![true; len],
            queue: (0..len as u32).map(NodeId).collect(),
            fixed: FxHashMap::default(),
            calls,
            known_calls,
            supers,
            method_blocks: FxHashMap::default(),
            changes: 0,
        }
    }

    fn run(&mut self, max_rounds: usize) -> Typing {
        self.resolve_constants();
        let mut rounds = 0;
        loop {
            if rounds == max_rounds {
                warn!(max_rounds, "solver stopped before reaching a fixpoint");
                break;
            }
            rounds += 1;
            self.propagate();
            self.changes = 0;
            self.resolve_sends();
            debug!(
                round = rounds,
                changes = self.changes,
                dirty = self.queue.len(),
                nodes = self.types.len(),
                "solver round"
            );
            if self.changes == 0 && self.queue.is_empty() {
                break;
            }
        }
        Typing {
            types: self.types.clone(),
            rounds,
        }
    }

    // ── Queue bookkeeping ──────────────────────────────────────────────

    fn enqueue(&mut self, id: NodeId) {
        if !self.queued[id.index()] {
            self.queued[id.index()] = true;
            self.queue.push_back(id);
        }
    }

    /// Track nodes the graph gained since the last call.
    fn sync(&mut self) {
        while self.types.len() < self.graph.len() {
            let id = NodeId(self.types.len() as u32);
            self.types.push(Type::Bottom);
            self.queued.push(false);
            self.enqueue(id);
        }
    }

    fn connect(&mut self, from: NodeId, to: NodeId) {
        if self.graph.add_edge(from, to) {
            self.changes += 1;
            self.enqueue(to);
        }
    }

    fn derived(&mut self, what: Derived, source: NodeId) -> NodeId {
        let (id, created) = self.graph.derived(what, source);
        if created {
            self.changes += 1;
            self.sync();
        }
        id
    }

    fn constructed(&mut self, ty: Type) -> NodeId {
        let id = self.graph.constructed(ty);
        self.sync();
        id
    }

    fn ty(&self, id: NodeId) -> &Type {
        &self.types[id.index()]
    }

    // ── Propagation ────────────────────────────────────────────────────

    fn resolve_constants(&mut self) {
        let tree = self.tree;
        let consts: Vec<_> = self
            .graph
            .nodes()
            .filter_map(|(id, node)| match &node.kind {
                NodeKind::Const(const_ref) => Some((id, const_ref.clone())),
                _ => None,
            })
            .collect();
        for (id, const_ref) in consts {
            match tree.solve_reference(&const_ref) {
                Some(constant) if constant.definition.is_some() => {
                    self.fixed.insert(id, Type::class(constant.full_name()));
                }
                Some(constant) => {
                    let storage = self.graph.constant_definition(&constant.full_name());
                    self.sync();
                    self.connect(storage, id);
                }
                None => {
                    self.fixed.insert(id, Type::class(const_ref.relative_name()));
                }
            }
        }
    }

    fn propagate(&mut self) {
        while let Some(id) = self.queue.pop_front() {
            self.queued[id.index()] = false;
            let ty = self.transfer(id);
            if ty != self.types[id.index()] {
                self.types[id.index()] = ty;
                for i in 0..self.graph.outgoing(id).len() {
                    let next = self.graph.outgoing(id)[i];
                    self.enqueue(next);
                }
            }
        }
    }

    fn incoming(&self, id: NodeId) -> Type {
        Type::union(self.graph.incoming(id).iter().map(|&i| self.ty(i).clone()))
    }

    fn transfer(&self, id: NodeId) -> Type {
        let node = self.graph.node(id);
        let nominal = Type::nominal;
        match &node.kind {
            NodeKind::Int => nominal("Integer"),
            NodeKind::Float => nominal("Float"),
            NodeKind::Rational => nominal("Rational"),
            NodeKind::Complex => nominal("Complex"),
            NodeKind::Bool | NodeKind::Not => nominal("Boolean"),
            NodeKind::Nil => nominal("Nil"),
            NodeKind::Str | NodeKind::XStr | NodeKind::DStr => nominal("String"),
            NodeKind::NthRef(_) | NodeKind::BackRef(_) => nominal("String"),
            NodeKind::Sym(_) | NodeKind::DSym => nominal("Symbol"),
            NodeKind::Regexp => nominal("Regexp"),
            NodeKind::Defined => Type::union([nominal("String"), nominal("Nil")]),
            NodeKind::Array | NodeKind::FormalRestArg(_) => {
                Type::generic("Array", vec![self.incoming(id)])
            }
            NodeKind::Range { .. } => Type::generic("Range", vec![self.incoming(id)]),
            NodeKind::Hash { keys, values } => Type::generic(
                "Hash",
                vec![self.ty(*keys).clone(), self.ty(*values).clone()],
            ),
            NodeKind::SplatArray | NodeKind::UnwrapArray => {
                let ins = self.incoming(id);
                Type::union(ins.members().iter().flat_map(elements))
            }
            NodeKind::UnwrapHashKeys => {
                let ins = self.incoming(id);
                Type::union(ins.members().iter().filter_map(|t| hash_arg(t, 0)))
            }
            NodeKind::UnwrapHashValues => {
                let ins = self.incoming(id);
                Type::union(ins.members().iter().filter_map(|t| hash_arg(t, 1)))
            }
            NodeKind::Self_(selfie) => self_type(selfie),
            NodeKind::And | NodeKind::Or => Type::union([self.incoming(id), nominal("Boolean")]),
            NodeKind::ExtractClass => {
                let ins = self.incoming(id);
                Type::union(ins.members().iter().filter_map(|t| match t {
                    Type::Nominal(name) | Type::Generic(name, _) => Some(Type::class(name.clone())),
                    Type::Class(_) => Some(Type::class("Class")),
                    _ => None,
                }))
            }
            NodeKind::Lambda(lambda) => Type::Proc(*lambda),
            NodeKind::Rescued { declared: false } => nominal("StandardError"),
            NodeKind::Rescued { declared: true } => {
                let ins = self.incoming(id);
                Type::union(ins.members().iter().flat_map(rescued))
            }
            NodeKind::Bottom => Type::Bottom,
            NodeKind::Constructed(ty) => ty.clone(),
            NodeKind::Const(_) => match self.fixed.get(&id) {
                Some(ty) => ty.clone(),
                None => self.incoming(id),
            },
            _ => self.incoming(id),
        }
    }

    // ── Dispatch ───────────────────────────────────────────────────────

    fn resolve_sends(&mut self) {
        let mut i = 0;
        while i < self.calls.len() {
            let call = self.calls[i].clone();
            self.resolve_call(&call);
            i += 1;
        }
        for i in 0..self.supers.len() {
            match self.supers[i].clone() {
                PendingSend::Super(send) => self.resolve_super(&send),
                PendingSend::Super0(send) => self.resolve_super0(&send),
                PendingSend::Message(_) => {}
            }
        }
    }

    fn resolve_call(&mut self, call: &Call) {
        let receiver = self.ty(call.receiver).clone();
        for member in receiver.members() {
            match member {
                Type::Nominal(name) => {
                    let methods = self.tree.find_instance_methods(lookup_name(name), &call.name);
                    self.wire_methods(&methods, call);
                }
                Type::Generic(name, _) => {
                    if !self.intrinsic(name, call) {
                        let methods = self.tree.find_instance_methods(name, &call.name);
                        self.wire_methods(&methods, call);
                    }
                }
                Type::Class(name) => {
                    let methods = self.tree.find_class_methods(name, &call.name);
                    if call.name == "new" && methods.is_empty() {
                        self.construct(name, call);
                    } else {
                        self.wire_methods(&methods, call);
                    }
                }
                Type::Proc(lambda) => {
                    if matches!(call.name.as_str(), "call" | "()" | "[]" | "yield" | "===") {
                        self.wire_lambda(*lambda, &call.args, Some(call.result));
                    } else {
                        let methods = self.tree.find_instance_methods("Proc", &call.name);
                        self.wire_methods(&methods, call);
                    }
                }
                Type::Main => {
                    let methods = self.tree.find_instance_methods("Object", &call.name);
                    self.wire_methods(&methods, call);
                }
                Type::Bottom | Type::Union(_) => {}
            }
        }
    }

    fn wire_methods(&mut self, methods: &[MethodId], call: &Call) {
        for &method in methods {
            self.wire_method(method, &call.args, call.result, call.block.as_ref());
        }
    }

    fn wire_method(&mut self, method: MethodId, args: &[CallArg], result: NodeId, block: Option<&Block>) {
        let tree = self.tree;
        let target = tree.method(method);
        self.wire_args(&target.args, args);
        self.connect(target.result, result);
        if let Some(block) = block {
            self.attach_block(method, block);
        }
    }

    /// `X.new` with no user-defined `new`: an instance of `X`, with the
    /// arguments and block passed on to `initialize`.
    fn construct(&mut self, name: &str, call: &Call) {
        let instance = match name {
            "Array" | "Hash" | "Range" => Type::generic(name, Vec::new()),
            _ => Type::nominal(name),
        };
        let node = self.constructed(instance);
        self.connect(node, call.result);
        let tree = self.tree;
        for method in tree.find_instance_methods(name, "initialize") {
            self.wire_args(&tree.method(method).args, &call.args);
            if let Some(block) = &call.block {
                self.attach_block(method, block);
            }
        }
    }

    /// Container methods whose result depends on the element types.
    fn intrinsic(&mut self, container: &str, call: &Call) -> bool {
        let receiver = call.receiver;
        let result = call.result;
        match (container, call.name.as_str()) {
            ("Array" | "Range", "[]" | "first" | "last" | "pop" | "shift" | "fetch" | "sample" | "min" | "max") => {
                let elements = self.derived(Derived::Elements, receiver);
                self.connect(elements, result);
            }
            ("Array" | "Range", "each" | "select" | "filter" | "reject") => {
                let elements = self.derived(Derived::Elements, receiver);
                self.yield_to_call(call, vec![CallArg::regular(elements)], None);
                if container == "Array" || call.name == "each" {
                    self.connect(receiver, result);
                } else {
                    let listed = self.derived(Derived::Listed, receiver);
                    self.connect(listed, result);
                }
            }
            ("Array" | "Range", "map" | "collect") => {
                let elements = self.derived(Derived::Elements, receiver);
                let collected = self.derived(Derived::Collected, result);
                self.yield_to_call(call, vec![CallArg::regular(elements)], Some(collected));
                self.connect(collected, result);
            }
            ("Array" | "Range", "to_a") => {
                let listed = self.derived(Derived::Listed, receiver);
                self.connect(listed, result);
            }
            ("Hash", "[]" | "fetch") => {
                let values = self.derived(Derived::HashValues, receiver);
                self.connect(values, result);
            }
            ("Hash", "keys") => {
                let keys = self.derived(Derived::ListedKeys, receiver);
                self.connect(keys, result);
            }
            ("Hash", "values") => {
                let values = self.derived(Derived::ListedValues, receiver);
                self.connect(values, result);
            }
            ("Hash", "each" | "each_pair") => {
                let keys = self.derived(Derived::HashKeys, receiver);
                let values = self.derived(Derived::HashValues, receiver);
                self.yield_to_call(call, vec![CallArg::regular(keys), CallArg::regular(values)], None);
                self.connect(receiver, result);
            }
            _ => return false,
        }
        true
    }

    // ── Argument wiring ────────────────────────────────────────────────

    fn wire_args(&mut self, formals: &ArgumentsTree, actuals: &[CallArg]) {
        let takes_keywords = !formals.kwargs.is_empty();
        let mut positional = Vec::with_capacity(actuals.len());
        for actual in actuals {
            match actual.kind {
                CallArgKind::Keywords | CallArgKind::ForwardedKeywords if takes_keywords => {
                    let values = self.derived(Derived::HashValues, actual.node);
                    for formal in &formals.kwargs {
                        match formal.kind {
                            ArgKind::KeywordSplat => self.connect(actual.node, formal.node),
                            _ => self.connect(values, formal.node),
                        }
                    }
                }
                CallArgKind::ForwardedKeywords => {}
                _ => positional.push(*actual),
            }
        }

        match positional.iter().position(|a| a.kind == CallArgKind::Splat) {
            None => {
                let nodes: Vec<NodeId> = positional.iter().map(|a| a.node).collect();
                self.wire_positional(&formals.args, &nodes);
            }
            Some(first_splat) => {
                // Past the first splat positions are unknown: every formal
                // from there on may receive every actual from there on.
                let rest = formals
                    .args
                    .iter()
                    .position(|f| matches!(f.kind, ArgKind::Splat))
                    .unwrap_or(formals.args.len());
                let covered = first_splat.min(rest);
                for (formal, actual) in formals.args.iter().zip(&positional).take(covered) {
                    self.connect(actual.node, formal.node);
                }
                let mut sources = Vec::new();
                for actual in &positional[covered..] {
                    sources.push(match actual.kind {
                        CallArgKind::Splat => self.derived(Derived::Elements, actual.node),
                        _ => actual.node,
                    });
                }
                for formal in formals.args.iter().skip(covered) {
                    for &source in &sources {
                        self.connect(source, formal.node);
                    }
                }
            }
        }
    }

    /// Formals before a rest formal match by index, formals after it from
    /// the end, everything in between feeds the rest formal. Actuals with
    /// no formal are dropped.
    fn wire_positional(&mut self, formals: &[Arg], actuals: &[NodeId]) {
        let Some(splat) = formals.iter().position(|f| matches!(f.kind, ArgKind::Splat)) else {
            for (formal, &actual) in formals.iter().zip(actuals) {
                self.connect(actual, formal.node);
            }
            return;
        };
        let head = splat.min(actuals.len());
        for i in 0..head {
            self.connect(actuals[i], formals[i].node);
        }
        let after = formals.len() - splat - 1;
        let tail = after.min(actuals.len() - head);
        for j in 0..tail {
            self.connect(actuals[actuals.len() - 1 - j], formals[formals.len() - 1 - j].node);
        }
        for &actual in &actuals[head..actuals.len() - tail] {
            self.connect(actual, formals[splat].node);
        }
    }

    // ── Blocks ─────────────────────────────────────────────────────────

    fn wire_lambda(&mut self, lambda: LambdaId, args: &[CallArg], result: Option<NodeId>) {
        let tree = self.tree;
        let target = tree.lambda(lambda);
        self.wire_args(&target.args, args);
        if let Some(result) = result {
            self.connect(target.result, result);
        }
    }

    /// Lambdas a block stands for right now.
    fn block_lambdas(&self, block: &Block) -> Vec<LambdaId> {
        match block {
            Block::Literal(lambda) => vec![*lambda],
            Block::Pass(node) => self
                .ty(*node)
                .members()
                .iter()
                .filter_map(|t| match t {
                    Type::Proc(lambda) => Some(*lambda),
                    _ => None,
                })
                .collect(),
            Block::Symbol(_) => Vec::new(),
        }
    }

    /// Yield `args` to `block`, feeding the block's value into `result`.
    fn yield_to(&mut self, block: &Block, args: &[CallArg], result: Option<NodeId>) {
        match block {
            Block::Symbol(name) => {
                let (Some(first), Some(result)) = (args.first(), result) else {
                    return;
                };
                let receiver = match first.kind {
                    CallArgKind::Splat => self.derived(Derived::Elements, first.node),
                    _ => first.node,
                };
                let call = Call {
                    name: name.clone(),
                    receiver,
                    args: Vec::new(),
                    result,
                    block: None,
                };
                if self.known_calls.insert(call.clone()) {
                    self.changes += 1;
                    self.calls.push(call);
                }
            }
            _ => {
                for lambda in self.block_lambdas(block) {
                    self.wire_lambda(lambda, args, result);
                }
            }
        }
    }

    fn yield_to_call(&mut self, call: &Call, args: Vec<CallArg>, result: Option<NodeId>) {
        if let Some(block) = &call.block {
            self.yield_to(block, &args, result);
        }
    }

    /// Connect every `yield` in `method` and its block formal to `block`.
    fn attach_block(&mut self, method: MethodId, block: &Block) {
        let blocks = self.method_blocks.entry(method).or_default();
        if !blocks.contains(block) {
            blocks.push(block.clone());
            self.changes += 1;
        }
        let tree = self.tree;
        let target = tree.method(method);
        for site in &target.yields {
            self.yield_to(block, &site.args, Some(site.result));
        }
        if let Some(formal) = &target.args.block {
            let formal = formal.node;
            match block {
                Block::Literal(lambda) => {
                    let value = self.constructed(Type::Proc(*lambda));
                    self.connect(value, formal);
                }
                Block::Pass(node) => self.connect(*node, formal),
                Block::Symbol(_) => {}
            }
        }
    }

    // ── super ──────────────────────────────────────────────────────────

    /// Pass `block` (or else every block the enclosing method received) on
    /// to `target`.
    fn forward_blocks(&mut self, enclosing: MethodId, target: MethodId, block: Option<&Block>) {
        match block {
            Some(block) => self.attach_block(target, block),
            None => {
                let blocks = self.method_blocks.get(&enclosing).cloned().unwrap_or_default();
                for block in &blocks {
                    self.attach_block(target, block);
                }
            }
        }
    }

    fn resolve_super(&mut self, send: &SuperSend) {
        let Some(enclosing) = send.method else {
            return;
        };
        let tree = self.tree;
        for target in tree.find_super_methods(enclosing) {
            let method = tree.method(target);
            self.wire_args(&method.args, &send.args);
            self.connect(method.result, send.result);
            self.forward_blocks(enclosing, target, send.block.as_ref());
        }
    }

    /// Bare `super`: the enclosing method's own formals become the actuals.
    fn resolve_super0(&mut self, send: &Super0Send) {
        let Some(enclosing) = send.method else {
            return;
        };
        let tree = self.tree;
        let own = &tree.method(enclosing).args;
        let actuals: Vec<CallArg> = own
            .args
            .iter()
            .map(|formal| CallArg {
                node: formal.node,
                kind: match formal.kind {
                    ArgKind::Splat => CallArgKind::Splat,
                    _ => CallArgKind::Regular,
                },
            })
            .collect();
        for target in tree.find_super_methods(enclosing) {
            let method = tree.method(target);
            self.wire_args(&method.args, &actuals);
            for formal in &method.args.kwargs {
                for passed in &own.kwargs {
                    let matches = match (&formal.kind, &passed.kind) {
                        (ArgKind::KeywordSplat, ArgKind::KeywordSplat) => true,
                        (ArgKind::KeywordSplat, _) | (_, ArgKind::KeywordSplat) => false,
                        _ => formal.name.is_some() && formal.name == passed.name,
                    };
                    if matches {
                        self.connect(passed.node, formal.node);
                    }
                }
            }
            self.connect(method.result, send.result);
            self.forward_blocks(enclosing, target, send.block.as_ref());
        }
    }
}

/// Types of the elements of an array or range.
fn elements(ty: &Type) -> Vec<Type> {
    match ty {
        Type::Generic(name, args) if name == "Array" || name == "Range" => args.clone(),
        _ => Vec::new(),
    }
}

fn hash_arg(ty: &Type, index: usize) -> Option<Type> {
    match ty {
        Type::Generic(name, args) if name == "Hash" => args.get(index).cloned(),
        _ => None,
    }
}

/// Exception instances caught for a rescued class or list of classes.
fn rescued(ty: &Type) -> Vec<Type> {
    match ty {
        Type::Class(name) => vec![Type::nominal(name.clone())],
        Type::Generic(name, args) if name == "Array" => args
            .iter()
            .flat_map(|a| a.members().to_vec())
            .flat_map(|m| rescued(&m))
            .collect(),
        _ => Vec::new(),
    }
}

fn self_type(selfie: &Selfie) -> Type {
    match selfie {
        Selfie::Main => Type::Main,
        Selfie::Instance(scope) if scope.is_empty() => Type::Bottom,
        Selfie::Klass(scope) if scope.is_empty() => Type::Bottom,
        Selfie::Instance(scope) => {
            let name = scope.to_const_name().to_string();
            match name.as_str() {
                "Array" | "Hash" | "Range" => Type::generic(name, Vec::new()),
                _ => Type::nominal(name),
            }
        }
        Selfie::Klass(scope) => Type::class(scope.to_const_name().to_string()),
    }
}

/// Class whose methods a nominal's instances answer to.
fn lookup_name(nominal: &str) -> &str {
    match nominal {
        "Nil" => "NilClass",
        other => other,
    }
}
