//! Owned abstract syntax tree for Ruby source.
//!
//! The shapes follow the classic Ruby AST vocabulary (`lvasgn`, `send`,
//! `casgn`, `resbody`, ...) so the graph builder can translate one node
//! kind at a time. Every node carries the byte [`Span`] of the source it
//! was lowered from.

use std::fmt;

use garnet_common::Span;

/// One syntax node.
#[derive(Debug, Clone, PartialEq)]
pub struct Ast {
    pub kind: AstKind,
    pub span: Span,
}

impl Ast {
    pub fn new(kind: AstKind, span: Span) -> Self {
        Ast { kind, span }
    }

    pub fn boxed(kind: AstKind, span: Span) -> Box<Ast> {
        Box::new(Ast { kind, span })
    }

    /// Find the first construct the analyzer has no rule for, depth-first.
    pub fn first_unsupported(&self) -> Option<(&str, Span)> {
        let mut stack = vec![self];
        let mut children = Vec::new();
        while let Some(ast) = stack.pop() {
            if let AstKind::Unsupported(kind) = &ast.kind {
                return Some((kind.as_str(), ast.span));
            }
            ast.for_each_child(&mut |child| children.push(child));
            stack.extend(children.drain(..).rev());
        }
        None
    }

    /// Visit the direct children of this node, including parameter
    /// default values, in source order.
    pub fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(&'a Ast)) {
        use AstKind::*;
        match &self.kind {
            Int | Float | Rational | Imaginary | True | False | Nil | SelfRef | Str | Sym(_)
            | NthRef(_) | BackRef(_) | FileName | LineNumber | Lvar(_) | Ivar(_) | Cvar(_)
            | Gvar(_) | Const(_) | ZSuper | Break(None) | Next(None) | Redo | Retry
            | Alias | Undef | Unsupported(_) => {}
            DStr(parts) | XStr(parts) | DSym(parts) | Regexp(parts) | Array(parts)
            | Begin(parts) | KwBegin(parts) | Super(parts) | Yield(parts) | Return(parts)
            | Mlhs(parts) => parts.iter().for_each(|p| f(p)),
            Hash { pairs, .. } => pairs.iter().for_each(|p| f(p)),
            Pair { key, value } => {
                f(key);
                f(value);
            }
            KwSplat(inner) | Defined(inner) | Not(inner) => f(inner),
            Break(Some(inner)) | Next(Some(inner)) => f(inner),
            Splat(inner) | BlockPass(inner) => {
                if let Some(inner) = inner {
                    f(inner);
                }
            }
            Range { from, to, .. } => {
                if let Some(from) = from {
                    f(from);
                }
                if let Some(to) = to {
                    f(to);
                }
            }
            Lvasgn { value, .. } | Ivasgn { value, .. } | Cvasgn { value, .. }
            | Gvasgn { value, .. } | Casgn { value, .. } => {
                if let Some(value) = value {
                    f(value);
                }
            }
            Send(send) => {
                if let Some(receiver) = &send.receiver {
                    f(receiver);
                }
                send.args.iter().for_each(|a| f(a));
            }
            Block { call, params, body } => {
                f(call);
                params.for_each_default(f);
                if let Some(body) = body {
                    f(body);
                }
            }
            Lambda { params, body } => {
                params.for_each_default(f);
                if let Some(body) = body {
                    f(body);
                }
            }
            Def(def) => {
                def.params.for_each_default(f);
                if let Some(body) = &def.body {
                    f(body);
                }
            }
            Defs { receiver, def } => {
                f(receiver);
                def.params.for_each_default(f);
                if let Some(body) = &def.body {
                    f(body);
                }
            }
            Class { superclass, body, .. } => {
                if let Some(superclass) = superclass {
                    f(superclass);
                }
                if let Some(body) = body {
                    f(body);
                }
            }
            SClass { target, body } => {
                f(target);
                if let Some(body) = body {
                    f(body);
                }
            }
            Module { body, .. } => {
                if let Some(body) = body {
                    f(body);
                }
            }
            And(lhs, rhs) | Or(lhs, rhs) => {
                f(lhs);
                f(rhs);
            }
            If { cond, then_branch, else_branch } => {
                f(cond);
                if let Some(branch) = then_branch {
                    f(branch);
                }
                if let Some(branch) = else_branch {
                    f(branch);
                }
            }
            Case { subject, whens, else_branch } => {
                if let Some(subject) = subject {
                    f(subject);
                }
                for when in whens {
                    when.patterns.iter().for_each(|p| f(p));
                    if let Some(body) = &when.body {
                        f(body);
                    }
                }
                if let Some(branch) = else_branch {
                    f(branch);
                }
            }
            While { cond, body, .. } => {
                f(cond);
                if let Some(body) = body {
                    f(body);
                }
            }
            For { target, iter, body } => {
                f(target);
                f(iter);
                if let Some(body) = body {
                    f(body);
                }
            }
            Rescue { body, handlers, else_branch } => {
                if let Some(body) = body {
                    f(body);
                }
                for handler in handlers {
                    if let Some(exceptions) = &handler.exceptions {
                        exceptions.iter().for_each(|e| f(e));
                    }
                    if let Some(variable) = &handler.variable {
                        f(variable);
                    }
                    if let Some(body) = &handler.body {
                        f(body);
                    }
                }
                if let Some(branch) = else_branch {
                    f(branch);
                }
            }
            Ensure { body, ensure } => {
                if let Some(body) = body {
                    f(body);
                }
                if let Some(ensure) = ensure {
                    f(ensure);
                }
            }
            MAsgn { targets, value } => {
                f(targets);
                f(value);
            }
            OpAsgn { target, value, .. } | OrAsgn { target, value } | AndAsgn { target, value } => {
                f(target);
                f(value);
            }
        }
    }
}

/// A constant path as written: `Foo`, `Foo::Bar` or `::Foo::Bar`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstPath {
    /// Leading `::` (a reference from the top-level scope).
    pub absolute: bool,
    /// Path segments; the last one is the constant's own name.
    pub segments: Vec<String>,
    /// Span of the last segment.
    pub name_span: Span,
}

impl ConstPath {
    pub fn name(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// Segments before the name.
    pub fn prefix(&self) -> &[String] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }
}

impl fmt::Display for ConstPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("::")?;
        }
        f.write_str(&self.segments.join("::"))
    }
}

/// A message send (`recv.name(args)`), including operator calls.
#[derive(Debug, Clone, PartialEq)]
pub struct Send {
    pub receiver: Option<Box<Ast>>,
    pub name: String,
    /// Span of the method name as written (the operator for operator calls).
    pub selector: Span,
    /// Arguments in order. A trailing keyword hash is an `AstKind::Hash`
    /// with `braces == false`; a block argument is an `AstKind::BlockPass`.
    pub args: Vec<Ast>,
    /// `recv&.name`
    pub safe_navigation: bool,
}

/// A `def` body: shared by instance and singleton definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    pub name: String,
    pub name_span: Span,
    pub params: Params,
    pub body: Option<Box<Ast>>,
}

/// Formal parameter list of a method, block or lambda.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params(pub Vec<Param>);

impl Params {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn for_each_default<'a>(&'a self, f: &mut dyn FnMut(&'a Ast)) {
        for param in &self.0 {
            param.for_each_default(f);
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub kind: ParamKind,
    pub span: Span,
}

impl Param {
    fn for_each_default<'a>(&'a self, f: &mut dyn FnMut(&'a Ast)) {
        match &self.kind {
            ParamKind::OptArg(_, value) | ParamKind::KwOptArg(_, value) => f(value),
            ParamKind::Mlhs(nested) => nested.iter().for_each(|p| p.for_each_default(f)),
            _ => {}
        }
    }
}

/// Hidden locals bound by a `...` parameter and read by a `...` argument.
pub const FORWARDED_REST: &str = "*";
pub const FORWARDED_KWREST: &str = "**";
pub const FORWARDED_BLOCK: &str = "&";

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Arg(String),
    OptArg(String, Box<Ast>),
    RestArg(Option<String>),
    KwArg(String),
    KwOptArg(String, Box<Ast>),
    KwRestArg(Option<String>),
    BlockArg(Option<String>),
    /// Destructuring parameter: `def foo((a, b))`, `|(k, v)|`.
    Mlhs(Vec<Param>),
    /// `...` argument forwarding.
    Forward,
}

/// One `when` clause of a `case`.
#[derive(Debug, Clone, PartialEq)]
pub struct When {
    pub patterns: Vec<Ast>,
    pub body: Option<Box<Ast>>,
    pub span: Span,
}

/// One `rescue` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ResBody {
    /// Declared exception classes; `None` for a bare `rescue`.
    pub exceptions: Option<Vec<Ast>>,
    /// Assignment target of `=> e`.
    pub variable: Option<Box<Ast>>,
    pub body: Option<Box<Ast>>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AstKind {
    // ── Literals ───────────────────────────────────────────────────
    Int,
    Float,
    Rational,
    Imaginary,
    True,
    False,
    Nil,
    SelfRef,
    Str,
    /// Interpolated string; parts are the interpolated expressions.
    DStr(Vec<Ast>),
    /// Backtick command string.
    XStr(Vec<Ast>),
    Sym(String),
    DSym(Vec<Ast>),
    Regexp(Vec<Ast>),
    Array(Vec<Ast>),
    /// `{ k => v }`, or a trailing keyword-argument list when `braces` is false.
    Hash { pairs: Vec<Ast>, braces: bool },
    Pair { key: Box<Ast>, value: Box<Ast> },
    KwSplat(Box<Ast>),
    Range { from: Option<Box<Ast>>, to: Option<Box<Ast>>, inclusive: bool },
    /// `$1`
    NthRef(u32),
    /// `$&`, `` $` ``, `$'`, `$+`
    BackRef(String),
    Defined(Box<Ast>),
    /// `__FILE__`
    FileName,
    /// `__LINE__`
    LineNumber,

    // ── Variables ──────────────────────────────────────────────────
    Lvar(String),
    Lvasgn { name: String, value: Option<Box<Ast>> },
    Ivar(String),
    Ivasgn { name: String, value: Option<Box<Ast>> },
    Cvar(String),
    Cvasgn { name: String, value: Option<Box<Ast>> },
    Gvar(String),
    Gvasgn { name: String, value: Option<Box<Ast>> },
    Const(ConstPath),
    Casgn { path: ConstPath, value: Option<Box<Ast>> },

    // ── Calls ──────────────────────────────────────────────────────
    Send(Box<Send>),
    /// `*expr`; `None` for an anonymous `*`.
    Splat(Option<Box<Ast>>),
    BlockPass(Option<Box<Ast>>),
    /// A call with an attached `do ... end` or `{ ... }` block.
    Block { call: Box<Ast>, params: Params, body: Option<Box<Ast>> },
    /// `->(x) { ... }`
    Lambda { params: Params, body: Option<Box<Ast>> },
    Super(Vec<Ast>),
    ZSuper,
    Yield(Vec<Ast>),

    // ── Definitions ────────────────────────────────────────────────
    Def(Box<MethodDef>),
    Defs { receiver: Box<Ast>, def: Box<MethodDef> },
    Class { name: ConstPath, superclass: Option<Box<Ast>>, body: Option<Box<Ast>> },
    SClass { target: Box<Ast>, body: Option<Box<Ast>> },
    Module { name: ConstPath, body: Option<Box<Ast>> },
    Alias,
    Undef,

    // ── Control flow ───────────────────────────────────────────────
    Begin(Vec<Ast>),
    KwBegin(Vec<Ast>),
    And(Box<Ast>, Box<Ast>),
    Or(Box<Ast>, Box<Ast>),
    Not(Box<Ast>),
    If { cond: Box<Ast>, then_branch: Option<Box<Ast>>, else_branch: Option<Box<Ast>> },
    Case { subject: Option<Box<Ast>>, whens: Vec<When>, else_branch: Option<Box<Ast>> },
    /// `while`/`until`, pre and post forms alike.
    While { cond: Box<Ast>, body: Option<Box<Ast>>, until: bool },
    For { target: Box<Ast>, iter: Box<Ast>, body: Option<Box<Ast>> },
    Break(Option<Box<Ast>>),
    Next(Option<Box<Ast>>),
    Redo,
    Retry,
    Return(Vec<Ast>),
    Rescue { body: Option<Box<Ast>>, handlers: Vec<ResBody>, else_branch: Option<Box<Ast>> },
    Ensure { body: Option<Box<Ast>>, ensure: Option<Box<Ast>> },

    // ── Assignment forms ───────────────────────────────────────────
    /// `a, (b, *c) = value`; `targets` is an `Mlhs`.
    MAsgn { targets: Box<Ast>, value: Box<Ast> },
    /// Destructuring target list. Elements are assignment nodes without a
    /// value, `Splat` around a target, or nested `Mlhs`.
    Mlhs(Vec<Ast>),
    /// `target op= value`; `target` is an assignment node without a value
    /// or a `Send` whose name is the reader.
    OpAsgn { target: Box<Ast>, op: String, value: Box<Ast> },
    OrAsgn { target: Box<Ast>, value: Box<Ast> },
    AndAsgn { target: Box<Ast>, value: Box<Ast> },

    /// A construct without a translation rule, named by its grammar kind.
    Unsupported(String),
}
