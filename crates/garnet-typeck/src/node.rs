//! Dataflow graph nodes.
//!
//! A node is created once per occurrence by the builder (or by the solver
//! for the few nodes it synthesizes) and is never changed afterwards,
//! except to receive a fallback location.

use garnet_common::Location;

use crate::context::Selfie;
use crate::scope::ConstRef;
use crate::tree::LambdaId;
use crate::ty::Type;

/// Handle of a node in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    // ── Literals ───────────────────────────────────────────────────
    Int,
    Float,
    Rational,
    Complex,
    Bool,
    Nil,
    Str,
    XStr,
    DStr,
    Sym(String),
    DSym,
    Regexp,
    Defined,
    NthRef(u32),
    BackRef(String),
    Not,

    // ── Containers ─────────────────────────────────────────────────
    Array,
    /// `*expr` inside a literal: the element types of `expr`.
    SplatArray,
    HashKeys,
    HashValues,
    /// Fed only through its two dedicated key and value nodes.
    Hash { keys: NodeId, values: NodeId },
    UnwrapHashKeys,
    UnwrapHashValues,
    Range { inclusive: bool },
    RangeFrom,
    RangeTo,
    /// Element types of incoming arrays and ranges.
    UnwrapArray,

    // ── Self and reflection ────────────────────────────────────────
    Self_(Selfie),
    And,
    Or,
    ExtractClass,
    Freeze,

    // ── Variables ──────────────────────────────────────────────────
    Lvar(String),
    Lvasgn(String),
    Ivar(String),
    Ivasgn(String),
    Cvar(String),
    Cvasgn(String),
    Gvar(String),
    Gvasgn(String),
    Const(ConstRef),
    Casgn(ConstRef),
    IvarDefinition,
    CvarDefinition,
    GvarDefinition,
    ConstDefinition,

    // ── Calls ──────────────────────────────────────────────────────
    CallArg,
    CallObj,
    CallResult { csend: bool },
    MethodResult,
    BlockResult,
    YieldResult,
    FormalArg(String),
    FormalOptArg(String),
    FormalRestArg(Option<String>),
    FormalKwArg(String),
    FormalKwOptArg(String),
    FormalKwRestArg(Option<String>),
    FormalBlockArg(Option<String>),
    FormalMlhs,
    Lambda(LambdaId),

    // ── Control flow ───────────────────────────────────────────────
    IfResult,
    CaseResult,
    Rescue,
    Ensure,
    /// The exception bound by `rescue ... => e`.
    Rescued { declared: bool },
    /// `break`, `next`, `redo`, `retry`, `return`.
    Bottom,

    /// A node with a fixed type, made by the solver.
    Constructed(Type),
}

impl NodeKind {
    /// Short name used in graph dumps.
    pub fn label(&self) -> &'static str {
        use NodeKind::*;
        match self {
            Int => "int",
            Float => "float",
            Rational => "rational",
            Complex => "complex",
            Bool => "bool",
            Nil => "nil",
            Str => "str",
            XStr => "xstr",
            DStr => "dstr",
            Sym(_) => "sym",
            DSym => "dsym",
            Regexp => "regexp",
            Defined => "defined",
            NthRef(_) => "nthref",
            BackRef(_) => "backref",
            Not => "not",
            Array => "array",
            SplatArray => "splat_array",
            HashKeys => "hash_keys",
            HashValues => "hash_values",
            Hash { .. } => "hash",
            UnwrapHashKeys => "unwrap_hash_keys",
            UnwrapHashValues => "unwrap_hash_values",
            Range { .. } => "range",
            RangeFrom => "range_from",
            RangeTo => "range_to",
            UnwrapArray => "unwrap_array",
            Self_(_) => "self",
            And => "and",
            Or => "or",
            ExtractClass => "extract_class",
            Freeze => "freeze",
            Lvar(_) => "lvar",
            Lvasgn(_) => "lvasgn",
            Ivar(_) => "ivar",
            Ivasgn(_) => "ivasgn",
            Cvar(_) => "cvar",
            Cvasgn(_) => "cvasgn",
            Gvar(_) => "gvar",
            Gvasgn(_) => "gvasgn",
            Const(_) => "const",
            Casgn(_) => "casgn",
            IvarDefinition => "ivar_definition",
            CvarDefinition => "cvar_definition",
            GvarDefinition => "gvar_definition",
            ConstDefinition => "const_definition",
            CallArg => "call_arg",
            CallObj => "call_obj",
            CallResult { .. } => "call_result",
            MethodResult => "method_result",
            BlockResult => "block_result",
            YieldResult => "yield_result",
            FormalArg(_) => "formal_arg",
            FormalOptArg(_) => "formal_optarg",
            FormalRestArg(_) => "formal_restarg",
            FormalKwArg(_) => "formal_kwarg",
            FormalKwOptArg(_) => "formal_kwoptarg",
            FormalKwRestArg(_) => "formal_kwrestarg",
            FormalBlockArg(_) => "formal_blockarg",
            FormalMlhs => "formal_mlhs",
            Lambda(_) => "lambda",
            IfResult => "if_result",
            CaseResult => "case_result",
            Rescue => "rescue",
            Ensure => "ensure",
            Rescued { .. } => "rescued",
            Bottom => "bottom",
            Constructed(_) => "constructed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub location: Option<Location>,
}
