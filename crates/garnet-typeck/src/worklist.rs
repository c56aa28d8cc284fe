//! Calls waiting for their receiver's type.
//!
//! The builder cannot dispatch a call while it walks the tree because the
//! callee may be defined later, in another file, or on a receiver whose
//! type is not known yet. Every call is queued here instead and the
//! solver wires it once types are available.

use garnet_common::Location;

use crate::node::NodeId;
use crate::tree::{LambdaId, MethodId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallArgKind {
    Regular,
    /// `*expr`
    Splat,
    /// A trailing `key: value` list.
    Keywords,
    /// The keywords a `...` argument passes on; dropped by methods that
    /// take no keywords.
    ForwardedKeywords,
}

/// One actual argument: the node carrying its value and how it was passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallArg {
    pub node: NodeId,
    pub kind: CallArgKind,
}

impl CallArg {
    pub fn regular(node: NodeId) -> Self {
        CallArg {
            node,
            kind: CallArgKind::Regular,
        }
    }
}

/// The block attached to a call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Block {
    /// `do |x| ... end` or `{ |x| ... }`, registered as a lambda.
    Literal(LambdaId),
    /// `&expr`: whatever lambdas `expr` evaluates to.
    Pass(NodeId),
    /// `&:name`
    Symbol(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageSend {
    pub name: String,
    /// The `CallObj` node holding the receiver.
    pub receiver: NodeId,
    pub args: Vec<CallArg>,
    pub result: NodeId,
    pub block: Option<Block>,
    /// `recv&.name`
    pub csend: bool,
    /// Where the method name is written; absent for desugared calls.
    pub selector: Option<Location>,
}

/// `super(args)`
#[derive(Debug, Clone, PartialEq)]
pub struct SuperSend {
    pub args: Vec<CallArg>,
    pub result: NodeId,
    pub block: Option<Block>,
    /// The method containing the call.
    pub method: Option<MethodId>,
    pub keyword: Option<Location>,
}

/// Bare `super`, passing the enclosing method's own arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Super0Send {
    pub result: NodeId,
    pub block: Option<Block>,
    pub method: Option<MethodId>,
    pub keyword: Option<Location>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PendingSend {
    Message(MessageSend),
    Super(SuperSend),
    Super0(Super0Send),
}

impl PendingSend {
    pub fn result(&self) -> NodeId {
        match self {
            PendingSend::Message(send) => send.result,
            PendingSend::Super(send) => send.result,
            PendingSend::Super0(send) => send.result,
        }
    }

    fn block_mut(&mut self) -> &mut Option<Block> {
        match self {
            PendingSend::Message(send) => &mut send.block,
            PendingSend::Super(send) => &mut send.block,
            PendingSend::Super0(send) => &mut send.block,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SendId(pub u32);

#[derive(Debug, Default)]
pub struct Worklist {
    sends: Vec<PendingSend>,
}

impl Worklist {
    pub fn new() -> Self {
        Worklist::default()
    }

    pub fn add(&mut self, send: PendingSend) -> SendId {
        let id = SendId(self.sends.len() as u32);
        self.sends.push(send);
        id
    }

    pub fn get(&self, id: SendId) -> &PendingSend {
        &self.sends[id.0 as usize]
    }

    pub fn set_block(&mut self, id: SendId, block: Block) {
        *self.sends[id.0 as usize].block_mut() = Some(block);
    }

    pub fn sends(&self) -> &[PendingSend] {
        &self.sends
    }

    pub fn message_sends(&self) -> impl Iterator<Item = &MessageSend> {
        self.sends.iter().filter_map(|send| match send {
            PendingSend::Message(send) => Some(send),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.sends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sends.is_empty()
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.sends.truncate(len);
    }
}
