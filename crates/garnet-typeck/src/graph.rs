//! The dataflow graph: a node arena with deduplicated directed edges, plus
//! the memoized definition nodes that back every variable-like storage.
//!
//! An edge `a -> b` means values produced at `a` may be observed at `b`.
//! Adding the same edge twice is a no-op; [`Graph::add_edge`] reports
//! whether the edge is new so the solver can tell when wiring changed
//! anything.

use garnet_common::Location;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::node::{Node, NodeId, NodeKind};
use crate::scope::Scope;
use crate::ty::Type;

/// Nodes the solver derives from an existing node, memoized per source so
/// repeated solving never grows the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Derived {
    Elements,
    HashKeys,
    HashValues,
    /// Array collecting the results of a block (intrinsic `map`).
    Collected,
    /// Array built from a node's elements (intrinsic `to_a`, `keys`).
    Listed,
    ListedKeys,
    ListedValues,
}

/// Size of the graph at some point, for rolling back a failed file.
#[derive(Debug, Clone, Copy)]
pub struct GraphCheckpoint {
    nodes: usize,
}

#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    incoming: Vec<Vec<NodeId>>,
    outgoing: Vec<Vec<NodeId>>,
    edges: FxHashSet<(NodeId, NodeId)>,

    ivars: FxHashMap<(Scope, String), NodeId>,
    class_ivars: FxHashMap<(Scope, String), NodeId>,
    main_ivars: FxHashMap<String, NodeId>,
    cvars: FxHashMap<(Scope, String), NodeId>,
    gvars: FxHashMap<String, NodeId>,
    constants: FxHashMap<String, NodeId>,

    derived: FxHashMap<(Derived, NodeId), NodeId>,
    constructed: FxHashMap<Type, NodeId>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    pub fn add_node(&mut self, kind: NodeKind, location: Option<Location>) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, location });
        self.incoming.push(Vec::new());
        self.outgoing.push(Vec::new());
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// All node ids in creation order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (NodeId(i as u32), n))
    }

    /// Give `id` a location unless it already has one.
    pub fn locate(&mut self, id: NodeId, location: Location) {
        let node = &mut self.nodes[id.index()];
        if node.location.is_none() {
            node.location = Some(location);
        }
    }

    /// Add `from -> to`. Returns `false` when the edge already existed.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) -> bool {
        if !self.edges.insert((from, to)) {
            return false;
        }
        self.outgoing[from.index()].push(to);
        self.incoming[to.index()].push(from);
        true
    }

    pub fn incoming(&self, id: NodeId) -> &[NodeId] {
        &self.incoming[id.index()]
    }

    pub fn outgoing(&self, id: NodeId) -> &[NodeId] {
        &self.outgoing[id.index()]
    }

    // ── Definition nodes ───────────────────────────────────────────

    /// Instance variable of instances of `scope`.
    pub fn ivar_definition(&mut self, scope: &Scope, name: &str) -> NodeId {
        let key = (scope.clone(), name.to_string());
        if let Some(&id) = self.ivars.get(&key) {
            return id;
        }
        let id = self.add_node(NodeKind::IvarDefinition, None);
        self.ivars.insert(key, id);
        id
    }

    /// Instance variable of the class object `scope` itself.
    pub fn class_ivar_definition(&mut self, scope: &Scope, name: &str) -> NodeId {
        let key = (scope.clone(), name.to_string());
        if let Some(&id) = self.class_ivars.get(&key) {
            return id;
        }
        let id = self.add_node(NodeKind::IvarDefinition, None);
        self.class_ivars.insert(key, id);
        id
    }

    /// Instance variable of the top-level `self`.
    pub fn main_ivar_definition(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.main_ivars.get(name) {
            return id;
        }
        let id = self.add_node(NodeKind::IvarDefinition, None);
        self.main_ivars.insert(name.to_string(), id);
        id
    }

    pub fn cvar_definition(&mut self, scope: &Scope, name: &str) -> NodeId {
        let key = (scope.without_metaklass(), name.to_string());
        if let Some(&id) = self.cvars.get(&key) {
            return id;
        }
        let id = self.add_node(NodeKind::CvarDefinition, None);
        self.cvars.insert(key, id);
        id
    }

    pub fn gvar_definition(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.gvars.get(name) {
            return id;
        }
        let id = self.add_node(NodeKind::GvarDefinition, None);
        self.gvars.insert(name.to_string(), id);
        id
    }

    /// Storage of the constant with full name `name` (`"Foo::Bar"`).
    pub fn constant_definition(&mut self, name: &str) -> NodeId {
        if let Some(&id) = self.constants.get(name) {
            return id;
        }
        let id = self.add_node(NodeKind::ConstDefinition, None);
        self.constants.insert(name.to_string(), id);
        id
    }

    // ── Solver-derived nodes ───────────────────────────────────────

    /// The node deriving `what` from `source`, created and fed on first use.
    /// Returns the node and whether it was just created.
    pub fn derived(&mut self, what: Derived, source: NodeId) -> (NodeId, bool) {
        if let Some(&id) = self.derived.get(&(what, source)) {
            return (id, false);
        }
        let id = match what {
            Derived::Elements => self.add_node(NodeKind::UnwrapArray, None),
            Derived::HashKeys => self.add_node(NodeKind::UnwrapHashKeys, None),
            Derived::HashValues => self.add_node(NodeKind::UnwrapHashValues, None),
            Derived::Collected => self.add_node(NodeKind::Array, None),
            Derived::Listed | Derived::ListedKeys | Derived::ListedValues => {
                let inner = match what {
                    Derived::ListedKeys => Derived::HashKeys,
                    Derived::ListedValues => Derived::HashValues,
                    _ => Derived::Elements,
                };
                let (inner, _) = self.derived(inner, source);
                let id = self.add_node(NodeKind::Array, None);
                self.add_edge(inner, id);
                self.derived.insert((what, source), id);
                return (id, true);
            }
        };
        if what != Derived::Collected {
            self.add_edge(source, id);
        }
        self.derived.insert((what, source), id);
        (id, true)
    }

    /// The node with the fixed type `ty`.
    pub fn constructed(&mut self, ty: Type) -> NodeId {
        if let Some(&id) = self.constructed.get(&ty) {
            return id;
        }
        let id = self.add_node(NodeKind::Constructed(ty.clone()), None);
        self.constructed.insert(ty, id);
        id
    }

    // ── Rollback ───────────────────────────────────────────────────

    pub fn checkpoint(&self) -> GraphCheckpoint {
        GraphCheckpoint { nodes: self.nodes.len() }
    }

    /// Drop every node created after `checkpoint` and every edge or memo
    /// entry touching one.
    pub fn rollback(&mut self, checkpoint: GraphCheckpoint) {
        let keep = checkpoint.nodes;
        let kept = |id: &NodeId| id.index() < keep;
        self.nodes.truncate(keep);
        self.incoming.truncate(keep);
        self.outgoing.truncate(keep);
        for list in self.incoming.iter_mut().chain(self.outgoing.iter_mut()) {
            list.retain(kept);
        }
        self.edges.retain(|(a, b)| kept(a) && kept(b));
        self.ivars.retain(|_, id| kept(id));
        self.class_ivars.retain(|_, id| kept(id));
        self.main_ivars.retain(|_, id| kept(id));
        self.cvars.retain(|_, id| kept(id));
        self.gvars.retain(|_, id| kept(id));
        self.constants.retain(|_, id| kept(id));
        self.derived.retain(|(_, source), id| kept(source) && kept(id));
        self.constructed.retain(|_, id| kept(id));
    }
}
