//! The global symbol table: classes, modules, methods, constants and
//! lambdas discovered while building.
//!
//! Reopening a class registers another [`Definition`] under the same
//! qualified name; lookups go through the name and see every definition
//! sharing it, so `class Foo; def a; end; end; class Foo; def b; end; end`
//! answers both `a` and `b` for `Foo`.

use std::fmt;

use garnet_common::{FileId, Location, Position};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::node::NodeId;
use crate::scope::{ConstName, ConstRef, Nesting, Scope};
use crate::worklist::CallArg;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DefinitionId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MethodId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LambdaId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn from_name(name: &str) -> Option<Visibility> {
        match name {
            "public" => Some(Visibility::Public),
            "protected" => Some(Visibility::Protected),
            "private" => Some(Visibility::Private),
            _ => None,
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        })
    }
}

// ── Arguments ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ArgKind {
    Regular,
    Optional,
    Splat,
    Keyword,
    KeywordOptional,
    KeywordSplat,
    Block,
    /// A destructuring parameter and the parameters inside it.
    Nested(Vec<Arg>),
}

/// One formal parameter and the node receiving its values.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: Option<String>,
    pub kind: ArgKind,
    pub node: NodeId,
}

/// Declared parameter shape of a method, block or lambda.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgumentsTree {
    /// Positional parameters: regular, optional, splat and nested.
    pub args: Vec<Arg>,
    /// Keyword parameters: keyword, optional keyword and keyword splat.
    pub kwargs: Vec<Arg>,
    pub block: Option<Arg>,
}

// ── Entities ───────────────────────────────────────────────────────────

/// A `yield` inside a method body.
#[derive(Debug, Clone, PartialEq)]
pub struct YieldSite {
    pub args: Vec<CallArg>,
    pub result: NodeId,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Method {
    pub id: MethodId,
    /// The class or module it is defined on, or that definition's eigenclass.
    pub owner: DefinitionId,
    pub scope: Scope,
    pub name: String,
    /// The whole definition; `None` for builtins.
    pub location: Option<Location>,
    pub visibility: Visibility,
    pub args: ArgumentsTree,
    pub result: NodeId,
    pub yields: Vec<YieldSite>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefinitionKind {
    Klass { parent: Option<ConstRef> },
    Mod,
}

/// One `class`/`module` body (or `Foo = Class.new`), or an eigenclass.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub id: DefinitionId,
    pub kind: DefinitionKind,
    /// Full name without a leading `::`; the owner's name for an eigenclass.
    pub name: String,
    pub location: Option<Location>,
    pub eigenclass: Option<DefinitionId>,
    pub eigenclass_of: Option<DefinitionId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub name: String,
    pub scope: Scope,
    /// The constant's name token.
    pub location: Option<Location>,
    /// The class or module this constant names, if any.
    pub definition: Option<DefinitionId>,
}

impl Constant {
    pub fn full_name(&self) -> String {
        let mut elems = self.scope.elems().to_vec();
        elems.push(self.name.clone());
        ConstName::new(elems).to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lambda {
    pub id: LambdaId,
    pub args: ArgumentsTree,
    pub result: NodeId,
}

/// Sizes of the tables at some point, for rolling back a failed file.
#[derive(Debug, Clone, Copy)]
pub struct TreeCheckpoint {
    definitions: usize,
    methods: usize,
    constants: usize,
    lambdas: usize,
    visibility_changes: usize,
}

// ── GlobalTree ─────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct GlobalTree {
    definitions: Vec<Definition>,
    methods: Vec<Method>,
    constants: Vec<Constant>,
    lambdas: Vec<Lambda>,
    constants_by_name: FxHashMap<String, Vec<usize>>,
    methods_by_owner: FxHashMap<(DefinitionId, String), Vec<MethodId>>,
    /// Previous visibilities, newest last.
    visibility_changes: Vec<(MethodId, Visibility)>,
}

impl GlobalTree {
    pub fn new() -> Self {
        GlobalTree::default()
    }

    // ── Registration ───────────────────────────────────────────────

    /// Register a class or module named `name` inside `scope`, together
    /// with the constant naming it.
    pub fn define(
        &mut self,
        scope: Scope,
        name: &str,
        kind: DefinitionKind,
        location: Option<Location>,
    ) -> DefinitionId {
        let id = DefinitionId(self.definitions.len() as u32);
        let constant = Constant {
            name: name.to_string(),
            scope,
            location: location.clone(),
            definition: Some(id),
        };
        self.definitions.push(Definition {
            id,
            kind,
            name: constant.full_name(),
            location,
            eigenclass: None,
            eigenclass_of: None,
        });
        self.add_constant(constant);
        id
    }

    pub fn add_constant(&mut self, constant: Constant) {
        let index = self.constants.len();
        self.constants_by_name
            .entry(constant.full_name())
            .or_default()
            .push(index);
        self.constants.push(constant);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_method(
        &mut self,
        owner: DefinitionId,
        scope: Scope,
        name: &str,
        location: Option<Location>,
        visibility: Visibility,
        args: ArgumentsTree,
        result: NodeId,
    ) -> MethodId {
        let id = MethodId(self.methods.len() as u32);
        self.methods.push(Method {
            id,
            owner,
            scope,
            name: name.to_string(),
            location,
            visibility,
            args,
            result,
            yields: Vec::new(),
        });
        self.methods_by_owner
            .entry((owner, name.to_string()))
            .or_default()
            .push(id);
        id
    }

    pub fn add_lambda(&mut self, args: ArgumentsTree, result: NodeId) -> LambdaId {
        let id = LambdaId(self.lambdas.len() as u32);
        self.lambdas.push(Lambda { id, args, result });
        id
    }

    pub fn set_method_args(&mut self, id: MethodId, args: ArgumentsTree) {
        self.methods[id.0 as usize].args = args;
    }

    pub fn add_yield(&mut self, id: MethodId, site: YieldSite) {
        self.methods[id.0 as usize].yields.push(site);
    }

    /// The eigenclass of `definition`, created on first request.
    pub fn eigenclass_of(&mut self, definition: DefinitionId) -> DefinitionId {
        if let Some(eigen) = self.definitions[definition.0 as usize].eigenclass {
            return eigen;
        }
        let id = DefinitionId(self.definitions.len() as u32);
        let name = self.definitions[definition.0 as usize].name.clone();
        self.definitions.push(Definition {
            id,
            kind: DefinitionKind::Klass { parent: None },
            name,
            location: None,
            eigenclass: None,
            eigenclass_of: Some(definition),
        });
        self.definitions[definition.0 as usize].eigenclass = Some(id);
        id
    }

    /// The first definition of `Object`, registering one if none exists.
    pub fn object(&mut self) -> DefinitionId {
        if let Some(&id) = self.definitions_named("Object").first() {
            return id;
        }
        let parent = ConstRef::from_full_name("BasicObject", Nesting::empty());
        self.define(
            Scope::empty(),
            "Object",
            DefinitionKind::Klass { parent: Some(parent) },
            None,
        )
    }

    /// Set the visibility of the methods called `name` registered in `scope`.
    pub fn change_method_visibility(&mut self, scope: &Scope, name: &str, visibility: Visibility) {
        for method in &mut self.methods {
            if &method.scope == scope && method.name == name && method.visibility != visibility {
                self.visibility_changes.push((method.id, method.visibility));
                method.visibility = visibility;
            }
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.0 as usize]
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn definition(&self, id: DefinitionId) -> &Definition {
        &self.definitions[id.0 as usize]
    }

    pub fn definitions(&self) -> &[Definition] {
        &self.definitions
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn lambda(&self, id: LambdaId) -> &Lambda {
        &self.lambdas[id.0 as usize]
    }

    pub fn lambdas(&self) -> &[Lambda] {
        &self.lambdas
    }

    // ── Name resolution ────────────────────────────────────────────

    pub fn find_constant_by_name(&self, full_name: &str) -> Option<&Constant> {
        self.constants_by_name
            .get(full_name)
            .and_then(|indices| indices.first())
            .map(|&i| &self.constants[i])
    }

    /// Every class/module definition registered under `full_name`.
    pub fn definitions_named(&self, full_name: &str) -> Vec<DefinitionId> {
        self.constants_by_name
            .get(full_name)
            .map(|indices| {
                indices
                    .iter()
                    .filter_map(|&i| self.constants[i].definition)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Resolve a constant reference the way Ruby does lexically: try each
    /// enclosing scope from the innermost outwards, then the top level.
    pub fn solve_reference(&self, const_ref: &ConstRef) -> Option<&Constant> {
        let mut nesting = const_ref.nesting.clone();
        while !nesting.is_empty() {
            let candidate = nesting.to_scope().increase_by_ref(const_ref).to_const_name();
            if let Some(constant) = self.find_constant_by_name(&candidate.to_string()) {
                return Some(constant);
            }
            nesting = nesting.decrease_nesting();
        }
        self.find_constant_by_name(&const_ref.const_name.to_string())
    }

    /// Full name of the declared parent class of `class_name`. Classes
    /// without a declared parent inherit from `Object`; `BasicObject` has
    /// no parent. An unresolvable parent is named as written.
    pub fn get_parent_of(&self, class_name: &str) -> Option<String> {
        if class_name == "BasicObject" {
            return None;
        }
        for id in self.definitions_named(class_name) {
            if let DefinitionKind::Klass { parent: Some(parent) } = &self.definition(id).kind {
                return Some(match self.solve_reference(parent) {
                    Some(constant) => constant.full_name(),
                    None => parent.relative_name(),
                });
            }
        }
        Some(if class_name == "Object" { "BasicObject" } else { "Object" }.to_string())
    }

    /// `class_name` followed by its parent chain. `Kernel` follows
    /// `Object`. A parent cycle ends the chain.
    pub fn ancestors(&self, class_name: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut seen = FxHashSet::default();
        let mut current = Some(class_name.to_string());
        while let Some(name) = current {
            if !seen.insert(name.clone()) {
                break;
            }
            current = self.get_parent_of(&name);
            let is_object = name == "Object";
            chain.push(name);
            if is_object {
                chain.push("Kernel".to_string());
            }
        }
        chain
    }

    fn owned(&self, owner: DefinitionId, name: &str) -> &[MethodId] {
        self.methods_by_owner
            .get(&(owner, name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn instance_methods_of(&self, class_name: &str, name: &str) -> Vec<MethodId> {
        self.definitions_named(class_name)
            .into_iter()
            .flat_map(|def| self.owned(def, name).to_vec())
            .collect()
    }

    fn class_methods_of(&self, class_name: &str, name: &str) -> Vec<MethodId> {
        self.definitions_named(class_name)
            .into_iter()
            .filter_map(|def| self.definition(def).eigenclass)
            .flat_map(|eigen| self.owned(eigen, name).to_vec())
            .collect()
    }

    /// Methods `name` visible on instances of `class_name`: all those
    /// defined on the nearest ancestor that defines any.
    pub fn find_instance_methods(&self, class_name: &str, name: &str) -> Vec<MethodId> {
        for ancestor in self.ancestors(class_name) {
            let found = self.instance_methods_of(&ancestor, name);
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// The method an instance of `class_name` runs for `name`: the latest
    /// definition on the nearest ancestor.
    pub fn find_instance_method(&self, class_name: &str, name: &str) -> Option<MethodId> {
        self.find_instance_methods(class_name, name).last().copied()
    }

    /// Singleton methods `name` of `class_name` along its parent chain,
    /// then the instance methods of `Class`.
    pub fn find_class_methods(&self, class_name: &str, name: &str) -> Vec<MethodId> {
        for ancestor in self.ancestors(class_name) {
            let found = self.class_methods_of(&ancestor, name);
            if !found.is_empty() {
                return found;
            }
        }
        self.find_instance_methods("Class", name)
    }

    pub fn find_class_method(&self, class_name: &str, name: &str) -> Option<MethodId> {
        self.find_class_methods(class_name, name).last().copied()
    }

    /// What `super` inside `method` calls: the same name on the declared
    /// parent of the method's owner.
    pub fn find_super_methods(&self, method: MethodId) -> Vec<MethodId> {
        let method = self.method(method);
        let owner = self.definition(method.owner);
        match owner.eigenclass_of {
            Some(_) => match self.get_parent_of(&owner.name) {
                Some(parent) => self.find_class_methods(&parent, &method.name),
                None => Vec::new(),
            },
            None => match self.get_parent_of(&owner.name) {
                Some(parent) => self.find_instance_methods(&parent, &method.name),
                None => Vec::new(),
            },
        }
    }

    pub fn find_super_method(&self, method: MethodId) -> Option<MethodId> {
        self.find_super_methods(method).last().copied()
    }

    pub fn find_any_methods(&self, name: &str) -> Vec<MethodId> {
        self.methods
            .iter()
            .filter(|m| m.name == name)
            .map(|m| m.id)
            .collect()
    }

    /// The innermost method whose definition contains `position`.
    pub fn find_method_including_position(&self, file: &FileId, position: Position) -> Option<MethodId> {
        self.methods
            .iter()
            .filter(|m| m.location.as_ref().is_some_and(|l| l.contains(file, position)))
            .min_by_key(|m| m.location.as_ref().map(|l| l.range.size_key()))
            .map(|m| m.id)
    }

    /// Instance methods of `class_name` and its ancestors below `Object`.
    pub fn all_instance_methods(&self, class_name: &str) -> Vec<MethodId> {
        self.collect_until_object(class_name, |def| Some(def))
    }

    /// Singleton methods of `class_name` and its ancestors below `Object`.
    pub fn all_class_methods(&self, class_name: &str) -> Vec<MethodId> {
        self.collect_until_object(class_name, |def| self.definition(def).eigenclass)
    }

    fn collect_until_object(
        &self,
        class_name: &str,
        owner_of: impl Fn(DefinitionId) -> Option<DefinitionId>,
    ) -> Vec<MethodId> {
        let mut owners = FxHashSet::default();
        for ancestor in self.ancestors(class_name) {
            if ancestor == "Object" {
                break;
            }
            owners.extend(self.definitions_named(&ancestor).into_iter().filter_map(&owner_of));
        }
        self.methods
            .iter()
            .filter(|m| owners.contains(&m.owner))
            .map(|m| m.id)
            .collect()
    }

    // ── Rollback ───────────────────────────────────────────────────

    pub fn checkpoint(&self) -> TreeCheckpoint {
        TreeCheckpoint {
            definitions: self.definitions.len(),
            methods: self.methods.len(),
            constants: self.constants.len(),
            lambdas: self.lambdas.len(),
            visibility_changes: self.visibility_changes.len(),
        }
    }

    /// Forget everything registered after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: TreeCheckpoint) {
        while self.visibility_changes.len() > checkpoint.visibility_changes {
            if let Some((id, previous)) = self.visibility_changes.pop() {
                if let Some(method) = self.methods.get_mut(id.0 as usize) {
                    method.visibility = previous;
                }
            }
        }
        self.definitions.truncate(checkpoint.definitions);
        self.methods.truncate(checkpoint.methods);
        self.constants.truncate(checkpoint.constants);
        self.lambdas.truncate(checkpoint.lambdas);

        let kept = checkpoint.definitions as u32;
        for definition in &mut self.definitions {
            if definition.eigenclass.is_some_and(|e| e.0 >= kept) {
                definition.eigenclass = None;
            }
        }
        let constants = checkpoint.constants;
        self.constants_by_name.retain(|_, indices| {
            indices.retain(|&i| i < constants);
            !indices.is_empty()
        });
        let methods = checkpoint.methods as u32;
        self.methods_by_owner.retain(|_, ids| {
            ids.retain(|id| id.0 < methods);
            !ids.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn klass(tree: &mut GlobalTree, scope: &str, name: &str, parent: Option<&str>) -> DefinitionId {
        let parent = parent.map(|p| ConstRef::from_full_name(p, Nesting::empty()));
        tree.define(Scope::from_name(scope), name, DefinitionKind::Klass { parent }, None)
    }

    fn method(tree: &mut GlobalTree, owner: DefinitionId, name: &str) -> MethodId {
        tree.add_method(
            owner,
            Scope::empty(),
            name,
            None,
            Visibility::Public,
            ArgumentsTree::default(),
            NodeId(0),
        )
    }

    #[test]
    fn solve_reference_walks_nesting_outwards() {
        let mut tree = GlobalTree::new();
        klass(&mut tree, "", "Bar", None);
        klass(&mut tree, "Foo", "Bar", None);

        let nesting = Nesting::empty()
            .increase_nesting_const(ConstRef::from_full_name("Foo", Nesting::empty()));
        let inner = ConstRef::from_full_name("Bar", nesting.clone());
        assert_eq!(tree.solve_reference(&inner).map(Constant::full_name).as_deref(), Some("Foo::Bar"));

        let absolute = ConstRef::from_full_name("::Bar", nesting);
        assert_eq!(tree.solve_reference(&absolute).map(Constant::full_name).as_deref(), Some("Bar"));

        let missing = ConstRef::from_full_name("Nope", Nesting::empty());
        assert!(tree.solve_reference(&missing).is_none());
    }

    #[test]
    fn parents_default_to_object() {
        let mut tree = GlobalTree::new();
        klass(&mut tree, "", "Foo", None);
        klass(&mut tree, "", "Bar", Some("Foo"));
        klass(&mut tree, "", "Baz", Some("Unknown"));
        assert_eq!(tree.get_parent_of("Bar").as_deref(), Some("Foo"));
        assert_eq!(tree.get_parent_of("Foo").as_deref(), Some("Object"));
        assert_eq!(tree.get_parent_of("Baz").as_deref(), Some("Unknown"));
        assert_eq!(tree.get_parent_of("Object").as_deref(), Some("BasicObject"));
        assert_eq!(tree.get_parent_of("BasicObject"), None);
        assert_eq!(tree.ancestors("Bar"), ["Bar", "Foo", "Object", "Kernel", "BasicObject"]);
    }

    #[test]
    fn parent_cycles_terminate() {
        let mut tree = GlobalTree::new();
        klass(&mut tree, "", "A", Some("B"));
        klass(&mut tree, "", "B", Some("A"));
        assert_eq!(tree.ancestors("A"), ["A", "B"]);
        assert!(tree.find_instance_methods("A", "missing").is_empty());
    }

    #[test]
    fn reopened_classes_share_methods() {
        let mut tree = GlobalTree::new();
        let first = klass(&mut tree, "", "Foo", None);
        let second = klass(&mut tree, "", "Foo", None);
        let a = method(&mut tree, first, "a");
        let b = method(&mut tree, second, "b");
        assert_eq!(tree.find_instance_method("Foo", "a"), Some(a));
        assert_eq!(tree.find_instance_method("Foo", "b"), Some(b));
        assert_eq!(tree.all_instance_methods("Foo"), [a, b]);
    }

    #[test]
    fn instance_lookup_walks_parents() {
        let mut tree = GlobalTree::new();
        let parent = klass(&mut tree, "", "Parent", None);
        let child = klass(&mut tree, "", "Child", Some("Parent"));
        let inherited = method(&mut tree, parent, "foo");
        let own = method(&mut tree, child, "foo");
        assert_eq!(tree.find_instance_method("Child", "foo"), Some(own));
        assert_eq!(tree.find_super_method(own), Some(inherited));
        assert_eq!(tree.find_super_method(inherited), None);
    }

    #[test]
    fn class_methods_live_on_eigenclasses() {
        let mut tree = GlobalTree::new();
        let foo = klass(&mut tree, "", "Foo", None);
        let instance = method(&mut tree, foo, "bar");
        let eigen = tree.eigenclass_of(foo);
        assert_eq!(tree.eigenclass_of(foo), eigen);
        let singleton = method(&mut tree, eigen, "bar");
        assert_eq!(tree.find_class_method("Foo", "bar"), Some(singleton));
        assert_eq!(tree.find_instance_method("Foo", "bar"), Some(instance));
        assert_eq!(tree.all_class_methods("Foo"), [singleton]);
    }

    #[test]
    fn visibility_changes_roll_back() {
        let mut tree = GlobalTree::new();
        let foo = klass(&mut tree, "", "Foo", None);
        let bar = method(&mut tree, foo, "bar");
        let checkpoint = tree.checkpoint();
        tree.change_method_visibility(&Scope::empty(), "bar", Visibility::Private);
        klass(&mut tree, "", "Late", None);
        assert_eq!(tree.method(bar).visibility, Visibility::Private);
        tree.rollback(checkpoint);
        assert_eq!(tree.method(bar).visibility, Visibility::Public);
        assert!(tree.find_constant_by_name("Late").is_none());
    }
}
