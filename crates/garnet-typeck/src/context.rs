//! The builder's view of the program point it is translating: what `self`
//! is, which definition bodies enclose it, and the local variables in
//! scope.

use garnet_common::{FileId, Span};
use rustc_hash::FxHashMap;

use crate::error::BuildError;
use crate::node::NodeId;
use crate::scope::{Nesting, Scope};
use crate::tree::{DefinitionId, MethodId, Visibility};

/// What `self` denotes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Selfie {
    /// The top-level object.
    Main,
    /// An instance of the class at this scope.
    Instance(Scope),
    /// The class object at this scope.
    Klass(Scope),
}

impl Selfie {
    /// `self` inside an instance method defined at `scope`. Methods of a
    /// `class << self` body run on the class object.
    pub fn instance(scope: Scope) -> Selfie {
        if scope.is_metaklass() {
            Selfie::Klass(scope.decrease())
        } else {
            Selfie::Instance(scope)
        }
    }
}

/// The class or module body being analyzed and the default visibility
/// of the methods it defines next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzedKlass {
    pub definition: Option<DefinitionId>,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Context {
    pub file: FileId,
    pub selfie: Selfie,
    pub nesting: Nesting,
    pub analyzed_klass: AnalyzedKlass,
    pub analyzed_method: Option<MethodId>,
    /// Local variable name to the assignment nodes that may reach here.
    pub lenv: FxHashMap<String, Vec<NodeId>>,
}

impl Context {
    /// The context at the top of a file.
    pub fn top_level(file: FileId) -> Self {
        Context {
            file,
            selfie: Selfie::Main,
            nesting: Nesting::empty(),
            analyzed_klass: AnalyzedKlass {
                definition: None,
                visibility: Visibility::Public,
            },
            analyzed_method: None,
            lenv: FxHashMap::default(),
        }
    }

    pub fn scope(&self) -> Scope {
        self.nesting.to_scope()
    }

    pub fn with_selfie(self, selfie: Selfie) -> Self {
        Context { selfie, ..self }
    }

    pub fn with_nesting(self, nesting: Nesting) -> Self {
        Context { nesting, ..self }
    }

    /// Enter a definition body; its methods start out public.
    pub fn with_analyzed_klass(self, definition: Option<DefinitionId>) -> Self {
        Context {
            analyzed_klass: AnalyzedKlass {
                definition,
                visibility: Visibility::Public,
            },
            ..self
        }
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.analyzed_klass.visibility = visibility;
        self
    }

    pub fn with_analyzed_method(self, analyzed_method: Option<MethodId>) -> Self {
        Context {
            analyzed_method,
            ..self
        }
    }

    pub fn with_lenv(self, lenv: FxHashMap<String, Vec<NodeId>>) -> Self {
        Context { lenv, ..self }
    }

    /// Make `name` refer to exactly `nodes` from here on.
    pub fn bind(mut self, name: &str, nodes: Vec<NodeId>) -> Self {
        self.lenv.insert(name.to_string(), nodes);
        self
    }

    pub fn lookup(&self, name: &str) -> &[NodeId] {
        self.lenv.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Same program point apart from local variables.
    pub fn almost_equal(&self, other: &Context) -> bool {
        self.file == other.file
            && self.selfie == other.selfie
            && self.nesting == other.nesting
            && self.analyzed_klass == other.analyzed_klass
            && self.analyzed_method == other.analyzed_method
    }
}

/// Join two contexts reaching the same point from different branches. A
/// variable may then hold any value either branch assigned.
pub fn merge_contexts(a: Context, b: Context, span: Span) -> Result<Context, BuildError> {
    if !a.almost_equal(&b) {
        return Err(BuildError::ContextMismatch { span });
    }
    let mut lenv = a.lenv.clone();
    for (name, nodes) in b.lenv {
        let merged = lenv.entry(name).or_default();
        for node in nodes {
            if !merged.contains(&node) {
                merged.push(node);
            }
        }
    }
    Ok(a.with_lenv(lenv))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        Context::top_level(FileId::new("a.rb"))
    }

    #[test]
    fn metaklass_instance_is_the_class_object() {
        let foo = Scope::from_name("Foo");
        assert_eq!(
            Selfie::instance(foo.increase_by_metaklass()),
            Selfie::Klass(foo.clone())
        );
        assert_eq!(Selfie::instance(foo.clone()), Selfie::Instance(foo));
    }

    #[test]
    fn merge_unions_local_bindings() {
        let a = ctx().bind("x", vec![NodeId(1)]).bind("y", vec![NodeId(3)]);
        let b = ctx().bind("x", vec![NodeId(2), NodeId(1)]);
        let merged = merge_contexts(a, b, Span::default()).unwrap();
        assert_eq!(merged.lookup("x"), &[NodeId(1), NodeId(2)]);
        assert_eq!(merged.lookup("y"), &[NodeId(3)]);
        assert!(merged.lookup("z").is_empty());
    }

    #[test]
    fn merge_rejects_different_program_points() {
        let a = ctx();
        let b = ctx().with_selfie(Selfie::Klass(Scope::from_name("Foo")));
        let err = merge_contexts(a, b, Span::new(1, 4)).unwrap_err();
        assert_eq!(err, BuildError::ContextMismatch { span: Span::new(1, 4) });
    }
}
