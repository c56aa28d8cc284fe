//! Lexical scopes, constant names and constant references.
//!
//! All values here are immutable: every "change" builds a new value. A
//! [`Nesting`] is the chain of `class`/`module`/`class << self` bodies
//! enclosing a point of the program; folding it gives the [`Scope`] that
//! definitions at that point belong to. A [`ConstRef`] is a constant as
//! written plus the nesting it was written in, which is everything needed
//! to resolve it later against the symbol table.

use std::fmt;

use garnet_syntax::ConstPath;
use serde::Serialize;

// ── ConstName ──────────────────────────────────────────────────────────

/// A `::`-separated constant name without a leading `::`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConstName {
    pub elems: Vec<String>,
}

impl ConstName {
    pub fn new(elems: Vec<String>) -> Self {
        ConstName { elems }
    }

    /// Parse `"Foo::Bar"` or `"::Foo::Bar"`.
    pub fn from_string(name: &str) -> Self {
        ConstName {
            elems: name
                .split("::")
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// The last segment.
    pub fn name(&self) -> &str {
        self.elems.last().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for ConstName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.elems.join("::"))
    }
}

// ── Scope ──────────────────────────────────────────────────────────────

/// The namespace definitions are registered in: a path of class/module
/// names, optionally flagged as the metaclass of that path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Scope {
    elems: Vec<String>,
    metaklass: bool,
}

impl Scope {
    pub fn empty() -> Self {
        Scope::default()
    }

    pub fn new(elems: Vec<String>, metaklass: bool) -> Self {
        Scope { elems, metaklass }
    }

    /// The (non-metaclass) scope named by a full constant name.
    pub fn from_name(name: &str) -> Self {
        Scope::new(ConstName::from_string(name).elems, false)
    }

    pub fn elems(&self) -> &[String] {
        &self.elems
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn is_metaklass(&self) -> bool {
        self.metaklass
    }

    /// Enter the definition named by `const_ref`. An absolute reference
    /// replaces the scope instead of extending it.
    pub fn increase_by_ref(&self, const_ref: &ConstRef) -> Scope {
        if const_ref.absolute {
            Scope::new(const_ref.const_name.elems.clone(), false)
        } else {
            let mut elems = self.elems.clone();
            elems.extend(const_ref.const_name.elems.iter().cloned());
            Scope::new(elems, false)
        }
    }

    pub fn increase_by_metaklass(&self) -> Scope {
        Scope::new(self.elems.clone(), true)
    }

    /// Leave the innermost level: a metaclass scope becomes its class, a
    /// class scope its namespace. The empty scope stays empty.
    pub fn decrease(&self) -> Scope {
        if self.metaklass {
            Scope::new(self.elems.clone(), false)
        } else {
            let keep = self.elems.len().saturating_sub(1);
            Scope::new(self.elems[..keep].to_vec(), false)
        }
    }

    /// The same path without the metaclass flag.
    pub fn without_metaklass(&self) -> Scope {
        Scope::new(self.elems.clone(), false)
    }

    pub fn to_const_name(&self) -> ConstName {
        ConstName::new(self.elems.clone())
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = format!("::{}", self.elems.join("::"));
        if self.metaklass {
            write!(f, "Metaklass({path})")
        } else {
            f.write_str(&path)
        }
    }
}

// ── ConstRef ───────────────────────────────────────────────────────────

/// A constant reference as written, with the nesting it appeared in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConstRef {
    pub const_name: ConstName,
    pub nesting: Nesting,
    /// Written with a leading `::`.
    pub absolute: bool,
}

impl ConstRef {
    pub fn from_path(path: &ConstPath, nesting: &Nesting) -> Self {
        ConstRef {
            const_name: ConstName::new(path.segments.clone()),
            nesting: nesting.clone(),
            absolute: path.absolute,
        }
    }

    /// Build a reference from text such as `"Foo::Bar"` or `"::Object"`.
    pub fn from_full_name(name: &str, nesting: Nesting) -> Self {
        ConstRef {
            const_name: ConstName::from_string(name),
            nesting,
            absolute: name.starts_with("::"),
        }
    }

    pub fn name(&self) -> &str {
        self.const_name.name()
    }

    /// The name as written, without a leading `::`.
    pub fn relative_name(&self) -> String {
        self.const_name.to_string()
    }

    pub fn full_name(&self) -> String {
        if self.absolute {
            format!("::{}", self.const_name)
        } else {
            self.const_name.to_string()
        }
    }
}

// ── Nesting ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NestingLevel {
    /// A `class Foo` or `module Foo` body.
    Const(ConstRef),
    /// A `class << self` body, holding the scope it was opened in.
    ClassConst(Scope),
}

/// The chain of definition bodies enclosing a point of the program.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Nesting {
    levels: Vec<NestingLevel>,
}

impl Nesting {
    pub fn empty() -> Self {
        Nesting::default()
    }

    pub fn levels(&self) -> &[NestingLevel] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn increase_nesting_const(&self, const_ref: ConstRef) -> Nesting {
        let mut levels = self.levels.clone();
        levels.push(NestingLevel::Const(const_ref));
        Nesting { levels }
    }

    pub fn increase_nesting_self(&self) -> Nesting {
        let mut levels = self.levels.clone();
        levels.push(NestingLevel::ClassConst(self.to_scope()));
        Nesting { levels }
    }

    pub fn decrease_nesting(&self) -> Nesting {
        let keep = self.levels.len().saturating_sub(1);
        Nesting {
            levels: self.levels[..keep].to_vec(),
        }
    }

    pub fn to_scope(&self) -> Scope {
        self.levels
            .iter()
            .fold(Scope::empty(), |scope, level| match level {
                NestingLevel::Const(const_ref) => scope.increase_by_ref(const_ref),
                NestingLevel::ClassConst(opened_in) => opened_in.increase_by_metaklass(),
            })
    }
}
