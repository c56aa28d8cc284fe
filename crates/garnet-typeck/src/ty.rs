//! The type lattice.
//!
//! `Bottom` is below everything and vanishes from unions. Unions are kept
//! flat, deduplicated and sorted, so two unions of the same members are
//! equal no matter how they were built, and a one-member union is that
//! member.

use std::fmt;

use serde::Serialize;

use crate::tree::LambdaId;

/// Generic arguments nested deeper than this are cut to `Bottom`, which
/// keeps recursive container construction finite.
pub const MAX_GENERIC_DEPTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Type {
    /// No value reaches here.
    Bottom,
    /// An instance of a named class.
    Nominal(String),
    /// The class object of a named class.
    Class(String),
    /// An instance of a named container: `Array<Integer>`.
    Generic(String, Vec<Type>),
    /// The top-level `self`.
    Main,
    /// A lambda value.
    Proc(LambdaId),
    /// Two or more types; never nested, never containing `Bottom`.
    Union(Vec<Type>),
}

impl Type {
    pub fn nominal(name: impl Into<String>) -> Type {
        Type::Nominal(name.into())
    }

    pub fn class(name: impl Into<String>) -> Type {
        Type::Class(name.into())
    }

    /// Build a generic, cutting arguments nested beyond [`MAX_GENERIC_DEPTH`].
    pub fn generic(name: impl Into<String>, args: Vec<Type>) -> Type {
        Type::Generic(name.into(), args).limited(MAX_GENERIC_DEPTH)
    }

    /// Normalizing union of any number of types.
    pub fn union<I: IntoIterator<Item = Type>>(types: I) -> Type {
        let mut members = Vec::new();
        for ty in types {
            match ty {
                Type::Bottom => {}
                Type::Union(inner) => members.extend(inner),
                other => members.push(other),
            }
        }
        members.sort();
        members.dedup();
        match members.len() {
            0 => Type::Bottom,
            1 => members.pop().unwrap_or(Type::Bottom),
            _ => Type::Union(members),
        }
    }

    pub fn is_bottom(&self) -> bool {
        matches!(self, Type::Bottom)
    }

    /// The alternatives this type stands for: the members of a union,
    /// nothing for `Bottom`, the type itself otherwise.
    pub fn members(&self) -> &[Type] {
        match self {
            Type::Bottom => &[],
            Type::Union(members) => members,
            other => std::slice::from_ref(other),
        }
    }

    /// Nesting depth of generic arguments.
    pub fn depth(&self) -> usize {
        match self {
            Type::Generic(_, args) => 1 + args.iter().map(Type::depth).max().unwrap_or(0),
            Type::Union(members) => members.iter().map(Type::depth).max().unwrap_or(0),
            _ => 0,
        }
    }

    fn limited(self, budget: usize) -> Type {
        match self {
            Type::Generic(name, args) if budget == 0 => Type::Generic(name, vec![Type::Bottom; args.len()]),
            Type::Generic(name, args) => {
                Type::Generic(name, args.into_iter().map(|a| a.limited(budget - 1)).collect())
            }
            Type::Union(members) => Type::union(members.into_iter().map(|m| m.limited(budget))),
            other => other,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bottom => f.write_str("bottom"),
            Type::Nominal(name) => f.write_str(name),
            Type::Class(name) => write!(f, "Class({name})"),
            Type::Generic(name, args) => {
                f.write_str(name)?;
                if !args.is_empty() {
                    let args: Vec<String> = args.iter().map(Type::to_string).collect();
                    write!(f, "<{}>", args.join(", "))?;
                }
                Ok(())
            }
            Type::Main => f.write_str("main"),
            Type::Proc(_) => f.write_str("Proc"),
            Type::Union(members) => {
                let mut shown: Vec<String> = members.iter().map(Type::to_string).collect();
                shown.sort();
                shown.dedup();
                f.write_str(&shown.join(" | "))
            }
        }
    }
}
