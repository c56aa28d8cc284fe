//! Core classes and methods known before any user file is read.
//!
//! Builtin definitions have no location. Each builtin method's result
//! node is fed by a node of its fixed result type; builtins take no
//! arguments and never yield.

use crate::graph::Graph;
use crate::node::NodeKind;
use crate::scope::{ConstRef, Nesting, Scope};
use crate::tree::{ArgumentsTree, DefinitionKind, GlobalTree, Visibility};
use crate::ty::Type;

/// `(name, parent)`; `None` marks a module.
const CLASSES: &[(&str, Option<&str>)] = &[
    ("BasicObject", Some("")),
    ("Object", Some("BasicObject")),
    ("Kernel", None),
    ("Comparable", None),
    ("Module", Some("Object")),
    ("Class", Some("Module")),
    ("Numeric", Some("Object")),
    ("Integer", Some("Numeric")),
    ("Float", Some("Numeric")),
    ("Rational", Some("Numeric")),
    ("Complex", Some("Numeric")),
    ("String", Some("Object")),
    ("Symbol", Some("Object")),
    ("Array", Some("Object")),
    ("Hash", Some("Object")),
    ("Range", Some("Object")),
    ("Proc", Some("Object")),
    ("NilClass", Some("Object")),
    ("TrueClass", Some("Object")),
    ("FalseClass", Some("Object")),
    ("Regexp", Some("Object")),
    ("Exception", Some("Object")),
    ("StandardError", Some("Exception")),
    ("RuntimeError", Some("StandardError")),
    ("ArgumentError", Some("StandardError")),
    ("TypeError", Some("StandardError")),
    ("NameError", Some("StandardError")),
    ("NoMethodError", Some("NameError")),
    ("IndexError", Some("StandardError")),
    ("KeyError", Some("IndexError")),
    ("ZeroDivisionError", Some("StandardError")),
];

#[derive(Clone, Copy)]
enum Ret {
    Integer,
    Float,
    String,
    Symbol,
    Boolean,
    Nil,
    Proc,
    /// `Array<T>` of the given element.
    ArrayOf(&'static Ret),
    /// Nothing known about the result.
    Unknown,
}

impl Ret {
    fn to_type(self) -> Type {
        match self {
            Ret::Integer => Type::nominal("Integer"),
            Ret::Float => Type::nominal("Float"),
            Ret::String => Type::nominal("String"),
            Ret::Symbol => Type::nominal("Symbol"),
            Ret::Boolean => Type::nominal("Boolean"),
            Ret::Nil => Type::nominal("Nil"),
            Ret::Proc => Type::nominal("Proc"),
            Ret::ArrayOf(element) => Type::generic("Array", vec![element.to_type()]),
            Ret::Unknown => Type::Bottom,
        }
    }
}

const OBJECT: &[(&str, Ret)] = &[
    ("to_s", Ret::String),
    ("inspect", Ret::String),
    ("object_id", Ret::Integer),
    ("nil?", Ret::Boolean),
    ("==", Ret::Boolean),
    ("!=", Ret::Boolean),
    ("equal?", Ret::Boolean),
    ("hash", Ret::Integer),
    ("frozen?", Ret::Boolean),
    ("dup", Ret::Unknown),
    ("is_a?", Ret::Boolean),
    ("kind_of?", Ret::Boolean),
    ("respond_to?", Ret::Boolean),
];

const KERNEL: &[(&str, Ret)] = &[
    ("__method__", Ret::Symbol),
    ("puts", Ret::Nil),
    ("print", Ret::Nil),
    ("require", Ret::Boolean),
    ("require_relative", Ret::Boolean),
    ("raise", Ret::Unknown),
    ("format", Ret::String),
    ("block_given?", Ret::Boolean),
];

const INTEGER: &[(&str, Ret)] = &[
    ("succ", Ret::Integer),
    ("pred", Ret::Integer),
    ("+", Ret::Integer),
    ("-", Ret::Integer),
    ("*", Ret::Integer),
    ("/", Ret::Integer),
    ("%", Ret::Integer),
    ("**", Ret::Integer),
    ("abs", Ret::Integer),
    ("times", Ret::Integer),
    ("to_i", Ret::Integer),
    ("to_f", Ret::Float),
    ("to_s", Ret::String),
    ("<", Ret::Boolean),
    (">", Ret::Boolean),
    ("<=", Ret::Boolean),
    (">=", Ret::Boolean),
    ("zero?", Ret::Boolean),
];

const FLOAT: &[(&str, Ret)] = &[
    ("+", Ret::Float),
    ("-", Ret::Float),
    ("*", Ret::Float),
    ("/", Ret::Float),
    ("abs", Ret::Float),
    ("round", Ret::Integer),
    ("floor", Ret::Integer),
    ("ceil", Ret::Integer),
    ("to_i", Ret::Integer),
    ("to_f", Ret::Float),
    ("to_s", Ret::String),
    ("<", Ret::Boolean),
    (">", Ret::Boolean),
    ("<=", Ret::Boolean),
    (">=", Ret::Boolean),
];

const STRING: &[(&str, Ret)] = &[
    ("+", Ret::String),
    ("*", Ret::String),
    ("length", Ret::Integer),
    ("size", Ret::Integer),
    ("upcase", Ret::String),
    ("downcase", Ret::String),
    ("strip", Ret::String),
    ("to_s", Ret::String),
    ("to_sym", Ret::Symbol),
    ("to_i", Ret::Integer),
    ("to_f", Ret::Float),
    ("empty?", Ret::Boolean),
    ("split", Ret::ArrayOf(&Ret::String)),
];

const SYMBOL: &[(&str, Ret)] = &[
    ("to_s", Ret::String),
    ("to_sym", Ret::Symbol),
    ("to_proc", Ret::Proc),
    ("length", Ret::Integer),
];

const ARRAY: &[(&str, Ret)] = &[
    ("length", Ret::Integer),
    ("size", Ret::Integer),
    ("empty?", Ret::Boolean),
    ("join", Ret::String),
];

const HASH: &[(&str, Ret)] = &[
    ("length", Ret::Integer),
    ("size", Ret::Integer),
    ("empty?", Ret::Boolean),
    ("keys", Ret::ArrayOf(&Ret::Unknown)),
];

const RANGE: &[(&str, Ret)] = &[("to_a", Ret::ArrayOf(&Ret::Unknown))];

const NIL: &[(&str, Ret)] = &[("to_a", Ret::ArrayOf(&Ret::Unknown)), ("to_s", Ret::String)];

const MODULE: &[(&str, Ret)] = &[("name", Ret::String)];

const EXCEPTION: &[(&str, Ret)] = &[
    ("message", Ret::String),
    ("backtrace", Ret::ArrayOf(&Ret::String)),
];

const PROC: &[(&str, Ret)] = &[("arity", Ret::Integer), ("lambda?", Ret::Boolean)];

const METHODS: &[(&str, &[(&str, Ret)])] = &[
    ("Object", OBJECT),
    ("Kernel", KERNEL),
    ("Integer", INTEGER),
    ("Float", FLOAT),
    ("String", STRING),
    ("Symbol", SYMBOL),
    ("Array", ARRAY),
    ("Hash", HASH),
    ("Range", RANGE),
    ("NilClass", NIL),
    ("Module", MODULE),
    ("Exception", EXCEPTION),
    ("Proc", PROC),
];

/// Register the prelude. Must run before any user file is built.
pub fn register(graph: &mut Graph, tree: &mut GlobalTree) {
    for &(name, parent) in CLASSES {
        let kind = match parent {
            None => DefinitionKind::Mod,
            Some("") => DefinitionKind::Klass { parent: None },
            Some(parent) => DefinitionKind::Klass {
                parent: Some(ConstRef::from_full_name(parent, Nesting::empty())),
            },
        };
        tree.define(Scope::empty(), name, kind, None);
    }

    for &(class_name, methods) in METHODS {
        let Some(&owner) = tree.definitions_named(class_name).first() else {
            continue;
        };
        let scope = Scope::from_name(class_name);
        for &(name, ret) in methods {
            let result = graph.add_node(NodeKind::MethodResult, None);
            let ty = ret.to_type();
            if !ty.is_bottom() {
                let fixed = graph.constructed(ty);
                graph.add_edge(fixed, result);
            }
            tree.add_method(
                owner,
                scope.clone(),
                name,
                None,
                Visibility::Public,
                ArgumentsTree::default(),
                result,
            );
        }
    }
}
