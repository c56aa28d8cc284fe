//! Position queries over a solved project.
//!
//! Positions are 0-based `(line, character)` pairs. Queries never fail:
//! anything that cannot be resolved yields `None` or an empty list.

use garnet_common::{FileId, Location, Position, PositionRange};
use garnet_typeck::node::NodeKind;
use garnet_typeck::tree::{GlobalTree, MethodId};
use garnet_typeck::ty::Type;
use garnet_typeck::worklist::{MessageSend, PendingSend};

use crate::project::Project;

/// The inferred type of the innermost located node covering `position`.
///
/// Among nodes with equally small ranges the one created last wins, which
/// is the value of the enclosing expression rather than one of its parts.
pub fn type_at_position(project: &Project, file: &FileId, position: Position) -> Option<Type> {
    let graph = project.analysis().graph();
    let mut best = None;
    for (id, node) in graph.nodes() {
        let Some(location) = &node.location else {
            continue;
        };
        if !location.contains(file, position) {
            continue;
        }
        let key = location.range.size_key();
        match best {
            Some((best_key, _)) if key > best_key => {}
            _ => best = Some((key, id)),
        }
    }
    best.map(|(_, id)| project.type_of(id).clone())
}

/// Definition sites for the reference at `position`: the methods a call
/// may reach, the methods a `super` may reach, or the declarations of a
/// constant. Builtins have no location and are left out.
pub fn definitions_at_position(project: &Project, file: &FileId, position: Position) -> Vec<Location> {
    let tree = project.analysis().tree();
    let worklist = project.analysis().worklist();

    for send in worklist.sends() {
        match send {
            PendingSend::Message(send) if covers(&send.selector, file, position) => {
                let mut methods = receiver_methods(project, send, |tree, ty| {
                    methods_for(tree, ty, &send.name)
                });
                if methods.is_empty() {
                    methods = tree.find_any_methods(&send.name);
                }
                return method_locations(tree, methods);
            }
            PendingSend::Super(super_send) if covers(&super_send.keyword, file, position) => {
                return super_locations(tree, tree.find_method_including_position(file, position));
            }
            PendingSend::Super0(super_send) if covers(&super_send.keyword, file, position) => {
                return super_locations(tree, tree.find_method_including_position(file, position));
            }
            _ => {}
        }
    }

    innermost_constant(project, file, position)
}

/// Method names completing the partially typed call at `position`.
///
/// The typed prefix is the selector under the cursor; the cursor may sit
/// right after its last character.
pub fn completions_at_position(project: &Project, file: &FileId, position: Position) -> Vec<String> {
    let Some(source) = project.file(file) else {
        return Vec::new();
    };
    let tree = project.analysis().tree();
    let Some((send, selector)) = project.analysis().worklist().message_sends().find_map(|send| {
        let selector = send.selector.as_ref()?;
        (&selector.file == file && contains_inclusive(&selector.range, position)).then_some((send, selector))
    }) else {
        return Vec::new();
    };
    let prefix = source
        .source
        .get(selector.span.start as usize..selector.span.end as usize)
        .unwrap_or("");

    let methods = receiver_methods(project, send, |tree, ty| match ty {
        Type::Nominal(name) | Type::Generic(name, _) => tree.all_instance_methods(name),
        Type::Class(name) => tree.all_class_methods(name),
        Type::Main => tree
            .methods()
            .iter()
            .filter(|m| {
                let owner = tree.definition(m.owner);
                m.location.is_some() && owner.name == "Object" && owner.eigenclass_of.is_none()
            })
            .map(|m| m.id)
            .collect(),
        _ => Vec::new(),
    });
    let mut names: Vec<String> = methods
        .into_iter()
        .map(|id| tree.method(id).name.clone())
        .filter(|name| name.starts_with(prefix))
        .collect();
    names.sort();
    names.dedup();
    names
}

// ── Helpers ────────────────────────────────────────────────────────────

fn covers(location: &Option<Location>, file: &FileId, position: Position) -> bool {
    location.as_ref().is_some_and(|l| l.contains(file, position))
}

fn contains_inclusive(range: &PositionRange, position: Position) -> bool {
    range.contains(position) || range.end == position
}

/// Apply `lookup` to every member of the send's receiver type.
fn receiver_methods(
    project: &Project,
    send: &MessageSend,
    lookup: impl Fn(&GlobalTree, &Type) -> Vec<MethodId>,
) -> Vec<MethodId> {
    let tree = project.analysis().tree();
    project
        .type_of(send.receiver)
        .members()
        .iter()
        .flat_map(|ty| lookup(tree, ty))
        .collect()
}

/// Methods a message named `name` sent to a `ty` may reach.
fn methods_for(tree: &GlobalTree, ty: &Type, name: &str) -> Vec<MethodId> {
    match ty {
        Type::Nominal(class_name) if class_name == "Nil" => tree.find_instance_methods("NilClass", name),
        Type::Nominal(class_name) | Type::Generic(class_name, _) => tree.find_instance_methods(class_name, name),
        Type::Class(class_name) => {
            let methods = tree.find_class_methods(class_name, name);
            if methods.is_empty() && name == "new" {
                tree.find_instance_methods(class_name, "initialize")
            } else {
                methods
            }
        }
        Type::Main => tree.find_instance_methods("Object", name),
        Type::Proc(_) => tree.find_instance_methods("Proc", name),
        Type::Bottom | Type::Union(_) => Vec::new(),
    }
}

fn super_locations(tree: &GlobalTree, enclosing: Option<MethodId>) -> Vec<Location> {
    let Some(enclosing) = enclosing else {
        return Vec::new();
    };
    let mut methods = tree.find_super_methods(enclosing);
    if methods.is_empty() {
        methods = tree
            .find_any_methods(&tree.method(enclosing).name)
            .into_iter()
            .filter(|&id| id != enclosing)
            .collect();
    }
    method_locations(tree, methods)
}

fn method_locations(tree: &GlobalTree, methods: Vec<MethodId>) -> Vec<Location> {
    sorted(methods.into_iter().filter_map(|id| tree.method(id).location.clone()).collect())
}

/// Declarations of the innermost constant reference covering `position`.
fn innermost_constant(project: &Project, file: &FileId, position: Position) -> Vec<Location> {
    let tree = project.analysis().tree();
    let reference = project
        .analysis()
        .graph()
        .nodes()
        .filter_map(|(_, node)| match (&node.kind, &node.location) {
            (NodeKind::Const(const_ref), Some(location)) if location.contains(file, position) => {
                Some((location.range.size_key(), const_ref))
            }
            _ => None,
        })
        .min_by_key(|(key, _)| *key)
        .map(|(_, const_ref)| const_ref);
    let Some(constant) = reference.and_then(|r| tree.solve_reference(r)) else {
        return Vec::new();
    };
    let full_name = constant.full_name();
    sorted(
        tree.constants()
            .iter()
            .filter(|c| c.full_name() == full_name)
            .filter_map(|c| c.location.clone())
            .collect(),
    )
}

fn sorted(mut locations: Vec<Location>) -> Vec<Location> {
    locations.sort_by(|a, b| (&a.file, a.span.start, a.span.end).cmp(&(&b.file, b.span.start, b.span.end)));
    locations.dedup();
    locations
}
