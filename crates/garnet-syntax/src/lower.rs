//! Lowering from the tree-sitter concrete tree to [`Ast`].
//!
//! Lowering is total: node kinds without a translation become
//! `AstKind::Unsupported` and are reported by the graph builder.

use garnet_common::Span;
use rustc_hash::FxHashSet;
use tree_sitter::Node;

use crate::ast::{
    Ast, AstKind, ConstPath, MethodDef, Param, ParamKind, Params, ResBody, Send, When,
    FORWARDED_BLOCK, FORWARDED_KWREST, FORWARDED_REST,
};
use crate::error::ParseError;
use crate::MAX_NESTING;

/// Local variables declared in one lexical frame.
struct Frame {
    names: FxHashSet<String>,
    /// Blocks see the locals of the enclosing frame; `def` and class bodies do not.
    transparent: bool,
}

pub(crate) struct Lowerer<'s> {
    src: &'s str,
    frames: Vec<Frame>,
    /// Expressions currently being lowered.
    depth: usize,
    /// First expression found past the nesting limit.
    too_deep: Option<Span>,
}

fn span(node: Node) -> Span {
    Span::new(node.start_byte() as u32, node.end_byte() as u32)
}

fn named_children(node: Node) -> Vec<Node> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| !child.is_extra())
        .collect()
}

/// Children of a construct that are not one of the `skip` fields, with
/// `body_statement` and `block_body` wrappers flattened away.
fn body_children<'t>(node: Node<'t>, skip: &[&str]) -> Vec<Node<'t>> {
    let mut out = Vec::new();
    let mut cursor = node.walk();
    if !cursor.goto_first_child() {
        return out;
    }
    loop {
        let child = cursor.node();
        let skipped = cursor.field_name().is_some_and(|field| skip.contains(&field));
        if child.is_named() && !child.is_extra() && !skipped {
            if matches!(child.kind(), "body_statement" | "block_body") {
                out.extend(named_children(child));
            } else {
                out.push(child);
            }
        }
        if !cursor.goto_next_sibling() {
            break;
        }
    }
    out
}

/// The operator token of a binary, unary, range or compound assignment:
/// the `operator` field, else the first anonymous child.
fn operator_token(node: Node) -> Option<Node> {
    node.child_by_field_name("operator").or_else(|| {
        let mut cursor = node.walk();
        let found = node.children(&mut cursor).find(|child| !child.is_named());
        found
    })
}

/// The index of a numbered block parameter such as `_2`.
fn numbered_param(name: &str) -> Option<usize> {
    let digit = name.strip_prefix('_')?;
    match digit.as_bytes() {
        [d @ b'1'..=b'9'] => Some(usize::from(d - b'0')),
        _ => None,
    }
}

fn has_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == token);
    found
}

fn merge_spans(items: &[Ast]) -> Option<Span> {
    let first = items.first()?.span;
    let last = items.last()?.span;
    Some(first.merge(last))
}

/// First ERROR or MISSING node of the tree, depth-first.
pub(crate) fn first_error(root: Node) -> Option<Node> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        if node.has_error() {
            let mut cursor = node.walk();
            let children: Vec<Node> = node.children(&mut cursor).collect();
            stack.extend(children.into_iter().rev());
        }
    }
    None
}

pub(crate) fn error_at(node: Node, source: &str) -> ParseError {
    let message = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        let text = node.utf8_text(source.as_bytes()).unwrap_or_default();
        let first_line = text.lines().next().unwrap_or_default().trim();
        if first_line.is_empty() {
            "syntax error".to_string()
        } else {
            format!("unexpected `{first_line}`")
        }
    };
    match node.parent().filter(|parent| parent.kind() != "program") {
        Some(parent) => ParseError::with_related(
            message,
            span(node),
            format!("while parsing this `{}`", parent.kind()),
            span(parent),
        ),
        None => ParseError::new(message, span(node)),
    }
}

impl<'s> Lowerer<'s> {
    pub(crate) fn new(src: &'s str) -> Self {
        Lowerer {
            src,
            frames: vec![Frame {
                names: FxHashSet::default(),
                transparent: false,
            }],
            depth: 0,
            too_deep: None,
        }
    }

    pub(crate) fn program(&mut self, root: Node) -> Result<Ast, ParseError> {
        let statements = body_children(root, &[]);
        let ast = match self.statements(&statements) {
            Some(body) => *body,
            None => Ast::new(AstKind::Begin(Vec::new()), span(root)),
        };
        match self.too_deep {
            Some(at) => Err(ParseError::new(
                format!("expression nested more than {MAX_NESTING} levels deep"),
                at,
            )),
            None => Ok(ast),
        }
    }

    // ── Local variable frames ──────────────────────────────────────────

    fn push_frame(&mut self, transparent: bool) {
        self.frames.push(Frame {
            names: FxHashSet::default(),
            transparent,
        });
    }

    fn pop_frame(&mut self) {
        self.frames.pop();
    }

    fn declare(&mut self, name: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.names.insert(name.to_string());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        for frame in self.frames.iter().rev() {
            if frame.names.contains(name) {
                return true;
            }
            if !frame.transparent {
                return false;
            }
        }
        false
    }

    fn text(&self, node: Node) -> &'s str {
        node.utf8_text(self.src.as_bytes()).unwrap_or_default()
    }

    fn unsupported(&self, node: Node) -> Ast {
        Ast::new(AstKind::Unsupported(node.kind().to_string()), span(node))
    }

    // ── Statement sequences ────────────────────────────────────────────

    /// A statement list: `None` when empty, the statement itself when
    /// there is one, a `Begin` otherwise.
    fn statements(&mut self, nodes: &[Node]) -> Option<Box<Ast>> {
        let mut items: Vec<Ast> = nodes
            .iter()
            .filter(|node| {
                !matches!(
                    node.kind(),
                    "comment" | "empty_statement" | "uninterpreted" | "heredoc_body"
                )
            })
            .map(|node| self.expr(*node))
            .collect();
        match items.len() {
            0 => None,
            1 => items.pop().map(Box::new),
            _ => {
                let whole = merge_spans(&items).unwrap_or_default();
                Some(Ast::boxed(AstKind::Begin(items), whole))
            }
        }
    }

    /// A body that may carry `rescue`, `else` and `ensure` clauses.
    fn handled_body(&mut self, nodes: &[Node], whole: Span) -> Option<Box<Ast>> {
        let mut statements = Vec::new();
        let mut rescues = Vec::new();
        let mut else_clause = None;
        let mut ensure_clause = None;
        for node in nodes {
            match node.kind() {
                "rescue" => rescues.push(*node),
                "else" => else_clause = Some(*node),
                "ensure" => ensure_clause = Some(*node),
                _ => statements.push(*node),
            }
        }

        let body = self.statements(&statements);
        if rescues.is_empty() && else_clause.is_none() && ensure_clause.is_none() {
            return body;
        }

        let mut result = body;
        if !rescues.is_empty() || else_clause.is_some() {
            let handlers = rescues.iter().map(|node| self.rescue_clause(*node)).collect();
            let else_branch = else_clause.and_then(|node| {
                let children = body_children(node, &[]);
                self.statements(&children)
            });
            let end = ensure_clause.map(|node| node.start_byte() as u32);
            let rescue_span = Span::new(whole.start, end.unwrap_or(whole.end).max(whole.start));
            result = Some(Ast::boxed(
                AstKind::Rescue {
                    body: result,
                    handlers,
                    else_branch,
                },
                rescue_span,
            ));
        }
        if let Some(node) = ensure_clause {
            let children = body_children(node, &[]);
            let ensure = self.statements(&children);
            result = Some(Ast::boxed(
                AstKind::Ensure {
                    body: result,
                    ensure,
                },
                whole,
            ));
        }
        result
    }

    fn rescue_clause(&mut self, node: Node) -> ResBody {
        let exceptions = node.child_by_field_name("exceptions").map(|list| {
            named_children(list)
                .into_iter()
                .map(|item| self.element(item))
                .collect()
        });
        let variable = node
            .child_by_field_name("variable")
            .and_then(|var| named_children(var).into_iter().next())
            .map(|target| Box::new(self.assign_target(target)));
        let body = node.child_by_field_name("body").and_then(|then| {
            let children = body_children(then, &[]);
            self.statements(&children)
        });
        ResBody {
            exceptions,
            variable,
            body,
            span: span(node),
        }
    }

    fn clause_body(&mut self, node: Option<Node>) -> Option<Box<Ast>> {
        let node = node?;
        let children = body_children(node, &[]);
        self.statements(&children)
    }

    // ── Expressions ────────────────────────────────────────────────────

    /// Lower one expression, giving up past [`MAX_NESTING`] levels.
    pub(crate) fn expr(&mut self, node: Node) -> Ast {
        if self.depth >= MAX_NESTING {
            self.too_deep.get_or_insert(span(node));
            return self.unsupported(node);
        }
        self.depth += 1;
        let ast = self.nested_expr(node);
        self.depth -= 1;
        ast
    }

    fn nested_expr(&mut self, node: Node) -> Ast {
        let whole = span(node);
        let kind = match node.kind() {
            "integer" => AstKind::Int,
            "float" => AstKind::Float,
            "rational" => AstKind::Rational,
            "complex" => AstKind::Imaginary,
            "nil" => AstKind::Nil,
            "true" => AstKind::True,
            "false" => AstKind::False,
            "self" => AstKind::SelfRef,
            "file" => AstKind::FileName,
            "line" => AstKind::LineNumber,

            "string" | "bare_string" => self.string(node, false),
            "subshell" => AstKind::XStr(self.interpolations(node)),
            "chained_string" => {
                let parts = named_children(node)
                    .into_iter()
                    .flat_map(|part| self.interpolations(part))
                    .collect();
                AstKind::DStr(parts)
            }
            "heredoc_beginning" | "character" => AstKind::Str,
            "simple_symbol" | "symbol" | "bare_symbol" => {
                AstKind::Sym(self.text(node).trim_start_matches(':').to_string())
            }
            "hash_key_symbol" => AstKind::Sym(self.text(node).to_string()),
            "delimited_symbol" => self.string(node, true),
            "regex" => AstKind::Regexp(self.interpolations(node)),
            "string_array" | "symbol_array" => {
                let items = named_children(node)
                    .into_iter()
                    .map(|item| self.expr(item))
                    .collect();
                AstKind::Array(items)
            }
            "array" => AstKind::Array(self.elements(node)),
            "hash" => {
                let pairs = named_children(node)
                    .into_iter()
                    .map(|item| self.element(item))
                    .collect();
                AstKind::Hash {
                    pairs,
                    braces: true,
                }
            }
            "pair" => return self.pair(node),
            "range" => {
                let from = node
                    .child_by_field_name("begin")
                    .map(|n| Box::new(self.expr(n)));
                let to = node
                    .child_by_field_name("end")
                    .map(|n| Box::new(self.expr(n)));
                let inclusive = match operator_token(node) {
                    Some(op) => op.kind() == "..",
                    None => has_token(node, ".."),
                };
                AstKind::Range {
                    from,
                    to,
                    inclusive,
                }
            }

            "identifier" => {
                let name = self.text(node);
                // The grammar reads these keywords as plain identifiers.
                if name == "__FILE__" {
                    AstKind::FileName
                } else if name == "__LINE__" {
                    AstKind::LineNumber
                } else if self.is_local(name) {
                    AstKind::Lvar(name.to_string())
                } else {
                    AstKind::Send(Box::new(Send {
                        receiver: None,
                        name: name.to_string(),
                        selector: whole,
                        args: Vec::new(),
                        safe_navigation: false,
                    }))
                }
            }
            "instance_variable" => AstKind::Ivar(self.text(node).to_string()),
            "class_variable" => AstKind::Cvar(self.text(node).to_string()),
            "global_variable" => self.global(node),
            "constant" | "scope_resolution" => match self.const_path(node) {
                Ok(path) => AstKind::Const(path),
                Err(ast) => return ast,
            },

            "parenthesized_statements" => {
                let children = body_children(node, &[]);
                AstKind::Begin(self.flat_statements(&children))
            }
            "begin" => {
                let children = body_children(node, &[]);
                match self.handled_body(&children, whole) {
                    Some(body) => match body.kind {
                        AstKind::Begin(items) => AstKind::KwBegin(items),
                        _ => AstKind::KwBegin(vec![*body]),
                    },
                    None => AstKind::KwBegin(Vec::new()),
                }
            }

            "method" => return self.method(node, None),
            "singleton_method" => {
                let Some(object) = node.child_by_field_name("object") else {
                    return self.unsupported(node);
                };
                let receiver = self.expr(object);
                return self.method(node, Some(receiver));
            }
            "class" => return self.class(node),
            "singleton_class" => {
                let Some(value) = node.child_by_field_name("value") else {
                    return self.unsupported(node);
                };
                let target = Box::new(self.expr(value));
                self.push_frame(false);
                let children = body_children(node, &["value"]);
                let body = self.handled_body(&children, whole);
                self.pop_frame();
                AstKind::SClass { target, body }
            }
            "module" => {
                let Some(name) = node.child_by_field_name("name") else {
                    return self.unsupported(node);
                };
                let name = match self.const_path(name) {
                    Ok(path) => path,
                    Err(ast) => return ast,
                };
                self.push_frame(false);
                let children = body_children(node, &["name"]);
                let body = self.handled_body(&children, whole);
                self.pop_frame();
                AstKind::Module { name, body }
            }
            "alias" => AstKind::Alias,
            "undef" => AstKind::Undef,

            "call" => return self.call(node),
            "element_reference" => {
                let Some(object) = node.child_by_field_name("object") else {
                    return self.unsupported(node);
                };
                let receiver = self.expr(object);
                let args = self.index_args(node);
                AstKind::Send(Box::new(Send {
                    receiver: Some(Box::new(receiver)),
                    name: "[]".to_string(),
                    selector: Span::new(object.end_byte() as u32, whole.end),
                    args,
                    safe_navigation: false,
                }))
            }
            "super" => AstKind::ZSuper,
            "yield" => AstKind::Yield(self.argument_list(node)),
            "lambda" => {
                self.push_frame(true);
                let params = match self.params(node.child_by_field_name("parameters")) {
                    Ok(params) => params,
                    Err(ast) => {
                        self.pop_frame();
                        return ast;
                    }
                };
                let body = node.child_by_field_name("body").and_then(|block| {
                    let children = body_children(block, &["parameters"]);
                    self.handled_body(&children, span(block))
                });
                self.pop_frame();
                AstKind::Lambda { params, body }
            }

            "assignment" => return self.assignment(node),
            "operator_assignment" => return self.operator_assignment(node),
            "binary" => return self.binary(node),
            "unary" => return self.unary(node),

            "if" | "unless" | "elsif" => {
                let Some(cond) = node.child_by_field_name("condition") else {
                    return self.unsupported(node);
                };
                let cond = Box::new(self.expr(cond));
                let consequence = self.clause_body(node.child_by_field_name("consequence"));
                let alternative = node.child_by_field_name("alternative").and_then(|alt| {
                    if alt.kind() == "elsif" {
                        Some(Box::new(self.expr(alt)))
                    } else {
                        self.clause_body(Some(alt))
                    }
                });
                if node.kind() == "unless" {
                    AstKind::If {
                        cond,
                        then_branch: alternative,
                        else_branch: consequence,
                    }
                } else {
                    AstKind::If {
                        cond,
                        then_branch: consequence,
                        else_branch: alternative,
                    }
                }
            }
            "if_modifier" | "unless_modifier" => {
                let (Some(body), Some(cond)) = (
                    node.child_by_field_name("body"),
                    node.child_by_field_name("condition"),
                ) else {
                    return self.unsupported(node);
                };
                let body = Some(Box::new(self.expr(body)));
                let cond = Box::new(self.expr(cond));
                if node.kind() == "unless_modifier" {
                    AstKind::If {
                        cond,
                        then_branch: None,
                        else_branch: body,
                    }
                } else {
                    AstKind::If {
                        cond,
                        then_branch: body,
                        else_branch: None,
                    }
                }
            }
            "conditional" => {
                let Some(cond) = node.child_by_field_name("condition") else {
                    return self.unsupported(node);
                };
                let cond = Box::new(self.expr(cond));
                let then_branch = node
                    .child_by_field_name("consequence")
                    .map(|n| Box::new(self.expr(n)));
                let else_branch = node
                    .child_by_field_name("alternative")
                    .map(|n| Box::new(self.expr(n)));
                AstKind::If {
                    cond,
                    then_branch,
                    else_branch,
                }
            }
            "while" | "until" => {
                let Some(cond) = node.child_by_field_name("condition") else {
                    return self.unsupported(node);
                };
                let cond = Box::new(self.expr(cond));
                let body = self.clause_body(node.child_by_field_name("body"));
                AstKind::While {
                    cond,
                    body,
                    until: node.kind() == "until",
                }
            }
            "while_modifier" | "until_modifier" => {
                let (Some(body), Some(cond)) = (
                    node.child_by_field_name("body"),
                    node.child_by_field_name("condition"),
                ) else {
                    return self.unsupported(node);
                };
                let body = Some(Box::new(self.expr(body)));
                let cond = Box::new(self.expr(cond));
                AstKind::While {
                    cond,
                    body,
                    until: node.kind() == "until_modifier",
                }
            }
            "for" => {
                let (Some(pattern), Some(value)) = (
                    node.child_by_field_name("pattern"),
                    node.child_by_field_name("value"),
                ) else {
                    return self.unsupported(node);
                };
                let iter = match named_children(value).into_iter().next() {
                    Some(iter) => self.expr(iter),
                    None => return self.unsupported(value),
                };
                let target = if pattern.kind() == "left_assignment_list" {
                    self.mlhs(pattern)
                } else {
                    self.assign_target(pattern)
                };
                let body = self.clause_body(node.child_by_field_name("body"));
                AstKind::For {
                    target: Box::new(target),
                    iter: Box::new(iter),
                    body,
                }
            }
            "case" => {
                let subject = node
                    .child_by_field_name("value")
                    .map(|n| Box::new(self.expr(n)));
                let mut whens = Vec::new();
                let mut else_branch = None;
                for child in named_children(node) {
                    match child.kind() {
                        "when" => whens.push(self.when(child)),
                        "else" => else_branch = self.clause_body(Some(child)),
                        _ => {}
                    }
                }
                AstKind::Case {
                    subject,
                    whens,
                    else_branch,
                }
            }
            "rescue_modifier" => {
                let (Some(body), Some(handler)) = (
                    node.child_by_field_name("body"),
                    node.child_by_field_name("handler"),
                ) else {
                    return self.unsupported(node);
                };
                let body = Some(Box::new(self.expr(body)));
                let handler = self.expr(handler);
                let handler_span = handler.span;
                AstKind::Rescue {
                    body,
                    handlers: vec![ResBody {
                        exceptions: None,
                        variable: None,
                        body: Some(Box::new(handler)),
                        span: handler_span,
                    }],
                    else_branch: None,
                }
            }
            "return" => AstKind::Return(self.argument_list(node)),
            "break" | "next" => {
                let mut args = self.argument_list(node);
                let value = match args.len() {
                    0 => None,
                    1 => args.pop().map(Box::new),
                    _ => {
                        let values_span = merge_spans(&args).unwrap_or(whole);
                        Some(Ast::boxed(AstKind::Array(args), values_span))
                    }
                };
                if node.kind() == "break" {
                    AstKind::Break(value)
                } else {
                    AstKind::Next(value)
                }
            }
            "redo" => AstKind::Redo,
            "retry" => AstKind::Retry,

            _ => AstKind::Unsupported(node.kind().to_string()),
        };
        Ast::new(kind, whole)
    }

    fn flat_statements(&mut self, nodes: &[Node]) -> Vec<Ast> {
        match self.statements(nodes) {
            Some(body) => match body.kind {
                AstKind::Begin(items) => items,
                _ => vec![*body],
            },
            None => Vec::new(),
        }
    }

    /// Interpolated expressions of a string-like node.
    fn interpolations(&mut self, node: Node) -> Vec<Ast> {
        named_children(node)
            .into_iter()
            .filter(|child| child.kind() == "interpolation")
            .map(|child| {
                let children = body_children(child, &[]);
                match self.statements(&children) {
                    Some(body) => *body,
                    None => Ast::new(AstKind::Begin(Vec::new()), span(child)),
                }
            })
            .collect()
    }

    fn string(&mut self, node: Node, symbol: bool) -> AstKind {
        let interpolated = named_children(node)
            .iter()
            .any(|child| child.kind() == "interpolation");
        match (interpolated, symbol) {
            (true, false) => AstKind::DStr(self.interpolations(node)),
            (true, true) => AstKind::DSym(self.interpolations(node)),
            (false, false) => AstKind::Str,
            (false, true) => {
                let content: String = named_children(node)
                    .into_iter()
                    .map(|child| self.text(child))
                    .collect();
                AstKind::Sym(content)
            }
        }
    }

    fn global(&self, node: Node) -> AstKind {
        let name = self.text(node);
        let tail = &name[1.min(name.len())..];
        if let Ok(nth) = tail.parse::<u32>() {
            return AstKind::NthRef(nth);
        }
        match tail {
            "&" | "`" | "'" | "+" => AstKind::BackRef(name.to_string()),
            _ => AstKind::Gvar(name.to_string()),
        }
    }

    fn const_path(&mut self, node: Node) -> Result<ConstPath, Ast> {
        match node.kind() {
            "constant" => Ok(ConstPath {
                absolute: false,
                segments: vec![self.text(node).to_string()],
                name_span: span(node),
            }),
            "scope_resolution" => {
                let Some(name) = node.child_by_field_name("name") else {
                    return Err(self.unsupported(node));
                };
                let mut path = match node.child_by_field_name("scope") {
                    None => ConstPath {
                        absolute: true,
                        segments: Vec::new(),
                        name_span: span(name),
                    },
                    Some(scope) if matches!(scope.kind(), "constant" | "scope_resolution") => {
                        self.const_path(scope)?
                    }
                    Some(_) => {
                        return Err(Ast::new(
                            AstKind::Unsupported("dynamic_constant_scope".to_string()),
                            span(node),
                        ))
                    }
                };
                path.segments.push(self.text(name).to_string());
                path.name_span = span(name);
                Ok(path)
            }
            _ => Err(self.unsupported(node)),
        }
    }

    // ── Collections and arguments ──────────────────────────────────────

    /// An element of an array, argument or exception list.
    fn element(&mut self, node: Node) -> Ast {
        match node.kind() {
            "splat_argument" => {
                let inner = named_children(node)
                    .into_iter()
                    .next()
                    .map(|n| Box::new(self.expr(n)));
                Ast::new(AstKind::Splat(inner), span(node))
            }
            "hash_splat_argument" => match named_children(node).into_iter().next() {
                Some(inner) => {
                    let inner = self.expr(inner);
                    Ast::new(AstKind::KwSplat(Box::new(inner)), span(node))
                }
                None => self.unsupported(node),
            },
            "block_argument" => {
                let inner = named_children(node)
                    .into_iter()
                    .next()
                    .map(|n| Box::new(self.expr(n)));
                Ast::new(AstKind::BlockPass(inner), span(node))
            }
            "pair" => self.pair(node),
            _ => self.expr(node),
        }
    }

    /// Lower a list of actual arguments, grouping trailing `key: value`
    /// pairs into one brace-less hash and moving a block pass last.
    fn actuals(&mut self, nodes: Vec<Node>) -> Vec<Ast> {
        let mut positional = Vec::new();
        let mut keywords = Vec::new();
        let mut block = None;
        for node in nodes {
            if node.kind() == "forward_argument" && self.is_local(FORWARDED_REST) {
                let at = span(node);
                let read = |name: &str| Ast::boxed(AstKind::Lvar(name.to_string()), at);
                positional.push(Ast::new(AstKind::Splat(Some(read(FORWARDED_REST))), at));
                keywords.push(Ast::new(AstKind::KwSplat(read(FORWARDED_KWREST)), at));
                block = Some(Ast::new(AstKind::BlockPass(Some(read(FORWARDED_BLOCK))), at));
                continue;
            }
            let item = self.element(node);
            match item.kind {
                AstKind::Pair { .. } | AstKind::KwSplat(_) => keywords.push(item),
                AstKind::BlockPass(_) => block = Some(item),
                _ => positional.push(item),
            }
        }
        if let Some(kw_span) = merge_spans(&keywords) {
            positional.push(Ast::new(
                AstKind::Hash {
                    pairs: keywords,
                    braces: false,
                },
                kw_span,
            ));
        }
        positional.extend(block);
        positional
    }

    fn elements(&mut self, node: Node) -> Vec<Ast> {
        self.actuals(named_children(node))
    }

    fn index_args(&mut self, node: Node) -> Vec<Ast> {
        let mut cursor = node.walk();
        let mut items = Vec::new();
        if cursor.goto_first_child() {
            loop {
                let child = cursor.node();
                if child.is_named() && !child.is_extra() && cursor.field_name() != Some("object")
                {
                    items.push(child);
                }
                if !cursor.goto_next_sibling() {
                    break;
                }
            }
        }
        self.actuals(items)
    }

    /// Arguments of a keyword statement such as `return 1, 2` or `yield x`.
    fn argument_list(&mut self, node: Node) -> Vec<Ast> {
        match named_children(node)
            .into_iter()
            .find(|child| child.kind() == "argument_list")
        {
            Some(list) => self.elements(list),
            None => Vec::new(),
        }
    }

    fn pair(&mut self, node: Node) -> Ast {
        let whole = span(node);
        let Some(key_node) = node.child_by_field_name("key") else {
            return self.unsupported(node);
        };
        let arrow = has_token(node, "=>");
        let key = match key_node.kind() {
            "string" if !arrow => Ast::new(self.string(key_node, true), span(key_node)),
            _ => self.element(key_node),
        };
        let value = match node.child_by_field_name("value") {
            Some(value) => self.expr(value),
            None => {
                // `{ name: }` reads the variable or method `name`.
                let name = self.text(key_node).trim_end_matches(':').to_string();
                let key_span = span(key_node);
                if self.is_local(&name) {
                    Ast::new(AstKind::Lvar(name), key_span)
                } else {
                    Ast::new(
                        AstKind::Send(Box::new(Send {
                            receiver: None,
                            name,
                            selector: key_span,
                            args: Vec::new(),
                            safe_navigation: false,
                        })),
                        key_span,
                    )
                }
            }
        };
        Ast::new(
            AstKind::Pair {
                key: Box::new(key),
                value: Box::new(value),
            },
            whole,
        )
    }

    fn when(&mut self, node: Node) -> When {
        let mut cursor = node.walk();
        let patterns: Vec<Node> = node
            .children_by_field_name("pattern", &mut cursor)
            .collect();
        let patterns = patterns
            .into_iter()
            .filter_map(|pattern| named_children(pattern).into_iter().next())
            .map(|item| self.element(item))
            .collect();
        let body = self.clause_body(node.child_by_field_name("body"));
        When {
            patterns,
            body,
            span: span(node),
        }
    }

    // ── Calls ──────────────────────────────────────────────────────────

    fn call(&mut self, node: Node) -> Ast {
        let whole = span(node);
        let receiver = node
            .child_by_field_name("receiver")
            .map(|n| Box::new(self.expr(n)));
        let method = node.child_by_field_name("method");
        let arguments = node.child_by_field_name("arguments");
        let args = match arguments {
            Some(list) => self.elements(list),
            None => Vec::new(),
        };

        let call = match method {
            Some(m) if m.kind() == "super" && receiver.is_none() => {
                if arguments.is_some() {
                    AstKind::Super(args)
                } else {
                    AstKind::ZSuper
                }
            }
            _ => {
                let (name, selector) = match method {
                    Some(m) => (self.text(m).to_string(), span(m)),
                    None => {
                        let operator = node.child_by_field_name("operator").map(span);
                        ("call".to_string(), operator.unwrap_or(whole))
                    }
                };
                let safe_navigation = has_token(node, "&.");
                AstKind::Send(Box::new(Send {
                    receiver,
                    name,
                    selector,
                    args,
                    safe_navigation,
                }))
            }
        };

        let Some(block) = node.child_by_field_name("block") else {
            return Ast::new(call, whole);
        };
        let call_end = block.start_byte() as u32;
        let call_span = Span::new(whole.start, call_end.max(whole.start));
        let is_lambda = matches!(
            &call,
            AstKind::Send(send)
                if send.receiver.is_none() && send.name == "lambda" && send.args.is_empty()
        );

        self.push_frame(true);
        let params = match block.child_by_field_name("parameters") {
            Some(list) => match self.params(Some(list)) {
                Ok(params) => params,
                Err(ast) => {
                    self.pop_frame();
                    return ast;
                }
            },
            None => self.implicit_params(block),
        };
        let children = body_children(block, &["parameters"]);
        let body = self.handled_body(&children, span(block));
        self.pop_frame();

        if is_lambda {
            Ast::new(AstKind::Lambda { params, body }, whole)
        } else {
            Ast::new(
                AstKind::Block {
                    call: Ast::boxed(call, call_span),
                    params,
                    body,
                },
                whole,
            )
        }
    }

    fn binary(&mut self, node: Node) -> Ast {
        let whole = span(node);
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return self.unsupported(node);
        };
        let operator = operator_token(node);
        let op = operator.map(|op| op.kind()).unwrap_or_default();
        let lhs = Box::new(self.expr(left));
        let rhs = self.expr(right);
        let kind = match op {
            "and" | "&&" => AstKind::And(lhs, Box::new(rhs)),
            "or" | "||" => AstKind::Or(lhs, Box::new(rhs)),
            _ => AstKind::Send(Box::new(Send {
                receiver: Some(lhs),
                name: op.to_string(),
                selector: operator.map(span).unwrap_or(whole),
                args: vec![rhs],
                safe_navigation: false,
            })),
        };
        Ast::new(kind, whole)
    }

    fn unary(&mut self, node: Node) -> Ast {
        let whole = span(node);
        let Some(operand) = node.child_by_field_name("operand") else {
            return self.unsupported(node);
        };
        let operator = operator_token(node);
        let op = operator.map(|op| op.kind()).unwrap_or_default();
        if op == "-" && matches!(operand.kind(), "integer" | "float" | "rational" | "complex") {
            let mut literal = self.expr(operand);
            literal.span = whole;
            return literal;
        }
        let inner = Box::new(self.expr(operand));
        let kind = match op {
            "!" | "not" => AstKind::Not(inner),
            "defined?" => AstKind::Defined(inner),
            _ => {
                let name = match op {
                    "-" => "-@",
                    "+" => "+@",
                    other => other,
                };
                AstKind::Send(Box::new(Send {
                    receiver: Some(inner),
                    name: name.to_string(),
                    selector: operator.map(span).unwrap_or(whole),
                    args: Vec::new(),
                    safe_navigation: false,
                }))
            }
        };
        Ast::new(kind, whole)
    }

    // ── Definitions ────────────────────────────────────────────────────

    fn method(&mut self, node: Node, receiver: Option<Ast>) -> Ast {
        let whole = span(node);
        let Some(name) = node.child_by_field_name("name") else {
            return self.unsupported(node);
        };
        self.push_frame(false);
        let params = match self.params(node.child_by_field_name("parameters")) {
            Ok(params) => params,
            Err(ast) => {
                self.pop_frame();
                return ast;
            }
        };
        let children = body_children(node, &["name", "parameters", "object"]);
        let body = self.handled_body(&children, whole);
        self.pop_frame();

        let def = Box::new(MethodDef {
            name: self.text(name).to_string(),
            name_span: span(name),
            params,
            body,
        });
        let kind = match receiver {
            Some(receiver) => AstKind::Defs {
                receiver: Box::new(receiver),
                def,
            },
            None => AstKind::Def(def),
        };
        Ast::new(kind, whole)
    }

    fn class(&mut self, node: Node) -> Ast {
        let whole = span(node);
        let Some(name) = node.child_by_field_name("name") else {
            return self.unsupported(node);
        };
        let name = match self.const_path(name) {
            Ok(path) => path,
            Err(ast) => return ast,
        };
        let superclass = node
            .child_by_field_name("superclass")
            .and_then(|sc| named_children(sc).into_iter().next())
            .map(|expr| Box::new(self.expr(expr)));
        self.push_frame(false);
        let children = body_children(node, &["name", "superclass"]);
        let body = self.handled_body(&children, whole);
        self.pop_frame();
        Ast::new(
            AstKind::Class {
                name,
                superclass,
                body,
            },
            whole,
        )
    }

    fn params(&mut self, node: Option<Node>) -> Result<Params, Ast> {
        let Some(node) = node else {
            return Ok(Params::default());
        };
        let mut cursor = node.walk();
        let locals: Vec<Node> = node.children_by_field_name("locals", &mut cursor).collect();
        for local in &locals {
            let name = self.text(*local);
            self.declare(name);
        }
        let local_ids: FxHashSet<usize> = locals.iter().map(|n| n.id()).collect();
        let mut params = Vec::new();
        for child in named_children(node) {
            if local_ids.contains(&child.id()) || child.kind() == "hash_splat_nil" {
                continue;
            }
            params.push(self.param(child)?);
        }
        Ok(Params(params))
    }

    /// Parameters of a block with no parameter list: `_1` up to the highest
    /// numbered one its body reads, else `it`. Nested blocks and
    /// definitions have their own.
    fn implicit_params(&mut self, block: Node) -> Params {
        let mut highest = 0;
        let mut it = false;
        let mut stack = named_children(block);
        while let Some(node) = stack.pop() {
            match node.kind() {
                "block" | "do_block" | "lambda" | "method" | "singleton_method" | "class"
                | "singleton_class" | "module" => {}
                "identifier" => {
                    let name = self.text(node);
                    if let Some(n) = numbered_param(name) {
                        highest = highest.max(n);
                    } else if name == "it" && !self.is_local(name) {
                        it = true;
                    }
                }
                "call" => {
                    let method = node.child_by_field_name("method").map(|m| m.id());
                    stack.extend(
                        named_children(node)
                            .into_iter()
                            .filter(|child| Some(child.id()) != method),
                    );
                }
                _ => stack.extend(named_children(node)),
            }
        }
        let names: Vec<String> = if highest > 0 {
            (1..=highest).map(|n| format!("_{n}")).collect()
        } else if it {
            vec!["it".to_string()]
        } else {
            Vec::new()
        };
        let at = span(block);
        let params = names
            .into_iter()
            .map(|name| {
                self.declare(&name);
                Param {
                    kind: ParamKind::Arg(name),
                    span: at,
                }
            })
            .collect();
        Params(params)
    }

    fn param_name(&mut self, node: Node) -> Option<String> {
        let name = node.child_by_field_name("name")?;
        let name = self.text(name).to_string();
        self.declare(&name);
        Some(name)
    }

    fn param(&mut self, node: Node) -> Result<Param, Ast> {
        let kind = match node.kind() {
            "identifier" => {
                let name = self.text(node).to_string();
                self.declare(&name);
                ParamKind::Arg(name)
            }
            "optional_parameter" | "keyword_parameter" => {
                let default = node
                    .child_by_field_name("value")
                    .map(|value| Box::new(self.expr(value)));
                let Some(name) = self.param_name(node) else {
                    return Err(self.unsupported(node));
                };
                match (node.kind(), default) {
                    ("optional_parameter", Some(default)) => ParamKind::OptArg(name, default),
                    ("optional_parameter", None) => return Err(self.unsupported(node)),
                    (_, Some(default)) => ParamKind::KwOptArg(name, default),
                    (_, None) => ParamKind::KwArg(name),
                }
            }
            "splat_parameter" => ParamKind::RestArg(self.param_name(node)),
            "hash_splat_parameter" => ParamKind::KwRestArg(self.param_name(node)),
            "block_parameter" => ParamKind::BlockArg(self.param_name(node)),
            "destructured_parameter" => {
                let nested = named_children(node)
                    .into_iter()
                    .map(|child| self.param(child))
                    .collect::<Result<Vec<_>, _>>()?;
                ParamKind::Mlhs(nested)
            }
            "forward_parameter" => {
                for name in [FORWARDED_REST, FORWARDED_KWREST, FORWARDED_BLOCK] {
                    self.declare(name);
                }
                ParamKind::Forward
            }
            _ => return Err(self.unsupported(node)),
        };
        Ok(Param {
            kind,
            span: span(node),
        })
    }

    // ── Assignment ─────────────────────────────────────────────────────

    fn assignment(&mut self, node: Node) -> Ast {
        let whole = span(node);
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return self.unsupported(node);
        };
        if left.kind() == "left_assignment_list" {
            let targets = self.mlhs(left);
            let value = self.assigned_value(right);
            return Ast::new(
                AstKind::MAsgn {
                    targets: Box::new(targets),
                    value: Box::new(value),
                },
                whole,
            );
        }
        let target = self.assign_target(left);
        let value = self.assigned_value(right);
        with_value(target, value, whole)
    }

    fn assigned_value(&mut self, node: Node) -> Ast {
        match node.kind() {
            "right_assignment_list" => Ast::new(AstKind::Array(self.elements(node)), span(node)),
            "splat_argument" => {
                let splat = self.element(node);
                Ast::new(AstKind::Array(vec![splat]), span(node))
            }
            _ => self.expr(node),
        }
    }

    fn mlhs(&mut self, node: Node) -> Ast {
        let targets = named_children(node)
            .into_iter()
            .map(|child| self.assign_target(child))
            .collect();
        Ast::new(AstKind::Mlhs(targets), span(node))
    }

    /// An assignment target without its value.
    fn assign_target(&mut self, node: Node) -> Ast {
        let whole = span(node);
        let kind = match node.kind() {
            "identifier" => {
                let name = self.text(node).to_string();
                self.declare(&name);
                AstKind::Lvasgn { name, value: None }
            }
            "instance_variable" => AstKind::Ivasgn {
                name: self.text(node).to_string(),
                value: None,
            },
            "class_variable" => AstKind::Cvasgn {
                name: self.text(node).to_string(),
                value: None,
            },
            "global_variable" => AstKind::Gvasgn {
                name: self.text(node).to_string(),
                value: None,
            },
            "constant" | "scope_resolution" => match self.const_path(node) {
                Ok(path) => AstKind::Casgn { path, value: None },
                Err(ast) => return ast,
            },
            "call" => match self.call(node).kind {
                AstKind::Send(mut send) => {
                    send.name.push('=');
                    AstKind::Send(send)
                }
                _ => return self.unsupported(node),
            },
            "element_reference" => match self.expr(node).kind {
                AstKind::Send(mut send) => {
                    send.name = "[]=".to_string();
                    AstKind::Send(send)
                }
                other => other,
            },
            "rest_assignment" => {
                let inner = named_children(node)
                    .into_iter()
                    .next()
                    .map(|target| Box::new(self.assign_target(target)));
                AstKind::Splat(inner)
            }
            "destructured_left_assignment" | "left_assignment_list" => {
                return self.mlhs(node);
            }
            _ => return self.unsupported(node),
        };
        Ast::new(kind, whole)
    }

    fn operator_assignment(&mut self, node: Node) -> Ast {
        let whole = span(node);
        let (Some(left), Some(right)) = (
            node.child_by_field_name("left"),
            node.child_by_field_name("right"),
        ) else {
            return self.unsupported(node);
        };
        let op = operator_token(node).map(|op| op.kind()).unwrap_or("=");
        // Compound targets of a call keep the reader form.
        let target = match left.kind() {
            "call" | "element_reference" => self.expr(left),
            _ => self.assign_target(left),
        };
        let value = Box::new(self.expr(right));
        let target = Box::new(target);
        let kind = match op {
            "||=" => AstKind::OrAsgn { target, value },
            "&&=" => AstKind::AndAsgn { target, value },
            _ => AstKind::OpAsgn {
                target,
                op: op.trim_end_matches('=').to_string(),
                value,
            },
        };
        Ast::new(kind, whole)
    }
}

/// Attach an assigned value to a target produced by `assign_target`.
fn with_value(target: Ast, value: Ast, whole: Span) -> Ast {
    let value = Box::new(value);
    let kind = match target.kind {
        AstKind::Lvasgn { name, .. } => AstKind::Lvasgn {
            name,
            value: Some(value),
        },
        AstKind::Ivasgn { name, .. } => AstKind::Ivasgn {
            name,
            value: Some(value),
        },
        AstKind::Cvasgn { name, .. } => AstKind::Cvasgn {
            name,
            value: Some(value),
        },
        AstKind::Gvasgn { name, .. } => AstKind::Gvasgn {
            name,
            value: Some(value),
        },
        AstKind::Casgn { path, .. } => AstKind::Casgn {
            path,
            value: Some(value),
        },
        AstKind::Send(mut send) => {
            send.args.push(*value);
            AstKind::Send(send)
        }
        other => other,
    };
    Ast::new(kind, whole)
}
