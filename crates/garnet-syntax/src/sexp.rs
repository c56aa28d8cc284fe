//! S-expression rendering of [`Ast`] for tests and `--dump-ast` style debugging.

use crate::ast::{Ast, AstKind, Param, ParamKind, Params};

/// Render `ast` as a single-line s-expression. Literal nodes print the
/// source text they were lowered from.
pub fn debug_tree(ast: &Ast, source: &str) -> String {
    let mut printer = Printer {
        source,
        out: String::new(),
    };
    printer.node(ast);
    printer.out
}

struct Printer<'s> {
    source: &'s str,
    out: String,
}

impl Printer<'_> {
    fn text(&self, ast: &Ast) -> &str {
        self.source
            .get(ast.span.start as usize..ast.span.end as usize)
            .unwrap_or_default()
    }

    fn open(&mut self, head: &str) {
        self.out.push('(');
        self.out.push_str(head);
    }

    fn atom(&mut self, atom: &str) {
        self.out.push(' ');
        self.out.push_str(atom);
    }

    fn close(&mut self) {
        self.out.push(')');
    }

    fn child(&mut self, ast: &Ast) {
        self.out.push(' ');
        self.node(ast);
    }

    fn opt(&mut self, ast: Option<&Ast>) {
        match ast {
            Some(ast) => self.child(ast),
            None => self.atom("nil"),
        }
    }

    fn list(&mut self, head: &str, items: &[Ast]) {
        self.open(head);
        for item in items {
            self.child(item);
        }
        self.close();
    }

    fn leaf(&mut self, head: &str, ast: &Ast) {
        let text = self.text(ast).to_string();
        self.open(head);
        self.atom(&text);
        self.close();
    }

    fn named(&mut self, head: &str, name: &str) {
        self.open(head);
        self.atom(&format!(":{name}"));
        self.close();
    }

    fn node(&mut self, ast: &Ast) {
        use AstKind::*;
        match &ast.kind {
            Int => self.leaf("int", ast),
            Float => self.leaf("float", ast),
            Rational => self.leaf("rational", ast),
            Imaginary => self.leaf("complex", ast),
            True => self.out.push_str("(true)"),
            False => self.out.push_str("(false)"),
            Nil => self.out.push_str("(nil)"),
            SelfRef => self.out.push_str("(self)"),
            Str => self.leaf("str", ast),
            DStr(parts) => self.list("dstr", parts),
            XStr(parts) => self.list("xstr", parts),
            Sym(name) => self.named("sym", name),
            DSym(parts) => self.list("dsym", parts),
            Regexp(parts) => self.list("regexp", parts),
            Array(items) => self.list("array", items),
            Hash { pairs, braces } => self.list(if *braces { "hash" } else { "kwargs" }, pairs),
            Pair { key, value } => {
                self.open("pair");
                self.child(key);
                self.child(value);
                self.close();
            }
            KwSplat(inner) => {
                self.open("kwsplat");
                self.child(inner);
                self.close();
            }
            Range {
                from,
                to,
                inclusive,
            } => {
                self.open(if *inclusive { "irange" } else { "erange" });
                self.opt(from.as_deref());
                self.opt(to.as_deref());
                self.close();
            }
            NthRef(n) => {
                self.open("nth-ref");
                self.atom(&n.to_string());
                self.close();
            }
            BackRef(name) => {
                self.open("back-ref");
                self.atom(name);
                self.close();
            }
            Defined(inner) => {
                self.open("defined?");
                self.child(inner);
                self.close();
            }
            FileName => self.out.push_str("(__FILE__)"),
            LineNumber => self.out.push_str("(__LINE__)"),

            Lvar(name) => self.named("lvar", name),
            Ivar(name) => self.named("ivar", name),
            Cvar(name) => self.named("cvar", name),
            Gvar(name) => self.named("gvar", name),
            Lvasgn { name, value } => self.assign("lvasgn", name, value.as_deref()),
            Ivasgn { name, value } => self.assign("ivasgn", name, value.as_deref()),
            Cvasgn { name, value } => self.assign("cvasgn", name, value.as_deref()),
            Gvasgn { name, value } => self.assign("gvasgn", name, value.as_deref()),
            Const(path) => {
                self.open("const");
                self.atom(&path.to_string());
                self.close();
            }
            Casgn { path, value } => {
                self.open("casgn");
                self.atom(&path.to_string());
                if let Some(value) = value {
                    self.child(value);
                }
                self.close();
            }

            Send(send) => {
                self.open(if send.safe_navigation { "csend" } else { "send" });
                self.opt(send.receiver.as_deref());
                self.atom(&format!(":{}", send.name));
                for arg in &send.args {
                    self.child(arg);
                }
                self.close();
            }
            Splat(inner) => {
                self.open("splat");
                if let Some(inner) = inner {
                    self.child(inner);
                }
                self.close();
            }
            BlockPass(inner) => {
                self.open("block-pass");
                if let Some(inner) = inner {
                    self.child(inner);
                }
                self.close();
            }
            Block { call, params, body } => {
                self.open("block");
                self.child(call);
                self.params(params);
                self.opt(body.as_deref());
                self.close();
            }
            Lambda { params, body } => {
                self.open("lambda");
                self.params(params);
                self.opt(body.as_deref());
                self.close();
            }
            Super(args) => self.list("super", args),
            ZSuper => self.out.push_str("(zsuper)"),
            Yield(args) => self.list("yield", args),

            Def(def) => {
                self.open("def");
                self.atom(&format!(":{}", def.name));
                self.params(&def.params);
                self.opt(def.body.as_deref());
                self.close();
            }
            Defs { receiver, def } => {
                self.open("defs");
                self.child(receiver);
                self.atom(&format!(":{}", def.name));
                self.params(&def.params);
                self.opt(def.body.as_deref());
                self.close();
            }
            Class {
                name,
                superclass,
                body,
            } => {
                self.open("class");
                self.atom(&name.to_string());
                self.opt(superclass.as_deref());
                self.opt(body.as_deref());
                self.close();
            }
            SClass { target, body } => {
                self.open("sclass");
                self.child(target);
                self.opt(body.as_deref());
                self.close();
            }
            Module { name, body } => {
                self.open("module");
                self.atom(&name.to_string());
                self.opt(body.as_deref());
                self.close();
            }
            Alias => self.out.push_str("(alias)"),
            Undef => self.out.push_str("(undef)"),

            Begin(items) => self.list("begin", items),
            KwBegin(items) => self.list("kwbegin", items),
            And(lhs, rhs) | Or(lhs, rhs) => {
                self.open(if matches!(ast.kind, And(..)) { "and" } else { "or" });
                self.child(lhs);
                self.child(rhs);
                self.close();
            }
            Not(inner) => {
                self.open("not");
                self.child(inner);
                self.close();
            }
            If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.open("if");
                self.child(cond);
                self.opt(then_branch.as_deref());
                self.opt(else_branch.as_deref());
                self.close();
            }
            Case {
                subject,
                whens,
                else_branch,
            } => {
                self.open("case");
                self.opt(subject.as_deref());
                for when in whens {
                    self.out.push(' ');
                    self.open("when");
                    for pattern in &when.patterns {
                        self.child(pattern);
                    }
                    self.opt(when.body.as_deref());
                    self.close();
                }
                self.opt(else_branch.as_deref());
                self.close();
            }
            While { cond, body, until } => {
                self.open(if *until { "until" } else { "while" });
                self.child(cond);
                self.opt(body.as_deref());
                self.close();
            }
            For { target, iter, body } => {
                self.open("for");
                self.child(target);
                self.child(iter);
                self.opt(body.as_deref());
                self.close();
            }
            Break(value) | Next(value) => {
                self.open(if matches!(ast.kind, Break(_)) { "break" } else { "next" });
                if let Some(value) = value {
                    self.child(value);
                }
                self.close();
            }
            Redo => self.out.push_str("(redo)"),
            Retry => self.out.push_str("(retry)"),
            Return(args) => self.list("return", args),
            Rescue {
                body,
                handlers,
                else_branch,
            } => {
                self.open("rescue");
                self.opt(body.as_deref());
                for handler in handlers {
                    self.out.push(' ');
                    self.open("resbody");
                    match &handler.exceptions {
                        Some(exceptions) => {
                            self.out.push(' ');
                            self.list("array", exceptions);
                        }
                        None => self.atom("nil"),
                    }
                    self.opt(handler.variable.as_deref());
                    self.opt(handler.body.as_deref());
                    self.close();
                }
                self.opt(else_branch.as_deref());
                self.close();
            }
            Ensure { body, ensure } => {
                self.open("ensure");
                self.opt(body.as_deref());
                self.opt(ensure.as_deref());
                self.close();
            }
            MAsgn { targets, value } => {
                self.open("masgn");
                self.child(targets);
                self.child(value);
                self.close();
            }
            Mlhs(items) => self.list("mlhs", items),
            OpAsgn { target, op, value } => {
                self.open("op-asgn");
                self.child(target);
                self.atom(&format!(":{op}"));
                self.child(value);
                self.close();
            }
            OrAsgn { target, value } => {
                self.open("or-asgn");
                self.child(target);
                self.child(value);
                self.close();
            }
            AndAsgn { target, value } => {
                self.open("and-asgn");
                self.child(target);
                self.child(value);
                self.close();
            }
            Unsupported(kind) => {
                self.open("unsupported");
                self.atom(kind);
                self.close();
            }
        }
    }

    fn assign(&mut self, head: &str, name: &str, value: Option<&Ast>) {
        self.open(head);
        self.atom(&format!(":{name}"));
        if let Some(value) = value {
            self.child(value);
        }
        self.close();
    }

    fn params(&mut self, params: &Params) {
        self.out.push(' ');
        self.open("args");
        for param in &params.0 {
            self.out.push(' ');
            self.param(param);
        }
        self.close();
    }

    fn param(&mut self, param: &Param) {
        let optional_name = |head: &str, name: &Option<String>| match name {
            Some(name) => format!("({head} :{name})"),
            None => format!("({head})"),
        };
        match &param.kind {
            ParamKind::Arg(name) => self.named("arg", name),
            ParamKind::KwArg(name) => self.named("kwarg", name),
            ParamKind::OptArg(name, default) | ParamKind::KwOptArg(name, default) => {
                let head = if matches!(param.kind, ParamKind::OptArg(..)) {
                    "optarg"
                } else {
                    "kwoptarg"
                };
                self.open(head);
                self.atom(&format!(":{name}"));
                self.child(default);
                self.close();
            }
            ParamKind::RestArg(name) => self.out.push_str(&optional_name("restarg", name)),
            ParamKind::KwRestArg(name) => self.out.push_str(&optional_name("kwrestarg", name)),
            ParamKind::BlockArg(name) => self.out.push_str(&optional_name("blockarg", name)),
            ParamKind::Mlhs(nested) => {
                self.open("mlhs");
                for param in nested {
                    self.out.push(' ');
                    self.param(param);
                }
                self.close();
            }
            ParamKind::Forward => self.out.push_str("(forward-arg)"),
        }
    }
}
