//! Lowering integration tests using insta snapshots.
//!
//! Each test parses a Ruby snippet and snapshots the s-expression form of
//! the lowered tree, checking node shapes and local-variable resolution.

use insta::assert_snapshot;
use garnet_syntax::{debug_tree, parse};

fn lower(source: &str) -> String {
    match parse(source) {
        Ok(ast) => debug_tree(&ast, source),
        Err(err) => format!("error: {} @{}..{}", err.message, err.span.start, err.span.end),
    }
}

// ── Literals ───────────────────────────────────────────────────────────

#[test]
fn literal_int() {
    assert_snapshot!(lower("42"), @"(int 42)");
}

#[test]
fn literal_negative_int() {
    assert_snapshot!(lower("-1"), @"(int -1)");
}

#[test]
fn literal_string() {
    assert_snapshot!(lower("\"hello\""), @r#"(str "hello")"#);
}

#[test]
fn interpolated_string_keeps_expressions() {
    assert_snapshot!(lower("\"a#{b}c\""), @"(dstr (send nil :b))");
}

#[test]
fn literal_symbol() {
    assert_snapshot!(lower(":foo"), @"(sym :foo)");
}

#[test]
fn array_with_splat() {
    assert_snapshot!(lower("[1, *a]"), @"(array (int 1) (splat (send nil :a)))");
}

#[test]
fn hash_with_symbol_keys() {
    assert_snapshot!(lower("{ a: 1 }"), @"(hash (pair (sym :a) (int 1)))");
}

#[test]
fn inclusive_range() {
    assert_snapshot!(lower("1..2"), @"(irange (int 1) (int 2))");
}

#[test]
fn exclusive_range() {
    assert_snapshot!(lower("1...2"), @"(erange (int 1) (int 2))");
}

#[test]
fn nth_ref() {
    assert_snapshot!(lower("$1"), @"(nth-ref 1)");
}

#[test]
fn file_and_line_keywords() {
    assert_snapshot!(lower("[__FILE__, __LINE__]"), @"(array (__FILE__) (__LINE__))");
}

// ── Local variables ────────────────────────────────────────────────────

#[test]
fn assigned_identifier_is_lvar() {
    assert_snapshot!(lower("foo = 42\nfoo"), @"(begin (lvasgn :foo (int 42)) (lvar :foo))");
}

#[test]
fn unassigned_identifier_is_send() {
    assert_snapshot!(lower("foo"), @"(send nil :foo)");
}

#[test]
fn def_body_does_not_see_outer_locals() {
    assert_snapshot!(
        lower("x = 1\ndef foo\n  x\nend"),
        @"(begin (lvasgn :x (int 1)) (def :foo (args) (send nil :x)))"
    );
}

#[test]
fn block_locals_do_not_leak() {
    assert_snapshot!(
        lower("[1].each { |x| y = x }\ny"),
        @"(begin (block (send (array (int 1)) :each) (args (arg :x)) (lvasgn :y (lvar :x))) (send nil :y))"
    );
}

#[test]
fn block_sees_outer_locals() {
    assert_snapshot!(
        lower("y = 1\n[1].each { |x| y }"),
        @"(begin (lvasgn :y (int 1)) (block (send (array (int 1)) :each) (args (arg :x)) (lvar :y)))"
    );
}

#[test]
fn numbered_block_params_are_declared() {
    assert_snapshot!(
        lower("[[1, 2]].each { _2 + _1 }"),
        @"(block (send (array (array (int 1) (int 2))) :each) (args (arg :_1) (arg :_2)) (send (lvar :_2) :+ (lvar :_1)))"
    );
}

#[test]
fn it_is_the_block_param() {
    assert_snapshot!(
        lower("[1].map { it.succ }"),
        @"(block (send (array (int 1)) :map) (args (arg :it)) (send (lvar :it) :succ))"
    );
}

#[test]
fn outer_it_local_is_not_a_param() {
    assert_snapshot!(
        lower("it = 1\n[2].map { it }"),
        @"(begin (lvasgn :it (int 1)) (block (send (array (int 2)) :map) (args) (lvar :it)))"
    );
}

#[test]
fn nested_block_params_stay_inner() {
    assert_snapshot!(
        lower("a.each { b.map { _1 } }"),
        @"(block (send (send nil :a) :each) (args) (block (send (send nil :b) :map) (args (arg :_1)) (lvar :_1)))"
    );
}

// ── Calls ──────────────────────────────────────────────────────────────

#[test]
fn call_with_keyword_arguments() {
    assert_snapshot!(
        lower("a.b(1, c: 2)"),
        @"(send (send nil :a) :b (int 1) (kwargs (pair (sym :c) (int 2))))"
    );
}

#[test]
fn safe_navigation() {
    assert_snapshot!(lower("x&.y"), @"(csend (send nil :x) :y)");
}

#[test]
fn binary_operator_is_send() {
    assert_snapshot!(lower("1 + 2"), @"(send (int 1) :+ (int 2))");
}

#[test]
fn boolean_operators() {
    assert_snapshot!(lower("a && b"), @"(and (send nil :a) (send nil :b))");
}

#[test]
fn negation() {
    assert_snapshot!(lower("!a"), @"(not (send nil :a))");
}

#[test]
fn symbol_block_pass() {
    assert_snapshot!(lower("foo(&:bar)"), @"(send nil :foo (block-pass (sym :bar)))");
}

#[test]
fn index_assignment() {
    assert_snapshot!(lower("a[1] = 2"), @"(send (send nil :a) :[]= (int 1) (int 2))");
}

#[test]
fn attribute_assignment() {
    assert_snapshot!(lower("a.b = 2"), @"(send (send nil :a) :b= (int 2))");
}

#[test]
fn stabby_lambda() {
    assert_snapshot!(lower("->(x) { x }"), @"(lambda (args (arg :x)) (lvar :x))");
}

#[test]
fn lambda_keyword_form() {
    assert_snapshot!(lower("lambda { |x| x }"), @"(lambda (args (arg :x)) (lvar :x))");
}

#[test]
fn argument_forwarding() {
    assert_snapshot!(
        lower("def b(...)\n  a(1, ...)\nend"),
        @"(def :b (args (forward-arg)) (send nil :a (int 1) (splat (lvar :*)) (kwargs (kwsplat (lvar :**))) (block-pass (lvar :&))))"
    );
}

#[test]
fn super_forms() {
    assert_snapshot!(
        lower("def foo\n  super\n  super(1)\nend"),
        @"(def :foo (args) (begin (zsuper) (super (int 1))))"
    );
}

#[test]
fn yield_with_argument() {
    assert_snapshot!(lower("def foo\n  yield 1\nend"), @"(def :foo (args) (yield (int 1)))");
}

// ── Definitions ────────────────────────────────────────────────────────

#[test]
fn def_with_every_parameter_kind() {
    assert_snapshot!(
        lower("def foo(a, b = 1, *c, d:, e: 2, **f, &g)\n  a\nend"),
        @"(def :foo (args (arg :a) (optarg :b (int 1)) (restarg :c) (kwarg :d) (kwoptarg :e (int 2)) (kwrestarg :f) (blockarg :g)) (lvar :a))"
    );
}

#[test]
fn singleton_def() {
    assert_snapshot!(lower("def self.foo\nend"), @"(defs (self) :foo (args) nil)");
}

#[test]
fn class_with_superclass() {
    assert_snapshot!(
        lower("class Foo < Bar\n  def bar; end\nend"),
        @"(class Foo (const Bar) (def :bar (args) nil))"
    );
}

#[test]
fn nested_module_path() {
    assert_snapshot!(lower("module A::B\nend"), @"(module A::B nil)");
}

#[test]
fn absolute_constant() {
    assert_snapshot!(lower("::Foo::Bar"), @"(const ::Foo::Bar)");
}

#[test]
fn constant_assignment() {
    assert_snapshot!(lower("Foo = 1"), @"(casgn Foo (int 1))");
}

// ── Control flow ───────────────────────────────────────────────────────

#[test]
fn unless_swaps_branches() {
    assert_snapshot!(lower("unless x\n  1\nend"), @"(if (send nil :x) nil (int 1))");
}

#[test]
fn modifier_if() {
    assert_snapshot!(lower("a = 1 if b"), @"(if (send nil :b) (lvasgn :a (int 1)) nil)");
}

#[test]
fn ternary() {
    assert_snapshot!(lower("a ? 1 : 2"), @"(if (send nil :a) (int 1) (int 2))");
}

#[test]
fn case_when_else() {
    assert_snapshot!(
        lower("case x\nwhen 1, 2 then :a\nelse :b\nend"),
        @"(case (send nil :x) (when (int 1) (int 2) (sym :a)) (sym :b))"
    );
}

#[test]
fn while_loop() {
    assert_snapshot!(lower("while a\n  b\nend"), @"(while (send nil :a) (send nil :b))");
}

#[test]
fn begin_rescue() {
    assert_snapshot!(
        lower("begin\n  42\nrescue\n  \"foo\"\nend"),
        @r#"(kwbegin (rescue (int 42) (resbody nil nil (str "foo")) nil))"#
    );
}

#[test]
fn rescue_with_classes_and_binding() {
    assert_snapshot!(
        lower("begin\n  1\nrescue ArgumentError => e\n  e\nend"),
        @"(kwbegin (rescue (int 1) (resbody (array (const ArgumentError)) (lvasgn :e) (lvar :e)) nil))"
    );
}

#[test]
fn begin_ensure() {
    assert_snapshot!(
        lower("begin\n  1\nensure\n  2\nend"),
        @"(kwbegin (ensure (int 1) (int 2)))"
    );
}

// ── Assignment forms ───────────────────────────────────────────────────

#[test]
fn multiple_assignment() {
    assert_snapshot!(
        lower("a, b = 1, 2"),
        @"(masgn (mlhs (lvasgn :a) (lvasgn :b)) (array (int 1) (int 2)))"
    );
}

#[test]
fn multiple_assignment_with_splat_target() {
    assert_snapshot!(
        lower("a, *b = c"),
        @"(masgn (mlhs (lvasgn :a) (splat (lvasgn :b))) (send nil :c))"
    );
}

#[test]
fn or_assignment_declares_local() {
    assert_snapshot!(lower("x ||= 1\nx"), @"(begin (or-asgn (lvasgn :x) (int 1)) (lvar :x))");
}

#[test]
fn operator_assignment_on_attribute() {
    assert_snapshot!(
        lower("foo.bar += 1"),
        @"(op-asgn (send (send nil :foo) :bar) :+ (int 1))"
    );
}

// ── Unsupported and invalid input ──────────────────────────────────────

#[test]
fn pattern_matching_is_unsupported() {
    let ast = parse("case x\nin 1 then 2\nend").unwrap();
    let (kind, span) = ast.first_unsupported().unwrap();
    assert_eq!(kind, "case_match");
    assert_eq!(span.start, 0);
}

#[test]
fn supported_tree_has_no_unsupported_node() {
    let ast = parse("class Foo\n  def bar(x)\n    x\n  end\nend\nFoo.new.bar(42)").unwrap();
    assert!(ast.first_unsupported().is_none());
}

#[test]
fn unterminated_def_is_a_parse_error() {
    assert!(parse("def foo(\n").is_err());
}

#[test]
fn deep_nesting_is_a_parse_error() {
    let source = format!("{}1{}", "[".repeat(1000), "]".repeat(1000));
    assert_snapshot!(lower(&source), @"error: expression nested more than 128 levels deep @128..1873");
}
