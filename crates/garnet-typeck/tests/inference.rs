//! Integration tests for the garnet type inference engine.
//!
//! These tests parse Ruby source, build and solve it through
//! `garnet_typeck::check()`, and assert on the type of the program's last
//! expression or of individual methods and formals looked up in the
//! symbol table.

use garnet_common::{FileId, Span};
use garnet_syntax::{Ast, AstKind};
use garnet_typeck::builder::MAX_DEPTH;
use garnet_typeck::error::BuildError;
use garnet_typeck::solver::DEFAULT_MAX_ROUNDS;
use garnet_typeck::{check, Analysis, CheckError, TypeckResult};

// ── Helpers ────────────────────────────────────────────────────────────

/// Parse, build and solve `src`, failing the test on any error.
fn check_source(src: &str) -> TypeckResult {
    match check(src) {
        Ok(result) => result,
        Err(err) => panic!("analysis failed: {err:?}\nsource:\n{src}"),
    }
}

/// Assert the displayed type of the last expression.
fn assert_result(src: &str, expected: &str) {
    let result = check_source(src);
    assert_eq!(
        result.result_type().to_string(),
        expected,
        "wrong type for the last expression of:\n{src}"
    );
}

/// Displayed result type of the instance method `class_name#name`.
fn method_result(result: &TypeckResult, class_name: &str, name: &str) -> String {
    let tree = result.analysis.tree();
    let method = tree
        .find_instance_method(class_name, name)
        .unwrap_or_else(|| panic!("no method {class_name}#{name}"));
    result.type_of(tree.method(method).result).to_string()
}

/// Displayed type of the `index`-th positional formal of `class_name#name`.
fn formal_type(result: &TypeckResult, class_name: &str, name: &str, index: usize) -> String {
    let tree = result.analysis.tree();
    let method = tree
        .find_instance_method(class_name, name)
        .unwrap_or_else(|| panic!("no method {class_name}#{name}"));
    result.type_of(tree.method(method).args.args[index].node).to_string()
}

/// One line per user-defined method: owner, formals and result type.
fn signatures(result: &TypeckResult) -> String {
    let tree = result.analysis.tree();
    let mut out = String::new();
    for method in tree.methods().iter().filter(|m| m.location.is_some()) {
        let owner = tree.definition(method.owner);
        let separator = if owner.eigenclass_of.is_some() { "." } else { "#" };
        let formals: Vec<String> = method
            .args
            .args
            .iter()
            .map(|arg| {
                let name = arg.name.as_deref().unwrap_or("_");
                format!("{name}: {}", result.type_of(arg.node))
            })
            .collect();
        out.push_str(&format!(
            "{}{separator}{}({}) -> {}\n",
            owner.name,
            method.name,
            formals.join(", "),
            result.type_of(method.result)
        ));
    }
    out
}

// ── Literals ───────────────────────────────────────────────────────────

/// Each literal kind has its core class.
#[test]
fn scalar_literals() {
    assert_result("1", "Integer");
    assert_result("1.5", "Float");
    assert_result("3r", "Rational");
    assert_result("2i", "Complex");
    assert_result("\"hi\"", "String");
    assert_result("\"a#{1}b\"", "String");
    assert_result(":sym", "Symbol");
    assert_result("nil", "Nil");
    assert_result("true", "Boolean");
    assert_result("/ab+/", "Regexp");
}

/// Array, hash and range literals carry their element types.
#[test]
fn container_literals() {
    assert_result("[]", "Array<bottom>");
    assert_result("[1, \"a\", 2]", "Array<Integer | String>");
    assert_result("{ a: 1 }", "Hash<Symbol, Integer>");
    assert_result("{}", "Hash<bottom, bottom>");
    assert_result("1..5", "Range<Integer>");
}

/// A splatted array contributes its elements.
#[test]
fn splat_inside_array_literal() {
    assert_result("a = [1]\n[*a, \"b\"]", "Array<Integer | String>");
}

/// `new` on a generic core class gives the bare class.
#[test]
fn builtin_constructor_yields_bare_generic() {
    assert_result("Array.new", "Array");
    assert_result("Hash.new", "Hash");
}

/// `__FILE__` is a path string and `__LINE__` a line number.
#[test]
fn file_and_line_keywords() {
    assert_result("__FILE__", "String");
    assert_result("__LINE__", "Integer");
    assert_result("def line\n  __LINE__\nend\nline", "Integer");
}

/// `__method__` names the enclosing method, and is nil outside one.
#[test]
fn current_method_name() {
    assert_result("def name_of\n  __method__\nend\nname_of", "Symbol");
    assert_result("__method__", "Nil");
}

// ── Variables ──────────────────────────────────────────────────────────

/// A local read sees the value last assigned.
#[test]
fn local_variable_flows_from_assignment() {
    assert_result("x = 1\nx", "Integer");
}

/// Assigning again shadows the earlier value.
#[test]
fn reassignment_replaces_binding() {
    assert_result("x = 1\nx = \"s\"\nx", "String");
}

/// After an `if`, a local holds the values of every branch.
#[test]
fn branches_merge_local_bindings() {
    let src = "\
x = 1
if gets
  x = \"a\"
end
x";
    assert_result(src, "Integer | String");
}

/// A global written in a method is visible at top level.
#[test]
fn global_variables_are_program_wide() {
    let src = "\
def set
  $g = :s
end
$g";
    assert_result(src, "Symbol");
}

/// Constants are found through the lexical nesting.
#[test]
fn constants_resolve_lexically() {
    assert_result("X = 1\nX", "Integer");
    let src = "\
module M
  X = \"a\"
  def self.get
    X
  end
end
M.get";
    assert_result(src, "String");
}

// ── Self and classes ───────────────────────────────────────────────────

/// Top-level `self` is the main object.
#[test]
fn self_at_top_level_is_main() {
    assert_result("self", "main");
}

/// A class name evaluates to its class object.
#[test]
fn class_constant_is_class_object() {
    let src = "class Foo\nend\nFoo";
    assert_result(src, "Class(Foo)");
}

/// `.class` maps an instance to its class object.
#[test]
fn dot_class_extracts_class() {
    assert_result("1.class", "Class(Integer)");
    assert_result("class Foo\nend\nFoo.new.class", "Class(Foo)");
    assert_result("class Foo\nend\nFoo.class", "Class(Class)");
}

/// `self` in an instance method is an instance.
#[test]
fn self_in_instance_method_is_instance() {
    let src = "\
class Foo
  def me
    self
  end
end
Foo.new.me";
    assert_result(src, "Foo");
}

/// Instance variables are shared by the methods of a class.
#[test]
fn instance_variables_shared_across_methods() {
    let src = "\
class Foo
  def set
    @x = 1
  end

  def get
    @x
  end
end
Foo.new.get";
    assert_result(src, "Integer");
}

/// `attr_accessor` defines a reader that sees writes.
/// An `@x` of the class object is kept apart from the `@x` of its
/// instances.
#[test]
fn class_level_ivar_is_separate_from_instance_ivar() {
    let src = "\
class Foo
  @x = :class_level

  def self.get
    @x
  end

  def set
    @x = 1
  end

  def get
    @x
  end
end
Foo.get";
    let result = check_source(src);
    insta::assert_snapshot!(signatures(&result), @r"
    Foo.get() -> Symbol
    Foo#set() -> Integer
    Foo#get() -> Integer
    ");
}

#[test]
fn attr_accessor_defines_reader_and_writer() {
    let src = "\
class Person
  attr_accessor :name
end
person = Person.new
person.name = \"Ann\"
person.name";
    assert_result(src, "String");
}

// ── Calls ──────────────────────────────────────────────────────────────

/// A top-level method is callable without a receiver.
#[test]
fn top_level_method_call() {
    assert_result("def foo\n  1\nend\nfoo", "Integer");
}

/// A call on an instance runs the class's method.
#[test]
fn instance_method_call() {
    let src = "\
class Foo
  def bar
    \"s\"
  end
end
Foo.new.bar";
    assert_result(src, "String");
}

/// A formal unions the arguments of every call site.
#[test]
fn formal_collects_every_caller() {
    let src = "\
class Foo
  def id(x)
    x
  end
end
Foo.new.id(1)
Foo.new.id(\"a\")";
    let result = check_source(src);
    assert_eq!(result.result_type().to_string(), "Integer | String");
    assert_eq!(formal_type(&result, "Foo", "id", 0), "Integer | String");
}

/// A bare `new` in a singleton method builds an instance.
#[test]
fn class_method_calls_new_on_self() {
    let src = "\
class Foo
  def self.make
    new
  end
end
Foo.make";
    assert_result(src, "Foo");
}

/// Methods are found on superclasses.
#[test]
fn inherited_method() {
    let src = "\
class A
  def hi
    1
  end
end

class B < A
end
B.new.hi";
    assert_result(src, "Integer");
}

/// `new` passes its arguments to `initialize`.
#[test]
fn initialize_receives_new_arguments() {
    let src = "\
class Point
  def initialize(x)
    @x = x
  end

  def x
    @x
  end
end
Point.new(1.5).x";
    assert_result(src, "Float");
}

/// A call with no target has no type.
#[test]
fn unknown_method_is_bottom() {
    assert_result("1.nope", "bottom");
}

/// A rest formal is an array of the extra actuals.
#[test]
fn rest_formal_is_array_of_actuals() {
    let src = "\
def f(*xs)
  xs
end
f(1, \"a\")";
    assert_result(src, "Array<Integer | String>");
}

/// Formals after a rest formal take the last actuals.
#[test]
fn formals_after_rest_match_from_the_end() {
    let src = "\
def f(a, *rest, z)
  z
end
f(1, :b, :c, \"z\")";
    let result = check_source(src);
    assert_eq!(result.result_type().to_string(), "String");
    assert_eq!(formal_type(&result, "Object", "f", 0), "Integer");
    assert_eq!(formal_type(&result, "Object", "f", 1), "Array<Symbol>");
}

/// A splatted actual feeds every formal from its position on.
#[test]
fn splat_actual_feeds_remaining_formals() {
    let src = "\
def f(a, b)
  b
end
f(*[1, 2])";
    assert_result(src, "Integer");
}

/// Keyword actuals reach keyword formals by name.
#[test]
fn keyword_arguments() {
    let src = "\
def f(a:, b: nil)
  a
end
f(a: 1)";
    assert_result(src, "Integer");
}

/// With no keyword formals, keywords arrive as a positional hash.
#[test]
fn keywords_are_positional_without_keyword_formals() {
    let src = "\
def f(opts)
  opts
end
f(a: 1)";
    assert_result(src, "Hash<Symbol, Integer>");
}

/// `...` passes positional arguments, keywords and the block through.
#[test]
fn argument_forwarding() {
    let positional = "\
def target(x)
  x
end

def forward(...)
  target(...)
end
forward(1)";
    assert_result(positional, "Integer");

    let keywords = "\
def target(k:)
  k
end

def forward(...)
  target(...)
end
forward(k: \"s\")";
    assert_result(keywords, "String");

    let block = "\
def target
  yield 1
end

def forward(...)
  target(...)
end
forward { |x| x.to_s }";
    assert_result(block, "String");
}

/// Core methods have fixed result types.
#[test]
fn builtin_method_results() {
    assert_result("1.succ", "Integer");
    assert_result("\"a\".upcase", "String");
    assert_result("\"a b\".split", "Array<String>");
    assert_result("puts 1", "Nil");
}

// ── Blocks ─────────────────────────────────────────────────────────────

/// `yield` passes values to the block and returns its value.
#[test]
fn yield_feeds_block_and_returns_its_value() {
    let src = "\
def each
  yield 1
end
each { |x| x }";
    assert_result(src, "Integer");
}

/// `map` returns an array of block results.
#[test]
fn array_map_collects_block_results() {
    assert_result("[1, 2].map { |x| x.to_s }", "Array<String>");
}

/// A symbol block calls that method on each element.
#[test]
fn symbol_block_calls_method_on_element() {
    assert_result("[1, 2].map(&:to_s)", "Array<String>");
}

/// `each` returns its receiver.
#[test]
fn array_each_returns_receiver() {
    assert_result("[1, 2].each { |x| x }", "Array<Integer>");
}

/// A block with no parameter list binds `_1` or `it` when its body reads
/// them.
#[test]
fn implicit_block_params() {
    assert_result("[1].map { _1 }", "Array<Integer>");
    assert_result("[1].map { it.to_s }", "Array<String>");
    assert_result("[1].map { 2 }", "Array<Integer>");
}

/// Element accessors return the element types.
#[test]
fn element_intrinsics() {
    assert_result("[1, 2].first", "Integer");
    assert_result("{ a: 1 }[:a]", "Integer");
    assert_result("{ a: 1 }.keys", "Array<Symbol>");
    assert_result("{ a: 1 }.values", "Array<Integer>");
    assert_result("(1..3).to_a", "Array<Integer>");
}

/// `Hash#each` yields keys and values to a two-parameter block.
#[test]
fn hash_each_yields_keys_and_values() {
    let src = "\
def key_of(k)
  k
end
{ a: 1 }.each { |k, v| key_of(k) }";
    let result = check_source(src);
    assert_eq!(result.result_type().to_string(), "Hash<Symbol, Integer>");
    assert_eq!(formal_type(&result, "Object", "key_of", 0), "Symbol");
}

/// Calling a lambda runs its body.
#[test]
fn lambda_call() {
    assert_result("l = lambda { |x| x }\nl.call(1)", "Integer");
    assert_result("l = ->(x) { x }\nl[\"a\"]", "String");
}

/// `&lambda` passes the lambda as the block.
#[test]
fn block_pass_of_lambda() {
    let src = "\
def run
  yield 2
end
l = lambda { |x| x }
run(&l)";
    assert_result(src, "Integer");
}

/// `&` of a non-proc passes no block.
#[test]
fn block_pass_of_non_proc_is_bottom() {
    let src = "\
def run
  yield 2
end
run(&78)";
    assert_result(src, "bottom");
}

/// `&:name` yields to that method.
#[test]
fn block_pass_of_symbol() {
    let src = "\
def run
  yield 2
end
run(&:succ)";
    assert_result(src, "Integer");
}

/// A `&blk` formal holds the caller's block.
#[test]
fn block_formal_holds_the_block() {
    let src = "\
def run(&blk)
  blk.call(1)
end
run { |x| x.to_s }";
    assert_result(src, "String");
}

// ── super ──────────────────────────────────────────────────────────────

/// Bare `super` passes the method's own formals on.
#[test]
fn zsuper_forwards_formals() {
    let src = "\
class A
  def m(x)
    x
  end
end

class B < A
  def m(x)
    super
  end
end
B.new.m(1)";
    let result = check_source(src);
    assert_eq!(result.result_type().to_string(), "Integer");
    assert_eq!(formal_type(&result, "A", "m", 0), "Integer");
}

/// `super(...)` passes only the given arguments.
#[test]
fn super_with_explicit_arguments() {
    let src = "\
class A
  def m(x)
    x
  end
end

class B < A
  def m(x)
    super(x.to_s)
  end
end
B.new.m(1)";
    let result = check_source(src);
    assert_eq!(result.result_type().to_string(), "String");
    assert_eq!(method_result(&result, "A", "m"), "String");
}

/// `super` passes the caller's block along.
#[test]
fn super_forwards_caller_block() {
    let src = "\
class A
  def m
    yield 1
  end
end

class B < A
  def m
    super
  end
end
B.new.m { |x| x.to_s }";
    assert_result(src, "String");
}

// ── Control flow ───────────────────────────────────────────────────────

/// An `if` is the union of its branches, `nil` when one is missing.
#[test]
fn if_unions_branches() {
    assert_result("if gets\n  1\nelse\n  \"a\"\nend", "Integer | String");
    assert_result("if gets\n  1\nend", "Integer | Nil");
}

/// A `case` is the union of its clauses.
#[test]
fn case_unions_whens_and_else() {
    let src = "\
case gets
when \"a\" then 1
when \"b\" then :b
else nil
end";
    assert_result(src, "Integer | Nil | Symbol");
}

/// Boolean operators may yield a boolean.
#[test]
fn and_or_include_boolean() {
    assert_result("1 && 2", "Boolean | Integer");
    assert_result("!1", "Boolean");
}

/// An early `return` adds to the method result.
#[test]
fn return_feeds_method_result() {
    let src = "\
def f
  return 1 if gets
  \"a\"
end
f";
    assert_result(src, "Integer | String");
}

/// A rescued body may end in either the body or a handler.
#[test]
fn rescue_unions_body_and_handlers() {
    assert_result("begin\n  1\nrescue\n  \"a\"\nend", "Integer | String");
}

/// With an `else` clause the body value is replaced.
#[test]
fn rescue_else_replaces_body_value() {
    assert_result("begin\n  1\nrescue\n  \"a\"\nelse\n  :b\nend", "String | Symbol");
}

/// The `ensure` clause does not change the value.
#[test]
fn ensure_body_does_not_contribute() {
    assert_result("begin\n  1\nensure\n  \"a\"\nend", "Integer");
}

/// A rescue binding holds an instance of the rescued class.
#[test]
fn rescued_variable_is_exception_instance() {
    assert_result("begin\n  1\nrescue ArgumentError => e\n  e\nend", "ArgumentError | Integer");
    assert_result("begin\n  1\nrescue => e\n  e\nend", "Integer | StandardError");
}

/// Multiple assignment takes the array element types.
#[test]
fn multiple_assignment_destructures_arrays() {
    assert_result("a, b = [1, \"x\"]\nb", "Integer | String");
}

/// `||=` unions the old and new values.
#[test]
fn or_assignment() {
    assert_result("x = nil\nx ||= 1\nx", "Boolean | Integer | Nil");
}

// ── Solver ─────────────────────────────────────────────────────────────

/// Solving again changes nothing.
#[test]
fn solving_twice_gives_identical_types() {
    let src = "\
class Foo
  def bar(x)
    [x].map { |y| y.to_s }
  end
end
Foo.new.bar(1)
Foo.new.bar(:a)";
    let mut result = check_source(src);
    let again = result.analysis.solve(DEFAULT_MAX_ROUNDS);
    assert_eq!(again.types(), result.typing.types());
    assert_eq!(result.result_type().to_string(), "Array<String>");
}

/// A round budget stops the solver before its fixpoint.
#[test]
fn round_budget_stops_early() {
    let src = "def f\n  1\nend\nf";
    let mut result = check_source(src);
    let bounded = result.analysis.solve(1);
    assert_eq!(bounded.rounds(), 1);
    assert!(result.typing.rounds() >= 2);
}

// ── Symbol table ───────────────────────────────────────────────────────

/// Formals and results of every user method after solving.
#[test]
fn method_signatures_after_solving() {
    let src = "\
class Greeter
  def greet(name, punctuation = \"!\")
    name
  end

  def self.build
    new
  end
end
Greeter.build.greet(:bob)";
    let result = check_source(src);
    insta::assert_snapshot!(signatures(&result), @r"
    Greeter#greet(name: Symbol, punctuation: String) -> Symbol
    Greeter.build() -> Greeter
    ");
}

// ── Failures ───────────────────────────────────────────────────────────

/// Invalid syntax is a parse error.
#[test]
fn syntax_error_is_a_parse_failure() {
    assert!(matches!(check("def foo("), Err(CheckError::Parse(_))));
}

/// A construct with no rule is a build error.
#[test]
fn unsupported_construct_is_a_build_failure() {
    let err = check("case 1\nin Integer\n  2\nend").unwrap_err();
    match err {
        CheckError::Build(BuildError::Unsupported { kind, .. }) => assert_eq!(kind, "case_match"),
        other => panic!("expected an unsupported construct, got {other:?}"),
    }
}

/// A very long operator chain is rejected by the parser.
#[test]
fn long_operator_chain_is_a_parse_failure() {
    let src = vec!["1"; 3000].join(" + ");
    match check(&src) {
        Err(CheckError::Parse(err)) => assert!(err.message.contains("nested"), "{}", err.message),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

/// A hand-built tree deeper than the builder follows fails that file only.
#[test]
fn deeply_nested_tree_is_a_build_failure() {
    let mut ast = Ast::new(AstKind::Int, Span::new(0, 1));
    for _ in 0..MAX_DEPTH + 10 {
        ast = Ast::new(AstKind::Array(vec![ast]), Span::new(0, 1));
    }
    let mut analysis = Analysis::new();
    let nodes = analysis.graph().len();
    match analysis.add_file(FileId::new("deep.rb"), "1", &ast) {
        Err(BuildError::Unsupported { kind, .. }) => assert_eq!(kind, "deeply nested expression"),
        other => panic!("expected an unsupported construct, got {other:?}"),
    }
    assert_eq!(analysis.graph().len(), nodes);
}
