//! End-to-end tests for project indexing and position queries.
//!
//! Projects are built either from in-memory sources or from a temporary
//! directory, then queried the way the CLI queries them.

use std::fs;
use std::path::Path;

use garnet_analysis::diagnostics::warning_json;
use garnet_analysis::{
    completions_at_position, definitions_at_position, type_at_position, Config, IndexError, Project,
};
use garnet_common::{FileId, Position};

// ── Helpers ────────────────────────────────────────────────────────────

/// Index in-memory `(path, source)` pairs with the default configuration.
fn project(sources: &[(&str, &str)]) -> Project {
    Project::from_sources(sources.iter().copied(), &Config::default())
}

/// Position of the `nth` occurrence (0-based) of `needle` in `source`,
/// shifted right by `offset` characters.
fn position_of(source: &str, needle: &str, nth: usize, offset: u32) -> Position {
    let start = source
        .match_indices(needle)
        .nth(nth)
        .unwrap_or_else(|| panic!("`{needle}` occurs fewer than {} times", nth + 1))
        .0;
    let before = &source[..start];
    let line = before.matches('\n').count() as u32;
    let column = (start - before.rfind('\n').map_or(0, |i| i + 1)) as u32;
    Position::new(line, column + offset)
}

/// Displayed type at `position`, "unknown" when no node covers it.
fn type_at(project: &Project, file: &str, position: Position) -> String {
    type_at_position(project, &FileId::new(file), position)
        .map(|ty| ty.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Definition locations at `position` rendered as `file:range`.
fn definitions_at(project: &Project, file: &str, position: Position) -> Vec<String> {
    definitions_at_position(project, &FileId::new(file), position)
        .into_iter()
        .map(|l| l.to_string())
        .collect()
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

// ── Type queries ───────────────────────────────────────────────────────

/// A local read after its assignment has the assigned type.
#[test]
fn type_of_local_read() {
    let src = "foo = 42\nfoo";
    let p = project(&[("main.rb", src)]);
    assert_eq!(type_at(&p, "main.rb", Position::new(1, 1)), "Integer");
}

/// Nothing located at the position gives "unknown".
#[test]
fn type_outside_any_node_is_unknown() {
    let p = project(&[("main.rb", "1\n")]);
    assert_eq!(type_at(&p, "main.rb", Position::new(5, 0)), "unknown");
    assert_eq!(type_at(&p, "other.rb", Position::new(0, 0)), "unknown");
}

/// Calls resolve against methods defined in another file.
#[test]
fn calls_resolve_across_files() {
    let lib = "class Dog\n  def name\n    \"Rex\"\n  end\nend\n";
    let main = "dog = Dog.new\ndog.name\n";
    let p = project(&[("lib/dog.rb", lib), ("main.rb", main)]);
    assert!(p.warnings().is_empty());
    assert_eq!(type_at(&p, "main.rb", position_of(main, "name", 0, 1)), "String");
    assert_eq!(type_at(&p, "main.rb", position_of(main, "dog", 1, 0)), "Dog");
}

/// Parameters collect every call site, in every file.
#[test]
fn parameter_types_are_shared_between_callers() {
    let lib = "class Foo\n  def bar(x)\n    x\n  end\nend\n";
    let a = "Foo.new.bar(42)\n";
    let b = "Foo.new.bar(\"s\")\n";
    let p = project(&[("a.rb", a), ("b.rb", b), ("foo.rb", lib)]);
    assert_eq!(type_at(&p, "a.rb", position_of(a, "bar", 0, 0)), "Integer | String");
    assert_eq!(type_at(&p, "b.rb", position_of(b, "bar", 0, 0)), "Integer | String");
}

// ── Definition queries ─────────────────────────────────────────────────

/// A constant reference points at the class name token.
#[test]
fn definition_of_constant_is_name_token() {
    let src = "class Foo\nend\nFoo.new\n";
    let p = project(&[("main.rb", src)]);
    assert_eq!(
        definitions_at(&p, "main.rb", position_of(src, "Foo", 1, 1)),
        vec!["main.rb:0:6-0:9"]
    );
}

/// A reopened class has one declaration per body.
#[test]
fn definition_of_reopened_class_lists_each_body() {
    let a = "class Foo\nend\n";
    let b = "class Foo\n  def x; end\nend\nFoo\n";
    let p = project(&[("a.rb", a), ("b.rb", b)]);
    assert_eq!(
        definitions_at(&p, "b.rb", Position::new(3, 0)),
        vec!["a.rb:0:6-0:9", "b.rb:0:6-0:9"]
    );
}

/// A call selector points at the method the receiver type reaches.
#[test]
fn definition_of_method_call() {
    let src = "class Foo\n  def bar\n    1\n  end\nend\nFoo.new.bar\n";
    let p = project(&[("main.rb", src)]);
    assert_eq!(
        definitions_at(&p, "main.rb", position_of(src, "bar", 1, 1)),
        vec!["main.rb:1:2-3:5"]
    );
}

/// An unresolved receiver still finds methods by name.
#[test]
fn definition_of_call_on_unknown_receiver_falls_back_to_name() {
    let src = "class Foo\n  def bar\n  end\nend\nthing.bar\n";
    let p = project(&[("main.rb", src)]);
    assert_eq!(
        definitions_at(&p, "main.rb", position_of(src, "bar", 1, 0)),
        vec!["main.rb:1:2-2:5"]
    );
}

/// `super` points at the parent's method of the same name.
#[test]
fn definition_of_super() {
    let src = "\
class A
  def m
  end
end

class B < A
  def m
    super
  end
end
";
    let p = project(&[("main.rb", src)]);
    assert_eq!(
        definitions_at(&p, "main.rb", position_of(src, "super", 0, 2)),
        vec!["main.rb:1:2-2:5"]
    );
}

/// A `super` inside a block belongs to the method around the block; with
/// no parent method it falls back to same-named methods elsewhere.
#[test]
fn definition_of_super_in_block_falls_back_to_name() {
    let src = "\
class A
  def m
  end
end

class C
  def m
    [1].each { super }
  end
end
";
    let p = project(&[("main.rb", src)]);
    assert_eq!(
        definitions_at(&p, "main.rb", position_of(src, "super", 0, 1)),
        vec!["main.rb:1:2-2:5"]
    );
}

/// Builtins have no source and are never returned.
#[test]
fn definition_of_builtin_is_empty() {
    let src = "1.succ\n";
    let p = project(&[("main.rb", src)]);
    assert!(definitions_at(&p, "main.rb", position_of(src, "succ", 0, 0)).is_empty());
}

// ── Completions ────────────────────────────────────────────────────────

/// Method names with the typed prefix, sorted.
#[test]
fn completions_filter_by_prefix() {
    let src = "\
class Foo
  def bark; end
  def bar; end
  def baz; end
  def quux; end
end
Foo.new.ba";
    let p = project(&[("main.rb", src)]);
    let end_of_prefix = position_of(src, "Foo.new.ba", 0, 10);
    assert_eq!(
        completions_at_position(&p, &FileId::new("main.rb"), end_of_prefix),
        vec!["bar", "bark", "baz"]
    );
}

/// Completions include inherited methods but no builtin Object methods.
#[test]
fn completions_walk_parents_below_object() {
    let src = "\
class A
  def to_thing; end
end

class B < A
  def tone; end
end
B.new.to";
    let p = project(&[("main.rb", src)]);
    let end = position_of(src, "B.new.to", 0, 8);
    assert_eq!(
        completions_at_position(&p, &FileId::new("main.rb"), end),
        vec!["to_thing", "tone"]
    );
}

/// Class receivers complete singleton methods.
#[test]
fn completions_on_class_receiver() {
    let src = "\
class Foo
  def self.build; end
  def bump; end
end
Foo.bu";
    let p = project(&[("main.rb", src)]);
    let end = position_of(src, "Foo.bu", 0, 6);
    assert_eq!(completions_at_position(&p, &FileId::new("main.rb"), end), vec!["build"]);
}

// ── Skipped files ──────────────────────────────────────────────────────

/// A file that fails to parse is skipped; the rest is still analyzed.
#[test]
fn parse_failure_skips_only_that_file() {
    let p = project(&[("bad.rb", "def broken(\n"), ("good.rb", "class Ok\nend\n")]);
    assert_eq!(p.warnings().len(), 1);
    assert_eq!(p.warnings()[0].path, Path::new("bad.rb"));
    assert!(matches!(p.warnings()[0].error, IndexError::Parse(_)));
    assert!(p.analysis().tree().find_constant_by_name("Ok").is_some());
    assert_eq!(p.files().len(), 1);
}

/// An unsupported construct rolls back everything its file registered.
#[test]
fn build_failure_leaves_no_definitions() {
    let bad = "class Half\n  def m; end\nend\ncase 1\nin Integer\n  2\nend\n";
    let p = project(&[("bad.rb", bad), ("main.rb", "Half\n")]);
    assert_eq!(p.warnings().len(), 1);
    assert!(matches!(p.warnings()[0].error, IndexError::Build(_)));
    assert!(p.analysis().tree().find_constant_by_name("Half").is_none());
    assert_eq!(type_at(&p, "main.rb", Position::new(0, 0)), "Class(Half)");
    assert!(definitions_at(&p, "main.rb", Position::new(0, 0)).is_empty());
}

/// Skipped-file warnings in machine-readable form.
#[test]
fn skipped_file_warning_json() {
    let p = project(&[("bad.rb", "case 1\nin Integer\n  2\nend\n")]);
    let json = warning_json(&p.warnings()[0]);
    insta::assert_json_snapshot!(json);
}

// ── Directory indexing ─────────────────────────────────────────────────

/// Indexing a directory honors garnet.toml and skips hidden directories.
#[test]
fn index_directory_with_config() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "garnet.toml", "[index]\nexclude = [\"spec\"]\n");
    write(tmp.path(), "lib/app.rb", "class App\n  def run\n    :ok\n  end\nend\n");
    write(tmp.path(), "main.rb", "App.new.run\n");
    write(tmp.path(), "spec/app_spec.rb", "class Spec\nend\n");
    write(tmp.path(), ".bundle/ignored.rb", "class Hidden\nend\n");

    let config = Config::load(tmp.path()).unwrap();
    let p = Project::index(tmp.path(), &config).unwrap();
    let paths: Vec<_> = p.files().iter().map(|f| f.id.to_string()).collect();
    assert_eq!(paths, vec!["lib/app.rb", "main.rb"]);
    assert!(p.analysis().tree().find_constant_by_name("Spec").is_none());
    assert_eq!(type_at(&p, "main.rb", Position::new(0, 9)), "Symbol");
    assert!(p.file_by_path(&tmp.path().join("main.rb")).is_some());
}

/// A missing project directory is the only fatal index error.
#[test]
fn index_missing_directory_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let err = Project::index(&tmp.path().join("missing"), &Config::default()).unwrap_err();
    assert!(matches!(err, IndexError::Io { .. }));
}
