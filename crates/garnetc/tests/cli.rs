//! End-to-end tests for the garnetc subcommands.
//!
//! Each test writes a small Ruby project into a temporary directory and
//! runs the built binary against it:
//! - `garnetc index` summarizes the project and reports skipped files
//! - `garnetc type`, `definition` and `complete` answer position queries
//! - `garnetc methods` lists the project's own methods
//! - failures exit with status 1

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

// ── Helpers ────────────────────────────────────────────────────────────

/// Locate the garnetc binary built by cargo.
fn garnetc_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_garnetc"))
}

/// Write `files` into a fresh temporary directory.
fn project(files: &[(&str, &str)]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    for (relative, content) in files {
        let path = dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
    dir
}

/// Run garnetc in `cwd` with logging silenced.
fn run(cwd: &Path, args: &[&str]) -> Output {
    Command::new(garnetc_bin())
        .current_dir(cwd)
        .env("GARNET_LOG", "off")
        .args(args)
        .output()
        .expect("failed to run garnetc")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ── index ──────────────────────────────────────────────────────────────

/// A skipped file is reported but does not fail the run.
#[test]
fn index_reports_skipped_files() {
    let dir = project(&[
        ("bad.rb", "case 1\nin Integer\n  2\nend\n"),
        ("main.rb", "1 + 2\n"),
    ]);
    let output = run(dir.path(), &["index", "--no-color", "."]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "Indexed 1 files (1 skipped)\n");
    let err = stderr(&output);
    assert!(err.contains("B0001"), "stderr: {err}");
    assert!(err.contains("skipped bad.rb"), "stderr: {err}");
}

/// `--json` prints one summary object on stdout.
#[test]
fn index_json_summary() {
    let dir = project(&[
        ("bad.rb", "def broken(\n"),
        ("lib/app.rb", "class App\nend\n"),
    ]);
    let output = run(dir.path(), &["index", "--json", "."]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["files"], serde_json::json!(["lib/app.rb"]));
    assert_eq!(json["skipped"][0]["code"], "P0001");
    assert_eq!(json["skipped"][0]["file"], "bad.rb");
    assert!(json["rounds"].as_u64().unwrap() >= 1);
}

/// A directory that does not exist is an error with status 1.
#[test]
fn index_missing_directory_fails() {
    let dir = project(&[]);
    let output = run(dir.path(), &["index", "missing"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("error: Project directory 'missing' does not exist"));
}

/// In JSON mode the final error is a JSON object too.
#[test]
fn json_error_is_structured() {
    let dir = project(&[]);
    let output = run(dir.path(), &["--json", "index", "missing"]);
    assert_eq!(output.status.code(), Some(1));
    let json: serde_json::Value = serde_json::from_str(stderr(&output).trim()).unwrap();
    assert_eq!(json["code"], "C0001");
    assert_eq!(json["severity"], "error");
}

// ── Position queries ───────────────────────────────────────────────────

/// The file's directory is the project when no root is given.
#[test]
fn type_query_in_file_directory() {
    let dir = project(&[("main.rb", "foo = 42\nfoo\n")]);
    let output = run(dir.path(), &["type", "main.rb", "1", "1"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "Integer\n");
}

/// `--root` indexes the whole project, so calls resolve across files.
#[test]
fn type_query_with_root() {
    let dir = project(&[
        ("lib/dog.rb", "class Dog\n  def name\n    \"Rex\"\n  end\nend\n"),
        ("app/main.rb", "Dog.new.name\n"),
    ]);
    let output = run(dir.path(), &["type", "--root", ".", "app/main.rb", "0", "9"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "String\n");
}

/// Positions nothing covers print "unknown", or null in JSON.
#[test]
fn type_query_unknown() {
    let dir = project(&[("main.rb", "1\n")]);
    let output = run(dir.path(), &["type", "main.rb", "7", "0"]);
    assert_eq!(stdout(&output), "unknown\n");
    let output = run(dir.path(), &["type", "--json", "main.rb", "7", "0"]);
    assert_eq!(stdout(&output).trim(), r#"{"type":null}"#);
}

/// Definitions print one location per line.
#[test]
fn definition_query_prints_locations() {
    let dir = project(&[("main.rb", "class Foo\nend\nFoo.new\n")]);
    let output = run(dir.path(), &["definition", "main.rb", "2", "1"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "main.rb:0:6-0:9\n");
}

/// Completions in JSON form are an array of names.
#[test]
fn complete_query_json() {
    let src = "class Foo\n  def bar; end\n  def baz; end\nend\nFoo.new.ba";
    let dir = project(&[("main.rb", src)]);
    let output = run(dir.path(), &["complete", "--json", "main.rb", "4", "10"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let names: Vec<String> = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(names, vec!["bar", "baz"]);
}

/// Querying a file the project skipped explains why.
#[test]
fn query_on_skipped_file_fails() {
    let dir = project(&[("bad.rb", "def broken(\n")]);
    let output = run(dir.path(), &["type", "bad.rb", "0", "0"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).starts_with("error: 'bad.rb' was skipped"));
}

// ── methods ────────────────────────────────────────────────────────────

/// Instance and singleton methods, in source order; builtins are left out.
#[test]
fn methods_lists_user_methods() {
    let src = "class Foo\n  def bar; end\n  def self.build; end\nend\ndef helper; end\n";
    let dir = project(&[("main.rb", src)]);
    let output = run(dir.path(), &["methods", "."]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let out = stdout(&output);
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3, "stdout: {out}");
    assert!(lines[0].starts_with("Foo#bar main.rb:1:2-"));
    assert!(lines[1].starts_with("Foo.build main.rb:2:2-"));
    assert!(lines[2].starts_with("Object#helper main.rb:4:0-"));
}
