//! The Garnet command-line front end.
//!
//! Provides the `garnetc` command with the following subcommands:
//!
//! - `garnetc index <dir>` - Index a project and report skipped files
//! - `garnetc type <file> <line> <col>` - Inferred type at a position
//! - `garnetc definition <file> <line> <col>` - Definition sites of a reference
//! - `garnetc complete <file> <line> <col>` - Method names completing a call
//! - `garnetc methods <dir>` - Every method defined in a project
//!
//! Lines and columns are 0-based, the same as the locations printed.
//!
//! Options:
//! - `--root` - Project directory for position queries (default: the file's directory)
//! - `--json` - Machine-readable output
//! - `--no-color` - Disable colorized output
//! - `-v` - Debug logging (`GARNET_LOG` takes precedence)

use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use garnet_analysis::diagnostics::{render_warning, warning_json, DiagnosticOptions};
use garnet_analysis::{
    completions_at_position, definitions_at_position, type_at_position, Config, Project,
};
use garnet_common::{FileId, Location, Position};

#[derive(Parser)]
#[command(name = "garnetc", version, about = "Static type analysis for Ruby")]
struct Cli {
    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,

    /// Disable colorized output
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a project and report the files that were skipped
    Index {
        /// Path to the project directory
        dir: PathBuf,
    },
    /// Print the inferred type at a position
    Type(QueryArgs),
    /// Print the definition sites of the reference at a position
    Definition(QueryArgs),
    /// Print the method names completing the call at a position
    Complete(QueryArgs),
    /// List every method defined in a project
    Methods {
        /// Path to the project directory
        dir: PathBuf,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Ruby file to query
    file: PathBuf,
    /// Line, 0-based
    line: u32,
    /// Column, 0-based
    col: u32,
    /// Project directory (defaults to the file's directory)
    #[arg(long)]
    root: Option<PathBuf>,
}

impl QueryArgs {
    fn position(&self) -> Position {
        Position::new(self.line, self.col)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, !cli.no_color);

    let diag_opts = DiagnosticOptions {
        color: !cli.no_color && !cli.json,
        json: cli.json,
    };
    let result = match &cli.command {
        Commands::Index { dir } => index(dir, &diag_opts),
        Commands::Type(args) => type_query(args, cli.json),
        Commands::Definition(args) => definition_query(args, cli.json),
        Commands::Complete(args) => complete_query(args, cli.json),
        Commands::Methods { dir } => methods(dir, cli.json),
    };

    if let Err(e) = result {
        if cli.json {
            // In JSON mode, emit the final error as JSON too.
            let msg = serde_json::json!({
                "code": "C0001",
                "severity": "error",
                "message": e,
                "file": "",
                "spans": [],
            });
            eprintln!("{}", msg);
        } else {
            eprintln!("error: {}", e);
        }
        process::exit(1);
    }
}

fn init_logging(verbose: bool, ansi: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("GARNET_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(ansi)
        .with_target(false)
        .try_init();
}

/// Load `garnet.toml` from `root` and index the project.
fn load_project(root: &Path) -> Result<Project, String> {
    if !root.exists() {
        return Err(format!("Project directory '{}' does not exist", root.display()));
    }
    if !root.is_dir() {
        return Err(format!("'{}' is not a directory", root.display()));
    }
    let config = Config::load(root).map_err(|e| e.to_string())?;
    Project::index(root, &config).map_err(|e| e.to_string())
}

/// Index the project containing `args.file` and find the file in it.
fn open_query(args: &QueryArgs) -> Result<(Project, FileId), String> {
    let root = match &args.root {
        Some(root) => root.clone(),
        None => match args.file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        },
    };
    let project = load_project(&root)?;
    if let Some(file) = project.file_by_path(&args.file) {
        let id = file.id.clone();
        return Ok((project, id));
    }
    let skipped = project
        .warnings()
        .iter()
        .find(|w| root.join(&w.path) == args.file || w.path == args.file);
    match skipped {
        Some(warning) => Err(format!("'{}' was skipped: {}", args.file.display(), warning.error)),
        None => Err(format!(
            "'{}' is not part of the project at '{}'",
            args.file.display(),
            root.display()
        )),
    }
}

fn index(dir: &Path, diag_opts: &DiagnosticOptions) -> Result<(), String> {
    let project = load_project(dir)?;

    for warning in project.warnings() {
        if !diag_opts.json {
            eprint!("{}", render_warning(warning, diag_opts));
        }
    }

    if diag_opts.json {
        let files: Vec<String> = project.files().iter().map(|f| f.id.to_string()).collect();
        let skipped: Vec<serde_json::Value> = project.warnings().iter().map(warning_json).collect();
        let summary = serde_json::json!({
            "files": files,
            "skipped": skipped,
            "nodes": project.analysis().graph().len(),
            "rounds": project.typing().rounds(),
        });
        println!("{}", summary);
    } else {
        println!(
            "Indexed {} files ({} skipped)",
            project.files().len(),
            project.warnings().len()
        );
    }
    Ok(())
}

fn type_query(args: &QueryArgs, json: bool) -> Result<(), String> {
    let (project, file) = open_query(args)?;
    let ty = type_at_position(&project, &file, args.position()).map(|ty| ty.to_string());
    if json {
        println!("{}", serde_json::json!({ "type": ty }));
    } else {
        println!("{}", ty.as_deref().unwrap_or("unknown"));
    }
    Ok(())
}

fn definition_query(args: &QueryArgs, json: bool) -> Result<(), String> {
    let (project, file) = open_query(args)?;
    let locations = definitions_at_position(&project, &file, args.position());
    if json {
        let locations: Vec<serde_json::Value> = locations.iter().map(location_json).collect();
        println!("{}", serde_json::Value::Array(locations));
    } else {
        for location in &locations {
            println!("{location}");
        }
    }
    Ok(())
}

fn complete_query(args: &QueryArgs, json: bool) -> Result<(), String> {
    let (project, file) = open_query(args)?;
    let names = completions_at_position(&project, &file, args.position());
    if json {
        println!("{}", serde_json::json!(names));
    } else {
        for name in &names {
            println!("{name}");
        }
    }
    Ok(())
}

/// Every method with a source location, as `Owner#name` for instance
/// methods and `Owner.name` for singleton methods, in location order.
fn methods(dir: &Path, json: bool) -> Result<(), String> {
    let project = load_project(dir)?;
    let tree = project.analysis().tree();

    let mut rows: Vec<(String, &Location)> = tree
        .methods()
        .iter()
        .filter_map(|method| {
            let location = method.location.as_ref()?;
            let owner = tree.definition(method.owner);
            let name = match owner.eigenclass_of {
                Some(attached) => format!("{}.{}", tree.definition(attached).name, method.name),
                None => format!("{}#{}", owner.name, method.name),
            };
            Some((name, location))
        })
        .collect();
    rows.sort_by(|(_, a), (_, b)| (&a.file, a.span.start).cmp(&(&b.file, b.span.start)));

    if json {
        let rows: Vec<serde_json::Value> = rows
            .iter()
            .map(|(name, location)| serde_json::json!({ "method": name, "location": location_json(location) }))
            .collect();
        println!("{}", serde_json::Value::Array(rows));
    } else {
        for (name, location) in &rows {
            println!("{name} {location}");
        }
    }
    Ok(())
}

fn location_json(location: &Location) -> serde_json::Value {
    serde_json::json!({
        "file": location.file.as_str(),
        "start": { "line": location.range.start.line, "character": location.range.start.character },
        "end": { "line": location.range.end.line, "character": location.range.end.character },
    })
}
