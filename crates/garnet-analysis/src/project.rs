//! Whole-project indexing.
//!
//! Every discovered file is parsed and built into one shared analysis
//! before the solver runs, so calls resolve across files. Files are built
//! in sorted path order; a file that fails is dropped, with a warning, and
//! leaves no trace in the graph or the symbol table.

use std::path::{Path, PathBuf};

use garnet_common::{FileId, LineIndex};
use garnet_typeck::solver::Typing;
use garnet_typeck::ty::Type;
use garnet_typeck::Analysis;
use tracing::{info, warn};

use crate::config::Config;
use crate::discovery::discover_ruby_files;
use crate::error::IndexError;

/// A file that was left out of the analysis.
#[derive(Debug)]
pub struct FileWarning {
    pub path: PathBuf,
    pub error: IndexError,
    /// File contents, when it could be read.
    pub source: Option<String>,
}

/// A file that is part of the analysis.
#[derive(Debug)]
pub struct SourceFile {
    pub id: FileId,
    pub path: PathBuf,
    pub source: String,
    pub lines: LineIndex,
}

/// The solved analysis of a set of files.
#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    analysis: Analysis,
    typing: Typing,
    files: Vec<SourceFile>,
    warnings: Vec<FileWarning>,
}

impl Project {
    /// Index every file under `root` selected by `config`.
    ///
    /// Fails only if the directory tree cannot be walked.
    pub fn index(root: &Path, config: &Config) -> Result<Project, IndexError> {
        let paths = discover_ruby_files(root, &config.index).map_err(|source| IndexError::Io {
            path: root.to_path_buf(),
            source,
        })?;
        let mut builder = ProjectBuilder::new(root);
        for relative in paths {
            let full = root.join(&relative);
            match std::fs::read_to_string(&full) {
                Ok(source) => builder.add(relative, source),
                Err(source) => builder.skip(FileWarning {
                    path: relative,
                    error: IndexError::Io { path: full, source },
                    source: None,
                }),
            }
        }
        Ok(builder.finish(config))
    }

    /// Index in-memory sources, each named by its path.
    pub fn from_sources<P, S>(sources: impl IntoIterator<Item = (P, S)>, config: &Config) -> Project
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        let mut builder = ProjectBuilder::new(Path::new(""));
        for (path, source) in sources {
            builder.add(path.into(), source.into());
        }
        builder.finish(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    pub fn typing(&self) -> &Typing {
        &self.typing
    }

    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn warnings(&self) -> &[FileWarning] {
        &self.warnings
    }

    pub fn file(&self, id: &FileId) -> Option<&SourceFile> {
        self.files.iter().find(|f| &f.id == id)
    }

    /// The analyzed file at `path`, given relative to the root or as any
    /// path that names the same file.
    pub fn file_by_path(&self, path: &Path) -> Option<&SourceFile> {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        self.files.iter().find(|f| f.path == relative).or_else(|| {
            let wanted = path.canonicalize().ok()?;
            self.files
                .iter()
                .find(|f| self.root.join(&f.path).canonicalize().ok().as_ref() == Some(&wanted))
        })
    }

    pub fn type_of(&self, node: garnet_typeck::node::NodeId) -> &Type {
        self.typing.type_of(node)
    }
}

struct ProjectBuilder {
    root: PathBuf,
    analysis: Analysis,
    files: Vec<SourceFile>,
    warnings: Vec<FileWarning>,
}

impl ProjectBuilder {
    fn new(root: &Path) -> Self {
        ProjectBuilder {
            root: root.to_path_buf(),
            analysis: Analysis::new(),
            files: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn add(&mut self, path: PathBuf, source: String) {
        let id = FileId::new(path.to_string_lossy().replace('\\', "/"));
        let ast = match garnet_syntax::parse(&source) {
            Ok(ast) => ast,
            Err(err) => {
                return self.skip(FileWarning {
                    path,
                    error: err.into(),
                    source: Some(source),
                })
            }
        };
        if let Err(err) = self.analysis.add_file(id.clone(), &source, &ast) {
            return self.skip(FileWarning {
                path,
                error: err.into(),
                source: Some(source),
            });
        }
        let lines = LineIndex::new(&source);
        self.files.push(SourceFile {
            id,
            path,
            source,
            lines,
        });
    }

    fn skip(&mut self, warning: FileWarning) {
        warn!(path = %warning.path.display(), error = %warning.error, "Skipped {}", warning.path.display());
        self.warnings.push(warning);
    }

    fn finish(mut self, config: &Config) -> Project {
        let typing = self.analysis.solve(config.solver.max_rounds);
        info!(
            root = %self.root.display(),
            files = self.files.len(),
            skipped = self.warnings.len(),
            nodes = self.analysis.graph().len(),
            sends = self.analysis.worklist().len(),
            rounds = typing.rounds(),
            "indexed project"
        );
        Project {
            root: self.root,
            analysis: self.analysis,
            typing,
            files: self.files,
            warnings: self.warnings,
        }
    }
}
