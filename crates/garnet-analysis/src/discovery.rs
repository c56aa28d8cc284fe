//! Ruby source discovery for garnet projects.
//!
//! Recursively collects the files selected by the `[index]` configuration,
//! as paths relative to the project root, sorted for determinism.

use std::path::{Path, PathBuf};

use crate::config::IndexConfig;

/// Recursively discover every included file under `project_root`.
///
/// Hidden entries (names starting with `.`) are always skipped, as are
/// directories named in `config.exclude`.
pub fn discover_ruby_files(project_root: &Path, config: &IndexConfig) -> std::io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    discover_recursive(project_root, project_root, config, &mut files)?;
    files.sort();
    Ok(files)
}

fn discover_recursive(
    root: &Path,
    dir: &Path,
    config: &IndexConfig,
    files: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let entry_path = entry.path();
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        if name.starts_with('.') {
            continue;
        }

        if entry_path.is_dir() {
            if !config.excludes(&name) {
                discover_recursive(root, &entry_path, config, files)?;
            }
        } else if config.includes(&name) {
            let relative = entry_path
                .strip_prefix(root)
                .unwrap_or(&entry_path)
                .to_path_buf();
            files.push(relative);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "").unwrap();
    }

    #[test]
    fn discovers_sorted_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "main.rb");
        touch(tmp.path(), "lib/b.rb");
        touch(tmp.path(), "lib/a.rb");
        touch(tmp.path(), "README.md");

        let files = discover_ruby_files(tmp.path(), &IndexConfig::default()).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("lib/a.rb"),
                PathBuf::from("lib/b.rb"),
                PathBuf::from("main.rb"),
            ]
        );
    }

    #[test]
    fn skips_hidden_and_excluded_directories() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "app.rb");
        touch(tmp.path(), ".git/hooks.rb");
        touch(tmp.path(), ".hidden.rb");
        touch(tmp.path(), "vendor/gem.rb");
        touch(tmp.path(), "lib/vendor/nested.rb");

        let files = discover_ruby_files(tmp.path(), &IndexConfig::default()).unwrap();
        assert_eq!(files, vec![PathBuf::from("app.rb")]);
    }

    #[test]
    fn include_patterns_select_extra_files() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), "Rakefile");
        touch(tmp.path(), "tasks.rb");
        let config = IndexConfig {
            include: vec!["Rakefile".into()],
            exclude: vec![],
        };

        let files = discover_ruby_files(tmp.path(), &config).unwrap();
        assert_eq!(files, vec![PathBuf::from("Rakefile")]);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        assert!(discover_ruby_files(&missing, &IndexConfig::default()).is_err());
    }
}
