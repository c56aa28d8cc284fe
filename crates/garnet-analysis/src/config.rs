use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Name of the configuration file looked up at the project root.
pub const CONFIG_FILE: &str = "garnet.toml";

/// Represents a parsed garnet.toml file. Every field has a default.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub index: IndexConfig,
    pub solver: SolverConfig,
}

/// File selection from the [index] section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    /// File name patterns to analyze, `**/*.rb` style.
    pub include: Vec<String>,
    /// Directory names never descended into.
    pub exclude: Vec<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            include: vec!["**/*.rb".to_string()],
            exclude: vec!["vendor".to_string(), "tmp".to_string()],
        }
    }
}

impl IndexConfig {
    /// Whether a file named `file_name` matches one of the include patterns.
    ///
    /// Only the last segment of a pattern is significant: `**/*.rb` and
    /// `*.rb` both select every `.rb` file, `Rakefile` selects files with
    /// exactly that name.
    pub fn includes(&self, file_name: &str) -> bool {
        self.include.iter().any(|pattern| {
            let last = pattern.rsplit('/').next().unwrap_or(pattern);
            match last.strip_prefix('*') {
                Some(suffix) => file_name.ends_with(suffix) && file_name.len() > suffix.len(),
                None => file_name == last,
            }
        })
    }

    pub fn excludes(&self, dir_name: &str) -> bool {
        self.exclude.iter().any(|excluded| excluded == dir_name)
    }
}

/// Fixpoint limits from the [solver] section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SolverConfig {
    pub max_rounds: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            max_rounds: garnet_typeck::solver::DEFAULT_MAX_ROUNDS,
        }
    }
}

impl Config {
    /// Read and parse a garnet.toml file.
    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    /// Parse a garnet.toml file from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Config, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// The configuration of the project at `root`: its garnet.toml if there
    /// is one, the defaults otherwise.
    pub fn load(root: &Path) -> Result<Config, ConfigError> {
        let path = root.join(CONFIG_FILE);
        if path.is_file() {
            Self::from_file(&path)
        } else {
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_config() {
        let toml = r#"
[index]
include = ["**/*.rb", "Rakefile"]
exclude = ["vendor", "spec"]

[solver]
max_rounds = 50
"#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.index.include, vec!["**/*.rb", "Rakefile"]);
        assert_eq!(config.index.exclude, vec!["vendor", "spec"]);
        assert_eq!(config.solver.max_rounds, 50);
    }

    #[test]
    fn empty_config_is_default() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.solver.max_rounds, 10_000);
        assert!(config.index.excludes("vendor"));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::from_str("[solver]\nmax_rounds = 3\n").unwrap();
        assert_eq!(config.solver.max_rounds, 3);
        assert_eq!(config.index, IndexConfig::default());
    }

    #[test]
    fn reject_unknown_keys() {
        let err = Config::from_str("[index]\nincludes = []\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "Error: {err}");
    }

    #[test]
    fn reject_wrong_types() {
        assert!(Config::from_str("[solver]\nmax_rounds = \"many\"\n").is_err());
    }

    #[test]
    fn include_patterns_match_file_names() {
        let index = IndexConfig {
            include: vec!["**/*.rb".into(), "Rakefile".into()],
            exclude: vec![],
        };
        assert!(index.includes("foo.rb"));
        assert!(index.includes("Rakefile"));
        assert!(!index.includes("foo.py"));
        assert!(!index.includes(".rb"));
    }

    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load(dir.path()).unwrap(), Config::default());

        std::fs::write(dir.path().join(CONFIG_FILE), "[solver]\nmax_rounds = 7\n").unwrap();
        assert_eq!(Config::load(dir.path()).unwrap().solver.max_rounds, 7);
    }
}
