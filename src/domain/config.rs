use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::{Detection, default_detections};

/// The file looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "taintalyzing.toml";

/// Errors raised while reading or writing the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}")]
    Read {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid TOML or does not describe a configuration.
    #[error("failed to parse config file {path}")]
    Parse {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// The configuration could not be serialized.
    #[error("failed to serialize config")]
    Serialize(#[from] toml::ser::Error),

    /// The file could not be written.
    #[error("failed to write config file {path}")]
    Write {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A value is out of range.
    #[error("{field} must be greater than 0")]
    Zero {
        /// The offending field.
        field: &'static str,
    },
}

/// Settings that control the analysis and the report.
///
/// Every field can be overridden on the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct Config {
    /// The sanitizer nesting level at which a sanitized taint counts as
    /// unsanitized again.
    indirection: usize,

    /// Methods with at least this cyclomatic complexity are reported.
    complexity: usize,

    /// Upper bound on the execution paths enumerated per method.
    ///
    /// Methods with more paths are analysed as a single path.
    max_paths: usize,

    /// Upper bound on the analysis rounds per module.
    max_rounds: usize,

    /// Regular expressions; matching paths are not analysed.
    pub exclude: Vec<String>,

    /// The module used when the filetype cannot be detected.
    pub fallback: Option<String>,

    /// Analyse every method as a single path.
    pub lazy: bool,

    /// The filetype detection table.
    pub detection: Vec<Detection>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            indirection: default_indirection(),
            complexity: default_complexity(),
            max_paths: default_max_paths(),
            max_rounds: default_max_rounds(),
            exclude: Vec::new(),
            fallback: None,
            lazy: false,
            detection: default_detections(),
        }
    }
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, if the TOML content is
    /// invalid or if a limit is zero.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` if given, otherwise [`DEFAULT_CONFIG_FILE`] from the
    /// working directory if it exists, otherwise the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the chosen file cannot be loaded.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        let default = Path::new(DEFAULT_CONFIG_FILE);
        if default.is_file() {
            tracing::debug!("Using configuration from {}.", default.display());
            Self::load(default)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or if
    /// the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("indirection", self.indirection),
            ("complexity", self.complexity),
            ("max_paths", self.max_paths),
            ("max_rounds", self.max_rounds),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero { field });
            }
        }
        Ok(())
    }

    /// Returns the sanitizer indirection limit.
    #[must_use]
    pub const fn indirection(&self) -> usize {
        self.indirection
    }

    /// Returns the complexity threshold.
    #[must_use]
    pub const fn complexity(&self) -> usize {
        self.complexity
    }

    /// Returns the path limit per method.
    #[must_use]
    pub const fn max_paths(&self) -> usize {
        self.max_paths
    }

    /// Returns the round limit per module.
    #[must_use]
    pub const fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Sets the sanitizer indirection limit.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is zero.
    pub const fn set_indirection(&mut self, value: usize) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::Zero {
                field: "indirection",
            });
        }
        self.indirection = value;
        Ok(())
    }

    /// Sets the complexity threshold.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` is zero.
    pub const fn set_complexity(&mut self, value: usize) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::Zero {
                field: "complexity",
            });
        }
        self.complexity = value;
        Ok(())
    }
}

const fn default_indirection() -> usize {
    5
}

const fn default_complexity() -> usize {
    10
}

const fn default_max_paths() -> usize {
    512
}

const fn default_max_rounds() -> usize {
    10
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_indirection")]
        indirection: usize,

        #[serde(default = "default_complexity")]
        complexity: usize,

        #[serde(default = "default_max_paths")]
        max_paths: usize,

        #[serde(default = "default_max_rounds")]
        max_rounds: usize,

        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        exclude: Vec<String>,

        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<String>,

        #[serde(default)]
        lazy: bool,

        /// Replaces the built-in table when present.
        #[serde(default = "default_detections")]
        detection: Vec<Detection>,
    },
}

impl From<Versions> for Config {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                indirection,
                complexity,
                max_paths,
                max_rounds,
                exclude,
                fallback,
                lazy,
                detection,
            } => Self {
                indirection,
                complexity,
                max_paths,
                max_rounds,
                exclude,
                fallback,
                lazy,
                detection,
            },
        }
    }
}

impl From<Config> for Versions {
    fn from(config: Config) -> Self {
        Self::V1 {
            indirection: config.indirection,
            complexity: config.complexity,
            max_paths: config.max_paths,
            max_rounds: config.max_rounds,
            exclude: config.exclude,
            fallback: config.fallback,
            lazy: config.lazy,
            detection: config.detection,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn load_reads_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(
            b"_version = \"1\"\nindirection = 3\ncomplexity = 7\nexclude = [\"vendor/\"]\nfallback = \"c\"\nlazy = true\n",
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();

        assert_eq!(config.indirection(), 3);
        assert_eq!(config.complexity(), 7);
        assert_eq!(config.max_paths(), 512);
        assert_eq!(config.exclude, ["vendor/"]);
        assert_eq!(config.fallback.as_deref(), Some("c"));
        assert!(config.lazy);
        assert_eq!(config.detection, default_detections());
    }

    #[test]
    fn detection_table_replaces_builtin() {
        let config: Config = toml::from_str(
            "_version = \"1\"\n[[detection]]\nmodule = \"php\"\nextensions = [\".inc\"]\nmagic = \"PHP script\"\n",
        )
        .unwrap();
        assert_eq!(config.detection.len(), 1);
        assert_eq!(config.detection[0].extensions, [".inc"]);
    }

    #[test]
    fn load_missing_file_returns_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.toml");

        let error = Config::load(&missing).unwrap_err();
        assert!(matches!(error, ConfigError::Read { .. }));
    }

    #[test]
    fn load_invalid_toml_returns_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\ncomplexity = \"ten\"\n")
            .unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"_version = \"1\"\nmax_rounds = 0\n").unwrap();

        let error = Config::load(file.path()).unwrap_err();
        assert!(matches!(error, ConfigError::Zero { field: "max_rounds" }));

        let mut config = Config::default();
        assert!(config.set_indirection(0).is_err());
        assert!(config.set_complexity(4).is_ok());
        assert_eq!(config.complexity(), 4);
    }

    #[test]
    fn save_then_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("taintalyzing.toml");
        let mut config = Config::default();
        config.exclude.push(r"\.min\.js$".to_string());
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn explicit_path_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Config::discover(Some(&tmp.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn empty_file_returns_default() {
        let expected = Config::default();
        let actual: Config = toml::from_str(r#"_version = "1""#).unwrap();
        assert_eq!(actual, expected);
    }
}
