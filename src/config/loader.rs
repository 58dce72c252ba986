//! Configuration sources and file loading.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use toml::Value;

use crate::config::ConfigError;

/// Option values given on the command line, keyed by `(section, name)`.
pub type ArgSource = BTreeMap<(String, String), Value>;

/// A parsed configuration file and where it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSource {
    pub path: PathBuf,
    pub table: toml::Table,
}

impl FileSource {
    pub fn get(&self, section: &str, name: &str) -> Option<&Value> {
        self.table
            .get(section)
            .and_then(Value::as_table)
            .and_then(|t| t.get(name))
    }
}

/// The ordered sources options are resolved from.
///
/// Precedence is arguments > environment > file > default; defaults are
/// carried by the option specs themselves.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub args: ArgSource,
    pub environ: HashMap<String, String>,
    pub file: Option<FileSource>,
}

impl ConfigSources {
    pub fn new(args: ArgSource, environ: HashMap<String, String>) -> Self {
        Self {
            args,
            environ,
            file: None,
        }
    }

    pub fn with_file(mut self, file: FileSource) -> Self {
        self.file = Some(file);
        self
    }
}

/// Read and parse a TOML configuration file.
pub fn load_file(path: &Path) -> Result<FileSource, ConfigError> {
    tracing::info!(path = %path.display(), "Reading configuration file");
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let table: toml::Table = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(FileSource {
        path: path.to_path_buf(),
        table,
    })
}
