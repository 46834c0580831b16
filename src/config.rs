use log::{info, warn};
use path_clean::PathClean;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_ALLOWED_PATHS: &[&str] = &["/var/www/public", "/data/shared"];
pub const DEFAULT_ACTIONS: &[&str] = &["list_files", "read_file", "write_file", "create_folder"];
pub const DEFAULT_FILE_TYPES: &[&str] = &[".txt", ".json", ".csv", ".log"];
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Headroom on top of the escaped content for the rest of the JSON envelope.
const BODY_SLACK: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("allowed path must be absolute: {0}")]
    RelativeAllowedPath(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("{0} must be set and non-empty")]
    MissingSecret(&'static str),

    #[error("unsupported signing algorithm {0}; expected one of HS256, HS384, HS512")]
    UnsupportedAlgorithm(String),

    #[error("failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Sandbox policy. Built once at startup and only ever read afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub allowed_paths: Vec<PathBuf>,
    pub allowed_actions: HashMap<String, bool>,
    pub max_file_size: u64,
    pub allowed_file_types: HashSet<String>,
}

/// On-disk form, keyed the way the JSON policy file spells it.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    allowed_paths: Vec<String>,
    allowed_actions: HashMap<String, bool>,
    #[serde(default = "default_max_file_size")]
    max_file_size: u64,
    allowed_file_types: Vec<String>,
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl Config {
    pub fn new<P, T>(
        allowed_paths: impl IntoIterator<Item = P>,
        allowed_actions: HashMap<String, bool>,
        max_file_size: u64,
        allowed_file_types: impl IntoIterator<Item = T>,
    ) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
        T: AsRef<str>,
    {
        let allowed_paths = allowed_paths
            .into_iter()
            .map(|p| normalize_root(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let allowed_file_types = allowed_file_types
            .into_iter()
            .map(|t| normalize_extension(t.as_ref()))
            .filter(|t| t.len() > 1)
            .collect();

        Ok(Config {
            allowed_paths,
            allowed_actions,
            max_file_size,
            allowed_file_types,
        })
    }

    /// Loads the policy from `CONFIG_FILE` when set, otherwise from the
    /// individual environment variables with the built-in defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(path) = lookup("CONFIG_FILE") {
            info!("Loading sandbox policy from {}", path);
            return Self::from_file(Path::new(&path));
        }

        let paths = list_var(&lookup, "ALLOWED_PATHS", DEFAULT_ALLOWED_PATHS);
        let actions = list_var(&lookup, "ALLOWED_ACTIONS", DEFAULT_ACTIONS)
            .into_iter()
            .map(|a| (a, true))
            .collect();
        let max_file_size = match lookup("MAX_FILE_SIZE") {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "MAX_FILE_SIZE",
                value: raw,
            })?,
            None => DEFAULT_MAX_FILE_SIZE,
        };
        let types = list_var(&lookup, "ALLOWED_FILE_TYPES", DEFAULT_FILE_TYPES);

        Self::new(paths, actions, max_file_size, types)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })?;
        Self::new(
            file.allowed_paths,
            file.allowed_actions,
            file.max_file_size,
            file.allowed_file_types,
        )
    }

    /// Upper bound on a raw request body. Worst-case JSON escaping turns one
    /// content byte into six (`\u0000`).
    pub fn max_body_size(&self) -> usize {
        usize::try_from(self.max_file_size)
            .unwrap_or(usize::MAX)
            .saturating_mul(6)
            .saturating_add(BODY_SLACK)
    }
}

fn list_var(lookup: impl Fn(&str) -> Option<String>, key: &str, default: &[&str]) -> Vec<String> {
    match lookup(key) {
        Some(raw) => split_list(&raw),
        None => default.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn normalize_root(path: &Path) -> Result<PathBuf, ConfigError> {
    if !path.is_absolute() {
        return Err(ConfigError::RelativeAllowedPath(path.display().to_string()));
    }
    let cleaned = path.clean();
    match cleaned.canonicalize() {
        Ok(canonical) => Ok(canonical),
        Err(e) => {
            warn!(
                "Allowed path '{}' could not be canonicalized ({}); using it as written.",
                cleaned.display(),
                e
            );
            Ok(cleaned)
        }
    }
}

fn normalize_extension(ext: &str) -> String {
    let ext = ext.trim().to_lowercase();
    if ext.starts_with('.') {
        ext
    } else {
        format!(".{}", ext)
    }
}
