//! Authorization checks applied to every operation: action allowlist, path
//! containment, file type and size. The predicates here only read `Config`
//! and request data; `resolve_path` is the single step that consults the
//! filesystem. It only reads metadata and runs on the blocking pool, like the
//! `tokio::fs` calls in `file_system`.

use crate::config::Config;
use crate::error::GateError;
use actix_web::web;
use log::{debug, warn};
use path_clean::PathClean;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub fn check_action(config: &Config, action: &str) -> Result<(), GateError> {
    if config.allowed_actions.get(action).copied().unwrap_or(false) {
        Ok(())
    } else {
        Err(GateError::Forbidden("Operation not allowed".to_string()))
    }
}

/// True iff `path` equals, or lies below, one of the allowed directories.
/// Comparison is per path component, so `/data/shared-evil` is not inside
/// `/data/shared`. Expects an already resolved path.
pub fn is_path_allowed(config: &Config, path: &Path) -> bool {
    path.is_absolute()
        && config
            .allowed_paths
            .iter()
            .any(|root| path.starts_with(root))
}

pub fn is_file_type_allowed(config: &Config, path: &Path) -> bool {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .is_some_and(|ext| config.allowed_file_types.contains(&ext))
}

pub fn check_size(config: &Config, len: usize) -> Result<(), GateError> {
    if len as u64 > config.max_file_size {
        return Err(GateError::PayloadTooLarge {
            limit: config.max_file_size,
        });
    }
    Ok(())
}

/// Turns a requested path into the absolute, symlink-free path that the
/// operation will act on. Segments that do not exist yet (a file about to be
/// written, folders about to be created) are appended to the canonical form
/// of their deepest existing ancestor.
pub async fn resolve_path(requested: &str) -> Result<PathBuf, GateError> {
    let owned = requested.to_string();
    web::block(move || resolve_blocking(&owned))
        .await
        .map_err(|e| GateError::Internal(e.to_string()))?
}

fn resolve_blocking(requested: &str) -> Result<PathBuf, GateError> {
    let raw = Path::new(requested);
    if !raw.is_absolute() {
        return Err(GateError::access_denied(requested));
    }
    let cleaned = raw.clean();

    let mut existing = cleaned.as_path();
    let mut tail: Vec<OsString> = Vec::new();
    loop {
        match existing.canonicalize() {
            Ok(mut resolved) => {
                resolved.extend(tail.iter().rev());
                return Ok(resolved);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // A link that points nowhere would be followed on create.
                if fs::symlink_metadata(existing).is_ok() {
                    warn!("Dangling symlink on requested path: {}", existing.display());
                    return Err(GateError::access_denied(requested));
                }
                match (existing.parent(), existing.file_name()) {
                    (Some(parent), Some(name)) => {
                        tail.push(name.to_os_string());
                        existing = parent;
                    }
                    _ => return Err(GateError::access_denied(requested)),
                }
            }
            Err(e) => {
                debug!("Cannot resolve '{}': {}", existing.display(), e);
                return Err(GateError::access_denied(requested));
            }
        }
    }
}

/// Resolves `requested` and checks it against the sandbox roots.
pub async fn authorize_path(config: &Config, requested: &str) -> Result<PathBuf, GateError> {
    let resolved = resolve_path(requested).await?;
    if !is_path_allowed(config, &resolved) {
        warn!(
            "Path '{}' (resolved to '{}') is outside the sandbox",
            requested,
            resolved.display()
        );
        return Err(GateError::access_denied(requested));
    }
    Ok(resolved)
}

/// Path, type and size checks for a write, in that order.
pub async fn authorize_write(
    config: &Config,
    requested: &str,
    content: &str,
) -> Result<PathBuf, GateError> {
    let resolved = authorize_path(config, requested).await?;
    if !is_file_type_allowed(config, &resolved) {
        return Err(GateError::Forbidden("file type not allowed".to_string()));
    }
    check_size(config, content.len())?;
    Ok(resolved)
}
