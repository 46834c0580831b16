use crate::error::GateError;
use ignore::overrides::{Override, OverrideBuilder};
use log::debug;
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

/// Compiles a gitignore-style glob (e.g. `*.txt`) matched against entry names.
pub fn compile_filter(dir: &Path, pattern: &str) -> Result<Override, GateError> {
    let mut builder = OverrideBuilder::new(dir);
    builder
        .add(pattern)
        .map_err(|e| GateError::BadRequest(format!("invalid filter '{}': {}", pattern, e)))?;
    builder
        .build()
        .map_err(|e| GateError::BadRequest(format!("invalid filter '{}': {}", pattern, e)))
}

/// Immediate entries of `dir` as absolute paths, in natural order.
pub async fn list_files(dir: &Path, filter: Option<&Override>) -> Result<Vec<String>, GateError> {
    debug!("Listing directory: {}", dir.display());
    let mut entries = fs::read_dir(dir).await?;
    let mut names = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some(filter) = filter {
            let is_dir = entry.file_type().await?.is_dir();
            if !filter.matched(Path::new(&name), is_dir).is_whitelist() {
                continue;
            }
        }
        names.push(name);
    }

    names.sort_by(|a, b| natord::compare(&a.to_string_lossy(), &b.to_string_lossy()));
    Ok(names
        .into_iter()
        .map(|name| dir.join(name).to_string_lossy().into_owned())
        .collect())
}

pub async fn read_file(path: &Path) -> Result<String, GateError> {
    debug!("Reading file: {}", path.display());
    let bytes = fs::read(path).await?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Creates or truncates `path` and leaves it with mode 0644.
pub async fn write_file(path: &Path, content: &str) -> Result<bool, GateError> {
    debug!("Writing {} bytes to {}", content.len(), path.display());
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(FILE_MODE);

    let mut file = options.open(path).await?;
    file.write_all(content.as_bytes()).await?;
    file.flush().await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE)).await?;
    }
    Ok(true)
}

/// Recursive; an existing directory is not an error.
pub async fn create_folder(path: &Path) -> Result<bool, GateError> {
    debug!("Creating folder: {}", path.display());
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(DIR_MODE);
    builder.create(path).await?;
    Ok(true)
}
