use crate::config::Config;
use crate::error::GateError;
use crate::file_system::{compile_filter, create_folder, list_files, read_file, write_file};
use crate::gate::{authorize_path, authorize_write};
use crate::models::Operation;
use serde_json::{json, Value};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ListFiles,
    ReadFile,
    WriteFile,
    CreateFolder,
}

impl FromStr for Action {
    type Err = GateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "list_files" => Ok(Action::ListFiles),
            "read_file" => Ok(Action::ReadFile),
            "write_file" => Ok(Action::WriteFile),
            "create_folder" => Ok(Action::CreateFolder),
            _ => Err(GateError::Unsupported),
        }
    }
}

fn target<'a>(op: &'a Operation, keys: &[&str]) -> Result<&'a str, GateError> {
    keys.iter()
        .find_map(|key| op.param(key))
        .ok_or_else(|| GateError::BadRequest(format!("missing parameter: {}", keys[0])))
}

/// Runs an operation whose action already passed the allowlist. Each arm
/// authorizes its own target before touching the filesystem.
pub async fn dispatch(config: &Config, op: &Operation) -> Result<Value, GateError> {
    match op.action.parse::<Action>()? {
        Action::ListFiles => {
            let requested = target(op, &["path", "directory"])?;
            let dir = authorize_path(config, requested).await?;
            let filter = op
                .param("filter")
                .map(|pattern| compile_filter(&dir, pattern))
                .transpose()?;
            Ok(json!(list_files(&dir, filter.as_ref()).await?))
        }
        Action::ReadFile => {
            let path = authorize_path(config, target(op, &["path"])?).await?;
            Ok(json!(read_file(&path).await?))
        }
        Action::WriteFile => {
            let requested = target(op, &["path"])?;
            let content = op.parameters.get("content").map(String::as_str).unwrap_or("");
            let path = authorize_write(config, requested, content).await?;
            Ok(json!(write_file(&path, content).await?))
        }
        Action::CreateFolder => {
            let path = authorize_path(config, target(op, &["path"])?).await?;
            Ok(json!(create_folder(&path).await?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    fn config(root: &Path, max_file_size: u64) -> Config {
        let actions = ["list_files", "read_file", "write_file", "create_folder"]
            .iter()
            .map(|a| (a.to_string(), true))
            .collect();
        Config::new([root], actions, max_file_size, [".txt", ".json", ".csv", ".log"]).unwrap()
    }

    fn op(action: &str, params: &[(&str, &str)]) -> Operation {
        Operation {
            action: action.to_string(),
            parameters: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            timestamp: None,
        }
    }

    #[test]
    fn parses_known_actions() {
        assert_eq!("list_files".parse::<Action>().unwrap(), Action::ListFiles);
        assert_eq!("create_folder".parse::<Action>().unwrap(), Action::CreateFolder);
        assert!(matches!("rm_rf".parse::<Action>(), Err(GateError::Unsupported)));
    }

    #[actix_rt::test]
    async fn unknown_action_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let result = dispatch(&config(dir.path(), 64), &op("delete_file", &[])).await;
        assert!(matches!(result, Err(GateError::Unsupported)));
    }

    #[actix_rt::test]
    async fn write_then_read_returns_same_content() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 1024);
        let path = format!("{}/note.txt", dir.path().display());

        let written = dispatch(&config, &op("write_file", &[("path", path.as_str()), ("content", "hello\nworld")]))
            .await
            .unwrap();
        assert_eq!(written, json!(true));

        let read = dispatch(&config, &op("read_file", &[("path", path.as_str())])).await.unwrap();
        assert_eq!(read, json!("hello\nworld"));
    }

    #[actix_rt::test]
    async fn write_size_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 8);
        let path = format!("{}/edge.txt", dir.path().display());

        let exact = "a".repeat(8);
        assert!(dispatch(&config, &op("write_file", &[("path", path.as_str()), ("content", exact.as_str())]))
            .await
            .is_ok());

        let over = "a".repeat(9);
        let result = dispatch(&config, &op("write_file", &[("path", path.as_str()), ("content", over.as_str())])).await;
        assert!(matches!(result, Err(GateError::PayloadTooLarge { limit: 8 })));
        assert_eq!(std::fs::read_to_string(dir.path().join("edge.txt")).unwrap(), exact);
    }

    #[actix_rt::test]
    async fn disallowed_extension_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 64);
        let path = format!("{}/note.exe", dir.path().display());

        let result = dispatch(&config, &op("write_file", &[("path", path.as_str()), ("content", "MZ")])).await;
        assert!(matches!(result, Err(GateError::Forbidden(_))));
        assert!(!dir.path().join("note.exe").exists());
    }

    #[actix_rt::test]
    async fn create_folder_twice_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 64);
        let path = format!("{}/reports/2024", dir.path().display());

        for _ in 0..2 {
            let created = dispatch(&config, &op("create_folder", &[("path", path.as_str())])).await.unwrap();
            assert_eq!(created, json!(true));
        }
        assert!(dir.path().join("reports/2024").is_dir());

        let root = dir.path().display().to_string();
        assert!(dispatch(&config, &op("create_folder", &[("path", root.as_str())])).await.is_ok());
    }

    #[actix_rt::test]
    async fn list_accepts_directory_alias_and_filter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        std::fs::write(dir.path().join("b.csv"), "").unwrap();
        let config = config(dir.path(), 64);
        let root = dir.path().display().to_string();

        let all = dispatch(&config, &op("list_files", &[("directory", root.as_str())])).await.unwrap();
        assert_eq!(all.as_array().unwrap().len(), 2);

        let txt = dispatch(&config, &op("list_files", &[("path", root.as_str()), ("filter", "*.txt")]))
            .await
            .unwrap();
        let canonical = dir.path().canonicalize().unwrap();
        assert_eq!(txt, json!([canonical.join("a.txt").to_string_lossy()]));
    }

    #[actix_rt::test]
    async fn missing_target_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let result = dispatch(&config(dir.path(), 64), &op("read_file", &[])).await;
        assert!(matches!(result, Err(GateError::BadRequest(ref m)) if m == "missing parameter: path"));
    }

    #[actix_rt::test]
    async fn paths_outside_sandbox_are_forbidden_for_every_action() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = dir.path().join("shared");
        std::fs::create_dir(&sandbox).unwrap();
        let config = config(&sandbox, 64);
        let evil = format!("{}-evil/x.txt", sandbox.display());

        for action in ["list_files", "read_file", "write_file", "create_folder"] {
            let result = dispatch(&config, &op(action, &[("path", evil.as_str()), ("content", "x")])).await;
            assert!(matches!(result, Err(GateError::Forbidden(_))), "{action}");
        }
        assert!(!dir.path().join("shared-evil").exists());
    }

    #[actix_rt::test]
    async fn filesystem_errors_surface_as_internal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), 64);
        let path = format!("{}/missing.txt", dir.path().display());
        let result = dispatch(&config, &op("read_file", &[("path", path.as_str())])).await;
        assert!(matches!(result, Err(GateError::Internal(_))));
    }
}
