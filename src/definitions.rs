//! Loading sandbox definitions from disk.

use anyhow::Context;
use std::path::{Path, PathBuf};

use sandbox_mcp_sandbox::SandboxDefinition;

/// File looked up inside per-sandbox subdirectories.
const NESTED_CONFIG: &str = "config.json";

/// Load every definition under `paths`.
///
/// A path may be a JSON file or a directory. Directories contribute their
/// `*.json` files and `<subdir>/config.json`, in name order.
pub async fn load_definitions(paths: &[PathBuf]) -> anyhow::Result<Vec<SandboxDefinition>> {
    let mut files = Vec::new();
    for path in paths {
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("cannot read definitions path {}", path.display()))?;
        if metadata.is_dir() {
            files.extend(scan_dir(path).await?);
        } else {
            files.push(path.clone());
        }
    }

    let mut definitions = Vec::with_capacity(files.len());
    for file in files {
        definitions.push(load_file(&file).await?);
    }

    tracing::info!(count = definitions.len(), "Sandbox definitions loaded");
    Ok(definitions)
}

async fn scan_dir(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("cannot list {}", dir.display()))?;

    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
            let nested = path.join(NESTED_CONFIG);
            if tokio::fs::try_exists(&nested).await.unwrap_or(false) {
                found.push(nested);
            }
        } else if path.extension().is_some_and(|ext| ext == "json") {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

async fn load_file(path: &Path) -> anyhow::Result<SandboxDefinition> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    let definition = SandboxDefinition::from_json(&json)
        .with_context(|| format!("invalid sandbox definition in {}", path.display()))?;
    tracing::debug!(id = %definition.id, path = %path.display(), "Loaded sandbox definition");
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, id: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            path,
            format!(r#"{{"id": "{}", "entrypoint": "run.sh", "timeout": 5}}"#, id),
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_loads_files_and_nested_configs() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("b.json"), "b");
        write(&dir.path().join("a/config.json"), "a");
        write(&dir.path().join("ignored/other.json"), "ignored");
        std::fs::write(dir.path().join("README.md"), "docs").unwrap();

        let single = tempfile::tempdir().unwrap();
        let extra = single.path().join("extra.json");
        write(&extra, "extra");

        let definitions = load_definitions(&[dir.path().to_path_buf(), extra])
            .await
            .unwrap();
        let ids: Vec<&str> = definitions.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "extra"]);
    }

    #[tokio::test]
    async fn test_invalid_definition_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, r#"{"id": "broken", "entrypoint": "run.sh", "timeout": 0}"#).unwrap();

        let err = load_definitions(&[path]).await.unwrap_err();
        assert!(format!("{:#}", err).contains("broken.json"));
        assert!(format!("{:#}", err).contains("timeout"));
    }

    #[tokio::test]
    async fn test_missing_path_fails() {
        let err = load_definitions(&[PathBuf::from("/nonexistent/defs")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("/nonexistent/defs"));
    }
}
