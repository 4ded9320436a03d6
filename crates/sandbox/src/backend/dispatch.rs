//! Runtime selection for sandboxes without an explicit command.
//!
//! An explicit `command` always wins. Otherwise the entrypoint is run with
//! the runner registered for its extension. If the entrypoint has no known
//! extension, the staged files are scanned in runner precedence order and
//! the first match (by file name) is run.

use std::path::Path;

/// A host runtime bound to a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runner {
    pub extension: &'static str,
    pub program: &'static [&'static str],
}

/// Runners in precedence order: shell first, then Python, JavaScript, Go.
pub const RUNNERS: &[Runner] = &[
    Runner {
        extension: "sh",
        program: &["bash"],
    },
    Runner {
        extension: "py",
        program: &["python3"],
    },
    Runner {
        extension: "js",
        program: &["node"],
    },
    Runner {
        extension: "go",
        program: &["go", "run"],
    },
];

impl Runner {
    fn for_file(file_name: &str) -> Option<&'static Runner> {
        let extension = Path::new(file_name).extension()?.to_str()?;
        RUNNERS.iter().find(|runner| runner.extension == extension)
    }

    fn argv(&self, file_name: &str) -> Vec<String> {
        self.program
            .iter()
            .map(|part| part.to_string())
            .chain(std::iter::once(file_name.to_string()))
            .collect()
    }
}

/// Resolve the argv to run inside `workdir`, or `None` if nothing is runnable.
pub async fn resolve_command(
    workdir: &Path,
    entrypoint: &str,
    command: &[String],
) -> std::io::Result<Option<Vec<String>>> {
    if !command.is_empty() {
        return Ok(Some(command.to_vec()));
    }

    if let Some(runner) = Runner::for_file(entrypoint) {
        return Ok(Some(runner.argv(entrypoint)));
    }

    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(workdir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    for runner in RUNNERS {
        if let Some(name) = names
            .iter()
            .find(|name| Runner::for_file(name).map(|r| r.extension) == Some(runner.extension))
        {
            return Ok(Some(runner.argv(name)));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "").unwrap();
    }

    #[tokio::test]
    async fn test_explicit_command_wins() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "run.sh");
        let command = vec!["python3".to_string(), "main.py".to_string()];
        let argv = resolve_command(dir.path(), "main.py", &command)
            .await
            .unwrap();
        assert_eq!(argv, Some(command));
    }

    #[tokio::test]
    async fn test_entrypoint_extension() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "helper.sh");
        let argv = resolve_command(dir.path(), "main.js", &[]).await.unwrap();
        assert_eq!(argv, Some(vec!["node".to_string(), "main.js".to_string()]));
    }

    #[tokio::test]
    async fn test_scan_uses_precedence_then_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "Makefile");
        touch(dir.path(), "a.py");
        touch(dir.path(), "z.sh");
        touch(dir.path(), "b.sh");
        let argv = resolve_command(dir.path(), "Makefile", &[]).await.unwrap();
        assert_eq!(argv, Some(vec!["bash".to_string(), "b.sh".to_string()]));
    }

    #[tokio::test]
    async fn test_go_runner_and_nothing_runnable() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "notes.txt");
        assert_eq!(resolve_command(dir.path(), "notes.txt", &[]).await.unwrap(), None);

        touch(dir.path(), "main.go");
        let argv = resolve_command(dir.path(), "notes.txt", &[]).await.unwrap();
        assert_eq!(
            argv,
            Some(vec!["go".to_string(), "run".to_string(), "main.go".to_string()])
        );
    }
}
