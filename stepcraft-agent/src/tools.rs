//! Built-in filesystem tools
//!
//! Paths are resolved against a workspace root; absolute paths and `..`
//! components are rejected, and symlinks are followed before the
//! containment check so an agent cannot reach outside the root.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use stepcraft_vm::tool::required_str;
use stepcraft_vm::{Tool, ToolInput, ToolRegistry, ToolResult};
use tokio::io::AsyncReadExt;
use tracing::debug;

/// Files larger than this are truncated when read
const MAX_READ_BYTES: usize = 256 * 1024;

fn outside(relative: &str) -> ToolResult {
    ToolResult::failed(format!("Path must stay inside the workspace: {}", relative))
}

/// Real path of `relative` under `root`, with symlinks resolved.
///
/// The target need not exist: the deepest existing ancestor is canonicalized
/// and the missing tail re-appended, which is only plain names.
async fn resolve(root: &Path, relative: &str) -> Result<PathBuf, ToolResult> {
    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(outside(relative));
    }

    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|e| ToolResult::failed(format!("Workspace {} unavailable: {}", root.display(), e)))?;

    let mut existing = root.join(path);
    let mut missing = Vec::new();
    let real = loop {
        match tokio::fs::canonicalize(&existing).await {
            Ok(real) => break real,
            // A dangling link would be followed on write
            Err(_) if tokio::fs::symlink_metadata(&existing).await.is_ok() => {
                return Err(outside(relative));
            }
            Err(_) => match (existing.file_name(), existing.parent()) {
                (Some(name), Some(parent)) => {
                    missing.push(name.to_os_string());
                    existing = parent.to_path_buf();
                }
                _ => return Err(outside(relative)),
            },
        }
    };
    if !real.starts_with(&root) {
        return Err(outside(relative));
    }
    Ok(missing.iter().rev().fold(real, |path, name| path.join(name)))
}

/// At most `limit` bytes of UTF-8 from `path`, and whether the file was longer
async fn read_limited(path: &Path, limit: usize) -> std::io::Result<(String, bool)> {
    let file = tokio::fs::File::open(path).await?;
    let mut bytes = Vec::new();
    file.take(limit as u64 + 1).read_to_end(&mut bytes).await?;
    let truncated = bytes.len() > limit;
    bytes.truncate(limit);

    match String::from_utf8(bytes) {
        Ok(content) => Ok((content, truncated)),
        // A multi-byte char split by the cut
        Err(e) if truncated && e.utf8_error().error_len().is_none() => {
            let valid = e.utf8_error().valid_up_to();
            let mut bytes = e.into_bytes();
            bytes.truncate(valid);
            let content = String::from_utf8(bytes)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            Ok((content, truncated))
        }
        Err(e) => Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
    }
}

/// Read a UTF-8 file
#[derive(Debug, Clone)]
pub struct ReadFile {
    root: PathBuf,
}

impl ReadFile {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ReadFile {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file. Input: {\"path\": string}"
    }

    async fn call(&self, input: &ToolInput) -> ToolResult {
        let relative = match required_str(input, "path") {
            Ok(path) => path,
            Err(failed) => return failed,
        };
        let path = match resolve(&self.root, relative).await {
            Ok(path) => path,
            Err(failed) => return failed,
        };

        debug!(path = %path.display(), "read_file");
        match read_limited(&path, MAX_READ_BYTES).await {
            Ok((content, truncated)) => {
                let lines = content.lines().count();
                let mut summary = format!("Read {} ({} lines)", relative, lines);
                if truncated {
                    summary.push_str(", truncated");
                }
                ToolResult::ok(summary, content)
            }
            Err(e) => ToolResult::failed(format!("Failed to read {}: {}", relative, e)),
        }
    }
}

/// List a directory, one entry per line, directories suffixed with `/`
#[derive(Debug, Clone)]
pub struct ListDir {
    root: PathBuf,
}

impl ListDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for ListDir {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List a directory. Input: {\"path\": string} (defaults to the workspace root)"
    }

    async fn call(&self, input: &ToolInput) -> ToolResult {
        let relative = input.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let path = match resolve(&self.root, relative).await {
            Ok(path) => path,
            Err(failed) => return failed,
        };

        match list_entries(&path).await {
            Ok(entries) => ToolResult::ok(
                format!("{} entries in {}", entries.len(), relative),
                entries.join("\n"),
            ),
            Err(e) => ToolResult::failed(format!("Failed to list {}: {}", relative, e)),
        }
    }
}

async fn list_entries(path: &Path) -> std::io::Result<Vec<String>> {
    let mut dir = tokio::fs::read_dir(path).await?;
    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await?.is_dir() {
            name.push('/');
        }
        entries.push(name);
    }
    entries.sort();
    Ok(entries)
}

/// Write a file, creating parent directories as needed
#[derive(Debug, Clone)]
pub struct WriteFile {
    root: PathBuf,
}

impl WriteFile {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Tool for WriteFile {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a text file. Input: {\"path\": string, \"content\": string}"
    }

    async fn call(&self, input: &ToolInput) -> ToolResult {
        let (relative, content) = match (required_str(input, "path"), required_str(input, "content")) {
            (Ok(path), Ok(content)) => (path, content),
            (Err(failed), _) | (_, Err(failed)) => return failed,
        };
        let path = match resolve(&self.root, relative).await {
            Ok(path) => path,
            Err(failed) => return failed,
        };

        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return ToolResult::failed(format!("Failed to create {}: {}", parent.display(), e));
            }
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => ToolResult::ok(format!("Wrote {} bytes to {}", content.len(), relative), ""),
            Err(e) => ToolResult::failed(format!("Failed to write {}: {}", relative, e)),
        }
    }
}

/// Registry holding every built-in tool, rooted at `root`
pub fn builtin_tools(root: impl Into<PathBuf>) -> stepcraft_vm::Result<ToolRegistry> {
    let root = root.into();
    ToolRegistry::new()
        .with_tool(Arc::new(ReadFile::new(root.clone())))?
        .with_tool(Arc::new(ListDir::new(root.clone())))?
        .with_tool(Arc::new(WriteFile::new(root)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepcraft_vm::ToolDispatcher;

    fn input(value: serde_json::Value) -> ToolInput {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "one\ntwo\n").unwrap();

        let result = ReadFile::new(dir.path()).call(&input(json!({"path": "notes.txt"}))).await;
        assert!(result.success);
        assert_eq!(result.summary, "Read notes.txt (2 lines)");
        assert_eq!(result.full_result, "one\ntwo\n");

        let missing = ReadFile::new(dir.path()).call(&input(json!({"path": "nope.txt"}))).await;
        assert!(!missing.success);
        assert!(missing.summary.starts_with("Failed to read nope.txt"));
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ReadFile::new(dir.path());

        for path in ["../secret", "/etc/passwd", "a/../../b"] {
            let result = tool.call(&input(json!({ "path": path }))).await;
            assert!(!result.success, "{} should be rejected", path);
        }
    }

    #[tokio::test]
    async fn test_large_files_are_cut_at_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = "a".repeat(MAX_READ_BYTES - 1);
        content.push_str("é and more");
        std::fs::write(dir.path().join("big.txt"), &content).unwrap();

        let result = ReadFile::new(dir.path()).call(&input(json!({"path": "big.txt"}))).await;
        assert!(result.success);
        assert_eq!(result.summary, "Read big.txt (1 lines), truncated");
        assert_eq!(result.full_result.len(), MAX_READ_BYTES - 1);
        assert!(result.full_result.bytes().all(|b| b == b'a'));

        std::fs::write(dir.path().join("exact.txt"), "b".repeat(MAX_READ_BYTES)).unwrap();
        let exact = ReadFile::new(dir.path()).call(&input(json!({"path": "exact.txt"}))).await;
        assert_eq!(exact.summary, "Read exact.txt (1 lines)");
        assert_eq!(exact.full_result.len(), MAX_READ_BYTES);
    }

    #[tokio::test]
    async fn test_binary_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x00]).unwrap();

        let result = ReadFile::new(dir.path()).call(&input(json!({"path": "blob.bin"}))).await;
        assert!(!result.success);
        assert!(result.summary.starts_with("Failed to read blob.bin"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_cannot_escape_workspace() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "hunter2").unwrap();
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path().join("secret.txt"), dir.path().join("link.txt")).unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("elsewhere")).unwrap();
        std::fs::write(dir.path().join("real.txt"), "fine").unwrap();
        std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("alias.txt")).unwrap();

        let tools = builtin_tools(dir.path()).unwrap();
        let read = tools.execute("read_file", &input(json!({"path": "link.txt"}))).await;
        assert!(!read.success);
        assert!(read.summary.starts_with("Path must stay inside the workspace"));

        let listed = tools.execute("list_dir", &input(json!({"path": "elsewhere"}))).await;
        assert!(!listed.success);

        let written = tools
            .execute("write_file", &input(json!({"path": "elsewhere/new/x.txt", "content": "pwned"})))
            .await;
        assert!(!written.success);
        assert!(!outside.path().join("new").exists());

        std::os::unix::fs::symlink(outside.path().join("later.txt"), dir.path().join("dangling.txt")).unwrap();
        let dangling = tools
            .execute("write_file", &input(json!({"path": "dangling.txt", "content": "pwned"})))
            .await;
        assert!(!dangling.success);
        assert!(!outside.path().join("later.txt").exists());

        let inside = tools.execute("read_file", &input(json!({"path": "alias.txt"}))).await;
        assert!(inside.success);
        assert_eq!(inside.full_result, "fine");
    }

    #[tokio::test]
    async fn test_missing_path_field() {
        let dir = tempfile::tempdir().unwrap();
        let result = ReadFile::new(dir.path()).call(&ToolInput::new()).await;
        assert!(!result.success);
        assert!(result.summary.contains("'path'"));
    }

    #[tokio::test]
    async fn test_write_then_list() {
        let dir = tempfile::tempdir().unwrap();
        let tools = builtin_tools(dir.path()).unwrap();

        let written = tools
            .execute("write_file", &input(json!({"path": "out/report.md", "content": "# hi"})))
            .await;
        assert!(written.success);
        assert_eq!(written.summary, "Wrote 4 bytes to out/report.md");
        assert_eq!(std::fs::read_to_string(dir.path().join("out/report.md")).unwrap(), "# hi");

        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let listed = tools.execute("list_dir", &ToolInput::new()).await;
        assert!(listed.success);
        assert_eq!(listed.full_result, "a.txt\nout/");
    }

    #[test]
    fn test_builtin_registry_names() {
        let tools = builtin_tools(".").unwrap();
        assert_eq!(tools.names(), vec!["list_dir", "read_file", "write_file"]);
    }
}
