//! Utility functions for external tools and filesystem moves

use crate::error::{Error, Result};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Resolve an external binary
///
/// An explicit path wins; otherwise PATH is searched with the `which` crate
/// when `search_path` is enabled.
///
/// # Errors
///
/// Returns [`Error::NotSupported`] when the binary cannot be located.
pub fn resolve_binary(name: &str, explicit: Option<&Path>, search_path: bool) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(Error::NotSupported(format!(
            "{} not found at {}",
            name,
            path.display()
        )));
    }
    if search_path {
        return which::which(name)
            .map_err(|e| Error::NotSupported(format!("{} not found in PATH: {}", name, e)));
    }
    Err(Error::NotSupported(format!(
        "{} path not configured and PATH search disabled",
        name
    )))
}

/// Captured output of a successful tool run
#[derive(Debug)]
pub struct ToolOutput {
    /// Standard output
    pub stdout: Vec<u8>,
    /// Standard error
    pub stderr: Vec<u8>,
}

/// Run an external tool to completion
///
/// A non-zero exit status becomes [`Error::ExternalTool`] carrying the tool
/// name, the exit code and trimmed stderr.
pub async fn run_tool<I, S>(tool: &str, binary: &Path, args: I) -> Result<ToolOutput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = Command::new(binary)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::ExternalTool(format!("Failed to execute {}: {}", tool, e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::ExternalTool(format!(
            "{} exited with {}: {}",
            tool,
            output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string()),
            stderr.trim()
        )));
    }

    Ok(ToolOutput {
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

/// Name for the in-progress copy of a destination entry
pub fn partial_name(name: &str) -> String {
    format!(".{}.partial", name)
}

/// Recursively copy a file or directory tree
pub async fn copy_tree(src: &Path, dest: &Path) -> Result<()> {
    let src = src.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || copy_tree_blocking(&src, &dest))
        .await
        .map_err(|e| Error::Other(format!("copy task failed: {}", e)))?
}

fn copy_tree_blocking(src: &Path, dest: &Path) -> Result<()> {
    if src.is_file() {
        std::fs::copy(src, dest)?;
        return Ok(());
    }
    for entry in walkdir::WalkDir::new(src) {
        let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| Error::Other(e.to_string()))?;
        let target = dest.join(relative);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Remove a file or directory tree if it exists
pub async fn remove_path(path: &Path) -> Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => Ok(tokio::fs::remove_dir_all(path).await?),
        Ok(_) => Ok(tokio::fs::remove_file(path).await?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
