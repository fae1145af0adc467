//! Destination stores
//!
//! Every transport writes under a hidden `.partial` name first and only
//! renames to the final name once the copy or upload reported success, so an
//! interrupted transfer never leaves a half-written entry under its real name.

use crate::error::{Result, TransferError};
use crate::utils::{copy_tree, partial_name, remove_path, resolve_binary, run_tool};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Destination store for archived units
#[async_trait]
pub trait Transport: Send + Sync {
    /// Create the destination root if needed
    async fn prepare(&self) -> std::result::Result<(), TransferError>;

    /// Place the file or directory `local` at the destination as `name`
    ///
    /// An existing entry with the same name is replaced. With `consume` set the
    /// caller no longer needs `local` and the transport may move it instead of
    /// copying.
    async fn put(&self, local: &Path, name: &str, consume: bool)
    -> std::result::Result<(), TransferError>;

    /// Destination description for logs
    fn describe(&self) -> String;
}

/// Local directory destination
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    /// Destination rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Destination root
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn upload_error(&self, local: &Path, reason: impl ToString) -> TransferError {
        TransferError::Upload {
            path: local.to_path_buf(),
            destination: self.root.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn prepare(&self) -> std::result::Result<(), TransferError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| self.upload_error(&self.root, e))
    }

    async fn put(
        &self,
        local: &Path,
        name: &str,
        consume: bool,
    ) -> std::result::Result<(), TransferError> {
        let target = self.root.join(name);
        if consume {
            remove_path(&target)
                .await
                .map_err(|e| self.upload_error(local, e))?;
            match tokio::fs::rename(local, &target).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::CrossesDevices => {
                    debug!(path = %local.display(), "destination on another device, copying");
                }
                Err(e) => return Err(self.upload_error(local, e)),
            }
        }

        let partial = self.root.join(partial_name(name));
        let copy = async {
            remove_path(&partial).await?;
            copy_tree(local, &partial).await?;
            remove_path(&target).await?;
            tokio::fs::rename(&partial, &target).await?;
            if consume {
                remove_path(local).await?;
            }
            Ok::<(), crate::Error>(())
        };
        if let Err(e) = copy.await {
            // Best effort; the next cycle starts from a clean partial anyway
            let _ = remove_path(&partial).await;
            return Err(self.upload_error(local, e));
        }
        Ok(())
    }

    fn describe(&self) -> String {
        self.root.display().to_string()
    }
}

/// Distributed filesystem destination driven through the `hadoop fs` CLI
pub struct HdfsTransport {
    binary_path: PathBuf,
    directory: String,
}

impl HdfsTransport {
    /// Destination directory `directory` (full URI) using the given binary
    pub fn new(binary_path: PathBuf, directory: impl Into<String>) -> Self {
        Self {
            binary_path,
            directory: directory.into().trim_end_matches('/').to_string(),
        }
    }

    /// Resolve `hadoop` from an optional explicit path
    pub fn resolve(explicit: Option<&Path>, search_path: bool, directory: &str) -> Result<Self> {
        resolve_binary("hadoop", explicit, search_path).map(|path| Self::new(path, directory))
    }

    fn remote(&self, name: &str) -> String {
        format!("{}/{}", self.directory, name)
    }

    async fn fs(&self, args: &[&str]) -> Result<()> {
        let mut full = vec!["fs"];
        full.extend_from_slice(args);
        run_tool("hadoop", &self.binary_path, full).await.map(|_| ())
    }

    fn upload_error(&self, local: &Path, reason: impl ToString) -> TransferError {
        TransferError::Upload {
            path: local.to_path_buf(),
            destination: self.directory.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HdfsTransport {
    async fn prepare(&self) -> std::result::Result<(), TransferError> {
        self.fs(&["-mkdir", "-p", self.directory.as_str()])
            .await
            .map_err(|e| self.upload_error(Path::new(&self.directory), e))
    }

    async fn put(
        &self,
        local: &Path,
        name: &str,
        _consume: bool,
    ) -> std::result::Result<(), TransferError> {
        let partial = self.remote(&partial_name(name));
        let target = self.remote(name);
        let local_str = local.to_string_lossy().into_owned();

        // A partial left by an interrupted upload would make -put nest into it
        self.fs(&["-rm", "-r", "-f", partial.as_str()])
            .await
            .map_err(|e| self.upload_error(local, e))?;
        self.fs(&["-put", "-f", local_str.as_str(), partial.as_str()])
            .await
            .map_err(|e| self.upload_error(local, e))?;
        self.fs(&["-rm", "-r", "-f", target.as_str()])
            .await
            .map_err(|e| self.upload_error(local, e))?;
        self.fs(&["-mv", partial.as_str(), target.as_str()])
            .await
            .map_err(|e| self.upload_error(local, e))
    }

    fn describe(&self) -> String {
        self.directory.clone()
    }
}
