//! Tar packaging of a unit directory

use crate::error::{Result, TransferError};
use crate::utils::{remove_path, resolve_binary, run_tool};
use std::path::{Path, PathBuf};

/// Compresses unit directories with the external `tar` binary
#[derive(Clone, Debug)]
pub struct TarPacker {
    binary_path: PathBuf,
}

impl TarPacker {
    /// Create a packer with an explicit binary path
    pub fn new(binary_path: PathBuf) -> Self {
        Self { binary_path }
    }

    /// Attempt to find tar in PATH
    pub fn from_path() -> Option<Self> {
        which::which("tar").ok().map(Self::new)
    }

    /// Resolve tar from an optional explicit path
    pub fn resolve(explicit: Option<&Path>, search_path: bool) -> Result<Self> {
        resolve_binary("tar", explicit, search_path).map(Self::new)
    }

    /// Archive file name of a unit
    pub fn archive_name(unit: &str) -> String {
        format!("{}.tar.gz", unit)
    }

    /// Compress `<parent>/<unit>` into `archive`
    ///
    /// Entries inside the archive are rooted at `./<unit>`. A failed run leaves
    /// no archive behind.
    pub async fn pack(
        &self,
        parent: &Path,
        unit: &str,
        archive: &Path,
    ) -> std::result::Result<(), TransferError> {
        let member = format!("./{}", unit);
        let args: Vec<&std::ffi::OsStr> = vec![
            "-czf".as_ref(),
            archive.as_os_str(),
            "-C".as_ref(),
            parent.as_os_str(),
            member.as_ref(),
        ];
        if let Err(e) = run_tool("tar", &self.binary_path, args).await {
            let _ = remove_path(archive).await;
            return Err(TransferError::Pack {
                unit: unit.to_string(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }
}
