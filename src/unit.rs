//! Archive unit layout on the local output root
//!
//! `<output_root>/<item_id>/` holds the media artifacts of one item, its
//! JSON content descriptor and, once everything is on disk, a zero-byte
//! `_SUCCESS` sentinel. The sentinel is the only handoff between the fetch
//! domain (sole writer before it exists) and the archive domain (sole
//! reader/mover after it exists).

use crate::error::Result;
use std::path::{Path, PathBuf};

/// Completion sentinel file name
pub const SENTINEL_FILE: &str = "_SUCCESS";

/// Suffix of a unit directory that was already transferred and kept
pub const TRANSFERRED_SUFFIX: &str = ".mark";

/// Directory of an item under the output root
pub fn unit_dir(output_root: &Path, item_id: &str) -> PathBuf {
    output_root.join(item_id)
}

/// Content descriptor path of an item
pub fn descriptor_path(unit_dir: &Path, item_id: &str) -> PathBuf {
    unit_dir.join(format!("{}.contents.json", item_id))
}

/// Does the unit carry the completion sentinel?
pub async fn is_complete(unit_dir: &Path) -> bool {
    tokio::fs::try_exists(unit_dir.join(SENTINEL_FILE))
        .await
        .unwrap_or(false)
}

/// Does the directory name carry the transferred marker?
pub fn is_marked(name: &str) -> bool {
    name.ends_with(TRANSFERRED_SUFFIX)
}

/// Create the sentinel
///
/// Must be the last write into the unit.
pub async fn write_sentinel(unit_dir: &Path) -> Result<()> {
    tokio::fs::File::create(unit_dir.join(SENTINEL_FILE)).await?;
    Ok(())
}

/// Marked name of a transferred unit directory
pub fn marked_path(unit_dir: &Path) -> PathBuf {
    let mut name = unit_dir.as_os_str().to_owned();
    name.push(TRANSFERRED_SUFFIX);
    PathBuf::from(name)
}
