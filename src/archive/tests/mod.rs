// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::test_helpers::{completed_unit, test_config};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Relative paths of every entry under `root`, sorted
fn snapshot(root: &Path) -> Vec<String> {
    let mut entries: Vec<String> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|e| {
            e.unwrap()
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();
    entries.sort();
    entries
}

fn local_porter(output_root: &Path, dest: &Path, mode: PackMode, clean: bool) -> ArchivePorter {
    ArchivePorter::new(
        output_root,
        Box::new(LocalTransport::new(dest)),
        mode,
        clean,
        None,
    )
    .unwrap()
}

async fn incomplete_unit(output_root: &Path, id: &str) -> PathBuf {
    let dir = unit::unit_dir(output_root, id);
    tokio::fs::create_dir_all(&dir).await.unwrap();
    tokio::fs::write(dir.join(format!("{}.mp4", id)), b"media").await.unwrap();
    dir
}

/// Local transport that fails `failures` puts after letting `healthy` through
struct FlakyTransport {
    inner: LocalTransport,
    healthy: AtomicUsize,
    failures: AtomicUsize,
    puts: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for FlakyTransport {
    async fn prepare(&self) -> std::result::Result<(), TransferError> {
        self.inner.prepare().await
    }

    async fn put(
        &self,
        local: &Path,
        name: &str,
        consume: bool,
    ) -> std::result::Result<(), TransferError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        let healthy = self.healthy.load(Ordering::SeqCst);
        if healthy > 0 {
            self.healthy.store(healthy - 1, Ordering::SeqCst);
            return self.inner.put(local, name, consume).await;
        }
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(TransferError::Upload {
                path: local.to_path_buf(),
                destination: self.inner.describe(),
                reason: "connection refused".to_string(),
            });
        }
        self.inner.put(local, name, consume).await
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

// -----------------------------------------------------------------------
// Statistics mode
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_statistics_mode_never_modifies_files() {
    let temp = tempfile::tempdir().unwrap();
    completed_unit(temp.path(), "a", 30).await;
    completed_unit(temp.path(), "b", 12).await;
    incomplete_unit(temp.path(), "c").await;
    let marked = unit::marked_path(&completed_unit(temp.path(), "d", 5).await);
    tokio::fs::rename(unit::unit_dir(temp.path(), "d"), &marked)
        .await
        .unwrap();
    let before = snapshot(temp.path());

    let mut porter = ArchivePorter::statistics(temp.path());
    let report = porter.run_cycle().await;

    assert_eq!(report.transferred, vec!["a", "b"]);
    assert_eq!(report.skipped, 2);
    assert_eq!(porter.state().unit_count(), 2);
    assert_eq!(porter.state().duration_secs(), 42);
    assert_eq!(snapshot(temp.path()), before);

    // Not recounted
    let report = porter.run_cycle().await;
    assert!(report.transferred.is_empty());
    assert_eq!(porter.state().unit_count(), 2);
    assert_eq!(snapshot(temp.path()), before);
}

#[tokio::test]
async fn test_statistics_missing_descriptor_counts_zero_duration() {
    let temp = tempfile::tempdir().unwrap();
    let dir = incomplete_unit(temp.path(), "a").await;
    unit::write_sentinel(&dir).await.unwrap();

    let mut porter = ArchivePorter::statistics(temp.path());
    porter.run_cycle().await;
    assert_eq!(porter.state().unit_count(), 1);
    assert_eq!(porter.state().duration_secs(), 0);
}

#[tokio::test]
async fn test_missing_output_root_is_an_empty_cycle() {
    let temp = tempfile::tempdir().unwrap();
    let mut porter = ArchivePorter::statistics(temp.path().join("not-yet"));
    assert_eq!(porter.run_cycle().await, CycleReport::default());
}

// -----------------------------------------------------------------------
// Transfer modes
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_folder_mode_clean_moves_unit() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let dest = temp.path().join("dest");
    completed_unit(&out, "a", 10).await;

    let mut porter = local_porter(&out, &dest, PackMode::Folder, true);
    let report = porter.run_cycle().await;

    assert_eq!(report.transferred, vec!["a"]);
    assert!(!out.join("a").exists());
    assert!(dest.join("a").join(unit::SENTINEL_FILE).exists());
    assert!(dest.join("a/a.contents.json").exists());
    assert_eq!(porter.state().duration_secs(), 10);

    let report = porter.run_cycle().await;
    assert!(report.transferred.is_empty());
}

#[tokio::test]
async fn test_folder_mode_without_clean_marks_unit() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let dest = temp.path().join("dest");
    completed_unit(&out, "a", 10).await;

    let mut porter = local_porter(&out, &dest, PackMode::Folder, false);
    porter.run_cycle().await;

    assert!(!out.join("a").exists());
    assert!(out.join("a.mark").join(unit::SENTINEL_FILE).exists());
    assert!(dest.join("a/a.contents.json").exists());

    // A fresh porter (no in-memory state) still skips the marked unit
    let mut fresh = local_porter(&out, &dest, PackMode::Folder, false);
    let report = fresh.run_cycle().await;
    assert!(report.transferred.is_empty());
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn test_raw_mode_transfers_files_but_not_sentinel() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let dest = temp.path().join("dest");
    completed_unit(&out, "a", 10).await;

    let mut porter = local_porter(&out, &dest, PackMode::Raw, true);
    let report = porter.run_cycle().await;

    assert_eq!(report.transferred, vec!["a"]);
    assert_eq!(
        snapshot(&dest),
        vec!["a.audio.00001000-00006000.wav", "a.contents.json"]
    );
    assert!(!out.join("a").exists());
}

#[tokio::test]
async fn test_raw_mode_partial_failure_keeps_every_member() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let dest = temp.path().join("dest");
    completed_unit(&out, "a", 10).await;
    let puts = Arc::new(AtomicUsize::new(0));
    // First member lands, the second is refused
    let transport = FlakyTransport {
        inner: LocalTransport::new(&dest),
        healthy: AtomicUsize::new(1),
        failures: AtomicUsize::new(1),
        puts: puts.clone(),
    };
    let mut porter =
        ArchivePorter::new(&out, Box::new(transport), PackMode::Raw, true, None).unwrap();
    let before = snapshot(&out);

    let report = porter.run_cycle().await;
    assert_eq!(report.failed, vec!["a"]);
    assert_eq!(snapshot(&out), before);
    assert!(unit::is_complete(&out.join("a")).await);

    let report = porter.run_cycle().await;
    assert_eq!(report.transferred, vec!["a"]);
    assert_eq!(puts.load(Ordering::SeqCst), 4);
    assert_eq!(
        snapshot(&dest),
        vec!["a.audio.00001000-00006000.wav", "a.contents.json"]
    );
    assert!(!out.join("a").exists());
}

#[tokio::test]
async fn test_tar_mode_end_to_end() {
    let Some(packer) = TarPacker::from_path() else {
        eprintln!("tar not found, skipping");
        return;
    };
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let dest = temp.path().join("dest");
    completed_unit(&out, "a", 10).await;

    let mut porter = ArchivePorter::new(
        &out,
        Box::new(LocalTransport::new(&dest)),
        PackMode::Tar,
        true,
        Some(packer),
    )
    .unwrap();
    let report = porter.run_cycle().await;

    assert_eq!(report.transferred, vec!["a"]);
    assert_eq!(snapshot(&dest), vec!["a.tar.gz"]);
    assert!(!out.join("a").exists(), "unit directory removed");
    assert!(!out.join("a.tar.gz").exists(), "local archive removed");
}

#[tokio::test]
async fn test_tar_mode_requires_packer() {
    let temp = tempfile::tempdir().unwrap();
    let result = ArchivePorter::new(
        temp.path(),
        Box::new(LocalTransport::new(temp.path().join("dest"))),
        PackMode::Tar,
        true,
        None,
    );
    assert!(matches!(result, Err(crate::Error::Config { .. })));
}

// -----------------------------------------------------------------------
// Eligibility and retry
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_unit_without_sentinel_waits() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let dest = temp.path().join("dest");
    let dir = incomplete_unit(&out, "a").await;

    let mut porter = local_porter(&out, &dest, PackMode::Folder, true);
    let report = porter.run_cycle().await;
    assert!(report.transferred.is_empty());
    assert_eq!(report.skipped, 1);
    assert!(dir.join("a.mp4").exists());

    unit::write_sentinel(&dir).await.unwrap();
    let report = porter.run_cycle().await;
    assert_eq!(report.transferred, vec!["a"]);
    assert!(dest.join("a/a.mp4").exists());
}

#[tokio::test]
async fn test_failed_transfer_leaves_unit_and_retries() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let dest = temp.path().join("dest");
    completed_unit(&out, "a", 10).await;
    let puts = Arc::new(AtomicUsize::new(0));
    let transport = FlakyTransport {
        inner: LocalTransport::new(&dest),
        healthy: AtomicUsize::new(0),
        failures: AtomicUsize::new(2),
        puts: puts.clone(),
    };
    let mut porter =
        ArchivePorter::new(&out, Box::new(transport), PackMode::Folder, true, None).unwrap();
    let before = snapshot(&out);

    for _ in 0..2 {
        let report = porter.run_cycle().await;
        assert_eq!(report.failed, vec!["a"]);
        assert_eq!(snapshot(&out), before);
    }

    let report = porter.run_cycle().await;
    assert_eq!(report.transferred, vec!["a"]);
    assert_eq!(puts.load(Ordering::SeqCst), 3);
    assert!(!porter.state().transferred().is_empty());

    porter.run_cycle().await;
    assert_eq!(puts.load(Ordering::SeqCst), 3, "no second transfer");
}

// -----------------------------------------------------------------------
// Construction and daemon
// -----------------------------------------------------------------------

#[test]
fn test_from_config_selects_mode() {
    let temp = tempfile::tempdir().unwrap();
    let config = test_config(temp.path());
    assert!(ArchivePorter::from_config(&config).unwrap().is_statistics());

    let mut config = test_config(temp.path());
    config.archive.enabled = true;
    config.archive.destination = Some(temp.path().join("dest").display().to_string());
    config.archive.pack_mode = PackMode::Folder;
    assert!(!ArchivePorter::from_config(&config).unwrap().is_statistics());

    // Destination equal to the output root means statistics only
    config.archive.destination = Some(temp.path().display().to_string());
    assert!(ArchivePorter::from_config(&config).unwrap().is_statistics());
}

#[test]
fn test_from_config_missing_tar_is_fatal() {
    let temp = tempfile::tempdir().unwrap();
    let mut config = test_config(temp.path());
    config.archive.enabled = true;
    config.archive.destination = Some(temp.path().join("dest").display().to_string());
    config.archive.pack_mode = PackMode::Tar;
    config.tools.tar_path = Some(PathBuf::from("/nonexistent/bin/tar"));
    assert!(matches!(
        ArchivePorter::from_config(&config),
        Err(crate::Error::NotSupported(_))
    ));
}

#[tokio::test]
async fn test_daemon_final_sweep_archives_late_units() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let dest = temp.path().join("dest");
    tokio::fs::create_dir_all(&out).await.unwrap();

    let daemon = ArchiveDaemon::start(
        local_porter(&out, &dest, PackMode::Folder, true),
        Duration::from_secs(3600),
        true,
    );
    // Let the immediate first cycle run on an empty root
    tokio::time::sleep(Duration::from_millis(50)).await;
    completed_unit(&out, "late", 7).await;

    let porter = daemon.stop().await.unwrap();
    assert!(porter.state().contains("late"));
    assert!(dest.join("late").exists());
}

#[tokio::test]
async fn test_daemon_without_final_sweep_leaves_late_units() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let dest = temp.path().join("dest");
    tokio::fs::create_dir_all(&out).await.unwrap();

    let daemon = ArchiveDaemon::start(
        local_porter(&out, &dest, PackMode::Folder, true),
        Duration::from_secs(3600),
        false,
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    completed_unit(&out, "late", 7).await;

    let porter = daemon.stop().await.unwrap();
    assert_eq!(porter.state().unit_count(), 0);
    assert!(out.join("late").exists());
}

#[tokio::test]
async fn test_daemon_stop_now_skips_configured_sweep() {
    let temp = tempfile::tempdir().unwrap();
    let out = temp.path().join("out");
    let dest = temp.path().join("dest");
    tokio::fs::create_dir_all(&out).await.unwrap();

    let daemon = ArchiveDaemon::start(
        local_porter(&out, &dest, PackMode::Folder, true),
        Duration::from_secs(3600),
        true,
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    completed_unit(&out, "late", 7).await;

    let porter = daemon.stop_now().await.unwrap();
    assert_eq!(porter.state().unit_count(), 0);
    assert!(unit::is_complete(&out.join("late")).await);
    assert!(!dest.join("late").exists());
}
