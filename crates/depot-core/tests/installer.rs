mod common;

use common::{FakeProvider, manifest};
use depot_core::install::{installed_version, load_local_manifest, verify_installation};
use depot_core::{InstallError, InstallOptions, InstallPhase, Installer, NullReporter, RetryPolicy, UpdateOutcome};
use depot_schema::{Arch, BuildVersion, Os, Platform, Sha1Hash};
use std::path::Path;
use tokio_util::sync::CancellationToken;

const BASE: u32 = 481;
const OVERLAY: u32 = 482;
const LINUX: Platform = Platform::new(Os::Linux, Arch::X64);

fn version(s: &str) -> BuildVersion {
    s.parse().unwrap()
}

fn options(root: &Path, trusted: &str) -> InstallOptions {
    InstallOptions {
        root: root.to_path_buf(),
        trusted_version: version(trusted),
        allow_newer: false,
        platform: LINUX,
    }
}

async fn run(provider: &FakeProvider, options: InstallOptions) -> (Result<UpdateOutcome, InstallError>, InstallPhase) {
    let client = provider.client(RetryPolicy::immediate(3));
    let mut installer = Installer::new(client, options, NullReporter);
    let result = installer.run(&CancellationToken::new()).await;
    (result, installer.phase())
}

/// Base depot with a binary, a data file and the version marker, plus an
/// overlay depot that replaces the data file.
fn publish_v1(provider: &FakeProvider) {
    let base = manifest(
        &["bin", "data"],
        vec![
            provider.file_with_mode(BASE, "bin/game", &[b"ELF-", b"main"], true),
            provider.file(BASE, "data/level.pak", &[b"base-level"]),
            provider.file(BASE, "data/extra.pak", &[b"extra"]),
            provider.file(BASE, "Build.version", &[b"1.0.0\n"]),
        ],
    );
    let overlay = manifest(&["data"], vec![provider.file(OVERLAY, "data/level.pak", &[b"AAAA", b"BBBB"])]);
    provider.publish(LINUX, BASE, 1, base);
    provider.publish(LINUX, OVERLAY, 1, overlay);
}

#[tokio::test]
async fn fresh_install_writes_merged_tree() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(&["cdn1", "cdn2"]);
    publish_v1(&provider);

    let (result, phase) = run(&provider, options(dir.path(), "1.0.0")).await;

    let UpdateOutcome::Applied { from, to, stats } = result.unwrap() else {
        panic!("expected an applied update");
    };
    assert_eq!(phase, InstallPhase::Applied);
    assert_eq!(from, None);
    assert_eq!(to, version("1.0.0"));
    assert_eq!(stats.files_patched, 4);

    assert_eq!(std::fs::read(dir.path().join("bin/game")).unwrap(), b"ELF-main");
    // Overlay wins over base for the same path.
    assert_eq!(std::fs::read(dir.path().join("data/level.pak")).unwrap(), b"AAAABBBB");
    assert_eq!(std::fs::read(dir.path().join("Build.version")).unwrap(), b"1.0.0\n");

    let local = load_local_manifest(dir.path()).await.unwrap().unwrap();
    assert_eq!(local.file_count(), 4);
    assert_eq!(local.file("data/level.pak").unwrap().depot_id, OVERLAY);
    assert_eq!(installed_version(dir.path()).await.unwrap(), Some(version("1.0.0")));
    assert!(verify_installation(dir.path()).await.unwrap().unwrap().is_clean());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(dir.path().join("bin/game")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }
}

#[tokio::test]
async fn single_marker_file_install() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(&["cdn1"]);
    let marker = provider.file(BASE, "Build.version", &[b"1.0.0"]);
    provider.publish(LINUX, BASE, 1, manifest(&[], vec![marker.clone()]));

    let (result, phase) = run(&provider, options(dir.path(), "1.0.0")).await;

    let UpdateOutcome::Applied { from, to, stats } = result.unwrap() else {
        panic!("expected an applied update");
    };
    assert_eq!(phase, InstallPhase::Applied);
    assert_eq!((from, to), (None, version("1.0.0")));
    assert_eq!(stats.files_patched, 1);
    assert_eq!(std::fs::read(dir.path().join("Build.version")).unwrap(), b"1.0.0");

    let local = load_local_manifest(dir.path()).await.unwrap().unwrap();
    assert_eq!(local.file_count(), 1);
    assert_eq!(local.directories().count(), 0);
    assert_eq!(local.file("Build.version"), Some(&marker));
}

#[tokio::test]
async fn update_downloads_only_changed_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(&["cdn1", "cdn2"]);
    publish_v1(&provider);
    run(&provider, options(dir.path(), "2.0.0")).await.0.unwrap();

    let base = manifest(
        &["bin", "data"],
        vec![
            provider.file_with_mode(BASE, "bin/game", &[b"ELF-", b"main"], true),
            provider.file(BASE, "data/level.pak", &[b"base-level"]),
            provider.file(BASE, "Build.version", &[b"1.1.0\n"]),
        ],
    );
    let overlay = manifest(&["data"], vec![provider.file(OVERLAY, "data/level.pak", &[b"AAAA", b"CCCC"])]);
    provider.publish(LINUX, BASE, 2, base);
    provider.publish(LINUX, OVERLAY, 2, overlay);
    provider.cdn.reset_counters();

    let (result, _) = run(&provider, options(dir.path(), "2.0.0")).await;
    let UpdateOutcome::Applied { from, to, stats } = result.unwrap() else {
        panic!("expected an applied update");
    };

    assert_eq!(from, Some(version("1.0.0")));
    assert_eq!(to, version("1.1.0"));
    assert_eq!(stats.files_deleted, 1);
    assert_eq!(stats.files_patched, 2);

    let requested = provider.cdn.requested.lock().unwrap().clone();
    assert!(requested.contains(&Sha1Hash::compute(b"CCCC")));
    assert!(!requested.contains(&Sha1Hash::compute(b"AAAA")));
    assert!(!requested.contains(&Sha1Hash::compute(b"ELF-")));
    // Version probe, new marker and the one changed data chunk.
    assert_eq!(requested.len(), 3);

    assert_eq!(std::fs::read(dir.path().join("data/level.pak")).unwrap(), b"AAAACCCC");
    assert!(!dir.path().join("data/extra.pak").exists());
    assert_eq!(installed_version(dir.path()).await.unwrap(), Some(version("1.1.0")));
}

#[tokio::test]
async fn second_run_is_up_to_date() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(&["cdn1"]);
    publish_v1(&provider);
    run(&provider, options(dir.path(), "1.0.0")).await.0.unwrap();
    provider.cdn.reset_counters();

    let (result, phase) = run(&provider, options(dir.path(), "1.0.0")).await;

    assert_eq!(result.unwrap(), UpdateOutcome::UpToDate { version: version("1.0.0") });
    assert_eq!(phase, InstallPhase::UpToDate);
    // Only the remote version probe.
    assert_eq!(provider.cdn.chunk_requests(), 1);
}

#[tokio::test]
async fn interrupted_install_resumes_without_downloads() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(&["cdn1"]);
    publish_v1(&provider);
    run(&provider, options(dir.path(), "1.0.0")).await.0.unwrap();

    // Files are on disk but the manifest was never committed.
    std::fs::remove_file(depot_core::local_manifest_path(dir.path())).unwrap();
    provider.cdn.reset_counters();

    let (result, _) = run(&provider, options(dir.path(), "1.0.0")).await;
    let UpdateOutcome::Applied { stats, .. } = result.unwrap() else {
        panic!("expected an applied update");
    };

    assert_eq!(stats.files_skipped, 4);
    assert_eq!(stats.chunks_fetched, 0);
    assert_eq!(provider.cdn.chunk_requests(), 1);
    assert!(load_local_manifest(dir.path()).await.unwrap().is_some());
}

#[tokio::test]
async fn newer_than_trusted_is_not_installed() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(&["cdn1"]);
    publish_v1(&provider);

    let (result, phase) = run(&provider, options(dir.path(), "0.9.0")).await;

    assert_eq!(
        result.unwrap(),
        UpdateOutcome::NewerThanTrusted {
            remote: version("1.0.0"),
            trusted: version("0.9.0"),
        }
    );
    assert_eq!(phase, InstallPhase::VersionCompared);
    assert!(load_local_manifest(dir.path()).await.unwrap().is_none());
    assert!(!dir.path().join("bin/game").exists());
}

#[tokio::test]
async fn allow_newer_overrides_trust() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(&["cdn1"]);
    publish_v1(&provider);

    let mut opts = options(dir.path(), "0.9.0");
    opts.allow_newer = true;
    let (result, _) = run(&provider, opts).await;

    assert!(matches!(result.unwrap(), UpdateOutcome::Applied { .. }));
    assert!(dir.path().join("bin/game").exists());
}

#[tokio::test]
async fn falls_back_to_reference_platform() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(&["cdn1"]);
    let base = manifest(
        &[],
        vec![
            provider.file(BASE, "game.exe", &[b"MZ"]),
            provider.file(BASE, "Build.version", &[b"3"]),
        ],
    );
    provider.publish(Platform::REFERENCE, BASE, 1, base);

    let (result, _) = run(&provider, options(dir.path(), "3.0.0")).await;

    assert!(matches!(result.unwrap(), UpdateOutcome::Applied { .. }));
    assert_eq!(*provider.control.listed.lock().unwrap(), vec![LINUX, Platform::REFERENCE]);
    assert!(dir.path().join("game.exe").exists());
}

#[tokio::test]
async fn missing_marker_fails() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(&["cdn1"]);
    provider.publish(LINUX, BASE, 1, manifest(&[], vec![provider.file(BASE, "game", &[b"x"])]));

    let (result, phase) = run(&provider, options(dir.path(), "1.0.0")).await;

    assert!(matches!(result, Err(InstallError::MarkerNotFound(_))));
    assert_eq!(phase, InstallPhase::Failed);
}

#[tokio::test]
async fn no_depots_anywhere_fails() {
    let dir = tempfile::tempdir().unwrap();
    let provider = FakeProvider::new(&["cdn1"]);

    let (result, phase) = run(&provider, options(dir.path(), "1.0.0")).await;

    assert!(matches!(result, Err(InstallError::NoDepots(LINUX))));
    assert_eq!(phase, InstallPhase::Failed);
}
