//! Reporter trait for dependency injection
//!
//! Lets the installer report progress without being coupled to a specific
//! terminal or GUI front end.

use crate::install::{ApplyStats, InstallPhase};
use depot_schema::BuildVersion;

pub trait Reporter: Send + Sync {
    /// The installer entered a new state.
    fn phase(&self, phase: InstallPhase);

    /// A newer build than the installed one is about to be applied.
    fn update_available(&self, installed: Option<&BuildVersion>, remote: &BuildVersion, download_size: u64);

    /// A file is about to be written. `chunks` is the number of chunks to fetch.
    fn patching(&self, path: &str, chunks: usize);

    /// One chunk of `path` was downloaded and written.
    fn chunk_fetched(&self, path: &str, current: usize, total: usize);

    /// A file already matched its target hash and was left untouched.
    fn skipped(&self, path: &str);

    /// A file or directory is being removed.
    fn removing(&self, path: &str);

    /// Log an informational message.
    fn info(&self, msg: &str);

    /// Log a warning message.
    fn warning(&self, msg: &str);

    /// Log an error message.
    fn error(&self, msg: &str);

    /// Display a final summary of an applied update.
    fn summary(&self, stats: &ApplyStats, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn phase(&self, phase: InstallPhase) {
        (**self).phase(phase)
    }
    fn update_available(&self, installed: Option<&BuildVersion>, remote: &BuildVersion, download_size: u64) {
        (**self).update_available(installed, remote, download_size)
    }
    fn patching(&self, path: &str, chunks: usize) {
        (**self).patching(path, chunks)
    }
    fn chunk_fetched(&self, path: &str, current: usize, total: usize) {
        (**self).chunk_fetched(path, current, total)
    }
    fn skipped(&self, path: &str) {
        (**self).skipped(path)
    }
    fn removing(&self, path: &str) {
        (**self).removing(path)
    }
    fn info(&self, msg: &str) {
        (**self).info(msg)
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg)
    }
    fn error(&self, msg: &str) {
        (**self).error(msg)
    }
    fn summary(&self, stats: &ApplyStats, elapsed_secs: f64) {
        (**self).summary(stats, elapsed_secs)
    }
}

/// A no-op reporter for silent operations (e.g., verification, testing).
#[derive(Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn phase(&self, _: InstallPhase) {}
    fn update_available(&self, _: Option<&BuildVersion>, _: &BuildVersion, _: u64) {}
    fn patching(&self, _: &str, _: usize) {}
    fn chunk_fetched(&self, _: &str, _: usize, _: usize) {}
    fn skipped(&self, _: &str) {}
    fn removing(&self, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: &ApplyStats, _: f64) {}
}

/// Forwards every event to `tracing`.
#[derive(Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn phase(&self, phase: InstallPhase) {
        tracing::debug!(?phase, "Installer phase");
    }
    fn update_available(&self, installed: Option<&BuildVersion>, remote: &BuildVersion, download_size: u64) {
        match installed {
            Some(installed) => tracing::info!(%installed, %remote, download_size, "Update available"),
            None => tracing::info!(%remote, download_size, "Fresh install"),
        }
    }
    fn patching(&self, path: &str, chunks: usize) {
        tracing::info!(path, chunks, "Patching");
    }
    fn chunk_fetched(&self, path: &str, current: usize, total: usize) {
        tracing::trace!(path, current, total, "Chunk written");
    }
    fn skipped(&self, path: &str) {
        tracing::debug!(path, "Already up to date");
    }
    fn removing(&self, path: &str) {
        tracing::info!(path, "Removing");
    }
    fn info(&self, msg: &str) {
        tracing::info!("{msg}");
    }
    fn warning(&self, msg: &str) {
        tracing::warn!("{msg}");
    }
    fn error(&self, msg: &str) {
        tracing::error!("{msg}");
    }
    fn summary(&self, stats: &ApplyStats, elapsed_secs: f64) {
        tracing::info!(
            patched = stats.files_patched,
            skipped = stats.files_skipped,
            deleted = stats.files_deleted,
            chunks = stats.chunks_fetched,
            bytes = stats.bytes_written,
            elapsed_secs,
            "Update applied"
        );
    }
}
