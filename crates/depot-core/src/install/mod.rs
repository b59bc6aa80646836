//! Update pipeline for one installation root.
//!
//! ```text
//! Idle -> Authenticated -> DepotsEnumerated -> ManifestsMerged -> VersionCompared
//!                                                                   |-> UpToDate
//!                                                                   '-> Installing -> Applied
//! (any) -> Failed
//! ```
//!
//! The local manifest is only replaced after every file has been written, so
//! an interrupted run leaves the previous manifest in place and the next run
//! resumes by skipping files whose hash already matches.

pub mod apply;
pub mod store;
pub mod verify;

pub use apply::{ApplyStats, ChunkSource, apply_change_set};
pub use store::{load_local_manifest, save_local_manifest};
pub use verify::{FileProblem, VerifyReport, installed_version, verify_installation};

use crate::client::ContentClient;
use crate::error::InstallError;
use crate::reporter::Reporter;
use depot_schema::{
    BuildVersion, ChangeSet, DepotId, DepotKey, Manifest, ManifestMerger, Platform, VERSION_MARKER,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Where the installer is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    Idle,
    Authenticated,
    DepotsEnumerated,
    ManifestsMerged,
    VersionCompared,
    UpToDate,
    Installing,
    Applied,
    Failed,
}

/// What to install and how far to trust the remote.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Installation root.
    pub root: PathBuf,
    /// Newest build this client is allowed to install.
    pub trusted_version: BuildVersion,
    /// Install builds newer than `trusted_version` anyway.
    pub allow_newer: bool,
    /// Platform to request depots for.
    pub platform: Platform,
}

impl InstallOptions {
    /// Options for the running platform, refusing untrusted builds.
    pub fn new(root: impl Into<PathBuf>, trusted_version: BuildVersion) -> Self {
        Self {
            root: root.into(),
            trusted_version,
            allow_newer: false,
            platform: Platform::current(),
        }
    }
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The installed build already matches the remote one.
    UpToDate { version: BuildVersion },
    /// The remote build is newer than trusted and was not installed.
    NewerThanTrusted {
        remote: BuildVersion,
        trusted: BuildVersion,
    },
    /// The remote build was installed.
    Applied {
        from: Option<BuildVersion>,
        to: BuildVersion,
        stats: ApplyStats,
    },
}

/// Drives one update of an installation root.
pub struct Installer<R: Reporter> {
    client: Arc<ContentClient>,
    options: InstallOptions,
    reporter: R,
    phase: InstallPhase,
}

impl<R: Reporter> Installer<R> {
    /// Prepare an update; nothing happens until [`run`](Self::run).
    pub fn new(client: Arc<ContentClient>, options: InstallOptions, reporter: R) -> Self {
        Self {
            client,
            options,
            reporter,
            phase: InstallPhase::Idle,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    /// Run the pipeline to completion.
    ///
    /// # Errors
    ///
    /// Any session, fetch, version, or filesystem failure. The installer is
    /// left in [`InstallPhase::Failed`].
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<UpdateOutcome, InstallError> {
        match self.run_pipeline(cancel).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.transition(InstallPhase::Failed);
                self.reporter.error(&e.to_string());
                Err(e)
            }
        }
    }

    fn transition(&mut self, next: InstallPhase) {
        tracing::debug!(from = ?self.phase, to = ?next, "Installer transition");
        self.phase = next;
        self.reporter.phase(next);
    }

    async fn run_pipeline(&mut self, cancel: &CancellationToken) -> Result<UpdateOutcome, InstallError> {
        let started = Instant::now();
        let root = self.options.root.clone();

        self.client.connect().await?;
        self.client.authenticate().await?;
        self.transition(InstallPhase::Authenticated);

        let depots = self.client.enumerate_eligible_depots(self.options.platform).await?;
        if depots.is_empty() {
            return Err(InstallError::NoDepots(self.options.platform));
        }
        tracing::info!(count = depots.len(), "Eligible depots");
        self.transition(InstallPhase::DepotsEnumerated);

        let manifests = self.client.fetch_manifests(&depots, cancel).await?;
        let target = manifests.into_iter().collect::<ManifestMerger>().build();
        self.transition(InstallPhase::ManifestsMerged);

        let keys: HashMap<DepotId, DepotKey> = depots
            .iter()
            .map(|d| (d.id, d.decryption_key.clone()))
            .collect();

        let local = load_local_manifest(&root).await?;
        let installed = match &local {
            Some(manifest) => verify::read_marker(&root, manifest).await,
            None => None,
        };
        let remote = self.remote_version(&target, &keys, cancel).await?;
        self.transition(InstallPhase::VersionCompared);

        let trusted = &self.options.trusted_version;
        if remote > *trusted {
            if !self.options.allow_newer {
                self.reporter.warning(&format!(
                    "Remote build {remote} is newer than trusted {trusted}; not installing"
                ));
                return Ok(UpdateOutcome::NewerThanTrusted {
                    remote,
                    trusted: trusted.clone(),
                });
            }
            self.reporter.warning(&format!(
                "Remote build {remote} is newer than trusted {trusted}; installing anyway"
            ));
        }

        if installed.as_ref() == Some(&remote) {
            self.reporter.info(&format!("Build {remote} is already installed"));
            self.transition(InstallPhase::UpToDate);
            return Ok(UpdateOutcome::UpToDate { version: remote });
        }

        let changes = ChangeSet::compute(local.as_ref(), target);
        self.reporter
            .update_available(installed.as_ref(), &remote, changes.download_size());
        self.transition(InstallPhase::Installing);

        let stats = apply_change_set(
            &root,
            &changes,
            &keys,
            self.client.as_ref(),
            &self.reporter,
            cancel,
        )
        .await?;
        save_local_manifest(&root, &changes.new_manifest).await?;

        self.transition(InstallPhase::Applied);
        self.reporter.summary(&stats, started.elapsed().as_secs_f64());
        Ok(UpdateOutcome::Applied {
            from: installed,
            to: remote,
            stats,
        })
    }

    async fn remote_version(
        &self,
        target: &Manifest,
        keys: &HashMap<DepotId, DepotKey>,
        cancel: &CancellationToken,
    ) -> Result<BuildVersion, InstallError> {
        let marker = target
            .find_by_file_name(VERSION_MARKER)
            .ok_or_else(|| InstallError::MarkerNotFound(VERSION_MARKER.to_string()))?;
        let key = keys
            .get(&marker.depot_id)
            .ok_or(InstallError::MissingKey(marker.depot_id))?;

        let bytes = self.client.fetch_file_bytes(marker, key, cancel).await?;
        Ok(BuildVersion::from_marker(&bytes)?)
    }
}
