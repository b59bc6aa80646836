//! depot - diff-and-apply installer
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Keeps a directory in sync with the depots an application publishes for a
//! platform.
//!
//! # Overview
//!
//! `depot update` logs in to the content provider, merges the manifests of
//! every eligible depot, compares the published build against the installed
//! one, and downloads only the chunks that changed. The installed snapshot is
//! recorded in `<root>/.depot/manifest.json`.
//!
//! # Configuration
//!
//! ```text
//! ~/.depot/
//! └── config.toml   # app id, control plane URL, pool and retry settings
//! ```
//!
//! `DEPOT_HOME` relocates the directory; `DEPOT_ACCOUNT` and `DEPOT_SECRET`
//! select a named account instead of an anonymous session.

pub mod cmd;
pub mod ui;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use depot_core::{DepotConfig, default_config_path};
use depot_schema::{AppId, Arch, BuildVersion, Os};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "depot")]
#[command(author, version, about = "depot - diff-and-apply installer for depot content")]
pub struct Cli {
    /// Configuration file (defaults to ~/.depot/config.toml)
    #[arg(long, global = true, env = "DEPOT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Install or update a directory to the latest published build
    Update(UpdateArgs),
    /// Show the build installed in a directory
    Status {
        /// Installation directory
        #[arg(long)]
        root: PathBuf,
    },
    /// Check installed files against the local manifest
    Verify {
        /// Installation directory
        #[arg(long)]
        root: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    /// Installation directory
    #[arg(long)]
    pub root: PathBuf,

    /// Newest build this client trusts (e.g. 1.7.1)
    #[arg(long, env = "DEPOT_TRUSTED_VERSION")]
    pub trusted_version: BuildVersion,

    /// Install builds newer than the trusted version anyway
    #[arg(long)]
    pub allow_newer: bool,

    /// Application id (overrides the config file)
    #[arg(long)]
    pub app: Option<AppId>,

    /// Control plane URL (overrides the config file)
    #[arg(long, env = "DEPOT_CONTROL_URL")]
    pub control_url: Option<String>,

    /// Target operating system (defaults to the running one)
    #[arg(long)]
    pub os: Option<Os>,

    /// Target architecture (defaults to the running one)
    #[arg(long)]
    pub arch: Option<Arch>,
}

/// Load the configuration from `path`, or from the default location.
pub fn load_config(path: Option<&Path>) -> Result<DepotConfig> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => match default_config_path() {
            Some(path) => path,
            None => {
                tracing::warn!("Cannot resolve home directory, using default configuration");
                return Ok(DepotConfig::default());
            }
        },
    };
    Ok(DepotConfig::load(&path)?)
}

/// User Agent string (re-exported from depot_core)
pub use depot_core::USER_AGENT;
