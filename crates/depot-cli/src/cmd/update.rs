//! Update command
use crate::UpdateArgs;
use crate::ui::ConsoleReporter;
use anyhow::{Context, Result, bail};
use crossterm::style::Stylize;
use depot_core::{
    ContentClient, Credentials, DepotConfig, InstallOptions, Installer, Transports, UpdateOutcome,
};
use depot_schema::{Arch, Os, Platform};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Install or update `args.root` to the latest published build.
pub async fn update(mut config: DepotConfig, args: &UpdateArgs, quiet: bool) -> Result<()> {
    if let Some(app) = args.app {
        config.app_id = app;
    }
    if let Some(url) = &args.control_url {
        config.control_url.clone_from(url);
    }
    if config.app_id == 0 {
        bail!("No application id configured (set app_id in the config file or pass --app)");
    }

    let platform = Platform::new(
        args.os.unwrap_or_else(Os::current),
        args.arch.unwrap_or_else(Arch::current),
    );
    let transports = Transports::http(&config).context("Failed to build HTTP client")?;
    let client = Arc::new(ContentClient::new(&config, Credentials::from_env(), transports));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing current writes");
            on_interrupt.cancel();
        }
    });

    let options = InstallOptions {
        root: args.root.clone(),
        trusted_version: args.trusted_version.clone(),
        allow_newer: args.allow_newer,
        platform,
    };

    if !quiet {
        println!(
            "{} app {} for {} into {}",
            "Updating".cyan().bold(),
            config.app_id,
            platform,
            args.root.display()
        );
    }

    let mut installer = Installer::new(client, options, ConsoleReporter::new(quiet));
    let outcome = installer.run(&cancel).await?;

    match outcome {
        UpdateOutcome::UpToDate { version } => {
            if !quiet {
                println!("  {} {} is up to date", "✓".green(), version);
            }
        }
        UpdateOutcome::NewerThanTrusted { remote, trusted } => {
            println!(
                "  {} Build {} is newer than trusted {}; pass --allow-newer to install it",
                "!".yellow(),
                remote,
                trusted
            );
        }
        UpdateOutcome::Applied { from, to, .. } => {
            if !quiet {
                let from = from.map_or_else(|| "nothing".to_string(), |v| v.to_string());
                println!("  {} Updated {} → {}", "✓".green(), from, to.to_string().bold());
            }
        }
    }
    Ok(())
}
