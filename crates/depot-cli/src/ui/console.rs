//! Line-oriented progress output for interactive runs.

use super::format_size;
use crossterm::style::Stylize;
use depot_core::Reporter;
use depot_core::install::{ApplyStats, InstallPhase};
use depot_schema::BuildVersion;
use std::io::Write;

/// Prints installer progress to stdout, errors to stderr.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleReporter {
    quiet: bool,
}

impl ConsoleReporter {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl Reporter for ConsoleReporter {
    fn phase(&self, phase: InstallPhase) {
        if self.quiet {
            return;
        }
        let label = match phase {
            InstallPhase::Authenticated => "Connected",
            InstallPhase::DepotsEnumerated => "Depots listed",
            InstallPhase::ManifestsMerged => "Manifests merged",
            InstallPhase::Installing => "Installing",
            _ => return,
        };
        println!("  {}", label.dark_grey());
    }

    fn update_available(&self, installed: Option<&BuildVersion>, remote: &BuildVersion, download_size: u64) {
        let from = installed.map_or_else(|| "nothing".to_string(), ToString::to_string);
        println!(
            "  {} {} {} {} {}",
            "↑".cyan(),
            from.dark_grey(),
            "→".dark_grey(),
            remote.to_string().white().bold(),
            format!("(up to {})", format_size(download_size)).dark_grey()
        );
    }

    fn patching(&self, path: &str, chunks: usize) {
        if self.quiet {
            return;
        }
        if chunks == 0 {
            println!("{}", progress_line(path, 0, 0));
        } else {
            print!("{}", progress_line(path, 0, chunks));
            let _ = std::io::stdout().flush();
        }
    }

    fn chunk_fetched(&self, path: &str, current: usize, total: usize) {
        if self.quiet {
            return;
        }
        print!("\r{}", progress_line(path, current, total));
        if current >= total {
            println!();
        }
        let _ = std::io::stdout().flush();
    }

    fn skipped(&self, path: &str) {
        tracing::debug!(path, "Unchanged on disk");
    }

    fn removing(&self, path: &str) {
        if !self.quiet {
            println!("  {} {}", "-".red(), path);
        }
    }

    fn info(&self, msg: &str) {
        if !self.quiet {
            println!("  {msg}");
        }
    }

    fn warning(&self, msg: &str) {
        eprintln!("  {} {msg}", "!".yellow());
    }

    fn error(&self, msg: &str) {
        eprintln!("  {} {msg}", "✗".red());
    }

    fn summary(&self, stats: &ApplyStats, elapsed_secs: f64) {
        println!(
            "  {} {} written, {} unchanged, {} removed {}",
            "✓".green(),
            stats.files_patched,
            stats.files_skipped,
            stats.files_deleted,
            format!(
                "({} in {} chunks, {elapsed_secs:.1}s)",
                format_size(stats.bytes_written),
                stats.chunks_fetched
            )
            .dark_grey()
        );
    }
}

/// `  ↓ path  current/total chunks`, rewritten in place as chunks arrive.
fn progress_line(path: &str, current: usize, total: usize) -> String {
    format!(
        "  {} {} {}",
        "↓".cyan(),
        path,
        format!("{current}/{total} chunks").dark_grey()
    )
}
