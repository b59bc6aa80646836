//! Verify command
use anyhow::{Result, bail};
use crossterm::style::Stylize;
use depot_core::install::{FileProblem, verify_installation};
use std::path::Path;

/// Hash every installed file of `root` and report differences.
pub async fn verify(root: &Path) -> Result<()> {
    let Some(report) = verify_installation(root).await? else {
        bail!("Nothing installed in {}", root.display());
    };

    for (path, problem) in &report.problems {
        let detail = match problem {
            FileProblem::Missing => "missing".to_string(),
            FileProblem::SizeMismatch { expected, actual } => {
                format!("size {actual}, expected {expected}")
            }
            FileProblem::HashMismatch => "content differs".to_string(),
        };
        println!("  {} {} {}", "✗".red(), path, detail.dark_grey());
    }

    if !report.is_clean() {
        bail!(
            "{} of {} files differ; run `depot update` to repair",
            report.problems.len(),
            report.checked
        );
    }
    println!("  {} {} files verified", "✓".green(), report.checked);
    Ok(())
}
