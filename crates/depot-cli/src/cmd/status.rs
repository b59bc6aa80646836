//! Status command
use crate::ui::format_size;
use anyhow::Result;
use crossterm::style::Stylize;
use depot_core::install::{installed_version, load_local_manifest};
use std::path::Path;

/// Show the build installed in `root`.
pub async fn status(root: &Path) -> Result<()> {
    let Some(manifest) = load_local_manifest(root).await? else {
        println!("Nothing installed in {}", root.display());
        return Ok(());
    };
    let version = installed_version(root).await?;

    println!("{}", root.display().to_string().bold());
    println!(
        "  {:<10} {}",
        "Build".dark_grey(),
        version.map_or_else(|| "unknown".to_string(), |v| v.to_string())
    );
    println!("  {:<10} {}", "Files".dark_grey(), manifest.file_count());
    println!("  {:<10} {}", "Size".dark_grey(), format_size(manifest.total_size()));
    Ok(())
}
