use depot_schema::LOCAL_MANIFEST_PATH;
use dirs::home_dir;
use std::path::{Path, PathBuf};

/// Returns the configuration directory, or None if the user's home cannot be resolved.
///
/// `DEPOT_HOME` overrides the default of `~/.depot`.
pub fn try_depot_home() -> Option<PathBuf> {
    if let Ok(val) = std::env::var("DEPOT_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".depot"))
}

/// Default config file: ~/.depot/config.toml
pub fn default_config_path() -> Option<PathBuf> {
    try_depot_home().map(|h| h.join("config.toml"))
}

/// Persisted local manifest of an installation root.
pub fn local_manifest_path(root: &Path) -> PathBuf {
    root.join(LOCAL_MANIFEST_PATH)
}

/// Absolute location of a manifest path below `root`.
///
/// Manifest paths are normalised to `/` separators and never escape the root.
pub fn install_path(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}
