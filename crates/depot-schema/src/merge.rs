//! Combine per-depot manifests into one target manifest.
//!
//! Layers are pushed in increasing priority: the depot pushed last overrides
//! every earlier depot for any path they both ship. Directories are always
//! unioned.

use crate::manifest::Manifest;
use std::collections::{BTreeMap, BTreeSet};

/// Ordered stack of manifests, lowest priority first.
#[derive(Debug, Clone, Default)]
pub struct ManifestMerger {
    layers: Vec<Manifest>,
}

impl ManifestMerger {
    /// An empty merger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a manifest with higher priority than everything pushed so far.
    pub fn push(&mut self, manifest: Manifest) -> &mut Self {
        self.layers.push(manifest);
        self
    }

    /// Number of pushed manifests.
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// `true` when nothing has been pushed.
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Fold the layers from highest to lowest priority. The first layer in
    /// that order to introduce a path owns it.
    pub fn build(&self) -> Manifest {
        let mut directories = BTreeSet::new();
        let mut files = BTreeMap::new();

        for layer in self.layers.iter().rev() {
            directories.extend(layer.directory_set().iter().cloned());
            for (path, file) in layer.file_map() {
                files.entry(path.clone()).or_insert_with(|| file.clone());
            }
        }

        Manifest::from_validated(directories, files)
    }
}

impl FromIterator<Manifest> for ManifestMerger {
    fn from_iter<I: IntoIterator<Item = Manifest>>(iter: I) -> Self {
        Self {
            layers: iter.into_iter().collect(),
        }
    }
}
