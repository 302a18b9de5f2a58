//! Gallery construction from a labeled image tree.
//!
//! Layout: `<root>/<label>/<image>`. Each image contributes at most one
//! entry: the first face the extractor reports. Images that cannot be read
//! or contain no face are skipped with a warning; the build only fails when
//! the root itself is missing.

use crate::extractor::FaceExtractor;
use crate::gallery::{Gallery, GalleryError, GalleryStore};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

pub const DEFAULT_DATASET_DIR: &str = "dataset";

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("dataset directory '{0}' not found — create <dataset>/<person>/<image> first")]
    DatasetMissing(PathBuf),
    #[error("failed to list dataset: {0}")]
    Walk(#[from] walkdir::Error),
    #[error(transparent)]
    Gallery(#[from] GalleryError),
}

/// What a build produced, with per-image outcome counts.
#[derive(Debug)]
pub struct BuildOutput {
    pub gallery: Gallery,
    /// Images that yielded an entry.
    pub added: usize,
    /// Images decoded fine but with no detectable face.
    pub skipped: usize,
    /// Images that could not be decoded or encoded.
    pub failed: usize,
}

pub struct GalleryBuilder<'a, E: FaceExtractor> {
    extractor: &'a mut E,
    store: &'a GalleryStore,
}

enum ImageOutcome {
    Added,
    NoFace,
}

impl<'a, E: FaceExtractor> GalleryBuilder<'a, E> {
    pub fn new(extractor: &'a mut E, store: &'a GalleryStore) -> Self {
        Self { extractor, store }
    }

    /// Scan `dataset_root`, extract one vector per usable image and persist the result.
    pub fn build(&mut self, dataset_root: &Path) -> Result<BuildOutput, BuildError> {
        if !dataset_root.is_dir() {
            return Err(BuildError::DatasetMissing(dataset_root.to_path_buf()));
        }

        let mut out = BuildOutput {
            gallery: Gallery::new(),
            added: 0,
            skipped: 0,
            failed: 0,
        };

        for person_dir in sorted_children(dataset_root) {
            let person_dir = match person_dir {
                Ok(dir) => dir,
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(error = %e, "unreadable dataset entry, skipping");
                    continue;
                }
            };
            if !person_dir.file_type().is_dir() {
                continue;
            }
            let label = person_dir.file_name().to_string_lossy().into_owned();

            for entry in sorted_children(person_dir.path()) {
                let entry = match entry {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(label, error = %e, "unreadable dataset entry, skipping");
                        out.failed += 1;
                        continue;
                    }
                };
                if entry.file_type().is_dir() {
                    tracing::debug!(path = %entry.path().display(), "nested directory ignored");
                    continue;
                }

                match self.add_image(&mut out.gallery, &label, entry.path()) {
                    Ok(ImageOutcome::Added) => out.added += 1,
                    Ok(ImageOutcome::NoFace) => out.skipped += 1,
                    Err(reason) => {
                        tracing::warn!(path = %entry.path().display(), error = %reason, "image failed, skipping");
                        out.failed += 1;
                    }
                }
            }
        }

        self.store.save(&out.gallery)?;

        tracing::info!(
            added = out.added,
            skipped = out.skipped,
            failed = out.failed,
            path = %self.store.path().display(),
            "gallery built"
        );
        Ok(out)
    }

    fn add_image(&mut self, gallery: &mut Gallery, label: &str, path: &Path) -> Result<ImageOutcome, String> {
        let image = image::open(path).map_err(|e| e.to_string())?.to_rgb8();

        let faces = self.extractor.detect(&image).map_err(|e| e.to_string())?;
        let Some(first) = faces.first() else {
            tracing::warn!(path = %path.display(), "no face found, skipping");
            return Ok(ImageOutcome::NoFace);
        };

        let vector = self.extractor.encode(&image, first).map_err(|e| e.to_string())?;
        gallery.push(label, vector);

        tracing::info!(
            label,
            file = %path.file_name().unwrap_or_default().to_string_lossy(),
            "added encoding"
        );
        Ok(ImageOutcome::Added)
    }
}

/// Immediate children of `dir`, by name. Symlinked entries are resolved.
fn sorted_children(dir: &Path) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    WalkDir::new(dir)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
}
