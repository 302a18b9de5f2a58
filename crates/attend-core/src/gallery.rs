//! Reference gallery and its on-disk store.
//!
//! The gallery is persisted as a single bincode blob holding two parallel
//! sequences, vectors and labels. The format is private to this crate and
//! carries no version tag.

use crate::types::FeatureVector;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_GALLERY_PATH: &str = "encodings/encodings.bin";

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery not found: {0} — run `attend encode` first")]
    Missing(PathBuf),
    #[error("gallery {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("gallery io: {0}")]
    Io(#[from] std::io::Error),
    #[error("gallery encode: {0}")]
    Encode(#[from] bincode::Error),
}

/// Labeled reference vectors. `vectors` and `labels` always have equal length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gallery {
    vectors: Vec<FeatureVector>,
    labels: Vec<String>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a gallery from parallel sequences. Returns `None` if the lengths differ.
    pub fn from_parts(vectors: Vec<FeatureVector>, labels: Vec<String>) -> Option<Self> {
        (vectors.len() == labels.len()).then_some(Self { vectors, labels })
    }

    pub fn push(&mut self, label: impl Into<String>, vector: FeatureVector) {
        self.vectors.push(vector);
        self.labels.push(label.into());
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Iterate `(label, vector)` pairs in gallery order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &FeatureVector)> {
        self.labels.iter().map(String::as_str).zip(self.vectors.iter())
    }
}

#[derive(Serialize, Deserialize)]
struct GalleryBlob {
    vectors: Vec<Vec<f32>>,
    labels: Vec<String>,
}

/// Loads and saves the gallery blob at a fixed path.
#[derive(Debug, Clone)]
pub struct GalleryStore {
    path: PathBuf,
}

impl GalleryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the gallery, creating the parent directory and replacing any previous blob.
    pub fn save(&self, gallery: &Gallery) -> Result<(), GalleryError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let blob = GalleryBlob {
            vectors: gallery.vectors.iter().map(|v| v.values().to_vec()).collect(),
            labels: gallery.labels.clone(),
        };
        let bytes = bincode::serialize(&blob)?;
        fs::write(&self.path, bytes)?;

        tracing::info!(
            path = %self.path.display(),
            entries = gallery.len(),
            "gallery saved"
        );
        Ok(())
    }

    /// Fail with `Missing` when nothing has been saved yet, without reading the blob.
    pub fn ensure_present(&self) -> Result<(), GalleryError> {
        if self.path.is_file() {
            Ok(())
        } else {
            Err(GalleryError::Missing(self.path.clone()))
        }
    }

    pub fn load(&self) -> Result<Gallery, GalleryError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GalleryError::Missing(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        let blob: GalleryBlob = bincode::deserialize(&bytes).map_err(|e| self.corrupt(e.to_string()))?;

        if blob.vectors.len() != blob.labels.len() {
            return Err(self.corrupt(format!(
                "{} vectors but {} labels",
                blob.vectors.len(),
                blob.labels.len()
            )));
        }
        if let Some(first) = blob.vectors.first() {
            let dim = first.len();
            if let Some(bad) = blob.vectors.iter().position(|v| v.len() != dim) {
                return Err(self.corrupt(format!(
                    "vector {bad} has dimension {}, expected {dim}",
                    blob.vectors[bad].len()
                )));
            }
        }

        let gallery = Gallery {
            vectors: blob.vectors.into_iter().map(FeatureVector::new).collect(),
            labels: blob.labels,
        };

        tracing::info!(
            path = %self.path.display(),
            entries = gallery.len(),
            "gallery loaded"
        );
        Ok(gallery)
    }

    fn corrupt(&self, reason: String) -> GalleryError {
        GalleryError::Corrupt {
            path: self.path.clone(),
            reason,
        }
    }
}

impl Default for GalleryStore {
    fn default() -> Self {
        Self::new(DEFAULT_GALLERY_PATH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Gallery {
        let mut g = Gallery::new();
        g.push("alice", FeatureVector::new(vec![0.1, 0.2, 0.3]));
        g.push("alice", FeatureVector::new(vec![0.15, 0.25, 0.35]));
        g.push("bob", FeatureVector::new(vec![-0.4, 0.0, 0.9]));
        g
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = GalleryStore::new(dir.path().join("encodings").join("encodings.bin"));

        store.save(&sample()).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded, sample());
        assert_eq!(loaded.labels(), &["alice", "alice", "bob"]);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = GalleryStore::new(dir.path().join("g.bin"));

        store.save(&sample()).unwrap();
        store.save(&Gallery::new()).unwrap();

        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_load_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = GalleryStore::new(dir.path().join("nope.bin"));
        assert!(matches!(store.load(), Err(GalleryError::Missing(_))));
        assert!(matches!(store.ensure_present(), Err(GalleryError::Missing(_))));

        store.save(&Gallery::new()).unwrap();
        assert!(store.ensure_present().is_ok());
    }

    #[test]
    fn test_load_garbage_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.bin");
        fs::write(&path, b"\x01\x02not a gallery").unwrap();
        let store = GalleryStore::new(&path);
        assert!(matches!(store.load(), Err(GalleryError::Corrupt { .. })));
    }

    #[test]
    fn test_load_length_mismatch_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.bin");
        let blob = GalleryBlob {
            vectors: vec![vec![0.0, 1.0]],
            labels: vec!["a".into(), "b".into()],
        };
        fs::write(&path, bincode::serialize(&blob).unwrap()).unwrap();
        let err = GalleryStore::new(&path).load().unwrap_err();
        assert!(matches!(err, GalleryError::Corrupt { .. }), "got {err}");
    }

    #[test]
    fn test_load_mixed_dimensions_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("g.bin");
        let blob = GalleryBlob {
            vectors: vec![vec![0.0, 1.0], vec![0.0]],
            labels: vec!["a".into(), "b".into()],
        };
        fs::write(&path, bincode::serialize(&blob).unwrap()).unwrap();
        assert!(matches!(
            GalleryStore::new(&path).load(),
            Err(GalleryError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_from_parts_rejects_mismatch() {
        assert!(Gallery::from_parts(vec![], vec!["x".into()]).is_none());
        assert!(Gallery::from_parts(vec![FeatureVector::new(vec![1.0])], vec!["x".into()]).is_some());
    }
}
