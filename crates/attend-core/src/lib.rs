//! attend-core — face gallery, matching and attendance recording.
//!
//! Builds a gallery of labeled face vectors from an image tree, matches live
//! faces against it by Euclidean distance, and appends each recognized
//! person once to an attendance ledger.

pub mod annotate;
pub mod builder;
pub mod extractor;
pub mod gallery;
pub mod ledger;
pub mod matcher;
pub mod onnx;
pub mod recognition;
pub mod types;

#[cfg(test)]
mod testing;

pub use annotate::{Annotation, Annotator};
pub use builder::{BuildError, BuildOutput, GalleryBuilder};
pub use extractor::{ExtractError, FaceExtractor};
pub use gallery::{Gallery, GalleryError, GalleryStore};
pub use ledger::{AttendanceLedger, AttendanceRecord, CsvLedgerStore, LedgerError, LedgerStore};
pub use matcher::{EuclideanMatcher, MatchResult, Matcher, UNKNOWN_LABEL};
pub use onnx::{OnnxExtractor, ONNX_TOLERANCE};
pub use recognition::{FrameSource, LoopError, RecognitionConfig, RecognitionLoop, RunSummary};
pub use types::{BoundingBox, DetectedFace, FeatureVector};
