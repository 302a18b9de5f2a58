//! Run-time recognition loop: capture, sample, match, record, annotate.
//!
//! The loop is single-threaded and blocking. It owns the frame source for
//! its whole lifetime and drops it on every exit path.

use crate::annotate::{Annotation, Annotator};
use crate::extractor::FaceExtractor;
use crate::gallery::{Gallery, GalleryError, GalleryStore};
use crate::ledger::{AttendanceLedger, Clock, LedgerError, LedgerStore};
use crate::matcher::{Matcher, DEFAULT_TOLERANCE};
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

pub const DEFAULT_CADENCE: u32 = 2;
pub const DEFAULT_SCALE: f32 = 0.5;

/// Frame-producing collaborator (a camera, a video file, a test script).
///
/// Releasing the underlying device is the implementor's `Drop`.
pub trait FrameSource {
    /// Next frame, or `None` at end of stream. A failed read is end of stream.
    fn read_frame(&mut self) -> Option<RgbImage>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_frame(&mut self) -> Option<RgbImage> {
        (**self).read_frame()
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("tolerance must be a finite non-negative number, got {0}")]
    Tolerance(f32),
    #[error("cadence must be at least 1")]
    Cadence,
    #[error("scale must be in (0, 1], got {0}")]
    Scale(f32),
}

#[derive(Error, Debug)]
pub enum LoopError {
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(Box<dyn std::error::Error + Send + Sync>),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Tuning knobs for the loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecognitionConfig {
    tolerance: f32,
    cadence: u32,
    scale: f32,
}

impl RecognitionConfig {
    pub fn new(tolerance: f32, cadence: u32, scale: f32) -> Result<Self, ConfigError> {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ConfigError::Tolerance(tolerance));
        }
        if cadence == 0 {
            return Err(ConfigError::Cadence);
        }
        if !(scale > 0.0 && scale <= 1.0) {
            return Err(ConfigError::Scale(scale));
        }
        Ok(Self { tolerance, cadence, scale })
    }

    /// Maximum distance for a positive match.
    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Detection runs on every `cadence`-th frame.
    pub fn cadence(&self) -> u32 {
        self.cadence
    }

    /// Downsampling factor applied before detection.
    pub fn scale(&self) -> f32 {
        self.scale
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            cadence: DEFAULT_CADENCE,
            scale: DEFAULT_SCALE,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_captured: u64,
    pub frames_processed: u64,
    pub faces_detected: u64,
    pub faces_recognized: u64,
    pub attendees_recorded: u64,
}

pub struct RecognitionLoop<'a, E, M, A, S, C> {
    config: RecognitionConfig,
    extractor: &'a mut E,
    matcher: M,
    annotator: &'a mut A,
    ledger: &'a mut AttendanceLedger<S, C>,
}

impl<'a, E, M, A, S, C> RecognitionLoop<'a, E, M, A, S, C>
where
    E: FaceExtractor,
    M: Matcher,
    A: Annotator,
    S: LedgerStore,
    C: Clock,
{
    pub fn new(
        config: RecognitionConfig,
        extractor: &'a mut E,
        matcher: M,
        annotator: &'a mut A,
        ledger: &'a mut AttendanceLedger<S, C>,
    ) -> Self {
        Self {
            config,
            extractor,
            matcher,
            annotator,
            ledger,
        }
    }

    /// Load the gallery, open the device, and loop until stop or end of stream.
    ///
    /// The device is only opened once the gallery has loaded.
    pub fn run<F, D, OpenErr>(&mut self, store: &GalleryStore, open_device: F) -> Result<RunSummary, LoopError>
    where
        F: FnOnce() -> Result<D, OpenErr>,
        D: FrameSource,
        OpenErr: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let gallery = store.load()?;
        let source = open_device().map_err(|e| LoopError::DeviceUnavailable(e.into()))?;
        self.run_with(&gallery, source)
    }

    /// Loop over an already-open source. `source` is dropped before returning.
    pub fn run_with<D: FrameSource>(&mut self, gallery: &Gallery, mut source: D) -> Result<RunSummary, LoopError> {
        let mut summary = RunSummary::default();
        tracing::info!(
            entries = gallery.len(),
            tolerance = self.config.tolerance,
            cadence = self.config.cadence,
            scale = self.config.scale,
            "recognition started"
        );

        let result = loop {
            let Some(frame) = source.read_frame() else {
                tracing::info!("end of stream");
                break Ok(());
            };
            summary.frames_captured += 1;

            if summary.frames_captured % u64::from(self.config.cadence) != 0 {
                self.annotator.present(&frame, &[]);
            } else {
                summary.frames_processed += 1;
                match self.process_frame(gallery, &frame, &mut summary) {
                    Ok(annotations) => self.annotator.present(&frame, &annotations),
                    Err(e) => break Err(e),
                }
            }

            if self.annotator.stop_requested() {
                tracing::info!("stop requested");
                break Ok(());
            }
        };

        drop(source);
        tracing::info!(?summary, "recognition stopped");
        result.map(|()| summary)
    }

    fn process_frame(
        &mut self,
        gallery: &Gallery,
        frame: &RgbImage,
        summary: &mut RunSummary,
    ) -> Result<Vec<Annotation>, LoopError> {
        let small = downscale(frame, self.config.scale);

        let faces = match self.extractor.extract(&small) {
            Ok(faces) => faces,
            Err(e) => {
                tracing::warn!(frame = summary.frames_captured, error = %e, "extraction failed, frame ignored");
                return Ok(Vec::new());
            }
        };
        summary.faces_detected += faces.len() as u64;

        let mut annotations = Vec::with_capacity(faces.len());
        for face in faces {
            let result = self.matcher.compare(&face.vector, gallery, self.config.tolerance);
            tracing::debug!(
                frame = summary.frames_captured,
                label = result.display_label(),
                distance = ?result.distance,
                "face matched"
            );

            if let Some(label) = &result.label {
                summary.faces_recognized += 1;
                if self.ledger.mark_if_absent(label)? {
                    summary.attendees_recorded += 1;
                }
            }

            annotations.push(Annotation {
                bbox: face.bbox.scaled(1.0 / self.config.scale),
                label: result.display_label().to_string(),
            });
        }
        Ok(annotations)
    }
}

/// Shrink `frame` by `scale`. A scale of 1.0 returns an unmodified copy.
fn downscale(frame: &RgbImage, scale: f32) -> RgbImage {
    if scale >= 1.0 {
        return frame.clone();
    }
    let w = ((frame.width() as f32 * scale).round() as u32).max(1);
    let h = ((frame.height() as f32 * scale).round() as u32).max(1);
    imageops::resize(frame, w, h, FilterType::Triangle)
}
