use attend_core::annotate::draw_annotations;
use attend_core::{Annotation, Annotator};
use image::RgbImage;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Headless display: logs who is in view, optionally keeps the latest
/// annotated frame on disk, and stops when the shared flag is raised.
pub struct ConsoleDisplay {
    stop: Arc<AtomicBool>,
    snapshot_path: Option<PathBuf>,
    in_view: Vec<String>,
}

impl ConsoleDisplay {
    pub fn new(stop: Arc<AtomicBool>, snapshot_path: Option<PathBuf>) -> Self {
        Self {
            stop,
            snapshot_path,
            in_view: Vec::new(),
        }
    }

    fn write_snapshot(&self, frame: &RgbImage, annotations: &[Annotation]) {
        let Some(path) = &self.snapshot_path else {
            return;
        };
        let mut annotated = frame.clone();
        draw_annotations(&mut annotated, annotations);
        if let Err(e) = annotated.save(path) {
            tracing::warn!(path = %path.display(), error = %e, "failed to write snapshot");
        }
    }
}

impl Annotator for ConsoleDisplay {
    fn present(&mut self, frame: &RgbImage, annotations: &[Annotation]) {
        self.write_snapshot(frame, annotations);

        // Skipped frames carry no detections; keep the last known view.
        if annotations.is_empty() {
            return;
        }
        let labels: Vec<String> = annotations.iter().map(|a| a.label.clone()).collect();
        if labels != self.in_view {
            tracing::info!(faces = ?labels, "in view");
            self.in_view = labels;
        }
    }

    fn stop_requested(&mut self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }
}
