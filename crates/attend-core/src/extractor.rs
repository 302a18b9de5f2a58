//! Face detection and encoding capability.
//!
//! Everything downstream (builder, matcher, loop) only sees this trait, so the
//! backend can be swapped without touching them.

use crate::types::{BoundingBox, DetectedFace, FeatureVector};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("model file not found: {0} — download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Image → faces capability.
pub trait FaceExtractor {
    /// Locate faces in `image`. Order is backend-defined and preserved by callers.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractError>;

    /// Compute the feature vector of the face inside `face`.
    fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<FeatureVector, ExtractError>;

    /// Detect every face and encode each one, in detection order.
    fn extract(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, ExtractError> {
        let boxes = self.detect(image)?;
        boxes
            .into_iter()
            .map(|bbox| {
                let vector = self.encode(image, &bbox)?;
                Ok(DetectedFace { bbox, vector })
            })
            .collect()
    }
}

impl<E: FaceExtractor + ?Sized> FaceExtractor for Box<E> {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractError> {
        (**self).detect(image)
    }

    fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<FeatureVector, ExtractError> {
        (**self).encode(image, face)
    }
}
