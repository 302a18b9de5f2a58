//! ONNX Runtime extraction backend: SCRFD detection + ArcFace encoding.
//!
//! Detection letterboxes the frame to 640×640 and decodes the three
//! anchor-free stride heads. Encoding crops a square around the detected box,
//! resizes it to 112×112 and L2-normalizes the 512-dim output, so gallery
//! distances fall in [0, 2].

use crate::extractor::{ExtractError, FaceExtractor};
use crate::types::{BoundingBox, FeatureVector};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;

pub const DETECTOR_MODEL: &str = "det_10g.onnx";
pub const RECOGNIZER_MODEL: &str = "w600k_r50.onnx";

/// Match tolerance suited to this encoder's unit-length vectors.
///
/// Euclidean distance 1.1 is cosine similarity 0.395; same-person ArcFace
/// pairs typically score above 0.4.
pub const ONNX_TOLERANCE: f32 = 1.1;

const DET_INPUT_SIZE: usize = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_SCORE_THRESHOLD: f32 = 0.5;
const DET_NMS_THRESHOLD: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

const REC_INPUT_SIZE: u32 = 112;
const REC_MEAN: f32 = 127.5;
const REC_STD: f32 = 127.5;
const REC_EMBEDDING_DIM: usize = 512;

/// (score, bbox) output indices for one stride.
type StrideOutputs = (usize, usize);

pub struct OnnxExtractor {
    detector: Session,
    recognizer: Session,
    strides: [StrideOutputs; 3],
}

impl OnnxExtractor {
    /// Load both models from `model_dir`.
    pub fn load(model_dir: &Path) -> Result<Self, ExtractError> {
        let detector = open_session(&model_dir.join(DETECTOR_MODEL))?;
        let recognizer = open_session(&model_dir.join(RECOGNIZER_MODEL))?;

        let names: Vec<String> = detector.outputs().iter().map(|o| o.name().to_string()).collect();
        if names.len() < 6 {
            return Err(ExtractError::InferenceFailed(format!(
                "detector needs score and bbox outputs for 3 strides, got {} outputs",
                names.len()
            )));
        }
        let strides = stride_outputs(&names);
        tracing::debug!(?strides, "detector output mapping");

        Ok(Self {
            detector,
            recognizer,
            strides,
        })
    }
}

fn open_session(path: &Path) -> Result<Session, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::ModelNotFound(path.display().to_string()));
    }
    let session = Session::builder()?
        .with_intra_threads(2)
        .map_err(ort::Error::from)?
        .commit_from_file(path)?;
    tracing::info!(
        path = %path.display(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded model"
    );
    Ok(session)
}

/// Map strides to output tensors by name (`score_8`, `bbox_8`, ...), falling
/// back to the export order `[scores 8/16/32, bboxes 8/16/32, kps 8/16/32]`.
fn stride_outputs(names: &[String]) -> [StrideOutputs; 3] {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let mut mapped = [(0, 3), (1, 4), (2, 5)];
    for (slot, &stride) in DET_STRIDES.iter().enumerate() {
        match (find("score", stride), find("bbox", stride)) {
            (Some(s), Some(b)) => mapped[slot] = (s, b),
            _ => return [(0, 3), (1, 4), (2, 5)],
        }
    }
    mapped
}

struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

fn letterbox_tensor(image: &RgbImage) -> (Array4<f32>, Letterbox) {
    let (w, h) = image.dimensions();
    let scale = (DET_INPUT_SIZE as f32 / w as f32).min(DET_INPUT_SIZE as f32 / h as f32);
    let new_w = ((w as f32 * scale).round() as u32).clamp(1, DET_INPUT_SIZE as u32);
    let new_h = ((h as f32 * scale).round() as u32).clamp(1, DET_INPUT_SIZE as u32);
    let pad_x = ((DET_INPUT_SIZE as u32 - new_w) / 2) as usize;
    let pad_y = ((DET_INPUT_SIZE as u32 - new_h) / 2) as usize;

    let resized = imageops::resize(image, new_w, new_h, FilterType::Triangle);

    // Zero is the normalized value of the mean, i.e. the padding colour.
    let mut tensor = Array4::<f32>::zeros((1, 3, DET_INPUT_SIZE, DET_INPUT_SIZE));
    for (x, y, px) in resized.enumerate_pixels() {
        let (tx, ty) = (x as usize + pad_x, y as usize + pad_y);
        for c in 0..3 {
            tensor[[0, c, ty, tx]] = (px.0[c] as f32 - DET_MEAN) / DET_STD;
        }
    }

    let letterbox = Letterbox {
        scale,
        pad_x: pad_x as f32,
        pad_y: pad_y as f32,
    };
    (tensor, letterbox)
}

fn decode_stride(scores: &[f32], bboxes: &[f32], stride: usize, letterbox: &Letterbox) -> Vec<BoundingBox> {
    let grid_w = DET_INPUT_SIZE / stride;
    let grid_h = DET_INPUT_SIZE / stride;
    let s = stride as f32;

    (0..grid_w * grid_h * DET_ANCHORS_PER_CELL)
        .filter_map(|idx| {
            let score = *scores.get(idx)?;
            if score <= DET_SCORE_THRESHOLD {
                return None;
            }
            let d = bboxes.get(idx * 4..idx * 4 + 4)?;
            let cell = idx / DET_ANCHORS_PER_CELL;
            let cx = (cell % grid_w) as f32 * s;
            let cy = (cell / grid_w) as f32 * s;

            let x1 = (cx - d[0] * s - letterbox.pad_x) / letterbox.scale;
            let y1 = (cy - d[1] * s - letterbox.pad_y) / letterbox.scale;
            let x2 = (cx + d[2] * s - letterbox.pad_x) / letterbox.scale;
            let y2 = (cy + d[3] * s - letterbox.pad_y) / letterbox.scale;

            Some(BoundingBox {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
            })
        })
        .collect()
}

fn iou(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let iw = (a.right().min(b.right()) - a.x.max(b.x)).max(0.0);
    let ih = (a.bottom().min(b.bottom()) - a.y.max(b.y)).max(0.0);
    let inter = iw * ih;
    let union = a.width * a.height + b.width * b.height - inter;
    if union > 0.0 { inter / union } else { 0.0 }
}

/// Greedy NMS. Output is sorted by descending confidence.
fn nms(mut boxes: Vec<BoundingBox>, threshold: f32) -> Vec<BoundingBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut keep: Vec<BoundingBox> = Vec::new();
    for candidate in boxes {
        if keep.iter().all(|k| iou(k, &candidate) <= threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Square crop around the box centre, clamped to the image, resized for the recognizer.
fn face_crop(image: &RgbImage, face: &BoundingBox) -> Option<RgbImage> {
    let (w, h) = image.dimensions();
    let side = face.width.max(face.height);
    let cx = face.x + face.width / 2.0;
    let cy = face.y + face.height / 2.0;

    let x0 = (cx - side / 2.0).clamp(0.0, w as f32) as u32;
    let y0 = (cy - side / 2.0).clamp(0.0, h as f32) as u32;
    let x1 = (cx + side / 2.0).clamp(0.0, w as f32) as u32;
    let y1 = (cy + side / 2.0).clamp(0.0, h as f32) as u32;
    if x1 <= x0 || y1 <= y0 {
        return None;
    }

    let crop = imageops::crop_imm(image, x0, y0, x1 - x0, y1 - y0).to_image();
    Some(imageops::resize(&crop, REC_INPUT_SIZE, REC_INPUT_SIZE, FilterType::Triangle))
}

fn crop_tensor(crop: &RgbImage) -> Array4<f32> {
    let size = REC_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, px) in crop.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (px.0[c] as f32 - REC_MEAN) / REC_STD;
        }
    }
    tensor
}

fn l2_normalize(mut values: Vec<f32>) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.iter_mut().for_each(|v| *v /= norm);
    }
    values
}

impl FaceExtractor for OnnxExtractor {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }
        let (input, letterbox) = letterbox_tensor(image);
        let strides = self.strides;

        let outputs = self
            .detector
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut candidates = Vec::new();
        for (&stride, &(score_idx, bbox_idx)) in DET_STRIDES.iter().zip(strides.iter()) {
            let (_, scores) = outputs[score_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| ExtractError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[bbox_idx]
                .try_extract_tensor::<f32>()
                .map_err(|e| ExtractError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;
            candidates.extend(decode_stride(scores, bboxes, stride, &letterbox));
        }

        Ok(nms(candidates, DET_NMS_THRESHOLD))
    }

    fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<FeatureVector, ExtractError> {
        let crop = face_crop(image, face)
            .ok_or_else(|| ExtractError::InferenceFailed("face box lies outside the image".into()))?;
        let input = crop_tensor(&crop);

        let outputs = self
            .recognizer
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != REC_EMBEDDING_DIM {
            return Err(ExtractError::InferenceFailed(format!(
                "expected {REC_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }
        Ok(FeatureVector::new(l2_normalize(raw.to_vec())))
    }
}
