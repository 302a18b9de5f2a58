//! Deterministic stand-ins for the extraction capability, used by unit tests.
//!
//! Every non-black pixel in the top row of an image is a "face" one pixel wide.
//! Its vector is the pixel's RGB channels divided by ten, so `[10, 0, 0]`
//! encodes to `[1.0, 0.0, 0.0]`.

use crate::extractor::{ExtractError, FaceExtractor};
use crate::types::{BoundingBox, FeatureVector};
use image::{Rgb, RgbImage};

#[derive(Default)]
pub struct PixelExtractor {
    pub detect_calls: usize,
}

impl FaceExtractor for PixelExtractor {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, ExtractError> {
        self.detect_calls += 1;
        Ok((0..image.width())
            .filter(|&x| image.get_pixel(x, 0).0 != [0, 0, 0])
            .map(|x| BoundingBox {
                x: x as f32,
                y: 0.0,
                width: 1.0,
                height: 1.0,
                confidence: 1.0,
            })
            .collect())
    }

    fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<FeatureVector, ExtractError> {
        let Rgb([r, g, b]) = *image.get_pixel(face.x as u32, face.y as u32);
        Ok(FeatureVector::new(vec![
            r as f32 / 10.0,
            g as f32 / 10.0,
            b as f32 / 10.0,
        ]))
    }
}

/// An image whose top row holds one face per given pixel, left to right.
pub fn faces_image(faces: &[[u8; 3]]) -> RgbImage {
    let width = faces.len().max(1) as u32;
    let mut img = RgbImage::new(width, 2);
    for (x, px) in faces.iter().enumerate() {
        img.put_pixel(x as u32, 0, Rgb(*px));
    }
    img
}
