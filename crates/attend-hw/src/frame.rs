//! Raw V4L2 buffer → RGB conversion.

use image::RgbImage;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("buffer too short: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn check_len(buf: &[u8], expected: usize) -> Result<(), FrameError> {
    if buf.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

/// Convert packed YUYV 4:2:2 to RGB using BT.601 coefficients.
///
/// Every 4 bytes `[Y0, U, Y1, V]` describe two horizontally adjacent pixels
/// sharing one chroma sample.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    check_len(yuyv, pixels * 2)?;

    let mut rgb = Vec::with_capacity(pixels * 3);
    for chunk in yuyv[..pixels * 2].chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            let y = y as f32;
            rgb.push((y + 1.402 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344_136 * u - 0.714_136 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).round().clamp(0.0, 255.0) as u8);
        }
    }
    // Odd widths leave one trailing Y without a full chunk.
    rgb.resize(pixels * 3, 0);

    into_image(width, height, rgb)
}

/// Replicate 8-bit grayscale into three channels.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let pixels = (width * height) as usize;
    check_len(grey, pixels)?;
    let rgb = grey[..pixels].iter().flat_map(|&p| [p, p, p]).collect();
    into_image(width, height, rgb)
}

/// Copy packed 24-bit RGB.
pub fn rgb24_to_rgb(buf: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let bytes = (width * height) as usize * 3;
    check_len(buf, bytes)?;
    into_image(width, height, buf[..bytes].to_vec())
}

fn into_image(width: u32, height: u32, rgb: Vec<u8>) -> Result<RgbImage, FrameError> {
    let actual = rgb.len();
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected: (width * height) as usize * 3,
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_grey() {
        // 2x1: [Y0=100, U=128, Y1=200, V=128]
        let img = yuyv_to_rgb(&[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [100, 100, 100]);
        assert_eq!(img.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        let img = yuyv_to_rgb(&[76, 85, 76, 255], 2, 1).unwrap();
        let [r, g, b] = img.get_pixel(0, 0).0;
        assert!(r > 240 && g < 10 && b < 10, "got {r},{g},{b}");
    }

    #[test]
    fn test_yuyv_too_short() {
        assert!(matches!(
            yuyv_to_rgb(&[100, 128], 2, 1),
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_grey_replicates_channels() {
        let img = grey_to_rgb(&[0, 50, 255, 7], 2, 2).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [50, 50, 50]);
        assert_eq!(img.get_pixel(1, 1).0, [7, 7, 7]);
    }

    #[test]
    fn test_rgb24_ignores_trailing_padding() {
        let img = rgb24_to_rgb(&[1, 2, 3, 4, 5, 6, 9, 9], 2, 1).unwrap();
        assert_eq!(img.get_pixel(1, 0).0, [4, 5, 6]);
        assert!(rgb24_to_rgb(&[1, 2, 3], 2, 1).is_err());
    }
}
