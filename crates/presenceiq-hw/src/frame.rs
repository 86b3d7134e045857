//! Frame type and image processing: YUYV/GREY conversion, dark detection,
//! quality metrics, JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use presenceiq_core::FrameQuality;

/// A captured camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Packed RGB8 pixel data (width * height * 3 bytes).
    pub rgb: Vec<u8>,
    /// Luma plane (width * height bytes).
    pub luma: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
    pub sequence: u32,
    pub is_dark: bool,
}

impl Frame {
    /// Average luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.luma.is_empty() {
            return 0.0;
        }
        self.luma.iter().map(|&b| b as f32).sum::<f32>() / self.luma.len() as f32
    }

    pub fn quality(&self) -> FrameQuality {
        measure_quality(&self.luma, self.width, self.height)
    }

    /// Encode the RGB data as a baseline JPEG.
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        encode_jpeg(&self.rgb, self.width, self.height, quality)
    }
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
/// Grayscale = every even-indexed byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

/// Convert packed YUYV (4:2:2) to RGB8 using BT.601 limited-range coefficients.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }
    Ok(rgb)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| (x >> 8).clamp(0, 255) as u8;
    [
        clamp(298 * c + 409 * e + 128),
        clamp(298 * c - 100 * d - 208 * e + 128),
        clamp(298 * c + 516 * d + 128),
    ]
}

/// Expand an 8-bit grayscale plane to RGB8.
pub fn grey_to_rgb(gray: &[u8]) -> Vec<u8> {
    gray.iter().flat_map(|&p| [p, p, p]).collect()
}

/// Check if a frame is dark: true if more than `threshold_pct` of pixels
/// fall in the darkest eighth of the range (0–31).
pub fn is_dark_frame(gray: &[u8], threshold_pct: f32) -> bool {
    if gray.is_empty() {
        return true;
    }
    let dark_count = gray.iter().filter(|&&p| p < 32).count();
    (dark_count as f32 / gray.len() as f32) > threshold_pct
}

/// Brightness, sharpness (Laplacian variance) and contrast of a luma plane.
pub fn measure_quality(gray: &[u8], width: u32, height: u32) -> FrameQuality {
    let w = width as usize;
    let h = height as usize;
    let pixels = &gray[..gray.len().min(w * h)];
    if pixels.is_empty() {
        return FrameQuality::new(0.0, 0.0, 0.0);
    }

    let n = pixels.len() as f32;
    let mean = pixels.iter().map(|&b| b as f32).sum::<f32>() / n;
    let variance = pixels.iter().map(|&b| (b as f32 - mean).powi(2)).sum::<f32>() / n;

    FrameQuality::new(
        mean / 255.0,
        laplacian_variance(pixels, w, h) / 1000.0,
        variance.sqrt() / 128.0,
    )
}

/// Variance of the 4-neighbour Laplacian over interior pixels.
fn laplacian_variance(gray: &[u8], w: usize, h: usize) -> f32 {
    if w < 3 || h < 3 || gray.len() < w * h {
        return 0.0;
    }

    let mut responses = Vec::with_capacity((w - 2) * (h - 2));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let at = |xx: usize, yy: usize| gray[yy * w + xx] as f32;
            let lap = at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y);
            responses.push(lap);
        }
    }

    let n = responses.len() as f32;
    let mean = responses.iter().sum::<f32>() / n;
    responses.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / n
}

/// Encode packed RGB8 as JPEG. `quality` is clamped to 1–100.
pub fn encode_jpeg(rgb: &[u8], width: u32, height: u32, quality: u8) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 3) as usize;
    if rgb.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: rgb.len(),
        });
    }

    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).encode(
        &rgb[..expected],
        width,
        height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(out)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("jpeg encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}
