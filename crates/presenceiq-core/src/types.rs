use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which way the requested camera should face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Toward the person operating the device (webcam, front camera).
    User,
    /// Away from the operator.
    Environment,
}

/// Parameters for opening a live camera stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRequest {
    /// Preferred frame width; the device may negotiate something else.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    pub facing: Facing,
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            facing: Facing::User,
        }
    }
}

/// What the device actually granted once a stream is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    /// Human-readable device label (card name or path).
    pub device: String,
}

impl StreamInfo {
    /// A stream is only usable for stills once it reports a real frame size.
    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Encoding of a captured still.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Jpeg,
}

impl MediaType {
    pub fn mime(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "image/jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            MediaType::Jpeg => "jpg",
        }
    }
}

/// Stills scoring below this are too dark, soft or flat to enrol.
pub const MIN_ENROLL_QUALITY: f32 = 0.4;

/// Image quality metrics computed on the luma plane of a still.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameQuality {
    /// Mean luma, normalized to 0.0–1.0.
    pub brightness: f32,
    /// Laplacian variance / 1000.
    pub sharpness: f32,
    /// Luma standard deviation / 128.
    pub contrast: f32,
    /// Weighted blend of the above, capped at 1.0.
    pub score: f32,
}

impl FrameQuality {
    pub fn new(brightness: f32, sharpness: f32, contrast: f32) -> Self {
        let score = (brightness * 0.3 + sharpness * 0.5 + contrast * 0.2).min(1.0);
        Self {
            brightness,
            sharpness,
            contrast,
            score,
        }
    }

    pub fn is_enrollable(&self) -> bool {
        self.score >= MIN_ENROLL_QUALITY
    }
}

/// An encoded still frame, as stored in a capture slot.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
    pub quality: Option<FrameQuality>,
}

impl EncodedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// True only when quality was measured and fell below
    /// [`MIN_ENROLL_QUALITY`].
    pub fn is_low_quality(&self) -> bool {
        self.quality.is_some_and(|q| !q.is_enrollable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_score_weights() {
        let q = FrameQuality::new(0.5, 0.4, 0.5);
        // 0.15 + 0.20 + 0.10
        assert!((q.score - 0.45).abs() < 1e-6);
    }

    #[test]
    fn test_quality_score_capped() {
        let q = FrameQuality::new(1.0, 5.0, 1.0);
        assert_eq!(q.score, 1.0);
    }

    #[test]
    fn test_enroll_threshold() {
        assert!(FrameQuality::new(0.5, 0.4, 0.5).is_enrollable());
        assert!(!FrameQuality::new(0.2, 0.1, 0.2).is_enrollable());
        // Exactly at the threshold passes.
        assert!(FrameQuality { brightness: 0.0, sharpness: 0.0, contrast: 0.0, score: 0.4 }.is_enrollable());
    }

    #[test]
    fn test_unmeasured_still_is_not_low_quality() {
        let mut image = EncodedImage {
            bytes: vec![1],
            media_type: MediaType::Jpeg,
            width: 2,
            height: 2,
            captured_at: Utc::now(),
            quality: None,
        };
        assert!(!image.is_low_quality());
        image.quality = Some(FrameQuality::new(0.1, 0.0, 0.1));
        assert!(image.is_low_quality());
    }

    #[test]
    fn test_stream_info_dimensions() {
        let zero = StreamInfo { width: 0, height: 720, device: "cam".into() };
        let live = StreamInfo { width: 1280, height: 720, device: "cam".into() };
        assert!(!zero.has_dimensions());
        assert!(live.has_dimensions());
    }

    #[test]
    fn test_default_request_is_user_facing_720p() {
        let req = StreamRequest::default();
        assert_eq!((req.width, req.height), (1280, 720));
        assert_eq!(req.facing, Facing::User);
    }
}
