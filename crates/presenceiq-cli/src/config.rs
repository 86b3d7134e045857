use presenceiq_core::StreamRequest;
use presenceiq_hw::WorkerOptions;
use std::path::PathBuf;
use std::time::Duration;

/// CLI configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Preferred capture width.
    pub frame_width: u32,
    /// Preferred capture height.
    pub frame_height: u32,
    /// JPEG quality for stored stills (1–100).
    pub jpeg_quality: u8,
    /// Seconds to wait for the camera to open; 0 waits indefinitely.
    pub open_timeout_secs: u64,
    /// Number of warmup frames to discard after opening (AE stabilization).
    pub warmup_frames: usize,
    /// Where submission bundles are written.
    pub output_dir: PathBuf,
}

impl Config {
    /// Load configuration from `PRESENCEIQ_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("presenceiq");

        let output_dir = std::env::var("PRESENCEIQ_OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("submissions"));

        Self {
            camera_device: std::env::var("PRESENCEIQ_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            frame_width: env_parse("PRESENCEIQ_FRAME_WIDTH", 1280),
            frame_height: env_parse("PRESENCEIQ_FRAME_HEIGHT", 720),
            jpeg_quality: env_parse::<u8>("PRESENCEIQ_JPEG_QUALITY", 90).clamp(1, 100),
            open_timeout_secs: env_parse("PRESENCEIQ_OPEN_TIMEOUT_SECS", 10),
            warmup_frames: env_parse("PRESENCEIQ_WARMUP_FRAMES", 4),
            output_dir,
        }
    }

    /// Stream request for registration captures.
    pub fn stream_request(&self) -> StreamRequest {
        StreamRequest {
            width: self.frame_width,
            height: self.frame_height,
            ..StreamRequest::default()
        }
    }

    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            warmup_frames: self.warmup_frames,
            jpeg_quality: self.jpeg_quality,
            ..WorkerOptions::default()
        }
    }

    pub fn open_timeout(&self) -> Option<Duration> {
        (self.open_timeout_secs > 0).then(|| Duration::from_secs(self.open_timeout_secs))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
