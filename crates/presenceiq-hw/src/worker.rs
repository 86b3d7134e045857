//! Camera worker thread.
//!
//! V4L2 calls block, so the device lives on a dedicated OS thread and is
//! driven through an async [`CameraHandle`] that implements
//! [`CameraBackend`]. The thread exits when the handle is dropped, which
//! also closes the device.

use crate::camera::{Camera, CameraError};
use chrono::Utc;
use presenceiq_core::types::Facing;
use presenceiq_core::{
    AcquisitionError, CameraBackend, EncodedImage, MediaType, StreamInfo, StreamRequest,
};
use tokio::sync::{mpsc, oneshot};

/// Tuning for the camera worker.
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Frames discarded right after opening (auto-exposure settling).
    pub warmup_frames: usize,
    /// JPEG quality for encoded stills (1–100).
    pub jpeg_quality: u8,
    /// Dequeues allowed per still before giving up on a dark scene.
    pub max_frame_attempts: usize,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            warmup_frames: 4,
            jpeg_quality: 90,
            max_frame_attempts: 6,
        }
    }
}

/// Messages sent from the handle to the worker thread.
enum CameraRequest {
    Open {
        width: u32,
        height: u32,
        reply: oneshot::Sender<Result<StreamInfo, AcquisitionError>>,
    },
    Snapshot {
        reply: oneshot::Sender<Result<EncodedImage, AcquisitionError>>,
    },
    Close,
}

/// Exclusive handle to a camera worker thread.
pub struct CameraHandle {
    tx: mpsc::UnboundedSender<CameraRequest>,
}

fn worker_gone() -> AcquisitionError {
    AcquisitionError::Failed("camera worker exited".into())
}

impl CameraBackend for CameraHandle {
    async fn acquire(&mut self, request: &StreamRequest) -> Result<StreamInfo, AcquisitionError> {
        if request.facing == Facing::Environment {
            tracing::debug!("V4L2 has no facing selection; using the configured device");
        }
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CameraRequest::Open {
                width: request.width,
                height: request.height,
                reply: reply_tx,
            })
            .map_err(|_| worker_gone())?;
        reply_rx.await.map_err(|_| worker_gone())?
    }

    async fn snapshot(&mut self) -> Result<EncodedImage, AcquisitionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CameraRequest::Snapshot { reply: reply_tx })
            .map_err(|_| worker_gone())?;
        reply_rx.await.map_err(|_| worker_gone())?
    }

    fn release(&mut self) {
        // Worker already gone means the device is already closed.
        let _ = self.tx.send(CameraRequest::Close);
    }
}

/// What the worker thread needs from an open device.
trait StillSource {
    fn stream_info(&self) -> StreamInfo;
    fn still(&self, options: &WorkerOptions) -> Result<EncodedImage, CameraError>;
}

impl StillSource for Camera {
    fn stream_info(&self) -> StreamInfo {
        StreamInfo {
            width: self.width,
            height: self.height,
            device: format!("{} ({})", self.card, self.device_path),
        }
    }

    fn still(&self, options: &WorkerOptions) -> Result<EncodedImage, CameraError> {
        let frame = self.capture_lit_frame(options.max_frame_attempts)?;
        let quality = frame.quality();
        let bytes = frame.encode_jpeg(options.jpeg_quality)?;

        tracing::debug!(
            seq = frame.sequence,
            bytes = bytes.len(),
            brightness = quality.brightness,
            sharpness = quality.sharpness,
            score = quality.score,
            "still captured"
        );

        Ok(EncodedImage {
            bytes,
            media_type: MediaType::Jpeg,
            width: frame.width,
            height: frame.height,
            captured_at: Utc::now(),
            quality: Some(quality),
        })
    }
}

/// Spawn the camera worker for `device_path` on a dedicated OS thread.
///
/// The device is not opened until the first `acquire`.
pub fn spawn_camera_worker(
    device_path: &str,
    options: WorkerOptions,
) -> Result<CameraHandle, CameraError> {
    let path = device_path.to_string();
    let open_options = options.clone();
    spawn_worker(device_path, options, move |width, height| {
        open_camera(&path, width, height, &open_options)
    })
}

fn spawn_worker<D, F>(
    label: &str,
    options: WorkerOptions,
    mut open: F,
) -> Result<CameraHandle, CameraError>
where
    D: StillSource,
    F: FnMut(u32, u32) -> Result<D, CameraError> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<CameraRequest>();
    let label = label.to_string();

    std::thread::Builder::new()
        .name("presenceiq-camera".into())
        .spawn(move || {
            tracing::info!(device = %label, "camera worker started");
            let mut device: Option<D> = None;

            while let Some(req) = rx.blocking_recv() {
                match req {
                    CameraRequest::Open {
                        width,
                        height,
                        reply,
                    } => {
                        if reply.is_closed() {
                            tracing::debug!("open abandoned before it started");
                            continue;
                        }

                        let opened = match device.take() {
                            Some(dev) => Ok(dev),
                            None => open(width, height),
                        };
                        let result = match opened {
                            Ok(dev) => {
                                let info = dev.stream_info();
                                device = Some(dev);
                                Ok(info)
                            }
                            Err(e) => Err(AcquisitionError::from(e)),
                        };

                        if reply.send(result).is_err() && device.take().is_some() {
                            tracing::info!("open resolved after caller left; camera released");
                        }
                    }
                    CameraRequest::Snapshot { reply } => {
                        let result = match &device {
                            Some(dev) => dev.still(&options).map_err(AcquisitionError::from),
                            None => Err(AcquisitionError::NotOpen),
                        };
                        let _ = reply.send(result);
                    }
                    CameraRequest::Close => {
                        if device.take().is_some() {
                            tracing::info!(device = %label, "camera released");
                        }
                    }
                }
            }
            tracing::info!("camera worker exiting");
        })
        .map_err(|e| CameraError::CaptureFailed(format!("failed to spawn camera thread: {e}")))?;

    Ok(CameraHandle { tx })
}

fn open_camera(
    device_path: &str,
    width: u32,
    height: u32,
    options: &WorkerOptions,
) -> Result<Camera, CameraError> {
    let camera = Camera::open(device_path, width, height)?;
    if options.warmup_frames > 0 {
        tracing::debug!(count = options.warmup_frames, "discarding warmup frames");
        if let Err(e) = camera.discard_frames(options.warmup_frames) {
            tracing::warn!(error = %e, "warmup capture failed; continuing");
        }
    }
    Ok(camera)
}
