//! Media acquisition: camera open/close lifetime and on-demand stills.
//!
//! [`CameraBackend`] is the seam to the platform camera. [`MediaAcquisition`]
//! wraps a backend with the open/ready state the capture workflow relies on,
//! and releases the device on every exit path, including drop.

use crate::types::{EncodedImage, StreamInfo, StreamRequest};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),
    #[error("camera not found: {0}")]
    DeviceNotFound(String),
    #[error("camera busy")]
    DeviceBusy,
    #[error("camera did not open within {0:?}")]
    Timeout(Duration),
    #[error("camera produced only blank frames")]
    BlankFrame,
    #[error("camera stream is not open")]
    NotOpen,
    #[error("camera failure: {0}")]
    Failed(String),
}

impl AcquisitionError {
    /// Message suitable for showing to the person at the camera.
    pub fn user_message(&self) -> &'static str {
        match self {
            AcquisitionError::PermissionDenied(_) => {
                "Unable to access camera. Please check permissions and try again."
            }
            AcquisitionError::DeviceNotFound(_) => {
                "No camera was found. Connect a camera and try again."
            }
            AcquisitionError::DeviceBusy => {
                "The camera is in use by another application. Close it and try again."
            }
            AcquisitionError::Timeout(_) => {
                "The camera did not respond in time. Please try again."
            }
            AcquisitionError::BlankFrame => {
                "The picture is too dark. Improve the lighting and capture again."
            }
            AcquisitionError::NotOpen => "The camera is not open. Start the camera first.",
            AcquisitionError::Failed(_) => "The camera stopped responding. Please try again.",
        }
    }
}

/// Platform camera access.
///
/// `acquire` may suspend until the platform grants or denies access. If the
/// caller drops the future before it resolves, the implementation must not
/// leave a stream running.
#[allow(async_fn_in_trait)]
pub trait CameraBackend {
    /// Open a live stream matching `request` as closely as the device allows.
    async fn acquire(&mut self, request: &StreamRequest) -> Result<StreamInfo, AcquisitionError>;

    /// Grab and encode the current frame of the live stream.
    async fn snapshot(&mut self) -> Result<EncodedImage, AcquisitionError>;

    /// Stop the stream and release the device. Safe to call when closed.
    fn release(&mut self);
}

/// Camera lifetime and readiness tracking around a [`CameraBackend`].
pub struct MediaAcquisition<B: CameraBackend> {
    backend: B,
    request: StreamRequest,
    open_timeout: Option<Duration>,
    stream: Option<StreamInfo>,
    last_error: Option<AcquisitionError>,
}

impl<B: CameraBackend> MediaAcquisition<B> {
    pub fn new(backend: B, request: StreamRequest) -> Self {
        Self {
            backend,
            request,
            open_timeout: None,
            stream: None,
            last_error: None,
        }
    }

    /// Bound how long `open` waits for the platform. `None` waits forever.
    pub fn with_open_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Open the camera stream. Does nothing if a stream is already live.
    ///
    /// Failures are recorded in [`last_error`](Self::last_error) and leave the
    /// camera closed; calling `open` again retries.
    pub async fn open(&mut self) -> Result<StreamInfo, AcquisitionError> {
        if let Some(info) = &self.stream {
            tracing::debug!(device = %info.device, "camera already open");
            return Ok(info.clone());
        }

        self.last_error = None;
        let result = match self.open_timeout {
            Some(limit) => {
                let outcome = tokio::time::timeout(limit, self.backend.acquire(&self.request)).await;
                match outcome {
                    Ok(result) => result,
                    Err(_) => {
                        // The abandoned acquire may still complete on the device side.
                        self.backend.release();
                        Err(AcquisitionError::Timeout(limit))
                    }
                }
            }
            None => self.backend.acquire(&self.request).await,
        };

        match result {
            Ok(info) => {
                tracing::info!(
                    device = %info.device,
                    width = info.width,
                    height = info.height,
                    "camera open"
                );
                self.stream = Some(info.clone());
                Ok(info)
            }
            Err(e) => {
                tracing::warn!(error = %e, "camera open failed");
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Stop the stream. Idempotent.
    pub fn close(&mut self) {
        if let Some(info) = self.stream.take() {
            self.backend.release();
            tracing::info!(device = %info.device, "camera closed");
        }
    }

    /// Capture and encode the current frame.
    ///
    /// Returns `Ok(None)` without touching the device when the stream is not
    /// open or has not reported a frame size yet. Any failure other than a
    /// blank frame closes the stream, so the next `open` acquires afresh.
    pub async fn capture_frame(&mut self) -> Result<Option<EncodedImage>, AcquisitionError> {
        if !self.is_ready() {
            tracing::debug!("capture ignored: camera not ready");
            return Ok(None);
        }

        let result = match self.backend.snapshot().await {
            Ok(image) if image.is_empty() => Err(AcquisitionError::BlankFrame),
            other => other,
        };

        match result {
            Ok(image) => {
                self.last_error = None;
                Ok(Some(image))
            }
            Err(e) => {
                tracing::warn!(error = %e, "still capture failed");
                if e != AcquisitionError::BlankFrame {
                    self.close();
                }
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Open and reporting non-zero frame dimensions.
    pub fn is_ready(&self) -> bool {
        self.stream.as_ref().is_some_and(StreamInfo::has_dimensions)
    }

    pub fn stream(&self) -> Option<&StreamInfo> {
        self.stream.as_ref()
    }

    /// Most recent open/capture failure, cleared by the next success.
    pub fn last_error(&self) -> Option<&AcquisitionError> {
        self.last_error.as_ref()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: CameraBackend> Drop for MediaAcquisition<B> {
    fn drop(&mut self) {
        self.close();
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedCamera;
    use super::*;

    fn media(camera: ScriptedCamera) -> MediaAcquisition<ScriptedCamera> {
        MediaAcquisition::new(camera, StreamRequest::default())
    }

    #[tokio::test]
    async fn test_open_and_capture() {
        let mut m = media(ScriptedCamera::new());
        let info = m.open().await.unwrap();
        assert_eq!((info.width, info.height), (640, 480));
        assert!(m.is_open());
        assert!(m.is_ready());

        let image = m.capture_frame().await.unwrap().expect("still");
        assert_eq!(image.bytes, vec![1]);
    }

    #[tokio::test]
    async fn test_open_twice_does_not_reacquire() {
        let mut m = media(ScriptedCamera::new());
        m.open().await.unwrap();
        m.open().await.unwrap();
        assert_eq!(m.backend().acquire_calls, 1);
    }

    #[tokio::test]
    async fn test_capture_while_closed_is_noop() {
        let mut m = media(ScriptedCamera::new());
        assert!(m.capture_frame().await.unwrap().is_none());
        assert_eq!(m.backend().snapshot_calls, 0);
    }

    #[tokio::test]
    async fn test_capture_with_zero_dimensions_is_noop() {
        let mut camera = ScriptedCamera::new();
        camera.dimensions = (0, 0);
        let mut m = media(camera);
        m.open().await.unwrap();
        assert!(m.is_open());
        assert!(!m.is_ready());
        assert!(m.capture_frame().await.unwrap().is_none());
        assert_eq!(m.backend().snapshot_calls, 0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let mut m = media(ScriptedCamera::new());
        m.open().await.unwrap();
        m.close();
        m.close();
        assert!(!m.is_open());
        assert_eq!(m.backend().release_calls, 1);
    }

    #[tokio::test]
    async fn test_drop_releases_camera() {
        let camera = ScriptedCamera::new();
        let probe = camera.release_probe.clone();
        let mut m = media(camera);
        m.open().await.unwrap();
        drop(m);
        assert_eq!(probe.get(), 1);
    }

    #[tokio::test]
    async fn test_open_failure_is_recoverable() {
        let mut camera = ScriptedCamera::new();
        camera
            .open_failures
            .push_back(AcquisitionError::PermissionDenied("denied".into()));
        let mut m = media(camera);

        let err = m.open().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::PermissionDenied(_)));
        assert!(!m.is_open());
        assert_eq!(m.last_error(), Some(&err));

        m.open().await.unwrap();
        assert!(m.is_open());
        assert!(m.last_error().is_none());
    }

    #[tokio::test]
    async fn test_open_timeout_releases() {
        let mut camera = ScriptedCamera::new();
        camera.hang_on_open = true;
        let mut m = media(camera).with_open_timeout(Some(Duration::from_millis(20)));

        let err = m.open().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Timeout(_)));
        assert!(!m.is_open());
        assert_eq!(m.backend().release_calls, 1);
    }

    #[tokio::test]
    async fn test_blank_frame_reported() {
        let mut camera = ScriptedCamera::new();
        camera.blank_snapshots = 1;
        let mut m = media(camera);
        m.open().await.unwrap();

        assert_eq!(m.capture_frame().await.unwrap_err(), AcquisitionError::BlankFrame);
        assert_eq!(m.last_error(), Some(&AcquisitionError::BlankFrame));
        assert!(m.capture_frame().await.unwrap().is_some());
        assert!(m.last_error().is_none());
    }

    #[tokio::test]
    async fn test_hard_capture_failure_closes_for_reopen() {
        let mut camera = ScriptedCamera::new();
        camera.unplug_at_snapshot = Some(2);
        let mut m = media(camera);
        m.open().await.unwrap();
        assert!(m.capture_frame().await.unwrap().is_some());

        let err = m.capture_frame().await.unwrap_err();
        assert!(matches!(err, AcquisitionError::Failed(_)));
        assert!(!m.is_open());
        assert_eq!(m.backend().release_calls, 1);
        assert_eq!(m.last_error(), Some(&err));

        m.open().await.unwrap();
        assert_eq!(m.backend().acquire_calls, 2);
        assert!(m.capture_frame().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_blank_frame_keeps_stream_open() {
        let mut camera = ScriptedCamera::new();
        camera.blank_snapshots = 1;
        let mut m = media(camera);
        m.open().await.unwrap();
        m.capture_frame().await.unwrap_err();
        assert!(m.is_open());
        assert_eq!(m.backend().release_calls, 0);
    }

    #[test]
    fn test_user_messages_are_actionable() {
        let e = AcquisitionError::PermissionDenied("x".into());
        assert!(e.user_message().contains("permissions"));
        assert!(AcquisitionError::DeviceBusy.user_message().contains("in use"));
    }
}
