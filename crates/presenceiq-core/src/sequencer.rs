//! Capture sequencer: walks the pose list, one still per pose.
//!
//! States: `Idle` → `AwaitingCapture(ordinal)` → `Complete`. A retake
//! re-targets a single ordinal from any state, including `Complete`.

use crate::acquisition::{AcquisitionError, CameraBackend, MediaAcquisition};
use crate::pose::{self, PoseDescriptor};
use crate::store::{CaptureStore, StoreError};
use crate::types::EncodedImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SequencerError {
    #[error(transparent)]
    Camera(#[from] AcquisitionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("capture session is already complete")]
    AlreadyComplete,
    #[error("capture session has no poses")]
    NoPoses,
}

/// Returned when a session is handed off before every pose is captured.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{captured} of {total} poses captured; remaining: {}", .remaining.join(", "))]
pub struct IncompleteCapture {
    pub captured: usize,
    pub total: usize,
    /// Names of the poses still missing, in ordinal order.
    pub remaining: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    AwaitingCapture(usize),
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Stored the still for `ordinal`; now prompting for `next`.
    Stored { ordinal: usize, next: usize },
    /// Stored the still for `ordinal` and every slot is now filled.
    Completed { ordinal: usize },
    /// Nothing was captured: no pose is awaited or the camera is not ready.
    NotReady,
}

/// One pose and its captured still.
#[derive(Debug, Clone)]
pub struct PoseCapture {
    pub pose: PoseDescriptor,
    pub image: EncodedImage,
}

/// Ordered output of a finished session, one entry per pose.
#[derive(Debug, Clone)]
pub struct CompletedCapture {
    pub captures: Vec<PoseCapture>,
}

impl CompletedCapture {
    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}

/// A capture session: pose list, slots and the camera that fills them.
///
/// Owned by whatever screen hosts the workflow. Dropping the sequencer
/// releases the camera.
pub struct CaptureSequencer<B: CameraBackend> {
    poses: Vec<PoseDescriptor>,
    store: CaptureStore,
    media: MediaAcquisition<B>,
    state: SequencerState,
}

impl<B: CameraBackend> CaptureSequencer<B> {
    /// Ordinals are reassigned from list position, so slot `i` always
    /// belongs to `poses[i]`.
    pub fn new(mut poses: Vec<PoseDescriptor>, media: MediaAcquisition<B>) -> Self {
        for (i, pose) in poses.iter_mut().enumerate() {
            pose.ordinal = i;
        }
        let store = CaptureStore::new(poses.len());
        Self {
            poses,
            store,
            media,
            state: SequencerState::Idle,
        }
    }

    /// Session over the built-in nine-angle pose set.
    pub fn nine_angle(media: MediaAcquisition<B>) -> Self {
        Self::new(pose::nine_angle().to_vec(), media)
    }

    /// Begin capturing at the first pose and open the camera.
    ///
    /// While awaiting a capture this only retries opening the camera, which
    /// is how a user recovers from a permission or device error.
    pub async fn start(&mut self) -> Result<(), SequencerError> {
        match self.state {
            SequencerState::Complete => return Err(SequencerError::AlreadyComplete),
            SequencerState::Idle => {
                if self.poses.is_empty() {
                    tracing::error!("refusing to start a session without poses");
                    return Err(SequencerError::NoPoses);
                }
                self.state = SequencerState::AwaitingCapture(0);
                tracing::info!(total = self.poses.len(), "capture session started");
            }
            SequencerState::AwaitingCapture(_) => {}
        }

        self.media.open().await?;
        Ok(())
    }

    /// Capture the awaited pose and advance to the next empty slot.
    ///
    /// Does nothing unless a pose is awaited and the camera is ready.
    pub async fn capture_current(&mut self) -> Result<CaptureOutcome, SequencerError> {
        let SequencerState::AwaitingCapture(ordinal) = self.state else {
            tracing::debug!(state = ?self.state, "capture ignored: no pose awaited");
            return Ok(CaptureOutcome::NotReady);
        };

        let Some(image) = self.media.capture_frame().await? else {
            return Ok(CaptureOutcome::NotReady);
        };

        self.store.set_slot(ordinal, image)?;
        tracing::info!(
            ordinal,
            pose = %self.poses[ordinal].name,
            captured = self.store.completed_count(),
            total = self.store.total(),
            "pose captured"
        );

        match self.store.next_empty_after(ordinal) {
            Some(next) => {
                self.state = SequencerState::AwaitingCapture(next);
                Ok(CaptureOutcome::Stored { ordinal, next })
            }
            None => {
                self.state = SequencerState::Complete;
                self.media.close();
                tracing::info!("all poses captured");
                Ok(CaptureOutcome::Completed { ordinal })
            }
        }
    }

    /// Clear one slot and prompt for that pose again, reopening the camera.
    ///
    /// No other slot is touched.
    pub async fn retake(&mut self, ordinal: usize) -> Result<(), SequencerError> {
        self.store.clear_slot(ordinal)?;
        self.state = SequencerState::AwaitingCapture(ordinal);
        tracing::info!(ordinal, pose = %self.poses[ordinal].name, "retaking pose");
        self.media.open().await?;
        Ok(())
    }

    /// Clear every slot, close the camera and go back to `Idle`.
    pub fn reset(&mut self) {
        self.store.clear_all();
        self.media.close();
        self.state = SequencerState::Idle;
        tracing::info!("capture session reset");
    }

    /// Abandon the session. Captured stills are discarded.
    pub fn cancel(&mut self) {
        self.media.close();
        self.store.clear_all();
        self.state = SequencerState::Idle;
        tracing::info!("capture session cancelled");
    }

    /// Retry opening the camera without changing the awaited pose.
    pub async fn reopen_camera(&mut self) -> Result<(), SequencerError> {
        match self.state {
            SequencerState::AwaitingCapture(_) => {
                self.media.open().await?;
                Ok(())
            }
            SequencerState::Complete => Err(SequencerError::AlreadyComplete),
            SequencerState::Idle => self.start().await,
        }
    }

    /// Hand off the ordered stills, or say which poses are missing.
    ///
    /// The session is left untouched either way so a failed submission can
    /// be retried without recapturing.
    pub fn completed(&self) -> Result<CompletedCapture, IncompleteCapture> {
        if self.poses.is_empty() {
            return Err(IncompleteCapture {
                captured: 0,
                total: 0,
                remaining: Vec::new(),
            });
        }
        match self.store.images() {
            Some(images) => Ok(CompletedCapture {
                captures: self
                    .poses
                    .iter()
                    .zip(images)
                    .map(|(pose, image)| PoseCapture {
                        pose: pose.clone(),
                        image: image.clone(),
                    })
                    .collect(),
            }),
            None => Err(IncompleteCapture {
                captured: self.store.completed_count(),
                total: self.store.total(),
                remaining: self
                    .store
                    .remaining()
                    .into_iter()
                    .map(|i| self.poses[i].name.clone())
                    .collect(),
            }),
        }
    }

    /// Captured poses whose measured quality is below
    /// [`MIN_ENROLL_QUALITY`](crate::types::MIN_ENROLL_QUALITY).
    pub fn low_quality(&self) -> Vec<&PoseDescriptor> {
        self.poses
            .iter()
            .filter(|pose| {
                matches!(self.store.slot_at(pose.ordinal), Ok(Some(image)) if image.is_low_quality())
            })
            .collect()
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn current_ordinal(&self) -> Option<usize> {
        match self.state {
            SequencerState::AwaitingCapture(ordinal) => Some(ordinal),
            _ => None,
        }
    }

    pub fn current_pose(&self) -> Option<&PoseDescriptor> {
        self.current_ordinal().map(|i| &self.poses[i])
    }

    pub fn poses(&self) -> &[PoseDescriptor] {
        &self.poses
    }

    pub fn store(&self) -> &CaptureStore {
        &self.store
    }

    pub fn media(&self) -> &MediaAcquisition<B> {
        &self.media
    }

    pub fn camera_open(&self) -> bool {
        self.media.is_open()
    }

    pub fn completed_count(&self) -> usize {
        self.store.completed_count()
    }

    pub fn is_complete(&self) -> bool {
        self.store.is_complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::testing::ScriptedCamera;
    use crate::types::{FrameQuality, StreamRequest};

    fn sequencer(poses: usize) -> CaptureSequencer<ScriptedCamera> {
        sequencer_with(poses, ScriptedCamera::new())
    }

    fn sequencer_with(poses: usize, camera: ScriptedCamera) -> CaptureSequencer<ScriptedCamera> {
        let media = MediaAcquisition::new(camera, StreamRequest::default());
        CaptureSequencer::new(pose::nine_angle()[..poses].to_vec(), media)
    }

    fn tag_at(seq: &CaptureSequencer<ScriptedCamera>, ordinal: usize) -> Option<u8> {
        seq.store().slot_at(ordinal).unwrap().map(|i| i.bytes[0])
    }

    #[tokio::test]
    async fn test_full_sequence_visits_every_pose_in_order() {
        let mut seq = sequencer(9);
        seq.start().await.unwrap();
        assert_eq!(seq.state(), SequencerState::AwaitingCapture(0));
        assert!(seq.camera_open());

        for expected in 0..9 {
            assert_eq!(seq.current_ordinal(), Some(expected));
            let outcome = seq.capture_current().await.unwrap();
            if expected < 8 {
                assert_eq!(outcome, CaptureOutcome::Stored { ordinal: expected, next: expected + 1 });
            } else {
                assert_eq!(outcome, CaptureOutcome::Completed { ordinal: 8 });
            }
            assert_eq!(seq.completed_count(), expected + 1);
        }

        assert_eq!(seq.state(), SequencerState::Complete);
        assert!(seq.is_complete());
        assert!(!seq.camera_open());
        assert_eq!(seq.media().backend().release_calls, 1);
    }

    #[tokio::test]
    async fn test_retake_replaces_only_that_slot() {
        // start → 0 → 1 → retake 0 → 0 → 2
        let mut seq = sequencer(3);
        seq.start().await.unwrap();
        seq.capture_current().await.unwrap(); // tag 1 → slot 0
        seq.capture_current().await.unwrap(); // tag 2 → slot 1

        seq.retake(0).await.unwrap();
        assert_eq!(seq.current_ordinal(), Some(0));
        assert_eq!(tag_at(&seq, 0), None);
        assert_eq!(tag_at(&seq, 1), Some(2));

        let outcome = seq.capture_current().await.unwrap(); // tag 3 → slot 0
        assert_eq!(outcome, CaptureOutcome::Stored { ordinal: 0, next: 2 });
        let outcome = seq.capture_current().await.unwrap(); // tag 4 → slot 2
        assert_eq!(outcome, CaptureOutcome::Completed { ordinal: 2 });

        assert!(seq.is_complete());
        assert_eq!(seq.completed_count(), 3);
        assert_eq!(tag_at(&seq, 0), Some(3));
        assert_eq!(tag_at(&seq, 1), Some(2));
        assert_eq!(tag_at(&seq, 2), Some(4));
    }

    #[tokio::test]
    async fn test_retake_reopens_completed_session() {
        let mut seq = sequencer(3);
        seq.start().await.unwrap();
        for _ in 0..3 {
            seq.capture_current().await.unwrap();
        }
        assert_eq!(seq.state(), SequencerState::Complete);

        seq.retake(1).await.unwrap();
        assert_eq!(seq.state(), SequencerState::AwaitingCapture(1));
        assert!(seq.camera_open());
        assert!(!seq.is_complete());
        assert_eq!(tag_at(&seq, 0), Some(1));
        assert_eq!(tag_at(&seq, 2), Some(3));

        let outcome = seq.capture_current().await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Completed { ordinal: 1 });
        assert_eq!(tag_at(&seq, 1), Some(4));
        assert!(!seq.camera_open());
    }

    #[tokio::test]
    async fn test_retake_out_of_range_rejected() {
        let mut seq = sequencer(3);
        seq.start().await.unwrap();
        let err = seq.retake(3).await.unwrap_err();
        assert!(matches!(err, SequencerError::Store(StoreError::OutOfRange { ordinal: 3, len: 3 })));
        assert_eq!(seq.state(), SequencerState::AwaitingCapture(0));
    }

    #[tokio::test]
    async fn test_capture_before_start_is_ignored() {
        let mut seq = sequencer(3);
        assert_eq!(seq.capture_current().await.unwrap(), CaptureOutcome::NotReady);
        assert_eq!(seq.completed_count(), 0);
        assert_eq!(seq.media().backend().snapshot_calls, 0);
    }

    #[tokio::test]
    async fn test_capture_with_camera_closed_never_mutates() {
        let mut camera = ScriptedCamera::new();
        camera
            .open_failures
            .push_back(AcquisitionError::DeviceBusy);
        let mut seq = sequencer_with(3, camera);

        assert!(matches!(
            seq.start().await,
            Err(SequencerError::Camera(AcquisitionError::DeviceBusy))
        ));
        assert_eq!(seq.state(), SequencerState::AwaitingCapture(0));
        assert!(!seq.camera_open());

        assert_eq!(seq.capture_current().await.unwrap(), CaptureOutcome::NotReady);
        assert_eq!(seq.completed_count(), 0);

        // Retrying recovers.
        seq.start().await.unwrap();
        assert!(seq.camera_open());
        assert!(matches!(seq.capture_current().await.unwrap(), CaptureOutcome::Stored { .. }));
    }

    #[tokio::test]
    async fn test_blank_frame_leaves_slot_empty() {
        let mut camera = ScriptedCamera::new();
        camera.blank_snapshots = 1;
        let mut seq = sequencer_with(3, camera);
        seq.start().await.unwrap();

        assert!(matches!(
            seq.capture_current().await,
            Err(SequencerError::Camera(AcquisitionError::BlankFrame))
        ));
        assert_eq!(seq.completed_count(), 0);
        assert_eq!(seq.current_ordinal(), Some(0));
    }

    #[tokio::test]
    async fn test_progress_monotonic_until_reset() {
        let mut seq = sequencer(5);
        seq.start().await.unwrap();
        let mut last = 0;
        for _ in 0..4 {
            seq.capture_current().await.unwrap();
            assert!(seq.completed_count() >= last);
            last = seq.completed_count();
        }
        assert_eq!(last, 4);

        seq.reset();
        assert_eq!(seq.completed_count(), 0);
        assert_eq!(seq.state(), SequencerState::Idle);
        assert!(!seq.camera_open());
    }

    #[tokio::test]
    async fn test_cancel_closes_camera_and_discards() {
        let mut seq = sequencer(3);
        seq.start().await.unwrap();
        seq.capture_current().await.unwrap();
        seq.cancel();
        assert!(!seq.camera_open());
        assert_eq!(seq.state(), SequencerState::Idle);
        assert_eq!(seq.completed_count(), 0);
        seq.cancel();
        assert_eq!(seq.media().backend().release_calls, 1);
    }

    #[tokio::test]
    async fn test_start_when_complete_rejected() {
        let mut seq = sequencer(1);
        seq.start().await.unwrap();
        seq.capture_current().await.unwrap();
        assert!(matches!(seq.start().await, Err(SequencerError::AlreadyComplete)));
    }

    #[tokio::test]
    async fn test_completed_gating() {
        let mut seq = sequencer(3);
        seq.start().await.unwrap();
        seq.capture_current().await.unwrap();

        let err = seq.completed().unwrap_err();
        assert_eq!(err.captured, 1);
        assert_eq!(err.total, 3);
        assert_eq!(err.remaining, vec!["Left Profile".to_string(), "Right Profile".to_string()]);
        assert!(err.to_string().contains("Left Profile, Right Profile"));

        seq.capture_current().await.unwrap();
        seq.capture_current().await.unwrap();
        let done = seq.completed().unwrap();
        assert_eq!(done.len(), 3);
        let names: Vec<_> = done.captures.iter().map(|c| c.pose.name.as_str()).collect();
        assert_eq!(names, vec!["Front", "Left Profile", "Right Profile"]);
        // Hand-off does not consume the session.
        assert!(seq.is_complete());
    }

    #[tokio::test]
    async fn test_reopen_after_device_lost_keeps_captures() {
        let mut camera = ScriptedCamera::new();
        camera.unplug_at_snapshot = Some(2);
        let mut seq = sequencer_with(3, camera);
        seq.start().await.unwrap();
        seq.capture_current().await.unwrap();

        assert!(matches!(
            seq.capture_current().await,
            Err(SequencerError::Camera(AcquisitionError::Failed(_)))
        ));
        assert!(!seq.camera_open());
        assert_eq!(seq.current_ordinal(), Some(1));
        assert_eq!(seq.completed_count(), 1);

        seq.reopen_camera().await.unwrap();
        assert_eq!(seq.media().backend().acquire_calls, 2);
        let outcome = seq.capture_current().await.unwrap();
        assert_eq!(outcome, CaptureOutcome::Stored { ordinal: 1, next: 2 });
        assert_eq!(tag_at(&seq, 0), Some(1));
    }

    #[tokio::test]
    async fn test_retake_after_device_lost_reacquires() {
        let mut camera = ScriptedCamera::new();
        camera.unplug_at_snapshot = Some(2);
        let mut seq = sequencer_with(3, camera);
        seq.start().await.unwrap();
        seq.capture_current().await.unwrap();
        seq.capture_current().await.unwrap_err();

        seq.retake(0).await.unwrap();
        assert_eq!(seq.media().backend().acquire_calls, 2);
        assert!(seq.camera_open());
        assert!(matches!(seq.capture_current().await.unwrap(), CaptureOutcome::Stored { ordinal: 0, .. }));
    }

    #[tokio::test]
    async fn test_ordinals_follow_list_position() {
        let media = MediaAcquisition::new(ScriptedCamera::new(), StreamRequest::default());
        let poses = pose::nine_angle()[3..5].to_vec();
        let mut seq = CaptureSequencer::new(poses, media);
        assert_eq!(seq.poses()[0].name, "Up");
        assert_eq!(seq.poses()[0].ordinal, 0);
        assert_eq!(seq.poses()[1].ordinal, 1);

        seq.start().await.unwrap();
        assert_eq!(seq.current_pose().map(|p| p.name.as_str()), Some("Up"));
        seq.capture_current().await.unwrap();
        seq.capture_current().await.unwrap();
        let done = seq.completed().unwrap();
        assert_eq!(done.captures[1].pose.name, "Down");
        assert_eq!(done.captures[1].pose.ordinal, 1);
    }

    #[tokio::test]
    async fn test_empty_pose_list_refused() {
        let media = MediaAcquisition::new(ScriptedCamera::new(), StreamRequest::default());
        let mut seq = CaptureSequencer::new(Vec::new(), media);
        assert!(matches!(seq.start().await, Err(SequencerError::NoPoses)));
        assert_eq!(seq.state(), SequencerState::Idle);
        assert!(!seq.camera_open());
        assert!(seq.completed().is_err());
    }

    #[tokio::test]
    async fn test_low_quality_poses_listed() {
        let mut camera = ScriptedCamera::new();
        camera.quality = Some(FrameQuality::new(0.1, 0.0, 0.1));
        let mut seq = sequencer_with(2, camera);
        seq.start().await.unwrap();
        seq.capture_current().await.unwrap();

        let names: Vec<_> = seq.low_quality().iter().map(|p| p.name.clone()).collect();
        assert_eq!(names, vec!["Front".to_string()]);
    }

    #[tokio::test]
    async fn test_unmeasured_stills_not_flagged() {
        let mut seq = sequencer(2);
        seq.start().await.unwrap();
        seq.capture_current().await.unwrap();
        assert!(seq.low_quality().is_empty());
    }

    #[tokio::test]
    async fn test_dropping_session_releases_camera() {
        let camera = ScriptedCamera::new();
        let probe = camera.release_probe.clone();
        let mut seq = sequencer_with(3, camera);
        seq.start().await.unwrap();
        drop(seq);
        assert_eq!(probe.get(), 1);
    }
}
