//! presenceiq-core: Multi-angle face capture workflow.
//!
//! Pose catalogue, capture store, camera lifetime tracking and the
//! sequencer that ties them together, plus the typed forms a finished
//! capture is packaged into. Hardware-free: cameras plug in through
//! [`CameraBackend`].

pub mod acquisition;
pub mod form;
pub mod pose;
pub mod sequencer;
pub mod store;
pub mod types;

pub use acquisition::{AcquisitionError, CameraBackend, MediaAcquisition};
pub use pose::PoseDescriptor;
pub use sequencer::{CaptureOutcome, CaptureSequencer, CompletedCapture, SequencerState};
pub use store::CaptureStore;
pub use types::{
    EncodedImage, FrameQuality, MediaType, StreamInfo, StreamRequest, MIN_ENROLL_QUALITY,
};
