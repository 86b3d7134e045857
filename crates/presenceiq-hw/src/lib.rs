//! presenceiq-hw: Hardware layer for camera capture.
//!
//! Provides V4L2-based camera access, frame conversion and JPEG still
//! encoding, and a worker-thread handle that plugs into the core
//! capture workflow as a `CameraBackend`.

pub mod camera;
pub mod frame;
pub mod worker;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::Frame;
pub use worker::{spawn_camera_worker, CameraHandle, WorkerOptions};
