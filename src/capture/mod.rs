//! Device acquisition and session teardown
//!
//! This module owns the hardware-facing half of the manager:
//! - Constraint types and their translation into platform requests
//! - `DeviceAcquirer`: open streams, enumerate cameras
//! - `CaptureSession`: one open stream, closed exactly once
//! - `SessionSlot`: close-before-open for one capture kind
//! - `StreamRegistry`: the explicit replacement for global stream tracking
//! - `TrackWatchdog`: notices tracks that end behind our back

mod acquisition;
mod catalog;
mod constraints;
mod registry;
mod session;
mod watchdog;

pub use acquisition::{DeviceAcquirer, SessionSlot};
pub use catalog::{CameraCatalog, CameraDevice};
pub use constraints::{
    AudioConstraints, CameraSelector, CaptureConstraints, CaptureKind, FacingMode,
    VideoConstraints,
};
pub use registry::{sweep_streams, StreamRegistry, SweepReport};
pub use session::{CaptureSession, CloseReport, SessionState};
pub use watchdog::TrackWatchdog;
