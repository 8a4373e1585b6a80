//! ueye-capture: session and ring-buffer core for IDS uEye camera bindings.
//!
//! This library implements the part of a camera binding that has to be
//! right: the device/session lifecycle, the driver-owned ring of frame
//! buffers, and the total translation of the driver's status-code space
//! into a small closed set of failure kinds. All driver interaction goes
//! through the [`adapter::CameraAdapter`] trait, so the same session logic
//! runs against real hardware or against the in-process simulator in
//! [`sim`].

pub mod adapter;
pub mod config;
pub mod error;
pub mod pool;
pub mod session;
pub mod sim;
pub mod status;

pub use adapter::{BufferId, CameraAdapter, DeviceHandle, FrameInfo};
pub use config::{CameraConfig, PixelFormat, Roi, SensorLimits};
pub use error::{FailureKind, Result};
pub use pool::BufferPool;
pub use session::{Frame, Session, SessionState};
