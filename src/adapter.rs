//! The native call seam.
//!
//! [`CameraAdapter`] is the single boundary through which the crate talks to
//! a uEye-style driver. Each method has the shape of one native call: it
//! marshals its parameters, performs the call, and reports the raw status
//! code unchanged on failure. No retries and no interpretation happen here,
//! which makes the trait the substitutable seam for testing: the simulated
//! driver in [`crate::sim`] implements it without any hardware.

use crate::config::{PixelFormat, Roi, SensorLimits};
use crate::pool::FrameSink;
use std::time::Duration;

/// Opaque identity of an open camera, assigned by the driver.
///
/// A token key into driver-owned state, never a pointer. Invalid once the
/// session that owns it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u32);

/// Opaque identity of one driver-registered frame buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Metadata describing one completed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Driver frame counter, starting at 1 for the first frame of a capture.
    pub frame_number: u64,
    /// Time since capture started.
    pub timestamp: Duration,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format the buffer was registered with.
    pub format: PixelFormat,
}

/// One acquisition parameter in the form the driver accepts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Setting {
    /// Exposure time in milliseconds.
    ExposureMs(f64),
    /// Hardware master gain.
    MasterGain(u32),
    /// Sensor pixel clock in MHz.
    PixelClockMhz(u32),
    /// Capture region of interest.
    Region(Roi),
    /// Color mode of delivered images.
    ColorMode(PixelFormat),
}

/// Outcome of a single native call: the output value, or the raw driver
/// status code, unchanged.
pub type RawResult<T> = std::result::Result<T, i32>;

/// Call surface of the native driver.
///
/// Implementations must be safe to share across threads: the session calls
/// in from the consumer side while the driver's delivery path runs
/// elsewhere.
pub trait CameraAdapter: Send + Sync {
    /// Open the camera at `device_index` and return its handle.
    fn open(&self, device_index: u32) -> RawResult<DeviceHandle>;

    /// Release a device handle. The handle is invalid afterwards.
    fn close(&self, handle: DeviceHandle) -> RawResult<()>;

    /// Query the capability ranges of the opened camera.
    fn sensor_limits(&self, handle: DeviceHandle) -> RawResult<SensorLimits>;

    /// Apply one acquisition parameter.
    fn apply(&self, handle: DeviceHandle, setting: &Setting) -> RawResult<()>;

    /// Allocate one driver-side image buffer of `byte_size` bytes.
    fn alloc_image_mem(&self, handle: DeviceHandle, byte_size: usize) -> RawResult<BufferId>;

    /// Add an allocated buffer to the ring sequence the driver fills.
    fn add_to_sequence(&self, handle: DeviceHandle, buffer: BufferId) -> RawResult<()>;

    /// Remove every buffer from the ring sequence.
    fn clear_sequence(&self, handle: DeviceHandle) -> RawResult<()>;

    /// Free an allocated image buffer. Must not be called while the buffer
    /// is still in the sequence.
    fn free_image_mem(&self, handle: DeviceHandle, buffer: BufferId) -> RawResult<()>;

    /// Begin continuous capture. Completed frames are announced through
    /// `sink` from the driver's delivery context.
    fn start_capture(&self, handle: DeviceHandle, sink: FrameSink) -> RawResult<()>;

    /// Stop continuous capture. Idempotent at the driver level.
    fn stop_capture(&self, handle: DeviceHandle) -> RawResult<()>;

    /// Copy the contents of a filled buffer out of driver memory.
    fn read_frame(&self, handle: DeviceHandle, buffer: BufferId) -> RawResult<Vec<u8>>;

    /// Hand a consumed buffer back to the driver for reuse.
    fn requeue_buffer(&self, handle: DeviceHandle, buffer: BufferId) -> RawResult<()>;
}
