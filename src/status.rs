//! Raw uEye driver status codes.
//!
//! These mirror the return-code space of the vendor's `ueye.h`. Adapter
//! implementations report them unchanged; interpretation happens in one
//! place, [`crate::error::FailureKind::from_status`].

/// Operation completed.
pub const IS_SUCCESS: i32 = 0;
/// Unspecified failure.
pub const IS_NO_SUCCESS: i32 = -1;
/// Handle does not refer to an open camera.
pub const IS_INVALID_CAMERA_HANDLE: i32 = 1;
/// An I/O request to the driver failed.
pub const IS_IO_REQUEST_FAILED: i32 = 2;
/// No camera at the requested index, or the device could not be opened.
pub const IS_CANT_OPEN_DEVICE: i32 = 3;
/// The device refused to close.
pub const IS_CANT_CLOSE_DEVICE: i32 = 4;
/// Image memory could not be set up in the driver.
pub const IS_CANT_SETUP_MEMORY: i32 = 5;
/// No image memory is allocated for the handle.
pub const IS_NO_IMAGE_MEM_ALLOCATED: i32 = 108;
/// Image memory could not be released.
pub const IS_CANT_CLEANUP_MEMORY: i32 = 109;
/// Communication with the kernel driver failed.
pub const IS_CANT_COMMUNICATE_WITH_DRIVER: i32 = 110;
/// The sequence (ring) list is empty.
pub const IS_SEQUENCE_LIST_EMPTY: i32 = 112;
/// Wait elapsed without a frame.
pub const IS_TIMED_OUT: i32 = 122;
/// A required pointer argument was null.
pub const IS_NULL_POINTER: i32 = 123;
/// A parameter was outside the accepted range.
pub const IS_INVALID_PARAMETER: i32 = 125;
/// Driver-side memory exhausted.
pub const IS_OUT_OF_MEMORY: i32 = 127;
/// The caller lacks the access rights for the operation.
pub const IS_ACCESS_VIOLATION: i32 = 129;
/// A supplied buffer size was invalid.
pub const IS_INVALID_BUFFER_SIZE: i32 = 133;
/// Pixel clock outside the sensor's range.
pub const IS_INVALID_PIXEL_CLOCK: i32 = 134;
/// Exposure time outside the sensor's range.
pub const IS_INVALID_EXPOSURE_TIME: i32 = 135;
/// Capture is already running on this handle.
pub const IS_CAPTURE_RUNNING: i32 = 140;
/// The requested image is not present in memory.
pub const IS_IMAGE_NOT_PRESENT: i32 = 145;
/// The operation is not supported by this camera.
pub const IS_NOT_SUPPORTED: i32 = 155;
