//! Failure taxonomy and translation of raw driver status codes.
//!
//! Every status code an adapter can report maps to exactly one
//! [`FailureKind`]; codes outside the table become [`FailureKind::Unknown`]
//! with the raw value preserved, never dropped.

use crate::status;

/// Semantic failure categories for camera operations.
///
/// This is the closed set surfaced by every public operation. Higher layers
/// pass kinds through unchanged; nothing retries automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FailureKind {
    /// No camera is attached at the requested index.
    #[error("device not found")]
    DeviceNotFound,

    /// The device exists but the caller lacks access rights.
    #[error("permission denied")]
    PermissionDenied,

    /// A parameter or request was rejected as out of range or malformed.
    #[error("invalid parameter")]
    InvalidParameter,

    /// The driver could not provide or retain frame memory.
    #[error("buffer memory exhausted")]
    BufferExhausted,

    /// The operation did not complete within its wait bound.
    #[error("timed out")]
    Timeout,

    /// The device is held by another session or operation.
    #[error("device busy")]
    DeviceBusy,

    /// The driver failed in a way the session cannot recover from.
    #[error("driver fault")]
    DriverFault,

    /// A status code outside the known table.
    #[error("unrecognized driver status {0}")]
    Unknown(i32),
}

impl FailureKind {
    /// Translate a raw driver status code into a failure kind.
    ///
    /// Total over `i32`: every recognized code maps to one kind, everything
    /// else to `Unknown(code)`. `IS_SUCCESS` is not a failure and maps to
    /// `Unknown(0)`; callers check for success before translating.
    #[must_use]
    pub const fn from_status(code: i32) -> Self {
        match code {
            status::IS_CANT_OPEN_DEVICE => Self::DeviceNotFound,
            status::IS_ACCESS_VIOLATION => Self::PermissionDenied,
            status::IS_INVALID_PARAMETER
            | status::IS_NULL_POINTER
            | status::IS_INVALID_BUFFER_SIZE
            | status::IS_INVALID_PIXEL_CLOCK
            | status::IS_INVALID_EXPOSURE_TIME
            | status::IS_NOT_SUPPORTED => Self::InvalidParameter,
            status::IS_OUT_OF_MEMORY
            | status::IS_CANT_SETUP_MEMORY
            | status::IS_NO_IMAGE_MEM_ALLOCATED
            | status::IS_SEQUENCE_LIST_EMPTY => Self::BufferExhausted,
            status::IS_TIMED_OUT => Self::Timeout,
            status::IS_CAPTURE_RUNNING => Self::DeviceBusy,
            status::IS_NO_SUCCESS
            | status::IS_INVALID_CAMERA_HANDLE
            | status::IS_IO_REQUEST_FAILED
            | status::IS_CANT_CLOSE_DEVICE
            | status::IS_CANT_CLEANUP_MEMORY
            | status::IS_CANT_COMMUNICATE_WITH_DRIVER
            | status::IS_IMAGE_NOT_PRESENT => Self::DriverFault,
            other => Self::Unknown(other),
        }
    }

    /// Whether this failure pins a session into its faulted state.
    #[must_use]
    pub const fn is_fault(self) -> bool {
        matches!(self, Self::DriverFault)
    }
}

/// Result type for camera operations.
pub type Result<T> = std::result::Result<T, FailureKind>;

/// Map a raw adapter outcome into the crate's result type.
pub(crate) fn translate<T>(outcome: std::result::Result<T, i32>) -> Result<T> {
    outcome.map_err(FailureKind::from_status)
}
