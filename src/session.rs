//! Device session: ownership of one camera handle and the state machine
//! that sequences open, configure, capture and close.
//!
//! The public methods of [`Session`] are the system boundary: one entry
//! point per operation, each returning a [`FailureKind`] untranslated from
//! the error layer. A single internal mutex exists so that `close` is safe
//! to call from another thread while an `acquire_frame` is blocked; the
//! blocking wait itself happens outside that lock. Callers serialize
//! everything else: one outstanding `acquire_frame` per session.

use crate::adapter::{CameraAdapter, DeviceHandle, FrameInfo, Setting};
use crate::config::{CameraConfig, SensorLimits};
use crate::error::{translate, FailureKind, Result};
use crate::pool::BufferPool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device handle is held.
    Closed,
    /// Device opened, not yet configured.
    Open,
    /// Parameters applied; ready to start capture.
    Configured,
    /// Ring registered and frames flowing.
    Capturing,
    /// An unrecoverable driver fault occurred; only `close` will succeed.
    Faulted,
}

/// One captured frame: its bytes and the metadata recorded at completion.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Raw image bytes in the configured pixel format.
    pub data: Vec<u8>,
    /// Frame counter, timestamp and dimensions.
    pub info: FrameInfo,
}

struct Inner {
    state: SessionState,
    handle: Option<DeviceHandle>,
    limits: SensorLimits,
    config: CameraConfig,
    pool: Option<Arc<BufferPool>>,
}

impl Inner {
    /// Record a failure, pinning the session when it is fault-class.
    fn fail(&mut self, kind: FailureKind) -> FailureKind {
        if kind.is_fault() {
            log::warn!("driver fault, session pinned: {kind}");
            self.state = SessionState::Faulted;
        }
        kind
    }

    /// The handle, or the failure a stale-handle operation reports.
    fn handle(&self) -> Result<DeviceHandle> {
        self.handle.ok_or(FailureKind::DriverFault)
    }

    /// Reject operations in states that can never service them.
    fn reject_dead_states(&self) -> Result<()> {
        match self.state {
            SessionState::Closed | SessionState::Faulted => Err(FailureKind::DriverFault),
            _ => Ok(()),
        }
    }
}

/// Lifetime-bound association between a caller and one open camera.
pub struct Session<A: CameraAdapter> {
    adapter: Arc<A>,
    inner: Mutex<Inner>,
}

impl<A: CameraAdapter> Session<A> {
    /// Open the camera at `device_index`.
    ///
    /// On failure (`DeviceNotFound`, `PermissionDenied`, `DeviceBusy`) no
    /// session exists and nothing is held.
    pub fn open(adapter: Arc<A>, device_index: u32) -> Result<Self> {
        let handle = translate(adapter.open(device_index))?;

        let limits = match translate(adapter.sensor_limits(handle)) {
            Ok(limits) => limits,
            Err(kind) => {
                if let Err(code) = adapter.close(handle) {
                    log::warn!("closing after failed capability query: status {code}");
                }
                return Err(kind);
            }
        };

        log::debug!("opened device {device_index} as {handle:?}");
        Ok(Self {
            adapter,
            inner: Mutex::new(Inner {
                state: SessionState::Open,
                handle: Some(handle),
                limits,
                config: CameraConfig::default(),
                pool: None,
            }),
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// Parameters most recently applied to the device.
    pub fn config(&self) -> CameraConfig {
        self.lock().config.clone()
    }

    /// Raw driver handle, for diagnostics. `None` once closed.
    pub fn driver_handle(&self) -> Option<DeviceHandle> {
        self.lock().handle
    }

    /// Validate `config` against the camera's ranges and apply it.
    ///
    /// Allowed while `Open` or `Configured`. Rejected with
    /// `InvalidParameter` while `Capturing`: the driver's behavior is
    /// undefined if parameters change mid-stream, so the caller must stop
    /// capture first.
    pub fn configure(&self, config: &CameraConfig) -> Result<()> {
        let mut inner = self.lock();
        self.configure_locked(&mut inner, config.clone())
    }

    /// Apply string-keyed numeric parameters on top of the current
    /// configuration, the form scripting callers pass.
    pub fn configure_entries<'k, I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'k str, f64)>,
    {
        let mut inner = self.lock();
        let mut config = inner.config.clone();
        for (key, value) in entries {
            config.apply_entry(key, value)?;
        }
        self.configure_locked(&mut inner, config)
    }

    fn configure_locked(&self, inner: &mut Inner, config: CameraConfig) -> Result<()> {
        inner.reject_dead_states()?;
        if inner.state == SessionState::Capturing {
            return Err(FailureKind::InvalidParameter);
        }

        config.validate(&inner.limits)?;

        let handle = inner.handle()?;
        let settings = [
            Setting::ExposureMs(config.exposure_ms),
            Setting::MasterGain(config.master_gain),
            Setting::PixelClockMhz(config.pixel_clock_mhz),
            Setting::Region(config.roi),
            Setting::ColorMode(config.format),
        ];
        for setting in &settings {
            translate(self.adapter.apply(handle, setting)).map_err(|kind| inner.fail(kind))?;
        }

        inner.config = config;
        inner.state = SessionState::Configured;
        Ok(())
    }

    /// Allocate and register `buffer_count` frame buffers, then start
    /// continuous capture.
    ///
    /// Requires the `Configured` state. If registration fails partway,
    /// every buffer registered so far is rolled back before the failure
    /// surfaces, and the session stays `Configured` unless the failure was
    /// fault-class.
    pub fn start_capture(&self, buffer_count: u32) -> Result<()> {
        let mut inner = self.lock();
        inner.reject_dead_states()?;
        if inner.state != SessionState::Configured {
            return Err(FailureKind::InvalidParameter);
        }

        let handle = inner.handle()?;
        let byte_size = inner.config.frame_size_bytes();
        let pool = BufferPool::allocate(self.adapter.as_ref(), handle, buffer_count, byte_size)
            .map_err(|kind| inner.fail(kind))?;

        if let Err(kind) = translate(self.adapter.start_capture(handle, pool.sink())) {
            if let Err(teardown_kind) = pool.teardown(self.adapter.as_ref(), handle) {
                log::warn!("teardown after failed capture start: {teardown_kind}");
            }
            return Err(inner.fail(kind));
        }

        inner.pool = Some(Arc::new(pool));
        inner.state = SessionState::Capturing;
        log::debug!("capture started with {buffer_count} buffers of {byte_size} bytes");
        Ok(())
    }

    /// Block until the next completed frame, or until `timeout` elapses.
    ///
    /// The sole suspension point of the API. A concurrent `stop_capture`
    /// or `close` cancels the wait and the call returns `Timeout` instead
    /// of hanging. The claimed buffer is copied out, requeued to the
    /// driver and released before the frame is returned, so the ring never
    /// leaks buffers to the caller.
    pub fn acquire_frame(&self, timeout: Duration) -> Result<Frame> {
        let pool = {
            let inner = self.lock();
            inner.reject_dead_states()?;
            if inner.state != SessionState::Capturing {
                return Err(FailureKind::InvalidParameter);
            }
            // Hold only the Arc across the wait so close() can take the
            // session lock and cancel us.
            inner.pool.as_ref().map(Arc::clone).ok_or(FailureKind::DriverFault)?
        };

        let (id, info) = pool.claim_filled(timeout)?;

        let mut inner = self.lock();
        if inner.state != SessionState::Capturing {
            // Stopped or closed while we were claiming.
            let _ = pool.release(id);
            return Err(FailureKind::Timeout);
        }
        let handle = inner.handle()?;

        let data = match translate(self.adapter.read_frame(handle, id)) {
            Ok(data) => data,
            Err(kind) => {
                let _ = pool.release(id);
                return Err(inner.fail(kind));
            }
        };
        if let Err(kind) = translate(self.adapter.requeue_buffer(handle, id)) {
            let _ = pool.release(id);
            return Err(inner.fail(kind));
        }
        pool.release(id)?;

        Ok(Frame { data, info })
    }

    /// Stop capture and tear the ring down, returning to `Configured`.
    ///
    /// A pending `acquire_frame` on another thread is woken and returns
    /// `Timeout`.
    pub fn stop_capture(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.reject_dead_states()?;
        if inner.state != SessionState::Capturing {
            return Err(FailureKind::InvalidParameter);
        }

        let handle = inner.handle()?;
        let pool = inner.pool.as_ref().map(Arc::clone).ok_or(FailureKind::DriverFault)?;

        // The driver stops first: if it refuses with a non-fault code, the
        // session stays Capturing with the ring intact and the stop can be
        // retried.
        translate(self.adapter.stop_capture(handle)).map_err(|kind| inner.fail(kind))?;

        inner.pool = None;
        inner.state = SessionState::Configured;
        pool.shut_down();

        pool.teardown(self.adapter.as_ref(), handle)
            .map_err(|kind| inner.fail(kind))?;

        log::debug!("capture stopped");
        Ok(())
    }

    /// Release the device and every associated resource.
    ///
    /// Callable from any state, including `Faulted`, and idempotent: a
    /// second call is a success no-op. Safe to call from another thread
    /// while an `acquire_frame` is blocked; the waiter is woken first.
    /// Cleanup failures on the way down are logged, not surfaced; a
    /// session that is being abandoned has no retry to offer the caller.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.state == SessionState::Closed {
            return Ok(());
        }

        let was_capturing = inner.state == SessionState::Capturing;
        let pool = inner.pool.take();
        let handle = inner.handle.take();
        inner.state = SessionState::Closed;

        if let Some(pool) = &pool {
            pool.shut_down();
        }

        if let Some(handle) = handle {
            if was_capturing {
                if let Err(kind) = translate(self.adapter.stop_capture(handle)) {
                    log::warn!("stop during close failed: {kind}");
                }
            }
            if let Some(pool) = &pool {
                if let Err(kind) = pool.teardown(self.adapter.as_ref(), handle) {
                    log::warn!("buffer teardown during close failed: {kind}");
                }
            }
            if let Err(kind) = translate(self.adapter.close(handle)) {
                log::warn!("device close failed: {kind}");
            }
        }

        log::debug!("session closed");
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A: CameraAdapter> Drop for Session<A> {
    fn drop(&mut self) {
        if let Err(kind) = self.close() {
            log::warn!("close during drop failed: {kind}");
        }
    }
}
