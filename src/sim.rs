//! Simulated uEye driver for testing and demos without hardware.
//!
//! [`SimulatedCamera`] implements the full [`CameraAdapter`] call surface
//! in-process: a generator thread stands in for the driver's delivery
//! context, writing synthetic frames into registered buffers and announcing
//! them through the [`FrameSink`]. Builder knobs script the failure modes
//! the real driver exhibits (absent devices, denied access, exhausted
//! driver memory).

use crate::adapter::{BufferId, CameraAdapter, DeviceHandle, FrameInfo, RawResult, Setting};
use crate::config::{CameraConfig, SensorLimits};
use crate::pool::FrameSink;
use crate::status;
use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Synthetic image content written into delivered frames.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Every byte of every channel set to the given value.
    Solid(u8),
}

struct CaptureWorker {
    stop_tx: mpsc::Sender<()>,
    thread: Option<JoinHandle<()>>,
}

struct OpenCamera {
    handle: DeviceHandle,
    settings: CameraConfig,
    buffers: HashMap<BufferId, Vec<u8>>,
    sequence: Vec<BufferId>,
    capture: Option<CaptureWorker>,
}

struct SimInner {
    attached: u32,
    busy: HashSet<u32>,
    denied: HashSet<u32>,
    frame_interval: Duration,
    pattern: TestPattern,
    /// Scripted driver-memory exhaustion: registrations allowed before
    /// `add_to_sequence` starts failing.
    register_budget: Option<u32>,
    registered: u32,
    open: Option<OpenCamera>,
    next_buffer: u32,
}

/// In-process stand-in for the uEye driver.
pub struct SimulatedCamera {
    inner: Arc<Mutex<SimInner>>,
}

impl Default for SimulatedCamera {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedCamera {
    /// Create a simulator with one attached camera at index 0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                attached: 1,
                busy: HashSet::new(),
                denied: HashSet::new(),
                frame_interval: Duration::from_millis(10),
                pattern: TestPattern::Gradient,
                register_budget: None,
                registered: 0,
                open: None,
                next_buffer: 1,
            })),
        }
    }

    /// Number of attached cameras (indices `0..count` respond to `open`).
    #[must_use]
    pub fn with_attached(self, count: u32) -> Self {
        self.lock().attached = count;
        self
    }

    /// Mark a device index as held by another process.
    #[must_use]
    pub fn with_busy_device(self, index: u32) -> Self {
        self.lock().busy.insert(index);
        self
    }

    /// Mark a device index as present but access-denied.
    #[must_use]
    pub fn with_denied_device(self, index: u32) -> Self {
        self.lock().denied.insert(index);
        self
    }

    /// Interval between generated frames.
    #[must_use]
    pub fn with_frame_interval(self, interval: Duration) -> Self {
        self.lock().frame_interval = interval;
        self
    }

    /// Pattern written into generated frames.
    #[must_use]
    pub fn with_pattern(self, pattern: TestPattern) -> Self {
        self.lock().pattern = pattern;
        self
    }

    /// Fail ring registration once `count` buffers have been accepted,
    /// imitating driver memory exhaustion partway through setup.
    #[must_use]
    pub fn with_register_failures_after(self, count: u32) -> Self {
        self.lock().register_budget = Some(count);
        self
    }

    /// Buffers currently allocated in driver memory.
    #[must_use]
    pub fn live_buffers(&self) -> usize {
        self.lock().open.as_ref().map_or(0, |cam| cam.buffers.len())
    }

    /// Buffers currently in the ring sequence.
    #[must_use]
    pub fn sequence_len(&self) -> usize {
        self.lock().open.as_ref().map_or(0, |cam| cam.sequence.len())
    }

    fn lock(&self) -> MutexGuard<'_, SimInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop and join a capture worker. Must be called without the state
    /// lock held; the worker takes that lock to generate frames.
    fn stop_worker(worker: Option<CaptureWorker>) {
        if let Some(mut worker) = worker {
            let _ = worker.stop_tx.send(());
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    log::warn!("simulated delivery thread panicked");
                }
            }
        }
    }
}

impl SimInner {
    fn camera(&self, handle: DeviceHandle) -> Result<&OpenCamera, i32> {
        match &self.open {
            Some(cam) if cam.handle == handle => Ok(cam),
            _ => Err(status::IS_INVALID_CAMERA_HANDLE),
        }
    }

    fn camera_mut(&mut self, handle: DeviceHandle) -> Result<&mut OpenCamera, i32> {
        match &mut self.open {
            Some(cam) if cam.handle == handle => Ok(cam),
            _ => Err(status::IS_INVALID_CAMERA_HANDLE),
        }
    }
}

impl CameraAdapter for SimulatedCamera {
    fn open(&self, device_index: u32) -> RawResult<DeviceHandle> {
        let mut inner = self.lock();
        if device_index >= inner.attached {
            return Err(status::IS_CANT_OPEN_DEVICE);
        }
        if inner.denied.contains(&device_index) {
            return Err(status::IS_ACCESS_VIOLATION);
        }
        if inner.busy.contains(&device_index) || inner.open.is_some() {
            return Err(status::IS_CAPTURE_RUNNING);
        }

        let handle = DeviceHandle(device_index + 1);
        inner.open = Some(OpenCamera {
            handle,
            settings: CameraConfig::default(),
            buffers: HashMap::new(),
            sequence: Vec::new(),
            capture: None,
        });
        log::debug!("simulated camera {device_index} opened as {handle:?}");
        Ok(handle)
    }

    fn close(&self, handle: DeviceHandle) -> RawResult<()> {
        let worker = {
            let mut inner = self.lock();
            inner.camera_mut(handle)?.capture.take()
        };
        Self::stop_worker(worker);

        let mut inner = self.lock();
        inner.camera(handle)?;
        inner.open = None;
        inner.registered = 0;
        Ok(())
    }

    fn sensor_limits(&self, handle: DeviceHandle) -> RawResult<SensorLimits> {
        let inner = self.lock();
        inner.camera(handle)?;
        Ok(SensorLimits {
            exposure_ms: 0.01..=2000.0,
            master_gain: 0..=100,
            pixel_clock_mhz: 5..=43,
            max_width: 1280,
            max_height: 1024,
        })
    }

    fn apply(&self, handle: DeviceHandle, setting: &Setting) -> RawResult<()> {
        let mut inner = self.lock();
        let cam = inner.camera_mut(handle)?;
        match *setting {
            Setting::ExposureMs(value) => {
                if !(0.01..=2000.0).contains(&value) {
                    return Err(status::IS_INVALID_EXPOSURE_TIME);
                }
                cam.settings.exposure_ms = value;
            }
            Setting::MasterGain(value) => {
                if value > 100 {
                    return Err(status::IS_INVALID_PARAMETER);
                }
                cam.settings.master_gain = value;
            }
            Setting::PixelClockMhz(value) => {
                if !(5..=43).contains(&value) {
                    return Err(status::IS_INVALID_PIXEL_CLOCK);
                }
                cam.settings.pixel_clock_mhz = value;
            }
            Setting::Region(roi) => cam.settings.roi = roi,
            Setting::ColorMode(format) => cam.settings.format = format,
        }
        Ok(())
    }

    fn alloc_image_mem(&self, handle: DeviceHandle, byte_size: usize) -> RawResult<BufferId> {
        let mut inner = self.lock();
        if byte_size == 0 {
            return Err(status::IS_INVALID_BUFFER_SIZE);
        }
        let id = BufferId(inner.next_buffer);
        inner.next_buffer += 1;
        inner
            .camera_mut(handle)?
            .buffers
            .insert(id, vec![0u8; byte_size]);
        Ok(id)
    }

    fn add_to_sequence(&self, handle: DeviceHandle, buffer: BufferId) -> RawResult<()> {
        let mut inner = self.lock();
        if let Some(budget) = inner.register_budget {
            if inner.registered >= budget {
                return Err(status::IS_CANT_SETUP_MEMORY);
            }
        }
        let cam = inner.camera_mut(handle)?;
        if !cam.buffers.contains_key(&buffer) {
            return Err(status::IS_NO_IMAGE_MEM_ALLOCATED);
        }
        if cam.sequence.contains(&buffer) {
            return Err(status::IS_INVALID_PARAMETER);
        }
        cam.sequence.push(buffer);
        inner.registered += 1;
        Ok(())
    }

    fn clear_sequence(&self, handle: DeviceHandle) -> RawResult<()> {
        let mut inner = self.lock();
        inner.camera_mut(handle)?.sequence.clear();
        inner.registered = 0;
        Ok(())
    }

    fn free_image_mem(&self, handle: DeviceHandle, buffer: BufferId) -> RawResult<()> {
        let mut inner = self.lock();
        let cam = inner.camera_mut(handle)?;
        if cam.sequence.contains(&buffer) {
            return Err(status::IS_INVALID_PARAMETER);
        }
        if cam.buffers.remove(&buffer).is_none() {
            return Err(status::IS_NO_IMAGE_MEM_ALLOCATED);
        }
        Ok(())
    }

    fn start_capture(&self, handle: DeviceHandle, sink: FrameSink) -> RawResult<()> {
        let mut inner = self.lock();
        let interval = inner.frame_interval;
        let cam = inner.camera_mut(handle)?;
        if cam.capture.is_some() {
            return Err(status::IS_CAPTURE_RUNNING);
        }
        if cam.sequence.is_empty() {
            return Err(status::IS_SEQUENCE_LIST_EMPTY);
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let state = Arc::clone(&self.inner);
        let thread = thread::spawn(move || {
            deliver_frames(&state, &sink, &stop_rx, interval);
        });

        inner
            .camera_mut(handle)?
            .capture = Some(CaptureWorker { stop_tx, thread: Some(thread) });
        Ok(())
    }

    fn stop_capture(&self, handle: DeviceHandle) -> RawResult<()> {
        let worker = {
            let mut inner = self.lock();
            inner.camera_mut(handle)?.capture.take()
        };
        // No running capture is not an error; stopping twice is allowed.
        Self::stop_worker(worker);
        Ok(())
    }

    fn read_frame(&self, handle: DeviceHandle, buffer: BufferId) -> RawResult<Vec<u8>> {
        let inner = self.lock();
        inner
            .camera(handle)?
            .buffers
            .get(&buffer)
            .cloned()
            .ok_or(status::IS_NO_IMAGE_MEM_ALLOCATED)
    }

    fn requeue_buffer(&self, handle: DeviceHandle, buffer: BufferId) -> RawResult<()> {
        let inner = self.lock();
        let cam = inner.camera(handle)?;
        if cam.buffers.contains_key(&buffer) {
            Ok(())
        } else {
            Err(status::IS_NO_IMAGE_MEM_ALLOCATED)
        }
    }
}

/// Generator loop standing in for the driver's delivery thread.
///
/// Paces itself on the stop channel so a stop request interrupts the sleep,
/// then writes one frame per tick into whichever ring buffer is free. When
/// none is free the frame is dropped, as the real ring does.
fn deliver_frames(
    state: &Arc<Mutex<SimInner>>,
    sink: &FrameSink,
    stop_rx: &mpsc::Receiver<()>,
    interval: Duration,
) {
    let started = Instant::now();
    let mut frame_number: u64 = 0;

    loop {
        match stop_rx.recv_timeout(interval) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        let mut inner = state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(cam) = inner.open.as_mut() else { break };

        let Some(id) = sink.reserve() else {
            log::debug!("ring full, dropping simulated frame");
            continue;
        };

        frame_number += 1;
        let settings = cam.settings.clone();
        let pattern = inner.pattern;
        if let Some(data) = inner
            .open
            .as_mut()
            .and_then(|cam| cam.buffers.get_mut(&id))
        {
            render(pattern, &settings, frame_number, data);
        }

        let info = FrameInfo {
            frame_number,
            timestamp: started.elapsed(),
            width: settings.roi.width,
            height: settings.roi.height,
            format: settings.format,
        };
        drop(inner);

        if !sink.commit(id, info) {
            // Pool shut down mid-write; the session is stopping.
            break;
        }
    }
}

/// Write the test pattern into one frame buffer.
fn render(pattern: TestPattern, settings: &CameraConfig, frame_number: u64, data: &mut [u8]) {
    let width = settings.roi.width.max(1);
    let bpp = settings.format.bytes_per_pixel() as usize;

    match pattern {
        TestPattern::Solid(value) => data.fill(value),
        TestPattern::Gradient => {
            for (index, byte) in data.iter_mut().enumerate() {
                let x = (index / bpp) as u32 % width;
                #[allow(clippy::cast_possible_truncation)]
                let shade = ((u64::from(x) * 255 / u64::from(width)) + frame_number) % 256;
                *byte = shade as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Roi;

    #[test]
    fn test_open_reports_absent_denied_and_busy_devices() {
        let sim = SimulatedCamera::new()
            .with_attached(3)
            .with_denied_device(1)
            .with_busy_device(2);

        assert_eq!(sim.open(7), Err(status::IS_CANT_OPEN_DEVICE));
        assert_eq!(sim.open(1), Err(status::IS_ACCESS_VIOLATION));
        assert_eq!(sim.open(2), Err(status::IS_CAPTURE_RUNNING));
        assert!(sim.open(0).is_ok());
    }

    #[test]
    fn test_stale_handle_is_rejected() {
        let sim = SimulatedCamera::new();
        let handle = sim.open(0).expect("open");
        sim.close(handle).expect("close");

        assert_eq!(
            sim.sensor_limits(handle).err(),
            Some(status::IS_INVALID_CAMERA_HANDLE)
        );
    }

    #[test]
    fn test_apply_checks_driver_side_ranges() {
        let sim = SimulatedCamera::new();
        let handle = sim.open(0).expect("open");

        assert_eq!(
            sim.apply(handle, &Setting::ExposureMs(-1.0)),
            Err(status::IS_INVALID_EXPOSURE_TIME)
        );
        assert_eq!(
            sim.apply(handle, &Setting::PixelClockMhz(500)),
            Err(status::IS_INVALID_PIXEL_CLOCK)
        );
        assert!(sim.apply(handle, &Setting::MasterGain(50)).is_ok());
    }

    #[test]
    fn test_buffer_bookkeeping() {
        let sim = SimulatedCamera::new();
        let handle = sim.open(0).expect("open");

        let id = sim.alloc_image_mem(handle, 1024).expect("alloc");
        assert_eq!(sim.live_buffers(), 1);

        sim.add_to_sequence(handle, id).expect("register");
        assert_eq!(sim.sequence_len(), 1);
        assert_eq!(
            sim.add_to_sequence(handle, id),
            Err(status::IS_INVALID_PARAMETER),
            "no identity may be registered twice"
        );
        assert_eq!(
            sim.free_image_mem(handle, id),
            Err(status::IS_INVALID_PARAMETER),
            "freeing a registered buffer is refused"
        );

        sim.clear_sequence(handle).expect("clear");
        sim.free_image_mem(handle, id).expect("free");
        assert_eq!(sim.live_buffers(), 0);
    }

    #[test]
    fn test_start_capture_requires_registered_ring() {
        let sim = SimulatedCamera::new();
        let handle = sim.open(0).expect("open");
        let pool = crate::pool::BufferPool::allocate(&sim, handle, 2, 64).expect("pool");

        // Empty the ring behind the pool's back to hit the driver check.
        sim.clear_sequence(handle).expect("clear");
        assert_eq!(
            sim.start_capture(handle, pool.sink()),
            Err(status::IS_SEQUENCE_LIST_EMPTY)
        );
    }

    #[test]
    fn test_generated_frames_arrive_through_sink() {
        let sim = SimulatedCamera::new().with_frame_interval(Duration::from_millis(5));
        let handle = sim.open(0).expect("open");
        sim.apply(handle, &Setting::Region(Roi::full(64, 48))).expect("roi");

        let pool =
            crate::pool::BufferPool::allocate(&sim, handle, 3, 64 * 48).expect("pool");
        sim.start_capture(handle, pool.sink()).expect("start");

        let (id, info) = pool.claim_filled(Duration::from_secs(5)).expect("claim");
        assert_eq!(info.frame_number, 1);
        assert_eq!(info.width, 64);
        assert_eq!(info.height, 48);

        let data = sim.read_frame(handle, id).expect("read");
        assert_eq!(data.len(), 64 * 48);

        sim.stop_capture(handle).expect("stop");
        sim.close(handle).expect("close");
    }

    #[test]
    fn test_solid_pattern_fills_every_byte() {
        let settings = CameraConfig::default();
        let mut data = vec![0u8; 64];
        render(TestPattern::Solid(170), &settings, 1, &mut data);
        assert!(data.iter().all(|&byte| byte == 170));
    }

    #[test]
    fn test_gradient_brightens_left_to_right() {
        let mut settings = CameraConfig::default();
        settings.roi = Roi::full(64, 1);
        let mut data = vec![0u8; 64];
        render(TestPattern::Gradient, &settings, 0, &mut data);
        let first = *data.first().expect("first byte");
        let last = *data.last().expect("last byte");
        assert!(last > first, "gradient should rise: {first} -> {last}");
    }
}
