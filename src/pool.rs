//! Ring-buffer pool shared between the driver's delivery path and the
//! consumer.
//!
//! The pool owns the mapping between driver buffer identities and their
//! ring state. A buffer cycles `Free` → `Filling` → `Filled` → `Claimed` →
//! `Free`; the sum across states always equals the pool's fixed count.
//! Frame arrival is a blocking wait on a condition variable guarded by the
//! pool mutex: the delivery path commits a buffer and notifies, the
//! consumer never polls.

use crate::adapter::{BufferId, CameraAdapter, DeviceHandle, FrameInfo};
use crate::error::{translate, FailureKind, Result};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Ring state of one registered buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    /// Registered and ready for the driver to write into.
    Free,
    /// Currently being written by the delivery path.
    Filling,
    /// Holds a completed frame, queued for the consumer.
    Filled,
    /// Contents handed to the consumer, awaiting release.
    Claimed,
}

#[derive(Debug)]
struct Slot {
    id: BufferId,
    state: SlotState,
}

#[derive(Debug)]
struct PoolInner {
    slots: Vec<Slot>,
    /// Completed frames in arrival order.
    filled: VecDeque<(BufferId, FrameInfo)>,
    /// Set on teardown or cancellation; wakes and fails any pending claim.
    shut_down: bool,
}

impl PoolInner {
    fn slot_mut(&mut self, id: BufferId) -> Option<&mut Slot> {
        self.slots.iter_mut().find(|slot| slot.id == id)
    }
}

#[derive(Debug)]
struct PoolShared {
    inner: Mutex<PoolInner>,
    filled_cond: Condvar,
}

impl PoolShared {
    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counts of buffers per ring state, in cycle order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolCounts {
    /// Buffers ready for the driver.
    pub free: usize,
    /// Buffers being written.
    pub filling: usize,
    /// Completed frames awaiting a claim.
    pub filled: usize,
    /// Buffers claimed by the consumer.
    pub claimed: usize,
}

impl PoolCounts {
    /// Total buffers across every state.
    #[must_use]
    pub const fn total(&self) -> usize {
        self.free + self.filling + self.filled + self.claimed
    }
}

/// Fixed set of frame buffers registered with the driver for one capture.
#[derive(Debug)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
    ids: Vec<BufferId>,
    byte_size: usize,
    torn_down: AtomicBool,
}

impl BufferPool {
    /// Allocate `count` buffers of `byte_size` bytes each and register them
    /// with the driver's ring sequence.
    ///
    /// A pool of one cannot double-buffer, so `count < 2` is rejected, as is
    /// a zero byte size. If allocation or registration fails partway, every
    /// buffer registered so far is rolled back before the error surfaces.
    pub fn allocate<A: CameraAdapter + ?Sized>(
        adapter: &A,
        handle: DeviceHandle,
        count: u32,
        byte_size: usize,
    ) -> Result<Self> {
        if count < 2 || byte_size == 0 {
            return Err(FailureKind::InvalidParameter);
        }

        let mut ids: Vec<BufferId> = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let outcome = translate(adapter.alloc_image_mem(handle, byte_size)).and_then(|id| {
                ids.push(id);
                translate(adapter.add_to_sequence(handle, id))
            });

            if let Err(kind) = outcome {
                log::warn!("buffer registration failed after {} of {count}: {kind}", ids.len());
                roll_back(adapter, handle, &ids);
                return Err(kind);
            }
        }

        log::debug!("registered {count} buffers of {byte_size} bytes");
        let slots = ids
            .iter()
            .map(|&id| Slot { id, state: SlotState::Free })
            .collect();

        Ok(Self {
            shared: Arc::new(PoolShared {
                inner: Mutex::new(PoolInner {
                    slots,
                    filled: VecDeque::with_capacity(count as usize),
                    shut_down: false,
                }),
                filled_cond: Condvar::new(),
            }),
            ids,
            byte_size,
            torn_down: AtomicBool::new(false),
        })
    }

    /// Number of buffers in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the pool holds no buffers. Never true for an allocated pool.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Byte size each buffer was registered with.
    #[must_use]
    pub const fn buffer_size(&self) -> usize {
        self.byte_size
    }

    /// Handle for the driver's delivery path.
    #[must_use]
    pub fn sink(&self) -> FrameSink {
        FrameSink { shared: Arc::clone(&self.shared) }
    }

    /// Per-state buffer counts. The total always equals [`Self::len`].
    #[must_use]
    pub fn counts(&self) -> PoolCounts {
        let inner = self.shared.lock();
        let mut counts = PoolCounts { free: 0, filling: 0, filled: 0, claimed: 0 };
        for slot in &inner.slots {
            match slot.state {
                SlotState::Free => counts.free += 1,
                SlotState::Filling => counts.filling += 1,
                SlotState::Filled => counts.filled += 1,
                SlotState::Claimed => counts.claimed += 1,
            }
        }
        counts
    }

    /// Block until a buffer holds a completed frame, then claim it.
    ///
    /// Returns the buffer's identity and frame metadata; the buffer stays
    /// claimed until [`Self::release`]. Fails with `Timeout` if nothing
    /// arrives within `timeout`, or if the pool is shut down while waiting
    /// (a stop or close from another thread cancels the wait this way).
    pub fn claim_filled(&self, timeout: Duration) -> Result<(BufferId, FrameInfo)> {
        self.shared.claim_filled(timeout)
    }

    /// Return a claimed buffer to the ring.
    ///
    /// Fails with `InvalidParameter` if the identity is not part of this
    /// pool or the buffer is not currently claimed.
    pub fn release(&self, id: BufferId) -> Result<()> {
        let mut inner = self.shared.lock();
        let slot = inner.slot_mut(id).ok_or(FailureKind::InvalidParameter)?;
        if slot.state != SlotState::Claimed {
            return Err(FailureKind::InvalidParameter);
        }
        slot.state = SlotState::Free;
        Ok(())
    }

    /// Wake any pending claim and refuse further deliveries.
    ///
    /// Safe to call from a thread other than the one blocked in
    /// [`Self::claim_filled`].
    pub fn shut_down(&self) {
        let mut inner = self.shared.lock();
        inner.shut_down = true;
        drop(inner);
        self.shared.filled_cond.notify_all();
    }

    /// Unregister and free every buffer.
    ///
    /// Idempotent: the first call tears the ring down, a second call is a
    /// success no-op, and no buffer is ever freed twice.
    pub fn teardown<A: CameraAdapter + ?Sized>(
        &self,
        adapter: &A,
        handle: DeviceHandle,
    ) -> Result<()> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.shut_down();

        let mut first_error = translate(adapter.clear_sequence(handle)).err();
        for &id in &self.ids {
            if let Err(kind) = translate(adapter.free_image_mem(handle, id)) {
                log::warn!("failed to free buffer {id:?}: {kind}");
                first_error.get_or_insert(kind);
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Whether [`Self::teardown`] has run.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

/// Undo a partially registered ring: drop the sequence, free what was
/// allocated. Failures here are logged, not surfaced; the original
/// registration error is what the caller sees.
fn roll_back<A: CameraAdapter + ?Sized>(adapter: &A, handle: DeviceHandle, ids: &[BufferId]) {
    if let Err(code) = adapter.clear_sequence(handle) {
        log::warn!("rollback: clear_sequence reported status {code}");
    }
    for &id in ids {
        if let Err(code) = adapter.free_image_mem(handle, id) {
            log::warn!("rollback: freeing buffer {id:?} reported status {code}");
        }
    }
}

impl PoolShared {
    fn claim_filled(&self, timeout: Duration) -> Result<(BufferId, FrameInfo)> {
        // An absurdly large timeout overflows the deadline; wait unbounded.
        let deadline = Instant::now().checked_add(timeout);
        let mut inner = self.lock();

        loop {
            // Checked before draining: once shut down, queued identities
            // refer to memory the driver may already have freed.
            if inner.shut_down {
                return Err(FailureKind::Timeout);
            }
            if let Some((id, info)) = inner.filled.pop_front() {
                if let Some(slot) = inner.slot_mut(id) {
                    slot.state = SlotState::Claimed;
                }
                return Ok((id, info));
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(FailureKind::Timeout);
                    }
                    deadline - now
                }
                None => Duration::MAX,
            };
            let (guard, _) = self
                .filled_cond
                .wait_timeout(inner, wait)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }
}

/// Delivery-side handle to the pool.
///
/// Held by the adapter while capture runs; this is the only state shared
/// between the driver's asynchronous delivery context and the consumer.
#[derive(Debug, Clone)]
pub struct FrameSink {
    shared: Arc<PoolShared>,
}

impl FrameSink {
    /// Take a free buffer for writing. Returns `None` when every buffer is
    /// occupied or the pool is shut down; the driver drops the frame then.
    #[must_use]
    pub fn reserve(&self) -> Option<BufferId> {
        let mut inner = self.shared.lock();
        if inner.shut_down {
            return None;
        }
        let slot = inner.slots.iter_mut().find(|slot| slot.state == SlotState::Free)?;
        slot.state = SlotState::Filling;
        Some(slot.id)
    }

    /// Publish a reserved buffer as a completed frame and wake the consumer.
    ///
    /// Returns `false` if the buffer was not reserved or the pool shut down
    /// mid-write; the buffer goes back to the free state in that case.
    pub fn commit(&self, id: BufferId, info: FrameInfo) -> bool {
        let mut inner = self.shared.lock();
        let shut_down = inner.shut_down;
        let Some(slot) = inner.slot_mut(id) else {
            return false;
        };
        if slot.state != SlotState::Filling {
            return false;
        }

        if shut_down {
            slot.state = SlotState::Free;
            return false;
        }

        slot.state = SlotState::Filled;
        inner.filled.push_back((id, info));
        drop(inner);
        self.shared.filled_cond.notify_one();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PixelFormat;
    use crate::sim::SimulatedCamera;
    use std::thread;

    fn info(frame_number: u64) -> FrameInfo {
        FrameInfo {
            frame_number,
            timestamp: Duration::from_millis(frame_number * 33),
            width: 64,
            height: 48,
            format: PixelFormat::Mono8,
        }
    }

    fn pool_of(count: u32) -> (SimulatedCamera, DeviceHandle, BufferPool) {
        let sim = SimulatedCamera::new();
        let handle = sim.open(0).expect("open");
        let pool = BufferPool::allocate(&sim, handle, count, 64 * 48).expect("allocate");
        (sim, handle, pool)
    }

    #[test]
    fn test_allocate_rejects_degenerate_pools() {
        let sim = SimulatedCamera::new();
        let handle = sim.open(0).expect("open");

        assert_eq!(
            BufferPool::allocate(&sim, handle, 1, 1024).err(),
            Some(FailureKind::InvalidParameter)
        );
        assert_eq!(
            BufferPool::allocate(&sim, handle, 4, 0).err(),
            Some(FailureKind::InvalidParameter)
        );
        assert_eq!(sim.live_buffers(), 0);
    }

    #[test]
    fn test_allocate_starts_all_free() {
        let (_sim, _handle, pool) = pool_of(4);
        let counts = pool.counts();
        assert_eq!(counts.free, 4);
        assert_eq!(counts.total(), pool.len());
    }

    #[test]
    fn test_partial_registration_rolls_back() {
        let sim = SimulatedCamera::new().with_register_failures_after(2);
        let handle = sim.open(0).expect("open");

        let result = BufferPool::allocate(&sim, handle, 4, 1024);
        assert!(result.is_err());
        assert_eq!(sim.live_buffers(), 0, "rollback must free every buffer");
        assert_eq!(sim.sequence_len(), 0);
    }

    #[test]
    fn test_claim_and_release_keep_state_sum() {
        let (_sim, _handle, pool) = pool_of(3);
        let sink = pool.sink();

        let id = sink.reserve().expect("reserve");
        assert_eq!(pool.counts().filling, 1);
        assert!(sink.commit(id, info(1)));
        assert_eq!(pool.counts().filled, 1);

        let (claimed, meta) = pool.claim_filled(Duration::from_millis(10)).expect("claim");
        assert_eq!(claimed, id);
        assert_eq!(meta.frame_number, 1);
        assert_eq!(pool.counts().claimed, 1);

        pool.release(claimed).expect("release");
        let counts = pool.counts();
        assert_eq!(counts.free, 3);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_frames_claimed_in_arrival_order() {
        let (_sim, _handle, pool) = pool_of(3);
        let sink = pool.sink();

        let first = sink.reserve().expect("reserve");
        let second = sink.reserve().expect("reserve");
        assert!(sink.commit(first, info(1)));
        assert!(sink.commit(second, info(2)));

        let (_, meta) = pool.claim_filled(Duration::from_millis(10)).expect("claim");
        assert_eq!(meta.frame_number, 1);
        let (_, meta) = pool.claim_filled(Duration::from_millis(10)).expect("claim");
        assert_eq!(meta.frame_number, 2);
    }

    #[test]
    fn test_release_unknown_or_unclaimed_is_invalid() {
        let (_sim, _handle, pool) = pool_of(2);

        assert_eq!(pool.release(BufferId(999)), Err(FailureKind::InvalidParameter));

        let sink = pool.sink();
        let id = sink.reserve().expect("reserve");
        // Still filling, not claimed.
        assert_eq!(pool.release(id), Err(FailureKind::InvalidParameter));
    }

    #[test]
    fn test_reserve_exhausts_at_pool_size() {
        let (_sim, _handle, pool) = pool_of(2);
        let sink = pool.sink();

        assert!(sink.reserve().is_some());
        assert!(sink.reserve().is_some());
        assert!(sink.reserve().is_none(), "no third buffer to hand out");
    }

    #[test]
    fn test_claim_times_out_without_delivery() {
        let (_sim, _handle, pool) = pool_of(2);
        let started = Instant::now();
        let result = pool.claim_filled(Duration::from_millis(30));
        assert_eq!(result.err(), Some(FailureKind::Timeout));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_claim_wakes_on_delivery_before_deadline() {
        let (_sim, _handle, pool) = pool_of(2);
        let sink = pool.sink();

        let delivery = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            let id = sink.reserve().expect("reserve");
            assert!(sink.commit(id, info(7)));
        });

        let (_, meta) = pool.claim_filled(Duration::from_secs(5)).expect("claim");
        assert_eq!(meta.frame_number, 7);
        delivery.join().expect("delivery thread");
    }

    #[test]
    fn test_shut_down_unblocks_pending_claim() {
        let (_sim, _handle, pool) = pool_of(2);
        let sink = pool.sink();

        let waiter = thread::spawn({
            let shared = Arc::clone(&pool.shared);
            move || shared.claim_filled(Duration::from_secs(30))
        });

        thread::sleep(Duration::from_millis(20));
        pool.shut_down();

        let result = waiter.join().expect("waiter thread");
        assert_eq!(result.err(), Some(FailureKind::Timeout));

        // Deliveries after shutdown are refused.
        assert!(sink.reserve().is_none());
    }

    #[test]
    fn test_commit_during_shutdown_returns_buffer_to_ring() {
        let (_sim, _handle, pool) = pool_of(2);
        let sink = pool.sink();

        let id = sink.reserve().expect("reserve");
        pool.shut_down();
        assert!(!sink.commit(id, info(1)));
        assert_eq!(pool.counts().free, 2);
    }

    #[test]
    fn test_claim_after_teardown_yields_no_buffer() {
        let (sim, handle, pool) = pool_of(2);
        let sink = pool.sink();

        // A frame is queued, then the ring is torn down underneath it.
        let id = sink.reserve().expect("reserve");
        assert!(sink.commit(id, info(1)));
        pool.teardown(&sim, handle).expect("teardown");
        assert_eq!(sim.live_buffers(), 0);

        // The queued identity now points at freed driver memory and must
        // not be handed out.
        assert_eq!(
            pool.claim_filled(Duration::from_millis(10)).err(),
            Some(FailureKind::Timeout)
        );
    }

    #[test]
    fn test_claim_survives_maximal_timeout() {
        let (_sim, _handle, pool) = pool_of(2);
        let sink = pool.sink();

        let id = sink.reserve().expect("reserve");
        assert!(sink.commit(id, info(3)));

        let (_, meta) = pool.claim_filled(Duration::MAX).expect("claim");
        assert_eq!(meta.frame_number, 3);
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let (sim, handle, pool) = pool_of(3);
        assert_eq!(sim.live_buffers(), 3);

        pool.teardown(&sim, handle).expect("first teardown");
        assert_eq!(sim.live_buffers(), 0);
        assert!(pool.is_torn_down());

        // Second call must not double-free anything.
        pool.teardown(&sim, handle).expect("second teardown");
        assert_eq!(sim.live_buffers(), 0);
    }
}
