//! Timestamp-based visibility control.
//!
//! Writers draw increasing timestamps from `write_ts`. When a writer
//! releases its timestamp the matching bit in a fixed ring is set, and the
//! read timestamp is advanced through the contiguous run of set bits that
//! starts right after it. A timestamp therefore never becomes visible while
//! an earlier one is outstanding.
//!
//! `pending_reqs` counts in-flight readers and inserters. An update takes it
//! from zero to a large negative sentinel, which turns every new acquire
//! into a back-off until the update is released.

use crate::config::{GraphConfig, VisibilityMode};
use crate::types::Timestamp;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

const UPDATE_SENTINEL: i32 = i32::MIN / 2;

struct VersionState {
    write_ts: AtomicU32,
    read_ts: AtomicU32,
    pending_reqs: AtomicI32,
    ring: Box<[AtomicU64]>,
    ring_size: u32,
    /// Held by whoever is folding the ring into `read_ts`.
    advancing: Mutex<()>,
    shutdown: AtomicBool,
    interval: Duration,
}

impl VersionState {
    #[inline]
    fn slot(&self, ts: Timestamp) -> (usize, u64) {
        let bit = ts & (self.ring_size - 1);
        ((bit / 64) as usize, 1u64 << (bit % 64))
    }

    fn mark_released(&self, ts: Timestamp) {
        let (word, mask) = self.slot(ts);
        self.ring[word].fetch_or(mask, Ordering::Release);
    }

    /// Consume set bits starting at `read_ts + 1`. Returns the read
    /// timestamp afterwards; another thread may be advancing concurrently.
    fn advance(&self) -> Timestamp {
        let Some(_guard) = self.advancing.try_lock() else {
            return self.read_ts.load(Ordering::Acquire);
        };
        let mut read = self.read_ts.load(Ordering::Acquire);
        loop {
            let next = read.wrapping_add(1);
            let (word, mask) = self.slot(next);
            if self.ring[word].load(Ordering::Acquire) & mask == 0 {
                break;
            }
            self.ring[word].fetch_and(!mask, Ordering::AcqRel);
            read = next;
            self.read_ts.store(read, Ordering::Release);
        }
        read
    }

    #[inline]
    fn backoff(&self) {
        thread::sleep(self.interval);
    }

    /// Register one in-flight request, backing off while an update holds the gate.
    fn enter(&self) {
        loop {
            if self.pending_reqs.fetch_add(1, Ordering::AcqRel) >= 0 {
                return;
            }
            self.pending_reqs.fetch_sub(1, Ordering::AcqRel);
            self.backoff();
        }
    }

    fn leave(&self) {
        self.pending_reqs.fetch_sub(1, Ordering::AcqRel);
    }

    fn wait_visible(&self, ts: Timestamp) {
        while self.advance() < ts {
            self.backoff();
        }
    }
}

/// Shared visibility state for one graph. Owned by the database handle and
/// passed by reference to every transaction.
pub struct VersionManager {
    state: Arc<VersionState>,
    mode: VisibilityMode,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl VersionManager {
    pub fn new(config: &GraphConfig) -> Self {
        let ring_size = config.effective_ring_size().min(1 << 30) as u32;
        let ring = (0..ring_size / 64).map(|_| AtomicU64::new(0)).collect();
        Self {
            state: Arc::new(VersionState {
                write_ts: AtomicU32::new(1),
                read_ts: AtomicU32::new(0),
                pending_reqs: AtomicI32::new(0),
                ring,
                ring_size,
                advancing: Mutex::new(()),
                shutdown: AtomicBool::new(false),
                interval: config.advance_interval,
            }),
            mode: config.visibility,
            worker: Mutex::new(None),
        }
    }

    pub fn mode(&self) -> VisibilityMode {
        self.mode
    }

    /// Reset so that `ts` is visible and the next writer gets `ts + 1`.
    /// Callers must ensure nothing is in flight.
    pub fn init_ts(&self, ts: Timestamp) {
        let _guard = self.state.advancing.lock();
        for word in self.state.ring.iter() {
            word.store(0, Ordering::Relaxed);
        }
        self.state.read_ts.store(ts, Ordering::Release);
        self.state.write_ts.store(ts.wrapping_add(1), Ordering::Release);
    }

    pub fn read_timestamp(&self) -> Timestamp {
        self.state.read_ts.load(Ordering::Acquire)
    }

    /// Timestamp the next writer will receive.
    pub fn next_write_timestamp(&self) -> Timestamp {
        self.state.write_ts.load(Ordering::Acquire)
    }

    pub fn pending_requests(&self) -> i32 {
        self.state.pending_reqs.load(Ordering::Acquire)
    }

    pub fn acquire_read_timestamp(&self) -> Timestamp {
        self.state.enter();
        self.state.read_ts.load(Ordering::Acquire)
    }

    pub fn release_read_timestamp(&self) {
        self.state.leave();
    }

    /// Waits while the new timestamp would lap the oldest unreleased one in the ring.
    pub fn acquire_insert_timestamp(&self) -> Timestamp {
        self.state.enter();
        let ts = self.state.write_ts.fetch_add(1, Ordering::AcqRel);
        let mut waited = false;
        while ts.wrapping_sub(self.state.read_ts.load(Ordering::Acquire)) > self.state.ring_size {
            if !waited {
                debug!(ts, ring_size = self.state.ring_size, "version ring full, waiting for earlier writers");
                waited = true;
            }
            self.state.advance();
            self.state.backoff();
        }
        ts
    }

    pub fn release_insert_timestamp(&self, ts: Timestamp) {
        self.state.mark_released(ts);
        self.state.leave();
        if self.mode == VisibilityMode::WaitVisible {
            self.state.wait_visible(ts);
        }
    }

    /// Exclusive timestamp: waits for every reader and inserter to leave and
    /// for all earlier writes to become visible.
    pub fn acquire_update_timestamp(&self) -> Timestamp {
        while self
            .state
            .pending_reqs
            .compare_exchange(0, UPDATE_SENTINEL, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.state.backoff();
        }
        let ts = self.state.write_ts.fetch_add(1, Ordering::AcqRel);
        self.state.wait_visible(ts.wrapping_sub(1));
        ts
    }

    pub fn release_update_timestamp(&self, ts: Timestamp) {
        self.state.mark_released(ts);
        self.state.wait_visible(ts);
        self.state.pending_reqs.fetch_sub(UPDATE_SENTINEL, Ordering::AcqRel);
    }

    /// Fold released timestamps now instead of waiting for the background pass.
    pub fn advance(&self) -> Timestamp {
        self.state.advance()
    }

    /// Start the background advancement thread. No-op in wait-visible mode
    /// or when already running.
    pub fn start(&self) {
        let mut worker = self.worker.lock();
        if worker.is_some() || self.mode == VisibilityMode::WaitVisible {
            return;
        }
        self.state.shutdown.store(false, Ordering::Release);
        let state = Arc::clone(&self.state);
        *worker = Some(thread::spawn(move || {
            while !state.shutdown.load(Ordering::Acquire) {
                state.advance();
                thread::sleep(state.interval);
            }
            state.advance();
        }));
        debug!(interval_us = self.state.interval.as_micros() as u64, "version advancement started");
    }

    pub fn stop(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            self.state.shutdown.store(true, Ordering::Release);
            let _ = handle.join();
            debug!(read_ts = self.read_timestamp(), "version advancement stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }
}

impl Drop for VersionManager {
    fn drop(&mut self) {
        self.stop();
    }
}
