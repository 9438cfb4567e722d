// shared.rs — Serialized access for two execution contexts.
//
// Pool transitions may arrive on an I/O thread while ticks run on a periodic
// scheduler. Producers enqueue through a `PoolSender`; `SharedTracker::update`
// drains the queue into the tracker under the lock before ticking, so every
// transition sent before a tick is applied by that tick.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam::channel::{unbounded, Receiver, Sender};

use crate::config::TrackerConfig;
use crate::error::ConfigResult;
use crate::snapshot::Snapshot;
use crate::tracker::{OnsetTracker, TickInput};
use crate::types::{Polarity, Sensor};

#[derive(Clone, Copy, Debug)]
struct QueuedPool {
    polarity: Polarity,
    sensor: Sensor,
    t_s: Option<f64>,
}

/// Cloneable producer handle for pool transitions.
#[derive(Clone)]
pub struct PoolSender {
    tx: Sender<QueuedPool>,
}

impl PoolSender {
    /// Returns false once every `SharedTracker` handle is gone.
    pub fn send(&self, polarity: Polarity, sensor: Sensor, t_s: Option<f64>) -> bool {
        self.tx
            .send(QueuedPool {
                polarity,
                sensor,
                t_s,
            })
            .is_ok()
    }
}

#[derive(Clone)]
pub struct SharedTracker {
    inner: Arc<Mutex<OnsetTracker>>,
    tx: Sender<QueuedPool>,
    rx: Receiver<QueuedPool>,
}

impl SharedTracker {
    pub fn new(config: TrackerConfig) -> ConfigResult<Self> {
        let tracker = OnsetTracker::new(config)?;
        let (tx, rx) = unbounded();
        Ok(Self {
            inner: Arc::new(Mutex::new(tracker)),
            tx,
            rx,
        })
    }

    pub fn sender(&self) -> PoolSender {
        PoolSender {
            tx: self.tx.clone(),
        }
    }

    /// Record directly under the lock, after anything already queued.
    pub fn record_pool(&self, polarity: Polarity, sensor: Sensor, t_s: Option<f64>) {
        let mut tracker = self.lock();
        self.drain_into(&mut tracker);
        tracker.record_pool(polarity, sensor, t_s);
    }

    pub fn update(&self, input: &TickInput) -> Snapshot {
        let mut tracker = self.lock();
        let drained = self.drain_into(&mut tracker);
        if drained > 0 {
            log::trace!("[SHARED] applied {} queued pool event(s) before tick", drained);
        }
        tracker.update(input)
    }

    /// Run a read-only closure against the tracker.
    pub fn with_tracker<R>(&self, f: impl FnOnce(&OnsetTracker) -> R) -> R {
        let tracker = self.lock();
        f(&tracker)
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    // Tracker state is consistent between calls, so a poisoned lock is safe to reuse.
    fn lock(&self) -> MutexGuard<'_, OnsetTracker> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn drain_into(&self, tracker: &mut OnsetTracker) -> usize {
        let mut count = 0;
        while let Ok(event) = self.rx.try_recv() {
            tracker.record_pool(event.polarity, event.sensor, event.t_s);
            count += 1;
        }
        count
    }
}
