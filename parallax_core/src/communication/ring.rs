//! Latest-value snapshot ring.
//!
//! A fixed 256-slot circular buffer indexed by a monotonic serial number.
//! The single writer stores `(serial, event)` into slot `serial % 256` and
//! only then publishes the serial with Release ordering, so a reader that
//! observes serial `n` (Acquire) is guaranteed slot `n % 256` holds event
//! `n` or a later lap of the same slot. Snapshots are taken under a
//! per-slot mutex, which is uncontended unless a reader stalls for a full
//! ring of publishes, so a snapshot is never torn; the serial re-read
//! afterwards detects a lapped slot and chases the fresh value.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::event::DynEventRef;

/// Slots in the latest-value ring. Bounds how far a reader may stall, in
/// publishes, before it starts observing values newer than the serial it
/// loaded.
pub(crate) const RING_SLOTS: u64 = 256;

/// Bound on snapshot retries when the writer keeps lapping the reader.
const SNAPSHOT_RETRIES: usize = 4;

pub(crate) struct LatestRing {
    /// Serial of the newest published event. 0 means nothing published;
    /// the first event gets serial 1.
    serial: AtomicU64,
    slots: Vec<Mutex<Option<(u64, DynEventRef)>>>,
}

impl LatestRing {
    pub fn new() -> Self {
        Self {
            serial: AtomicU64::new(0),
            slots: (0..RING_SLOTS).map(|_| Mutex::new(None)).collect(),
        }
    }

    /// Store `event` and publish its serial number. Single writer only;
    /// the serial is read relaxed and bumped by exactly one.
    pub fn publish(&self, event: DynEventRef) -> u64 {
        let serial = self.serial.load(Ordering::Relaxed) + 1;
        // The old Arc in the slot drops here; this is where an event dies
        // once no queue or handle still holds it.
        *self.slots[(serial % RING_SLOTS) as usize].lock() = Some((serial, event));
        self.serial.store(serial, Ordering::Release);
        serial
    }

    /// Serial of the newest published event, 0 before the first publish.
    pub fn serial(&self) -> u64 {
        self.serial.load(Ordering::Acquire)
    }

    /// Snapshot the latest event, or `None` before the first publish.
    ///
    /// The returned pair is always a consistently published `(serial,
    /// event)`; the serial may exceed the one first observed if the writer
    /// advanced mid-read. If the writer laps the reader on every retry,
    /// the last stable snapshot is returned.
    pub fn latest(&self) -> Option<(u64, DynEventRef)> {
        let mut observed = self.serial.load(Ordering::Acquire);
        if observed == 0 {
            return None;
        }
        let mut snapshot = None;
        for _ in 0..SNAPSHOT_RETRIES {
            if let Some(pair) = self.slots[(observed % RING_SLOTS) as usize].lock().clone() {
                snapshot = Some(pair);
            }
            let current = self.serial.load(Ordering::Acquire);
            // Slot `observed` is only recycled once the writer reaches
            // observed + RING_SLOTS; short of that the snapshot is the
            // event we aimed for.
            if current.wrapping_sub(observed) < RING_SLOTS - 1 {
                break;
            }
            observed = current;
        }
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ev(n: u64) -> DynEventRef {
        Arc::new(n)
    }

    fn value(pair: &(u64, DynEventRef)) -> u64 {
        *pair.1.downcast_ref::<u64>().unwrap()
    }

    #[test]
    fn test_empty_ring_returns_none() {
        let ring = LatestRing::new();
        assert!(ring.latest().is_none());
        assert_eq!(ring.serial(), 0);
    }

    #[test]
    fn test_latest_tracks_publishes() {
        let ring = LatestRing::new();
        for n in 1..=5 {
            assert_eq!(ring.publish(ev(n * 10)), n);
            let pair = ring.latest().unwrap();
            assert_eq!(pair.0, n);
            assert_eq!(value(&pair), n * 10);
        }
    }

    #[test]
    fn test_serial_survives_a_full_lap() {
        let ring = LatestRing::new();
        for n in 1..=(RING_SLOTS * 3 + 7) {
            ring.publish(ev(n));
        }
        let pair = ring.latest().unwrap();
        assert_eq!(pair.0, RING_SLOTS * 3 + 7);
        assert_eq!(value(&pair), RING_SLOTS * 3 + 7);
    }

    #[test]
    fn test_old_events_are_released_when_lapped() {
        let ring = LatestRing::new();
        let first: DynEventRef = Arc::new(1u64);
        let probe = Arc::downgrade(&first);
        ring.publish(first);
        // One full lap recycles slot 1
        for n in 2..=(RING_SLOTS + 1) {
            ring.publish(ev(n));
        }
        assert!(probe.upgrade().is_none());
    }

    #[test]
    fn test_reader_races_writer_monotonically() {
        let ring = Arc::new(LatestRing::new());
        let writer_ring = Arc::clone(&ring);
        let writer = std::thread::spawn(move || {
            for n in 1..=10_000u64 {
                writer_ring.publish(ev(n));
            }
        });

        loop {
            if let Some(pair) = ring.latest() {
                let v = value(&pair);
                assert!((1..=10_000).contains(&v));
                assert_eq!(pair.0, v, "serial and payload drifted apart");
                if v == 10_000 {
                    break;
                }
            }
        }
        writer.join().unwrap();
    }
}
