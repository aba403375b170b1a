//! Bounded FIFO of display frames between the capture thread and preview consumers.
//!
//! The producer never blocks: when the ring is full the oldest frame is evicted to make
//! room for the newest. Push and pop share one mutex, so every access is a true critical
//! section rather than a set of independently atomic fields.

use parking_lot::Mutex;
use ringbuf::ring_buffer::RbBase;
use ringbuf::{HeapRb, Rb};

use crate::frame::Frame;

/// Number of display frames retained for preview consumers.
pub const FRAME_RING_CAPACITY: usize = 64;

/// Fixed-capacity, overwrite-oldest frame queue.
pub struct FrameRing {
    inner: Mutex<HeapRb<Frame>>,
    capacity: usize,
}

impl FrameRing {
    /// Allocate a ring with `capacity` slots. The ring is never resized.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(HeapRb::new(capacity)),
            capacity,
        }
    }

    /// Append a frame, evicting the oldest one if the ring is full.
    ///
    /// Returns the evicted frame, if any.
    pub fn push(&self, frame: Frame) -> Option<Frame> {
        let mut rb = self.inner.lock();
        let evicted = if rb.is_full() { rb.pop() } else { None };
        // Cannot fail: a slot was freed above if the ring was full.
        let _ = rb.push(frame);
        evicted
    }

    /// Remove and return the oldest frame, or `None` if the ring is empty.
    pub fn pop_oldest(&self) -> Option<Frame> {
        self.inner.lock().pop()
    }

    /// Number of frames currently queued.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True if no frame is queued.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop every queued frame.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Slot count fixed at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for FrameRing {
    fn default() -> Self {
        Self::new(FRAME_RING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn tagged(tag: u8) -> Frame {
        Frame::gray(1, 1, vec![tag])
    }

    #[test]
    fn pop_on_empty_ring_returns_none() {
        let ring = FrameRing::default();
        assert!(ring.pop_oldest().is_none());
        assert!(ring.is_empty());
    }

    #[test]
    fn frames_come_out_oldest_first() {
        let ring = FrameRing::new(4);
        for tag in 0..3 {
            ring.push(tagged(tag));
        }
        let order: Vec<u8> = std::iter::from_fn(|| ring.pop_oldest())
            .map(|f| f.data[0])
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn overflow_evicts_oldest() {
        let ring = FrameRing::new(FRAME_RING_CAPACITY);
        for tag in 0..FRAME_RING_CAPACITY as u8 {
            assert!(ring.push(tagged(tag)).is_none());
        }

        let evicted = ring.push(tagged(FRAME_RING_CAPACITY as u8));
        assert_eq!(evicted.map(|f| f.data[0]), Some(0));
        assert_eq!(ring.len(), FRAME_RING_CAPACITY);

        // The survivors are the most recent N, still in FIFO order
        let first = ring.pop_oldest().unwrap();
        assert_eq!(first.data[0], 1);
    }

    #[test]
    fn concurrent_producer_and_consumer() {
        let ring = Arc::new(FrameRing::new(8));
        let producer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for tag in 0..200u8 {
                    ring.push(tagged(tag));
                }
            })
        };

        let mut last_seen: Option<u8> = None;
        let mut received = 0;
        while !producer.is_finished() || !ring.is_empty() {
            if let Some(frame) = ring.pop_oldest() {
                let tag = frame.data[0];
                if let Some(prev) = last_seen {
                    assert!(tag > prev, "frames must stay in order");
                }
                last_seen = Some(tag);
                received += 1;
            }
        }
        producer.join().unwrap();
        assert!(received > 0);
        assert!(ring.len() <= ring.capacity());
    }
}
