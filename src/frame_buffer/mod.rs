//! FrameBuffer - bounded hand-off between acquisition and dispatch
//!
//! One buffer per camera. The acquisition thread pushes, the dispatch task
//! pops. Pushing never blocks: when the buffer is full the oldest frame is
//! evicted to make room.

use crate::config_store::PopMode;
use chrono::{DateTime, Local};
use image::RgbImage;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// One captured frame, owned by the buffer slot until popped
#[derive(Debug, Clone)]
pub struct Frame {
    pub camera_id: String,
    pub image: RgbImage,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(camera_id: impl Into<String>, image: RgbImage) -> Self {
        Self {
            camera_id: camera_id.into(),
            image,
            captured_at: Local::now(),
        }
    }

    pub fn captured_at(mut self, at: DateTime<Local>) -> Self {
        self.captured_at = at;
        self
    }
}

/// Result of a push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Stored,
    /// Stored after evicting the oldest buffered frame
    EvictedOldest,
    /// Buffer had no room even after eviction; the new frame was dropped
    Dropped,
}

/// Buffer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameBufferStats {
    pub pushed: u64,
    pub evicted: u64,
    pub dropped: u64,
    pub popped: u64,
}

/// Drop-oldest bounded queue
pub struct FrameBuffer {
    frames: Mutex<VecDeque<Frame>>,
    capacity: usize,
    available: Notify,
    pushed: AtomicU64,
    evicted: AtomicU64,
    dropped: AtomicU64,
    popped: AtomicU64,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            available: Notify::new(),
            pushed: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            popped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        // a panicked holder cannot leave the deque half-updated
        self.frames.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Non-blocking push with drop-oldest eviction
    pub fn push(&self, frame: Frame) -> PushOutcome {
        let outcome = {
            let mut frames = self.lock();
            let mut evicted = false;
            if frames.len() >= self.capacity {
                evicted = frames.pop_front().is_some();
            }
            if frames.len() < self.capacity {
                frames.push_back(frame);
                if evicted {
                    PushOutcome::EvictedOldest
                } else {
                    PushOutcome::Stored
                }
            } else {
                PushOutcome::Dropped
            }
        };

        match outcome {
            PushOutcome::Stored => {
                self.pushed.fetch_add(1, Ordering::Relaxed);
            }
            PushOutcome::EvictedOldest => {
                self.pushed.fetch_add(1, Ordering::Relaxed);
                self.evicted.fetch_add(1, Ordering::Relaxed);
            }
            PushOutcome::Dropped => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return outcome;
            }
        }

        self.available.notify_one();
        outcome
    }

    /// Pop the oldest frame without waiting
    pub fn try_pop(&self) -> Option<Frame> {
        let frame = self.lock().pop_front();
        if frame.is_some() {
            self.popped.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Wait up to `timeout` for a frame
    pub async fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.available.notified();
            if let Some(frame) = self.try_pop() {
                return Some(frame);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.try_pop();
            }
        }
    }

    /// Pop according to the configured wait mode
    ///
    /// Both modes return within roughly `timeout` when no frame arrives, so
    /// the caller can observe its stop signal.
    pub async fn pop(&self, mode: PopMode, timeout: Duration) -> Option<Frame> {
        match mode {
            PopMode::Blocking => self.pop_timeout(timeout).await,
            PopMode::Poll => match self.try_pop() {
                Some(frame) => Some(frame),
                None => {
                    tokio::time::sleep(timeout).await;
                    None
                }
            },
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> FrameBufferStats {
        FrameBufferStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            popped: self.popped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn frame(seq: u8) -> Frame {
        Frame::new("cam-1", RgbImage::from_pixel(2, 2, image::Rgb([seq, 0, 0])))
    }

    fn seq_of(frame: &Frame) -> u8 {
        frame.image.get_pixel(0, 0)[0]
    }

    #[test]
    fn test_never_exceeds_capacity() {
        let buffer = FrameBuffer::new(3);
        for seq in 0..20 {
            buffer.push(frame(seq));
            assert!(buffer.len() <= 3);
        }
        assert_eq!(buffer.len(), 3);

        let stats = buffer.stats();
        assert_eq!(stats.pushed, 20);
        assert_eq!(stats.evicted, 17);
        assert_eq!(stats.dropped, 0);
    }

    #[test]
    fn test_full_push_evicts_exactly_oldest() {
        let buffer = FrameBuffer::new(3);
        assert_eq!(buffer.push(frame(1)), PushOutcome::Stored);
        assert_eq!(buffer.push(frame(2)), PushOutcome::Stored);
        assert_eq!(buffer.push(frame(3)), PushOutcome::Stored);
        assert_eq!(buffer.push(frame(4)), PushOutcome::EvictedOldest);

        let remaining: Vec<u8> = std::iter::from_fn(|| buffer.try_pop())
            .map(|f| seq_of(&f))
            .collect();
        assert_eq!(remaining, vec![2, 3, 4]);
    }

    #[test]
    fn test_evicts_oldest_unconsumed_after_partial_drain() {
        let buffer = FrameBuffer::new(2);
        buffer.push(frame(1));
        buffer.push(frame(2));
        assert_eq!(seq_of(&buffer.try_pop().unwrap()), 1);
        buffer.push(frame(3));
        assert_eq!(buffer.push(frame(4)), PushOutcome::EvictedOldest);

        assert_eq!(seq_of(&buffer.try_pop().unwrap()), 3);
        assert_eq!(seq_of(&buffer.try_pop().unwrap()), 4);
        assert!(buffer.try_pop().is_none());
    }

    #[test]
    fn test_zero_capacity_drops() {
        let buffer = FrameBuffer::new(0);
        assert_eq!(buffer.push(frame(1)), PushOutcome::Dropped);
        assert_eq!(buffer.stats().dropped, 1);
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_pop_timeout_returns_none_when_empty() {
        let buffer = FrameBuffer::new(2);
        let started = std::time::Instant::now();
        assert!(buffer.pop_timeout(Duration::from_millis(50)).await.is_none());
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push_from_thread() {
        let buffer = Arc::new(FrameBuffer::new(2));
        let producer = buffer.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            producer.push(frame(9));
        });

        let popped = buffer.pop(PopMode::Blocking, Duration::from_secs(5)).await;
        assert_eq!(popped.map(|f| seq_of(&f)), Some(9));
    }

    #[tokio::test]
    async fn test_poll_mode_returns_buffered_frame() {
        let buffer = FrameBuffer::new(2);
        assert!(buffer.pop(PopMode::Poll, Duration::from_millis(5)).await.is_none());
        buffer.push(frame(5));
        let popped = buffer.pop(PopMode::Poll, Duration::from_millis(5)).await;
        assert_eq!(popped.map(|f| seq_of(&f)), Some(5));
    }
}
