use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

use crate::capture::Frame;

/// What the consumer should do next.
#[derive(Debug)]
pub enum NextFrame {
    Frame(Frame),
    /// The ceiling has been reached; no more frames will be encoded.
    Drained,
    Cancelled,
    /// Nothing queued yet.
    Idle,
}

struct QueueState {
    frames: VecDeque<Frame>,
    ceiling: Option<usize>,
    cancelled: bool,
}

impl QueueState {
    fn next(&mut self, encoded: usize) -> Option<NextFrame> {
        if self.cancelled {
            return Some(NextFrame::Cancelled);
        }
        if matches!(self.ceiling, Some(ceiling) if encoded >= ceiling) {
            return Some(NextFrame::Drained);
        }
        self.frames.pop_front().map(NextFrame::Frame)
    }
}

/// FIFO of captured frames shared by the sampler and the encode worker.
///
/// The frame-count ceiling lives under the same lock as the frames so a
/// `set_ceiling` can never race with the consumer's end-of-stream check.
pub struct FrameQueue {
    state: Mutex<QueueState>,
    wake: Condvar,
}

impl FrameQueue {
    pub fn new(ceiling: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                frames: VecDeque::new(),
                ceiling,
                cancelled: false,
            }),
            wake: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn enqueue(&self, frame: Frame) {
        self.lock().frames.push_back(frame);
        self.wake.notify_one();
    }

    pub fn try_dequeue(&self) -> Option<Frame> {
        self.lock().frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frames.is_empty()
    }

    /// Drops every buffered frame and returns how many were discarded.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let dropped = state.frames.len();
        state.frames.clear();
        dropped
    }

    pub fn ceiling(&self) -> Option<usize> {
        self.lock().ceiling
    }

    pub fn set_ceiling(&self, ceiling: usize) {
        self.lock().ceiling = Some(ceiling);
        self.wake.notify_all();
    }

    pub fn cancel(&self) {
        self.lock().cancelled = true;
        self.wake.notify_all();
    }

    /// Non-blocking consumer step.
    pub fn poll_next(&self, encoded: usize) -> NextFrame {
        self.lock().next(encoded).unwrap_or(NextFrame::Idle)
    }

    /// Blocks until a frame arrives, the ceiling is reached, the queue is
    /// cancelled, or `idle` elapses.
    pub fn wait_next(&self, encoded: usize, idle: Duration) -> NextFrame {
        let mut state = self.lock();
        loop {
            if let Some(next) = state.next(encoded) {
                return next;
            }
            let (guard, timeout) = self
                .wake
                .wait_timeout(state, idle)
                .unwrap_or_else(|e| e.into_inner());
            state = guard;
            if timeout.timed_out() {
                return state.next(encoded).unwrap_or(NextFrame::Idle);
            }
        }
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(None)
    }
}
