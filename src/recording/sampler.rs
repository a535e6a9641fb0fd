use std::time::Duration;

use crate::capture::Frame;
use crate::error::RecorderError;

use super::{FrameQueue, SessionLimit};

/// Fixed-timestep accumulator deciding which ticks produce a frame.
#[derive(Debug, Clone)]
pub struct SamplingClock {
    accumulated: f64,
    period: f64,
    sampled: usize,
    limit: SessionLimit,
}

impl SamplingClock {
    pub fn new(fps: u32, limit: SessionLimit) -> Self {
        let limit = match limit {
            SessionLimit::Frames(n) => SessionLimit::Frames(n.max(1)),
            SessionLimit::Unbounded => SessionLimit::Unbounded,
        };
        Self {
            accumulated: 0.0,
            period: 1.0 / f64::from(fps.max(1)),
            sampled: 0,
            limit,
        }
    }

    pub fn sampled(&self) -> usize {
        self.sampled
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.limit, SessionLimit::Frames(max) if self.sampled >= max)
    }

    /// Adds `delta` and reports whether this tick is due for a capture.
    /// At most one period is consumed per call; any surplus beyond that is dropped.
    pub fn advance(&mut self, delta: Duration) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.accumulated += delta.as_secs_f64();
        if self.accumulated < self.period {
            return false;
        }
        self.accumulated -= self.period;
        if self.accumulated >= self.period {
            self.accumulated %= self.period;
        }
        true
    }

    /// Counts a captured frame. Returns true when this sample hit the limit.
    pub fn record_sample(&mut self) -> bool {
        self.sampled += 1;
        self.is_exhausted()
    }

    pub fn reset(&mut self) {
        self.accumulated = 0.0;
        self.sampled = 0;
    }
}

#[derive(Debug)]
pub enum SampleOutcome {
    /// Not enough time has accumulated.
    Waiting,
    Emitted { index: u64 },
    /// Emitted the last frame the budget allows.
    LimitReached { index: u64 },
    /// The capture hook failed; the tick is skipped.
    CaptureFailed(RecorderError),
    /// The budget was already spent.
    Exhausted,
}

/// Drives a [`SamplingClock`] and pushes captured frames into a queue.
#[derive(Debug, Clone)]
pub struct FrameSampler {
    clock: SamplingClock,
}

impl FrameSampler {
    pub fn new(fps: u32, limit: SessionLimit) -> Self {
        Self {
            clock: SamplingClock::new(fps, limit),
        }
    }

    pub fn frames_sampled(&self) -> usize {
        self.clock.sampled()
    }

    pub fn reset(&mut self) {
        self.clock.reset();
    }

    /// `capture` runs only when a frame is due and receives the sample index.
    pub fn sample<F>(&mut self, delta: Duration, capture: F, queue: &FrameQueue) -> SampleOutcome
    where
        F: FnOnce(u64) -> anyhow::Result<Frame>,
    {
        if self.clock.is_exhausted() {
            return SampleOutcome::Exhausted;
        }
        if !self.clock.advance(delta) {
            return SampleOutcome::Waiting;
        }

        let index = self.clock.sampled() as u64;
        match capture(index) {
            Ok(frame) => {
                queue.enqueue(frame);
                if self.clock.record_sample() {
                    SampleOutcome::LimitReached { index }
                } else {
                    SampleOutcome::Emitted { index }
                }
            }
            Err(err) => SampleOutcome::CaptureFailed(RecorderError::from(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;
    use anyhow::anyhow;

    fn pixel(index: u64) -> anyhow::Result<Frame> {
        Ok(Frame::new(1, 1, PixelFormat::Rgb, vec![1, 2, 3], index)?)
    }

    fn run(fps: u32, limit: SessionLimit, delta: Duration, ticks: usize) -> (usize, usize) {
        let mut sampler = FrameSampler::new(fps, limit);
        let queue = FrameQueue::default();
        let mut limit_hits = 0;
        for _ in 0..ticks {
            let before = queue.len();
            let outcome = sampler.sample(delta, pixel, &queue);
            assert!(queue.len() <= before + 1);
            if matches!(outcome, SampleOutcome::LimitReached { .. }) {
                limit_hits += 1;
            }
        }
        (queue.len(), limit_hits)
    }

    #[test]
    fn test_exact_period_ticks() {
        let (frames, hits) = run(10, SessionLimit::Frames(20), Duration::from_millis(100), 20);
        assert_eq!(frames, 20);
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_rate_matches_fps_with_fast_ticks() {
        // 2 seconds of 60 Hz ticks at 15 fps.
        let (frames, _) = run(15, SessionLimit::Unbounded, Duration::from_secs_f64(1.0 / 60.0), 120);
        assert!((29..=31).contains(&frames), "got {}", frames);
    }

    #[test]
    fn test_irregular_ticks_average_out() {
        let mut sampler = FrameSampler::new(10, SessionLimit::Unbounded);
        let queue = FrameQueue::default();
        let pattern = [30u64, 70, 20, 110, 45, 25];
        let mut total = Duration::ZERO;
        for i in 0..60 {
            let delta = Duration::from_millis(pattern[i % pattern.len()]);
            total += delta;
            sampler.sample(delta, pixel, &queue);
        }
        let expected = (total.as_secs_f64() * 10.0).round() as i64;
        assert!((queue.len() as i64 - expected).abs() <= 1);
    }

    #[test]
    fn test_one_frame_per_tick_even_after_stall() {
        let mut sampler = FrameSampler::new(30, SessionLimit::Unbounded);
        let queue = FrameQueue::default();
        sampler.sample(Duration::from_secs(2), pixel, &queue);
        assert_eq!(queue.len(), 1);
        sampler.sample(Duration::ZERO, pixel, &queue);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_ceiling_never_exceeded() {
        let (frames, hits) = run(30, SessionLimit::Frames(5), Duration::from_millis(50), 100);
        assert_eq!(frames, 5);
        assert_eq!(hits, 1);
    }

    #[test]
    fn test_capture_failure_skips_tick() {
        let mut sampler = FrameSampler::new(10, SessionLimit::Frames(3));
        let queue = FrameQueue::default();
        let outcome = sampler.sample(Duration::from_millis(100), |_| Err(anyhow!("lost surface")), &queue);
        match outcome {
            SampleOutcome::CaptureFailed(RecorderError::Capture(msg)) => assert!(msg.contains("lost surface")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(sampler.frames_sampled(), 0);

        let outcome = sampler.sample(Duration::from_millis(100), pixel, &queue);
        assert!(matches!(outcome, SampleOutcome::Emitted { index: 0 }));
    }

    #[test]
    fn test_capture_not_called_when_not_due() {
        let mut sampler = FrameSampler::new(10, SessionLimit::Frames(3));
        let queue = FrameQueue::default();
        let outcome = sampler.sample(
            Duration::from_millis(10),
            |_| -> anyhow::Result<Frame> { panic!("capture must not run") },
            &queue,
        );
        assert!(matches!(outcome, SampleOutcome::Waiting));
    }

    #[test]
    fn test_zero_fps_clamped() {
        let mut clock = SamplingClock::new(0, SessionLimit::Frames(0));
        assert!(!clock.is_exhausted());
        assert!(!clock.advance(Duration::from_millis(500)));
        assert!(clock.advance(Duration::from_millis(500)));
        assert!(clock.record_sample());
        assert!(!clock.advance(Duration::from_secs(5)));
    }

    #[test]
    fn test_reset_clears_progress() {
        let mut clock = SamplingClock::new(10, SessionLimit::Frames(2));
        assert!(clock.advance(Duration::from_millis(100)));
        assert!(!clock.record_sample());
        clock.reset();
        assert_eq!(clock.sampled(), 0);
        assert!(!clock.advance(Duration::from_millis(50)));
    }
}
