use std::path::Path;

use crate::capture::Frame;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameProgress {
    /// More `resume_frame` calls are needed.
    Pending,
    Written,
}

/// Sequential container writer fed by an encode worker.
///
/// Frames go through `begin_frame` followed by `resume_frame` until it reports
/// [`FrameProgress::Written`]; `add_frame` does both in one call. Callers must not
/// begin a new frame while one is pending.
pub trait FrameEncoder: Send {
    fn start(&mut self, path: &Path) -> Result<()>;

    /// Display delay applied to every frame added afterwards.
    fn set_delay(&mut self, millis: u32);

    fn begin_frame(&mut self, frame: Frame) -> Result<()>;

    fn resume_frame(&mut self) -> Result<FrameProgress>;

    fn add_frame(&mut self, frame: Frame) -> Result<()> {
        self.begin_frame(frame)?;
        while self.resume_frame()? == FrameProgress::Pending {}
        Ok(())
    }

    /// Flushes and closes the output. Only valid once.
    fn finish(&mut self) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::error::RecorderError;

    #[derive(Debug, Default)]
    pub struct EncoderLog {
        pub starts: Vec<PathBuf>,
        pub frames: Vec<u64>,
        pub finishes: usize,
        pub delay_ms: Option<u32>,
    }

    /// In-memory encoder that records what it was fed.
    pub struct ScriptedEncoder {
        log: Arc<Mutex<EncoderLog>>,
        fail_start: bool,
        fail_on_frame: Option<usize>,
        frame_cost: Duration,
        pending: Option<Frame>,
    }

    impl ScriptedEncoder {
        pub fn new() -> (Self, Arc<Mutex<EncoderLog>>) {
            let log = Arc::new(Mutex::new(EncoderLog::default()));
            let encoder = Self {
                log: Arc::clone(&log),
                fail_start: false,
                fail_on_frame: None,
                frame_cost: Duration::ZERO,
                pending: None,
            };
            (encoder, log)
        }

        pub fn failing_start(mut self) -> Self {
            self.fail_start = true;
            self
        }

        /// Fails the write of the frame at this zero-based position.
        pub fn failing_on_frame(mut self, position: usize) -> Self {
            self.fail_on_frame = Some(position);
            self
        }

        pub fn with_frame_cost(mut self, cost: Duration) -> Self {
            self.frame_cost = cost;
            self
        }
    }

    impl FrameEncoder for ScriptedEncoder {
        fn start(&mut self, path: &Path) -> Result<()> {
            if self.fail_start {
                return Err(RecorderError::Io(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "scripted start failure",
                )));
            }
            self.log.lock().unwrap().starts.push(path.to_path_buf());
            Ok(())
        }

        fn set_delay(&mut self, millis: u32) {
            self.log.lock().unwrap().delay_ms = Some(millis);
        }

        fn begin_frame(&mut self, frame: Frame) -> Result<()> {
            if self.pending.is_some() {
                return Err(RecorderError::EncoderState("frame already pending"));
            }
            self.pending = Some(frame);
            Ok(())
        }

        fn resume_frame(&mut self) -> Result<FrameProgress> {
            let frame = self
                .pending
                .take()
                .ok_or(RecorderError::EncoderState("no frame pending"))?;
            if !self.frame_cost.is_zero() {
                thread::sleep(self.frame_cost);
            }
            let mut log = self.log.lock().unwrap();
            if log.finishes > 0 {
                return Err(RecorderError::EncoderState("frame after finish"));
            }
            if self.fail_on_frame == Some(log.frames.len()) {
                return Err(RecorderError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "scripted write failure",
                )));
            }
            log.frames.push(frame.index());
            Ok(FrameProgress::Written)
        }

        fn finish(&mut self) -> Result<()> {
            let mut log = self.log.lock().unwrap();
            if log.finishes > 0 {
                return Err(RecorderError::EncoderState("finish called twice"));
            }
            log.finishes += 1;
            Ok(())
        }
    }
}
