//! Capture-to-encode pipeline: samples a render surface at a fixed rate and
//! streams the frames to an animated GIF without stalling the producer.

pub mod capture;
pub mod config;
pub mod error;
pub mod recording;

pub use capture::{Capture, Frame, TestPattern};
pub use config::RecorderConfig;
pub use error::{RecorderError, Result};
pub use recording::{Completion, CompletionStatus, Recorder, RecordingState, Transition, WorkerMode};
