mod cooperative;
mod encoder;
mod gif_encoder;
mod mailbox;
mod queue;
mod recorder;
mod sampler;
mod session;
mod threaded;
mod worker;

pub use cooperative::{CooperativeWorker, StepOutcome};
pub use encoder::{FrameEncoder, FrameProgress};
pub use gif_encoder::GifEncoder;
pub use mailbox::{completion_mailbox, CompletionMailbox, MailboxSender};
pub use queue::{FrameQueue, NextFrame};
pub use recorder::{EncoderFactory, Progress, Recorder, Transition};
pub use sampler::{FrameSampler, SampleOutcome, SamplingClock};
pub use session::WorkerSession;
pub use threaded::ThreadedWorker;
pub use worker::{Completion, CompletionStatus, EncodeWorker, WorkerEvent};

#[cfg(test)]
pub(crate) use encoder::testing;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
    Finalizing,
}

/// How the encode worker is scheduled relative to the sampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// Stepped from the owner's tick, between samples.
    Cooperative,
    /// Dedicated encode thread.
    #[default]
    Threaded,
}

impl WorkerMode {
    pub fn all() -> &'static [WorkerMode] {
        &[WorkerMode::Cooperative, WorkerMode::Threaded]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            WorkerMode::Cooperative => "Cooperative",
            WorkerMode::Threaded => "Threaded",
        }
    }
}

/// Frame budget for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLimit {
    Frames(usize),
    /// Runs until `stop` fixes the frame count.
    Unbounded,
}

impl SessionLimit {
    pub fn frames(&self) -> Option<usize> {
        match self {
            SessionLimit::Frames(n) => Some(*n),
            SessionLimit::Unbounded => None,
        }
    }
}
