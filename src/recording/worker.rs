use std::path::PathBuf;
use std::time::Duration;

use uuid::Uuid;

use crate::error::RecorderError;

#[derive(Debug)]
pub enum CompletionStatus {
    /// Every frame up to the ceiling was written and the output closed.
    Saved,
    Failed(RecorderError),
    /// The session was discarded before reaching its ceiling.
    Cancelled,
}

/// End-of-session report handed from the worker to the recorder.
#[derive(Debug)]
pub struct Completion {
    pub session: Uuid,
    pub path: PathBuf,
    pub frames_encoded: usize,
    pub elapsed: Duration,
    pub status: CompletionStatus,
}

impl Completion {
    pub fn is_saved(&self) -> bool {
        matches!(self.status, CompletionStatus::Saved)
    }

    pub fn error(&self) -> Option<&RecorderError> {
        match &self.status {
            CompletionStatus::Failed(err) => Some(err),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub enum WorkerEvent {
    Progress { encoded: usize, total: Option<usize> },
    Finished(Completion),
}

/// Common contract of the cooperative and threaded encode workers.
pub trait EncodeWorker {
    /// Opens the encoder and begins draining. Only the first call has an effect.
    fn start(&mut self);

    /// Called once per owner tick. The cooperative worker does its encoding
    /// here; the threaded worker only collects what its thread has posted.
    /// Never blocks on the encoder thread.
    fn run(&mut self) -> Vec<WorkerEvent>;

    /// Fixes the number of frames the worker will encode before finishing.
    fn stop(&mut self, ceiling: usize);

    /// Abandons the session at the next frame boundary and waits until the
    /// worker no longer touches the queue.
    fn cancel(&mut self) -> Option<Completion>;

    /// Runs the session to its ceiling, blocking the caller.
    fn wait(&mut self) -> Option<Completion>;

    fn frames_encoded(&self) -> usize;

    fn is_finished(&self) -> bool;
}
