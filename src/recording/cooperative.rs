use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::error::RecorderError;

use super::{
    Completion, CompletionStatus, EncodeWorker, FrameEncoder, FrameProgress, FrameQueue, NextFrame,
    WorkerEvent,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Running,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing to do until more frames arrive.
    Idle,
    /// Part of a frame was encoded.
    Advanced,
    FrameEncoded { encoded: usize },
    Finished,
}

/// Encode worker stepped from the owner's tick.
///
/// Each step performs one unit of encoder work, so a frame is spread over
/// several steps and the owner regains control between them.
pub struct CooperativeWorker {
    session: Uuid,
    encoder: Box<dyn FrameEncoder>,
    path: PathBuf,
    queue: Arc<FrameQueue>,
    steps_per_run: u32,
    encoded: usize,
    in_flight: bool,
    phase: Phase,
    started_at: Option<Instant>,
    events: Vec<WorkerEvent>,
}

impl CooperativeWorker {
    pub fn new(
        session: Uuid,
        encoder: Box<dyn FrameEncoder>,
        path: PathBuf,
        queue: Arc<FrameQueue>,
        steps_per_run: u32,
    ) -> Self {
        Self {
            session,
            encoder,
            path,
            queue,
            steps_per_run: steps_per_run.max(1),
            encoded: 0,
            in_flight: false,
            phase: Phase::Created,
            started_at: None,
            events: Vec::new(),
        }
    }

    pub fn step(&mut self) -> StepOutcome {
        match self.phase {
            Phase::Created => return StepOutcome::Idle,
            Phase::Done => return StepOutcome::Finished,
            Phase::Running => {}
        }

        if self.in_flight {
            return match self.encoder.resume_frame() {
                Ok(FrameProgress::Pending) => StepOutcome::Advanced,
                Ok(FrameProgress::Written) => {
                    self.in_flight = false;
                    self.encoded += 1;
                    self.events.push(WorkerEvent::Progress {
                        encoded: self.encoded,
                        total: self.queue.ceiling(),
                    });
                    StepOutcome::FrameEncoded {
                        encoded: self.encoded,
                    }
                }
                Err(err) => self.fail(err),
            };
        }

        match self.queue.poll_next(self.encoded) {
            NextFrame::Frame(frame) => match self.encoder.begin_frame(frame) {
                Ok(()) => {
                    self.in_flight = true;
                    StepOutcome::Advanced
                }
                Err(err) => self.fail(err),
            },
            NextFrame::Drained => {
                self.complete(CompletionStatus::Saved);
                StepOutcome::Finished
            }
            NextFrame::Cancelled => {
                self.complete(CompletionStatus::Cancelled);
                StepOutcome::Finished
            }
            NextFrame::Idle => StepOutcome::Idle,
        }
    }

    fn fail(&mut self, err: RecorderError) -> StepOutcome {
        tracing::error!(session = %self.session, error = %err, "encoder failed, abandoning output");
        self.in_flight = false;
        self.post_completion(CompletionStatus::Failed(err));
        StepOutcome::Finished
    }

    /// Closes the encoder and reports. A failing close turns the status into a failure.
    fn complete(&mut self, status: CompletionStatus) {
        let status = match self.encoder.finish() {
            Ok(()) => status,
            Err(err) => CompletionStatus::Failed(err),
        };
        self.post_completion(status);
    }

    fn post_completion(&mut self, status: CompletionStatus) {
        self.phase = Phase::Done;
        let elapsed = self.started_at.map(|t| t.elapsed()).unwrap_or_default();
        self.events.push(WorkerEvent::Finished(Completion {
            session: self.session,
            path: self.path.clone(),
            frames_encoded: self.encoded,
            elapsed,
            status,
        }));
    }

    fn take_completion(&mut self) -> Option<Completion> {
        self.events.drain(..).find_map(|event| match event {
            WorkerEvent::Finished(completion) => Some(completion),
            WorkerEvent::Progress { .. } => None,
        })
    }
}

impl EncodeWorker for CooperativeWorker {
    fn start(&mut self) {
        if self.phase != Phase::Created {
            tracing::warn!(session = %self.session, "encode worker already started");
            return;
        }
        self.started_at = Some(Instant::now());
        match self.encoder.start(&self.path) {
            Ok(()) => {
                self.phase = Phase::Running;
                tracing::debug!(session = %self.session, path = %self.path.display(), "cooperative worker started");
            }
            Err(err) => {
                tracing::error!(session = %self.session, error = %err, "could not open output");
                self.post_completion(CompletionStatus::Failed(err));
            }
        }
    }

    fn run(&mut self) -> Vec<WorkerEvent> {
        for _ in 0..self.steps_per_run {
            match self.step() {
                StepOutcome::Advanced | StepOutcome::FrameEncoded { .. } => continue,
                StepOutcome::Idle | StepOutcome::Finished => break,
            }
        }
        std::mem::take(&mut self.events)
    }

    fn stop(&mut self, ceiling: usize) {
        self.queue.set_ceiling(ceiling);
    }

    fn cancel(&mut self) -> Option<Completion> {
        if self.phase == Phase::Running {
            while self.in_flight {
                if self.step() == StepOutcome::Finished {
                    break;
                }
            }
            if self.phase == Phase::Running {
                self.complete(CompletionStatus::Cancelled);
            }
        }
        self.take_completion()
    }

    fn wait(&mut self) -> Option<Completion> {
        while self.phase == Phase::Running {
            if self.step() == StepOutcome::Idle {
                tracing::warn!(
                    session = %self.session,
                    encoded = self.encoded,
                    "queue ran dry before the ceiling; cancelling"
                );
                return self.cancel();
            }
        }
        self.take_completion()
    }

    fn frames_encoded(&self) -> usize {
        self.encoded
    }

    fn is_finished(&self) -> bool {
        self.phase == Phase::Done
    }
}
