use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use super::{
    Completion, CooperativeWorker, EncodeWorker, FrameEncoder, FrameQueue, SessionLimit,
    ThreadedWorker, WorkerEvent, WorkerMode,
};

/// One recording: its queue, its worker and (through the worker) its encoder.
/// Built per recording and dropped once the completion has been observed.
pub struct WorkerSession {
    id: Uuid,
    path: PathBuf,
    queue: Arc<FrameQueue>,
    worker: Box<dyn EncodeWorker>,
    started: bool,
}

impl WorkerSession {
    pub fn new(
        mode: WorkerMode,
        encoder: Box<dyn FrameEncoder>,
        path: PathBuf,
        limit: SessionLimit,
        steps_per_tick: u32,
    ) -> Self {
        let id = Uuid::new_v4();
        let queue = Arc::new(FrameQueue::new(limit.frames()));
        let worker: Box<dyn EncodeWorker> = match mode {
            WorkerMode::Cooperative => Box::new(CooperativeWorker::new(
                id,
                encoder,
                path.clone(),
                Arc::clone(&queue),
                steps_per_tick,
            )),
            WorkerMode::Threaded => Box::new(ThreadedWorker::new(
                id,
                encoder,
                path.clone(),
                Arc::clone(&queue),
            )),
        };
        Self {
            id,
            path,
            queue,
            worker,
            started: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn queue(&self) -> &FrameQueue {
        &self.queue
    }

    pub fn start(&mut self) {
        if self.started {
            tracing::warn!(session = %self.id, "session worker already started");
            return;
        }
        self.started = true;
        self.worker.start();
    }

    pub fn run(&mut self) -> Vec<WorkerEvent> {
        self.worker.run()
    }

    pub fn stop(&mut self, ceiling: usize) {
        self.worker.stop(ceiling);
    }

    /// Stops the worker first, then drops whatever it left in the queue.
    pub fn cancel(&mut self) -> Option<Completion> {
        let completion = self.worker.cancel();
        let dropped = self.queue.clear();
        if dropped > 0 {
            tracing::debug!(session = %self.id, dropped, "discarded buffered frames");
        }
        completion
    }

    pub fn wait(&mut self) -> Option<Completion> {
        self.worker.wait()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Frame, PixelFormat};
    use crate::recording::testing::ScriptedEncoder;
    use crate::recording::CompletionStatus;

    fn frame(index: u64) -> Frame {
        Frame::new(1, 1, PixelFormat::Rgb, vec![0, 0, 0], index).unwrap()
    }

    #[test]
    fn test_both_modes_share_contract() {
        for mode in WorkerMode::all() {
            let (encoder, log) = ScriptedEncoder::new();
            let mut session = WorkerSession::new(
                *mode,
                Box::new(encoder),
                PathBuf::from("s.gif"),
                SessionLimit::Frames(6),
                4,
            );
            session.start();
            for i in 0..6 {
                session.queue().enqueue(frame(i));
            }
            let completion = session.wait().expect("completion");
            assert!(completion.is_saved(), "{:?}", mode);
            assert_eq!(completion.session, session.id());
            assert_eq!(log.lock().unwrap().frames, (0..6).collect::<Vec<u64>>());
        }
    }

    #[test]
    fn test_cancel_clears_queue() {
        for mode in WorkerMode::all() {
            let (encoder, _log) = ScriptedEncoder::new();
            let mut session = WorkerSession::new(
                *mode,
                Box::new(encoder),
                PathBuf::from("s.gif"),
                SessionLimit::Unbounded,
                1,
            );
            session.start();
            for i in 0..5 {
                session.queue().enqueue(frame(i));
            }
            let completion = session.cancel().expect("completion");
            assert!(matches!(completion.status, CompletionStatus::Cancelled));
            assert!(session.queue().is_empty());
            assert!(session.wait().is_none());
        }
    }

    #[test]
    fn test_start_is_once() {
        let (encoder, log) = ScriptedEncoder::new();
        let mut session = WorkerSession::new(
            WorkerMode::Threaded,
            Box::new(encoder),
            PathBuf::from("s.gif"),
            SessionLimit::Frames(1),
            1,
        );
        session.start();
        session.start();
        session.queue().enqueue(frame(0));
        session.wait();
        assert_eq!(log.lock().unwrap().starts.len(), 1);
    }
}
