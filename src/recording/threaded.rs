use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::error::RecorderError;

use super::{
    completion_mailbox, Completion, CompletionMailbox, CompletionStatus, EncodeWorker,
    FrameEncoder, FrameQueue, MailboxSender, NextFrame, WorkerEvent,
};

const IDLE_WAIT: Duration = Duration::from_millis(50);

/// Everything the encode thread owns.
struct DrainJob {
    session: Uuid,
    encoder: Box<dyn FrameEncoder>,
    path: PathBuf,
    queue: Arc<FrameQueue>,
    mailbox: MailboxSender,
}

impl DrainJob {
    fn run(mut self) {
        let started = Instant::now();
        let mut encoded = 0usize;

        let status = match self.encoder.start(&self.path) {
            Err(err) => {
                tracing::error!(session = %self.session, error = %err, "could not open output");
                CompletionStatus::Failed(err)
            }
            Ok(()) => self.drain(&mut encoded),
        };

        tracing::debug!(
            session = %self.session,
            encoded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "encode thread exiting"
        );
        self.mailbox.post(WorkerEvent::Finished(Completion {
            session: self.session,
            path: self.path,
            frames_encoded: encoded,
            elapsed: started.elapsed(),
            status,
        }));
    }

    fn drain(&mut self, encoded: &mut usize) -> CompletionStatus {
        let status = loop {
            match self.queue.wait_next(*encoded, IDLE_WAIT) {
                NextFrame::Frame(frame) => {
                    if let Err(err) = self.encoder.add_frame(frame) {
                        tracing::error!(session = %self.session, error = %err, "encoder failed, abandoning output");
                        return CompletionStatus::Failed(err);
                    }
                    *encoded += 1;
                    self.mailbox.post(WorkerEvent::Progress {
                        encoded: *encoded,
                        total: self.queue.ceiling(),
                    });
                }
                NextFrame::Drained => break CompletionStatus::Saved,
                NextFrame::Cancelled => break CompletionStatus::Cancelled,
                NextFrame::Idle => {
                    tracing::trace!(session = %self.session, encoded = *encoded, "waiting for frames");
                }
            }
        };

        match self.encoder.finish() {
            Ok(()) => status,
            Err(err) => CompletionStatus::Failed(err),
        }
    }
}

/// Encode worker running its drain loop on a dedicated thread.
///
/// The thread only touches the shared [`FrameQueue`] and its mailbox sender;
/// results reach the owner through [`EncodeWorker::run`].
pub struct ThreadedWorker {
    session: Uuid,
    path: PathBuf,
    queue: Arc<FrameQueue>,
    job: Option<DrainJob>,
    handle: Option<JoinHandle<()>>,
    mailbox: CompletionMailbox,
    encoded: usize,
    finished: bool,
    local: Vec<WorkerEvent>,
}

impl ThreadedWorker {
    pub fn new(session: Uuid, encoder: Box<dyn FrameEncoder>, path: PathBuf, queue: Arc<FrameQueue>) -> Self {
        let (sender, mailbox) = completion_mailbox();
        let job = DrainJob {
            session,
            encoder,
            path: path.clone(),
            queue: Arc::clone(&queue),
            mailbox: sender,
        };
        Self {
            session,
            path,
            queue,
            job: Some(job),
            handle: None,
            mailbox,
            encoded: 0,
            finished: false,
            local: Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Pulls posted events and notes progress and completion.
    fn collect(&mut self) -> Vec<WorkerEvent> {
        // Checked before draining: anything an exited thread posted is in this drain.
        let exited = self.handle.as_ref().is_some_and(|h| h.is_finished());
        let mut events = std::mem::take(&mut self.local);
        events.extend(self.mailbox.drain());
        for event in &events {
            match event {
                WorkerEvent::Progress { encoded, .. } => self.encoded = *encoded,
                WorkerEvent::Finished(completion) => {
                    self.encoded = completion.frames_encoded;
                    self.finished = true;
                }
            }
        }
        if self.finished {
            self.join();
        } else if exited {
            self.join();
            self.finished = true;
            let completion = self.synthesized(RecorderError::WorkerPanicked);
            events.push(WorkerEvent::Finished(completion));
        }
        events
    }

    fn synthesized(&self, err: RecorderError) -> Completion {
        Completion {
            session: self.session,
            path: self.path.clone(),
            frames_encoded: self.encoded,
            elapsed: Duration::ZERO,
            status: CompletionStatus::Failed(err),
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!(session = %self.session, "encode thread panicked");
            }
        }
    }

    fn join_and_take_completion(&mut self) -> Option<Completion> {
        self.join();
        let completion = self.collect().into_iter().find_map(|event| match event {
            WorkerEvent::Finished(completion) => Some(completion),
            WorkerEvent::Progress { .. } => None,
        });
        if completion.is_none() && !self.finished && self.job.is_none() {
            self.finished = true;
            return Some(self.synthesized(RecorderError::WorkerPanicked));
        }
        completion
    }
}

impl EncodeWorker for ThreadedWorker {
    fn start(&mut self) {
        let Some(job) = self.job.take() else {
            tracing::warn!(session = %self.session, "encode worker already started");
            return;
        };

        let short_id = self.session.simple().to_string();
        let spawned = thread::Builder::new()
            .name(format!("reelcap-encode-{}", &short_id[..8]))
            .spawn(move || job.run());

        match spawned {
            Ok(handle) => {
                tracing::debug!(session = %self.session, path = %self.path.display(), "encode thread started");
                self.handle = Some(handle);
            }
            Err(err) => {
                tracing::error!(session = %self.session, error = %err, "could not spawn encode thread");
                self.finished = true;
                let completion = self.synthesized(RecorderError::Io(err));
                self.local.push(WorkerEvent::Finished(completion));
            }
        }
    }

    fn run(&mut self) -> Vec<WorkerEvent> {
        self.collect()
    }

    fn stop(&mut self, ceiling: usize) {
        self.queue.set_ceiling(ceiling);
    }

    fn cancel(&mut self) -> Option<Completion> {
        self.queue.cancel();
        self.join_and_take_completion()
    }

    fn wait(&mut self) -> Option<Completion> {
        if self.queue.ceiling().is_none() {
            tracing::warn!(session = %self.session, "waiting on an open-ended session; cancelling instead");
            return self.cancel();
        }
        self.join_and_take_completion()
    }

    fn frames_encoded(&self) -> usize {
        self.encoded
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Drop for ThreadedWorker {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.queue.cancel();
            self.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{Frame, PixelFormat};
    use crate::recording::testing::ScriptedEncoder;

    fn frame(index: u64) -> Frame {
        Frame::new(2, 2, PixelFormat::Rgb, vec![0u8; 12], index).unwrap()
    }

    fn spawn(encoder: ScriptedEncoder, ceiling: Option<usize>) -> (ThreadedWorker, Arc<FrameQueue>) {
        let queue = Arc::new(FrameQueue::new(ceiling));
        let mut worker = ThreadedWorker::new(
            Uuid::new_v4(),
            Box::new(encoder),
            PathBuf::from("threaded.gif"),
            Arc::clone(&queue),
        );
        worker.start();
        (worker, queue)
    }

    fn await_completion(worker: &mut ThreadedWorker) -> (Completion, usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        let mut finished = Vec::new();
        while Instant::now() < deadline {
            for event in worker.run() {
                if let WorkerEvent::Finished(c) = event {
                    finished.push(c);
                }
            }
            if worker.is_finished() {
                break;
            }
            thread::sleep(Duration::from_millis(2));
        }
        // Late duplicates would show up here.
        thread::sleep(Duration::from_millis(20));
        for event in worker.run() {
            if let WorkerEvent::Finished(c) = event {
                finished.push(c);
            }
        }
        let count = finished.len();
        (finished.into_iter().next().expect("no completion"), count)
    }

    #[test]
    fn test_drains_in_order_as_frames_arrive() {
        let (encoder, log) = ScriptedEncoder::new();
        let (mut worker, queue) = spawn(encoder, Some(20));
        for i in 0..20 {
            queue.enqueue(frame(i));
            if i % 5 == 0 {
                thread::sleep(Duration::from_millis(3));
            }
        }
        let (completion, count) = await_completion(&mut worker);
        assert_eq!(count, 1);
        assert!(completion.is_saved());
        assert_eq!(completion.frames_encoded, 20);
        let log = log.lock().unwrap();
        assert_eq!(log.frames, (0..20).collect::<Vec<u64>>());
        assert_eq!(log.finishes, 1);
    }

    #[test]
    fn test_stop_before_ceiling_terminates() {
        let (encoder, log) = ScriptedEncoder::new();
        let (mut worker, queue) = spawn(encoder, Some(45));
        for i in 0..10 {
            queue.enqueue(frame(i));
        }
        worker.stop(10);
        let (completion, _) = await_completion(&mut worker);
        assert_eq!(completion.frames_encoded, 10);
        assert_eq!(log.lock().unwrap().frames.len(), 10);
    }

    #[test]
    fn test_unbounded_runs_until_stopped() {
        let (encoder, _log) = ScriptedEncoder::new();
        let (mut worker, queue) = spawn(encoder, None);
        for i in 0..3 {
            queue.enqueue(frame(i));
        }
        thread::sleep(Duration::from_millis(120));
        assert!(worker.run().iter().all(|e| matches!(e, WorkerEvent::Progress { .. })));
        assert!(!worker.is_finished());

        worker.stop(3);
        let (completion, _) = await_completion(&mut worker);
        assert!(completion.is_saved());
        assert_eq!(completion.frames_encoded, 3);
    }

    #[test]
    fn test_start_failure_posted() {
        let (encoder, _log) = ScriptedEncoder::new();
        let (mut worker, _queue) = spawn(encoder.failing_start(), Some(5));
        let (completion, count) = await_completion(&mut worker);
        assert_eq!(count, 1);
        assert!(matches!(completion.error(), Some(RecorderError::Io(_))));
        assert_eq!(completion.frames_encoded, 0);
    }

    #[test]
    fn test_write_failure_posted() {
        let (encoder, log) = ScriptedEncoder::new();
        let (mut worker, queue) = spawn(encoder.failing_on_frame(1), Some(5));
        for i in 0..5 {
            queue.enqueue(frame(i));
        }
        let (completion, _) = await_completion(&mut worker);
        assert!(completion.error().is_some());
        assert_eq!(completion.frames_encoded, 1);
        assert_eq!(log.lock().unwrap().finishes, 0);
    }

    #[test]
    fn test_cancel_joins_thread() {
        let (encoder, log) = ScriptedEncoder::new();
        let (mut worker, queue) = spawn(encoder.with_frame_cost(Duration::from_millis(5)), Some(100));
        for i in 0..50 {
            queue.enqueue(frame(i));
        }
        thread::sleep(Duration::from_millis(20));
        let completion = worker.cancel().expect("completion");
        assert!(matches!(completion.status, CompletionStatus::Cancelled));
        assert!(!worker.is_running());
        assert!(completion.frames_encoded < 50);
        assert_eq!(log.lock().unwrap().frames.len(), completion.frames_encoded);
        assert_eq!(log.lock().unwrap().finishes, 1);
    }

    #[test]
    fn test_wait_blocks_until_done() {
        let (encoder, _log) = ScriptedEncoder::new();
        let (mut worker, queue) = spawn(encoder.with_frame_cost(Duration::from_millis(1)), None);
        for i in 0..8 {
            queue.enqueue(frame(i));
        }
        worker.stop(8);
        let completion = worker.wait().expect("completion");
        assert_eq!(completion.frames_encoded, 8);
        assert!(worker.is_finished());
    }
}
