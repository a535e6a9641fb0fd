use std::path::PathBuf;
use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::capture::{Capture, FrameGrabber, Rectangle};
use crate::config::{RecorderConfig, RecordingConfig};

use super::{
    Completion, CompletionStatus, FrameEncoder, FrameSampler, GifEncoder, RecordingState,
    SampleOutcome, WorkerEvent, WorkerSession,
};

/// Builds the encoder for each new session.
pub type EncoderFactory = Box<dyn FnMut(&RecordingConfig) -> Box<dyn FrameEncoder>>;

/// Result of a lifecycle request. Requests that make no sense in the current
/// state are ignored with a warning rather than failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    Ignored(&'static str),
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub encoded: usize,
    /// `None` until the frame count of an open-ended session is known.
    pub total: Option<usize>,
}

impl Progress {
    pub fn fraction(&self) -> Option<f32> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some(self.encoded as f32 / total as f32),
            None => None,
        }
    }
}

/// Recording lifecycle driven by the host's per-tick callback.
///
/// `Idle -> Recording -> Finalizing -> Idle`. Sampling happens in [`tick`](Self::tick)
/// while recording; the session's worker is pumped on every tick and its
/// completion moves the recorder back to `Idle`.
pub struct Recorder<C: Capture> {
    config: RecorderConfig,
    source: C,
    grabber: FrameGrabber,
    sampler: FrameSampler,
    state: RecordingState,
    session: Option<WorkerSession>,
    make_encoder: EncoderFactory,
    file_name: Option<PathBuf>,
    started_at: Option<Instant>,
    progress: Option<Progress>,
    completion: Option<Completion>,
    completed_sessions: usize,
}

impl<C: Capture> Recorder<C> {
    pub fn new(config: RecorderConfig, source: C) -> Self {
        Self::with_encoder_factory(
            config,
            source,
            Box::new(|rec: &RecordingConfig| {
                let mut encoder = GifEncoder::new(rec.repeat, rec.quality);
                encoder.set_delay(rec.frame_delay_ms());
                Box::new(encoder) as Box<dyn FrameEncoder>
            }),
        )
    }

    pub fn with_encoder_factory(mut config: RecorderConfig, source: C, make_encoder: EncoderFactory) -> Self {
        config.sanitize();
        let rec = &config.recording;
        let grabber = FrameGrabber::new(rec.width, rec.height, rec.resolution_scale);
        let sampler = FrameSampler::new(rec.fps, rec.session_limit());
        Self {
            config,
            source,
            grabber,
            sampler,
            state: RecordingState::Idle,
            session: None,
            make_encoder,
            file_name: None,
            started_at: None,
            progress: None,
            completion: None,
            completed_sessions: 0,
        }
    }

    /// Applies new settings. Any unfinished session is discarded.
    pub fn setup(&mut self, config: RecorderConfig) -> Transition {
        if self.state == RecordingState::Recording {
            tracing::warn!("setup ignored: recording in progress");
            return Transition::Ignored("recording in progress");
        }
        self.discard_session();

        let mut config = config;
        config.sanitize();
        let region = self.grabber.region();
        let rec = &config.recording;
        self.grabber = FrameGrabber::new(rec.width, rec.height, rec.resolution_scale);
        self.grabber.set_region(region);
        self.sampler = FrameSampler::new(rec.fps, rec.session_limit());
        tracing::info!(
            width = rec.width,
            height = rec.height,
            fps = rec.fps,
            max_frames = rec.max_frames(),
            memory_mb = rec.estimated_memory_mb(),
            "recorder configured"
        );
        self.config = config;
        self.state = RecordingState::Idle;
        Transition::Applied
    }

    /// Records only this part of the surface, or all of it with `None`.
    pub fn set_record_region(&mut self, region: Option<Rectangle>) -> Transition {
        if self.state == RecordingState::Recording {
            tracing::warn!("record region unchanged: recording in progress");
            return Transition::Ignored("recording in progress");
        }
        let Some(rect) = region else {
            self.grabber.set_region(None);
            return Transition::Applied;
        };
        let (surface_w, surface_h) = self.source.size();
        match rect.clamp_to(surface_w, surface_h) {
            Some(visible) => {
                tracing::debug!(?visible, "record region set");
                self.grabber.set_region(Some(visible));
                Transition::Applied
            }
            None => {
                tracing::warn!(?rect, "record region lies outside the surface");
                Transition::Ignored("region outside the surface")
            }
        }
    }

    /// Output file for the following sessions, relative to the output directory.
    /// A missing extension becomes `.gif`.
    pub fn set_file_name(&mut self, name: impl Into<PathBuf>) {
        let name = name.into();
        self.file_name = if name.as_os_str().is_empty() { None } else { Some(name) };
    }

    pub fn begin(&mut self) -> Transition {
        match self.state {
            RecordingState::Recording => {
                tracing::warn!("begin ignored: already recording");
                return Transition::Ignored("already recording");
            }
            RecordingState::Finalizing => self.finish_previous(),
            RecordingState::Idle => {}
        }

        let rec = &self.config.recording;
        if rec.auto_aspect {
            let height = rec.compute_height(self.source.aspect());
            self.grabber.set_output_size(rec.width, height);
        } else {
            self.grabber.set_output_size(rec.width, rec.height);
        }

        let limit = rec.session_limit();
        let mode = rec.worker;
        let steps = rec.steps_per_tick;
        self.sampler = FrameSampler::new(rec.fps, limit);
        let path = self.next_output_path();
        let encoder = (self.make_encoder)(&self.config.recording);

        let mut session = WorkerSession::new(mode, encoder, path, limit, steps);
        let (frame_w, frame_h) = self.grabber.frame_size();
        tracing::info!(
            session = %session.id(),
            path = %session.path().display(),
            mode = mode.display_name(),
            max_frames = ?limit.frames(),
            frame_w,
            frame_h,
            "recording started"
        );
        session.start();

        self.state = RecordingState::Recording;
        self.started_at = Some(Instant::now());
        self.progress = None;
        let events = session.run();
        self.session = Some(session);
        self.handle_events(events);
        Transition::Applied
    }

    /// Ends sampling now; the worker encodes exactly the frames sampled so far.
    pub fn stop(&mut self) -> Transition {
        if self.state != RecordingState::Recording {
            tracing::warn!(state = ?self.state, "stop ignored: not recording");
            return Transition::Ignored("not recording");
        }
        let sampled = self.sampler.frames_sampled();
        if let Some(session) = self.session.as_mut() {
            session.stop(sampled);
        }
        tracing::info!(frames = sampled, "recording stopped, finalizing");
        self.state = RecordingState::Finalizing;
        Transition::Applied
    }

    /// Per-tick entry point. Samples while recording, pumps the worker, and
    /// returns the completion if one was observed during this tick.
    pub fn tick(&mut self, delta: Duration) -> Option<&Completion> {
        if self.state == RecordingState::Recording {
            self.sample(delta);
        }

        let observed = self.completed_sessions;
        if let Some(session) = self.session.as_mut() {
            let events = session.run();
            self.handle_events(events);
        }
        if self.completed_sessions > observed {
            self.completion.as_ref()
        } else {
            None
        }
    }

    fn sample(&mut self, delta: Duration) {
        let Some(session) = self.session.as_ref() else {
            return;
        };
        let grabber = &mut self.grabber;
        let source = &mut self.source;
        let outcome = self
            .sampler
            .sample(delta, |index| grabber.grab(source, index), session.queue());

        match outcome {
            SampleOutcome::Waiting | SampleOutcome::Emitted { .. } => {}
            SampleOutcome::CaptureFailed(err) => {
                tracing::warn!(error = %err, "capture failed, skipping tick");
            }
            SampleOutcome::LimitReached { index } => {
                tracing::info!(frames = index + 1, "frame budget reached, finalizing");
                self.state = RecordingState::Finalizing;
            }
            SampleOutcome::Exhausted => {
                self.state = RecordingState::Finalizing;
            }
        }
    }

    fn handle_events(&mut self, events: Vec<WorkerEvent>) {
        for event in events {
            match event {
                WorkerEvent::Progress { encoded, total } => {
                    tracing::trace!(encoded, ?total, "encode progress");
                    self.progress = Some(Progress { encoded, total });
                }
                WorkerEvent::Finished(completion) => self.on_worker_completed(completion),
            }
        }
    }

    /// Only reached through the session's events, on the recorder's own tick.
    fn on_worker_completed(&mut self, completion: Completion) {
        self.session = None;
        self.record_completion(completion);
        self.state = RecordingState::Idle;
    }

    fn record_completion(&mut self, completion: Completion) {
        let since_begin_ms = self
            .started_at
            .take()
            .map(|t| t.elapsed().as_millis() as u64)
            .unwrap_or_default();
        let encode_ms = completion.elapsed.as_millis() as u64;
        match &completion.status {
            CompletionStatus::Saved => tracing::info!(
                session = %completion.session,
                path = %completion.path.display(),
                frames = completion.frames_encoded,
                encode_ms,
                since_begin_ms,
                "recording saved"
            ),
            CompletionStatus::Failed(err) => tracing::error!(
                session = %completion.session,
                path = %completion.path.display(),
                frames = completion.frames_encoded,
                error = %err,
                resource = err.is_resource(),
                "recording failed"
            ),
            CompletionStatus::Cancelled => tracing::info!(
                session = %completion.session,
                frames = completion.frames_encoded,
                "recording discarded"
            ),
        }
        self.progress = Some(Progress {
            encoded: completion.frames_encoded,
            total: Some(completion.frames_encoded),
        });
        self.completed_sessions += 1;
        self.completion = Some(completion);
    }

    /// Blocks until the finalizing session has written its output.
    fn finish_previous(&mut self) {
        let Some(mut session) = self.session.take() else {
            self.state = RecordingState::Idle;
            return;
        };
        tracing::debug!(session = %session.id(), "waiting for previous session");
        match session.wait() {
            Some(completion) => self.record_completion(completion),
            None => tracing::warn!(session = %session.id(), "previous session ended without a report"),
        }
        self.state = RecordingState::Idle;
    }

    /// Drops buffered frames and capture scratch memory and discards the
    /// current session. The worker is stopped before the queue is cleared.
    pub fn flush_memory(&mut self) -> Transition {
        if self.state == RecordingState::Idle {
            tracing::warn!("flush ignored: nothing recorded");
            return Transition::Ignored("nothing recorded");
        }
        self.discard_session();
        tracing::info!("recorder memory flushed");
        Transition::Applied
    }

    fn discard_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            let queued = session.queue().len();
            tracing::debug!(session = %session.id(), queued, "discarding session");
            if let Some(completion) = session.cancel() {
                self.record_completion(completion);
            }
        }
        self.grabber.release_scratch();
        self.sampler.reset();
        self.started_at = None;
        self.state = RecordingState::Idle;
    }

    fn next_output_path(&self) -> PathBuf {
        match &self.file_name {
            Some(name) => {
                let path = self.config.output.directory.join(name);
                if path.extension().is_none() {
                    path.with_extension("gif")
                } else {
                    path
                }
            }
            None => self.config.output_path(),
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecordingState::Recording
    }

    pub fn frames_sampled(&self) -> usize {
        self.sampler.frames_sampled()
    }

    /// Frame budget of a session, or `None` for open-ended recording.
    pub fn max_frames(&self) -> Option<usize> {
        self.config.recording.session_limit().frames()
    }

    pub fn progress(&self) -> Option<Progress> {
        self.progress
    }

    pub fn take_completion(&mut self) -> Option<Completion> {
        self.completion.take()
    }

    pub fn last_completion(&self) -> Option<&Completion> {
        self.completion.as_ref()
    }

    pub fn completed_sessions(&self) -> usize {
        self.completed_sessions
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id())
    }

    pub fn queued_frames(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.queue().len())
    }

    /// Time since `begin`, while a session is live.
    pub fn elapsed(&self) -> Option<Duration> {
        self.started_at.map(|t| t.elapsed())
    }

    pub fn frame_size(&self) -> (u32, u32) {
        self.grabber.frame_size()
    }

    pub fn holds_scratch(&self) -> bool {
        self.grabber.has_scratch()
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn estimated_memory_mb(&self) -> f32 {
        self.config.recording.estimated_memory_mb()
    }

    pub fn source(&self) -> &C {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut C {
        &mut self.source
    }
}
