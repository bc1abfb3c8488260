//! Playback coordination for generated clips.
//!
//! Tracks at most one active session, dispatches play/stop to the sink, and turns
//! sink completion into `on_ended` notifications.
//!
//! Completion travels over a channel and is only acted upon when the owner pumps the
//! controller with [`PlaybackController::poll`] or [`PlaybackController::wait`]. Ended
//! callbacks therefore run on the owner's thread and cannot re-enter `play`/`stop`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::PlaybackError;
use crate::history::EntryId;
use crate::pcm::DecodedAudio;
use crate::sink::{AudioSink, Completion, CompletionHook, SessionId};

/// Externally visible controller state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing(SessionId),
}

/// Result of a [`PlaybackController::play`] request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayOutcome {
    /// A new session started rendering.
    Started(SessionId),
    /// The same entry is already playing; nothing changed.
    AlreadyPlaying,
    /// A different entry is playing. Call `stop()` first to switch.
    Rejected { active: EntryId },
}

struct ActiveSession<S: AudioSink> {
    entry: EntryId,
    session: SessionId,
    hook: CompletionHook,
    handle: S::Handle,
    buffer: Arc<DecodedAudio>,
    // Kept alive for the duration of the session.
    _context: S::Context,
}

type EndedCallback = Box<dyn FnMut(EntryId)>;

/// Single-session playback state machine over an [`AudioSink`].
pub struct PlaybackController<S: AudioSink> {
    sink: S,
    active: Option<ActiveSession<S>>,
    next_session: u64,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    on_ended: Vec<EndedCallback>,
}

impl<S: AudioSink> PlaybackController<S> {
    pub fn new(sink: S) -> Self {
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded();
        Self {
            sink,
            active: None,
            next_session: 0,
            completion_tx,
            completion_rx,
            on_ended: Vec::new(),
        }
    }

    /// Register a callback invoked with the entry id whenever a session ends naturally.
    ///
    /// Not invoked for sessions ended by [`stop`](Self::stop).
    pub fn on_ended(&mut self, callback: impl FnMut(EntryId) + 'static) {
        self.on_ended.push(Box::new(callback));
    }

    /// Start playing `buffer` as `entry`.
    ///
    /// Pending completions are processed first, so a clip that already finished does
    /// not block the next one.
    pub fn play(
        &mut self,
        entry: EntryId,
        buffer: Arc<DecodedAudio>,
    ) -> Result<PlayOutcome, PlaybackError> {
        self.poll();

        if let Some(active) = &self.active {
            if active.entry == entry {
                tracing::debug!(entry = %entry, session = %active.session, "already playing");
                return Ok(PlayOutcome::AlreadyPlaying);
            }
            tracing::info!(
                requested = %entry,
                active = %active.entry,
                "play rejected while another clip is active"
            );
            return Ok(PlayOutcome::Rejected {
                active: active.entry,
            });
        }

        let mut context = self.sink.create_output_context(buffer.sample_rate())?;
        let session = self.allocate_session();
        let hook = CompletionHook::new(session, self.completion_tx.clone());
        let handle = self
            .sink
            .schedule_buffer(&mut context, buffer.clone(), hook.clone())?;

        tracing::info!(
            entry = %entry,
            session = %session,
            frames = buffer.frame_count(),
            rate_hz = buffer.sample_rate(),
            "playback started"
        );
        self.active = Some(ActiveSession {
            entry,
            session,
            hook,
            handle,
            buffer,
            _context: context,
        });
        Ok(PlayOutcome::Started(session))
    }

    /// Halt the active session, if any, and return its entry id.
    ///
    /// The session's completion is disarmed before the sink is told to stop, so
    /// `on_ended` never fires for it.
    pub fn stop(&mut self) -> Option<EntryId> {
        let active = self.active.take()?;
        active.hook.disarm();
        self.sink.stop_buffer(active.handle);
        tracing::info!(entry = %active.entry, session = %active.session, "playback stopped");
        Some(active.entry)
    }

    /// Process completions that have already arrived. Returns how many sessions ended.
    pub fn poll(&mut self) -> usize {
        let mut ended = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            if self.finish(completion) {
                ended += 1;
            }
        }
        ended
    }

    /// Block up to `timeout` for the active session to end.
    ///
    /// Returns `true` if a session ended during the call. Returns `false` immediately
    /// when idle.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.active.is_some() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.completion_rx.recv_timeout(remaining) {
                Ok(completion) => {
                    if self.finish(completion) {
                        return true;
                    }
                }
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return false;
                }
            }
        }
        false
    }

    pub fn state(&self) -> PlaybackState {
        match &self.active {
            Some(active) => PlaybackState::Playing(active.session),
            None => PlaybackState::Idle,
        }
    }

    pub fn is_playing(&self, entry: EntryId) -> bool {
        self.current() == Some(entry)
    }

    /// Entry of the active session.
    pub fn current(&self) -> Option<EntryId> {
        self.active.as_ref().map(|a| a.entry)
    }

    /// Buffer of the active session.
    pub fn current_buffer(&self) -> Option<&Arc<DecodedAudio>> {
        self.active.as_ref().map(|a| &a.buffer)
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn allocate_session(&mut self) -> SessionId {
        self.next_session += 1;
        SessionId(self.next_session)
    }

    fn finish(&mut self, completion: Completion) -> bool {
        let matches = self
            .active
            .as_ref()
            .is_some_and(|a| a.session == completion.session);
        if !matches {
            tracing::debug!(session = %completion.session, "ignoring stale completion");
            return false;
        }
        let Some(active) = self.active.take() else {
            return false;
        };
        tracing::info!(entry = %active.entry, session = %active.session, "playback ended");
        for callback in &mut self.on_ended {
            callback(active.entry);
        }
        true
    }
}
