//! Audio sink capability consumed by the playback controller.
//!
//! A sink allocates an output context for a sample rate, schedules a decoded buffer on
//! it, and halts it on request. Completion is reported through a [`CompletionHook`]
//! handed to the sink at schedule time; the hook fires at most once and can be
//! disarmed, so a stopped session never reports completion.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_channel::Sender;

use crate::error::PlaybackError;
use crate::pcm::DecodedAudio;

/// Identifier of one playback session, unique per controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub(crate) u64);

impl SessionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Message delivered to the controller when a sink finished rendering a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Completion {
    pub session: SessionId,
}

/// One-shot completion notifier for a scheduled buffer.
///
/// Clones share the same arm flag: after the first [`fire`](Self::fire) or a
/// [`disarm`](Self::disarm), every clone is inert.
#[derive(Clone)]
pub struct CompletionHook {
    session: SessionId,
    armed: Arc<AtomicBool>,
    tx: Sender<Completion>,
}

impl CompletionHook {
    pub(crate) fn new(session: SessionId, tx: Sender<Completion>) -> Self {
        Self {
            session,
            armed: Arc::new(AtomicBool::new(true)),
            tx,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Report completion. Returns `true` only for the call that actually delivered it.
    pub fn fire(&self) -> bool {
        if !self.armed.swap(false, Ordering::AcqRel) {
            return false;
        }
        // The controller may already be gone; nobody is left to notify.
        let _ = self.tx.send(Completion {
            session: self.session,
        });
        true
    }

    /// Prevent any later `fire` from delivering.
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CompletionHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHook")
            .field("session", &self.session)
            .field("armed", &self.is_armed())
            .finish()
    }
}

/// Platform output capable of rendering decoded buffers.
///
/// All methods are side-effecting and are only called from inside
/// `PlaybackController::play`/`stop`.
pub trait AudioSink {
    /// Output context allocated per playback (device + stream configuration).
    type Context;
    /// Handle to a scheduled buffer, used to halt it.
    type Handle;

    /// Allocate an output context for buffers at `sample_rate`.
    fn create_output_context(&mut self, sample_rate: u32) -> Result<Self::Context, PlaybackError>;

    /// Start rendering `buffer` from the context's current time.
    ///
    /// The sink must call `hook.fire()` once the last frame has been rendered.
    fn schedule_buffer(
        &mut self,
        context: &mut Self::Context,
        buffer: Arc<DecodedAudio>,
        hook: CompletionHook,
    ) -> Result<Self::Handle, PlaybackError>;

    /// Halt rendering immediately. Must not fire the hook for this handle afterwards.
    fn stop_buffer(&mut self, handle: Self::Handle);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_fires_once() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let hook = CompletionHook::new(SessionId(3), tx);
        let clone = hook.clone();

        assert!(hook.fire());
        assert!(!clone.fire());
        assert_eq!(
            rx.try_recv().unwrap(),
            Completion {
                session: SessionId(3)
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disarmed_hook_stays_silent() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let hook = CompletionHook::new(SessionId(1), tx);
        hook.disarm();

        assert!(!hook.is_armed());
        assert!(!hook.fire());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn fire_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let hook = CompletionHook::new(SessionId(9), tx);
        assert!(hook.fire());
    }

    #[test]
    fn session_id_display() {
        assert_eq!(SessionId(12).to_string(), "session-12");
    }
}
