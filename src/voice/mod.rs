//! One listen → transcribe → match cycle per trigger, run off the interactive thread
//!
//! The worker never touches the rack directly: it reads the live name mapping
//! and posts [`VoiceEvent`]s that the interactive thread drains and applies.

use crossbeam_channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::UtteranceSource;
use crate::matcher;
use crate::positions::SharedNames;
use crate::transcription::Transcriber;

/// Phase of the voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Capturing,
    Transcribing,
    Matching,
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// A spoken name resolved to this position
    Matched(usize),
    /// Nothing said matched a position (including silence)
    NoMatch,
    /// Capture or transcription failed
    Failed(String),
}

/// Messages from the voice worker to the interactive thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    /// Select this position (posted at most once per session)
    PositionSelected(usize),
    /// Session finished (posted exactly once per session)
    Finished(SessionOutcome),
}

/// Why a session could not be started
#[derive(Debug, Error)]
pub enum SessionStartError {
    #[error("a voice session is already active")]
    Busy,
    #[error("failed to spawn voice worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Single-slot guard: at most one session runs at a time
#[derive(Clone, Default)]
pub struct SessionGuard {
    active: Arc<AtomicBool>,
}

impl SessionGuard {
    /// Claims the slot, or `None` if a session holds it
    #[must_use]
    pub fn try_acquire(&self) -> Option<SessionPermit> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SessionPermit {
                active: Arc::clone(&self.active),
            })
    }

    /// Whether a session currently holds the slot
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Proof of holding the session slot; released on drop
pub struct SessionPermit {
    active: Arc<AtomicBool>,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Posts `Finished` and returns to `Idle` when dropped, even during unwinding
///
/// The slot is released before `Finished` is sent, so a receiver that sees
/// `Finished` can start the next session immediately.
struct Completion {
    events: Sender<VoiceEvent>,
    state: Arc<Mutex<SessionState>>,
    permit: Option<SessionPermit>,
    outcome: Option<SessionOutcome>,
}

impl Drop for Completion {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = SessionState::Idle;
        drop(self.permit.take());

        let outcome = self
            .outcome
            .take()
            .unwrap_or_else(|| SessionOutcome::Failed("voice session aborted".to_owned()));
        info!(outcome = ?outcome, "voice session finished");

        if self.events.send(VoiceEvent::Finished(outcome)).is_err() {
            debug!("panel gone, completion dropped");
        }
    }
}

/// Coordinates capture, transcription and matching for voice commands
///
/// Cloning shares the same guard, state and channel.
#[derive(Clone)]
pub struct VoiceSession {
    source: Arc<dyn UtteranceSource>,
    transcriber: Arc<Transcriber>,
    names: SharedNames,
    events: Sender<VoiceEvent>,
    state: Arc<Mutex<SessionState>>,
    guard: SessionGuard,
}

impl VoiceSession {
    /// Creates an idle session
    pub fn new(
        source: Arc<dyn UtteranceSource>,
        transcriber: Arc<Transcriber>,
        names: SharedNames,
        events: Sender<VoiceEvent>,
    ) -> Self {
        Self {
            source,
            transcriber,
            names,
            events,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            guard: SessionGuard::default(),
        }
    }

    /// Current phase
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a session is running
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.guard.is_active()
    }

    /// Spawns a worker thread for one session
    ///
    /// # Errors
    /// Returns [`SessionStartError::Busy`] if a session is already running, or
    /// [`SessionStartError::Spawn`] if the worker thread cannot be spawned
    pub fn start(&self) -> Result<JoinHandle<()>, SessionStartError> {
        let Some(permit) = self.guard.try_acquire() else {
            warn!("voice trigger ignored: session already active");
            return Err(SessionStartError::Busy);
        };

        let session = self.clone();
        std::thread::Builder::new()
            .name("voice-session".to_owned())
            .spawn(move || {
                session.run_holding(Some(permit));
            })
            .map_err(|e| {
                warn!("failed to spawn voice worker: {e}");
                SessionStartError::Spawn(e)
            })
    }

    /// Runs one session on the calling thread
    ///
    /// Blocks through capture and transcription. Posts `PositionSelected` at most
    /// once and `Finished` exactly once.
    pub fn run(&self) -> SessionOutcome {
        self.run_holding(None)
    }

    fn run_holding(&self, permit: Option<SessionPermit>) -> SessionOutcome {
        let _span = tracing::info_span!("voice_session").entered();
        let mut completion = Completion {
            events: self.events.clone(),
            state: Arc::clone(&self.state),
            permit,
            outcome: None,
        };

        let outcome = self.cycle();
        completion.outcome = Some(outcome.clone());
        outcome
    }

    fn cycle(&self) -> SessionOutcome {
        self.set_state(SessionState::Capturing);
        let utterance = match self.source.capture_utterance() {
            Ok(utterance) => utterance,
            Err(e) => {
                warn!("audio capture failed: {e:#}");
                return SessionOutcome::Failed(format!("{e:#}"));
            }
        };

        self.set_state(SessionState::Transcribing);
        let transcript = self.transcriber.transcribe_wav(&utterance);
        drop(utterance);

        self.set_state(SessionState::Matching);
        let matched = self.names.read(|names| matcher::resolve(transcript, names));

        match matched {
            Some(index) => {
                if self.events.send(VoiceEvent::PositionSelected(index)).is_err() {
                    debug!("panel gone, selection dropped");
                }
                SessionOutcome::Matched(index)
            }
            None => {
                info!("no spice name recognized");
                SessionOutcome::NoMatch
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        debug!(state = ?state, "voice session transition");
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}
