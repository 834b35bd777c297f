//! The authoritative record of what the session is currently allowed to do.
//!
//! Transitions follow a fixed table; an event arriving outside its source
//! state is logged and ignored. Disconnect is universal and terminal.

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    Connecting,
    AwaitingSessionCreated,
    Configuring,
    Active,
}

#[derive(Debug)]
pub struct SessionStateMachine {
    phase: SessionPhase,
    model_speaking: bool,
    responses_started: u64,
    responses_completed: u64,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            model_speaking: false,
            responses_started: 0,
            responses_completed: 0,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub const fn model_speaking(&self) -> bool {
        self.model_speaking
    }

    /// Outbound audio is gated on an active session with the model silent.
    /// This is half-duplex turn-taking as policy, not a transport limit.
    #[must_use]
    pub const fn can_send_audio(&self) -> bool {
        matches!(self.phase, SessionPhase::Active) && !self.model_speaking
    }

    #[must_use]
    pub const fn can_send_session_config(&self) -> bool {
        matches!(self.phase, SessionPhase::Configuring)
    }

    #[must_use]
    pub const fn responses_started(&self) -> u64 {
        self.responses_started
    }

    #[must_use]
    pub const fn responses_completed(&self) -> u64 {
        self.responses_completed
    }

    pub fn on_start(&mut self) -> bool {
        self.transition(SessionPhase::Disconnected, SessionPhase::Connecting, "start")
    }

    pub fn on_connected(&mut self) -> bool {
        self.transition(
            SessionPhase::Connecting,
            SessionPhase::AwaitingSessionCreated,
            "connected",
        )
    }

    pub fn on_session_created(&mut self) -> bool {
        self.transition(
            SessionPhase::AwaitingSessionCreated,
            SessionPhase::Configuring,
            "session.created",
        )
    }

    pub fn on_session_updated(&mut self) -> bool {
        self.transition(
            SessionPhase::Configuring,
            SessionPhase::Active,
            "session.updated",
        )
    }

    pub fn on_response_created(&mut self) -> bool {
        if self.phase != SessionPhase::Active || self.model_speaking {
            warn!(phase = ?self.phase, speaking = self.model_speaking, "ignoring response.created");
            return false;
        }
        self.model_speaking = true;
        self.responses_started += 1;
        true
    }

    /// Returns true exactly once per turn, so the end-of-response signal to
    /// the audio consumer is never duplicated.
    pub fn on_response_done(&mut self) -> bool {
        if self.phase != SessionPhase::Active || !self.model_speaking {
            warn!(phase = ?self.phase, speaking = self.model_speaking, "ignoring response.done");
            return false;
        }
        self.model_speaking = false;
        self.responses_completed += 1;
        true
    }

    /// Universal: legal from any state. Fatal transport and protocol
    /// errors arrive here too, with the error kind carried in `reason`;
    /// there is no separate fatal-error transition.
    pub fn on_disconnected(&mut self, reason: &str) {
        if self.phase != SessionPhase::Disconnected {
            info!(reason, "session disconnected");
        }
        self.phase = SessionPhase::Disconnected;
        self.model_speaking = false;
    }

    fn transition(&mut self, from: SessionPhase, to: SessionPhase, event: &str) -> bool {
        if self.phase == from {
            self.phase = to;
            true
        } else {
            warn!(phase = ?self.phase, event, "ignoring event outside its source state");
            false
        }
    }
}
