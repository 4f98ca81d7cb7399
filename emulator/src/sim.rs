//! Virtual clock and a link-management layer answered from the prompt.

use std::fmt;
use std::ops::Add;
use std::time::Duration;

use pmc_core::command::{CommandData, LinkManager, SessionSnapshot, SubmitError};
use pmc_core::deferred::DeferredMessage;
use pmc_core::telemetry::TelemetryInstant;

/// Emulated time, in microseconds since the session started.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct SimInstant(u64);

impl SimInstant {
    pub const ZERO: Self = Self(0);

    pub fn since_start(self) -> Duration {
        Duration::from_micros(self.0)
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl TelemetryInstant for SimInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Display for SimInstant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}ms", self.0 / 1_000)
    }
}

/// Link layer that records what it is asked to do. Command responses are
/// typed at the prompt.
pub struct SimLink {
    sessions: SessionSnapshot,
    frames: u32,
    refuse: Option<SubmitError>,
    notes: Vec<String>,
}

impl SimLink {
    pub fn new(infra_sessions: u8) -> Self {
        Self {
            sessions: SessionSnapshot {
                infra_sessions,
                peer_sessions: 0,
            },
            frames: 0,
            refuse: None,
            notes: Vec::new(),
        }
    }

    pub fn set_infra_sessions(&mut self, count: u8) {
        self.sessions.infra_sessions = count;
    }

    pub fn set_frames(&mut self, frames: u32) {
        self.frames = frames;
    }

    /// `None` accepts every submission.
    pub fn set_refuse(&mut self, refuse: Option<SubmitError>) {
        self.refuse = refuse;
    }

    /// Lines describing link activity since the previous call.
    pub fn take_notes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notes)
    }
}

impl LinkManager for SimLink {
    fn submit(&mut self, command: &CommandData) -> Result<(), SubmitError> {
        if let Some(error) = self.refuse {
            self.notes
                .push(format!("link refused {} ({error})", command.kind));
            return Err(error);
        }
        self.notes.push(format!(
            "link submit {} payload=[{}]",
            command.kind,
            hex(&command.payload)
        ));
        Ok(())
    }

    fn send_message(&mut self, message: &DeferredMessage) -> Result<(), SubmitError> {
        if let Some(error) = self.refuse {
            self.notes
                .push(format!("link refused message {} ({error})", message.kind));
            return Err(error);
        }
        self.notes.push(format!(
            "link message {} payload=[{}]",
            message.kind,
            hex(&message.payload)
        ));
        Ok(())
    }

    fn vote_rf_supplies(&mut self, off: bool) {
        self.notes.push(if off {
            "link rf-supplies voted off".to_string()
        } else {
            "link rf-supplies voted on".to_string()
        });
    }

    fn sessions(&self) -> SessionSnapshot {
        self.sessions
    }

    fn frames_since_last_poll(&mut self) -> u32 {
        std::mem::take(&mut self.frames)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}
