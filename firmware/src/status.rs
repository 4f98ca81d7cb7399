#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The PMC task owns the controller; other tasks read the radio power state
//! and association picture from these atomics instead of borrowing it.

use pmc_core::command::SessionSnapshot;
use pmc_core::power::PowerState;
use portable_atomic::{AtomicU8, Ordering};

/// Last state reported by the controller's state listener.
static POWER_STATE: AtomicU8 = AtomicU8::new(PowerState::Stopped.to_raw());
/// Associations to an access point.
static INFRA_SESSIONS: AtomicU8 = AtomicU8::new(0);
/// IBSS or peer-to-peer sessions.
static PEER_SESSIONS: AtomicU8 = AtomicU8::new(0);

/// Stores the state published by the controller.
pub fn record_state(state: PowerState) {
    POWER_STATE.store(state.to_raw(), Ordering::Relaxed);
}

/// Returns the most recently published power state.
pub fn power_state() -> PowerState {
    PowerState::from_raw(POWER_STATE.load(Ordering::Relaxed)).unwrap_or(PowerState::Stopped)
}

/// Updates the association picture. The caller notifies the controller.
pub fn record_sessions(sessions: SessionSnapshot) {
    INFRA_SESSIONS.store(sessions.infra_sessions, Ordering::Relaxed);
    PEER_SESSIONS.store(sessions.peer_sessions, Ordering::Relaxed);
}

pub fn sessions() -> SessionSnapshot {
    SessionSnapshot {
        infra_sessions: INFRA_SESSIONS.load(Ordering::Relaxed),
        peer_sessions: PEER_SESSIONS.load(Ordering::Relaxed),
    }
}
