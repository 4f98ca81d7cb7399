//! Mode-change commands and the link-management seam that executes them.

use alloc::boxed::Box;
use core::fmt;

use heapless::Vec;
use portable_atomic::{AtomicUsize, Ordering};

use crate::deferred::DeferredMessage;
use crate::power::{FullPowerReason, PowerError};
use crate::wowl::WOWL_PARAMS_MAX_LEN;

/// Number of commands the pool can hand out before falling back to the heap.
pub const COMMAND_POOL_CAPACITY: usize = 4;
/// Largest command payload (WOWL enter parameters).
pub const MAX_COMMAND_PAYLOAD: usize = WOWL_PARAMS_MAX_LEN;

/// One command kind per transition edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandKind {
    EnterImps,
    ExitImps,
    EnterBmps,
    ExitBmps,
    EnterUapsd,
    ExitUapsd,
    EnterWowl,
    ExitWowl,
    EnterStandby,
}

impl CommandKind {
    #[must_use]
    pub const fn is_exit(self) -> bool {
        matches!(
            self,
            CommandKind::ExitImps
                | CommandKind::ExitBmps
                | CommandKind::ExitUapsd
                | CommandKind::ExitWowl
        )
    }

    /// Kinds whose allocation failure would strand the radio. These may fall
    /// back to the heap when the pool is exhausted.
    #[must_use]
    pub const fn requires_forward_progress(self) -> bool {
        self.is_exit() || matches!(self, CommandKind::EnterStandby)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CommandKind::EnterImps => "enter-imps",
            CommandKind::ExitImps => "exit-imps",
            CommandKind::EnterBmps => "enter-bmps",
            CommandKind::ExitBmps => "exit-bmps",
            CommandKind::EnterUapsd => "enter-uapsd",
            CommandKind::ExitUapsd => "exit-uapsd",
            CommandKind::EnterWowl => "enter-wowl",
            CommandKind::ExitWowl => "exit-wowl",
            CommandKind::EnterStandby => "enter-standby",
        })
    }
}

/// Where a command's storage came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PoolOrigin {
    Pooled,
    HeapFallback,
}

impl fmt::Display for PoolOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolOrigin::Pooled => f.write_str("pooled"),
            PoolOrigin::HeapFallback => f.write_str("heap"),
        }
    }
}

/// Body of a command as seen by the link-management layer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandData {
    pub kind: CommandKind,
    pub payload: Vec<u8, MAX_COMMAND_PAYLOAD>,
    /// Set on exit commands.
    pub full_power_reason: Option<FullPowerReason>,
}

impl CommandData {
    /// Command without payload.
    #[must_use]
    pub const fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            payload: Vec::new(),
            full_power_reason: None,
        }
    }

    /// Exit command carrying the reason byte as its payload.
    #[must_use]
    pub fn exit(kind: CommandKind, reason: FullPowerReason) -> Self {
        let mut payload = Vec::new();
        // Payload capacity is far above one byte.
        let _ = payload.push(reason.to_raw());
        Self {
            kind,
            payload,
            full_power_reason: Some(reason),
        }
    }

    /// Command carrying an encoded parameter block.
    pub fn with_payload(kind: CommandKind, payload: &[u8]) -> Result<Self, PowerError> {
        Ok(Self {
            kind,
            payload: Vec::from_slice(payload).map_err(|_| PowerError::Resources)?,
            full_power_reason: None,
        })
    }
}

/// Fixed number of command slots, counted atomically.
pub struct CommandPool {
    capacity: usize,
    in_use: AtomicUsize,
}

impl CommandPool {
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            in_use: AtomicUsize::new(0),
        }
    }

    /// Reserves a slot, released when the returned guard drops.
    pub fn try_acquire(&self) -> Option<PoolSlot<'_>> {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < self.capacity).then_some(used + 1)
            })
            .ok()
            .map(|_| PoolSlot { pool: self })
    }

    /// Slots currently handed out.
    pub fn in_use(&self) -> usize {
        self.in_use.load(Ordering::Acquire)
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for CommandPool {
    fn default() -> Self {
        Self::new(COMMAND_POOL_CAPACITY)
    }
}

/// A reserved pool slot.
#[derive(Debug)]
pub struct PoolSlot<'p> {
    pool: &'p CommandPool,
}

impl Drop for PoolSlot<'_> {
    fn drop(&mut self) {
        self.pool.in_use.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for CommandPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandPool")
            .field("capacity", &self.capacity)
            .field("in_use", &self.in_use())
            .finish()
    }
}

/// An issued command. Dropping it returns pooled storage or frees the heap copy.
#[derive(Debug)]
pub enum Command<'p> {
    Pooled { slot: PoolSlot<'p>, data: CommandData },
    Owned(Box<CommandData>),
}

impl<'p> Command<'p> {
    /// Takes a pool slot for `data`, falling back to the heap for kinds that
    /// must make forward progress.
    pub fn allocate(pool: &'p CommandPool, data: CommandData) -> Result<Self, PowerError> {
        if let Some(slot) = pool.try_acquire() {
            return Ok(Command::Pooled { slot, data });
        }
        if data.kind.requires_forward_progress() {
            Ok(Command::Owned(Box::new(data)))
        } else {
            Err(PowerError::Resources)
        }
    }

    #[must_use]
    pub fn data(&self) -> &CommandData {
        match self {
            Command::Pooled { data, .. } => data,
            Command::Owned(data) => data.as_ref(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> CommandKind {
        self.data().kind
    }

    #[must_use]
    pub const fn origin(&self) -> PoolOrigin {
        match self {
            Command::Pooled { .. } => PoolOrigin::Pooled,
            Command::Owned(_) => PoolOrigin::HeapFallback,
        }
    }
}

/// Why the link-management layer refused a command or message.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubmitError {
    /// The layer cannot accept work right now.
    Rejected,
    /// Cannot be issued from the current execution context; retry later.
    WouldBlock,
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::Rejected => f.write_str("rejected"),
            SubmitError::WouldBlock => f.write_str("would-block"),
        }
    }
}

/// Association picture consulted by the structural pre-flight checks.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct SessionSnapshot {
    /// Associations to an access point.
    pub infra_sessions: u8,
    /// IBSS or peer-to-peer sessions.
    pub peer_sessions: u8,
}

impl SessionSnapshot {
    /// Exactly one infrastructure association and nothing else.
    #[must_use]
    pub const fn is_single_infra(self) -> bool {
        self.infra_sessions == 1 && self.peer_sessions == 0
    }

    #[must_use]
    pub const fn has_peer_session(self) -> bool {
        self.peer_sessions > 0
    }

    #[must_use]
    pub const fn is_idle(self) -> bool {
        self.infra_sessions == 0 && self.peer_sessions == 0
    }
}

/// Lower layer that changes radio hardware state.
///
/// Responses arrive later through `PowerController::on_command_complete` or
/// `PowerController::on_command_aborted`, one at a time and in order.
pub trait LinkManager {
    /// Queues a mode-change command.
    fn submit(&mut self, command: &CommandData) -> Result<(), SubmitError>;

    /// Sends a control message. Fire-and-forget.
    fn send_message(&mut self, message: &DeferredMessage) -> Result<(), SubmitError>;

    /// Votes the RF supplies off (`true`) or back on (`false`).
    fn vote_rf_supplies(&mut self, off: bool);

    /// Current association picture.
    fn sessions(&self) -> SessionSnapshot;

    /// Frames seen since the previous call; drives the traffic timer.
    fn frames_since_last_poll(&mut self) -> u32 {
        0
    }
}

/// Link manager that accepts everything and does nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopLink;

impl NoopLink {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl LinkManager for NoopLink {
    fn submit(&mut self, _: &CommandData) -> Result<(), SubmitError> {
        Ok(())
    }

    fn send_message(&mut self, _: &DeferredMessage) -> Result<(), SubmitError> {
        Ok(())
    }

    fn vote_rf_supplies(&mut self, _: bool) {}

    fn sessions(&self) -> SessionSnapshot {
        SessionSnapshot::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_slots_return_on_drop() {
        let pool = CommandPool::new(1);
        let first = Command::allocate(&pool, CommandData::new(CommandKind::EnterImps))
            .expect("pool has a slot");
        assert_eq!(first.origin(), PoolOrigin::Pooled);
        assert_eq!(pool.in_use(), 1);

        drop(first);
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn exhausted_pool_rejects_enter_commands() {
        let pool = CommandPool::new(0);
        let result = Command::allocate(&pool, CommandData::new(CommandKind::EnterBmps));
        assert!(matches!(result, Err(PowerError::Resources)));
    }

    #[test]
    fn exhausted_pool_falls_back_for_forward_progress_kinds() {
        let pool = CommandPool::new(0);
        for kind in [
            CommandKind::ExitImps,
            CommandKind::ExitBmps,
            CommandKind::ExitUapsd,
            CommandKind::ExitWowl,
            CommandKind::EnterStandby,
        ] {
            let command =
                Command::allocate(&pool, CommandData::new(kind)).expect("heap fallback");
            assert_eq!(command.origin(), PoolOrigin::HeapFallback);
            assert_eq!(command.kind(), kind);
        }
        assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn exit_commands_carry_reason_byte() {
        let data = CommandData::exit(CommandKind::ExitBmps, FullPowerReason::Roam);
        assert_eq!(data.payload.as_slice(), &[FullPowerReason::Roam.to_raw()]);
        assert_eq!(data.full_power_reason, Some(FullPowerReason::Roam));
    }
}
