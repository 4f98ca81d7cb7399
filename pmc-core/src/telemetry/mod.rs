//! Telemetry event catalog and the fixed-size ring the controller records into.
//!
//! Every observable step of the state machine lands here: state changes,
//! command issue and completion, aborts, rejected requests, deferred-queue
//! activity, timer expiries and RF supply votes. Front-ends drain the ring
//! oldest-first and render each record with its `Display` impl.

use core::{fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::command::{CommandKind, PoolOrigin};
use crate::deferred::MessageKind;
use crate::power::{CommandStatus, PowerError, PowerRequest, PowerState};
use crate::timers::PmcTimer;

/// Monotonic identifier assigned to each record.
pub type EventId = u32;

/// Records kept before the oldest is overwritten.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    StateChanged { from: PowerState, to: PowerState },
    CommandIssued(CommandKind, PoolOrigin),
    CommandCompleted(CommandKind, CommandStatus),
    CommandAborted(CommandKind),
    /// Submission would block; the exit-retry timer will resubmit.
    CommandDeferred(CommandKind),
    /// A completion arrived for a command abandoned by low-power or stop.
    StaleCompletion(CommandKind),
    RequestRejected(PowerRequest, PowerError),
    MessageDeferred(MessageKind),
    MessageSent(MessageKind),
    MessageSendFailed(MessageKind),
    TimerFired(PmcTimer),
    GuardForceCleared,
    RfSuppliesVoted { off: bool },
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::StateChanged { from, to } => write!(f, "state {from} -> {to}"),
            TelemetryEventKind::CommandIssued(kind, origin) => {
                write!(f, "command-issued {kind} ({origin})")
            }
            TelemetryEventKind::CommandCompleted(kind, status) => {
                write!(f, "command-completed {kind} {status}")
            }
            TelemetryEventKind::CommandAborted(kind) => write!(f, "command-aborted {kind}"),
            TelemetryEventKind::CommandDeferred(kind) => write!(f, "command-deferred {kind}"),
            TelemetryEventKind::StaleCompletion(kind) => write!(f, "stale-completion {kind}"),
            TelemetryEventKind::RequestRejected(request, error) => {
                write!(f, "request-rejected {request} {error}")
            }
            TelemetryEventKind::MessageDeferred(kind) => write!(f, "message-deferred {kind}"),
            TelemetryEventKind::MessageSent(kind) => write!(f, "message-sent {kind}"),
            TelemetryEventKind::MessageSendFailed(kind) => {
                write!(f, "message-send-failed {kind}")
            }
            TelemetryEventKind::TimerFired(timer) => write!(f, "timer-fired {timer}"),
            TelemetryEventKind::GuardForceCleared => f.write_str("remain-active-force-cleared"),
            TelemetryEventKind::RfSuppliesVoted { off: true } => f.write_str("rf-supplies off"),
            TelemetryEventKind::RfSuppliesVoted { off: false } => f.write_str("rf-supplies on"),
        }
    }
}

/// Extra data attached to a record.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// Nothing beyond the event itself.
    None,
    /// Time spent in the state being left.
    Transition { dwell: Option<Duration> },
    /// Pool occupancy after the command was allocated.
    Command { pool_in_use: u8 },
    /// Deferred queue depth after the operation.
    Queue { depth: u8 },
}

impl TelemetryPayload {
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Monotonic timestamp stored in records.
pub trait TelemetryInstant: Copy {
    /// Time from `earlier` to `self`, zero if `earlier` is later.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// One entry in the ring.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

impl<TInstant: Copy> fmt::Display for TelemetryRecord<TInstant> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}", self.id, self.event)?;
        match self.details {
            TelemetryPayload::None => Ok(()),
            TelemetryPayload::Transition { dwell: Some(dwell) } => {
                write!(f, " dwell={}ms", dwell.as_millis())
            }
            TelemetryPayload::Transition { dwell: None } => Ok(()),
            TelemetryPayload::Command { pool_in_use } => write!(f, " pool={pool_in_use}"),
            TelemetryPayload::Queue { depth } => write!(f, " depth={depth}"),
        }
    }
}

pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Fixed-size history of controller events, numbered in arrival order.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    last_transition_at: Option<TInstant>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    /// Empty recorder; the first record gets id 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_transition_at: None,
            next_event_id: 0,
        }
    }

    /// Records still held, oldest first.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Id the next record will receive.
    pub fn next_event_id(&self) -> EventId {
        self.next_event_id
    }

    /// Records newer than or equal to `since`, oldest first.
    pub fn since(&self, since: EventId) -> impl Iterator<Item = &TelemetryRecord<TInstant>> {
        self.oldest_first()
            .filter(move |record| record.id.wrapping_sub(since) < EventId::MAX / 2)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records a state change with the time spent in the previous state.
    pub fn record_transition(
        &mut self,
        from: PowerState,
        to: PowerState,
        timestamp: TInstant,
    ) -> EventId {
        let dwell = self
            .last_transition_at
            .map(|previous| timestamp.saturating_duration_since(previous));
        self.last_transition_at = Some(timestamp);

        self.record(
            TelemetryEventKind::StateChanged { from, to },
            TelemetryPayload::Transition { dwell },
            timestamp,
        )
    }

    /// Records a submitted command together with the pool occupancy.
    pub fn record_command_issued(
        &mut self,
        kind: CommandKind,
        origin: PoolOrigin,
        pool_in_use: usize,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::CommandIssued(kind, origin),
            TelemetryPayload::Command {
                pool_in_use: truncate_count(pool_in_use),
            },
            timestamp,
        )
    }

    /// Records a message parked in the deferred queue.
    pub fn record_message_deferred(
        &mut self,
        kind: MessageKind,
        depth: usize,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::MessageDeferred(kind),
            TelemetryPayload::Queue {
                depth: truncate_count(depth),
            },
            timestamp,
        )
    }

    /// Appends a record, evicting the oldest when full.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_count(count: usize) -> u8 {
    match u8::try_from(count) {
        Ok(value) => value,
        Err(_) => u8::MAX,
    }
}
