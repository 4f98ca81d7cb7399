//! High-level console command dispatcher.
//!
//! This module glues parsed commands to a [`PowerConsole`], which
//! [`PowerController`] implements. It stays `no_std` friendly so the firmware
//! and emulator crates share the same implementation.

use embassy_sync::blocking_mutex::raw::RawMutex;

use crate::command::LinkManager;
use crate::pmc::{PowerController, PowerInstant};
use crate::power::{FullPowerReason, PowerError, PowerRequest, RequestStatus};
use crate::telemetry::TelemetryInstant;
use crate::timers::PmcTimer;
use crate::wowl::{MAX_WOWL_PATTERNS, WowlEnterParams, WowlExitParams, WowlPattern};

use super::catalog::{self, CommandSpec};
use super::grammar::{self, Command, LowPowerCommand, UapsdCommand, WowlCommand};
use super::status::{StatusSnapshot, TimerSnapshot};

/// EtherTypes matched by the demo wake patterns (IPv4, ARP).
const DEMO_ETHER_TYPES: [[u8; 2]; MAX_WOWL_PATTERNS] = [[0x08, 0x00], [0x08, 0x06]];
/// Offset of the EtherType in an Ethernet II header.
const ETHER_TYPE_OFFSET: u8 = 12;

/// A request issued from the console. Console requests never carry
/// completion callbacks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleRequest {
    FullPower(FullPowerReason),
    Imps,
    Bmps,
    StartUapsd,
    StopUapsd,
    Standby,
    EnterWowl(WowlEnterParams),
    ExitWowl,
    EnterLowPower,
    ExitLowPower,
}

impl ConsoleRequest {
    #[must_use]
    pub const fn request(&self) -> PowerRequest {
        match self {
            ConsoleRequest::FullPower(_) => PowerRequest::FullPower,
            ConsoleRequest::Imps => PowerRequest::Imps,
            ConsoleRequest::Bmps => PowerRequest::Bmps,
            ConsoleRequest::StartUapsd => PowerRequest::StartUapsd,
            ConsoleRequest::StopUapsd => PowerRequest::StopUapsd,
            ConsoleRequest::Standby => PowerRequest::Standby,
            ConsoleRequest::EnterWowl(_) => PowerRequest::EnterWowl,
            ConsoleRequest::ExitWowl => PowerRequest::ExitWowl,
            ConsoleRequest::EnterLowPower => PowerRequest::EnterLowPower,
            ConsoleRequest::ExitLowPower => PowerRequest::ExitLowPower,
        }
    }
}

/// Command execution successes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Request {
        request: PowerRequest,
        status: RequestStatus,
    },
    Status(StatusSnapshot),
    /// `None` lists every command.
    Help(Option<&'static CommandSpec>),
}

/// Errors surfaced while executing a command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandError<'a> {
    Parse(grammar::ParseError<'a>),
    Unsupported(&'static str),
    Power(PowerRequest, PowerError),
}

impl<'a> From<grammar::ParseError<'a>> for CommandError<'a> {
    fn from(error: grammar::ParseError<'a>) -> Self {
        Self::Parse(error)
    }
}

impl core::fmt::Display for CommandError<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CommandError::Parse(error) => write!(f, "parse error: {error}"),
            CommandError::Unsupported(reason) => write!(f, "unsupported: {reason}"),
            CommandError::Power(request, error) => write!(f, "{request} rejected: {error}"),
        }
    }
}

type CommandResult<'a> = Result<CommandOutcome, CommandError<'a>>;

/// Abstraction over power controllers driven by the console.
pub trait PowerConsole {
    type Instant: Copy;

    fn submit(
        &mut self,
        request: ConsoleRequest,
        now: Self::Instant,
    ) -> Result<RequestStatus, PowerError>;

    fn status(&self, now: Self::Instant) -> StatusSnapshot;
}

impl<M, L, I> PowerConsole for PowerController<'_, M, L, I>
where
    M: RawMutex,
    L: LinkManager,
    I: PowerInstant,
{
    type Instant = I;

    fn submit(&mut self, request: ConsoleRequest, now: I) -> Result<RequestStatus, PowerError> {
        match request {
            ConsoleRequest::FullPower(reason) => self.request_full_power(reason, None, now),
            ConsoleRequest::Imps => self.request_imps(now),
            ConsoleRequest::Bmps => self.request_bmps(None, now),
            ConsoleRequest::StartUapsd => self.request_start_uapsd(None, now),
            ConsoleRequest::StopUapsd => self.request_stop_uapsd(now),
            ConsoleRequest::Standby => self.request_standby(None, now),
            ConsoleRequest::EnterWowl(params) => self.request_enter_wowl(params, None, now),
            ConsoleRequest::ExitWowl => self.request_exit_wowl(WowlExitParams::default(), now),
            ConsoleRequest::EnterLowPower => self.enter_low_power(now),
            ConsoleRequest::ExitLowPower => self.exit_low_power(now),
        }
    }

    fn status(&self, now: I) -> StatusSnapshot {
        let remaining = |timer| {
            self.timers()
                .deadline(timer)
                .map(|deadline: I| deadline.saturating_duration_since(now))
        };

        StatusSnapshot {
            state: self.state(),
            ready: self.is_ready(),
            power_source: self.power_source(),
            rf_supplies_voted_off: self.rf_supplies_voted_off(),
            pending_full_power: self.pending_full_power(),
            uapsd_required: self.uapsd_required(),
            wowl_required: self.wowl_required(),
            outstanding: self.outstanding(),
            pool_in_use: self.pool_in_use(),
            deferred: self.hooks().deferred_len(),
            timers: TimerSnapshot {
                idle_sleep: remaining(PmcTimer::IdleSleep),
                traffic: remaining(PmcTimer::Traffic),
                exit_retry: remaining(PmcTimer::ExitRetry),
            },
        }
    }
}

/// Dispatches console commands into a [`PowerConsole`].
pub struct CommandExecutor<C> {
    console: C,
}

impl<C> CommandExecutor<C> {
    /// Creates a new executor around the provided console.
    pub const fn new(console: C) -> Self {
        Self { console }
    }

    /// Returns an immutable reference to the underlying console.
    pub fn console(&self) -> &C {
        &self.console
    }

    /// Returns a mutable reference to the underlying console.
    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }

    /// Consumes the executor and yields the inner console.
    pub fn into_inner(self) -> C {
        self.console
    }
}

impl<C> CommandExecutor<C>
where
    C: PowerConsole,
{
    /// Parses and executes a console command.
    pub fn execute<'a>(&mut self, line: &'a str, now: C::Instant) -> CommandResult<'a> {
        let command = grammar::parse(line)?;
        self.dispatch(command, now)
    }

    fn dispatch<'a>(&mut self, command: Command<'a>, now: C::Instant) -> CommandResult<'a> {
        let request = match command {
            Command::FullPower(reason) => ConsoleRequest::FullPower(reason),
            Command::Imps => ConsoleRequest::Imps,
            Command::Bmps => ConsoleRequest::Bmps,
            Command::Uapsd(UapsdCommand::Start) => ConsoleRequest::StartUapsd,
            Command::Uapsd(UapsdCommand::Stop) => ConsoleRequest::StopUapsd,
            Command::Standby => ConsoleRequest::Standby,
            Command::Wowl(WowlCommand::Enter { patterns }) => {
                ConsoleRequest::EnterWowl(demo_wowl_params(patterns.unwrap_or(0))?)
            }
            Command::Wowl(WowlCommand::Exit) => ConsoleRequest::ExitWowl,
            Command::LowPower(LowPowerCommand::Enter) => ConsoleRequest::EnterLowPower,
            Command::LowPower(LowPowerCommand::Exit) => ConsoleRequest::ExitLowPower,
            Command::Status => return Ok(CommandOutcome::Status(self.console.status(now))),
            Command::Help(help) => {
                return match help.topic {
                    None => Ok(CommandOutcome::Help(None)),
                    Some(topic) => catalog::find(topic)
                        .map(|spec| CommandOutcome::Help(Some(spec)))
                        .ok_or(CommandError::Unsupported("unknown help topic")),
                };
            }
        };

        let label = request.request();
        self.console
            .submit(request, now)
            .map(|status| CommandOutcome::Request {
                request: label,
                status,
            })
            .map_err(|error| CommandError::Power(label, error))
    }
}

/// Magic-packet wake plus `count` EtherType match patterns.
fn demo_wowl_params<'a>(count: u8) -> Result<WowlEnterParams, CommandError<'a>> {
    let count = usize::from(count);
    if count > MAX_WOWL_PATTERNS {
        return Err(CommandError::Unsupported("wowl patterns must be 0-2"));
    }

    let mut params = WowlEnterParams::magic_packet();
    for ether_type in &DEMO_ETHER_TYPES[..count] {
        let pattern = WowlPattern::exact(ETHER_TYPE_OFFSET, ether_type)
            .map_err(|_| CommandError::Unsupported("wowl pattern rejected"))?;
        params = params
            .with_pattern(pattern)
            .map_err(|_| CommandError::Unsupported("wowl patterns must be 0-2"))?;
    }
    Ok(params)
}
