//! Shared status surface for the console.
//!
//! [`StatusSnapshot`] captures what the `status` command reports;
//! [`StatusFormatter`] keeps the textual rendering consistent across
//! front-ends.

use core::fmt;
use core::time::Duration;

use crate::command::CommandKind;
use crate::config::PowerSource;
use crate::power::{FullPowerReason, PowerState};

/// Remaining time on each controller timer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub idle_sleep: Option<Duration>,
    pub traffic: Option<Duration>,
    pub exit_retry: Option<Duration>,
}

/// Snapshot of the controller surfaced by the `status` command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub state: PowerState,
    pub ready: bool,
    pub power_source: PowerSource,
    pub rf_supplies_voted_off: bool,
    pub pending_full_power: Option<FullPowerReason>,
    pub uapsd_required: bool,
    pub wowl_required: bool,
    pub outstanding: Option<CommandKind>,
    pub pool_in_use: usize,
    pub deferred: usize,
    pub timers: TimerSnapshot,
}

impl StatusSnapshot {
    /// Snapshot of a freshly created, stopped controller.
    #[must_use]
    pub const fn stopped() -> Self {
        Self {
            state: PowerState::Stopped,
            ready: false,
            power_source: PowerSource::Battery,
            rf_supplies_voted_off: false,
            pending_full_power: None,
            uapsd_required: false,
            wowl_required: false,
            outstanding: None,
            pool_in_use: 0,
            deferred: 0,
            timers: TimerSnapshot {
                idle_sleep: None,
                traffic: None,
                exit_retry: None,
            },
        }
    }
}

/// Helper that renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    /// Creates a new formatter for the provided snapshot.
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes every line, each terminated by `\r\n`.
    pub fn write_all<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        self.write_state_line(writer)?;
        writer.write_str("\r\n")?;
        self.write_intents_line(writer)?;
        writer.write_str("\r\n")?;
        self.write_command_line(writer)?;
        writer.write_str("\r\n")?;
        self.write_timers_line(writer)?;
        writer.write_str("\r\n")
    }

    /// Writes the state line (e.g. `state bmps ready=true source=battery rf=on`).
    pub fn write_state_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let snapshot = self.snapshot;
        write!(
            writer,
            "state {} ready={} source={} rf={}",
            snapshot.state,
            snapshot.ready,
            snapshot.power_source,
            if snapshot.rf_supplies_voted_off {
                "off"
            } else {
                "on"
            }
        )
    }

    /// Writes the intents line (e.g. `intents full-power=roam uapsd=true wowl=false`).
    pub fn write_intents_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("intents full-power=")?;
        match self.snapshot.pending_full_power {
            Some(reason) => write!(writer, "{reason}")?,
            None => writer.write_str("none")?,
        }
        write!(
            writer,
            " uapsd={} wowl={}",
            self.snapshot.uapsd_required, self.snapshot.wowl_required
        )
    }

    /// Writes the command line (e.g. `command outstanding=enter-bmps pool=1 deferred=0`).
    pub fn write_command_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("command outstanding=")?;
        match self.snapshot.outstanding {
            Some(kind) => write!(writer, "{kind}")?,
            None => writer.write_str("none")?,
        }
        write!(
            writer,
            " pool={} deferred={}",
            self.snapshot.pool_in_use, self.snapshot.deferred
        )
    }

    /// Writes the timers line (e.g. `timers idle=+1.2s traffic=n/a retry=+10ms`).
    pub fn write_timers_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let timers = self.snapshot.timers;
        writer.write_str("timers idle=")?;
        write_duration(writer, timers.idle_sleep)?;
        writer.write_str(" traffic=")?;
        write_duration(writer, timers.traffic)?;
        writer.write_str(" retry=")?;
        write_duration(writer, timers.exit_retry)
    }
}

fn write_duration<W: fmt::Write>(writer: &mut W, duration: Option<Duration>) -> fmt::Result {
    match duration {
        None => writer.write_str("n/a"),
        Some(value) if value >= Duration::from_secs(1) => {
            let millis = value.as_millis();
            let seconds = millis / 1_000;
            let tenths = (millis % 1_000) / 100;
            write!(writer, "+{seconds}.{tenths}s")
        }
        Some(value) if value >= Duration::from_millis(1) => {
            write!(writer, "+{}ms", value.as_millis())
        }
        Some(value) => write!(writer, "+{}us", value.as_micros()),
    }
}
