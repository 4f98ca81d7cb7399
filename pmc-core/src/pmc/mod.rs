//! The power management control state machine.
//!
//! [`PowerController`] owns the radio power mode and serializes mode-change
//! commands to the link-management layer. Requests never block: they either
//! settle immediately, issue exactly one command and move into a `Request*`
//! state, or fold into intent state (`pending_full_power`, `uapsd_required`,
//! `wowl_required`) that is replayed when the in-flight command completes.
//!
//! Time is supplied by the caller. The runtime sleeps until
//! [`PowerController::next_deadline`] and then calls
//! [`PowerController::poll_timers`].

use core::ops::Add;
use core::time::Duration;

use embassy_sync::blocking_mutex::raw::RawMutex;
use heapless::Deque;

use crate::command::{Command, CommandData, CommandKind, CommandPool, LinkManager, SubmitError};
use crate::config::{PowerPolicy, PowerSource};
use crate::deferred::DeferredMessage;
use crate::power::{
    FullPowerReason, PowerError, PowerRequest, PowerSaveMode, PowerState, RequestStatus,
};
use crate::registry::{CallbackSlot, PowerHooks};
use crate::telemetry::{
    TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetryRecorder,
};
use crate::timers::{PmcTimer, TimerSet};
use crate::wowl::{WowlEnterParams, WowlExitParams};

mod completion;
mod requests;

/// Abandoned commands whose late responses are still tracked.
pub const ABANDONED_DEPTH: usize = 4;

/// Monotonic instant accepted by the controller.
pub trait PowerInstant:
    Copy + Ord + Add<Duration, Output = Self> + TelemetryInstant
{
}

impl<T> PowerInstant for T where T: Copy + Ord + Add<Duration, Output = T> + TelemetryInstant {}

/// Radio kill switches. `true` means the radio is switched off.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct KillSwitches {
    pub hardware: bool,
    pub software: bool,
}

impl KillSwitches {
    #[must_use]
    pub const fn any_engaged(self) -> bool {
        self.hardware || self.software
    }
}

/// The command currently owned by the link-management layer.
struct Outstanding<'a> {
    command: Command<'a>,
    /// Stable state the command was issued from.
    origin: PowerState,
    /// `Request*` state entered when the command was issued.
    request_state: PowerState,
}

/// Power management controller for one radio.
pub struct PowerController<'a, M, L, I>
where
    M: RawMutex,
    L: LinkManager,
    I: PowerInstant,
{
    hooks: &'a PowerHooks<M>,
    pool: &'a CommandPool,
    link: L,
    policy: PowerPolicy,
    state: PowerState,
    pending_full_power: Option<FullPowerReason>,
    uapsd_required: bool,
    wowl_required: bool,
    wowl_params: WowlEnterParams,
    wowl_exit_params: WowlExitParams,
    rf_supplies_voted_off: bool,
    ready: bool,
    power_source: PowerSource,
    kill_switches: KillSwitches,
    remain_active: bool,
    remain_active_ticks: u8,
    outstanding: Option<Outstanding<'a>>,
    /// Reason waiting on the exit-retry timer.
    exit_retry: Option<FullPowerReason>,
    /// Commands dropped by low-power entry or stop whose responses are
    /// still due, oldest first.
    abandoned: Deque<CommandKind, ABANDONED_DEPTH>,
    timers: TimerSet<I>,
    telemetry: TelemetryRecorder<I>,
}

impl<'a, M, L, I> PowerController<'a, M, L, I>
where
    M: RawMutex,
    L: LinkManager,
    I: PowerInstant,
{
    /// Creates a stopped controller.
    pub fn new(
        hooks: &'a PowerHooks<M>,
        pool: &'a CommandPool,
        link: L,
        policy: PowerPolicy,
    ) -> Self {
        Self {
            hooks,
            pool,
            link,
            policy,
            state: PowerState::Stopped,
            pending_full_power: None,
            uapsd_required: false,
            wowl_required: false,
            wowl_params: WowlEnterParams::default(),
            wowl_exit_params: WowlExitParams::default(),
            rf_supplies_voted_off: false,
            ready: false,
            power_source: PowerSource::Battery,
            kill_switches: KillSwitches::default(),
            remain_active: false,
            remain_active_ticks: 0,
            outstanding: None,
            exit_retry: None,
            abandoned: Deque::new(),
            timers: TimerSet::new(),
            telemetry: TelemetryRecorder::new(),
        }
    }

    /// Current power state.
    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn policy(&self) -> &PowerPolicy {
        &self.policy
    }

    pub fn hooks(&self) -> &'a PowerHooks<M> {
        self.hooks
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn telemetry(&self) -> &TelemetryRecorder<I> {
        &self.telemetry
    }

    pub fn timers(&self) -> &TimerSet<I> {
        &self.timers
    }

    /// Earliest instant at which [`PowerController::poll_timers`] has work.
    pub fn next_deadline(&self) -> Option<I> {
        self.timers.next_deadline()
    }

    pub fn pending_full_power(&self) -> Option<FullPowerReason> {
        self.pending_full_power
    }

    pub fn uapsd_required(&self) -> bool {
        self.uapsd_required
    }

    pub fn wowl_required(&self) -> bool {
        self.wowl_required
    }

    pub fn rf_supplies_voted_off(&self) -> bool {
        self.rf_supplies_voted_off
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn power_source(&self) -> PowerSource {
        self.power_source
    }

    pub fn remain_active(&self) -> bool {
        self.remain_active
    }

    /// Command pool slots currently handed out.
    pub fn pool_in_use(&self) -> usize {
        self.pool.in_use()
    }

    /// Kind of the command awaiting a response, if any.
    pub fn outstanding(&self) -> Option<CommandKind> {
        self.outstanding
            .as_ref()
            .map(|outstanding| outstanding.command.kind())
    }

    /// `Stopped -> FullPower`.
    pub fn start(&mut self, now: I) -> Result<(), PowerError> {
        if self.state != PowerState::Stopped {
            return Err(self.reject(PowerRequest::Start, PowerError::InvalidState, now));
        }
        self.enter_full_power(now);
        Ok(())
    }

    /// Sets the module-ready flag consulted by every pre-flight check.
    pub fn mark_ready(&mut self, now: I) {
        self.ready = true;
        self.update_traffic_timer(now);
    }

    /// Resets to `Stopped`, failing every queued callback.
    pub fn stop(&mut self, now: I) {
        self.timers.cancel_all();
        self.abandon_outstanding();
        self.pending_full_power = None;
        self.exit_retry = None;
        self.uapsd_required = false;
        self.wowl_required = false;
        self.ready = false;
        self.remain_active = false;
        self.remain_active_ticks = 0;
        self.hooks.clear_deferred();
        self.hooks.fail_all(PowerError::Failure);
        self.unvote_rf_supplies(now);
        self.set_state(PowerState::Stopped, now);
    }

    pub fn enable_mode(&mut self, mode: PowerSaveMode, now: I) {
        self.policy.set_enabled(mode, true);
        self.update_traffic_timer(now);
    }

    /// Disables `mode`. Disabling UAPSD drops the buffered intent and fails
    /// its waiting callbacks.
    pub fn disable_mode(&mut self, mode: PowerSaveMode, now: I) {
        self.policy.set_enabled(mode, false);
        match mode {
            PowerSaveMode::Uapsd if self.uapsd_required => {
                self.uapsd_required = false;
                self.hooks
                    .fire(CallbackSlot::StartUapsd, Err(PowerError::Disabled));
            }
            PowerSaveMode::Wowl if self.wowl_required => {
                self.wowl_required = false;
                self.hooks
                    .fire(CallbackSlot::EnterWowl, Err(PowerError::Disabled));
            }
            _ => {}
        }
        self.update_traffic_timer(now);
    }

    pub fn set_power_source(&mut self, source: PowerSource, now: I) {
        self.power_source = source;
        self.update_traffic_timer(now);
    }

    /// Holds the radio awake until cleared or force-cleared by the traffic timer.
    pub fn set_remain_active(&mut self, active: bool) {
        self.remain_active = active;
        self.remain_active_ticks = 0;
    }

    /// Re-evaluates the traffic timer after the association picture changed.
    pub fn notify_association_changed(&mut self, now: I) {
        self.update_traffic_timer(now);
    }

    pub fn set_kill_switches(&mut self, switches: KillSwitches) {
        self.kill_switches = switches;
    }

    pub fn kill_switches(&self) -> KillSwitches {
        self.kill_switches
    }

    fn set_state(&mut self, to: PowerState, now: I) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        if from == PowerState::Imps {
            self.timers.cancel(PmcTimer::IdleSleep);
        }
        if from == PowerState::FullPower {
            self.timers.cancel(PmcTimer::Traffic);
        }
        self.telemetry.record_transition(from, to, now);
        self.hooks.notify_state_changed(to);
    }

    /// Allocates and submits one command, moving into `request_state`.
    ///
    /// # Panics
    ///
    /// Panics when another command is still outstanding.
    fn issue(
        &mut self,
        data: CommandData,
        request_state: PowerState,
        now: I,
    ) -> Result<(), PowerError> {
        if let Some(outstanding) = &self.outstanding {
            panic!(
                "{} issued while {} is outstanding",
                data.kind,
                outstanding.command.kind()
            );
        }

        let kind = data.kind;
        let command = Command::allocate(self.pool, data)?;
        match self.link.submit(command.data()) {
            Ok(()) => {
                self.telemetry.record_command_issued(
                    kind,
                    command.origin(),
                    self.pool.in_use(),
                    now,
                );
                self.outstanding = Some(Outstanding {
                    command,
                    origin: self.state,
                    request_state,
                });
                self.set_state(request_state, now);
                Ok(())
            }
            Err(SubmitError::WouldBlock) => {
                self.record(TelemetryEventKind::CommandDeferred(kind), now);
                Err(PowerError::NotNow)
            }
            Err(SubmitError::Rejected) => Err(PowerError::Resources),
        }
    }

    /// Issues the exit command that leaves the current stable state.
    fn begin_exit(
        &mut self,
        reason: FullPowerReason,
        now: I,
    ) -> Result<RequestStatus, PowerError> {
        let (data, chained) = match self.state {
            PowerState::Imps | PowerState::Standby => {
                (CommandData::exit(CommandKind::ExitImps, reason), false)
            }
            PowerState::Bmps => (CommandData::exit(CommandKind::ExitBmps, reason), false),
            PowerState::Uapsd => (CommandData::exit(CommandKind::ExitUapsd, reason), true),
            PowerState::Wowl => (self.exit_wowl_data(reason), true),
            _ => return Err(PowerError::InvalidState),
        };

        // UAPSD and WOWL exits land in BMPS; the reason rides along so the
        // BMPS exit follows without another request.
        if chained {
            self.pending_full_power = Some(reason);
        }

        match self.issue(data, PowerState::RequestFullPower, now) {
            Ok(()) => {
                self.exit_retry = None;
                self.timers.cancel(PmcTimer::ExitRetry);
                Ok(RequestStatus::Pending)
            }
            Err(PowerError::NotNow) => {
                self.pending_full_power = None;
                if self
                    .timers
                    .arm(PmcTimer::ExitRetry, now, self.policy.exit_retry_delay)
                {
                    self.exit_retry = Some(reason);
                    Ok(RequestStatus::Pending)
                } else {
                    Err(PowerError::NotNow)
                }
            }
            Err(error) => {
                self.pending_full_power = None;
                Err(error)
            }
        }
    }

    fn exit_wowl_data(&self, reason: FullPowerReason) -> CommandData {
        let mut data = CommandData::exit(CommandKind::ExitWowl, reason);
        // Payload capacity is far above two bytes.
        let _ = data
            .payload
            .push(u8::from(self.wowl_exit_params.clear_patterns));
        data
    }

    /// Settles in `FullPower`: drains deferred messages, fires full-power
    /// callbacks and restarts the traffic timer.
    fn enter_full_power(&mut self, now: I) {
        self.pending_full_power = None;
        self.exit_retry = None;
        self.timers.cancel(PmcTimer::ExitRetry);
        self.set_state(PowerState::FullPower, now);
        self.unvote_rf_supplies(now);
        self.drain_deferred(now);
        self.hooks.fire(CallbackSlot::FullPower, Ok(()));
        self.update_traffic_timer(now);
    }

    /// Replays a buffered full-power request. Returns `true` when one existed.
    fn resume_pending(&mut self, now: I) -> bool {
        let Some(reason) = self.pending_full_power.take() else {
            return false;
        };
        if let Err(error) = self.begin_exit(reason, now) {
            self.reject(PowerRequest::FullPower, error, now);
            self.hooks.fire(CallbackSlot::FullPower, Err(error));
        }
        true
    }

    fn drain_deferred(&mut self, now: I) {
        while let Some(message) = self.hooks.pop_deferred() {
            // Failures are recorded per message and do not stop the drain.
            let _ = self.send_message(&message, now);
        }
    }

    fn send_message(&mut self, message: &DeferredMessage, now: I) -> Result<(), PowerError> {
        match self.link.send_message(message) {
            Ok(()) => {
                self.record(TelemetryEventKind::MessageSent(message.kind), now);
                Ok(())
            }
            Err(_) => {
                self.record(TelemetryEventKind::MessageSendFailed(message.kind), now);
                Err(PowerError::Failure)
            }
        }
    }

    fn vote_rf_supplies_off(&mut self, now: I) {
        if !self.rf_supplies_voted_off {
            self.link.vote_rf_supplies(true);
            self.rf_supplies_voted_off = true;
            self.record(TelemetryEventKind::RfSuppliesVoted { off: true }, now);
        }
    }

    fn unvote_rf_supplies(&mut self, now: I) {
        if self.rf_supplies_voted_off {
            self.link.vote_rf_supplies(false);
            self.rf_supplies_voted_off = false;
            self.record(TelemetryEventKind::RfSuppliesVoted { off: false }, now);
        }
    }

    /// Whether the traffic timer should be measuring toward BMPS.
    fn traffic_wanted(&self) -> bool {
        self.state == PowerState::FullPower
            && self.ready
            && self.policy.bmps_enabled
            && self
                .policy
                .allows_on(PowerSaveMode::Bmps, self.power_source)
            && (self.policy.auto_bmps || self.uapsd_required || self.wowl_required)
            && self.link.sessions().is_single_infra()
    }

    fn update_traffic_timer(&mut self, now: I) {
        if !self.traffic_wanted() {
            self.timers.cancel(PmcTimer::Traffic);
        } else if !self.timers.is_armed(PmcTimer::Traffic) {
            self.timers
                .arm(PmcTimer::Traffic, now, self.policy.traffic_measure_period);
        }
    }

    /// Pre-flight gate shared by the sleep requests.
    fn preflight(&self, mode: PowerSaveMode) -> Result<(), PowerError> {
        if !self.ready {
            return Err(PowerError::NotNow);
        }
        if !self.policy.is_enabled(mode) || !self.policy.allows_on(mode, self.power_source) {
            return Err(PowerError::Disabled);
        }

        let sessions = self.link.sessions();
        match mode {
            PowerSaveMode::Imps => {
                if !sessions.is_idle() {
                    return Err(PowerError::NotNow);
                }
            }
            PowerSaveMode::Bmps | PowerSaveMode::Uapsd | PowerSaveMode::Wowl => {
                if !sessions.is_single_infra() {
                    return Err(PowerError::NotNow);
                }
            }
            PowerSaveMode::Standby => {
                if sessions.has_peer_session() {
                    return Err(PowerError::NotNow);
                }
            }
        }

        if !self.hooks.power_save_check() {
            return Err(PowerError::NotNow);
        }
        Ok(())
    }

    fn abandon_outstanding(&mut self) {
        let Some(outstanding) = self.outstanding.take() else {
            return;
        };
        if self.abandoned.is_full() {
            // Responses arrive in order, so the oldest is the likeliest lost.
            self.abandoned.pop_front();
        }
        // Room was made above.
        let _ = self.abandoned.push_back(outstanding.command.kind());
    }

    fn record(&mut self, event: TelemetryEventKind, now: I) {
        self.telemetry
            .record(event, TelemetryPayload::none(), now);
    }

    /// Records a rejected request and hands the error back.
    fn reject(&mut self, request: PowerRequest, error: PowerError, now: I) -> PowerError {
        self.record(TelemetryEventKind::RequestRejected(request, error), now);
        error
    }
}
