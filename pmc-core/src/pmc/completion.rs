//! Response path: command completions, executor aborts and timer expiry.

use crate::command::{CommandData, CommandKind, LinkManager};
use crate::power::{
    CommandStatus, FullPowerReason, PowerError, PowerRequest, PowerSaveMode, PowerState,
};
use crate::registry::CallbackSlot;
use crate::telemetry::TelemetryEventKind;
use crate::timers::PmcTimer;
use embassy_sync::blocking_mutex::raw::RawMutex;

use super::{PowerController, PowerInstant};

/// Stable and transient states captured when the settled command was issued.
#[derive(Copy, Clone)]
struct Settled {
    origin: PowerState,
    request_state: PowerState,
}

impl<M, L, I> PowerController<'_, M, L, I>
where
    M: RawMutex,
    L: LinkManager,
    I: PowerInstant,
{
    /// Delivers the link-management response for the outstanding command.
    ///
    /// # Panics
    ///
    /// Panics when no command is outstanding or `kind` does not match it.
    pub fn on_command_complete(&mut self, kind: CommandKind, status: CommandStatus, now: I) {
        let Some(settled) = self.settle(kind, now) else {
            return;
        };
        self.record(TelemetryEventKind::CommandCompleted(kind, status), now);

        match status {
            CommandStatus::Success => self.on_success(kind, now),
            CommandStatus::Failure => self.on_failure(kind, settled, now),
        }
    }

    /// The executor discarded the outstanding command before sending it.
    ///
    /// Every kind returns the radio to `FullPower`. Enter commands also fail
    /// the callbacks that were waiting on them.
    ///
    /// # Panics
    ///
    /// Panics when no command is outstanding or `kind` does not match it.
    pub fn on_command_aborted(&mut self, kind: CommandKind, now: I) {
        if self.settle(kind, now).is_none() {
            return;
        }
        self.record(TelemetryEventKind::CommandAborted(kind), now);

        match kind {
            CommandKind::EnterUapsd => self.fail_uapsd_start(),
            CommandKind::EnterWowl => self.fail_wowl_enter(),
            CommandKind::EnterBmps => {
                self.hooks.fire(CallbackSlot::Bmps, Err(PowerError::Failure));
                self.fail_wowl_enter();
            }
            CommandKind::EnterStandby => {
                self.hooks
                    .fire(CallbackSlot::Standby, Err(PowerError::Failure));
            }
            CommandKind::EnterImps
            | CommandKind::ExitImps
            | CommandKind::ExitBmps
            | CommandKind::ExitUapsd
            | CommandKind::ExitWowl => {}
        }
        self.enter_full_power(now);
    }

    /// Handles every timer due at `now`.
    ///
    /// # Panics
    ///
    /// Panics when the idle-sleep timer expires outside `Imps`.
    pub fn poll_timers(&mut self, now: I) {
        let expired = self.timers.take_expired(now);
        for timer in expired.iter().copied() {
            self.record(TelemetryEventKind::TimerFired(timer), now);
            match timer {
                PmcTimer::IdleSleep => self.on_idle_sleep_expired(now),
                PmcTimer::Traffic => self.on_traffic_expired(now),
                PmcTimer::ExitRetry => self.on_exit_retry_expired(now),
            }
        }
    }

    fn settle(&mut self, kind: CommandKind, now: I) -> Option<Settled> {
        if self.abandoned.front() == Some(&kind) {
            self.abandoned.pop_front();
            self.record(TelemetryEventKind::StaleCompletion(kind), now);
            return None;
        }

        let Some(outstanding) = self.outstanding.take() else {
            panic!("response for {kind} with no command outstanding");
        };
        let issued = outstanding.command.kind();
        assert!(
            issued == kind,
            "response for {kind} while {issued} is outstanding"
        );
        assert!(
            self.state == outstanding.request_state,
            "{kind} outstanding in {} instead of {}",
            self.state,
            outstanding.request_state
        );

        Some(Settled {
            origin: outstanding.origin,
            request_state: outstanding.request_state,
        })
    }

    fn on_success(&mut self, kind: CommandKind, now: I) {
        match kind {
            CommandKind::EnterImps => {
                self.set_state(PowerState::Imps, now);
                self.timers
                    .arm(PmcTimer::IdleSleep, now, self.policy.idle_sleep_period);
                self.vote_rf_supplies_off(now);
                self.resume_pending(now);
            }
            CommandKind::EnterBmps | CommandKind::ExitUapsd | CommandKind::ExitWowl => {
                self.on_bmps_entered(now);
            }
            CommandKind::EnterUapsd => {
                self.set_state(PowerState::Uapsd, now);
                self.hooks.fire(CallbackSlot::StartUapsd, Ok(()));
                if self.resume_pending(now) || self.uapsd_required {
                    return;
                }
                // Stop arrived while the start was in flight.
                let data = CommandData::exit(CommandKind::ExitUapsd, FullPowerReason::Other);
                if let Err(error) = self.issue(data, PowerState::RequestStopUapsd, now) {
                    self.reject(PowerRequest::StopUapsd, error, now);
                }
            }
            CommandKind::EnterWowl => {
                self.wowl_required = false;
                self.set_state(PowerState::Wowl, now);
                self.hooks.fire(CallbackSlot::EnterWowl, Ok(()));
                self.resume_pending(now);
            }
            CommandKind::EnterStandby => {
                self.set_state(PowerState::Standby, now);
                self.vote_rf_supplies_off(now);
                self.hooks.fire(CallbackSlot::Standby, Ok(()));
                self.resume_pending(now);
            }
            CommandKind::ExitImps | CommandKind::ExitBmps => self.enter_full_power(now),
        }
    }

    /// Settles in BMPS and replays, in order, a buffered full-power request,
    /// the UAPSD intent or the WOWL intent.
    fn on_bmps_entered(&mut self, now: I) {
        self.set_state(PowerState::Bmps, now);
        self.hooks.fire(CallbackSlot::Bmps, Ok(()));

        if self.resume_pending(now) {
            return;
        }

        if self.uapsd_required && self.policy.uapsd_enabled {
            if let Err(error) = self.issue_enter_uapsd(now) {
                self.reject(PowerRequest::StartUapsd, error, now);
                self.uapsd_required = false;
                self.hooks.fire(CallbackSlot::StartUapsd, Err(error));
            }
        } else if self.wowl_required {
            if let Err(error) = self.issue_enter_wowl(now) {
                self.reject(PowerRequest::EnterWowl, error, now);
                self.wowl_required = false;
                self.hooks.fire(CallbackSlot::EnterWowl, Err(error));
            }
        }
    }

    fn on_failure(&mut self, kind: CommandKind, settled: Settled, now: I) {
        match kind {
            CommandKind::EnterImps => self.enter_full_power(now),
            CommandKind::EnterBmps => {
                self.hooks.fire(CallbackSlot::Bmps, Err(PowerError::Failure));
                self.fail_wowl_enter();
                self.enter_full_power(now);
            }
            CommandKind::EnterStandby => {
                self.hooks
                    .fire(CallbackSlot::Standby, Err(PowerError::Failure));
                self.enter_full_power(now);
            }
            CommandKind::EnterUapsd => {
                self.fail_uapsd_start();
                self.set_state(PowerState::Bmps, now);
                self.resume_pending(now);
            }
            CommandKind::EnterWowl => {
                self.fail_wowl_enter();
                self.set_state(settled.origin, now);
                self.resume_pending(now);
            }
            CommandKind::ExitImps
            | CommandKind::ExitBmps
            | CommandKind::ExitUapsd
            | CommandKind::ExitWowl => {
                let buffered = self.pending_full_power.take();
                self.set_state(settled.origin, now);
                if settled.origin == PowerState::Imps {
                    self.timers
                        .arm(PmcTimer::IdleSleep, now, self.policy.idle_sleep_period);
                }
                if settled.request_state == PowerState::RequestFullPower {
                    self.hooks
                        .fire(CallbackSlot::FullPower, Err(PowerError::Failure));
                } else if buffered.is_some() {
                    // A full-power request arrived behind a UAPSD stop or WOWL exit.
                    self.pending_full_power = buffered;
                    self.resume_pending(now);
                }
            }
        }
    }

    fn fail_uapsd_start(&mut self) {
        self.uapsd_required = false;
        self.hooks
            .fire(CallbackSlot::StartUapsd, Err(PowerError::Failure));
    }

    fn fail_wowl_enter(&mut self) {
        self.wowl_required = false;
        self.hooks
            .fire(CallbackSlot::EnterWowl, Err(PowerError::Failure));
    }

    fn on_idle_sleep_expired(&mut self, now: I) {
        assert!(
            self.state == PowerState::Imps,
            "idle-sleep timer expired in {}",
            self.state
        );
        self.exit_or_fail(FullPowerReason::Other, now);
    }

    fn on_traffic_expired(&mut self, now: I) {
        if self.state != PowerState::FullPower {
            return;
        }

        if self.remain_active {
            self.remain_active_ticks = self.remain_active_ticks.saturating_add(1);
            if self.remain_active_ticks < self.policy.remain_active_max_ticks {
                self.update_traffic_timer(now);
                return;
            }
            self.remain_active = false;
            self.remain_active_ticks = 0;
            self.record(TelemetryEventKind::GuardForceCleared, now);
        }

        if self.link.frames_since_last_poll() > self.policy.traffic_threshold {
            self.update_traffic_timer(now);
            return;
        }
        if !self.traffic_wanted() {
            return;
        }

        let result = self
            .preflight(PowerSaveMode::Bmps)
            .and_then(|()| self.issue_enter_bmps(now));
        if let Err(error) = result {
            self.reject(PowerRequest::Bmps, error, now);
            self.update_traffic_timer(now);
        }
    }

    fn on_exit_retry_expired(&mut self, now: I) {
        let Some(reason) = self.exit_retry.take() else {
            return;
        };
        if self.state.is_power_save() {
            self.exit_or_fail(reason, now);
        }
    }

    /// Starts an exit on behalf of a timer; full-power waiters learn of a
    /// failure to issue it.
    fn exit_or_fail(&mut self, reason: FullPowerReason, now: I) {
        if let Err(error) = self.begin_exit(reason, now) {
            self.reject(PowerRequest::FullPower, error, now);
            self.hooks.fire(CallbackSlot::FullPower, Err(error));
        }
    }
}
