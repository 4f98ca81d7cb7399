//! Request entry points.
//!
//! Each request answers `Immediate` when the radio already satisfies it,
//! `Pending` when a command was issued or the request was folded into intent
//! state, or a [`PowerError`]. Callbacks are only kept, and later fired, when
//! `Pending` is returned.

use crate::command::{CommandData, CommandKind, LinkManager};
use crate::config::PowerSaveConfig;
use crate::deferred::{DeferredMessage, MessageKind};
use crate::power::{FullPowerReason, PowerError, PowerRequest, PowerSaveMode, PowerState, RequestStatus};
use crate::registry::{CallbackSlot, CompletionCallback};
use crate::wowl::{WowlEnterParams, WowlExitParams};
use embassy_sync::blocking_mutex::raw::RawMutex;

use super::{PowerController, PowerInstant};

type RequestResult = Result<RequestStatus, PowerError>;

impl<M, L, I> PowerController<'_, M, L, I>
where
    M: RawMutex,
    L: LinkManager,
    I: PowerInstant,
{
    /// Brings the radio back to full power.
    ///
    /// While another transition is in flight the reason is buffered (the
    /// first one wins) and replayed once that transition settles.
    pub fn request_full_power(
        &mut self,
        reason: FullPowerReason,
        callback: Option<CompletionCallback>,
        now: I,
    ) -> RequestResult {
        match self.state {
            PowerState::FullPower => Ok(RequestStatus::Immediate),
            PowerState::Stopped | PowerState::LowPower => Err(self.reject(
                PowerRequest::FullPower,
                PowerError::InvalidState,
                now,
            )),
            state if state.is_request() => {
                self.queue_callback(CallbackSlot::FullPower, callback, PowerRequest::FullPower, now)?;
                if state != PowerState::RequestFullPower {
                    self.pending_full_power.get_or_insert(reason);
                }
                Ok(RequestStatus::Pending)
            }
            _ => {
                let queued = callback.is_some();
                self.queue_callback(CallbackSlot::FullPower, callback, PowerRequest::FullPower, now)?;
                self.begin_exit(reason, now).map_err(|error| {
                    if queued {
                        self.hooks.retract(CallbackSlot::FullPower);
                    }
                    self.reject(PowerRequest::FullPower, error, now)
                })
            }
        }
    }

    /// Enters IMPS from full power.
    pub fn request_imps(&mut self, now: I) -> RequestResult {
        match self.state {
            PowerState::FullPower => {}
            PowerState::Imps | PowerState::RequestImps => {
                return Err(self.reject(PowerRequest::Imps, PowerError::AlreadyInTargetMode, now));
            }
            _ => return Err(self.reject(PowerRequest::Imps, PowerError::InvalidState, now)),
        }

        let result = self
            .preflight(PowerSaveMode::Imps)
            .and_then(|()| self.issue(CommandData::new(CommandKind::EnterImps), PowerState::RequestImps, now));
        match result {
            Ok(()) => Ok(RequestStatus::Pending),
            Err(error) => {
                self.update_traffic_timer(now);
                Err(self.reject(PowerRequest::Imps, error, now))
            }
        }
    }

    /// Enters BMPS from full power. UAPSD and WOWL already imply BMPS.
    pub fn request_bmps(&mut self, callback: Option<CompletionCallback>, now: I) -> RequestResult {
        match self.state {
            PowerState::Bmps | PowerState::Uapsd | PowerState::Wowl => Ok(RequestStatus::Immediate),
            PowerState::RequestBmps => {
                self.queue_callback(CallbackSlot::Bmps, callback, PowerRequest::Bmps, now)?;
                Ok(RequestStatus::Pending)
            }
            PowerState::FullPower => {
                if let Err(error) = self.preflight(PowerSaveMode::Bmps) {
                    self.update_traffic_timer(now);
                    return Err(self.reject(PowerRequest::Bmps, error, now));
                }
                let queued = callback.is_some();
                self.queue_callback(CallbackSlot::Bmps, callback, PowerRequest::Bmps, now)?;
                match self.issue_enter_bmps(now) {
                    Ok(()) => Ok(RequestStatus::Pending),
                    Err(error) => {
                        if queued {
                            self.hooks.retract(CallbackSlot::Bmps);
                        }
                        self.update_traffic_timer(now);
                        Err(self.reject(PowerRequest::Bmps, error, now))
                    }
                }
            }
            _ => Err(self.reject(PowerRequest::Bmps, PowerError::InvalidState, now)),
        }
    }

    /// Starts UAPSD. From full power the radio enters BMPS first; a veto
    /// buffers the intent and leaves the traffic timer to retry.
    pub fn request_start_uapsd(
        &mut self,
        callback: Option<CompletionCallback>,
        now: I,
    ) -> RequestResult {
        if !self.policy.uapsd_enabled {
            return Err(self.reject(PowerRequest::StartUapsd, PowerError::Disabled, now));
        }

        match self.state {
            PowerState::Uapsd => Ok(RequestStatus::Immediate),
            PowerState::FullPower => {
                let previous = self.uapsd_required;
                let queued = callback.is_some();
                self.queue_callback(CallbackSlot::StartUapsd, callback, PowerRequest::StartUapsd, now)?;
                self.uapsd_required = true;

                let result = self
                    .preflight(PowerSaveMode::Uapsd)
                    .and_then(|()| self.issue_enter_bmps(now));
                match result {
                    Ok(()) => Ok(RequestStatus::Pending),
                    Err(PowerError::NotNow) => {
                        self.update_traffic_timer(now);
                        Ok(RequestStatus::Pending)
                    }
                    Err(error) => {
                        self.uapsd_required = previous;
                        if queued {
                            self.hooks.retract(CallbackSlot::StartUapsd);
                        }
                        Err(self.reject(PowerRequest::StartUapsd, error, now))
                    }
                }
            }
            PowerState::Bmps => {
                let queued = callback.is_some();
                self.queue_callback(CallbackSlot::StartUapsd, callback, PowerRequest::StartUapsd, now)?;
                self.uapsd_required = true;
                match self.issue_enter_uapsd(now) {
                    Ok(()) => Ok(RequestStatus::Pending),
                    Err(error) => {
                        self.uapsd_required = false;
                        if queued {
                            self.hooks.retract(CallbackSlot::StartUapsd);
                        }
                        Err(self.reject(PowerRequest::StartUapsd, error, now))
                    }
                }
            }
            PowerState::RequestBmps
            | PowerState::RequestStartUapsd
            | PowerState::RequestStopUapsd
            | PowerState::RequestFullPower
            | PowerState::RequestEnterWowl
            | PowerState::RequestExitWowl => {
                self.queue_callback(CallbackSlot::StartUapsd, callback, PowerRequest::StartUapsd, now)?;
                self.uapsd_required = true;
                Ok(RequestStatus::Pending)
            }
            _ => Err(self.reject(PowerRequest::StartUapsd, PowerError::InvalidState, now)),
        }
    }

    /// Stops UAPSD. Repeating the request while the stop is in flight is a
    /// no-op.
    pub fn request_stop_uapsd(&mut self, now: I) -> RequestResult {
        match self.state {
            PowerState::Stopped => Err(self.reject(
                PowerRequest::StopUapsd,
                PowerError::InvalidState,
                now,
            )),
            PowerState::RequestStopUapsd => Ok(RequestStatus::Immediate),
            PowerState::Uapsd => {
                self.uapsd_required = false;
                let data = CommandData::exit(CommandKind::ExitUapsd, FullPowerReason::Other);
                match self.issue(data, PowerState::RequestStopUapsd, now) {
                    Ok(()) => Ok(RequestStatus::Pending),
                    Err(error) => Err(self.reject(PowerRequest::StopUapsd, error, now)),
                }
            }
            PowerState::RequestStartUapsd => {
                // The start completion sees the cleared intent and exits.
                self.uapsd_required = false;
                Ok(RequestStatus::Pending)
            }
            // A start still waiting on BMPS or the veto is withdrawn.
            _ if self.uapsd_required => {
                self.uapsd_required = false;
                self.hooks
                    .fire(CallbackSlot::StartUapsd, Err(PowerError::Failure));
                Ok(RequestStatus::Immediate)
            }
            _ => Err(self.reject(
                PowerRequest::StopUapsd,
                PowerError::InvalidState,
                now,
            )),
        }
    }

    /// Enters standby. Refused while a peer-to-peer session exists.
    pub fn request_standby(
        &mut self,
        callback: Option<CompletionCallback>,
        now: I,
    ) -> RequestResult {
        match self.state {
            PowerState::Standby => Ok(RequestStatus::Immediate),
            PowerState::FullPower => {
                if let Err(error) = self.preflight(PowerSaveMode::Standby) {
                    return Err(self.reject(PowerRequest::Standby, error, now));
                }
                let queued = callback.is_some();
                self.queue_callback(CallbackSlot::Standby, callback, PowerRequest::Standby, now)?;
                let data = CommandData::new(CommandKind::EnterStandby);
                match self.issue(data, PowerState::RequestStandby, now) {
                    Ok(()) => Ok(RequestStatus::Pending),
                    Err(error) => {
                        if queued {
                            self.hooks.retract(CallbackSlot::Standby);
                        }
                        self.update_traffic_timer(now);
                        Err(self.reject(PowerRequest::Standby, error, now))
                    }
                }
            }
            _ => Err(self.reject(PowerRequest::Standby, PowerError::InvalidState, now)),
        }
    }

    /// Enters WOWL with `params`. From full power the radio passes through
    /// BMPS; from BMPS or WOWL the enter command is issued directly, which
    /// also reprograms patterns while already in WOWL.
    pub fn request_enter_wowl(
        &mut self,
        params: WowlEnterParams,
        callback: Option<CompletionCallback>,
        now: I,
    ) -> RequestResult {
        if !self.policy.wowl_enabled {
            return Err(self.reject(PowerRequest::EnterWowl, PowerError::Disabled, now));
        }

        match self.state {
            PowerState::FullPower => {
                if let Err(error) = self.preflight(PowerSaveMode::Wowl) {
                    return Err(self.reject(PowerRequest::EnterWowl, error, now));
                }
                let queued = callback.is_some();
                self.queue_callback(CallbackSlot::EnterWowl, callback, PowerRequest::EnterWowl, now)?;
                self.wowl_required = true;
                self.wowl_params = params;
                match self.issue_enter_bmps(now) {
                    Ok(()) => Ok(RequestStatus::Pending),
                    Err(error) => {
                        self.wowl_required = false;
                        if queued {
                            self.hooks.retract(CallbackSlot::EnterWowl);
                        }
                        Err(self.reject(PowerRequest::EnterWowl, error, now))
                    }
                }
            }
            PowerState::Bmps | PowerState::Wowl => {
                let queued = callback.is_some();
                self.queue_callback(CallbackSlot::EnterWowl, callback, PowerRequest::EnterWowl, now)?;
                self.wowl_params = params;
                match self.issue_enter_wowl(now) {
                    Ok(()) => Ok(RequestStatus::Pending),
                    Err(error) => {
                        if queued {
                            self.hooks.retract(CallbackSlot::EnterWowl);
                        }
                        Err(self.reject(PowerRequest::EnterWowl, error, now))
                    }
                }
            }
            PowerState::RequestBmps | PowerState::RequestExitWowl => {
                self.queue_callback(CallbackSlot::EnterWowl, callback, PowerRequest::EnterWowl, now)?;
                self.wowl_required = true;
                self.wowl_params = params;
                Ok(RequestStatus::Pending)
            }
            PowerState::RequestEnterWowl => Err(self.reject(
                PowerRequest::EnterWowl,
                PowerError::AlreadyInTargetMode,
                now,
            )),
            _ => Err(self.reject(PowerRequest::EnterWowl, PowerError::InvalidState, now)),
        }
    }

    /// Leaves WOWL for BMPS. A buffered enter that never started is dropped.
    pub fn request_exit_wowl(&mut self, params: WowlExitParams, now: I) -> RequestResult {
        match self.state {
            PowerState::Wowl => {
                self.wowl_exit_params = params;
                let data = self.exit_wowl_data(FullPowerReason::Other);
                match self.issue(data, PowerState::RequestExitWowl, now) {
                    Ok(()) => Ok(RequestStatus::Pending),
                    Err(error) => Err(self.reject(PowerRequest::ExitWowl, error, now)),
                }
            }
            PowerState::RequestExitWowl => Ok(RequestStatus::Immediate),
            state if self.wowl_required && state != PowerState::RequestEnterWowl => {
                self.wowl_required = false;
                self.hooks
                    .fire(CallbackSlot::EnterWowl, Err(PowerError::Failure));
                Ok(RequestStatus::Immediate)
            }
            _ => Err(self.reject(PowerRequest::ExitWowl, PowerError::InvalidState, now)),
        }
    }

    /// Parks the radio in low power. Timers stop, queued callbacks fail and
    /// any outstanding command is abandoned.
    pub fn enter_low_power(&mut self, now: I) -> RequestResult {
        match self.state {
            PowerState::LowPower => {
                return Err(self.reject(
                    PowerRequest::EnterLowPower,
                    PowerError::AlreadyInTargetMode,
                    now,
                ));
            }
            PowerState::Stopped => {
                return Err(self.reject(PowerRequest::EnterLowPower, PowerError::InvalidState, now));
            }
            _ => {}
        }

        self.timers.cancel_all();
        self.abandon_outstanding();
        self.pending_full_power = None;
        self.exit_retry = None;
        self.uapsd_required = false;
        self.wowl_required = false;
        self.hooks.fail_all(PowerError::Failure);
        self.unvote_rf_supplies(now);
        self.set_state(PowerState::LowPower, now);
        Ok(RequestStatus::Immediate)
    }

    /// Leaves low power once both kill switches are released.
    pub fn exit_low_power(&mut self, now: I) -> RequestResult {
        if self.state != PowerState::LowPower {
            return Err(self.reject(PowerRequest::ExitLowPower, PowerError::InvalidState, now));
        }
        if self.kill_switches.any_engaged() {
            return Err(self.reject(PowerRequest::ExitLowPower, PowerError::NotNow, now));
        }
        self.enter_full_power(now);
        Ok(RequestStatus::Immediate)
    }

    /// Sends `payload` now when at full power, otherwise queues it and asks
    /// for full power. The queued entry is withdrawn when that request does
    /// not end up pending.
    pub fn defer_message(&mut self, kind: MessageKind, payload: &[u8], now: I) -> RequestResult {
        let Some(message) = DeferredMessage::new(kind, payload) else {
            return Err(self.reject(PowerRequest::DeferMessage, PowerError::Resources, now));
        };

        if self.state == PowerState::FullPower {
            return self
                .send_message(&message, now)
                .map(|()| RequestStatus::Immediate);
        }

        if let Err(error) = self.hooks.push_deferred(message) {
            return Err(self.reject(PowerRequest::DeferMessage, error, now));
        }
        self.telemetry
            .record_message_deferred(kind, self.hooks.deferred_len(), now);

        match self.request_full_power(FullPowerReason::Other, None, now) {
            Ok(RequestStatus::Pending) => Ok(RequestStatus::Pending),
            Ok(RequestStatus::Immediate) => match self.hooks.retract_deferred() {
                Some(message) => self
                    .send_message(&message, now)
                    .map(|()| RequestStatus::Immediate),
                None => Ok(RequestStatus::Immediate),
            },
            Err(error) => {
                self.hooks.retract_deferred();
                Err(error)
            }
        }
    }

    /// Applies power-save options through a `PowerSaveConfig` message.
    pub fn apply_power_save_config(&mut self, config: &PowerSaveConfig, now: I) -> RequestResult {
        self.defer_message(MessageKind::PowerSaveConfig, &config.encode(), now)
    }

    fn queue_callback(
        &mut self,
        slot: CallbackSlot,
        callback: Option<CompletionCallback>,
        request: PowerRequest,
        now: I,
    ) -> Result<(), PowerError> {
        match callback {
            Some(callback) => self
                .hooks
                .queue(slot, callback)
                .map_err(|error| self.reject(request, error, now)),
            None => Ok(()),
        }
    }

    pub(super) fn issue_enter_bmps(&mut self, now: I) -> Result<(), PowerError> {
        self.issue(
            CommandData::new(CommandKind::EnterBmps),
            PowerState::RequestBmps,
            now,
        )
    }

    pub(super) fn issue_enter_uapsd(&mut self, now: I) -> Result<(), PowerError> {
        self.issue(
            CommandData::new(CommandKind::EnterUapsd),
            PowerState::RequestStartUapsd,
            now,
        )
    }

    pub(super) fn issue_enter_wowl(&mut self, now: I) -> Result<(), PowerError> {
        let data = CommandData::with_payload(CommandKind::EnterWowl, &self.wowl_params.encode())?;
        self.issue(data, PowerState::RequestEnterWowl, now)
    }
}
