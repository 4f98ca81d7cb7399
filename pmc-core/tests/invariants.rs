mod common;

use core::time::Duration;

use common::{Controller, MockInstant, MockLink, Outcomes, Veto, complete, controller, hooks};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use pmc_core::command::{CommandKind, CommandPool, PoolOrigin, SubmitError};
use pmc_core::config::{PowerPolicy, PowerSource};
use pmc_core::pmc::{KillSwitches, PowerController};
use pmc_core::power::{
    CommandStatus, FullPowerReason, PowerError, PowerSaveMode, PowerState, RequestStatus,
};
use pmc_core::registry::{CallbackSlot, PowerHooks};
use pmc_core::telemetry::TelemetryEventKind;
use pmc_core::timers::PmcTimer;

fn manual() -> PowerPolicy {
    PowerPolicy {
        auto_bmps: false,
        ..PowerPolicy::new()
    }
}

fn recorded(pmc: &Controller<'_>, event: TelemetryEventKind) -> bool {
    pmc.telemetry()
        .oldest_first()
        .any(|record| record.event == event)
}

#[test]
#[should_panic(expected = "no command outstanding")]
fn stray_completion_is_a_contract_violation() {
    let hooks = hooks();
    let pool = CommandPool::default();
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), manual());
    pmc.on_command_complete(CommandKind::EnterBmps, CommandStatus::Success, MockInstant(0));
}

#[test]
#[should_panic(expected = "is outstanding")]
fn mismatched_completion_is_a_contract_violation() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), manual());
    pmc.request_bmps(None, MockInstant(0)).expect("bmps accepted");
    pmc.on_command_complete(CommandKind::ExitImps, CommandStatus::Success, MockInstant(1));
}

#[test]
fn one_command_outstanding_at_a_time() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), manual());

    pmc.request_bmps(None, MockInstant(0)).expect("bmps accepted");
    pmc.request_start_uapsd(None, MockInstant(1)).expect("buffered");
    pmc.request_full_power(FullPowerReason::Host, None, MockInstant(2))
        .expect("buffered");
    pmc.request_enter_wowl(
        pmc_core::wowl::WowlEnterParams::magic_packet(),
        None,
        MockInstant(3),
    )
    .expect("buffered");

    assert_eq!(pmc.link().submitted.len(), 1);
    assert_eq!(pool.in_use(), 1);
}

#[test]
fn veto_list_needs_a_yes_and_no_no() {
    let hooks = hooks();
    let pool = CommandPool::default();
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), manual());

    // Empty list.
    assert_eq!(pmc.request_bmps(None, MockInstant(0)), Err(PowerError::NotNow));

    hooks
        .register_power_save_check(None)
        .expect("veto registry has room");
    assert_eq!(pmc.request_bmps(None, MockInstant(1)), Err(PowerError::NotNow));

    let allow = Veto::register(&hooks, true);
    let deny = hooks
        .register_power_save_check(Some(Box::new(|| false)))
        .expect("veto registry has room");
    assert_eq!(pmc.request_bmps(None, MockInstant(2)), Err(PowerError::NotNow));

    assert!(hooks.deregister_power_save_check(deny));
    assert!(!hooks.deregister_power_save_check(deny));
    assert_eq!(pmc.request_bmps(None, MockInstant(3)), Ok(RequestStatus::Pending));

    allow.set(false);
    complete(&mut pmc, MockInstant(4));
    assert_eq!(pmc.state(), PowerState::Bmps);
}

#[test]
fn exits_fall_back_to_the_heap_when_the_pool_is_dry() {
    let hooks = hooks();
    let pool = CommandPool::new(1);
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::idle(), manual());

    pmc.request_imps(MockInstant(0)).expect("imps accepted");
    complete(&mut pmc, MockInstant(1));
    assert_eq!(pool.in_use(), 0);

    let held = pool.try_acquire().expect("pool has a slot");
    pmc.request_full_power(FullPowerReason::Host, None, MockInstant(2))
        .expect("exit accepted");
    assert!(recorded(
        &pmc,
        TelemetryEventKind::CommandIssued(CommandKind::ExitImps, PoolOrigin::HeapFallback)
    ));
    assert_eq!(pool.in_use(), 1);

    complete(&mut pmc, MockInstant(3));
    assert_eq!(pmc.state(), PowerState::FullPower);
    drop(held);
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn enter_commands_fail_fast_when_the_pool_is_dry() {
    let hooks = hooks();
    let pool = CommandPool::new(1);
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), manual());
    let outcomes = Outcomes::default();

    let _held = pool.try_acquire().expect("pool has a slot");
    assert_eq!(
        pmc.request_bmps(outcomes.callback(), MockInstant(0)),
        Err(PowerError::Resources)
    );
    assert_eq!(pmc.state(), PowerState::FullPower);
    assert_eq!(hooks.pending_callbacks(CallbackSlot::Bmps), 0);
    assert!(outcomes.results().is_empty());
}

#[test]
fn blocked_exit_is_retried_by_timer() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::idle(), manual());
    let outcomes = Outcomes::default();

    pmc.request_imps(MockInstant(0)).expect("imps accepted");
    complete(&mut pmc, MockInstant(1));

    pmc.link_mut().refuse = Some(SubmitError::WouldBlock);
    assert_eq!(
        pmc.request_full_power(FullPowerReason::Roam, outcomes.callback(), MockInstant(2)),
        Ok(RequestStatus::Pending)
    );
    assert_eq!(pmc.state(), PowerState::Imps);
    assert!(pmc.timers().is_armed(PmcTimer::ExitRetry));
    assert!(recorded(
        &pmc,
        TelemetryEventKind::CommandDeferred(CommandKind::ExitImps)
    ));
    assert_eq!(pool.in_use(), 0);

    pmc.link_mut().refuse = None;
    let retry_at = pmc
        .timers()
        .deadline(PmcTimer::ExitRetry)
        .expect("retry armed");
    assert_eq!(retry_at, MockInstant(2) + Duration::from_millis(10));
    pmc.poll_timers(retry_at);

    let exit = pmc.link().last().expect("exit resubmitted");
    assert_eq!(exit.kind, CommandKind::ExitImps);
    assert_eq!(exit.full_power_reason, Some(FullPowerReason::Roam));
    complete(&mut pmc, retry_at + Duration::from_millis(1));
    assert_eq!(outcomes.results(), [Ok(())]);
}

#[test]
fn rejected_exit_fails_the_waiter() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::idle(), manual());
    let outcomes = Outcomes::default();

    pmc.request_imps(MockInstant(0)).expect("imps accepted");
    complete(&mut pmc, MockInstant(1));

    pmc.link_mut().refuse = Some(SubmitError::Rejected);
    assert_eq!(
        pmc.request_full_power(FullPowerReason::Host, outcomes.callback(), MockInstant(2)),
        Err(PowerError::Resources)
    );
    assert_eq!(pmc.state(), PowerState::Imps);
    assert_eq!(hooks.pending_callbacks(CallbackSlot::FullPower), 0);
    assert!(outcomes.results().is_empty());
}

#[test]
fn remain_active_guard_is_force_cleared() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let policy = PowerPolicy {
        remain_active_max_ticks: 2,
        ..PowerPolicy::new()
    };
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy);
    pmc.set_remain_active(true);

    let first = pmc.next_deadline().expect("traffic timer armed");
    assert_eq!(first, MockInstant::millis(500));
    pmc.poll_timers(first);
    assert_eq!(pmc.state(), PowerState::FullPower);
    assert!(pmc.remain_active());

    let second = pmc.next_deadline().expect("traffic timer re-armed");
    pmc.poll_timers(second);
    assert!(!pmc.remain_active());
    assert!(recorded(&pmc, TelemetryEventKind::GuardForceCleared));
    assert_eq!(pmc.state(), PowerState::RequestBmps);
}

#[test]
fn busy_link_keeps_the_radio_awake() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), PowerPolicy::new());

    pmc.link_mut().frames = 9;
    let first = pmc.next_deadline().expect("traffic timer armed");
    pmc.poll_timers(first);
    assert_eq!(pmc.state(), PowerState::FullPower);
    assert!(pmc.timers().is_armed(PmcTimer::Traffic));

    let second = pmc.next_deadline().expect("traffic timer re-armed");
    pmc.poll_timers(second);
    assert_eq!(pmc.state(), PowerState::RequestBmps);
    assert!(!pmc.timers().is_armed(PmcTimer::Traffic));
}

#[test]
fn low_power_abandons_the_outstanding_command() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), manual());
    let outcomes = Outcomes::default();

    pmc.request_bmps(outcomes.callback(), MockInstant(0)).expect("bmps accepted");
    assert_eq!(pmc.enter_low_power(MockInstant(1)), Ok(RequestStatus::Immediate));
    assert_eq!(pmc.state(), PowerState::LowPower);
    assert_eq!(pmc.outstanding(), None);
    assert_eq!(pool.in_use(), 0);
    assert_eq!(outcomes.results(), [Err(PowerError::Failure)]);
    assert_eq!(pmc.next_deadline(), None);

    pmc.on_command_complete(CommandKind::EnterBmps, CommandStatus::Success, MockInstant(2));
    assert_eq!(pmc.state(), PowerState::LowPower);
    assert!(recorded(
        &pmc,
        TelemetryEventKind::StaleCompletion(CommandKind::EnterBmps)
    ));

    assert_eq!(
        pmc.enter_low_power(MockInstant(3)),
        Err(PowerError::AlreadyInTargetMode)
    );
    assert_eq!(
        pmc.request_bmps(None, MockInstant(4)),
        Err(PowerError::InvalidState)
    );
}

#[test]
fn late_responses_to_every_abandoned_command_are_absorbed() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), manual());

    pmc.request_bmps(None, MockInstant(0)).expect("bmps accepted");
    pmc.enter_low_power(MockInstant(1)).expect("low power");
    pmc.exit_low_power(MockInstant(2)).expect("back to full power");
    pmc.request_standby(None, MockInstant(3)).expect("standby accepted");
    pmc.enter_low_power(MockInstant(4)).expect("low power again");

    // Both responses were already queued when their commands were dropped.
    pmc.on_command_complete(CommandKind::EnterBmps, CommandStatus::Success, MockInstant(5));
    pmc.on_command_complete(CommandKind::EnterStandby, CommandStatus::Success, MockInstant(6));

    assert_eq!(pmc.state(), PowerState::LowPower);
    assert_eq!(pmc.outstanding(), None);
    let stale = pmc
        .telemetry()
        .oldest_first()
        .filter(|record| matches!(record.event, TelemetryEventKind::StaleCompletion(_)))
        .count();
    assert_eq!(stale, 2);
}

#[test]
fn low_power_drops_a_vetoed_uapsd_intent() {
    let hooks = hooks();
    let pool = CommandPool::default();
    let veto = Veto::register(&hooks, false);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), manual());
    let outcomes = Outcomes::default();

    assert_eq!(
        pmc.request_start_uapsd(outcomes.callback(), MockInstant(0)),
        Ok(RequestStatus::Pending)
    );
    assert!(pmc.uapsd_required());
    assert!(pmc.timers().is_armed(PmcTimer::Traffic));

    pmc.enter_low_power(MockInstant(1)).expect("low power");
    assert_eq!(outcomes.results(), [Err(PowerError::Failure)]);
    assert!(!pmc.uapsd_required());

    veto.set(true);
    pmc.exit_low_power(MockInstant(2)).expect("back to full power");
    assert_eq!(pmc.state(), PowerState::FullPower);
    assert!(!pmc.timers().is_armed(PmcTimer::Traffic));
    assert_eq!(pmc.next_deadline(), None);

    pmc.poll_timers(MockInstant::millis(60_000));
    assert!(pmc.link().submitted.is_empty());
    assert_eq!(outcomes.results(), [Err(PowerError::Failure)]);
}

#[test]
fn kill_switches_hold_the_radio_in_low_power() {
    let hooks = hooks();
    let pool = CommandPool::default();
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), manual());
    pmc.enter_low_power(MockInstant(0)).expect("low power");

    pmc.set_kill_switches(KillSwitches {
        hardware: true,
        software: false,
    });
    assert_eq!(pmc.exit_low_power(MockInstant(1)), Err(PowerError::NotNow));

    pmc.set_kill_switches(KillSwitches::default());
    assert_eq!(pmc.exit_low_power(MockInstant(2)), Ok(RequestStatus::Immediate));
    assert_eq!(pmc.state(), PowerState::FullPower);
    assert_eq!(
        pmc.exit_low_power(MockInstant(3)),
        Err(PowerError::InvalidState)
    );
}

#[test]
fn ac_power_disables_imps_and_bmps_by_default() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), PowerPolicy::new());
    assert!(pmc.timers().is_armed(PmcTimer::Traffic));

    pmc.set_power_source(PowerSource::Ac, MockInstant(0));
    assert!(!pmc.timers().is_armed(PmcTimer::Traffic));
    assert_eq!(pmc.request_bmps(None, MockInstant(1)), Err(PowerError::Disabled));
    assert_eq!(
        pmc.request_start_uapsd(None, MockInstant(2)),
        Err(PowerError::Disabled)
    );

    pmc.set_power_source(PowerSource::Battery, MockInstant(3));
    assert!(pmc.timers().is_armed(PmcTimer::Traffic));
}

#[test]
fn disabling_uapsd_fails_the_buffered_start() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, false);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), manual());
    let outcomes = Outcomes::default();

    pmc.request_start_uapsd(outcomes.callback(), MockInstant(0))
        .expect("buffered");
    pmc.disable_mode(PowerSaveMode::Uapsd, MockInstant(1));

    assert!(!pmc.uapsd_required());
    assert!(!pmc.timers().is_armed(PmcTimer::Traffic));
    assert_eq!(outcomes.results(), [Err(PowerError::Disabled)]);
}

#[test]
fn requests_wait_for_module_ready() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc: Controller<'_> =
        PowerController::new(&hooks, &pool, MockLink::associated(), PowerPolicy::new());

    assert_eq!(
        pmc.request_full_power(FullPowerReason::Host, None, MockInstant(0)),
        Err(PowerError::InvalidState)
    );
    pmc.start(MockInstant(0)).expect("stopped controller starts");
    assert_eq!(pmc.start(MockInstant(0)), Err(PowerError::InvalidState));
    assert_eq!(pmc.next_deadline(), None);
    assert_eq!(pmc.request_bmps(None, MockInstant(1)), Err(PowerError::NotNow));

    pmc.mark_ready(MockInstant(2));
    assert!(pmc.timers().is_armed(PmcTimer::Traffic));
}

#[test]
fn stop_fails_waiters_and_allows_restart() {
    let hooks: PowerHooks<NoopRawMutex> = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::idle(), manual());
    let outcomes = Outcomes::default();

    pmc.request_imps(MockInstant(0)).expect("imps accepted");
    pmc.request_full_power(FullPowerReason::Host, outcomes.callback(), MockInstant(1))
        .expect("buffered");
    pmc.stop(MockInstant(2));

    assert_eq!(pmc.state(), PowerState::Stopped);
    assert_eq!(pmc.pending_full_power(), None);
    assert_eq!(outcomes.results(), [Err(PowerError::Failure)]);
    assert!(!pmc.is_ready());

    pmc.start(MockInstant(3)).expect("restart");
    assert_eq!(pmc.state(), PowerState::FullPower);
    assert_eq!(pmc.request_imps(MockInstant(4)), Err(PowerError::NotNow));
}
