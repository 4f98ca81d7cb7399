mod common;

use common::{Controller, MockInstant, MockLink, Outcomes, Veto, complete, controller, fail, hooks};
use pmc_core::command::{CommandKind, CommandPool};
use pmc_core::config::PowerPolicy;
use pmc_core::power::{FullPowerReason, PowerError, PowerState};
use pmc_core::registry::CallbackSlot;
use pmc_core::telemetry::TelemetryEventKind;
use pmc_core::timers::PmcTimer;
use pmc_core::wowl::WowlEnterParams;

fn policy() -> PowerPolicy {
    PowerPolicy {
        auto_bmps: false,
        ..PowerPolicy::new()
    }
}

fn abort(pmc: &mut Controller<'_>, now: MockInstant) -> CommandKind {
    let kind = pmc.outstanding().expect("a command is outstanding");
    pmc.on_command_aborted(kind, now);
    kind
}

fn assert_aborted_to_full_power(pmc: &Controller<'_>, pool: &CommandPool, kind: CommandKind) {
    assert_eq!(pmc.state(), PowerState::FullPower);
    assert_eq!(pmc.outstanding(), None);
    assert_eq!(pool.in_use(), 0);
    assert!(
        pmc.telemetry()
            .oldest_first()
            .any(|record| record.event == TelemetryEventKind::CommandAborted(kind)),
        "abort of {kind} recorded"
    );
}

#[test]
fn aborted_imps_entry_returns_to_full_power() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::idle(), policy());

    pmc.request_imps(MockInstant(0)).expect("imps accepted");
    let kind = abort(&mut pmc, MockInstant(1));
    assert_eq!(kind, CommandKind::EnterImps);
    assert_aborted_to_full_power(&pmc, &pool, kind);
    assert!(!pmc.rf_supplies_voted_off());
}

#[test]
fn aborted_bmps_entry_fails_bmps_and_wowl_waiters() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    let bmps = Outcomes::default();
    let wowl = Outcomes::default();

    pmc.request_bmps(bmps.callback(), MockInstant(0)).expect("bmps accepted");
    pmc.request_enter_wowl(WowlEnterParams::magic_packet(), wowl.callback(), MockInstant(1))
        .expect("wowl buffered behind bmps");

    let kind = abort(&mut pmc, MockInstant(2));
    assert_eq!(kind, CommandKind::EnterBmps);
    assert_aborted_to_full_power(&pmc, &pool, kind);
    assert_eq!(bmps.results(), [Err(PowerError::Failure)]);
    assert_eq!(wowl.results(), [Err(PowerError::Failure)]);
    assert!(!pmc.wowl_required());
}

#[test]
fn aborted_uapsd_entry_drops_the_intent() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    let outcomes = Outcomes::default();

    pmc.request_start_uapsd(outcomes.callback(), MockInstant(0))
        .expect("start accepted");
    complete(&mut pmc, MockInstant(1));
    let kind = abort(&mut pmc, MockInstant(2));

    assert_eq!(kind, CommandKind::EnterUapsd);
    assert_aborted_to_full_power(&pmc, &pool, kind);
    assert!(!pmc.uapsd_required());
    assert_eq!(outcomes.results(), [Err(PowerError::Failure)]);
    assert!(!pmc.timers().is_armed(PmcTimer::Traffic));
}

#[test]
fn aborted_standby_entry_fails_the_waiter() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::idle(), policy());
    let outcomes = Outcomes::default();

    pmc.request_standby(outcomes.callback(), MockInstant(0))
        .expect("standby accepted");
    let kind = abort(&mut pmc, MockInstant(1));

    assert_eq!(kind, CommandKind::EnterStandby);
    assert_aborted_to_full_power(&pmc, &pool, kind);
    assert_eq!(outcomes.results(), [Err(PowerError::Failure)]);
}

#[test]
fn aborted_wowl_entry_fails_the_waiter() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    let outcomes = Outcomes::default();

    pmc.request_enter_wowl(WowlEnterParams::magic_packet(), outcomes.callback(), MockInstant(0))
        .expect("wowl accepted");
    complete(&mut pmc, MockInstant(1));
    let kind = abort(&mut pmc, MockInstant(2));

    assert_eq!(kind, CommandKind::EnterWowl);
    assert_aborted_to_full_power(&pmc, &pool, kind);
    assert_eq!(outcomes.results(), [Err(PowerError::Failure)]);
}

#[test]
fn aborted_exits_still_reach_full_power() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    let outcomes = Outcomes::default();

    pmc.request_bmps(None, MockInstant(0)).expect("bmps accepted");
    complete(&mut pmc, MockInstant(1));
    assert_eq!(pmc.state(), PowerState::Bmps);

    pmc.request_full_power(FullPowerReason::Qos, outcomes.callback(), MockInstant(2))
        .expect("exit accepted");
    let kind = abort(&mut pmc, MockInstant(3));

    assert_eq!(kind, CommandKind::ExitBmps);
    assert_aborted_to_full_power(&pmc, &pool, kind);
    assert_eq!(outcomes.results(), [Ok(())]);
}

#[test]
fn aborted_uapsd_stop_lands_in_full_power() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());

    pmc.request_start_uapsd(None, MockInstant(0)).expect("start accepted");
    complete(&mut pmc, MockInstant(1));
    complete(&mut pmc, MockInstant(2));
    pmc.request_stop_uapsd(MockInstant(3)).expect("stop accepted");

    let kind = abort(&mut pmc, MockInstant(4));
    assert_eq!(kind, CommandKind::ExitUapsd);
    assert_aborted_to_full_power(&pmc, &pool, kind);
}

#[test]
fn failed_uapsd_entry_stays_in_bmps() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    let outcomes = Outcomes::default();

    pmc.request_start_uapsd(outcomes.callback(), MockInstant(0))
        .expect("start accepted");
    complete(&mut pmc, MockInstant(1));
    fail(&mut pmc, MockInstant(2));

    assert_eq!(pmc.state(), PowerState::Bmps);
    assert!(!pmc.uapsd_required());
    assert_eq!(outcomes.results(), [Err(PowerError::Failure)]);
    assert_eq!(pool.in_use(), 0);
}

#[test]
fn failed_bmps_entry_returns_to_full_power() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    let outcomes = Outcomes::default();

    pmc.request_bmps(outcomes.callback(), MockInstant(0)).expect("bmps accepted");
    fail(&mut pmc, MockInstant(1));

    assert_eq!(pmc.state(), PowerState::FullPower);
    assert_eq!(outcomes.results(), [Err(PowerError::Failure)]);
}

#[test]
fn failed_imps_exit_stays_asleep_and_rearms_idle_timer() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::idle(), policy());
    let outcomes = Outcomes::default();

    pmc.request_imps(MockInstant(0)).expect("imps accepted");
    complete(&mut pmc, MockInstant(1));
    pmc.request_full_power(FullPowerReason::Host, outcomes.callback(), MockInstant(2))
        .expect("exit accepted");
    assert!(!pmc.timers().is_armed(PmcTimer::IdleSleep));

    fail(&mut pmc, MockInstant(3));
    assert_eq!(pmc.state(), PowerState::Imps);
    assert!(pmc.timers().is_armed(PmcTimer::IdleSleep));
    assert!(pmc.rf_supplies_voted_off());
    assert_eq!(outcomes.results(), [Err(PowerError::Failure)]);
    assert_eq!(hooks.pending_callbacks(CallbackSlot::FullPower), 0);
}

#[test]
fn failed_uapsd_stop_replays_buffered_full_power() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    let waiter = Outcomes::default();

    pmc.request_start_uapsd(None, MockInstant(0)).expect("start accepted");
    complete(&mut pmc, MockInstant(1));
    complete(&mut pmc, MockInstant(2));
    pmc.request_stop_uapsd(MockInstant(3)).expect("stop accepted");
    pmc.request_full_power(FullPowerReason::Roam, waiter.callback(), MockInstant(4))
        .expect("buffered");

    fail(&mut pmc, MockInstant(5));
    assert_eq!(pmc.state(), PowerState::RequestFullPower);
    let retry = pmc.link().last().expect("exit reissued");
    assert_eq!(retry.kind, CommandKind::ExitUapsd);
    assert_eq!(retry.full_power_reason, Some(FullPowerReason::Roam));
    assert!(waiter.results().is_empty());

    complete(&mut pmc, MockInstant(6));
    assert_eq!(pmc.outstanding(), Some(CommandKind::ExitBmps));
    complete(&mut pmc, MockInstant(7));
    assert_eq!(pmc.state(), PowerState::FullPower);
    assert_eq!(waiter.results(), [Ok(())]);
}
