mod common;

use common::{Controller, MockInstant, MockLink, Outcomes, Veto, complete, controller, hooks};
use pmc_core::command::{CommandKind, CommandPool};
use pmc_core::config::{BeaconForward, PowerPolicy, PowerSaveConfig};
use pmc_core::deferred::{DEFERRED_QUEUE_DEPTH, MAX_MESSAGE_PAYLOAD, MessageKind};
use pmc_core::power::{FullPowerReason, PowerError, PowerState, RequestStatus};
use pmc_core::telemetry::TelemetryEventKind;

fn policy() -> PowerPolicy {
    PowerPolicy {
        auto_bmps: false,
        ..PowerPolicy::new()
    }
}

fn into_bmps(pmc: &mut Controller<'_>) {
    pmc.request_bmps(None, MockInstant(0)).expect("bmps accepted");
    complete(pmc, MockInstant(1));
    assert_eq!(pmc.state(), PowerState::Bmps);
}

fn count(pmc: &Controller<'_>, event: TelemetryEventKind) -> usize {
    pmc.telemetry()
        .oldest_first()
        .filter(|record| record.event == event)
        .count()
}

#[test]
fn messages_sent_at_full_power_skip_the_queue() {
    let hooks = hooks();
    let pool = CommandPool::default();
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());

    assert_eq!(
        pmc.defer_message(MessageKind::KeepAlive, &[7], MockInstant(0)),
        Ok(RequestStatus::Immediate)
    );
    assert_eq!(pmc.link().messages.len(), 1);
    assert_eq!(hooks.deferred_len(), 0);
    assert!(pmc.link().submitted.is_empty());
}

#[test]
fn deferred_messages_drain_in_order_on_full_power() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    let outcomes = Outcomes::default();
    into_bmps(&mut pmc);

    assert_eq!(
        pmc.defer_message(MessageKind::KeepAlive, &[1], MockInstant(2)),
        Ok(RequestStatus::Pending)
    );
    assert_eq!(pmc.outstanding(), Some(CommandKind::ExitBmps));
    pmc.request_full_power(FullPowerReason::Host, outcomes.callback(), MockInstant(3))
        .expect("joins the exit");
    pmc.defer_message(MessageKind::HostOffload, &[2], MockInstant(4))
        .expect("queued");
    pmc.defer_message(MessageKind::Custom(9), &[3], MockInstant(5))
        .expect("queued");
    assert_eq!(hooks.deferred_len(), 3);
    assert!(pmc.link().messages.is_empty());
    assert_eq!(pmc.link().submitted.len(), 2);

    complete(&mut pmc, MockInstant(6));
    assert_eq!(pmc.state(), PowerState::FullPower);
    let sent: Vec<u8> = pmc
        .link()
        .messages
        .iter()
        .map(|message| message.payload[0])
        .collect();
    assert_eq!(sent, [1, 2, 3]);
    assert_eq!(hooks.deferred_len(), 0);
    assert_eq!(outcomes.results(), [Ok(())]);
}

#[test]
fn refused_full_power_withdraws_the_message() {
    let hooks = hooks();
    let pool = CommandPool::default();
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    pmc.enter_low_power(MockInstant(0)).expect("low power");

    assert_eq!(
        pmc.defer_message(MessageKind::KeepAlive, &[1], MockInstant(1)),
        Err(PowerError::InvalidState)
    );
    assert_eq!(hooks.deferred_len(), 0);
    assert!(pmc.link().messages.is_empty());
}

#[test]
fn send_failures_are_recorded_and_do_not_stop_the_drain() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    into_bmps(&mut pmc);

    pmc.defer_message(MessageKind::KeepAlive, &[1], MockInstant(2))
        .expect("queued");
    pmc.defer_message(MessageKind::KeepAlive, &[2], MockInstant(3))
        .expect("queued");
    pmc.link_mut().refuse_messages = true;

    complete(&mut pmc, MockInstant(4));
    assert_eq!(pmc.state(), PowerState::FullPower);
    assert_eq!(hooks.deferred_len(), 0);
    assert_eq!(
        count(&pmc, TelemetryEventKind::MessageSendFailed(MessageKind::KeepAlive)),
        2
    );

    assert_eq!(
        pmc.defer_message(MessageKind::KeepAlive, &[3], MockInstant(5)),
        Err(PowerError::Failure)
    );
}

#[test]
fn queue_depth_and_payload_size_are_bounded() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    into_bmps(&mut pmc);

    let oversized = [0u8; MAX_MESSAGE_PAYLOAD + 1];
    assert_eq!(
        pmc.defer_message(MessageKind::HostOffload, &oversized, MockInstant(2)),
        Err(PowerError::Resources)
    );

    for index in 0..DEFERRED_QUEUE_DEPTH {
        let byte = u8::try_from(index).expect("depth fits in a byte");
        pmc.defer_message(MessageKind::KeepAlive, &[byte], MockInstant(3))
            .expect("room in the queue");
    }
    assert_eq!(
        pmc.defer_message(MessageKind::KeepAlive, &[0xFF], MockInstant(4)),
        Err(PowerError::Resources)
    );
    assert_eq!(hooks.deferred_len(), DEFERRED_QUEUE_DEPTH);
}

#[test]
fn power_save_config_travels_as_a_message() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    into_bmps(&mut pmc);

    let config = PowerSaveConfig {
        beacon_forward: BeaconForward::EveryNth(3),
        listen_interval: 10,
        ..PowerSaveConfig::new()
    };
    assert_eq!(
        pmc.apply_power_save_config(&config, MockInstant(2)),
        Ok(RequestStatus::Pending)
    );
    complete(&mut pmc, MockInstant(3));

    let message = pmc.link().messages.first().expect("config sent");
    assert_eq!(message.kind, MessageKind::PowerSaveConfig);
    assert_eq!(PowerSaveConfig::decode(&message.payload), Ok(config));
}

#[test]
fn stop_discards_queued_messages() {
    let hooks = hooks();
    let pool = CommandPool::default();
    Veto::register(&hooks, true);
    let mut pmc = controller(&hooks, &pool, MockLink::associated(), policy());
    into_bmps(&mut pmc);

    pmc.defer_message(MessageKind::KeepAlive, &[1], MockInstant(2))
        .expect("queued");
    pmc.stop(MockInstant(3));

    assert_eq!(pmc.state(), PowerState::Stopped);
    assert_eq!(hooks.deferred_len(), 0);
    assert_eq!(pool.in_use(), 0);
}
