use alloc::boxed::Box;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_time::Timer;
use pmc_core::command::SessionSnapshot;
use pmc_core::config::PowerPolicy;
use pmc_core::pmc::PowerController;
use pmc_core::repl::commands::CommandExecutor;

use super::{CONSOLE_TX, EVENTS, HOOKS, LINK_QUEUE, POOL, PmcEvent};
use crate::console::{self, PROMPT, Response};
use crate::instant::FirmwareInstant;
use crate::link::{ChannelLink, GpioRfVote, LinkResponse};
use crate::status;
use crate::telemetry::TelemetryMirror;

type Controller = PowerController<
    'static,
    ThreadModeRawMutex,
    ChannelLink<'static, GpioRfVote<'static>>,
    FirmwareInstant,
>;

/// Owns the controller. Link responses, console lines and timer expiries
/// are handled one at a time, so the controller is never re-entered.
#[embassy_executor::task]
pub async fn run(rf_vote: GpioRfVote<'static>) -> ! {
    let link = ChannelLink::new(LINK_QUEUE.sender(), rf_vote);
    let mut pmc: Controller = PowerController::new(&HOOKS, &POOL, link, PowerPolicy::new());

    if HOOKS
        .register_state_listener(Box::new(status::record_state))
        .is_err()
    {
        defmt::warn!("pmc: state listener registry full");
    }

    // The loopback radio reports one access-point association.
    status::record_sessions(SessionSnapshot {
        infra_sessions: 1,
        peer_sessions: 0,
    });

    let now = FirmwareInstant::now();
    if let Err(error) = pmc.start(now) {
        defmt::error!("pmc: start failed: {}", defmt::Display2Format(&error));
    }
    pmc.notify_association_changed(now);
    pmc.mark_ready(now);

    let mut mirror = TelemetryMirror::new(pmc.telemetry());
    let mut executor = CommandExecutor::new(pmc);
    let mut response = Response::new();
    let console_tx = CONSOLE_TX.sender();
    let events = EVENTS.receiver();

    loop {
        let event = match executor.console().next_deadline() {
            Some(deadline) => {
                match select(events.receive(), Timer::at(deadline.into_embassy())).await {
                    Either::First(event) => Some(event),
                    Either::Second(()) => None,
                }
            }
            None => Some(events.receive().await),
        };

        let now = FirmwareInstant::now();
        let pmc = executor.console_mut();
        match event {
            None => pmc.poll_timers(now),
            Some(PmcEvent::Link(LinkResponse::Completed { kind, status })) => {
                pmc.on_command_complete(kind, status, now);
            }
            Some(PmcEvent::Link(LinkResponse::Aborted(kind))) => {
                pmc.on_command_aborted(kind, now);
            }
            Some(PmcEvent::Console(line)) => {
                let result = executor.execute(&line, now);
                console::render_result(&result, &mut response);
                for frame in console::frames(&response).chain(console::frames(PROMPT)) {
                    console_tx.send(frame).await;
                }
            }
        }

        mirror.flush(executor.console().telemetry());
    }
}
