use embassy_time::Timer;

use super::{EVENTS, LINK_QUEUE, PmcEvent};
use crate::link::{LinkRequest, LoopbackRadio};

/// Time the loopback radio takes to apply a mode change.
const COMMAND_LATENCY_MS: u64 = 2;

#[embassy_executor::task]
pub async fn run() -> ! {
    let requests = LINK_QUEUE.receiver();
    let events = EVENTS.sender();
    let mut radio = LoopbackRadio::new();

    loop {
        let request = requests.receive().await;
        if let LinkRequest::Command(command) = &request {
            defmt::debug!(
                "link: applying {} ({} payload bytes)",
                defmt::Display2Format(&command.kind),
                command.payload.len()
            );
            Timer::after_millis(COMMAND_LATENCY_MS).await;
        }

        match radio.handle(&request) {
            Some(response) => {
                defmt::debug!("link: {} commands applied", radio.commands());
                events.send(PmcEvent::Link(response)).await;
            }
            None => defmt::debug!("link: {} messages absorbed", radio.messages()),
        }
    }
}
