#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Link-management seam backed by Embassy channels.
//!
//! The controller hands commands and control messages to [`ChannelLink`],
//! which forwards them to the link task over a bounded queue. Responses come
//! back to the PMC task as events, one at a time and in order.

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TrySendError};
use pmc_core::command::{CommandData, CommandKind, LinkManager, SessionSnapshot, SubmitError};
use pmc_core::deferred::DeferredMessage;
use pmc_core::power::CommandStatus;

use crate::status;

/// Depth of the queue between the controller and the link task.
pub const LINK_QUEUE_DEPTH: usize = 4;

#[cfg(target_os = "none")]
pub type LinkMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
pub type LinkMutex = NoopRawMutex;

/// Work handed to the link task.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LinkRequest {
    Command(CommandData),
    Message(DeferredMessage),
}

/// Answer to a mode-change command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LinkResponse {
    Completed {
        kind: CommandKind,
        status: CommandStatus,
    },
    Aborted(CommandKind),
}

pub type LinkQueue = Channel<LinkMutex, LinkRequest, LINK_QUEUE_DEPTH>;
pub type LinkSender<'a> = Sender<'a, LinkMutex, LinkRequest, LINK_QUEUE_DEPTH>;
pub type LinkReceiver<'a> = Receiver<'a, LinkMutex, LinkRequest, LINK_QUEUE_DEPTH>;

/// Drives the RF supply rail vote.
pub trait RfSupplyVote {
    /// `true` switches the supplies off.
    fn set_supplies_off(&mut self, off: bool);
}

/// Vote sink used on host builds and boards without a controllable rail.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopRfVote;

impl RfSupplyVote for NoopRfVote {
    fn set_supplies_off(&mut self, _off: bool) {}
}

/// RF supply enable line. High keeps the supplies powered.
#[cfg(target_os = "none")]
pub struct GpioRfVote<'d> {
    enable: embassy_stm32::gpio::Output<'d>,
}

#[cfg(target_os = "none")]
impl<'d> GpioRfVote<'d> {
    pub fn new(enable: embassy_stm32::gpio::Output<'d>) -> Self {
        Self { enable }
    }
}

#[cfg(target_os = "none")]
impl RfSupplyVote for GpioRfVote<'_> {
    fn set_supplies_off(&mut self, off: bool) {
        if off {
            self.enable.set_low();
        } else {
            self.enable.set_high();
        }
        defmt::info!("link: rf supplies voted {}", if off { "off" } else { "on" });
    }
}

/// [`LinkManager`] that queues work for the link task.
///
/// The board has no data path, so the traffic poll always reads zero frames.
pub struct ChannelLink<'a, R> {
    requests: LinkSender<'a>,
    rf: R,
}

impl<'a, R> ChannelLink<'a, R>
where
    R: RfSupplyVote,
{
    pub fn new(requests: LinkSender<'a>, rf: R) -> Self {
        Self { requests, rf }
    }

    fn enqueue(&self, request: LinkRequest) -> Result<(), SubmitError> {
        // A full queue means the link task has not caught up; the controller
        // retries exits on its own timer.
        self.requests
            .try_send(request)
            .map_err(|TrySendError::Full(_)| SubmitError::WouldBlock)
    }
}

impl<R> LinkManager for ChannelLink<'_, R>
where
    R: RfSupplyVote,
{
    fn submit(&mut self, command: &CommandData) -> Result<(), SubmitError> {
        self.enqueue(LinkRequest::Command(command.clone()))
    }

    fn send_message(&mut self, message: &DeferredMessage) -> Result<(), SubmitError> {
        self.enqueue(LinkRequest::Message(message.clone()))
    }

    fn vote_rf_supplies(&mut self, off: bool) {
        self.rf.set_supplies_off(off);
    }

    fn sessions(&self) -> SessionSnapshot {
        status::sessions()
    }
}

/// Stand-in for the radio firmware: every mode change succeeds and control
/// messages are absorbed.
#[derive(Debug, Default)]
pub struct LoopbackRadio {
    commands: u32,
    messages: u32,
}

impl LoopbackRadio {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            commands: 0,
            messages: 0,
        }
    }

    /// Handles one request. Messages produce no response.
    pub fn handle(&mut self, request: &LinkRequest) -> Option<LinkResponse> {
        match request {
            LinkRequest::Command(command) => {
                self.commands = self.commands.wrapping_add(1);
                Some(LinkResponse::Completed {
                    kind: command.kind,
                    status: CommandStatus::Success,
                })
            }
            LinkRequest::Message(_) => {
                self.messages = self.messages.wrapping_add(1);
                None
            }
        }
    }

    pub fn commands(&self) -> u32 {
        self.commands
    }

    pub fn messages(&self) -> u32 {
        self.messages
    }
}
