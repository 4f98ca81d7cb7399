#![allow(dead_code)]

use core::ops::Add;
use core::time::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use pmc_core::command::{
    CommandData, CommandKind, CommandPool, LinkManager, SessionSnapshot, SubmitError,
};
use pmc_core::config::PowerPolicy;
use pmc_core::deferred::DeferredMessage;
use pmc_core::pmc::PowerController;
use pmc_core::power::{CommandStatus, PowerError};
use pmc_core::registry::{CompletionCallback, PowerHooks};
use pmc_core::telemetry::TelemetryInstant;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct MockInstant(pub u64);

impl MockInstant {
    pub fn millis(value: u64) -> Self {
        Self(value * 1_000)
    }
}

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + u64::try_from(rhs.as_micros()).expect("duration fits in u64"))
    }
}

impl TelemetryInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

/// Records everything the controller asks of the link-management layer.
#[derive(Default)]
pub struct MockLink {
    pub submitted: Vec<CommandData>,
    pub messages: Vec<DeferredMessage>,
    pub rf_votes: Vec<bool>,
    pub sessions: SessionSnapshot,
    /// Answer given to every submission while set.
    pub refuse: Option<SubmitError>,
    pub refuse_messages: bool,
    pub frames: u32,
}

impl MockLink {
    /// No association at all; IMPS territory.
    pub fn idle() -> Self {
        Self::default()
    }

    /// One infrastructure association; BMPS territory.
    pub fn associated() -> Self {
        Self {
            sessions: SessionSnapshot {
                infra_sessions: 1,
                peer_sessions: 0,
            },
            ..Self::default()
        }
    }

    pub fn kinds(&self) -> Vec<CommandKind> {
        self.submitted.iter().map(|command| command.kind).collect()
    }

    pub fn last(&self) -> Option<&CommandData> {
        self.submitted.last()
    }
}

impl LinkManager for MockLink {
    fn submit(&mut self, command: &CommandData) -> Result<(), SubmitError> {
        if let Some(error) = self.refuse {
            return Err(error);
        }
        self.submitted.push(command.clone());
        Ok(())
    }

    fn send_message(&mut self, message: &DeferredMessage) -> Result<(), SubmitError> {
        if self.refuse_messages {
            return Err(SubmitError::Rejected);
        }
        self.messages.push(message.clone());
        Ok(())
    }

    fn vote_rf_supplies(&mut self, off: bool) {
        self.rf_votes.push(off);
    }

    fn sessions(&self) -> SessionSnapshot {
        self.sessions
    }

    fn frames_since_last_poll(&mut self) -> u32 {
        core::mem::take(&mut self.frames)
    }
}

pub type Controller<'a> = PowerController<'a, NoopRawMutex, MockLink, MockInstant>;

pub fn hooks() -> PowerHooks<NoopRawMutex> {
    PowerHooks::new(NoopRawMutex::new())
}

/// Started, ready controller at `t = 0`.
pub fn controller<'a>(
    hooks: &'a PowerHooks<NoopRawMutex>,
    pool: &'a CommandPool,
    link: MockLink,
    policy: PowerPolicy,
) -> Controller<'a> {
    let mut pmc = PowerController::new(hooks, pool, link, policy);
    pmc.start(MockInstant(0)).expect("stopped controller starts");
    pmc.mark_ready(MockInstant(0));
    pmc
}

/// Veto entry whose answer the test flips.
#[derive(Clone)]
pub struct Veto(Arc<AtomicBool>);

impl Veto {
    pub fn register(hooks: &PowerHooks<NoopRawMutex>, allow: bool) -> Self {
        let flag = Arc::new(AtomicBool::new(allow));
        let check = Arc::clone(&flag);
        hooks
            .register_power_save_check(Some(Box::new(move || check.load(Ordering::SeqCst))))
            .expect("veto registry has room");
        Self(flag)
    }

    pub fn set(&self, allow: bool) {
        self.0.store(allow, Ordering::SeqCst);
    }
}

/// Collects completion callback results.
#[derive(Clone, Default)]
pub struct Outcomes(Arc<Mutex<Vec<Result<(), PowerError>>>>);

impl Outcomes {
    pub fn callback(&self) -> Option<CompletionCallback> {
        let sink = Arc::clone(&self.0);
        Some(Box::new(move |result| {
            sink.lock().expect("outcome lock").push(result);
        }))
    }

    pub fn results(&self) -> Vec<Result<(), PowerError>> {
        self.0.lock().expect("outcome lock").clone()
    }
}

/// Completes the outstanding command successfully at `now`.
pub fn complete(pmc: &mut Controller<'_>, now: MockInstant) {
    let kind = pmc.outstanding().expect("a command is outstanding");
    pmc.on_command_complete(kind, CommandStatus::Success, now);
}

/// Fails the outstanding command at `now`.
pub fn fail(pmc: &mut Controller<'_>, now: MockInstant) {
    let kind = pmc.outstanding().expect("a command is outstanding");
    pmc.on_command_complete(kind, CommandStatus::Failure, now);
}
