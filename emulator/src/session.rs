use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use pmc_core::command::{CommandPool, SubmitError};
use pmc_core::config::{PowerPolicy, PowerSource};
use pmc_core::deferred::MessageKind;
use pmc_core::pmc::PowerController;
use pmc_core::power::CommandStatus;
use pmc_core::registry::{PowerHooks, RegistrationId};
use pmc_core::repl::catalog;
use pmc_core::repl::commands::{CommandError, CommandExecutor, CommandOutcome};
use pmc_core::repl::grammar::parse_duration_literal;
use pmc_core::repl::status::StatusFormatter;
use pmc_core::telemetry::EventId;

use crate::sim::{SimInstant, SimLink};

type Controller = PowerController<'static, NoopRawMutex, SimLink, SimInstant>;

/// Emulator-only commands that stand in for the link-management layer and
/// the rest of the platform.
pub const SIM_HELP_TOPICS: &[(&str, &str)] = &[
    (
        "complete",
        "complete [ok|fail]            - answer the outstanding command",
    ),
    (
        "abort",
        "abort                         - discard the outstanding command",
    ),
    (
        "tick",
        "tick <duration>               - advance the clock, firing due timers",
    ),
    (
        "veto",
        "veto allow|deny|clear         - set the emulator's power-save vote",
    ),
    (
        "assoc",
        "assoc <count>                 - set infrastructure associations",
    ),
    (
        "frames",
        "frames <count>                - frames seen before the next traffic poll",
    ),
    (
        "source",
        "source ac|battery             - switch the power source",
    ),
    (
        "link",
        "link accept|block|reject      - how the link answers submissions",
    ),
    (
        "ready",
        "ready                         - mark the module ready",
    ),
    (
        "defer",
        "defer <byte>                  - send a keep-alive once at full power",
    ),
    (
        "log",
        "log                           - dump the telemetry ring",
    ),
];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionProfile {
    Battery,
    Ac,
}

impl SessionProfile {
    pub fn log_path(self) -> &'static str {
        match self {
            SessionProfile::Battery => "transcripts/emulator-battery.log",
            SessionProfile::Ac => "transcripts/emulator-ac.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            SessionProfile::Battery => "PMC Emulator transcript (battery power)",
            SessionProfile::Ac => "PMC Emulator transcript (AC power)",
        }
    }

    pub fn power_source(self) -> PowerSource {
        match self {
            SessionProfile::Battery => PowerSource::Battery,
            SessionProfile::Ac => PowerSource::Ac,
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, String> {
        if tag.eq_ignore_ascii_case("battery") {
            Ok(Self::Battery)
        } else if tag.eq_ignore_ascii_case("ac") {
            Ok(Self::Ac)
        } else {
            Err(format!("Unknown session profile `{tag}`"))
        }
    }
}

/// The emulator's own entry in the power-save veto list.
struct Veto {
    allow: Arc<AtomicBool>,
    id: Option<RegistrationId>,
}

impl Veto {
    fn register(&mut self, hooks: &PowerHooks<NoopRawMutex>) -> bool {
        if self.id.is_some() {
            return true;
        }
        let allow = Arc::clone(&self.allow);
        self.id = hooks
            .register_power_save_check(Some(Box::new(move || allow.load(Ordering::SeqCst))))
            .ok();
        self.id.is_some()
    }

    fn clear(&mut self, hooks: &PowerHooks<NoopRawMutex>) {
        if let Some(id) = self.id.take() {
            hooks.deregister_power_save_check(id);
        }
    }
}

pub struct Session {
    executor: CommandExecutor<Controller>,
    hooks: &'static PowerHooks<NoopRawMutex>,
    veto: Veto,
    clock: SimInstant,
    transcript: TranscriptLogger,
    telemetry_cursor: EventId,
}

impl Session {
    /// Session that records a transcript at [`SessionProfile::log_path`].
    pub fn new(profile: SessionProfile) -> io::Result<Self> {
        let transcript = TranscriptLogger::create(profile)?;
        Ok(Self::with_transcript(profile, transcript))
    }

    /// Session without a transcript file.
    #[cfg(test)]
    pub fn detached(profile: SessionProfile) -> Self {
        Self::with_transcript(profile, TranscriptLogger::sink())
    }

    fn with_transcript(profile: SessionProfile, transcript: TranscriptLogger) -> Self {
        // The controller borrows both for its whole life; the process owns the session.
        let hooks: &'static PowerHooks<NoopRawMutex> =
            Box::leak(Box::new(PowerHooks::new(NoopRawMutex::new())));
        let pool: &'static CommandPool = Box::leak(Box::new(CommandPool::default()));

        let mut pmc = PowerController::new(hooks, pool, SimLink::new(1), PowerPolicy::new());
        pmc.set_power_source(profile.power_source(), SimInstant::ZERO);
        // A new controller is stopped, so starting cannot fail.
        let _ = pmc.start(SimInstant::ZERO);
        let telemetry_cursor = pmc.telemetry().next_event_id();

        let mut veto = Veto {
            allow: Arc::new(AtomicBool::new(true)),
            id: None,
        };
        veto.register(hooks);

        Self {
            executor: CommandExecutor::new(pmc),
            hooks,
            veto,
            clock: SimInstant::ZERO,
            transcript,
            telemetry_cursor,
        }
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        self.transcript
            .append_line(self.clock.since_start(), TranscriptRole::Host, trimmed)?;

        let mut lines = match self.simulate(trimmed) {
            Some(lines) => lines,
            None => self.execute(trimmed),
        };
        lines.extend(self.executor.console_mut().link_mut().take_notes());
        lines.extend(self.drain_telemetry());

        self.record_output(self.clock.since_start(), &lines)?;
        Ok(lines)
    }

    fn execute(&mut self, line: &str) -> Vec<String> {
        if let Some(help) = sim_help(line) {
            return help;
        }

        match self.executor.execute(line, self.clock) {
            Ok(CommandOutcome::Request { request, status }) => {
                vec![format!("OK {request} {status}")]
            }
            Ok(CommandOutcome::Status(snapshot)) => {
                let mut rendered = String::new();
                if StatusFormatter::new(&snapshot)
                    .write_all(&mut rendered)
                    .is_err()
                {
                    return vec!["ERR status formatting failed".to_string()];
                }
                rendered
                    .split("\r\n")
                    .filter(|line| !line.is_empty())
                    .map(str::to_string)
                    .collect()
            }
            Ok(CommandOutcome::Help(None)) => help_listing(),
            Ok(CommandOutcome::Help(Some(spec))) => {
                vec![format!("{:<30}- {}", spec.usage, spec.summary)]
            }
            Err(CommandError::Parse(err)) => vec![format!("ERR syntax {err}")],
            Err(CommandError::Unsupported(reason)) => vec![format!("ERR unsupported {reason}")],
            Err(CommandError::Power(request, error)) => vec![format!("ERR {request} {error}")],
        }
    }

    /// Handles an emulator-only command. Returns `None` for console commands.
    fn simulate(&mut self, line: &str) -> Option<Vec<String>> {
        let mut words = line.split_whitespace();
        let verb = words.next()?.to_ascii_lowercase();
        let (_, usage) = SIM_HELP_TOPICS.iter().find(|(name, _)| *name == verb)?;
        let argument = words.next();
        if words.next().is_some() {
            return Some(vec![format!("ERR usage {usage}")]);
        }

        let now = self.clock;
        let lines = match (verb.as_str(), argument) {
            ("complete", None | Some("ok")) => self.respond(Some(CommandStatus::Success)),
            ("complete", Some("fail")) => self.respond(Some(CommandStatus::Failure)),
            ("abort", None) => self.respond(None),
            ("tick", Some(value)) => match parse_duration_literal(value) {
                Some(step) => self.advance(step),
                None => vec![format!("ERR usage {usage}")],
            },
            ("veto", Some(choice)) => self.set_veto(choice, usage),
            ("assoc", Some(value)) => match value.parse::<u8>() {
                Ok(count) => {
                    let pmc = self.executor.console_mut();
                    pmc.link_mut().set_infra_sessions(count);
                    pmc.notify_association_changed(now);
                    vec![format!("OK assoc {count}")]
                }
                Err(_) => vec![format!("ERR usage {usage}")],
            },
            ("frames", Some(value)) => match value.parse::<u32>() {
                Ok(frames) => {
                    self.executor.console_mut().link_mut().set_frames(frames);
                    vec![format!("OK frames {frames}")]
                }
                Err(_) => vec![format!("ERR usage {usage}")],
            },
            ("source", Some(value)) => match SessionProfile::from_tag(value) {
                Ok(profile) => {
                    let source = profile.power_source();
                    self.executor.console_mut().set_power_source(source, now);
                    vec![format!("OK source {source}")]
                }
                Err(_) => vec![format!("ERR usage {usage}")],
            },
            ("link", Some(mode)) => {
                let refuse = match mode {
                    "accept" => None,
                    "block" => Some(SubmitError::WouldBlock),
                    "reject" => Some(SubmitError::Rejected),
                    _ => return Some(vec![format!("ERR usage {usage}")]),
                };
                self.executor.console_mut().link_mut().set_refuse(refuse);
                vec![format!("OK link {mode}")]
            }
            ("ready", None) => {
                self.executor.console_mut().mark_ready(now);
                vec!["OK ready".to_string()]
            }
            ("defer", Some(value)) => match value.parse::<u8>() {
                Ok(byte) => match self.executor.console_mut().defer_message(
                    MessageKind::KeepAlive,
                    &[byte],
                    now,
                ) {
                    Ok(status) => vec![format!("OK defer-message {status}")],
                    Err(error) => vec![format!("ERR defer-message {error}")],
                },
                Err(_) => vec![format!("ERR usage {usage}")],
            },
            ("log", None) => {
                let telemetry = self.executor.console().telemetry();
                let mut lines = vec![format!("telemetry ({} records)", telemetry.len())];
                lines.extend(
                    telemetry
                        .oldest_first()
                        .map(|record| format!("  {} {record}", record.timestamp)),
                );
                self.telemetry_cursor = telemetry.next_event_id();
                lines
            }
            _ => vec![format!("ERR usage {usage}")],
        };
        Some(lines)
    }

    /// Answers the outstanding command. `None` aborts it.
    fn respond(&mut self, status: Option<CommandStatus>) -> Vec<String> {
        let now = self.clock;
        let pmc = self.executor.console_mut();
        let Some(kind) = pmc.outstanding() else {
            return vec!["ERR no command outstanding".to_string()];
        };

        match status {
            Some(status) => {
                pmc.on_command_complete(kind, status, now);
                vec![format!("OK complete {kind} {status}")]
            }
            None => {
                pmc.on_command_aborted(kind, now);
                vec![format!("OK abort {kind}")]
            }
        }
    }

    /// Moves the clock forward, stopping at every timer deadline on the way.
    fn advance(&mut self, step: Duration) -> Vec<String> {
        let target = self.clock + step;
        let pmc = self.executor.console_mut();
        while let Some(deadline) = pmc.next_deadline().filter(|deadline| *deadline <= target) {
            self.clock = self.clock.max(deadline);
            pmc.poll_timers(self.clock);
        }
        self.clock = target;
        vec![format!("OK tick now={}", self.clock)]
    }

    fn set_veto(&mut self, choice: &str, usage: &str) -> Vec<String> {
        match choice {
            "allow" | "deny" => {
                self.veto
                    .allow
                    .store(choice == "allow", Ordering::SeqCst);
                if self.veto.register(self.hooks) {
                    vec![format!("OK veto {choice}")]
                } else {
                    vec!["ERR veto registry full".to_string()]
                }
            }
            "clear" => {
                self.veto.clear(self.hooks);
                vec!["OK veto cleared".to_string()]
            }
            _ => vec![format!("ERR usage {usage}")],
        }
    }

    fn drain_telemetry(&mut self) -> Vec<String> {
        let telemetry = self.executor.console().telemetry();
        let lines = telemetry
            .since(self.telemetry_cursor)
            .map(|record| format!("  {} {record}", record.timestamp))
            .collect();
        self.telemetry_cursor = telemetry.next_event_id();
        lines
    }

    fn record_output(&mut self, elapsed: Duration, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.transcript
                .append_line(elapsed, TranscriptRole::Emulator, line)?;
        }
        Ok(())
    }
}

/// `help <emulator command>`; other help goes through the console catalog.
fn sim_help(line: &str) -> Option<Vec<String>> {
    let mut words = line.split_whitespace();
    if !words.next()?.eq_ignore_ascii_case("help") {
        return None;
    }
    let topic = words.next()?;
    SIM_HELP_TOPICS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(topic))
        .map(|(_, detail)| vec![(*detail).to_string()])
}

fn help_listing() -> Vec<String> {
    let mut lines = vec!["Console commands:".to_string()];
    for spec in catalog::commands() {
        lines.push(format!("  {:<30}- {}", spec.usage, spec.summary));
    }
    lines.push("Emulator commands:".to_string());
    for (_, detail) in SIM_HELP_TOPICS {
        lines.push(format!("  {detail}"));
    }
    lines.push("Type `help <topic>` for a specific command.".to_string());
    lines
}

struct TranscriptLogger {
    writer: Box<dyn Write>,
}

impl TranscriptLogger {
    fn create(profile: SessionProfile) -> io::Result<Self> {
        let path = Path::new(profile.log_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: Box::new(BufWriter::new(file)),
        };
        logger.write_header(profile)?;
        Ok(logger)
    }

    #[cfg(test)]
    fn sink() -> Self {
        Self {
            writer: Box::new(io::sink()),
        }
    }

    fn write_header(&mut self, profile: SessionProfile) -> io::Result<()> {
        writeln!(self.writer, "# {}", profile.header())?;
        writeln!(
            self.writer,
            "# Timestamps are emulated milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
