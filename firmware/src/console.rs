#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Operator console carried over USB CDC ACM.
//!
//! Bytes from the host are assembled into lines here and executed by the PMC
//! task through `pmc_core`'s command executor. Responses are rendered into a
//! bounded buffer and cut into USB-sized frames on the way out.

use core::fmt::{self, Write};
use core::str;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::{String, Vec};
use pmc_core::repl::catalog;
use pmc_core::repl::commands::{CommandError, CommandOutcome};
use pmc_core::repl::status::StatusFormatter;

/// Maximum number of bytes accepted on a single line (excluding terminator).
pub const MAX_LINE_LEN: usize = 96;
/// Payload size of one USB full-speed bulk packet.
pub const CONSOLE_FRAME_LEN: usize = 64;
/// Depth of the outbound frame queue.
pub const CONSOLE_QUEUE_DEPTH: usize = 8;
/// Room for the longest response, the full help listing.
pub const RESPONSE_CAPACITY: usize = 1536;

pub const PROMPT: &str = "> ";

#[cfg(target_os = "none")]
type ConsoleMutex = ThreadModeRawMutex;
#[cfg(not(target_os = "none"))]
type ConsoleMutex = NoopRawMutex;

pub type ConsoleLine = String<MAX_LINE_LEN>;
pub type ConsoleFrame = Vec<u8, CONSOLE_FRAME_LEN>;
pub type Response = String<RESPONSE_CAPACITY>;

/// Frames on their way to the host.
pub type ConsoleQueue = Channel<ConsoleMutex, ConsoleFrame, CONSOLE_QUEUE_DEPTH>;
pub type ConsoleSender<'a> = Sender<'a, ConsoleMutex, ConsoleFrame, CONSOLE_QUEUE_DEPTH>;
pub type ConsoleReceiver<'a> = Receiver<'a, ConsoleMutex, ConsoleFrame, CONSOLE_QUEUE_DEPTH>;

/// Errors raised while assembling a line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LineError {
    /// Input exceeded [`MAX_LINE_LEN`]; the rest of the line is discarded.
    LineOverflow,
    InvalidUtf8,
}

impl fmt::Display for LineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineError::LineOverflow => f.write_str("line too long"),
            LineError::InvalidUtf8 => f.write_str("line is not valid UTF-8"),
        }
    }
}

/// Collects bytes until a line terminator.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: Vec<u8, MAX_LINE_LEN>,
    discarding: bool,
}

impl LineAssembler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            discarding: false,
        }
    }

    /// Clears any partial line, e.g. when the host reconnects.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }

    /// Feeds one byte. Returns a complete, non-empty line on its terminator.
    pub fn push(&mut self, byte: u8) -> Result<Option<ConsoleLine>, LineError> {
        match byte {
            b'\r' | b'\n' => {
                if core::mem::take(&mut self.discarding) {
                    self.buffer.clear();
                    return Ok(None);
                }
                self.take_line()
            }
            0x08 | 0x7f => {
                self.buffer.pop();
                Ok(None)
            }
            _ if self.discarding => Ok(None),
            value => {
                if self.buffer.push(value).is_err() {
                    self.discarding = true;
                    return Err(LineError::LineOverflow);
                }
                Ok(None)
            }
        }
    }

    fn take_line(&mut self) -> Result<Option<ConsoleLine>, LineError> {
        let result = match str::from_utf8(&self.buffer) {
            Ok(line) if line.trim().is_empty() => Ok(None),
            Ok(line) => {
                let mut owned = ConsoleLine::new();
                owned
                    .push_str(line.trim())
                    .map_err(|_| LineError::LineOverflow)?;
                Ok(Some(owned))
            }
            Err(_) => Err(LineError::InvalidUtf8),
        };
        self.buffer.clear();
        result
    }
}

/// Renders the result of a console command. Every line ends in `\r\n`.
pub fn render_result(
    result: &Result<CommandOutcome, CommandError<'_>>,
    out: &mut Response,
) {
    out.clear();
    if write_result(result, out).is_err() {
        out.clear();
        let _ = out.push_str("ERR response truncated\r\n");
    }
}

fn write_result<W: Write>(
    result: &Result<CommandOutcome, CommandError<'_>>,
    out: &mut W,
) -> fmt::Result {
    match result {
        Ok(CommandOutcome::Request { request, status }) => {
            write!(out, "OK {request} {status}\r\n")
        }
        Ok(CommandOutcome::Status(snapshot)) => StatusFormatter::new(snapshot).write_all(out),
        Ok(CommandOutcome::Help(Some(spec))) => {
            write!(out, "{:<30}- {}\r\n", spec.usage, spec.summary)
        }
        Ok(CommandOutcome::Help(None)) => {
            for spec in catalog::commands() {
                write!(out, "  {:<30}- {}\r\n", spec.usage, spec.summary)?;
            }
            out.write_str("Type `help <topic>` for a specific command.\r\n")
        }
        Err(CommandError::Parse(error)) => write!(out, "ERR syntax {error}\r\n"),
        Err(CommandError::Unsupported(reason)) => write!(out, "ERR unsupported {reason}\r\n"),
        Err(CommandError::Power(request, error)) => write!(out, "ERR {request} {error}\r\n"),
    }
}

/// Splits `text` into USB-sized frames.
pub fn frames(text: &str) -> impl Iterator<Item = ConsoleFrame> + '_ {
    text.as_bytes()
        .chunks(CONSOLE_FRAME_LEN)
        .filter_map(|chunk| ConsoleFrame::from_slice(chunk).ok())
}
