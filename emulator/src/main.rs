mod session;
mod sim;

use std::env;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use crossterm::style::{StyledContent, Stylize};
use crossterm::tty::IsTty;
use session::{Session, SessionProfile};

const USAGE: &str = "Usage: pmc-emulator [--profile <battery|ac>] | pmc-emulator <battery|ac>";

fn main() -> io::Result<ExitCode> {
    let args: Vec<String> = env::args().skip(1).collect();
    let profile = match profile_from_args(&args) {
        Ok(profile) => profile,
        Err(message) => {
            eprintln!("{message}\n{USAGE}");
            return Ok(ExitCode::from(2));
        }
    };

    let stdout = io::stdout();
    let styled = stdout.is_tty();
    let mut out = stdout.lock();
    let mut input = io::stdin().lock();
    let mut session = Session::new(profile)?;

    writeln!(
        out,
        "PMC emulator, {profile:?} profile, transcript in {}.",
        profile.log_path()
    )?;
    writeln!(
        out,
        "The module starts not ready: type `ready` first. `help` lists commands, `exit` leaves."
    )?;

    let mut buffer = String::new();
    loop {
        write!(out, "> ")?;
        out.flush()?;

        buffer.clear();
        if input.read_line(&mut buffer)? == 0 {
            writeln!(out)?;
            break;
        }

        let command = buffer.trim();
        if command.is_empty() {
            continue;
        }
        if ["exit", "quit"]
            .iter()
            .any(|word| command.eq_ignore_ascii_case(word))
        {
            writeln!(out, "bye")?;
            break;
        }

        for reply in session.handle_command(command)? {
            if styled {
                writeln!(out, "{}", highlight(&reply))?;
            } else {
                writeln!(out, "{reply}")?;
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Errors red, telemetry grey, link activity cyan.
fn highlight(reply: &str) -> StyledContent<&str> {
    if reply.starts_with("ERR") {
        reply.red()
    } else if reply.starts_with("  ") {
        reply.dark_grey()
    } else if reply.starts_with("link ") {
        reply.cyan()
    } else {
        reply.stylize()
    }
}

fn profile_from_args(args: &[String]) -> Result<SessionProfile, String> {
    let tag = match args {
        [] => return Ok(SessionProfile::Battery),
        [flag] if flag == "--profile" => {
            return Err("--profile needs a value".to_string());
        }
        [flag, value] if flag == "--profile" => value.as_str(),
        [single] => single.strip_prefix("--profile=").unwrap_or(single),
        _ => return Err("too many arguments".to_string()),
    };
    SessionProfile::from_tag(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn profile_accepts_every_spelling() {
        assert_eq!(profile_from_args(&[]), Ok(SessionProfile::Battery));
        assert_eq!(profile_from_args(&args(&["ac"])), Ok(SessionProfile::Ac));
        assert_eq!(
            profile_from_args(&args(&["--profile=AC"])),
            Ok(SessionProfile::Ac)
        );
        assert_eq!(
            profile_from_args(&args(&["--profile", "battery"])),
            Ok(SessionProfile::Battery)
        );
    }

    #[test]
    fn profile_rejects_bad_arguments() {
        assert!(profile_from_args(&args(&["--profile"])).is_err());
        assert!(profile_from_args(&args(&["mains"])).is_err());
        assert!(profile_from_args(&args(&["ac", "battery"])).is_err());
    }
}
