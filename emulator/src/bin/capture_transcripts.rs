use std::io;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;
#[allow(dead_code)]
#[path = "../sim.rs"]
mod sim;

use session::{Session, SessionProfile};

fn main() -> io::Result<()> {
    record_profile(SessionProfile::Battery)?;
    record_profile(SessionProfile::Ac)?;
    Ok(())
}

fn record_profile(profile: SessionProfile) -> io::Result<()> {
    let mut session = Session::new(profile)?;
    match profile {
        SessionProfile::Battery => record_battery(&mut session),
        SessionProfile::Ac => record_ac(&mut session),
    }
}

/// Automatic BMPS, a UAPSD start, a roam-triggered exit and an IMPS cycle.
fn record_battery(session: &mut Session) -> io::Result<()> {
    for line in [
        "help",
        "bmps",
        "ready",
        "tick 500ms",
        "complete",
        "uapsd start",
        "complete",
        "status",
        "defer 7",
        "full-power roam",
        "complete",
        "complete",
        "uapsd stop",
        "assoc 0",
        "imps",
        "complete",
        "tick 10s",
        "complete",
        "status",
    ] {
        let _ = session.handle_command(line)?;
    }
    Ok(())
}

/// Policy gates on AC power, a WOWL round trip and low power.
fn record_ac(session: &mut Session) -> io::Result<()> {
    for line in [
        "ready",
        "bmps",
        "imps",
        "standby",
        "complete",
        "full-power host",
        "complete",
        "source battery",
        "wowl enter pattern=2",
        "complete",
        "complete",
        "wowl exit",
        "complete",
        "lowpower enter",
        "lowpower exit",
        "log",
    ] {
        let _ = session.handle_command(line)?;
    }
    Ok(())
}
