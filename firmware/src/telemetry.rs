#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Mirrors the controller's telemetry ring to defmt (or stdout on the host).

use pmc_core::telemetry::{EventId, TelemetryRecord, TelemetryRecorder};

use crate::instant::FirmwareInstant;

/// Tracks which telemetry records have already been logged.
pub struct TelemetryMirror {
    cursor: EventId,
}

impl TelemetryMirror {
    /// Starts after everything currently in `recorder`.
    pub fn new(recorder: &TelemetryRecorder<FirmwareInstant>) -> Self {
        Self {
            cursor: recorder.next_event_id(),
        }
    }

    /// Logs records added since the previous call. Returns how many.
    pub fn flush(&mut self, recorder: &TelemetryRecorder<FirmwareInstant>) -> usize {
        let mut logged = 0;
        for record in recorder.since(self.cursor) {
            emit_log(record);
            logged += 1;
        }
        self.cursor = recorder.next_event_id();
        logged
    }
}

#[cfg(target_os = "none")]
fn emit_log(record: &TelemetryRecord<FirmwareInstant>) {
    defmt::info!(
        "pmc[{=u64}ms]: {}",
        record.timestamp.as_millis(),
        defmt::Display2Format(record)
    );
}

#[cfg(not(target_os = "none"))]
fn emit_log(record: &TelemetryRecord<FirmwareInstant>) {
    println!("pmc[{}ms]: {record}", record.timestamp.as_millis());
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_time::Instant;
    use pmc_core::power::PowerState;

    #[test]
    fn flush_logs_each_record_once() {
        let mut recorder: TelemetryRecorder<FirmwareInstant> = TelemetryRecorder::new();
        let start = FirmwareInstant::from(Instant::from_millis(0));
        recorder.record_transition(PowerState::Stopped, PowerState::FullPower, start);

        let mut mirror = TelemetryMirror::new(&recorder);
        assert_eq!(mirror.flush(&recorder), 0);

        let later = FirmwareInstant::from(Instant::from_millis(5));
        recorder.record_transition(PowerState::FullPower, PowerState::RequestBmps, later);
        recorder.record_transition(PowerState::RequestBmps, PowerState::Bmps, later);
        assert_eq!(mirror.flush(&recorder), 2);
        assert_eq!(mirror.flush(&recorder), 0);
    }
}
