//! Embassy monotonic time adapted to the controller's instant bounds.

use core::ops::Add;
use core::time::Duration;

use embassy_time::Instant;
use pmc_core::telemetry::TelemetryInstant;

/// [`embassy_time::Instant`] with `core::time::Duration` arithmetic.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FirmwareInstant(Instant);

impl FirmwareInstant {
    #[cfg(target_os = "none")]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    #[must_use]
    pub const fn into_embassy(self) -> Instant {
        self.0
    }

    #[must_use]
    pub fn as_millis(self) -> u64 {
        self.0.as_millis()
    }
}

impl From<Instant> for FirmwareInstant {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

impl Add<Duration> for FirmwareInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        let ticks = self.0.as_micros().saturating_add(micros);
        Self(Instant::from_micros(ticks))
    }
}

impl TelemetryInstant for FirmwareInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        let micros = self.0.as_micros().saturating_sub(earlier.0.as_micros());
        Duration::from_micros(micros)
    }
}
