//! Deadline bookkeeping for the three controller timers.
//!
//! Timers are plain deadlines over the caller's monotonic instant. The runtime
//! sleeps until [`TimerSet::next_deadline`] and then polls the controller.

use core::fmt;
use core::ops::Add;
use core::time::Duration;

use heapless::Vec;

/// Number of distinct timers.
pub const TIMER_COUNT: usize = 3;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PmcTimer {
    /// One-shot, armed on entering IMPS.
    IdleSleep,
    /// Re-armed while full power and BMPS is being pursued.
    Traffic,
    /// One-shot retry of an exit command that could not be submitted.
    ExitRetry,
}

impl PmcTimer {
    pub const ALL: [PmcTimer; TIMER_COUNT] =
        [PmcTimer::IdleSleep, PmcTimer::Traffic, PmcTimer::ExitRetry];

    const fn index(self) -> usize {
        match self {
            PmcTimer::IdleSleep => 0,
            PmcTimer::Traffic => 1,
            PmcTimer::ExitRetry => 2,
        }
    }
}

impl fmt::Display for PmcTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PmcTimer::IdleSleep => f.write_str("idle-sleep"),
            PmcTimer::Traffic => f.write_str("traffic"),
            PmcTimer::ExitRetry => f.write_str("exit-retry"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct TimerSet<Instant> {
    deadlines: [Option<Instant>; TIMER_COUNT],
}

impl<Instant> TimerSet<Instant>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            deadlines: [None; TIMER_COUNT],
        }
    }

    /// Arms `timer` to fire `period` after `now`, replacing any earlier
    /// deadline. A zero period leaves the timer disarmed.
    pub fn arm(&mut self, timer: PmcTimer, now: Instant, period: Duration) -> bool {
        if period.is_zero() {
            self.deadlines[timer.index()] = None;
            return false;
        }
        self.deadlines[timer.index()] = Some(now + period);
        true
    }

    pub fn cancel(&mut self, timer: PmcTimer) {
        self.deadlines[timer.index()] = None;
    }

    pub fn cancel_all(&mut self) {
        self.deadlines = [None; TIMER_COUNT];
    }

    pub fn deadline(&self, timer: PmcTimer) -> Option<Instant> {
        self.deadlines[timer.index()]
    }

    pub fn is_armed(&self, timer: PmcTimer) -> bool {
        self.deadline(timer).is_some()
    }

    /// Earliest armed deadline.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.iter().flatten().copied().min()
    }

    /// Disarms and returns every timer due at `now`, in [`PmcTimer::ALL`] order.
    pub fn take_expired(&mut self, now: Instant) -> Vec<PmcTimer, TIMER_COUNT> {
        let mut expired = Vec::new();
        for timer in PmcTimer::ALL {
            let slot = &mut self.deadlines[timer.index()];
            if slot.is_some_and(|deadline| deadline <= now) {
                *slot = None;
                // At most one entry per timer.
                let _ = expired.push(timer);
            }
        }
        expired
    }
}

impl<Instant> Default for TimerSet<Instant>
where
    Instant: Copy + Ord + Add<Duration, Output = Instant>,
{
    fn default() -> Self {
        Self::new()
    }
}
