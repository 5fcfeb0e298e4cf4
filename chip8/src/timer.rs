//! CPU clock and the 60 Hz timer tick.
use std::{
    thread,
    time::{Duration, Instant},
};

use crate::constants::*;

/// Timer to synchronize thread with the software clock of the virtual CPU.
///
/// It is designed to work with the yielding cooperative pattern
/// of the interpreter loop. When the VM yields control back to the
/// caller, time elapses until it is resumed. Once the interpreter
/// is resumed, the elapsed time is taken into account when determining
/// the next cycle.
pub(crate) struct Clock {
    interval: Duration,
    last: Instant,
}

impl Clock {
    /// Creates a new clock with the current time as internal state.
    ///
    /// A zero interval never blocks.
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Instant::now(),
        }
    }

    /// Set the clock state back to zero.
    pub(crate) fn reset(&mut self) {
        self.last = Instant::now()
    }

    /// Block the current thread until the next clock cycle.
    pub(crate) fn wait(&mut self) {
        if self.interval.is_zero() {
            return;
        }

        loop {
            if self.last.elapsed() < self.interval {
                // Sleep does not have enough resolution, and causes
                // the clock to run at 30 FPS.
                //
                // Spinning a loop causes high CPU usage and fan madness.
                //
                // Yielding in a loop is the best alternative.
                thread::yield_now();
            } else {
                // Reset back to zero, rather than trying to catch up.
                //
                // If the VM was paused for debugging, and a large
                // amount of time has elapsed until it is resumed,
                // it should simply continue at the next cycle running
                // at its usual speed.
                self.reset();
                return;
            }
        }
    }
}

/// Converts elapsed wall-clock time into whole 60 Hz ticks.
///
/// The part of a tick that has not completed yet is carried over to the next
/// call, so converting time in many small slices counts the same number of
/// ticks as converting it all at once.
#[derive(Debug)]
pub struct TickCounter {
    /// Unconsumed time, in nanoseconds. Always less than one tick.
    carry: u128,
    last: Instant,
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TickCounter {
    pub fn new() -> Self {
        Self {
            carry: 0,
            last: Instant::now(),
        }
    }

    /// Drop the carried remainder and restart wall-clock measurement from now.
    pub fn reset(&mut self) {
        self.carry = 0;
        self.last = Instant::now();
    }

    /// Number of whole ticks completed after `elapsed` more time.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        let total = self.carry + elapsed.as_nanos();
        let period = TIMER_TICK_TIME as u128;

        self.carry = total % period;
        u32::try_from(total / period).unwrap_or(u32::MAX)
    }

    /// Number of whole ticks completed since the previous poll.
    pub fn poll(&mut self) -> u32 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last);
        self.last = now;
        self.advance(elapsed)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sixty_ticks() {
        let mut ticks = TickCounter::new();
        let elapsed = Duration::from_nanos(TIMER_TICK_TIME * 60);
        assert_eq!(ticks.advance(elapsed), 60);
        assert_eq!(ticks.carry, 0);
    }

    #[test]
    fn test_whole_second() {
        // A tick is slightly longer than 1/60 of a second
        let mut ticks = TickCounter::new();
        assert_eq!(ticks.advance(Duration::from_secs(1)), 59);
        assert_eq!(ticks.carry, 1_000_000_000 - 59 * TIMER_TICK_TIME as u128);
    }

    #[test]
    fn test_hundred_millis() {
        let mut ticks = TickCounter::new();
        assert_eq!(ticks.advance(Duration::from_millis(100)), 5);
    }

    #[test]
    fn test_remainder_carried() {
        let mut ticks = TickCounter::new();
        assert_eq!(ticks.advance(Duration::from_millis(10)), 0);
        assert_eq!(ticks.advance(Duration::from_millis(10)), 1);

        // Time sliced into 1ms steps adds up to the same count as one large step.
        let mut ticks = TickCounter::new();
        let total: u32 = (0..1000)
            .map(|_| ticks.advance(Duration::from_millis(1)))
            .sum();
        assert_eq!(total, 59);
    }

    #[test]
    fn test_reset_drops_remainder() {
        let mut ticks = TickCounter::new();
        ticks.advance(Duration::from_millis(16));
        ticks.reset();
        assert_eq!(ticks.advance(Duration::from_millis(1)), 0);
    }

    #[test]
    fn test_zero_interval_clock_does_not_block() {
        let mut clock = Clock::new(Duration::ZERO);
        clock.wait();
    }
}
