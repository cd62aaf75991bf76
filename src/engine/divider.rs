//! Clock divider: divides the 24-PPQN master pulse down to step triggers.
//!
//! Each rhythm generator slot owns one divider. A divider first counts
//! `PULSES_PER_STEP` master pulses into one sub-pulse boundary (a 16th note
//! at 24 PPQN), then counts `ratio` boundaries into one fire. All counting
//! is countdown-and-reload, so phase survives any pulse counter overflow.

use crate::engine::PULSES_PER_STEP;

/// Largest settable division ratio.
pub const MAX_DIVIDER: u16 = 16;

#[derive(Clone, Debug)]
pub struct ClockDivider {
    /// Division ratio, 1..=MAX_DIVIDER. A change takes effect at the next
    /// phase reload so a running period is never truncated.
    ratio: u16,
    /// Master pulses left until the next sub-pulse boundary.
    sub_counter: u32,
    /// Sub-pulse boundaries left until the next fire.
    phase_counter: u16,
}

impl ClockDivider {
    pub fn new(ratio: u16) -> Self {
        let ratio = ratio.clamp(1, MAX_DIVIDER);
        Self {
            ratio,
            sub_counter: PULSES_PER_STEP,
            phase_counter: ratio,
        }
    }

    /// Advance by one master pulse. Returns `true` exactly when the phase
    /// completes, i.e. once per `ratio * PULSES_PER_STEP` pulses.
    pub fn advance(&mut self) -> bool {
        self.sub_counter -= 1;
        if self.sub_counter > 0 {
            return false;
        }
        self.sub_counter = PULSES_PER_STEP;
        self.phase_counter -= 1;
        if self.phase_counter > 0 {
            return false;
        }
        self.phase_counter = self.ratio;
        true
    }

    /// Reload both counters so all dividers can be phase-aligned.
    pub fn reset(&mut self) {
        self.sub_counter = PULSES_PER_STEP;
        self.phase_counter = self.ratio;
    }

    pub fn ratio(&self) -> u16 {
        self.ratio
    }

    /// Set the division ratio, clamped to 1..=MAX_DIVIDER. The running
    /// period finishes at the old length; the new ratio loads on the next
    /// reload.
    pub fn set_ratio(&mut self, ratio: u16) {
        self.ratio = ratio.clamp(1, MAX_DIVIDER);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_divider_fires_once_per_period() {
        for ratio in 1..=MAX_DIVIDER {
            let mut divider = ClockDivider::new(ratio);
            let period = ratio as u32 * PULSES_PER_STEP;
            // Three full periods: exactly one fire each, on the last pulse.
            for cycle in 0..3 {
                for pulse in 1..=period {
                    let fired = divider.advance();
                    assert_eq!(
                        fired,
                        pulse == period,
                        "ratio {} cycle {} pulse {}",
                        ratio,
                        cycle,
                        pulse
                    );
                }
            }
        }
    }

    #[test]
    fn test_ratio_clamped() {
        let divider = ClockDivider::new(0);
        assert_eq!(divider.ratio(), 1);

        let mut divider = ClockDivider::new(99);
        assert_eq!(divider.ratio(), MAX_DIVIDER);

        divider.set_ratio(0);
        assert_eq!(divider.ratio(), 1);
    }

    #[test]
    fn test_ratio_change_takes_effect_next_period() {
        let mut divider = ClockDivider::new(4);
        // Burn half the period, then shrink the ratio.
        for _ in 0..2 * PULSES_PER_STEP {
            assert!(!divider.advance());
        }
        divider.set_ratio(1);
        // The in-flight period still runs to its original length.
        for pulse in 1..=2 * PULSES_PER_STEP {
            assert_eq!(divider.advance(), pulse == 2 * PULSES_PER_STEP);
        }
        // From here on, the new ratio applies.
        for pulse in 1..=PULSES_PER_STEP {
            assert_eq!(divider.advance(), pulse == PULSES_PER_STEP);
        }
    }

    #[test]
    fn test_reset_realigns_phase() {
        let mut divider = ClockDivider::new(3);
        for _ in 0..7 {
            divider.advance();
        }
        divider.reset();
        let period = 3 * PULSES_PER_STEP;
        for pulse in 1..=period {
            assert_eq!(divider.advance(), pulse == period);
        }
    }
}
