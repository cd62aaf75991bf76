//! Tempo source: locally configured BPM or a smoothed estimate from an
//! external 24-PPQN MIDI clock.
//!
//! External sync counts pulses over a two-quarter-note window and converts
//! the window's wall time to BPM. Windows implying a tempo outside the
//! sane 20-240 BPM band are ignored so clock jitter and startup garbage
//! never corrupt the running estimate.

use std::time::{Duration, Instant};

use crate::engine::PULSES_PER_QUARTER;

pub const MIN_BPM: u16 = 20;
pub const MAX_BPM: u16 = 240;

/// Reference pulses per measurement window (two quarter notes).
const WINDOW_PULSES: u32 = 2 * PULSES_PER_QUARTER;

/// Measurement windows discarded after a transport resync, while the
/// external clock settles.
const RESYNC_HOLDOFF_WINDOWS: u32 = 16;

pub struct TempoSource {
    bpm: u16,
    /// Pulses left in the current measurement window.
    window_remaining: u32,
    /// Wall time of the last window boundary.
    window_start: Option<Instant>,
    /// Windows still to discard after a resync.
    holdoff: u32,
}

impl TempoSource {
    pub fn new(bpm: u16) -> Self {
        Self {
            bpm: bpm.clamp(MIN_BPM, MAX_BPM),
            window_remaining: WINDOW_PULSES,
            window_start: None,
            holdoff: 0,
        }
    }

    pub fn bpm(&self) -> u16 {
        self.bpm
    }

    /// Host-set tempo, clamped to the documented range.
    pub fn set_bpm(&mut self, bpm: u16) {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }

    /// Period of one master pulse at the current tempo; the host loop
    /// paces `tick()` calls with this.
    pub fn pulse_period(&self) -> Duration {
        Duration::from_secs_f64(60.0 / self.bpm as f64 / PULSES_PER_QUARTER as f64)
    }

    /// Restart external measurement, e.g. on a transport Start. The next
    /// few windows are discarded while the sender's clock settles.
    pub fn resync(&mut self) {
        self.window_remaining = WINDOW_PULSES;
        self.window_start = None;
        self.holdoff = RESYNC_HOLDOFF_WINDOWS;
    }

    /// One external 24-PPQN reference pulse, timestamped by the caller.
    pub fn on_external_pulse(&mut self, now: Instant) {
        self.window_remaining -= 1;
        if self.window_remaining > 0 {
            return;
        }
        self.window_remaining = WINDOW_PULSES;

        if let Some(start) = self.window_start {
            let elapsed_ms = now.duration_since(start).as_millis() as u64;
            if self.holdoff > 0 {
                self.holdoff -= 1;
            } else if let Some(bpm) = Self::window_to_bpm(elapsed_ms) {
                self.bpm = bpm;
            }
        }
        self.window_start = Some(now);
    }

    /// Convert a two-quarter-note window to BPM; `None` when the implied
    /// tempo is outside the sane band.
    fn window_to_bpm(elapsed_ms: u64) -> Option<u16> {
        if elapsed_ms == 0 {
            return None;
        }
        // Two quarters per window: bpm = 2 * 60000 / window_ms.
        let bpm = 120_000 / elapsed_ms;
        if (MIN_BPM as u64..=MAX_BPM as u64).contains(&bpm) {
            Some(bpm as u16)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed one full measurement window of evenly spaced pulses.
    fn feed_window(tempo: &mut TempoSource, start: Instant, window: Duration) -> Instant {
        let spacing = window / WINDOW_PULSES;
        let mut now = start;
        for _ in 0..WINDOW_PULSES {
            now += spacing;
            tempo.on_external_pulse(now);
        }
        now
    }

    #[test]
    fn test_bpm_clamped() {
        assert_eq!(TempoSource::new(10).bpm(), MIN_BPM);
        assert_eq!(TempoSource::new(999).bpm(), MAX_BPM);

        let mut tempo = TempoSource::new(120);
        tempo.set_bpm(5);
        assert_eq!(tempo.bpm(), MIN_BPM);
        tempo.set_bpm(500);
        assert_eq!(tempo.bpm(), MAX_BPM);
    }

    #[test]
    fn test_pulse_period() {
        let tempo = TempoSource::new(120);
        // 120 BPM: quarter = 500ms, pulse = 500 / 24 ms.
        let period = tempo.pulse_period();
        assert!((period.as_secs_f64() - 0.5 / 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_external_sync_tracks_plausible_tempo() {
        let mut tempo = TempoSource::new(120);
        let start = Instant::now();
        // 30 BPM: two quarters take 4 seconds.
        let t = feed_window(&mut tempo, start, Duration::from_secs(4));
        // First window only establishes the boundary.
        assert_eq!(tempo.bpm(), 120);
        feed_window(&mut tempo, t, Duration::from_secs(4));
        assert_eq!(tempo.bpm(), 30);
    }

    #[test]
    fn test_implausible_window_rejected() {
        let mut tempo = TempoSource::new(120);
        let start = Instant::now();
        let t = feed_window(&mut tempo, start, Duration::from_secs(4));
        let t = feed_window(&mut tempo, t, Duration::from_secs(4));
        assert_eq!(tempo.bpm(), 30);
        // A window implying 500 BPM (240ms for two quarters) is ignored.
        let t = feed_window(&mut tempo, t, Duration::from_millis(240));
        assert_eq!(tempo.bpm(), 30);
        // And a plausible window is accepted again afterwards.
        feed_window(&mut tempo, t, Duration::from_secs(1));
        assert_eq!(tempo.bpm(), 120);
    }

    #[test]
    fn test_single_outlier_pulse_leaves_estimate_unchanged() {
        let mut tempo = TempoSource::new(120);
        let spacing = Duration::from_secs(4) / WINDOW_PULSES;
        let mut now = Instant::now();
        for _ in 0..2 * WINDOW_PULSES {
            now += spacing;
            tempo.on_external_pulse(now);
        }
        assert_eq!(tempo.bpm(), 30);
        // One pulse arriving absurdly early barely shifts the window; the
        // estimate must not jump.
        now += Duration::from_millis(1);
        tempo.on_external_pulse(now);
        for _ in 0..WINDOW_PULSES - 1 {
            now += spacing;
            tempo.on_external_pulse(now);
        }
        assert_eq!(tempo.bpm(), 30);
    }

    #[test]
    fn test_resync_holdoff_discards_windows() {
        let mut tempo = TempoSource::new(120);
        tempo.resync();
        let mut now = Instant::now();
        // All held-off windows plus the boundary-establishing one.
        for _ in 0..RESYNC_HOLDOFF_WINDOWS + 1 {
            now = feed_window(&mut tempo, now, Duration::from_secs(4));
            assert_eq!(tempo.bpm(), 120);
        }
        // The next window finally lands.
        feed_window(&mut tempo, now, Duration::from_secs(4));
        assert_eq!(tempo.bpm(), 30);
    }

    #[test]
    fn test_window_to_bpm_bounds() {
        assert_eq!(TempoSource::window_to_bpm(0), None);
        assert_eq!(TempoSource::window_to_bpm(240), None); // 500 BPM
        assert_eq!(TempoSource::window_to_bpm(4000), Some(30));
        assert_eq!(TempoSource::window_to_bpm(1000), Some(120));
        assert_eq!(TempoSource::window_to_bpm(7000), None); // ~17 BPM
    }
}
