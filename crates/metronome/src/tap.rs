use crate::scheduler::{MAX_BPM, MIN_BPM};

/// Taps kept for averaging; older taps roll off.
const MAX_TAPS: usize = 8;

/// A pause longer than this starts a fresh measurement.
const RESET_AFTER_MS: f64 = 2_000.0;

/// Tap-tempo detector: averages the intervals of recent taps into a BPM.
/// Timestamps come from the caller so the detector stays deterministic.
#[derive(Debug, Default)]
pub struct TapTempo {
    taps: Vec<f64>,
}

impl TapTempo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tap at `now_ms` and returns the detected tempo once
    /// two or more taps are in the window. Tempi outside the playable
    /// bpm range yield `None`; nothing is committed from them.
    pub fn tap_at(&mut self, now_ms: f64) -> Option<f32> {
        if let Some(&last) = self.taps.last() {
            if now_ms - last > RESET_AFTER_MS {
                self.taps.clear();
            }
        }
        self.taps.push(now_ms);
        if self.taps.len() > MAX_TAPS {
            self.taps.remove(0);
        }
        if self.taps.len() < 2 {
            return None;
        }

        let span = self.taps.last().unwrap() - self.taps.first().unwrap();
        let mean_interval = span / (self.taps.len() - 1) as f64;
        if mean_interval <= 0.0 {
            return None;
        }
        let bpm = (60_000.0 / mean_interval) as f32;
        if (MIN_BPM..=MAX_BPM).contains(&bpm) {
            Some(bpm)
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.taps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn steady_taps_detect_the_tempo() {
        let mut tap = TapTempo::new();
        assert_eq!(tap.tap_at(0.0), None);
        assert_relative_eq!(tap.tap_at(500.0).unwrap(), 120.0);
        assert_relative_eq!(tap.tap_at(1_000.0).unwrap(), 120.0);
        assert_relative_eq!(tap.tap_at(1_500.0).unwrap(), 120.0);
    }

    #[test]
    fn a_long_pause_starts_over() {
        let mut tap = TapTempo::new();
        tap.tap_at(0.0);
        tap.tap_at(500.0);
        // 2.5 s of silence; the old taps must not pollute the new tempo.
        assert_eq!(tap.tap_at(3_000.0), None);
        assert_relative_eq!(tap.tap_at(3_600.0).unwrap(), 100.0);
    }

    #[test]
    fn only_recent_taps_count() {
        let mut tap = TapTempo::new();
        // Eight slow taps, then a burst of fast ones pushing them out.
        let mut t = 0.0;
        for _ in 0..8 {
            tap.tap_at(t);
            t += 1_000.0;
        }
        for _ in 0..8 {
            tap.tap_at(t);
            t += 250.0;
        }
        let bpm = tap.tap_at(t).unwrap();
        assert_relative_eq!(bpm, 240.0);
    }

    #[test]
    fn out_of_range_tempi_are_not_committed() {
        let mut tap = TapTempo::new();
        tap.tap_at(0.0);
        // 50 ms apart: 1200 bpm raw, far too fast to be a tempo.
        assert_eq!(tap.tap_at(50.0), None);

        let mut slow = TapTempo::new();
        slow.tap_at(0.0);
        // 1.9 s apart: ~31.6 bpm raw, below the playable floor.
        assert_eq!(slow.tap_at(1_900.0), None);
    }
}
