/// Master-bus dynamics compressor with fixed program-material settings:
/// threshold −24 dB, knee 30 dB, ratio 12:1, attack 3 ms, release 250 ms.
#[derive(Clone, Debug)]
pub(crate) struct Compressor {
    threshold_db: f32,
    knee_db: f32,
    ratio: f32,
    attack_alpha: f32,
    release_alpha: f32,
    envelope: f32,
}

impl Compressor {
    pub fn new(sample_rate: u32) -> Self {
        let alpha = |seconds: f32| 1.0 - (-1.0 / (seconds * sample_rate as f32)).exp();
        Self {
            threshold_db: -24.0,
            knee_db: 30.0,
            ratio: 12.0,
            attack_alpha: alpha(0.003),
            release_alpha: alpha(0.25),
            envelope: 0.0,
        }
    }

    pub fn process(&mut self, sample: f32) -> f32 {
        let level = sample.abs();
        let alpha = if level > self.envelope {
            self.attack_alpha
        } else {
            self.release_alpha
        };
        self.envelope += (level - self.envelope) * alpha;

        let env_db = 20.0 * self.envelope.max(1e-6).log10();
        let overshoot = env_db - self.threshold_db;
        let half_knee = self.knee_db / 2.0;

        let reduction_db = if overshoot <= -half_knee {
            0.0
        } else if overshoot < half_knee {
            // Quadratic soft knee.
            let x = overshoot + half_knee;
            (x * x) / (2.0 * self.knee_db) * (1.0 - 1.0 / self.ratio)
        } else {
            overshoot * (1.0 - 1.0 / self.ratio)
        };

        sample * 10.0_f32.powf(-reduction_db / 20.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_signals_pass_unchanged() {
        let mut comp = Compressor::new(44_100);
        let mut out = 0.0;
        for _ in 0..1_000 {
            out = comp.process(0.01);
        }
        assert!((out - 0.01).abs() < 1e-4);
    }

    #[test]
    fn loud_signals_are_reduced() {
        let mut comp = Compressor::new(44_100);
        let mut out = 0.0;
        for _ in 0..10_000 {
            out = comp.process(1.0);
        }
        assert!(out < 0.5, "expected heavy reduction, got {out}");
        assert!(out > 0.0);
    }

    #[test]
    fn reduction_grows_with_level() {
        let gain_after = |level: f32| {
            let mut comp = Compressor::new(44_100);
            let mut out = 0.0;
            for _ in 0..10_000 {
                out = comp.process(level);
            }
            out / level
        };
        assert!(gain_after(1.0) < gain_after(0.3));
    }
}
