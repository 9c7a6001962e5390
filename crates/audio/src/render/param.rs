/// A gain value that never steps audibly. Targets are approached either
/// with a one-pole smoother (fixed time constant, the engine's analogue of
/// `setTargetAtTime`) or a linear ramp of explicit duration.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SmoothedParam {
    current: f32,
    mode: Mode,
}

#[derive(Clone, Copy, Debug)]
enum Mode {
    Idle,
    Smooth { target: f32, alpha: f32 },
    Linear { target: f32, step: f32, remaining: u64 },
}

/// Snap threshold for the one-pole smoother.
const EPSILON: f32 = 1e-5;

impl SmoothedParam {
    pub fn new(value: f32) -> Self {
        Self {
            current: value,
            mode: Mode::Idle,
        }
    }

    /// Immediate, unsmoothed assignment.
    pub fn set(&mut self, value: f32) {
        self.current = value;
        self.mode = Mode::Idle;
    }

    /// One-pole approach with the given time constant in seconds.
    pub fn set_target(&mut self, target: f32, time_constant: f32, sample_rate: u32) {
        let alpha = 1.0 - (-1.0 / (time_constant.max(1e-4) * sample_rate as f32)).exp();
        self.mode = Mode::Smooth { target, alpha };
    }

    /// Linear ramp from the current value, reaching `target` after
    /// `duration` seconds.
    pub fn linear_ramp_to(&mut self, target: f32, duration: f64, sample_rate: u32) {
        let remaining = (duration.max(0.0) * sample_rate as f64).round() as u64;
        if remaining == 0 {
            self.set(target);
            return;
        }
        let step = (target - self.current) / remaining as f32;
        self.mode = Mode::Linear {
            target,
            step,
            remaining,
        };
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    /// Advances one sample and returns the value to apply for it.
    pub fn next(&mut self) -> f32 {
        match self.mode {
            Mode::Idle => {}
            Mode::Smooth { target, alpha } => {
                self.current += (target - self.current) * alpha;
                if (target - self.current).abs() < EPSILON {
                    self.current = target;
                    self.mode = Mode::Idle;
                }
            }
            Mode::Linear {
                target,
                step,
                remaining,
            } => {
                self.current += step;
                let remaining = remaining - 1;
                if remaining == 0 {
                    self.current = target;
                    self.mode = Mode::Idle;
                } else {
                    self.mode = Mode::Linear {
                        target,
                        step,
                        remaining,
                    };
                }
            }
        }
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn linear_ramp_hits_target_exactly() {
        let mut param = SmoothedParam::new(1.0);
        param.linear_ramp_to(0.0, 0.01, 1_000); // 10 samples
        let mut last = 1.0;
        for _ in 0..10 {
            let v = param.next();
            assert!(v <= last);
            last = v;
        }
        assert_relative_eq!(param.value(), 0.0);
    }

    #[test]
    fn smooth_target_converges_within_a_few_time_constants() {
        let mut param = SmoothedParam::new(0.0);
        param.set_target(1.0, 0.01, 44_100);
        for _ in 0..(44_100 / 10) {
            param.next();
        }
        assert_relative_eq!(param.value(), 1.0, epsilon = 1e-3);
    }

    #[test]
    fn zero_duration_ramp_is_a_step() {
        let mut param = SmoothedParam::new(0.3);
        param.linear_ramp_to(0.9, 0.0, 44_100);
        assert_relative_eq!(param.value(), 0.9);
    }
}
