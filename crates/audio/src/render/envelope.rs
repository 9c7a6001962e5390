/// Amplitude envelopes applied to voices. Shapes are evaluated
/// analytically against the voice's own timeline, which makes a voice's
/// gain at any frame a pure function of its spec, with nothing to
/// retrigger or reset.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EnvelopeSpec {
    /// Linear 10 ms attack, flat body, exponential release over the final
    /// 100 ms. The general-purpose oscillator shape.
    Default,
    /// Sharper 2 ms attack and a short 30 ms release; tuned for auditory
    /// discrimination exercises where transient clarity matters.
    Clear,
    /// Classic attack/decay/sustain/release, used for chord buffers.
    Adsr {
        attack: f32,
        decay: f32,
        sustain: f32,
        release: f32,
    },
}

/// Floor for exponential release ramps; an exponential ramp to exactly
/// zero never terminates.
const RELEASE_FLOOR: f32 = 0.001;

impl EnvelopeSpec {
    /// The chord-buffer envelope.
    pub fn chord_adsr() -> Self {
        EnvelopeSpec::Adsr {
            attack: 0.005,
            decay: 0.1,
            sustain: 0.7,
            release: 0.3,
        }
    }

    /// Envelope level at `t` seconds into a voice lasting `duration`
    /// seconds. Returns a value in [0, 1].
    pub fn level_at(&self, t: f32, duration: f32) -> f32 {
        if t < 0.0 || t >= duration {
            return 0.0;
        }
        match *self {
            EnvelopeSpec::Default => attack_hold_exp_release(t, duration, 0.01, 0.1),
            EnvelopeSpec::Clear => attack_hold_exp_release(t, duration, 0.002, 0.03),
            EnvelopeSpec::Adsr {
                attack,
                decay,
                sustain,
                release,
            } => {
                let release_start = (duration - release).max(attack + decay);
                if t < attack {
                    t / attack.max(1e-6)
                } else if t < attack + decay {
                    1.0 - (1.0 - sustain) * ((t - attack) / decay.max(1e-6))
                } else if t < release_start {
                    sustain
                } else {
                    let span = (duration - release_start).max(1e-6);
                    sustain * (1.0 - (t - release_start) / span)
                }
            }
        }
    }
}

fn attack_hold_exp_release(t: f32, duration: f32, attack: f32, release: f32) -> f32 {
    // Degenerate short voices: compress attack/release to fit.
    let attack = attack.min(duration * 0.25);
    let release = release.min(duration * 0.5);
    let release_start = duration - release;
    if t < attack {
        t / attack.max(1e-6)
    } else if t < release_start {
        1.0
    } else {
        RELEASE_FLOOR.powf((t - release_start) / release.max(1e-6))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_envelope_rises_holds_and_releases() {
        let env = EnvelopeSpec::Default;
        assert_relative_eq!(env.level_at(0.0, 1.0), 0.0);
        assert_relative_eq!(env.level_at(0.005, 1.0), 0.5, epsilon = 1e-4);
        assert_relative_eq!(env.level_at(0.5, 1.0), 1.0);
        assert!(env.level_at(0.95, 1.0) < 1.0);
        assert!(env.level_at(0.999, 1.0) < 0.01);
    }

    #[test]
    fn clear_envelope_attacks_faster_than_default() {
        let t = 0.003;
        let clear = EnvelopeSpec::Clear.level_at(t, 1.0);
        let default = EnvelopeSpec::Default.level_at(t, 1.0);
        assert!(clear > default);
    }

    #[test]
    fn adsr_sustains_at_sustain_level() {
        let env = EnvelopeSpec::chord_adsr();
        assert_relative_eq!(env.level_at(0.5, 2.0), 0.7);
        assert_relative_eq!(env.level_at(2.0, 2.0), 0.0);
    }

    #[test]
    fn outside_the_voice_window_is_silent() {
        let env = EnvelopeSpec::Default;
        assert_relative_eq!(env.level_at(-0.1, 1.0), 0.0);
        assert_relative_eq!(env.level_at(1.1, 1.0), 0.0);
    }
}
