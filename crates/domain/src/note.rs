use serde::{Deserialize, Serialize};

/// Reference pitch: A4 = 440 Hz, MIDI note 69.
pub const A4_FREQUENCY: f32 = 440.0;
pub const A4_MIDI_NUMBER: i32 = 69;

/// The twelve chromatic pitch classes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NoteName {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl NoteName {
    pub const ALL: [NoteName; 12] = [
        NoteName::C,
        NoteName::CSharp,
        NoteName::D,
        NoteName::DSharp,
        NoteName::E,
        NoteName::F,
        NoteName::FSharp,
        NoteName::G,
        NoteName::GSharp,
        NoteName::A,
        NoteName::ASharp,
        NoteName::B,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::CSharp => "C#",
            NoteName::D => "D",
            NoteName::DSharp => "D#",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::FSharp => "F#",
            NoteName::G => "G",
            NoteName::GSharp => "G#",
            NoteName::A => "A",
            NoteName::ASharp => "A#",
            NoteName::B => "B",
        }
    }

    /// Pitch class of a MIDI note number.
    pub fn from_midi(midi: i32) -> Self {
        Self::ALL[(midi.rem_euclid(12)) as usize]
    }
}

impl std::fmt::Display for NoteName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of mapping a frequency onto the chromatic scale.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct NotePitch {
    pub note: NoteName,
    pub octave: i32,
    /// Deviation from the nearest equal-tempered semitone, in cents.
    pub cents: i32,
}

/// Maps a frequency to the nearest note, octave and cents offset.
/// Semitone distance from A4 is `12 * log2(f / 440)`.
pub fn note_from_frequency(frequency: f32) -> NotePitch {
    let semitones_from_a4 = 12.0 * (frequency / A4_FREQUENCY).log2();
    let nearest_semitone = semitones_from_a4.round();
    let cents = ((semitones_from_a4 - nearest_semitone) * 100.0).round() as i32;

    let midi = A4_MIDI_NUMBER + nearest_semitone as i32;
    NotePitch {
        note: NoteName::from_midi(midi),
        octave: midi.div_euclid(12) - 1,
        cents,
    }
}

/// Frequency of an equal-tempered MIDI note.
pub fn frequency_of_midi(midi: i32) -> f32 {
    A4_FREQUENCY * 2.0_f32.powf((midi - A4_MIDI_NUMBER) as f32 / 12.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn a4_maps_to_a_octave_4() {
        let pitch = note_from_frequency(440.0);
        assert_eq!(pitch.note, NoteName::A);
        assert_eq!(pitch.octave, 4);
        assert_eq!(pitch.cents, 0);
    }

    #[test]
    fn low_e_string_maps_to_e2() {
        let pitch = note_from_frequency(82.41);
        assert_eq!(pitch.note, NoteName::E);
        assert_eq!(pitch.octave, 2);
        assert!(pitch.cents.abs() <= 1);
    }

    #[test]
    fn sharp_frequency_reports_positive_cents() {
        // Halfway between A4 and A#4 rounds up to A#4 with negative cents,
        // but a slightly sharp A4 stays on A with positive cents.
        let pitch = note_from_frequency(443.0);
        assert_eq!(pitch.note, NoteName::A);
        assert!(pitch.cents > 0);
    }

    #[test]
    fn midi_round_trip() {
        assert_relative_eq!(frequency_of_midi(69), 440.0);
        assert_relative_eq!(frequency_of_midi(57), 220.0, epsilon = 1e-3);
        assert_eq!(NoteName::from_midi(60), NoteName::C);
    }
}
