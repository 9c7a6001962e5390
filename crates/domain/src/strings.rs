use serde::{Deserialize, Serialize};

use crate::note::NoteName;

/// The six strings of a guitar in standard tuning, low to high.
/// String numbers follow convention: 6 is the low E, 1 the high E.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum GuitarString {
    E2,
    A2,
    D3,
    G3,
    B3,
    E4,
}

impl GuitarString {
    pub const ALL: [GuitarString; 6] = [
        GuitarString::E2,
        GuitarString::A2,
        GuitarString::D3,
        GuitarString::G3,
        GuitarString::B3,
        GuitarString::E4,
    ];

    /// Target frequency in standard tuning.
    pub fn frequency(&self) -> f32 {
        match self {
            GuitarString::E2 => 82.41,
            GuitarString::A2 => 110.0,
            GuitarString::D3 => 146.83,
            GuitarString::G3 => 196.0,
            GuitarString::B3 => 246.94,
            GuitarString::E4 => 329.63,
        }
    }

    pub fn note(&self) -> NoteName {
        match self {
            GuitarString::E2 | GuitarString::E4 => NoteName::E,
            GuitarString::A2 => NoteName::A,
            GuitarString::D3 => NoteName::D,
            GuitarString::G3 => NoteName::G,
            GuitarString::B3 => NoteName::B,
        }
    }

    pub fn octave(&self) -> i32 {
        match self {
            GuitarString::E2 | GuitarString::A2 => 2,
            GuitarString::D3 | GuitarString::G3 => 3,
            GuitarString::B3 => 3,
            GuitarString::E4 => 4,
        }
    }

    /// Conventional string number, 6 (low E) through 1 (high E).
    pub fn number(&self) -> u8 {
        match self {
            GuitarString::E2 => 6,
            GuitarString::A2 => 5,
            GuitarString::D3 => 4,
            GuitarString::G3 => 3,
            GuitarString::B3 => 2,
            GuitarString::E4 => 1,
        }
    }
}

/// A detected frequency matched against its nearest open string.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct StringMatch {
    pub string: GuitarString,
    pub target_frequency: f32,
    /// Deviation from the string's target, in cents.
    pub cents: i32,
}

/// Distance beyond which a frequency is not considered "aimed at" any string.
const MAX_STRING_DISTANCE_HZ: f32 = 50.0;

/// Picks the standard-tuning string closest to `frequency`. Returns `None`
/// when the frequency is more than 50 Hz from every string.
pub fn nearest_string(frequency: f32) -> Option<StringMatch> {
    let mut best = GuitarString::E2;
    let mut best_distance = f32::INFINITY;

    for string in GuitarString::ALL {
        let distance = (frequency - string.frequency()).abs();
        if distance < best_distance {
            best_distance = distance;
            best = string;
        }
    }

    if best_distance > MAX_STRING_DISTANCE_HZ {
        return None;
    }

    let cents = (1200.0 * (frequency / best.frequency()).log2()).round() as i32;
    Some(StringMatch {
        string: best,
        target_frequency: best.frequency(),
        cents,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_string_frequencies_match_with_zero_cents() {
        for string in GuitarString::ALL {
            let matched = nearest_string(string.frequency()).unwrap();
            assert_eq!(matched.string, string);
            assert_eq!(matched.cents, 0);
        }
    }

    #[test]
    fn slightly_flat_b_string_reports_negative_cents() {
        let matched = nearest_string(244.0).unwrap();
        assert_eq!(matched.string, GuitarString::B3);
        assert!(matched.cents < 0);
    }

    #[test]
    fn far_frequencies_match_nothing() {
        assert!(nearest_string(1000.0).is_none());
        assert!(nearest_string(20.0).is_none());
    }

    #[test]
    fn string_numbers_run_high_to_low() {
        assert_eq!(GuitarString::E2.number(), 6);
        assert_eq!(GuitarString::E4.number(), 1);
    }
}
