use serde::{Deserialize, Serialize};

/// The closed set of mixer channels. Every playable voice routes through
/// exactly one of these; there is no free-form channel naming, so a typo'd
/// channel is a compile error rather than a silent miss.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ChannelId {
    Chords,
    Scales,
    Metronome,
    Effects,
}

impl ChannelId {
    pub const ALL: [ChannelId; 4] = [
        ChannelId::Chords,
        ChannelId::Scales,
        ChannelId::Metronome,
        ChannelId::Effects,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelId::Chords => "chords",
            ChannelId::Scales => "scales",
            ChannelId::Metronome => "metronome",
            ChannelId::Effects => "effects",
        }
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
