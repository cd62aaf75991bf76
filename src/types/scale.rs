//! Scale tables and pitch quantization.
//!
//! A `Scale` is an immutable set of allowed semitone offsets within one
//! octave. Tracks quantize their step offsets against a scale so that every
//! emitted note lands on an allowed pitch class.

/// Semitone offset tables, one octave each, relative to the root.
const CHROMATIC: &[u8] = &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];
const MAJOR: &[u8] = &[0, 2, 4, 5, 7, 9, 11];
const MINOR: &[u8] = &[0, 2, 3, 5, 7, 8, 10];
const HARMONIC_MINOR: &[u8] = &[0, 2, 3, 5, 7, 8, 11];
const MAJOR_PENTATONIC: &[u8] = &[0, 2, 4, 7, 9];
const MINOR_PENTATONIC: &[u8] = &[0, 3, 5, 7, 10];
const DORIAN: &[u8] = &[0, 2, 3, 5, 7, 9, 10];
const PHRYGIAN: &[u8] = &[0, 1, 3, 5, 7, 8, 10];
const LYDIAN: &[u8] = &[0, 2, 4, 6, 7, 9, 11];
const MIXOLYDIAN: &[u8] = &[0, 2, 4, 5, 7, 9, 10];

/// Scale selector shared read-only across all tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scale {
    Chromatic,
    Major,
    Minor,
    HarmonicMinor,
    MajorPentatonic,
    MinorPentatonic,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
}

impl Scale {
    /// All scales in menu order. Ordinals from a parameter editor index
    /// into this table.
    pub const ALL: [Scale; 10] = [
        Scale::Chromatic,
        Scale::Major,
        Scale::Minor,
        Scale::HarmonicMinor,
        Scale::MajorPentatonic,
        Scale::MinorPentatonic,
        Scale::Dorian,
        Scale::Phrygian,
        Scale::Lydian,
        Scale::Mixolydian,
    ];

    /// Look up a scale by menu ordinal. Out-of-range ordinals clamp to the
    /// last entry rather than wrapping.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    /// Menu ordinal of this scale.
    pub fn index(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            Scale::Chromatic => "Chromatic",
            Scale::Major => "Major",
            Scale::Minor => "Minor",
            Scale::HarmonicMinor => "Harmonic Minor",
            Scale::MajorPentatonic => "Major Pentatonic",
            Scale::MinorPentatonic => "Minor Pentatonic",
            Scale::Dorian => "Dorian",
            Scale::Phrygian => "Phrygian",
            Scale::Lydian => "Lydian",
            Scale::Mixolydian => "Mixolydian",
        }
    }

    /// Allowed semitone offsets within one octave.
    pub fn offsets(&self) -> &'static [u8] {
        match self {
            Scale::Chromatic => CHROMATIC,
            Scale::Major => MAJOR,
            Scale::Minor => MINOR,
            Scale::HarmonicMinor => HARMONIC_MINOR,
            Scale::MajorPentatonic => MAJOR_PENTATONIC,
            Scale::MinorPentatonic => MINOR_PENTATONIC,
            Scale::Dorian => DORIAN,
            Scale::Phrygian => PHRYGIAN,
            Scale::Lydian => LYDIAN,
            Scale::Mixolydian => MIXOLYDIAN,
        }
    }

    /// Whether a pitch class (0-11, relative to the root) is in the scale.
    pub fn contains(&self, pitch_class: u8) -> bool {
        self.offsets().contains(&pitch_class)
    }
}

impl Default for Scale {
    fn default() -> Self {
        Scale::Chromatic
    }
}

/// Quantize a raw semitone offset from `root` onto the nearest allowed
/// pitch class of `scale`, preserving octave register, and return the
/// resulting MIDI note number clamped to 0-127.
///
/// Ties between an allowed pitch class below and above snap upward, so in
/// C major an offset of 1 (C#) lands on D, not back on C.
pub fn quantize(raw_offset: i16, scale: Scale, root: u8) -> u8 {
    let pitch_class = raw_offset.rem_euclid(12);
    let mut correction = 0i16;
    // Every scale contains offset 0, so a match is found within 6 semitones.
    for distance in 0..=6i16 {
        if scale.contains((pitch_class + distance).rem_euclid(12) as u8) {
            correction = distance;
            break;
        }
        if scale.contains((pitch_class - distance).rem_euclid(12) as u8) {
            correction = -distance;
            break;
        }
    }
    (root as i16 + raw_offset + correction).clamp(0, 127) as u8
}
