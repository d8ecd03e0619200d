//! Speech output settings that the user can change at runtime: the prebuilt
//! synthesis [`Voice`] and the validated [`PlaybackRate`] multiplier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::ConfigError;

// ---------------------------------------------------------------------------
// Voice
// ---------------------------------------------------------------------------

/// Prebuilt voices offered by the speech-synthesis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Voice {
    #[default]
    Kore,
    Puck,
    Charon,
    Fenrir,
    Aoede,
}

impl Voice {
    /// Every selectable voice, in menu order.
    pub const ALL: [Voice; 5] = [
        Voice::Kore,
        Voice::Puck,
        Voice::Charon,
        Voice::Fenrir,
        Voice::Aoede,
    ];

    /// Name sent to the synthesis API as `prebuiltVoiceConfig.voiceName`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Voice::Kore => "Kore",
            Voice::Puck => "Puck",
            Voice::Charon => "Charon",
            Voice::Fenrir => "Fenrir",
            Voice::Aoede => "Aoede",
        }
    }
}

impl fmt::Display for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Voice {
    type Err = ConfigError;

    /// Case-insensitive lookup by voice name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Voice::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| ConfigError::UnknownVoice(wanted.to_string()))
    }
}

// ---------------------------------------------------------------------------
// PlaybackRate
// ---------------------------------------------------------------------------

/// Linear playback speed multiplier in `[0.5, 2.0]`, 0.1 granularity.
///
/// Stored as tenths so two rates built from `1.2` and `1.20000001` compare
/// equal.  Construction rejects out-of-range values; accepted values are
/// snapped to the nearest 0.1.
///
/// ```
/// use gemini_chat::config::PlaybackRate;
///
/// assert!(PlaybackRate::new(0.5).is_ok());
/// assert!(PlaybackRate::new(2.0).is_ok());
/// assert!(PlaybackRate::new(0.3).is_err());
/// assert!(PlaybackRate::new(2.5).is_err());
/// assert_eq!(PlaybackRate::new(1.23).unwrap().as_f32(), 1.2);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct PlaybackRate {
    tenths: u8,
}

impl PlaybackRate {
    pub const MIN: f32 = 0.5;
    pub const MAX: f32 = 2.0;

    /// Normal speed.
    pub const NORMAL: PlaybackRate = PlaybackRate { tenths: 10 };

    // Float slop allowed at the range edges (e.g. 0.1 * 5 arithmetic).
    const EDGE_TOLERANCE: f32 = 1e-4;

    /// Validate and snap `rate`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::PlaybackRateOutOfRange`] when `rate` is not finite or
    /// lies outside `[0.5, 2.0]`.
    pub fn new(rate: f32) -> Result<Self, ConfigError> {
        if !rate.is_finite()
            || rate < Self::MIN - Self::EDGE_TOLERANCE
            || rate > Self::MAX + Self::EDGE_TOLERANCE
        {
            return Err(ConfigError::PlaybackRateOutOfRange(rate));
        }
        let tenths = (rate * 10.0).round() as u8;
        Ok(Self { tenths })
    }

    pub fn as_f32(&self) -> f32 {
        f32::from(self.tenths) / 10.0
    }
}

impl Default for PlaybackRate {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl TryFrom<f32> for PlaybackRate {
    type Error = ConfigError;

    fn try_from(rate: f32) -> Result<Self, Self::Error> {
        Self::new(rate)
    }
}

impl From<PlaybackRate> for f32 {
    fn from(rate: PlaybackRate) -> Self {
        rate.as_f32()
    }
}

impl fmt::Display for PlaybackRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}x", self.as_f32())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_edges_are_accepted() {
        assert_eq!(PlaybackRate::new(0.5).unwrap().as_f32(), 0.5);
        assert_eq!(PlaybackRate::new(2.0).unwrap().as_f32(), 2.0);
    }

    #[test]
    fn out_of_range_is_rejected() {
        assert!(matches!(
            PlaybackRate::new(0.3),
            Err(ConfigError::PlaybackRateOutOfRange(_))
        ));
        assert!(matches!(
            PlaybackRate::new(2.5),
            Err(ConfigError::PlaybackRateOutOfRange(_))
        ));
        assert!(PlaybackRate::new(f32::NAN).is_err());
        assert!(PlaybackRate::new(f32::INFINITY).is_err());
    }

    #[test]
    fn accepted_values_snap_to_tenths() {
        assert_eq!(PlaybackRate::new(1.26).unwrap().as_f32(), 1.3);
        assert_eq!(PlaybackRate::new(0.1 * 5.0).unwrap(), PlaybackRate::new(0.5).unwrap());
        assert_eq!(PlaybackRate::new(1.0).unwrap(), PlaybackRate::NORMAL);
    }

    #[test]
    fn display_shows_one_decimal() {
        assert_eq!(PlaybackRate::new(1.5).unwrap().to_string(), "1.5x");
        assert_eq!(PlaybackRate::default().to_string(), "1.0x");
    }

    #[test]
    fn voice_parses_case_insensitively() {
        assert_eq!("puck".parse::<Voice>().unwrap(), Voice::Puck);
        assert_eq!(" AOEDE ".parse::<Voice>().unwrap(), Voice::Aoede);
        assert!(matches!(
            "Zephyr".parse::<Voice>(),
            Err(ConfigError::UnknownVoice(name)) if name == "Zephyr"
        ));
    }

    #[test]
    fn there_are_five_voices_with_distinct_names() {
        let mut names: Vec<_> = Voice::ALL.iter().map(Voice::as_str).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), 5);
        assert_eq!(Voice::default(), Voice::Kore);
    }
}
