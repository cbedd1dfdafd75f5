//! Runtime configuration, read from a [RON](https://github.com/ron-rs/ron)
//! file. Every section and field is optional, so the smallest valid file is
//! `()`:
//!
//! ```text
//! (
//!     policy: (radius_km: 2.0, directional: true, cone_half_width_deg: 30.0),
//!     tracker: (position_threshold_deg: 0.0001, heading_threshold_deg: 1.0),
//!     sonification: (chord: true),
//! )
//! ```

use crate::error::ConfigError;
use crate::filter::FilterPolicy;
use crate::pose::TrackerSettings;
use crate::sonify::SonificationParams;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, str::FromStr};

/// Everything tunable about the pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Which buildings are relevant
    pub policy: FilterPolicy,
    /// Hysteresis for incoming samples
    pub tracker: TrackerSettings,
    /// How buildings turn into sound
    pub sonification: SonificationParams,
}

impl Config {
    /// Reads a config from the file at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        text.parse()
    }

    /// Renders the config back to pretty RON.
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }
}

impl FromStr for Config {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(ron::de::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_config_is_default() {
        let config: Config = "()".parse().unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.policy.radius_km, 8.0);
        assert_eq!(config.tracker.position_threshold_deg, 0.0001);
        assert_eq!(config.sonification.base_pitch_hz, 100.0);
        assert_eq!(config.sonification.inter_event_gap_ms, 100);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: Config = "(policy: (directional: true), sonification: (chord: true))"
            .parse()
            .unwrap();
        assert!(config.policy.directional);
        assert_eq!(config.policy.radius_km, 8.0);
        assert!(config.sonification.chord);
        assert_eq!(config.sonification.strum_offset_ms, 100);
        assert_eq!(config.tracker, TrackerSettings::default());
    }

    #[test]
    fn survives_a_trip_through_ron() {
        let mut config = Config::default();
        config.policy.cone_half_width_deg = 12.5;
        config.sonification.chord = true;
        let text = config.to_ron().unwrap();
        assert_eq!(text.parse::<Config>().unwrap(), config);
    }

    #[test]
    fn bad_ron_is_reported() {
        let err = "(policy: (radius_km: \"far\"))".parse::<Config>().unwrap_err();
        assert!(matches!(err, ConfigError::Ron(_)));
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "(policy: (radius_km: 1.5))").unwrap();
        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.policy.radius_km, 1.5);
    }
}
