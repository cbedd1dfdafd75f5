//! Maps filtered buildings onto sound: taller buildings sound higher and
//! longer, and the usage tag picks the instrument. The output is a flat,
//! time-ordered list of trigger instructions; nothing here makes any noise.

use crate::filter::FilteredBuilding;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which instrument voice plays a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timbre {
    /// Plain tone, for anything we cannot classify
    Default,
    /// Short struck sound, for industrial buildings
    Percussive,
    /// Plain synthesizer, for offices and shops
    Synth,
    /// Frequency-modulated voice, for homes
    Fm,
}

impl Timbre {
    /// Classifies a usage tag. Matching is case-insensitive and looks for the
    /// marker anywhere in the tag; unknown or missing tags are [`Timbre::Default`].
    pub fn classify(usage: Option<&str>) -> Self {
        let Some(usage) = usage else {
            return Timbre::Default;
        };
        let usage = usage.to_lowercase();
        let has = |markers: &[&str]| markers.iter().any(|m| usage.contains(m));

        if has(&["industrial", "factory", "warehouse"]) {
            Timbre::Percussive
        } else if has(&["office", "commercial", "retail"]) {
            Timbre::Synth
        } else if has(&["residential", "house", "apartments"]) {
            Timbre::Fm
        } else {
            Timbre::Default
        }
    }

    /// Discrete timbres play a fixed short note instead of one scaled by
    /// height.
    pub fn is_discrete(&self) -> bool {
        matches!(self, Timbre::Percussive)
    }
}

impl fmt::Display for Timbre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Timbre::Default => "default",
            Timbre::Percussive => "percussive",
            Timbre::Synth => "synth",
            Timbre::Fm => "fm",
        };
        f.pad(name)
    }
}

/// One note to play, `offset_ms` after the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SonificationEvent {
    /// Which building this note stands for
    pub building_id: String,
    /// Frequency of the note
    pub pitch_hz: f64,
    /// How long the note lasts
    pub duration_sec: f64,
    /// Which voice plays it
    pub timbre: Timbre,
    /// When to fire it, relative to the start of the run
    pub offset_ms: u64,
}

/// The knobs of the height-to-sound mapping.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SonificationParams {
    /// Pitch of a zero-height building
    pub base_pitch_hz: f64,
    /// Hertz added per meter of height
    pub height_to_pitch_scale: f64,
    /// Duration of a zero-height building
    pub base_duration_sec: f64,
    /// Meters of height per extra second of duration
    pub duration_height_divisor: f64,
    /// Duration used for discrete timbres
    pub discrete_duration_sec: f64,
    /// Silence between consecutive buildings
    pub inter_event_gap_ms: u64,
    /// Play a major triad per building instead of a single tone
    pub chord: bool,
    /// Delay between the voices of a chord
    pub strum_offset_ms: u64,
}

impl Default for SonificationParams {
    fn default() -> Self {
        Self {
            base_pitch_hz: 100.0,
            height_to_pitch_scale: 2.0,
            base_duration_sec: 1.0,
            duration_height_divisor: 100.0,
            discrete_duration_sec: 0.25,
            inter_event_gap_ms: 100,
            chord: false,
            strum_offset_ms: 100,
        }
    }
}

/// Semitone steps of the major triad played in chord mode.
const TRIAD_SEMITONES: [f64; 3] = [0.0, 4.0, 7.0];

/// Longest note any building gets, however tall it is.
pub const MAX_NOTE_SEC: f64 = 60.0;

impl SonificationParams {
    /// Pitch for a building of `height_m` meters.
    pub fn pitch_hz(&self, height_m: f64) -> f64 {
        self.base_pitch_hz + height_m * self.height_to_pitch_scale
    }

    /// Duration for a building of `height_m` meters played by `timbre`,
    /// kept within `0..=MAX_NOTE_SEC`. A degenerate result (such as a zero
    /// divisor on a zero-height building) plays for zero seconds.
    pub fn duration_sec(&self, height_m: f64, timbre: Timbre) -> f64 {
        let raw = if timbre.is_discrete() {
            self.discrete_duration_sec
        } else {
            self.base_duration_sec + height_m / self.duration_height_divisor
        };
        if raw.is_nan() {
            0.0
        } else {
            raw.clamp(0.0, MAX_NOTE_SEC)
        }
    }

    /// Lays `filtered` out on a single timeline, in order. Buildings without
    /// a height are skipped. Each building starts once the previous one has
    /// finished (plus its strum spread in chord mode) and the gap has passed.
    pub fn events_for(&self, filtered: &[FilteredBuilding]) -> Vec<SonificationEvent> {
        let voices: &[f64] = if self.chord { &TRIAD_SEMITONES } else { &TRIAD_SEMITONES[..1] };
        let strum_spread_ms = self.strum_offset_ms.saturating_mul(voices.len() as u64 - 1);

        let mut cursor_ms: u64 = 0;
        let mut events = Vec::new();
        for item in filtered {
            let Some(height_m) = item.building.height_m else {
                continue;
            };

            let timbre = Timbre::classify(item.building.usage.as_deref());
            let pitch_hz = self.pitch_hz(height_m);
            let duration_sec = self.duration_sec(height_m, timbre);

            for (voice, semitones) in voices.iter().enumerate() {
                events.push(SonificationEvent {
                    building_id: item.building.id.clone(),
                    pitch_hz: pitch_hz * 2f64.powf(semitones / 12.0),
                    duration_sec,
                    timbre,
                    offset_ms: cursor_ms.saturating_add(self.strum_offset_ms.saturating_mul(voice as u64)),
                });
            }

            cursor_ms = cursor_ms
                .saturating_add(duration_ms(duration_sec))
                .saturating_add(strum_spread_ms)
                .saturating_add(self.inter_event_gap_ms);
        }

        events
    }
}

/// Whole milliseconds, rounded up so a note never runs past the next one.
fn duration_ms(duration_sec: f64) -> u64 {
    (duration_sec * 1000.0).ceil() as u64
}
