//! The user's pose, and the [`PoseTracker`] that turns a noisy stream of raw
//! position and heading samples into a stream of meaningful [`Pose`] changes.
//!
//! Samples below the hysteresis thresholds are dropped without touching the
//! tracker's state, so a jittery GPS fix sitting still does not cause the
//! rest of the pipeline to recompute anything.

use crate::geo::{circular_diff_deg, normalize_deg, Coordinate, Degree};
use log::debug;
use serde::{Deserialize, Serialize};

/// Milliseconds on whatever monotonic clock the sensor collaborator uses.
pub type Millis = u64;

/// A position sample as delivered by the platform, before validation. Any
/// field may be missing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawPosition {
    /// Latitude in degrees
    pub latitude: Option<f64>,
    /// Longitude in degrees
    pub longitude: Option<f64>,
    /// Reported accuracy radius in meters
    pub accuracy: Option<f64>,
    /// When the sample was taken
    pub timestamp: Millis,
}

/// A compass heading sample as delivered by the platform, before validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawHeading {
    /// Degrees clockwise from north, not necessarily normalized
    pub degrees: Option<f64>,
    /// When the sample was taken
    pub timestamp: Millis,
}

/// A validated position fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    /// Where the user is
    pub coordinate: Coordinate,
    /// Accuracy radius in meters, if the platform reported one
    pub accuracy_m: Option<f64>,
    /// When the fix was taken
    pub sampled_at: Millis,
}

/// A validated heading, always on [0, 360).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heading {
    degrees_from_north: Degree,
    /// When the heading was taken
    pub sampled_at: Millis,
}

impl Heading {
    /// Builds a heading, wrapping `degrees` onto [0, 360).
    pub fn new(degrees: Degree, sampled_at: Millis) -> Self {
        Self {
            degrees_from_north: normalize_deg(degrees),
            sampled_at,
        }
    }

    /// Degrees clockwise from north, in [0, 360).
    pub fn degrees(&self) -> Degree {
        self.degrees_from_north
    }
}

/// Where the user is, and which way they face if we know.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    /// Last accepted position
    pub position: Position,
    /// Last accepted heading; absent when heading sensing is unavailable
    pub heading: Option<Heading>,
}

impl RawPosition {
    /// Validates the sample, returning `None` for malformed samples: missing
    /// coordinates, non-finite values or coordinates off the globe. A
    /// longitude of exactly 180 is folded onto -180.
    pub fn validate(&self) -> Option<Position> {
        let lat = self.latitude?;
        let mut lon = self.longitude?;
        if lon == 180.0 {
            lon = -180.0;
        }
        let coordinate = Coordinate::new(lat, lon);
        if !coordinate.is_valid() {
            return None;
        }

        Some(Position {
            coordinate,
            accuracy_m: self.accuracy.filter(|a| a.is_finite()),
            sampled_at: self.timestamp,
        })
    }
}

impl RawHeading {
    /// Validates the sample, returning `None` if the heading is missing or
    /// not finite.
    pub fn validate(&self) -> Option<Heading> {
        self.degrees
            .filter(|d| d.is_finite())
            .map(|d| Heading::new(d, self.timestamp))
    }
}

/// Hysteresis thresholds for the [`PoseTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerSettings {
    /// Minimum change in latitude or longitude, in degrees, for a new
    /// position to count. 0.0001 degrees is roughly 11 meters.
    pub position_threshold_deg: Degree,
    /// Minimum circular change in heading, in degrees.
    pub heading_threshold_deg: Degree,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            position_threshold_deg: 0.0001,
            heading_threshold_deg: 1.0,
        }
    }
}

/// Holds the last accepted position and heading, and decides whether each
/// new sample is a meaningful change.
#[derive(Debug, Clone, Default)]
pub struct PoseTracker {
    settings: TrackerSettings,
    position: Option<Position>,
    heading: Option<Heading>,
}

impl PoseTracker {
    /// Instantiates a tracker with no accepted samples.
    pub fn new(settings: TrackerSettings) -> Self {
        Self {
            settings,
            position: None,
            heading: None,
        }
    }

    /// Offers a position sample. Returns the new [`Pose`] if the sample was
    /// accepted, or `None` if it was malformed or below the threshold.
    pub fn ingest_position(&mut self, raw: &RawPosition) -> Option<Pose> {
        let Some(new) = raw.validate() else {
            debug!("dropping malformed position sample {:?}", raw);
            return None;
        };

        if let Some(prev) = &self.position {
            let threshold = self.settings.position_threshold_deg;
            let moved = (new.coordinate.lat - prev.coordinate.lat).abs() > threshold
                || (new.coordinate.lon - prev.coordinate.lon).abs() > threshold;
            if !moved {
                debug!("suppressing position {:?}, below threshold", new.coordinate);
                return None;
            }
        }

        debug!("accepted position {:?}", new.coordinate);
        self.position = Some(new);
        self.current()
    }

    /// Offers a heading sample. Returns the new [`Pose`] if the sample was
    /// accepted and a position is already known.
    ///
    /// A heading that arrives before any position is still remembered, but
    /// there is no pose to emit yet.
    pub fn ingest_heading(&mut self, raw: &RawHeading) -> Option<Pose> {
        let Some(new) = raw.validate() else {
            debug!("dropping malformed heading sample {:?}", raw);
            return None;
        };

        if let Some(prev) = &self.heading {
            let turned = circular_diff_deg(new.degrees(), prev.degrees());
            if turned <= self.settings.heading_threshold_deg {
                debug!("suppressing heading {:.1}, below threshold", new.degrees());
                return None;
            }
        }

        debug!("accepted heading {:.1}", new.degrees());
        self.heading = Some(new);
        self.current()
    }

    /// Forgets the heading, e.g. once heading sensing has become unavailable.
    /// Returns the resulting [`Pose`] if a heading was actually dropped.
    pub fn clear_heading(&mut self) -> Option<Pose> {
        self.heading.take()?;
        self.current()
    }

    /// The latest pose, if any position has been accepted.
    pub fn current(&self) -> Option<Pose> {
        self.position.map(|position| Pose {
            position,
            heading: self.heading,
        })
    }
}
