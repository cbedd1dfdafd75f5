//! The narrow interface between platform sensor acquisition and the
//! deterministic core.
//!
//! Whatever produces samples (a browser bridge, a recorded trace, the
//! [`DummySensor`](crate::dummy_sensor::DummySensor)) pushes them into a
//! [`SensorBuffer`] through `on_position`, `on_heading` and `on_error`. The
//! pipeline drains them in arrival order by iterating a [`SensorSource`].

use crate::pose::{RawHeading, RawPosition};
use log::warn;
use std::{
    collections::VecDeque,
    fmt,
    sync::{Arc, Mutex},
};

/// The two things we can sense about the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Latitude and longitude
    Position,
    /// Compass heading
    Heading,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::Position => write!(f, "position"),
            Capability::Heading => write!(f, "heading"),
        }
    }
}

/// Reported by the sensor collaborator when a capability is unsupported or
/// permission was denied. This is a terminal state for that capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityError {
    /// Which capability went away
    pub capability: Capability,
    /// Whatever the platform told us
    pub reason: String,
}

impl fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} unavailable: {}", self.capability, self.reason)
    }
}

impl std::error::Error for CapabilityError {}

/// One thing that happened on the sensor side.
#[derive(Debug, Clone, PartialEq)]
pub enum SensorEvent {
    /// A position sample arrived
    Position(RawPosition),
    /// A heading sample arrived
    Heading(RawHeading),
    /// A capability became permanently unavailable
    Unavailable(CapabilityError),
}

/// A clearable iterator of [`SensorEvent`]s in arrival order. Iteration
/// never blocks: `None` means nothing is pending right now, not that the
/// stream has ended.
pub trait SensorSource: Iterator<Item = SensorEvent> {
    /// Discards everything pending.
    fn clear(&mut self);
}

/// A thread-safe queue that sensor callbacks push into and the pipeline
/// drains. Clones share the same queue.
#[derive(Debug, Clone, Default)]
pub struct SensorBuffer {
    events: Arc<Mutex<VecDeque<SensorEvent>>>,
}

impl SensorBuffer {
    /// Instantiates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Position callback.
    pub fn on_position(&self, sample: RawPosition) {
        self.push(SensorEvent::Position(sample));
    }

    /// Heading callback.
    pub fn on_heading(&self, sample: RawHeading) {
        self.push(SensorEvent::Heading(sample));
    }

    /// Error callback.
    pub fn on_error(&self, error: CapabilityError) {
        warn!("sensor reported {}", error);
        self.push(SensorEvent::Unavailable(error));
    }

    /// Number of events waiting to be drained.
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    fn push(&self, event: SensorEvent) {
        self.lock().push_back(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<SensorEvent>> {
        // A poisoned queue still holds perfectly good samples
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Iterator for SensorBuffer {
    type Item = SensorEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.lock().pop_front()
    }
}

impl SensorSource for SensorBuffer {
    fn clear(&mut self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_drain_in_arrival_order() {
        let buffer = SensorBuffer::new();
        let producer = buffer.clone();

        producer.on_heading(RawHeading {
            degrees: Some(10.0),
            timestamp: 1,
        });
        producer.on_position(RawPosition {
            latitude: Some(1.0),
            longitude: Some(2.0),
            accuracy: None,
            timestamp: 2,
        });
        producer.on_error(CapabilityError {
            capability: Capability::Heading,
            reason: "denied".to_owned(),
        });
        assert_eq!(buffer.pending(), 3);

        let drained: Vec<SensorEvent> = buffer.clone().collect();
        assert!(matches!(drained[0], SensorEvent::Heading(_)));
        assert!(matches!(drained[1], SensorEvent::Position(_)));
        assert!(matches!(drained[2], SensorEvent::Unavailable(_)));
        assert_eq!(buffer.pending(), 0);
    }

    #[test]
    fn clear_discards_pending() {
        let mut buffer = SensorBuffer::new();
        buffer.on_heading(RawHeading {
            degrees: Some(1.0),
            timestamp: 0,
        });
        buffer.clear();
        assert!(buffer.next().is_none());
    }

    #[test]
    fn capability_errors_display() {
        let error = CapabilityError {
            capability: Capability::Position,
            reason: "permission denied".to_owned(),
        };
        assert_eq!(error.to_string(), "position unavailable: permission denied");
    }
}
