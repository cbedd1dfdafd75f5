//! geosonic follows a user around a city and lets them hear the buildings
//! nearby. Position and compass samples arrive from the device, buildings
//! within range (and optionally within a cone in front of the user) are
//! picked out of a GeoJSON dataset, and on request the selection is turned
//! into a timed sequence of notes: taller buildings sound higher and longer,
//! and what a building is used for picks the instrument.
//!
//! The pieces, leaves first:
//!
//! - [`pose`]: the [`PoseTracker`](pose::PoseTracker) filters jittery sensor
//!   samples down to meaningful pose changes.
//! - [`filter`]: measures distance and bearing to every building and keeps
//!   the ones the [`FilterPolicy`](filter::FilterPolicy) selects.
//! - [`sonify`] and [`scheduler`]: map the selection onto notes, and play
//!   them with at most one run live at a time.
//! - [`coordinator`]: owns all of the above and sequences them.
//!
//! Rendering, real sensor acquisition and sound synthesis happen elsewhere;
//! this crate talks to them through [`sensor::SensorBuffer`] and
//! [`scheduler::AudioSink`].

#![warn(missing_docs)]
pub mod args;
pub mod building;
pub mod config;
pub mod coordinator;
pub mod dummy_sensor;
pub mod error;
pub mod filter;
pub mod geo;
pub mod pose;
pub mod scheduler;
pub mod sensor;
pub mod sonify;
pub mod trace_decoder;
