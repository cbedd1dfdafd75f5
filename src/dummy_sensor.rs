//! A fake sensor collaborator for running the pipeline without a device. A
//! background thread walks a position randomly around a starting point and
//! sweeps the heading, pushing samples into a [`SensorBuffer`] the same way a
//! platform bridge would.

use crate::geo::{normalize_deg, Coordinate};
use crate::pose::{Millis, RawHeading, RawPosition};
use crate::sensor::{Capability, CapabilityError, SensorBuffer, SensorEvent, SensorSource};
use log::{debug, warn};
use rand::prelude::*;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

/// Drives a background thread that emits simulated samples.
pub struct DummySensor {
    handle: Option<thread::JoinHandle<()>>,
    tx: mpsc::Sender<Signal>,
    buffer: SensorBuffer,
}

enum Signal {
    Noise(f64),
    TurnRate(f64),
    Stop,
}

/// Builds a [`DummySensor`]; every setting has a usable default.
#[derive(Debug, Clone)]
pub struct DummySensorBuilder {
    origin: Coordinate,
    noise_deg: f64,
    turn_rate_deg: f64,
    interval: Duration,
    with_heading: bool,
    seed: Option<u64>,
}

impl Default for DummySensorBuilder {
    fn default() -> Self {
        Self {
            origin: Coordinate::new(35.6895, 139.6917),
            noise_deg: 0.0002,
            turn_rate_deg: 15.0,
            interval: Duration::from_millis(500),
            with_heading: true,
            seed: None,
        }
    }
}

impl DummySensorBuilder {
    /// Where the walk starts.
    pub fn origin(mut self, origin: Coordinate) -> Self {
        self.origin = origin;
        self
    }

    /// Largest step, in degrees, the walk takes per sample on each axis.
    pub fn noise(mut self, noise_deg: f64) -> Self {
        self.noise_deg = noise_deg;
        self
    }

    /// How far the heading turns per sample.
    pub fn turn_rate(mut self, turn_rate_deg: f64) -> Self {
        self.turn_rate_deg = turn_rate_deg;
        self
    }

    /// Time between samples.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Pretend the device has no compass: the first thing the thread does is
    /// report heading as unavailable.
    pub fn without_heading(mut self) -> Self {
        self.with_heading = false;
        self
    }

    /// Makes the walk reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Spawns the sampling thread.
    pub fn build(self) -> DummySensor {
        let (tx, rx) = mpsc::channel::<Signal>();
        let buffer = SensorBuffer::new();
        let th_buffer = buffer.clone();

        let handle = thread::spawn(move || {
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let started = Instant::now();
            let mut walker = Walker::new(self.origin, self.noise_deg, self.turn_rate_deg);

            if !self.with_heading {
                th_buffer.on_error(CapabilityError {
                    capability: Capability::Heading,
                    reason: "simulated device has no compass".to_owned(),
                });
            }

            loop {
                match rx.try_recv() {
                    Ok(Signal::Noise(noise)) => walker.noise_deg = noise,
                    Ok(Signal::TurnRate(rate)) => walker.turn_rate_deg = rate,
                    Ok(Signal::Stop) | Err(mpsc::TryRecvError::Disconnected) => break,
                    Err(mpsc::TryRecvError::Empty) => {}
                }

                let now = started.elapsed().as_millis() as Millis;
                let (position, heading) = walker.step(&mut rng, now);
                th_buffer.on_position(position);
                if self.with_heading {
                    th_buffer.on_heading(heading);
                }
                thread::sleep(self.interval);
            }
            debug!("dummy sensor thread terminated");
        });

        DummySensor {
            handle: Some(handle),
            tx,
            buffer,
        }
    }
}

impl DummySensor {
    /// Starts configuring a new simulated sensor.
    pub fn builder() -> DummySensorBuilder {
        DummySensorBuilder::default()
    }

    /// Changes the walk's step size while running.
    pub fn set_noise(&self, noise_deg: f64) {
        self.send(Signal::Noise(noise_deg));
    }

    /// Changes how fast the heading sweeps while running.
    pub fn set_turn_rate(&self, turn_rate_deg: f64) {
        self.send(Signal::TurnRate(turn_rate_deg));
    }

    /// Stops the sampling thread and waits for it to exit.
    pub fn stop(&mut self) {
        self.send(Signal::Stop);
        // `join` consumes the handle, hence the `Option` dance
        if let Some(thread) = self.handle.take() {
            if thread.join().is_err() {
                warn!("dummy sensor thread panicked");
            }
        }
    }

    fn send(&self, signal: Signal) {
        // The thread only goes away after `stop`, so a failed send is harmless
        if self.tx.send(signal).is_err() {
            debug!("dummy sensor thread already stopped");
        }
    }
}

impl Drop for DummySensor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Iterator for DummySensor {
    type Item = SensorEvent;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.next()
    }
}

impl SensorSource for DummySensor {
    fn clear(&mut self) {
        self.buffer.clear();
    }
}

/// The random walk itself, kept apart from the thread so it can be tested.
struct Walker {
    at: Coordinate,
    heading: f64,
    noise_deg: f64,
    turn_rate_deg: f64,
}

impl Walker {
    fn new(origin: Coordinate, noise_deg: f64, turn_rate_deg: f64) -> Self {
        Self {
            at: origin,
            heading: 0.0,
            noise_deg,
            turn_rate_deg,
        }
    }

    fn step(&mut self, rng: &mut impl Rng, now: Millis) -> (RawPosition, RawHeading) {
        if self.noise_deg > 0.0 {
            self.at.lat = (self.at.lat + rng.gen_range(-self.noise_deg..self.noise_deg)).clamp(-90.0, 90.0);
            self.at.lon = wrap_lon(self.at.lon + rng.gen_range(-self.noise_deg..self.noise_deg));
        }
        self.heading = normalize_deg(self.heading + self.turn_rate_deg);

        (
            RawPosition {
                latitude: Some(self.at.lat),
                longitude: Some(self.at.lon),
                accuracy: Some(rng.gen_range(3.0..20.0)),
                timestamp: now,
            },
            RawHeading {
                degrees: Some(self.heading),
                timestamp: now,
            },
        )
    }
}

fn wrap_lon(lon: f64) -> f64 {
    (lon + 180.0).rem_euclid(360.0) - 180.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_stays_near_origin() {
        let origin = Coordinate::new(35.0, 139.0);
        let mut walker = Walker::new(origin, 0.001, 10.0);
        let mut rng = StdRng::seed_from_u64(3);

        for i in 0..100 {
            let (position, heading) = walker.step(&mut rng, i);
            let sample = position.validate().expect("walk produced a bad sample");
            assert!((sample.coordinate.lat - origin.lat).abs() <= 0.1 + 1e-9);
            assert!((sample.coordinate.lon - origin.lon).abs() <= 0.1 + 1e-9);
            assert!(heading.validate().is_some());
        }
    }

    #[test]
    fn heading_sweeps_by_turn_rate() {
        let mut walker = Walker::new(Coordinate::new(0.0, 0.0), 0.0, 90.0);
        let mut rng = StdRng::seed_from_u64(0);
        let headings: Vec<f64> = (0..5)
            .map(|i| walker.step(&mut rng, i).1.degrees.unwrap())
            .collect();
        assert_eq!(headings, vec![90.0, 180.0, 270.0, 0.0, 90.0]);
    }

    #[test]
    fn longitude_wraps() {
        assert_eq!(wrap_lon(181.0), -179.0);
        assert_eq!(wrap_lon(-181.0), 179.0);
        assert_eq!(wrap_lon(10.0), 10.0);
    }

    #[test]
    fn thread_produces_samples() {
        let mut sensor = DummySensor::builder()
            .interval(Duration::from_millis(5))
            .seed(1)
            .build();
        thread::sleep(Duration::from_millis(50));
        sensor.stop();

        let events: Vec<SensorEvent> = sensor.by_ref().collect();
        assert!(events.iter().any(|e| matches!(e, SensorEvent::Position(_))));
        assert!(events.iter().any(|e| matches!(e, SensorEvent::Heading(_))));
    }

    #[test]
    fn compassless_device_reports_unavailable_first() {
        let mut sensor = DummySensor::builder()
            .interval(Duration::from_millis(5))
            .without_heading()
            .build();
        thread::sleep(Duration::from_millis(20));
        sensor.stop();

        let first = sensor.next();
        assert!(matches!(first, Some(SensorEvent::Unavailable(_))));
        assert!(!sensor.any(|e| matches!(e, SensorEvent::Heading(_))));
    }
}
