//! Wires the pipeline together. The [`PipelineCoordinator`] owns all of the
//! mutable state: the tracker, the current filtered set, the scheduler and
//! the timer driver. Each component call gets what it needs passed in.
//!
//! Every accepted pose refreshes the filtered set right away. Sonification
//! only happens on an explicit [`trigger`](PipelineCoordinator::trigger),
//! which reads the filtered set without changing it.

use crate::building::BuildingSet;
use crate::config::Config;
use crate::error::{DatasetError, PipelineError};
use crate::filter::{self, FilterPolicy, FilteredBuilding};
use crate::pose::{Millis, Pose, PoseTracker, RawHeading, RawPosition};
use crate::scheduler::{AudioSink, ScheduledRun, SonificationScheduler, TimerDriver};
use crate::sensor::{Capability, CapabilityError, SensorEvent, SensorSource};
use log::{debug, info, warn};

/// What we know about one sensing capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityState {
    /// Nothing heard yet
    Pending,
    /// Samples are arriving
    Active,
    /// The platform said no; this never changes back
    Unavailable(String),
}

#[derive(Debug)]
enum DatasetState {
    Loaded(BuildingSet),
    Unavailable(String),
}

/// Owns the pipeline state and sequences tracker, filter and scheduler.
#[derive(Debug)]
pub struct PipelineCoordinator {
    policy: FilterPolicy,
    tracker: PoseTracker,
    dataset: DatasetState,
    filtered: Vec<FilteredBuilding>,
    scheduler: SonificationScheduler,
    driver: TimerDriver,
    position: CapabilityState,
    heading: CapabilityState,
}

impl PipelineCoordinator {
    /// Builds a coordinator from `config` and the outcome of loading the
    /// dataset. A failed load is kept as state rather than refused, so the
    /// pose side keeps running and the failure can be shown to the user.
    pub fn new(config: Config, dataset: Result<BuildingSet, DatasetError>) -> Self {
        let dataset = match dataset {
            Ok(buildings) => {
                info!("pipeline has {} buildings", buildings.len());
                DatasetState::Loaded(buildings)
            }
            Err(error) => {
                warn!("building dataset unavailable: {}", error);
                DatasetState::Unavailable(error.to_string())
            }
        };

        Self {
            policy: config.policy,
            tracker: PoseTracker::new(config.tracker),
            dataset,
            filtered: Vec::new(),
            scheduler: SonificationScheduler::new(config.sonification),
            driver: TimerDriver::new(),
            position: CapabilityState::Pending,
            heading: CapabilityState::Pending,
        }
    }

    /// Routes one sensor event. Returns true if the filtered set was
    /// recomputed.
    pub fn handle(&mut self, event: SensorEvent) -> bool {
        match event {
            SensorEvent::Position(raw) => self.on_position(&raw),
            SensorEvent::Heading(raw) => self.on_heading(&raw),
            SensorEvent::Unavailable(error) => self.on_unavailable(error),
        }
    }

    /// Handles everything `source` has pending, in arrival order. Returns
    /// how many times the filtered set was recomputed.
    pub fn drain(&mut self, source: &mut impl SensorSource) -> usize {
        source.by_ref().map(|event| self.handle(event)).filter(|&refreshed| refreshed).count()
    }

    /// Feeds a position sample to the tracker.
    pub fn on_position(&mut self, raw: &RawPosition) -> bool {
        if !Self::mark_active(&mut self.position, Capability::Position) {
            return false;
        }
        match self.tracker.ingest_position(raw) {
            Some(pose) => self.refilter(&pose),
            None => false,
        }
    }

    /// Feeds a heading sample to the tracker.
    pub fn on_heading(&mut self, raw: &RawHeading) -> bool {
        if !Self::mark_active(&mut self.heading, Capability::Heading) {
            return false;
        }
        match self.tracker.ingest_heading(raw) {
            Some(pose) => self.refilter(&pose),
            None => false,
        }
    }

    /// Records that a capability is gone for good. Losing heading drops the
    /// stale heading from the pose, which can change a directional result.
    pub fn on_unavailable(&mut self, error: CapabilityError) -> bool {
        warn!("{}; continuing without it", error);
        match error.capability {
            Capability::Position => {
                self.position = CapabilityState::Unavailable(error.reason);
                false
            }
            Capability::Heading => {
                self.heading = CapabilityState::Unavailable(error.reason);
                match self.tracker.clear_heading() {
                    Some(pose) => self.refilter(&pose),
                    None => false,
                }
            }
        }
    }

    /// Schedules the current filtered set and loads it on the timer driver
    /// as starting at `now`, superseding any run still playing.
    pub fn trigger(&mut self, now: Millis) -> Result<ScheduledRun, PipelineError> {
        if let DatasetState::Unavailable(reason) = &self.dataset {
            return Err(PipelineError::DatasetUnavailable(reason.clone()));
        }

        let run = self.scheduler.schedule(&self.filtered);
        info!(
            "triggered run {} with {} events at {} ms",
            run.id(),
            run.events().len(),
            now
        );
        self.driver.start(run.clone(), now);
        Ok(run)
    }

    /// Fires whatever is due at `now` into `sink`.
    pub fn tick(&mut self, now: Millis, sink: &mut impl AudioSink) -> usize {
        self.driver.tick(now, sink)
    }

    /// When the next event is due, if a run is playing.
    pub fn next_due(&self) -> Option<Millis> {
        self.driver.next_due()
    }

    /// Stops the playing run.
    pub fn silence(&mut self) {
        self.scheduler.cancel_live();
        self.driver.stop();
    }

    /// Swaps the filter policy and refilters against the current pose.
    pub fn set_policy(&mut self, policy: FilterPolicy) {
        self.policy = policy;
        if let Some(pose) = self.tracker.current() {
            self.refilter(&pose);
        }
    }

    /// The active filter policy.
    pub fn policy(&self) -> &FilterPolicy {
        &self.policy
    }

    /// The latest accepted pose.
    pub fn pose(&self) -> Option<Pose> {
        self.tracker.current()
    }

    /// The buildings relevant to the latest pose, in dataset order.
    pub fn filtered(&self) -> &[FilteredBuilding] {
        &self.filtered
    }

    /// State of a sensing capability.
    pub fn capability(&self, capability: Capability) -> &CapabilityState {
        match capability {
            Capability::Position => &self.position,
            Capability::Heading => &self.heading,
        }
    }

    /// Why the dataset failed to load, if it did.
    pub fn dataset_error(&self) -> Option<&str> {
        match &self.dataset {
            DatasetState::Loaded(_) => None,
            DatasetState::Unavailable(reason) => Some(reason),
        }
    }

    fn refilter(&mut self, pose: &Pose) -> bool {
        let DatasetState::Loaded(buildings) = &self.dataset else {
            return false;
        };
        self.filtered = filter::apply(pose, buildings, &self.policy);
        debug!(
            "pose {:.5},{:.5} selects {} buildings",
            pose.position.coordinate.lat,
            pose.position.coordinate.lon,
            self.filtered.len()
        );
        true
    }

    /// Returns false if samples for `capability` should be ignored.
    fn mark_active(state: &mut CapabilityState, capability: Capability) -> bool {
        match state {
            CapabilityState::Unavailable(_) => {
                debug!("ignoring {} sample after it was reported unavailable", capability);
                false
            }
            CapabilityState::Pending => {
                *state = CapabilityState::Active;
                true
            }
            CapabilityState::Active => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::building::Building;
    use crate::geo::Coordinate;
    use crate::sensor::SensorBuffer;
    use crate::sonify::{SonificationEvent, Timbre};

    fn position(lat: f64, lon: f64, timestamp: Millis) -> RawPosition {
        RawPosition {
            latitude: Some(lat),
            longitude: Some(lon),
            accuracy: Some(4.0),
            timestamp,
        }
    }

    fn heading(degrees: f64, timestamp: Millis) -> RawHeading {
        RawHeading {
            degrees: Some(degrees),
            timestamp,
        }
    }

    fn building(id: &str, lat: f64, lon: f64, height_m: Option<f64>, usage: Option<&str>) -> Building {
        Building {
            id: id.to_owned(),
            footprint: vec![Coordinate::new(lat, lon)],
            height_m,
            usage: usage.map(str::to_owned),
            name: None,
        }
    }

    fn tokyo_office() -> BuildingSet {
        BuildingSet::new(vec![building("tocho", 35.6895, 139.6917, Some(50.0), Some("office"))])
    }

    #[test]
    fn end_to_end_single_office() {
        let mut pipeline = PipelineCoordinator::new(Config::default(), Ok(tokyo_office()));

        assert!(pipeline.on_position(&position(35.6895, 139.6917, 0)));
        assert_eq!(pipeline.filtered().len(), 1);
        assert!(pipeline.filtered()[0].distance_km.abs() < 1e-9);

        let run = pipeline.trigger(100).unwrap();
        assert_eq!(run.events().len(), 1);
        let event = &run.events()[0];
        assert_eq!(event.pitch_hz, 200.0);
        assert_eq!(event.timbre, Timbre::Synth);
        assert_eq!(event.offset_ms, 0);

        let mut sink: Vec<(u64, SonificationEvent)> = Vec::new();
        assert_eq!(pipeline.tick(100, &mut sink), 1);
        assert_eq!(sink[0].1.building_id, "tocho");
        // Triggering does not touch the filtered set
        assert_eq!(pipeline.filtered().len(), 1);
    }

    #[test]
    fn heading_updates_refilter_directional_policy() {
        let set = BuildingSet::new(vec![
            building("north", 35.009, 139.0, Some(10.0), None),
            building("south", 34.991, 139.0, Some(20.0), None),
        ]);
        let config = Config {
            policy: FilterPolicy {
                radius_km: 5.0,
                directional: true,
                cone_half_width_deg: 45.0,
            },
            ..Config::default()
        };
        let mut pipeline = PipelineCoordinator::new(config, Ok(set));

        // No heading yet, so the cone is ignored
        pipeline.on_position(&position(35.0, 139.0, 0));
        assert_eq!(pipeline.filtered().len(), 2);

        assert!(pipeline.on_heading(&heading(180.0, 1)));
        assert_eq!(pipeline.filtered()[0].building.id, "south");
        assert_eq!(pipeline.filtered().len(), 1);

        // Below the heading threshold, nothing changes
        assert!(!pipeline.on_heading(&heading(180.5, 2)));

        // Compass gone: back to radius only
        assert!(pipeline.on_unavailable(CapabilityError {
            capability: Capability::Heading,
            reason: "denied".to_owned(),
        }));
        assert_eq!(pipeline.filtered().len(), 2);
        assert_eq!(
            pipeline.capability(Capability::Heading),
            &CapabilityState::Unavailable("denied".to_owned())
        );
        assert!(!pipeline.on_heading(&heading(0.0, 3)));
        assert!(pipeline.pose().unwrap().heading.is_none());
    }

    #[test]
    fn dataset_failure_is_reported_not_fatal() {
        let error = BuildingSet::from_geojson("{").unwrap_err();
        let mut pipeline = PipelineCoordinator::new(Config::default(), Err(error));

        assert!(pipeline.dataset_error().unwrap().starts_with("json error"));
        assert!(!pipeline.on_position(&position(35.0, 139.0, 0)));
        assert!(pipeline.pose().is_some());
        assert!(matches!(pipeline.trigger(0), Err(PipelineError::DatasetUnavailable(_))));
    }

    #[test]
    fn retrigger_silences_the_previous_run() {
        let set = BuildingSet::new(vec![
            building("a", 35.0, 139.0, Some(10.0), None),
            building("b", 35.001, 139.0, Some(20.0), None),
            building("c", 35.002, 139.0, Some(30.0), None),
        ]);
        let mut pipeline = PipelineCoordinator::new(Config::default(), Ok(set));
        pipeline.on_position(&position(35.0, 139.0, 0));

        let mut sink: Vec<(u64, SonificationEvent)> = Vec::new();
        let first = pipeline.trigger(0).unwrap();
        assert_eq!(pipeline.tick(0, &mut sink), 1);

        let second = pipeline.trigger(500).unwrap();
        assert!(first.is_cancelled());
        pipeline.tick(60_000, &mut sink);

        let from_first = sink.iter().filter(|(run, _)| *run == first.id()).count();
        let from_second = sink.iter().filter(|(run, _)| *run == second.id()).count();
        assert_eq!(from_first, 1);
        assert_eq!(from_second, 3);
        assert_eq!(pipeline.next_due(), None);
    }

    #[test]
    fn drains_a_sensor_buffer_in_order() {
        let mut pipeline = PipelineCoordinator::new(Config::default(), Ok(tokyo_office()));
        let mut buffer = SensorBuffer::new();
        buffer.on_position(position(35.0, 139.0, 0));
        buffer.on_position(position(35.00005, 139.0, 1));
        buffer.on_position(position(35.6895, 139.6917, 2));
        buffer.on_heading(RawHeading {
            degrees: None,
            timestamp: 3,
        });

        assert_eq!(pipeline.drain(&mut buffer), 2);
        assert_eq!(pipeline.filtered().len(), 1);
        assert_eq!(pipeline.capability(Capability::Position), &CapabilityState::Active);
    }

    #[test]
    fn policy_change_refilters() {
        let mut pipeline = PipelineCoordinator::new(Config::default(), Ok(tokyo_office()));
        pipeline.on_position(&position(35.7, 139.6917, 0));
        assert_eq!(pipeline.filtered().len(), 1);

        pipeline.set_policy(FilterPolicy {
            radius_km: 0.5,
            ..FilterPolicy::default()
        });
        assert!(pipeline.filtered().is_empty());
    }

    #[test]
    fn absurd_heights_still_schedule() {
        let dataset = BuildingSet::from_geojson(
            r#"{"type": "FeatureCollection", "features": [
                {"type": "Feature", "id": "spire",
                 "geometry": {"type": "Polygon", "coordinates": [[[139.6917, 35.6895], [139.6918, 35.6895], [139.6917, 35.6895]]]},
                 "properties": {"height": 1e20}},
                {"type": "Feature", "id": "hut",
                 "geometry": {"type": "Polygon", "coordinates": [[[139.6917, 35.6896], [139.6918, 35.6896], [139.6917, 35.6896]]]},
                 "properties": {"height": 3}}
            ]}"#,
        );
        let mut pipeline = PipelineCoordinator::new(Config::default(), dataset);
        pipeline.on_position(&position(35.6895, 139.6917, 0));

        let run = pipeline.trigger(0).unwrap();
        assert_eq!(run.events().len(), 2);
        assert_eq!(run.events()[0].duration_sec, crate::sonify::MAX_NOTE_SEC);
        assert_eq!(run.events()[1].offset_ms, 60_100);

        let mut sink: Vec<(u64, SonificationEvent)> = Vec::new();
        assert_eq!(pipeline.tick(Millis::MAX, &mut sink), 2);
    }

    #[test]
    fn silence_stops_playback() {
        let mut pipeline = PipelineCoordinator::new(Config::default(), Ok(tokyo_office()));
        pipeline.on_position(&position(35.6895, 139.6917, 0));
        let run = pipeline.trigger(0).unwrap();
        pipeline.silence();
        assert!(run.is_cancelled());
        assert_eq!(pipeline.tick(10_000, &mut Vec::<(u64, SonificationEvent)>::new()), 0);
    }

    #[test]
    fn demo_walk_replays_as_expected() {
        use crate::trace_decoder::{parse_trace, TraceRecord};

        let config: Config = include_str!("../demos/geosonic.ron").parse().unwrap();
        let dataset = BuildingSet::from_geojson(include_str!("../demos/shinjuku.geojson"));
        let mut pipeline = PipelineCoordinator::new(config, dataset);
        let mut sink: Vec<(u64, SonificationEvent)> = Vec::new();
        let mut clock = 0;
        let mut selections = Vec::new();

        for (_line, record) in parse_trace(include_str!("../demos/walk.trace")) {
            let Ok(record) = record else {
                continue;
            };
            clock = record.timestamp().unwrap_or(clock).max(clock);
            pipeline.tick(clock, &mut sink);
            match record {
                TraceRecord::Sensor(event) => {
                    if pipeline.handle(event) {
                        selections.push(pipeline.filtered().len());
                    }
                }
                TraceRecord::Trigger(_) => {
                    pipeline.trigger(clock).unwrap();
                }
            }
        }
        while let Some(due) = pipeline.next_due() {
            clock = due;
            pipeline.tick(clock, &mut sink);
        }

        // Radius only, facing north, facing south, compass lost
        assert_eq!(selections, vec![4, 2, 1, 4]);

        let played: Vec<(u64, &str)> = sink
            .iter()
            .map(|(run, event)| (*run, event.building_id.as_str()))
            .collect();
        // The depot in run 1 was superseded before it could play
        assert_eq!(
            played,
            vec![(1, "tocho"), (2, "flats"), (3, "tocho"), (3, "depot"), (3, "flats")]
        );
        assert_eq!(sink[1].1.timbre, Timbre::Fm);
        assert_eq!(sink[3].1.timbre, Timbre::Percussive);
    }
}
