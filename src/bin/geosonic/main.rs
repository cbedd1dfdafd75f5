//! Drives the geosonic pipeline from a recorded trace or a simulated sensor,
//! logging the selected buildings and every note that fires.

use clap::Parser;
use geosonic::{
    args::{
        CommandTask::{Replay, Simulate},
        GeoArgs, ReplayCommand, SimulateCommand,
    },
    building::BuildingSet,
    config::Config,
    coordinator::PipelineCoordinator,
    dummy_sensor::DummySensor,
    geo::Coordinate,
    pose::Millis,
    scheduler::AudioSink,
    sonify::SonificationEvent,
    trace_decoder::{parse_trace, TraceRecord},
};

use log::{info, warn};
use std::{
    fs,
    time::{Duration, Instant},
};

// Example:
// RUST_LOG=info cargo run --bin geosonic --
//                            --dataset  shinjuku.geojson
//                            --radius   1.5
//                            --directional
//                            replay --trace walk.trace

const SIMULATION_INTERVAL: Duration = Duration::from_millis(250);

/// Stands in for the audio engine: every trigger instruction is logged.
struct LogSink;

impl AudioSink for LogSink {
    fn trigger(&mut self, run_id: u64, event: &SonificationEvent) {
        info!(
            "run {} : {:>8.2} Hz {:>5.2} s {:<10} +{:>6} ms  ({})",
            run_id, event.pitch_hz, event.duration_sec, event.timbre, event.offset_ms, event.building_id
        );
    }
}

fn main() {
    env_logger::init();
    let args = GeoArgs::parse();

    let config = match &args.config {
        Some(path) => Config::from_path(path).expect("Failed to read config file"),
        None => Config::default(),
    };
    let config = args.apply_overrides(config);

    let mut pipeline = PipelineCoordinator::new(config, BuildingSet::from_path(&args.dataset));
    if let Some(reason) = pipeline.dataset_error() {
        // Keep going: the pose side still works and the state is visible
        eprintln!("Building dataset unavailable: {}", reason);
    }

    let mut sink = LogSink;
    match &args.command {
        Replay(cmd) => replay(&mut pipeline, cmd, &mut sink),
        Simulate(cmd) => simulate(&mut pipeline, cmd, &mut sink),
    }
}

fn replay(pipeline: &mut PipelineCoordinator, cmd: &ReplayCommand, sink: &mut LogSink) {
    let text = fs::read_to_string(&cmd.trace).expect("Failed to read trace file");
    let mut clock: Millis = 0;
    let mut first = true;

    for (line, record) in parse_trace(&text) {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("line {}: unable to parse trace record {:?}", line, e.input);
                continue;
            }
        };

        // Trace time only moves forward; untimed records happen "now"
        let at = record.timestamp().unwrap_or(clock).max(clock);
        if cmd.realtime && !first {
            spin_sleep::sleep(Duration::from_millis(at - clock));
        }
        first = false;
        clock = at;
        pipeline.tick(clock, sink);

        match record {
            TraceRecord::Sensor(event) => {
                if pipeline.handle(event) {
                    report_filtered(pipeline);
                }
            }
            TraceRecord::Trigger(_) => {
                if let Err(e) = pipeline.trigger(clock) {
                    warn!("cannot sonify: {}", e);
                }
            }
        }
    }

    // Let the last run finish
    while let Some(due) = pipeline.next_due() {
        if cmd.realtime {
            spin_sleep::sleep(Duration::from_millis(due.saturating_sub(clock)));
        }
        clock = clock.max(due);
        pipeline.tick(clock, sink);
    }
}

fn simulate(pipeline: &mut PipelineCoordinator, cmd: &SimulateCommand, sink: &mut LogSink) {
    let mut builder = DummySensor::builder()
        .origin(Coordinate::new(cmd.lat, cmd.lon))
        .noise(cmd.noise)
        .interval(SIMULATION_INTERVAL);
    if cmd.no_heading {
        builder = builder.without_heading();
    }
    let mut sensor = builder.build();

    let started = Instant::now();
    let now = || started.elapsed().as_millis() as Millis;

    for step in 1..=cmd.steps {
        spin_sleep::sleep(SIMULATION_INTERVAL);
        if pipeline.drain(&mut sensor) > 0 {
            report_filtered(pipeline);
        }
        if cmd.trigger_every > 0 && step % cmd.trigger_every == 0 {
            if let Err(e) = pipeline.trigger(now()) {
                warn!("cannot sonify: {}", e);
            }
        }
        pipeline.tick(now(), sink);
    }
    sensor.stop();

    while let Some(due) = pipeline.next_due() {
        let elapsed = now();
        if due > elapsed {
            spin_sleep::sleep(Duration::from_millis(due - elapsed));
        }
        pipeline.tick(now(), sink);
    }
}

/// What a renderer would pick up: the pose and the selected buildings.
fn report_filtered(pipeline: &PipelineCoordinator) {
    let Some(pose) = pipeline.pose() else {
        return;
    };
    let heading = pose
        .heading
        .map(|h| format!("{:.1}", h.degrees()))
        .unwrap_or_else(|| "none".to_owned());
    info!(
        "pose {:.5},{:.5} heading {} : {} buildings selected",
        pose.position.coordinate.lat,
        pose.position.coordinate.lon,
        heading,
        pipeline.filtered().len()
    );
    for item in pipeline.filtered() {
        info!(
            "    {:<16} {:>6.3} km {:>5.1} deg  {}",
            item.building.id,
            item.distance_km,
            item.bearing_deg,
            item.building.name.as_deref().unwrap_or("")
        );
    }
}
