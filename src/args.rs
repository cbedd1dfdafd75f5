// Commandline argument parser using clap for geosonic

use clap::{Args, Parser, Subcommand};

use crate::config::Config;

/// Hear the buildings around you
#[derive(Debug, Parser, Clone)]
#[command(version, about)]
pub struct GeoArgs {
    #[command(subcommand)]
    /// Where the sensor samples come from
    pub command: CommandTask,

    /// GeoJSON feature collection of building footprints
    #[arg(short = 'd', long = "dataset")]
    pub dataset: String,

    /// RON configuration file; built-in defaults are used without one
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,

    /// Override the selection radius, in kilometers
    #[arg(long = "radius")]
    pub radius_km: Option<f64>,

    /// Only select buildings in the direction the user faces
    #[arg(long)]
    pub directional: bool,

    /// Override the half width of the directional cone, in degrees
    #[arg(long = "cone")]
    pub cone_half_width_deg: Option<f64>,

    /// Play each building as a strummed triad
    #[arg(long)]
    pub chord: bool,
}

/// Which sensor source drives the pipeline
#[derive(Debug, Subcommand, Clone)]
pub enum CommandTask {
    /// Replay a recorded sensor trace
    Replay(ReplayCommand),

    /// Walk a simulated sensor around a starting point
    Simulate(SimulateCommand),
}

/// Feed a recorded trace through the pipeline
#[derive(Debug, Args, Clone)]
pub struct ReplayCommand {
    /// Trace file with +POS, +HDG, +ERR and +TRG records
    #[arg(short = 't', long = "trace")]
    pub trace: String,

    /// Sleep between records according to their timestamps
    #[arg(long)]
    pub realtime: bool,
}

/// Feed the simulated sensor through the pipeline
#[derive(Debug, Args, Clone)]
pub struct SimulateCommand {
    /// Starting latitude, in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lat: f64,

    /// Starting longitude, in degrees
    #[arg(long, allow_hyphen_values = true)]
    pub lon: f64,

    /// Number of sample intervals to run for
    #[arg(short = 'n', long = "steps", default_value_t = 20)]
    pub steps: u32,

    /// Largest random step per sample, in degrees
    #[arg(long, default_value_t = 0.0002)]
    pub noise: f64,

    /// Trigger sonification every this many steps
    #[arg(long = "trigger-every", default_value_t = 5)]
    pub trigger_every: u32,

    /// Simulate a device without a compass
    #[arg(long = "no-heading")]
    pub no_heading: bool,
}

impl GeoArgs {
    /// Applies the command-line overrides on top of `config`.
    pub fn apply_overrides(&self, mut config: Config) -> Config {
        if let Some(radius_km) = self.radius_km {
            config.policy.radius_km = radius_km;
        }
        if self.directional {
            config.policy.directional = true;
        }
        if let Some(cone) = self.cone_half_width_deg {
            config.policy.cone_half_width_deg = cone;
        }
        if self.chord {
            config.sonification.chord = true;
        }
        config
    }
}
