//! Parses recorded sensor traces, one record per line:
//!
//! ```text
//! +POS:35.6895,139.6917,5.0,1000
//! +HDG:92.5,1040
//! +ERR:heading,permission denied
//! +TRG:1500
//! ```
//!
//! Any numeric field of a `+POS` or `+HDG` record may be `null`, which
//! yields a sample the [`PoseTracker`](crate::pose::PoseTracker) will drop as
//! malformed. Timestamps are milliseconds.

use crate::pose::{Millis, RawHeading, RawPosition};
use crate::sensor::{Capability, CapabilityError, SensorEvent};

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{char, not_line_ending, space0, u64},
    combinator::{all_consuming, map, value},
    error::Error,
    number::complete::double,
    sequence::{preceded, terminated, tuple},
    Finish, IResult,
};

use std::str::FromStr;

/// One line of a trace.
#[derive(Debug, Clone, PartialEq)]
pub enum TraceRecord {
    /// Something the sensor collaborator reported
    Sensor(SensorEvent),
    /// The user asked to hear the current surroundings
    Trigger(Millis),
}

impl TraceRecord {
    /// When the record happened, if it carries a time.
    pub fn timestamp(&self) -> Option<Millis> {
        match self {
            TraceRecord::Sensor(SensorEvent::Position(p)) => Some(p.timestamp),
            TraceRecord::Sensor(SensorEvent::Heading(h)) => Some(h.timestamp),
            TraceRecord::Sensor(SensorEvent::Unavailable(_)) => None,
            TraceRecord::Trigger(at) => Some(*at),
        }
    }
}

fn nullable_f64(s: &str) -> IResult<&str, Option<f64>> {
    alt((value(None, tag("null")), map(double, Some)))(s)
}

fn comma(s: &str) -> IResult<&str, char> {
    preceded(space0, terminated(char(','), space0))(s)
}

fn parse_position(s: &str) -> IResult<&str, RawPosition> {
    map(
        tuple((
            preceded(tag("+POS:"), nullable_f64),
            preceded(comma, nullable_f64),
            preceded(comma, nullable_f64),
            preceded(comma, u64),
        )),
        |(latitude, longitude, accuracy, timestamp)| RawPosition {
            latitude,
            longitude,
            accuracy,
            timestamp,
        },
    )(s)
}

fn parse_heading(s: &str) -> IResult<&str, RawHeading> {
    map(
        tuple((preceded(tag("+HDG:"), nullable_f64), preceded(comma, u64))),
        |(degrees, timestamp)| RawHeading { degrees, timestamp },
    )(s)
}

fn parse_capability(s: &str) -> IResult<&str, Capability> {
    alt((
        value(Capability::Position, tag("position")),
        value(Capability::Heading, tag("heading")),
    ))(s)
}

fn parse_unavailable(s: &str) -> IResult<&str, CapabilityError> {
    map(
        tuple((preceded(tag("+ERR:"), parse_capability), preceded(comma, not_line_ending))),
        |(capability, reason): (Capability, &str)| CapabilityError {
            capability,
            reason: reason.trim().to_owned(),
        },
    )(s)
}

fn parse_trigger(s: &str) -> IResult<&str, Millis> {
    preceded(tag("+TRG:"), u64)(s)
}

fn parse_record(s: &str) -> IResult<&str, TraceRecord> {
    all_consuming(terminated(
        alt((
            map(parse_position, |p| TraceRecord::Sensor(SensorEvent::Position(p))),
            map(parse_heading, |h| TraceRecord::Sensor(SensorEvent::Heading(h))),
            map(parse_unavailable, |e| TraceRecord::Sensor(SensorEvent::Unavailable(e))),
            map(parse_trigger, TraceRecord::Trigger),
        )),
        space0,
    ))(s)
}

impl FromStr for TraceRecord {
    type Err = Error<String>;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match parse_record(s.trim_end_matches(['\r', '\n'])).finish() {
            Ok((_remaining, record)) => Ok(record),
            Err(Error { input, code }) => Err(Error {
                input: input.to_string(),
                code,
            }),
        }
    }
}

/// Parses every record in `text`, skipping blank lines and `#` comments.
/// Unparsable lines come back as errors alongside their 1-based line number
/// so the caller can decide how loud to be about them.
pub fn parse_trace(text: &str) -> Vec<(usize, Result<TraceRecord, Error<String>>)> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(i, line)| (i + 1, line.trim().parse()))
        .collect()
}
