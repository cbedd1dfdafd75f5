//! Errors that cross module boundaries. Capability loss is deliberately not
//! in here: it is reported as a [`SensorEvent`](crate::sensor::SensorEvent)
//! and kept as state, never returned as an `Err`.

use std::{borrow::Cow, error::Error, fmt};

/// The building dataset could not be loaded. Filtering and sonification
/// have nothing to work on when this happens.
#[derive(Debug)]
pub enum DatasetError {
    /// Reading the file failed
    Io(std::io::Error),
    /// The document is not valid JSON, or not shaped like GeoJSON
    Json(serde_json::Error),
    /// The document parsed, but its top-level `type` is not
    /// `FeatureCollection`
    NotFeatureCollection(String),
}

impl fmt::Display for DatasetError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let msg = match self {
            DatasetError::Io(error) => Cow::from(format!("io error: {}", error)),
            DatasetError::Json(error) => Cow::from(format!("json error: {}", error)),
            DatasetError::NotFeatureCollection(kind) => {
                Cow::from(format!("expected a FeatureCollection, found {:?}", kind))
            }
        };

        write!(f, "{}", msg)
    }
}

impl Error for DatasetError {}

impl From<std::io::Error> for DatasetError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for DatasetError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// The configuration file could not be read.
#[derive(Debug)]
pub enum ConfigError {
    /// Reading the file failed
    Io(std::io::Error),
    /// The file is not valid RON for a [`Config`](crate::config::Config)
    Ron(ron::de::SpannedError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(error) => write!(f, "io error: {}", error),
            ConfigError::Ron(error) => write!(f, "ron error: {}", error),
        }
    }
}

impl Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<ron::de::SpannedError> for ConfigError {
    fn from(value: ron::de::SpannedError) -> Self {
        Self::Ron(value)
    }
}

/// Returned by the [`PipelineCoordinator`](crate::coordinator::PipelineCoordinator)
/// when a request cannot be served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    /// No building dataset was loaded; carries the load failure message
    DatasetUnavailable(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PipelineError::DatasetUnavailable(reason) => {
                write!(f, "building dataset unavailable: {}", reason)
            }
        }
    }
}

impl Error for PipelineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err = DatasetError::NotFeatureCollection("Feature".to_owned());
        assert_eq!(err.to_string(), "expected a FeatureCollection, found \"Feature\"");

        let err = PipelineError::DatasetUnavailable("io error: gone".to_owned());
        assert_eq!(err.to_string(), "building dataset unavailable: io error: gone");
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(DatasetError::from(io), DatasetError::Io(_)));
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert!(matches!(ConfigError::from(io), ConfigError::Io(_)));
    }
}
