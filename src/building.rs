//! Buildings and the read-only [`BuildingSet`] the pipeline filters, plus a
//! loader for GeoJSON feature collections.
//!
//! Only the footprint, height, usage and name of each feature matter here.
//! Optional properties may be missing or oddly typed without stopping the
//! load; a missing height just means the building stays silent.

use crate::error::DatasetError;
use crate::geo::Coordinate;
use log::{info, warn};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::{fs::File, io::BufReader, io::Read, path::Path, sync::Arc};

/// A single building footprint with whatever metadata the dataset had.
#[derive(Debug, Clone, PartialEq)]
pub struct Building {
    /// Identifier from the dataset, or the feature's index if it had none
    pub id: String,
    /// Outer ring of the footprint, in dataset order
    pub footprint: Vec<Coordinate>,
    /// Height in meters
    pub height_m: Option<f64>,
    /// Usage or building-type tag, e.g. "office"
    pub usage: Option<String>,
    /// Human readable name
    pub name: Option<String>,
}

impl Building {
    /// The single point that stands in for the whole footprint when
    /// measuring distance and bearing: the first vertex of the outer ring.
    pub fn location(&self) -> Option<Coordinate> {
        self.footprint.first().copied()
    }
}

/// The immutable, ordered set of buildings for a session. Cloning is cheap
/// and shares the underlying buildings.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildingSet {
    buildings: Arc<[Building]>,
}

impl BuildingSet {
    /// Wraps `buildings`, keeping their order.
    pub fn new(buildings: Vec<Building>) -> Self {
        Self {
            buildings: buildings.into(),
        }
    }

    /// Loads a GeoJSON feature collection from `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let handle = File::open(path)?;
        Self::from_reader(BufReader::new(handle))
    }

    /// Loads a GeoJSON feature collection from any reader.
    pub fn from_reader(reader: impl Read) -> Result<Self, DatasetError> {
        let collection: FeatureCollection = serde_json::from_reader(reader)?;
        Self::from_collection(collection)
    }

    /// Loads a GeoJSON feature collection from a string.
    pub fn from_geojson(text: &str) -> Result<Self, DatasetError> {
        let collection: FeatureCollection = serde_json::from_str(text)?;
        Self::from_collection(collection)
    }

    fn from_collection(collection: FeatureCollection) -> Result<Self, DatasetError> {
        if collection.kind != "FeatureCollection" {
            return Err(DatasetError::NotFeatureCollection(collection.kind));
        }

        let total = collection.features.len();
        let buildings: Vec<Building> = collection
            .features
            .into_iter()
            .enumerate()
            .filter_map(|(index, feature)| feature.into_building(index))
            .collect();

        info!("loaded {} of {} features as buildings", buildings.len(), total);
        Ok(Self::new(buildings))
    }

    /// Number of buildings.
    pub fn len(&self) -> usize {
        self.buildings.len()
    }

    /// True if the set has no buildings at all.
    pub fn is_empty(&self) -> bool {
        self.buildings.is_empty()
    }

    /// Iterates in dataset order.
    pub fn iter(&self) -> std::slice::Iter<'_, Building> {
        self.buildings.iter()
    }
}

impl<'a> IntoIterator for &'a BuildingSet {
    type Item = &'a Building;
    type IntoIter = std::slice::Iter<'a, Building>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// Just enough of GeoJSON to pull footprints out. Positions are [lon, lat]
// with an optional trailing altitude.

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<Geometry>,
    #[serde(default)]
    properties: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon { coordinates: Vec<Vec<Vec<f64>>> },
    MultiPolygon { coordinates: Vec<Vec<Vec<Vec<f64>>>> },
    #[serde(other)]
    Unsupported,
}

impl Geometry {
    fn outer_ring(&self) -> Option<&[Vec<f64>]> {
        match self {
            Geometry::Polygon { coordinates } => coordinates.first().map(Vec::as_slice),
            Geometry::MultiPolygon { coordinates } => coordinates
                .first()
                .and_then(|polygon| polygon.first())
                .map(Vec::as_slice),
            Geometry::Unsupported => None,
        }
    }
}

impl Feature {
    fn into_building(self, index: usize) -> Option<Building> {
        let properties = self.properties.unwrap_or_default();
        let id = self
            .id
            .as_ref()
            .or_else(|| properties.get("id"))
            .and_then(value_to_id)
            .unwrap_or_else(|| index.to_string());

        let footprint: Vec<Coordinate> = self
            .geometry
            .as_ref()
            .and_then(Geometry::outer_ring)
            .map(|ring| {
                ring.iter()
                    .filter_map(|position| match position.as_slice() {
                        [lon, lat, ..] => Some(Coordinate::new(*lat, *lon)),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        if footprint.is_empty() {
            warn!("feature {} has no usable polygon footprint, skipping", id);
            return None;
        }

        Some(Building {
            id,
            footprint,
            height_m: first_number(&properties, &["height", "measuredHeight"]),
            usage: first_string(&properties, &["usage", "building"]),
            name: first_string(&properties, &["name"]),
        })
    }
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn first_number(properties: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .filter_map(|key| properties.get(*key))
        .find_map(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        })
        .filter(|h| h.is_finite())
}

fn first_string(properties: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| properties.get(*key))
        .find_map(|value| match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            _ => None,
        })
}
