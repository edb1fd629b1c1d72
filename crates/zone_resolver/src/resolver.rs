use crate::builtin;
use crate::geo::{District, Zone};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ZoneTableError {
    #[error("District '{0}' declares no zones")]
    EmptyDistrict(String),

    #[error("Duplicate district id '{0}'")]
    DuplicateDistrict(String),

    #[error("Duplicate zone id '{0}'")]
    DuplicateZone(String),

    #[error("Bounding box of '{0}' has min greater than max")]
    InvalidBounds(String),

    #[error("Failed to read zone table: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse zone table: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result of resolving a coordinate: the containing district and the zone picked inside it
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ZoneAssignment<'a> {
    pub district: &'a District,
    pub zone: &'a Zone,
}

impl ZoneAssignment<'_> {
    pub fn district_id(&self) -> &str {
        &self.district.id
    }

    pub fn zone_id(&self) -> &str {
        &self.zone.id
    }
}

/// Immutable geofence table mapping coordinates to collection zones
///
/// Built once at startup and shared read-only between tasks.
#[derive(Debug, Clone)]
pub struct ZoneResolver {
    districts: Vec<District>,
}

impl ZoneResolver {
    /// Validate and wrap a table; every district must declare at least one zone
    pub fn new(districts: Vec<District>) -> Result<Self, ZoneTableError> {
        let mut district_ids = HashSet::new();
        let mut zone_ids = HashSet::new();

        for district in &districts {
            if !district_ids.insert(district.id.as_str()) {
                return Err(ZoneTableError::DuplicateDistrict(district.id.clone()));
            }
            if district.zones.is_empty() {
                return Err(ZoneTableError::EmptyDistrict(district.id.clone()));
            }
            if !district.bounds.is_well_formed() {
                return Err(ZoneTableError::InvalidBounds(district.id.clone()));
            }
            for zone in &district.zones {
                if !zone_ids.insert(zone.id.as_str()) {
                    return Err(ZoneTableError::DuplicateZone(zone.id.clone()));
                }
                if !zone.bounds.is_well_formed() {
                    return Err(ZoneTableError::InvalidBounds(zone.id.clone()));
                }
            }
        }

        Ok(Self { districts })
    }

    /// The table of the deployed service area
    pub fn builtin() -> Self {
        Self {
            districts: builtin::districts(),
        }
    }

    /// Parse a JSON array of districts
    pub fn from_json_str(json: &str) -> Result<Self, ZoneTableError> {
        let districts: Vec<District> = serde_json::from_str(json)?;
        Self::new(districts)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ZoneTableError> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let resolver = Self::from_json_str(&json)?;
        debug!(
            path = %path.as_ref().display(),
            districts = resolver.districts.len(),
            "loaded zone table"
        );
        Ok(resolver)
    }

    /// Map a coordinate to its district and zone
    ///
    /// Districts are tried in declaration order and the first containing one wins. Inside it
    /// the first containing zone wins, falling back to the district's first zone. Returns
    /// `None` when no district contains the point.
    pub fn assign(&self, lat: f64, lon: f64) -> Option<ZoneAssignment<'_>> {
        let district = self
            .districts
            .iter()
            .find(|district| district.bounds.contains(lat, lon))?;

        let zone = district
            .zones
            .iter()
            .find(|zone| zone.bounds.contains(lat, lon))
            .or_else(|| district.zones.first())?;

        Some(ZoneAssignment { district, zone })
    }

    pub fn get_district_by_id(&self, district_id: &str) -> Option<&District> {
        self.districts.iter().find(|d| d.id == district_id)
    }

    pub fn get_zone_by_id(&self, zone_id: &str) -> Option<&Zone> {
        self.districts
            .iter()
            .flat_map(|d| d.zones.iter())
            .find(|z| z.id == zone_id)
    }

    pub fn districts(&self) -> &[District] {
        &self.districts
    }

    /// Zones of a district in priority order; empty when the district is unknown
    pub fn district_zones(&self, district_id: &str) -> &[Zone] {
        self.get_district_by_id(district_id)
            .map(|d| d.zones.as_slice())
            .unwrap_or_default()
    }
}

impl Default for ZoneResolver {
    fn default() -> Self {
        Self::builtin()
    }
}
