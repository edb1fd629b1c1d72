use serde::{Deserialize, Serialize};

/// A point in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

/// Axis-aligned rectangle in decimal degrees; containment is inclusive on every edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.min_lat <= lat && lat <= self.max_lat && self.min_lon <= lon && lon <= self.max_lon
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        self.min_lat <= self.max_lat && self.min_lon <= self.max_lon
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Depot {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

/// Collection zone inside a district
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub bounds: BoundingBox,
    pub depot: Depot,
    /// Display color used by map front-ends
    #[serde(default)]
    pub color: String,
}

/// Municipal district; zones are listed in match priority order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct District {
    pub id: String,
    pub name: String,
    pub bounds: BoundingBox,
    pub center: Coordinate,
    pub zones: Vec<Zone>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOX: BoundingBox = BoundingBox {
        min_lat: 6.0,
        max_lat: 7.0,
        min_lon: 79.0,
        max_lon: 80.0,
    };

    #[test]
    fn test_contains_interior_point() {
        assert!(BOX.contains(6.5, 79.5));
    }

    #[test]
    fn test_contains_is_inclusive_on_edges() {
        assert!(BOX.contains(6.0, 79.0));
        assert!(BOX.contains(7.0, 80.0));
        assert!(BOX.contains(6.0, 80.0));
    }

    #[test]
    fn test_contains_rejects_outside_point() {
        assert!(!BOX.contains(5.999, 79.5));
        assert!(!BOX.contains(6.5, 80.001));
    }

    #[test]
    fn test_inverted_box_is_not_well_formed() {
        let inverted = BoundingBox {
            min_lat: 7.0,
            max_lat: 6.0,
            ..BOX
        };
        assert!(!inverted.is_well_formed());
        assert!(BOX.is_well_formed());
    }
}
