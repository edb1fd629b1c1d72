use crate::geo::{BoundingBox, Coordinate, Depot, District, Zone};

fn bounds(min_lat: f64, max_lat: f64, min_lon: f64, max_lon: f64) -> BoundingBox {
    BoundingBox {
        min_lat,
        max_lat,
        min_lon,
        max_lon,
    }
}

fn zone(
    district_id: &str,
    index: u32,
    name: &str,
    description: &str,
    bounds: BoundingBox,
    depot: (f64, f64, &str),
    color: &str,
) -> Zone {
    Zone {
        id: format!("{}_zone{}", district_id, index),
        name: name.to_string(),
        description: description.to_string(),
        bounds,
        depot: Depot {
            name: depot.2.to_string(),
            lat: depot.0,
            lon: depot.1,
        },
        color: color.to_string(),
    }
}

fn district(
    id: &str,
    name: &str,
    bounds: BoundingBox,
    center: (f64, f64),
    zones: Vec<Zone>,
) -> District {
    District {
        id: id.to_string(),
        name: name.to_string(),
        bounds,
        center: Coordinate {
            lat: center.0,
            lon: center.1,
        },
        zones,
    }
}

/// Districts served by the deployed fleet, in match priority order
pub(crate) fn districts() -> Vec<District> {
    vec![
        district(
            "colombo",
            "Colombo",
            bounds(6.83, 6.98, 79.82, 79.92),
            (6.9271, 79.8612),
            vec![
                zone(
                    "colombo",
                    1,
                    "Fort & Pettah",
                    "Commercial area",
                    bounds(6.925, 6.980, 79.840, 79.865),
                    (6.9318, 79.8478, "Fort Depot"),
                    "#FF6B6B",
                ),
                zone(
                    "colombo",
                    2,
                    "Kollupitiya & Bambalapitiya",
                    "Central residential",
                    bounds(6.885, 6.925, 79.845, 79.865),
                    (6.9045, 79.8580, "Galle Face Depot"),
                    "#4ECDC4",
                ),
                zone(
                    "colombo",
                    3,
                    "Wellawatta & Dehiwala",
                    "South residential",
                    bounds(6.830, 6.885, 79.850, 79.875),
                    (6.8568, 79.8610, "Dehiwala Depot"),
                    "#45B7D1",
                ),
                zone(
                    "colombo",
                    4,
                    "Nugegoda & Kotte",
                    "Suburban east",
                    bounds(6.850, 6.920, 79.875, 79.920),
                    (6.8654, 79.8896, "Nugegoda Depot"),
                    "#5F27CD",
                ),
            ],
        ),
        district(
            "kurunegala",
            "Kurunegala",
            bounds(7.40, 7.55, 80.30, 80.45),
            (7.4867, 80.3647),
            vec![
                zone(
                    "kurunegala",
                    1,
                    "Town Center",
                    "Commercial & bus stand area",
                    bounds(7.480, 7.500, 80.355, 80.375),
                    (7.4867, 80.3647, "Kurunegala Main Depot"),
                    "#FF9F43",
                ),
                zone(
                    "kurunegala",
                    2,
                    "North Kurunegala",
                    "Residential north",
                    bounds(7.500, 7.550, 80.340, 80.400),
                    (7.5100, 80.3700, "North Depot"),
                    "#EE5A24",
                ),
                zone(
                    "kurunegala",
                    3,
                    "South Kurunegala",
                    "Residential south",
                    bounds(7.400, 7.480, 80.340, 80.400),
                    (7.4500, 80.3600, "South Depot"),
                    "#F79F1F",
                ),
            ],
        ),
        district(
            "galle",
            "Galle",
            bounds(5.95, 6.10, 80.15, 80.28),
            (6.0328, 80.2170),
            vec![
                zone(
                    "galle",
                    1,
                    "Galle Fort & Town",
                    "Historic fort and commercial",
                    bounds(6.020, 6.050, 80.200, 80.230),
                    (6.0328, 80.2170, "Galle Main Depot"),
                    "#1ABC9C",
                ),
                zone(
                    "galle",
                    2,
                    "Unawatuna & South",
                    "Beach and tourist area",
                    bounds(5.950, 6.020, 80.200, 80.280),
                    (6.0100, 80.2500, "Unawatuna Depot"),
                    "#16A085",
                ),
            ],
        ),
        district(
            "kandy",
            "Kandy",
            bounds(7.25, 7.35, 80.58, 80.70),
            (7.2906, 80.6337),
            vec![
                zone(
                    "kandy",
                    1,
                    "Kandy City Center",
                    "Temple, lake, and commercial",
                    bounds(7.280, 7.310, 80.620, 80.650),
                    (7.2906, 80.6337, "Kandy Main Depot"),
                    "#9B59B6",
                ),
                zone(
                    "kandy",
                    2,
                    "Peradeniya & West",
                    "University and residential",
                    bounds(7.250, 7.290, 80.580, 80.620),
                    (7.2700, 80.6000, "Peradeniya Depot"),
                    "#8E44AD",
                ),
            ],
        ),
        district(
            "matara",
            "Matara",
            bounds(5.90, 6.00, 80.48, 80.60),
            (5.9485, 80.5353),
            vec![zone(
                "matara",
                1,
                "Matara Town",
                "Fort and commercial",
                bounds(5.930, 5.970, 80.520, 80.560),
                (5.9485, 80.5353, "Matara Main Depot"),
                "#E74C3C",
            )],
        ),
    ]
}
