//! Proximity verdicts between two location claims of the same kind.

use alloc::vec::Vec;
use core::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::constants::{
    EARTH_RADIUS_METERS, GPS_FAR_DECAY, OLC_FAR_CONFIDENCE_CAP, OLC_FAR_GROWTH_PER_KM,
    OLC_NEIGHBOR_CONFIDENCE,
};
use crate::errors::LocationResult;
use crate::location::OlcLocation;
use crate::olc::{self, CodeArea};

/// Ordered so that `Near > Mid > Far`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProximityCode {
    Far,
    Mid,
    Near,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct LocationProximity {
    pub code: ProximityCode,
    pub confidence: f64,
}

impl LocationProximity {
    pub fn new(code: ProximityCode, confidence: f64) -> Self {
        Self {
            code,
            confidence: if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) },
        }
    }

    pub fn is_at_least(&self, code: ProximityCode) -> bool {
        self.code >= code
    }
}

impl Ord for LocationProximity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code
            .cmp(&other.code)
            .then_with(|| self.confidence.total_cmp(&other.confidence))
    }
}

impl PartialOrd for LocationProximity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LocationProximity {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LocationProximity {}

/// Great-circle distance in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Band classification for a measured distance and a near threshold, both in meters.
pub fn gps_proximity(distance: f64, threshold: f64) -> LocationProximity {
    if threshold == 0.0 && distance == 0.0 {
        return LocationProximity::new(ProximityCode::Near, 1.0);
    }

    if distance < threshold {
        LocationProximity::new(ProximityCode::Near, 1.0 - distance / threshold)
    } else if distance < 2.0 * threshold {
        LocationProximity::new(ProximityCode::Mid, 1.0 - (distance - threshold) / threshold)
    } else {
        LocationProximity::new(
            ProximityCode::Far,
            1.0 / (GPS_FAR_DECAY * (distance - 2.0 * threshold) + 1.0),
        )
    }
}

/// Compass directions in ring-walk order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// (rows, columns) moved by one step.
    pub const fn offset(self) -> (i8, i8) {
        match self {
            Direction::North => (1, 0),
            Direction::NorthEast => (1, 1),
            Direction::East => (0, 1),
            Direction::SouthEast => (-1, 1),
            Direction::South => (-1, 0),
            Direction::SouthWest => (-1, -1),
            Direction::West => (0, -1),
            Direction::NorthWest => (1, -1),
        }
    }

    pub fn next(self) -> Direction {
        let index = Self::ALL.iter().position(|d| *d == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

/// The cell one step away in `direction`, at the same precision.
pub fn neighbor(area: &CodeArea, direction: Direction) -> LocationResult<CodeArea> {
    let (rows, columns) = direction.offset();
    let code = olc::encode(
        area.center_latitude() + f64::from(rows) * area.height(),
        area.center_longitude() + f64::from(columns) * area.width(),
        area.digits,
    )?;
    olc::decode(&code)
}

/// The eight cells surrounding `location`.
pub fn first_ring(location: &OlcLocation) -> LocationResult<Vec<OlcLocation>> {
    Direction::ALL
        .iter()
        .map(|direction| area_to_location(&neighbor(location.area(), *direction)?))
        .collect()
}

/// The sixteen cells two steps away from `location`.
pub fn second_ring(location: &OlcLocation) -> LocationResult<Vec<OlcLocation>> {
    let mut ring = Vec::with_capacity(16);
    for direction in Direction::ALL {
        let first = neighbor(location.area(), direction)?;
        for step in [direction, direction.next()] {
            ring.push(area_to_location(&neighbor(&first, step)?)?);
        }
    }
    Ok(ring)
}

fn area_to_location(area: &CodeArea) -> LocationResult<OlcLocation> {
    OlcLocation::from_coordinates(area.center_latitude(), area.center_longitude(), area.digits)
}

pub fn olc_proximity(from: &OlcLocation, to: &OlcLocation) -> LocationResult<LocationProximity> {
    if from.overlaps(to) {
        return Ok(LocationProximity::new(ProximityCode::Near, 1.0));
    }

    if first_ring(from)?.iter().any(|cell| cell.overlaps(to)) {
        return Ok(LocationProximity::new(ProximityCode::Near, OLC_NEIGHBOR_CONFIDENCE));
    }

    if second_ring(from)?.iter().any(|cell| cell.overlaps(to)) {
        return Ok(LocationProximity::new(ProximityCode::Mid, 1.0));
    }

    let (a, b) = (from.area(), to.area());
    let distance_km = haversine_distance(
        a.center_latitude(),
        a.center_longitude(),
        b.center_latitude(),
        b.center_longitude(),
    ) / 1_000.0;

    // Grows toward 1 with distance, unlike the GPS far band.
    let confidence = (1.0 - (-OLC_FAR_GROWTH_PER_KM * distance_km).exp()).min(OLC_FAR_CONFIDENCE_CAP);
    Ok(LocationProximity::new(ProximityCode::Far, confidence))
}
