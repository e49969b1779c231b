//! Location claims: a closed union of GPS points and Open Location Codes.
//!
//! Both variants are validated at construction and immutable afterwards.
//! Comparing two claims goes through [`Location::proximity_to`], which rejects
//! mixed variants before any geometry runs.

use alloc::string::String;
use core::fmt;

use parity_scale_codec::{Decode, Encode, EncodeLike, Error as CodecError, Input, Output};
use serde::Serialize;

use crate::constants::{LATITUDE_MAX, LONGITUDE_MAX, OLC_MIN_DIGITS};
use crate::errors::{LocationError, LocationResult};
use crate::olc::{self, CodeArea};
use crate::proximity::LocationProximity;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum LocationKind {
    Gps,
    Olc,
}

impl fmt::Display for LocationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationKind::Gps => write!(f, "GPS"),
            LocationKind::Olc => write!(f, "OLC"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Encode, Decode, Serialize)]
pub enum Location {
    Gps(GpsLocation),
    Olc(OlcLocation),
}

impl Location {
    pub fn gps(latitude: f64, longitude: f64, threshold: f64) -> LocationResult<Self> {
        GpsLocation::new(latitude, longitude, threshold).map(Self::Gps)
    }

    pub fn olc(code: &str) -> LocationResult<Self> {
        OlcLocation::new(code).map(Self::Olc)
    }

    pub const fn kind(&self) -> LocationKind {
        match self {
            Location::Gps(_) => LocationKind::Gps,
            Location::Olc(_) => LocationKind::Olc,
        }
    }

    pub fn same_kind(&self, other: &Location) -> bool {
        self.kind() == other.kind()
    }

    /// Proximity of `other` as seen from `self`.
    pub fn proximity_to(&self, other: &Location) -> LocationResult<LocationProximity> {
        match (self, other) {
            (Location::Gps(a), Location::Gps(b)) => Ok(a.proximity_to(b)),
            (Location::Olc(a), Location::Olc(b)) => a.proximity_to(b),
            _ => Err(LocationError::VariantMismatch {
                left: self.kind(),
                right: other.kind(),
            }),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Gps(gps) => write!(
                f,
                "gps({:.6}, {:.6} ±{}m)",
                gps.latitude, gps.longitude, gps.threshold
            ),
            Location::Olc(code) => write!(f, "olc({})", code.code),
        }
    }
}

/// A latitude/longitude claim with the radius inside which it counts as near.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct GpsLocation {
    latitude: f64,
    longitude: f64,
    threshold: f64,
}

impl GpsLocation {
    pub fn new(latitude: f64, longitude: f64, threshold: f64) -> LocationResult<Self> {
        if !latitude.is_finite() || latitude.abs() > LATITUDE_MAX {
            return Err(LocationError::LatitudeOutOfRange(latitude));
        }
        if !longitude.is_finite() || longitude.abs() > LONGITUDE_MAX {
            return Err(LocationError::LongitudeOutOfRange(longitude));
        }
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(LocationError::InvalidThreshold(threshold));
        }
        Ok(Self {
            latitude,
            longitude,
            threshold,
        })
    }

    pub const fn latitude(&self) -> f64 {
        self.latitude
    }

    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn distance_to(&self, other: &GpsLocation) -> f64 {
        crate::proximity::haversine_distance(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Bands are measured with `self`'s threshold.
    pub fn proximity_to(&self, other: &GpsLocation) -> LocationProximity {
        crate::proximity::gps_proximity(self.distance_to(other), self.threshold)
    }
}

impl Encode for GpsLocation {
    fn size_hint(&self) -> usize {
        24
    }

    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        self.latitude.to_bits().encode_to(dest);
        self.longitude.to_bits().encode_to(dest);
        self.threshold.to_bits().encode_to(dest);
    }
}

impl EncodeLike for GpsLocation {}

impl Decode for GpsLocation {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let latitude = f64::from_bits(u64::decode(input)?);
        let longitude = f64::from_bits(u64::decode(input)?);
        let threshold = f64::from_bits(u64::decode(input)?);
        Self::new(latitude, longitude, threshold).map_err(|_| CodecError::from("invalid GPS location"))
    }
}

/// A full Open Location Code with its decoded cell.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OlcLocation {
    code: String,
    #[serde(skip)]
    area: CodeArea,
}

impl OlcLocation {
    pub fn new(code: &str) -> LocationResult<Self> {
        let code = olc::normalize(code)?;
        let area = olc::decode(&code)?;
        Ok(Self { code, area })
    }

    /// Cell containing the given point at `digits` precision.
    pub fn from_coordinates(latitude: f64, longitude: f64, digits: usize) -> LocationResult<Self> {
        let digits = digits.max(OLC_MIN_DIGITS);
        Self::new(&olc::encode(latitude, longitude, digits)?)
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub const fn area(&self) -> &CodeArea {
        &self.area
    }

    pub fn digits(&self) -> String {
        self.code.chars().filter(|c| *c != crate::constants::OLC_SEPARATOR).collect()
    }

    /// True if one cell is the other or lies inside it.
    pub fn overlaps(&self, other: &OlcLocation) -> bool {
        let (a, b) = (self.digits(), other.digits());
        a.starts_with(&b) || b.starts_with(&a)
    }

    pub fn proximity_to(&self, other: &OlcLocation) -> LocationResult<LocationProximity> {
        crate::proximity::olc_proximity(self, other)
    }
}

impl Encode for OlcLocation {
    fn size_hint(&self) -> usize {
        self.code.size_hint()
    }

    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        self.code.encode_to(dest);
    }
}

impl EncodeLike for OlcLocation {}

impl Decode for OlcLocation {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        let code = String::decode(input)?;
        Self::new(&code).map_err(|_| CodecError::from("invalid open location code"))
    }
}
