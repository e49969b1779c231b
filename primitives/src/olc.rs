//! Open Location Code codec.
//!
//! Works in integer units at the finest grid precision so that decoding a
//! code and re-encoding any point of its area always yields the same code.
//! Only full codes of at least [`OLC_MIN_DIGITS`] digits are accepted: the
//! proximity engine never sees padded or shortened codes.

use alloc::string::String;
use alloc::vec::Vec;

use crate::constants::{
    LATITUDE_MAX, LONGITUDE_MAX, OLC_ALPHABET, OLC_MAX_DIGITS, OLC_MIN_DIGITS, OLC_PADDING,
    OLC_PAIR_DIGITS, OLC_SEPARATOR, OLC_SEPARATOR_POSITION,
};
use crate::errors::{LocationError, LocationResult};

const ENCODING_BASE: i64 = 20;
const GRID_COLUMNS: i64 = 4;
const GRID_ROWS: i64 = 5;
const GRID_DIGITS: usize = OLC_MAX_DIGITS - OLC_PAIR_DIGITS;

// Units per degree at 15 digits: 8000 * 5^5 and 8000 * 4^5.
const LAT_PRECISION: i64 = 25_000_000;
const LNG_PRECISION: i64 = 8_192_000;

// Place value of the first pair digit (20 degrees) in final units.
const FIRST_LAT_PLACE: i64 = 20 * LAT_PRECISION;
const FIRST_LNG_PLACE: i64 = 20 * LNG_PRECISION;

/// Rectangular cell denoted by a code, in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CodeArea {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
    pub digits: usize,
}

impl CodeArea {
    pub fn center_latitude(&self) -> f64 {
        (self.south + self.north) / 2.0
    }

    pub fn center_longitude(&self) -> f64 {
        (self.west + self.east) / 2.0
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.south && latitude < self.north && longitude >= self.west && longitude < self.east
    }
}

/// Canonical form: upper case, separator after the eighth digit.
pub fn normalize(code: &str) -> LocationResult<String> {
    let digits = parse_digits(code)?;
    Ok(format_digits(&digits))
}

/// Encode a point at the given digit count.
pub fn encode(latitude: f64, longitude: f64, digits: usize) -> LocationResult<String> {
    if !(OLC_MIN_DIGITS..=OLC_MAX_DIGITS).contains(&digits) {
        return Err(LocationError::InsufficientPrecision {
            code: String::new(),
            digits,
            required: OLC_MIN_DIGITS,
        });
    }
    if !latitude.is_finite() {
        return Err(LocationError::LatitudeOutOfRange(latitude));
    }
    if !longitude.is_finite() {
        return Err(LocationError::LongitudeOutOfRange(longitude));
    }

    let latitude = latitude.clamp(-LATITUDE_MAX, LATITUDE_MAX);
    let longitude = (longitude + LONGITUDE_MAX).rem_euclid(2.0 * LONGITUDE_MAX) - LONGITUDE_MAX;

    let lat_span = 2 * LATITUDE_MAX as i64 * LAT_PRECISION;
    let lng_span = 2 * LONGITUDE_MAX as i64 * LNG_PRECISION;
    // The north pole belongs to the topmost cell.
    let mut lat_val = (((latitude + LATITUDE_MAX) * LAT_PRECISION as f64).floor() as i64).clamp(0, lat_span - 1);
    let mut lng_val = (((longitude + LONGITUDE_MAX) * LNG_PRECISION as f64).floor() as i64).clamp(0, lng_span - 1);

    let mut reversed: Vec<u8> = Vec::with_capacity(OLC_MAX_DIGITS);
    for _ in 0..GRID_DIGITS {
        let row = lat_val % GRID_ROWS;
        let column = lng_val % GRID_COLUMNS;
        reversed.push((row * GRID_COLUMNS + column) as u8);
        lat_val /= GRID_ROWS;
        lng_val /= GRID_COLUMNS;
    }
    for _ in 0..OLC_PAIR_DIGITS / 2 {
        reversed.push((lng_val % ENCODING_BASE) as u8);
        reversed.push((lat_val % ENCODING_BASE) as u8);
        lat_val /= ENCODING_BASE;
        lng_val /= ENCODING_BASE;
    }
    reversed.reverse();
    reversed.truncate(digits);

    Ok(format_digits(&reversed))
}

/// Decode a full code into the area it denotes.
pub fn decode(code: &str) -> LocationResult<CodeArea> {
    let digits = parse_digits(code)?;

    let mut lat: i64 = 0;
    let mut lng: i64 = 0;
    let mut lat_place = FIRST_LAT_PLACE;
    let mut lng_place = FIRST_LNG_PLACE;

    for (i, pair) in digits[..OLC_PAIR_DIGITS].chunks(2).enumerate() {
        if i > 0 {
            lat_place /= ENCODING_BASE;
            lng_place /= ENCODING_BASE;
        }
        lat += i64::from(pair[0]) * lat_place;
        lng += i64::from(pair[1]) * lng_place;
    }

    for &digit in &digits[OLC_PAIR_DIGITS..] {
        lat_place /= GRID_ROWS;
        lng_place /= GRID_COLUMNS;
        lat += (i64::from(digit) / GRID_COLUMNS) * lat_place;
        lng += (i64::from(digit) % GRID_COLUMNS) * lng_place;
    }

    let south = lat as f64 / LAT_PRECISION as f64 - LATITUDE_MAX;
    let west = lng as f64 / LNG_PRECISION as f64 - LONGITUDE_MAX;

    Ok(CodeArea {
        south,
        west,
        north: south + lat_place as f64 / LAT_PRECISION as f64,
        east: west + lng_place as f64 / LNG_PRECISION as f64,
        digits: digits.len(),
    })
}

fn parse_digits(code: &str) -> LocationResult<Vec<u8>> {
    let invalid = |reason| LocationError::InvalidCode {
        code: String::from(code),
        reason,
    };

    let upper = code.to_ascii_uppercase();
    let separators: Vec<usize> = upper.match_indices(OLC_SEPARATOR).map(|(i, _)| i).collect();
    match separators.as_slice() {
        [] => {}
        [position] if *position == OLC_SEPARATOR_POSITION => {}
        [_] => return Err(invalid("separator must follow the eighth digit")),
        _ => return Err(invalid("more than one separator")),
    }

    if upper.contains(OLC_PADDING) {
        return Err(invalid("padded codes are not full precision"));
    }

    let digits = upper
        .bytes()
        .filter(|b| *b != OLC_SEPARATOR as u8)
        .map(|b| {
            OLC_ALPHABET
                .iter()
                .position(|a| *a == b)
                .map(|p| p as u8)
                .ok_or_else(|| invalid("illegal character"))
        })
        .collect::<LocationResult<Vec<u8>>>()?;

    if digits.len() < OLC_MIN_DIGITS {
        return Err(LocationError::InsufficientPrecision {
            code: String::from(code),
            digits: digits.len(),
            required: OLC_MIN_DIGITS,
        });
    }
    if digits.len() > OLC_MAX_DIGITS {
        return Err(invalid("too many digits"));
    }

    // First pair spans 20 degrees: 9 latitude rows, 18 longitude columns.
    if i64::from(digits[0]) * ENCODING_BASE >= 2 * LATITUDE_MAX as i64
        || i64::from(digits[1]) * ENCODING_BASE >= 2 * LONGITUDE_MAX as i64
    {
        return Err(invalid("first pair outside the valid range"));
    }

    Ok(digits)
}

fn format_digits(digits: &[u8]) -> String {
    let mut out = String::with_capacity(digits.len() + 1);
    for (i, d) in digits.iter().enumerate() {
        if i == OLC_SEPARATOR_POSITION {
            out.push(OLC_SEPARATOR);
        }
        out.push(char::from(OLC_ALPHABET[usize::from(*d)]));
    }
    out
}
