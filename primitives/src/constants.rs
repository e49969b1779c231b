//! Protocol constants shared by the orchestrator, beacon devices and verifiers.

// Geodesy
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
pub const LATITUDE_MAX: f64 = 90.0;
pub const LONGITUDE_MAX: f64 = 180.0;

// GPS proximity bands
pub const GPS_FAR_DECAY: f64 = 0.05;

// OLC proximity bands
pub const OLC_NEIGHBOR_CONFIDENCE: f64 = 0.5;
pub const OLC_FAR_GROWTH_PER_KM: f64 = 0.4;
/// Far confidence is kept strictly below certainty.
pub const OLC_FAR_CONFIDENCE_CAP: f64 = 1.0 - f64::EPSILON;

// Open Location Code format
pub const OLC_ALPHABET: &[u8; 20] = b"23456789CFGHJMPQRVWX";
pub const OLC_SEPARATOR: char = '+';
pub const OLC_SEPARATOR_POSITION: usize = 8;
pub const OLC_PADDING: char = '0';
pub const OLC_PAIR_DIGITS: usize = 10;
pub const OLC_MAX_DIGITS: usize = 15;
/// Codes below this length are not precise enough to locate a beacon.
pub const OLC_MIN_DIGITS: usize = 10;

// Fragment schedule defaults (verifier contract)
pub const MIN_BEACON_PERIOD_MS: u64 = 50;
pub const MAX_BEACON_PERIOD_MS: u64 = 500;
pub const WITNESS_SAMPLING_PERIOD_MS: u64 = 5;

// Authorization policy defaults
pub const DEFAULT_FRAGMENT_COUNT: u32 = 5;
pub const DEFAULT_FRAGMENT_LENGTH_MS: u64 = 2_000;
pub const DEFAULT_AUTHORIZATION_VALIDITY_MS: u64 = 5 * 60 * 1_000;
pub const DEFAULT_IDENTIFIER_LENGTH: usize = 8;
/// Slack added to a run before the driver stops the devices.
pub const DEFAULT_RUN_GRACE_MS: u64 = 500;

/// Idle value for every numeric beacon control field.
pub const SENTINEL: i64 = -1;

/// Total broadcast time of one proof run.
#[inline]
pub const fn run_duration_ms(fragment_count: u32, fragment_length_ms: u64) -> u64 {
    (fragment_count as u64).saturating_mul(fragment_length_ms)
}
