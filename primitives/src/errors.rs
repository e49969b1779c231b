//! Error types for location claims and fragment schedules.

use crate::location::LocationKind;

pub type LocationResult<T> = Result<T, LocationError>;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum LocationError {
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("threshold {0} must be a finite, non-negative distance in meters")]
    InvalidThreshold(f64),

    #[error("invalid open location code {code:?}: {reason}")]
    InvalidCode { code: String, reason: &'static str },

    #[error("open location code {code:?} has {digits} digits, at least {required} required")]
    InsufficientPrecision { code: String, digits: usize, required: usize },

    #[error("cannot compare {left} location with {right} location")]
    VariantMismatch { left: LocationKind, right: LocationKind },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("fragment count must be positive")]
    EmptySchedule,

    #[error("period range [{min}, {max}] is empty")]
    InvalidPeriodRange { min: u64, max: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_value() {
        let err = LocationError::LatitudeOutOfRange(91.0);
        assert_eq!(err.to_string(), "latitude 91 outside [-90, 90]");

        let err = LocationError::VariantMismatch {
            left: LocationKind::Gps,
            right: LocationKind::Olc,
        };
        assert_eq!(err.to_string(), "cannot compare GPS location with OLC location");
    }

    #[test]
    fn schedule_errors() {
        let err = ScheduleError::InvalidPeriodRange { min: 10, max: 5 };
        assert!(err.to_string().contains("[10, 5]"));
    }
}
