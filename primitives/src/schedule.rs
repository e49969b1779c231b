//! Seed-derived fragment schedule.
//!
//! The beacon and any verifier derive the same sequence of broadcast periods
//! from `(seed, fragment_count, min, max)`. The algorithm is fixed here and
//! must stay bit-for-bit stable:
//!
//! 1. `ChaCha8Rng::seed_from_u64(seed as u64)`.
//! 2. Split `[min, max]` into `count` sub-ranges of `width = (max - min) / count`
//!    and draw `lo + next_u64() % width` from each (`lo` when `width == 0`).
//! 3. Fisher-Yates from the last index down to 1 with `j = next_u64() % (i + 1)`.
//!
//! Do not replace these steps with `SliceRandom::shuffle` or `gen_range`.

use alloc::vec::Vec;

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::errors::ScheduleError;
use crate::types::LocationProofProperties;

pub fn fragment_periods(seed: i64, fragment_count: u32, min_period_ms: u64, max_period_ms: u64) -> Result<Vec<u64>, ScheduleError> {
    if fragment_count == 0 {
        return Err(ScheduleError::EmptySchedule);
    }
    if min_period_ms > max_period_ms || min_period_ms == 0 {
        return Err(ScheduleError::InvalidPeriodRange {
            min: min_period_ms,
            max: max_period_ms,
        });
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed as u64);
    let count = u64::from(fragment_count);
    let width = (max_period_ms - min_period_ms) / count;

    let mut periods: Vec<u64> = (0..count)
        .map(|i| {
            let lo = min_period_ms + i * width;
            if width == 0 {
                lo
            } else {
                lo + rng.next_u64() % width
            }
        })
        .collect();

    for i in (1..periods.len()).rev() {
        let j = (rng.next_u64() % (i as u64 + 1)) as usize;
        periods.swap(i, j);
    }

    Ok(periods)
}

/// One fragment of an expected broadcast, relative to the run start.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FragmentWindow {
    /// 1-based, as reported by the device.
    pub index: u32,
    pub period_ms: u64,
    pub start_offset_ms: u64,
    pub end_offset_ms: u64,
}

/// What a beacon should have emitted for a given authorization.
pub fn expected_schedule(
    properties: &LocationProofProperties,
    min_period_ms: u64,
    max_period_ms: u64,
) -> Result<Vec<FragmentWindow>, ScheduleError> {
    let periods = fragment_periods(properties.seed, properties.fragment_count, min_period_ms, max_period_ms)?;
    let length = properties.fragment_length_ms;

    Ok(periods
        .into_iter()
        .enumerate()
        .map(|(i, period_ms)| {
            let start = (i as u64).saturating_mul(length);
            FragmentWindow {
                index: i as u32 + 1,
                period_ms,
                start_offset_ms: start,
                end_offset_ms: start.saturating_add(length),
            }
        })
        .collect())
}
