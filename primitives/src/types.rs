//! Core domain types for the Locus location proof protocol.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use parity_scale_codec::{Decode, Encode, EncodeLike, Error as CodecError, Input, Output};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::constants::run_duration_ms;
use crate::location::Location;

// =============================================================================
// Proof Identity
// =============================================================================

/// Short random token naming one location-proof attempt.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Debug)]
pub struct ProofId(pub String);

impl ProofId {
    pub fn random<R: Rng + ?Sized>(rng: &mut R, length: usize) -> Self {
        let token: String = rng
            .sample_iter(&Alphanumeric)
            .take(length.max(1))
            .map(char::from)
            .collect();
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProofId {
    fn from(value: &str) -> Self {
        Self(String::from(value))
    }
}

impl fmt::Display for ProofId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parameters of one proof run, fixed at authorization time.
///
/// The seed drives the fragment schedule, so a verifier holding these
/// properties can recompute what the beacons emitted.
#[derive(Clone, PartialEq, Eq, Encode, Decode, Serialize, Debug)]
pub struct LocationProofProperties {
    pub identifier: ProofId,
    pub fragment_count: u32,
    pub fragment_length_ms: u64,
    pub seed: i64,
}

impl LocationProofProperties {
    pub fn generate<R: Rng + ?Sized>(
        rng: &mut R,
        identifier: ProofId,
        fragment_count: u32,
        fragment_length_ms: u64,
    ) -> Self {
        Self {
            identifier,
            fragment_count: fragment_count.max(1),
            fragment_length_ms: fragment_length_ms.max(1),
            seed: rng.gen(),
        }
    }

    pub const fn run_duration_ms(&self) -> u64 {
        run_duration_ms(self.fragment_count, self.fragment_length_ms)
    }
}

// =============================================================================
// Beacons
// =============================================================================

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Deserialize, Debug)]
pub enum BeaconKind {
    Light,
    Sound,
}

impl core::str::FromStr for BeaconKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "light" | "led" => Ok(Self::Light),
            "sound" | "audio" | "buzzer" => Ok(Self::Sound),
            _ => Err(format!("Unknown beacon kind: {}", s)),
        }
    }
}

/// Address of a beacon+witness pair in the knowledge tree.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Serialize, Debug)]
pub struct BeaconRef {
    pub address: String,
    pub kind: BeaconKind,
}

impl BeaconRef {
    pub fn new(address: impl Into<String>, kind: BeaconKind) -> Self {
        Self {
            address: address.into(),
            kind,
        }
    }
}

impl fmt::Display for BeaconRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", self.address, self.kind)
    }
}

/// A beacon as published to the orchestrator for selection.
#[derive(Clone, PartialEq, Debug)]
pub struct BeaconDescriptor {
    pub reference: BeaconRef,
    pub location: Location,
}

// =============================================================================
// Signals
// =============================================================================

/// One witness observation picked up while a proof was running.
#[derive(Clone, PartialEq, Serialize, Debug)]
pub struct Signal {
    pub beacon: BeaconRef,
    /// Fragment the device reported when the sample was picked up, -1 if idle.
    pub fragment: i32,
    pub intensity: f64,
    pub observed_at: u64,
}

impl Encode for Signal {
    fn size_hint(&self) -> usize {
        self.beacon.size_hint() + 4 + 8 + 8
    }

    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        self.beacon.encode_to(dest);
        self.fragment.encode_to(dest);
        self.intensity.to_bits().encode_to(dest);
        self.observed_at.encode_to(dest);
    }
}

impl EncodeLike for Signal {}

impl Decode for Signal {
    fn decode<I: Input>(input: &mut I) -> Result<Self, CodecError> {
        Ok(Self {
            beacon: BeaconRef::decode(input)?,
            fragment: i32::decode(input)?,
            intensity: f64::from_bits(u64::decode(input)?),
            observed_at: u64::decode(input)?,
        })
    }
}

/// Group signals per fragment, in fragment order. Idle samples are dropped.
pub fn signals_by_fragment(signals: &[Signal]) -> Vec<(i32, Vec<&Signal>)> {
    let mut grouped: Vec<(i32, Vec<&Signal>)> = Vec::new();
    let mut ordered: Vec<&Signal> = signals.iter().filter(|s| s.fragment > 0).collect();
    ordered.sort_by_key(|s| (s.fragment, s.observed_at));
    for signal in ordered {
        match grouped.last_mut() {
            Some((fragment, bucket)) if *fragment == signal.fragment => bucket.push(signal),
            _ => grouped.push((signal.fragment, alloc::vec![signal])),
        }
    }
    grouped
}

// =============================================================================
// Validity
// =============================================================================

/// Half-open window `[not_before, not_after)` in unix milliseconds.
#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode, Serialize, Debug)]
pub struct ValidityWindow {
    pub not_before: u64,
    pub not_after: u64,
}

impl ValidityWindow {
    pub const fn starting_at(now: u64, duration_ms: u64) -> Self {
        Self {
            not_before: now,
            not_after: now.saturating_add(duration_ms),
        }
    }

    pub const fn contains(&self, now: u64) -> bool {
        now >= self.not_before && now < self.not_after
    }

    pub const fn has_elapsed(&self, now: u64) -> bool {
        now >= self.not_after
    }
}
