//! Core primitives for the Locus location proof protocol.

#![deny(unsafe_code)]

extern crate alloc;

pub mod constants;
pub mod crypto;
pub mod errors;
pub mod location;
pub mod messages;
pub mod olc;
pub mod proximity;
pub mod schedule;
pub mod types;

pub use constants::*;
pub use errors::{LocationError, LocationResult, ScheduleError};
pub use location::{GpsLocation, Location, LocationKind, OlcLocation};
pub use proximity::{LocationProximity, ProximityCode};
pub use schedule::{expected_schedule, fragment_periods, FragmentWindow};
pub use types::*;

// Re-export crypto and messages with explicit names to avoid conflicts
pub use crypto::{
    hash_with_domain, Certificate, CertificateAuthority, Identity, Keypair, Nonce, SignatureBytes,
    DOMAIN_CERTIFICATE, DOMAIN_ENVELOPE,
};
pub use messages::{
    Authorization, AuthorizationRequest, Header, Message, ProofAck, ProofInfo, ProofInfoRequest,
    ProofRequest, Signed, SignedAuthorization,
};
