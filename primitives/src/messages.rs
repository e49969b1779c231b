//! Request/response payloads of the three orchestrator exchanges.
//!
//! Every payload starts with a [`Header`]; [`Signed`] wraps a payload with the
//! sender's signature over its domain-separated SCALE encoding.

use alloc::vec::Vec;

use parity_scale_codec::{Decode, Encode};
use sp_core::H256;

use crate::crypto::{self, hash_with_domain, Certificate, Identity, Keypair, Nonce, SignatureBytes, DOMAIN_ENVELOPE};
use crate::location::Location;
use crate::types::{BeaconKind, BeaconRef, LocationProofProperties, ProofId, Signal, ValidityWindow};

#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug)]
pub struct Header {
    pub sender: Identity,
    pub receiver: Identity,
    pub certificate: Certificate,
    pub nonce: Nonce,
}

impl Header {
    /// Fresh header from the holder of `certificate` to `receiver`.
    pub fn new(certificate: Certificate, receiver: Identity) -> Self {
        Self {
            sender: certificate.subject,
            receiver,
            certificate,
            nonce: Nonce::random(),
        }
    }
}

pub trait Message: Encode {
    fn header(&self) -> &Header;
}

/// Digest a payload is signed over.
pub fn envelope_digest<T: Encode>(payload: &T) -> H256 {
    hash_with_domain(DOMAIN_ENVELOPE, &payload.encode())
}

#[derive(Clone, PartialEq, Encode, Decode, Debug)]
pub struct Signed<T> {
    pub payload: T,
    pub signature: SignatureBytes,
}

impl<T: Message> Signed<T> {
    pub fn sign(payload: T, keypair: &Keypair) -> Self {
        let signature = keypair.sign(envelope_digest(&payload).as_bytes());
        Self { payload, signature }
    }

    pub fn from_parts(payload: T, signature: SignatureBytes) -> Self {
        Self { payload, signature }
    }

    pub fn header(&self) -> &Header {
        self.payload.header()
    }

    pub fn digest(&self) -> H256 {
        envelope_digest(&self.payload)
    }

    /// Checks the signature against the header's sender.
    pub fn verify(&self) -> bool {
        crypto::verify(&self.header().sender, self.digest().as_bytes(), &self.signature)
    }
}

impl<T: Encode> Signed<T> {
    /// Exact wire bytes, for byte-for-byte comparison of envelopes.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode()
    }
}

// =============================================================================
// Authorization
// =============================================================================

#[derive(Clone, PartialEq, Encode, Decode, Debug)]
pub struct AuthorizationRequest {
    pub header: Header,
    pub location: Location,
    pub beacon_kinds: Vec<BeaconKind>,
}

#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug)]
pub struct Authorization {
    pub header: Header,
    pub prover: Identity,
    pub properties: LocationProofProperties,
    pub beacons: Vec<BeaconRef>,
    pub validity: ValidityWindow,
}

impl Authorization {
    pub fn orchestrator(&self) -> Identity {
        self.header.sender
    }

    pub fn identifier(&self) -> &ProofId {
        &self.properties.identifier
    }
}

pub type SignedAuthorization = Signed<Authorization>;

// =============================================================================
// Proof
// =============================================================================

#[derive(Clone, PartialEq, Encode, Decode, Debug)]
pub struct ProofRequest {
    pub header: Header,
    pub authorization: SignedAuthorization,
}

#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug)]
pub struct ProofAck {
    pub header: Header,
    pub identifier: ProofId,
    pub beacons_started: u32,
}

// =============================================================================
// Proof Information
// =============================================================================

#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug)]
pub struct ProofInfoRequest {
    pub header: Header,
    pub identifier: ProofId,
}

#[derive(Clone, PartialEq, Encode, Decode, Debug)]
pub struct ProofInfo {
    pub header: Header,
    pub identifier: ProofId,
    pub signals: Vec<Signal>,
}

macro_rules! impl_message {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Message for $ty {
                fn header(&self) -> &Header {
                    &self.header
                }
            }
        )*
    };
}

impl_message!(AuthorizationRequest, Authorization, ProofRequest, ProofAck, ProofInfoRequest, ProofInfo);
