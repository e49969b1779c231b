//! Identities, certificates and ed25519 signatures for protocol envelopes.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use parity_scale_codec::{Decode, Encode};
use serde::{Serialize, Serializer};
use sp_core::hexdisplay::HexDisplay;
use sp_core::{blake2_256, ed25519, Pair as _, H256};

// Domain separators for hash functions
pub const DOMAIN_ENVELOPE: &[u8] = b"7ay:locus:envelope:v1";
pub const DOMAIN_CERTIFICATE: &[u8] = b"7ay:locus:cert:v1";

/// Hash with domain separation.
#[inline]
pub fn hash_with_domain(domain: &[u8], data: &[u8]) -> H256 {
    let mut input = Vec::with_capacity(domain.len() + data.len());
    input.extend_from_slice(domain);
    input.extend_from_slice(data);
    H256(blake2_256(&input))
}

// =============================================================================
// Identity & Signatures
// =============================================================================

/// A participant, named by its ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode, Default)]
pub struct Identity(pub [u8; 32]);

impl Identity {
    pub const fn from_raw(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// First four bytes in hex, for log lines.
    pub fn short(&self) -> String {
        format!("{}", HexDisplay::from(&[self.0[0], self.0[1], self.0[2], self.0[3]]))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HexDisplay::from(&self.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({}..)", self.short())
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct SignatureBytes(pub [u8; 64]);

impl fmt::Debug for SignatureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignatureBytes({}..)", HexDisplay::from(&[self.0[0], self.0[1], self.0[2], self.0[3]]))
    }
}

impl Serialize for SignatureBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&HexDisplay::from(&self.0))
    }
}

/// Single-use value carried by every request and response.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Encode, Decode, Debug)]
pub struct Nonce(pub H256);

impl Nonce {
    pub fn random() -> Self {
        Self(H256(rand::random::<[u8; 32]>()))
    }
}

/// Signing key of a participant.
#[derive(Clone)]
pub struct Keypair {
    pair: ed25519::Pair,
}

impl Keypair {
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            pair: ed25519::Pair::from_seed(seed),
        }
    }

    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    pub fn identity(&self) -> Identity {
        let mut raw = [0u8; 32];
        raw.copy_from_slice(self.pair.public().as_ref());
        Identity(raw)
    }

    pub fn sign(&self, message: &[u8]) -> SignatureBytes {
        let signature = self.pair.sign(message);
        let mut raw = [0u8; 64];
        raw.copy_from_slice(signature.as_ref());
        SignatureBytes(raw)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair").field("identity", &self.identity()).finish()
    }
}

pub fn verify(signer: &Identity, message: &[u8], signature: &SignatureBytes) -> bool {
    let public = ed25519::Public::from_raw(signer.0);
    let signature = ed25519::Signature::from_raw(signature.0);
    ed25519::Pair::verify(&signature, message, &public)
}

// =============================================================================
// Certificates
// =============================================================================

/// Binds an identity to an issuing authority until `not_after` (unix ms).
#[derive(Clone, PartialEq, Eq, Encode, Decode, Debug, Serialize)]
pub struct Certificate {
    pub subject: Identity,
    pub issuer: Identity,
    pub not_after: u64,
    pub signature: SignatureBytes,
}

impl Certificate {
    fn digest(subject: &Identity, issuer: &Identity, not_after: u64) -> H256 {
        hash_with_domain(DOMAIN_CERTIFICATE, &(subject, issuer, not_after).encode())
    }

    pub fn verify(&self, authority: &Identity, now: u64) -> bool {
        self.issuer == *authority
            && now < self.not_after
            && verify(
                &self.issuer,
                Self::digest(&self.subject, &self.issuer, self.not_after).as_bytes(),
                &self.signature,
            )
    }
}

/// Issues certificates for participants of one deployment.
#[derive(Clone, Debug)]
pub struct CertificateAuthority {
    keypair: Keypair,
}

impl CertificateAuthority {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn identity(&self) -> Identity {
        self.keypair.identity()
    }

    pub fn issue(&self, subject: Identity, not_after: u64) -> Certificate {
        let issuer = self.identity();
        let digest = Certificate::digest(&subject, &issuer, not_after);
        Certificate {
            subject,
            issuer,
            not_after,
            signature: self.keypair.sign(digest.as_bytes()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_with_domain_separates() {
        let a = hash_with_domain(DOMAIN_ENVELOPE, b"payload");
        let b = hash_with_domain(DOMAIN_CERTIFICATE, b"payload");
        assert_ne!(a, b);
        assert_eq!(a, hash_with_domain(DOMAIN_ENVELOPE, b"payload"));
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::from_seed(&[7u8; 32]);
        let signature = keypair.sign(b"hello");
        assert!(verify(&keypair.identity(), b"hello", &signature));
        assert!(!verify(&keypair.identity(), b"hullo", &signature));

        let other = Keypair::from_seed(&[8u8; 32]);
        assert!(!verify(&other.identity(), b"hello", &signature));
    }

    #[test]
    fn test_identity_is_deterministic_from_seed() {
        assert_eq!(
            Keypair::from_seed(&[1u8; 32]).identity(),
            Keypair::from_seed(&[1u8; 32]).identity()
        );
        assert_eq!(Identity::from_raw([0xab; 32]).short(), "abababab");
    }

    #[test]
    fn test_certificate_verification() {
        let authority = CertificateAuthority::new(Keypair::from_seed(&[1u8; 32]));
        let subject = Keypair::from_seed(&[2u8; 32]).identity();
        let cert = authority.issue(subject, 10_000);

        assert!(cert.verify(&authority.identity(), 9_999));
        assert!(!cert.verify(&authority.identity(), 10_000));

        let rogue = CertificateAuthority::new(Keypair::from_seed(&[3u8; 32]));
        assert!(!cert.verify(&rogue.identity(), 0));

        let mut forged = cert.clone();
        forged.not_after = 20_000;
        assert!(!forged.verify(&authority.identity(), 15_000));
    }

    #[test]
    fn test_nonces_differ() {
        assert_ne!(Nonce::random(), Nonce::random());
    }
}
