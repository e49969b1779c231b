//! Envelope validation and signing.
//!
//! Checks run in a fixed order and stop at the first failure: receiver,
//! certificate, nonce freshness, sender rule, signature.
//! A nonce is claimed only once every check has passed; of two concurrent
//! copies of one envelope, only the first claim succeeds.

use std::collections::HashSet;
use std::sync::Arc;

use locus_primitives::messages::envelope_digest;
use locus_primitives::{crypto, Certificate, Header, Identity, Keypair, Message, Nonce, SignatureBytes, Signed};
use parking_lot::{Mutex, RwLock};

use crate::clock::Clock;
use crate::errors::ValidationError;

/// Outcome of the header checks, one flag per check.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidationReport {
    pub receiver_ok: bool,
    pub cert_ok: bool,
    pub nonce_ok: bool,
    pub sender_known_ok: bool,
}

/// Who may send a given request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenderRule {
    Any,
    Known,
    Only(Identity),
}

impl ValidationReport {
    pub fn into_result(self, header: &Header, rule: SenderRule) -> Result<(), ValidationError> {
        if !self.receiver_ok {
            return Err(ValidationError::WrongReceiver {
                found: header.receiver,
            });
        }
        if !self.cert_ok {
            return Err(ValidationError::InvalidCertificate);
        }
        if !self.nonce_ok {
            return Err(ValidationError::StaleNonce);
        }
        match rule {
            SenderRule::Any => {}
            SenderRule::Known if !self.sender_known_ok => {
                return Err(ValidationError::UnknownSender(header.sender));
            }
            SenderRule::Known => {}
            SenderRule::Only(allowed) if header.sender != allowed => {
                return Err(ValidationError::UnauthorizedSender(header.sender));
            }
            SenderRule::Only(_) => {}
        }
        Ok(())
    }
}

pub trait MessageValidator: Send + Sync {
    fn local_identity(&self) -> Identity;

    /// Certificate placed in every outgoing header.
    fn certificate(&self) -> Certificate;

    fn validate(&self, header: &Header) -> ValidationReport;

    fn verify_signature(&self, signer: &Identity, digest: &[u8], signature: &SignatureBytes) -> bool;

    fn sign(&self, digest: &[u8]) -> SignatureBytes;

    fn register_sender(&self, identity: Identity);

    /// Marks `nonce` as used. Returns false if it already was.
    fn record_nonce(&self, nonce: Nonce) -> bool;
}

/// Runs every check on `envelope` and claims its nonce on success.
pub fn validate_envelope<T: Message>(
    validator: &dyn MessageValidator,
    envelope: &Signed<T>,
    rule: SenderRule,
) -> Result<(), ValidationError> {
    let header = envelope.header();
    validator.validate(header).into_result(header, rule)?;

    if !validator.verify_signature(&header.sender, envelope.digest().as_bytes(), &envelope.signature) {
        return Err(ValidationError::BadSignature);
    }

    if !validator.record_nonce(header.nonce) {
        return Err(ValidationError::StaleNonce);
    }
    Ok(())
}

pub fn sign_envelope<T: Message>(validator: &dyn MessageValidator, payload: T) -> Signed<T> {
    let signature = validator.sign(envelope_digest(&payload).as_bytes());
    Signed::from_parts(payload, signature)
}

/// Validator over an ed25519 keypair, a certificate authority and an
/// in-memory set of known identities and seen nonces.
pub struct KeyringValidator {
    keypair: Keypair,
    certificate: Certificate,
    authority: Identity,
    clock: Arc<dyn Clock>,
    known: RwLock<HashSet<Identity>>,
    nonces: Mutex<HashSet<Nonce>>,
}

impl KeyringValidator {
    pub fn new(keypair: Keypair, certificate: Certificate, authority: Identity, clock: Arc<dyn Clock>) -> Self {
        Self {
            keypair,
            certificate,
            authority,
            clock,
            known: RwLock::new(HashSet::new()),
            nonces: Mutex::new(HashSet::new()),
        }
    }

    pub fn is_known(&self, identity: &Identity) -> bool {
        self.known.read().contains(identity)
    }

    pub fn seen_nonces(&self) -> usize {
        self.nonces.lock().len()
    }
}

impl MessageValidator for KeyringValidator {
    fn local_identity(&self) -> Identity {
        self.keypair.identity()
    }

    fn certificate(&self) -> Certificate {
        self.certificate.clone()
    }

    fn validate(&self, header: &Header) -> ValidationReport {
        let now = self.clock.now_ms();
        ValidationReport {
            receiver_ok: header.receiver == self.local_identity(),
            cert_ok: header.certificate.subject == header.sender && header.certificate.verify(&self.authority, now),
            nonce_ok: !self.nonces.lock().contains(&header.nonce),
            sender_known_ok: self.is_known(&header.sender),
        }
    }

    fn verify_signature(&self, signer: &Identity, digest: &[u8], signature: &SignatureBytes) -> bool {
        crypto::verify(signer, digest, signature)
    }

    fn sign(&self, digest: &[u8]) -> SignatureBytes {
        self.keypair.sign(digest)
    }

    fn register_sender(&self, identity: Identity) {
        if self.known.write().insert(identity) {
            log::debug!("Registered sender {}", identity.short());
        }
    }

    fn record_nonce(&self, nonce: Nonce) -> bool {
        self.nonces.lock().insert(nonce)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::clock::ManualClock;
    use locus_primitives::{CertificateAuthority, ProofId, ProofInfoRequest};

    struct Fixture {
        authority: CertificateAuthority,
        validator: KeyringValidator,
        clock: Arc<ManualClock>,
    }

    fn fixture() -> Fixture {
        let authority = CertificateAuthority::new(Keypair::from_seed(&[1u8; 32]));
        let keypair = Keypair::from_seed(&[2u8; 32]);
        let certificate = authority.issue(keypair.identity(), 1_000_000);
        let clock = Arc::new(ManualClock::new(1_000));
        let validator = KeyringValidator::new(keypair, certificate, authority.identity(), clock.clone());
        Fixture {
            authority,
            validator,
            clock,
        }
    }

    fn request(fx: &Fixture, seed: u8, not_after: u64) -> Signed<ProofInfoRequest> {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let certificate = fx.authority.issue(keypair.identity(), not_after);
        Signed::sign(
            ProofInfoRequest {
                header: Header::new(certificate, fx.validator.local_identity()),
                identifier: ProofId::from("abc"),
            },
            &keypair,
        )
    }

    #[test]
    fn test_valid_envelope_records_nonce() {
        let fx = fixture();
        let envelope = request(&fx, 3, 1_000_000);

        assert_eq!(validate_envelope(&fx.validator, &envelope, SenderRule::Any), Ok(()));
        assert_eq!(fx.validator.seen_nonces(), 1);
        assert_eq!(
            validate_envelope(&fx.validator, &envelope, SenderRule::Any),
            Err(ValidationError::StaleNonce)
        );
    }

    #[test]
    fn test_wrong_receiver_checked_first() {
        let fx = fixture();
        let mut envelope = request(&fx, 3, 10);
        envelope.payload.header.receiver = Identity::default();

        assert!(matches!(
            validate_envelope(&fx.validator, &envelope, SenderRule::Known),
            Err(ValidationError::WrongReceiver { .. })
        ));
        assert_eq!(fx.validator.seen_nonces(), 0);
    }

    #[test]
    fn test_expired_certificate() {
        let fx = fixture();
        let envelope = request(&fx, 3, 2_000);
        fx.clock.set(2_000);

        assert_eq!(
            validate_envelope(&fx.validator, &envelope, SenderRule::Any),
            Err(ValidationError::InvalidCertificate)
        );
    }

    #[test]
    fn test_unknown_sender_when_required() {
        let fx = fixture();
        let envelope = request(&fx, 3, 1_000_000);
        let sender = envelope.header().sender;

        assert_eq!(
            validate_envelope(&fx.validator, &envelope, SenderRule::Known),
            Err(ValidationError::UnknownSender(sender))
        );
        assert_eq!(fx.validator.seen_nonces(), 0);

        fx.validator.register_sender(sender);
        assert_eq!(validate_envelope(&fx.validator, &envelope, SenderRule::Known), Ok(()));
    }

    #[test]
    fn test_only_rule_rejects_other_senders() {
        let fx = fixture();
        let envelope = request(&fx, 3, 1_000_000);
        let sender = envelope.header().sender;

        assert_eq!(
            validate_envelope(&fx.validator, &envelope, SenderRule::Only(Identity::default())),
            Err(ValidationError::UnauthorizedSender(sender))
        );
        assert_eq!(fx.validator.seen_nonces(), 0);
        assert_eq!(
            validate_envelope(&fx.validator, &envelope, SenderRule::Only(sender)),
            Ok(())
        );
    }

    #[test]
    fn test_forged_signature_leaves_no_trace() {
        let fx = fixture();
        let envelope = request(&fx, 3, 1_000_000);
        let forged = Signed::from_parts(envelope.payload.clone(), Keypair::from_seed(&[9u8; 32]).sign(b"other"));

        assert_eq!(
            validate_envelope(&fx.validator, &forged, SenderRule::Any),
            Err(ValidationError::BadSignature)
        );
        assert_eq!(fx.validator.seen_nonces(), 0);
        assert_eq!(validate_envelope(&fx.validator, &envelope, SenderRule::Any), Ok(()));
    }

    #[test]
    fn test_nonce_claim_is_single_use() {
        let fx = fixture();
        let envelope = request(&fx, 3, 1_000_000);
        let nonce = envelope.header().nonce;

        assert!(fx.validator.record_nonce(nonce));
        assert!(!fx.validator.record_nonce(nonce));
    }

    #[test]
    fn test_lost_nonce_claim_is_stale() {
        let fx = fixture();
        let envelope = request(&fx, 3, 1_000_000);

        // Header checks pass, but another copy claims the nonce first.
        assert!(fx.validator.validate(envelope.header()).nonce_ok);
        assert!(fx.validator.record_nonce(envelope.header().nonce));
        assert_eq!(
            validate_envelope(&fx.validator, &envelope, SenderRule::Any),
            Err(ValidationError::StaleNonce)
        );
    }

    #[test]
    fn test_sign_envelope_verifies() {
        let fx = fixture();
        let payload = ProofInfoRequest {
            header: Header::new(fx.validator.certificate(), Identity::default()),
            identifier: ProofId::from("xyz"),
        };
        let signed = sign_envelope(&fx.validator, payload);
        assert!(signed.verify());
    }
}
