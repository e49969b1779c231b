//! Prover and verifier side of the exchanges.

use std::sync::Arc;

use locus_primitives::{
    expected_schedule, AuthorizationRequest, BeaconKind, Certificate, FragmentWindow, Header, Identity, Keypair,
    Location, Message, ProofId, ProofInfoRequest, ProofRequest, ScheduleError, Signed, SignedAuthorization,
};

use crate::clock::Clock;
use crate::errors::ValidationError;

/// A certified prover or verifier talking to one orchestrator.
pub struct Participant {
    keypair: Keypair,
    certificate: Certificate,
    authority: Identity,
    orchestrator: Identity,
    clock: Arc<dyn Clock>,
}

impl Participant {
    pub fn new(
        keypair: Keypair,
        certificate: Certificate,
        authority: Identity,
        orchestrator: Identity,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keypair,
            certificate,
            authority,
            orchestrator,
            clock,
        }
    }

    pub fn identity(&self) -> Identity {
        self.keypair.identity()
    }

    fn header(&self) -> Header {
        Header::new(self.certificate.clone(), self.orchestrator)
    }

    pub fn authorization_request(&self, location: Location, beacon_kinds: Vec<BeaconKind>) -> Signed<AuthorizationRequest> {
        Signed::sign(
            AuthorizationRequest {
                header: self.header(),
                location,
                beacon_kinds,
            },
            &self.keypair,
        )
    }

    pub fn proof_request(&self, authorization: SignedAuthorization) -> Signed<ProofRequest> {
        Signed::sign(
            ProofRequest {
                header: self.header(),
                authorization,
            },
            &self.keypair,
        )
    }

    pub fn proof_info_request(&self, identifier: ProofId) -> Signed<ProofInfoRequest> {
        Signed::sign(
            ProofInfoRequest {
                header: self.header(),
                identifier,
            },
            &self.keypair,
        )
    }

    /// Checks that `response` comes from our orchestrator, is addressed to us,
    /// and carries a valid certificate and signature.
    pub fn verify_response<T: Message>(&self, response: &Signed<T>) -> Result<(), ValidationError> {
        let header = response.header();
        if header.receiver != self.identity() {
            return Err(ValidationError::WrongReceiver {
                found: header.receiver,
            });
        }
        if header.sender != self.orchestrator {
            return Err(ValidationError::UnauthorizedSender(header.sender));
        }
        if header.certificate.subject != header.sender
            || !header.certificate.verify(&self.authority, self.clock.now_ms())
        {
            return Err(ValidationError::InvalidCertificate);
        }
        if !response.verify() {
            return Err(ValidationError::BadSignature);
        }
        Ok(())
    }

    /// As [`Self::verify_response`], and the authorization names us as prover.
    pub fn verify_authorization(&self, authorization: &SignedAuthorization) -> Result<(), ValidationError> {
        self.verify_response(authorization)?;
        if authorization.payload.prover != self.identity() {
            return Err(ValidationError::UnauthorizedSender(authorization.payload.prover));
        }
        Ok(())
    }
}

/// What each selected beacon should have broadcast, recomputed from the
/// authorization alone.
pub fn recompute_schedule(
    authorization: &SignedAuthorization,
    min_period_ms: u64,
    max_period_ms: u64,
) -> Result<Vec<FragmentWindow>, ScheduleError> {
    expected_schedule(&authorization.payload.properties, min_period_ms, max_period_ms)
}
