//! The three signed exchanges: authorize, prove, fetch proof information.
//!
//! Each call validates the envelope, acts, and answers with an envelope signed
//! by this orchestrator. Errors are returned unsigned.

use std::sync::Arc;

use locus_primitives::{
    Authorization, AuthorizationRequest, BeaconRef, FragmentWindow, Header, Identity, LocationProofProperties,
    ProofAck, ProofId, ProofInfo, ProofInfoRequest, ProofRequest, ScheduleError, Signed, SignedAuthorization,
    ValidityWindow,
};
use rand::rngs::OsRng;
use tokio::runtime::Handle;

use crate::clock::Clock;
use crate::config::OrchestratorConfig;
use crate::driver::BeaconDriver;
use crate::errors::{OrchestrationError, RpcError};
use crate::participant::recompute_schedule;
use crate::registry::{ProofEntry, ProofRegistry};
use crate::selection::{select_beacons, BeaconDirectory};
use crate::validator::{sign_envelope, validate_envelope, MessageValidator, SenderRule};

/// Names new proofs.
pub trait IdentifierSource: Send + Sync {
    fn next_identifier(&self) -> ProofId;
}

/// Random alphanumeric identifiers of a fixed length.
#[derive(Clone, Copy, Debug)]
pub struct RandomIdentifiers {
    length: usize,
}

impl RandomIdentifiers {
    pub fn new(length: usize) -> Self {
        Self { length }
    }
}

impl IdentifierSource for RandomIdentifiers {
    fn next_identifier(&self) -> ProofId {
        ProofId::random(&mut rand::thread_rng(), self.length)
    }
}

/// External collaborators of an [`Orchestrator`].
pub struct Collaborators {
    pub validator: Arc<dyn MessageValidator>,
    pub directory: Arc<dyn BeaconDirectory>,
    pub driver: Arc<dyn BeaconDriver>,
    pub identifiers: Arc<dyn IdentifierSource>,
    pub clock: Arc<dyn Clock>,
}

pub struct Orchestrator {
    config: OrchestratorConfig,
    verifier: Identity,
    validator: Arc<dyn MessageValidator>,
    directory: Arc<dyn BeaconDirectory>,
    driver: Arc<dyn BeaconDriver>,
    identifiers: Arc<dyn IdentifierSource>,
    clock: Arc<dyn Clock>,
    registry: Arc<ProofRegistry>,
    runtime: Handle,
}

impl Orchestrator {
    /// `verifier` is the only identity allowed to fetch proof information.
    pub fn new(config: OrchestratorConfig, verifier: Identity, collaborators: Collaborators, runtime: Handle) -> Self {
        let Collaborators {
            validator,
            directory,
            driver,
            identifiers,
            clock,
        } = collaborators;

        validator.register_sender(verifier);

        Self {
            config,
            verifier,
            validator,
            directory,
            driver,
            identifiers,
            clock,
            registry: Arc::new(ProofRegistry::new()),
            runtime,
        }
    }

    pub fn identity(&self) -> Identity {
        self.validator.local_identity()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ProofRegistry> {
        &self.registry
    }

    /// Fragment schedule the selected beacons emit for `authorization` under
    /// this orchestrator's period bounds.
    pub fn recompute_schedule(&self, authorization: &SignedAuthorization) -> Result<Vec<FragmentWindow>, ScheduleError> {
        recompute_schedule(authorization, self.config.min_period_ms, self.config.max_period_ms)
    }

    /// Issues a signed authorization for the prover's claimed location.
    pub async fn request_authorization(
        &self,
        request: Signed<AuthorizationRequest>,
    ) -> Result<SignedAuthorization, RpcError> {
        validate_envelope(self.validator.as_ref(), &request, SenderRule::Any)?;
        let prover = request.header().sender;
        self.validator.register_sender(prover);

        let properties = LocationProofProperties::generate(
            &mut OsRng,
            self.identifiers.next_identifier(),
            self.config.fragment_count,
            self.config.fragment_length_ms,
        );

        let beacons: Vec<BeaconRef> = select_beacons(
            self.directory.as_ref(),
            &request.payload.location,
            &request.payload.beacon_kinds,
            self.config.min_proximity,
        )
        .into_iter()
        .map(|(beacon, _)| beacon)
        .collect();

        if beacons.is_empty() {
            log::info!(
                "No eligible beacons for {} at {}",
                prover.short(),
                request.payload.location
            );
            return Err(OrchestrationError::NoEligibleBeacons.into());
        }

        let authorization = sign_envelope(
            self.validator.as_ref(),
            Authorization {
                header: Header::new(self.validator.certificate(), prover),
                prover,
                properties,
                beacons,
                validity: ValidityWindow::starting_at(self.clock.now_ms(), self.config.authorization_validity_ms),
            },
        );

        let identifier = authorization.payload.identifier().clone();
        if self.registry.insert(ProofEntry::new(authorization.clone())).is_some() {
            log::warn!("Authorization {} replaced an earlier entry", identifier);
        }

        log::info!(
            "Authorized proof {} for {} on {} beacons",
            identifier,
            prover.short(),
            authorization.payload.beacons.len()
        );
        Ok(authorization)
    }

    /// Starts every selected beacon for a previously issued authorization.
    /// Returns as soon as the executions are spawned.
    pub async fn prove_location(&self, request: Signed<ProofRequest>) -> Result<Signed<ProofAck>, RpcError> {
        validate_envelope(self.validator.as_ref(), &request, SenderRule::Known)?;

        let sender = request.header().sender;
        let presented = &request.payload.authorization;
        if presented.payload.prover != sender {
            return Err(OrchestrationError::ProverMismatch(sender).into());
        }

        let identifier = presented.payload.identifier().clone();
        let entry = self
            .registry
            .get(&identifier)
            .ok_or_else(|| OrchestrationError::UnknownProof(identifier.clone()))?;

        if entry.authorization().to_bytes() != presented.to_bytes() {
            return Err(OrchestrationError::AuthorizationMismatch(identifier).into());
        }

        let now = self.clock.now_ms();
        let validity = entry.validity();
        if !validity.contains(now) {
            return Err(OrchestrationError::AuthorizationExpired {
                identifier,
                not_after: validity.not_after,
                now,
            }
            .into());
        }

        let properties = entry.properties().clone();
        let mut started = 0u32;
        for beacon in entry.selected_beacons().iter().cloned() {
            let entry = Arc::clone(&entry);
            let driver = Arc::clone(&self.driver);
            let properties = properties.clone();

            entry.begin_execution();
            self.runtime.spawn(async move {
                match driver.execute(&beacon, &properties).await {
                    Ok(signals) => entry.append_signals(signals),
                    Err(e) => log::warn!("Proof {} on {}: {}", properties.identifier, beacon, e),
                }
                entry.end_execution();
            });
            started += 1;
        }

        log::info!("Proof {} started on {} beacons", identifier, started);

        Ok(sign_envelope(
            self.validator.as_ref(),
            ProofAck {
                header: Header::new(self.validator.certificate(), sender),
                identifier,
                beacons_started: started,
            },
        ))
    }

    /// Signals collected so far for a proof. Only the configured verifier may ask.
    pub async fn request_proof_information(
        &self,
        request: Signed<ProofInfoRequest>,
    ) -> Result<Signed<ProofInfo>, RpcError> {
        validate_envelope(self.validator.as_ref(), &request, SenderRule::Only(self.verifier))?;
        let sender = request.header().sender;

        let identifier = request.payload.identifier.clone();
        let entry = self
            .registry
            .get(&identifier)
            .ok_or_else(|| OrchestrationError::UnknownProof(identifier.clone()))?;

        Ok(sign_envelope(
            self.validator.as_ref(),
            ProofInfo {
                header: Header::new(self.validator.certificate(), sender),
                identifier,
                signals: entry.signals(),
            },
        ))
    }

    /// Waits until every device execution of `identifier` has finished.
    pub async fn settle(&self, identifier: &ProofId) -> Result<(), OrchestrationError> {
        let entry = self
            .registry
            .get(identifier)
            .ok_or_else(|| OrchestrationError::UnknownProof(identifier.clone()))?;
        entry.settled().await;
        Ok(())
    }
}
