#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::executor::ThreadPool;
use locus_adaptation::{
    AdaptationConfig, AdaptationService, Beacon, DeviceNodes, KnowledgeTree, MemoryTree, SimulatedBeacon,
    SimulatedWitness, Witness,
};
use locus_primitives::{
    BeaconDescriptor, BeaconKind, BeaconRef, CertificateAuthority, Keypair, Location, LocationProofProperties,
    ProofId, Signal, SignedAuthorization,
};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Barrier;

use crate::{
    console, recompute_schedule, BeaconDirectory, BeaconDriver, Clock, Collaborators, DriverError,
    IdentifierSource, KeyringValidator, ManualClock, OrchestrationError, Orchestrator, OrchestratorConfig,
    Participant, RandomIdentifiers, RpcError, StaticDirectory, SystemClock, TreeBeaconDriver, TreeDirectory,
    ValidationError,
};

const START_MS: u64 = 1_700_000_000_000;

// =============================================================================
// Fixtures
// =============================================================================

struct FixedIdentifiers(&'static str);

impl IdentifierSource for FixedIdentifiers {
    fn next_identifier(&self) -> ProofId {
        ProofId::from(self.0)
    }
}

#[derive(Default)]
struct RecordingDriver {
    calls: Mutex<Vec<(BeaconRef, LocationProofProperties)>>,
    delay_ms: u64,
}

#[async_trait]
impl BeaconDriver for RecordingDriver {
    async fn execute(&self, beacon: &BeaconRef, properties: &LocationProofProperties) -> Result<Vec<Signal>, DriverError> {
        self.calls.lock().push((beacon.clone(), properties.clone()));
        tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;

        Ok((1..=properties.fragment_count as i32)
            .map(|fragment| Signal {
                beacon: beacon.clone(),
                fragment,
                intensity: 0.75,
                observed_at: START_MS + fragment as u64,
            })
            .collect())
    }
}

fn directory() -> StaticDirectory {
    StaticDirectory::new(vec![
        BeaconDescriptor {
            reference: BeaconRef::new("site/hall/lamp", BeaconKind::Light),
            location: Location::gps(47.3656, 8.5250, 10.0).unwrap(),
        },
        BeaconDescriptor {
            reference: BeaconRef::new("site/hall/buzzer", BeaconKind::Sound),
            location: Location::gps(47.3656, 8.5250, 10.0).unwrap(),
        },
        BeaconDescriptor {
            reference: BeaconRef::new("elsewhere/lamp", BeaconKind::Light),
            location: Location::gps(40.4168, -3.7038, 10.0).unwrap(),
        },
    ])
}

fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        fragment_count: 3,
        fragment_length_ms: 100,
        authorization_validity_ms: 60_000,
        ..OrchestratorConfig::default()
    }
}

fn claim() -> Location {
    Location::gps(47.3656, 8.5251, 30.0).unwrap()
}

struct World {
    clock: Arc<ManualClock>,
    driver: Arc<RecordingDriver>,
    orchestrator: Orchestrator,
    prover: Participant,
    verifier: Participant,
    stranger: Participant,
}

fn world() -> World {
    world_with(Arc::new(RandomIdentifiers::new(8)), 0)
}

fn world_with(identifiers: Arc<dyn IdentifierSource>, delay_ms: u64) -> World {
    let authority = CertificateAuthority::new(Keypair::from_seed(&[1u8; 32]));
    let clock = Arc::new(ManualClock::new(START_MS));
    let orchestrator_key = Keypair::from_seed(&[2u8; 32]);
    let orchestrator_id = orchestrator_key.identity();

    let participant = |seed: u8| {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let certificate = authority.issue(keypair.identity(), u64::MAX);
        Participant::new(
            keypair,
            certificate,
            authority.identity(),
            orchestrator_id,
            clock.clone() as Arc<dyn Clock>,
        )
    };
    let prover = participant(10);
    let verifier = participant(11);
    let stranger = participant(12);

    let validator = KeyringValidator::new(
        orchestrator_key,
        authority.issue(orchestrator_id, u64::MAX),
        authority.identity(),
        clock.clone(),
    );
    let driver = Arc::new(RecordingDriver {
        delay_ms,
        ..RecordingDriver::default()
    });

    let orchestrator = Orchestrator::new(
        test_config(),
        verifier.identity(),
        Collaborators {
            validator: Arc::new(validator),
            directory: Arc::new(directory()),
            driver: driver.clone(),
            identifiers,
            clock: clock.clone(),
        },
        Handle::current(),
    );

    World {
        clock,
        driver,
        orchestrator,
        prover,
        verifier,
        stranger,
    }
}

impl World {
    async fn authorize(&self) -> SignedAuthorization {
        self.orchestrator
            .request_authorization(self.prover.authorization_request(claim(), vec![BeaconKind::Light]))
            .await
            .unwrap()
    }
}

// =============================================================================
// Authorization
// =============================================================================

#[tokio::test]
async fn authorization_selects_near_beacons() {
    let w = world();
    let authorization = w.authorize().await;

    assert_eq!(w.prover.verify_authorization(&authorization), Ok(()));
    assert_eq!(authorization.payload.prover, w.prover.identity());
    assert_eq!(authorization.payload.orchestrator(), w.orchestrator.identity());
    assert_eq!(
        authorization.payload.beacons,
        vec![BeaconRef::new("site/hall/lamp", BeaconKind::Light)]
    );

    let properties = &authorization.payload.properties;
    assert_eq!(properties.fragment_count, 3);
    assert_eq!(properties.fragment_length_ms, 100);
    assert_eq!(properties.identifier.as_str().len(), 8);

    assert_eq!(authorization.payload.validity.not_before, START_MS);
    assert_eq!(authorization.payload.validity.not_after, START_MS + 60_000);

    let entry = w.orchestrator.registry().get(&properties.identifier).unwrap();
    assert_eq!(entry.authorization(), &authorization);
    assert!(entry.signals().is_empty());
}

#[tokio::test]
async fn authorization_without_eligible_beacons_fails() {
    let w = world();
    let far = Location::gps(-33.8688, 151.2093, 30.0).unwrap();

    let result = w
        .orchestrator
        .request_authorization(w.prover.authorization_request(far, vec![BeaconKind::Light]))
        .await;

    assert_eq!(
        result,
        Err(RpcError::Orchestration(OrchestrationError::NoEligibleBeacons))
    );
    assert!(w.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn authorization_for_other_variant_fails() {
    let w = world();
    let olc = Location::olc("8FVC9G8F+6X").unwrap();

    let result = w
        .orchestrator
        .request_authorization(w.prover.authorization_request(olc, vec![BeaconKind::Light]))
        .await;

    assert_eq!(
        result,
        Err(RpcError::Orchestration(OrchestrationError::NoEligibleBeacons))
    );
}

#[tokio::test]
async fn identifier_reuse_replaces_entry() {
    let w = world_with(Arc::new(FixedIdentifiers("dup00001")), 0);

    let first = w.authorize().await;
    let second = w.authorize().await;
    assert_ne!(first, second);

    let registry = w.orchestrator.registry();
    assert_eq!(registry.len(), 1);
    let entry = registry.get(&ProofId::from("dup00001")).unwrap();
    assert_eq!(entry.authorization(), &second);

    let result = w.orchestrator.prove_location(w.prover.proof_request(first)).await;
    assert_eq!(
        result,
        Err(RpcError::Orchestration(OrchestrationError::AuthorizationMismatch(
            ProofId::from("dup00001")
        )))
    );
    assert!(w.driver.calls.lock().is_empty());
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn replayed_request_is_rejected() {
    let w = world();
    let request = w.prover.authorization_request(claim(), vec![BeaconKind::Light]);

    w.orchestrator.request_authorization(request.clone()).await.unwrap();
    let result = w.orchestrator.request_authorization(request).await;

    assert_eq!(result, Err(RpcError::Validation(ValidationError::StaleNonce)));
    assert_eq!(w.orchestrator.registry().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_copies_of_one_request_are_accepted_once() {
    let World {
        orchestrator, prover, ..
    } = world();
    let orchestrator = Arc::new(orchestrator);

    for round in 1..=20 {
        let request = prover.authorization_request(claim(), vec![BeaconKind::Light]);
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let orchestrator = Arc::clone(&orchestrator);
                let barrier = Arc::clone(&barrier);
                let request = request.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    orchestrator.request_authorization(request).await
                })
            })
            .collect();

        let mut accepted = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => accepted += 1,
                Err(e) => assert_eq!(e, RpcError::Validation(ValidationError::StaleNonce)),
            }
        }
        assert_eq!(accepted, 1, "round {}", round);
        assert_eq!(orchestrator.registry().len(), round);
    }
}

#[tokio::test]
async fn tampered_request_is_rejected_without_mutation() {
    let w = world();
    let mut request = w.prover.authorization_request(claim(), vec![BeaconKind::Light]);
    request.payload.beacon_kinds.push(BeaconKind::Sound);

    let result = w.orchestrator.request_authorization(request).await;

    assert_eq!(result, Err(RpcError::Validation(ValidationError::BadSignature)));
    assert!(w.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn request_for_other_orchestrator_is_rejected() {
    let w = world();
    let mut request = w.prover.authorization_request(claim(), vec![BeaconKind::Light]);
    request.payload.header.receiver = w.prover.identity();

    let result = w.orchestrator.request_authorization(request).await;
    assert!(matches!(
        result,
        Err(RpcError::Validation(ValidationError::WrongReceiver { .. }))
    ));
}

#[tokio::test]
async fn unknown_sender_cannot_prove() {
    let w = world();
    let authorization = w.authorize().await;

    let result = w.orchestrator.prove_location(w.stranger.proof_request(authorization)).await;

    assert_eq!(
        result,
        Err(RpcError::Validation(ValidationError::UnknownSender(w.stranger.identity())))
    );
    assert!(w.driver.calls.lock().is_empty());
}

#[tokio::test]
async fn known_sender_cannot_prove_for_someone_else() {
    let w = world();
    let authorization = w.authorize().await;
    w.orchestrator
        .request_authorization(w.stranger.authorization_request(claim(), vec![BeaconKind::Light]))
        .await
        .unwrap();

    let result = w.orchestrator.prove_location(w.stranger.proof_request(authorization)).await;

    assert_eq!(
        result,
        Err(RpcError::Orchestration(OrchestrationError::ProverMismatch(w.stranger.identity())))
    );
}

// =============================================================================
// Proof
// =============================================================================

#[tokio::test]
async fn prove_location_runs_selected_beacons() {
    let w = world();
    let authorization = w.authorize().await;
    let identifier = authorization.payload.identifier().clone();

    let ack = w
        .orchestrator
        .prove_location(w.prover.proof_request(authorization.clone()))
        .await
        .unwrap();
    assert_eq!(w.prover.verify_response(&ack), Ok(()));
    assert_eq!(ack.payload.identifier, identifier);
    assert_eq!(ack.payload.beacons_started, 1);

    w.orchestrator.settle(&identifier).await.unwrap();

    let calls = w.driver.calls.lock().clone();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, BeaconRef::new("site/hall/lamp", BeaconKind::Light));
    assert_eq!(calls[0].1, authorization.payload.properties);

    let info = w
        .orchestrator
        .request_proof_information(w.verifier.proof_info_request(identifier))
        .await
        .unwrap();
    assert_eq!(w.verifier.verify_response(&info), Ok(()));
    assert_eq!(info.payload.signals.len(), 3);
}

#[tokio::test(start_paused = true)]
async fn prove_location_returns_before_devices_finish() {
    let w = world_with(Arc::new(RandomIdentifiers::new(8)), 10_000);
    let authorization = w.authorize().await;
    let identifier = authorization.payload.identifier().clone();

    w.orchestrator
        .prove_location(w.prover.proof_request(authorization))
        .await
        .unwrap();

    let entry = w.orchestrator.registry().get(&identifier).unwrap();
    assert_eq!(entry.pending_executions(), 1);
    assert!(entry.signals().is_empty());

    w.orchestrator.settle(&identifier).await.unwrap();
    assert_eq!(entry.pending_executions(), 0);
    assert_eq!(entry.signals().len(), 3);
}

#[tokio::test]
async fn expired_authorization_starts_nothing() {
    let w = world();
    let authorization = w.authorize().await;
    let identifier = authorization.payload.identifier().clone();
    w.clock.advance(60_000);

    let result = w.orchestrator.prove_location(w.prover.proof_request(authorization)).await;

    assert_eq!(
        result,
        Err(RpcError::Orchestration(OrchestrationError::AuthorizationExpired {
            identifier,
            not_after: START_MS + 60_000,
            now: START_MS + 60_000,
        }))
    );
    assert!(w.driver.calls.lock().is_empty());
}

#[tokio::test]
async fn unknown_proof_cannot_be_proven() {
    let w = world_with(Arc::new(FixedIdentifiers("abc12345")), 0);
    let authorization = w.authorize().await;
    let mut forged = authorization.clone();
    forged.payload.properties.identifier = ProofId::from("zzz99999");

    let result = w.orchestrator.prove_location(w.prover.proof_request(forged)).await;
    assert_eq!(
        result,
        Err(RpcError::Orchestration(OrchestrationError::UnknownProof(ProofId::from(
            "zzz99999"
        ))))
    );
}

#[tokio::test]
async fn schedule_follows_configured_period_bounds() {
    let w = world();
    let authorization = w.authorize().await;

    let windows = w.orchestrator.recompute_schedule(&authorization).unwrap();
    let config = w.orchestrator.config();
    assert_eq!(windows.len(), 3);
    assert!(windows
        .iter()
        .all(|window| (config.min_period_ms..config.max_period_ms).contains(&window.period_ms)));
    assert_eq!(
        windows,
        recompute_schedule(&authorization, config.min_period_ms, config.max_period_ms).unwrap()
    );
}

// =============================================================================
// Proof Information
// =============================================================================

#[tokio::test]
async fn proof_information_before_proving_is_empty() {
    let w = world();
    let authorization = w.authorize().await;
    let identifier = authorization.payload.identifier().clone();

    let info = w
        .orchestrator
        .request_proof_information(w.verifier.proof_info_request(identifier.clone()))
        .await
        .unwrap();

    assert_eq!(info.payload.identifier, identifier);
    assert!(info.payload.signals.is_empty());
}

#[tokio::test]
async fn proof_information_for_unknown_identifier() {
    let w = world();
    let result = w
        .orchestrator
        .request_proof_information(w.verifier.proof_info_request(ProofId::from("missing")))
        .await;

    assert_eq!(
        result,
        Err(RpcError::Orchestration(OrchestrationError::UnknownProof(ProofId::from(
            "missing"
        ))))
    );
}

#[tokio::test]
async fn only_the_verifier_may_fetch_proof_information() {
    let w = world();
    let authorization = w.authorize().await;
    let identifier = authorization.payload.identifier().clone();

    let result = w
        .orchestrator
        .request_proof_information(w.prover.proof_info_request(identifier))
        .await;

    assert_eq!(
        result,
        Err(RpcError::Validation(ValidationError::UnauthorizedSender(w.prover.identity())))
    );
}

#[tokio::test]
async fn settle_unknown_proof() {
    let w = world();
    assert_eq!(
        w.orchestrator.settle(&ProofId::from("nothing")).await,
        Err(OrchestrationError::UnknownProof(ProofId::from("nothing")))
    );
}

// =============================================================================
// Console
// =============================================================================

#[tokio::test]
async fn console_lists_and_shows_entries() {
    let w = world_with(Arc::new(FixedIdentifiers("show0001")), 0);
    w.authorize().await;

    let registry = w.orchestrator.registry();
    assert_eq!(console::list_identifiers(registry), vec![ProofId::from("show0001")]);

    let rendered = console::show_entry(registry, &ProofId::from("show0001")).unwrap();
    let json: serde_json::Value = serde_json::from_str(&rendered).unwrap();
    assert_eq!(json["identifier"], "show0001");
    assert_eq!(json["properties"]["fragment_count"], 3);
    assert_eq!(json["selected_beacons"][0]["address"], "site/hall/lamp");
    assert_eq!(json["signals"].as_array().map(Vec::len), Some(0));

    assert!(console::show_entry(registry, &ProofId::from("other")).is_err());
}

// =============================================================================
// End to End
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn end_to_end_with_simulated_devices() {
    let authority = CertificateAuthority::new(Keypair::from_seed(&[1u8; 32]));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let tree = Arc::new(MemoryTree::new());
    let pool = ThreadPool::builder().pool_size(2).create().unwrap();
    let config = OrchestratorConfig {
        fragment_count: 2,
        fragment_length_ms: 80,
        run_grace_ms: 100,
        min_period_ms: 20,
        max_period_ms: 60,
        ..OrchestratorConfig::default()
    };

    let beacon = Arc::new(SimulatedBeacon::new());
    let witness = Arc::new(SimulatedWitness::new(Arc::clone(&beacon), 3));
    let nodes = DeviceNodes::new("site/hall/lamp");
    let service = AdaptationService::spawn(
        nodes,
        Arc::clone(&tree) as Arc<dyn KnowledgeTree>,
        Arc::clone(&beacon) as Arc<dyn Beacon>,
        witness as Arc<dyn Witness>,
        Handle::current(),
        pool,
        AdaptationConfig::from(&config),
    );

    let orchestrator_key = Keypair::from_seed(&[2u8; 32]);
    let orchestrator_id = orchestrator_key.identity();
    let validator = KeyringValidator::new(
        orchestrator_key,
        authority.issue(orchestrator_id, u64::MAX),
        authority.identity(),
        Arc::clone(&clock),
    );
    let participant = |seed: u8| {
        let keypair = Keypair::from_seed(&[seed; 32]);
        let certificate = authority.issue(keypair.identity(), u64::MAX);
        Participant::new(keypair, certificate, authority.identity(), orchestrator_id, Arc::clone(&clock))
    };
    let prover = participant(10);
    let verifier = participant(11);

    let directory: Arc<dyn BeaconDirectory> = Arc::new(TreeDirectory::new(
        Arc::new(directory()),
        Arc::clone(&tree) as Arc<dyn KnowledgeTree>,
    ));
    let orchestrator = Orchestrator::new(
        config.clone(),
        verifier.identity(),
        Collaborators {
            validator: Arc::new(validator),
            directory,
            driver: Arc::new(TreeBeaconDriver::new(
                Arc::clone(&tree) as Arc<dyn KnowledgeTree>,
                Arc::clone(&clock),
                Duration::from_millis(config.run_grace_ms),
            )),
            identifiers: Arc::new(RandomIdentifiers::new(config.identifier_length)),
            clock: Arc::clone(&clock),
        },
        Handle::current(),
    );

    let authorization = orchestrator
        .request_authorization(prover.authorization_request(claim(), vec![BeaconKind::Light]))
        .await
        .unwrap();
    let identifier = authorization.payload.identifier().clone();

    let ack = orchestrator
        .prove_location(prover.proof_request(authorization.clone()))
        .await
        .unwrap();
    assert_eq!(ack.payload.beacons_started, 1);

    orchestrator.settle(&identifier).await.unwrap();
    assert!(service.state().is_idle());

    let info = orchestrator
        .request_proof_information(verifier.proof_info_request(identifier))
        .await
        .unwrap();
    assert_eq!(verifier.verify_response(&info), Ok(()));

    let signals = info.payload.signals;
    assert!(signals.iter().any(|s| s.fragment == 1));
    assert!(signals.iter().all(|s| s.fragment <= 2));
    assert!(signals
        .iter()
        .all(|s| s.beacon.address == "site/hall/lamp" && (0.0..=1.0).contains(&s.intensity)));

    let expected: Vec<u64> = orchestrator
        .recompute_schedule(&authorization)
        .unwrap()
        .into_iter()
        .map(|w| w.period_ms)
        .collect();
    assert_eq!(beacon.started_periods(), expected);
}
