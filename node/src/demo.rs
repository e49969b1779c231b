//! One proof round end to end: simulated beacons publish into an in-memory
//! tree, a prover asks for an authorization and proves, a verifier fetches the
//! signals and checks them against the recomputed schedule.

use std::sync::Arc;
use std::time::Duration;

use futures::executor::ThreadPool;
use locus_adaptation::{
    AdaptationConfig, AdaptationService, Beacon, DeviceNodes, KnowledgeTree, MemoryTree, SimulatedBeacon,
    SimulatedWitness, Witness,
};
use locus_orchestrator::{
    Clock, Collaborators, KeyringValidator, Orchestrator, OrchestratorConfig, Participant,
    RandomIdentifiers, StaticDirectory, SystemClock, TreeBeaconDriver, TreeDirectory,
};
use locus_primitives::{
    signals_by_fragment, BeaconDescriptor, BeaconKind, BeaconRef, CertificateAuthority, Identity, Keypair, Location,
    ProofId, Signal,
};
use serde::Serialize;
use tokio::runtime::Handle;

use crate::cli::DemoCmd;
use crate::command::Result;

const METERS_PER_DEGREE_LATITUDE: f64 = 111_320.0;
const CERTIFICATE_LIFETIME_MS: u64 = 60 * 60 * 1_000;

#[derive(Debug, Serialize)]
pub struct DemoReport {
    pub identifier: ProofId,
    pub prover: Identity,
    pub beacons: Vec<BeaconReport>,
    pub verified: bool,
}

#[derive(Debug, Serialize)]
pub struct BeaconReport {
    pub address: String,
    pub expected_periods: Vec<u64>,
    pub emitted_periods: Vec<u64>,
    pub fragments: Vec<FragmentReport>,
}

#[derive(Debug, Serialize)]
pub struct FragmentReport {
    pub index: i32,
    pub samples: usize,
    pub mean_intensity: f64,
}

struct Device {
    reference: BeaconRef,
    beacon: Arc<SimulatedBeacon>,
    service: Arc<AdaptationService>,
}

pub async fn run(cmd: DemoCmd, config: OrchestratorConfig) -> Result<DemoReport> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let authority = CertificateAuthority::new(Keypair::generate());
    let not_after = clock.now_ms().saturating_add(CERTIFICATE_LIFETIME_MS);
    let tree = Arc::new(MemoryTree::new());
    let pool = ThreadPool::new()?;

    let adaptation = AdaptationConfig::from(&config);

    let mut devices = Vec::new();
    let mut descriptors = Vec::new();
    for i in 0..cmd.beacons {
        let offset = f64::from(i) * cmd.spacing / METERS_PER_DEGREE_LATITUDE;
        let reference = BeaconRef::new(format!("site/beacon-{}", i), BeaconKind::Light);
        let location = Location::gps(cmd.latitude + offset, cmd.longitude, cmd.spacing)?;

        let beacon = Arc::new(SimulatedBeacon::new());
        let witness = Arc::new(SimulatedWitness::new(Arc::clone(&beacon), cmd.mock_seed + u64::from(i)));
        let service = AdaptationService::spawn(
            DeviceNodes::new(reference.address.as_str()),
            Arc::clone(&tree) as Arc<dyn KnowledgeTree>,
            Arc::clone(&beacon) as Arc<dyn Beacon>,
            witness as Arc<dyn Witness>,
            Handle::current(),
            pool.clone(),
            adaptation,
        );

        descriptors.push(BeaconDescriptor {
            reference: reference.clone(),
            location,
        });
        devices.push(Device {
            reference,
            beacon,
            service,
        });
    }

    let orchestrator_key = Keypair::generate();
    let orchestrator_id = orchestrator_key.identity();
    let validator = KeyringValidator::new(
        orchestrator_key,
        authority.issue(orchestrator_id, not_after),
        authority.identity(),
        Arc::clone(&clock),
    );

    let participant = || {
        let keypair = Keypair::generate();
        let certificate = authority.issue(keypair.identity(), not_after);
        Participant::new(keypair, certificate, authority.identity(), orchestrator_id, Arc::clone(&clock))
    };
    let prover = participant();
    let verifier = participant();

    let orchestrator = Orchestrator::new(
        config.clone(),
        verifier.identity(),
        Collaborators {
            validator: Arc::new(validator),
            directory: Arc::new(TreeDirectory::new(
                Arc::new(StaticDirectory::new(descriptors)),
                Arc::clone(&tree) as Arc<dyn KnowledgeTree>,
            )),
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

    let claim = Location::gps(cmd.latitude, cmd.longitude, cmd.threshold)?;
    log::info!("Prover {} claims {}", prover.identity().short(), claim);

    let authorization = orchestrator
        .request_authorization(prover.authorization_request(claim, vec![BeaconKind::Light]))
        .await?;
    prover.verify_authorization(&authorization)?;
    let identifier = authorization.payload.identifier().clone();

    let ack = orchestrator
        .prove_location(prover.proof_request(authorization.clone()))
        .await?;
    prover.verify_response(&ack)?;
    log::info!(
        "Proof {} running on {} beacons for {}ms",
        identifier,
        ack.payload.beacons_started,
        config.run_duration_ms()
    );

    orchestrator.settle(&identifier).await?;

    let info = orchestrator
        .request_proof_information(verifier.proof_info_request(identifier.clone()))
        .await?;
    verifier.verify_response(&info)?;

    let expected: Vec<u64> = orchestrator
        .recompute_schedule(&authorization)?
        .into_iter()
        .map(|window| window.period_ms)
        .collect();

    let beacons: Vec<BeaconReport> = devices
        .iter()
        .filter(|d| authorization.payload.beacons.contains(&d.reference))
        .map(|d| beacon_report(d, &expected, &info.payload.signals))
        .collect();

    let verified = !beacons.is_empty()
        && beacons.iter().all(|b| {
            b.emitted_periods == b.expected_periods && b.fragments.len() == b.expected_periods.len()
        });
    log::info!("Proof {} verified: {}", identifier, verified);

    for device in &devices {
        device.service.shutdown();
    }

    Ok(DemoReport {
        identifier,
        prover: prover.identity(),
        beacons,
        verified,
    })
}

fn beacon_report(device: &Device, expected: &[u64], signals: &[Signal]) -> BeaconReport {
    let own: Vec<Signal> = signals
        .iter()
        .filter(|s| s.beacon == device.reference)
        .cloned()
        .collect();

    let fragments = signals_by_fragment(&own)
        .into_iter()
        .map(|(index, samples)| {
            let total: f64 = samples.iter().map(|s| s.intensity).sum();
            FragmentReport {
                index,
                samples: samples.len(),
                mean_intensity: total / samples.len().max(1) as f64,
            }
        })
        .collect();

    BeaconReport {
        address: device.reference.address.clone(),
        expected_periods: expected.to_vec(),
        emitted_periods: device.beacon.started_periods(),
        fragments,
    }
}
