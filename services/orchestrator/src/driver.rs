//! Device management: runs one proof's broadcast on one beacon.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use locus_adaptation::{DeviceNodes, KnowledgeTree, NodeValue, WriteSubscriber};
use locus_primitives::{BeaconRef, LocationProofProperties, Signal, SENTINEL};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::errors::DriverError;

#[async_trait]
pub trait BeaconDriver: Send + Sync {
    /// Runs the full fragment broadcast described by `properties` on `beacon`
    /// and returns what its witness observed.
    async fn execute(&self, beacon: &BeaconRef, properties: &LocationProofProperties) -> Result<Vec<Signal>, DriverError>;
}

/// Drives adaptation services through their tree nodes:
/// lock, write parameters, start, wait out the run, stop, unlock.
pub struct TreeBeaconDriver {
    tree: Arc<dyn KnowledgeTree>,
    clock: Arc<dyn Clock>,
    grace: Duration,
    caller: String,
}

impl TreeBeaconDriver {
    pub fn new(tree: Arc<dyn KnowledgeTree>, clock: Arc<dyn Clock>, grace: Duration) -> Self {
        Self {
            tree,
            clock,
            grace,
            caller: "orchestrator".to_string(),
        }
    }

    fn write(&self, address: &str, value: NodeValue) {
        self.tree.write(address, value, Some(&self.caller));
    }

    fn release(&self, nodes: &DeviceNodes) {
        if self.tree.read(&nodes.is_started()) == Some(NodeValue::Bool(true)) {
            self.write(&nodes.is_started(), NodeValue::Bool(false));
        }
        self.write(&nodes.is_locked(), NodeValue::Bool(false));
    }
}

#[async_trait]
impl BeaconDriver for TreeBeaconDriver {
    async fn execute(&self, beacon: &BeaconRef, properties: &LocationProofProperties) -> Result<Vec<Signal>, DriverError> {
        let nodes = DeviceNodes::new(beacon.address.as_str());
        let fragment_length = i64::try_from(properties.fragment_length_ms)
            .map_err(|_| DriverError::InvalidParameters("fragment length exceeds i64"))?;

        match self.tree.read(&nodes.is_locked()) {
            None => return Err(DriverError::Unreachable(beacon.address.clone())),
            Some(NodeValue::Bool(true)) => return Err(DriverError::Busy(beacon.address.clone())),
            Some(_) => {}
        }

        let signals = Arc::new(Mutex::new(Vec::new()));
        let collector: Arc<dyn WriteSubscriber> = Arc::new(SignalCollector {
            beacon: beacon.clone(),
            fragment_node: nodes.fragment_current(),
            tree: Arc::downgrade(&self.tree),
            clock: Arc::clone(&self.clock),
            signals: Arc::clone(&signals),
        });
        let subscription = self.tree.subscribe(&nodes.current_intensity(), collector);

        self.write(&nodes.is_locked(), NodeValue::Bool(true));
        self.write(&nodes.seed(), NodeValue::Int(properties.seed));
        self.write(&nodes.fragment_count(), NodeValue::Int(i64::from(properties.fragment_count)));
        self.write(&nodes.fragment_length(), NodeValue::Int(fragment_length));
        self.write(&nodes.is_started(), NodeValue::Bool(true));

        if self.tree.read(&nodes.is_started()) != Some(NodeValue::Bool(true)) {
            self.tree.unsubscribe(subscription);
            self.release(&nodes);
            return Err(DriverError::Rejected(beacon.address.clone()));
        }

        log::info!(
            "Proof {} running on {} for {}ms",
            properties.identifier,
            beacon,
            properties.run_duration_ms()
        );

        tokio::time::sleep(Duration::from_millis(properties.run_duration_ms()) + self.grace).await;

        self.release(&nodes);
        self.tree.unsubscribe(subscription);

        let collected = std::mem::take(&mut *signals.lock());
        log::info!(
            "Proof {} on {} finished with {} signals",
            properties.identifier,
            beacon,
            collected.len()
        );
        Ok(collected)
    }
}

/// Turns `currentIntensity` writes into signals tagged with the fragment the
/// device reports at that moment.
struct SignalCollector {
    beacon: BeaconRef,
    fragment_node: String,
    tree: Weak<dyn KnowledgeTree>,
    clock: Arc<dyn Clock>,
    signals: Arc<Mutex<Vec<Signal>>>,
}

impl WriteSubscriber for SignalCollector {
    fn on_write(&self, _address: &str, value: &NodeValue, _caller: Option<&str>) {
        let Some(intensity) = value.as_real() else {
            return;
        };
        let fragment = self
            .tree
            .upgrade()
            .and_then(|tree| tree.read(&self.fragment_node))
            .and_then(|v| v.as_int())
            .unwrap_or(SENTINEL);

        self.signals.lock().push(Signal {
            beacon: self.beacon.clone(),
            fragment: i32::try_from(fragment).unwrap_or(-1),
            intensity,
            observed_at: self.clock.now_ms(),
        });
    }
}
