//! Adaptation service: one per beacon+witness pair.
//!
//! Control arrives as writes on the device's `isLocked` / `isStarted` nodes.
//! Handlers run synchronously on the writer's thread; a started broadcast runs
//! as a tokio task on the injected runtime and samples flow back to the tree
//! through the injected thread pool.

use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::executor::ThreadPool;
use locus_primitives::{fragment_periods, MAX_BEACON_PERIOD_MS, MIN_BEACON_PERIOD_MS, SENTINEL, WITNESS_SAMPLING_PERIOD_MS};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::device::{Beacon, SampleSink, Witness};
use crate::state::{BeaconProtocolState, ControlNode, RunParameters, TransitionError, Trigger};
use crate::tree::{DeviceNodes, KnowledgeTree, NodeValue, SubscriptionId, WriteSubscriber};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdaptationConfig {
    pub min_period_ms: u64,
    pub max_period_ms: u64,
    pub witness_period_ms: u64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            min_period_ms: MIN_BEACON_PERIOD_MS,
            max_period_ms: MAX_BEACON_PERIOD_MS,
            witness_period_ms: WITNESS_SAMPLING_PERIOD_MS,
        }
    }
}

struct Inner {
    protocol: BeaconProtocolState,
    /// Bumped on every Start and Stop; a fragment task only acts while its
    /// generation is current.
    generation: u64,
    stop: Option<watch::Sender<bool>>,
}

pub struct AdaptationService {
    nodes: DeviceNodes,
    caller: String,
    tree: Arc<dyn KnowledgeTree>,
    beacon: Arc<dyn Beacon>,
    witness: Arc<dyn Witness>,
    runtime: Handle,
    pool: ThreadPool,
    config: AdaptationConfig,
    inner: Mutex<Inner>,
    completions: watch::Sender<u64>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

impl AdaptationService {
    /// Publishes the idle node set under `nodes` and subscribes to the two
    /// control nodes.
    pub fn spawn(
        nodes: DeviceNodes,
        tree: Arc<dyn KnowledgeTree>,
        beacon: Arc<dyn Beacon>,
        witness: Arc<dyn Witness>,
        runtime: Handle,
        pool: ThreadPool,
        config: AdaptationConfig,
    ) -> Arc<Self> {
        let (completions, _) = watch::channel(0u64);
        let caller = format!("adaptation@{}", nodes.root());

        let service = Arc::new(Self {
            nodes,
            caller,
            tree,
            beacon,
            witness,
            runtime,
            pool,
            config,
            inner: Mutex::new(Inner {
                protocol: BeaconProtocolState::IDLE,
                generation: 0,
                stop: None,
            }),
            completions,
            subscriptions: Mutex::new(Vec::new()),
        });

        service.write_flag(&service.nodes.is_locked(), false);
        service.write_flag(&service.nodes.is_started(), false);
        service.publish_numeric(&BeaconProtocolState::IDLE);
        service
            .tree
            .write(&service.nodes.current_intensity(), NodeValue::Real(0.0), Some(&service.caller));

        let ids = [ControlNode::IsLocked, ControlNode::IsStarted].map(|node| {
            let address = match node {
                ControlNode::IsLocked => service.nodes.is_locked(),
                ControlNode::IsStarted => service.nodes.is_started(),
            };
            let subscriber: Arc<dyn WriteSubscriber> = Arc::new(ControlSubscriber {
                service: Arc::downgrade(&service),
                node,
            });
            service.tree.subscribe(&address, subscriber)
        });
        service.subscriptions.lock().extend(ids);

        log::info!("Adaptation service ready at {}", service.nodes.root());
        service
    }

    pub fn nodes(&self) -> &DeviceNodes {
        &self.nodes
    }

    pub fn state(&self) -> BeaconProtocolState {
        self.inner.lock().protocol
    }

    /// Number of broadcast runs that have ended, either by completing or by Stop.
    pub fn completions(&self) -> watch::Receiver<u64> {
        self.completions.subscribe()
    }

    /// Resolves once at least `runs` broadcasts have ended.
    pub async fn wait_for_runs(&self, runs: u64) -> u64 {
        let mut rx = self.completions.subscribe();
        // The sender lives as long as `self`, so this only returns once satisfied.
        let _ = rx.wait_for(|count| *count >= runs).await;
        let count = *rx.borrow();
        count
    }

    /// Detaches from the tree and halts any running broadcast.
    pub fn shutdown(&self) {
        for id in self.subscriptions.lock().drain(..) {
            self.tree.unsubscribe(id);
        }

        let mut inner = self.inner.lock();
        inner.generation = inner.generation.wrapping_add(1);
        if let Some(stop) = inner.stop.take() {
            let _ = stop.send(true);
        }
        inner.protocol = BeaconProtocolState::IDLE;
        drop(inner);

        self.silence();
        log::info!("Adaptation service at {} shut down", self.nodes.root());
    }

    fn handle(self: &Arc<Self>, trigger: Trigger) {
        let result = match trigger {
            Trigger::Lock => self.on_lock(),
            Trigger::Unlock => self.on_unlock(),
            Trigger::Start => self.on_start(),
            Trigger::Stop => self.on_stop(),
        };

        if let Err(e) = result {
            log::warn!("{}: ignoring {:?}: {}", self.nodes.root(), trigger, e);
        }
    }

    fn on_lock(&self) -> Result<(), TransitionError> {
        {
            let mut inner = self.inner.lock();
            inner.protocol.check(Trigger::Lock)?;
            inner.protocol.locked = true;
        }

        if let Err(e) = self.beacon.setup() {
            log::warn!("{}: beacon setup failed: {}", self.nodes.root(), e);
        }
        self.reset();
        log::debug!("{}: locked", self.nodes.root());
        Ok(())
    }

    fn on_unlock(&self) -> Result<(), TransitionError> {
        {
            let mut inner = self.inner.lock();
            inner.protocol.check(Trigger::Unlock)?;
            inner.protocol.locked = false;
        }

        self.reset();
        log::debug!("{}: unlocked", self.nodes.root());
        Ok(())
    }

    fn on_start(self: &Arc<Self>) -> Result<(), TransitionError> {
        self.inner.lock().protocol.check(Trigger::Start)?;

        let params = RunParameters::new(
            self.read_int(&self.nodes.seed()),
            self.read_int(&self.nodes.fragment_count()),
            self.read_int(&self.nodes.fragment_length()),
        );
        let params = match params {
            Ok(params) => params,
            Err(e) => {
                self.write_flag(&self.nodes.is_started(), false);
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let generation = {
            let mut inner = self.inner.lock();
            // Re-checked after the tree reads.
            inner.protocol.check(Trigger::Start)?;
            inner.protocol.started = true;
            inner.protocol.fragment_current = SENTINEL;
            inner.protocol.fragment_count = i64::from(params.fragment_count);
            inner.protocol.fragment_length = params.fragment_length();
            inner.protocol.seed = params.seed;
            inner.generation = inner.generation.wrapping_add(1);
            inner.stop = Some(stop_tx);
            inner.generation
        };

        log::info!(
            "{}: broadcast started - {} fragments of {}ms",
            self.nodes.root(),
            params.fragment_count,
            params.fragment_length_ms
        );

        let service = Arc::clone(self);
        self.runtime.spawn(async move {
            service.run_fragments(generation, params, stop_rx).await;
            service.completions.send_modify(|count| *count += 1);
        });
        Ok(())
    }

    fn on_stop(&self) -> Result<(), TransitionError> {
        {
            let mut inner = self.inner.lock();
            inner.protocol.check(Trigger::Stop)?;
            inner.protocol.started = false;
            inner.generation = inner.generation.wrapping_add(1);
            if let Some(stop) = inner.stop.take() {
                let _ = stop.send(true);
            }
        }

        self.reset();
        log::info!("{}: broadcast stopped", self.nodes.root());
        Ok(())
    }

    async fn run_fragments(&self, generation: u64, params: RunParameters, mut stop: watch::Receiver<bool>) {
        let periods = match fragment_periods(
            params.seed,
            params.fragment_count,
            self.config.min_period_ms,
            self.config.max_period_ms,
        ) {
            Ok(periods) => periods,
            Err(e) => {
                log::warn!("{}: cannot derive fragment schedule: {}", self.nodes.root(), e);
                self.finish(generation);
                return;
            }
        };

        let length = Duration::from_millis(params.fragment_length_ms);
        let mut deadline = Instant::now();

        for (index, period) in periods.into_iter().enumerate() {
            let fragment = index as i64 + 1;
            if !self.begin_fragment(generation, fragment, period) {
                return;
            }
            deadline += length;

            let stopped = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => false,
                _ = stop.changed() => true,
            };
            if stopped {
                log::debug!("{}: fragment {} interrupted", self.nodes.root(), fragment);
                return;
            }
            self.end_fragment(generation);
        }

        self.finish(generation);
    }

    /// Records `fragment` as current and turns the devices on, if this run is
    /// still live. Devices are driven under the state lock so a concurrent Stop
    /// always silences after the emit.
    fn begin_fragment(&self, generation: u64, fragment: i64, period_ms: u64) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation || !inner.protocol.started {
                return false;
            }
            inner.protocol.fragment_current = fragment;
            debug_assert!(inner.protocol.fragment_in_range());
            self.emit(period_ms);
        }

        self.tree
            .write(&self.nodes.fragment_current(), NodeValue::Int(fragment), Some(&self.caller));
        true
    }

    fn end_fragment(&self, generation: u64) {
        let inner = self.inner.lock();
        if inner.generation == generation {
            self.silence();
        }
    }

    /// Natural end of a run: back to Locked(stopped).
    fn finish(&self, generation: u64) {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.protocol.started = false;
            inner.stop = None;
        }

        self.reset();
        self.write_flag(&self.nodes.is_started(), false);
        log::info!("{}: broadcast complete", self.nodes.root());
    }

    fn emit(&self, period_ms: u64) {
        if let Err(e) = self.beacon.start(period_ms) {
            log::warn!("{}: beacon start failed: {}", self.nodes.root(), e);
        }
        if let Err(e) = self.witness.start(self.config.witness_period_ms, self.sample_sink()) {
            log::warn!("{}: witness start failed: {}", self.nodes.root(), e);
        }
    }

    fn silence(&self) {
        if let Err(e) = self.beacon.stop() {
            log::warn!("{}: beacon stop failed: {}", self.nodes.root(), e);
        }
        if let Err(e) = self.witness.stop() {
            log::warn!("{}: witness stop failed: {}", self.nodes.root(), e);
        }
    }

    /// Sentinel numeric state in memory and in the tree, devices off.
    fn reset(&self) {
        let snapshot = {
            let mut inner = self.inner.lock();
            inner.protocol.reset_numeric();
            inner.protocol
        };
        self.silence();
        self.publish_numeric(&snapshot);
    }

    fn sample_sink(&self) -> SampleSink {
        let tree = Arc::clone(&self.tree);
        let pool = self.pool.clone();
        let address = self.nodes.current_intensity();
        let caller = self.caller.clone();

        Arc::new(move |intensity: f64| {
            let tree = Arc::clone(&tree);
            let address = address.clone();
            let caller = caller.clone();
            pool.spawn_ok(async move {
                tree.write(&address, NodeValue::Real(intensity), Some(&caller));
            });
        })
    }

    fn publish_numeric(&self, state: &BeaconProtocolState) {
        let writes = [
            (self.nodes.seed(), state.seed),
            (self.nodes.fragment_count(), state.fragment_count),
            (self.nodes.fragment_current(), state.fragment_current),
            (self.nodes.fragment_length(), state.fragment_length),
        ];
        for (address, value) in writes {
            self.tree.write(&address, NodeValue::Int(value), Some(&self.caller));
        }
    }

    fn write_flag(&self, address: &str, value: bool) {
        self.tree.write(address, NodeValue::Bool(value), Some(&self.caller));
    }

    fn read_int(&self, address: &str) -> Option<i64> {
        self.tree.read(address).and_then(|v| v.as_int())
    }
}

struct ControlSubscriber {
    service: Weak<AdaptationService>,
    node: ControlNode,
}

impl WriteSubscriber for ControlSubscriber {
    fn on_write(&self, address: &str, value: &NodeValue, caller: Option<&str>) {
        let Some(service) = self.service.upgrade() else {
            return;
        };
        if caller == Some(service.caller.as_str()) {
            return;
        }

        match value.as_bool() {
            Some(flag) => service.handle(Trigger::from_write(self.node, flag)),
            None => log::warn!("{}: non-boolean write {:?} ignored", address, value),
        }
    }
}
