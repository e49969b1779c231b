//! In-memory registry of issued authorizations and the signals collected
//! for them.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use locus_primitives::{
    BeaconRef, Identity, LocationProofProperties, ProofId, Signal, SignedAuthorization, ValidityWindow,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::watch;

pub struct ProofEntry {
    authorization: SignedAuthorization,
    selected: BTreeSet<BeaconRef>,
    signals: Mutex<Vec<Signal>>,
    /// Device executions still running for this proof.
    pending: watch::Sender<usize>,
}

impl ProofEntry {
    pub fn new(authorization: SignedAuthorization) -> Self {
        let selected = authorization.payload.beacons.iter().cloned().collect();
        let (pending, _) = watch::channel(0);
        Self {
            authorization,
            selected,
            signals: Mutex::new(Vec::new()),
            pending,
        }
    }

    pub fn identifier(&self) -> &ProofId {
        self.authorization.payload.identifier()
    }

    pub fn authorization(&self) -> &SignedAuthorization {
        &self.authorization
    }

    pub fn properties(&self) -> &LocationProofProperties {
        &self.authorization.payload.properties
    }

    pub fn selected_beacons(&self) -> &BTreeSet<BeaconRef> {
        &self.selected
    }

    pub fn validity(&self) -> ValidityWindow {
        self.authorization.payload.validity
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.signals.lock().clone()
    }

    pub fn append_signals(&self, signals: Vec<Signal>) {
        self.signals.lock().extend(signals);
    }

    pub fn begin_execution(&self) {
        self.pending.send_modify(|n| *n += 1);
    }

    pub fn end_execution(&self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }

    pub fn pending_executions(&self) -> usize {
        *self.pending.borrow()
    }

    /// Resolves once no execution is in flight.
    pub async fn settled(&self) {
        let mut rx = self.pending.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    pub fn view(&self) -> ProofEntryView {
        let payload = &self.authorization.payload;
        ProofEntryView {
            identifier: self.identifier().clone(),
            orchestrator: payload.orchestrator(),
            prover: payload.prover,
            properties: payload.properties.clone(),
            selected_beacons: self.selected.iter().cloned().collect(),
            validity: payload.validity,
            pending_executions: self.pending_executions(),
            signals: self.signals(),
        }
    }
}

/// Serializable snapshot of an entry for the operator console.
#[derive(Clone, Debug, Serialize)]
pub struct ProofEntryView {
    pub identifier: ProofId,
    pub orchestrator: Identity,
    pub prover: Identity,
    pub properties: LocationProofProperties,
    pub selected_beacons: Vec<BeaconRef>,
    pub validity: ValidityWindow,
    pub pending_executions: usize,
    pub signals: Vec<Signal>,
}

#[derive(Default)]
pub struct ProofRegistry {
    entries: RwLock<HashMap<ProofId, Arc<ProofEntry>>>,
}

impl ProofRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `entry`, returning the one it replaced. Executions still running
    /// for a replaced entry keep writing into the old one.
    pub fn insert(&self, entry: ProofEntry) -> Option<Arc<ProofEntry>> {
        let identifier = entry.identifier().clone();
        self.entries.write().insert(identifier, Arc::new(entry))
    }

    pub fn get(&self, identifier: &ProofId) -> Option<Arc<ProofEntry>> {
        self.entries.read().get(identifier).cloned()
    }

    /// All identifiers, sorted.
    pub fn identifiers(&self) -> Vec<ProofId> {
        let mut ids: Vec<ProofId> = self.entries.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
