//! Beacon selection by proximity to a claimed location.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use locus_adaptation::{DeviceNodes, KnowledgeTree, NodeValue};
use locus_primitives::{BeaconDescriptor, BeaconKind, BeaconRef, Location, LocationProximity, ProximityCode};
use parking_lot::RwLock;

/// Source of the beacons currently available for selection.
pub trait BeaconDirectory: Send + Sync {
    fn beacons(&self) -> Vec<BeaconDescriptor>;
}

/// Fixed list of beacons, e.g. from a deployment file.
#[derive(Default)]
pub struct StaticDirectory {
    entries: RwLock<Vec<BeaconDescriptor>>,
}

impl StaticDirectory {
    pub fn new(entries: Vec<BeaconDescriptor>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn add(&self, descriptor: BeaconDescriptor) {
        self.entries.write().push(descriptor);
    }
}

impl BeaconDirectory for StaticDirectory {
    fn beacons(&self) -> Vec<BeaconDescriptor> {
        self.entries.read().clone()
    }
}

/// Hides beacons that are absent from the tree or locked by a running proof.
pub struct TreeDirectory {
    inner: Arc<dyn BeaconDirectory>,
    tree: Arc<dyn KnowledgeTree>,
}

impl TreeDirectory {
    pub fn new(inner: Arc<dyn BeaconDirectory>, tree: Arc<dyn KnowledgeTree>) -> Self {
        Self { inner, tree }
    }
}

impl BeaconDirectory for TreeDirectory {
    fn beacons(&self) -> Vec<BeaconDescriptor> {
        self.inner
            .beacons()
            .into_iter()
            .filter(|descriptor| {
                let nodes = DeviceNodes::new(descriptor.reference.address.as_str());
                matches!(self.tree.read(&nodes.is_locked()), Some(NodeValue::Bool(false)))
            })
            .collect()
    }
}

/// Beacons of a requested kind whose proximity to `claim` reaches `minimum`,
/// strongest first. Beacons located with the other variant are skipped; a
/// beacon listed under several locations appears once, at its best proximity.
pub fn select_beacons(
    directory: &dyn BeaconDirectory,
    claim: &Location,
    kinds: &[BeaconKind],
    minimum: ProximityCode,
) -> Vec<(BeaconRef, LocationProximity)> {
    let mut best: BTreeMap<BeaconRef, LocationProximity> = BTreeMap::new();
    for descriptor in directory.beacons() {
        if !kinds.contains(&descriptor.reference.kind) || !descriptor.location.same_kind(claim) {
            continue;
        }
        let Ok(proximity) = claim.proximity_to(&descriptor.location) else {
            continue;
        };
        if !proximity.is_at_least(minimum) {
            continue;
        }
        best.entry(descriptor.reference)
            .and_modify(|current| {
                if proximity > *current {
                    *current = proximity;
                }
            })
            .or_insert(proximity);
    }

    let mut selected: Vec<(BeaconRef, LocationProximity)> = best.into_iter().collect();
    selected.sort_by(|a, b| match b.1.cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    selected
}
