//! Knowledge-tree seam.
//!
//! Devices are addressed by hierarchical paths and controlled through writes on
//! their nodes. The protocol core only needs read, write and
//! subscribe-to-write; [`MemoryTree`] provides those in-process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NodeValue {
    Bool(bool),
    Int(i64),
    Real(f64),
}

impl NodeValue {
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            NodeValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i64> {
        match self {
            NodeValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            NodeValue::Real(v) => Some(*v),
            NodeValue::Int(v) => Some(*v as f64),
            NodeValue::Bool(_) => None,
        }
    }
}

/// Receives every write made to a subscribed address.
pub trait WriteSubscriber: Send + Sync {
    fn on_write(&self, address: &str, value: &NodeValue, caller: Option<&str>);
}

impl<F> WriteSubscriber for F
where
    F: Fn(&str, &NodeValue, Option<&str>) + Send + Sync,
{
    fn on_write(&self, address: &str, value: &NodeValue, caller: Option<&str>) {
        self(address, value, caller)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub trait KnowledgeTree: Send + Sync {
    fn read(&self, address: &str) -> Option<NodeValue>;

    /// Stores `value` and notifies subscribers before returning.
    fn write(&self, address: &str, value: NodeValue, caller: Option<&str>);

    fn subscribe(&self, address: &str, subscriber: Arc<dyn WriteSubscriber>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

type Subscribers = HashMap<String, Vec<(SubscriptionId, Arc<dyn WriteSubscriber>)>>;

/// Single-process tree. Subscribers run on the writer's thread with no lock
/// held, so they may write back into the tree.
#[derive(Default)]
pub struct MemoryTree {
    values: RwLock<HashMap<String, NodeValue>>,
    subscribers: RwLock<Subscribers>,
    next_id: AtomicU64,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Addresses under `prefix`, sorted.
    pub fn children(&self, prefix: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .values
            .read()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        out.sort();
        out
    }
}

impl KnowledgeTree for MemoryTree {
    fn read(&self, address: &str) -> Option<NodeValue> {
        self.values.read().get(address).copied()
    }

    fn write(&self, address: &str, value: NodeValue, caller: Option<&str>) {
        self.values.write().insert(address.to_string(), value);

        let targets: Vec<Arc<dyn WriteSubscriber>> = self
            .subscribers
            .read()
            .get(address)
            .map(|subs| subs.iter().map(|(_, s)| Arc::clone(s)).collect())
            .unwrap_or_default();

        for subscriber in targets {
            subscriber.on_write(address, &value, caller);
        }
    }

    fn subscribe(&self, address: &str, subscriber: Arc<dyn WriteSubscriber>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .entry(address.to_string())
            .or_default()
            .push((id, subscriber));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut subscribers = self.subscribers.write();
        for subs in subscribers.values_mut() {
            subs.retain(|(sid, _)| *sid != id);
        }
        subscribers.retain(|_, subs| !subs.is_empty());
    }
}

// =============================================================================
// Device Nodes
// =============================================================================

pub const IS_LOCKED: &str = "isLocked";
pub const IS_STARTED: &str = "isStarted";
pub const SEED: &str = "seed";
pub const FRAGMENT_COUNT: &str = "fragmentCount";
pub const FRAGMENT_CURRENT: &str = "fragmentCurrent";
pub const FRAGMENT_LENGTH: &str = "fragmentLength";
pub const CURRENT_INTENSITY: &str = "currentIntensity";

/// Control and report nodes of one beacon+witness pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceNodes {
    root: String,
}

impl DeviceNodes {
    pub fn new(root: impl Into<String>) -> Self {
        let root: String = root.into();
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn node(&self, name: &str) -> String {
        format!("{}/{}", self.root, name)
    }

    pub fn is_locked(&self) -> String {
        self.node(IS_LOCKED)
    }

    pub fn is_started(&self) -> String {
        self.node(IS_STARTED)
    }

    pub fn seed(&self) -> String {
        self.node(SEED)
    }

    pub fn fragment_count(&self) -> String {
        self.node(FRAGMENT_COUNT)
    }

    pub fn fragment_current(&self) -> String {
        self.node(FRAGMENT_CURRENT)
    }

    pub fn fragment_length(&self) -> String {
        self.node(FRAGMENT_LENGTH)
    }

    pub fn current_intensity(&self) -> String {
        self.node(CURRENT_INTENSITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    type Seen = Arc<Mutex<Vec<(String, NodeValue, Option<String>)>>>;

    fn recorder(seen: &Seen) -> Arc<dyn WriteSubscriber> {
        let seen = Arc::clone(seen);
        Arc::new(move |address: &str, value: &NodeValue, caller: Option<&str>| {
            seen.lock().push((address.to_string(), *value, caller.map(str::to_string)));
        })
    }

    #[test]
    fn test_device_nodes_paths() {
        let nodes = DeviceNodes::new("site/hall/lamp-1/");
        assert_eq!(nodes.root(), "site/hall/lamp-1");
        assert_eq!(nodes.is_locked(), "site/hall/lamp-1/isLocked");
        assert_eq!(nodes.current_intensity(), "site/hall/lamp-1/currentIntensity");
    }

    #[test]
    fn test_node_value_accessors() {
        assert_eq!(NodeValue::Bool(true).as_bool(), Some(true));
        assert_eq!(NodeValue::Int(3).as_bool(), None);
        assert_eq!(NodeValue::Int(3).as_int(), Some(3));
        assert_eq!(NodeValue::Int(3).as_real(), Some(3.0));
        assert_eq!(NodeValue::Bool(false).as_real(), None);
    }

    #[test]
    fn test_subscribers_see_writes_with_caller() {
        let tree = MemoryTree::new();
        let seen: Seen = Arc::default();
        tree.subscribe("a/isLocked", recorder(&seen));

        tree.write("a/isLocked", NodeValue::Bool(true), Some("orchestrator"));
        tree.write("a/seed", NodeValue::Int(7), None);

        assert_eq!(tree.read("a/isLocked"), Some(NodeValue::Bool(true)));
        assert_eq!(tree.read("a/seed"), Some(NodeValue::Int(7)));
        assert_eq!(
            seen.lock().as_slice(),
            &[("a/isLocked".to_string(), NodeValue::Bool(true), Some("orchestrator".to_string()))]
        );
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let tree = MemoryTree::new();
        let seen: Seen = Arc::default();
        let id = tree.subscribe("a/seed", recorder(&seen));
        let other = tree.subscribe("a/seed", recorder(&seen));

        tree.write("a/seed", NodeValue::Int(1), None);
        tree.unsubscribe(id);
        tree.write("a/seed", NodeValue::Int(2), None);
        tree.unsubscribe(other);
        tree.write("a/seed", NodeValue::Int(3), None);

        assert_eq!(seen.lock().len(), 3);
    }

    #[test]
    fn test_subscriber_may_write_back() {
        let tree = Arc::new(MemoryTree::new());
        let weak = Arc::downgrade(&tree);
        tree.subscribe(
            "a/isStarted",
            Arc::new(move |_: &str, value: &NodeValue, _: Option<&str>| {
                if let Some(tree) = weak.upgrade() {
                    tree.write("a/fragmentCurrent", *value, Some("device"));
                }
            }),
        );

        tree.write("a/isStarted", NodeValue::Int(1), None);
        assert_eq!(tree.read("a/fragmentCurrent"), Some(NodeValue::Int(1)));
    }

    #[test]
    fn test_children_sorted_under_prefix() {
        let tree = MemoryTree::new();
        tree.write("b/seed", NodeValue::Int(1), None);
        tree.write("a/seed", NodeValue::Int(1), None);
        tree.write("a/isLocked", NodeValue::Bool(false), None);

        assert_eq!(tree.children("a/"), vec!["a/isLocked".to_string(), "a/seed".to_string()]);
        assert!(tree.children("c/").is_empty());
    }
}
