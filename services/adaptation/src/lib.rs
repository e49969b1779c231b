//! Adaptation service for beacon/witness device pairs.
//!
//! Binds a [`Beacon`] and a [`Witness`] to a subtree of the knowledge tree and
//! runs the lock/start/stop protocol that emits seeded fragment broadcasts.

pub mod device;
pub mod service;
pub mod sim;
pub mod state;
pub mod tree;


pub use device::{Beacon, DeviceError, SampleSink, Witness};
pub use service::{AdaptationConfig, AdaptationService};
pub use sim::{BeaconEvent, SimulatedBeacon, SimulatedWitness};
pub use state::{BeaconProtocolState, ControlNode, RunParameters, TransitionError, Trigger};
pub use tree::{DeviceNodes, KnowledgeTree, MemoryTree, NodeValue, SubscriptionId, WriteSubscriber};
