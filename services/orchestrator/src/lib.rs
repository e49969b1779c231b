//! Location proof orchestrator.
//!
//! Selects beacons near a prover's claim, issues signed authorizations, runs
//! the fragment broadcasts on the selected devices and serves the collected
//! signals to the verifier.

pub mod clock;
pub mod config;
pub mod console;
pub mod driver;
pub mod errors;
pub mod orchestrator;
pub mod participant;
pub mod registry;
pub mod selection;
pub mod validator;

#[cfg(test)]
mod tests;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::OrchestratorConfig;
pub use driver::{BeaconDriver, TreeBeaconDriver};
pub use errors::{ConfigError, ConsoleError, DriverError, OrchestrationError, RpcError, ValidationError};
pub use orchestrator::{Collaborators, IdentifierSource, Orchestrator, RandomIdentifiers};
pub use participant::{recompute_schedule, Participant};
pub use registry::{ProofEntry, ProofEntryView, ProofRegistry};
pub use selection::{select_beacons, BeaconDirectory, StaticDirectory, TreeDirectory};
pub use validator::{sign_envelope, validate_envelope, KeyringValidator, MessageValidator, SenderRule, ValidationReport};
