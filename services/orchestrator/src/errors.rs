//! Error types surfaced by the orchestrator.

use locus_primitives::{Identity, ProofId};

/// Envelope rejected before any state was touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("message addressed to {found}, not to this node")]
    WrongReceiver { found: Identity },

    #[error("sender certificate is invalid or expired")]
    InvalidCertificate,

    #[error("nonce already used")]
    StaleNonce,

    #[error("unknown sender {0}")]
    UnknownSender(Identity),

    #[error("sender {0} is not allowed to make this request")]
    UnauthorizedSender(Identity),

    #[error("signature does not match the sender")]
    BadSignature,
}

/// Request was authentic but cannot be served.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrchestrationError {
    #[error("unknown proof identifier {0}")]
    UnknownProof(ProofId),

    #[error("authorization for {0} does not match the one issued")]
    AuthorizationMismatch(ProofId),

    #[error("authorization for {identifier} is not valid at {now} (valid until {not_after})")]
    AuthorizationExpired {
        identifier: ProofId,
        not_after: u64,
        now: u64,
    },

    #[error("proof requested by {0}, who is not the authorized prover")]
    ProverMismatch(Identity),

    #[error("no eligible beacons near the claimed location")]
    NoEligibleBeacons,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    #[error("beacon {0} is not present in the tree")]
    Unreachable(String),

    #[error("beacon {0} is locked by another proof")]
    Busy(String),

    #[error("beacon {0} refused to start")]
    Rejected(String),

    #[error("proof parameters cannot be written to the tree: {0}")]
    InvalidParameters(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error("cannot render entry: {0}")]
    Render(#[from] serde_json::Error),
}
