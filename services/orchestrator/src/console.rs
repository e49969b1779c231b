//! Operator view of the proof registry.

use locus_primitives::ProofId;

use crate::errors::{ConsoleError, OrchestrationError};
use crate::registry::ProofRegistry;

pub fn list_identifiers(registry: &ProofRegistry) -> Vec<ProofId> {
    registry.identifiers()
}

/// One entry rendered as pretty JSON.
pub fn show_entry(registry: &ProofRegistry, identifier: &ProofId) -> Result<String, ConsoleError> {
    let entry = registry
        .get(identifier)
        .ok_or_else(|| OrchestrationError::UnknownProof(identifier.clone()))?;
    Ok(serde_json::to_string_pretty(&entry.view())?)
}
