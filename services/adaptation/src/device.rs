//! Device I/O seams for a beacon and its witness.

use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("device not available: {0}")]
    Unavailable(String),

    #[error("device I/O failed: {0}")]
    Io(String),
}

/// Called with every sample a witness takes.
pub type SampleSink = Arc<dyn Fn(f64) + Send + Sync>;

/// Emits an ambient signal (light, sound) with a given on/off period.
pub trait Beacon: Send + Sync {
    /// Device-specific preparation, run when the pair is locked.
    fn setup(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn start(&self, period_ms: u64) -> Result<(), DeviceError>;

    fn stop(&self) -> Result<(), DeviceError>;
}

/// Samples the ambient signal. Each `start` opens a new sample sequence that
/// runs until `stop`.
pub trait Witness: Send + Sync {
    fn start(&self, period_ms: u64, on_sample: SampleSink) -> Result<(), DeviceError>;

    fn stop(&self) -> Result<(), DeviceError>;
}
