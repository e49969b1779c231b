//! Beacon protocol state machine.
//!
//! State: Idle -> Locked -> Locked+Started(fragment i) -> Locked -> Idle

use locus_primitives::SENTINEL;
use serde::Serialize;

/// External trigger, decoded from a write on `isLocked` or `isStarted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Trigger {
    Lock,
    Unlock,
    Start,
    Stop,
}

/// Which boolean control node was written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ControlNode {
    IsLocked,
    IsStarted,
}

impl Trigger {
    pub const fn from_write(node: ControlNode, value: bool) -> Self {
        match (node, value) {
            (ControlNode::IsLocked, true) => Self::Lock,
            (ControlNode::IsLocked, false) => Self::Unlock,
            (ControlNode::IsStarted, true) => Self::Start,
            (ControlNode::IsStarted, false) => Self::Stop,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("device is already locked")]
    AlreadyLocked,

    #[error("{0:?} requires a locked device")]
    NotLocked(Trigger),

    #[error("{0:?} is not allowed while a broadcast is started")]
    AlreadyStarted(Trigger),

    #[error("no broadcast is started")]
    NotStarted,

    #[error("invalid run parameters: {0}")]
    InvalidParameters(&'static str),
}

/// Numeric fields hold [`SENTINEL`] whenever no run is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BeaconProtocolState {
    pub locked: bool,
    pub started: bool,
    pub fragment_current: i64,
    pub fragment_count: i64,
    pub fragment_length: i64,
    pub seed: i64,
}

impl Default for BeaconProtocolState {
    fn default() -> Self {
        Self::IDLE
    }
}

impl BeaconProtocolState {
    pub const IDLE: Self = Self {
        locked: false,
        started: false,
        fragment_current: SENTINEL,
        fragment_count: SENTINEL,
        fragment_length: SENTINEL,
        seed: SENTINEL,
    };

    pub const fn is_idle(&self) -> bool {
        !self.locked
            && !self.started
            && self.fragment_current == SENTINEL
            && self.fragment_count == SENTINEL
            && self.fragment_length == SENTINEL
            && self.seed == SENTINEL
    }

    pub fn reset_numeric(&mut self) {
        self.fragment_current = SENTINEL;
        self.fragment_count = SENTINEL;
        self.fragment_length = SENTINEL;
        self.seed = SENTINEL;
    }

    /// Whether `trigger` is legal from this state.
    pub const fn check(&self, trigger: Trigger) -> Result<(), TransitionError> {
        match trigger {
            Trigger::Lock if self.locked => Err(TransitionError::AlreadyLocked),
            Trigger::Lock => Ok(()),
            Trigger::Unlock | Trigger::Start | Trigger::Stop if !self.locked => Err(TransitionError::NotLocked(trigger)),
            Trigger::Unlock | Trigger::Start if self.started => Err(TransitionError::AlreadyStarted(trigger)),
            Trigger::Stop if !self.started => Err(TransitionError::NotStarted),
            _ => Ok(()),
        }
    }

    /// `fragment_current` is -1 or within `[1, fragment_count]`.
    pub const fn fragment_in_range(&self) -> bool {
        self.fragment_current == SENTINEL || (self.fragment_current >= 1 && self.fragment_current <= self.fragment_count)
    }
}

/// Parameters read from the tree when a broadcast starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunParameters {
    pub seed: i64,
    pub fragment_count: u32,
    pub fragment_length_ms: u64,
}

impl RunParameters {
    pub fn new(seed: Option<i64>, fragment_count: Option<i64>, fragment_length: Option<i64>) -> Result<Self, TransitionError> {
        let seed = seed.ok_or(TransitionError::InvalidParameters("seed missing"))?;
        let fragment_count = fragment_count
            .filter(|c| *c > 0)
            .and_then(|c| u32::try_from(c).ok())
            .ok_or(TransitionError::InvalidParameters("fragment count must be positive"))?;
        let fragment_length_ms = fragment_length
            .filter(|l| *l > 0)
            .and_then(|l| u64::try_from(l).ok())
            .ok_or(TransitionError::InvalidParameters("fragment length must be positive"))?;

        Ok(Self {
            seed,
            fragment_count,
            fragment_length_ms,
        })
    }

    /// Length as stored in the tree and in [`BeaconProtocolState`].
    pub fn fragment_length(&self) -> i64 {
        i64::try_from(self.fragment_length_ms).unwrap_or(i64::MAX)
    }
}
