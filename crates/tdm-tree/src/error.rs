//! Tree model errors.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

/// Errors reported by the device tree and its collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    /// Row, column, or parent address outside the tree.
    #[error("invalid address")]
    InvalidAddress,

    /// Address whose node has been removed since it was computed.
    #[error("stale address (node was removed)")]
    StaleAddress,

    /// Capability key missing from the registry.
    #[error("unknown capability '{0}'")]
    UnknownCapability(SmolStr),

    /// Structural mutation range outside the parent's rows.
    #[error("row range {position}+{count} out of bounds (rows: {rows})")]
    OutOfRangeMutation {
        position: usize,
        count: usize,
        rows: usize,
    },

    /// Settings store rejected a write, delete, or flush.
    #[error("persistence write failed: {0}")]
    PersistenceWriteFailure(SmolStr),

    /// No device with the given topic.
    #[error("device '{0}' not found")]
    DeviceNotFound(SmolStr),

    /// Device topic already present in the device index.
    #[error("device '{0}' already exists")]
    DuplicateDevice(SmolStr),

    /// Capability node rejected a value.
    #[error("invalid value '{value}' for capability '{capability}'")]
    InvalidValue { capability: SmolStr, value: SmolStr },

    /// Configuration error.
    #[error("invalid config '{0}'")]
    InvalidConfig(SmolStr),
}

impl TreeError {
    pub(crate) fn persistence(message: impl std::fmt::Display) -> Self {
        Self::PersistenceWriteFailure(SmolStr::new(message.to_string()))
    }
}
