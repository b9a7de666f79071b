use thiserror::Error;

/// Failures raised by a game engine capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine rejected request: {0}")]
    Rejected(String),
    #[error("unknown entity {0}")]
    UnknownEntity(String),
    #[error("engine state lock poisoned")]
    Poisoned,
    #[error("engine already destroyed")]
    Destroyed,
}
