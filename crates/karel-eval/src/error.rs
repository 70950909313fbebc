//! Error types for the Karel execution engine.

use karel_types::KarelError;
use karel_world::WorldError;

/// Errors surfaced by the engine's API.
///
/// A misbehaving student program is not an `EvalError`: its fault is
/// recorded in the environment's [`ExecutionState`](crate::ExecutionState)
/// as a [`KarelError`]. These variants cover the host's own mistakes.
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    /// The source failed validation before any execution began.
    #[error("program rejected: {0}")]
    Rejected(KarelError),

    /// A world document was malformed or inconsistent.
    #[error(transparent)]
    World(#[from] WorldError),

    /// A configuration document could not be parsed.
    #[error("invalid execution config: {0}")]
    Config(#[from] serde_json::Error),

    /// No test world is registered under this name.
    #[error("no test world named '{0}'")]
    UnknownTestWorld(String),
}

/// Result alias for engine operations.
pub type EvalResult<T> = Result<T, EvalError>;
