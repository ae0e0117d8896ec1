use std::time::Duration;

use rvl_engine::EngineError;
use rvl_frame::FrameError;

/// Errors that can occur in controller and worker operations.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// A public operation was called before `initialize`.
    #[error("cannot call \"{op}\" before calling \"initialize\"")]
    NotInitialized { op: &'static str },

    /// `initialize` was called twice.
    #[error("controller is already initialized")]
    AlreadyInitialized,

    /// The controller was shut down.
    #[error("controller is shut down")]
    Closed,

    /// A configuration request was rejected; the previous configuration stays in effect.
    #[error("invalid wave parameters: {0}")]
    InvalidWaveParameters(#[source] EngineError),

    /// A message arrived out of order or with an unexpected type.
    #[error("internal error: {0}")]
    ProtocolViolation(String),

    /// The worker thread ended while the controller still needed it.
    #[error("internal error: worker unexpectedly quit ({0})")]
    WorkerExited(String),

    /// The packet callback panicked; the controller stops relaying.
    #[error("internal error: packet callback panicked ({0})")]
    TransportPanicked(String),

    /// The worker did not report readiness in time.
    #[error("worker not ready after {0:?}")]
    Timeout(Duration),

    /// The worker thread or its channel could not be created.
    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// Frame-level error on the controller/worker channel.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error raised by the engine or a bridge primitive.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The controller already failed; every later call reports the original cause.
    #[error("controller failed: {0}")]
    Fatal(String),

    /// A manager already owns a controller on this channel.
    #[error("a controller for channel {0} already exists")]
    DuplicateChannel(u8),
}

pub type Result<T> = std::result::Result<T, ControllerError>;
