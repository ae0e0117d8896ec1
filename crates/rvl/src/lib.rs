//! Host controllers for RVL networked light engines.
//!
//! rvl hosts one opaque light engine per channel on an isolated worker and
//! bridges its byte-level I/O primitives to the host.
//!
//! # Crate Structure
//!
//! - [`frame`]: Length-prefixed framing for the controller/worker channel
//! - [`engine`]: Engine trait, packet buffer bridge, and animation types
//! - [`controller`]: Controller lifecycle, message protocol, and manager
//! - [`logging`]: `tracing` subscriber bootstrap

pub mod logging;

/// Re-export frame types.
pub mod frame {
    pub use rvl_frame::*;
}

/// Re-export engine types.
pub mod engine {
    pub use rvl_engine::*;
}

/// Re-export controller types.
pub mod controller {
    pub use rvl_controller::*;
}

pub use rvl_controller::{Controller, ControllerError, Manager, ManagerConfig, RuntimeConfig};
pub use rvl_engine::{ControllerConfig, Engine, Env, LogLevel, Wave, WaveParametersRequest};
