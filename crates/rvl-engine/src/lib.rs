//! Host side of the RVL computation engine.
//!
//! The engine owns protocol parsing and wave math; this crate gives it the
//! primitives it cannot provide for itself:
//!
//! - [`Bridge`]: packet assembly/disassembly, the local clock, device identity
//!   and console output
//! - [`LinearMemory`]: the engine's address space, reachable from the host only
//!   through bounds-checked copies
//! - [`Engine`]: the calls the host makes into an engine instance
//!
//! It also defines the configuration types shared by controllers and workers.

pub mod bridge;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod error;
pub mod memory;
pub mod wave;

pub use bridge::{Bridge, Env};
pub use buffer::{PacketBuffer, PacketCursor, WRITE_BUFFER_SIZE};
pub use config::{ControllerConfig, LogLevel};
pub use engine::{Engine, EngineInstance};
pub use error::{EngineError, Result};
pub use memory::{LinearMemory, DEFAULT_MEMORY_SIZE};
pub use wave::{
    Wave, WaveParameters, WaveParametersRequest, DEFAULT_DISTANCE_PERIOD, DEFAULT_TIME_PERIOD,
    MAX_WAVES,
};
