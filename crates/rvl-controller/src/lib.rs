//! Controllers for networked RVL light groups.
//!
//! A [`Controller`] drives one channel. It owns a dedicated worker thread that
//! hosts one engine instance; the two sides share no memory and talk only
//! through framed JSON [`Message`]s over a private socket pair.

pub mod controller;
pub mod error;
pub mod manager;
pub mod message;
mod worker;

pub use controller::{Controller, FatalHook, RuntimeConfig, SendPacket};
pub use error::{ControllerError, Result};
pub use manager::{EngineFactory, Manager, ManagerConfig, PacketTransport};
pub use message::Message;
