//! Multi-channel front end: one controller per channel, one shared transport.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::sync::Arc;

use bytes::Bytes;
use rvl_engine::{ControllerConfig, Engine, LogLevel};
use tracing::{info, warn};

use crate::controller::{Controller, RuntimeConfig};
use crate::error::{ControllerError, Result};

/// Network side of a manager. Receives every packet any controller emits.
pub trait PacketTransport: Send + Sync + 'static {
    fn send_packet(&self, channel: u8, payload: &[u8]) -> io::Result<()>;
}

/// Builds the engine hosted by each new controller.
pub type EngineFactory = Box<dyn Fn(&ControllerConfig) -> Box<dyn Engine> + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    pub device_id: u16,
    /// Used when `create_controller` is not given a level.
    pub default_log_level: LogLevel,
    pub runtime: RuntimeConfig,
}

pub struct Manager {
    config: ManagerConfig,
    transport: Arc<dyn PacketTransport>,
    engine_factory: EngineFactory,
    controllers: BTreeMap<u8, Controller>,
}

impl Manager {
    pub fn new(
        config: ManagerConfig,
        transport: impl PacketTransport,
        engine_factory: impl Fn(&ControllerConfig) -> Box<dyn Engine> + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            engine_factory: Box::new(engine_factory),
            controllers: BTreeMap::new(),
        }
    }

    pub fn device_id(&self) -> u16 {
        self.config.device_id
    }

    /// Create and initialize the controller for `channel`.
    ///
    /// Blocks until the new worker is ready. A failed controller is not kept.
    pub fn create_controller(
        &mut self,
        channel: u8,
        log_level: Option<LogLevel>,
    ) -> Result<&Controller> {
        if self.controllers.contains_key(&channel) {
            return Err(ControllerError::DuplicateChannel(channel));
        }

        let config = ControllerConfig {
            channel,
            log_level: log_level.unwrap_or(self.config.default_log_level),
            device_id: self.config.device_id,
        };
        let engine = (self.engine_factory)(&config);
        let transport = Arc::clone(&self.transport);
        let send_packet = move |payload: Bytes| {
            if let Err(err) = transport.send_packet(channel, &payload) {
                warn!(channel, error = %err, "failed to send packet");
            }
        };

        let mut controller = Controller::new(config, engine, send_packet)
            .with_runtime_config(self.config.runtime.clone());
        controller.initialize()?;
        info!(channel, "controller created");

        Ok(self.controllers.entry(channel).or_insert(controller))
    }

    pub fn controller(&self, channel: u8) -> Option<&Controller> {
        self.controllers.get(&channel)
    }

    /// All controllers, ordered by channel.
    pub fn controllers(&self) -> impl Iterator<Item = &Controller> {
        self.controllers.values()
    }

    /// Shut down and forget the controller for `channel`.
    pub fn remove_controller(&mut self, channel: u8) -> bool {
        match self.controllers.remove(&channel) {
            Some(mut controller) => {
                controller.shutdown();
                true
            }
            None => false,
        }
    }

    /// Hand a received packet to every controller.
    ///
    /// Delivery continues past failing controllers; the first error is returned.
    pub fn deliver_inbound_packet(&self, packet: impl Into<Bytes>) -> Result<()> {
        let packet = packet.into();
        let mut first_err = None;
        for (channel, controller) in &self.controllers {
            if let Err(err) = controller.deliver_inbound_packet(packet.clone()) {
                warn!(channel = *channel, error = %err, "failed to deliver inbound packet");
                first_err.get_or_insert(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("config", &self.config)
            .field("channels", &self.controllers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
