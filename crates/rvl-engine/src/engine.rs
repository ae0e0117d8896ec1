use std::fmt;

use bytes::Bytes;

use crate::bridge::{Bridge, Env};
use crate::config::ControllerConfig;
use crate::error::Result;
use crate::memory::{LinearMemory, DEFAULT_MEMORY_SIZE};
use crate::wave::WaveParameters;

/// Calls the host makes into an engine.
///
/// Each call receives an [`Env`] through which the engine reaches the bridge
/// primitives and its own linear memory. Errors returned from any call are
/// fatal for the worker hosting the engine.
pub trait Engine: Send {
    /// Linear memory to allocate for this engine.
    fn memory_size(&self) -> usize {
        DEFAULT_MEMORY_SIZE
    }

    /// One-time setup, before any other call.
    fn init(&mut self, env: &mut Env<'_>, config: &ControllerConfig) -> Result<()>;

    fn update_wave_settings(&mut self, env: &mut Env<'_>, params: &WaveParameters) -> Result<()>;

    fn update_power_state(&mut self, env: &mut Env<'_>, on: bool) -> Result<()>;

    fn update_brightness(&mut self, env: &mut Env<'_>, brightness: u8) -> Result<()>;

    /// Periodic service call: protocol timing, inbound packet handling, rendering.
    fn tick(&mut self, env: &mut Env<'_>) -> Result<()> {
        let _ = env;
        Ok(())
    }
}

/// One engine together with the bridge and memory it runs against.
pub struct EngineInstance {
    engine: Box<dyn Engine>,
    bridge: Bridge,
    memory: LinearMemory,
}

impl EngineInstance {
    /// Allocate memory for `engine` and attach a bridge reporting `device_id`.
    pub fn new(engine: Box<dyn Engine>, device_id: u16) -> Self {
        let memory = LinearMemory::new(engine.memory_size());
        Self {
            engine,
            bridge: Bridge::new(device_id),
            memory,
        }
    }

    /// Replace the default bridge, e.g. to redirect console output.
    pub fn with_bridge(mut self, bridge: Bridge) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn init(&mut self, config: &ControllerConfig) -> Result<()> {
        let mut env = Env::new(&mut self.bridge, &mut self.memory);
        self.engine.init(&mut env, config)
    }

    pub fn update_wave_settings(&mut self, params: &WaveParameters) -> Result<()> {
        params.validate()?;
        let mut env = Env::new(&mut self.bridge, &mut self.memory);
        self.engine.update_wave_settings(&mut env, params)
    }

    pub fn update_power_state(&mut self, on: bool) -> Result<()> {
        let mut env = Env::new(&mut self.bridge, &mut self.memory);
        self.engine.update_power_state(&mut env, on)
    }

    pub fn update_brightness(&mut self, brightness: u8) -> Result<()> {
        let mut env = Env::new(&mut self.bridge, &mut self.memory);
        self.engine.update_brightness(&mut env, brightness)
    }

    pub fn tick(&mut self) -> Result<()> {
        let mut env = Env::new(&mut self.bridge, &mut self.memory);
        self.engine.tick(&mut env)
    }

    /// Hand a received packet to the engine's inbound queue.
    pub fn enqueue_packet(&mut self, packet: Bytes) {
        self.bridge.add_packet_to_queue(packet);
    }

    /// Packets the engine finished since the last call.
    pub fn take_outbound(&mut self) -> Vec<Bytes> {
        self.bridge.drain_outbound().collect()
    }
}

impl fmt::Debug for EngineInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineInstance")
            .field("bridge", &self.bridge)
            .field("memory", &self.memory)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;
    use crate::error::EngineError;
    use crate::wave::{Wave, MAX_WAVES};

    /// Announces itself on init and echoes every inbound packet on tick.
    #[derive(Default)]
    struct EchoEngine;

    impl Engine for EchoEngine {
        fn memory_size(&self) -> usize {
            256
        }

        fn init(&mut self, env: &mut Env<'_>, config: &ControllerConfig) -> Result<()> {
            env.begin_write(config.channel);
            env.write16(env.get_device_id())?;
            env.end_write()
        }

        fn update_wave_settings(
            &mut self,
            _env: &mut Env<'_>,
            _params: &WaveParameters,
        ) -> Result<()> {
            Ok(())
        }

        fn update_power_state(&mut self, _env: &mut Env<'_>, _on: bool) -> Result<()> {
            Ok(())
        }

        fn update_brightness(&mut self, _env: &mut Env<'_>, _brightness: u8) -> Result<()> {
            Ok(())
        }

        fn tick(&mut self, env: &mut Env<'_>) -> Result<()> {
            loop {
                let len = env.parse_packet();
                if len == 0 {
                    return Ok(());
                }
                env.read(0, len)?;
                env.begin_write(0);
                env.write(0, len)?;
                env.end_write()?;
            }
        }
    }

    fn config() -> ControllerConfig {
        ControllerConfig {
            channel: 1,
            log_level: LogLevel::Info,
            device_id: 0x0102,
        }
    }

    #[test]
    fn init_packets_are_collected() {
        let mut instance = EngineInstance::new(Box::<EchoEngine>::default(), 0x0102);
        instance.init(&config()).unwrap();

        let packets = instance.take_outbound();
        assert_eq!(packets.len(), 1);
        assert_eq!(packets[0].as_ref(), &[0x01, 0x02]);
        assert!(instance.take_outbound().is_empty());
    }

    #[test]
    fn tick_processes_queued_packets() {
        let mut instance = EngineInstance::new(Box::<EchoEngine>::default(), 1);
        instance.enqueue_packet(Bytes::from_static(b"abc"));
        instance.enqueue_packet(Bytes::from_static(b"de"));
        instance.tick().unwrap();

        let packets = instance.take_outbound();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].as_ref(), b"abc");
        assert_eq!(packets[1].as_ref(), b"de");
    }

    #[test]
    fn oversized_packet_fails_memory_bounds() {
        let mut instance = EngineInstance::new(Box::<EchoEngine>::default(), 1);
        instance.enqueue_packet(Bytes::from(vec![0u8; 300]));

        let err = instance.tick().unwrap_err();
        assert!(matches!(err, EngineError::OutOfBounds { .. }));
        assert!(instance.take_outbound().is_empty());
    }

    #[test]
    fn too_many_waves_never_reach_engine() {
        let mut instance = EngineInstance::new(Box::<EchoEngine>::default(), 1);
        let params = WaveParameters {
            waves: vec![Wave::pulsing(1, 2, 3); MAX_WAVES + 1],
            time_period: 255,
            distance_period: 32,
        };

        assert!(matches!(
            instance.update_wave_settings(&params),
            Err(EngineError::TooManyWaves { .. })
        ));
    }
}
