use std::fmt;
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use rvl_engine::{ControllerConfig, Engine, LogLevel, WaveParametersRequest};
use rvl_frame::{FrameConfig, FrameError, FrameReader, FrameWriter, DEFAULT_MAX_PAYLOAD};
use tracing::{debug, error, info};

use crate::error::{ControllerError, Result};
use crate::message::{recv_message, send_message, Message};
use crate::worker::{self, WorkerOptions};

/// Transport callback receiving every packet the engine emits.
pub type SendPacket = Box<dyn FnMut(Bytes) + Send + 'static>;

/// Callback run once when a controller fails after initialization.
pub type FatalHook = Box<dyn FnOnce(&ControllerError) + Send + 'static>;

/// Runtime tuning for a controller and its worker.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// How long `initialize` waits for the worker to report readiness.
    pub init_timeout: Duration,
    /// Period of the engine's service loop. `None` disables ticking.
    pub tick_interval: Option<Duration>,
    /// Largest encoded message accepted in either direction.
    pub max_message_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            init_timeout: Duration::from_secs(5),
            tick_interval: Some(Duration::from_millis(10)),
            max_message_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Handle for one channel of lights.
///
/// Construction only records configuration. [`Controller::initialize`] starts
/// the worker and blocks until it is ready; every other operation is a
/// fire-and-forget send that returns once the message is on the channel.
pub struct Controller {
    config: ControllerConfig,
    runtime: RuntimeConfig,
    state: State,
    fatal: Arc<OnceLock<String>>,
}

enum State {
    Uninitialized {
        engine: Box<dyn Engine>,
        send_packet: SendPacket,
        on_fatal: Option<FatalHook>,
    },
    Initialized(Link),
    Closed,
}

/// Controller side of a running worker.
struct Link {
    writer: Mutex<FrameWriter<UnixStream>>,
    closing: Arc<AtomicBool>,
    relay: Option<JoinHandle<()>>,
}

impl Controller {
    /// Create a controller for `config.channel` hosting `engine`.
    ///
    /// `send_packet` runs on the controller's relay thread for every packet
    /// the engine emits.
    pub fn new(
        config: ControllerConfig,
        engine: Box<dyn Engine>,
        send_packet: impl FnMut(Bytes) + Send + 'static,
    ) -> Self {
        Self {
            config,
            runtime: RuntimeConfig::default(),
            state: State::Uninitialized {
                engine,
                send_packet: Box::new(send_packet),
                on_fatal: None,
            },
            fatal: Arc::new(OnceLock::new()),
        }
    }

    /// Override runtime tuning.
    pub fn with_runtime_config(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }

    /// Run `hook` if the controller fails after initialization.
    ///
    /// Without a hook, failures are only logged and recorded.
    pub fn on_fatal(mut self, hook: impl FnOnce(&ControllerError) + Send + 'static) -> Self {
        if let State::Uninitialized { on_fatal, .. } = &mut self.state {
            *on_fatal = Some(Box::new(hook));
        }
        self
    }

    pub fn channel(&self) -> u8 {
        self.config.channel
    }

    pub fn log_level(&self) -> LogLevel {
        self.config.log_level
    }

    pub fn device_id(&self) -> u16 {
        self.config.device_id
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, State::Initialized(_))
    }

    /// The error that ended this controller, if any.
    pub fn fatal_error(&self) -> Option<&str> {
        self.fatal.get().map(String::as_str)
    }

    /// Start the worker and wait until it reports readiness.
    ///
    /// Any other message arriving first, the worker ending, or the init
    /// timeout elapsing fails initialization for good.
    pub fn initialize(&mut self) -> Result<()> {
        let (engine, send_packet, on_fatal) =
            match std::mem::replace(&mut self.state, State::Closed) {
                State::Uninitialized {
                    engine,
                    send_packet,
                    on_fatal,
                } => (engine, send_packet, on_fatal),
                State::Initialized(link) => {
                    self.state = State::Initialized(link);
                    return Err(ControllerError::AlreadyInitialized);
                }
                State::Closed => return Err(self.closed_error()),
            };

        match self.start(engine, send_packet, on_fatal) {
            Ok(link) => {
                self.state = State::Initialized(link);
                info!(
                    channel = self.config.channel,
                    device_id = self.config.device_id,
                    "controller initialized"
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    channel = self.config.channel,
                    error = %err,
                    "controller initialization failed"
                );
                let _ = self.fatal.set(err.to_string());
                Err(err)
            }
        }
    }

    /// Initialize on tokio's blocking pool.
    #[cfg(feature = "async")]
    pub async fn initialize_async(mut self) -> Result<Self> {
        tokio::task::spawn_blocking(move || self.initialize().map(|()| self))
            .await
            .map_err(|err| ControllerError::Fatal(format!("initialization task failed: {err}")))?
    }

    /// Forward a packet received from the network to the engine.
    pub fn deliver_inbound_packet(&self, packet: impl Into<Bytes>) -> Result<()> {
        self.link("deliverInboundPacket")?
            .send(&Message::ReceivedPacket {
                payload: packet.into(),
            })
    }

    /// Validate, complete with defaults, and forward a wave configuration.
    pub fn set_wave_parameters(&self, request: WaveParametersRequest) -> Result<()> {
        let link = self.link("setWaveParameters")?;
        let wave_parameters = request
            .resolve()
            .map_err(ControllerError::InvalidWaveParameters)?;
        link.send(&Message::SetWaveParameters { wave_parameters })
    }

    pub fn set_power_state(&self, on: bool) -> Result<()> {
        self.link("setPowerState")?
            .send(&Message::SetPowerState { power_state: on })
    }

    pub fn set_brightness(&self, brightness: u8) -> Result<()> {
        self.link("setBrightness")?
            .send(&Message::SetBrightness { brightness })
    }

    /// Stop the worker and wait for the relay thread.
    ///
    /// Intentional shutdown is never reported as a failure.
    pub fn shutdown(&mut self) {
        if let State::Initialized(link) = std::mem::replace(&mut self.state, State::Closed) {
            link.close();
            debug!(channel = self.config.channel, "controller shut down");
        }
    }

    fn start(
        &self,
        engine: Box<dyn Engine>,
        send_packet: SendPacket,
        on_fatal: Option<FatalHook>,
    ) -> Result<Link> {
        let config_json = serde_json::to_vec(&self.config)?;
        let (controller_end, worker_end) = UnixStream::pair().map_err(ControllerError::Spawn)?;
        let worker = worker::spawn(
            config_json,
            worker_end,
            engine,
            WorkerOptions {
                tick_interval: self.runtime.tick_interval,
                max_message_size: self.runtime.max_message_size,
            },
            format!("rvl-worker-{}", self.config.channel),
        )?;

        let frame_config = FrameConfig {
            max_payload_size: self.runtime.max_message_size,
        };
        let reader_stream = controller_end.try_clone().map_err(ControllerError::Spawn)?;
        let mut reader = FrameReader::with_config(reader_stream, frame_config.clone());

        if let Err(err) = await_init_complete(&mut reader, self.runtime.init_timeout) {
            let _ = controller_end.shutdown(Shutdown::Both);
            return Err(match err {
                ControllerError::Frame(FrameError::ConnectionClosed) => {
                    ControllerError::WorkerExited(worker::exit_status(worker))
                }
                other => other,
            });
        }
        reader
            .get_ref()
            .set_read_timeout(None)
            .map_err(FrameError::Io)?;

        let closing = Arc::new(AtomicBool::new(false));
        let relay = Relay {
            channel: self.config.channel,
            reader,
            send_packet,
            on_fatal,
            worker,
            closing: Arc::clone(&closing),
            fatal: Arc::clone(&self.fatal),
        };
        let relay = thread::Builder::new()
            .name(format!("rvl-relay-{}", self.config.channel))
            .spawn(move || relay.run())
            .map_err(ControllerError::Spawn)?;

        Ok(Link {
            writer: Mutex::new(FrameWriter::with_config(controller_end, frame_config)),
            closing,
            relay: Some(relay),
        })
    }

    fn link(&self, op: &'static str) -> Result<&Link> {
        if let Some(cause) = self.fatal.get() {
            return Err(ControllerError::Fatal(cause.clone()));
        }
        match &self.state {
            State::Initialized(link) => Ok(link),
            State::Uninitialized { .. } => Err(ControllerError::NotInitialized { op }),
            State::Closed => Err(ControllerError::Closed),
        }
    }

    fn closed_error(&self) -> ControllerError {
        match self.fatal.get() {
            Some(cause) => ControllerError::Fatal(cause.clone()),
            None => ControllerError::Closed,
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Uninitialized { .. } => "uninitialized",
            State::Initialized(_) => "initialized",
            State::Closed => "closed",
        };
        f.debug_struct("Controller")
            .field("config", &self.config)
            .field("state", &state)
            .field("fatal", &self.fatal.get())
            .finish()
    }
}

impl Link {
    fn send(&self, message: &Message) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        send_message(&mut *writer, message)
    }

    fn close(mut self) {
        self.closing.store(true, Ordering::Release);
        {
            let writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = writer.get_ref().shutdown(Shutdown::Both);
        }
        if let Some(relay) = self.relay.take() {
            // The transport callback may drop its own controller.
            if relay.thread().id() != thread::current().id() {
                let _ = relay.join();
            }
        }
    }
}

/// Steady-state reader: forwards packets and surfaces worker failures.
struct Relay {
    channel: u8,
    reader: FrameReader<UnixStream>,
    send_packet: SendPacket,
    on_fatal: Option<FatalHook>,
    worker: JoinHandle<Result<()>>,
    closing: Arc<AtomicBool>,
    fatal: Arc<OnceLock<String>>,
}

impl Relay {
    fn run(mut self) {
        let failure = loop {
            match recv_message(&mut self.reader) {
                Ok(Message::SendPacket { payload }) => {
                    let send_packet = &mut self.send_packet;
                    let sent = panic::catch_unwind(AssertUnwindSafe(|| send_packet(payload)));
                    if let Err(cause) = sent {
                        break Some(ControllerError::TransportPanicked(
                            worker::panic_message(cause.as_ref()).to_string(),
                        ));
                    }
                }
                Ok(other) => {
                    break Some(ControllerError::ProtocolViolation(format!(
                        "received unexpected message type \"{}\" from worker",
                        other.kind()
                    )));
                }
                Err(ControllerError::Frame(FrameError::ConnectionClosed)) => break None,
                Err(err) => break Some(err),
            }
        };

        if self.closing.load(Ordering::Acquire) {
            if failure.is_none() {
                let _ = self.worker.join();
            }
            return;
        }

        let err = match failure {
            Some(err) => {
                let _ = self.reader.get_ref().shutdown(Shutdown::Both);
                err
            }
            None => ControllerError::WorkerExited(worker::exit_status(self.worker)),
        };

        error!(channel = self.channel, error = %err, "controller failed");
        let _ = self.fatal.set(err.to_string());
        if let Some(hook) = self.on_fatal {
            hook(&err);
        }
    }
}

/// Wait for `InitComplete`, rejecting anything else that arrives first.
fn await_init_complete(reader: &mut FrameReader<UnixStream>, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ControllerError::Timeout(timeout));
        }
        reader
            .get_ref()
            .set_read_timeout(Some(remaining))
            .map_err(FrameError::Io)?;

        match recv_message(reader) {
            Ok(Message::InitComplete) => return Ok(()),
            Ok(other) => {
                return Err(ControllerError::ProtocolViolation(format!(
                    "received worker \"{}\" message before receiving \"initComplete\" message",
                    other.kind()
                )));
            }
            Err(ControllerError::Frame(err)) if err.is_timeout() => continue,
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> (FrameReader<UnixStream>, FrameWriter<UnixStream>) {
        let (left, right) = UnixStream::pair().unwrap();
        (FrameReader::new(left), FrameWriter::new(right))
    }

    #[test]
    fn init_complete_accepted() {
        let (mut reader, mut writer) = pair();
        send_message(&mut writer, &Message::InitComplete).unwrap();
        await_init_complete(&mut reader, Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn packet_before_init_complete_is_a_protocol_violation() {
        let (mut reader, mut writer) = pair();
        send_message(
            &mut writer,
            &Message::SendPacket {
                payload: Bytes::from_static(b"early"),
            },
        )
        .unwrap();
        send_message(&mut writer, &Message::InitComplete).unwrap();

        let err = await_init_complete(&mut reader, Duration::from_secs(1)).unwrap_err();
        match err {
            ControllerError::ProtocolViolation(detail) => assert!(detail.contains("sendPacket")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unknown_message_before_init_complete_rejected() {
        let (mut reader, mut writer) = pair();
        writer.send(br#"{"type":"hello"}"#).unwrap();

        let err = await_init_complete(&mut reader, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, ControllerError::ProtocolViolation(_)));
    }

    #[test]
    fn silent_worker_times_out() {
        let (mut reader, _writer) = pair();
        let started = Instant::now();

        let err = await_init_complete(&mut reader, Duration::from_millis(50)).unwrap_err();
        assert!(matches!(err, ControllerError::Timeout(_)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn closed_channel_reported() {
        let (mut reader, writer) = pair();
        drop(writer);

        let err = await_init_complete(&mut reader, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::Frame(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn relay_treats_late_init_complete_as_fatal() {
        use std::sync::atomic::AtomicUsize;

        let (reader, mut writer) = pair();
        let packets = Arc::new(Mutex::new(Vec::new()));
        let hook_calls = Arc::new(AtomicUsize::new(0));
        let fatal = Arc::new(OnceLock::new());

        let sink = Arc::clone(&packets);
        let calls = Arc::clone(&hook_calls);
        let relay = Relay {
            channel: 3,
            reader,
            send_packet: Box::new(move |payload: Bytes| sink.lock().unwrap().push(payload)),
            on_fatal: Some(Box::new(move |err: &ControllerError| {
                assert!(matches!(err, ControllerError::ProtocolViolation(_)));
                calls.fetch_add(1, Ordering::SeqCst);
            })),
            worker: thread::spawn(|| Ok(())),
            closing: Arc::new(AtomicBool::new(false)),
            fatal: Arc::clone(&fatal),
        };

        send_message(
            &mut writer,
            &Message::SendPacket {
                payload: Bytes::from_static(&[4, 2]),
            },
        )
        .unwrap();
        send_message(&mut writer, &Message::InitComplete).unwrap();
        relay.run();

        assert_eq!(*packets.lock().unwrap(), vec![Bytes::from_static(&[4, 2])]);
        let cause = fatal.get().expect("fatal recorded");
        assert!(cause.contains("initComplete"), "{cause}");
        assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn default_runtime_config() {
        let runtime = RuntimeConfig::default();
        assert_eq!(runtime.init_timeout, Duration::from_secs(5));
        assert_eq!(runtime.tick_interval, Some(Duration::from_millis(10)));
        assert_eq!(runtime.max_message_size, DEFAULT_MAX_PAYLOAD);
    }
}
