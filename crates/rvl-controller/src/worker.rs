//! Worker runtime: one engine instance on its own thread.

use std::any::Any;
use std::os::unix::net::UnixStream;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rvl_engine::{ControllerConfig, Engine, EngineInstance};
use rvl_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use tracing::{debug, error, info_span, trace};

use crate::error::{ControllerError, Result};
use crate::message::{recv_message, send_message, Message};

const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub(crate) struct WorkerOptions {
    pub tick_interval: Option<Duration>,
    pub max_message_size: usize,
}

/// Start a worker thread for `engine`, configured from the serialized `config_json`.
pub(crate) fn spawn(
    config_json: Vec<u8>,
    stream: UnixStream,
    engine: Box<dyn Engine>,
    options: WorkerOptions,
    name: String,
) -> Result<JoinHandle<Result<()>>> {
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            let result = run(&config_json, stream, engine, &options);
            if let Err(err) = &result {
                error!(error = %err, "worker stopped");
            }
            result
        })
        .map_err(ControllerError::Spawn)
}

/// Describe how a finished worker thread ended.
pub(crate) fn exit_status(handle: JoinHandle<Result<()>>) -> String {
    match handle.join() {
        Ok(Ok(())) => "worker exited".to_string(),
        Ok(Err(err)) => err.to_string(),
        Err(panic) => format!("worker panicked: {}", panic_message(panic.as_ref())),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(text) = panic.downcast_ref::<&str>() {
        text
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text
    } else {
        "unknown panic payload"
    }
}

fn run(
    config_json: &[u8],
    stream: UnixStream,
    engine: Box<dyn Engine>,
    options: &WorkerOptions,
) -> Result<()> {
    let config: ControllerConfig = serde_json::from_slice(config_json)?;
    let span = info_span!(
        "worker",
        channel = config.channel,
        device_id = config.device_id,
        log_level = %config.log_level
    );
    let _enter = span.enter();

    let tick_interval = options.tick_interval.map(|d| d.max(MIN_TICK_INTERVAL));
    let reader_stream = stream.try_clone().map_err(FrameError::Io)?;
    reader_stream
        .set_read_timeout(tick_interval)
        .map_err(FrameError::Io)?;

    let frame_config = FrameConfig {
        max_payload_size: options.max_message_size,
    };
    let mut reader = FrameReader::with_config(reader_stream, frame_config.clone());
    let mut writer = FrameWriter::with_config(stream, frame_config);

    let mut instance = EngineInstance::new(engine, config.device_id);
    instance.init(&config)?;

    // Packets produced during init go out only after readiness is announced.
    send_message(&mut writer, &Message::InitComplete)?;
    debug!("worker ready");
    flush_outbound(&mut instance, &mut writer)?;

    let mut next_tick = tick_interval.map(|interval| Instant::now() + interval);
    loop {
        if let (Some(due), Some(interval)) = (next_tick, tick_interval) {
            let now = Instant::now();
            if now >= due {
                instance.tick()?;
                flush_outbound(&mut instance, &mut writer)?;
                next_tick = Some(now + interval);
            }
        }

        match recv_message(&mut reader) {
            Ok(message) => {
                dispatch(&mut instance, message)?;
                flush_outbound(&mut instance, &mut writer)?;
            }
            Err(ControllerError::Frame(err)) if err.is_timeout() => {}
            Err(ControllerError::Frame(FrameError::ConnectionClosed)) => {
                debug!("controller closed the channel");
                return Ok(());
            }
            Err(err) => return Err(err),
        }
    }
}

fn dispatch(instance: &mut EngineInstance, message: Message) -> Result<()> {
    trace!(kind = message.kind(), "message received");
    match message {
        Message::ReceivedPacket { payload } => instance.enqueue_packet(payload),
        Message::SetWaveParameters { wave_parameters } => {
            instance.update_wave_settings(&wave_parameters)?;
        }
        Message::SetPowerState { power_state } => instance.update_power_state(power_state)?,
        Message::SetBrightness { brightness } => instance.update_brightness(brightness)?,
        other @ (Message::InitComplete | Message::SendPacket { .. }) => {
            return Err(ControllerError::ProtocolViolation(format!(
                "worker received unexpected message type \"{}\"",
                other.kind()
            )));
        }
    }
    Ok(())
}

fn flush_outbound(
    instance: &mut EngineInstance,
    writer: &mut FrameWriter<UnixStream>,
) -> Result<()> {
    for payload in instance.take_outbound() {
        send_message(writer, &Message::SendPacket { payload })?;
    }
    Ok(())
}
