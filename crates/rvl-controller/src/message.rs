//! Messages exchanged between a controller and its worker.
//!
//! Each frame carries exactly one JSON object tagged by a `type` field.
//! Packet payloads travel base64-encoded.

use std::io::{Read, Write};

use bytes::Bytes;
use rvl_engine::WaveParameters;
use rvl_frame::{FrameReader, FrameWriter};
use serde::{Deserialize, Serialize};

use crate::error::{ControllerError, Result};

/// One controller/worker message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// Worker → controller: the engine is initialized.
    InitComplete,
    /// Worker → controller: a fully encoded packet to transmit.
    SendPacket {
        #[serde(with = "base64_payload")]
        payload: Bytes,
    },
    /// Controller → worker: a packet received from the network.
    ReceivedPacket {
        #[serde(with = "base64_payload")]
        payload: Bytes,
    },
    /// Controller → worker: new wave configuration.
    SetWaveParameters {
        #[serde(rename = "waveParameters")]
        wave_parameters: WaveParameters,
    },
    /// Controller → worker: lights on or off.
    SetPowerState {
        #[serde(rename = "powerState")]
        power_state: bool,
    },
    /// Controller → worker: global brightness.
    SetBrightness { brightness: u8 },
}

impl Message {
    /// The wire tag of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::InitComplete => "initComplete",
            Message::SendPacket { .. } => "sendPacket",
            Message::ReceivedPacket { .. } => "receivedPacket",
            Message::SetWaveParameters { .. } => "setWaveParameters",
            Message::SetPowerState { .. } => "setPowerState",
            Message::SetBrightness { .. } => "setBrightness",
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode one message. Unknown tags and malformed bodies are protocol violations.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| ControllerError::ProtocolViolation(format!("malformed message: {err}")))
    }
}

pub(crate) fn send_message<W: Write>(writer: &mut FrameWriter<W>, message: &Message) -> Result<()> {
    let payload = message.encode()?;
    writer.send(&payload)?;
    Ok(())
}

pub(crate) fn recv_message<R: Read>(reader: &mut FrameReader<R>) -> Result<Message> {
    let payload = reader.read_frame()?;
    Message::decode(&payload)
}

mod base64_payload {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S>(payload: &Bytes, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
