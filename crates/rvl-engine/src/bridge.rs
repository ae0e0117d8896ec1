use std::collections::VecDeque;
use std::fmt;
use std::io::Write;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::buffer::{PacketBuffer, PacketCursor};
use crate::error::{EngineError, Result};
use crate::memory::LinearMemory;

/// Largest inbound packet whose length `parse_packet` can report.
const MAX_INBOUND_PACKET: usize = u16::MAX as usize;

/// Packet buffer bridge between one engine instance and its host.
///
/// Outbound packets are assembled one write cycle at a time and queued until
/// the host drains them with [`Bridge::drain_outbound`]. Inbound packets are
/// queued by the host and consumed by the engine through `parse_packet` and
/// the `read*` primitives.
pub struct Bridge {
    device_id: u16,
    started: Instant,
    write: Option<PacketBuffer>,
    outbound: VecDeque<Bytes>,
    inbound: VecDeque<Bytes>,
    current: Option<PacketCursor>,
    console: Box<dyn Write + Send>,
}

impl Bridge {
    /// Create a bridge reporting `device_id`, printing to stdout.
    pub fn new(device_id: u16) -> Self {
        Self {
            device_id,
            started: Instant::now(),
            write: None,
            outbound: VecDeque::new(),
            inbound: VecDeque::new(),
            current: None,
            console: Box::new(std::io::stdout()),
        }
    }

    /// Redirect `print`/`println` output.
    pub fn with_console(mut self, console: impl Write + Send + 'static) -> Self {
        self.console = Box::new(console);
        self
    }

    /// Queue a received packet for the engine.
    ///
    /// Empty packets are dropped: their length would read as "no packet".
    pub fn add_packet_to_queue(&mut self, packet: Bytes) {
        if packet.is_empty() {
            debug!("dropping empty inbound packet");
            return;
        }
        if packet.len() > MAX_INBOUND_PACKET {
            warn!(len = packet.len(), "dropping oversized inbound packet");
            return;
        }
        self.inbound.push_back(packet);
    }

    /// Start a new write cycle addressed to `destination`.
    pub fn begin_write(&mut self, destination: u8) {
        if let Some(open) = self.write.replace(PacketBuffer::new(destination)) {
            warn!(
                discarded = open.len(),
                "beginWrite called with a write cycle still open"
            );
        }
    }

    pub fn write8(&mut self, value: u8) -> Result<()> {
        self.with_cycle("write8", |packet| packet.put_u8(value))
    }

    pub fn write16(&mut self, value: u16) -> Result<()> {
        self.with_cycle("write16", |packet| packet.put_u16(value))
    }

    pub fn write32(&mut self, value: u32) -> Result<()> {
        self.with_cycle("write32", |packet| packet.put_u32(value))
    }

    /// Copy `length` bytes of engine memory starting at `source` into the packet.
    pub fn write(&mut self, memory: &LinearMemory, source: u32, length: u16) -> Result<()> {
        self.with_cycle("write", |packet| {
            let data = memory.slice(source, usize::from(length))?;
            packet.put_slice(data)
        })
    }

    /// Close the write cycle and queue the packet for transmission.
    ///
    /// Returns the packet length.
    pub fn end_write(&mut self) -> Result<usize> {
        let packet = self
            .write
            .take()
            .ok_or(EngineError::WriteNotStarted { op: "endWrite" })?;
        let destination = packet.destination();
        let payload = packet.freeze();
        let len = payload.len();
        trace!(destination, len, "packet ready");
        self.outbound.push_back(payload);
        Ok(len)
    }

    /// Take every packet completed since the last drain, in completion order.
    pub fn drain_outbound(&mut self) -> impl Iterator<Item = Bytes> + '_ {
        self.outbound.drain(..)
    }

    /// Make the next queued packet current and return its length.
    ///
    /// Returns `0` when no packet is waiting.
    pub fn parse_packet(&mut self) -> u16 {
        match self.inbound.pop_front() {
            Some(packet) => {
                let len = u16::try_from(packet.len()).unwrap_or(u16::MAX);
                self.current = Some(PacketCursor::new(packet));
                len
            }
            None => {
                self.current = None;
                0
            }
        }
    }

    pub fn read8(&mut self) -> Result<u8> {
        self.cursor("read8")?.get_u8()
    }

    pub fn read16(&mut self) -> Result<u16> {
        self.cursor("read16")?.get_u16()
    }

    pub fn read32(&mut self) -> Result<u32> {
        self.cursor("read32")?.get_u32()
    }

    /// Copy the next `length` bytes of the current packet into engine memory at `destination`.
    pub fn read(&mut self, memory: &mut LinearMemory, destination: u32, length: u16) -> Result<()> {
        let cursor = self.cursor("read")?;
        let dst = memory.slice_mut(destination, usize::from(length))?;
        cursor.copy_to_slice(dst)
    }

    /// Release the current packet.
    pub fn end_read(&mut self) {
        self.current = None;
    }

    pub fn device_id(&self) -> u16 {
        self.device_id
    }

    /// Milliseconds since the bridge was created, wrapping at `u32::MAX`.
    pub fn local_clock(&self) -> u32 {
        // Truncation is the wrap.
        self.started.elapsed().as_millis() as u32
    }

    /// Write the NUL-terminated string at `address` to the console.
    pub fn print(&mut self, memory: &LinearMemory, address: u32) -> Result<()> {
        let text = memory.read_c_str(address)?;
        self.console.write_all(text.as_bytes())?;
        self.console.flush()?;
        Ok(())
    }

    /// Like [`Bridge::print`], followed by a newline.
    pub fn println(&mut self, memory: &LinearMemory, address: u32) -> Result<()> {
        let mut text = memory.read_c_str(address)?;
        text.push('\n');
        self.console.write_all(text.as_bytes())?;
        self.console.flush()?;
        Ok(())
    }

    /// Run `f` against the open write cycle. A failure aborts the cycle.
    fn with_cycle(
        &mut self,
        op: &'static str,
        f: impl FnOnce(&mut PacketBuffer) -> Result<()>,
    ) -> Result<()> {
        let packet = self
            .write
            .as_mut()
            .ok_or(EngineError::WriteNotStarted { op })?;
        let result = f(packet);
        if let Err(err) = &result {
            debug!(op, error = %err, "aborting write cycle");
            self.write = None;
        }
        result
    }

    fn cursor(&mut self, op: &'static str) -> Result<&mut PacketCursor> {
        self.current.as_mut().ok_or(EngineError::NoPacket { op })
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("device_id", &self.device_id)
            .field("write_open", &self.write.is_some())
            .field("outbound", &self.outbound.len())
            .field("inbound", &self.inbound.len())
            .finish_non_exhaustive()
    }
}

/// The primitive calls available to an engine while it runs.
///
/// Addresses are offsets into the engine's own linear memory; the bridge
/// resolves them.
pub struct Env<'a> {
    bridge: &'a mut Bridge,
    memory: &'a mut LinearMemory,
}

impl<'a> Env<'a> {
    pub fn new(bridge: &'a mut Bridge, memory: &'a mut LinearMemory) -> Self {
        Self { bridge, memory }
    }

    pub fn memory(&self) -> &LinearMemory {
        &*self.memory
    }

    pub fn memory_mut(&mut self) -> &mut LinearMemory {
        &mut *self.memory
    }

    pub fn add_packet_to_queue(&mut self, packet: Bytes) {
        self.bridge.add_packet_to_queue(packet);
    }

    pub fn begin_write(&mut self, destination: u8) {
        self.bridge.begin_write(destination);
    }

    pub fn write8(&mut self, value: u8) -> Result<()> {
        self.bridge.write8(value)
    }

    pub fn write16(&mut self, value: u16) -> Result<()> {
        self.bridge.write16(value)
    }

    pub fn write32(&mut self, value: u32) -> Result<()> {
        self.bridge.write32(value)
    }

    pub fn write(&mut self, source: u32, length: u16) -> Result<()> {
        self.bridge.write(&*self.memory, source, length)
    }

    pub fn end_write(&mut self) -> Result<()> {
        self.bridge.end_write().map(|_| ())
    }

    pub fn parse_packet(&mut self) -> u16 {
        self.bridge.parse_packet()
    }

    pub fn read8(&mut self) -> Result<u8> {
        self.bridge.read8()
    }

    pub fn read16(&mut self) -> Result<u16> {
        self.bridge.read16()
    }

    pub fn read32(&mut self) -> Result<u32> {
        self.bridge.read32()
    }

    pub fn read(&mut self, destination: u32, length: u16) -> Result<()> {
        self.bridge.read(&mut *self.memory, destination, length)
    }

    pub fn end_read(&mut self) {
        self.bridge.end_read();
    }

    pub fn get_device_id(&self) -> u16 {
        self.bridge.device_id()
    }

    pub fn local_clock(&self) -> u32 {
        self.bridge.local_clock()
    }

    pub fn print(&mut self, address: u32) -> Result<()> {
        self.bridge.print(&*self.memory, address)
    }

    pub fn println(&mut self, address: u32) -> Result<()> {
        self.bridge.println(&*self.memory, address)
    }
}
