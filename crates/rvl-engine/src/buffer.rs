//! Byte-level packet assembly and disassembly.
//!
//! All multi-byte values are big-endian on the wire.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{EngineError, Result};

/// Capacity of one outbound write cycle.
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Accumulator for one outbound packet.
#[derive(Debug)]
pub struct PacketBuffer {
    destination: u8,
    buf: BytesMut,
}

impl PacketBuffer {
    /// Start an empty packet addressed to `destination`.
    pub fn new(destination: u8) -> Self {
        Self {
            destination,
            buf: BytesMut::with_capacity(WRITE_BUFFER_SIZE),
        }
    }

    pub fn destination(&self) -> u8 {
        self.destination
    }

    /// Bytes written so far (the write cursor).
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Free space left before the buffer reaches [`WRITE_BUFFER_SIZE`].
    pub fn remaining(&self) -> usize {
        WRITE_BUFFER_SIZE - self.buf.len()
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.ensure(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.ensure(2)?;
        self.buf.put_u16(value);
        Ok(())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.ensure(4)?;
        self.buf.put_u32(value);
        Ok(())
    }

    pub fn put_slice(&mut self, data: &[u8]) -> Result<()> {
        self.ensure(data.len())?;
        self.buf.put_slice(data);
        Ok(())
    }

    /// Finish the cycle, keeping exactly the bytes written.
    pub fn freeze(self) -> Bytes {
        self.buf.freeze()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(EngineError::BufferOverflow { needed, remaining });
        }
        Ok(())
    }
}

/// Sequential reader over one received packet.
#[derive(Debug)]
pub struct PacketCursor {
    declared_len: usize,
    payload: Bytes,
}

impl PacketCursor {
    pub fn new(payload: Bytes) -> Self {
        Self {
            declared_len: payload.len(),
            payload,
        }
    }

    /// Total packet length, independent of how much has been consumed.
    pub fn len(&self) -> usize {
        self.declared_len
    }

    pub fn is_empty(&self) -> bool {
        self.declared_len == 0
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.payload.remaining()
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        self.ensure("read8", 1)?;
        Ok(self.payload.get_u8())
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        self.ensure("read16", 2)?;
        Ok(self.payload.get_u16())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.ensure("read32", 4)?;
        Ok(self.payload.get_u32())
    }

    /// Fill `dst` from the cursor.
    pub fn copy_to_slice(&mut self, dst: &mut [u8]) -> Result<()> {
        self.ensure("read", dst.len())?;
        self.payload.copy_to_slice(dst);
        Ok(())
    }

    fn ensure(&self, op: &'static str, needed: usize) -> Result<()> {
        let remaining = self.payload.remaining();
        if needed > remaining {
            return Err(EngineError::ReadPastEnd {
                op,
                needed,
                remaining,
            });
        }
        Ok(())
    }
}
