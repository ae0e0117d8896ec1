use std::fmt;
use std::ops::Range;

use crate::error::{EngineError, Result};

/// Default size of an engine's linear memory: one 64 KiB page.
pub const DEFAULT_MEMORY_SIZE: usize = 64 * 1024;

/// The engine's linear address space.
///
/// Addresses handed over by the engine are plain offsets. The host never keeps
/// references into this memory; every access goes through a bounds-checked
/// `(offset, length)` accessor.
pub struct LinearMemory {
    bytes: Vec<u8>,
}

impl LinearMemory {
    /// Allocate `size` zeroed bytes.
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    /// Memory extent in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn slice(&self, offset: u32, len: usize) -> Result<&[u8]> {
        let range = self.range(offset, len)?;
        Ok(&self.bytes[range])
    }

    /// Mutably borrow `len` bytes starting at `offset`.
    pub fn slice_mut(&mut self, offset: u32, len: usize) -> Result<&mut [u8]> {
        let range = self.range(offset, len)?;
        Ok(&mut self.bytes[range])
    }

    /// Copy `data` into memory at `offset`.
    pub fn store(&mut self, offset: u32, data: &[u8]) -> Result<()> {
        self.slice_mut(offset, data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Store `text` as a NUL-terminated string at `offset`.
    pub fn store_c_str(&mut self, offset: u32, text: &str) -> Result<()> {
        let dst = self.slice_mut(offset, text.len() + 1)?;
        let (body, nul) = dst.split_at_mut(text.len());
        body.copy_from_slice(text.as_bytes());
        nul[0] = 0;
        Ok(())
    }

    /// Decode the NUL-terminated string starting at `offset`.
    ///
    /// Invalid UTF-8 sequences are replaced rather than rejected.
    pub fn read_c_str(&self, offset: u32) -> Result<String> {
        let start = offset as usize;
        if start >= self.bytes.len() {
            return Err(self.out_of_bounds(offset, 1));
        }
        let tail = &self.bytes[start..];
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or(EngineError::UnterminatedString { offset })?;
        Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
    }

    fn range(&self, offset: u32, len: usize) -> Result<Range<usize>> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.bytes.len() => Ok(start..end),
            _ => Err(self.out_of_bounds(offset, len)),
        }
    }

    fn out_of_bounds(&self, offset: u32, len: usize) -> EngineError {
        EngineError::OutOfBounds {
            offset,
            len,
            extent: self.bytes.len(),
        }
    }
}

impl Default for LinearMemory {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_SIZE)
    }
}

impl fmt::Debug for LinearMemory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinearMemory")
            .field("len", &self.bytes.len())
            .finish()
    }
}
