/// Errors raised by the bridge primitives and by engine calls.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A write primitive was used outside a `beginWrite`/`endWrite` cycle.
    #[error("{op} called before beginWrite")]
    WriteNotStarted { op: &'static str },

    /// A write would run past the end of the packet buffer.
    #[error("packet buffer overflow ({needed} bytes needed, {remaining} remaining)")]
    BufferOverflow { needed: usize, remaining: usize },

    /// A copy touched bytes outside the engine's linear memory.
    #[error("memory access out of bounds (offset {offset}, length {len}, extent {extent})")]
    OutOfBounds {
        offset: u32,
        len: usize,
        extent: usize,
    },

    /// A read primitive was used with no parsed packet.
    #[error("{op} called without a parsed packet")]
    NoPacket { op: &'static str },

    /// A read would run past the end of the parsed packet.
    #[error("{op} read past end of packet ({needed} bytes needed, {remaining} remaining)")]
    ReadPastEnd {
        op: &'static str,
        needed: usize,
        remaining: usize,
    },

    /// A string in engine memory has no NUL terminator before the end of memory.
    #[error("unterminated string at offset {offset}")]
    UnterminatedString { offset: u32 },

    /// Wave configuration carries more waves than the engine supports.
    #[error("only {max} waves max are supported (got {count})")]
    TooManyWaves { count: usize, max: usize },

    /// Console output failed.
    #[error("console write failed: {0}")]
    Console(#[from] std::io::Error),

    /// Fault reported by the engine itself.
    #[error("engine fault: {0}")]
    Engine(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
