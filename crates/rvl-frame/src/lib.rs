//! Length-prefixed message framing for the controller/worker channel.
//!
//! Every message crossing the boundary is framed with:
//! - A 2-byte magic number ("RV") for stream synchronization
//! - A 4-byte little-endian payload length
//!
//! Readers always hand back complete payloads; partial reads are buffered
//! internally.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use writer::FrameWriter;
