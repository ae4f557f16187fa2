//! PaVE stream decoding
//!
//! Locates Parrot Video Encapsulation headers in a raw TCP byte stream,
//! reassembles payloads spanning several reads and recovers from loss of
//! synchronization by rescanning for the next signature.

pub mod assembler;
pub mod frame;
pub mod header;
pub mod sync;

#[cfg(test)]
pub(crate) mod test_util;

pub use assembler::{AssemblerConfig, FrameAssembler};
pub use frame::{DecodedFrame, FrameMetadata, StreamStats};
pub use header::{FrameHeader, FrameType, HeaderParse, VideoCodec, PAVE_SIGNATURE};
pub use sync::find_signature;

use log::Level;
use std::fmt;
use std::io;

/// Recoverable framing failures.
///
/// None of these end the decode loop; each one resets or realigns the
/// working buffer and decoding carries on.
#[derive(Debug)]
pub enum FramingError {
    /// Read returned no data, timed out or failed
    TransportStall {
        consecutive: u32,
        /// `None` when the peer closed the connection
        kind: Option<io::ErrorKind>,
    },
    /// No signature left in the buffered bytes
    Desync { discarded: usize },
    /// Declared frame does not fit in the working buffer
    OversizedFrame { required: u64, capacity: usize },
    /// Payload bytes stopped arriving before the frame was complete
    IncompletePayloadTimeout { received: usize, expected: usize },
    /// Header bytes stopped arriving before the fields were complete
    IncompleteHeaderTimeout { received: usize },
}

impl FramingError {
    /// Log level for reporting this condition
    pub fn level(&self) -> Level {
        match self {
            FramingError::TransportStall { .. } => Level::Info,
            FramingError::Desync { .. } => Level::Debug,
            FramingError::OversizedFrame { .. } => Level::Warn,
            FramingError::IncompletePayloadTimeout { .. } => Level::Info,
            FramingError::IncompleteHeaderTimeout { .. } => Level::Info,
        }
    }
}

impl fmt::Display for FramingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramingError::TransportStall { consecutive, kind: None } => {
                write!(f, "Did not receive video data (connection closed, {} in a row), trying to recover", consecutive)
            }
            FramingError::TransportStall { consecutive, kind: Some(kind) } => {
                write!(f, "Did not receive video data ({:?}, {} in a row), trying to recover", kind, consecutive)
            }
            FramingError::Desync { discarded } => {
                write!(f, "PaVE not synchronized, no signature in {} buffered bytes", discarded)
            }
            FramingError::OversizedFrame { required, capacity } => {
                write!(f, "Too big payload ({} bytes, buffer holds {}), skipping frame. (ADVICE: Increase buffer_size)", required, capacity)
            }
            FramingError::IncompletePayloadTimeout { received, expected } => {
                write!(f, "Timed out while waiting extra packets ({}/{} payload bytes)", received, expected)
            }
            FramingError::IncompleteHeaderTimeout { received } => {
                write!(f, "Timed out while waiting for the rest of a header ({} bytes)", received)
            }
        }
    }
}

impl std::error::Error for FramingError {}
