//! Transport layer for PaVE ingest
//!
//! The decoder only sees a [`ByteSource`]; connection management and
//! reconnect backoff live behind it.

pub mod tcp;

pub use tcp::TcpByteSource;

use std::io;

/// How eagerly a byte source should re-establish its connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectMode {
    /// Open a new connection right away
    Immediate,
    /// Close the connection and wait before opening a new one
    AfterPause,
}

/// Supplier of raw stream bytes
pub trait ByteSource {
    /// Bounded-wait read into `buf`.
    ///
    /// `Ok(0)`, a timeout and any other error all mean "no data".
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Re-establish the underlying connection. May block while retrying.
    fn reconnect(&mut self, mode: ReconnectMode);
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(buf)
    }

    fn reconnect(&mut self, mode: ReconnectMode) {
        (**self).reconnect(mode)
    }
}
