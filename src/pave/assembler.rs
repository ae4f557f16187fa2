//! Frame assembly from a raw PaVE byte stream
//!
//! The assembler owns a single working buffer that is filled from a
//! [`ByteSource`] and parsed in place. `cursor <= filled <= capacity`
//! holds at all times:
//!
//! ```text
//! 0          cursor                 filled          capacity
//! |-consumed-|--pending, unparsed---|----free--------|
//! ```
//!
//! A single read may carry several frames (the cursor walks through
//! them) and a single frame may need several reads (the missing range is
//! read in place). Anything that cannot become a complete frame is
//! dropped by resetting to an empty buffer; no partial frame is ever
//! handed to the sink.

use bytes::Bytes;
use log::{debug, info, log};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::frame::{DecodedFrame, StreamStats};
use super::header::{FrameHeader, HeaderParse, PAVE_FIELDS_LEN};
use super::sync::find_signature;
use super::FramingError;
use crate::publish::FrameSink;
use crate::transport::{ByteSource, ReconnectMode};

/// Assembler configuration
#[derive(Debug, Clone)]
pub struct AssemblerConfig {
    /// Working buffer capacity in bytes
    pub buffer_size: usize,

    /// Consecutive failed reads tolerated before reconnecting with a pause
    pub error_threshold: u32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            buffer_size: 65536,
            error_threshold: 5,
        }
    }
}

/// Reassembles PaVE frames from a byte source and hands them to a sink
pub struct FrameAssembler<S, K> {
    name: String,
    source: S,
    sink: K,
    buf: Box<[u8]>,
    filled: usize,
    cursor: usize,
    error_count: u32,
    error_threshold: u32,
    stats: Arc<Mutex<StreamStats>>,
}

impl<S: ByteSource, K: FrameSink> FrameAssembler<S, K> {
    /// Create an assembler. The buffer is never smaller than the header fields.
    pub fn new(name: impl Into<String>, config: &AssemblerConfig, source: S, sink: K) -> Self {
        let capacity = config.buffer_size.max(PAVE_FIELDS_LEN);
        Self {
            name: name.into(),
            source,
            sink,
            buf: vec![0u8; capacity].into_boxed_slice(),
            filled: 0,
            cursor: 0,
            error_count: 0,
            error_threshold: config.error_threshold,
            stats: Arc::new(Mutex::new(StreamStats::default())),
        }
    }

    /// Report into an externally owned statistics record
    pub fn with_stats(mut self, stats: Arc<Mutex<StreamStats>>) -> Self {
        self.stats = stats;
        self
    }

    /// Shared handle to the live statistics
    pub fn stats_handle(&self) -> Arc<Mutex<StreamStats>> {
        self.stats.clone()
    }

    /// Snapshot of the statistics
    pub fn stats(&self) -> StreamStats {
        self.stats.lock().clone()
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn filled(&self) -> usize {
        self.filled
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Decode until `running` is cleared.
    ///
    /// The flag is checked between iterations, so shutdown latency is
    /// bounded by the source's read timeout.
    pub fn run(&mut self, running: &AtomicBool) {
        info!("[{}]***** START VIDEO STREAM *****", self.name);
        while running.load(Ordering::Relaxed) {
            if let Err(err) = self.run_once() {
                log!(err.level(), "[{}]{}", self.name, err);
            }
        }
        info!("[{}]Video stream stopped: {}", self.name, self.stats());
    }

    /// Run one decode iteration: emit one frame or take one recovery path.
    pub fn run_once(&mut self) -> Result<(), FramingError> {
        if self.cursor >= self.filled {
            self.reset();
            self.acquire()?;
        }

        let header = self.sync_header()?;

        let frame_len = match usize::try_from(header.frame_len()) {
            Ok(len) if len <= self.buf.len() => len,
            _ => {
                self.reset();
                self.stats.lock().oversized_frames += 1;
                return Err(FramingError::OversizedFrame {
                    required: header.frame_len(),
                    capacity: self.buf.len(),
                });
            }
        };
        if self.cursor + frame_len > self.buf.len() {
            self.compact();
        }

        let payload_start = self.cursor + header.header_size as usize;
        let frame_end = self.cursor + frame_len;
        if self.filled < frame_end && !self.fill_to(frame_end) {
            let received = self.filled.saturating_sub(payload_start);
            self.reset();
            self.stats.lock().incomplete_frames += 1;
            return Err(FramingError::IncompletePayloadTimeout {
                received,
                expected: header.payload_size as usize,
            });
        }

        let payload = Bytes::copy_from_slice(&self.buf[payload_start..frame_end]);
        let frame = DecodedFrame::new(&header, payload);
        self.stats.lock().record_frame(frame.payload.len());
        self.sink.accept(frame);

        if frame_end < self.filled {
            self.cursor = frame_end;
        } else {
            self.reset();
        }
        Ok(())
    }

    /// One read into the whole (empty) buffer
    fn acquire(&mut self) -> Result<(), FramingError> {
        let kind = match self.source.read(&mut self.buf) {
            Ok(n) if n > 0 => {
                self.filled = n;
                self.error_count = 0;
                return Ok(());
            }
            Ok(_) => None,
            Err(err) => Some(err.kind()),
        };

        self.error_count = self.error_count.saturating_add(1);
        let mode = if self.error_count > self.error_threshold {
            ReconnectMode::AfterPause
        } else {
            ReconnectMode::Immediate
        };
        {
            let mut stats = self.stats.lock();
            stats.stalls += 1;
            stats.reconnects += 1;
        }
        self.source.reconnect(mode);
        Err(FramingError::TransportStall {
            consecutive: self.error_count,
            kind,
        })
    }

    /// Parse a header at the cursor, realigning to the next signature if needed
    fn sync_header(&mut self) -> Result<FrameHeader, FramingError> {
        loop {
            match FrameHeader::try_parse(&self.buf[..self.filled], self.cursor) {
                Ok(header) => return Ok(header),
                Err(HeaderParse::Truncated { available }) => {
                    if self.cursor + PAVE_FIELDS_LEN > self.buf.len() {
                        self.compact();
                    }
                    if !self.fill_to(self.cursor + PAVE_FIELDS_LEN) {
                        let received = self.filled - self.cursor;
                        self.reset();
                        self.stats.lock().incomplete_frames += 1;
                        return Err(FramingError::IncompleteHeaderTimeout { received });
                    }
                    debug!("[{}]Header split across reads ({} bytes buffered)", self.name, available);
                }
                Err(HeaderParse::NotAHeader) => {
                    match find_signature(&self.buf, self.cursor + 1, self.filled) {
                        Some(offset) => {
                            debug!(
                                "[{}]PaVE not synchronized, skipped {} bytes",
                                self.name,
                                offset - self.cursor
                            );
                            self.stats.lock().desyncs += 1;
                            self.cursor = offset;
                        }
                        None => {
                            let discarded = self.filled - self.cursor;
                            self.reset();
                            self.stats.lock().buffers_discarded += 1;
                            return Err(FramingError::Desync { discarded });
                        }
                    }
                }
            }
        }
    }

    /// Read into `[filled, end)` until it is full. False if the source ran dry.
    fn fill_to(&mut self, end: usize) -> bool {
        while self.filled < end {
            match self.source.read(&mut self.buf[self.filled..end]) {
                Ok(n) if n > 0 => self.filled += n,
                _ => return false,
            }
        }
        true
    }

    /// Move the pending bytes to the start of the buffer
    fn compact(&mut self) {
        debug!(
            "[{}]Moving {} pending bytes to buffer start",
            self.name,
            self.filled - self.cursor
        );
        self.buf.copy_within(self.cursor..self.filled, 0);
        self.filled -= self.cursor;
        self.cursor = 0;
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.filled = 0;
    }
}
