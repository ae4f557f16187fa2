//! Frame hand-off to downstream consumers
//!
//! The decode loop pushes frames into a [`FrameSink`]. In the service this
//! is a bounded channel feeding the [`FramePublisher`].

pub mod recorder;

pub use recorder::{FramePublisher, OutputConfig, PublishStats};

use crossbeam::channel::{Sender, TrySendError};
use log::{debug, warn};
use std::sync::Arc;

use crate::pave::DecodedFrame;

/// Consumer of completed frames. Must not block the decode loop.
pub trait FrameSink {
    fn accept(&mut self, frame: DecodedFrame);
}

impl FrameSink for Vec<DecodedFrame> {
    fn accept(&mut self, frame: DecodedFrame) {
        self.push(frame);
    }
}

/// A frame tagged with the stream it came from
#[derive(Debug, Clone)]
pub struct StreamFrame {
    pub stream: Arc<str>,
    pub frame: DecodedFrame,
}

/// Non-blocking sink over a bounded channel.
///
/// When the consumer falls behind, new frames are dropped rather than
/// stalling the socket reads.
pub struct ChannelSink {
    stream: Arc<str>,
    tx: Sender<StreamFrame>,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(stream: impl Into<Arc<str>>, tx: Sender<StreamFrame>) -> Self {
        Self {
            stream: stream.into(),
            tx,
            dropped: 0,
        }
    }

    /// Frames dropped because the queue was full or closed
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl FrameSink for ChannelSink {
    fn accept(&mut self, frame: DecodedFrame) {
        let item = StreamFrame {
            stream: self.stream.clone(),
            frame,
        };
        match self.tx.try_send(item) {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => {
                self.dropped += 1;
                if self.dropped == 1 || self.dropped % 100 == 0 {
                    warn!(
                        "[{}]Publisher queue full, dropped {} (total {})",
                        self.stream, item.frame, self.dropped
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
                debug!("[{}]Publisher gone, frame dropped", self.stream);
            }
        }
    }
}
