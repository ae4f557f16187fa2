//! pave-ingest - PaVE drone video ingest
//!
//! Receives Parrot Video Encapsulation streams over TCP, reassembles the
//! encoded frames and hands them to a downstream publisher.

pub mod config;
pub mod pave;
pub mod publish;
pub mod transport;

// Re-exports
pub use config::{Config, DroneConfig, StreamConfig};
pub use pave::{AssemblerConfig, DecodedFrame, FrameAssembler, FrameHeader, FramingError, StreamStats, VideoCodec};
pub use publish::{ChannelSink, FramePublisher, FrameSink};
pub use transport::{ByteSource, ReconnectMode, TcpByteSource};
