//! Decoded frame data structure
//!
//! Represents one fully assembled PaVE frame with its metadata.

use bytes::Bytes;
use serde::Serialize;
use std::fmt;

use super::header::{FrameHeader, FrameType, VideoCodec};

/// A complete encoded video frame, handed to a [`FrameSink`](crate::publish::FrameSink)
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    /// Codec of the payload
    pub codec: VideoCodec,

    /// Encoded stream width in pixels
    pub width: u16,

    /// Encoded stream height in pixels
    pub height: u16,

    /// Visible width in pixels
    pub display_width: u16,

    /// Visible height in pixels
    pub display_height: u16,

    /// Capture timestamp on the vehicle clock (ms)
    pub timestamp_ms: u32,

    /// Frame position inside the stream
    pub frame_number: u32,

    pub frame_type: FrameType,

    sps_size: u8,
    pps_size: u8,

    /// Encoded payload, exactly `payload_size` bytes
    pub payload: Bytes,
}

impl DecodedFrame {
    pub fn new(header: &FrameHeader, payload: Bytes) -> Self {
        Self {
            codec: header.codec,
            width: header.encoded_width,
            height: header.encoded_height,
            display_width: header.display_width,
            display_height: header.display_height,
            timestamp_ms: header.timestamp_ms,
            frame_number: header.frame_number,
            frame_type: header.frame_type,
            sps_size: header.sps_size,
            pps_size: header.pps_size,
            payload,
        }
    }

    /// Timestamp in seconds
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_ms as f64 / 1000.0
    }

    /// H.264 sequence parameter set at the start of the payload
    pub fn sps(&self) -> Option<&[u8]> {
        let len = self.sps_size as usize;
        if self.codec != VideoCodec::H264 || len == 0 {
            return None;
        }
        self.payload.get(..len)
    }

    /// H.264 picture parameter set following the SPS
    pub fn pps(&self) -> Option<&[u8]> {
        let start = self.sps_size as usize;
        let len = self.pps_size as usize;
        if self.codec != VideoCodec::H264 || len == 0 {
            return None;
        }
        self.payload.get(start..start + len)
    }

    /// Metadata line for the recording index
    pub fn metadata(&self) -> FrameMetadata {
        FrameMetadata {
            codec: self.codec.as_str(),
            width: self.width,
            height: self.height,
            display_width: self.display_width,
            display_height: self.display_height,
            timestamp_ms: self.timestamp_ms,
            frame_number: self.frame_number,
            frame_type: self.frame_type.to_string(),
            keyframe: self.frame_type.is_keyframe(),
            size: self.payload.len(),
        }
    }
}

impl fmt::Display for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Frame({} {}x{}, {} bytes, #{} {}, t={}ms)",
            self.codec,
            self.width,
            self.height,
            self.payload.len(),
            self.frame_number,
            self.frame_type,
            self.timestamp_ms
        )
    }
}

/// Serializable per-frame metadata
#[derive(Debug, Clone, Serialize)]
pub struct FrameMetadata {
    pub codec: &'static str,
    pub width: u16,
    pub height: u16,
    pub display_width: u16,
    pub display_height: u16,
    pub timestamp_ms: u32,
    pub frame_number: u32,
    pub frame_type: String,
    pub keyframe: bool,
    pub size: usize,
}

/// Stream statistics for monitoring
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamStats {
    /// Frames handed to the sink
    pub frames_emitted: u64,

    /// Payload bytes handed to the sink
    pub bytes_emitted: u64,

    /// Realignments to a later signature
    pub desyncs: u64,

    /// Buffers dropped because no signature was found
    pub buffers_discarded: u64,

    /// Frames larger than the working buffer
    pub oversized_frames: u64,

    /// Frames abandoned while waiting for the rest of the data
    pub incomplete_frames: u64,

    /// Reads that returned no data
    pub stalls: u64,

    /// Reconnections requested from the byte source
    pub reconnects: u64,
}

impl StreamStats {
    /// Record an emitted frame
    pub fn record_frame(&mut self, bytes: usize) {
        self.frames_emitted += 1;
        self.bytes_emitted += bytes as u64;
    }

    /// Frames lost to any discard path
    pub fn frames_dropped(&self) -> u64 {
        self.oversized_frames + self.incomplete_frames
    }
}

impl fmt::Display for StreamStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames ({} bytes), {} desyncs, {} buffers discarded, {} oversized, {} incomplete, {} stalls, {} reconnects",
            self.frames_emitted,
            self.bytes_emitted,
            self.desyncs,
            self.buffers_discarded,
            self.oversized_frames,
            self.incomplete_frames,
            self.stalls,
            self.reconnects
        )
    }
}
