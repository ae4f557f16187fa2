//! Scripted byte sources and stream builders for decoder tests

use std::collections::VecDeque;
use std::io;

use super::header::{FrameHeader, VideoCodec};
use crate::transport::{ByteSource, ReconnectMode};

/// Replays chunks one read at a time.
///
/// An empty chunk is returned as `Ok(0)`; once the script is exhausted
/// every read times out. A chunk larger than the read buffer is split and
/// the rest served by the next read.
pub struct ScriptedSource {
    chunks: VecDeque<Vec<u8>>,
    pub reads: usize,
    pub reconnects: Vec<ReconnectMode>,
}

impl ScriptedSource {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks: chunks.into(),
            reads: 0,
            reconnects: Vec::new(),
        }
    }

    /// Split `stream` into chunks using `sizes` cyclically
    pub fn chunked(stream: &[u8], sizes: &[usize]) -> Self {
        let mut chunks = Vec::new();
        let mut pos = 0;
        let mut i = 0;
        while pos < stream.len() {
            let size = sizes[i % sizes.len()].max(1);
            let end = (pos + size).min(stream.len());
            chunks.push(stream[pos..end].to_vec());
            pos = end;
            i += 1;
        }
        Self::new(chunks)
    }

    pub fn push_chunk(&mut self, chunk: Vec<u8>) {
        self.chunks.push_back(chunk);
    }

    pub fn is_drained(&self) -> bool {
        self.chunks.is_empty()
    }
}

impl ByteSource for ScriptedSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reads += 1;
        let chunk = match self.chunks.pop_front() {
            Some(chunk) => chunk,
            None => return Err(io::ErrorKind::TimedOut.into()),
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk[n..].to_vec());
        }
        Ok(n)
    }

    fn reconnect(&mut self, mode: ReconnectMode) {
        self.reconnects.push(mode);
    }
}

/// Payload whose bytes never contain the signature
pub fn payload(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
}

pub fn header(payload_size: usize, frame_number: u32) -> FrameHeader {
    FrameHeader {
        payload_size: payload_size as u32,
        frame_number,
        timestamp_ms: frame_number * 33,
        ..FrameHeader::default()
    }
}

/// Header followed by its payload
pub fn encode_frame(header: &FrameHeader, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(header.header_size as usize + payload.len());
    header.encode(&mut out);
    out.extend_from_slice(payload);
    out
}

/// Back-to-back frames with payload lengths from `lens`, alternating codecs
pub fn frame_stream(lens: &[usize]) -> (Vec<u8>, Vec<Vec<u8>>) {
    let mut stream = Vec::new();
    let mut payloads = Vec::new();
    for (i, &len) in lens.iter().enumerate() {
        let body = payload(len, i as u8);
        let mut head = header(len, i as u32);
        head.codec = if i % 2 == 0 { VideoCodec::H264 } else { VideoCodec::Mpeg4Visual };
        stream.extend_from_slice(&encode_frame(&head, &body));
        payloads.push(body);
    }
    (stream, payloads)
}
