//! Downstream frame publisher
//!
//! Republishes frames from every stream: unsupported codecs are rejected,
//! supported payloads are appended to a raw elementary-stream recording
//! per vehicle, optionally with a JSON-lines metadata index.

use crossbeam::channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::StreamFrame;
use crate::pave::{DecodedFrame, VideoCodec};

const RECV_POLL: Duration = Duration::from_millis(200);

/// Where published frames are recorded
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Recording directory; nothing is written when unset
    pub directory: Option<PathBuf>,

    /// Write a `<stream>.jsonl` metadata index next to each recording
    pub metadata: bool,
}

/// Per-stream publishing counters
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishStats {
    pub published: u64,
    pub rejected: u64,
    pub bytes: u64,
}

#[derive(Default)]
struct StreamOutput {
    codec: Option<VideoCodec>,
    recording: Option<BufWriter<File>>,
    index: Option<BufWriter<File>>,
    failed: bool,
    stats: PublishStats,
}

impl StreamOutput {
    fn open(&mut self, dir: &Path, stream: &str, codec: VideoCodec, metadata: bool) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("{}.{}", stream, codec.stream_extension()));
        info!("[{}]Recording {} stream to {}", stream, codec, path.display());
        self.recording = Some(BufWriter::new(append(&path)?));
        if metadata {
            self.index = Some(BufWriter::new(append(&dir.join(format!("{}.jsonl", stream)))?));
        }
        self.codec = Some(codec);
        Ok(())
    }

    fn write(&mut self, frame: &DecodedFrame) -> io::Result<()> {
        if let Some(recording) = self.recording.as_mut() {
            recording.write_all(&frame.payload)?;
        }
        if let Some(index) = self.index.as_mut() {
            serde_json::to_writer(&mut *index, &frame.metadata())?;
            index.write_all(b"\n")?;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(recording) = self.recording.as_mut() {
            recording.flush()?;
        }
        if let Some(index) = self.index.as_mut() {
            index.flush()?;
        }
        Ok(())
    }
}

fn append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Consumes frames from all streams
pub struct FramePublisher {
    output: OutputConfig,
    streams: HashMap<Arc<str>, StreamOutput>,
}

impl FramePublisher {
    pub fn new(output: OutputConfig) -> Self {
        Self {
            output,
            streams: HashMap::new(),
        }
    }

    /// Publish one frame
    pub fn publish(&mut self, item: StreamFrame) {
        let StreamFrame { stream, frame } = item;
        let out = self.streams.entry(stream.clone()).or_default();

        if !frame.codec.is_supported() {
            out.stats.rejected += 1;
            debug!("[{}]Unsupported codec {:?}, ignoring {}", stream, frame.codec, frame);
            return;
        }
        out.stats.published += 1;
        out.stats.bytes += frame.payload.len() as u64;

        let dir = match self.output.directory.as_deref() {
            Some(dir) if !out.failed => dir,
            _ => return,
        };

        if out.codec.is_none() {
            if let Err(e) = out.open(dir, &stream, frame.codec, self.output.metadata) {
                error!("[{}]Cannot open recording in {}: {}", stream, dir.display(), e);
                out.failed = true;
                return;
            }
        }
        if out.codec != Some(frame.codec) {
            debug!("[{}]Codec changed to {}, frame not recorded", stream, frame.codec);
            return;
        }
        if let Err(e) = out.write(&frame) {
            error!("[{}]Recording failed, disabling it: {}", stream, e);
            out.failed = true;
            out.recording = None;
            out.index = None;
        }
    }

    /// Counters for one stream
    pub fn stats(&self, stream: &str) -> Option<PublishStats> {
        self.streams.get(stream).map(|out| out.stats.clone())
    }

    /// Flush all recordings
    pub fn flush(&mut self) {
        for (stream, out) in self.streams.iter_mut() {
            if let Err(e) = out.flush() {
                error!("[{}]Failed to flush recording: {}", stream, e);
            }
        }
    }

    /// Publish frames until `running` clears or every sender is gone
    pub fn run(&mut self, rx: Receiver<StreamFrame>, running: &AtomicBool) {
        info!("Frame publisher started");
        while running.load(Ordering::Relaxed) {
            match rx.recv_timeout(RECV_POLL) {
                Ok(item) => self.publish(item),
                Err(RecvTimeoutError::Timeout) => self.flush(),
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for item in rx.try_iter() {
            self.publish(item);
        }
        self.flush();

        for (stream, out) in &self.streams {
            info!(
                "[{}]Published {} frames ({} bytes), rejected {}",
                stream, out.stats.published, out.stats.bytes, out.stats.rejected
            );
        }
        info!("Frame publisher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pave::FrameHeader;
    use bytes::Bytes;
    use crossbeam::channel::unbounded;
    use tempfile::TempDir;

    fn item(stream: &str, codec: VideoCodec, n: u32, payload: &'static [u8]) -> StreamFrame {
        let header = FrameHeader { codec, frame_number: n, ..FrameHeader::default() };
        StreamFrame {
            stream: stream.into(),
            frame: DecodedFrame::new(&header, Bytes::from_static(payload)),
        }
    }

    #[test]
    fn test_rejects_unsupported_codecs() {
        let mut publisher = FramePublisher::new(OutputConfig::default());
        publisher.publish(item("a", VideoCodec::H264, 0, b"xx"));
        publisher.publish(item("a", VideoCodec::Vlib, 1, b"yy"));
        publisher.publish(item("a", VideoCodec::Other(9), 2, b"zz"));

        let stats = publisher.stats("a").unwrap();
        assert_eq!(stats.published, 1);
        assert_eq!(stats.rejected, 2);
        assert_eq!(stats.bytes, 2);
        assert!(publisher.stats("b").is_none());
    }

    #[test]
    fn test_records_payloads_and_metadata() {
        let dir = TempDir::new().unwrap();
        let mut publisher = FramePublisher::new(OutputConfig {
            directory: Some(dir.path().to_path_buf()),
            metadata: true,
        });
        publisher.publish(item("drone", VideoCodec::H264, 0, b"abc"));
        publisher.publish(item("drone", VideoCodec::P264, 1, b"---"));
        publisher.publish(item("drone", VideoCodec::H264, 2, b"def"));
        publisher.flush();

        let stream = fs::read(dir.path().join("drone.h264")).unwrap();
        assert_eq!(stream, b"abcdef");

        let index = fs::read_to_string(dir.path().join("drone.jsonl")).unwrap();
        let lines: Vec<&str> = index.lines().collect();
        assert_eq!(lines.len(), 2);
        let meta: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(meta["frame_number"], 2);
        assert_eq!(meta["codec"], "H.264");
    }

    #[test]
    fn test_codec_switch_is_not_recorded() {
        let dir = TempDir::new().unwrap();
        let mut publisher = FramePublisher::new(OutputConfig {
            directory: Some(dir.path().to_path_buf()),
            metadata: false,
        });
        publisher.publish(item("d", VideoCodec::Mpeg4Visual, 0, b"m4"));
        publisher.publish(item("d", VideoCodec::H264, 1, b"h264"));
        publisher.flush();

        assert_eq!(fs::read(dir.path().join("d.m4v")).unwrap(), b"m4");
        assert!(!dir.path().join("d.jsonl").exists());
        assert_eq!(publisher.stats("d").unwrap().published, 2);
    }

    #[test]
    fn test_run_stops_when_senders_close() {
        let (tx, rx) = unbounded();
        tx.send(item("a", VideoCodec::H264, 0, b"1")).unwrap();
        tx.send(item("b", VideoCodec::H264, 0, b"22")).unwrap();
        drop(tx);

        let running = AtomicBool::new(true);
        let mut publisher = FramePublisher::new(OutputConfig::default());
        publisher.run(rx, &running);

        assert_eq!(publisher.stats("a").unwrap().published, 1);
        assert_eq!(publisher.stats("b").unwrap().bytes, 2);
    }
}
