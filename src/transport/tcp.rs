//! TCP byte source for the drone video port
//!
//! Connects with retry, applies the receive timeout so every read is
//! bounded, and reopens the connection when the decoder asks for it.

use log::{debug, info};
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::{ByteSource, ReconnectMode};

/// Blocking TCP connection to one vehicle
pub struct TcpByteSource {
    name: String,
    addr: SocketAddr,
    timeout: Duration,
    stream: Option<TcpStream>,
    running: Arc<AtomicBool>,
}

impl TcpByteSource {
    /// Connect to `addr`, retrying every `timeout` until it succeeds or
    /// `running` is cleared.
    pub fn connect(
        name: impl Into<String>,
        addr: SocketAddr,
        timeout: Duration,
        running: Arc<AtomicBool>,
    ) -> Self {
        let mut source = Self {
            name: name.into(),
            addr,
            timeout,
            stream: None,
            running,
        };
        source.establish();
        source
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn establish(&mut self) {
        self.stream = None;
        while self.running.load(Ordering::Relaxed) {
            match self.open() {
                Ok(stream) => {
                    info!("[{}]Connected to {}", self.name, self.addr);
                    self.stream = Some(stream);
                    return;
                }
                Err(e) => {
                    info!("[{}]Did not manage to establish connection: {}", self.name, e);
                    thread::sleep(self.timeout);
                }
            }
        }
    }

    fn open(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect_timeout(&self.addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!("[{}]Closing connection to {}", self.name, self.addr);
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl ByteSource for TcpByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Err(io::ErrorKind::NotConnected.into()),
        };
        loop {
            match stream.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                result => return result,
            }
        }
    }

    fn reconnect(&mut self, mode: ReconnectMode) {
        if mode == ReconnectMode::AfterPause {
            self.close();
            thread::sleep(self.timeout);
        }
        self.close();
        self.establish();
    }
}

impl Drop for TcpByteSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pave::test_util::frame_stream;
    use crate::pave::{AssemblerConfig, DecodedFrame, FrameAssembler};
    use std::io::Write;
    use std::net::TcpListener;

    fn listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[test]
    fn test_frames_over_loopback() {
        let (listener, addr) = listener();
        let (stream, expected) = frame_stream(&[300, 1200, 10]);
        let server = thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            for chunk in stream.chunks(97) {
                conn.write_all(chunk).unwrap();
                conn.flush().unwrap();
            }
            thread::sleep(Duration::from_millis(200));
        });

        let running = Arc::new(AtomicBool::new(true));
        let source = TcpByteSource::connect("loop", addr, Duration::from_millis(500), running);
        assert!(source.is_connected());

        let config = AssemblerConfig::default();
        let mut assembler = FrameAssembler::new("loop", &config, source, Vec::<DecodedFrame>::new());
        for _ in 0..20 {
            if assembler.sink().len() == expected.len() {
                break;
            }
            let _ = assembler.run_once();
        }
        server.join().unwrap();

        let got: Vec<Vec<u8>> = assembler.sink().iter().map(|f| f.payload.to_vec()).collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_read_times_out() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (_conn, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(300));
        });

        let running = Arc::new(AtomicBool::new(true));
        let mut source = TcpByteSource::connect("idle", addr, Duration::from_millis(50), running);
        let mut buf = [0u8; 16];
        let err = source.read(&mut buf).unwrap_err();
        assert!(matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut));
        server.join().unwrap();
    }

    #[test]
    fn test_reconnect_opens_new_connection() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (first, _) = listener.accept().unwrap();
            drop(first);
            let (mut second, _) = listener.accept().unwrap();
            second.write_all(b"PaVE").unwrap();
            thread::sleep(Duration::from_millis(100));
        });

        let running = Arc::new(AtomicBool::new(true));
        let mut source = TcpByteSource::connect("re", addr, Duration::from_millis(500), running);
        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap(), 0);

        source.reconnect(ReconnectMode::Immediate);
        assert!(source.is_connected());
        assert_eq!(source.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"PaVE");
        server.join().unwrap();
    }

    #[test]
    fn test_connect_gives_up_when_stopped() {
        let running = Arc::new(AtomicBool::new(false));
        let addr: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let mut source = TcpByteSource::connect("off", addr, Duration::from_millis(10), running);
        assert!(!source.is_connected());
        let mut buf = [0u8; 4];
        assert_eq!(source.read(&mut buf).unwrap_err().kind(), io::ErrorKind::NotConnected);
    }
}
