//! Length-prefixed message framing over TCP streams.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::sig::Signal;

/// Flag bit marking a compressed frame body.
const FLAG_LZ4: u8 = 0b0000_0001;

/// Default maximum size of a single frame body, 256 MiB.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 256 * 1024 * 1024;

/// Decides which outgoing frames get compressed.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum CompressionPolicy {
    Nothing,
    Everything,
    /// Compress bodies larger than the given number of bytes
    LargerThan(usize),
}

impl CompressionPolicy {
    pub fn should_compress(&self, len: usize) -> bool {
        match self {
            CompressionPolicy::Nothing => false,
            CompressionPolicy::Everything => true,
            CompressionPolicy::LargerThan(threshold) => len > *threshold,
        }
    }
}

#[derive(Debug, Copy, Clone)]
pub struct SocketConfig {
    pub compression: CompressionPolicy,
    /// Frames with larger bodies are rejected on both ends
    pub max_frame_size: usize,
    /// Timeout used when establishing a connection
    pub connect_timeout: Option<Duration>,
    pub nodelay: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            #[cfg(feature = "lz4")]
            compression: CompressionPolicy::LargerThan(64 * 1024),
            #[cfg(not(feature = "lz4"))]
            compression: CompressionPolicy::Nothing,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout: Some(Duration::from_secs(3)),
            nodelay: true,
        }
    }
}

/// Writes a single frame, compressing the body if the policy says so.
pub fn write_frame<W: Write>(
    writer: &mut W,
    body: &[u8],
    config: &SocketConfig,
) -> Result<()> {
    let (flags, payload) = if config.compression.should_compress(body.len()) {
        (FLAG_LZ4, compress(body)?)
    } else {
        (0, body.to_vec())
    };
    if payload.len() > config.max_frame_size {
        return Err(Error::FrameTooLarge(payload.len()));
    }

    let mut header = [0; 5];
    LittleEndian::write_u32(&mut header[0..4], payload.len() as u32);
    header[4] = flags;
    writer.write_all(&header)?;
    writer.write_all(&payload)?;
    writer.flush()?;
    Ok(())
}

/// Reads a single frame, returning the decompressed body.
pub fn read_frame<R: Read>(reader: &mut R, config: &SocketConfig) -> Result<Vec<u8>> {
    let mut header = [0; 5];
    reader.read_exact(&mut header).map_err(map_read_err)?;
    let len = LittleEndian::read_u32(&header[0..4]) as usize;
    if len > config.max_frame_size {
        return Err(Error::FrameTooLarge(len));
    }
    let mut payload = vec![0; len];
    reader.read_exact(&mut payload).map_err(map_read_err)?;
    if header[4] & FLAG_LZ4 != 0 {
        decompress(&payload)
    } else {
        Ok(payload)
    }
}

fn map_read_err(e: std::io::Error) -> Error {
    match e.kind() {
        ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::TimedOut,
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
            Error::HostUnreachable
        }
        _ => Error::IoError(e),
    }
}

#[cfg(feature = "lz4")]
fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(lz4::block::compress(bytes, None, true)?)
}

#[cfg(not(feature = "lz4"))]
fn compress(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(bytes.to_vec())
}

#[cfg(feature = "lz4")]
fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    Ok(lz4::block::decompress(bytes, None)?)
}

#[cfg(not(feature = "lz4"))]
fn decompress(_: &[u8]) -> Result<Vec<u8>> {
    Err(Error::Other(
        "received compressed frame, lz4 support not enabled".to_string(),
    ))
}

/// Tcp stream exchanging framed signals.
pub struct FramedStream {
    stream: TcpStream,
    config: SocketConfig,
}

impl FramedStream {
    pub fn new(stream: TcpStream, config: SocketConfig) -> Result<Self> {
        stream.set_nodelay(config.nodelay)?;
        Ok(Self { stream, config })
    }

    /// Connects to the address, using the configured connect timeout.
    pub fn connect(addr: SocketAddr, config: SocketConfig) -> Result<Self> {
        let stream = match config.connect_timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|e| match e.kind() {
            ErrorKind::TimedOut | ErrorKind::WouldBlock => Error::TimedOut,
            ErrorKind::ConnectionRefused => Error::HostUnreachable,
            _ => Error::IoError(e),
        })?;
        trace!("connected to {}", addr);
        FramedStream::new(stream, config)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        // zero duration is rejected by the platform
        let timeout = timeout.filter(|t| *t > Duration::from_millis(0));
        Ok(self.stream.set_read_timeout(timeout)?)
    }

    pub fn send_sig(&mut self, sig: &Signal) -> Result<()> {
        let bytes = sig.to_bytes()?;
        write_frame(&mut self.stream, &bytes, &self.config)
    }

    /// Blocks until a whole signal is received or the read timeout elapses.
    pub fn recv_sig(&mut self) -> Result<Signal> {
        let bytes = read_frame(&mut self.stream, &self.config)?;
        Signal::from_bytes(&bytes)
    }

    pub fn shutdown(&self) -> Result<()> {
        Ok(self.stream.shutdown(Shutdown::Both)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn frame_layout() {
        let config = SocketConfig {
            compression: CompressionPolicy::Nothing,
            ..SocketConfig::default()
        };
        let mut buf = Vec::new();
        write_frame(&mut buf, b"abc", &config).unwrap();
        assert_eq!(buf, vec![3, 0, 0, 0, 0, b'a', b'b', b'c']);
        assert_eq!(read_frame(&mut Cursor::new(buf), &config).unwrap(), b"abc");
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn compressed_frame_is_flagged_and_smaller() {
        let config = SocketConfig {
            compression: CompressionPolicy::Everything,
            ..SocketConfig::default()
        };
        let body = vec![7u8; 10_000];
        let mut buf = Vec::new();
        write_frame(&mut buf, &body, &config).unwrap();
        assert_eq!(buf[4] & FLAG_LZ4, FLAG_LZ4);
        assert!(buf.len() < body.len());
        assert_eq!(read_frame(&mut Cursor::new(buf), &config).unwrap(), body);
    }

    #[test]
    fn oversized_frame_is_rejected() {
        let config = SocketConfig {
            compression: CompressionPolicy::Nothing,
            max_frame_size: 16,
            ..SocketConfig::default()
        };
        let mut buf = Vec::new();
        assert!(matches!(
            write_frame(&mut buf, &[0; 17], &config),
            Err(Error::FrameTooLarge(17))
        ));

        let mut header = vec![0; 5];
        LittleEndian::write_u32(&mut header[0..4], 1000);
        assert!(matches!(
            read_frame(&mut Cursor::new(header), &config),
            Err(Error::FrameTooLarge(1000))
        ));
    }

    #[test]
    fn truncated_frame_reports_unreachable_host() {
        let config = SocketConfig::default();
        let buf = vec![10, 0, 0, 0, 0, 1, 2];
        assert!(matches!(
            read_frame(&mut Cursor::new(buf), &config),
            Err(Error::HostUnreachable)
        ));
    }

    #[test]
    fn compression_policy_threshold() {
        let policy = CompressionPolicy::LargerThan(100);
        assert!(!policy.should_compress(100));
        assert!(policy.should_compress(101));
        assert!(!CompressionPolicy::Nothing.should_compress(usize::MAX));
    }
}
