use crate::codec::{read_varint, varint_len, write_varint};
use bytes::{Buf, BufMut, BytesMut};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read as _, Write as _};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::trace;

/// Largest frame accepted unless configured otherwise (2 MiB).
pub const DEFAULT_MAX_FRAME_LEN: usize = 2 * 1024 * 1024;

/// A length-framed connection carrying relay payloads.
///
/// Frame layout: `[u32 big-endian length][body]`. With compression enabled the
/// body is `[varint uncompressed length, 0 if stored][data]`, zlib-compressed
/// when the length is non-zero.
pub struct Connection {
    stream: TcpStream,
    read_buf: BytesMut,
    compression_threshold: Option<i32>,
    max_frame_len: usize,
}

impl Connection {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            read_buf: BytesMut::with_capacity(4096),
            compression_threshold: None,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }

    pub async fn connect(addr: impl ToSocketAddrs) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }

    pub fn set_max_frame_len(&mut self, max_frame_len: usize) {
        self.max_frame_len = max_frame_len;
    }

    /// Enable zlib compression with the given threshold. Negative thresholds disable it.
    pub fn enable_compression(&mut self, threshold: i32) {
        self.compression_threshold = (threshold >= 0).then_some(threshold);
    }

    /// Read a single frame body.
    pub async fn read_frame(&mut self) -> anyhow::Result<BytesMut> {
        read_frame_from(
            &mut self.stream,
            &mut self.read_buf,
            self.compression_threshold,
            self.max_frame_len,
        )
        .await
    }

    /// Write one frame containing `payload`.
    pub async fn write_frame(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(payload, self.compression_threshold)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    pub fn peer_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    /// Split the connection into read and write halves for concurrent I/O.
    /// Compression state is transferred to each half.
    pub fn into_split(self) -> (ConnectionReader, ConnectionWriter) {
        let (read_half, write_half) = self.stream.into_split();
        (
            ConnectionReader {
                stream: read_half,
                read_buf: self.read_buf,
                compression_threshold: self.compression_threshold,
                max_frame_len: self.max_frame_len,
            },
            ConnectionWriter {
                stream: write_half,
                compression_threshold: self.compression_threshold,
            },
        )
    }
}

/// Read half of a split connection.
pub struct ConnectionReader {
    stream: OwnedReadHalf,
    read_buf: BytesMut,
    compression_threshold: Option<i32>,
    max_frame_len: usize,
}

impl ConnectionReader {
    pub async fn read_frame(&mut self) -> anyhow::Result<BytesMut> {
        read_frame_from(
            &mut self.stream,
            &mut self.read_buf,
            self.compression_threshold,
            self.max_frame_len,
        )
        .await
    }
}

/// Write half of a split connection.
pub struct ConnectionWriter {
    stream: OwnedWriteHalf,
    compression_threshold: Option<i32>,
}

impl ConnectionWriter {
    pub async fn write_frame(&mut self, payload: &[u8]) -> anyhow::Result<()> {
        let frame = build_frame(payload, self.compression_threshold)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }
}

// === Shared helpers ===

async fn read_frame_from<R: AsyncRead + Unpin>(
    stream: &mut R,
    read_buf: &mut BytesMut,
    compression_threshold: Option<i32>,
    max_frame_len: usize,
) -> anyhow::Result<BytesMut> {
    loop {
        if let Some(frame) = try_parse_frame(read_buf, compression_threshold, max_frame_len)? {
            return Ok(frame);
        }
        let mut tmp = [0u8; 4096];
        let n = stream.read(&mut tmp).await?;
        if n == 0 {
            return Err(anyhow::anyhow!("Connection closed"));
        }
        read_buf.extend_from_slice(&tmp[..n]);
    }
}

fn try_parse_frame(
    read_buf: &mut BytesMut,
    compression_threshold: Option<i32>,
    max_frame_len: usize,
) -> anyhow::Result<Option<BytesMut>> {
    if read_buf.len() < 4 {
        return Ok(None);
    }

    let length = u32::from_be_bytes([read_buf[0], read_buf[1], read_buf[2], read_buf[3]]) as usize;
    if length > max_frame_len {
        anyhow::bail!("Frame of {} bytes exceeds limit of {}", length, max_frame_len);
    }
    if read_buf.len() < 4 + length {
        return Ok(None);
    }

    read_buf.advance(4);
    let mut body = read_buf.split_to(length);

    if compression_threshold.is_some() {
        let data_length = read_varint(&mut body)?;
        if data_length < 0 || data_length as usize > max_frame_len {
            anyhow::bail!("Invalid uncompressed length {}", data_length);
        }
        if data_length > 0 {
            let mut decompressed = vec![0u8; data_length as usize];
            let mut decoder = ZlibDecoder::new(&body[..]);
            decoder.read_exact(&mut decompressed)?;
            body = BytesMut::from(&decompressed[..]);
        }
    }

    trace!("Read frame len={}", body.len());
    Ok(Some(body))
}

fn build_frame(payload: &[u8], compression_threshold: Option<i32>) -> anyhow::Result<BytesMut> {
    let mut body = BytesMut::new();

    match compression_threshold {
        Some(threshold) if !payload.is_empty() && payload.len() as i32 >= threshold => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(payload)?;
            let compressed = encoder.finish()?;
            body.reserve(varint_len(payload.len() as i32) + compressed.len());
            write_varint(&mut body, payload.len() as i32);
            body.extend_from_slice(&compressed);
        }
        Some(_) => {
            write_varint(&mut body, 0);
            body.extend_from_slice(payload);
        }
        None => body.extend_from_slice(payload),
    }

    let mut frame = BytesMut::with_capacity(4 + body.len());
    frame.put_u32(body.len() as u32);
    frame.extend_from_slice(&body);
    Ok(frame)
}
