use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::{timeout, Duration};

use crate::config::MAX_FRAME_SIZE;
use crate::transport::{FrameReader, FrameWriter, Transport};

/// Default timeout for a single frame write (30 seconds).
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

fn map_io(e: std::io::Error) -> anyhow::Error {
    match e.kind() {
        std::io::ErrorKind::UnexpectedEof => anyhow::anyhow!("Connection closed by peer"),
        std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::BrokenPipe => {
            anyhow::anyhow!("Connection reset by peer")
        }
        _ => anyhow::anyhow!("I/O error: {}", e),
    }
}

/// Read one frame: a 4-byte big-endian length followed by that many UTF-8 bytes.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R, max: u32) -> anyhow::Result<String> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(map_io)?;
    let len = u32::from_be_bytes(len_buf);
    if len == 0 {
        return Err(anyhow::anyhow!("Invalid frame length: 0"));
    }
    if len > max {
        return Err(anyhow::anyhow!("Frame too large: {} bytes (max: {})", len, max));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await.map_err(map_io)?;
    String::from_utf8(buf).map_err(|e| anyhow::anyhow!("Frame is not valid UTF-8: {}", e))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &str,
    max: u32,
) -> anyhow::Result<()> {
    let data = frame.as_bytes();
    if data.len() as u64 > max as u64 {
        return Err(anyhow::anyhow!(
            "Frame too large: {} bytes (max: {})",
            data.len(),
            max
        ));
    }
    writer
        .write_all(&(data.len() as u32).to_be_bytes())
        .await
        .map_err(map_io)?;
    writer.write_all(data).await.map_err(map_io)?;
    writer.flush().await.map_err(map_io)?;
    Ok(())
}

pub struct TcpFrameReader {
    half: OwnedReadHalf,
    idle_timeout: Option<Duration>,
}

impl TcpFrameReader {
    /// Fail reads that see no frame within `idle`.
    pub fn set_idle_timeout(&mut self, idle: Option<Duration>) {
        self.idle_timeout = idle;
    }
}

pub struct TcpFrameWriter {
    half: OwnedWriteHalf,
    write_timeout: Duration,
}

impl TcpFrameWriter {
    pub fn set_write_timeout(&mut self, limit: Duration) {
        self.write_timeout = limit;
    }
}

#[async_trait]
impl FrameReader for TcpFrameReader {
    async fn recv(&mut self) -> anyhow::Result<String> {
        let read = read_frame(&mut self.half, MAX_FRAME_SIZE);
        match self.idle_timeout {
            Some(limit) => timeout(limit, read)
                .await
                .map_err(|_| anyhow::anyhow!("Connection idle for {:?}", limit))?,
            None => read.await,
        }
    }
}

#[async_trait]
impl FrameWriter for TcpFrameWriter {
    async fn send(&mut self, frame: &str) -> anyhow::Result<()> {
        timeout(
            self.write_timeout,
            write_frame(&mut self.half, frame, MAX_FRAME_SIZE),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Send timeout after {:?}", self.write_timeout))?
    }
}

/// Length-prefixed UTF-8 frames over a TCP stream.
pub struct TcpTransport {
    reader: TcpFrameReader,
    writer: TcpFrameWriter,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: TcpFrameReader {
                half: read,
                idle_timeout: None,
            },
            writer: TcpFrameWriter {
                half: write,
                write_timeout: DEFAULT_WRITE_TIMEOUT,
            },
        }
    }

    pub fn with_timeouts(stream: TcpStream, idle: Option<Duration>, write: Duration) -> Self {
        let mut transport = Self::new(stream);
        transport.reader.set_idle_timeout(idle);
        transport.writer.set_write_timeout(write);
        transport
    }

    pub async fn connect<A: ToSocketAddrs>(addr: A) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self::new(stream))
    }
}

#[async_trait]
impl FrameReader for TcpTransport {
    async fn recv(&mut self) -> anyhow::Result<String> {
        self.reader.recv().await
    }
}

#[async_trait]
impl FrameWriter for TcpTransport {
    async fn send(&mut self, frame: &str) -> anyhow::Result<()> {
        self.writer.send(frame).await
    }
}

impl Transport for TcpTransport {
    type Reader = TcpFrameReader;
    type Writer = TcpFrameWriter;

    fn into_split(self) -> (TcpFrameReader, TcpFrameWriter) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip_over_duplex() -> anyhow::Result<()> {
        let (mut a, mut b) = tokio::io::duplex(256);
        write_frame(&mut a, "atacar 1,2", MAX_FRAME_SIZE).await?;
        write_frame(&mut a, "¿listo?", MAX_FRAME_SIZE).await?;
        assert_eq!(read_frame(&mut b, MAX_FRAME_SIZE).await?, "atacar 1,2");
        assert_eq!(read_frame(&mut b, MAX_FRAME_SIZE).await?, "¿listo?");
        Ok(())
    }

    #[tokio::test]
    async fn rejects_bad_frames() -> anyhow::Result<()> {
        let (mut a, mut b) = tokio::io::duplex(256);
        a.write_all(&0u32.to_be_bytes()).await?;
        assert!(read_frame(&mut b, MAX_FRAME_SIZE).await.is_err());

        let (mut a, mut b) = tokio::io::duplex(256);
        a.write_all(&100u32.to_be_bytes()).await?;
        assert!(read_frame(&mut b, 10).await.is_err());

        let (mut a, mut b) = tokio::io::duplex(256);
        a.write_all(&2u32.to_be_bytes()).await?;
        a.write_all(&[0xff, 0xfe]).await?;
        assert!(read_frame(&mut b, MAX_FRAME_SIZE).await.is_err());

        let (mut a, _b) = tokio::io::duplex(256);
        assert!(write_frame(&mut a, "demasiado largo", 4).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn eof_reports_closed_peer() {
        let (a, mut b) = tokio::io::duplex(16);
        drop(a);
        let err = read_frame(&mut b, MAX_FRAME_SIZE).await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}
