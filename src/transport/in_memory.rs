use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::transport::{FrameReader, FrameWriter, Transport};

pub struct InMemoryReader {
    rx: mpsc::UnboundedReceiver<String>,
}

pub struct InMemoryWriter {
    tx: mpsc::UnboundedSender<String>,
}

/// One end of an in-process duplex channel.
pub struct InMemoryTransport {
    reader: InMemoryReader,
    writer: InMemoryWriter,
}

impl InMemoryTransport {
    pub fn pair() -> (Self, Self) {
        let (tx1, rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        (
            Self {
                reader: InMemoryReader { rx: rx1 },
                writer: InMemoryWriter { tx: tx2 },
            },
            Self {
                reader: InMemoryReader { rx: rx2 },
                writer: InMemoryWriter { tx: tx1 },
            },
        )
    }
}

#[async_trait]
impl FrameReader for InMemoryReader {
    async fn recv(&mut self) -> anyhow::Result<String> {
        self.rx
            .recv()
            .await
            .ok_or_else(|| anyhow::anyhow!("Channel closed"))
    }
}

#[async_trait]
impl FrameWriter for InMemoryWriter {
    async fn send(&mut self, frame: &str) -> anyhow::Result<()> {
        self.tx
            .send(frame.to_string())
            .map_err(|_| anyhow::anyhow!("Channel closed"))
    }
}

#[async_trait]
impl FrameReader for InMemoryTransport {
    async fn recv(&mut self) -> anyhow::Result<String> {
        self.reader.recv().await
    }
}

#[async_trait]
impl FrameWriter for InMemoryTransport {
    async fn send(&mut self, frame: &str) -> anyhow::Result<()> {
        self.writer.send(frame).await
    }
}

impl Transport for InMemoryTransport {
    type Reader = InMemoryReader;
    type Writer = InMemoryWriter;

    fn into_split(self) -> (InMemoryReader, InMemoryWriter) {
        (self.reader, self.writer)
    }
}
