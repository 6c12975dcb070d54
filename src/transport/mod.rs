//! Frame transports. A frame is one UTF-8 message; how it is delimited is up to the transport.

use async_trait::async_trait;

pub mod in_memory;
pub mod tcp;

#[async_trait]
pub trait FrameReader: Send {
    /// Next complete frame. Errors are terminal for the connection.
    async fn recv(&mut self) -> anyhow::Result<String>;
}

#[async_trait]
pub trait FrameWriter: Send {
    async fn send(&mut self, frame: &str) -> anyhow::Result<()>;
}

/// A bidirectional transport whose halves can be owned by different tasks.
pub trait Transport: FrameReader + FrameWriter {
    type Reader: FrameReader + 'static;
    type Writer: FrameWriter + 'static;

    fn into_split(self) -> (Self::Reader, Self::Writer);
}
