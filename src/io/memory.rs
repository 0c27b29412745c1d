use super::{ChunkSink, ChunkSource};
use async_trait::async_trait;
use std::io;
use tokio::sync::mpsc;

/// In-memory buffer delivered as one chunk
pub struct BufferSource {
    data: Option<Vec<u8>>,
    len: u64,
}

impl BufferSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        let data = data.into();
        let len = data.len() as u64;
        Self {
            data: Some(data),
            len,
        }
    }
}

#[async_trait]
impl ChunkSource for BufferSource {
    async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        Ok(self.data.take().filter(|data| !data.is_empty()))
    }

    fn size_hint(&self) -> Option<u64> {
        Some(self.len)
    }
}

/// Push-based producer feeding an entry through a bounded channel.
///
/// The producer side sends `Ok(chunk)` for data or `Err(_)` to abort the
/// entry; dropping every sender ends the entry. The channel bound is the
/// producer's backpressure.
pub struct ChannelSource {
    rx: mpsc::Receiver<io::Result<Vec<u8>>>,
    size_hint: Option<u64>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<io::Result<Vec<u8>>>) -> Self {
        Self {
            rx,
            size_hint: None,
        }
    }

    /// Create a source together with the sender that feeds it
    pub fn channel(capacity: usize) -> (mpsc::Sender<io::Result<Vec<u8>>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }
}

#[async_trait]
impl ChunkSource for ChannelSource {
    async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        self.rx.recv().await.transpose()
    }

    fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }
}

/// Forwards archive output to another task; the receiver sees the channel
/// close once the archive is finalized
pub struct ChannelSink {
    tx: Option<mpsc::Sender<Vec<u8>>>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Vec<u8>>) -> Self {
        Self { tx: Some(tx) }
    }
}

#[async_trait]
impl ChunkSink for ChannelSink {
    async fn accept(&mut self, chunk: Vec<u8>) -> io::Result<()> {
        let Some(tx) = &self.tx else {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink already ended"));
        };
        tx.send(chunk)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive receiver dropped"))
    }

    async fn end(&mut self) -> io::Result<()> {
        self.tx = None;
        Ok(())
    }
}
