mod http;
mod local;
mod memory;

pub use http::HttpSource;
pub use local::{ReaderSource, WriterSink};
pub use memory::{BufferSource, ChannelSink, ChannelSource};

use async_trait::async_trait;
use std::io;

use crate::zip::FlowControl;

/// Trait for producers of entry data, delivered one chunk at a time
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk of data, or `None` once the source is exhausted
    async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>>;

    /// Total number of bytes this source expects to deliver, if known
    fn size_hint(&self) -> Option<u64> {
        None
    }

    /// Called before the archive stops pulling because its output is backed up
    fn pause(&mut self) {}

    /// Called once the archive pulls again after a [`pause`](Self::pause)
    fn resume(&mut self) {}
}

/// Trait for consumers of the encoded archive bytes
#[async_trait]
pub trait ChunkSink: Send {
    /// Accept the next chunk of archive output
    async fn accept(&mut self, chunk: Vec<u8>) -> io::Result<()>;

    /// Called once, after the last chunk of a finalized archive
    async fn end(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Receive the archive's flow control handle, to pause delivery from the sink side
    fn attach(&mut self, _flow: FlowControl) {}
}

#[async_trait]
impl ChunkSink for Vec<u8> {
    async fn accept(&mut self, chunk: Vec<u8>) -> io::Result<()> {
        self.extend_from_slice(&chunk);
        Ok(())
    }
}
