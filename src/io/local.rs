use super::{ChunkSink, ChunkSource};
use async_trait::async_trait;
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Chunked source over any async byte stream (local files, stdin, pipes)
pub struct ReaderSource<R> {
    reader: R,
    chunk_size: usize,
    size: Option<u64>,
}

impl<R: AsyncRead + Unpin + Send> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            chunk_size: DEFAULT_CHUNK_SIZE,
            size: None,
        }
    }

    /// Upper bound for the length of each delivered chunk
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }
}

impl ReaderSource<File> {
    /// Open a local file; its current length becomes the size hint
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        Ok(Self::new(file).with_size_hint(size))
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ChunkSource for ReaderSource<R> {
    async fn next_chunk(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.chunk_size];
        let n = self.reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    fn size_hint(&self) -> Option<u64> {
        self.size
    }
}

/// Sink writing the archive to any async writer (a file, stdout, a socket)
pub struct WriterSink<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl WriterSink<File> {
    /// Create (or truncate) a local file to receive the archive
    pub async fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(File::create(path).await?))
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ChunkSink for WriterSink<W> {
    async fn accept(&mut self, chunk: Vec<u8>) -> io::Result<()> {
        self.writer.write_all(&chunk).await
    }

    async fn end(&mut self) -> io::Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await
    }
}
