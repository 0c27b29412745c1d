//! # zipstream
//!
//! Streaming ZIP archive encoder.
//!
//! Entries are read from asynchronous chunk sources and the archive is
//! written to an asynchronous chunk sink as it is produced, so neither the
//! inputs nor the output ever have to fit in memory or be seekable.
//!
//! ## Features
//!
//! - STORED and DEFLATE entries, one at a time, in insertion order
//! - Data descriptors, so entry sizes need not be known up front
//! - Automatic or forced ZIP64 for large archives
//! - Pause/resume backpressure between the archive and its sink
//! - Sources for local files, async readers, channels, buffers and HTTP URLs
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use zipstream::{EntryOptions, ReaderSource, WriterSink, ZipStream};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sink = WriterSink::create(Path::new("out.zip")).await?;
//!     let mut zip = ZipStream::new(sink);
//!
//!     zip.add_buffer("hello\n", EntryOptions::new("hello.txt")).await?;
//!     zip.add_directory(EntryOptions::directory("data")).await?;
//!
//!     let source = ReaderSource::open(Path::new("Cargo.toml")).await?;
//!     zip.add_file(source, EntryOptions::new("data/Cargo.toml")).await?;
//!
//!     let total = zip.finalize().await?;
//!     println!("wrote {total:?} bytes");
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use error::{Result, ZipError};
pub use io::{
    BufferSource, ChannelSink, ChannelSource, ChunkSink, ChunkSource, HttpSource, ReaderSource,
    WriterSink,
};
pub use zip::{
    ArchiveOptions, ArchiveState, CompressionMethod, EntryOptions, EntryState, FlowControl,
    Zip64Mode, ZipFileEntry, ZipStream,
};
