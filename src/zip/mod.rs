//! Streaming ZIP encoding.
//!
//! This module turns a sequence of named byte streams into a single ZIP
//! archive, emitted front to back without ever seeking.
//!
//! ## Architecture
//!
//! - [`structures`]: on-disk records (local headers, data descriptors,
//!   central directory, end records) and their little-endian encodings
//! - [`checksum`]: incremental CRC-32
//! - [`entry`]: per-entry pipeline (compression, checksum, size counters)
//! - [`queue`]: ordered output buffer with pause/resume flow control
//! - [`archive`]: the archive state machine tying it all together
//!
//! ## Layout
//!
//! Each entry is written as a local file header with zeroed CRC and sizes
//! (general purpose flag bit 3), followed by the entry data and a data
//! descriptor carrying the real values. The central directory and the end
//! records follow the last entry. When an archive needs ZIP64, every record
//! switches to its ZIP64 form for the whole archive.
//!
//! ## Limitations
//!
//! - No encryption
//! - No multi-disk archives
//! - Only STORED and DEFLATE

pub mod archive;
pub mod checksum;
pub mod entry;
pub mod queue;
pub mod structures;

pub use archive::{ArchiveOptions, ArchiveState, Zip64Mode, ZipStream};
pub use checksum::Crc32;
pub use entry::{EntryOptions, EntryState};
pub use queue::{FlowControl, OutputQueue};
pub use structures::*;
