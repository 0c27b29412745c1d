//! Error type for archive operations.
//!
//! Every [`ZipError`] returned by [`ZipStream`](crate::ZipStream) is terminal:
//! the archive stops emitting output and ignores later calls.

use std::io;
use thiserror::Error;

/// Errors signalled while building an archive.
#[derive(Debug, Error)]
pub enum ZipError {
    /// An entry was started (or the archive finalized) while another entry
    /// was still streaming.
    #[error("previous file not finished")]
    EntryInProgress,

    /// Data or an end-of-entry signal arrived with no entry started.
    #[error("no entry in progress")]
    NoEntryInProgress,

    /// The entry name was empty.
    #[error("empty filename")]
    InvalidName,

    /// The encoded entry name does not fit the 16-bit length field.
    #[error("file name too long: {len} bytes (max 65535)")]
    NameTooLong {
        /// Encoded length of the rejected name.
        len: usize,
    },

    /// `finalize` was called on an archive with no entries while empty
    /// archives are disallowed.
    #[error("archive contains no entries")]
    EmptyArchive,

    /// A value outgrew its 32-bit field after the archive committed to the
    /// non-ZIP64 layout.
    #[error("{field} of {value} does not fit a non-ZIP64 archive")]
    Zip64Required {
        /// Which record field overflowed.
        field: &'static str,
        /// The value that did not fit.
        value: u64,
    },

    /// The entry's source or the compressor failed mid-stream.
    #[error("source failed: {0}")]
    SourceFailure(#[source] io::Error),

    /// The sink refused a chunk or failed to close.
    #[error("sink failed: {0}")]
    SinkFailure(#[source] io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ZipError>;
