//! Per-entry pipeline: header fields, checksum, compression and size counters.
//!
//! An [`EntryWriter`] turns source chunks into body bytes for exactly one
//! archive member. It never touches the archive's file pointer or output
//! queue; [`ZipStream`](super::ZipStream) emits whatever it returns.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::DeflateEncoder;
use time::PrimitiveDateTime;

use super::checksum::Crc32;
use super::structures::*;
use crate::error::{Result, ZipError};

/// Caller-supplied metadata for one archive member.
#[derive(Debug, Clone)]
pub struct EntryOptions {
    name: String,
    method: CompressionMethod,
    modified: Option<PrimitiveDateTime>,
    size_hint: Option<u64>,
    is_directory: bool,
}

impl EntryOptions {
    /// A file entry, deflated unless changed with [`method`](Self::method).
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: CompressionMethod::Deflate,
            modified: None,
            size_hint: None,
            is_directory: false,
        }
    }

    /// A directory entry. The name gains a trailing `/` if missing.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            is_directory: true,
            method: CompressionMethod::Stored,
            ..Self::new(name)
        }
    }

    pub fn method(mut self, method: CompressionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn stored(self) -> Self {
        self.method(CompressionMethod::Stored)
    }

    /// Modification time; defaults to the time the entry is started.
    pub fn modified(mut self, modified: PrimitiveDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    /// Expected uncompressed size, used for the ZIP64 decision.
    pub fn size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declared_size(&self) -> Option<u64> {
        self.size_hint
    }

    pub fn is_directory(&self) -> bool {
        self.is_directory
    }

    pub(crate) fn into_directory(mut self) -> Self {
        self.is_directory = true;
        self
    }
}

/// Lifecycle of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Idle,
    HeaderEmitted,
    Streaming,
    Finalizing,
    Completed,
    Failed,
}

enum BodyEncoder {
    Store,
    Deflate(DeflateEncoder<Vec<u8>>),
    Done,
}

/// The in-flight entry.
pub(crate) struct EntryWriter {
    entry: ZipFileEntry,
    size_hint: Option<u64>,
    checksum: Option<Crc32>,
    encoder: BodyEncoder,
    state: EntryState,
}

impl EntryWriter {
    /// Validate and normalize `options`. Nothing is emitted yet.
    pub fn new(options: EntryOptions, level: Compression) -> Result<Self> {
        let EntryOptions {
            mut name,
            mut method,
            modified,
            mut size_hint,
            is_directory,
        } = options;

        if name.is_empty() {
            return Err(ZipError::InvalidName);
        }
        if is_directory {
            method = CompressionMethod::Stored;
            size_hint = Some(0);
            if !name.ends_with('/') {
                name.push('/');
            }
        }
        if name.len() > u16::MAX as usize {
            return Err(ZipError::NameTooLong { len: name.len() });
        }

        let modified = modified
            .map(DosDateTime::from_datetime)
            .unwrap_or_else(DosDateTime::now);

        let encoder = match method {
            CompressionMethod::Stored => BodyEncoder::Store,
            CompressionMethod::Deflate => {
                BodyEncoder::Deflate(DeflateEncoder::new(Vec::new(), level))
            }
        };

        Ok(Self {
            entry: ZipFileEntry {
                file_name: name,
                compression_method: method,
                compressed_size: 0,
                uncompressed_size: 0,
                crc32: 0,
                lfh_offset: 0,
                last_mod_time: modified.time,
                last_mod_date: modified.date,
                is_directory,
                version_needed: ZIP_VERSION,
                flags: FLAG_DATA_DESCRIPTOR | FLAG_UTF8,
            },
            size_hint,
            checksum: Some(Crc32::new()),
            encoder,
            state: EntryState::Idle,
        })
    }

    pub fn name(&self) -> &str {
        &self.entry.file_name
    }

    pub fn state(&self) -> EntryState {
        self.state
    }

    pub fn size_hint(&self) -> Option<u64> {
        self.size_hint
    }

    pub fn uncompressed_size(&self) -> u64 {
        self.entry.uncompressed_size
    }

    pub fn compressed_size(&self) -> u64 {
        self.entry.compressed_size
    }

    /// Pin the entry at `offset` and encode its local file header.
    pub fn local_header(&mut self, offset: u64, zip64: bool) -> Vec<u8> {
        self.entry.lfh_offset = offset;
        self.state = EntryState::HeaderEmitted;

        LocalFileHeader {
            version_needed: self.entry.version_needed,
            flags: self.entry.flags,
            method: self.entry.compression_method,
            modified: self.entry.modified(),
            file_name: self.entry.file_name.as_bytes(),
            zip64,
        }
        .to_bytes()
    }

    /// Account for one source chunk and return the body bytes to emit.
    ///
    /// Deflated entries may return nothing until the compressor has
    /// gathered enough input.
    pub fn feed(&mut self, chunk: &[u8]) -> io::Result<Vec<u8>> {
        if self.entry.is_directory && !chunk.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "directory entries carry no data",
            ));
        }
        self.state = EntryState::Streaming;

        if let Some(checksum) = &mut self.checksum {
            checksum.update(chunk);
        }
        self.entry.uncompressed_size += chunk.len() as u64;

        let body = match &mut self.encoder {
            BodyEncoder::Store => chunk.to_vec(),
            BodyEncoder::Deflate(encoder) => {
                encoder.write_all(chunk)?;
                std::mem::take(encoder.get_mut())
            }
            BodyEncoder::Done => return Err(io::Error::other("entry already finished")),
        };
        self.entry.compressed_size += body.len() as u64;
        Ok(body)
    }

    /// Signal end of input: flush the compressor and settle CRC and sizes.
    /// Returns the trailing body bytes.
    pub fn finish(&mut self) -> io::Result<Vec<u8>> {
        self.state = EntryState::Finalizing;

        let tail = match std::mem::replace(&mut self.encoder, BodyEncoder::Done) {
            BodyEncoder::Deflate(encoder) => encoder.finish()?,
            BodyEncoder::Store | BodyEncoder::Done => Vec::new(),
        };
        self.entry.compressed_size += tail.len() as u64;

        if self.entry.compression_method == CompressionMethod::Stored {
            self.entry.compressed_size = self.entry.uncompressed_size;
        }
        if let Some(checksum) = self.checksum.take() {
            self.entry.crc32 = checksum.digest();
        }
        Ok(tail)
    }

    /// Encode the data descriptor that closes the entry.
    pub fn data_descriptor(&mut self, zip64: bool) -> Vec<u8> {
        self.state = EntryState::Completed;

        DataDescriptor {
            crc32: self.entry.crc32,
            compressed_size: self.entry.compressed_size,
            uncompressed_size: self.entry.uncompressed_size,
            zip64,
        }
        .to_bytes()
    }

    pub fn fail(&mut self) {
        self.state = EntryState::Failed;
    }

    pub fn into_entry(self) -> ZipFileEntry {
        self.entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    fn writer(options: EntryOptions) -> EntryWriter {
        EntryWriter::new(options, Compression::default()).unwrap()
    }

    #[test]
    fn test_directory_is_normalized() {
        let mut dir = writer(EntryOptions::directory("docs").method(CompressionMethod::Deflate));
        assert_eq!(dir.name(), "docs/");
        assert_eq!(dir.size_hint(), Some(0));

        dir.local_header(0, false);
        assert!(dir.finish().unwrap().is_empty());
        dir.data_descriptor(false);

        let entry = dir.into_entry();
        assert!(entry.is_directory);
        assert_eq!(entry.compression_method, CompressionMethod::Stored);
        assert_eq!(entry.crc32, 0);
        assert_eq!(entry.uncompressed_size, 0);
        assert_eq!(entry.compressed_size, 0);
    }

    #[test]
    fn test_directory_keeps_trailing_slash() {
        assert_eq!(writer(EntryOptions::directory("docs/")).name(), "docs/");
    }

    #[test]
    fn test_directory_rejects_data() {
        let mut dir = writer(EntryOptions::directory("docs"));
        assert!(dir.feed(b"").is_ok());
        assert!(dir.feed(b"x").is_err());
    }

    #[test]
    fn test_name_validation() {
        let empty = EntryWriter::new(EntryOptions::new(""), Compression::default());
        assert!(matches!(empty, Err(ZipError::InvalidName)));

        let long = EntryWriter::new(EntryOptions::new("a".repeat(65536)), Compression::default());
        assert!(matches!(long, Err(ZipError::NameTooLong { len: 65536 })));

        assert!(EntryWriter::new(EntryOptions::new("a".repeat(65535)), Compression::default()).is_ok());
    }

    #[test]
    fn test_stored_passthrough() {
        let mut file = writer(EntryOptions::new("a.txt").stored());
        let header = file.local_header(100, false);
        assert_eq!(header.len(), 35);
        assert_eq!(file.state(), EntryState::HeaderEmitted);

        assert_eq!(file.feed(b"hello ").unwrap(), b"hello ");
        assert_eq!(file.feed(b"world").unwrap(), b"world");
        assert_eq!(file.state(), EntryState::Streaming);
        assert!(file.finish().unwrap().is_empty());

        let descriptor = file.data_descriptor(false);
        assert_eq!(descriptor.len(), DataDescriptor::SIZE);
        assert_eq!(file.state(), EntryState::Completed);

        let entry = file.into_entry();
        assert_eq!(entry.lfh_offset, 100);
        assert_eq!(entry.uncompressed_size, 11);
        assert_eq!(entry.compressed_size, 11);
        assert_eq!(entry.crc32, crc32fast::hash(b"hello world"));
    }

    #[test]
    fn test_deflate_roundtrip() {
        let data: Vec<u8> = b"the quick brown fox jumps over the lazy dog. "
            .iter()
            .copied()
            .cycle()
            .take(50_000)
            .collect();

        let mut file = writer(EntryOptions::new("fox.txt"));
        file.local_header(0, false);

        let mut compressed = Vec::new();
        for chunk in data.chunks(4096) {
            compressed.extend(file.feed(chunk).unwrap());
        }
        compressed.extend(file.finish().unwrap());

        let entry = file.into_entry();
        assert_eq!(entry.uncompressed_size, data.len() as u64);
        assert_eq!(entry.compressed_size, compressed.len() as u64);
        assert!(entry.compressed_size < entry.uncompressed_size);
        assert_eq!(entry.crc32, crc32fast::hash(&data));

        let mut inflated = Vec::new();
        DeflateDecoder::new(&compressed[..])
            .read_to_end(&mut inflated)
            .unwrap();
        assert_eq!(inflated, data);
    }

    #[test]
    fn test_deflate_empty_input() {
        let mut file = writer(EntryOptions::new("empty"));
        file.local_header(0, false);
        let tail = file.finish().unwrap();
        assert!(!tail.is_empty());

        let mut inflated = Vec::new();
        DeflateDecoder::new(&tail[..]).read_to_end(&mut inflated).unwrap();
        assert!(inflated.is_empty());

        let entry = file.into_entry();
        assert_eq!(entry.crc32, 0);
        assert_eq!(entry.compressed_size, tail.len() as u64);
    }

    #[test]
    fn test_feed_after_finish_fails() {
        let mut file = writer(EntryOptions::new("f"));
        file.finish().unwrap();
        assert!(file.feed(b"late").is_err());
    }
}
