//! Archive state machine.
//!
//! [`ZipStream`] owns every piece of mutable archive state: the file pointer,
//! the completed entries, the in-flight entry and the output queue. Entries
//! are written strictly one at a time; `finalize` then appends the central
//! directory and end records.

use flate2::Compression;
use tracing::{debug, warn};

use super::entry::{EntryOptions, EntryState, EntryWriter};
use super::queue::{FlowControl, OutputQueue};
use super::structures::*;
use crate::error::{Result, ZipError};
use crate::io::{BufferSource, ChunkSink, ChunkSource};

const DEFAULT_HIGH_WATER_MARK: usize = 64 * 1024;

/// How the archive chooses between the 32-bit and ZIP64 layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zip64Mode {
    /// Decide once, right before the first local header, from the declared
    /// totals and the first entry's size hint.
    #[default]
    Auto,
    /// Always write ZIP64 records.
    Always,
}

/// Archive-wide settings.
#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    zip64: Zip64Mode,
    expected_entries: Option<u64>,
    expected_size: Option<u64>,
    compression: Compression,
    high_water_mark: usize,
    allow_empty: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            zip64: Zip64Mode::Auto,
            expected_entries: None,
            expected_size: None,
            compression: Compression::default(),
            high_water_mark: DEFAULT_HIGH_WATER_MARK,
            allow_empty: true,
        }
    }
}

impl ArchiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn zip64(mut self, mode: Zip64Mode) -> Self {
        self.zip64 = mode;
        self
    }

    /// Number of entries the caller intends to add.
    pub fn expected_entries(mut self, entries: u64) -> Self {
        self.expected_entries = Some(entries);
        self
    }

    /// Total bytes of entry data the caller intends to add.
    pub fn expected_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    /// Deflate level, 0 (fastest) to 9 (smallest).
    pub fn compression_level(mut self, level: u32) -> Self {
        self.compression = Compression::new(level.min(9));
        self
    }

    /// Bytes that may pile up while output is paused before producers wait.
    pub fn high_water_mark(mut self, bytes: usize) -> Self {
        self.high_water_mark = bytes.max(1);
        self
    }

    /// Whether `finalize` on an archive without entries writes an empty
    /// archive (`true`) or fails with [`ZipError::EmptyArchive`].
    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }

    fn wants_zip64(&self, first_entry_size: Option<u64>) -> bool {
        match self.zip64 {
            Zip64Mode::Always => true,
            Zip64Mode::Auto => {
                self.expected_entries.is_some_and(|n| !fits_u16(n))
                    || self.expected_size.is_some_and(|n| !fits_u32(n))
                    || first_entry_size.is_some_and(|n| !fits_u32(n))
            }
        }
    }
}

/// Lifecycle of the whole archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveState {
    Open,
    Finalized,
    Errored,
    Destroyed,
}

impl ArchiveState {
    /// Closed archives ignore every further call.
    pub fn is_closed(self) -> bool {
        self != ArchiveState::Open
    }
}

fn check_fits(field: &'static str, value: u64) -> Result<()> {
    if fits_u32(value) {
        Ok(())
    } else {
        Err(ZipError::Zip64Required { field, value })
    }
}

/// Streaming ZIP encoder writing into a [`ChunkSink`].
///
/// ## Example
///
/// ```no_run
/// use zipstream::{EntryOptions, ZipStream};
///
/// # async fn run() -> zipstream::Result<()> {
/// let mut zip = ZipStream::new(Vec::new());
/// zip.add_buffer("hi", EntryOptions::new("a.txt").stored()).await?;
/// zip.add_directory(EntryOptions::directory("docs")).await?;
/// let total = zip.finalize().await?;
/// assert_eq!(total, Some(zip.sink().len() as u64));
/// # Ok(())
/// # }
/// ```
pub struct ZipStream<S> {
    queue: OutputQueue<S>,
    options: ArchiveOptions,
    file_pointer: u64,
    entries: Vec<ZipFileEntry>,
    active: Option<EntryWriter>,
    zip64: Option<bool>,
    state: ArchiveState,
}

impl<S: ChunkSink> ZipStream<S> {
    pub fn new(sink: S) -> Self {
        Self::with_options(sink, ArchiveOptions::default())
    }

    pub fn with_options(sink: S, options: ArchiveOptions) -> Self {
        Self {
            queue: OutputQueue::new(sink, options.high_water_mark),
            options,
            file_pointer: 0,
            entries: Vec::new(),
            active: None,
            zip64: None,
            state: ArchiveState::Open,
        }
    }

    /// Bytes emitted so far; the offset the next record will start at.
    pub fn bytes_written(&self) -> u64 {
        self.file_pointer
    }

    /// Completed entries in insertion order.
    pub fn entries(&self) -> &[ZipFileEntry] {
        &self.entries
    }

    /// Whether an entry is currently being streamed.
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_entry_state(&self) -> Option<EntryState> {
        self.active.as_ref().map(EntryWriter::state)
    }

    /// The committed layout, or `None` before the first header.
    pub fn is_zip64(&self) -> Option<bool> {
        self.zip64
    }

    pub fn state(&self) -> ArchiveState {
        self.state
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Bytes emitted but not yet accepted by the sink.
    pub fn pending_bytes(&self) -> usize {
        self.queue.pending_bytes()
    }

    pub fn flow_control(&self) -> FlowControl {
        self.queue.flow_control()
    }

    /// Stop delivering output to the sink; queued data is kept.
    pub fn pause(&self) {
        self.queue.flow_control().pause();
    }

    /// Allow delivery again. Queued data goes out on the next write,
    /// [`flush`](Self::flush) or [`finalize`](Self::finalize).
    pub fn resume(&self) {
        self.queue.flow_control().resume();
    }

    pub fn sink(&self) -> &S {
        self.queue.sink()
    }

    pub fn into_sink(self) -> S {
        self.queue.into_sink()
    }

    /// Deliver queued output unless paused.
    pub async fn flush(&mut self) -> Result<()> {
        if self.state.is_closed() {
            return Ok(());
        }
        let result = self.queue.flush().await.map_err(ZipError::SinkFailure);
        self.guard(result)
    }

    /// Add an entry whose data comes from `source`.
    ///
    /// Resolves once the entry's data descriptor has been emitted and the
    /// entry is recorded for the central directory.
    pub async fn add_file<R: ChunkSource>(
        &mut self,
        mut source: R,
        options: EntryOptions,
    ) -> Result<()> {
        if self.state.is_closed() {
            return Ok(());
        }

        let options = match (options.declared_size(), source.size_hint()) {
            (None, Some(size)) => options.size_hint(size),
            _ => options,
        };
        self.start_entry(options).await?;

        loop {
            if self.queue.is_blocked() {
                source.pause();
                let waited = self.queue.wait_writable().await;
                source.resume();
                self.guard(waited.map_err(ZipError::SinkFailure))?;
            }

            let chunk = match source.next_chunk().await {
                Ok(Some(chunk)) => chunk,
                Ok(None) => break,
                Err(err) => return self.guard(Err(ZipError::SourceFailure(err))),
            };
            self.write_chunk(&chunk).await?;
        }

        self.finish_entry().await
    }

    /// Add an entry from an in-memory buffer.
    pub async fn add_buffer(
        &mut self,
        data: impl Into<Vec<u8>>,
        options: EntryOptions,
    ) -> Result<()> {
        self.add_file(BufferSource::new(data), options).await
    }

    /// Add a zero-length, stored directory entry.
    pub async fn add_directory(&mut self, options: EntryOptions) -> Result<()> {
        self.start_entry(options.into_directory()).await?;
        self.finish_entry().await
    }

    /// Begin an entry and emit its local file header. Data follows through
    /// [`write_chunk`](Self::write_chunk), then [`finish_entry`](Self::finish_entry).
    pub async fn start_entry(&mut self, options: EntryOptions) -> Result<()> {
        if self.state.is_closed() {
            debug!(name = options.name(), "archive closed, ignoring entry");
            return Ok(());
        }
        let result = self.begin_entry(options).await;
        self.guard(result)
    }

    /// Feed the in-flight entry. Waits while output is paused and the queue
    /// is at its high-water mark.
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if self.state.is_closed() {
            return Ok(());
        }
        let result = self.stream_chunk(chunk).await;
        self.guard(result)
    }

    /// End the in-flight entry: flush the compressor and emit the data
    /// descriptor.
    pub async fn finish_entry(&mut self) -> Result<()> {
        if self.state.is_closed() {
            return Ok(());
        }
        let result = self.complete_entry().await;
        self.guard(result)
    }

    /// Write the central directory and end records, then end the sink once
    /// everything queued has been delivered.
    ///
    /// Returns the archive's total size, or `None` if the archive was
    /// already closed and nothing happened.
    pub async fn finalize(&mut self) -> Result<Option<u64>> {
        if self.state.is_closed() {
            return Ok(None);
        }
        let result = self.write_central_directory().await;
        self.guard(result)?;
        self.state = ArchiveState::Finalized;

        if let Err(err) = self.queue.end().await {
            warn!(error = %err, "failed to end sink");
            self.state = ArchiveState::Errored;
            return Err(ZipError::SinkFailure(err));
        }

        debug!(
            total = self.file_pointer,
            entries = self.entries.len(),
            "archive finalized"
        );
        Ok(Some(self.file_pointer))
    }

    /// Abort the archive. Queued output is dropped, the sink is never ended
    /// and every later call is ignored.
    pub fn destroy(&mut self) {
        debug!(written = self.file_pointer, "archive destroyed");
        self.state = ArchiveState::Destroyed;
        self.queue.discard();
        if let Some(writer) = self.active.as_mut() {
            writer.fail();
        }
    }

    async fn begin_entry(&mut self, options: EntryOptions) -> Result<()> {
        if self.active.is_some() {
            return Err(ZipError::EntryInProgress);
        }
        let mut writer = EntryWriter::new(options, self.options.compression)?;

        let zip64 = self.commit_zip64(writer.size_hint());
        if !zip64 {
            check_fits("local header offset", self.file_pointer)?;
            if let Some(size) = writer.size_hint() {
                check_fits("declared entry size", size)?;
            }
        }

        let offset = self.file_pointer;
        let header = writer.local_header(offset, zip64);
        debug!(name = writer.name(), offset, zip64, "starting entry");

        self.active = Some(writer);
        self.emit(header).await
    }

    async fn stream_chunk(&mut self, chunk: &[u8]) -> Result<()> {
        if self.active.is_none() {
            return Err(ZipError::NoEntryInProgress);
        }
        self.queue
            .wait_writable()
            .await
            .map_err(ZipError::SinkFailure)?;

        let zip64 = self.zip64.unwrap_or(false);
        let Some(writer) = self.active.as_mut() else {
            return Err(ZipError::NoEntryInProgress);
        };
        let body = writer.feed(chunk).map_err(ZipError::SourceFailure)?;
        if !zip64 {
            check_fits("uncompressed size", writer.uncompressed_size())?;
            check_fits("compressed size", writer.compressed_size())?;
        }

        self.emit(body).await
    }

    async fn complete_entry(&mut self) -> Result<()> {
        let zip64 = self.zip64.unwrap_or(false);
        let Some(writer) = self.active.as_mut() else {
            return Err(ZipError::NoEntryInProgress);
        };

        let tail = writer.finish().map_err(ZipError::SourceFailure)?;
        if !zip64 {
            check_fits("uncompressed size", writer.uncompressed_size())?;
            check_fits("compressed size", writer.compressed_size())?;
        }
        let descriptor = writer.data_descriptor(zip64);

        self.emit(tail).await?;
        self.emit(descriptor).await?;

        if let Some(writer) = self.active.take() {
            let entry = writer.into_entry();
            debug!(
                name = %entry.file_name,
                uncompressed = entry.uncompressed_size,
                compressed = entry.compressed_size,
                crc32 = entry.crc32,
                "finished entry"
            );
            self.entries.push(entry);
        }
        Ok(())
    }

    async fn write_central_directory(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(ZipError::EntryInProgress);
        }
        if self.entries.is_empty() && !self.options.allow_empty {
            return Err(ZipError::EmptyArchive);
        }

        let zip64 = self.commit_zip64(None);
        let cd_offset = self.file_pointer;
        let headers: Vec<Vec<u8>> = self
            .entries
            .iter()
            .map(|entry| entry.central_directory_header(zip64).to_bytes())
            .collect();
        let cd_size: u64 = headers.iter().map(|header| header.len() as u64).sum();
        let total_entries = self.entries.len() as u64;

        if !zip64 {
            if !fits_u16(total_entries) {
                return Err(ZipError::Zip64Required {
                    field: "entry count",
                    value: total_entries,
                });
            }
            check_fits("central directory offset", cd_offset)?;
            check_fits("central directory size", cd_size)?;
        }

        for header in headers {
            self.emit(header).await?;
        }

        if zip64 {
            let eocd64_offset = self.file_pointer;
            self.emit(
                Zip64EOCD {
                    total_entries,
                    cd_size,
                    cd_offset,
                }
                .to_bytes(),
            )
            .await?;
            self.emit(Zip64EOCDLocator { eocd64_offset }.to_bytes())
                .await?;
        }

        self.emit(
            EndOfCentralDirectory {
                total_entries,
                cd_size,
                cd_offset,
                zip64,
            }
            .to_bytes(),
        )
        .await
    }

    fn commit_zip64(&mut self, first_entry_size: Option<u64>) -> bool {
        if let Some(zip64) = self.zip64 {
            return zip64;
        }
        let zip64 = self.options.wants_zip64(first_entry_size);
        debug!(zip64, "committed archive layout");
        self.zip64 = Some(zip64);
        zip64
    }

    async fn emit(&mut self, bytes: Vec<u8>) -> Result<()> {
        self.file_pointer += bytes.len() as u64;
        self.queue.push(bytes);
        self.queue.flush().await.map_err(ZipError::SinkFailure)
    }

    /// Record a failure: the first error moves the archive to `Errored`.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if !self.state.is_closed() {
                warn!(error = %err, "archive failed");
                self.state = ArchiveState::Errored;
                if let Some(writer) = self.active.as_mut() {
                    writer.fail();
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_zip64_decision() {
        let options = ArchiveOptions::new();
        assert!(!options.wants_zip64(None));
        assert!(!options.wants_zip64(Some(0xFFFF_FFFE)));
        assert!(options.wants_zip64(Some(0xFFFF_FFFF)));

        assert!(ArchiveOptions::new().expected_entries(65_535).wants_zip64(None));
        assert!(!ArchiveOptions::new().expected_entries(65_534).wants_zip64(None));
        assert!(ArchiveOptions::new().expected_size(5 << 30).wants_zip64(None));
        assert!(ArchiveOptions::new().zip64(Zip64Mode::Always).wants_zip64(Some(1)));
    }

    #[test]
    fn test_option_clamps() {
        let options = ArchiveOptions::new().compression_level(42).high_water_mark(0);
        assert_eq!(options.compression.level(), 9);
        assert_eq!(options.high_water_mark, 1);
        assert!(options.allow_empty);
    }

    #[tokio::test]
    async fn test_entry_bookkeeping() {
        let mut zip = ZipStream::new(Vec::new());
        assert_eq!(zip.is_zip64(), None);

        zip.start_entry(EntryOptions::new("a").stored()).await.unwrap();
        assert!(zip.is_busy());
        assert_eq!(zip.active_entry_state(), Some(EntryState::HeaderEmitted));
        assert_eq!(zip.is_zip64(), Some(false));
        assert_eq!(zip.bytes_written(), 31);

        zip.write_chunk(b"xyz").await.unwrap();
        assert_eq!(zip.active_entry_state(), Some(EntryState::Streaming));
        zip.finish_entry().await.unwrap();

        assert!(!zip.is_busy());
        assert_eq!(zip.bytes_written(), 31 + 3 + 16);
        assert_eq!(zip.entries().len(), 1);
        assert_eq!(zip.entries()[0].lfh_offset, 0);
        assert_eq!(zip.sink().len() as u64, zip.bytes_written());
    }
}
