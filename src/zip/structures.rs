use byteorder::{ByteOrder, LittleEndian};
use time::{OffsetDateTime, PrimitiveDateTime};

/// Version needed to extract, also written as "version made by".
pub const ZIP_VERSION: u16 = 20;

/// General purpose flag bit 3: CRC and sizes follow in a data descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// General purpose flag bit 11: the file name is UTF-8.
pub const FLAG_UTF8: u16 = 1 << 11;

/// Header id of the ZIP64 extended information extra field.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// 16-bit count sentinel pointing readers at the ZIP64 end record.
pub const ZIP64_COUNT_SENTINEL: u16 = 0xFFFF;

/// 32-bit size/offset sentinel pointing readers at the ZIP64 fields.
pub const ZIP64_SENTINEL: u32 = 0xFFFF_FFFF;

/// Whether `value` can be written to a 32-bit size/offset field without
/// colliding with the ZIP64 sentinel.
pub fn fits_u32(value: u64) -> bool {
    value < ZIP64_SENTINEL as u64
}

/// Whether `value` can be written to a 16-bit entry count field.
pub fn fits_u16(value: u64) -> bool {
    value < ZIP64_COUNT_SENTINEL as u64
}

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionMethod {
    Stored,
    #[default]
    Deflate,
}

impl CompressionMethod {
    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
        }
    }
}

/// Packed MS-DOS timestamp as stored in ZIP headers.
///
/// The date covers 1980 through 2107 and seconds have a two-second
/// resolution. Timestamps outside the range clamp to the nearest end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00
    pub const MIN: Self = Self {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// 2107-12-31 23:59:58
    pub const MAX: Self = Self {
        time: (23 << 11) | (59 << 5) | 29,
        date: (127 << 9) | (12 << 5) | 31,
    };

    pub fn from_datetime(datetime: PrimitiveDateTime) -> Self {
        let year = datetime.year();
        if year < 1980 {
            return Self::MIN;
        }
        if year > 2107 {
            return Self::MAX;
        }

        let date = ((year - 1980) as u16) << 9
            | (u8::from(datetime.month()) as u16) << 5
            | datetime.day() as u16;
        let time = (datetime.hour() as u16) << 11
            | (datetime.minute() as u16) << 5
            | (datetime.second() as u16) >> 1;

        Self { time, date }
    }

    /// Current local time, or UTC when the local offset is unavailable.
    pub fn now() -> Self {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        Self::from_datetime(PrimitiveDateTime::new(now.date(), now.time()))
    }

    /// The 32-bit header value: date in the high half, time in the low half.
    pub fn to_u32(self) -> u32 {
        (self.date as u32) << 16 | self.time as u32
    }
}

/// Little-endian record builder sized up front to the record's exact length.
struct RecordBuf(Vec<u8>);

impl RecordBuf {
    fn with_capacity(len: usize) -> Self {
        Self(Vec::with_capacity(len))
    }

    fn grow(&mut self, len: usize) -> &mut [u8] {
        let at = self.0.len();
        self.0.resize(at + len, 0);
        &mut self.0[at..]
    }

    fn u16(&mut self, value: u16) -> &mut Self {
        LittleEndian::write_u16(self.grow(2), value);
        self
    }

    fn u32(&mut self, value: u32) -> &mut Self {
        LittleEndian::write_u32(self.grow(4), value);
        self
    }

    fn u64(&mut self, value: u64) -> &mut Self {
        LittleEndian::write_u64(self.grow(8), value);
        self
    }

    fn bytes(&mut self, value: &[u8]) -> &mut Self {
        self.0.extend_from_slice(value);
        self
    }

    fn finish(self) -> Vec<u8> {
        self.0
    }
}

/// Local File Header (LFH) - 30 bytes + name + optional ZIP64 stub
///
/// CRC and sizes are always zero here; the real values follow the entry
/// body in a [`DataDescriptor`].
pub struct LocalFileHeader<'a> {
    pub version_needed: u16,
    pub flags: u16,
    pub method: CompressionMethod,
    pub modified: DosDateTime,
    pub file_name: &'a [u8],
    /// Append an empty ZIP64 extra field, announcing a 64-bit data descriptor.
    pub zip64: bool,
}

impl LocalFileHeader<'_> {
    pub const SIGNATURE: u32 = 0x04034b50;
    pub const SIZE: usize = 30;
    pub const ZIP64_STUB_SIZE: usize = 4;

    fn extra_len(&self) -> usize {
        if self.zip64 { Self::ZIP64_STUB_SIZE } else { 0 }
    }

    pub fn encoded_len(&self) -> usize {
        Self::SIZE + self.file_name.len() + self.extra_len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = RecordBuf::with_capacity(self.encoded_len());
        buf.u32(Self::SIGNATURE)
            .u16(self.version_needed)
            .u16(self.flags)
            .u16(self.method.as_u16())
            .u32(self.modified.to_u32())
            .u32(0) // crc32
            .u32(0) // compressed size
            .u32(0) // uncompressed size
            .u16(self.file_name.len() as u16)
            .u16(self.extra_len() as u16)
            .bytes(self.file_name);

        if self.zip64 {
            buf.u16(ZIP64_EXTRA_ID).u16(0);
        }
        buf.finish()
    }
}

/// Data descriptor - 16 bytes, or 24 bytes with 64-bit sizes
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub zip64: bool,
}

impl DataDescriptor {
    pub const SIGNATURE: u32 = 0x08074b50;
    pub const SIZE: usize = 16;
    pub const ZIP64_SIZE: usize = 24;

    pub fn encoded_len(&self) -> usize {
        if self.zip64 { Self::ZIP64_SIZE } else { Self::SIZE }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = RecordBuf::with_capacity(self.encoded_len());
        buf.u32(Self::SIGNATURE).u32(self.crc32);
        if self.zip64 {
            buf.u64(self.compressed_size).u64(self.uncompressed_size);
        } else {
            buf.u32(self.compressed_size as u32)
                .u32(self.uncompressed_size as u32);
        }
        buf.finish()
    }
}

/// Central Directory File Header (CDFH) - 46 bytes + name + optional 28-byte ZIP64 extra
pub struct CentralDirectoryHeader<'a> {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: CompressionMethod,
    pub modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub lfh_offset: u64,
    pub file_name: &'a [u8],
    /// Write sentinels and carry sizes and offset in a ZIP64 extra field.
    pub zip64: bool,
}

impl CentralDirectoryHeader<'_> {
    pub const SIGNATURE: u32 = 0x02014b50;
    pub const SIZE: usize = 46;
    /// Extra field header (4) + uncompressed, compressed, offset (8 each).
    pub const ZIP64_EXTRA_SIZE: usize = 28;

    fn extra_len(&self) -> usize {
        if self.zip64 { Self::ZIP64_EXTRA_SIZE } else { 0 }
    }

    pub fn encoded_len(&self) -> usize {
        Self::SIZE + self.file_name.len() + self.extra_len()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let (compressed, uncompressed, offset) = if self.zip64 {
            (ZIP64_SENTINEL, ZIP64_SENTINEL, ZIP64_SENTINEL)
        } else {
            (
                self.compressed_size as u32,
                self.uncompressed_size as u32,
                self.lfh_offset as u32,
            )
        };

        let mut buf = RecordBuf::with_capacity(self.encoded_len());
        buf.u32(Self::SIGNATURE)
            .u16(self.version_made_by)
            .u16(self.version_needed)
            .u16(self.flags)
            .u16(self.method.as_u16())
            .u32(self.modified.to_u32())
            .u32(self.crc32)
            .u32(compressed)
            .u32(uncompressed)
            .u16(self.file_name.len() as u16)
            .u16(self.extra_len() as u16)
            .u16(0) // file comment length
            .u16(0) // disk number start
            .u16(0) // internal attributes
            .u32(0) // external attributes
            .u32(offset)
            .bytes(self.file_name);

        if self.zip64 {
            buf.u16(ZIP64_EXTRA_ID)
                .u16((Self::ZIP64_EXTRA_SIZE - 4) as u16)
                .u64(self.uncompressed_size)
                .u64(self.compressed_size)
                .u64(self.lfh_offset);
        }
        buf.finish()
    }
}

/// End of Central Directory (EOCD) - 22 bytes
pub struct EndOfCentralDirectory {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    /// Write sentinels; the real values live in the [`Zip64EOCD`].
    pub zip64: bool,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: u32 = 0x06054b50;
    pub const SIZE: usize = 22;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = RecordBuf::with_capacity(Self::SIZE);
        buf.u32(Self::SIGNATURE)
            .u16(0) // number of this disk
            .u16(0); // disk where central directory starts

        if self.zip64 {
            buf.u16(ZIP64_COUNT_SENTINEL)
                .u16(ZIP64_COUNT_SENTINEL)
                .u32(ZIP64_SENTINEL)
                .u32(ZIP64_SENTINEL);
        } else {
            buf.u16(self.total_entries as u16)
                .u16(self.total_entries as u16)
                .u32(self.cd_size as u32)
                .u32(self.cd_offset as u32);
        }

        buf.u16(0); // comment length
        buf.finish()
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub eocd64_offset: u64,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: u32 = 0x07064b50;
    pub const SIZE: usize = 20;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = RecordBuf::with_capacity(Self::SIZE);
        buf.u32(Self::SIGNATURE)
            .u32(0) // disk with the ZIP64 end record
            .u64(self.eocd64_offset)
            .u32(1); // total number of disks
        buf.finish()
    }
}

/// ZIP64 End of Central Directory - 56 bytes
pub struct Zip64EOCD {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: u32 = 0x06064b50;
    pub const SIZE: usize = 56;

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = RecordBuf::with_capacity(Self::SIZE);
        buf.u32(Self::SIGNATURE)
            // size of the record without the signature and this field
            .u64((Self::SIZE - 12) as u64)
            .u16(ZIP_VERSION)
            .u16(ZIP_VERSION)
            .u32(0) // number of this disk
            .u32(0) // disk where central directory starts
            .u64(self.total_entries)
            .u64(self.total_entries)
            .u64(self.cd_size)
            .u64(self.cd_offset);
        buf.finish()
    }
}

/// A completed archive member, as recorded for the central directory.
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub is_directory: bool,
    pub version_needed: u16,
    pub flags: u16,
}

impl ZipFileEntry {
    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    pub fn modified(&self) -> DosDateTime {
        DosDateTime {
            time: self.last_mod_time,
            date: self.last_mod_date,
        }
    }

    pub fn central_directory_header(&self, zip64: bool) -> CentralDirectoryHeader<'_> {
        CentralDirectoryHeader {
            version_made_by: self.version_needed,
            version_needed: self.version_needed,
            flags: self.flags,
            method: self.compression_method,
            modified: self.modified(),
            crc32: self.crc32,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            lfh_offset: self.lfh_offset,
            file_name: self.file_name.as_bytes(),
            zip64,
        }
    }
}
