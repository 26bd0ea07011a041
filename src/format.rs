//! Code specific to the ZIP file format.
//!
//! We try to keep the nitty gritty here,
//! and higher-level stuff in the [`read`] and [`write`] modules.
//!
//! Most comments quote [`APPNOTE.TXT`].
//!
//! [`read`]: ../read/index.html
//! [`write`]: ../write/index.html
//! [`APPNOTE.TXT`]: https://pkware.cachefly.net/webdocs/APPNOTE/APPNOTE-6.3.6.TXT

use std::borrow::Cow;
use std::convert::TryInto;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use codepage_437::*;
use memchr::memmem;

use crate::arch::usize;
use crate::read::{CompressionMethod, FileMetadata};
use crate::result::*;

// Magic numbers denoting various sections of a ZIP archive

/// End of central directory magic number
const EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 5, 6];
/// Zip64 end of central directory magic number
const ZIP64_EOCDR_MAGIC: [u8; 4] = [b'P', b'K', 6, 6];
/// Zip64 end of central directory locator magic number
const ZIP64_EOCDR_LOCATOR_MAGIC: [u8; 4] = [b'P', b'K', 6, 7];
/// Central directory magic number
const CENTRAL_DIRECTORY_MAGIC: [u8; 4] = [b'P', b'K', 1, 2];
/// Local file header magic number
const LOCAL_FILE_HEADER_MAGIC: [u8; 4] = [b'P', b'K', 3, 4];
/// Data descriptor magic number
const DATA_DESCRIPTOR_MAGIC: [u8; 4] = [b'P', b'K', 7, 8];

/// Bit 0: If set, indicates that the file is encrypted
const ENCRYPTED_FLAG: u16 = 1;
/// Bit 3: crc-32, compressed size and uncompressed size are set to zero
/// in the local header and written to a data descriptor after the data.
const DATA_DESCRIPTOR_FLAG: u16 = 1 << 3;
/// Bit 11: Language encoding flag (EFS). The filename and comment
/// fields MUST be encoded using UTF-8.
pub const UTF8_FLAG: u16 = 1 << 11;

impl CompressionMethod {
    pub(crate) fn from_u16(u: u16) -> Self {
        match u {
            0 => CompressionMethod::None,
            8 => CompressionMethod::Deflate,
            v => CompressionMethod::Unsupported(v),
        }
    }

    pub(crate) fn to_u16(self) -> u16 {
        match self {
            CompressionMethod::None => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Unsupported(v) => v,
        }
    }
}

/// Extracts the "is this text UTF-8?" bit from the 16-bit flags field.
///
/// If false, text is assumed to be CP437.
pub fn is_utf8(flags: u16) -> bool {
    flags & UTF8_FLAG != 0
}

pub fn is_encrypted(flags: u16) -> bool {
    flags & ENCRYPTED_FLAG != 0
}

pub fn has_data_descriptor(flags: u16) -> bool {
    flags & DATA_DESCRIPTOR_FLAG != 0
}

/// Splits `len` bytes off the front of the slice, shrinking it.
fn take<'a>(input: &mut &'a [u8], len: usize) -> ZipResult<&'a [u8]> {
    if input.len() < len {
        return Err(ZipError::InvalidArchive("Record ends unexpectedly"));
    }
    let (taken, rest) = input.split_at(len);
    *input = rest;
    Ok(taken)
}

/// Reads a little-endian u64 from the front of the provided slice, shrinking it.
fn read_u64(input: &mut &[u8]) -> ZipResult<u64> {
    let bytes = take(input, 8)?;
    Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
}

/// Reads a little-endian u32 from the front of the provided slice, shrinking it.
fn read_u32(input: &mut &[u8]) -> ZipResult<u32> {
    let bytes = take(input, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// Reads a little-endian u16 from the front of the provided slice, shrinking it.
fn read_u16(input: &mut &[u8]) -> ZipResult<u16> {
    let bytes = take(input, 2)?;
    Ok(u16::from_le_bytes(bytes.try_into().unwrap()))
}

fn write_u32<W: Write>(w: &mut W, u: u32) -> io::Result<()> {
    w.write_all(&u.to_le_bytes())
}

fn write_u16<W: Write>(w: &mut W, u: u16) -> io::Result<()> {
    w.write_all(&u.to_le_bytes())
}

/// An MS-DOS date and time, as stored in ZIP headers.
///
/// We keep the raw fields so that untouched entries are written back
/// exactly as we found them, even if the date is nonsense.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl DosDateTime {
    /// Converts to a calendar date and time,
    /// or `None` if the fields don't describe a real one.
    pub fn to_naive(self) -> Option<NaiveDateTime> {
        let seconds = (0b0000_0000_0001_1111 & self.time) as u32 * 2; // MSDOS uses 2-second precision
        let minutes = (0b0000_0111_1110_0000 & self.time) as u32 >> 5;
        let hours = (0b1111_1000_0000_0000 & self.time) as u32 >> 11;

        let days = (0b0000_0000_0001_1111 & self.date) as u32;
        let months = (0b0000_0001_1110_0000 & self.date) as u32 >> 5;
        // MSDOS uses years since 1980; Always interpreted as a positive value
        let years = ((0b1111_1110_0000_0000 & self.date) >> 9) as i32 + 1980;

        NaiveDate::from_ymd_opt(years, months, days)?.and_hms_opt(hours, minutes, seconds)
    }

    /// Converts a calendar date and time, clamping to the years MS-DOS can store
    /// (1980 through 2107) and rounding seconds down to an even number.
    pub fn from_naive(when: NaiveDateTime) -> Self {
        if when.year() < 1980 {
            // 1980-01-01 00:00:00
            return Self {
                time: 0,
                date: (1 << 5) | 1,
            };
        }
        if when.year() > 2107 {
            // 2107-12-31 23:59:58
            return Self {
                time: (23 << 11) | (59 << 5) | 29,
                date: (127 << 9) | (12 << 5) | 31,
            };
        }
        let time = (when.hour() << 11) | (when.minute() << 5) | (when.second() / 2);
        let date = (((when.year() - 1980) as u32) << 9) | (when.month() << 5) | when.day();
        Self {
            time: time as u16,
            date: date as u16,
        }
    }
}

/// Decodes a file name, per the UTF-8 flag.
fn decode_path(raw: &[u8], flags: u16) -> ZipResult<Cow<'_, Utf8Path>> {
    if is_utf8(flags) {
        let utf8 = std::str::from_utf8(raw)?;
        Ok(Cow::Borrowed(Utf8Path::new(utf8)))
    } else {
        let str_cow: Cow<str> = Cow::borrow_from_cp437(raw, &CP437_CONTROL);
        // No Cow<str> -> Cow<Utf8Path>, alas.
        Ok(match str_cow {
            Cow::Borrowed(s) => Cow::Borrowed(Utf8Path::new(s)),
            Cow::Owned(s) => Cow::Owned(Utf8PathBuf::from(s)),
        })
    }
}

/// Encodes a file name for writing.
///
/// Returns the bytes to write and the flags to write alongside them.
/// If the name was CP437 and can't be anymore, we switch it to UTF-8.
pub fn encode_path(path: &str, flags: u16) -> (Cow<'_, [u8]>, u16) {
    if is_utf8(flags) || path.is_ascii() {
        return (Cow::Borrowed(path.as_bytes()), flags);
    }
    match path.to_owned().into_cp437(&CP437_CONTROL) {
        Ok(cp437) => (Cow::Owned(cp437), flags),
        Err(_) => (Cow::Borrowed(path.as_bytes()), flags | UTF8_FLAG),
    }
}

/// Data from the End of central directory record
///
/// Found at the back of the ZIP archive and provides offsets for finding
/// its central directory, along with lots of stuff that stopped being relevant
/// when we stopped breaking ZIP archives onto multiple floppies.
#[derive(Debug)]
pub struct EndOfCentralDirectory<'a> {
    pub disk_number: u16,
    pub disk_with_central_directory: u16,
    pub entries_on_this_disk: u16,
    pub entries: u16,
    pub central_directory_size: u32,
    pub central_directory_offset: u32,
    pub file_comment: &'a [u8],
}

impl<'a> EndOfCentralDirectory<'a> {
    pub fn parse(mut eocdr: &'a [u8]) -> ZipResult<Self> {
        // 4.3.16  End of central directory record:
        //
        // end of central dir signature    4 bytes  (0x06054b50)
        // number of this disk             2 bytes
        // number of the disk with the
        // start of the central directory  2 bytes
        // total number of entries in
        // the central dir on this disk    2 bytes
        // total number of entries in
        // the central dir                 2 bytes
        // size of the central directory   4 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        4 bytes
        // zipfile comment length          2 bytes
        if take(&mut eocdr, 4)? != EOCDR_MAGIC {
            return Err(ZipError::InvalidArchive(
                "Invalid End Of Central Directory Record",
            ));
        }
        let disk_number = read_u16(&mut eocdr)?;
        let disk_with_central_directory = read_u16(&mut eocdr)?;
        let entries_on_this_disk = read_u16(&mut eocdr)?;
        let entries = read_u16(&mut eocdr)?;
        let central_directory_size = read_u32(&mut eocdr)?;
        let central_directory_offset = read_u32(&mut eocdr)?;
        let comment_length = usize(read_u16(&mut eocdr)?)?;
        let file_comment = take(&mut eocdr, comment_length)?;

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
            file_comment,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&EOCDR_MAGIC)?;
        write_u16(w, self.disk_number)?;
        write_u16(w, self.disk_with_central_directory)?;
        write_u16(w, self.entries_on_this_disk)?;
        write_u16(w, self.entries)?;
        write_u32(w, self.central_directory_size)?;
        write_u32(w, self.central_directory_offset)?;
        write_u16(w, self.file_comment.len() as u16)?;
        w.write_all(self.file_comment)
    }
}

/// Searches backward through `mapping` to find the
/// End of central directory record.
///
/// It should be right at the end of the file,
/// but its variable size means we can't jump to a known offset.
pub fn find_eocdr(mapping: &[u8]) -> ZipResult<usize> {
    memmem::rfind(mapping, &EOCDR_MAGIC).ok_or(ZipError::InvalidArchive(
        "Couldn't find End Of Central Directory Record",
    ))
}

/// Data from the Zip64 end of central directory locator
///
/// This should immediately precede the End of central directory record
/// on Zip64 files and tell us where to find the Zip64 end of central directory record.
#[derive(Debug)]
pub struct Zip64EndOfCentralDirectoryLocator {
    pub disk_with_central_directory: u32,
    pub zip64_eocdr_offset: u64,
    pub disks: u32,
}

impl Zip64EndOfCentralDirectoryLocator {
    pub fn parse(mut mapping: &[u8]) -> Option<Self> {
        // 4.3.15 Zip64 end of central directory locator
        //
        // zip64 end of central dir locator
        // signature                       4 bytes  (0x07064b50)
        // number of the disk with the
        // start of the zip64 end of
        // central directory               4 bytes
        // relative offset of the zip64
        // end of central directory record 8 bytes
        // total number of disks           4 bytes
        if take(&mut mapping, 4).ok()? != ZIP64_EOCDR_LOCATOR_MAGIC {
            return None;
        }
        let disk_with_central_directory = read_u32(&mut mapping).ok()?;
        let zip64_eocdr_offset = read_u64(&mut mapping).ok()?;
        let disks = read_u32(&mut mapping).ok()?;

        Some(Self {
            disk_with_central_directory,
            zip64_eocdr_offset,
            disks,
        })
    }

    pub fn size_in_file() -> usize {
        20
    }
}

/// Data from the Zip64 end of central directory record
#[derive(Debug)]
pub struct Zip64EndOfCentralDirectory {
    pub disk_number: u32,
    pub disk_with_central_directory: u32,
    pub entries_on_this_disk: u64,
    pub entries: u64,
    pub central_directory_size: u64,
    pub central_directory_offset: u64,
}

impl Zip64EndOfCentralDirectory {
    pub fn parse(mut eocdr: &[u8]) -> ZipResult<Self> {
        // 4.3.14  Zip64 end of central directory record
        //
        // zip64 end of central dir
        // signature                       4 bytes  (0x06064b50)
        // size of zip64 end of central
        // directory record                8 bytes
        // version made by                 2 bytes
        // version needed to extract       2 bytes
        // number of this disk             4 bytes
        // number of the disk with the
        // start of the central directory  4 bytes
        // total number of entries in the
        // central directory on this disk  8 bytes
        // total number of entries in the
        // central directory               8 bytes
        // size of the central directory   8 bytes
        // offset of start of central
        // directory with respect to
        // the starting disk number        8 bytes
        // zip64 extensible data sector    (variable size)
        if take(&mut eocdr, 4)? != ZIP64_EOCDR_MAGIC {
            return Err(ZipError::InvalidArchive(
                "Invalid Zip64 End Of Central Directory Record",
            ));
        }
        let eocdr_size = usize(read_u64(&mut eocdr)?)?;
        let _source_version = read_u16(&mut eocdr)?;
        let _minimum_extract_version = read_u16(&mut eocdr)?;
        let disk_number = read_u32(&mut eocdr)?;
        let disk_with_central_directory = read_u32(&mut eocdr)?;
        let entries_on_this_disk = read_u64(&mut eocdr)?;
        let entries = read_u64(&mut eocdr)?;
        let central_directory_size = read_u64(&mut eocdr)?;
        let central_directory_offset = read_u64(&mut eocdr)?;

        // 4.3.14.1 The value stored into the "size of zip64 end of central
        // directory record" SHOULD be the size of the remaining
        // record and SHOULD NOT include the leading 12 bytes.
        let extensible_data_len = eocdr_size
            .checked_add(12)
            .and_then(|record_size| record_size.checked_sub(Self::fixed_size_in_file()));
        if extensible_data_len != Some(eocdr.len()) {
            return Err(ZipError::InvalidArchive(
                "Invalid extensible data length in Zip64 End Of Central Directory Record",
            ));
        }

        Ok(Self {
            disk_number,
            disk_with_central_directory,
            entries_on_this_disk,
            entries,
            central_directory_size,
            central_directory_offset,
        })
    }

    fn fixed_size_in_file() -> usize {
        56
    }
}

/// Finds the Zip64 end of central directory record in the given slice.
///
/// The slice should start at the Zip64 EOCDR's nominal location,
/// but we might have to do some searching since ZIP archives can have
/// arbitrary junk up front.
pub fn find_zip64_eocdr(mapping: &[u8]) -> ZipResult<usize> {
    memmem::find(mapping, &ZIP64_EOCDR_MAGIC).ok_or(ZipError::InvalidArchive(
        "Couldn't find zip64 End Of Central Directory Record",
    ))
}

/// Data from a central directory entry
///
/// Each of these records contains information about a file or folder
/// stored in the ZIP archive.
#[derive(Debug)]
pub struct CentralDirectoryEntry<'a> {
    pub source_version: u16,
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub disk_number: u16,
    pub internal_file_attributes: u16,
    pub external_file_attributes: u32,
    pub header_offset: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
    pub file_comment: &'a [u8],
}

impl<'a> CentralDirectoryEntry<'a> {
    pub fn parse_and_consume(entry: &mut &'a [u8]) -> ZipResult<Self> {
        // 4.3.12  Central directory structure:
        //
        //   central file header signature   4 bytes  (0x02014b50)
        //   version made by                 2 bytes
        //   version needed to extract       2 bytes
        //   general purpose bit flag        2 bytes
        //   compression method              2 bytes
        //   last mod file time              2 bytes
        //   last mod file date              2 bytes
        //   crc-32                          4 bytes
        //   compressed size                 4 bytes
        //   uncompressed size               4 bytes
        //   file name length                2 bytes
        //   extra field length              2 bytes
        //   file comment length             2 bytes
        //   disk number start               2 bytes
        //   internal file attributes        2 bytes
        //   external file attributes        4 bytes
        //   relative offset of local header 4 bytes
        //
        //   file name (variable size)
        //   extra field (variable size)
        //   file comment (variable size)
        if take(entry, 4)? != CENTRAL_DIRECTORY_MAGIC {
            return Err(ZipError::InvalidArchive("Invalid central directory entry"));
        }
        let source_version = read_u16(entry)?;
        let minimum_extract_version = read_u16(entry)?;
        let flags = read_u16(entry)?;
        let compression_method = read_u16(entry)?;
        let time = read_u16(entry)?;
        let date = read_u16(entry)?;
        let crc32 = read_u32(entry)?;
        let compressed_size = read_u32(entry)?;
        let uncompressed_size = read_u32(entry)?;
        let path_length = usize(read_u16(entry)?)?;
        let extra_field_length = usize(read_u16(entry)?)?;
        let file_comment_length = usize(read_u16(entry)?)?;
        let disk_number = read_u16(entry)?;
        let internal_file_attributes = read_u16(entry)?;
        let external_file_attributes = read_u32(entry)?;
        let header_offset = read_u32(entry)?;
        let path = take(entry, path_length)?;
        let extra_field = take(entry, extra_field_length)?;
        let file_comment = take(entry, file_comment_length)?;

        Ok(Self {
            source_version,
            minimum_extract_version,
            flags,
            compression_method,
            last_modified: DosDateTime { time, date },
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number,
            internal_file_attributes,
            external_file_attributes,
            header_offset,
            path,
            extra_field,
            file_comment,
        })
    }

    /// Writes the record. Lengths were checked by the writer.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&CENTRAL_DIRECTORY_MAGIC)?;
        write_u16(w, self.source_version)?;
        write_u16(w, self.minimum_extract_version)?;
        write_u16(w, self.flags)?;
        write_u16(w, self.compression_method)?;
        write_u16(w, self.last_modified.time)?;
        write_u16(w, self.last_modified.date)?;
        write_u32(w, self.crc32)?;
        write_u32(w, self.compressed_size)?;
        write_u32(w, self.uncompressed_size)?;
        write_u16(w, self.path.len() as u16)?;
        write_u16(w, self.extra_field.len() as u16)?;
        write_u16(w, self.file_comment.len() as u16)?;
        write_u16(w, self.disk_number)?;
        write_u16(w, self.internal_file_attributes)?;
        write_u32(w, self.external_file_attributes)?;
        write_u32(w, self.header_offset)?;
        w.write_all(self.path)?;
        w.write_all(self.extra_field)?;
        w.write_all(self.file_comment)
    }
}

impl<'a> FileMetadata<'a> {
    /// Extracts `FileMetadata` from a central directory entry
    pub(crate) fn from_cde(cde: &CentralDirectoryEntry<'a>) -> ZipResult<Self> {
        let path = decode_path(cde.path, cde.flags)?;

        if cde.disk_number != 0 {
            return Err(ZipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: file {} claims to be on disk {}",
                path, cde.disk_number,
            )));
        }

        let mut metadata = Self {
            size: usize(cde.uncompressed_size)?,
            compressed_size: usize(cde.compressed_size)?,
            compression_method: CompressionMethod::from_u16(cde.compression_method),
            crc32: cde.crc32,
            encrypted: is_encrypted(cde.flags),
            path,
            last_modified: cde.last_modified,
            source_version: cde.source_version,
            minimum_extract_version: cde.minimum_extract_version,
            flags: cde.flags,
            extra_field: cde.extra_field,
            internal_attributes: cde.internal_file_attributes,
            external_attributes: cde.external_file_attributes,
            comment: cde.file_comment,
            header_offset: usize(cde.header_offset)?,
        };

        parse_extra_field(&mut metadata, cde.extra_field)?;

        Ok(metadata)
    }

    /// Extract metadata from a local file header.
    ///
    /// The local header lacks plenty of what the central directory has
    /// (attributes, comment, offset...), so those come from `central`.
    /// Its extra field is allowed to differ, so we take the central one too.
    pub(crate) fn from_local_header(
        local: &LocalFileHeader<'a>,
        central: &FileMetadata<'a>,
    ) -> ZipResult<Self> {
        let path = decode_path(local.path, local.flags)?;

        // With a data descriptor, the local header's sizes and CRC are zeroes.
        let (crc32, compressed_size, uncompressed_size) = if has_data_descriptor(local.flags) {
            (central.crc32, central.compressed_size, central.size)
        } else {
            (
                local.crc32,
                usize(local.compressed_size)?,
                usize(local.uncompressed_size)?,
            )
        };

        let mut metadata = Self {
            size: uncompressed_size,
            compressed_size,
            compression_method: CompressionMethod::from_u16(local.compression_method),
            crc32,
            encrypted: is_encrypted(local.flags),
            path,
            last_modified: local.last_modified,
            source_version: central.source_version,
            minimum_extract_version: local.minimum_extract_version,
            flags: local.flags,
            extra_field: central.extra_field,
            internal_attributes: central.internal_attributes,
            external_attributes: central.external_attributes,
            comment: central.comment,
            header_offset: central.header_offset,
        };

        parse_extra_field(&mut metadata, local.extra_field)?;

        Ok(metadata)
    }
}

/// Parses the "extra fields" found in central directory entries
/// and local file headers.
///
/// Currently we just look for Zip64 info (64-bit values for files > 2^32 in size)
fn parse_extra_field(metadata: &mut FileMetadata, mut extra_field: &[u8]) -> ZipResult<()> {
    // 4.5.1 In order to allow different programs and different types
    // of information to be stored in the 'extra' field in .ZIP
    // files, the following structure MUST be used for all
    // programs storing data in this field:
    //
    //     header1+data1 + header2+data2 . . .
    //
    // Each header MUST consist of:
    //
    //     Header ID - 2 bytes
    //     Data Size - 2 bytes
    while !extra_field.is_empty() {
        let kind = read_u16(&mut extra_field)?;
        let field_len = usize(read_u16(&mut extra_field)?)?;
        let mut data = take(&mut extra_field, field_len)
            .map_err(|_| ZipError::InvalidArchive("Extra field overruns its record"))?;

        // Zip64 extended information extra field
        if kind == 0x0001 {
            if metadata.size == u32::MAX as usize {
                metadata.size = usize(read_u64(&mut data)?)?;
            }
            if metadata.compressed_size == u32::MAX as usize {
                metadata.compressed_size = usize(read_u64(&mut data)?)?;
            }
            if metadata.header_offset == u32::MAX as usize {
                metadata.header_offset = usize(read_u64(&mut data)?)?;
            }
        }
    }
    Ok(())
}

/// Data from a local file header
///
/// Each file's actual contents is preceded by this header.
#[derive(Debug)]
pub struct LocalFileHeader<'a> {
    pub minimum_extract_version: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub last_modified: DosDateTime,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub path: &'a [u8],
    pub extra_field: &'a [u8],
}

impl<'a> LocalFileHeader<'a> {
    pub fn parse_and_consume(header: &mut &'a [u8]) -> ZipResult<Self> {
        // 4.3.7  Local file header:
        //
        // local file header signature     4 bytes  (0x04034b50)
        // version needed to extract       2 bytes
        // general purpose bit flag        2 bytes
        // compression method              2 bytes
        // last mod file time              2 bytes
        // last mod file date              2 bytes
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        // file name length                2 bytes
        // extra field length              2 bytes
        //
        // file name (variable size)
        // extra field (variable size)
        if take(header, 4)? != LOCAL_FILE_HEADER_MAGIC {
            return Err(ZipError::InvalidArchive("Invalid local file header"));
        }
        let minimum_extract_version = read_u16(header)?;
        let flags = read_u16(header)?;
        let compression_method = read_u16(header)?;
        let time = read_u16(header)?;
        let date = read_u16(header)?;
        let crc32 = read_u32(header)?;
        let compressed_size = read_u32(header)?;
        let uncompressed_size = read_u32(header)?;
        let path_length = usize(read_u16(header)?)?;
        let extra_field_length = usize(read_u16(header)?)?;
        let path = take(header, path_length)?;
        let extra_field = take(header, extra_field_length)?;

        Ok(Self {
            minimum_extract_version,
            flags,
            compression_method,
            last_modified: DosDateTime { time, date },
            crc32,
            compressed_size,
            uncompressed_size,
            path,
            extra_field,
        })
    }

    /// Writes the header.
    ///
    /// If the flags call for a data descriptor,
    /// the CRC and sizes are zeroed here and belong in one after the data.
    pub fn write<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let (crc32, compressed_size, uncompressed_size) = if has_data_descriptor(self.flags) {
            (0, 0, 0)
        } else {
            (self.crc32, self.compressed_size, self.uncompressed_size)
        };
        w.write_all(&LOCAL_FILE_HEADER_MAGIC)?;
        write_u16(w, self.minimum_extract_version)?;
        write_u16(w, self.flags)?;
        write_u16(w, self.compression_method)?;
        write_u16(w, self.last_modified.time)?;
        write_u16(w, self.last_modified.date)?;
        write_u32(w, crc32)?;
        write_u32(w, compressed_size)?;
        write_u32(w, uncompressed_size)?;
        write_u16(w, self.path.len() as u16)?;
        write_u16(w, self.extra_field.len() as u16)?;
        w.write_all(self.path)?;
        w.write_all(self.extra_field)
    }

    /// Writes the data descriptor that follows the file data,
    /// if the flags call for one. Returns the number of bytes written.
    pub fn write_data_descriptor<W: Write>(&self, w: &mut W) -> io::Result<usize> {
        // 4.3.9  Data descriptor:
        //
        // [signature]                     4 bytes  (0x08074b50)
        // crc-32                          4 bytes
        // compressed size                 4 bytes
        // uncompressed size               4 bytes
        if !has_data_descriptor(self.flags) {
            return Ok(0);
        }
        w.write_all(&DATA_DESCRIPTOR_MAGIC)?;
        write_u32(w, self.crc32)?;
        write_u32(w, self.compressed_size)?;
        write_u32(w, self.uncompressed_size)?;
        Ok(16)
    }

    pub fn size_in_file(&self) -> usize {
        30 + self.path.len() + self.extra_field.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn dos_time_round_trips() {
        let when = NaiveDate::from_ymd_opt(2020, 2, 29)
            .unwrap()
            .and_hms_opt(13, 37, 42)
            .unwrap();
        let dos = DosDateTime::from_naive(when);
        assert_eq!(dos.to_naive(), Some(when));
    }

    #[test]
    fn dos_time_rounds_odd_seconds_down() {
        let when = NaiveDate::from_ymd_opt(1999, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        let back = DosDateTime::from_naive(when).to_naive().unwrap();
        assert_eq!(back.second(), 58);
    }

    #[test]
    fn dos_time_clamps() {
        let early = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let clamped = DosDateTime::from_naive(early).to_naive().unwrap();
        assert_eq!(clamped.year(), 1980);
        assert_eq!((clamped.month(), clamped.day()), (1, 1));
    }

    #[test]
    fn zeroed_dos_time_is_not_a_date() {
        assert_eq!(DosDateTime::default().to_naive(), None);
    }

    #[test]
    fn cp437_names() {
        // 0x81 is ü in CP437
        let decoded = decode_path(b"gr\x81n.txt", 0).unwrap();
        assert_eq!(decoded.as_str(), "grün.txt");

        let (encoded, flags) = encode_path("grün.txt", 0);
        assert_eq!(&*encoded, b"gr\x81n.txt");
        assert_eq!(flags, 0);

        // No snowmen in CP437.
        let (encoded, flags) = encode_path("☃.txt", 0);
        assert_eq!(&*encoded, "☃.txt".as_bytes());
        assert!(is_utf8(flags));
    }

    #[test]
    fn local_header_round_trip() {
        let header = LocalFileHeader {
            minimum_extract_version: 20,
            flags: 0,
            compression_method: 8,
            last_modified: DosDateTime {
                time: 0x6b4d,
                date: 0x5152,
            },
            crc32: 0xdeadbeef,
            compressed_size: 3,
            uncompressed_size: 5,
            path: b"a/b.txt",
            extra_field: b"",
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(buf.len(), header.size_in_file());

        let mut slice = &buf[..];
        let parsed = LocalFileHeader::parse_and_consume(&mut slice).unwrap();
        assert!(slice.is_empty());
        assert_eq!(parsed.crc32, 0xdeadbeef);
        assert_eq!(parsed.path, b"a/b.txt");
        assert_eq!(parsed.last_modified, header.last_modified);
    }

    #[test]
    fn data_descriptor_zeroes_local_fields() {
        let header = LocalFileHeader {
            minimum_extract_version: 20,
            flags: DATA_DESCRIPTOR_FLAG,
            compression_method: 0,
            last_modified: DosDateTime::default(),
            crc32: 1,
            compressed_size: 2,
            uncompressed_size: 2,
            path: b"x",
            extra_field: b"",
        };
        let mut buf = Vec::new();
        header.write(&mut buf).unwrap();
        assert_eq!(header.write_data_descriptor(&mut buf).unwrap(), 16);

        let mut slice = &buf[..];
        let parsed = LocalFileHeader::parse_and_consume(&mut slice).unwrap();
        assert_eq!(parsed.crc32, 0);
        assert_eq!(parsed.compressed_size, 0);
        assert_eq!(&slice[..4], &DATA_DESCRIPTOR_MAGIC);
    }

    #[test]
    fn zip64_record_size_cant_overflow() {
        let mut record = ZIP64_EOCDR_MAGIC.to_vec();
        record.extend_from_slice(&u64::MAX.to_le_bytes());
        record.resize(Zip64EndOfCentralDirectory::fixed_size_in_file(), 0);
        assert!(matches!(
            Zip64EndOfCentralDirectory::parse(&record),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    #[test]
    fn truncated_records_are_errors() {
        let mut short: &[u8] = &CENTRAL_DIRECTORY_MAGIC;
        assert!(matches!(
            CentralDirectoryEntry::parse_and_consume(&mut short),
            Err(ZipError::InvalidArchive(_))
        ));
    }
}
