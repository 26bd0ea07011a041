//! Tools for reading a ZIP archive.
//!
//! To start reading an archive, first create a [`ZipArchive`] from the file.
//! Most callers will want the whole thing in memory as an [`Archive`] instead.
//!
//! [`ZipArchive`]: struct.ZipArchive.html
//! [`Archive`]: ../archive/struct.Archive.html

use std::borrow::Cow;
use std::io::{self, Read};

use camino::Utf8Path;
use flate2::read::DeflateDecoder;
use log::*;

use crate::arch::usize;
use crate::format::{self, DosDateTime};
use crate::result::*;

/// The compression method used to store a file
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CompressionMethod {
    /// The file is uncompressed
    None,
    /// The file is [DEFLATE](https://en.wikipedia.org/wiki/DEFLATE)d.
    /// This is the most common format used by ZIP archives.
    Deflate,
    /// The file is compressed with a yet-unsupported format.
    /// (The u16 indicates the internal format code.)
    Unsupported(u16),
}

/// Metadata for a file or directory in the archive,
/// retrieved from its central directory
#[derive(Debug, PartialEq, Eq)]
pub struct FileMetadata<'a> {
    /// Uncompressed size of the file in bytes
    pub size: usize,

    /// Compressed size of the file in bytes
    pub compressed_size: usize,

    /// Compression algorithm used to store the file
    pub compression_method: CompressionMethod,

    /// The CRC-32 of the decompressed file
    pub crc32: u32,

    /// True if the file is encrypted (decryption is unsupported)
    pub encrypted: bool,

    /// The provided path of the file.
    pub path: Cow<'a, Utf8Path>,

    /// When the file was last modified, as MS-DOS stores it
    pub last_modified: DosDateTime,

    /// "Version made by": the upper byte is the host OS.
    pub source_version: u16,

    pub minimum_extract_version: u16,

    /// General purpose bit flags
    pub flags: u16,

    /// The central directory's extra field
    pub extra_field: &'a [u8],

    pub internal_attributes: u16,

    /// Host-specific attributes, e.g., Unix mode bits in the upper half.
    pub external_attributes: u32,

    pub comment: &'a [u8],

    /// The offset to the local file header in the archive
    pub(crate) header_offset: usize,
}

impl FileMetadata<'_> {
    /// Returns true if the given entry is a directory
    pub fn is_dir(&self) -> bool {
        // Path::ends_with() doesn't consider separators,
        // so we need a different approach.
        self.size == 0 && self.path.as_str().ends_with('/')
    }
}

/// A ZIP archive to be read
pub struct ZipArchive<'a> {
    /// The contents of the ZIP archive, as a byte slice.
    mapping: &'a [u8],
    /// A list of entries from the ZIP's central directory
    entries: Vec<FileMetadata<'a>>,
}

impl<'a> ZipArchive<'a> {
    /// Reads a ZIP archive from a byte slice.
    ///
    /// ```no_run
    /// # use std::fs;
    /// # use rezip::*;
    /// let bytes = fs::read("foo.zip")?;
    /// let archive = ZipArchive::new(&bytes)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(mapping: &'a [u8]) -> ZipResult<Self> {
        let (new_archive, archive_offset) = Self::with_prepended_data(mapping)?;
        if archive_offset != 0 {
            return Err(ZipError::PrependedWithUnknownBytes(archive_offset));
        }
        Ok(new_archive)
    }

    /// Like `ZipArchive::new()`, but allows arbitrary data to prepend the archive.
    /// Returns the ZipArchive and the number of bytes prepended to the archive.
    ///
    /// Since a ZIP archive's metadata sits at the back of the file,
    /// many formats consist of ZIP archives prepended with some other data.
    /// For example, a self-extracting archive is one with an executable in the front.
    pub fn with_prepended_data(mut mapping: &'a [u8]) -> ZipResult<(Self, usize)> {
        let eocdr_posit = format::find_eocdr(mapping)?;
        let eocdr = format::EndOfCentralDirectory::parse(&mapping[eocdr_posit..])?;
        trace!("{:?}", eocdr);

        if eocdr.disk_number != eocdr.disk_with_central_directory {
            return Err(ZipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: disk ({}) != disk with central directory ({})",
                eocdr.disk_number, eocdr.disk_with_central_directory
            )));
        }
        if eocdr.entries != eocdr.entries_on_this_disk {
            return Err(ZipError::UnsupportedArchive(format!(
                "No support for multi-disk archives: entries ({}) != entries this disk ({})",
                eocdr.entries, eocdr.entries_on_this_disk
            )));
        }

        let nominal_central_directory_offset: usize;
        let central_directory_size: usize;
        let entry_count: u64;

        // Zip files can be prepended by arbitrary junk,
        // so all the given positions might be off.
        // Calculate the offset.
        let archive_offset;

        let zip64_locator = eocdr_posit
            .checked_sub(format::Zip64EndOfCentralDirectoryLocator::size_in_file())
            .and_then(|posit| {
                format::Zip64EndOfCentralDirectoryLocator::parse(&mapping[posit..eocdr_posit])
                    .map(|locator| (posit, locator))
            });

        if let Some((locator_posit, zip64_eocdr_locator)) = zip64_locator {
            trace!("{:?}", zip64_eocdr_locator);

            if eocdr.disk_number as u32 != zip64_eocdr_locator.disk_with_central_directory {
                return Err(ZipError::UnsupportedArchive(format!(
                    "No support for multi-disk archives: disk ({}) != disk with zip64 central directory ({})",
                    eocdr.disk_number, zip64_eocdr_locator.disk_with_central_directory
                )));
            }
            if zip64_eocdr_locator.disks != 1 {
                return Err(ZipError::UnsupportedArchive(format!(
                    "No support for multi-disk archives: Zip64 EOCDR locator reports {} disks",
                    zip64_eocdr_locator.disks
                )));
            }

            // Search for the zip64 EOCDR, from its nominal starting position
            // to the end of where it could be.
            let zip64_eocdr_search_start = usize(zip64_eocdr_locator.zip64_eocdr_offset)?;
            let zip64_eocdr_search_space = mapping
                .get(zip64_eocdr_search_start..locator_posit)
                .ok_or(ZipError::InvalidArchive(
                    "Invalid Zip64 End Of Central Directory Record offset",
                ))?;

            let zip64_eocdr_posit = format::find_zip64_eocdr(zip64_eocdr_search_space)?;
            // Since we're searching starting at the provided offset,
            // the returned position is the archive offset.
            archive_offset = zip64_eocdr_posit;
            let zip64_eocdr = format::Zip64EndOfCentralDirectory::parse(
                &zip64_eocdr_search_space[zip64_eocdr_posit..],
            )?;
            trace!("{:?}", zip64_eocdr);

            if zip64_eocdr.disk_number != zip64_eocdr.disk_with_central_directory
                || zip64_eocdr.entries != zip64_eocdr.entries_on_this_disk
            {
                return Err(ZipError::UnsupportedArchive(String::from(
                    "No support for multi-disk archives",
                )));
            }

            nominal_central_directory_offset = usize(zip64_eocdr.central_directory_offset)?;
            central_directory_size = usize(zip64_eocdr.central_directory_size)?;
            entry_count = zip64_eocdr.entries;
        } else {
            // The offset is the actual position versus the stored one.
            central_directory_size = usize(eocdr.central_directory_size)?;
            let actual_cdr_posit = eocdr_posit.checked_sub(central_directory_size);
            let nominal_offset = usize(eocdr.central_directory_offset)?;
            archive_offset = actual_cdr_posit
                .and_then(|off| off.checked_sub(nominal_offset))
                .ok_or(ZipError::InvalidArchive(
                    "Invalid central directory size or offset",
                ))?;
            nominal_central_directory_offset = nominal_offset;
            entry_count = eocdr.entries as u64;
        }

        mapping = &mapping[archive_offset..];
        trace!(
            "{} entries at nominal offset {}",
            entry_count,
            nominal_central_directory_offset
        );

        let mut central_directory = nominal_central_directory_offset
            .checked_add(central_directory_size)
            .and_then(|end| mapping.get(nominal_central_directory_offset..end))
            .ok_or(ZipError::InvalidArchive(
                "Central directory runs past the end of the archive",
            ))?;

        let mut entries = Vec::with_capacity(usize(entry_count)?);

        for _ in 0..entry_count {
            let dir_entry = format::CentralDirectoryEntry::parse_and_consume(&mut central_directory)?;
            trace!("{:?}", dir_entry);

            let file_metadata = FileMetadata::from_cde(&dir_entry)?;
            debug!("{:?}", file_metadata);
            entries.push(file_metadata);
        }

        Ok((ZipArchive { mapping, entries }, archive_offset))
    }

    /// Returns the entries found in the ZIP archive's central directory,
    /// in the order they were stored.
    ///
    /// No effort is made to deduplicate or otherwise validate these entries.
    pub fn entries(&self) -> &[FileMetadata<'a>] {
        &self.entries
    }

    /// Reads the given file from the ZIP archive.
    pub fn read(&self, metadata: &FileMetadata<'a>) -> ZipResult<Box<dyn io::Read + Send + 'a>> {
        self.open(metadata).map(|(reader, _)| reader)
    }

    /// Reads the whole file into memory, checking its CRC-32.
    ///
    /// Also returns the local file header's extra field,
    /// which needn't match the central directory's.
    pub(crate) fn read_to_vec(
        &self,
        metadata: &FileMetadata<'a>,
    ) -> ZipResult<(Vec<u8>, &'a [u8])> {
        let (mut reader, local_extra) = self.open(metadata)?;
        let mut contents = Vec::with_capacity(metadata.size);
        reader.read_to_end(&mut contents)?;

        if contents.len() != metadata.size {
            return Err(ZipError::InvalidArchive(
                "File size doesn't match the central directory",
            ));
        }
        if crc32fast::hash(&contents) != metadata.crc32 {
            return Err(ZipError::InvalidArchive("Invalid checksum"));
        }
        Ok((contents, local_extra))
    }

    fn open(
        &self,
        metadata: &FileMetadata<'a>,
    ) -> ZipResult<(Box<dyn io::Read + Send + 'a>, &'a [u8])> {
        let mut file_slice = self
            .mapping
            .get(metadata.header_offset..)
            .ok_or(ZipError::InvalidArchive(
                "Local file header offset is past the end of the archive",
            ))?;
        let local_header = format::LocalFileHeader::parse_and_consume(&mut file_slice)?;
        trace!("{:?}", local_header);
        let local_metadata = FileMetadata::from_local_header(&local_header, metadata)?;
        debug!("Reading {:?}", local_metadata);
        if cfg!(feature = "check-local-metadata") && *metadata != local_metadata {
            return Err(ZipError::InvalidArchive(
                "Central directory entry doesn't match local file header",
            ));
        }

        if metadata.encrypted {
            return Err(ZipError::UnsupportedArchive(format!(
                "Can't read encrypted file {}",
                metadata.path
            )));
        }

        let compressed = file_slice
            .get(..metadata.compressed_size)
            .ok_or(ZipError::InvalidArchive("File data runs past the archive"))?;

        let reader = make_reader(metadata.compression_method, compressed)?;
        Ok((reader, local_header.extra_field))
    }
}

/// Returns a boxed read trait for a compressed file,
/// given its compression method.
fn make_reader<'a>(
    compression_method: CompressionMethod,
    compressed: &'a [u8],
) -> ZipResult<Box<dyn io::Read + Send + 'a>> {
    match compression_method {
        CompressionMethod::None => Ok(Box::new(compressed)),
        CompressionMethod::Deflate => Ok(Box::new(DeflateDecoder::new(compressed))),
        CompressionMethod::Unsupported(method) => Err(ZipError::UnsupportedArchive(format!(
            "Compression method {method} not supported",
        ))),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::{Archive, Entry};
    use crate::write::to_vec;

    const EOCDR_SIZE: usize = 22;

    fn one_file() -> Vec<u8> {
        to_vec([&Entry::new("a.txt", "Hello, world!\n".repeat(4))]).unwrap()
    }

    /// Where the (only) central directory entry starts,
    /// per the End of central directory record.
    fn central_directory_offset(zip: &[u8]) -> usize {
        let eocdr = zip.len() - EOCDR_SIZE;
        u32::from_le_bytes(zip[eocdr + 16..eocdr + 20].try_into().unwrap()) as usize
    }

    /// Sets the same u16 in the local file header and central directory entry
    /// of a single-file archive.
    fn set_both(zip: &mut [u8], local_at: usize, central_at: usize, value: u16) {
        let cde = central_directory_offset(zip);
        zip[local_at..local_at + 2].copy_from_slice(&value.to_le_bytes());
        zip[cde + central_at..cde + central_at + 2].copy_from_slice(&value.to_le_bytes());
    }

    fn le16(zip: &mut Vec<u8>, u: u16) {
        zip.extend_from_slice(&u.to_le_bytes());
    }

    fn le32(zip: &mut Vec<u8>, u: u32) {
        zip.extend_from_slice(&u.to_le_bytes());
    }

    fn le64(zip: &mut Vec<u8>, u: u64) {
        zip.extend_from_slice(&u.to_le_bytes());
    }

    /// A single stored file whose sizes live in Zip64 extra fields,
    /// found through a Zip64 EOCDR and locator.
    fn zip64_archive(content: &[u8]) -> Vec<u8> {
        let name = b"big.txt";
        let crc = crc32fast::hash(content);

        let mut extra = Vec::new();
        le16(&mut extra, 0x0001);
        le16(&mut extra, 16);
        le64(&mut extra, content.len() as u64);
        le64(&mut extra, content.len() as u64);

        let mut zip = Vec::new();
        zip.extend_from_slice(b"PK\x03\x04");
        le16(&mut zip, 45);
        le16(&mut zip, 0);
        le16(&mut zip, 0);
        le16(&mut zip, 0);
        le16(&mut zip, 0x21);
        le32(&mut zip, crc);
        le32(&mut zip, u32::MAX);
        le32(&mut zip, u32::MAX);
        le16(&mut zip, name.len() as u16);
        le16(&mut zip, extra.len() as u16);
        zip.extend_from_slice(name);
        zip.extend_from_slice(&extra);
        zip.extend_from_slice(content);

        let cd_offset = zip.len() as u64;
        zip.extend_from_slice(b"PK\x01\x02");
        le16(&mut zip, (3 << 8) | 45);
        le16(&mut zip, 45);
        le16(&mut zip, 0);
        le16(&mut zip, 0);
        le16(&mut zip, 0);
        le16(&mut zip, 0x21);
        le32(&mut zip, crc);
        le32(&mut zip, u32::MAX);
        le32(&mut zip, u32::MAX);
        le16(&mut zip, name.len() as u16);
        le16(&mut zip, extra.len() as u16);
        le16(&mut zip, 0);
        le16(&mut zip, 0);
        le16(&mut zip, 0);
        le32(&mut zip, 0o100644 << 16);
        le32(&mut zip, 0);
        zip.extend_from_slice(name);
        zip.extend_from_slice(&extra);
        let cd_size = zip.len() as u64 - cd_offset;

        let zip64_eocdr_offset = zip.len() as u64;
        zip.extend_from_slice(b"PK\x06\x06");
        le64(&mut zip, 44);
        le16(&mut zip, 45);
        le16(&mut zip, 45);
        le32(&mut zip, 0);
        le32(&mut zip, 0);
        le64(&mut zip, 1);
        le64(&mut zip, 1);
        le64(&mut zip, cd_size);
        le64(&mut zip, cd_offset);

        zip.extend_from_slice(b"PK\x06\x07");
        le32(&mut zip, 0);
        le64(&mut zip, zip64_eocdr_offset);
        le32(&mut zip, 1);

        zip.extend_from_slice(b"PK\x05\x06");
        le16(&mut zip, 0);
        le16(&mut zip, 0);
        le16(&mut zip, u16::MAX);
        le16(&mut zip, u16::MAX);
        le32(&mut zip, u32::MAX);
        le32(&mut zip, u32::MAX);
        le16(&mut zip, 0);
        zip
    }

    #[test]
    fn read_streams_contents() {
        let zip = one_file();
        let archive = ZipArchive::new(&zip).unwrap();
        let entry = &archive.entries()[0];
        assert_eq!(entry.path.as_str(), "a.txt");
        assert!(!entry.is_dir());

        let mut contents = String::new();
        archive
            .read(entry)
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "Hello, world!\n".repeat(4));
    }

    #[test]
    fn multi_disk_archives_are_refused() {
        let eocdr = one_file().len() - EOCDR_SIZE;

        // This disk isn't the one with the central directory
        let mut zip = one_file();
        zip[eocdr + 4] = 1;
        assert!(matches!(
            ZipArchive::new(&zip),
            Err(ZipError::UnsupportedArchive(_))
        ));

        // Some entries are on another disk
        let mut zip = one_file();
        zip[eocdr + 8] = 0;
        assert!(matches!(
            ZipArchive::new(&zip),
            Err(ZipError::UnsupportedArchive(_))
        ));

        // The file claims to live on another disk
        let mut zip = one_file();
        let cde = central_directory_offset(&zip);
        zip[cde + 34] = 2;
        assert!(matches!(
            ZipArchive::new(&zip),
            Err(ZipError::UnsupportedArchive(_))
        ));
    }

    #[test]
    fn encrypted_files_are_refused() {
        let mut zip = one_file();
        set_both(&mut zip, 6, 8, 1);

        let archive = ZipArchive::new(&zip).unwrap();
        assert!(archive.entries()[0].encrypted);
        match archive.read(&archive.entries()[0]) {
            Err(ZipError::UnsupportedArchive(why)) => assert!(why.contains("a.txt")),
            Err(other) => panic!("Got incorrect error for an encrypted file: {:?}", other),
            Ok(_) => panic!("Encrypted file read without complaint"),
        };
    }

    #[test]
    fn unknown_compression_is_refused() {
        let mut zip = one_file();
        // 12 is bzip2
        set_both(&mut zip, 8, 10, 12);

        let archive = ZipArchive::new(&zip).unwrap();
        assert_eq!(
            archive.entries()[0].compression_method,
            CompressionMethod::Unsupported(12)
        );
        assert!(matches!(
            archive.read(&archive.entries()[0]),
            Err(ZipError::UnsupportedArchive(_))
        ));
    }

    #[cfg(feature = "check-local-metadata")]
    #[test]
    fn local_header_must_match_central_directory() {
        let mut zip = one_file();
        // Low byte of the local header's modification time
        zip[10] ^= 0xff;

        let archive = ZipArchive::new(&zip).unwrap();
        assert!(matches!(
            archive.read(&archive.entries()[0]),
            Err(ZipError::InvalidArchive(_))
        ));
    }

    #[test]
    fn zip64_sizes() {
        let content = b"Sizes and offsets in 64 bits";
        let zip = zip64_archive(content);

        let archive = ZipArchive::new(&zip).unwrap();
        let entry = &archive.entries()[0];
        assert_eq!(entry.size, content.len());
        assert_eq!(entry.compressed_size, content.len());

        let archive = Archive::from_zip(&archive).unwrap();
        assert_eq!(archive.lookup("big.txt").unwrap().content, content);
    }

    #[test]
    fn zip64_central_directory_must_fit() {
        let mut zip = zip64_archive(b"short");
        // Size of the central directory, in the Zip64 EOCDR
        let size_at = zip.len() - EOCDR_SIZE - 20 - 56 + 40;
        zip[size_at..size_at + 8].copy_from_slice(&(1u64 << 40).to_le_bytes());
        assert!(matches!(
            ZipArchive::new(&zip),
            Err(ZipError::InvalidArchive(_))
        ));
    }
}
