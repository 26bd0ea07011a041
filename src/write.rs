//! Tools for writing a ZIP archive.
//!
//! [`ZipWriter`] streams entries out one at a time, then writes the central
//! directory when [`finish()`](ZipWriter::finish) is called.
//! Since we never seek, anything that implements [`Write`] will do.

use std::io::{self, Write};

use flate2::write::DeflateEncoder;
use flate2::Compression;
use log::*;

use crate::arch::{u16_field, u32_field};
use crate::archive::Entry;
use crate::format::{self, DosDateTime};
use crate::read::CompressionMethod;
use crate::result::*;

/// What we need to remember about each entry for the central directory
struct WrittenEntry {
    path: Vec<u8>,
    source_version: u16,
    minimum_extract_version: u16,
    flags: u16,
    compression_method: u16,
    last_modified: DosDateTime,
    crc32: u32,
    compressed_size: u32,
    uncompressed_size: u32,
    internal_attributes: u16,
    external_attributes: u32,
    header_offset: u32,
    extra_field: Vec<u8>,
    comment: Vec<u8>,
}

/// Writes a ZIP archive, entry by entry.
pub struct ZipWriter<W: Write> {
    inner: W,
    /// How many bytes we've written so far
    offset: usize,
    written: Vec<WrittenEntry>,
}

impl<W: Write> ZipWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            offset: 0,
            written: Vec::new(),
        }
    }

    /// Compresses and writes the given entry.
    ///
    /// The CRC-32 and sizes are computed here;
    /// everything else in the entry's metadata is written as-is.
    pub fn write_entry(&mut self, entry: &Entry) -> ZipResult<()> {
        let metadata = &entry.metadata;
        let compressed = compress(metadata.compression_method, &entry.content)?;
        let (path, flags) = format::encode_path(&entry.path, metadata.flags);

        u16_field(path.len(), "File name length")?;
        u16_field(metadata.extra_field.len(), "Extra field length")?;
        u16_field(metadata.local_extra_field.len(), "Local extra field length")?;
        u16_field(metadata.comment.len(), "File comment length")?;

        let header = format::LocalFileHeader {
            minimum_extract_version: metadata.minimum_extract_version,
            flags,
            compression_method: metadata.compression_method.to_u16(),
            last_modified: metadata.last_modified,
            crc32: crc32fast::hash(&entry.content),
            compressed_size: u32_field(compressed.len(), "Compressed size")?,
            uncompressed_size: u32_field(entry.content.len(), "Uncompressed size")?,
            path: &path,
            extra_field: &metadata.local_extra_field,
        };
        let header_offset = u32_field(self.offset, "Local header offset")?;
        trace!("{:?}", header);

        header.write(&mut self.inner)?;
        self.inner.write_all(&compressed)?;
        let descriptor_size = header.write_data_descriptor(&mut self.inner)?;
        self.offset += header.size_in_file() + compressed.len() + descriptor_size;

        debug!(
            "Wrote {} ({} bytes, {} compressed)",
            entry.path,
            entry.content.len(),
            compressed.len()
        );

        self.written.push(WrittenEntry {
            path: path.to_vec(),
            source_version: metadata.source_version,
            minimum_extract_version: metadata.minimum_extract_version,
            flags,
            compression_method: header.compression_method,
            last_modified: metadata.last_modified,
            crc32: header.crc32,
            compressed_size: header.compressed_size,
            uncompressed_size: header.uncompressed_size,
            internal_attributes: metadata.internal_attributes,
            external_attributes: metadata.external_attributes,
            header_offset,
            extra_field: metadata.extra_field.clone(),
            comment: metadata.comment.clone(),
        });
        Ok(())
    }

    /// Writes the central directory and hands back the underlying writer,
    /// flushed.
    pub fn finish(mut self) -> ZipResult<W> {
        let central_directory_offset = self.offset;
        let mut central_directory_size = 0;

        for written in &self.written {
            let cde = format::CentralDirectoryEntry {
                source_version: written.source_version,
                minimum_extract_version: written.minimum_extract_version,
                flags: written.flags,
                compression_method: written.compression_method,
                last_modified: written.last_modified,
                crc32: written.crc32,
                compressed_size: written.compressed_size,
                uncompressed_size: written.uncompressed_size,
                disk_number: 0,
                internal_file_attributes: written.internal_attributes,
                external_file_attributes: written.external_attributes,
                header_offset: written.header_offset,
                path: &written.path,
                extra_field: &written.extra_field,
                file_comment: &written.comment,
            };
            cde.write(&mut self.inner)?;
            central_directory_size +=
                46 + written.path.len() + written.extra_field.len() + written.comment.len();
        }

        let entries = u16_field(self.written.len(), "Entry count")?;
        let eocdr = format::EndOfCentralDirectory {
            disk_number: 0,
            disk_with_central_directory: 0,
            entries_on_this_disk: entries,
            entries,
            central_directory_size: u32_field(central_directory_size, "Central directory size")?,
            central_directory_offset: u32_field(
                central_directory_offset,
                "Central directory offset",
            )?,
            file_comment: &[],
        };
        trace!("{:?}", eocdr);
        eocdr.write(&mut self.inner)?;
        self.inner.flush()?;

        info!(
            "Finished archive with {} entries ({} bytes)",
            entries,
            central_directory_offset + central_directory_size + 22
        );
        Ok(self.inner)
    }
}

fn compress(method: CompressionMethod, content: &[u8]) -> ZipResult<Vec<u8>> {
    match method {
        CompressionMethod::None => Ok(content.to_vec()),
        CompressionMethod::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(content)?;
            Ok(encoder.finish()?)
        }
        CompressionMethod::Unsupported(method) => Err(ZipError::UnsupportedArchive(format!(
            "Can't write compression method {method}",
        ))),
    }
}

/// Writes the whole archive to a new buffer.
pub fn to_vec<'e, I: IntoIterator<Item = &'e Entry>>(entries: I) -> ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(io::Cursor::new(Vec::new()));
    for entry in entries {
        writer.write_entry(entry)?;
    }
    Ok(writer.finish()?.into_inner())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::{Archive, EntryMetadata};
    use crate::read::ZipArchive;

    #[test]
    fn reads_back_what_it_writes() {
        let entries = vec![
            Entry::directory("top"),
            Entry::new("top/hello.txt", "Hello, world!\n".repeat(20)),
            Entry {
                metadata: EntryMetadata {
                    compression_method: CompressionMethod::None,
                    ..EntryMetadata::default()
                },
                ..Entry::new("top/stored.bin", vec![0u8, 1, 2, 3])
            },
        ];
        let bytes = to_vec(&entries).unwrap();

        let zip = ZipArchive::new(&bytes).unwrap();
        assert_eq!(zip.entries().len(), 3);
        assert!(zip.entries()[0].is_dir());
        assert_eq!(zip.entries()[1].compression_method, CompressionMethod::Deflate);
        assert!(zip.entries()[1].compressed_size < zip.entries()[1].size);

        let archive = Archive::from_zip(&zip).unwrap();
        assert!(archive.entries[0].is_dir());
        assert!(!archive.entries[2].is_dir());
        assert_eq!(archive.entries, entries);
    }

    #[test]
    fn data_descriptors() {
        let entry = Entry {
            metadata: EntryMetadata {
                flags: 1 << 3,
                ..EntryMetadata::default()
            },
            ..Entry::new("streamed.txt", "streamed out")
        };
        let bytes = to_vec([&entry]).unwrap();
        let archive = Archive::parse(&bytes).unwrap();
        assert_eq!(archive.entries, vec![entry]);
    }

    #[test]
    fn unsupported_methods_are_refused() {
        let entry = Entry {
            metadata: EntryMetadata {
                compression_method: CompressionMethod::Unsupported(12),
                ..EntryMetadata::default()
            },
            ..Entry::new("bzipped", "nope")
        };
        let mut writer = ZipWriter::new(Vec::new());
        assert!(matches!(
            writer.write_entry(&entry),
            Err(ZipError::UnsupportedArchive(_))
        ));
    }
}
