//! An archive held entirely in memory: an ordered list of entries,
//! each with its path, decompressed contents, and everything else
//! we need to write it back out the way we found it.

use camino::Utf8PathBuf;
use log::*;

use crate::format::DosDateTime;
use crate::read::{CompressionMethod, FileMetadata, ZipArchive};
use crate::result::*;

/// Everything about an entry besides its path and contents.
///
/// We don't interpret most of this; it's carried from the input archive
/// to the output verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMetadata {
    pub compression_method: CompressionMethod,
    pub flags: u16,
    pub last_modified: DosDateTime,
    pub source_version: u16,
    pub minimum_extract_version: u16,
    /// The central directory's extra field
    pub extra_field: Vec<u8>,
    /// The local file header's extra field
    pub local_extra_field: Vec<u8>,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub comment: Vec<u8>,
}

impl Default for EntryMetadata {
    /// A DEFLATEd file made on Unix, dated 1980-01-01.
    fn default() -> Self {
        Self {
            compression_method: CompressionMethod::Deflate,
            flags: 0,
            last_modified: DosDateTime {
                time: 0,
                date: (1 << 5) | 1,
            },
            // Unix, ZIP 2.0
            source_version: (3 << 8) | 20,
            minimum_extract_version: 20,
            extra_field: Vec::new(),
            local_extra_field: Vec::new(),
            internal_attributes: 0,
            external_attributes: 0,
            comment: Vec::new(),
        }
    }
}

impl EntryMetadata {
    fn from_file_metadata(metadata: &FileMetadata, local_extra_field: &[u8]) -> Self {
        Self {
            compression_method: metadata.compression_method,
            flags: metadata.flags,
            last_modified: metadata.last_modified,
            source_version: metadata.source_version,
            minimum_extract_version: metadata.minimum_extract_version,
            extra_field: metadata.extra_field.to_vec(),
            local_extra_field: local_extra_field.to_vec(),
            internal_attributes: metadata.internal_attributes,
            external_attributes: metadata.external_attributes,
            comment: metadata.comment.to_vec(),
        }
    }
}

/// A single file or directory in an [`Archive`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub path: String,
    pub content: Vec<u8>,
    pub metadata: EntryMetadata,
}

impl Entry {
    /// Makes a new entry with default metadata.
    pub fn new<P: Into<String>, C: Into<Vec<u8>>>(path: P, content: C) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            metadata: EntryMetadata::default(),
        }
    }

    /// Makes a new directory entry. Directories are stored, not compressed.
    pub fn directory<P: Into<String>>(path: P) -> Self {
        let mut path = path.into();
        if !path.ends_with('/') {
            path.push('/');
        }
        Self {
            path,
            content: Vec::new(),
            metadata: EntryMetadata {
                compression_method: CompressionMethod::None,
                // drwxr-xr-x
                external_attributes: 0o040755 << 16,
                ..EntryMetadata::default()
            },
        }
    }

    /// Returns true if the given entry is a directory
    pub fn is_dir(&self) -> bool {
        self.content.is_empty() && self.path.ends_with('/')
    }
}

/// An archive, read fully into memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Archive {
    pub entries: Vec<Entry>,
}

impl Archive {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    /// Parses and decompresses the whole ZIP archive in `bytes`.
    pub fn parse(bytes: &[u8]) -> ZipResult<Self> {
        let zip = ZipArchive::new(bytes)?;
        Self::from_zip(&zip)
    }

    /// Decompresses every entry of an already-parsed archive.
    pub fn from_zip(zip: &ZipArchive) -> ZipResult<Self> {
        let mut entries = Vec::with_capacity(zip.entries().len());
        for file in zip.entries() {
            let (content, local_extra_field) = zip.read_to_vec(file)?;
            entries.push(Entry {
                path: file.path.as_str().to_owned(),
                content,
                metadata: EntryMetadata::from_file_metadata(file, local_extra_field),
            });
        }
        info!("Read {} entries", entries.len());
        Ok(Self { entries })
    }

    /// Finds the first entry with the given path.
    pub fn lookup(&self, path: &str) -> ZipResult<&Entry> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .ok_or_else(|| ZipError::NoSuchFile(Utf8PathBuf::from(path)))
    }
}
