//! Checked integer conversions between in-memory sizes and ZIP fields.

use std::convert::TryFrom;

use crate::result::*;

/// A checked cast from u64 to usize
pub fn usize<I: Into<u64>>(i: I) -> ZipResult<usize> {
    let i: u64 = i.into();
    usize::try_from(i).map_err(|_| ZipError::InsufficientAddressSpace)
}

/// A checked cast from usize to a 32-bit ZIP field.
///
/// We don't write Zip64 records, so anything bigger is unsupported.
pub fn u32_field(i: usize, what: &str) -> ZipResult<u32> {
    u32::try_from(i).map_err(|_| {
        ZipError::UnsupportedArchive(format!("{what} ({i}) needs Zip64, which we don't write"))
    })
}

/// A checked cast from usize to a 16-bit ZIP field (lengths and counts).
pub fn u16_field(i: usize, what: &str) -> ZipResult<u16> {
    u16::try_from(i).map_err(|_| {
        ZipError::UnsupportedArchive(format!("{what} ({i}) doesn't fit in a 16-bit field"))
    })
}
