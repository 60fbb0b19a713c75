//! Shared framing for the content-addressed strings section (format spec
//! §3.2).
//!
//! A string record is `length:u32, bytes, padding to 4 bytes`. Both the
//! encoder's section builder ([`crate::write::builder::StringBuilder`]) and
//! the decoder's cache ([`crate::read::cache`]) frame records the same way,
//! so the framing itself lives here rather than being duplicated on each
//! side.

use crate::error::{Error, Result};
use crate::primitive::Writer;

/// The section-local offset of the empty string, which is always present
/// and always first.
pub const EMPTY_STRING_OFFSET: u64 = 0;

/// Appends one string record (length prefix, bytes, zero padding) to `buf`
/// and returns the record's total encoded length including padding.
pub(crate) fn encode_record(buf: &mut Writer, bytes: &[u8]) -> Result<usize> {
    if bytes.len() > u32::MAX as usize {
        return Err(Error::RecordTooLarge {
            what: "string",
            len: bytes.len(),
        });
    }
    let start = buf.len();
    buf.write_u32(bytes.len() as u32);
    buf.write_bytes(bytes);
    buf.pad_to(crate::ALIGN);
    Ok(buf.len() - start)
}

/// Reads the string record starting at `offset` within `section`, validating
/// that it does not run past the section end and that its padding is zero.
pub(crate) fn decode_record_at(section: &[u8], offset: u64) -> Result<&[u8]> {
    let section_len = section.len() as u64;
    if offset % crate::ALIGN as u64 != 0 {
        return Err(Error::MisalignedOffset {
            section: "strings",
            offset,
            align: crate::ALIGN as u64,
        });
    }
    if offset >= section_len {
        // The empty section never happens (offset 0 always holds the empty
        // string), but guard anyway for a malformed file with a non-empty
        // offset beyond a too-short section.
        return Err(Error::OutOfBoundsOffset {
            section: "strings",
            offset,
            section_len,
        });
    }
    let start = offset as usize;
    if section.len() - start < 4 {
        return Err(Error::OutOfBoundsOffset {
            section: "strings",
            offset,
            section_len,
        });
    }
    let len = u32::from_be_bytes([
        section[start],
        section[start + 1],
        section[start + 2],
        section[start + 3],
    ]) as u64;
    let data_start = start + 4;
    let data_end = data_start
        .checked_add(len as usize)
        .ok_or(Error::OutOfBoundsOffset {
            section: "strings",
            offset,
            section_len,
        })?;
    if data_end > section.len() {
        return Err(Error::OutOfBoundsOffset {
            section: "strings",
            offset,
            section_len,
        });
    }
    let padded_end = crate::primitive::align_up(data_end, crate::ALIGN);
    if padded_end > section.len() {
        return Err(Error::OutOfBoundsOffset {
            section: "strings",
            offset,
            section_len,
        });
    }
    for &b in &section[data_end..padded_end] {
        if b != 0 {
            return Err(Error::NonZeroPadding {
                section: "strings",
                offset: (data_end) as u64,
            });
        }
    }
    Ok(&section[data_start..data_end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_padding() {
        let mut w = Writer::new();
        encode_record(&mut w, b"hi").unwrap();
        let bytes = w.into_bytes();
        // len=2, "hi", one pad byte to reach a multiple of 4.
        assert_eq!(bytes, [0, 0, 0, 2, b'h', b'i', 0]);
    }

    #[test]
    fn decodes_round_trip() {
        let mut w = Writer::new();
        encode_record(&mut w, b"").unwrap();
        encode_record(&mut w, b"example.com/foo").unwrap();
        let section = w.into_bytes();
        assert_eq!(decode_record_at(&section, 0).unwrap(), b"");
        assert_eq!(decode_record_at(&section, 4).unwrap(), b"example.com/foo");
    }

    #[test]
    fn rejects_nonzero_padding() {
        let mut w = Writer::new();
        encode_record(&mut w, b"hi").unwrap();
        let mut section = w.into_bytes();
        *section.last_mut().unwrap() = 0xFF;
        assert!(decode_record_at(&section, 0).is_err());
    }

    #[test]
    fn rejects_out_of_bounds_length() {
        let section = [0, 0, 0, 100, b'h', b'i'];
        assert!(decode_record_at(&section, 0).is_err());
    }
}
