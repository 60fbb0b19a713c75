//! The program-section record (format spec §3.2): the memory segment a
//! symbol lives in (e.g. `.text`, `.rodata`).
//!
//! `ProgramSection` is a flat, already-resolved record shared by both sides
//! of the codec: by the time one is built for encoding, its name has
//! already been deposited in the strings section and its offset is in
//! hand, so the same struct serves as both the write-side input and the
//! read-side decoded output.

use crate::common::{Permissions, PROGRAM_SECTION_RECORD_SIZE};
use crate::error::{Error, Result};
use crate::primitive::{Reader, Writer};

/// A declared memory segment: `name-offset:u64, address:u64,
/// permissions:u8, fixed-address:u8, padding:6 bytes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramSection {
    /// Section-local offset into the strings section of this section's name.
    pub name_offset: u64,
    /// Load address, meaningful only when `fixed_address` is set.
    pub address: u64,
    /// Read/write/execute permissions.
    pub permissions: Permissions,
    /// Whether this section has a fixed (as opposed to linker-assigned)
    /// address.
    pub fixed_address: bool,
}

impl ProgramSection {
    /// The all-zero nil section, always present at offset 0.
    pub const NIL: ProgramSection = ProgramSection {
        name_offset: 0,
        address: 0,
        permissions: Permissions(0),
        fixed_address: false,
    };

    pub(crate) fn encode(&self, w: &mut Writer) {
        w.write_u64(self.name_offset);
        w.write_u64(self.address);
        w.write_u8(self.permissions.0);
        w.write_u8(self.fixed_address as u8);
        w.write_bytes(&[0u8; 6]);
    }

    pub(crate) fn decode(data: &[u8]) -> Result<ProgramSection> {
        let mut r = Reader::new(data);
        let name_offset = r.read_u64()?;
        let address = r.read_u64()?;
        let permissions = Permissions(r.read_u8()?);
        let fixed_byte = r.read_u8()?;
        let fixed_address = match fixed_byte {
            0 => false,
            1 => true,
            other => {
                return Err(Error::UnrecognisedKind {
                    what: "fixed-address flag",
                    value: other as u32,
                })
            }
        };
        let padding = r.read_bytes(6)?;
        if padding.iter().any(|&b| b != 0) {
            return Err(Error::NonZeroPadding {
                section: "program-sections",
                offset: 18,
            });
        }
        Ok(ProgramSection {
            name_offset,
            address,
            permissions,
            fixed_address,
        })
    }
}

/// Fixed per-record size of a program-section entry.
pub const RECORD_SIZE: u64 = PROGRAM_SECTION_RECORD_SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size_is_24_bytes() {
        let mut w = Writer::new();
        ProgramSection::NIL.encode(&mut w);
        assert_eq!(w.len() as u64, RECORD_SIZE);
    }

    #[test]
    fn round_trips() {
        let section = ProgramSection {
            name_offset: 4,
            address: 0x1000,
            permissions: Permissions::READ | Permissions::EXECUTE,
            fixed_address: true,
        };
        let mut w = Writer::new();
        section.encode(&mut w);
        let bytes = w.into_bytes();
        let decoded = ProgramSection::decode(&bytes).unwrap();
        assert_eq!(decoded, section);
    }

    #[test]
    fn rejects_nonzero_padding() {
        let section = ProgramSection::NIL;
        let mut w = Writer::new();
        section.encode(&mut w);
        let mut bytes = w.into_bytes();
        bytes[23] = 1;
        assert!(ProgramSection::decode(&bytes).is_err());
    }
}
