//! The symbol record (format spec §3.2): a named exportable entity.
//!
//! Like [`crate::section::ProgramSection`], `Symbol` is a flat,
//! already-resolved record: every reference it carries (package name,
//! name, section name, type) is already a section-local offset by the
//! time a `Symbol` value exists, so the same struct is both what the
//! encoder writes and what the decoder reads back.

use crate::common::SymKind;
use crate::error::{Error, Result};
use crate::primitive::{Reader, Writer};

/// `kind:u32, package-name-offset:u64, name-offset:u64,
/// section-name-offset:u64, type-offset:u64, value:u64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub kind: SymKind,
    /// Strings-section offset of the symbol's owning package name (may be
    /// the empty string for builtins).
    pub package_name_offset: u64,
    /// Strings-section offset of the symbol's name.
    pub name_offset: u64,
    /// Strings-section offset of the symbol's program section's name (may
    /// be the empty string if the symbol has no section).
    pub section_name_offset: u64,
    /// Types-section offset of the symbol's type. Must be non-zero.
    pub type_offset: u64,
    /// Interpretation depends on `kind`; see format spec §3.2.
    pub value: u64,
}

impl Symbol {
    pub(crate) fn encode(&self, w: &mut Writer) {
        w.write_u32(self.kind as u32);
        w.write_u64(self.package_name_offset);
        w.write_u64(self.name_offset);
        w.write_u64(self.section_name_offset);
        w.write_u64(self.type_offset);
        w.write_u64(self.value);
    }

    pub(crate) fn decode(data: &[u8]) -> Result<Symbol> {
        let mut r = Reader::new(data);
        let kind = SymKind::from_u32(r.read_u32()?)?;
        let package_name_offset = r.read_u64()?;
        let name_offset = r.read_u64()?;
        let section_name_offset = r.read_u64()?;
        let type_offset = r.read_u64()?;
        if type_offset == 0 {
            return Err(Error::OutOfBoundsOffset {
                section: "types",
                offset: 0,
                section_len: 0,
            });
        }
        let value = r.read_u64()?;
        Ok(Symbol {
            kind,
            package_name_offset,
            name_offset,
            section_name_offset,
            type_offset,
            value,
        })
    }
}

/// Fixed per-record size of a symbol entry.
pub const RECORD_SIZE: u64 = crate::common::SYMBOL_RECORD_SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size_is_44_bytes() {
        let symbol = Symbol {
            kind: SymKind::Function,
            package_name_offset: 0,
            name_offset: 4,
            section_name_offset: 0,
            type_offset: 8,
            value: 0,
        };
        let mut w = Writer::new();
        symbol.encode(&mut w);
        assert_eq!(w.len() as u64, RECORD_SIZE);
    }

    #[test]
    fn round_trips() {
        let symbol = Symbol {
            kind: SymKind::IntegerConstant,
            package_name_offset: 4,
            name_offset: 20,
            section_name_offset: 0,
            type_offset: 12,
            value: 12,
        };
        let mut w = Writer::new();
        symbol.encode(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(Symbol::decode(&bytes).unwrap(), symbol);
    }

    #[test]
    fn zero_type_offset_is_rejected() {
        let symbol = Symbol {
            kind: SymKind::BooleanConstant,
            package_name_offset: 0,
            name_offset: 4,
            section_name_offset: 0,
            type_offset: 0,
            value: 1,
        };
        let mut w = Writer::new();
        symbol.encode(&mut w);
        let bytes = w.into_bytes();
        assert!(Symbol::decode(&bytes).is_err());
    }
}
