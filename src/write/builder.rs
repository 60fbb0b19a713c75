//! Section builders and offset allocators (format spec §4.2).
//!
//! Every variable-length section (strings, types, ABIs, code) is an
//! append-only buffer plus a content→offset map that preserves insertion
//! order, so that dedup order always equals emission order — the property
//! the encoder's determinism guarantee (§3.4, §4.3) depends on. The
//! fixed-length sections (symbols, linkages, program-sections) only ever
//! append; their offsets are `index * record_size`.

use indexmap::IndexMap;

use crate::abi::Abi;
use crate::arch::Architecture;
use crate::common::BasicKind;
use crate::error::{Error, Result};
use crate::linkage::Linkage;
use crate::primitive::Writer;
use crate::section::ProgramSection;
use crate::symbol::Symbol;
use crate::types::Type;
use crate::ALIGN;

/// A generic append-only, content-deduplicated section.
///
/// `frame` closures write a record's full on-wire encoding (not including
/// the trailing 4-byte pad, which this type always adds itself) given a
/// canonical content key that uniquely identifies the record.
pub(crate) struct DedupSection {
    buf: Writer,
    offsets: IndexMap<Vec<u8>, u64>,
}

impl DedupSection {
    fn new() -> Self {
        DedupSection {
            buf: Writer::new(),
            offsets: IndexMap::new(),
        }
    }

    fn get_or_insert(&mut self, key: Vec<u8>, frame: impl FnOnce(&mut Writer)) -> u64 {
        if let Some(&offset) = self.offsets.get(&key) {
            return offset;
        }
        let offset = self.buf.len() as u64;
        frame(&mut self.buf);
        self.buf.pad_to(ALIGN);
        self.offsets.insert(key, offset);
        offset
    }

    fn len(&self) -> u64 {
        self.buf.len() as u64
    }

    fn into_bytes(self) -> Vec<u8> {
        self.buf.into_bytes()
    }
}

/// Builds the content-addressed strings section. The empty string is
/// always installed first, at offset 0.
pub(crate) struct StringBuilder {
    section: DedupSection,
}

impl StringBuilder {
    pub(crate) fn new() -> Self {
        let mut section = DedupSection::new();
        let offset = section.get_or_insert(Vec::new(), |w| {
            w.write_u32(0);
        });
        debug_assert_eq!(offset, crate::strings::EMPTY_STRING_OFFSET);
        StringBuilder { section }
    }

    /// Adds (or dedups) a string, returning its section-local offset.
    pub(crate) fn add(&mut self, bytes: &[u8]) -> Result<u64> {
        if bytes.len() > u32::MAX as usize {
            return Err(Error::RecordTooLarge {
                what: "string",
                len: bytes.len(),
            });
        }
        let key = bytes.to_vec();
        Ok(self.section.get_or_insert(key, |w| {
            w.write_u32(bytes.len() as u32);
            w.write_bytes(bytes);
        }))
    }

    pub(crate) fn len(&self) -> u64 {
        self.section.len()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.section.into_bytes()
    }
}

/// Builds the content-addressed type-graph section. The nil type is always
/// installed first, at offset 0.
pub(crate) struct TypeBuilder {
    section: DedupSection,
}

impl TypeBuilder {
    pub(crate) fn new() -> Self {
        let mut builder = TypeBuilder {
            section: DedupSection::new(),
        };
        let offset = builder.add(&Type::None).expect("nil type always encodes");
        debug_assert_eq!(offset, 0);
        builder
    }

    /// Adds (or dedups) a type whose sub-type offsets are already resolved,
    /// returning its section-local offset.
    ///
    /// Panics if any referenced sub-type offset is not strictly less than
    /// this builder's current length: the spec requires sub-types to be
    /// emitted before their parents, and a caller that violates this has a
    /// bug (recursive `add_type` must bottom out first), not a malformed
    /// input — inputs never name offsets directly.
    pub(crate) fn add(&mut self, ty: &Type) -> Result<u64> {
        let current_len = self.section.len();
        for sub_offset in ty.referenced_type_offsets() {
            assert!(
                sub_offset < current_len,
                "type builder invariant violated: sub-type at {sub_offset} does not precede parent (types section is {current_len} bytes)"
            );
        }

        let mut payload = Writer::new();
        ty.encode_payload(&mut payload)?;
        let payload = payload.into_bytes();
        if payload.len() > (1 << 24) - 1 {
            return Err(Error::RecordTooLarge {
                what: "type payload",
                len: payload.len(),
            });
        }

        let mut key = Vec::with_capacity(1 + payload.len());
        key.push(ty.kind() as u8);
        key.extend_from_slice(&payload);

        Ok(self.section.get_or_insert(key, |w| {
            w.write_u8(ty.kind() as u8);
            w.write_u24(payload.len() as u32);
            w.write_bytes(&payload);
        }))
    }

    /// Convenience for a basic type; these are requested often enough
    /// (every constant and most signatures reference one) to be worth a
    /// shorthand over `add(&Type::Basic(kind))`.
    pub(crate) fn add_basic(&mut self, kind: BasicKind) -> Result<u64> {
        self.add(&Type::Basic(kind))
    }

    pub(crate) fn len(&self) -> u64 {
        self.section.len()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.section.into_bytes()
    }
}

/// Builds the content-addressed ABI section. The nil ABI is always
/// installed first, at offset 0.
pub(crate) struct AbiBuilder {
    section: DedupSection,
    arch: Architecture,
}

impl AbiBuilder {
    pub(crate) fn new(arch: Architecture) -> Self {
        let mut builder = AbiBuilder {
            section: DedupSection::new(),
            arch,
        };
        let offset = builder.add(&Abi::NIL).expect("nil ABI always valid");
        debug_assert_eq!(offset, 0);
        builder
    }

    /// Validates and adds (or dedups) an ABI, returning its section-local
    /// offset.
    pub(crate) fn add(&mut self, abi: &Abi) -> Result<u64> {
        abi.validate(self.arch)?;
        let mut payload = Writer::new();
        abi.encode_payload(&mut payload);
        let payload = payload.into_bytes();
        let key = payload.clone();
        Ok(self.section.get_or_insert(key, |w| {
            w.write_u32(payload.len() as u32);
            w.write_bytes(&payload);
        }))
    }

    pub(crate) fn len(&self) -> u64 {
        self.section.len()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.section.into_bytes()
    }
}

/// Builds the code section: one record per function
/// (`abi-offset:u32, length:u32, code:bytes, padding`).
pub(crate) struct CodeBuilder {
    section: DedupSection,
}

impl CodeBuilder {
    pub(crate) fn new() -> Self {
        CodeBuilder {
            section: DedupSection::new(),
        }
    }

    /// Adds (or dedups) a function's machine code under the given ABI,
    /// returning its section-local offset.
    pub(crate) fn add(&mut self, abi_offset: u64, code: &[u8]) -> Result<u64> {
        if abi_offset > u32::MAX as u64 {
            return Err(Error::OutOfBoundsOffset {
                section: "abis",
                offset: abi_offset,
                section_len: u32::MAX as u64,
            });
        }
        if code.len() > u32::MAX as usize {
            return Err(Error::RecordTooLarge {
                what: "code blob",
                len: code.len(),
            });
        }
        let abi_offset = abi_offset as u32;
        let mut key = Vec::with_capacity(4 + code.len());
        key.extend_from_slice(&abi_offset.to_be_bytes());
        key.extend_from_slice(code);
        Ok(self.section.get_or_insert(key, |w| {
            w.write_u32(abi_offset);
            w.write_u32(code.len() as u32);
            w.write_bytes(code);
        }))
    }

    pub(crate) fn len(&self) -> u64 {
        self.section.len()
    }

    pub(crate) fn into_bytes(self) -> Vec<u8> {
        self.section.into_bytes()
    }
}

/// Builds a fixed-record-size section (symbols, linkages, program-sections)
/// by simple append; offsets are `index * record_size`.
pub(crate) struct FixedBuilder<T> {
    records: Vec<T>,
}

impl<T> FixedBuilder<T> {
    pub(crate) fn new() -> Self {
        FixedBuilder {
            records: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, record: T, record_size: u64) -> u64 {
        let offset = self.records.len() as u64 * record_size;
        self.records.push(record);
        offset
    }

    pub(crate) fn records(&self) -> &[T] {
        &self.records
    }

    pub(crate) fn into_bytes(self, mut encode_one: impl FnMut(&T, &mut Writer)) -> Vec<u8> {
        let mut w = Writer::new();
        for record in &self.records {
            encode_one(record, &mut w);
        }
        w.into_bytes()
    }
}

pub(crate) type SymbolBuilder = FixedBuilder<Symbol>;
pub(crate) type LinkageBuilder = FixedBuilder<Linkage>;
pub(crate) type ProgramSectionBuilder = FixedBuilder<ProgramSection>;

impl SymbolBuilder {
    pub(crate) fn add(&mut self, symbol: Symbol) -> u64 {
        self.push(symbol, crate::symbol::RECORD_SIZE)
    }

    pub(crate) fn encode(self) -> Vec<u8> {
        self.into_bytes(|s, w| s.encode(w))
    }
}

impl LinkageBuilder {
    pub(crate) fn add(&mut self, linkage: Linkage) -> u64 {
        self.push(linkage, crate::linkage::RECORD_SIZE)
    }

    pub(crate) fn encode(self) -> Vec<u8> {
        self.into_bytes(|l, w| l.encode(w))
    }
}

impl ProgramSectionBuilder {
    pub(crate) fn new_seeded() -> Self {
        let mut builder = FixedBuilder::new();
        let offset = builder.push(ProgramSection::NIL, crate::section::RECORD_SIZE);
        debug_assert_eq!(offset, 0);
        builder
    }

    pub(crate) fn add(&mut self, section: ProgramSection) -> u64 {
        self.push(section, crate::section::RECORD_SIZE)
    }

    pub(crate) fn encode(self) -> Vec<u8> {
        self.into_bytes(|s, w| s.encode(w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_builder_dedups_and_seeds_empty() {
        let mut b = StringBuilder::new();
        assert_eq!(b.len(), 4); // just the empty string's length prefix
        let a = b.add(b"hello").unwrap();
        let c = b.add(b"hello").unwrap();
        assert_eq!(a, c);
        let d = b.add(b"world").unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn type_builder_dedups_basic_types() {
        let mut b = TypeBuilder::new();
        let a = b.add_basic(BasicKind::Uint16).unwrap();
        let c = b.add_basic(BasicKind::Uint16).unwrap();
        assert_eq!(a, c);
        let d = b.add_basic(BasicKind::Bool).unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn type_builder_rejects_forward_reference() {
        let mut b = TypeBuilder::new();
        let bogus = Type::Array {
            length: 1,
            element_type_offset: 9999,
        };
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| b.add(&bogus)));
        assert!(result.is_err());
    }

    #[test]
    fn abi_builder_dedups_and_validates() {
        let mut b = AbiBuilder::new(Architecture::X86_64);
        assert_eq!(b.len(), 4); // nil ABI's length prefix
        let abi = Abi {
            params: vec![6, 1],
            ..Abi::NIL
        };
        let a = b.add(&abi).unwrap();
        let c = b.add(&abi).unwrap();
        assert_eq!(a, c);

        let bad = Abi {
            params: vec![250],
            ..Abi::NIL
        };
        assert!(b.add(&bad).is_err());
    }

    #[test]
    fn code_builder_dedups_identical_abi_and_code() {
        let mut b = CodeBuilder::new();
        let a = b.add(0, &[0x90, 0x90, 0x90]).unwrap();
        let c = b.add(0, &[0x90, 0x90, 0x90]).unwrap();
        assert_eq!(a, c);
        let d = b.add(0, &[0x90]).unwrap();
        assert_ne!(a, d);
    }

    #[test]
    fn fixed_builder_offsets_are_index_times_record_size() {
        let mut b = SymbolBuilder::new();
        let s1 = b.add(Symbol {
            kind: crate::common::SymKind::Function,
            package_name_offset: 0,
            name_offset: 4,
            section_name_offset: 0,
            type_offset: 8,
            value: 0,
        });
        let s2 = b.add(Symbol {
            kind: crate::common::SymKind::Function,
            package_name_offset: 0,
            name_offset: 20,
            section_name_offset: 0,
            type_offset: 8,
            value: 0,
        });
        assert_eq!(s1, 0);
        assert_eq!(s2, crate::symbol::RECORD_SIZE);
    }
}
