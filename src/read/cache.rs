//! Lazy, cached bulk and by-offset accessors over one section of a decoded
//! file (format spec §4.4).
//!
//! Every section is parsed at most once per [`crate::read::Decoder`],
//! on whichever accessor call asks for it first; the parsed form is then
//! kept behind an `Rc` so later calls are a cheap clone rather than a
//! re-parse. This is the "parse once, read many times" shape a borrowing
//! decoder needs without forcing every accessor to take `&mut self`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::abi::Abi;
use crate::arch::Architecture;
use crate::common::TypeKind;
use crate::error::{Error, Result};
use crate::linkage::Linkage;
use crate::primitive::Reader;
use crate::section::ProgramSection;
use crate::strings;
use crate::symbol::Symbol;
use crate::types::Type;
use crate::ALIGN;

/// A lazily-populated, `Rc`-shared cache slot.
struct Slot<T> {
    value: RefCell<Option<Rc<T>>>,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Slot {
            value: RefCell::new(None),
        }
    }

    fn get_or_try_init(&self, init: impl FnOnce() -> Result<T>) -> Result<Rc<T>> {
        if let Some(existing) = self.value.borrow().as_ref() {
            return Ok(Rc::clone(existing));
        }
        let computed = Rc::new(init()?);
        *self.value.borrow_mut() = Some(Rc::clone(&computed));
        Ok(computed)
    }
}

/// Every section's raw bytes, sliced out of the file once at bootstrap time,
/// plus the lazily-materialised decoded forms.
pub(crate) struct SectionCache<'data> {
    architecture: Architecture,
    imports: &'data [u8],
    exports: &'data [u8],
    types_raw: &'data [u8],
    symbols_raw: &'data [u8],
    abis_raw: &'data [u8],
    program_sections_raw: &'data [u8],
    strings_raw: &'data [u8],
    linkages_raw: &'data [u8],
    code_raw: &'data [u8],

    strings: Slot<Vec<&'data [u8]>>,
    strings_by_offset: Slot<HashMap<u64, &'data [u8]>>,
    types: Slot<Vec<(u64, Type)>>,
    types_by_offset: Slot<HashMap<u64, Type>>,
    abis: Slot<Vec<(u64, Abi)>>,
    abis_by_offset: Slot<HashMap<u64, Abi>>,
    program_sections: Slot<Vec<ProgramSection>>,
    symbols: Slot<Vec<Symbol>>,
    linkages: Slot<Vec<Linkage>>,
}

#[allow(clippy::too_many_arguments)]
impl<'data> SectionCache<'data> {
    pub(crate) fn new(
        architecture: Architecture,
        imports: &'data [u8],
        exports: &'data [u8],
        types_raw: &'data [u8],
        symbols_raw: &'data [u8],
        abis_raw: &'data [u8],
        program_sections_raw: &'data [u8],
        strings_raw: &'data [u8],
        linkages_raw: &'data [u8],
        code_raw: &'data [u8],
    ) -> Self {
        SectionCache {
            architecture,
            imports,
            exports,
            types_raw,
            symbols_raw,
            abis_raw,
            program_sections_raw,
            strings_raw,
            linkages_raw,
            code_raw,
            strings: Slot::new(),
            strings_by_offset: Slot::new(),
            types: Slot::new(),
            types_by_offset: Slot::new(),
            abis: Slot::new(),
            abis_by_offset: Slot::new(),
            program_sections: Slot::new(),
            symbols: Slot::new(),
            linkages: Slot::new(),
        }
    }

    fn decode_all_strings(&self) -> Result<(Vec<&'data [u8]>, HashMap<u64, &'data [u8]>)> {
        let mut ordered = Vec::new();
        let mut by_offset = HashMap::new();
        let mut offset = 0u64;
        while (offset as usize) < self.strings_raw.len() {
            let bytes = strings::decode_record_at(self.strings_raw, offset)?;
            let record_len = 4 + bytes.len();
            let padded_len = crate::primitive::align_up(record_len, ALIGN);
            ordered.push(bytes);
            by_offset.insert(offset, bytes);
            offset += padded_len as u64;
        }
        Ok((ordered, by_offset))
    }

    pub(crate) fn strings(&self) -> Result<Rc<Vec<&'data [u8]>>> {
        self.ensure_strings()?;
        Ok(Rc::clone(
            self.strings
                .value
                .borrow()
                .as_ref()
                .expect("strings cache populated above"),
        ))
    }

    fn ensure_strings(&self) -> Result<()> {
        if self.strings.value.borrow().is_some() {
            return Ok(());
        }
        let (ordered, by_offset) = self.decode_all_strings()?;
        *self.strings.value.borrow_mut() = Some(Rc::new(ordered));
        *self.strings_by_offset.value.borrow_mut() = Some(Rc::new(by_offset));
        Ok(())
    }

    pub(crate) fn string_at(&self, offset: u64) -> Result<&'data [u8]> {
        self.ensure_strings()?;
        let map = self.strings_by_offset.value.borrow();
        map.as_ref()
            .expect("strings cache populated above")
            .get(&offset)
            .copied()
            .ok_or(Error::OutOfBoundsOffset {
                section: "strings",
                offset,
                section_len: self.strings_raw.len() as u64,
            })
    }

    fn decode_all_types(&self) -> Result<(Vec<(u64, Type)>, HashMap<u64, Type>)> {
        let mut ordered = Vec::new();
        let mut by_offset: HashMap<u64, Type> = HashMap::new();
        let mut offset = 0usize;
        let data = self.types_raw;
        while offset < data.len() {
            let mut r = Reader::new(&data[offset..]);
            let kind_byte = r.read_u8()?;
            let kind = TypeKind::from_u8(kind_byte)?;
            let payload_len = r.read_u24()? as usize;
            let payload = r.read_bytes(payload_len)?;
            let ty = Type::decode(kind, payload)?;
            for sub_offset in ty.referenced_type_offsets() {
                if !by_offset.contains_key(&sub_offset) {
                    return Err(Error::TypeForwardReference {
                        at: offset as u64,
                        target: sub_offset,
                    });
                }
            }
            let record_len = 4 + payload_len;
            let padded_len = crate::primitive::align_up(record_len, ALIGN);
            by_offset.insert(offset as u64, ty.clone());
            ordered.push((offset as u64, ty));
            offset += padded_len;
        }
        Ok((ordered, by_offset))
    }

    fn ensure_types(&self) -> Result<()> {
        if self.types.value.borrow().is_some() {
            return Ok(());
        }
        let (ordered, by_offset) = self.decode_all_types()?;
        *self.types.value.borrow_mut() = Some(Rc::new(ordered));
        *self.types_by_offset.value.borrow_mut() = Some(Rc::new(by_offset));
        Ok(())
    }

    pub(crate) fn types(&self) -> Result<Rc<Vec<(u64, Type)>>> {
        self.ensure_types()?;
        Ok(Rc::clone(
            self.types
                .value
                .borrow()
                .as_ref()
                .expect("types cache populated above"),
        ))
    }

    pub(crate) fn type_at(&self, offset: u64) -> Result<Type> {
        self.ensure_types()?;
        let map = self.types_by_offset.value.borrow();
        map.as_ref()
            .expect("types cache populated above")
            .get(&offset)
            .cloned()
            .ok_or(Error::OutOfBoundsOffset {
                section: "types",
                offset,
                section_len: self.types_raw.len() as u64,
            })
    }

    fn decode_all_abis(&self) -> Result<(Vec<(u64, Abi)>, HashMap<u64, Abi>)> {
        let mut ordered = Vec::new();
        let mut by_offset = HashMap::new();
        let data = self.abis_raw;
        let mut offset = 0usize;
        while offset < data.len() {
            let mut r = Reader::new(&data[offset..]);
            let len = r.read_u32()? as usize;
            let payload = r.read_bytes(len)?;
            let abi = Abi::decode_payload(payload)?;
            abi.validate(self.architecture)?;
            let record_len = 4 + len;
            let padded_len = crate::primitive::align_up(record_len, ALIGN);
            ordered.push((offset as u64, abi.clone()));
            by_offset.insert(offset as u64, abi);
            offset += padded_len;
        }
        Ok((ordered, by_offset))
    }

    fn ensure_abis(&self) -> Result<()> {
        if self.abis.value.borrow().is_some() {
            return Ok(());
        }
        let (ordered, by_offset) = self.decode_all_abis()?;
        *self.abis.value.borrow_mut() = Some(Rc::new(ordered));
        *self.abis_by_offset.value.borrow_mut() = Some(Rc::new(by_offset));
        Ok(())
    }

    pub(crate) fn abis(&self) -> Result<Rc<Vec<(u64, Abi)>>> {
        self.ensure_abis()?;
        Ok(Rc::clone(
            self.abis
                .value
                .borrow()
                .as_ref()
                .expect("abis cache populated above"),
        ))
    }

    pub(crate) fn abi_at(&self, offset: u64) -> Result<Abi> {
        self.ensure_abis()?;
        let map = self.abis_by_offset.value.borrow();
        map.as_ref()
            .expect("abis cache populated above")
            .get(&offset)
            .cloned()
            .ok_or(Error::OutOfBoundsOffset {
                section: "abis",
                offset,
                section_len: self.abis_raw.len() as u64,
            })
    }

    pub(crate) fn program_sections(&self) -> Result<Rc<Vec<ProgramSection>>> {
        self.program_sections.get_or_try_init(|| {
            let data = self.program_sections_raw;
            if data.len() as u64 % crate::section::RECORD_SIZE != 0 {
                return Err(Error::MisalignedOffset {
                    section: "program-sections",
                    offset: data.len() as u64,
                    align: crate::section::RECORD_SIZE,
                });
            }
            let mut out = Vec::new();
            let mut offset = 0usize;
            while offset < data.len() {
                let end = offset + crate::section::RECORD_SIZE as usize;
                out.push(ProgramSection::decode(&data[offset..end])?);
                offset = end;
            }
            Ok(out)
        })
    }

    pub(crate) fn program_section_at(&self, offset: u64) -> Result<ProgramSection> {
        let sections = self.program_sections()?;
        let index = offset / crate::section::RECORD_SIZE;
        if offset % crate::section::RECORD_SIZE != 0 || index as usize >= sections.len() {
            return Err(Error::OutOfBoundsOffset {
                section: "program-sections",
                offset,
                section_len: self.program_sections_raw.len() as u64,
            });
        }
        Ok(sections[index as usize])
    }

    pub(crate) fn symbols(&self) -> Result<Rc<Vec<Symbol>>> {
        self.symbols.get_or_try_init(|| {
            let data = self.symbols_raw;
            if data.len() as u64 % crate::symbol::RECORD_SIZE != 0 {
                return Err(Error::MisalignedOffset {
                    section: "symbols",
                    offset: data.len() as u64,
                    align: crate::symbol::RECORD_SIZE,
                });
            }
            let mut out = Vec::new();
            let mut offset = 0usize;
            while offset < data.len() {
                let end = offset + crate::symbol::RECORD_SIZE as usize;
                let symbol = Symbol::decode(&data[offset..end])?;
                // §3.2: package-name, name, and section-name offsets must
                // all be valid string offsets, regardless of symbol kind.
                self.string_at(symbol.package_name_offset)?;
                self.string_at(symbol.name_offset)?;
                self.string_at(symbol.section_name_offset)?;
                out.push(symbol);
                offset = end;
            }
            Ok(out)
        })
    }

    pub(crate) fn symbol_at(&self, offset: u64) -> Result<Symbol> {
        let symbols = self.symbols()?;
        let index = offset / crate::symbol::RECORD_SIZE;
        if offset % crate::symbol::RECORD_SIZE != 0 || index as usize >= symbols.len() {
            return Err(Error::OutOfBoundsOffset {
                section: "symbols",
                offset,
                section_len: self.symbols_raw.len() as u64,
            });
        }
        Ok(symbols[index as usize])
    }

    pub(crate) fn linkages(&self) -> Result<Rc<Vec<Linkage>>> {
        self.linkages.get_or_try_init(|| {
            let data = self.linkages_raw;
            if data.len() as u64 % crate::linkage::RECORD_SIZE != 0 {
                return Err(Error::MisalignedOffset {
                    section: "linkages",
                    offset: data.len() as u64,
                    align: crate::linkage::RECORD_SIZE,
                });
            }
            let mut out = Vec::new();
            let mut offset = 0usize;
            while offset < data.len() {
                let end = offset + crate::linkage::RECORD_SIZE as usize;
                let linkage = Linkage::decode(&data[offset..end])?;
                self.validate_linkage_bounds(&linkage)?;
                out.push(linkage);
                offset = end;
            }
            Ok(out)
        })
    }

    fn validate_linkage_bounds(&self, linkage: &Linkage) -> Result<()> {
        let source = self.symbol_at(linkage.source)?;
        let code_len = self.function_code_len(source.value)?;
        if linkage.address as u64 > code_len {
            return Err(Error::LinkageTargetOutOfRange {
                field: "address",
                value: linkage.address as u64,
                code_len,
            });
        }
        let patched_end = linkage.offset as u64 + (linkage.size as u64).div_ceil(8);
        if patched_end > code_len {
            return Err(Error::LinkageTargetOutOfRange {
                field: "offset",
                value: linkage.offset as u64,
                code_len,
            });
        }
        Ok(())
    }

    /// Reads the `length` field of the code record at `code_offset`
    /// (`abi-offset:u32, length:u32, ...`).
    pub(crate) fn function_code_len(&self, code_offset: u64) -> Result<u64> {
        let start = code_offset as usize;
        let data = self.code_raw;
        if start + 8 > data.len() {
            return Err(Error::OutOfBoundsOffset {
                section: "code",
                offset: code_offset,
                section_len: data.len() as u64,
            });
        }
        let mut r = Reader::new(&data[start..]);
        let _abi_offset = r.read_u32()?;
        let len = r.read_u32()?;
        Ok(len as u64)
    }

    pub(crate) fn function_code(&self, code_offset: u64) -> Result<(u32, &'data [u8])> {
        let start = code_offset as usize;
        let data = self.code_raw;
        if start + 8 > data.len() {
            return Err(Error::OutOfBoundsOffset {
                section: "code",
                offset: code_offset,
                section_len: data.len() as u64,
            });
        }
        let mut r = Reader::new(&data[start..]);
        let abi_offset = r.read_u32()?;
        let len = r.read_u32()? as usize;
        let code = r.read_bytes(len)?;
        Ok((abi_offset, code))
    }

    pub(crate) fn imports_raw(&self) -> &'data [u8] {
        self.imports
    }

    pub(crate) fn exports_raw(&self) -> &'data [u8] {
        self.exports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{BasicKind, Permissions};
    use crate::primitive::Writer;

    fn strings_section_with(entries: &[&[u8]]) -> Vec<u8> {
        let mut w = Writer::new();
        for entry in entries {
            crate::strings::encode_record(&mut w, entry).unwrap();
        }
        w.into_bytes()
    }

    fn empty_cache(strings_raw: &[u8]) -> SectionCache {
        SectionCache::new(
            Architecture::X86_64,
            &[],
            &[],
            &[],
            &[],
            &[],
            &[],
            strings_raw,
            &[],
            &[],
        )
    }

    #[test]
    fn decodes_strings_in_order() {
        let section = strings_section_with(&[b"", b"example.com/foo"]);
        let cache = empty_cache(&section);
        let all = cache.strings().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(cache.string_at(0).unwrap(), b"");
        assert_eq!(cache.string_at(4).unwrap(), b"example.com/foo");
    }

    #[test]
    fn string_at_unknown_offset_errors() {
        let section = strings_section_with(&[b""]);
        let cache = empty_cache(&section);
        assert!(cache.string_at(100).is_err());
    }

    #[test]
    fn decodes_types_and_catches_forward_reference() {
        let mut w = Writer::new();
        // Nil type at offset 0.
        w.write_u8(TypeKind::None as u8);
        w.write_u24(0);
        // Basic type referencing nothing, at offset 4.
        w.write_u8(TypeKind::Basic as u8);
        w.write_u24(1);
        w.write_u8(BasicKind::Bool as u8);
        let data = w.into_bytes();

        let cache = SectionCache::new(
            Architecture::X86_64,
            &[],
            &[],
            &data,
            &[],
            &[],
            &[],
            &[],
            &[],
            &[],
        );
        let types = cache.types().unwrap();
        assert_eq!(types.len(), 2);
        assert_eq!(cache.type_at(4).unwrap(), Type::Basic(BasicKind::Bool));
    }

    #[test]
    fn program_sections_roundtrip_through_cache() {
        let mut w = Writer::new();
        ProgramSection::NIL.encode(&mut w);
        ProgramSection {
            name_offset: 4,
            address: 0x2000,
            permissions: Permissions::READ,
            fixed_address: true,
        }
        .encode(&mut w);
        let data = w.into_bytes();
        let cache = SectionCache::new(
            Architecture::X86_64,
            &[],
            &[],
            &[],
            &[],
            &[],
            &data,
            &[],
            &[],
            &[],
        );
        let sections = cache.program_sections().unwrap();
        assert_eq!(sections.len(), 2);
        assert_eq!(
            cache
                .program_section_at(crate::section::RECORD_SIZE)
                .unwrap()
                .address,
            0x2000
        );
    }
}
