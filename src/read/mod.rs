//! The graph decoder (format spec §4.4): header bootstrap plus lazily
//! cached, validated views over every section.
//!
//! [`Decoder::new`] eagerly parses and validates the header and the trailing
//! digest; every other section is parsed on first access and cached behind
//! [`cache::SectionCache`] so repeated queries are cheap. A `Decoder`
//! borrows its input slice for its whole lifetime and never mutates it.

use std::collections::HashSet;

use sha2::{Digest, Sha256};

use crate::abi::Abi;
use crate::arch::Architecture;
use crate::common::SymKind;
use crate::error::{Error, Result};
use crate::header::Header;
use crate::linkage::Linkage;
use crate::primitive::Reader;
use crate::section::ProgramSection;
use crate::symbol::Symbol;
use crate::types::Type;
use crate::DIGEST_LEN;

pub(crate) mod cache;

use cache::SectionCache;

/// A borrowed, validated view over one `rpkg` file.
pub struct Decoder<'data> {
    data: &'data [u8],
    header: Header,
    cache: SectionCache<'data>,
}

/// A fully resolved function: its ABI, code, and outgoing relocations,
/// reconstructed from its symbol record (format spec §4.4, "richer object
/// graph").
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFunction<'data> {
    pub name: String,
    pub section: String,
    pub abi: Abi,
    pub code: &'data [u8],
    pub links: Vec<DecodedLink>,
    pub exported: bool,
}

/// One resolved outgoing relocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLink {
    pub target: String,
    pub link_type: crate::common::LinkType,
    pub size: u32,
    pub offset: u32,
    pub address: u32,
}

/// A named or anonymous constant, with its value already interpreted
/// according to its `SymKind` (format spec §3.2's value table).
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedConstant {
    pub name: String,
    pub value: DecodedValue,
    pub exported: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    Bool(bool),
    Int(i64),
    BigInt { negative: bool, magnitude: Vec<u8> },
    Str(Vec<u8>),
    Array(Vec<u8>),
    Abi(Abi),
    Section(ProgramSection),
}

/// Decoded header fields and the file's trailing digest (format spec §6.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderInfo<'data> {
    pub architecture: Architecture,
    pub version: u8,
    pub base_address: u64,
    pub digest: &'data [u8],
}

/// The full decoded object graph for one package.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPackage<'data> {
    pub path: String,
    pub architecture: Architecture,
    pub base_address: u64,
    pub imports: Vec<&'data [u8]>,
    pub functions: Vec<DecodedFunction<'data>>,
    pub constants: Vec<DecodedConstant>,
}

impl<'data> Decoder<'data> {
    /// Parses and validates the header and trailing digest of `data`
    /// (format spec §4.4 bootstrap). Every other section is validated
    /// lazily, on first access.
    pub fn new(data: &'data [u8]) -> Result<Decoder<'data>> {
        let header = Header::decode(data)?;

        let checksum_offset = header.offsets.checksum;
        let expected_len = checksum_offset
            .checked_add(DIGEST_LEN as u64)
            .ok_or(Error::OutOfBoundsOffset {
                section: "checksum",
                offset: checksum_offset,
                section_len: data.len() as u64,
            })?;
        if data.len() as u64 != expected_len {
            return Err(Error::OutOfBoundsOffset {
                section: "checksum",
                offset: expected_len,
                section_len: data.len() as u64,
            });
        }

        let prefix = &data[..checksum_offset as usize];
        let stored_digest = &data[checksum_offset as usize..expected_len as usize];
        let computed_digest = Sha256::digest(prefix);
        if computed_digest.as_slice() != stored_digest {
            return Err(Error::ChecksumMismatch);
        }

        let o = &header.offsets;
        let imports = &data[o.imports as usize..o.exports as usize];
        let exports = &data[o.exports as usize..o.types as usize];
        let types_raw = &data[o.types as usize..o.symbols as usize];
        let symbols_raw = &data[o.symbols as usize..o.abis as usize];
        let abis_raw = &data[o.abis as usize..o.program_sections as usize];
        let program_sections_raw = &data[o.program_sections as usize..o.strings as usize];
        let strings_raw = &data[o.strings as usize..o.linkages as usize];
        let linkages_raw = &data[o.linkages as usize..o.code as usize];
        let code_raw = &data[o.code as usize..checksum_offset as usize];

        if imports.len() % 4 != 0 {
            return Err(Error::MisalignedOffset {
                section: "imports",
                offset: imports.len() as u64,
                align: 4,
            });
        }
        if exports.len() % 8 != 0 {
            return Err(Error::MisalignedOffset {
                section: "exports",
                offset: exports.len() as u64,
                align: 8,
            });
        }

        let cache = SectionCache::new(
            header.architecture,
            imports,
            exports,
            types_raw,
            symbols_raw,
            abis_raw,
            program_sections_raw,
            strings_raw,
            linkages_raw,
            code_raw,
        );

        Ok(Decoder {
            data,
            header,
            cache,
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.header.architecture
    }

    pub fn base_address(&self) -> u64 {
        self.header.base_address
    }

    /// The file's stored trailing digest.
    pub fn digest(&self) -> &'data [u8] {
        let start = self.header.offsets.checksum as usize;
        &self.data[start..start + DIGEST_LEN]
    }

    pub fn package_path(&self) -> Result<&'data [u8]> {
        self.cache.string_at(self.header.package_name_offset as u64)
    }

    /// Decoded header fields and the file's trailing digest (format spec
    /// §6.2).
    pub fn header(&self) -> HeaderInfo<'data> {
        HeaderInfo {
            architecture: self.header.architecture,
            version: self.header.version,
            base_address: self.header.base_address,
            digest: self.digest(),
        }
    }

    pub fn strings(&self) -> Result<Vec<&'data [u8]>> {
        Ok((*self.cache.strings()?).clone())
    }

    pub fn types(&self) -> Result<Vec<Type>> {
        Ok(self.cache.types()?.iter().map(|(_, t)| t.clone()).collect())
    }

    pub fn abis(&self) -> Result<Vec<Abi>> {
        Ok(self.cache.abis()?.iter().map(|(_, a)| a.clone()).collect())
    }

    pub fn program_sections(&self) -> Result<Vec<ProgramSection>> {
        Ok((*self.cache.program_sections()?).clone())
    }

    pub fn symbols(&self) -> Result<Vec<Symbol>> {
        Ok((*self.cache.symbols()?).clone())
    }

    pub fn linkages(&self) -> Result<Vec<Linkage>> {
        Ok((*self.cache.linkages()?).clone())
    }

    pub fn imports(&self) -> Result<Vec<&'data [u8]>> {
        let mut r = Reader::new(self.cache.imports_raw());
        let mut out = Vec::new();
        while r.remaining() > 0 {
            let offset = r.read_u32()? as u64;
            out.push(self.cache.string_at(offset)?);
        }
        Ok(out)
    }

    pub fn exports(&self) -> Result<Vec<Symbol>> {
        let mut r = Reader::new(self.cache.exports_raw());
        let mut out = Vec::new();
        while r.remaining() > 0 {
            let offset = r.read_u64()?;
            out.push(self.cache.symbol_at(offset)?);
        }
        Ok(out)
    }

    fn exported_offsets(&self) -> Result<HashSet<u64>> {
        let mut r = Reader::new(self.cache.exports_raw());
        let mut set = HashSet::new();
        while r.remaining() > 0 {
            set.insert(r.read_u64()?);
        }
        Ok(set)
    }

    /// Reconstructs the full decoded object graph: every function with its
    /// resolved ABI, code, and link list, and every constant with its
    /// typed value (format spec §4.4).
    pub fn package(&self) -> Result<DecodedPackage<'data>> {
        let path_bytes = self.package_path()?;
        let path = decode_utf8(path_bytes);
        let imports = self.imports()?;
        let exported_offsets = self.exported_offsets()?;

        let symbols = self.cache.symbols()?;
        let linkages = self.cache.linkages()?;

        let mut functions = Vec::new();
        let mut constants = Vec::new();

        for (index, symbol) in symbols.iter().enumerate() {
            let offset = index as u64 * crate::symbol::RECORD_SIZE;
            let exported = exported_offsets.contains(&offset);
            let name = decode_utf8(self.cache.string_at(symbol.name_offset)?);

            if symbol.kind == SymKind::Function {
                let (abi_offset, code) = self.cache.function_code(symbol.value)?;
                let abi = self.cache.abi_at(abi_offset as u64)?;
                let section = decode_utf8(self.cache.string_at(symbol.section_name_offset)?);
                let mut links = Vec::new();
                for linkage in linkages.iter() {
                    if linkage.source != offset {
                        continue;
                    }
                    let target_pkg = decode_utf8(self.cache.string_at(linkage.target_pkg)?);
                    let target_sym = decode_utf8(self.cache.string_at(linkage.target_sym)?);
                    links.push(DecodedLink {
                        target: linkage.target_name(&target_pkg, &target_sym),
                        link_type: linkage.link_type,
                        size: linkage.size,
                        offset: linkage.offset,
                        address: linkage.address,
                    });
                }
                functions.push(DecodedFunction {
                    name,
                    section,
                    abi,
                    code,
                    links,
                    exported,
                });
            } else {
                let value = self.decode_constant_value(symbol)?;
                constants.push(DecodedConstant {
                    name,
                    value,
                    exported,
                });
            }
        }

        Ok(DecodedPackage {
            path,
            architecture: self.header.architecture,
            base_address: self.header.base_address,
            imports,
            functions,
            constants,
        })
    }

    fn decode_constant_value(&self, symbol: &Symbol) -> Result<DecodedValue> {
        Ok(match symbol.kind {
            SymKind::BooleanConstant => DecodedValue::Bool(symbol.value != 0),
            SymKind::IntegerConstant => DecodedValue::Int(symbol.value as i64),
            SymKind::BigIntegerConstant => DecodedValue::BigInt {
                negative: false,
                magnitude: self.cache.string_at(symbol.value)?.to_vec(),
            },
            SymKind::BigNegativeIntegerConstant => DecodedValue::BigInt {
                negative: true,
                magnitude: self.cache.string_at(symbol.value)?.to_vec(),
            },
            SymKind::StringConstant => {
                DecodedValue::Str(self.cache.string_at(symbol.value)?.to_vec())
            }
            SymKind::ArrayConstant => {
                DecodedValue::Array(self.cache.string_at(symbol.value)?.to_vec())
            }
            SymKind::Abi => {
                let abi_offset = self.abi_offset_of_type(symbol.type_offset)?;
                DecodedValue::Abi(self.cache.abi_at(abi_offset)?)
            }
            SymKind::Section => {
                let section_offset = self.section_offset_of_type(symbol.type_offset)?;
                DecodedValue::Section(self.cache.program_section_at(section_offset)?)
            }
            SymKind::Function => unreachable!("functions are handled by the caller"),
        })
    }

    fn abi_offset_of_type(&self, type_offset: u64) -> Result<u64> {
        match self.cache.type_at(type_offset)? {
            Type::Abi { abi_offset } => Ok(abi_offset),
            _ => Err(Error::UnrecognisedKind {
                what: "abi constant's type",
                value: type_offset as u32,
            }),
        }
    }

    fn section_offset_of_type(&self, type_offset: u64) -> Result<u64> {
        match self.cache.type_at(type_offset)? {
            Type::Section { section_offset } => Ok(section_offset),
            _ => Err(Error::UnrecognisedKind {
                what: "section constant's type",
                value: type_offset as u32,
            }),
        }
    }
}

fn decode_utf8(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Top-level decode entry point (format spec §6.2): parses `data` and
/// returns the target architecture, the fully resolved package graph, and
/// the file's stored digest.
pub fn decode(data: &[u8]) -> Result<(Architecture, DecodedPackage<'_>, Vec<u8>)> {
    let decoder = Decoder::new(data)?;
    let architecture = decoder.architecture();
    let digest = decoder.digest().to_vec();
    let package = decoder.package()?;
    Ok((architecture, package, digest))
}
