//! The one-pass graph encoder (format spec §4.3).
//!
//! [`Encoder::encode`] is the only public entry point: it owns every section
//! builder for the duration of one call, walks the input [`Package`] exactly
//! once, and only assembles the header once every section's final length is
//! known (§3.4). Determinism — `encode(decode(encode(p))) == encode(p)` — falls
//! out of three properties enforced by the builders in [`builder`]: insertion
//! order equals dedup order, section ordering is fixed, and padding is always
//! zero.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::abi::Abi;
use crate::arch::Architecture;
use crate::common::SymKind;
use crate::error::{Error, Result};
use crate::header::{Header, SectionOffsets};
use crate::linkage::Linkage;
use crate::primitive::Writer;
use crate::section::ProgramSection;
use crate::strings::EMPTY_STRING_OFFSET;
use crate::symbol::Symbol;
use crate::types::{Param, Type};
use crate::DIGEST_LEN;

pub(crate) mod builder;
pub mod package;

pub use package::{Constant, ConstantValue, FunctionDef, LinkDef, Package, PackageType, ProgramSectionDef};

use builder::{
    AbiBuilder, CodeBuilder, LinkageBuilder, ProgramSectionBuilder, StringBuilder, SymbolBuilder,
    TypeBuilder,
};

/// Encodes a [`Package`] into a complete `rpkg` file for one target
/// architecture.
pub struct Encoder {
    architecture: Architecture,
}

/// Name and record offset of a program section already deposited into the
/// program-sections builder, cached so repeated references to the same
/// declared section (from more than one type or constant) don't append a
/// second record.
type SectionCache = HashMap<String, (u64, u64)>;

impl Encoder {
    pub fn new(architecture: Architecture) -> Self {
        Encoder { architecture }
    }

    /// Encodes `package`, returning a complete file: header, every section in
    /// their fixed on-disk order, and a trailing 32-byte SHA-256 digest.
    pub fn encode(&self, package: &Package) -> Result<Vec<u8>> {
        if self.architecture != Architecture::X86_64 {
            return Err(Error::UnsupportedArch(self.architecture));
        }

        let mut strings = StringBuilder::new();
        let mut types = TypeBuilder::new();
        let mut abis = AbiBuilder::new(self.architecture);
        let mut sections = ProgramSectionBuilder::new_seeded();
        let mut symbols = SymbolBuilder::new();
        let mut linkages = LinkageBuilder::new();
        let mut code = CodeBuilder::new();
        let mut section_cache: SectionCache = HashMap::new();

        let base_address = match &package.base_address {
            None => 0u64,
            Some(text) => parse_base_address(text)?,
        };

        // Step 1: seed the nil records (already done by each builder's own
        // constructor), then the package path.
        let path_offset = strings.add(package.path.as_bytes())?;
        if path_offset > u16::MAX as u64 {
            return Err(Error::RecordTooLarge {
                what: "package path string offset",
                len: path_offset as usize,
            });
        }

        // Step 2: imports, before any other string so every offset fits u32.
        let mut import_offsets = Vec::with_capacity(package.imports.len());
        for import in &package.imports {
            let offset = strings.add(import.as_bytes())?;
            if offset > u32::MAX as u64 {
                return Err(Error::ImportOffsetOverflow(offset));
            }
            import_offsets.push(offset as u32);
        }

        // Declared program sections: populate the program-sections section
        // and the header's own name-offset list.
        let mut header_section_name_offsets = Vec::with_capacity(package.program_sections.len());
        for def in &package.program_sections {
            let (_record_offset, name_offset) =
                intern_section(def, &mut strings, &mut sections, &mut section_cache)?;
            if name_offset > u32::MAX as u64 {
                return Err(Error::RecordTooLarge {
                    what: "program section name offset",
                    len: name_offset as usize,
                });
            }
            header_section_name_offsets.push(name_offset as u32);
        }

        let mut symbol_offsets_by_name: HashMap<String, u64> = HashMap::new();
        let mut exported_names: Vec<String> = Vec::new();

        // Step 3: functions, in source order.
        for func in &package.functions {
            let abi_offset = abis.add(&func.abi)?;
            let code_offset = code.add(abi_offset, &func.code)?;
            let type_offset = encode_type(
                &func.signature,
                &mut strings,
                &mut types,
                &mut abis,
                &mut sections,
                &mut section_cache,
            )?;
            let section_name_offset = strings.add(func.section.as_bytes())?;
            let name_offset = strings.add(func.name.as_bytes())?;

            let symbol = Symbol {
                kind: SymKind::Function,
                package_name_offset: path_offset,
                name_offset,
                section_name_offset,
                type_offset,
                value: code_offset,
            };
            let symbol_offset = symbols.add(symbol);
            symbol_offsets_by_name.insert(func.name.clone(), symbol_offset);
            if func.exported {
                exported_names.push(func.name.clone());
            }

            for link in &func.links {
                let (target_pkg, target_sym) = split_target(&link.target);
                let target_pkg_offset = if target_pkg.is_empty() {
                    EMPTY_STRING_OFFSET
                } else {
                    strings.add(target_pkg.as_bytes())?
                };
                let target_sym_offset = strings.add(target_sym.as_bytes())?;
                linkages.add(Linkage {
                    source: symbol_offset,
                    target_pkg: target_pkg_offset,
                    target_sym: target_sym_offset,
                    link_type: link.link_type,
                    size: link.size,
                    offset: link.offset,
                    address: link.address,
                });
            }
        }

        // Step 4: constants (named and anonymous literals alike).
        for constant in &package.constants {
            let type_offset = encode_type(
                &constant.ty,
                &mut strings,
                &mut types,
                &mut abis,
                &mut sections,
                &mut section_cache,
            )?;
            let name_offset = strings.add(constant.name.as_bytes())?;
            let (kind, value) = encode_constant_value(
                &constant.value,
                &mut strings,
                &mut abis,
                &mut sections,
                &mut section_cache,
            )?;

            let symbol = Symbol {
                kind,
                package_name_offset: path_offset,
                name_offset,
                section_name_offset: EMPTY_STRING_OFFSET,
                type_offset,
                value,
            };
            let symbol_offset = symbols.add(symbol);
            if !constant.name.is_empty() {
                symbol_offsets_by_name.insert(constant.name.clone(), symbol_offset);
            }
            if constant.exported {
                exported_names.push(constant.name.clone());
            }
        }

        // Step 5: exports, in the scope's natural (lexicographic) enumeration
        // order.
        exported_names.sort();
        let mut export_offsets = Vec::with_capacity(exported_names.len());
        for name in &exported_names {
            let offset = symbol_offsets_by_name.get(name).copied().ok_or(
                Error::InternalState("exported symbol offset missing from recorded scope"),
            )?;
            export_offsets.push(offset);
        }

        let imports_bytes = {
            let mut w = Writer::new();
            for &offset in &import_offsets {
                w.write_u32(offset);
            }
            w.into_bytes()
        };
        let exports_bytes = {
            let mut w = Writer::new();
            for &offset in &export_offsets {
                w.write_u64(offset);
            }
            w.into_bytes()
        };
        let types_bytes = types.into_bytes();
        let symbols_bytes = symbols.encode();
        let abis_bytes = abis.into_bytes();
        let program_sections_bytes = sections.encode();
        let strings_bytes = strings.into_bytes();
        let linkages_bytes = linkages.encode();
        let code_bytes = code.into_bytes();

        // Step 6: populate the header now that every length is known.
        let header_size = Header::encoded_len(header_section_name_offsets.len()) as u64;
        let imports_offset = header_size;
        let exports_offset = imports_offset + imports_bytes.len() as u64;
        let types_offset = exports_offset + exports_bytes.len() as u64;
        let symbols_offset = types_offset + types_bytes.len() as u64;
        let abis_offset = symbols_offset + symbols_bytes.len() as u64;
        let program_sections_offset = abis_offset + abis_bytes.len() as u64;
        let strings_offset = program_sections_offset + program_sections_bytes.len() as u64;
        let linkages_offset = strings_offset + strings_bytes.len() as u64;
        let code_offset = linkages_offset + linkages_bytes.len() as u64;
        let checksum_offset = code_offset + code_bytes.len() as u64;

        let header = Header {
            architecture: self.architecture,
            version: crate::FORMAT_VERSION,
            package_name_offset: path_offset as u16,
            base_address,
            section_name_offsets: header_section_name_offsets,
            offsets: SectionOffsets {
                imports: imports_offset,
                exports: exports_offset,
                types: types_offset,
                symbols: symbols_offset,
                abis: abis_offset,
                program_sections: program_sections_offset,
                strings: strings_offset,
                linkages: linkages_offset,
                code: code_offset,
                checksum: checksum_offset,
            },
        };

        // Step 7: stream every section in fixed order, then the digest.
        let mut out = header.encode().into_bytes();
        out.extend_from_slice(&imports_bytes);
        out.extend_from_slice(&exports_bytes);
        out.extend_from_slice(&types_bytes);
        out.extend_from_slice(&symbols_bytes);
        out.extend_from_slice(&abis_bytes);
        out.extend_from_slice(&program_sections_bytes);
        out.extend_from_slice(&strings_bytes);
        out.extend_from_slice(&linkages_bytes);
        out.extend_from_slice(&code_bytes);
        debug_assert_eq!(out.len() as u64, checksum_offset);

        let digest = Sha256::digest(&out);
        debug_assert_eq!(digest.len(), DIGEST_LEN);
        out.extend_from_slice(&digest);

        Ok(out)
    }
}

fn intern_section(
    def: &ProgramSectionDef,
    strings: &mut StringBuilder,
    sections: &mut ProgramSectionBuilder,
    cache: &mut SectionCache,
) -> Result<(u64, u64)> {
    if let Some(&pair) = cache.get(&def.name) {
        return Ok(pair);
    }
    let name_offset = strings.add(def.name.as_bytes())?;
    let record_offset = sections.add(ProgramSection {
        name_offset,
        address: def.address,
        permissions: def.permissions,
        fixed_address: def.fixed_address,
    });
    cache.insert(def.name.clone(), (record_offset, name_offset));
    Ok((record_offset, name_offset))
}

fn encode_type(
    ty: &PackageType,
    strings: &mut StringBuilder,
    types: &mut TypeBuilder,
    abis: &mut AbiBuilder,
    sections: &mut ProgramSectionBuilder,
    section_cache: &mut SectionCache,
) -> Result<u64> {
    match ty {
        PackageType::None => types.add(&Type::None),
        PackageType::Basic(kind) => types.add_basic(*kind),
        PackageType::Signature {
            params,
            result,
            display_name,
        } => {
            let mut resolved = Vec::with_capacity(params.len());
            for (name, param_ty) in params {
                let name_offset = strings.add(name.as_bytes())?;
                let type_offset =
                    encode_type(param_ty, strings, types, abis, sections, section_cache)?;
                resolved.push(Param {
                    name_offset,
                    type_offset,
                });
            }
            let result_offset = match result {
                Some(r) => encode_type(r, strings, types, abis, sections, section_cache)?,
                None => 0,
            };
            let display_name_offset = strings.add(display_name.as_bytes())?;
            types.add(&Type::Signature {
                params: resolved,
                result: result_offset,
                display_name: display_name_offset,
            })
        }
        PackageType::Abi(abi) => {
            let abi_offset = abis.add(abi)?;
            types.add(&Type::Abi { abi_offset })
        }
        PackageType::Section(def) => {
            let (section_offset, _name_offset) =
                intern_section(def, strings, sections, section_cache)?;
            types.add(&Type::Section { section_offset })
        }
        PackageType::Array { length, element } => {
            let element_type_offset =
                encode_type(element, strings, types, abis, sections, section_cache)?;
            types.add(&Type::Array {
                length: *length,
                element_type_offset,
            })
        }
    }
}

fn encode_constant_value(
    value: &ConstantValue,
    strings: &mut StringBuilder,
    abis: &mut AbiBuilder,
    sections: &mut ProgramSectionBuilder,
    section_cache: &mut SectionCache,
) -> Result<(SymKind, u64)> {
    match value {
        ConstantValue::Bool(b) => Ok((SymKind::BooleanConstant, *b as u64)),
        ConstantValue::Int(i) => Ok((SymKind::IntegerConstant, *i as u64)),
        ConstantValue::BigInt { negative, magnitude } => {
            if magnitude.is_empty() {
                return Err(Error::UnsupportedType(
                    "big integer constant with empty magnitude (use Int(0) instead)",
                ));
            }
            let offset = strings.add(magnitude)?;
            let kind = if *negative {
                SymKind::BigNegativeIntegerConstant
            } else {
                SymKind::BigIntegerConstant
            };
            Ok((kind, offset))
        }
        ConstantValue::Str(bytes) => Ok((SymKind::StringConstant, strings.add(bytes)?)),
        ConstantValue::Array(bytes) => Ok((SymKind::ArrayConstant, strings.add(bytes)?)),
        ConstantValue::Abi(abi) => {
            abis.add(abi)?;
            Ok((SymKind::Abi, 0))
        }
        ConstantValue::Section(def) => {
            intern_section(def, strings, sections, section_cache)?;
            Ok((SymKind::Section, 0))
        }
    }
}

/// Splits a fully-qualified link target on its final `.`: the part before
/// becomes the target package, the part after the target symbol. A target
/// with no `.` (a builtin) has an empty package.
fn split_target(target: &str) -> (&str, &str) {
    match target.rfind('.') {
        Some(idx) => (&target[..idx], &target[idx + 1..]),
        None => ("", target),
    }
}

/// Parses a base-10 or `0x`-prefixed base-16 integer literal.
fn parse_base_address(text: &str) -> Result<u64> {
    let trimmed = text.trim();
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => trimmed.parse::<u64>(),
    };
    parsed.map_err(|_| Error::InvalidBaseAddress(text.to_string()))
}
