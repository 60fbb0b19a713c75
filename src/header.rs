//! The file header (format spec §3.3).
//!
//! Every offset the header stores is a file-local absolute offset; every
//! other section stores only section-local offsets (§9 "section-local vs
//! file-local offsets"). The header is always built last, once every
//! section's final length is known (§3.4, §4.3 step 6).

use crate::arch::Architecture;
use crate::error::{Error, Result};
use crate::primitive::{Reader, Writer};
use crate::{ALIGN, FORMAT_VERSION, RPKG_MAGIC};

/// Absolute file offsets of every section after the header, in on-disk
/// order. `checksum` is where the trailing SHA-256 digest begins; the file
/// ends at `checksum + DIGEST_LEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct SectionOffsets {
    pub imports: u64,
    pub exports: u64,
    pub types: u64,
    pub symbols: u64,
    pub abis: u64,
    pub program_sections: u64,
    pub strings: u64,
    pub linkages: u64,
    pub code: u64,
    pub checksum: u64,
}

impl SectionOffsets {
    /// Returns the ten offsets in on-disk order, paired with a name used
    /// only for error messages.
    fn ordered(&self) -> [(&'static str, u64); 10] {
        [
            ("imports", self.imports),
            ("exports", self.exports),
            ("types", self.types),
            ("symbols", self.symbols),
            ("abis", self.abis),
            ("program-sections", self.program_sections),
            ("strings", self.strings),
            ("linkages", self.linkages),
            ("code", self.code),
            ("checksum", self.checksum),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Header {
    pub architecture: Architecture,
    pub version: u8,
    pub package_name_offset: u16,
    pub base_address: u64,
    /// Strings-section offsets naming every declared program section.
    pub section_name_offsets: Vec<u32>,
    pub offsets: SectionOffsets,
}

impl Header {
    /// Encoded size in bytes of a header with `num_sections` declared
    /// program sections.
    pub(crate) fn encoded_len(num_sections: usize) -> usize {
        // magic + arch + version + pkg_name_offset + base_address + num_sections
        4 + 1 + 1 + 2 + 8 + 4
            // one u32 per declared section name
            + num_sections * 4
            // ten u64 file offsets
            + 10 * 8
    }

    pub(crate) fn encode(&self) -> Writer {
        let mut w = Writer::new();
        w.write_u32(RPKG_MAGIC);
        w.write_u8(self.architecture.to_byte());
        w.write_u8(self.version);
        w.write_u16(self.package_name_offset);
        w.write_u64(self.base_address);
        w.write_u32(self.section_name_offsets.len() as u32);
        for &offset in &self.section_name_offsets {
            w.write_u32(offset);
        }
        for (_, offset) in self.offsets.ordered() {
            w.write_u64(offset);
        }
        debug_assert_eq!(w.len(), Self::encoded_len(self.section_name_offsets.len()));
        w
    }

    pub(crate) fn decode(data: &[u8]) -> Result<Header> {
        let mut r = Reader::new(data);
        let magic = r.read_u32()?;
        if magic != RPKG_MAGIC {
            return Err(Error::BadMagic {
                expected: RPKG_MAGIC,
                found: magic,
            });
        }
        let architecture = Architecture::from_byte(r.read_u8()?)?;
        let version = r.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(Error::UnknownVersion(version));
        }
        let package_name_offset = r.read_u16()?;
        let base_address = r.read_u64()?;
        let num_sections = r.read_u32()? as usize;
        let mut section_name_offsets = Vec::with_capacity(num_sections);
        for _ in 0..num_sections {
            section_name_offsets.push(r.read_u32()?);
        }

        let mut offsets = SectionOffsets::default();
        offsets.imports = r.read_u64()?;
        offsets.exports = r.read_u64()?;
        offsets.types = r.read_u64()?;
        offsets.symbols = r.read_u64()?;
        offsets.abis = r.read_u64()?;
        offsets.program_sections = r.read_u64()?;
        offsets.strings = r.read_u64()?;
        offsets.linkages = r.read_u64()?;
        offsets.code = r.read_u64()?;
        offsets.checksum = r.read_u64()?;

        let header = Header {
            architecture,
            version,
            package_name_offset,
            base_address,
            section_name_offsets,
            offsets,
        };

        let header_size = Self::encoded_len(header.section_name_offsets.len()) as u64;
        if header.offsets.imports != header_size {
            return Err(Error::MisalignedOffset {
                section: "imports",
                offset: header.offsets.imports,
                align: header_size,
            });
        }

        let mut previous = header_size;
        for (name, offset) in header.offsets.ordered() {
            if offset < previous {
                return Err(Error::OutOfBoundsOffset {
                    section: name,
                    offset,
                    section_len: previous,
                });
            }
            if name != "checksum" && offset % ALIGN as u64 != 0 {
                return Err(Error::MisalignedOffset {
                    section: name,
                    offset,
                    align: ALIGN as u64,
                });
            }
            previous = offset;
        }

        Ok(header)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_offsets() -> SectionOffsets {
        SectionOffsets {
            imports: 100,
            exports: 104,
            types: 108,
            symbols: 112,
            abis: 156,
            program_sections: 160,
            strings: 184,
            linkages: 200,
            code: 236,
            checksum: 240,
        }
    }

    #[test]
    fn round_trips_with_no_declared_sections() {
        let header = Header {
            architecture: Architecture::X86_64,
            version: FORMAT_VERSION,
            package_name_offset: 4,
            base_address: 0,
            section_name_offsets: vec![],
            offsets: sample_offsets(),
        };
        let bytes = header.encode().into_bytes();
        assert_eq!(bytes.len(), Header::encoded_len(0));
        let decoded = Header::decode(&bytes).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn s1_byte_prefix_matches_spec() {
        let header = Header {
            architecture: Architecture::X86_64,
            version: FORMAT_VERSION,
            package_name_offset: 4,
            base_address: 0,
            section_name_offsets: vec![],
            offsets: sample_offsets(),
        };
        let bytes = header.encode().into_bytes();
        assert_eq!(&bytes[0..8], &[0x72, 0x70, 0x6b, 0x67, 0x01, 0x01, 0x00, 0x04]);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = Header {
            architecture: Architecture::X86_64,
            version: FORMAT_VERSION,
            package_name_offset: 0,
            base_address: 0,
            section_name_offsets: vec![],
            offsets: sample_offsets(),
        }
        .encode()
        .into_bytes();
        bytes[0] = 0;
        assert!(matches!(
            Header::decode(&bytes).unwrap_err(),
            Error::BadMagic { .. }
        ));
    }

    #[test]
    fn rejects_imports_offset_not_equal_to_header_size() {
        let mut offsets = sample_offsets();
        offsets.imports += 4;
        offsets.exports += 4;
        let header = Header {
            architecture: Architecture::X86_64,
            version: FORMAT_VERSION,
            package_name_offset: 0,
            base_address: 0,
            section_name_offsets: vec![],
            offsets,
        };
        let bytes = header.encode().into_bytes();
        assert!(Header::decode(&bytes).is_err());
    }

    #[test]
    fn rejects_non_monotonic_offsets() {
        let mut offsets = sample_offsets();
        offsets.exports = offsets.imports - 4;
        let header = Header {
            architecture: Architecture::X86_64,
            version: FORMAT_VERSION,
            package_name_offset: 0,
            base_address: 0,
            section_name_offsets: vec![],
            offsets,
        };
        let bytes = header.encode().into_bytes();
        assert!(Header::decode(&bytes).is_err());
    }
}
