//! The `rstd` archive codec (format spec §4.7): bundles many `rpkg` blobs
//! into one standard-library archive with a sorted, contiguous directory.
//!
//! Unlike `rpkg`, an archive carries no content-addressed sections of its
//! own — it is a flat directory plus concatenated opaque blobs, so encode
//! and decode are both single straight-line passes rather than the
//! multi-section bookkeeping `write`/`read` need.

use crate::arch::Architecture;
use crate::error::{Error, Result};
use crate::primitive::{Reader, Writer};
use crate::{ALIGN, FORMAT_VERSION, RSTD_MAGIC};

/// One archive directory entry: a member package's path and where its
/// `rpkg` blob lives in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    /// File-local byte offset where this member's `rpkg` blob begins.
    pub data_offset: u64,
    /// Length in bytes of this member's `rpkg` blob.
    pub data_len: u64,
}

/// One member to encode into an archive: a path and its already-encoded
/// `rpkg` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    pub path: String,
    pub data: Vec<u8>,
}

/// Encodes a sorted-by-path `rstd` archive from a set of already-encoded
/// `rpkg` member blobs.
pub struct ArchiveEncoder {
    architecture: Architecture,
}

impl ArchiveEncoder {
    pub fn new(architecture: Architecture) -> Self {
        ArchiveEncoder { architecture }
    }

    /// Encodes `members` into a complete `rstd` archive. Members are sorted
    /// by path; a duplicate path is rejected.
    pub fn encode(&self, members: &[ArchiveMember]) -> Result<Vec<u8>> {
        let mut sorted: Vec<&ArchiveMember> = members.iter().collect();
        sorted.sort_by(|a, b| a.path.cmp(&b.path));
        for pair in sorted.windows(2) {
            if pair[0].path == pair[1].path {
                return Err(Error::MalformedArchiveDirectory(
                    "duplicate member path in archive input",
                ));
            }
        }

        let mut entry_records: Vec<(u16, Vec<u8>)> = Vec::with_capacity(sorted.len());
        for member in &sorted {
            if member.path.len() > u16::MAX as usize {
                return Err(Error::RecordTooLarge {
                    what: "archive member path",
                    len: member.path.len(),
                });
            }
            entry_records.push((member.path.len() as u16, member.path.as_bytes().to_vec()));
        }

        let directory_len = Self::directory_len(&entry_records);
        let header_len = Self::header_len();
        let mut data_offset = (header_len + directory_len) as u64;

        let mut offsets = Vec::with_capacity(sorted.len());
        for member in &sorted {
            offsets.push(data_offset);
            data_offset += member.data.len() as u64;
        }

        let mut w = Writer::new();
        w.write_u32(RSTD_MAGIC);
        w.write_u8(self.architecture.to_byte());
        w.write_u8(FORMAT_VERSION);
        if sorted.len() > u16::MAX as usize {
            return Err(Error::RecordTooLarge {
                what: "archive member count",
                len: sorted.len(),
            });
        }
        w.write_u16(sorted.len() as u16);

        for (member, &offset) in sorted.iter().zip(&offsets) {
            w.write_u16(member.path.len() as u16);
            w.write_bytes(member.path.as_bytes());
            w.pad_to(ALIGN * 2); // pad the path to an 8-byte boundary
            w.write_u64(offset);
            w.write_u64(member.data.len() as u64);
        }

        debug_assert_eq!(w.len(), header_len + directory_len);

        let mut out = w.into_bytes();
        for member in &sorted {
            out.extend_from_slice(&member.data);
        }
        Ok(out)
    }

    fn header_len() -> usize {
        4 + 1 + 1 + 2
    }

    fn directory_len(entries: &[(u16, Vec<u8>)]) -> usize {
        entries
            .iter()
            .map(|(_, path)| crate::primitive::align_up(2 + path.len(), ALIGN * 2) + 16)
            .sum()
    }
}

/// A decoded, validated view over one `rstd` archive.
pub struct ArchiveDecoder<'data> {
    data: &'data [u8],
    architecture: Architecture,
    version: u8,
    entries: Vec<ArchiveEntry>,
}

impl<'data> ArchiveDecoder<'data> {
    /// Parses and validates `data` as a complete `rstd` archive (format spec
    /// §4.7 decode checks).
    pub fn new(data: &'data [u8]) -> Result<ArchiveDecoder<'data>> {
        let mut r = Reader::new(data);
        let magic = r.read_u32()?;
        if magic != RSTD_MAGIC {
            return Err(Error::BadMagic {
                expected: RSTD_MAGIC,
                found: magic,
            });
        }
        let architecture = Architecture::from_byte(r.read_u8()?)?;
        let version = r.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(Error::UnknownVersion(version));
        }
        let num_packages = r.read_u16()?;
        if num_packages == 0 {
            return Err(Error::MalformedArchiveDirectory(
                "archive declares zero packages",
            ));
        }

        let mut entries = Vec::with_capacity(num_packages as usize);
        for _ in 0..num_packages {
            let path_len = r.read_u16()? as usize;
            let path_bytes = r.read_bytes(path_len)?.to_vec();
            let path = String::from_utf8(path_bytes).map_err(|_| {
                Error::MalformedArchiveDirectory("member path is not valid utf-8")
            })?;

            let unpadded = 2 + path_len;
            let padded = crate::primitive::align_up(unpadded, ALIGN * 2);
            let pad_len = padded - unpadded;
            let padding = r.read_bytes(pad_len)?;
            if padding.iter().any(|&b| b != 0) {
                return Err(Error::NonZeroPadding {
                    section: "rstd directory",
                    offset: r.position() as u64,
                });
            }

            let data_offset = r.read_u64()?;
            let data_len = r.read_u64()?;
            entries.push(ArchiveEntry {
                path,
                data_offset,
                data_len,
            });
        }

        let directory_end = r.position() as u64;
        let mut expected_offset = directory_end;
        for (index, entry) in entries.iter().enumerate() {
            if entry.data_offset != expected_offset {
                return Err(Error::MalformedArchiveDirectory(if index == 0 {
                    "first entry's offset does not equal the directory end"
                } else {
                    "archive directory is not contiguous"
                }));
            }
            expected_offset += entry.data_len;
        }
        if expected_offset != data.len() as u64 {
            return Err(Error::MalformedArchiveDirectory(
                "last entry's offset + length does not equal the file size",
            ));
        }

        for pair in entries.windows(2) {
            if pair[0].path >= pair[1].path {
                return Err(Error::MalformedArchiveDirectory(
                    "archive directory is not sorted by path, or contains a duplicate",
                ));
            }
        }

        Ok(ArchiveDecoder {
            data,
            architecture,
            version,
            entries,
        })
    }

    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// The archive's directory, sorted by path.
    pub fn list(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// The raw `rpkg` byte blob for `entry` (typically one previously
    /// returned by [`ArchiveDecoder::list`]).
    pub fn extract(&self, entry: &ArchiveEntry) -> &'data [u8] {
        let start = entry.data_offset as usize;
        let end = start + entry.data_len as usize;
        &self.data[start..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(path: &str, data: &[u8]) -> ArchiveMember {
        ArchiveMember {
            path: path.to_string(),
            data: data.to_vec(),
        }
    }

    #[test]
    fn round_trips_three_packages_sorted_and_contiguous() {
        let members = vec![
            member("c", b"third-package-bytes"),
            member("a", b"first"),
            member("b", b"second-package"),
        ];
        let encoder = ArchiveEncoder::new(Architecture::X86_64);
        let encoded = encoder.encode(&members).unwrap();

        let decoder = ArchiveDecoder::new(&encoded).unwrap();
        let list = decoder.list();
        assert_eq!(list.len(), 3);
        assert_eq!(
            list.iter().map(|e| e.path.as_str()).collect::<Vec<_>>(),
            vec!["a", "b", "c"]
        );

        for pair in list.windows(2) {
            assert_eq!(pair[0].data_offset + pair[0].data_len, pair[1].data_offset);
        }

        assert_eq!(decoder.extract(&list[0]), b"first");
        assert_eq!(decoder.extract(&list[1]), b"second-package");
        assert_eq!(decoder.extract(&list[2]), b"third-package-bytes");
    }

    #[test]
    fn rejects_zero_packages() {
        let mut w = Writer::new();
        w.write_u32(RSTD_MAGIC);
        w.write_u8(Architecture::X86_64.to_byte());
        w.write_u8(FORMAT_VERSION);
        w.write_u16(0);
        let bytes = w.into_bytes();
        assert!(matches!(
            ArchiveDecoder::new(&bytes).unwrap_err(),
            Error::MalformedArchiveDirectory(_)
        ));
    }

    #[test]
    fn rejects_duplicate_member_path() {
        let members = vec![member("dup", b"one"), member("dup", b"two")];
        let encoder = ArchiveEncoder::new(Architecture::X86_64);
        assert!(encoder.encode(&members).is_err());
    }

    #[test]
    fn rejects_bad_magic() {
        let members = vec![member("a", b"x")];
        let encoder = ArchiveEncoder::new(Architecture::X86_64);
        let mut bytes = encoder.encode(&members).unwrap();
        bytes[0] = 0;
        assert!(matches!(
            ArchiveDecoder::new(&bytes).unwrap_err(),
            Error::BadMagic { .. }
        ));
    }

    #[test]
    fn rejects_truncated_archive() {
        let members = vec![member("a", b"hello"), member("b", b"world")];
        let encoder = ArchiveEncoder::new(Architecture::X86_64);
        let bytes = encoder.encode(&members).unwrap();
        let truncated = &bytes[..bytes.len() - 1];
        assert!(ArchiveDecoder::new(truncated).is_err());
    }

    #[test]
    fn single_member_archive_round_trips() {
        let members = vec![member("solo", b"only-one-here")];
        let encoder = ArchiveEncoder::new(Architecture::X86_64);
        let encoded = encoder.encode(&members).unwrap();
        let decoder = ArchiveDecoder::new(&encoded).unwrap();
        assert_eq!(decoder.list().len(), 1);
        assert_eq!(decoder.extract(&decoder.list()[0]), b"only-one-here");
    }
}
