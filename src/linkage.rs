//! The linkage (relocation) record (format spec §3.2).

use crate::common::LinkType;
use crate::primitive::{Reader, Writer};
use crate::Result;

/// `source:u64, target-pkg:u64, target-sym:u64, type:u8, size:u24,
/// offset:u32, address:u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Linkage {
    /// Symbols-section offset of the `Function` symbol this linkage patches.
    /// Must be a multiple of [`crate::symbol::RECORD_SIZE`].
    pub source: u64,
    /// Strings-section offset naming the target's package (empty for
    /// builtins).
    pub target_pkg: u64,
    /// Strings-section offset naming the target symbol.
    pub target_sym: u64,
    /// Relocation kind.
    pub link_type: LinkType,
    /// Width in bits of the value to write; must be `<= 64`.
    pub size: u32,
    /// Byte offset within the function's code where the value is patched.
    pub offset: u32,
    /// Byte offset within the function treated as the PC reference for
    /// relative relocations.
    pub address: u32,
}

impl Linkage {
    pub(crate) fn encode(&self, w: &mut Writer) {
        w.write_u64(self.source);
        w.write_u64(self.target_pkg);
        w.write_u64(self.target_sym);
        w.write_u8(self.link_type as u8);
        w.write_u24(self.size);
        w.write_u32(self.offset);
        w.write_u32(self.address);
    }

    pub(crate) fn decode(data: &[u8]) -> Result<Linkage> {
        let mut r = Reader::new(data);
        let source = r.read_u64()?;
        let target_pkg = r.read_u64()?;
        let target_sym = r.read_u64()?;
        let link_type = LinkType::from_u8(r.read_u8()?)?;
        let size = r.read_u24()?;
        let offset = r.read_u32()?;
        let address = r.read_u32()?;
        Ok(Linkage {
            source,
            target_pkg,
            target_sym,
            link_type,
            size,
            offset,
            address,
        })
    }

    /// The external name this linkage targets: `"pkg.sym"`, or just `"sym"`
    /// if the target has no package (a builtin).
    pub fn target_name(&self, target_pkg: &str, target_sym: &str) -> String {
        if target_pkg.is_empty() {
            target_sym.to_string()
        } else {
            format!("{target_pkg}.{target_sym}")
        }
    }
}

/// Fixed per-record size of a linkage entry.
pub const RECORD_SIZE: u64 = crate::common::LINKAGE_RECORD_SIZE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_size_is_36_bytes() {
        let linkage = Linkage {
            source: 44,
            target_pkg: 0,
            target_sym: 4,
            link_type: LinkType::RelativeAddress,
            size: 32,
            offset: 6,
            address: 10,
        };
        let mut w = Writer::new();
        linkage.encode(&mut w);
        assert_eq!(w.len() as u64, RECORD_SIZE);
    }

    #[test]
    fn round_trips() {
        let linkage = Linkage {
            source: 88,
            target_pkg: 4,
            target_sym: 20,
            link_type: LinkType::FullAddress,
            size: 64,
            offset: 2,
            address: 0,
        };
        let mut w = Writer::new();
        linkage.encode(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(Linkage::decode(&bytes).unwrap(), linkage);
    }

    #[test]
    fn target_name_omits_empty_package() {
        let linkage = Linkage {
            source: 0,
            target_pkg: 0,
            target_sym: 0,
            link_type: LinkType::FullAddress,
            size: 64,
            offset: 0,
            address: 0,
        };
        assert_eq!(linkage.target_name("", "nop"), "nop");
        assert_eq!(linkage.target_name("example.com/bar", "nop"), "example.com/bar.nop");
    }
}
