//! Target-architecture descriptors and their register tables (format spec
//! §6.4, §10.2).
//!
//! ABIs (§4.5/§4.6) reference registers by their position in a
//! compile-time-known, per-architecture table. Changing that table across
//! toolchain versions would silently corrupt previously-encoded ABIs, which
//! is why the architecture byte in the header is the versioning lever: bump
//! it together with any change to a table here.

use crate::error::{Error, Result};

/// A single architecture register, named for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register(pub &'static str);

/// The sentinel value in an ABI's `unused` list denoting the stack pointer,
/// rather than an index into the architecture's register table.
pub const STACK_POINTER_SENTINEL: u8 = 255;

/// A target instruction set architecture.
///
/// This is a closed enumeration: the header's `0 = invalid` byte has no
/// corresponding variant and is always rejected on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Architecture {
    /// 64-bit x86 (AMD64 / Intel 64).
    X86_64,
}

impl Architecture {
    /// Decodes the single-byte architecture identifier from a header.
    pub fn from_byte(byte: u8) -> Result<Architecture> {
        match byte {
            1 => Ok(Architecture::X86_64),
            other => Err(Error::UnknownArchitecture(other)),
        }
    }

    /// Encodes this architecture as its single-byte header identifier.
    pub fn to_byte(self) -> u8 {
        match self {
            Architecture::X86_64 => 1,
        }
    }

    /// A short, stable name suitable for error messages.
    pub fn name(self) -> &'static str {
        match self {
            Architecture::X86_64 => "x86-64",
        }
    }

    /// Pointer width in bytes for this architecture.
    pub fn word_size(self) -> usize {
        match self {
            Architecture::X86_64 => 8,
        }
    }

    /// The fixed, ordered register table ABIs index into by position.
    ///
    /// This is not an exhaustive model of the ISA's registers: it is the
    /// subset the toolchain's calling conventions actually allocate from.
    pub fn abi_registers(self) -> &'static [Register] {
        match self {
            Architecture::X86_64 => &X86_64_REGISTERS,
        }
    }

    /// The register used as the stack pointer on this architecture.
    pub fn stack_pointer(self) -> Register {
        match self {
            Architecture::X86_64 => X86_64_REGISTERS[4],
        }
    }

    /// Whether the call stack grows toward lower addresses on this
    /// architecture (§4.6: governs the sign of computed stack offsets).
    pub fn stack_grows_down(self) -> bool {
        match self {
            Architecture::X86_64 => true,
        }
    }

    /// Looks up a register by its position in [`Architecture::abi_registers`].
    pub fn register(self, index: u8) -> Result<Register> {
        self.abi_registers()
            .get(index as usize)
            .copied()
            .ok_or(Error::InvalidRegisterIndex {
                index,
                architecture: self.name(),
            })
    }

    /// Finds the table index of `register`, if it is present.
    pub fn register_index(self, register: Register) -> Option<u8> {
        self.abi_registers()
            .iter()
            .position(|&r| r == register)
            .map(|i| i as u8)
    }
}

/// The general-purpose integer registers x86-64 calling conventions in this
/// toolchain allocate from, indexed by position (index 4 is `RSP`, the
/// architecture's stack pointer).
static X86_64_REGISTERS: [Register; 16] = [
    Register("RAX"),
    Register("RCX"),
    Register("RDX"),
    Register("RBX"),
    Register("RSP"),
    Register("RBP"),
    Register("RSI"),
    Register("RDI"),
    Register("R8"),
    Register("R9"),
    Register("R10"),
    Register("R11"),
    Register("R12"),
    Register("R13"),
    Register("R14"),
    Register("R15"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_round_trip() {
        assert_eq!(Architecture::from_byte(1).unwrap(), Architecture::X86_64);
        assert_eq!(Architecture::X86_64.to_byte(), 1);
    }

    #[test]
    fn unknown_byte_rejected() {
        assert_eq!(
            Architecture::from_byte(0).unwrap_err(),
            Error::UnknownArchitecture(0)
        );
        assert_eq!(
            Architecture::from_byte(2).unwrap_err(),
            Error::UnknownArchitecture(2)
        );
    }

    #[test]
    fn stack_pointer_is_in_the_table_at_its_own_index() {
        let arch = Architecture::X86_64;
        let sp = arch.stack_pointer();
        assert_eq!(sp, Register("RSP"));
        assert_eq!(arch.register_index(sp), Some(4));
    }

    #[test]
    fn register_lookup_matches_index() {
        let arch = Architecture::X86_64;
        assert_eq!(arch.register(0).unwrap(), Register("RAX"));
        assert_eq!(arch.register(15).unwrap(), Register("R15"));
        assert!(arch.register(16).is_err());
    }
}
