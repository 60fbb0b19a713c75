//! Wire-level enumerations shared by [`crate::read`] and [`crate::write`]
//! (format spec §6.5). Their integer assignments are part of the on-disk
//! format: adding a variant is a version bump, not a patch release.

use crate::error::{Error, Result};

/// Discriminant of a [`crate::types`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TypeKind {
    /// The nil/unit type marker.
    None = 1,
    /// A primitive type (see [`BasicKind`]).
    Basic = 2,
    /// A function signature.
    Signature = 3,
    /// A named calling convention.
    Abi = 4,
    /// A named program section.
    Section = 5,
    /// A fixed-length homogeneous array.
    Array = 6,
}

impl TypeKind {
    pub(crate) fn from_u8(value: u8) -> Result<TypeKind> {
        Ok(match value {
            1 => TypeKind::None,
            2 => TypeKind::Basic,
            3 => TypeKind::Signature,
            4 => TypeKind::Abi,
            5 => TypeKind::Section,
            6 => TypeKind::Array,
            other => {
                return Err(Error::UnrecognisedKind {
                    what: "type",
                    value: other as u32,
                })
            }
        })
    }
}

/// A primitive type kind (format spec §3.2, §6.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BasicKind {
    Bool = 1,
    Int = 2,
    Int8 = 3,
    Int16 = 4,
    Int32 = 5,
    Int64 = 6,
    Uint = 7,
    Uint8 = 8,
    Byte = 9,
    Uint16 = 10,
    Uint32 = 11,
    Uint64 = 12,
    Uintptr = 13,
    String = 14,
    UntypedBool = 15,
    UntypedInt = 16,
    UntypedString = 17,
}

impl BasicKind {
    pub(crate) fn from_u8(value: u8) -> Result<BasicKind> {
        Ok(match value {
            1 => BasicKind::Bool,
            2 => BasicKind::Int,
            3 => BasicKind::Int8,
            4 => BasicKind::Int16,
            5 => BasicKind::Int32,
            6 => BasicKind::Int64,
            7 => BasicKind::Uint,
            8 => BasicKind::Uint8,
            9 => BasicKind::Byte,
            10 => BasicKind::Uint16,
            11 => BasicKind::Uint32,
            12 => BasicKind::Uint64,
            13 => BasicKind::Uintptr,
            14 => BasicKind::String,
            15 => BasicKind::UntypedBool,
            16 => BasicKind::UntypedInt,
            17 => BasicKind::UntypedString,
            other => {
                return Err(Error::UnrecognisedKind {
                    what: "basic type",
                    value: other as u32,
                })
            }
        })
    }
}

/// Discriminant of a [`crate::symbol::Symbol`] record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SymKind {
    BooleanConstant = 1,
    IntegerConstant = 2,
    BigIntegerConstant = 3,
    BigNegativeIntegerConstant = 4,
    StringConstant = 5,
    Function = 6,
    Abi = 7,
    Section = 8,
    ArrayConstant = 9,
}

impl SymKind {
    pub(crate) fn from_u32(value: u32) -> Result<SymKind> {
        Ok(match value {
            1 => SymKind::BooleanConstant,
            2 => SymKind::IntegerConstant,
            3 => SymKind::BigIntegerConstant,
            4 => SymKind::BigNegativeIntegerConstant,
            5 => SymKind::StringConstant,
            6 => SymKind::Function,
            7 => SymKind::Abi,
            8 => SymKind::Section,
            9 => SymKind::ArrayConstant,
            other => return Err(Error::InvalidSymbolKindValue(other)),
        })
    }
}

/// Discriminant of a [`crate::linkage::Linkage`] record's relocation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LinkType {
    /// The absolute address of the target is written in.
    FullAddress = 0,
    /// `target - (function_start + address)` is written in.
    RelativeAddress = 1,
}

impl LinkType {
    pub(crate) fn from_u8(value: u8) -> Result<LinkType> {
        Ok(match value {
            0 => LinkType::FullAddress,
            1 => LinkType::RelativeAddress,
            other => {
                return Err(Error::UnrecognisedKind {
                    what: "linkage type",
                    value: other as u32,
                })
            }
        })
    }
}

/// A program section's access permissions, stored as a bitmask in the low 3
/// bits of the section record's permissions byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Permissions(pub u8);

impl Permissions {
    pub const READ: Permissions = Permissions(0b001);
    pub const WRITE: Permissions = Permissions(0b010);
    pub const EXECUTE: Permissions = Permissions(0b100);

    pub fn is_readable(self) -> bool {
        self.0 & Self::READ.0 != 0
    }

    pub fn is_writable(self) -> bool {
        self.0 & Self::WRITE.0 != 0
    }

    pub fn is_executable(self) -> bool {
        self.0 & Self::EXECUTE.0 != 0
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;
    fn bitor(self, rhs: Permissions) -> Permissions {
        Permissions(self.0 | rhs.0)
    }
}

/// Fixed encoded size, in bytes, of a [`crate::section::ProgramSection`]
/// record.
pub const PROGRAM_SECTION_RECORD_SIZE: u64 = 24;

/// Fixed encoded size, in bytes, of a [`crate::symbol::Symbol`] record.
pub const SYMBOL_RECORD_SIZE: u64 = 44;

/// Fixed encoded size, in bytes, of a [`crate::linkage::Linkage`] record.
pub const LINKAGE_RECORD_SIZE: u64 = 36;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_kind_round_trips() {
        for (value, kind) in [
            (1u8, TypeKind::None),
            (2, TypeKind::Basic),
            (3, TypeKind::Signature),
            (4, TypeKind::Abi),
            (5, TypeKind::Section),
            (6, TypeKind::Array),
        ] {
            assert_eq!(TypeKind::from_u8(value).unwrap(), kind);
        }
        assert!(TypeKind::from_u8(0).is_err());
        assert!(TypeKind::from_u8(7).is_err());
    }

    #[test]
    fn sym_kind_round_trips() {
        assert_eq!(SymKind::from_u32(1).unwrap(), SymKind::BooleanConstant);
        assert_eq!(SymKind::from_u32(9).unwrap(), SymKind::ArrayConstant);
        assert!(SymKind::from_u32(0).is_err());
        assert!(SymKind::from_u32(10).is_err());
    }

    #[test]
    fn permissions_bitmask() {
        let p = Permissions::READ | Permissions::EXECUTE;
        assert!(p.is_readable());
        assert!(!p.is_writable());
        assert!(p.is_executable());
    }
}
