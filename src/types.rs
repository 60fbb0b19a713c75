//! The type-graph record (format spec §3.2).
//!
//! A `Type` value is already fully resolved: every sub-type, ABI, section,
//! or string it mentions is a section-local offset, not a nested value.
//! Building a `Type` from the caller-facing, still-nested input shape is
//! the encoder's job ([`crate::write::package::PackageType`] +
//! [`crate::write::builder::TypeBuilder::add`]); once built, the same
//! `Type` enum is what the decoder reconstructs from the bytes.

use crate::common::TypeKind;
use crate::error::{Error, Result};
use crate::primitive::{Reader, Writer};

/// One parameter of a [`Type::Signature`]: `(name-offset, type-offset)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Param {
    /// Strings-section offset of the parameter's name (may be empty).
    pub name_offset: u64,
    /// Types-section offset of the parameter's type.
    pub type_offset: u64,
}

/// A fully-resolved type-graph node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// The nil/unit type marker, always present at offset 0.
    None,
    /// A primitive type.
    Basic(crate::common::BasicKind),
    /// A function type.
    Signature {
        params: Vec<Param>,
        /// Types-section offset of the result type, or 0 for none.
        result: u64,
        /// Strings-section offset of a human-readable rendering.
        display_name: u64,
    },
    /// A named calling convention.
    Abi {
        /// ABIs-section offset.
        abi_offset: u64,
    },
    /// A named program section.
    Section {
        /// Program-sections-section offset.
        section_offset: u64,
    },
    /// A fixed-length homogeneous array.
    Array {
        length: u64,
        /// Types-section offset of the element type.
        element_type_offset: u64,
    },
}

impl Type {
    pub(crate) fn kind(&self) -> TypeKind {
        match self {
            Type::None => TypeKind::None,
            Type::Basic(_) => TypeKind::Basic,
            Type::Signature { .. } => TypeKind::Signature,
            Type::Abi { .. } => TypeKind::Abi,
            Type::Section { .. } => TypeKind::Section,
            Type::Array { .. } => TypeKind::Array,
        }
    }

    /// Section-local offsets of every sub-type/ABI/section this type
    /// references, used by the encoder to enforce the "sub-types precede
    /// their parent" ordering invariant and by the decoder to validate it.
    pub(crate) fn referenced_type_offsets(&self) -> Vec<u64> {
        match self {
            Type::None | Type::Basic(_) | Type::Abi { .. } | Type::Section { .. } => Vec::new(),
            Type::Signature { params, result, .. } => {
                let mut offsets: Vec<u64> = params.iter().map(|p| p.type_offset).collect();
                if *result != 0 {
                    offsets.push(*result);
                }
                offsets
            }
            Type::Array {
                element_type_offset,
                ..
            } => vec![*element_type_offset],
        }
    }

    pub(crate) fn encode_payload(&self, w: &mut Writer) -> Result<()> {
        match self {
            Type::None => {}
            Type::Basic(kind) => w.write_u8(*kind as u8),
            Type::Signature {
                params,
                result,
                display_name,
            } => {
                if params.len() > u16::MAX as usize {
                    return Err(Error::RecordTooLarge {
                        what: "signature parameter list",
                        len: params.len(),
                    });
                }
                w.write_u16(params.len() as u16);
                for p in params {
                    w.write_u64(p.name_offset);
                    w.write_u64(p.type_offset);
                }
                w.write_u64(*result);
                w.write_u64(*display_name);
            }
            Type::Abi { abi_offset } => w.write_u64(*abi_offset),
            Type::Section { section_offset } => w.write_u64(*section_offset),
            Type::Array {
                length,
                element_type_offset,
            } => {
                w.write_u64(*length);
                w.write_u64(*element_type_offset);
            }
        }
        Ok(())
    }

    pub(crate) fn decode(kind: TypeKind, payload: &[u8]) -> Result<Type> {
        let mut r = Reader::new(payload);
        let ty = match kind {
            TypeKind::None => Type::None,
            TypeKind::Basic => Type::Basic(crate::common::BasicKind::from_u8(r.read_u8()?)?),
            TypeKind::Signature => {
                let count = r.read_u16()? as usize;
                let mut params = Vec::with_capacity(count);
                for _ in 0..count {
                    let name_offset = r.read_u64()?;
                    let type_offset = r.read_u64()?;
                    params.push(Param {
                        name_offset,
                        type_offset,
                    });
                }
                let result = r.read_u64()?;
                let display_name = r.read_u64()?;
                Type::Signature {
                    params,
                    result,
                    display_name,
                }
            }
            TypeKind::Abi => Type::Abi {
                abi_offset: r.read_u64()?,
            },
            TypeKind::Section => Type::Section {
                section_offset: r.read_u64()?,
            },
            TypeKind::Array => {
                let length = r.read_u64()?;
                let element_type_offset = r.read_u64()?;
                Type::Array {
                    length,
                    element_type_offset,
                }
            }
        };
        Ok(ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::BasicKind;

    fn round_trip(ty: &Type) -> Type {
        let mut w = Writer::new();
        ty.encode_payload(&mut w).unwrap();
        let payload = w.into_bytes();
        Type::decode(ty.kind(), &payload).unwrap()
    }

    #[test]
    fn none_round_trips() {
        assert_eq!(round_trip(&Type::None), Type::None);
    }

    #[test]
    fn basic_round_trips() {
        let ty = Type::Basic(BasicKind::Uint16);
        assert_eq!(round_trip(&ty), ty);
    }

    #[test]
    fn signature_round_trips_with_params() {
        let ty = Type::Signature {
            params: vec![
                Param {
                    name_offset: 4,
                    type_offset: 8,
                },
                Param {
                    name_offset: 20,
                    type_offset: 8,
                },
            ],
            result: 8,
            display_name: 40,
        };
        assert_eq!(round_trip(&ty), ty);
    }

    #[test]
    fn array_round_trips() {
        let ty = Type::Array {
            length: 10,
            element_type_offset: 8,
        };
        assert_eq!(round_trip(&ty), ty);
    }

    #[test]
    fn referenced_offsets_cover_signature_params_and_result() {
        let ty = Type::Signature {
            params: vec![Param {
                name_offset: 0,
                type_offset: 8,
            }],
            result: 16,
            display_name: 0,
        };
        assert_eq!(ty.referenced_type_offsets(), vec![8, 16]);
    }

    #[test]
    fn referenced_offsets_empty_for_leaf_types() {
        assert!(Type::None.referenced_type_offsets().is_empty());
        assert!(Type::Basic(BasicKind::Bool)
            .referenced_type_offsets()
            .is_empty());
    }
}
