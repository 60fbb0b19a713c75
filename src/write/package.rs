//! The encoder's input interface (format spec §6.1).
//!
//! The real source-language parser, type checker, and IR compiler that
//! produce a compiled package are out of scope for this crate (§1); this
//! module defines the minimal, self-contained shape the encoder actually
//! needs from whatever upstream component hands it a package to encode.
//! Concretely that means a still-nested [`PackageType`] tree (unlike
//! [`crate::types::Type`], which is already offset-resolved) and plain,
//! ordered lists rather than a live scope object — the caller is expected
//! to have already walked its own scope in "natural enumeration order"
//! before handing us [`Package::exports`].

use crate::abi::Abi;
use crate::common::BasicKind;

/// A declared program section, by value (not yet interned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSectionDef {
    pub name: String,
    pub address: u64,
    pub permissions: crate::common::Permissions,
    pub fixed_address: bool,
}

/// A still-nested type, as handed to the encoder by the type checker.
///
/// This mirrors [`crate::types::Type`] shape-for-shape except that
/// sub-types are owned values rather than already-allocated offsets; the
/// encoder's job is exactly that flattening (§4.3 step 1, §9 "forward
/// references in the type graph").
#[derive(Debug, Clone, PartialEq)]
pub enum PackageType {
    None,
    Basic(BasicKind),
    Signature {
        params: Vec<(String, PackageType)>,
        result: Option<Box<PackageType>>,
        display_name: String,
    },
    Abi(Abi),
    Section(ProgramSectionDef),
    Array {
        length: u64,
        element: Box<PackageType>,
    },
}

/// A constant's value, tagged by the shape the encoder must classify into
/// one of the `SymKind` variants (§3.2, §4.3 step 4).
#[derive(Debug, Clone, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    /// A value that fits in a 64-bit two's-complement integer.
    Int(i64),
    /// An arbitrary-precision integer, stored as sign + big-endian
    /// magnitude. A magnitude of `[]` is not meaningful and is rejected
    /// by the encoder (use `Int(0)` instead).
    BigInt { negative: bool, magnitude: Vec<u8> },
    Str(Vec<u8>),
    /// An already-serialised array payload, opaque to this crate (the
    /// element encoding is the external type-checker's concern; see §1).
    Array(Vec<u8>),
    /// A named calling convention exported as a value in its own right
    /// (`SymKind::Abi`).
    Abi(Abi),
    /// A named program section exported as a value in its own right
    /// (`SymKind::Section`).
    Section(ProgramSectionDef),
}

/// A named constant or literal (§4.3 step 4). Literals use an empty name
/// and `exported = false`.
#[derive(Debug, Clone, PartialEq)]
pub struct Constant {
    pub name: String,
    pub ty: PackageType,
    pub value: ConstantValue,
    pub exported: bool,
}

/// A single link-time relocation attached to a function (§3.2 "Linkage").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkDef {
    /// The relocation's fully-qualified target, e.g. `"example.com/bar.nop"`,
    /// or just `"nop"` for a builtin with no package prefix. Split on the
    /// final `.` by the encoder (§4.3 step 3).
    pub target: String,
    pub link_type: crate::common::LinkType,
    /// Width in bits of the value to write; must be `<= 64`.
    pub size: u32,
    /// Byte offset within this function's code where the value is patched.
    pub offset: u32,
    /// Byte offset within this function treated as the PC reference for
    /// relative relocations.
    pub address: u32,
}

/// A compiled function: its signature, ABI, emitted code, and outgoing
/// relocations.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    /// Name of the program section this function's code lives in.
    pub section: String,
    pub signature: PackageType,
    pub abi: Abi,
    pub links: Vec<LinkDef>,
    /// Opaque machine code, already emitted by an external, architecture-
    /// specific encoder (§1, out of scope).
    pub code: Vec<u8>,
    pub exported: bool,
}

/// The full input to the encoder (§6.1).
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub path: String,
    pub name: String,
    /// Load address of a main-package executable, parsed from a base-10 or
    /// base-16 integer literal; `None` for library packages (encoded as 0).
    pub base_address: Option<String>,
    /// Ordered list of imported package paths.
    pub imports: Vec<String>,
    pub program_sections: Vec<ProgramSectionDef>,
    pub functions: Vec<FunctionDef>,
    pub constants: Vec<Constant>,
}

impl Package {
    /// A minimal package with no imports, exports, constants, or functions.
    pub fn empty(path: impl Into<String>, name: impl Into<String>) -> Package {
        Package {
            path: path.into(),
            name: name.into(),
            base_address: None,
            imports: Vec::new(),
            program_sections: Vec::new(),
            functions: Vec::new(),
            constants: Vec::new(),
        }
    }
}
