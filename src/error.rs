//! The error taxonomy shared by the encoder and decoder.
//!
//! Every fatal condition in the codec (§7 of the format spec) is its own
//! variant carrying the structured context needed to locate the defect:
//! the section it was found in, the offending offset, and (where relevant)
//! the expected-vs-actual values. Internal invariant violations in the
//! encoder (a symbol-offset lookup that *must* succeed because the symbol
//! was recorded earlier in the same pass) are programming errors and are
//! not represented here; they panic instead, per the severity split in
//! the spec.

use thiserror::Error as ThisError;

/// The result type used throughout this crate.
pub type Result<T> = core::result::Result<T, Error>;

/// A fatal encode or decode failure.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    /// A read ran past the end of the available bytes.
    #[error("truncated read: expected {expected} bytes, only {available} available")]
    Truncated {
        /// Number of bytes the read required.
        expected: usize,
        /// Number of bytes actually available.
        available: usize,
    },

    /// The file's leading magic bytes did not match `"rpkg"` or `"rstd"`.
    #[error("bad magic: expected {expected:#010x}, found {found:#010x}")]
    BadMagic {
        /// The magic value this container kind requires.
        expected: u32,
        /// The magic value actually present.
        found: u32,
    },

    /// The header names an architecture byte this crate does not recognise.
    #[error("unknown architecture byte {0:#04x}")]
    UnknownArchitecture(u8),

    /// The header names a format version byte this crate does not recognise.
    #[error("unknown format version {0}")]
    UnknownVersion(u8),

    /// A section or record offset was not aligned to the required boundary.
    #[error("misaligned offset in {section}: {offset} is not a multiple of {align}")]
    MisalignedOffset {
        /// Name of the section the offset is relative to.
        section: &'static str,
        /// The offending offset.
        offset: u64,
        /// The required alignment.
        align: u64,
    },

    /// An offset or length referenced a position outside its section.
    #[error("offset {offset} out of bounds for {section} (length {section_len})")]
    OutOfBoundsOffset {
        /// Name of the section the offset is relative to.
        section: &'static str,
        /// The offending offset.
        offset: u64,
        /// The length of the section.
        section_len: u64,
    },

    /// A padding region contained a non-zero byte.
    #[error("non-zero padding byte in {section} at offset {offset}")]
    NonZeroPadding {
        /// Name of the section containing the padding.
        section: &'static str,
        /// Offset of the non-zero byte.
        offset: u64,
    },

    /// The trailing SHA-256 digest did not match the recomputed digest.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// A `kind` discriminant byte did not match any known variant.
    #[error("unrecognised {what} kind {value}")]
    UnrecognisedKind {
        /// What was being decoded (e.g. `"type"`, `"symbol"`).
        what: &'static str,
        /// The unrecognised discriminant value.
        value: u32,
    },

    /// A type record referenced a sub-type at or after its own offset.
    #[error("type at offset {at} forward-references type at offset {target}")]
    TypeForwardReference {
        /// Offset of the type record doing the referencing.
        at: u64,
        /// Offset of the type it illegally references.
        target: u64,
    },

    /// An ABI register list referenced a register index outside the
    /// architecture's register table (and, for `unused`, was not the
    /// stack-pointer sentinel).
    #[error("invalid register index {index} for architecture {architecture}")]
    InvalidRegisterIndex {
        /// The offending register index.
        index: u8,
        /// Name of the architecture whose table was consulted.
        architecture: &'static str,
    },

    /// A symbol's `kind` field held a `u32` with no corresponding `SymKind`.
    #[error("invalid symbol kind value {0}")]
    InvalidSymbolKindValue(u32),

    /// A linkage's `offset` or `address` fell outside its source function's
    /// code.
    #[error("linkage {field} {value} exceeds function code length {code_len}")]
    LinkageTargetOutOfRange {
        /// Which linkage field was out of range (`"offset"` or `"address"`).
        field: &'static str,
        /// The offending value.
        value: u64,
        /// Length of the source function's code.
        code_len: u64,
    },

    /// A relocation's `size` field named a bit width this architecture
    /// cannot patch.
    #[error("unsupported relocation width {0} bits")]
    UnsupportedAddressSize(u32),

    /// An encoded string or code blob exceeded the 32-bit length limit a
    /// record's length prefix can hold.
    #[error("{what} of length {len} exceeds the u32 record length limit")]
    RecordTooLarge {
        /// What was being encoded (e.g. `"string"`, `"code blob"`).
        what: &'static str,
        /// The actual length.
        len: usize,
    },

    /// An import's string offset would not fit in the header's `u32` import
    /// slot.
    #[error("import string offset {0} overflows u32")]
    ImportOffsetOverflow(u64),

    /// The input package named an architecture the encoder cannot target.
    #[error("unsupported target architecture {0:?}")]
    UnsupportedArch(crate::arch::Architecture),

    /// The input package's base address string failed to parse as an
    /// integer literal.
    #[error("invalid base address literal {0:?}")]
    InvalidBaseAddress(String),

    /// The input package referenced a basic type or constant kind the
    /// encoder does not know how to classify.
    #[error("unsupported type or constant kind: {0}")]
    UnsupportedType(&'static str),

    /// An internal bookkeeping invariant was violated (a symbol offset
    /// recorded earlier in the same encode pass could not be found). This
    /// indicates a bug in the encoder itself, not a bad input.
    #[error("internal encoder state error: {0}")]
    InternalState(&'static str),

    /// The `rstd` archive directory was not sorted by path, contained a
    /// duplicate path, or was not contiguous.
    #[error("malformed rstd directory: {0}")]
    MalformedArchiveDirectory(&'static str),
}
