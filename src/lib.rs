//! Codec for the Ruse compiled-package object format (`rpkg`) and its
//! sibling standard-library archive format (`rstd`).
//!
//! An `rpkg` file is a self-describing, content-checksummed binary container
//! for one compiled source package: its exported symbols, its type graph,
//! its constant data, its emitted machine code, and the link-time
//! relocations that stitch that code to symbols in other packages. An
//! `rstd` file bundles many `rpkg` blobs into one archive with a sorted,
//! contiguous directory.
//!
//! The crate is split the way a read/write pair usually is in this kind of
//! codec: [`write`] owns a one-shot, buffer-accumulating encoder; [`read`]
//! owns a borrowing, lazily-caching decoder over an already-resident byte
//! slice. Both sides share the wire-level vocabulary in [`common`],
//! [`abi`], [`section`], [`symbol`], [`linkage`], [`strings`], and [`arch`].
//! [`placement`] sits beside them as a pure function of an ABI and an
//! architecture, turning value byte-sizes into concrete call-time locations
//! for a caller such as an IR compiler; it is not consulted by encoding or
//! decoding themselves.
//!
//! Encoding and decoding are synchronous and single-threaded: an
//! [`write::Encoder`] owns its buffers exclusively until
//! [`write::Encoder::encode`] returns a complete file, and a
//! [`read::Decoder`] borrows its input slice for its whole lifetime and
//! never mutates it.

mod primitive;
mod header;

pub mod error;
pub use error::{Error, Result};

pub mod arch;
pub mod common;

pub mod abi;
pub mod linkage;
pub mod placement;
pub mod section;
pub mod strings;
pub mod symbol;
pub mod types;

pub mod read;
pub mod write;

pub mod rstd;

pub use arch::Architecture;
pub use common::{BasicKind, LinkType, Permissions, SymKind, TypeKind};

/// Magic bytes at the start of every `rpkg` file: ASCII `"rpkg"`.
pub const RPKG_MAGIC: u32 = 0x7270_6b67;

/// Magic bytes at the start of every `rstd` archive: ASCII `"rstd"`.
pub const RSTD_MAGIC: u32 = 0x7273_7464;

/// The only container format version this crate understands.
pub const FORMAT_VERSION: u8 = 1;

/// Width in bytes of the trailing SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

/// All section-local offsets, record lengths, and alignments in this format
/// are multiples of this value.
pub const ALIGN: usize = 4;
