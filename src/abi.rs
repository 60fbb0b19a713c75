//! Calling-convention descriptors and their validation (format spec §3.2,
//! §4.5).
//!
//! An ABI references architecture registers by position in
//! [`crate::arch::Architecture::abi_registers`]; the sentinel
//! [`crate::arch::STACK_POINTER_SENTINEL`] in its `unused` list denotes the
//! stack pointer rather than a table index.

use std::collections::HashSet;

use crate::arch::{Architecture, STACK_POINTER_SENTINEL};
use crate::error::{Error, Result};
use crate::primitive::{Reader, Writer};

/// A calling convention: which registers carry parameters, the result,
/// scratch values, and which are left untouched by the callee.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Abi {
    /// When set, stack slots for a call are laid out so earlier arguments
    /// sit at higher offsets; otherwise earlier arguments occupy lower
    /// offsets (§4.6).
    pub inverted_stack: bool,
    /// Registers carrying parameters, in allocation order.
    pub params: Vec<u8>,
    /// Registers carrying the result, in allocation order.
    pub result: Vec<u8>,
    /// Registers the callee may clobber.
    pub scratch: Vec<u8>,
    /// Registers this ABI does not touch. May contain
    /// [`STACK_POINTER_SENTINEL`] to denote the stack pointer.
    pub unused: Vec<u8>,
}

impl Abi {
    /// The nil ABI, always present at offset 0 (zero-length payload).
    pub const NIL: Abi = Abi {
        inverted_stack: false,
        params: Vec::new(),
        result: Vec::new(),
        scratch: Vec::new(),
        unused: Vec::new(),
    };

    fn is_nil(&self) -> bool {
        self.params.is_empty()
            && self.result.is_empty()
            && self.scratch.is_empty()
            && self.unused.is_empty()
            && !self.inverted_stack
    }

    /// Encodes this ABI's payload (everything after the record's own
    /// `length:u32` prefix is not written here; see
    /// [`crate::write::builder::AbiBuilder`] for the full record framing).
    pub(crate) fn encode_payload(&self, w: &mut Writer) {
        if self.is_nil() {
            return;
        }
        w.write_u8(self.inverted_stack as u8);
        w.write_blob8(&self.params);
        w.write_blob8(&self.result);
        w.write_blob8(&self.scratch);
        w.write_blob8(&self.unused);
    }

    /// Decodes an ABI from its payload bytes (length prefix already
    /// stripped by the caller). An empty payload is the nil ABI.
    pub(crate) fn decode_payload(payload: &[u8]) -> Result<Abi> {
        if payload.is_empty() {
            return Ok(Abi::NIL);
        }
        if payload.len() < 5 {
            return Err(Error::RecordTooLarge {
                what: "abi (too short to be non-nil)",
                len: payload.len(),
            });
        }
        let mut r = Reader::new(payload);
        let inverted_byte = r.read_u8()?;
        let inverted_stack = match inverted_byte {
            0 => false,
            1 => true,
            other => {
                return Err(Error::UnrecognisedKind {
                    what: "invertedStack flag",
                    value: other as u32,
                })
            }
        };
        let params = r.read_blob8()?.to_vec();
        let result = r.read_blob8()?.to_vec();
        let scratch = r.read_blob8()?.to_vec();
        let unused = r.read_blob8()?.to_vec();
        Ok(Abi {
            inverted_stack,
            params,
            result,
            scratch,
            unused,
        })
    }

    /// Validates this ABI against an architecture's register table (§4.5).
    pub fn validate(&self, arch: Architecture) -> Result<()> {
        let registers = arch.abi_registers();

        let check_distinct_and_known = |list: &[u8], allow_sp_sentinel: bool| -> Result<()> {
            let mut seen = HashSet::new();
            for &index in list {
                if !seen.insert(index) {
                    return Err(Error::InvalidRegisterIndex {
                        index,
                        architecture: arch.name(),
                    });
                }
                let is_sp_sentinel = allow_sp_sentinel && index == STACK_POINTER_SENTINEL;
                if !is_sp_sentinel && (index as usize) >= registers.len() {
                    return Err(Error::InvalidRegisterIndex {
                        index,
                        architecture: arch.name(),
                    });
                }
            }
            Ok(())
        };

        check_distinct_and_known(&self.params, false)?;
        check_distinct_and_known(&self.result, false)?;
        check_distinct_and_known(&self.scratch, false)?;
        check_distinct_and_known(&self.unused, true)?;

        let unused: HashSet<u8> = self.unused.iter().copied().collect();
        for list in [&self.params, &self.result, &self.scratch] {
            for &index in list {
                if unused.contains(&index) {
                    return Err(Error::InvalidRegisterIndex {
                        index,
                        architecture: arch.name(),
                    });
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_abi_round_trips_as_empty_payload() {
        let mut w = Writer::new();
        Abi::NIL.encode_payload(&mut w);
        assert!(w.as_bytes().is_empty());
        assert_eq!(Abi::decode_payload(&[]).unwrap(), Abi::NIL);
    }

    #[test]
    fn custom_abi_round_trips() {
        let abi = Abi {
            inverted_stack: false,
            params: vec![6, 1], // RSI, RCX
            result: vec![0],
            scratch: vec![],
            unused: vec![],
        };
        let mut w = Writer::new();
        abi.encode_payload(&mut w);
        let bytes = w.into_bytes();
        assert_eq!(Abi::decode_payload(&bytes).unwrap(), abi);
    }

    #[test]
    fn validate_accepts_known_registers() {
        let abi = Abi {
            inverted_stack: false,
            params: vec![6, 1],
            result: vec![0],
            scratch: vec![2, 3],
            unused: vec![STACK_POINTER_SENTINEL],
        };
        abi.validate(Architecture::X86_64).unwrap();
    }

    #[test]
    fn validate_rejects_out_of_range_register() {
        let abi = Abi {
            params: vec![200],
            ..Abi::NIL
        };
        assert!(abi.validate(Architecture::X86_64).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_within_a_list() {
        let abi = Abi {
            params: vec![0, 0],
            ..Abi::NIL
        };
        assert!(abi.validate(Architecture::X86_64).is_err());
    }

    #[test]
    fn validate_rejects_register_shared_between_unused_and_params() {
        let abi = Abi {
            params: vec![0],
            unused: vec![0],
            ..Abi::NIL
        };
        assert!(abi.validate(Architecture::X86_64).is_err());
    }

    #[test]
    fn validate_allows_sharing_between_params_result_and_scratch() {
        let abi = Abi {
            params: vec![0],
            result: vec![0],
            scratch: vec![0],
            ..Abi::NIL
        };
        abi.validate(Architecture::X86_64).unwrap();
    }

    #[test]
    fn validate_allows_stack_pointer_sentinel_only_in_unused() {
        let abi = Abi {
            unused: vec![STACK_POINTER_SENTINEL],
            ..Abi::NIL
        };
        abi.validate(Architecture::X86_64).unwrap();

        let abi = Abi {
            params: vec![STACK_POINTER_SENTINEL],
            ..Abi::NIL
        };
        assert!(abi.validate(Architecture::X86_64).is_err());
    }
}
