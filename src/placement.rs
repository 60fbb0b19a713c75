//! ABI-directed parameter and result placement (format spec §4.6): turns an
//! ABI's register lists plus a list of value byte-sizes into concrete memory
//! locations, the way an IR compiler would when lowering a call.
//!
//! This module is a pure function of its inputs — it does not read or write
//! any `rpkg` section — so it lives alongside [`crate::abi`] rather than
//! inside [`crate::write`] or [`crate::read`].

use crate::abi::Abi;
use crate::arch::Architecture;
use crate::error::Result;

/// One word-wide slot a value (or one word-sized chunk of a larger value)
/// is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// A register, identified by its position in
    /// [`Architecture::abi_registers`].
    Register(u8),
    /// A stack slot, `offset` bytes from the architecture's stack pointer.
    /// Non-negative on a downward-growing stack, negative otherwise.
    Stack { pointer: crate::arch::Register, offset: i64 },
}

/// Computes `ceil(size / word_size)`, the number of word-wide locations a
/// value of `size` bytes occupies. A zero-byte value occupies none.
fn word_count(size: u64, word_size: u64) -> u64 {
    if size == 0 {
        0
    } else {
        (size + word_size - 1) / word_size
    }
}

/// Places a sequence of values (parameters, or a single result) according
/// to `registers` (the ABI's `params` or `result` list), falling back to
/// the stack in allocation order once `registers` is exhausted.
///
/// Returns one `Vec<Location>` per input value, in input order.
fn place(
    architecture: Architecture,
    registers: &[u8],
    inverted_stack: bool,
    sizes: &[u64],
) -> Result<Vec<Vec<Location>>> {
    let word_size = architecture.word_size() as u64;

    // First pass: hand out registers in order, recording which word-chunks
    // spill to the stack (by their (value_index, chunk_index) position).
    let mut register_cursor = 0usize;
    let mut chunk_locations: Vec<Vec<Option<Location>>> = Vec::with_capacity(sizes.len());
    let mut spill_positions: Vec<(usize, usize)> = Vec::new();

    for (value_index, &size) in sizes.iter().enumerate() {
        let chunks = word_count(size, word_size);
        let mut locations = Vec::with_capacity(chunks as usize);
        for chunk_index in 0..chunks {
            if register_cursor < registers.len() {
                let index = registers[register_cursor];
                architecture.register(index)?;
                locations.push(Some(Location::Register(index)));
                register_cursor += 1;
            } else {
                locations.push(None);
                spill_positions.push((value_index, chunk_index as usize));
            }
        }
        chunk_locations.push(locations);
    }

    // Second pass: lay out the spilled chunks on the stack, in allocation
    // order (earlier values lower offsets, or higher if `inverted_stack`).
    let pointer = architecture.stack_pointer();
    let stack_slots = spill_positions.len() as u64;
    for (slot_index, &(value_index, chunk_index)) in spill_positions.iter().enumerate() {
        let slot_index = slot_index as u64;
        let magnitude = if inverted_stack {
            (stack_slots - 1 - slot_index) * word_size
        } else {
            slot_index * word_size
        };
        let offset = if architecture.stack_grows_down() {
            magnitude as i64
        } else {
            -(magnitude as i64)
        };
        chunk_locations[value_index][chunk_index] = Some(Location::Stack { pointer, offset });
    }

    Ok(chunk_locations
        .into_iter()
        .map(|locations| {
            locations
                .into_iter()
                .map(|l| l.expect("every word-chunk is filled by the register or stack pass"))
                .collect()
        })
        .collect())
}

/// Places an ordered list of parameter byte-sizes according to `abi.params`
/// (format spec §4.6).
pub fn place_parameters(
    abi: &Abi,
    architecture: Architecture,
    param_sizes: &[u64],
) -> Result<Vec<Vec<Location>>> {
    place(architecture, &abi.params, abi.inverted_stack, param_sizes)
}

/// Places a single result value's byte-size according to `abi.result`
/// (format spec §4.6).
pub fn place_result(abi: &Abi, architecture: Architecture, result_size: u64) -> Result<Vec<Location>> {
    let mut placed = place(architecture, &abi.result, abi.inverted_stack, &[result_size])?;
    Ok(placed.pop().expect("place() returns one entry per input size"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_register_parameter() {
        let abi = Abi {
            inverted_stack: false,
            params: vec![0, 1], // RAX, RCX
            result: vec![0],
            scratch: vec![],
            unused: vec![],
        };
        let placed = place_parameters(&abi, Architecture::X86_64, &[8]).unwrap();
        assert_eq!(placed, vec![vec![Location::Register(0)]]);
    }

    #[test]
    fn wide_parameter_consumes_multiple_registers() {
        let abi = Abi {
            inverted_stack: false,
            params: vec![0, 1, 2],
            result: vec![],
            scratch: vec![],
            unused: vec![],
        };
        // 16 bytes on an 8-byte-word architecture needs two locations.
        let placed = place_parameters(&abi, Architecture::X86_64, &[16]).unwrap();
        assert_eq!(
            placed,
            vec![vec![Location::Register(0), Location::Register(1)]]
        );
    }

    #[test]
    fn exhausted_registers_spill_to_the_stack_in_order() {
        let abi = Abi {
            inverted_stack: false,
            params: vec![0], // one register only
            result: vec![],
            scratch: vec![],
            unused: vec![],
        };
        let placed = place_parameters(&abi, Architecture::X86_64, &[8, 8, 8]).unwrap();
        let pointer = Architecture::X86_64.stack_pointer();
        assert_eq!(
            placed,
            vec![
                vec![Location::Register(0)],
                vec![Location::Stack { pointer, offset: 0 }],
                vec![Location::Stack { pointer, offset: 8 }],
            ]
        );
    }

    #[test]
    fn inverted_stack_lays_out_earlier_arguments_at_higher_offsets() {
        let abi = Abi {
            inverted_stack: true,
            params: vec![], // no registers at all, everything spills
            result: vec![],
            scratch: vec![],
            unused: vec![],
        };
        let placed = place_parameters(&abi, Architecture::X86_64, &[8, 8, 8]).unwrap();
        let pointer = Architecture::X86_64.stack_pointer();
        assert_eq!(
            placed,
            vec![
                vec![Location::Stack { pointer, offset: 16 }],
                vec![Location::Stack { pointer, offset: 8 }],
                vec![Location::Stack { pointer, offset: 0 }],
            ]
        );
    }

    #[test]
    fn zero_sized_value_occupies_no_locations() {
        let abi = Abi {
            inverted_stack: false,
            params: vec![0],
            result: vec![],
            scratch: vec![],
            unused: vec![],
        };
        let placed = place_parameters(&abi, Architecture::X86_64, &[0, 8]).unwrap();
        assert_eq!(placed, vec![vec![], vec![Location::Register(0)]]);
    }

    #[test]
    fn result_placement_uses_the_result_register_list() {
        let abi = Abi {
            inverted_stack: false,
            params: vec![0, 1],
            result: vec![0],
            scratch: vec![],
            unused: vec![],
        };
        let placed = place_result(&abi, Architecture::X86_64, 8).unwrap();
        assert_eq!(placed, vec![Location::Register(0)]);
    }

    #[test]
    fn rejects_an_out_of_range_register_index() {
        let abi = Abi {
            inverted_stack: false,
            params: vec![200],
            result: vec![],
            scratch: vec![],
            unused: vec![],
        };
        assert!(place_parameters(&abi, Architecture::X86_64, &[8]).is_err());
    }
}
