//! Canonical Huffman decoding for Vorbis codebooks.
//!
//! Codeword assignment follows the Vorbis convention: entries take the
//! lowest available leaf at their depth in entry order, and the resulting
//! codewords are bit-reversed so they can be matched against bits read
//! LSb-first straight off the packet.

use calliope_core::bitstream::BitReader;

use crate::error::{Result, VorbisError};

/// Width of the direct-lookup prefix table in bits.
///
/// Codes up to this length resolve with one table index; longer codes fall
/// back to a linear scan of the overflow list. Raising the width trades
/// memory (`2^PREFIX_BITS` slots per codebook) for fewer fallbacks.
pub(crate) const PREFIX_BITS: u32 = 10;

#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    value: u32,
    /// Code length in bits; zero marks a vacant slot.
    length: u8,
}

#[derive(Clone, Copy, Debug)]
struct Assigned {
    value: u32,
    /// Bit-reversed codeword, LSb-first ready.
    code: u32,
    length: u8,
}

/// A built decode table for one codebook.
#[derive(Debug)]
pub(crate) struct HuffmanTable {
    prefix: Box<[Slot]>,
    overflow: Box<[Assigned]>,
    prefix_bits: u32,
    max_bits: u32,
}

impl HuffmanTable {
    /// Build the decode table from `(entry, code length)` pairs of the used
    /// entries, in entry order. Lengths must be in `1..=32`.
    ///
    /// A single used entry forms a legal book with any length. Any other
    /// over- or under-specified length set is rejected.
    pub(crate) fn build(entries: &[(u32, u8)]) -> Result<Self> {
        let mut assigned = assign_codewords(entries)?;
        assigned.sort_by_key(|a| (a.length, a.code));

        let max_bits = u32::from(assigned.iter().map(|a| a.length).max().unwrap_or(1));
        let prefix_bits = max_bits.min(PREFIX_BITS);
        let mut prefix = vec![Slot::default(); 1usize << prefix_bits].into_boxed_slice();
        let mut overflow = Vec::new();

        for a in assigned {
            if u32::from(a.length) <= prefix_bits {
                // Replicate across every index whose low bits match.
                let step = 1usize << a.length;
                let mut index = a.code as usize;
                while index < prefix.len() {
                    prefix[index] = Slot {
                        value: a.value,
                        length: a.length,
                    };
                    index += step;
                }
            } else {
                overflow.push(a);
            }
        }

        Ok(Self {
            prefix,
            overflow: overflow.into_boxed_slice(),
            prefix_bits,
            max_bits,
        })
    }

    /// Decode one scalar, or `None` when the packet runs dry or holds a bit
    /// pattern outside the code ("bad packet" to the caller).
    pub(crate) fn decode(&self, reader: &mut BitReader<'_>) -> Option<u32> {
        let (bits, have) = reader.peek(self.prefix_bits).ok()?;
        if have > 0 {
            let slot = self.prefix[bits as usize];
            if slot.length != 0 && u32::from(slot.length) <= have {
                reader.try_advance(u64::from(slot.length));
                return Some(slot.value);
            }
        }
        let (bits, have) = reader.peek(self.max_bits).ok()?;
        for entry in self.overflow.iter() {
            let len = u32::from(entry.length);
            if len <= have && bits & ((1u64 << len) - 1) == u64::from(entry.code) {
                reader.try_advance(u64::from(len));
                return Some(entry.value);
            }
        }
        None
    }
}

fn assign_codewords(entries: &[(u32, u8)]) -> Result<Vec<Assigned>> {
    let Some((&(first_value, first_len), rest)) = entries.split_first() else {
        return Err(VorbisError::InvalidCodebook("no used entries".into()));
    };
    debug_assert!(entries.iter().all(|&(_, l)| (1..=32).contains(&l)));

    let mut out = Vec::with_capacity(entries.len());
    out.push(Assigned {
        value: first_value,
        code: 0,
        length: first_len,
    });
    if rest.is_empty() {
        // Single used entry: an all-zeros codeword of its declared length.
        return Ok(out);
    }

    // Available leaves per depth, MSB-justified.
    let mut available = [0u32; 33];
    for depth in 1..=first_len as usize {
        available[depth] = 1u32 << (32 - depth);
    }

    for &(value, length) in rest {
        let mut depth = length as usize;
        while depth > 0 && available[depth] == 0 {
            depth -= 1;
        }
        if depth == 0 {
            return Err(VorbisError::InvalidCodebook(
                "over-specified code lengths".into(),
            ));
        }
        let leaf = available[depth];
        available[depth] = 0;
        for d in depth + 1..=length as usize {
            available[d] = leaf + (1u32 << (32 - d));
        }
        out.push(Assigned {
            value,
            code: leaf.reverse_bits(),
            length,
        });
    }

    if available[1..].iter().any(|&a| a != 0) {
        return Err(VorbisError::InvalidCodebook(
            "under-specified code lengths".into(),
        ));
    }
    Ok(out)
}
