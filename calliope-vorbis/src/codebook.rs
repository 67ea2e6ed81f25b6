//! Vorbis codebook parsing and VQ lookup.
//!
//! A codebook couples a Huffman code over its entries with an optional
//! vector-quantization table. The VQ values are expanded at setup time into
//! a dense `entries x dimensions` matrix so packet decode is a scalar
//! decode plus one row lookup.

use calliope_core::bitstream::BitReader;

use crate::error::{Result, VorbisError};
use crate::huffman::HuffmanTable;
use crate::{float32_unpack, ilog};

/// 24-bit codebook synchronization pattern ("BCV").
const SYNC_PATTERN: u64 = 0x56_43_42;

/// One parsed codebook.
#[derive(Debug)]
pub(crate) struct Codebook {
    pub(crate) dimensions: u16,
    pub(crate) entries: u32,
    huffman: HuffmanTable,
    lookup: Option<Lookup>,
}

#[derive(Debug)]
struct Lookup {
    /// Row-major `entries x dim` value matrix, rows pre-summed when the
    /// sequence flag was set.
    values: Box<[f32]>,
    dim: usize,
}

impl Codebook {
    /// Parse one codebook from the setup header.
    pub(crate) fn read(reader: &mut BitReader<'_>) -> Result<Self> {
        let sync = reader.read_bits(24)?;
        if sync != SYNC_PATTERN {
            return Err(VorbisError::InvalidCodebook(format!(
                "bad sync pattern {sync:#08x}"
            )));
        }
        let dimensions = reader.read_bits(16)? as u16;
        let entries = reader.read_bits(24)? as u32;

        let mut used: Vec<(u32, u8)> = Vec::with_capacity(entries as usize);
        if reader.read_bit_flag()? {
            // Ordered: runs of consecutive entries share increasing lengths.
            let mut length = reader.read_bits(5)? as u8 + 1;
            let mut entry = 0u32;
            while entry < entries {
                if length > 32 {
                    return Err(VorbisError::InvalidCodebook(
                        "ordered code lengths exceed 32 bits".into(),
                    ));
                }
                let count = reader.read_bits(ilog(u64::from(entries - entry)))? as u32;
                if entry + count > entries {
                    return Err(VorbisError::InvalidCodebook(
                        "ordered length counts overrun the entry count".into(),
                    ));
                }
                for e in entry..entry + count {
                    used.push((e, length));
                }
                entry += count;
                length += 1;
            }
        } else {
            let sparse = reader.read_bit_flag()?;
            for entry in 0..entries {
                if sparse && !reader.read_bit_flag()? {
                    continue;
                }
                used.push((entry, reader.read_bits(5)? as u8 + 1));
            }
        }

        let huffman = HuffmanTable::build(&used)?;
        let lookup = Lookup::read(reader, entries, dimensions)?;

        Ok(Self {
            dimensions,
            entries,
            huffman,
            lookup,
        })
    }

    /// Decode one entry number; `None` marks a bad or exhausted packet.
    pub(crate) fn decode_scalar(&self, reader: &mut BitReader<'_>) -> Option<u32> {
        self.huffman.decode(reader)
    }

    /// Decode one entry and return its VQ value row.
    pub(crate) fn decode_vq(&self, reader: &mut BitReader<'_>) -> Option<&[f32]> {
        let lookup = self.lookup.as_ref()?;
        let entry = self.huffman.decode(reader)? as usize;
        let start = entry * lookup.dim;
        lookup.values.get(start..start + lookup.dim)
    }

    /// Whether the book carries a value mapping.
    pub(crate) fn has_lookup(&self) -> bool {
        self.lookup.is_some()
    }
}

impl Lookup {
    fn read(reader: &mut BitReader<'_>, entries: u32, dimensions: u16) -> Result<Option<Self>> {
        let map_type = reader.read_bits(4)? as u8;
        match map_type {
            0 => return Ok(None),
            1 | 2 => {}
            other => {
                return Err(VorbisError::InvalidCodebook(format!(
                    "reserved lookup type {other}"
                )))
            }
        }

        let min = float32_unpack(reader.read_u32()?);
        let delta = float32_unpack(reader.read_u32()?);
        let value_bits = reader.read_bits(4)? as u32 + 1;
        let sequence_p = reader.read_bit_flag()?;

        let dim = usize::from(dimensions);
        if dim == 0 {
            return Err(VorbisError::InvalidCodebook(
                "value mapping with zero dimensions".into(),
            ));
        }
        let count = if map_type == 1 {
            lookup1_values(entries, dim)
        } else {
            entries as usize * dim
        };
        let mut mults = Vec::with_capacity(count);
        for _ in 0..count {
            mults.push(reader.read_bits(value_bits)? as u32);
        }

        let mut values = Vec::with_capacity(entries as usize * dim);
        for entry in 0..entries as usize {
            let mut last = 0.0f32;
            if map_type == 1 {
                // Cartesian product order: the entry number is a base-count
                // numeral, one digit per dimension.
                let mut divisor = 1usize;
                for _ in 0..dim {
                    let offset = entry / divisor % count;
                    let v = mults[offset] as f32 * delta + min + last;
                    values.push(v);
                    if sequence_p {
                        last = v;
                    }
                    divisor *= count;
                }
            } else {
                for d in 0..dim {
                    let v = mults[entry * dim + d] as f32 * delta + min + last;
                    values.push(v);
                    if sequence_p {
                        last = v;
                    }
                }
            }
        }

        Ok(Some(Self {
            values: values.into_boxed_slice(),
            dim,
        }))
    }
}

/// Largest integer `r` with `r^dim <= entries`.
fn lookup1_values(entries: u32, dim: usize) -> usize {
    let mut r = f64::from(entries).powf(1.0 / dim as f64).floor() as usize;
    // Undo any floating-point slop around the boundary.
    while pow_at_most(r + 1, dim, entries) {
        r += 1;
    }
    while r > 0 && !pow_at_most(r, dim, entries) {
        r -= 1;
    }
    r
}

/// Whether `base^exp <= limit`, without overflowing.
fn pow_at_most(base: usize, exp: usize, limit: u32) -> bool {
    let mut acc = 1u64;
    for _ in 0..exp {
        acc = acc.saturating_mul(base as u64);
        if acc > u64::from(limit) {
            return false;
        }
    }
    acc <= u64::from(limit)
}
