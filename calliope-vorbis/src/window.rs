//! Modes, window slopes and per-packet block geometry.
//!
//! A mode selects a block size and a mapping. The window applied to a
//! block depends on the block sizes of its neighbors, giving four overlap
//! configurations; all four derive from two precomputed slope tables and
//! the geometry below.

use calliope_core::bitstream::BitReader;

use crate::error::{Result, VorbisError};

/// One mode configuration from the setup header.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Mode {
    /// Long block when set.
    pub(crate) block_flag: bool,
    pub(crate) mapping: u8,
}

impl Mode {
    pub(crate) fn read(reader: &mut BitReader<'_>, mapping_count: usize) -> Result<Self> {
        let block_flag = reader.read_bit_flag()?;
        if reader.read_u16()? != 0 {
            return Err(VorbisError::InvalidMode("window type must be zero".into()));
        }
        if reader.read_u16()? != 0 {
            return Err(VorbisError::InvalidMode(
                "transform type must be zero".into(),
            ));
        }
        let mapping = reader.read_u8()?;
        if usize::from(mapping) >= mapping_count {
            return Err(VorbisError::InvalidMode("mapping out of range".into()));
        }
        Ok(Self {
            block_flag,
            mapping,
        })
    }
}

/// Overlap geometry of one audio block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockGeometry {
    /// Block size.
    pub(crate) n: usize,
    /// First sample inside the left overlap.
    pub(crate) left_start: usize,
    /// One past the left overlap.
    pub(crate) left_end: usize,
    /// First sample of the right overlap: emission stops here.
    pub(crate) right_start: usize,
    /// One past the right overlap: the stored tail ends here.
    pub(crate) right_end: usize,
}

impl BlockGeometry {
    /// Samples this block contributes to the output once the decoder is
    /// warm.
    pub(crate) fn sample_count(&self) -> usize {
        self.right_start - self.left_start
    }
}

/// Precomputed window slopes for the two block sizes.
#[derive(Debug)]
pub(crate) struct Windows {
    block_size: [usize; 2],
    short_slope: Vec<f32>,
    long_slope: Vec<f32>,
}

impl Windows {
    pub(crate) fn new(block_size_0: usize, block_size_1: usize) -> Self {
        Self {
            block_size: [block_size_0, block_size_1],
            short_slope: make_slope(block_size_0 / 2),
            long_slope: make_slope(block_size_1 / 2),
        }
    }

    /// Geometry of a block given its own size flag and its neighbors'.
    /// The neighbor flags only matter for long blocks; short blocks always
    /// overlap short-style.
    pub(crate) fn geometry(
        &self,
        block_flag: bool,
        previous_long: bool,
        next_long: bool,
    ) -> BlockGeometry {
        let [bs0, bs1] = self.block_size;
        let n = if block_flag { bs1 } else { bs0 };
        let left_half = if block_flag && !previous_long {
            bs0 / 4
        } else {
            n / 4
        };
        let right_half = if block_flag && !next_long { bs0 / 4 } else { n / 4 };
        BlockGeometry {
            n,
            left_start: n / 4 - left_half,
            left_end: n / 4 + left_half,
            right_start: 3 * n / 4 - right_half,
            right_end: 3 * n / 4 + right_half,
        }
    }

    /// The slope covering an overlap region of `len` samples.
    pub(crate) fn slope(&self, len: usize) -> &[f32] {
        if len <= self.short_slope.len() {
            &self.short_slope[..len]
        } else {
            &self.long_slope[..len.min(self.long_slope.len())]
        }
    }
}

/// One rising window slope: `sin(pi/2 * sin^2(pi (x+0.5) / 2 len))`.
fn make_slope(len: usize) -> Vec<f32> {
    use std::f64::consts::FRAC_PI_2;
    (0..len)
        .map(|x| {
            let inner = ((x as f64 + 0.5) / len as f64 * FRAC_PI_2).sin();
            (FRAC_PI_2 * inner * inner).sin() as f32
        })
        .collect()
}
