//! Channel mapping: submap dispatch and channel coupling.

use calliope_core::bitstream::BitReader;

use crate::error::{Result, VorbisError};
use crate::ilog;

/// One floor/residue pairing and the channels routed to it.
#[derive(Debug)]
pub(crate) struct Submap {
    pub(crate) floor: u8,
    pub(crate) residue: u8,
    pub(crate) channels: Vec<usize>,
}

/// One mapping configuration from the setup header.
#[derive(Debug)]
pub(crate) struct Mapping {
    /// (magnitude, angle) channel pairs, in declaration order.
    couplings: Vec<(u8, u8)>,
    /// Channel index to submap index.
    pub(crate) mux: Vec<u8>,
    pub(crate) submaps: Vec<Submap>,
}

impl Mapping {
    /// Parse one mapping of type 0.
    pub(crate) fn read(
        reader: &mut BitReader<'_>,
        channels: usize,
        floor_count: usize,
        residue_count: usize,
    ) -> Result<Self> {
        if reader.read_u16()? != 0 {
            return Err(VorbisError::Unsupported("mapping type".into()));
        }

        let submap_count = if reader.read_bit_flag()? {
            reader.read_bits(4)? as usize + 1
        } else {
            1
        };

        let mut couplings = Vec::new();
        if reader.read_bit_flag()? {
            let coupling_count = reader.read_u8()? as usize + 1;
            let index_bits = ilog(channels as u64 - 1);
            for _ in 0..coupling_count {
                let magnitude = reader.read_bits(index_bits)? as u8;
                let angle = reader.read_bits(index_bits)? as u8;
                if magnitude == angle
                    || usize::from(magnitude) >= channels
                    || usize::from(angle) >= channels
                {
                    return Err(VorbisError::InvalidMapping(
                        "bad magnitude/angle channel pair".into(),
                    ));
                }
                couplings.push((magnitude, angle));
            }
        }

        if reader.read_bits(2)? != 0 {
            return Err(VorbisError::InvalidMapping("reserved bits set".into()));
        }

        let mux = if submap_count > 1 {
            let mut mux = Vec::with_capacity(channels);
            for _ in 0..channels {
                let submap = reader.read_bits(4)? as u8;
                if usize::from(submap) >= submap_count {
                    return Err(VorbisError::InvalidMapping("mux out of range".into()));
                }
                mux.push(submap);
            }
            mux
        } else {
            vec![0; channels]
        };

        let mut submaps = Vec::with_capacity(submap_count);
        for submap in 0..submap_count {
            reader.read_u8()?; // unused time configuration
            let floor = reader.read_u8()?;
            if usize::from(floor) >= floor_count {
                return Err(VorbisError::InvalidMapping("floor out of range".into()));
            }
            let residue = reader.read_u8()?;
            if usize::from(residue) >= residue_count {
                return Err(VorbisError::InvalidMapping("residue out of range".into()));
            }
            let members = mux
                .iter()
                .enumerate()
                .filter(|&(_, &m)| usize::from(m) == submap)
                .map(|(ch, _)| ch)
                .collect();
            submaps.push(Submap {
                floor,
                residue,
                channels: members,
            });
        }

        Ok(Self {
            couplings,
            mux,
            submaps,
        })
    }

    /// A channel coupled to an energetic partner must be decoded too.
    pub(crate) fn propagate_energy(&self, no_residue: &mut [bool]) {
        for &(magnitude, angle) in &self.couplings {
            let m = usize::from(magnitude);
            let a = usize::from(angle);
            if !(no_residue[m] && no_residue[a]) {
                no_residue[m] = false;
                no_residue[a] = false;
            }
        }
    }

    /// Undo square-polar coupling, in reverse declaration order.
    pub(crate) fn inverse_couple(&self, rows: &mut [Vec<f32>], half_block: usize) {
        for &(magnitude, angle) in self.couplings.iter().rev() {
            let (mag_row, ang_row) = pair_mut(rows, usize::from(magnitude), usize::from(angle));
            for (m, a) in mag_row[..half_block]
                .iter_mut()
                .zip(ang_row[..half_block].iter_mut())
            {
                let (new_m, new_a) = if *m > 0.0 {
                    if *a > 0.0 {
                        (*m, *m - *a)
                    } else {
                        (*m + *a, *m)
                    }
                } else if *a > 0.0 {
                    (*m, *m + *a)
                } else {
                    (*m - *a, *m)
                };
                *m = new_m;
                *a = new_a;
            }
        }
    }
}

/// Mutable references to two distinct rows.
fn pair_mut<T>(rows: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    debug_assert_ne!(a, b);
    if a < b {
        let (head, tail) = rows.split_at_mut(b);
        (&mut head[a], &mut tail[0])
    } else {
        let (head, tail) = rows.split_at_mut(a);
        (&mut tail[0], &mut head[b])
    }
}
