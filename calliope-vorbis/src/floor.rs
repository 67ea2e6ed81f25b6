//! Floor decoding: the spectral envelope multiplied into the residue.
//!
//! Vorbis I defines two floor families. Floor 0 encodes an LSP filter
//! evaluated over a Bark-scale frequency map; floor 1 encodes a piecewise
//! line through amplitude posts rendered in dB. Both unpack per channel per
//! packet, and running out of packet data mid-floor marks the channel
//! unused rather than failing the packet.

use calliope_core::bitstream::BitReader;

use crate::codebook::Codebook;
use crate::error::{Result, VorbisError};
use crate::ilog;

/// Per-channel floor state decoded from one audio packet.
#[derive(Debug)]
pub(crate) enum FloorData {
    /// The channel carries no energy in this packet.
    Unused,
    /// Floor 0 amplitude and LSP coefficient cosines.
    Zero { amplitude: u64, cos_coeffs: Vec<f32> },
    /// Floor 1 unwrapped posts: final Y value and active flag, in X-list
    /// order.
    One { posts: Vec<(i32, bool)> },
}

impl FloorData {
    pub(crate) fn is_unused(&self) -> bool {
        matches!(self, FloorData::Unused)
    }
}

/// One floor configuration from the setup header.
#[derive(Debug)]
pub(crate) enum Floor {
    Zero(Floor0),
    One(Floor1),
}

impl Floor {
    /// Parse one floor, dispatching on the 16-bit type field.
    pub(crate) fn read(
        reader: &mut BitReader<'_>,
        codebooks: &[Codebook],
        block_sizes: [usize; 2],
    ) -> Result<Self> {
        match reader.read_u16()? {
            0 => Ok(Floor::Zero(Floor0::read(reader, codebooks, block_sizes)?)),
            1 => Ok(Floor::One(Floor1::read(reader, codebooks)?)),
            other => Err(VorbisError::Unsupported(format!("floor type {other}"))),
        }
    }

    /// Unpack this floor's per-channel data from an audio packet.
    pub(crate) fn unpack(
        &self,
        reader: &mut BitReader<'_>,
        codebooks: &[Codebook],
    ) -> Result<FloorData> {
        match self {
            Floor::Zero(f) => f.unpack(reader, codebooks),
            Floor::One(f) => f.unpack(reader, codebooks),
        }
    }

    /// Multiply the floor curve into `out` (one spectrum half-block).
    pub(crate) fn apply(&self, data: &FloorData, block_flag: bool, out: &mut [f32]) {
        match (self, data) {
            (Floor::Zero(f), FloorData::Zero { amplitude, cos_coeffs }) => {
                f.apply(*amplitude, cos_coeffs, block_flag, out);
            }
            (Floor::One(f), FloorData::One { posts }) => f.apply(posts, out),
            (_, FloorData::Unused) => out.fill(0.0),
            _ => debug_assert!(false, "floor data decoded by a different floor"),
        }
    }
}

// ---------------------------------------------------------------------------
// Floor 0
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct Floor0 {
    order: u8,
    rate: u16,
    bark_map_size: u16,
    amplitude_bits: u8,
    amplitude_offset: u8,
    books: Vec<u8>,
    book_bits: u32,
    /// Per block size: cos(pi * bark_map[i] / bark_map_size) for each
    /// spectral line of the half-block. Computed once at setup.
    cos_omega: [Vec<f32>; 2],
}

impl Floor0 {
    fn read(
        reader: &mut BitReader<'_>,
        codebooks: &[Codebook],
        block_sizes: [usize; 2],
    ) -> Result<Self> {
        let order = reader.read_u8()?;
        let rate = reader.read_u16()?;
        let bark_map_size = reader.read_u16()?;
        let amplitude_bits = reader.read_bits(6)? as u8;
        let amplitude_offset = reader.read_u8()?;
        if order < 2 || rate == 0 || bark_map_size == 0 {
            return Err(VorbisError::InvalidFloor(
                "floor 0 order, rate and bark map size must be positive".into(),
            ));
        }
        let book_count = reader.read_bits(4)? as u64 + 1;
        let mut books = Vec::with_capacity(book_count as usize);
        for _ in 0..book_count {
            let book = reader.read_u8()?;
            let valid = codebooks
                .get(usize::from(book))
                .is_some_and(Codebook::has_lookup);
            if !valid {
                return Err(VorbisError::InvalidFloor(
                    "floor 0 book without a value mapping".into(),
                ));
            }
            books.push(book);
        }

        let this = Self {
            order,
            rate,
            bark_map_size,
            amplitude_bits,
            amplitude_offset,
            book_bits: ilog(book_count),
            cos_omega: [
                cos_omega_map(rate, bark_map_size, block_sizes[0] / 2),
                cos_omega_map(rate, bark_map_size, block_sizes[1] / 2),
            ],
            books,
        };
        Ok(this)
    }

    fn unpack(&self, reader: &mut BitReader<'_>, codebooks: &[Codebook]) -> Result<FloorData> {
        let Some(amplitude) = reader.try_read_bits(u32::from(self.amplitude_bits)) else {
            return Ok(FloorData::Unused);
        };
        if amplitude == 0 {
            return Ok(FloorData::Unused);
        }
        let Some(book_number) = reader.try_read_bits(self.book_bits) else {
            return Ok(FloorData::Unused);
        };
        let Some(&book) = self.books.get(book_number as usize) else {
            return Err(VorbisError::InvalidPacket(
                "floor 0 book number out of range".into(),
            ));
        };
        let book = &codebooks[usize::from(book)];

        // The curve evaluation wants the coefficient cosines, so take the
        // cosine as the values arrive.
        let order = usize::from(self.order);
        let mut cos_coeffs = Vec::with_capacity(order);
        let mut last = 0.0f32;
        while cos_coeffs.len() < order {
            let Some(row) = book.decode_vq(reader) else {
                return Ok(FloorData::Unused);
            };
            let mut row_last = 0.0;
            for &v in row {
                if cos_coeffs.len() == order {
                    break;
                }
                cos_coeffs.push((last + v).cos());
                row_last = v;
            }
            last += row_last;
        }
        Ok(FloorData::Zero {
            amplitude,
            cos_coeffs,
        })
    }

    fn apply(&self, amplitude: u64, cos_coeffs: &[f32], block_flag: bool, out: &mut [f32]) {
        let map = &self.cos_omega[usize::from(block_flag)];
        let order = usize::from(self.order);
        let offset = f32::from(self.amplitude_offset);
        let common = amplitude as f32 * offset / ((1u64 << self.amplitude_bits) - 1) as f32;

        let mut i = 0;
        while i < out.len() {
            let cos_omega = map[i];
            let (p_stop, q_stop, mut p, mut q) = if order & 1 == 1 {
                (
                    (order - 3) / 2,
                    (order - 1) / 2,
                    1.0 - cos_omega * cos_omega,
                    0.25f32,
                )
            } else {
                let stop = (order - 2) / 2;
                (stop, stop, (1.0 - cos_omega) / 2.0, (1.0 + cos_omega) / 2.0)
            };
            for j in 0..=p_stop {
                let t = cos_coeffs[2 * j + 1] - cos_omega;
                p *= 4.0 * t * t;
            }
            for j in 0..=q_stop {
                let t = cos_coeffs[2 * j] - cos_omega;
                q *= 4.0 * t * t;
            }
            let linear = (0.115_129_25 * (common / (p + q).sqrt() - offset)).exp();

            // The same map value covers a run of spectral lines.
            while i < out.len() && map[i] == cos_omega {
                out[i] *= linear;
                i += 1;
            }
        }
    }
}

fn bark(x: f64) -> f64 {
    13.1 * (0.00074 * x).atan() + 2.24 * (1.85e-8 * x * x).atan() + 1e-4 * x
}

fn cos_omega_map(rate: u16, bark_map_size: u16, n: usize) -> Vec<f32> {
    let rate = f64::from(rate);
    let size = f64::from(bark_map_size);
    let scale = size / bark(0.5 * rate);
    (0..n)
        .map(|i| {
            let freq = rate / 2.0 / n as f64 * i as f64;
            let band = (bark(freq) * scale).floor().min(size - 1.0);
            ((std::f64::consts::PI * band / size).cos()) as f32
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Floor 1
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Floor1Class {
    dimensions: u8,
    subclass_bits: u8,
    master_book: Option<u8>,
    subclass_books: Vec<Option<u8>>,
}

#[derive(Debug)]
pub(crate) struct Floor1 {
    partition_classes: Vec<u8>,
    classes: Vec<Floor1Class>,
    multiplier: u8,
    range: u16,
    y_bits: u32,
    x_list: Vec<u16>,
    /// Post indices ordered by ascending X.
    sort_order: Vec<usize>,
    /// For each post from index 2 on: the nearest lower and higher
    /// neighbors among the preceding posts.
    neighbors: Vec<(usize, usize)>,
}

impl Floor1 {
    fn read(reader: &mut BitReader<'_>, codebooks: &[Codebook]) -> Result<Self> {
        let partition_count = reader.read_bits(5)? as usize;
        let mut partition_classes = Vec::with_capacity(partition_count);
        for _ in 0..partition_count {
            partition_classes.push(reader.read_bits(4)? as u8);
        }
        let class_count = partition_classes.iter().copied().max().map_or(0, |m| m + 1);

        let mut classes = Vec::with_capacity(usize::from(class_count));
        for _ in 0..class_count {
            let dimensions = reader.read_bits(3)? as u8 + 1;
            let subclass_bits = reader.read_bits(2)? as u8;
            let master_book = if subclass_bits != 0 {
                let book = reader.read_u8()?;
                if usize::from(book) >= codebooks.len() {
                    return Err(VorbisError::InvalidFloor(
                        "floor 1 class master book out of range".into(),
                    ));
                }
                Some(book)
            } else {
                None
            };
            let mut subclass_books = Vec::with_capacity(1 << subclass_bits);
            for _ in 0..1u32 << subclass_bits {
                let book = match reader.read_u8()? {
                    0 => None,
                    idx => {
                        let idx = idx - 1;
                        if usize::from(idx) >= codebooks.len() {
                            return Err(VorbisError::InvalidFloor(
                                "floor 1 subclass book out of range".into(),
                            ));
                        }
                        Some(idx)
                    }
                };
                subclass_books.push(book);
            }
            classes.push(Floor1Class {
                dimensions,
                subclass_bits,
                master_book,
                subclass_books,
            });
        }

        let multiplier = reader.read_bits(2)? as u8 + 1;
        let range = [256u16, 128, 86, 64][usize::from(multiplier) - 1];
        let range_bits = reader.read_bits(4)? as u32;

        let mut x_list: Vec<u16> = vec![0, 1 << range_bits];
        for &class in &partition_classes {
            for _ in 0..classes[usize::from(class)].dimensions {
                if x_list.len() >= 65 {
                    return Err(VorbisError::InvalidFloor("more than 65 posts".into()));
                }
                x_list.push(reader.read_bits(range_bits)? as u16);
            }
        }

        let mut sort_order: Vec<usize> = (0..x_list.len()).collect();
        sort_order.sort_by_key(|&i| x_list[i]);
        for pair in sort_order.windows(2) {
            if x_list[pair[0]] == x_list[pair[1]] {
                return Err(VorbisError::InvalidFloor("duplicate post positions".into()));
            }
        }

        let neighbors = (2..x_list.len())
            .map(|i| find_neighbors(&x_list, i))
            .collect();

        Ok(Self {
            partition_classes,
            classes,
            multiplier,
            range,
            y_bits: ilog(u64::from(range) - 1),
            x_list,
            sort_order,
            neighbors,
        })
    }

    fn unpack(&self, reader: &mut BitReader<'_>, codebooks: &[Codebook]) -> Result<FloorData> {
        match reader.try_read_bits(1) {
            Some(1) => {}
            _ => return Ok(FloorData::Unused),
        }

        let mut ys: Vec<i32> = Vec::with_capacity(self.x_list.len());
        for _ in 0..2 {
            let Some(y) = reader.try_read_bits(self.y_bits) else {
                return Ok(FloorData::Unused);
            };
            ys.push(y as i32);
        }

        for &class_index in &self.partition_classes {
            let class = &self.classes[usize::from(class_index)];
            let bits = u32::from(class.subclass_bits);
            let sub_mask = (1u32 << bits) - 1;
            let mut cval = if bits > 0 {
                let master = &codebooks[usize::from(class.master_book.unwrap_or_default())];
                let Some(v) = master.decode_scalar(reader) else {
                    return Ok(FloorData::Unused);
                };
                v
            } else {
                0
            };
            for _ in 0..class.dimensions {
                let book = class.subclass_books[(cval & sub_mask) as usize];
                cval >>= bits;
                let y = match book {
                    Some(idx) => {
                        let Some(v) = codebooks[usize::from(idx)].decode_scalar(reader) else {
                            return Ok(FloorData::Unused);
                        };
                        v as i32
                    }
                    None => 0,
                };
                ys.push(y);
            }
        }

        Ok(FloorData::One {
            posts: self.unwrap_posts(&ys),
        })
    }

    /// Turn raw post values into absolute Y values plus active flags, by
    /// predicting each post from its neighbors and offsetting into one of
    /// the four rooms around the prediction.
    fn unwrap_posts(&self, ys: &[i32]) -> Vec<(i32, bool)> {
        let range = i32::from(self.range);
        let mut posts: Vec<(i32, bool)> = ys.iter().map(|&y| (y, true)).collect();
        for i in 2..posts.len() {
            let (low, high) = self.neighbors[i - 2];
            let predicted = render_point(
                i32::from(self.x_list[low]),
                posts[low].0,
                i32::from(self.x_list[high]),
                posts[high].0,
                i32::from(self.x_list[i]),
            );
            let high_room = range - predicted;
            let low_room = predicted;
            let room = 2 * high_room.min(low_room);
            let val = posts[i].0;
            let unwrapped = if val != 0 {
                posts[low].1 = true;
                posts[high].1 = true;
                posts[i].1 = true;
                if val >= room {
                    if high_room > low_room {
                        predicted + val - low_room
                    } else {
                        predicted - val + high_room - 1
                    }
                } else if val % 2 == 0 {
                    predicted + val / 2
                } else {
                    predicted - (val + 1) / 2
                }
            } else {
                posts[i].1 = false;
                predicted
            };
            posts[i].0 = unwrapped.clamp(0, range - 1);
        }
        posts
    }

    fn apply(&self, posts: &[(i32, bool)], out: &mut [f32]) {
        let mult = i32::from(self.multiplier);
        let mut lx = 0i32;
        let mut ly = posts[self.sort_order[0]].0 * mult;
        let mut hx = 0i32;
        let mut hy = 0i32;
        for &idx in &self.sort_order[1..] {
            let (y, active) = posts[idx];
            if active {
                hy = y * mult;
                hx = i32::from(self.x_list[idx]);
                render_line(out, lx, ly, hx, hy);
                lx = hx;
                ly = hy;
            }
        }
        let n = out.len() as i32;
        if hx < n {
            render_line(out, hx, hy, n, hy);
        }
    }
}

fn find_neighbors(x_list: &[u16], index: usize) -> (usize, usize) {
    let x = x_list[index];
    let mut low: Option<(usize, u16)> = None;
    let mut high: Option<(usize, u16)> = None;
    for (i, &v) in x_list[..index].iter().enumerate() {
        if v < x && low.map_or(true, |(_, best)| v > best) {
            low = Some((i, v));
        }
        if v > x && high.map_or(true, |(_, best)| v < best) {
            high = Some((i, v));
        }
    }
    // Posts 0 and 1 sit at the extremes, so both neighbors exist.
    (low.map_or(0, |(i, _)| i), high.map_or(1, |(i, _)| i))
}

fn render_point(x0: i32, y0: i32, x1: i32, y1: i32, x: i32) -> i32 {
    let dy = y1 - y0;
    let adx = x1 - x0;
    let off = (dy.abs() * (x - x0)) / adx;
    if dy < 0 {
        y0 - off
    } else {
        y0 + off
    }
}

/// Multiply a dB-domain line segment into `out` using an integer DDA.
fn render_line(out: &mut [f32], x0: i32, y0: i32, x1: i32, y1: i32) {
    let n = out.len() as i32;
    if x0 >= n || x1 <= x0 {
        return;
    }
    let dy = y1 - y0;
    let adx = x1 - x0;
    let base = dy / adx;
    let ady = dy.abs() - base.abs() * adx;
    let sy = if dy < 0 { base - 1 } else { base + 1 };

    out[x0 as usize] *= INVERSE_DB_TABLE[(y0.max(0) as usize).min(255)];
    let mut y = y0;
    let mut err = 0;
    for x in x0 + 1..x1.min(n) {
        err += ady;
        if err >= adx {
            err -= adx;
            y += sy;
        } else {
            y += base;
        }
        out[x as usize] *= INVERSE_DB_TABLE[(y.max(0) as usize).min(255)];
    }
}

/// 2^(-(255 - i) * 0.0390625 dB steps): the fixed dB-to-linear table of
/// the Vorbis I specification.
#[rustfmt::skip]
pub(crate) const INVERSE_DB_TABLE: [f32; 256] = [
    1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07,
    1.3699951e-07, 1.4590251e-07, 1.5538408e-07, 1.6548181e-07,
    1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.1287530e-07,
    2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07,
    2.9163793e-07, 3.1059021e-07, 3.3077411e-07, 3.5226968e-07,
    3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
    4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07,
    6.2082472e-07, 6.6116941e-07, 7.0413592e-07, 7.4989464e-07,
    7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07,
    1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06,
    1.3215816e-06, 1.4074654e-06, 1.4989305e-06, 1.5963394e-06,
    1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
    2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06,
    2.8133190e-06, 2.9961443e-06, 3.1908506e-06, 3.3982101e-06,
    3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06,
    4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06,
    5.9888572e-06, 6.3780469e-06, 6.7925283e-06, 7.2339451e-06,
    7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
    9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05,
    1.2748789e-05, 1.3577278e-05, 1.4459606e-05, 1.5399272e-05,
    1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05,
    2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05,
    2.7139006e-05, 2.8902651e-05, 3.0780908e-05, 3.2781225e-05,
    3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
    4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05,
    5.7772202e-05, 6.1526565e-05, 6.5524908e-05, 6.9783085e-05,
    7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05,
    9.5602426e-05, 0.00010181521, 0.00010843174, 0.00011547824,
    0.00012298267, 0.00013097477, 0.00013948625, 0.00014855085,
    0.00015820453, 0.00016848555, 0.00017943469, 0.00019109536,
    0.00020351382, 0.00021673929, 0.00023082423, 0.00024582449,
    0.00026179955, 0.00027881276, 0.00029693158, 0.00031622787,
    0.00033677814, 0.00035866388, 0.00038197188, 0.00040679456,
    0.00043323036, 0.00046138411, 0.00049136745, 0.00052329927,
    0.00055730621, 0.00059352311, 0.00063209358, 0.00067317058,
    0.00071691700, 0.00076350630, 0.00081312324, 0.00086596457,
    0.00092223983, 0.00098217216, 0.0010459992,  0.0011139742,
    0.0011863665,  0.0012634633,  0.0013455702,  0.0014330129,
    0.0015261382,  0.0016253153,  0.0017309374,  0.0018434235,
    0.0019632195,  0.0020908006,  0.0022266726,  0.0023713743,
    0.0025254795,  0.0026895994,  0.0028643847,  0.0030505286,
    0.0032487691,  0.0034598925,  0.0036847358,  0.0039241906,
    0.0041792066,  0.0044507950,  0.0047400328,  0.0050480668,
    0.0053761186,  0.0057254891,  0.0060975636,  0.0064938176,
    0.0069158225,  0.0073652516,  0.0078438871,  0.0083536271,
    0.0088964928,  0.009474637,   0.010090352,   0.010746080,
    0.011444421,   0.012188144,   0.012980198,   0.013823725,
    0.014722068,   0.015678791,   0.016697687,   0.017782797,
    0.018938423,   0.020169149,   0.021479854,   0.022875735,
    0.024362330,   0.025945531,   0.027631618,   0.029427276,
    0.031339626,   0.033376252,   0.035545228,   0.037855157,
    0.040315199,   0.042935108,   0.045725273,   0.048696758,
    0.051861348,   0.055231591,   0.058820850,   0.062643361,
    0.066714279,   0.071049749,   0.075666962,   0.080584227,
    0.085821044,   0.091398179,   0.097337747,   0.10366330,
    0.11039993,    0.11757434,    0.12521498,    0.13335215,
    0.14201813,    0.15124727,    0.16107617,    0.17154380,
    0.18269168,    0.19456402,    0.20720788,    0.22067342,
    0.23501402,    0.25028656,    0.26655159,    0.28387361,
    0.30232132,    0.32196786,    0.34289114,    0.36517414,
    0.38890521,    0.41417847,    0.44109412,    0.46975890,
    0.50028648,    0.53279791,    0.56742212,    0.60429640,
    0.64356699,    0.68538959,    0.72993007,    0.77736504,
    0.82788260,    0.88168307,    0.9389798,     1.0,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn db_table_shape() {
        assert_eq!(INVERSE_DB_TABLE[255], 1.0);
        assert!(INVERSE_DB_TABLE[0] < 2e-7);
        assert!(INVERSE_DB_TABLE.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn neighbors_pick_nearest_preceding() {
        let x_list = [0u16, 128, 32, 96, 64];
        assert_eq!(find_neighbors(&x_list, 2), (0, 1));
        assert_eq!(find_neighbors(&x_list, 3), (2, 1));
        assert_eq!(find_neighbors(&x_list, 4), (2, 3));
    }

    #[test]
    fn render_point_interpolates() {
        assert_eq!(render_point(0, 0, 10, 10, 5), 5);
        assert_eq!(render_point(0, 10, 10, 0, 5), 5);
        assert_eq!(render_point(0, 0, 4, 2, 1), 0);
        assert_eq!(render_point(0, 0, 4, 2, 3), 1);
    }

    #[test]
    fn render_line_hits_endpoints() {
        let mut out = vec![1.0f32; 8];
        render_line(&mut out, 0, 255, 8, 255);
        assert!(out.iter().all(|&v| v == 1.0));

        let mut out = vec![1.0f32; 8];
        render_line(&mut out, 0, 0, 8, 255);
        assert_eq!(out[0], INVERSE_DB_TABLE[0]);
        assert!(out[7] > out[0]);
    }

    #[test]
    fn render_line_clamps_to_buffer() {
        let mut out = vec![1.0f32; 4];
        // Segment extending past the half-block is truncated.
        render_line(&mut out, 2, 100, 16, 200);
        assert_eq!(out[0], 1.0);
        assert_eq!(out[1], 1.0);
        assert!(out[2] < 1.0);
        assert!(out[3] < 1.0);
    }

    #[test]
    fn unused_floor_zeroes_the_block() {
        let mut out = vec![0.5f32; 16];
        let floor = Floor::One(Floor1 {
            partition_classes: vec![],
            classes: vec![],
            multiplier: 1,
            range: 256,
            y_bits: 8,
            x_list: vec![0, 16],
            sort_order: vec![0, 1],
            neighbors: vec![],
        });
        floor.apply(&FloorData::Unused, false, &mut out);
        assert!(out.iter().all(|&v| v == 0.0));
    }
}
