//! Inverse modified discrete cosine transform.
//!
//! The split-radix schedule of the libvorbis backward MDCT: spectral
//! rotation into the upper half of the work buffer, cascaded butterflies,
//! a bit-reversal pass and two output rotations. An N-point transform
//! turns N/2 spectral coefficients (in the lower half of the buffer) into
//! N time-domain samples in place; windowing happens outside.
//!
//! Twiddles live in three per-size tables: `a` feeds the rotations and
//! butterflies, `c` the bit-reversal pass and `b` the final rotation. One
//! instance is built per block size and kept for the decoder's lifetime.

use std::f64::consts::PI;

const PI1_8: f32 = 0.923_879_5;
const PI2_8: f32 = std::f32::consts::FRAC_1_SQRT_2;
const PI3_8: f32 = 0.382_683_43;

#[derive(Debug)]
pub(crate) struct Mdct {
    n: usize,
    log2_n: usize,
    a: Box<[f32]>,
    b: Box<[f32]>,
    c: Box<[f32]>,
    bit_rev: Box<[usize]>,
}

impl Mdct {
    pub(crate) fn new(n: usize) -> Self {
        assert!(n >= 64 && n.is_power_of_two());
        let nf = n as f64;
        let log2_n = n.trailing_zeros() as usize;

        let mut a = vec![0.0f32; n / 2];
        let mut b = vec![0.0f32; n / 2];
        for i in 0..n / 4 {
            a[i * 2] = (4.0 * PI * i as f64 / nf).cos() as f32;
            a[i * 2 + 1] = -((4.0 * PI * i as f64 / nf).sin()) as f32;
            b[i * 2] = (PI * (2 * i + 1) as f64 / (2.0 * nf)).cos() as f32;
            b[i * 2 + 1] = (PI * (2 * i + 1) as f64 / (2.0 * nf)).sin() as f32;
        }
        let mut c = vec![0.0f32; n / 4];
        for i in 0..n / 8 {
            c[i * 2] = (2.0 * PI * (2 * i + 1) as f64 / nf).cos() as f32 * 0.5;
            c[i * 2 + 1] = -((2.0 * PI * (2 * i + 1) as f64 / nf).sin()) as f32 * 0.5;
        }

        let mask = (1usize << (log2_n - 1)) - 1;
        let msb = 1usize << (log2_n - 2);
        let mut bit_rev = Vec::with_capacity(n / 4);
        for i in 0..n / 8 {
            let mut acc = 0usize;
            let mut j = 0;
            while msb >> j != 0 {
                if (msb >> j) & i != 0 {
                    acc |= 1 << j;
                }
                j += 1;
            }
            bit_rev.push(((!acc) & mask) - 1);
            bit_rev.push(acc);
        }

        Self {
            n,
            log2_n,
            a: a.into_boxed_slice(),
            b: b.into_boxed_slice(),
            c: c.into_boxed_slice(),
            bit_rev: bit_rev.into_boxed_slice(),
        }
    }

    pub(crate) fn block_size(&self) -> usize {
        self.n
    }

    /// In-place inverse transform: `buf[..n/2]` holds the coefficients on
    /// entry, `buf[..n]` the time-domain samples on return.
    pub(crate) fn inverse(&self, buf: &mut [f32]) {
        assert_eq!(buf.len(), self.n);
        let n = self.n;
        let n2 = n >> 1;
        let n4 = n >> 2;
        let a = &self.a;

        // Rotate the spectrum into the upper half of the buffer.
        let mut src = n2 - 7;
        let mut dst = n2 + n4;
        let mut t = n4;
        loop {
            dst -= 4;
            buf[dst] = -buf[src + 2] * a[t + 3] - buf[src] * a[t + 2];
            buf[dst + 1] = buf[src] * a[t + 3] - buf[src + 2] * a[t + 2];
            buf[dst + 2] = -buf[src + 6] * a[t + 1] - buf[src + 4] * a[t];
            buf[dst + 3] = buf[src + 4] * a[t + 1] - buf[src + 6] * a[t];
            if src < 8 {
                break;
            }
            src -= 8;
            t += 4;
        }

        let mut src = n2 - 8;
        let mut dst = n2 + n4;
        let mut t = n4;
        loop {
            t -= 4;
            buf[dst] = buf[src + 4] * a[t + 3] + buf[src + 6] * a[t + 2];
            buf[dst + 1] = buf[src + 4] * a[t + 2] - buf[src + 6] * a[t + 3];
            buf[dst + 2] = buf[src] * a[t + 1] + buf[src + 2] * a[t];
            buf[dst + 3] = buf[src] * a[t] - buf[src + 2] * a[t + 1];
            if src < 8 {
                break;
            }
            src -= 8;
            dst += 4;
        }

        self.butterflies(&mut buf[n2..]);
        self.bit_reverse_stage(buf);

        // Rotate through the C twiddles back into the lower half.
        let b = &self.b;
        let mut dst1 = n2 + n4;
        let mut dst2 = n2 + n4;
        let mut src = 0;
        let mut t = 0;
        loop {
            dst1 -= 4;
            buf[dst1 + 3] = buf[src] * b[t + 1] - buf[src + 1] * b[t];
            buf[dst2] = -(buf[src] * b[t] + buf[src + 1] * b[t + 1]);
            buf[dst1 + 2] = buf[src + 2] * b[t + 3] - buf[src + 3] * b[t + 2];
            buf[dst2 + 1] = -(buf[src + 2] * b[t + 2] + buf[src + 3] * b[t + 3]);
            buf[dst1 + 1] = buf[src + 4] * b[t + 5] - buf[src + 5] * b[t + 4];
            buf[dst2 + 2] = -(buf[src + 4] * b[t + 4] + buf[src + 5] * b[t + 5]);
            buf[dst1] = buf[src + 6] * b[t + 7] - buf[src + 7] * b[t + 6];
            buf[dst2 + 3] = -(buf[src + 6] * b[t + 6] + buf[src + 7] * b[t + 7]);
            dst2 += 4;
            src += 8;
            t += 8;
            if src >= dst1 {
                break;
            }
        }

        // Mirror the center quarter with negation.
        let mut src = n2 + n4;
        let mut dst1 = n4;
        let mut dst2 = n4;
        loop {
            dst1 -= 4;
            src -= 4;
            let v = buf[src + 3];
            buf[dst1 + 3] = v;
            buf[dst2] = -v;
            let v = buf[src + 2];
            buf[dst1 + 2] = v;
            buf[dst2 + 1] = -v;
            let v = buf[src + 1];
            buf[dst1 + 1] = v;
            buf[dst2 + 2] = -v;
            let v = buf[src];
            buf[dst1] = v;
            buf[dst2 + 3] = -v;
            dst2 += 4;
            if dst2 >= src {
                break;
            }
        }

        // Reverse the upper quarter into the back half.
        let mut src = n2 + n4;
        let mut dst = n2 + n4;
        let end = n2;
        loop {
            dst -= 4;
            buf[dst] = buf[src + 3];
            buf[dst + 1] = buf[src + 2];
            buf[dst + 2] = buf[src + 1];
            buf[dst + 3] = buf[src];
            src += 4;
            if dst <= end {
                break;
            }
        }
    }

    fn butterflies(&self, x: &mut [f32]) {
        let stages = self.log2_n - 5;
        if stages > 1 {
            self.butterfly_first(x);
        }
        for stage in 1..stages.saturating_sub(1) {
            let span = x.len() >> stage;
            for block in 0..1usize << stage {
                let start = span * block;
                self.butterfly_generic(&mut x[start..start + span], 4 << stage);
            }
        }
        let mut j = 0;
        while j < x.len() {
            butterfly_32(&mut x[j..]);
            j += 32;
        }
    }

    fn butterfly_first(&self, x: &mut [f32]) {
        let a = &self.a;
        let mut hi = x.len() - 8;
        let mut lo = (x.len() >> 1) - 8;
        let mut t = 0;
        loop {
            let r0 = x[hi + 6] - x[lo + 6];
            let r1 = x[hi + 7] - x[lo + 7];
            x[hi + 6] += x[lo + 6];
            x[hi + 7] += x[lo + 7];
            x[lo + 6] = r1 * a[t + 1] + r0 * a[t];
            x[lo + 7] = r1 * a[t] - r0 * a[t + 1];

            let r0 = x[hi + 4] - x[lo + 4];
            let r1 = x[hi + 5] - x[lo + 5];
            x[hi + 4] += x[lo + 4];
            x[hi + 5] += x[lo + 5];
            x[lo + 4] = r1 * a[t + 5] + r0 * a[t + 4];
            x[lo + 5] = r1 * a[t + 4] - r0 * a[t + 5];

            let r0 = x[hi + 2] - x[lo + 2];
            let r1 = x[hi + 3] - x[lo + 3];
            x[hi + 2] += x[lo + 2];
            x[hi + 3] += x[lo + 3];
            x[lo + 2] = r1 * a[t + 9] + r0 * a[t + 8];
            x[lo + 3] = r1 * a[t + 8] - r0 * a[t + 9];

            let r0 = x[hi] - x[lo];
            let r1 = x[hi + 1] - x[lo + 1];
            x[hi] += x[lo];
            x[hi + 1] += x[lo + 1];
            x[lo] = r1 * a[t + 13] + r0 * a[t + 12];
            x[lo + 1] = r1 * a[t + 12] - r0 * a[t + 13];

            if lo < 8 {
                break;
            }
            hi -= 8;
            lo -= 8;
            t += 16;
        }
    }

    fn butterfly_generic(&self, x: &mut [f32], stride: usize) {
        let a = &self.a;
        let mut hi = x.len() - 8;
        let mut lo = (x.len() >> 1) - 8;
        let mut t = 0;
        loop {
            for k in (0..8).step_by(2).rev() {
                let r0 = x[hi + k] - x[lo + k];
                let r1 = x[hi + k + 1] - x[lo + k + 1];
                x[hi + k] += x[lo + k];
                x[hi + k + 1] += x[lo + k + 1];
                x[lo + k] = r1 * a[t + 1] + r0 * a[t];
                x[lo + k + 1] = r1 * a[t] - r0 * a[t + 1];
                t += stride;
            }
            if lo < 8 {
                break;
            }
            hi -= 8;
            lo -= 8;
        }
    }

    fn bit_reverse_stage(&self, x: &mut [f32]) {
        let n2 = self.n >> 1;
        let c = &self.c;
        let rev = &self.bit_rev;
        let mut bit = 0;
        let mut lo = 0;
        let mut hi = n2;
        let mut t = 0;
        loop {
            let x0 = n2 + rev[bit];
            let x1 = n2 + rev[bit + 1];

            let r0 = x[x0 + 1] - x[x1 + 1];
            let r1 = x[x0] + x[x1];
            let r2 = r1 * c[t] + r0 * c[t + 1];
            let r3 = r1 * c[t + 1] - r0 * c[t];
            hi -= 4;
            let r0 = (x[x0 + 1] + x[x1 + 1]) * 0.5;
            let r1 = (x[x0] - x[x1]) * 0.5;
            x[lo] = r0 + r2;
            x[hi + 2] = r0 - r2;
            x[lo + 1] = r1 + r3;
            x[hi + 3] = r3 - r1;

            let x0 = n2 + rev[bit + 2];
            let x1 = n2 + rev[bit + 3];

            let r0 = x[x0 + 1] - x[x1 + 1];
            let r1 = x[x0] + x[x1];
            let r2 = r1 * c[t + 2] + r0 * c[t + 3];
            let r3 = r1 * c[t + 3] - r0 * c[t + 2];
            let r0 = (x[x0 + 1] + x[x1 + 1]) * 0.5;
            let r1 = (x[x0] - x[x1]) * 0.5;
            x[lo + 2] = r0 + r2;
            x[hi] = r0 - r2;
            x[lo + 3] = r1 + r3;
            x[hi + 1] = r3 - r1;

            t += 4;
            bit += 4;
            lo += 4;
            if lo >= hi {
                break;
            }
        }
    }
}

fn butterfly_8(x: &mut [f32]) {
    let r0 = x[6] + x[2];
    let r1 = x[6] - x[2];
    let r2 = x[4] + x[0];
    let r3 = x[4] - x[0];
    x[6] = r0 + r2;
    x[4] = r0 - r2;
    let r0 = x[5] - x[1];
    let r2 = x[7] - x[3];
    x[0] = r1 + r0;
    x[2] = r1 - r0;
    let r0 = x[5] + x[1];
    let r1 = x[7] + x[3];
    x[3] = r2 + r3;
    x[1] = r2 - r3;
    x[7] = r1 + r0;
    x[5] = r1 - r0;
}

fn butterfly_16(x: &mut [f32]) {
    let r0 = x[1] - x[9];
    let r1 = x[0] - x[8];
    x[8] += x[0];
    x[9] += x[1];
    x[0] = (r0 + r1) * PI2_8;
    x[1] = (r0 - r1) * PI2_8;

    let r0 = x[3] - x[11];
    let r1 = x[10] - x[2];
    x[10] += x[2];
    x[11] += x[3];
    x[2] = r0;
    x[3] = r1;

    let r0 = x[12] - x[4];
    let r1 = x[13] - x[5];
    x[12] += x[4];
    x[13] += x[5];
    x[4] = (r0 - r1) * PI2_8;
    x[5] = (r0 + r1) * PI2_8;

    let r0 = x[14] - x[6];
    let r1 = x[15] - x[7];
    x[14] += x[6];
    x[15] += x[7];
    x[6] = r0;
    x[7] = r1;

    butterfly_8(x);
    butterfly_8(&mut x[8..]);
}

fn butterfly_32(x: &mut [f32]) {
    let r0 = x[30] - x[14];
    let r1 = x[31] - x[15];
    x[30] += x[14];
    x[31] += x[15];
    x[14] = r0;
    x[15] = r1;

    let r0 = x[28] - x[12];
    let r1 = x[29] - x[13];
    x[28] += x[12];
    x[29] += x[13];
    x[12] = r0 * PI1_8 - r1 * PI3_8;
    x[13] = r0 * PI3_8 + r1 * PI1_8;

    let r0 = x[26] - x[10];
    let r1 = x[27] - x[11];
    x[26] += x[10];
    x[27] += x[11];
    x[10] = (r0 - r1) * PI2_8;
    x[11] = (r0 + r1) * PI2_8;

    let r0 = x[24] - x[8];
    let r1 = x[25] - x[9];
    x[24] += x[8];
    x[25] += x[9];
    x[8] = r0 * PI3_8 - r1 * PI1_8;
    x[9] = r1 * PI3_8 + r0 * PI1_8;

    let r0 = x[22] - x[6];
    let r1 = x[7] - x[23];
    x[22] += x[6];
    x[23] += x[7];
    x[6] = r1;
    x[7] = r0;

    let r0 = x[4] - x[20];
    let r1 = x[5] - x[21];
    x[20] += x[4];
    x[21] += x[5];
    x[4] = r1 * PI1_8 + r0 * PI3_8;
    x[5] = r1 * PI3_8 - r0 * PI1_8;

    let r0 = x[2] - x[18];
    let r1 = x[3] - x[19];
    x[18] += x[2];
    x[19] += x[3];
    x[2] = (r1 + r0) * PI2_8;
    x[3] = (r1 - r0) * PI2_8;

    let r0 = x[0] - x[16];
    let r1 = x[1] - x[17];
    x[16] += x[0];
    x[17] += x[1];
    x[0] = r1 * PI3_8 + r0 * PI1_8;
    x[1] = r1 * PI1_8 - r0 * PI3_8;

    butterfly_16(x);
    butterfly_16(&mut x[16..]);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Direct O(n^2) evaluation of the Vorbis inverse MDCT definition in
    /// double precision.
    fn inverse_slow(coeffs: &[f32]) -> Vec<f64> {
        let n = coeffs.len() * 2;
        (0..n)
            .map(|i| {
                coeffs
                    .iter()
                    .enumerate()
                    .map(|(j, &x)| {
                        let angle = PI / 2.0 / n as f64
                            * (2.0 * i as f64 + 1.0 + n as f64 / 2.0)
                            * (2.0 * j as f64 + 1.0);
                        f64::from(x) * angle.cos()
                    })
                    .sum()
            })
            .collect()
    }

    /// Deterministic pseudo-random coefficients in [-1, 1].
    fn test_coeffs(len: usize, mut seed: u32) -> Vec<f32> {
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345) & 0x7FFF_FFFF;
                (seed as f32 / 0x4000_0000u32 as f32) - 1.0
            })
            .collect()
    }

    #[test]
    fn matches_direct_evaluation() {
        for (n, seed) in [(64usize, 1u32), (128, 7), (256, 42), (512, 1234)] {
            let coeffs = test_coeffs(n / 2, seed);
            let expected = inverse_slow(&coeffs);

            let mdct = Mdct::new(n);
            let mut buf = vec![0.0f32; n];
            buf[..n / 2].copy_from_slice(&coeffs);
            mdct.inverse(&mut buf);

            // Per-sample absolute error stays within 1e-5 of the block's
            // peak output magnitude.
            let scale = expected.iter().fold(1.0f64, |peak, &v| peak.max(v.abs()));
            let tolerance = 1e-5 * scale;
            for (i, (&got, &want)) in buf.iter().zip(expected.iter()).enumerate() {
                assert!(
                    (f64::from(got) - want).abs() < tolerance,
                    "n {n} sample {i}: {got} vs {want} (tolerance {tolerance})"
                );
            }
        }
    }

    #[test]
    fn block_size_is_reported() {
        assert_eq!(Mdct::new(2048).block_size(), 2048);
    }
}
