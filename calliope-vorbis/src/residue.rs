//! Residue decoding: the partitioned-VQ spectral detail.
//!
//! All three residue formats share the cascade structure: classifications
//! decoded through a class book on pass zero, then up to eight passes of
//! per-partition vector additions. They differ only in how a decoded
//! vector lands in the channel buffers. Format 2 folds every channel into
//! one interleaved virtual channel.
//!
//! Running out of packet bits, or hitting an undecodable codeword, ends
//! the whole residue decode cleanly; whatever was already written stays.

use calliope_core::bitstream::BitReader;

use crate::codebook::Codebook;
use crate::error::{Result, VorbisError};

#[derive(Debug)]
pub(crate) struct Residue {
    kind: u8,
    begin: u32,
    end: u32,
    partition_size: u32,
    classifications: u32,
    class_book: u8,
    /// Per classification: the book used at each cascade pass.
    books: Vec<[Option<u8>; 8]>,
}

impl Residue {
    /// Parse one residue configuration from the setup header.
    pub(crate) fn read(reader: &mut BitReader<'_>, codebooks: &[Codebook]) -> Result<Self> {
        let kind = match reader.read_u16()? {
            k @ 0..=2 => k as u8,
            other => {
                return Err(VorbisError::Unsupported(format!("residue type {other}")))
            }
        };
        let begin = reader.read_bits(24)? as u32;
        let end = reader.read_bits(24)? as u32;
        if end < begin {
            return Err(VorbisError::InvalidResidue("end before begin".into()));
        }
        let partition_size = reader.read_bits(24)? as u32 + 1;
        let classifications = reader.read_bits(6)? as u32 + 1;
        let class_book = reader.read_u8()?;
        let valid_class_book = codebooks
            .get(usize::from(class_book))
            .is_some_and(|b| b.dimensions > 0);
        if !valid_class_book {
            return Err(VorbisError::InvalidResidue(
                "classification book missing or zero-dimensional".into(),
            ));
        }

        let mut cascades = Vec::with_capacity(classifications as usize);
        for _ in 0..classifications {
            let low = reader.read_bits(3)? as u32;
            let high = if reader.read_bit_flag()? {
                reader.read_bits(5)? as u32
            } else {
                0
            };
            cascades.push(high << 3 | low);
        }

        let mut books = Vec::with_capacity(cascades.len());
        for cascade in cascades {
            let mut passes = [None; 8];
            for (pass, slot) in passes.iter_mut().enumerate() {
                if cascade & (1 << pass) != 0 {
                    let book = reader.read_u8()?;
                    let usable = codebooks
                        .get(usize::from(book))
                        .is_some_and(Codebook::has_lookup);
                    if !usable {
                        // A residue book without a value mapping renders
                        // the stream undecodable.
                        return Err(VorbisError::InvalidResidue(
                            "residue book without a value mapping".into(),
                        ));
                    }
                    *slot = Some(book);
                }
            }
            books.push(passes);
        }

        Ok(Self {
            kind,
            begin,
            end,
            partition_size,
            classifications,
            class_book,
            books,
        })
    }

    /// Decode residue vectors for the channels of one submap.
    ///
    /// `channels` lists the channel indices belonging to the submap and
    /// `do_not_decode` parallels it; `rows` spans all channels of the
    /// stream. The touched rows are zeroed up to `half_block` first.
    pub(crate) fn decode(
        &self,
        reader: &mut BitReader<'_>,
        codebooks: &[Codebook],
        channels: &[usize],
        do_not_decode: &[bool],
        rows: &mut [Vec<f32>],
        half_block: usize,
    ) {
        for &ch in channels {
            rows[ch][..half_block].fill(0.0);
        }
        if channels.is_empty() {
            return;
        }

        let interleaved = self.kind == 2;
        if interleaved && do_not_decode.iter().all(|&skip| skip) {
            return;
        }
        let virtual_channels = if interleaved { 1 } else { channels.len() };
        let actual_size = if interleaved {
            half_block * channels.len()
        } else {
            half_block
        };
        let begin = (self.begin as usize).min(actual_size);
        let end = (self.end as usize).min(actual_size);
        let partition_size = self.partition_size as usize;
        let partitions_to_read = (end - begin) / partition_size;
        if partitions_to_read == 0 {
            return;
        }

        let class_book = &codebooks[usize::from(self.class_book)];
        let words_per_codeword = usize::from(class_book.dimensions);
        let stride = partitions_to_read + words_per_codeword;
        let mut classes = vec![0u32; virtual_channels * stride];

        'bad_packet: for pass in 0..8 {
            let mut partition = 0;
            while partition < partitions_to_read {
                if pass == 0 {
                    for vch in 0..virtual_channels {
                        if !interleaved && do_not_decode[vch] {
                            continue;
                        }
                        let Some(mut word) = class_book.decode_scalar(reader) else {
                            break 'bad_packet;
                        };
                        for i in (0..words_per_codeword).rev() {
                            classes[vch * stride + i + partition] = word % self.classifications;
                            word /= self.classifications;
                        }
                    }
                }
                for _ in 0..words_per_codeword {
                    if partition >= partitions_to_read {
                        break;
                    }
                    for vch in 0..virtual_channels {
                        if !interleaved && do_not_decode[vch] {
                            continue;
                        }
                        let class = classes[vch * stride + partition] as usize;
                        if let Some(book) = self.books[class][pass] {
                            let book = &codebooks[usize::from(book)];
                            let offset = begin + partition * partition_size;
                            if !self.add_partition(reader, book, vch, offset, channels, rows) {
                                break 'bad_packet;
                            }
                        }
                    }
                    partition += 1;
                }
            }
        }
    }

    /// Add one partition's worth of decoded vectors at `offset`; false
    /// stops the whole residue decode.
    fn add_partition(
        &self,
        reader: &mut BitReader<'_>,
        book: &Codebook,
        vch: usize,
        offset: usize,
        channels: &[usize],
        rows: &mut [Vec<f32>],
    ) -> bool {
        let partition_size = self.partition_size as usize;
        let dim = usize::from(book.dimensions);
        match self.kind {
            0 => {
                // Format 0 deinterleaves each vector across the partition.
                let step = partition_size / dim;
                for i in 0..step {
                    let Some(values) = book.decode_vq(reader) else {
                        return false;
                    };
                    let row = &mut rows[channels[vch]];
                    for (k, &v) in values.iter().enumerate() {
                        row[offset + i + k * step] += v;
                    }
                }
            }
            1 => {
                let mut i = 0;
                while i < partition_size {
                    let Some(values) = book.decode_vq(reader) else {
                        return false;
                    };
                    let row = &mut rows[channels[vch]];
                    for &v in values {
                        if i >= partition_size {
                            break;
                        }
                        row[offset + i] += v;
                        i += 1;
                    }
                }
            }
            _ => {
                // Format 2: positions interleave all submap channels.
                let ch_count = channels.len();
                let mut i = 0;
                while i < partition_size {
                    let Some(values) = book.decode_vq(reader) else {
                        return false;
                    };
                    for &v in values {
                        if i >= partition_size {
                            break;
                        }
                        let pos = offset + i;
                        rows[channels[pos % ch_count]][pos / ch_count] += v;
                        i += 1;
                    }
                }
            }
        }
        true
    }
}
