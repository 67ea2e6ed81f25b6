//! The packet-level Vorbis decoder.
//!
//! Feed the three header packets through [`VorbisDecoder::submit_header_packet`],
//! then audio packets through [`VorbisDecoder::decode_audio`]. The decoder
//! owns two channel matrices rotated by handle swap each packet: the
//! current block is merged with the stored right half of the previous
//! block, the merged span is exposed to the caller, and the new right half
//! is kept for the next packet. The first packet after construction or a
//! [`reset`](VorbisDecoder::reset) therefore yields no samples.

use std::mem;

use calliope_core::bitstream::BitReader;
use tracing::debug;

use crate::error::{Result, VorbisError};
use crate::floor::FloorData;
use crate::header::{
    self, Setup, VorbisComments, VorbisInfo, HEADER_COMMENT, HEADER_IDENTIFICATION, HEADER_SETUP,
};
use crate::mdct::Mdct;
use crate::window::Windows;

/// Progress through the header handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Waiting for the identification header.
    AwaitingIdentification,
    /// Waiting for the comment header.
    AwaitingComments,
    /// Waiting for the setup header.
    AwaitingSetup,
    /// All headers accepted; audio packets decode.
    Ready,
}

/// The samples one audio packet contributed, borrowed from the decoder.
#[derive(Debug)]
pub struct DecodedSamples<'a> {
    rows: &'a [Vec<f32>],
    start: usize,
    end: usize,
}

impl DecodedSamples<'_> {
    /// Frames (samples per channel) in this emission.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    /// Whether the packet emitted nothing (always true for the first
    /// packet after a reset).
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Number of channels.
    pub fn channels(&self) -> usize {
        self.rows.len()
    }

    /// The emitted samples of one channel.
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.rows[index][self.start..self.end]
    }

    /// Drop `frames` from the front, e.g. to resume mid-packet after a
    /// seek.
    pub fn skip_front(&mut self, frames: usize) {
        self.start = (self.start + frames).min(self.end);
    }

    /// Keep only the first `frames`, e.g. for granule trimming at the end
    /// of the stream.
    pub fn truncate(&mut self, frames: usize) {
        self.end = (self.start + frames).min(self.end);
    }
}

/// A streaming Vorbis I decoder for one logical stream.
#[derive(Debug, Default)]
pub struct VorbisDecoder {
    state: Option<ReadyState>,
    info: Option<VorbisInfo>,
    comments: Option<VorbisComments>,
}

/// Everything that exists only after the setup header.
#[derive(Debug)]
struct ReadyState {
    setup: Setup,
    windows: Windows,
    /// Inverse transforms for the short and long block sizes.
    mdct: [Mdct; 2],
    /// Current block under construction, one row per channel.
    work: Vec<Vec<f32>>,
    /// Previous block; its stored right half feeds the overlap-add.
    prev: Vec<Vec<f32>>,
    /// Region of `prev` holding the previous right half.
    prev_range: Option<(usize, usize)>,
}

impl VorbisDecoder {
    /// Create a decoder awaiting its identification header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current handshake state.
    pub fn state(&self) -> DecoderState {
        if self.state.is_some() {
            DecoderState::Ready
        } else if self.comments.is_some() {
            DecoderState::AwaitingSetup
        } else if self.info.is_some() {
            DecoderState::AwaitingComments
        } else {
            DecoderState::AwaitingIdentification
        }
    }

    /// Whether all three headers were accepted.
    pub fn is_ready(&self) -> bool {
        self.state.is_some()
    }

    /// Stream parameters, after the identification header.
    pub fn info(&self) -> Option<&VorbisInfo> {
        self.info.as_ref()
    }

    /// Stream metadata, after the comment header.
    pub fn comments(&self) -> Option<&VorbisComments> {
        self.comments.as_ref()
    }

    /// Accept one header packet; the trio must arrive in order.
    pub fn submit_header_packet(&mut self, packet: &[u8]) -> Result<()> {
        let mut reader = BitReader::new(packet);
        let kind = header::read_header_intro(&mut reader)?;
        match (self.state(), kind) {
            (DecoderState::AwaitingIdentification, HEADER_IDENTIFICATION) => {
                let info = header::read_identification(&mut reader)?;
                debug!(
                    channels = info.channels,
                    sample_rate = info.sample_rate,
                    block_sizes = ?(info.block_size_0, info.block_size_1),
                    "identification header accepted"
                );
                self.info = Some(info);
                Ok(())
            }
            (DecoderState::AwaitingComments, HEADER_COMMENT) => {
                self.comments = Some(header::read_comments(&mut reader)?);
                Ok(())
            }
            (DecoderState::AwaitingSetup, HEADER_SETUP) => {
                // Info is present in this state.
                let info = self.info.clone().unwrap_or_default();
                let setup = header::read_setup(&mut reader, &info)?;
                let bs0 = usize::from(info.block_size_0);
                let bs1 = usize::from(info.block_size_1);
                let channels = usize::from(info.channels);
                debug!(
                    codebooks = setup.codebooks.len(),
                    floors = setup.floors.len(),
                    residues = setup.residues.len(),
                    modes = setup.modes.len(),
                    "setup header accepted"
                );
                self.state = Some(ReadyState {
                    setup,
                    windows: Windows::new(bs0, bs1),
                    mdct: [Mdct::new(bs0), Mdct::new(bs1)],
                    work: vec![vec![0.0; bs1]; channels],
                    prev: vec![vec![0.0; bs1]; channels],
                    prev_range: None,
                });
                Ok(())
            }
            (_, HEADER_IDENTIFICATION | HEADER_COMMENT | HEADER_SETUP) => Err(
                VorbisError::InvalidHeader("header out of order or duplicated".into()),
            ),
            (_, other) => Err(VorbisError::InvalidHeader(format!(
                "unknown header type {other}"
            ))),
        }
    }

    /// Forget the overlap state, e.g. after a seek. Setup is kept; the
    /// next audio packet primes the window and emits nothing.
    pub fn reset(&mut self) {
        if let Some(state) = &mut self.state {
            state.prev_range = None;
        }
    }

    /// Decode one audio packet and expose the samples it completed.
    ///
    /// A damaged packet fails without touching the overlap state; decoding
    /// simply continues with the next packet.
    pub fn decode_audio(&mut self, packet: &[u8]) -> Result<DecodedSamples<'_>> {
        let info = self.info.as_ref().ok_or(VorbisError::NotInitialized)?;
        let state = self.state.as_mut().ok_or(VorbisError::NotInitialized)?;
        let channels = usize::from(info.channels);

        let mut reader = BitReader::new(packet);
        if reader.read_bits(1)? != 0 {
            return Err(VorbisError::InvalidPacket(
                "header packet in the audio sequence".into(),
            ));
        }
        let mode_index = reader.read_bits(state.setup.mode_bits)? as usize;
        let mode = *state
            .setup
            .modes
            .get(mode_index)
            .ok_or_else(|| VorbisError::InvalidPacket("mode number out of range".into()))?;
        let (previous_long, next_long) = if mode.block_flag {
            (reader.read_bit_flag()?, reader.read_bit_flag()?)
        } else {
            (true, true)
        };
        let geometry = state.windows.geometry(mode.block_flag, previous_long, next_long);
        let n = geometry.n;
        let half = n / 2;

        let setup = &state.setup;
        let mapping = &setup.mappings[usize::from(mode.mapping)];

        // Floor data for every channel, then energy propagation across
        // coupled pairs.
        let mut floor_data = Vec::with_capacity(channels);
        for ch in 0..channels {
            let submap = &mapping.submaps[usize::from(mapping.mux[ch])];
            let floor = &setup.floors[usize::from(submap.floor)];
            floor_data.push(floor.unpack(&mut reader, &setup.codebooks)?);
        }
        let mut no_residue: Vec<bool> = floor_data.iter().map(FloorData::is_unused).collect();
        mapping.propagate_energy(&mut no_residue);

        // Residue per submap, channel-selectively.
        for submap in &mapping.submaps {
            let do_not_decode: Vec<bool> =
                submap.channels.iter().map(|&ch| no_residue[ch]).collect();
            let residue = &setup.residues[usize::from(submap.residue)];
            residue.decode(
                &mut reader,
                &setup.codebooks,
                &submap.channels,
                &do_not_decode,
                &mut state.work,
                half,
            );
        }

        mapping.inverse_couple(&mut state.work, half);

        // Floor curve and inverse transform per channel.
        for ch in 0..channels {
            let row = &mut state.work[ch];
            if floor_data[ch].is_unused() {
                row[..n].fill(0.0);
                continue;
            }
            let submap = &mapping.submaps[usize::from(mapping.mux[ch])];
            let floor = &setup.floors[usize::from(submap.floor)];
            floor.apply(&floor_data[ch], mode.block_flag, &mut row[..half]);
            row[half..n].fill(0.0);
            state.mdct[usize::from(mode.block_flag)].inverse(&mut row[..n]);
        }

        // Left window slope and overlap-add with the stored right half of
        // the previous block.
        let overlap = geometry.left_end - geometry.left_start;
        let slope = state.windows.slope(overlap);
        for ch in 0..channels {
            let row = &mut state.work[ch];
            for (i, &s) in slope.iter().enumerate() {
                row[geometry.left_start + i] *= s;
            }
            if let Some((tail_start, tail_end)) = state.prev_range {
                let tail = &state.prev[ch][tail_start..tail_end];
                let count = tail.len().min(overlap);
                for (k, &t) in tail[..count].iter().enumerate() {
                    row[geometry.left_start + k] += t * slope[count - 1 - k];
                }
            }
        }

        let emitted = if state.prev_range.is_some() {
            (geometry.left_start, geometry.right_start)
        } else {
            (0, 0)
        };
        mem::swap(&mut state.work, &mut state.prev);
        state.prev_range = Some((geometry.right_start, geometry.right_end));

        Ok(DecodedSamples {
            rows: &state.prev,
            start: emitted.0,
            end: emitted.1,
        })
    }

    /// The number of samples `packet` would emit once the decoder is warm,
    /// without decoding it or touching any state.
    ///
    /// `is_last_in_page` selects the libvorbis granule correction for a
    /// long block followed by a short one across a page boundary.
    pub fn packet_sample_count(&self, packet: &[u8], is_last_in_page: bool) -> Result<u64> {
        let info = self.info.as_ref().ok_or(VorbisError::NotInitialized)?;
        let state = self.state.as_ref().ok_or(VorbisError::NotInitialized)?;

        let mut reader = BitReader::new(packet);
        if reader.read_bits(1)? != 0 {
            return Err(VorbisError::InvalidPacket("not an audio packet".into()));
        }
        let mode_index = reader.read_bits(state.setup.mode_bits)? as usize;
        let mode = state
            .setup
            .modes
            .get(mode_index)
            .ok_or_else(|| VorbisError::InvalidPacket("mode number out of range".into()))?;
        let (previous_long, next_long) = if mode.block_flag {
            (reader.read_bit_flag()?, reader.read_bit_flag()?)
        } else {
            (true, true)
        };
        let geometry = state.windows.geometry(mode.block_flag, previous_long, next_long);

        let mut count = geometry.sample_count() as u64;
        if is_last_in_page && mode.block_flag && !next_long {
            let shrink = (info.block_size_1 - info.block_size_0) / 4;
            count = count.saturating_sub(u64::from(shrink));
        }
        Ok(count)
    }
}
