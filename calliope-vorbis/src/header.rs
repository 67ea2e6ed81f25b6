//! Vorbis header packet parsing.
//!
//! The three header packets arrive in order: identification, comments,
//! setup. All are marked by an odd type byte and the six-octet "vorbis"
//! magic; the setup packet carries every codebook, floor, residue, mapping
//! and mode the audio packets will reference.

use calliope_core::bitstream::BitReader;

use crate::codebook::Codebook;
use crate::error::{Result, VorbisError};
use crate::floor::Floor;
use crate::mapping::Mapping;
use crate::residue::Residue;
use crate::window::Mode;
use crate::{ilog, MAX_BLOCK_SIZE, MIN_BLOCK_SIZE};

/// The 48-bit little-endian "vorbis" magic.
pub(crate) const VORBIS_MAGIC: u64 = 0x7369_6272_6F76;

/// Identification header packet type.
pub(crate) const HEADER_IDENTIFICATION: u8 = 1;
/// Comment header packet type.
pub(crate) const HEADER_COMMENT: u8 = 3;
/// Setup header packet type.
pub(crate) const HEADER_SETUP: u8 = 5;

/// Stream parameters from the identification header.
#[derive(Debug, Clone, Default)]
pub struct VorbisInfo {
    /// Vorbis version; always 0.
    pub version: u32,
    /// Number of channels.
    pub channels: u8,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Maximum bitrate hint; 0 when unset.
    pub bitrate_maximum: i32,
    /// Nominal bitrate hint; 0 when unset.
    pub bitrate_nominal: i32,
    /// Minimum bitrate hint; 0 when unset.
    pub bitrate_minimum: i32,
    /// Short block size in samples.
    pub block_size_0: u16,
    /// Long block size in samples.
    pub block_size_1: u16,
}

/// Stream metadata from the comment header.
#[derive(Debug, Clone, Default)]
pub struct VorbisComments {
    /// Encoder vendor string.
    pub vendor: String,
    comments: Vec<(String, String)>,
}

impl VorbisComments {
    /// Look up the first comment with `key`, case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.comments
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All values stored under `key`, case-insensitively.
    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> {
        self.comments
            .iter()
            .filter(move |(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// All comments as key/value pairs, in stream order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.comments.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of comments.
    pub fn len(&self) -> usize {
        self.comments.len()
    }

    /// Whether the header carried no comments.
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }

    /// Track title.
    pub fn title(&self) -> Option<&str> {
        self.get("title")
    }

    /// Track artist.
    pub fn artist(&self) -> Option<&str> {
        self.get("artist")
    }

    /// Album name.
    pub fn album(&self) -> Option<&str> {
        self.get("album")
    }

    /// Track number, as written in the stream.
    pub fn track_number(&self) -> Option<&str> {
        self.get("tracknumber")
    }
}

/// All setup-header state the audio packets reference.
#[derive(Debug)]
pub(crate) struct Setup {
    pub(crate) codebooks: Vec<Codebook>,
    pub(crate) floors: Vec<Floor>,
    pub(crate) residues: Vec<Residue>,
    pub(crate) mappings: Vec<Mapping>,
    pub(crate) modes: Vec<Mode>,
    /// Bits spent on the mode number of each audio packet.
    pub(crate) mode_bits: u32,
}

/// Check the header type byte and magic; returns the header type.
pub(crate) fn read_header_intro(reader: &mut BitReader<'_>) -> Result<u8> {
    if reader.read_bits(1)? != 1 {
        return Err(VorbisError::InvalidHeader(
            "audio packet where a header was expected".into(),
        ));
    }
    let kind = ((reader.read_bits(7)? as u8) << 1) | 1;
    if reader.read_bits(48)? != VORBIS_MAGIC {
        return Err(VorbisError::InvalidHeader("missing \"vorbis\" magic".into()));
    }
    Ok(kind)
}

pub(crate) fn read_identification(reader: &mut BitReader<'_>) -> Result<VorbisInfo> {
    let version = reader.read_u32()?;
    if version != 0 {
        return Err(VorbisError::Unsupported(format!("vorbis version {version}")));
    }
    let channels = reader.read_u8()?;
    if channels == 0 {
        return Err(VorbisError::InvalidHeader("zero channels".into()));
    }
    let sample_rate = reader.read_u32()?;
    if sample_rate == 0 {
        return Err(VorbisError::InvalidHeader("zero sample rate".into()));
    }
    let bitrate_maximum = reader.read_u32()? as i32;
    let bitrate_nominal = reader.read_u32()? as i32;
    let bitrate_minimum = reader.read_u32()? as i32;

    let block_size_0 = 1u32 << reader.read_bits(4)?;
    let block_size_1 = 1u32 << reader.read_bits(4)?;
    let legal = |b: u32| (u32::from(MIN_BLOCK_SIZE)..=u32::from(MAX_BLOCK_SIZE)).contains(&b);
    if !legal(block_size_0) || !legal(block_size_1) || block_size_0 > block_size_1 {
        return Err(VorbisError::InvalidHeader(format!(
            "illegal block sizes {block_size_0}/{block_size_1}"
        )));
    }
    if reader.read_bits(1)? != 1 {
        return Err(VorbisError::InvalidHeader("framing bit unset".into()));
    }

    Ok(VorbisInfo {
        version,
        channels,
        sample_rate,
        bitrate_maximum,
        bitrate_nominal,
        bitrate_minimum,
        block_size_0: block_size_0 as u16,
        block_size_1: block_size_1 as u16,
    })
}

pub(crate) fn read_comments(reader: &mut BitReader<'_>) -> Result<VorbisComments> {
    let vendor = read_string(reader)?;
    let count = reader.read_u32()?;
    let mut comments = Vec::new();
    for _ in 0..count {
        let raw = read_string(reader)?;
        // Entries without a separator are tolerated and dropped.
        if let Some((key, value)) = raw.split_once('=') {
            comments.push((key.to_owned(), value.to_owned()));
        }
    }
    if reader.read_bits(1)? != 1 {
        return Err(VorbisError::InvalidHeader("framing bit unset".into()));
    }
    Ok(VorbisComments { vendor, comments })
}

fn read_string(reader: &mut BitReader<'_>) -> Result<String> {
    let len = reader.read_u32()? as usize;
    if (len as u64) * 8 > reader.remaining_bits() {
        return Err(VorbisError::InvalidHeader(
            "string length exceeds the packet".into(),
        ));
    }
    let mut bytes = vec![0u8; len];
    reader.read_bytes(&mut bytes)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

pub(crate) fn read_setup(reader: &mut BitReader<'_>, info: &VorbisInfo) -> Result<Setup> {
    let codebook_count = reader.read_u8()? as usize + 1;
    let mut codebooks = Vec::with_capacity(codebook_count);
    for _ in 0..codebook_count {
        codebooks.push(Codebook::read(reader)?);
    }

    // Time-domain transform placeholders, all zero in Vorbis I.
    let time_count = reader.read_bits(6)? as usize + 1;
    for _ in 0..time_count {
        if reader.read_bits(16)? != 0 {
            return Err(VorbisError::InvalidHeader(
                "nonzero time-domain transform".into(),
            ));
        }
    }

    let block_sizes = [
        usize::from(info.block_size_0),
        usize::from(info.block_size_1),
    ];
    let floor_count = reader.read_bits(6)? as usize + 1;
    let mut floors = Vec::with_capacity(floor_count);
    for _ in 0..floor_count {
        floors.push(Floor::read(reader, &codebooks, block_sizes)?);
    }

    let residue_count = reader.read_bits(6)? as usize + 1;
    let mut residues = Vec::with_capacity(residue_count);
    for _ in 0..residue_count {
        residues.push(Residue::read(reader, &codebooks)?);
    }

    let mapping_count = reader.read_bits(6)? as usize + 1;
    let mut mappings = Vec::with_capacity(mapping_count);
    for _ in 0..mapping_count {
        mappings.push(Mapping::read(
            reader,
            usize::from(info.channels),
            floors.len(),
            residues.len(),
        )?);
    }

    let mode_count = reader.read_bits(6)? as usize + 1;
    let mut modes = Vec::with_capacity(mode_count);
    for _ in 0..mode_count {
        modes.push(Mode::read(reader, mappings.len())?);
    }
    if reader.read_bits(1)? != 1 {
        return Err(VorbisError::InvalidHeader("framing bit unset".into()));
    }

    Ok(Setup {
        codebooks,
        floors,
        residues,
        mappings,
        modes,
        mode_bits: ilog(mode_count as u64 - 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use calliope_core::bitstream::BitWriter;

    fn ident_packet(channels: u8, rate: u32, bs0_exp: u64, bs1_exp: u64) -> Vec<u8> {
        let mut w = BitWriter::new();
        w.write_bits(u64::from(HEADER_IDENTIFICATION), 8);
        w.write_bits(VORBIS_MAGIC, 48);
        w.write_bits(0, 32); // version
        w.write_bits(u64::from(channels), 8);
        w.write_bits(u64::from(rate), 32);
        w.write_bits(0, 32);
        w.write_bits(0, 32);
        w.write_bits(0, 32);
        w.write_bits(bs0_exp, 4);
        w.write_bits(bs1_exp, 4);
        w.write_bits(1, 1); // framing
        w.align_to_byte();
        w.into_bytes()
    }

    #[test]
    fn identification_round_trip() {
        let bytes = ident_packet(2, 44_100, 8, 11);
        let mut reader = BitReader::new(&bytes);
        assert_eq!(read_header_intro(&mut reader).unwrap(), HEADER_IDENTIFICATION);
        let info = read_identification(&mut reader).unwrap();
        assert_eq!(info.channels, 2);
        assert_eq!(info.sample_rate, 44_100);
        assert_eq!(info.block_size_0, 256);
        assert_eq!(info.block_size_1, 2048);
    }

    #[test]
    fn rejects_inverted_block_sizes() {
        let bytes = ident_packet(2, 44_100, 11, 8);
        let mut reader = BitReader::new(&bytes);
        read_header_intro(&mut reader).unwrap();
        assert!(matches!(
            read_identification(&mut reader),
            Err(VorbisError::InvalidHeader(_))
        ));
    }

    #[test]
    fn rejects_missing_magic() {
        let mut w = BitWriter::new();
        w.write_bits(u64::from(HEADER_IDENTIFICATION), 8);
        w.write_bits(0x0000_6272_6F76, 48);
        let bytes = w.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert!(matches!(
            read_header_intro(&mut reader),
            Err(VorbisError::InvalidHeader(_))
        ));
    }

    #[test]
    fn comments_are_case_insensitive() {
        let mut w = BitWriter::new();
        let vendor = b"libcalliope";
        w.write_bits(vendor.len() as u64, 32);
        for &b in vendor {
            w.write_bits(u64::from(b), 8);
        }
        let entries: [&[u8]; 3] = [b"TITLE=Night Music", b"Artist=Nobody", b"broken entry"];
        w.write_bits(entries.len() as u64, 32);
        for entry in entries {
            w.write_bits(entry.len() as u64, 32);
            for &b in entry {
                w.write_bits(u64::from(b), 8);
            }
        }
        w.write_bits(1, 1);
        w.align_to_byte();
        let bytes = w.into_bytes();

        let mut reader = BitReader::new(&bytes);
        let comments = read_comments(&mut reader).unwrap();
        assert_eq!(comments.vendor, "libcalliope");
        assert_eq!(comments.len(), 2);
        assert_eq!(comments.title(), Some("Night Music"));
        assert_eq!(comments.get("ARTIST"), Some("Nobody"));
        assert_eq!(comments.album(), None);
    }

    #[test]
    fn oversized_string_is_rejected() {
        let mut w = BitWriter::new();
        w.write_bits(u64::MAX & 0xFFFF_FFFF, 32);
        let bytes = w.into_bytes();
        let mut reader = BitReader::new(&bytes);
        assert!(matches!(
            read_comments(&mut reader),
            Err(VorbisError::InvalidHeader(_))
        ));
    }
}
