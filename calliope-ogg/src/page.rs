//! Ogg page model and lacing arithmetic.

use bitflags::bitflags;
use calliope_core::pool::PooledBuffer;

/// Granule value marking a page on which no packet ends.
pub const NO_GRANULE: u64 = u64::MAX;

bitflags! {
    /// The header-type field of an Ogg page.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PageFlags: u8 {
        /// The first packet on this page continues one begun earlier.
        const CONTINUES_PACKET = 0x01;
        /// First page of the logical bitstream.
        const BEGINS_STREAM = 0x02;
        /// Last page of the logical bitstream.
        const ENDS_STREAM = 0x04;
    }
}

/// One decoded Ogg page.
///
/// The payload is pool-backed and returns to the pool when the page is
/// dropped, after the framer (or any other consumer) is done with it.
#[derive(Debug)]
pub struct Page {
    /// Codec-defined timestamp after the last packet completed on this
    /// page; [`NO_GRANULE`] when no packet ends here.
    pub granule_position: u64,
    /// Serial number of the logical bitstream.
    pub bitstream_serial: u32,
    /// Running page counter within the logical bitstream.
    pub page_sequence: u32,
    /// Checksum as stored in the header (already verified).
    pub crc32: u32,
    /// Byte offset of the capture pattern in the source.
    pub seek_offset: u64,
    /// Index of this page in the reader's page table.
    pub page_index: u32,
    /// Header-type flags.
    pub flags: PageFlags,
    /// Byte length of each packet run on this page, in order. The final
    /// entry is an unfinished packet when
    /// [`final_packet_is_complete`](Page::final_packet_is_complete) is
    /// false.
    pub packet_lengths: Vec<u32>,
    /// Whether the last packet run on this page is a whole packet.
    pub final_packet_is_complete: bool,
    pub(crate) payload: PooledBuffer,
    /// Encoded size of the page: header, lacing and payload bytes.
    pub(crate) byte_len: u64,
}

impl Page {
    /// The concatenated packet bytes of this page.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }
}

/// Derive per-packet byte lengths from a lacing vector.
///
/// Returns the lengths and whether the final run is a complete packet. A
/// lacing value below 255 terminates a packet; a page whose last lacing
/// value is 255 leaves its final packet open for continuation.
pub fn packet_lengths_from_lacing(lacing: &[u8]) -> (Vec<u32>, bool) {
    let mut lengths = Vec::new();
    let mut run = 0u32;
    for &value in lacing {
        run += u32::from(value);
        if value < 255 {
            lengths.push(run);
            run = 0;
        }
    }
    let complete = lacing.last().map_or(true, |&v| v < 255);
    if !complete {
        lengths.push(run);
    }
    (lengths, complete)
}

/// Rebuild the lacing vector for a set of packet lengths.
///
/// The inverse of [`packet_lengths_from_lacing`]: each complete packet
/// emits `len / 255` values of 255 followed by `len % 255`, so a packet
/// whose length is a multiple of 255 ends in an explicit 0. An incomplete
/// final packet (length necessarily a multiple of 255) emits only 255s.
pub fn lacing_from_packet_lengths(lengths: &[u32], final_packet_is_complete: bool) -> Vec<u8> {
    let mut lacing = Vec::new();
    for (i, &len) in lengths.iter().enumerate() {
        let open = !final_packet_is_complete && i + 1 == lengths.len();
        lacing.extend(std::iter::repeat(255).take((len / 255) as usize));
        if !open {
            lacing.push((len % 255) as u8);
        } else {
            debug_assert_eq!(len % 255, 0, "an open packet run must be all-255 lacing");
        }
    }
    lacing
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lacing_terminators() {
        let (lengths, complete) = packet_lengths_from_lacing(&[255, 255, 10, 0, 4]);
        assert_eq!(lengths, vec![520, 0, 4]);
        assert!(complete);
    }

    #[test]
    fn multiple_of_255_needs_zero_terminator() {
        let (lengths, complete) = packet_lengths_from_lacing(&[255, 0]);
        assert_eq!(lengths, vec![255]);
        assert!(complete);
        assert_eq!(lacing_from_packet_lengths(&[255], true), vec![255, 0]);
    }

    #[test]
    fn trailing_255_leaves_packet_open() {
        let (lengths, complete) = packet_lengths_from_lacing(&[12, 255, 255]);
        assert_eq!(lengths, vec![12, 510]);
        assert!(!complete);
        assert_eq!(
            lacing_from_packet_lengths(&[12, 510], false),
            vec![12, 255, 255]
        );
    }

    #[test]
    fn empty_lacing() {
        let (lengths, complete) = packet_lengths_from_lacing(&[]);
        assert!(lengths.is_empty());
        assert!(complete);
    }

    #[test]
    fn round_trip() {
        let cases: &[(&[u8], bool)] = &[
            (&[0], true),
            (&[255, 255, 3], true),
            (&[255, 0, 255, 0], true),
            (&[1, 2, 3, 255], false),
            (&[255, 255], false),
        ];
        for &(lacing, expect_complete) in cases {
            let (lengths, complete) = packet_lengths_from_lacing(lacing);
            assert_eq!(complete, expect_complete);
            assert_eq!(
                lacing_from_packet_lengths(&lengths, complete),
                lacing.to_vec()
            );
        }
    }
}
