//! Property-based tests for lacing arithmetic and packet framing.

use std::io::Cursor;

use proptest::prelude::*;
use calliope_core::io::RandomAccessSource;
use calliope_ogg::page::{lacing_from_packet_lengths, packet_lengths_from_lacing};
use calliope_ogg::{crc, OggPageReader, PacketFramer, PageFlags};

/// Serialize `packets` into pages carrying at most `segments_per_page`
/// lacing values each, splitting packets across pages as the chunking
/// falls.
fn paginate(packets: &[Vec<u8>], segments_per_page: usize) -> Vec<u8> {
    let lengths: Vec<u32> = packets.iter().map(|p| p.len() as u32).collect();
    let lacing = lacing_from_packet_lengths(&lengths, true);
    let payload: Vec<u8> = packets.concat();

    let mut bytes = Vec::new();
    let mut consumed = 0usize;
    let chunks: Vec<&[u8]> = lacing.chunks(segments_per_page).collect();
    let mut continued = false;
    for (index, chunk) in chunks.iter().enumerate() {
        let body_len: usize = chunk.iter().map(|&v| v as usize).sum();
        let body = &payload[consumed..consumed + body_len];
        consumed += body_len;

        let mut flags = PageFlags::empty();
        if index == 0 {
            flags |= PageFlags::BEGINS_STREAM;
        }
        if index + 1 == chunks.len() {
            flags |= PageFlags::ENDS_STREAM;
        }
        if continued {
            flags |= PageFlags::CONTINUES_PACKET;
        }
        continued = chunk.last().is_some_and(|&v| v == 255);

        let mut page = Vec::new();
        page.extend_from_slice(b"OggS");
        page.push(0);
        page.push(flags.bits());
        page.extend_from_slice(&u64::MAX.to_le_bytes());
        page.extend_from_slice(&0x7777u32.to_le_bytes());
        page.extend_from_slice(&(index as u32).to_le_bytes());
        page.extend_from_slice(&[0u8; 4]);
        page.push(chunk.len() as u8);
        page.extend_from_slice(chunk);
        page.extend_from_slice(body);
        let checksum = crc::update(0, &page);
        page[22..26].copy_from_slice(&checksum.to_le_bytes());
        bytes.extend_from_slice(&page);
    }
    bytes
}

proptest! {
    /// Lacing and packet lengths convert back and forth losslessly.
    #[test]
    fn lacing_round_trip(lengths in prop::collection::vec(0u32..1500, 1..10), open_tail in any::<bool>()) {
        let mut lengths = lengths;
        if open_tail {
            // An open final packet covers a whole number of 255-runs.
            let last = lengths.last_mut().unwrap();
            *last -= *last % 255;
            if *last == 0 {
                *last = 255;
            }
        }
        let lacing = lacing_from_packet_lengths(&lengths, !open_tail);
        let (back, complete) = packet_lengths_from_lacing(&lacing);
        prop_assert_eq!(back, lengths);
        prop_assert_eq!(complete, !open_tail);
    }

    /// However packets are split across pages, the framer reassembles the
    /// original sequence.
    #[test]
    fn framer_reassembles_any_pagination(
        packets in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..600), 1..6),
        segments_per_page in 1usize..8,
    ) {
        let bytes = paginate(&packets, segments_per_page);
        let mut reader = OggPageReader::new(
            RandomAccessSource::new(Cursor::new(bytes)).unwrap(),
        );
        let mut framer = PacketFramer::new();

        let mut emitted: Vec<Vec<u8>> = Vec::new();
        loop {
            match reader.read_next_page() {
                Ok(page) => {
                    for packet in framer.submit_page(&page) {
                        emitted.push(packet.data().to_vec());
                    }
                }
                Err(calliope_core::Error::EndOfStream) => break,
                Err(err) => panic!("unexpected page error: {err}"),
            }
        }
        prop_assert_eq!(emitted, packets);
        prop_assert!(reader.take_resync().is_none());
    }
}
