//! End-to-end tests over synthesized Ogg byte streams.

use std::io::Cursor;

use calliope_core::error::{ContainerError, Error};
use calliope_core::io::RandomAccessSource;
use calliope_ogg::page::lacing_from_packet_lengths;
use calliope_ogg::{crc, seek, OggPageReader, PacketFramer, PageFlags, NO_GRANULE};

type MemSource = RandomAccessSource<Cursor<Vec<u8>>>;

fn reader_over(bytes: Vec<u8>) -> OggPageReader<MemSource> {
    OggPageReader::new(RandomAccessSource::new(Cursor::new(bytes)).unwrap())
}

/// Serialize one page. `runs` are the lacing-bounded byte runs on the page;
/// the last run is left open for continuation when `final_complete` is
/// false.
fn build_page(
    serial: u32,
    sequence: u32,
    granule: u64,
    flags: PageFlags,
    runs: &[&[u8]],
    final_complete: bool,
) -> Vec<u8> {
    let lengths: Vec<u32> = runs.iter().map(|r| r.len() as u32).collect();
    let lacing = lacing_from_packet_lengths(&lengths, final_complete);
    assert!(lacing.len() <= 255);

    let mut page = Vec::new();
    page.extend_from_slice(b"OggS");
    page.push(0);
    page.push(flags.bits());
    page.extend_from_slice(&granule.to_le_bytes());
    page.extend_from_slice(&serial.to_le_bytes());
    page.extend_from_slice(&sequence.to_le_bytes());
    page.extend_from_slice(&[0u8; 4]); // CRC placeholder
    page.push(lacing.len() as u8);
    page.extend_from_slice(&lacing);
    for run in runs {
        page.extend_from_slice(run);
    }

    let checksum = crc::update(0, &page);
    page[22..26].copy_from_slice(&checksum.to_le_bytes());
    page
}

#[test]
fn single_page_round_trip() {
    let a = vec![1u8; 10];
    let b = vec![2u8; 300];
    let bytes = build_page(
        0x5EA1,
        0,
        1234,
        PageFlags::BEGINS_STREAM,
        &[&a, &b],
        true,
    );
    let mut reader = reader_over(bytes);
    let page = reader.read_next_page().unwrap();

    assert_eq!(page.bitstream_serial, 0x5EA1);
    assert_eq!(page.page_sequence, 0);
    assert_eq!(page.granule_position, 1234);
    assert!(page.flags.contains(PageFlags::BEGINS_STREAM));
    assert_eq!(page.packet_lengths, vec![10, 300]);
    assert!(page.final_packet_is_complete);
    assert_eq!(page.seek_offset, 0);
    assert_eq!(page.payload().len(), 310);
    assert!(reader.take_resync().is_none());

    assert!(matches!(reader.read_next_page(), Err(Error::EndOfStream)));
}

#[test]
fn resync_skips_garbage_and_reports_it() {
    let garbage = b"Ogg OgOggnoise\xFF\x00";
    let mut bytes = garbage.to_vec();
    bytes.extend(build_page(
        7,
        0,
        0,
        PageFlags::BEGINS_STREAM,
        &[b"payload"],
        true,
    ));

    let mut reader = reader_over(bytes);
    let page = reader.read_next_page().unwrap();
    assert_eq!(page.seek_offset, garbage.len() as u64);

    let resync = reader.take_resync().expect("resync event");
    assert_eq!(resync.skipped, garbage.len() as u64);
    assert_eq!(resync.offset, garbage.len() as u64);
    assert!(reader.take_resync().is_none());
}

#[test]
fn crc_corruption_fails_then_restored_read_is_identical() {
    let pristine = build_page(9, 0, 77, PageFlags::BEGINS_STREAM, &[b"hello world"], true);

    let mut corrupted = pristine.clone();
    let body = corrupted.len() - 5;
    corrupted[body] ^= 0x10;
    let mut reader = reader_over(corrupted);
    match reader.read_next_page() {
        Err(Error::Container(ContainerError::CorruptPage { offset, .. })) => {
            assert_eq!(offset, 0);
        }
        other => panic!("expected CorruptPage, got {other:?}"),
    }

    let mut reader = reader_over(pristine);
    let first = reader.read_next_page().unwrap();
    let second = reader.seek_and_read_page(0).unwrap();
    assert_eq!(first.granule_position, second.granule_position);
    assert_eq!(first.page_sequence, second.page_sequence);
    assert_eq!(first.flags, second.flags);
    assert_eq!(first.packet_lengths, second.packet_lengths);
    assert_eq!(first.payload(), second.payload());
    assert_eq!(first.crc32, second.crc32);
}

#[test]
fn framer_joins_packets_across_pages() {
    // One 600-byte packet spanning two pages, then a short one.
    let long_packet: Vec<u8> = (0..600u32).map(|i| (i % 251) as u8).collect();
    let head = &long_packet[..510]; // two 255 runs, left open
    let tail = &long_packet[510..];

    let mut bytes = build_page(3, 0, NO_GRANULE, PageFlags::BEGINS_STREAM, &[head], false);
    bytes.extend(build_page(
        3,
        1,
        600,
        PageFlags::CONTINUES_PACKET,
        &[tail, b"after"],
        true,
    ));

    let mut reader = reader_over(bytes);
    let mut framer = PacketFramer::new();

    let first = reader.read_next_page().unwrap();
    assert!(framer.submit_page(&first).is_empty());
    assert!(framer.mid_packet());

    let second = reader.read_next_page().unwrap();
    let packets = framer.submit_page(&second);
    assert_eq!(packets.len(), 2);
    assert_eq!(packets[0].data(), long_packet.as_slice());
    assert_eq!(packets[1].data(), b"after");
    assert!(!packets[0].is_last_in_page);
    assert!(packets[1].is_last_in_page);
    assert_eq!(packets[1].page_granule, 600);
}

#[test]
fn framer_drops_partial_without_continuation() {
    let mut bytes = build_page(3, 0, NO_GRANULE, PageFlags::BEGINS_STREAM, &[&[7u8; 255]], false);
    // Next page does NOT set the continuation flag: the partial is lost.
    bytes.extend(build_page(3, 1, 5, PageFlags::empty(), &[b"fresh"], true));

    let mut reader = reader_over(bytes);
    let mut framer = PacketFramer::new();
    assert!(framer.submit_page(&reader.read_next_page().unwrap()).is_empty());
    let page = reader.read_next_page().unwrap();
    let packets = framer.submit_page(&page);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].data(), b"fresh");
}

#[test]
fn framer_drops_headless_continuation() {
    // A fresh framer (e.g. right after a seek) sees a page continuing a
    // packet it never saw the start of: that packet must not be emitted.
    let bytes = build_page(
        3,
        4,
        50,
        PageFlags::CONTINUES_PACKET,
        &[b"tail-of-unknown", b"whole"],
        true,
    );
    let mut reader = reader_over(bytes);
    let mut framer = PacketFramer::new();
    let page = reader.read_next_page().unwrap();
    let packets = framer.submit_page(&page);
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].data(), b"whole");
}

/// Five-page stream: one header page then four audio pages of two packets,
/// 100 granules per packet, with the stream's first audio packet priming
/// the window (contributing zero).
fn seekable_stream() -> Vec<u8> {
    let mut bytes = build_page(11, 0, 0, PageFlags::BEGINS_STREAM, &[b"header"], true);
    let granules = [100u64, 300, 500, 700];
    for (i, &granule) in granules.iter().enumerate() {
        let flags = if i + 1 == granules.len() {
            PageFlags::ENDS_STREAM
        } else {
            PageFlags::empty()
        };
        bytes.extend(build_page(
            11,
            1 + i as u32,
            granule,
            flags,
            &[b"audio-pkt-a", b"audio-pkt-b"],
            true,
        ));
    }
    bytes
}

#[test]
fn granule_seek_resolves_inside_pages() {
    let mut reader = reader_over(seekable_stream());
    let count = |_pkt: &calliope_ogg::OggPacket<'_>| Some(100u64);

    let point = seek::seek_to(&mut reader, 450, 1, 1, count).unwrap();
    assert_eq!(point.start_page, 3);
    assert_eq!(point.skip_packets, 0);
    assert_eq!(point.granule, 400);

    let point = seek::seek_to(&mut reader, 350, 1, 1, count).unwrap();
    assert_eq!(point.start_page, 2);
    assert_eq!(point.skip_packets, 1);
    assert_eq!(point.granule, 300);

    let point = seek::seek_to(&mut reader, 0, 1, 1, count).unwrap();
    assert_eq!(point.start_page, 1);
    assert_eq!(point.skip_packets, 0);
    assert_eq!(point.granule, 0);

    assert!(matches!(
        seek::seek_to(&mut reader, 10_000, 1, 1, count),
        Err(Error::OutOfRange(_))
    ));
}

#[test]
fn total_granules_reads_the_last_page() {
    let mut reader = reader_over(seekable_stream());
    assert_eq!(seek::total_granules(&mut reader).unwrap(), 700);
    // The stream position is restored: the next read is page 0 again.
    let page = reader.read_next_page().unwrap();
    assert_eq!(page.page_index, 0);
}

#[test]
fn seek_and_read_skips_forward_to_unknown_pages() {
    let mut reader = reader_over(seekable_stream());
    // Nothing read yet: the table is empty and page 3 must be discovered.
    let page = reader.seek_and_read_page(3).unwrap();
    assert_eq!(page.page_index, 3);
    assert_eq!(page.granule_position, 500);
}
