//! Granule-position seeking.
//!
//! Seeking walks the memoized page table to the first page whose granule
//! position covers the target, then accounts packet-by-packet inside a
//! small window of pages using a caller-supplied granule counter. The
//! caller restarts decoding at the returned page, skips the returned number
//! of packets, and discards samples up to the exact target.

use calliope_core::error::{ContainerError, Error, Result};
use calliope_core::io::ByteSource;
use tracing::debug;

use crate::framer::{OggPacket, PacketFramer};
use crate::page::{PageFlags, NO_GRANULE};
use crate::reader::OggPageReader;

/// Where to resume decoding after a granule seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    /// Page to restart reading from.
    pub start_page: u32,
    /// Completed packets to drop before handing packets to the decoder.
    /// The packet after those is decoded cold to rebuild overlap state.
    pub skip_packets: usize,
    /// Stream granule position at the end of that cold packet; output
    /// resumes from here.
    pub granule: u64,
}

/// Granule position of the final page of the stream.
///
/// Extends the page table to the end of the source and restores the read
/// position afterwards.
pub fn total_granules<S: ByteSource>(reader: &mut OggPageReader<S>) -> Result<u64> {
    let saved = reader.stream_position();
    reader.scan_to_end()?;
    let mut total = 0;
    for index in (0..reader.known_pages()).rev() {
        if let Some(loc) = reader.page_location(index) {
            if loc.granule_position != NO_GRANULE {
                total = loc.granule_position;
                break;
            }
        }
    }
    reader.seek_to_offset(saved)?;
    Ok(total)
}

/// Resolve `target` (an absolute granule position) to a [`SeekPoint`].
///
/// `base_page` is the first page carrying countable packets (for Vorbis,
/// the first audio page); the first packet of that page never contributes
/// granules. `granule_count` reports the per-packet contribution without
/// decoding; packets it cannot interpret count as zero. `pre_roll` packets
/// are scheduled ahead of the target packet to rebuild decoder state.
pub fn seek_to<S, F>(
    reader: &mut OggPageReader<S>,
    target: u64,
    pre_roll: usize,
    base_page: u32,
    mut granule_count: F,
) -> Result<SeekPoint>
where
    S: ByteSource,
    F: FnMut(&OggPacket<'_>) -> Option<u64>,
{
    if target == 0 {
        return Ok(SeekPoint {
            start_page: base_page,
            skip_packets: 0,
            granule: 0,
        });
    }

    // First page whose granule position reaches the target.
    let mut cover = base_page;
    let cover_loc = loop {
        let loc = match reader.locate_page(cover) {
            Ok(loc) => loc,
            Err(Error::Container(ContainerError::PageNotFound { .. })) => {
                return Err(Error::out_of_range(format!(
                    "granule {target} is past the end of the stream"
                )));
            }
            Err(err) => return Err(err),
        };
        if loc.granule_position != NO_GRANULE && loc.granule_position >= target {
            break loc;
        }
        if loc.flags.contains(PageFlags::ENDS_STREAM) {
            return Err(Error::out_of_range(format!(
                "granule {target} is past the final granule {}",
                loc.granule_position
            )));
        }
        cover += 1;
    };
    debug!(
        granule_target = target,
        page = cover,
        granule = cover_loc.granule_position,
        "seek cover page"
    );

    let mut start = cover;
    back_to_packet_boundary(reader, &mut start, base_page)?;
    loop {
        let positions = account(reader, start, cover, base_page, &mut granule_count)?;
        debug_assert!(!positions.is_empty());
        let mut t = positions.partition_point(|&pos| pos <= target);
        if t == positions.len() {
            t = positions.len() - 1;
        }
        if t >= pre_roll || start == base_page {
            let s = t.saturating_sub(pre_roll);
            return Ok(SeekPoint {
                start_page: start,
                skip_packets: s,
                granule: positions[s],
            });
        }
        // Not enough lead-in on this window; widen it by one page.
        start -= 1;
        back_to_packet_boundary(reader, &mut start, base_page)?;
    }
}

/// Move `page` back until it does not continue a packet begun earlier, so a
/// fresh framer can assemble every packet completing in the window.
fn back_to_packet_boundary<S: ByteSource>(
    reader: &mut OggPageReader<S>,
    page: &mut u32,
    base_page: u32,
) -> Result<()> {
    while *page > base_page {
        let loc = reader.locate_page(*page)?;
        if !loc.flags.contains(PageFlags::CONTINUES_PACKET) {
            break;
        }
        *page -= 1;
    }
    Ok(())
}

/// Cumulative granule positions at the end of each packet completing on
/// pages `start..=cover`.
fn account<S, F>(
    reader: &mut OggPageReader<S>,
    start: u32,
    cover: u32,
    base_page: u32,
    granule_count: &mut F,
) -> Result<Vec<u64>>
where
    S: ByteSource,
    F: FnMut(&OggPacket<'_>) -> Option<u64>,
{
    let mut framer = PacketFramer::new();
    let mut pos = preceding_granule(reader, start);
    let mut positions = Vec::new();
    // The stream's very first audio packet primes the overlap window and
    // emits nothing.
    let mut first_of_stream = start == base_page;
    for index in start..=cover {
        let page = reader.seek_and_read_page(index)?;
        for packet in framer.submit_page(&page) {
            if !first_of_stream {
                pos += granule_count(&packet).unwrap_or(0);
            }
            first_of_stream = false;
            positions.push(pos);
        }
    }
    Ok(positions)
}

/// Granule position of the nearest granule-bearing page before `page`.
fn preceding_granule<S: ByteSource>(reader: &OggPageReader<S>, page: u32) -> u64 {
    (0..page)
        .rev()
        .filter_map(|index| reader.page_location(index))
        .find(|loc| loc.granule_position != NO_GRANULE)
        .map_or(0, |loc| loc.granule_position)
}
