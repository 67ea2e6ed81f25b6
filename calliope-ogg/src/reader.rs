//! Ogg page extraction.
//!
//! [`OggPageReader`] synchronizes on the `OggS` capture pattern, validates
//! each page checksum and maintains an append-only table of page locations
//! that later backs granule seeking.

use std::io::SeekFrom;

use byteorder::{LittleEndian, ReadBytesExt};
use calliope_core::error::{ContainerError, Error, Result};
use calliope_core::io::ByteSource;
use calliope_core::pool::BufferPool;
use tracing::{debug, warn};

use crate::crc;
use crate::page::{packet_lengths_from_lacing, Page, PageFlags};

/// The four bytes beginning every Ogg page.
pub const CAPTURE_PATTERN: [u8; 4] = *b"OggS";

/// Upper bound on the byte size of a single page.
pub const MAX_PAGE_SIZE: usize = 27 + 255 + 255 * 255;

const READ_CHUNK: usize = 4096;

/// A recovered loss of page synchronization.
///
/// Raised as an observable event rather than an error: the reader skips the
/// garbage and keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resync {
    /// Number of bytes skipped before the capture pattern.
    pub skipped: u64,
    /// Byte offset of the capture pattern that restored sync.
    pub offset: u64,
}

/// Location metadata for one page, kept for the lifetime of the reader.
#[derive(Debug, Clone, Copy)]
pub struct PageLocation {
    /// Byte offset of the capture pattern.
    pub offset: u64,
    /// Encoded size of the page in bytes; `offset + length` is the start
    /// of the next page.
    pub length: u64,
    /// Granule position stored on the page.
    pub granule_position: u64,
    /// Header-type flags.
    pub flags: PageFlags,
    /// Page sequence number.
    pub page_sequence: u32,
}

/// Streaming Ogg page reader over a [`ByteSource`].
pub struct OggPageReader<S> {
    source: S,
    pool: BufferPool,
    /// Bytes read ahead of the logical position during capture scanning.
    stash: Vec<u8>,
    stash_pos: usize,
    table: Vec<PageLocation>,
    resync: Option<Resync>,
    /// Serial of the logical stream, locked on the first accepted page.
    serial: Option<u32>,
}

impl<S: ByteSource> OggPageReader<S> {
    /// Create a reader with a private buffer pool.
    pub fn new(source: S) -> Self {
        Self::with_pool(source, BufferPool::default())
    }

    /// Create a reader renting page payloads from `pool`.
    pub fn with_pool(source: S, pool: BufferPool) -> Self {
        Self {
            source,
            pool,
            stash: Vec::new(),
            stash_pos: 0,
            table: Vec::new(),
            resync: None,
            serial: None,
        }
    }

    /// Whether the underlying source supports seeking.
    pub fn can_seek(&self) -> bool {
        self.source.can_seek()
    }

    /// Take the pending non-contiguity event, if any.
    pub fn take_resync(&mut self) -> Option<Resync> {
        self.resync.take()
    }

    /// Number of pages recorded in the page table so far.
    pub fn known_pages(&self) -> u32 {
        self.table.len() as u32
    }

    /// Location of a page already recorded in the table.
    pub fn page_location(&self, index: u32) -> Option<PageLocation> {
        self.table.get(index as usize).copied()
    }

    /// Byte offset of the next unread byte.
    pub fn stream_position(&self) -> u64 {
        self.source.position() - (self.stash.len() - self.stash_pos) as u64
    }

    pub(crate) fn seek_to_offset(&mut self, offset: u64) -> Result<()> {
        self.source.seek(SeekFrom::Start(offset))?;
        self.stash.clear();
        self.stash_pos = 0;
        Ok(())
    }

    /// Grow the stash until `min` unread bytes are buffered or the source
    /// is exhausted; returns the number of unread bytes available.
    fn buffered(&mut self, min: usize) -> Result<usize> {
        while self.stash.len() - self.stash_pos < min {
            if self.stash_pos > READ_CHUNK {
                self.stash.drain(..self.stash_pos);
                self.stash_pos = 0;
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = self.source.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            self.stash.extend_from_slice(&chunk[..n]);
        }
        Ok(self.stash.len() - self.stash_pos)
    }

    fn consume(&mut self, n: usize) {
        self.stash_pos += n;
        if self.stash_pos == self.stash.len() {
            self.stash.clear();
            self.stash_pos = 0;
        }
    }

    fn take_exact(&mut self, out: &mut [u8], page_offset: u64) -> Result<()> {
        let avail = self.buffered(out.len())?;
        if avail < out.len() {
            return Err(ContainerError::TruncatedPage {
                offset: page_offset,
            }
            .into());
        }
        out.copy_from_slice(&self.stash[self.stash_pos..self.stash_pos + out.len()]);
        self.consume(out.len());
        Ok(())
    }

    /// Read the next page of the locked logical stream.
    ///
    /// Skips garbage up to the next capture pattern (surfacing a [`Resync`]
    /// event), validates the CRC and records the page in the table. Fails
    /// with [`Error::EndOfStream`] at the clean end of the source and with
    /// `CorruptPage` on a checksum mismatch; reading may continue after
    /// either.
    pub fn read_next_page(&mut self) -> Result<Page> {
        loop {
            let page = self.read_any_page()?;
            match self.serial {
                None => {
                    self.serial = Some(page.bitstream_serial);
                    return Ok(self.record(page));
                }
                Some(serial) if serial == page.bitstream_serial => {
                    return Ok(self.record(page));
                }
                Some(serial) => {
                    warn!(
                        got = page.bitstream_serial,
                        expected = serial,
                        "skipping page of foreign logical stream"
                    );
                }
            }
        }
    }

    fn read_any_page(&mut self) -> Result<Page> {
        // Synchronize on the capture pattern, carrying a three-byte tail
        // across refills so a split pattern is still found.
        let mut skipped = 0u64;
        loop {
            let avail = self.buffered(4)?;
            if avail < 4 {
                return Err(Error::EndOfStream);
            }
            let window = &self.stash[self.stash_pos..];
            if let Some(at) = window.windows(4).position(|w| w == &CAPTURE_PATTERN) {
                skipped += at as u64;
                self.consume(at);
                break;
            }
            let drop = window.len() - 3;
            skipped += drop as u64;
            self.consume(drop);
        }

        let offset = self.stream_position();
        if skipped > 0 {
            debug!(skipped, offset, "page capture after resync");
            self.resync = Some(Resync { skipped, offset });
        }

        let mut header = [0u8; 27];
        self.take_exact(&mut header, offset)?;

        let mut fields = &header[4..];
        let version = fields.read_u8()?;
        if version != 0 {
            return Err(ContainerError::InvalidStructure {
                offset,
                message: format!("stream structure version {version}"),
            }
            .into());
        }
        let flags_raw = fields.read_u8()?;
        let granule_position = fields.read_u64::<LittleEndian>()?;
        let bitstream_serial = fields.read_u32::<LittleEndian>()?;
        let page_sequence = fields.read_u32::<LittleEndian>()?;
        let crc32 = fields.read_u32::<LittleEndian>()?;
        let segment_count = fields.read_u8()? as usize;

        let mut lacing = vec![0u8; segment_count];
        self.take_exact(&mut lacing, offset)?;

        let payload_len: usize = lacing.iter().map(|&v| v as usize).sum();
        let mut payload = self.pool.rent(payload_len);
        self.take_exact(&mut payload, offset)?;

        let mut zeroed = header;
        zeroed[22..26].fill(0);
        let mut actual = crc::update(0, &zeroed);
        actual = crc::update(actual, &lacing);
        actual = crc::update(actual, &payload);
        if actual != crc32 {
            return Err(ContainerError::CorruptPage {
                offset,
                expected: crc32,
                actual,
            }
            .into());
        }

        let flags = PageFlags::from_bits_truncate(flags_raw);
        let (packet_lengths, final_packet_is_complete) = packet_lengths_from_lacing(&lacing);

        Ok(Page {
            granule_position,
            bitstream_serial,
            page_sequence,
            crc32,
            seek_offset: offset,
            page_index: 0,
            flags,
            packet_lengths,
            final_packet_is_complete,
            payload,
            byte_len: (27 + lacing.len() + payload_len) as u64,
        })
    }

    /// Record the page in the table and stamp its index.
    fn record(&mut self, mut page: Page) -> Page {
        let index = match self
            .table
            .binary_search_by_key(&page.seek_offset, |loc| loc.offset)
        {
            Ok(found) => found as u32,
            Err(insert) if insert == self.table.len() => {
                self.table.push(PageLocation {
                    offset: page.seek_offset,
                    length: page.byte_len,
                    granule_position: page.granule_position,
                    flags: page.flags,
                    page_sequence: page.page_sequence,
                });
                insert as u32
            }
            // A page surfaced between recorded offsets (resync after
            // damage); leave the table as it is.
            Err(insert) => insert as u32,
        };
        page.page_index = index;
        page
    }

    /// Extend the page table until `index` is recorded, resuming right
    /// after the last known page rather than re-reading it.
    fn ensure_known(&mut self, index: u32) -> Result<()> {
        if (index as usize) < self.table.len() {
            return Ok(());
        }
        let resume = self.table.last().map_or(0, |loc| loc.offset + loc.length);
        self.seek_to_offset(resume)?;
        loop {
            match self.read_next_page() {
                Ok(page) if page.page_index >= index => return Ok(()),
                Ok(_) => {}
                Err(Error::EndOfStream) => {
                    return Err(ContainerError::PageNotFound { index }.into())
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Location of a page, reading forward through the stream as needed.
    pub fn locate_page(&mut self, index: u32) -> Result<PageLocation> {
        self.ensure_known(index)?;
        Ok(self.table[index as usize])
    }

    /// Position the reader so the next page read produces page `index`.
    pub fn position_at_page(&mut self, index: u32) -> Result<()> {
        self.ensure_known(index)?;
        let offset = self.table[index as usize].offset;
        self.seek_to_offset(offset)
    }

    /// Seek to a page by index and re-read it, re-validating the CRC.
    pub fn seek_and_read_page(&mut self, index: u32) -> Result<Page> {
        self.position_at_page(index)?;
        let page = self.read_next_page()?;
        debug_assert_eq!(page.page_index, index);
        Ok(page)
    }

    /// Read forward until the end of the stream so the page table covers
    /// every page, resuming right after the last known page. Corrupt pages
    /// are skipped with a warning.
    pub(crate) fn scan_to_end(&mut self) -> Result<()> {
        let resume = self.table.last().map_or(0, |loc| loc.offset + loc.length);
        self.seek_to_offset(resume)?;
        loop {
            match self.read_next_page() {
                Ok(_) => {}
                Err(Error::EndOfStream) => return Ok(()),
                // A page cut off by the end of the source ends the scan.
                Err(Error::Container(ContainerError::TruncatedPage { .. })) => return Ok(()),
                Err(err) if err.is_recoverable() => {
                    warn!(error = %err, "skipping damaged page during scan");
                }
                Err(err) => return Err(err),
            }
        }
    }
}
