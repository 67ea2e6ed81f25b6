//! Packet framing across page boundaries.
//!
//! Ogg packets are cut into lacing-bounded runs that may span pages; the
//! framer stitches those runs back together. A packet contained in a single
//! page borrows the page payload, a packet spanning pages owns a copy of
//! its bytes.

use std::borrow::Cow;
use std::mem;

use tracing::debug;

use crate::page::{Page, PageFlags};

/// One reassembled codec packet plus the page context it completed on.
#[derive(Debug)]
pub struct OggPacket<'a> {
    data: Cow<'a, [u8]>,
    /// Index of the page the packet completed on.
    pub page_index: u32,
    /// Granule position of that page.
    pub page_granule: u64,
    /// Whether that page ends the logical stream.
    pub ends_stream: bool,
    /// Whether this is the last packet completing on that page, i.e. the
    /// packet the page granule position refers to.
    pub is_last_in_page: bool,
}

impl OggPacket<'_> {
    /// The packet bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Byte length of the packet.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the packet is empty. Zero-length packets are legal in Ogg.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Reassembles packets from the pages of one logical stream.
///
/// Holds at most one cross-page packet in progress at any time.
#[derive(Debug, Default)]
pub struct PacketFramer {
    pending: Vec<u8>,
    /// Whether `pending` holds the head of an unfinished packet.
    pending_active: bool,
    /// Set after a reset landed mid-packet: runs are dropped until the
    /// current packet terminates.
    discarding: bool,
}

impl PacketFramer {
    /// Create an empty framer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop any partially assembled packet, e.g. after a seek.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.pending_active = false;
        self.discarding = false;
    }

    /// Whether a cross-page packet is currently in progress.
    pub fn mid_packet(&self) -> bool {
        self.pending_active || self.discarding
    }

    /// Split a page into the packets completing on it.
    ///
    /// Pages must be submitted in stream order. A page that does not
    /// continue a packet resets the in-progress buffer, losing any partial
    /// packet from a damaged or skipped page; a page that continues a
    /// packet the framer never saw the start of has that packet dropped
    /// rather than emitted truncated.
    pub fn submit_page<'p>(&mut self, page: &'p Page) -> Vec<OggPacket<'p>> {
        let continues = page.flags.contains(PageFlags::CONTINUES_PACKET);
        if !continues {
            if self.pending_active {
                debug!(
                    lost = self.pending.len(),
                    page = page.page_index,
                    "dropping partial packet without continuation"
                );
            }
            self.pending.clear();
            self.pending_active = false;
            self.discarding = false;
        } else if !self.pending_active && !self.discarding {
            // Continuation of a packet whose start was never submitted.
            self.discarding = true;
        }

        let payload = page.payload();
        let run_count = page.packet_lengths.len();
        let mut packets = Vec::with_capacity(run_count);
        let mut offset = 0usize;

        for (run, &len) in page.packet_lengths.iter().enumerate() {
            let segment = &payload[offset..offset + len as usize];
            offset += len as usize;
            let completes = run + 1 < run_count || page.final_packet_is_complete;

            if !completes {
                if !self.discarding {
                    self.pending.extend_from_slice(segment);
                    self.pending_active = true;
                }
                break;
            }

            if self.discarding {
                self.discarding = false;
                continue;
            }

            let data = if self.pending_active {
                let mut whole = mem::take(&mut self.pending);
                whole.extend_from_slice(segment);
                self.pending_active = false;
                Cow::Owned(whole)
            } else {
                Cow::Borrowed(segment)
            };
            packets.push(OggPacket {
                data,
                page_index: page.page_index,
                page_granule: page.granule_position,
                ends_stream: page.flags.contains(PageFlags::ENDS_STREAM),
                is_last_in_page: false,
            });
        }

        if let Some(last) = packets.last_mut() {
            last.is_last_in_page = true;
        }
        packets
    }
}
