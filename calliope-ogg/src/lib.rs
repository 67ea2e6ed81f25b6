//! # Calliope Ogg
//!
//! Ogg container reading for the Calliope streaming decoder:
//!
//! - Page capture with CRC-32 validation and resynchronization events
//! - Packet framing across page boundaries
//! - An append-only page table backing granule-position seek
//!
//! One [`OggPageReader`] plus one [`PacketFramer`] serve one logical
//! bitstream; multiplexed physical streams are out of scope.

pub mod crc;
pub mod framer;
pub mod page;
pub mod reader;
pub mod seek;

pub use framer::{OggPacket, PacketFramer};
pub use page::{Page, PageFlags, NO_GRANULE};
pub use reader::{OggPageReader, PageLocation, Resync, CAPTURE_PATTERN, MAX_PAGE_SIZE};
pub use seek::{seek_to, total_granules, SeekPoint};
