//! Property-based tests for the LSb-first bitstream reader and writer.

use std::io::SeekFrom;

use proptest::prelude::*;
use calliope_core::bitstream::{BitReader, BitWriter};

proptest! {
    /// Writing values and reading them back yields the originals.
    #[test]
    fn roundtrip_variable_width(values in prop::collection::vec((any::<u64>(), 1u32..=64), 1..40)) {
        let mut writer = BitWriter::new();
        for &(value, width) in &values {
            let masked = if width == 64 { value } else { value & ((1u64 << width) - 1) };
            writer.write_bits(masked, width);
        }
        writer.align_to_byte();
        let bytes = writer.into_bytes();

        let mut reader = BitReader::new(&bytes);
        for &(value, width) in &values {
            let masked = if width == 64 { value } else { value & ((1u64 << width) - 1) };
            prop_assert_eq!(reader.read_bits(width).unwrap(), masked);
        }
    }

    /// `peek` never moves the position and repeated peeks agree.
    #[test]
    fn peek_is_idempotent(data in prop::collection::vec(any::<u8>(), 1..32), skip in 0u64..64, count in 0u32..=64) {
        let mut reader = BitReader::new(&data);
        reader.try_advance(skip);
        let pos = reader.position();
        let first = reader.peek(count).unwrap();
        let second = reader.peek(count).unwrap();
        prop_assert_eq!(first, second);
        prop_assert_eq!(reader.position(), pos);
    }

    /// A relative seek moves the position by exactly the requested amount.
    #[test]
    fn relative_seek_is_exact(data in prop::collection::vec(any::<u8>(), 4..32), start in 0u64..24, delta in -20i64..20) {
        let total = data.len() as u64 * 8;
        let mut reader = BitReader::new(&data);
        reader.seek(SeekFrom::Start(start)).unwrap();
        let before = reader.position() as i64;
        let target = before + delta;
        if target >= 0 && target as u64 <= total {
            reader.seek(SeekFrom::Current(delta)).unwrap();
            prop_assert_eq!(reader.position() as i64, target);
        } else {
            prop_assert!(reader.seek(SeekFrom::Current(delta)).is_err());
            prop_assert_eq!(reader.position() as i64, before);
        }
    }

    /// Reading n bits then seeking back n bits restores the observable state.
    #[test]
    fn read_then_seek_back_restores(data in prop::collection::vec(any::<u8>(), 2..32), lead in 0u64..15, count in 1u32..=64) {
        let mut reader = BitReader::new(&data);
        reader.try_advance(lead);
        if reader.remaining_bits() < u64::from(count) {
            return Ok(());
        }
        let (value, have) = reader.read(count).unwrap();
        prop_assert_eq!(have, count);
        reader.seek(SeekFrom::Current(-i64::from(count))).unwrap();
        prop_assert_eq!(reader.read(count).unwrap(), (value, count));
    }

    /// `read` equals `peek` followed by `advance`.
    #[test]
    fn read_is_peek_plus_advance(data in prop::collection::vec(any::<u8>(), 1..32), count in 0u32..=64) {
        let mut a = BitReader::new(&data);
        let mut b = BitReader::new(&data);

        let read = a.read(count).unwrap();
        let peeked = b.peek(count).unwrap();
        b.try_advance(u64::from(peeked.1));

        prop_assert_eq!(read, peeked);
        prop_assert_eq!(a.position(), b.position());
    }

    /// Interleaved reads of arbitrary widths stay consistent with a slow
    /// one-bit-at-a-time model.
    #[test]
    fn matches_bit_at_a_time_model(data in prop::collection::vec(any::<u8>(), 1..24), widths in prop::collection::vec(1u32..=64, 1..16)) {
        let mut reader = BitReader::new(&data);
        let mut bit_index = 0usize;
        let total = data.len() * 8;

        for &width in &widths {
            let (value, have) = reader.read(width).unwrap();
            let expect_have = width.min((total - bit_index) as u32);
            prop_assert_eq!(have, expect_have);
            let mut expected = 0u64;
            for i in 0..have as usize {
                let idx = bit_index + i;
                let bit = (data[idx / 8] >> (idx % 8)) & 1;
                expected |= u64::from(bit) << i;
            }
            prop_assert_eq!(value, expected);
            bit_index += have as usize;
        }
    }
}
