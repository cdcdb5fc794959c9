// Binary quantity codec: layout, deduplication, and arena rehydration.

use quill_math::{
    read_quantity, Amount, CommodityPool, Decimal, QuantityArena, QuantityWriter,
};

#[test]
fn test_stream_round_trip_preserves_cell() {
    let mut pool = CommodityPool::new();
    let amount = Amount::parse("-1.234,5678 EUR", &mut pool).unwrap();
    let mut writer = QuantityWriter::new();
    let mut buf = Vec::new();
    writer.write(&amount, &mut buf).unwrap();

    let back = read_quantity(&mut buf.as_slice()).unwrap();
    assert_eq!(back.mantissa(), amount.mantissa());
    assert_eq!(back.precision(), amount.precision());
    assert_eq!(back.sign(), -1);
    // Commodities are not part of the quantity record.
    assert!(back.commodity().is_none());
}

#[test]
fn test_zero_amount_is_one_byte() {
    let mut writer = QuantityWriter::new();
    let mut buf = Vec::new();
    writer.write(&Amount::zero(), &mut buf).unwrap();
    assert_eq!(buf, vec![0u8]);

    let back = read_quantity(&mut buf.as_slice()).unwrap();
    assert!(back.is_realzero());
    assert!(back.mantissa().is_none());
}

#[test]
fn test_record_layout_is_little_endian() {
    let mut writer = QuantityWriter::new();
    // 513 = 0x0201, precision 3.
    let amount = Amount::from(Decimal::new(513, 3));
    let mut buf = Vec::new();
    writer.write(&amount, &mut buf).unwrap();

    assert_eq!(
        buf,
        vec![
            1, // inline tag
            2, 0, // payload length, little-endian
            0x02, 0x01, // magnitude, big-endian words
            0, // sign byte: non-negative
            3, 0, // precision, little-endian
        ]
    );
}

#[test]
fn test_shared_cell_writes_once() {
    let mut writer = QuantityWriter::new();
    let amount = Amount::from(Decimal::new(99999, 2));
    let copies = vec![amount.clone(), amount.clone(), amount.clone()];

    let mut buf = Vec::new();
    for copy in &copies {
        writer.write(copy, &mut buf).unwrap();
    }

    assert_eq!(writer.cells_written(), 1);
    // Inline record: tag + len + 4-byte padded magnitude + sign +
    // precision; back-references: tag + 4-byte index, twice.
    let inline_len = 1 + 2 + 4 + 1 + 2;
    let backref_len = 1 + 4;
    assert_eq!(buf.len(), inline_len + 2 * backref_len);
    assert_eq!(buf[inline_len], 2);
    assert_eq!(&buf[inline_len + 1..inline_len + 5], &[1, 0, 0, 0]);
}

#[test]
fn test_arena_restores_sharing() {
    let mut writer = QuantityWriter::new();
    let amount = Amount::from(Decimal::new(314159, 5));
    let mut buf = Vec::new();
    for _ in 0..3 {
        writer.write(&amount, &mut buf).unwrap();
    }

    let mut arena = QuantityArena::new();
    let mut cursor = buf.as_slice();
    let a = arena.read(&mut cursor).unwrap();
    let b = arena.read(&mut cursor).unwrap();
    let c = arena.read(&mut cursor).unwrap();
    assert!(cursor.is_empty());

    assert_eq!(arena.len(), 1);
    assert!(a.shares_quantity(&b));
    assert!(a.shares_quantity(&c));
    assert_eq!(c.mantissa(), amount.mantissa());
    assert_eq!(c.precision(), 5);
}

#[test]
fn test_arena_mixed_records() {
    let mut pool = CommodityPool::new();
    let mut writer = QuantityWriter::new();

    let shared = Amount::parse("$10.00", &mut pool).unwrap();
    let copy = shared.clone();
    let solo = Amount::parse("$99.99", &mut pool).unwrap();
    let zero = Amount::zero();

    let mut buf = Vec::new();
    writer.write(&shared, &mut buf).unwrap();
    writer.write(&solo, &mut buf).unwrap();
    writer.write(&zero, &mut buf).unwrap();
    writer.write(&copy, &mut buf).unwrap();
    assert_eq!(writer.cells_written(), 2);

    let mut arena = QuantityArena::new();
    let mut cursor = buf.as_slice();
    let first = arena.read(&mut cursor).unwrap();
    let second = arena.read(&mut cursor).unwrap();
    let third = arena.read(&mut cursor).unwrap();
    let fourth = arena.read(&mut cursor).unwrap();

    assert_eq!(arena.len(), 2);
    assert!(first.shares_quantity(&fourth));
    assert!(!first.shares_quantity(&second));
    assert!(third.mantissa().is_none());
    assert_eq!(second.mantissa(), solo.mantissa());
}

#[test]
fn test_large_mantissa_round_trip() {
    let mut writer = QuantityWriter::new();
    // Wider than any machine word: 40 digits.
    let mut pool = CommodityPool::new();
    let amount =
        Amount::parse("1234567890123456789012345678901234567890", &mut pool).unwrap();

    let mut buf = Vec::new();
    writer.write(&amount, &mut buf).unwrap();
    let back = read_quantity(&mut buf.as_slice()).unwrap();
    assert_eq!(back.mantissa(), amount.mantissa());
}
