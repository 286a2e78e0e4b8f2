use crate::proto::segment::{
    HEADER_LEN, Segment, SegmentError, checksum_of, checksum_offset, flags, internet_checksum,
};

#[test]
fn header_layout_is_big_endian() {
    let mut seg = Segment::new(0x0102_0304, 0x0a0b_0c0d, flags::SYN | flags::ACK)
        .with_payload(vec![0xaa; 3])
        .with_timestamp(0x1122_3344_5566_7788);
    let buf = seg.encode();

    assert_eq!(buf.len(), HEADER_LEN + 3);
    assert_eq!(&buf[0..4], &[1, 2, 3, 4]);
    assert_eq!(&buf[4..8], &[0x0a, 0x0b, 0x0c, 0x0d]);
    assert_eq!(&buf[8..16], &[0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88]);
    // len=3 -> 3<<3 | SYN|ACK(5) = 29
    assert_eq!(&buf[16..20], &[0, 0, 0, 29]);
    assert_eq!(&buf[20..22], &[0, 0]);
    let off = checksum_offset();
    assert_eq!(u16::from_be_bytes([buf[off], buf[off + 1]]), seg.checksum);
}

#[test]
fn decode_restores_every_flag_combination() {
    for f in 0..=flags::MASK {
        for len in [0usize, 1, 7] {
            let mut seg = Segment::new(17, 99, f)
                .with_payload((0..len as u8).collect())
                .with_timestamp(123_456);
            let buf = seg.encode();
            assert_eq!(Segment::decode(&buf).as_ref(), Ok(&seg), "flags={f} len={len}");
        }
    }
}

#[test]
fn any_flipped_byte_is_detected() {
    let mut seg = Segment::new(1, 1, flags::ACK)
        .with_payload(b"some payload bytes".to_vec())
        .with_timestamp(42);
    let buf = seg.encode();
    let off = checksum_offset();

    for i in (0..buf.len()).filter(|&i| i != off && i != off + 1) {
        let mut bad = buf.clone();
        bad[i] ^= 0x5a;
        // 长度字段被改动时可能先报长度不符
        assert!(Segment::decode(&bad).is_err(), "flip at byte {i} went unnoticed");
    }
}

#[test]
fn checksum_mismatch_reports_both_values() {
    let mut seg = Segment::new(5, 6, flags::ACK).with_payload(vec![1, 2, 3]);
    let mut buf = seg.encode();
    let last = buf.len() - 1;
    buf[last] = 9;

    match Segment::decode(&buf) {
        Err(SegmentError::ChecksumMismatch { carried, computed }) => {
            assert_eq!(carried, seg.checksum);
            assert_eq!(computed, checksum_of(&buf));
            assert_ne!(carried, computed);
        }
        other => panic!("expected checksum mismatch, got {other:?}"),
    }
    // 不校验时结构仍可解析
    assert_eq!(Segment::decode_unchecked(&buf).map(|s| s.payload), Ok(vec![1, 2, 9]));
}

#[test]
fn truncated_and_length_mismatch_are_rejected() {
    assert_eq!(Segment::decode(&[0; 10]), Err(SegmentError::Truncated(10)));

    let mut seg = Segment::new(1, 1, flags::ACK).with_payload(vec![0; 4]);
    let mut buf = seg.encode();
    buf.pop();
    assert_eq!(
        Segment::decode(&buf),
        Err(SegmentError::LengthMismatch {
            declared: 4,
            actual: 3
        })
    );
}

#[test]
fn internet_checksum_matches_rfc1071_example() {
    let data = [0x00, 0x01, 0xf2, 0x03, 0xf4, 0xf5, 0xf6, 0xf7];
    assert_eq!(internet_checksum(&data), !0xddf2u16);
    // 奇数长度：末字节在高位补零
    assert_eq!(internet_checksum(&[0x12]), !0x1200u16);
    assert_eq!(internet_checksum(&[]), 0xffff);
}

#[test]
fn seq_space_counts_syn_and_fin() {
    assert_eq!(Segment::new(0, 0, flags::SYN).seq_space(), 1);
    assert_eq!(Segment::new(0, 0, flags::ACK).seq_space(), 0);
    assert_eq!(
        Segment::new(0, 0, flags::FIN | flags::ACK)
            .with_payload(vec![0; 5])
            .seq_space(),
        6
    );
}
