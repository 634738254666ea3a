//! Multi-buffer frames read and written as one contiguous byte range.

use proptest::prelude::*;
use rogue_core::stream::{Buffer, Frame, FramePool, Slave};
use rogue_core::{Pool, PoolConfig};
use std::io::{Read, Write};

fn frame_of(pool: &Pool, sizes: &[usize]) -> Frame {
    let mut frame = Frame::new();
    for &size in sizes {
        frame.append_buffer(Buffer::new(pool.request(size).unwrap()));
    }
    frame
}

#[test]
fn test_seek_into_second_buffer_reads_across_boundary() {
    let pool = FramePool::new(PoolConfig::fixed(1000).with_name("seek"));
    let mut frame = pool.accept_req(3000, true).unwrap();
    assert_eq!(frame.buffer_count(), 3);

    let data: Vec<u8> = (0..3000u32).map(|i| (i % 256) as u8).collect();
    frame.write(&data, 0).unwrap();
    assert_eq!(frame.payload(), 3000);
    assert!(frame.buffers().iter().all(|b| b.payload() == 1000));

    let mut iter = frame.iter();
    iter.seek(1500).unwrap();
    let mut out = vec![0; 1500];
    iter.read_bytes(&mut out).unwrap();

    assert_eq!(out[..500], data[1500..2000]);
    assert_eq!(out[500..], data[2000..]);
    assert_eq!(iter.position(), 3000);
    assert_eq!(iter.remaining(), 0);
}

#[test]
fn test_reading_past_payload_is_boundary_error() {
    let pool = Pool::new(PoolConfig::variable().with_name("past"));
    let mut frame = frame_of(&pool, &[8, 8]);
    frame.write(&[7; 12], 0).unwrap();

    let mut iter = frame.iter();
    iter.seek(10).unwrap();
    let mut out = [0u8; 4];
    assert!(iter.read_bytes(&mut out).is_err());
    assert_eq!(iter.position(), 10);
    assert!(iter.seek(13).is_err());
    assert!(frame.read(&mut [0u8; 13], 0).is_err());
}

#[test]
fn test_write_cursor_extends_payload_in_order() {
    let pool = Pool::new(PoolConfig::variable().with_name("cursor"));
    let mut frame = frame_of(&pool, &[3, 5, 2]);
    assert_eq!(frame.size(), 10);

    {
        let mut cursor = frame.iter_mut();
        cursor.write_bytes(&[1, 2, 3, 4]).unwrap();
        cursor.write_all(&[5, 6]).unwrap();
        assert_eq!(cursor.position(), 6);
    }
    assert_eq!(frame.payload(), 6);
    assert_eq!(frame.buffers()[0].payload(), 3);
    assert_eq!(frame.buffers()[1].payload(), 3);
    assert_eq!(frame.buffers()[2].payload(), 0);

    let mut all = Vec::new();
    frame.iter().read_to_end(&mut all).unwrap();
    assert_eq!(all, vec![1, 2, 3, 4, 5, 6]);
}

#[test]
fn test_distance_and_relative_moves() {
    let pool = Pool::new(PoolConfig::variable().with_name("distance"));
    let mut frame = frame_of(&pool, &[4, 4, 4]);
    frame.write(&[0; 12], 0).unwrap();

    let start = frame.iter();
    let mut cursor = frame.iter();
    cursor.advance(9).unwrap();
    cursor.advance(-2).unwrap();
    assert_eq!(start.distance(&cursor), 7);
    assert_eq!(cursor.distance(&start), -7);
    assert!(cursor.advance(-8).is_err());
    assert_eq!(cursor.current_chunk().len(), 1);
}

#[test]
fn test_head_room_is_skipped_by_iteration() {
    let pool = Pool::new(PoolConfig::variable().with_name("head"));
    let mut first = Buffer::new(pool.request(8).unwrap());
    first.adjust_head(4).unwrap();
    let mut frame = Frame::from_buffer(first);
    frame.append_buffer(Buffer::new(pool.request(4).unwrap()));
    assert_eq!(frame.size(), 8);

    frame.write(&[1, 2, 3, 4, 5, 6, 7, 8], 0).unwrap();
    assert_eq!(frame.to_vec(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(&frame.buffers()[0].region().as_slice()[4..], &[1, 2, 3, 4]);
}

proptest! {
    #[test]
    fn prop_write_then_read_round_trips_across_any_split(
        sizes in prop::collection::vec(1usize..64, 1..8),
        seed in any::<u8>(),
        fill in 0.0f64..=1.0,
    ) {
        let pool = Pool::new(PoolConfig::variable().with_name("prop"));
        let mut frame = frame_of(&pool, &sizes);
        let total = frame.size();
        let n = ((total as f64) * fill) as usize;

        let src: Vec<u8> = (0..n).map(|i| seed.wrapping_add(i as u8)).collect();
        frame.write(&src, 0).unwrap();
        prop_assert_eq!(frame.payload(), n);

        let mut dst = vec![0; n];
        frame.read(&mut dst, 0).unwrap();
        prop_assert_eq!(&dst, &src);

        let mut via_cursor = vec![0; n];
        frame.iter().read_bytes(&mut via_cursor).unwrap();
        prop_assert_eq!(&via_cursor, &src);

        let joined: Vec<u8> = frame.chunks().flatten().copied().collect();
        prop_assert_eq!(joined, src);

        drop(frame);
        prop_assert_eq!(pool.in_use(), 0);
    }

    #[test]
    fn prop_read_at_offset_matches_slice(
        sizes in prop::collection::vec(1usize..32, 1..6),
        start in 0.0f64..=1.0,
    ) {
        let pool = Pool::new(PoolConfig::variable().with_name("offset"));
        let mut frame = frame_of(&pool, &sizes);
        let total = frame.size();
        let data: Vec<u8> = (0..total).map(|i| (i * 31 % 256) as u8).collect();
        frame.write(&data, 0).unwrap();

        let offset = ((total as f64) * start) as usize;
        let mut tail = vec![0; total - offset];
        frame.read(&mut tail, offset).unwrap();
        prop_assert_eq!(&tail[..], &data[offset..]);
    }
}
