//! Integration tests for the block circular buffer.

use replay_buffer::{BlockCirclebuf, BufferError, Position};
use replay_core::ReplayError;

fn drain(cb: &mut BlockCirclebuf<u8>) -> Vec<u8> {
    let mut out = vec![0u8; cb.capacity()];
    let n = cb.read(&mut out);
    out.truncate(n);
    out
}

#[test]
fn capacity_two_keeps_newest() {
    let mut cb = BlockCirclebuf::<u8>::new(2).unwrap();
    cb.write(b"123");
    let mut one = [0u8; 1];
    assert_eq!(cb.read(&mut one), 1);
    assert_eq!(&one, b"2");
}

#[test]
fn capacity_two_double_lap() {
    let mut cb = BlockCirclebuf::<u8>::new(2).unwrap();
    cb.write(b"1234");
    assert_eq!(cb.buffer_health(), 2);
    assert_eq!(drain(&mut cb), b"34");
}

#[test]
fn split_buffer_streams_across_blocks() {
    let mut cb = BlockCirclebuf::<u8>::new(4).unwrap();
    let first = cb.head().block;
    cb.split(first, 2).unwrap();
    cb.write(b"TEST");
    assert_eq!(drain(&mut cb), b"TEST");
}

#[test]
fn handles_survive_split_and_merge() {
    let mut cb = BlockCirclebuf::<u8>::new(32).unwrap();
    let first = cb.head().block;
    let marks: Vec<_> = (0..32)
        .step_by(5)
        .map(|index| cb.track(Position { block: first, index }).unwrap())
        .collect();

    let mid = cb.split(first, 16).unwrap();
    let late = cb.split(mid, 24).unwrap();
    assert_eq!(cb.block_count(), 3);
    for (i, &mark) in marks.iter().enumerate() {
        let position = cb.handle_position(mark).unwrap();
        assert_eq!(position.index, i * 5);
        let expected = match position.index {
            0..=15 => first,
            16..=23 => mid,
            _ => late,
        };
        assert_eq!(position.block, expected);
    }

    assert!(cb.attempt_reconcile_prev(late).unwrap());
    assert!(cb.attempt_reconcile_next(first).unwrap());
    assert_eq!(cb.block_count(), 1);
    for (i, &mark) in marks.iter().enumerate() {
        assert_eq!(
            cb.handle_position(mark).unwrap(),
            Position {
                block: first,
                index: i * 5
            }
        );
    }
}

#[test]
fn wrapped_data_blocks_merge() {
    let mut cb = BlockCirclebuf::<u8>::new(8).unwrap();
    let first = cb.head().block;
    let second = cb.split(first, 4).unwrap();
    cb.write(b"abcdefgh");
    cb.write(b"ij");
    // Live data wraps through both halves; one block can still describe it.
    assert!(cb.attempt_reconcile_next(first).unwrap());
    assert!(cb.block_info(second).is_err());
    assert_eq!(drain(&mut cb), b"cdefghij");
}

#[test]
fn superblock_extends_rotation() {
    let mut cb = BlockCirclebuf::<u8>::new(4).unwrap();
    cb.write(b"ab");
    let first = cb.head().block;
    let extra = cb.allocate_superblock(4, first).unwrap();
    assert_eq!(cb.buffer_health(), 2);
    assert_eq!(cb.capacity(), 8);
    assert!(!cb.attempt_reconcile_next(first).unwrap());

    cb.write(b"cdefgh");
    assert_eq!(cb.buffer_health(), 8);
    assert_eq!(cb.block_contents(extra).unwrap(), b"efgh");
    assert_eq!(drain(&mut cb), b"abcdefgh");
}

#[test]
fn protected_range_survives_many_laps() {
    let mut cb = BlockCirclebuf::<u8>::new(64).unwrap();
    cb.write(b"0123456789abcdef");
    let block = cb.head().block;
    let range = cb
        .protect_range(Position { block, index: 4 }, Position { block, index: 12 })
        .unwrap();
    for _ in 0..20 {
        cb.write(&[b'x'; 17]);
    }
    let mut frozen = Vec::new();
    cb.read_range(&range, &mut frozen).unwrap();
    assert_eq!(frozen, b"456789ab");
    assert!(cb.stats().displaced > 0);

    cb.release_range(range).unwrap();
    assert_eq!(cb.writable_capacity(), 64);
}

#[test]
fn buffer_errors_convert_into_replay_errors() {
    let err: ReplayError = BlockCirclebuf::<u8>::new(0).unwrap_err().into();
    assert!(matches!(
        err,
        ReplayError::Buffer(BufferError::InvalidCapacity)
    ));
    assert!(err.to_string().contains("non-zero"));
}

#[test]
fn stats_summary_reflects_traffic() {
    let mut cb = BlockCirclebuf::<u8>::new(4).unwrap();
    cb.write(b"abcdef");
    cb.skip(1);
    let stats = cb.stats().clone();
    assert_eq!(stats.written, 6);
    assert_eq!(stats.displaced, 2);
    assert_eq!(stats.skipped, 1);
    assert!(stats.summary().contains("6 written"));
}
