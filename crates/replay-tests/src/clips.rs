//! Integration tests for packet clip buffers.

use replay_encoder::{ClipBuffer, PACKET_HEADER_LEN};

#[test]
fn long_stream_keeps_packet_boundaries() {
    let mut clips = ClipBuffer::new(1000).unwrap();
    for ts in 0..500u64 {
        let len = (ts as usize * 7) % 50;
        clips.push_packet(ts, &vec![ts as u8; len]).unwrap();
        assert_eq!(clips.buffer().buffer_health(), clips.buffered_bytes());
    }

    let mut last = None;
    while let Some(packet) = clips.pop_packet().unwrap() {
        let ts = packet.timestamp_ns;
        assert_eq!(packet.payload, vec![ts as u8; (ts as usize * 7) % 50]);
        if let Some(prev) = last {
            assert_eq!(ts, prev + 1);
        }
        last = Some(ts);
    }
    assert_eq!(last, Some(499));
}

#[test]
fn interleaved_push_and_pop() {
    let mut clips = ClipBuffer::new(256).unwrap();
    let mut next_pop = 0u64;
    for ts in 0..200u64 {
        clips.push_packet(ts, &[ts as u8; 10]).unwrap();
        if ts % 3 == 0 {
            let packet = clips.pop_packet().unwrap().unwrap();
            assert!(packet.timestamp_ns >= next_pop);
            next_pop = packet.timestamp_ns + 1;
        }
    }
    assert!(clips.stats().displaced > 0);
    assert_eq!(
        clips.buffered_bytes(),
        clips.packet_count() * (PACKET_HEADER_LEN + 10)
    );
}

#[test]
fn two_clips_released_in_any_order() {
    let mut clips = ClipBuffer::new(2048).unwrap();
    for ts in 0..20u64 {
        clips.push_packet(ts * 10, &[1; 16]).unwrap();
    }
    let older = clips.save_clip(40).unwrap();
    for ts in 20..40u64 {
        clips.push_packet(ts * 10, &[2; 16]).unwrap();
    }
    let newer = clips.save_clip(40).unwrap();
    assert_eq!(older.packet_count, 5);
    assert_eq!(newer.packet_count, 5);

    for ts in 40..400u64 {
        clips.push_packet(ts * 10, &[3; 16]).unwrap();
    }
    let packets = clips.read_clip(&older).unwrap();
    assert!(packets.iter().all(|p| p.payload == vec![1; 16]));
    assert_eq!(packets[0].timestamp_ns, 150);

    clips.release_clip(older).unwrap();
    let packets = clips.read_clip(&newer).unwrap();
    assert_eq!(packets.len(), 5);
    assert_eq!(packets[4].timestamp_ns, 390);
    clips.release_clip(newer).unwrap();
    assert_eq!(clips.buffer().writable_capacity(), 2048);
}

#[test]
fn overlapping_clips_released_in_any_order() {
    let mut clips = ClipBuffer::new(2048).unwrap();
    for ts in 0..20u64 {
        clips.push_packet(ts * 10, &[1; 16]).unwrap();
    }
    let shorter = clips.save_clip(40).unwrap();
    for ts in 20..25u64 {
        clips.push_packet(ts * 10, &[2; 16]).unwrap();
    }
    let longer = clips.save_clip(90).unwrap();
    assert_eq!(shorter.packet_count, 5);
    assert_eq!(longer.packet_count, 10);

    for ts in 25..400u64 {
        clips.push_packet(ts * 10, &[3; 16]).unwrap();
    }
    clips.release_clip(shorter).unwrap();

    let packets = clips.read_clip(&longer).unwrap();
    let stamps: Vec<u64> = packets.iter().map(|p| p.timestamp_ns).collect();
    assert_eq!(stamps, (15..25u64).map(|ts| ts * 10).collect::<Vec<_>>());
    assert!(packets[..5].iter().all(|p| p.payload == vec![1; 16]));
    assert!(packets[5..].iter().all(|p| p.payload == vec![2; 16]));

    clips.release_clip(longer).unwrap();
    assert_eq!(clips.buffer().writable_capacity(), 2048);
}
