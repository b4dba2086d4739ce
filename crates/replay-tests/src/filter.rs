//! Integration tests for the replay filter.

use std::sync::Arc;
use std::thread;

use replay_core::{AudioPacket, ReplayConfig, ReplayError, VideoFrame};
use replay_encoder::ReplayFilter;
use uuid::Uuid;

fn config() -> ReplayConfig {
    ReplayConfig {
        video_buffer_bytes: 64 * 1024,
        audio_buffer_bytes: 16 * 1024,
        replay_duration_ns: 1_000,
    }
}

#[test]
fn video_and_audio_from_separate_threads() {
    let filter = Arc::new(ReplayFilter::new(config()).unwrap());

    let video = {
        let filter = Arc::clone(&filter);
        thread::spawn(move || {
            for ts in 0..200u64 {
                filter.handle_video(VideoFrame::new(ts * 10, 4, 4, vec![ts as u8; 64]));
            }
        })
    };
    let audio = {
        let filter = Arc::clone(&filter);
        thread::spawn(move || {
            for ts in 0..200u64 {
                filter.handle_audio(AudioPacket::new(ts * 10, 48000, 2, vec![ts as u8; 32]));
            }
        })
    };
    video.join().unwrap();
    audio.join().unwrap();

    let replay = filter.save_replay(Some(100)).unwrap();
    assert_eq!(replay.video_frames, 11);
    assert_eq!(replay.audio_packets, 11);

    let export = filter.export_replay(replay.id).unwrap();
    assert_eq!(export.frames.first().map(|f| f.timestamp_ns), Some(1890));
    assert_eq!(export.frames.last().map(|f| f.timestamp_ns), Some(1990));
    assert!(export.frames.iter().all(|f| f.width == 4 && f.data.len() == 64));
}

#[test]
fn saved_replay_outlives_new_media() {
    let filter = ReplayFilter::new(config()).unwrap();
    for ts in 0..50u64 {
        filter.handle_video(VideoFrame::new(ts * 100, 8, 8, vec![ts as u8; 256]));
    }
    let replay = filter.save_replay(None).unwrap();
    assert_eq!(replay.duration_ns, 1_000);
    assert_eq!(replay.audio_packets, 0);

    for ts in 50..2000u64 {
        filter.handle_video(VideoFrame::new(ts * 100, 8, 8, vec![0xFF; 256]));
    }
    let export = filter.export_replay(replay.id).unwrap();
    assert_eq!(export.frames.len(), 11);
    assert_eq!(export.frames[0].data, vec![39u8; 256]);

    let second = filter.save_replay(Some(0)).unwrap();
    assert_eq!(second.video_frames, 1);
    assert_eq!(filter.replay_ids().len(), 2);

    filter.discard_replay(replay.id).unwrap();
    filter.discard_replay(second.id).unwrap();
    assert!(filter.replay_ids().is_empty());
}

#[test]
fn config_from_json_drives_filter() {
    let json = br#"{"video_buffer_bytes": 4096, "audio_buffer_bytes": 2048}"#;
    let config = ReplayConfig::from_json(json).unwrap();
    let filter = ReplayFilter::new(config).unwrap();
    assert_eq!(filter.config().video_buffer_bytes, 4096);
    assert_eq!(
        filter.config().replay_duration_ns,
        ReplayConfig::default().replay_duration_ns
    );
}

#[test]
fn overlapping_replays_survive_discard() {
    let filter = ReplayFilter::new(config()).unwrap();
    for ts in 0..30u64 {
        filter.handle_video(VideoFrame::new(ts * 100, 2, 2, vec![ts as u8; 16]));
    }
    let wide = filter.save_replay(None).unwrap();
    let narrow = filter.save_replay(Some(300)).unwrap();
    assert_eq!(wide.video_frames, 11);
    assert_eq!(narrow.video_frames, 4);

    filter.discard_replay(wide.id).unwrap();
    let export = filter.export_replay(narrow.id).unwrap();
    let stamps: Vec<u64> = export.frames.iter().map(|f| f.timestamp_ns).collect();
    assert_eq!(stamps, vec![2600, 2700, 2800, 2900]);
    filter.discard_replay(narrow.id).unwrap();
}

#[test]
fn unknown_replay_id_is_not_found() {
    let filter = ReplayFilter::new(config()).unwrap();
    let missing = Uuid::new_v4();
    assert!(matches!(
        filter.export_replay(missing),
        Err(ReplayError::NotFound(_))
    ));
    assert!(matches!(
        filter.discard_replay(missing),
        Err(ReplayError::NotFound(_))
    ));
}
