//! End-to-end session tests on the hardware-free backend.
//!
//! Every test drives output with `ManualBackend::render`, so engine time
//! advances exactly as far as the test says.

use std::sync::Arc;

use cadenza_config::EngineConfig;
use cadenza_core::{AudioClip, ClipId, Project, SourceRef, Track, seconds_to_frames};
use cadenza_engine::{DecodeError, DeviceError, EngineSession};
use cadenza_io::{DecodedBuffer, ManualBackend, encode_wav_pcm16};

const RATE: u32 = 8_000;

fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.audio.sample_rate = RATE;
    config.audio.channels = 2;
    config.mix.master_volume = 1.0;
    config.mix.param_smoothing_ms = 0.0;
    config.render.sample_rate = RATE;
    config
}

fn session(backend: &ManualBackend) -> EngineSession {
    EngineSession::new(config(), Box::new(backend.clone())).unwrap()
}

fn insert(session: &EngineSession, id: &str, samples: Vec<f32>) {
    session
        .cache()
        .insert(ClipId::new(id), DecodedBuffer::mono(RATE, samples).unwrap())
        .unwrap();
}

fn constant(session: &EngineSession, id: &str, value: f32, seconds: f64) {
    let frames = seconds_to_frames(seconds, RATE) as usize;
    insert(session, id, vec![value; frames]);
}

fn track(id: &str, clip_id: &str, start: f64, duration: f64) -> Track {
    let mut track = Track::new(id, id).with_clip(AudioClip::new(
        clip_id,
        SourceRef::path(format!("{clip_id}.wav")),
        start,
        duration,
    ));
    track.volume = 1.0;
    track
}

/// One track of `count` back-to-back 10 ms clips, each with its own buffer.
fn short_clips(session: &EngineSession, count: usize) -> Track {
    let mut track = Track::new("many", "Many");
    track.volume = 1.0;
    for i in 0..count {
        let id = format!("c{i}");
        constant(session, &id, 0.5, 0.01);
        track = track.with_clip(AudioClip::new(
            id.as_str(),
            SourceRef::path(format!("{id}.wav")),
            i as f64 * 0.01,
            0.01,
        ));
    }
    track
}

fn left(block: &[f32]) -> Vec<f32> {
    block.iter().step_by(2).copied().collect()
}

fn right(block: &[f32]) -> Vec<f32> {
    block.iter().skip(1).step_by(2).copied().collect()
}

fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

#[tokio::test]
async fn output_opens_on_first_play_and_stays_open() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    assert!(!backend.is_output_open());

    assert!(session.play(&[], None).unwrap());
    assert!(backend.is_output_open());
    assert!(!session.play(&[], None).unwrap());

    session.stop(true);
    assert!(backend.is_output_open());
    session.play(&[], None).unwrap();
    assert_eq!(backend.output_streams_opened(), 1);
}

#[tokio::test]
async fn playback_from_seek_point_reads_clip_offset() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    let ramp: Vec<f32> = (0..16_000).map(|i| i as f32 / 16_000.0).collect();
    insert(&session, "ramp", ramp.clone());

    let tracks = [track("t", "ramp", 0.0, 2.0)];
    session.play(&tracks, Some(0.5)).unwrap();
    let block = backend.render(800).unwrap();

    let gain = std::f32::consts::FRAC_1_SQRT_2;
    for (k, sample) in left(&block).iter().enumerate() {
        assert!((sample - ramp[4_000 + k] * gain).abs() < 1e-5, "frame {k}");
    }
    assert!((session.current_time() - 0.6).abs() < 1e-9);
}

#[tokio::test]
async fn clip_after_start_point_waits_for_its_time() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    constant(&session, "c", 0.5, 1.0);

    session.play(&[track("t", "c", 0.1, 1.0)], None).unwrap();
    let block = backend.render(1_600).unwrap();
    let l = left(&block);
    assert_eq!(peak(&l[..800]), 0.0);
    assert!(l[800..].iter().all(|&s| s > 0.3));
}

#[tokio::test]
async fn seek_five_then_two_seconds_reads_seven() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    session.seek(5.0, &[]);
    session.play(&[], None).unwrap();
    backend.render(2 * RATE as usize).unwrap();
    assert!((session.current_time() - 7.0).abs() < 1e-9);

    assert!(session.pause());
    backend.render(RATE as usize).unwrap();
    assert!((session.current_time() - 7.0).abs() < 1e-9);
    assert!(!session.pause());
}

#[tokio::test]
async fn stop_with_reset_returns_to_zero() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    session.play(&[], Some(3.0)).unwrap();
    backend.render(800).unwrap();
    session.stop(false);
    assert!((session.current_time() - 3.1).abs() < 1e-9);
    session.stop(true);
    assert_eq!(session.current_time(), 0.0);
}

#[tokio::test]
async fn negative_seek_clamps_to_zero() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    assert_eq!(session.seek(-4.0, &[]), 0.0);
    assert_eq!(session.current_time(), 0.0);
}

#[tokio::test]
async fn seek_while_playing_restarts_voices() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    let ramp: Vec<f32> = (0..16_000).map(|i| i as f32 / 16_000.0).collect();
    insert(&session, "ramp", ramp.clone());
    let tracks = [track("t", "ramp", 0.0, 2.0)];

    session.play(&tracks, None).unwrap();
    backend.render(400).unwrap();
    session.seek(1.5, &tracks);
    let block = backend.render(10).unwrap();
    let gain = std::f32::consts::FRAC_1_SQRT_2;
    assert!((left(&block)[0] - ramp[12_000] * gain).abs() < 1e-5);
    assert!(session.is_playing());
}

#[tokio::test]
async fn muted_track_is_silent_and_rejoins_on_unmute() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    constant(&session, "c", 0.5, 2.0);
    let mut tracks = [track("t", "c", 0.0, 2.0)];
    tracks[0].muted = true;

    session.play(&tracks, None).unwrap();
    let block = backend.render(800).unwrap();
    assert_eq!(peak(&block), 0.0);

    tracks[0].muted = false;
    session.sync_tracks(&tracks);
    let block = backend.render(800).unwrap();
    assert!(left(&block).iter().all(|&s| s > 0.3));
}

#[tokio::test]
async fn solo_silences_other_tracks() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    constant(&session, "a", 0.5, 2.0);
    constant(&session, "b", 0.5, 2.0);
    let mut a = track("a", "a", 0.0, 2.0);
    a.pan = -1.0;
    a.solo = true;
    let mut b = track("b", "b", 0.0, 2.0);
    b.pan = 1.0;

    session.play(&[a.clone(), b.clone()], None).unwrap();
    let block = backend.render(400).unwrap();
    assert!(peak(&left(&block)) > 0.4);
    assert_eq!(peak(&right(&block)), 0.0);

    a.solo = false;
    session.sync_tracks(&[a, b]);
    let block = backend.render(400).unwrap();
    assert!(peak(&right(&block)) > 0.4);
}

#[tokio::test]
async fn volume_and_master_scale_output() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    constant(&session, "c", 0.5, 2.0);
    let tracks = [track("t", "c", 0.0, 2.0)];
    session.play(&tracks, None).unwrap();
    let full = left(&backend.render(100).unwrap())[50];

    assert!(session.set_volume(&tracks[0].id, 0.5));
    session.set_master_volume(0.5);
    let quarter = left(&backend.render(100).unwrap())[50];
    assert!((quarter - full * 0.25).abs() < 1e-5);
    assert!(!session.set_pan(&"missing".into(), 0.3));
}

#[tokio::test]
async fn released_track_goes_silent() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    constant(&session, "c", 0.5, 2.0);
    let tracks = [track("t", "c", 0.0, 2.0)];
    session.play(&tracks, None).unwrap();
    assert!(peak(&backend.render(100).unwrap()) > 0.3);

    assert!(session.release_track(&tracks[0].id));
    assert_eq!(peak(&backend.render(100).unwrap()), 0.0);
    assert!(!session.mix().has_track(&tracks[0].id));
}

#[tokio::test]
async fn undecodable_clip_does_not_block_others() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    let wav = encode_wav_pcm16(&vec![0.5; RATE as usize], 1, RATE).unwrap();

    let mut good = track("good", "good", 0.0, 1.0);
    good.clips[0].source = SourceRef::bytes(wav);
    let mut bad = track("bad", "bad", 0.0, 1.0);
    bad.clips[0].source = SourceRef::bytes(b"definitely not audio".to_vec());
    let tracks = [good, bad];

    let failures = session.load_clips(&tracks).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0.as_str(), "bad");
    assert!(matches!(failures[0].1, DecodeError::Unsupported(_)));

    session.play(&tracks, None).unwrap();
    assert!(peak(&backend.render(400).unwrap()) > 0.3);
}

#[tokio::test]
async fn decode_is_memoized() {
    let backend = ManualBackend::new();
    let session = session(&backend);
    let wav = encode_wav_pcm16(&[0.1; 400], 1, RATE).unwrap();
    let source = SourceRef::bytes(wav);
    let id = ClipId::new("x");
    let first = session.decode(&id, &source).await.unwrap();
    let second = session.decode(&id, &source).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn metronome_clicks_stay_out_of_the_meter() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    session.set_metronome(true, 120.0);
    session.play(&[], None).unwrap();
    let block = backend.render(4_000).unwrap();
    let l = left(&block);
    assert!(peak(&l[..100]) > 0.1);
    assert_eq!(peak(&l[900..4_000]), 0.0);

    let snapshot = session.snapshot();
    assert_eq!(snapshot.analyser.len(), 128);
    assert!(snapshot.analyser.iter().all(|&b| b == 0));
    assert!(snapshot.is_playing);
}

#[tokio::test]
async fn meter_sees_the_mix() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    let tone: Vec<f32> = (0..16_000)
        .map(|i| 0.5 * (std::f32::consts::TAU * 1_000.0 * i as f32 / RATE as f32).sin())
        .collect();
    insert(&session, "tone", tone);
    session.play(&[track("t", "tone", 0.0, 2.0)], None).unwrap();
    backend.render(2_048).unwrap();
    assert!(session.analyser_data().iter().any(|&b| b > 0));
}

#[tokio::test]
async fn recording_returns_take() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    session.start_recording().await.unwrap();
    assert!(session.is_recording());
    assert!(matches!(
        session.start_recording().await,
        Err(DeviceError::AlreadyRecording)
    ));

    backend.push_input(&[0.25; 800]);
    let take = session.stop_recording().await.unwrap().unwrap();
    assert!(!session.is_recording());
    assert_eq!(take.frames, 800);
    assert_eq!(take.sample_rate, RATE);
    assert_eq!(take.channels, 1);
    assert_eq!(take.decode().unwrap().frames(), 800);
    assert!(session.stop_recording().await.unwrap().is_none());
}

#[tokio::test]
async fn denied_or_missing_microphone_is_reported() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    backend.deny_input();
    assert!(matches!(
        session.start_recording().await,
        Err(DeviceError::PermissionDenied(_))
    ));
    backend.remove_input_device();
    assert!(matches!(
        session.start_recording().await,
        Err(DeviceError::Unavailable(_))
    ));
    assert!(!session.is_recording());
}

#[tokio::test]
async fn render_is_deterministic_wav() {
    let backend = ManualBackend::new();
    let session = session(&backend);
    let wav = encode_wav_pcm16(&vec![0.3; RATE as usize], 1, RATE).unwrap();
    let mut t = track("t", "c", 0.25, 1.0);
    t.clips[0].source = SourceRef::bytes(wav);
    let tracks = [t];

    let first = session.render(&tracks, 2.0).await.unwrap();
    let second = session.render(&tracks, 2.0).await.unwrap();
    assert_eq!(first, second);

    let reader = hound::WavReader::new(std::io::Cursor::new(&first)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len(), 2 * 2 * RATE);
    assert_eq!(first.len(), 44 + 2 * 2 * 2 * RATE as usize);
}

#[tokio::test]
async fn render_rejects_bad_durations() {
    let backend = ManualBackend::new();
    let session = session(&backend);
    assert!(session.render(&[], 0.0).await.is_err());
    assert!(session.render(&[], f64::NAN).await.is_err());
}

#[tokio::test]
async fn export_covers_at_least_thirty_seconds() {
    let backend = ManualBackend::new();
    let session = session(&backend);
    let mut project = Project::new("p", "P");
    project.tracks.push(track("t", "c", 0.0, 1.0));
    constant(&session, "c", 0.5, 1.0);

    let bytes = session.export_project(&project).await.unwrap();
    let reader = hound::WavReader::new(std::io::Cursor::new(&bytes)).unwrap();
    assert_eq!(reader.duration(), 30 * RATE);
}

#[tokio::test]
async fn offline_matches_realtime() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    constant(&session, "c", 0.5, 1.0);
    let tracks = [track("t", "c", 0.05, 0.5)];

    let offline = session.render_block(&tracks, 0.2).await.unwrap();
    session.play(&tracks, None).unwrap();
    let live = backend.render(1_600).unwrap();
    for (a, b) in offline.left.iter().zip(left(&live)) {
        assert!((a - b).abs() < 1e-6);
    }
}

#[tokio::test]
async fn more_clips_than_the_command_queue_all_play() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    let count = session.config().mix.command_queue_capacity + 76;
    let tracks = [short_clips(&session, count)];

    session.play(&tracks, None).unwrap();
    let mut played = Vec::new();
    while played.len() < count * 80 {
        played.extend(left(&backend.render(800).unwrap()));
        session.snapshot();
    }
    for (i, chunk) in played.chunks(80).take(count).enumerate() {
        assert!(chunk.iter().all(|&s| s > 0.3), "clip {i} did not play");
    }
}

#[tokio::test]
async fn pause_silences_a_long_timeline() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    let tracks = [short_clips(&session, 1_100)];

    session.play(&tracks, None).unwrap();
    assert!(peak(&backend.render(800).unwrap()) > 0.3);
    assert!(session.pause());
    session.snapshot();
    assert_eq!(peak(&backend.render(800).unwrap()), 0.0);
    assert!(!session.is_playing());

    session.play(&tracks, None).unwrap();
    let block = backend.render(800).unwrap();
    assert!(left(&block).iter().all(|&s| s > 0.3));
}

#[tokio::test]
async fn seek_deep_into_a_long_timeline() {
    let backend = ManualBackend::new();
    let mut session = session(&backend);
    let tracks = [short_clips(&session, 1_100)];

    session.play(&tracks, None).unwrap();
    backend.render(800).unwrap();
    session.seek(10.5, &tracks);
    let block = backend.render(800).unwrap();
    assert!(left(&block).iter().all(|&s| s > 0.3));
    assert!((session.current_time() - 10.6).abs() < 1e-9);
}
