// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::*;
use crate::test_helpers::{MockCodec, SAMPLE_CAPTIONS};
use std::collections::BTreeSet;
use std::path::PathBuf;

fn item(id: &str) -> ItemMetadata {
    ItemMetadata {
        id: id.to_string(),
        title: format!("title {}", id),
        url: format!("https://example.com/watch?v={}", id),
        caption_languages: BTreeSet::from(["en".to_string()]),
        duration_secs: Some(90),
    }
}

async fn fetched(unit_dir: &Path, id: &str, captions: &str) -> FetchedMedia {
    tokio::fs::create_dir_all(unit_dir).await.unwrap();
    let caption_path = unit_dir.join(format!("{}.en.vtt", id));
    tokio::fs::write(&caption_path, captions).await.unwrap();
    let media = unit_dir.join(format!("{}.mp4", id));
    tokio::fs::write(&media, b"media").await.unwrap();
    FetchedMedia {
        audio_source: media.clone(),
        video_source: media,
        caption_path,
    }
}

// -----------------------------------------------------------------------
// Timestamps
// -----------------------------------------------------------------------

#[test]
fn test_parse_timestamp() {
    assert_eq!(parse_timestamp("01:02:03.004"), Some(3_723_004));
    assert_eq!(parse_timestamp("00:00:01.000"), Some(1_000));
    assert_eq!(parse_timestamp("00:00:01,250"), Some(1_250));
    assert_eq!(parse_timestamp("02:03.5"), Some(123_500));
    assert_eq!(parse_timestamp("00:00:07"), Some(7_000));
}

#[test]
fn test_parse_timestamp_rejects_garbage() {
    assert_eq!(parse_timestamp(""), None);
    assert_eq!(parse_timestamp("1:2:3:4.000"), None);
    assert_eq!(parse_timestamp("aa:bb:cc.ddd"), None);
    assert_eq!(parse_timestamp("00:-1:00.000"), None);
}

#[test]
fn test_parse_timestamp_overflow_is_rejected() {
    // Parses as u64 but overflows once scaled to milliseconds
    assert_eq!(parse_timestamp("99999999999999999:00:00.000"), None);
    assert_eq!(parse_timestamp("00:99999999999999999:00.000"), None);
    assert_eq!(parse_timestamp(&format!("00:00:{}.000", u64::MAX)), None);

    let track = "\
99999999999999999:00:00.000 --> 99999999999999999:00:01.000
This cue has an absurd timestamp

00:00:01.000 --> 00:00:02.000
This one is perfectly fine
";
    let cues = parse_captions(track);
    assert_eq!(cues.len(), 1);
    assert_eq!(cues[0].text, "This one is perfectly fine");
}

// -----------------------------------------------------------------------
// Caption parsing
// -----------------------------------------------------------------------

#[test]
fn test_lowercase_continuation_merges() {
    let track = "00:00:01.000 --> 00:00:02.000\nhello world foo\n\n00:00:02.000 --> 00:00:03.000\nbar\n";
    let cues = parse_captions(track);
    assert_eq!(
        cues,
        vec![SubtitleCue {
            start_ms: 1000,
            end_ms: 3000,
            text: "hello world foo bar".to_string(),
        }]
    );
}

#[test]
fn test_first_cue_lowercase_is_kept() {
    // No previous cue to merge into
    let track = "00:00:01.000 --> 00:00:02.000\nlowercase start here\n";
    let cues = parse_captions(track);
    assert_eq!(cues.len(), 1);
    assert_eq!(cues[0].start_ms, 1000);
}

#[test]
fn test_short_cue_dropped_entirely() {
    let track = "\
00:00:01.000 --> 00:00:02.000
First sentence is here

00:00:02.000 --> 00:00:03.000
Ok.

00:00:03.000 --> 00:00:04.000
Second one stands alone
";
    let cues = parse_captions(track);
    assert_eq!(cues.len(), 2);
    assert_eq!(cues[0].end_ms, 2000, "dropped cue must not extend its neighbour");
    assert_eq!(cues[1].text, "Second one stands alone");
}

#[test]
fn test_whitespace_and_replacement_chars_collapse() {
    let track = "00:00:01.000 --> 00:00:02.000\nHello \u{FFFD}\u{FFFD} there\n\tworld\n";
    let cues = parse_captions(track);
    assert_eq!(cues[0].text, "Hello there world");
}

#[test]
fn test_webvtt_header_identifiers_and_settings() {
    let track = "WEBVTT\r\n\r\nNOTE produced by a tool\r\n\r\ncue-1\r\n00:01.000 --> 00:02.500 align:start position:10%\r\nSpoken words right here\r\n";
    let cues = parse_captions(track);
    assert_eq!(cues.len(), 1);
    assert_eq!((cues[0].start_ms, cues[0].end_ms), (1000, 2500));
    assert_eq!(cues[0].text, "Spoken words right here");
}

#[test]
fn test_sample_track_parses_to_two_cues() {
    let cues = parse_captions(SAMPLE_CAPTIONS);
    let spans: Vec<(u64, u64)> = cues.iter().map(|c| (c.start_ms, c.end_ms)).collect();
    // "Hi" is dropped as noise
    assert_eq!(spans, vec![(1000, 6000), (9000, 12500)]);
    assert_eq!(cues[0].text, "The quick brown fox jumps over the lazy dog");
}

// -----------------------------------------------------------------------
// Segmentation
// -----------------------------------------------------------------------

#[tokio::test]
async fn test_segment_writes_artifacts_descriptor_and_sentinel() {
    let temp = tempfile::tempdir().unwrap();
    let unit_dir = temp.path().join("vid1");
    let media = fetched(&unit_dir, "vid1", SAMPLE_CAPTIONS).await;
    let codec = Arc::new(MockCodec::new());
    let segmenter = ContentSegmenter::new(codec.clone());

    let descriptor = segmenter
        .segment(&item("vid1"), "en", &media, &unit_dir)
        .await
        .unwrap();

    assert_eq!(descriptor.contents.len(), 2);
    assert_eq!(codec.audio_calls(), 2);
    assert_eq!(codec.frames(), vec![1000, 3500, 9000, 10750]);

    let first = &descriptor.contents[0];
    assert_eq!(first.audio_segment, "vid1.audio.00001000-00006000.wav");
    assert_eq!(
        first.video_captures,
        vec!["vid1.video.00001000.png", "vid1.video.00003500.png"]
    );
    assert!(unit_dir.join(&first.audio_segment).exists());

    assert!(crate::unit::is_complete(&unit_dir).await);
    let on_disk: ContentDescriptor = serde_json::from_slice(
        &tokio::fs::read(crate::unit::descriptor_path(&unit_dir, "vid1"))
            .await
            .unwrap(),
    )
    .unwrap();
    assert_eq!(on_disk, descriptor);
    assert_eq!(on_disk.lang, "en");
    assert_eq!(on_disk.duration_secs, Some(90));
    assert!(!unit_dir.join(".vid1.contents.json.partial").exists());
}

#[tokio::test]
async fn test_short_cues_skipped_without_affecting_neighbours() {
    let track = "\
00:00:01.000 --> 00:00:02.000
Only three words

00:00:03.000 --> 00:00:05.000
This cue has enough words
";
    let temp = tempfile::tempdir().unwrap();
    let unit_dir = temp.path().join("v2");
    let media = fetched(&unit_dir, "v2", track).await;
    let codec = Arc::new(MockCodec::new());

    let descriptor = ContentSegmenter::new(codec.clone())
        .segment(&item("v2"), "en", &media, &unit_dir)
        .await
        .unwrap();

    assert_eq!(descriptor.contents.len(), 1);
    assert_eq!(descriptor.contents[0].start_timestamp, 3000);
    assert_eq!(codec.frames(), vec![3000, 4000]);
}

#[tokio::test]
async fn test_frame_failure_aborts_without_sentinel() {
    let temp = tempfile::tempdir().unwrap();
    let unit_dir = temp.path().join("vid3");
    let media = fetched(&unit_dir, "vid3", SAMPLE_CAPTIONS).await;
    // Midpoint of the second segment
    let codec = Arc::new(MockCodec::failing_frame_at(10750));

    let err = ContentSegmenter::new(codec)
        .segment(&item("vid3"), "en", &media, &unit_dir)
        .await
        .unwrap_err();

    assert!(matches!(err, SegmentationError::FrameCapture { at_ms: 10750, .. }));
    assert!(!crate::unit::is_complete(&unit_dir).await);
    assert!(!crate::unit::descriptor_path(&unit_dir, "vid3").exists());
}

#[tokio::test]
async fn test_missing_caption_track() {
    let temp = tempfile::tempdir().unwrap();
    let media = FetchedMedia {
        audio_source: PathBuf::from("/nonexistent/a.mp4"),
        video_source: PathBuf::from("/nonexistent/a.mp4"),
        caption_path: temp.path().join("missing.vtt"),
    };
    let err = ContentSegmenter::new(Arc::new(MockCodec::new()))
        .segment(&item("a"), "en", &media, temp.path())
        .await
        .unwrap_err();
    assert!(matches!(err, SegmentationError::CaptionTrack { .. }));
}

#[test]
fn test_artifact_names() {
    assert_eq!(audio_artifact_name("x", 0, 1500), "x.audio.00000000-00001500.wav");
    assert_eq!(frame_artifact_name("x", 3_723_004), "x.video.03723004.png");
}
