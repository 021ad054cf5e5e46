//! Lifecycle tests for indras-backlog
//!
//! These tests drive whole sequences through draining, waking on growth,
//! termination, concurrent consumption and snapshot hand-off between
//! "processes" (independent sequence instances).

use std::collections::HashSet;
use std::path::Path;
use std::sync::Once;
use std::time::Duration;

use futures::StreamExt;
use indras_backlog::{
    BacklogError, ConfigError, FsScratchDir, LoadMode, Record, Sequence, SequenceConfig,
    SequenceOptions, SnapshotCodec,
};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn options_in(temp: &TempDir) -> SequenceOptions {
    SequenceOptions::builder()
        .scratch_dir(temp.path().join("scratch"))
        .build()
        .expect("valid options")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Job {
    id: u32,
    name: String,
}

fn job(id: u32) -> Job {
    Job {
        id,
        name: format!("job-{}", id),
    }
}

// ============================================================================
// Draining and termination
// ============================================================================

/// N values come out in order, then the sequence finishes immediately
#[tokio::test]
async fn test_drain_without_delays() {
    init_tracing();
    let values: Vec<u32> = (0..100).collect();
    let seq = Sequence::new(values.clone(), SequenceOptions::default()).unwrap();

    let mut pulled = Vec::new();
    for _ in 0..values.len() {
        pulled.push(seq.get().await.expect("value available"));
    }
    assert_eq!(pulled, values);

    let start = std::time::Instant::now();
    assert_eq!(seq.get().await, None);
    assert!(start.elapsed() < Duration::from_millis(50));
    assert!(seq.is_done());
}

/// End-to-end: [1, 2] with a 100ms budget, nothing arrives
#[tokio::test(start_paused = true)]
async fn test_finish_after_max_delay() {
    init_tracing();
    let options = SequenceOptions::builder().max_delay_ms(100).build().unwrap();
    let seq = Sequence::new([1, 2], options).unwrap();

    assert_eq!(seq.get().await, Some(1));
    assert_eq!(seq.get().await, Some(2));

    let start = Instant::now();
    assert_eq!(seq.get().await, None);
    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(100), "waited {:?}", waited);
    assert!(waited < Duration::from_millis(150), "waited {:?}", waited);
}

/// An update 20ms into a 200ms budget resolves the pending pull
#[tokio::test(start_paused = true)]
async fn test_update_during_wait_delivers_value() {
    init_tracing();
    let options = SequenceOptions::builder().max_delay_ms(200).build().unwrap();
    let seq = Sequence::new([1, 2], options).unwrap();
    assert_eq!(seq.get().await, Some(1));
    assert_eq!(seq.get().await, Some(2));

    let producer = seq.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.update([3]);
    });

    let start = Instant::now();
    assert_eq!(seq.get().await, Some(3));
    assert!(start.elapsed() < Duration::from_millis(200));

    // Budget restarts for the next pull, which then times out
    let start = Instant::now();
    assert_eq!(seq.get().await, None);
    assert!(start.elapsed() >= Duration::from_millis(200));
}

/// Repeated stop/get/update after termination changes nothing
#[tokio::test]
async fn test_terminal_state_is_stable() {
    init_tracing();
    let seq = Sequence::new(["x", "y"], SequenceOptions::default()).unwrap();
    assert_eq!(seq.get().await, Some("x"));

    for _ in 0..5 {
        seq.stop();
    }
    let before = seq.arr();

    for _ in 0..5 {
        assert_eq!(seq.get().await, None);
        assert_eq!(seq.update(["z"]), 0);
    }

    assert_eq!(seq.arr(), before);
    assert_eq!(seq.index(), 1);
    assert!(seq.is_done());
}

/// A pull on a drained sequence without a budget finishes it for good
#[tokio::test]
async fn test_drained_sequence_ignores_late_updates() {
    let seq = Sequence::from_value(1, SequenceOptions::default());
    assert_eq!(seq.get().await, Some(1));
    assert_eq!(seq.get().await, None);

    assert_eq!(seq.update([2, 3]), 0);
    assert_eq!(seq.len(), 1);
    assert_eq!(seq.get().await, None);
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_construction_errors() {
    let err = Sequence::<u8>::new([], SequenceOptions::default()).unwrap_err();
    assert_eq!(err, ConfigError::EmptyBacklog);

    let err = SequenceOptions::builder()
        .back_off_delay([])
        .build()
        .unwrap_err();
    assert_eq!(err, ConfigError::EmptyBackOffDelay);

    let err = SequenceOptions::builder()
        .max_delay(Duration::ZERO)
        .build()
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidMaxDelay(_)));
}

#[tokio::test(start_paused = true)]
async fn test_options_from_json_config() {
    let config = SequenceConfig::from_json(
        r#"{ "back_off_delay_ms": [10, 10], "max_delay_ms": 60, "poll_interval_ms": 20 }"#,
    )
    .unwrap();
    let seq = Sequence::new([7], config.into_options().unwrap()).unwrap();

    let start = Instant::now();
    assert_eq!(seq.get().await, Some(7));
    assert_eq!(start.elapsed(), Duration::from_millis(10));

    // 10ms back-off, then ticks at 20/40/60ms of waiting
    let start = Instant::now();
    assert_eq!(seq.get().await, None);
    assert_eq!(start.elapsed(), Duration::from_millis(70));
}

// ============================================================================
// Back-off
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_back_off_within_range() {
    let options = SequenceOptions::builder()
        .back_off_delay([100, 200])
        .build()
        .unwrap();
    let seq = Sequence::new(0..20, options).unwrap();

    for _ in 0..20 {
        let start = Instant::now();
        assert!(seq.get().await.is_some());
        let delay = start.elapsed();
        assert!(delay >= Duration::from_millis(100), "delay {:?}", delay);
        assert!(delay <= Duration::from_millis(200), "delay {:?}", delay);
    }
}

// ============================================================================
// Concurrent consumers
// ============================================================================

/// Many consumers on a multi-threaded runtime never share a value
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_consumers_never_double_consume() {
    init_tracing();
    let total = 1_000u32;
    let seq = Sequence::new(0..total, SequenceOptions::default()).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let consumer = seq.clone();
        handles.push(tokio::spawn(async move {
            let mut got = Vec::new();
            while let Some(v) = consumer.get().await {
                got.push(v);
            }
            got
        }));
    }

    let mut seen = HashSet::new();
    let mut count = 0;
    for handle in handles {
        let got = handle.await.unwrap();
        // Each consumer sees strictly increasing values
        assert!(got.windows(2).all(|w| w[0] < w[1]));
        count += got.len();
        seen.extend(got);
    }

    assert_eq!(count, total as usize);
    assert_eq!(seen.len(), total as usize);
    assert!(seq.arr().iter().all(Record::is_consumed));
}

/// Producer and consumers running together; every value delivered once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_producer_feeds_waiting_consumers() {
    let options = SequenceOptions::builder()
        .max_delay_ms(500)
        .poll_interval(Duration::from_millis(5))
        .build()
        .unwrap();
    let seq = Sequence::new([0u32], options).unwrap();

    let producer = seq.clone();
    let producing = tokio::spawn(async move {
        for batch in 0..10u32 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let start = 1 + batch * 10;
            producer.update(start..start + 10);
        }
    });

    let consumers: Vec<_> = (0..3)
        .map(|_| {
            let consumer = seq.clone();
            tokio::spawn(async move { consumer.stream().collect::<Vec<_>>().await })
        })
        .collect();

    producing.await.unwrap();

    let mut all = Vec::new();
    for consumer in consumers {
        all.extend(consumer.await.unwrap());
    }
    all.sort_unstable();
    assert_eq!(all, (0..=100).collect::<Vec<_>>());
}

// ============================================================================
// Snapshots
// ============================================================================

/// freeze then load into a fresh instance reproduces backlog and cursor
#[tokio::test]
async fn test_freeze_load_round_trip() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("jobs.json");

    let seq = Sequence::new((1..=5).map(job), options_in(&temp)).unwrap();
    assert_eq!(seq.get().await, Some(job(1)));
    assert_eq!(seq.get().await, Some(job(2)));

    let written = seq.freeze(Some(&path)).await.unwrap();
    assert_eq!(written, path);
    assert!(seq.is_done());
    assert_eq!(seq.get().await, None);

    let fresh = Sequence::new([job(99)], options_in(&temp)).unwrap();
    let summary = fresh
        .load(Some(&path), LoadMode::Replace)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.records, 5);
    assert_eq!(summary.cursor, 2);

    assert_eq!(fresh.arr(), seq.arr());
    assert_eq!(fresh.index(), 2);
    assert_eq!(fresh.get().await, Some(job(3)));
}

/// The on-disk format is a pretty JSON array of { consumed, value }
#[tokio::test]
async fn test_snapshot_file_format() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("numbers.json");

    let seq = Sequence::new([10, 20], options_in(&temp)).unwrap();
    seq.get().await;
    seq.freeze(Some(&path)).await.unwrap();

    let text = tokio::fs::read_to_string(&path).await.unwrap();
    let json: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(
        json,
        serde_json::json!([
            { "consumed": true, "value": 10 },
            { "consumed": false, "value": 20 }
        ])
    );
    assert!(text.contains("\n  {"));
}

/// Append-mode load adds only the unconsumed tail of the snapshot
#[tokio::test]
async fn test_append_load_adds_unconsumed_tail() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("tail.json");

    let frozen = Sequence::new(
        ["a", "b", "c", "d"].map(String::from),
        options_in(&temp),
    )
    .unwrap();
    frozen.get().await;
    frozen.get().await;
    frozen.freeze(Some(&path)).await.unwrap();

    let live = Sequence::new(["x", "y"].map(String::from), options_in(&temp)).unwrap();
    let summary = live
        .load(Some(&path), LoadMode::Append)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(summary.records, 4);
    assert_eq!(summary.appended, 2);
    assert_eq!(summary.cursor, 0);
    assert_eq!(live.remaining(), 4);

    let remaining: Vec<String> = live.stream().collect().await;
    assert_eq!(remaining, vec!["x", "y", "c", "d"]);
}

/// Auto-named snapshots: freeze without a path, load without a path
#[tokio::test]
async fn test_auto_named_snapshot_hand_off() {
    let temp = TempDir::new().unwrap();

    let first = Sequence::new([1, 2, 3], options_in(&temp)).unwrap();
    first.get().await;
    let older = first.freeze(None).await.unwrap();

    let second = Sequence::new([4, 5, 6], options_in(&temp)).unwrap();
    second.get().await;
    second.get().await;
    let newer = second.freeze(None).await.unwrap();

    // Freezing pruned the earlier auto snapshot
    assert!(!older.exists());
    assert!(newer.exists());
    assert_eq!(newer.parent(), Some(temp.path().join("scratch").as_path()));

    let resumed = Sequence::new([0], options_in(&temp)).unwrap();
    let summary = resumed.load(None, LoadMode::Replace).await.unwrap().unwrap();
    assert_eq!(summary.path, newer);
    assert_eq!(resumed.get().await, Some(6));
}

/// Implicit load with nothing on disk is a quiet no-op
/// Auto-named freezes only ever replace earlier snapshots; anything else
/// living in the scratch directory is left alone
#[tokio::test]
async fn test_auto_freeze_keeps_unrelated_files() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let scratch = temp.path().join("scratch");
    tokio::fs::create_dir_all(scratch.join("photos")).await.unwrap();
    tokio::fs::write(scratch.join("notes.txt"), b"shopping list").await.unwrap();
    tokio::fs::write(scratch.join("photos").join("a.jpg"), b"jpg").await.unwrap();

    let first = Sequence::new(vec![job(1)], options_in(&temp)).unwrap();
    let older = first.freeze(None).await.unwrap();
    let second = Sequence::new(vec![job(2)], options_in(&temp)).unwrap();
    let newer = second.freeze(None).await.unwrap();

    assert!(!older.exists());
    assert!(newer.exists());
    assert_eq!(
        tokio::fs::read(scratch.join("notes.txt")).await.unwrap(),
        b"shopping list"
    );
    assert!(scratch.join("photos").join("a.jpg").exists());
}

/// A replace-mode load while a consumer is parked hands the loaded backlog
/// to that consumer, even when it is shorter than the one it replaced
#[tokio::test]
async fn test_replace_load_wakes_waiting_consumer() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let snapshot = temp.path().join("short.json");

    let source = Sequence::new([10u32, 11, 12], options_in(&temp)).unwrap();
    assert_eq!(source.get().await, Some(10));
    source.freeze(Some(&snapshot)).await.unwrap();

    let options = SequenceOptions::builder()
        .scratch_dir(temp.path().join("scratch"))
        .max_delay_ms(300)
        .build()
        .unwrap();
    let seq = Sequence::new([1u32, 2, 3, 4, 5], options).unwrap();
    for expected in 1..=5 {
        assert_eq!(seq.get().await, Some(expected));
    }

    let consumer = seq.clone();
    let waiting = tokio::spawn(async move { consumer.get().await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let summary = seq
        .load(Some(&snapshot), LoadMode::Replace)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.cursor, 1);

    assert_eq!(waiting.await.unwrap(), Some(11));
    assert_eq!(seq.get().await, Some(12));
    assert_eq!(seq.index(), 3);
}

#[tokio::test]
async fn test_implicit_load_without_snapshot() {
    let temp = TempDir::new().unwrap();
    let seq = Sequence::new([1], options_in(&temp)).unwrap();

    let summary = seq.load(None, LoadMode::Replace).await.unwrap();
    assert!(summary.is_none());
    assert_eq!(seq.len(), 1);
    assert!(!seq.is_done());
}

/// Explicit load of a missing file is surfaced
#[tokio::test]
async fn test_explicit_load_missing_file_errors() {
    let temp = TempDir::new().unwrap();
    let seq = Sequence::new([1], options_in(&temp)).unwrap();
    let missing = temp.path().join("nope.json");

    let err = seq.load(Some(&missing), LoadMode::Append).await.unwrap_err();
    assert!(matches!(err, BacklogError::SnapshotNotFound(ref p) if p == &missing));
    assert_eq!(seq.len(), 1);
}

/// Invalid explicit paths fail before anything is stopped or written
#[tokio::test]
async fn test_freeze_rejects_invalid_path() {
    let temp = TempDir::new().unwrap();
    let seq = Sequence::new([1], options_in(&temp)).unwrap();

    let err = seq.freeze(Some(Path::new(""))).await.unwrap_err();
    assert!(matches!(err, BacklogError::Config(ConfigError::InvalidPath(_))));
    assert!(!seq.is_done());
    assert!(!temp.path().join("scratch").exists());
}

/// A corrupt snapshot is a deserialization error, not a silent no-op
#[tokio::test]
async fn test_corrupt_snapshot() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("corrupt.json");
    tokio::fs::write(&path, b"[{\"consumed\": tru").await.unwrap();

    let seq = Sequence::new([1], options_in(&temp)).unwrap();
    let err = seq.load(Some(&path), LoadMode::Replace).await.unwrap_err();
    assert!(matches!(err, BacklogError::Deserialization(_)));
}

/// Replace-mode load revives a frozen instance; append-mode does not
#[tokio::test]
async fn test_load_into_finished_sequence() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("revive.json");

    let seq = Sequence::new([1, 2, 3], options_in(&temp)).unwrap();
    seq.get().await;
    seq.freeze(Some(&path)).await.unwrap();
    assert!(seq.is_done());

    let summary = seq
        .load(Some(&path), LoadMode::Append)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.appended, 0);
    assert!(seq.is_done());
    assert_eq!(seq.len(), 3);

    seq.load(Some(&path), LoadMode::Replace).await.unwrap();
    assert!(!seq.is_done());
    assert_eq!(seq.get().await, Some(2));
    assert_eq!(seq.get().await, Some(3));
}

/// Restoring directly from a snapshot file
#[tokio::test]
async fn test_restore_from_snapshot() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("restore.json");

    let seq = Sequence::new((1..=3).map(job), options_in(&temp)).unwrap();
    seq.get().await;
    seq.freeze(Some(&path)).await.unwrap();

    let restored: Sequence<Job> = Sequence::restore(&path, options_in(&temp)).await.unwrap();
    assert_eq!(restored.index(), 1);
    assert_eq!(restored.pending(), vec![job(2), job(3)]);

    let empty = temp.path().join("empty.json");
    SnapshotCodec::new(FsScratchDir::new(temp.path()))
        .write::<Job>(&[], Some(&empty))
        .await
        .unwrap();
    let err = Sequence::<Job>::restore(&empty, options_in(&temp))
        .await
        .unwrap_err();
    assert!(matches!(err, BacklogError::Config(ConfigError::EmptyBacklog)));
}

/// Fully consumed snapshot resumes at the end
#[tokio::test]
async fn test_fully_consumed_snapshot() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("done.json");

    let seq = Sequence::new([1, 2], options_in(&temp)).unwrap();
    seq.get().await;
    seq.get().await;
    seq.freeze(Some(&path)).await.unwrap();

    let fresh = Sequence::new([0], options_in(&temp)).unwrap();
    let summary = fresh
        .load(Some(&path), LoadMode::Replace)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(summary.cursor, 2);
    assert_eq!(fresh.remaining(), 0);
    assert_eq!(fresh.get().await, None);
}
