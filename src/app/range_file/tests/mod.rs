//! Integration-style tests for the range allocator and partial-file writer
//!
//! These exercise the public surface of [`RangeFile`] end to end against real
//! temp files, covering the invariants the download engine leans on:
//! disjoint sets, exclusive allocation under concurrency, coalescing,
//! partial-fill recovery and metadata restore behavior.

use std::sync::Arc;

use tempfile::TempDir;

use super::{meta_path, temp_path, Metadata, RangeFile};
use crate::app::interval::{FillState, Interval, TrackedInterval};

/// Deterministic payload byte for an absolute file offset.
fn payload_byte(offset: i64) -> u8 {
    (offset % 251) as u8
}

fn payload(range: &Interval) -> Vec<u8> {
    (range.start..=range.end).map(payload_byte).collect()
}

async fn snapshot(rf: &RangeFile, dest: &std::path::Path) -> Metadata {
    rf.dump().await.unwrap();
    let bytes = tokio::fs::read(meta_path(dest)).await.unwrap();
    Metadata::decode(&bytes).unwrap()
}

#[tokio::test]
async fn allocation_tiles_by_block_hint() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("tiled.bin");

    // 5 full blocks and one 4-byte remainder
    let rf = RangeFile::new(16 * 5 + 4, 16);
    rf.open(&dest).await.unwrap();

    let mut sizes = Vec::new();
    let mut claimed = Vec::new();
    while let Some(range) = rf.allocate().await {
        assert_eq!(range.state, FillState::Pending);
        assert_eq!(range.position, range.span.start);
        sizes.push(range.span.size());
        claimed.push(range);
    }
    assert_eq!(sizes, vec![16, 16, 16, 16, 16, 4]);

    // contiguous, ordered by start, no overlap
    let mut expected_start = 0;
    for range in &claimed {
        assert_eq!(range.span.start, expected_start);
        expected_start = range.span.end + 1;
    }

    for range in claimed {
        assert!(rf.deallocate(range).await);
    }
    rf.close(false).await.unwrap();
}

#[tokio::test]
async fn sets_stay_disjoint_and_cover_the_file() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("disjoint.bin");
    let total = 64 * 4;

    let rf = RangeFile::new(total, 64);
    rf.open(&dest).await.unwrap();

    // one range fully filled, one half filled, one untouched, one left available
    let mut full = rf.allocate().await.unwrap();
    let mut half = rf.allocate().await.unwrap();
    let untouched = rf.allocate().await.unwrap();

    let full_bytes = payload(&full.span);
    rf.fill(&mut full, &full_bytes).await.unwrap();
    let half_bytes = payload(&half.span);
    rf.fill(&mut half, &half_bytes[..32]).await.unwrap();

    rf.deallocate(full).await;
    rf.deallocate(half).await;
    rf.deallocate(untouched).await;

    let meta = snapshot(&rf, &dest).await;
    assert!(meta.allocated.is_empty());
    assert_eq!(meta.covered_bytes(), total);
    assert_eq!(meta.processed, 64 + 32);

    // no byte may appear in two sets
    let mut seen = vec![false; total as usize];
    for entry in meta.available.iter().chain(meta.finished.iter()) {
        for offset in entry.span.start..=entry.span.end {
            assert!(!seen[offset as usize], "byte {offset} claimed twice");
            seen[offset as usize] = true;
        }
    }
    assert!(seen.into_iter().all(|b| b));

    rf.close(false).await.unwrap();
}

#[tokio::test]
async fn concurrent_workers_never_share_a_byte() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("exclusive.bin");
    let total: i64 = 4096;

    let rf = Arc::new(RangeFile::new(total, 256));
    rf.open(&dest).await.unwrap();

    let claims = Arc::new(std::sync::Mutex::new(Vec::<Interval>::new()));
    let mut handles = Vec::new();
    for _ in 0..8 {
        let rf = Arc::clone(&rf);
        let claims = Arc::clone(&claims);
        handles.push(tokio::spawn(async move {
            while let Some(mut range) = rf.allocate().await {
                {
                    let mut log = claims.lock().unwrap();
                    for other in log.iter() {
                        assert!(
                            !range.span.intersects(other),
                            "overlapping allocation {:?} vs {:?}",
                            range.span,
                            other
                        );
                    }
                    log.push(range.span);
                }
                let bytes = payload(&range.span);
                rf.fill(&mut range, &bytes).await.unwrap();
                assert!(rf.deallocate(range).await);
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert!(rf.is_full().await);
    assert_eq!(rf.processed(), total);
    assert_eq!(
        claims.lock().unwrap().iter().map(Interval::size).sum::<i64>(),
        total
    );

    rf.close(true).await.unwrap();

    // promoted: final file holds the payload, no leftovers
    let written = std::fs::read(&dest).unwrap();
    assert_eq!(written.len() as i64, total);
    assert!(written
        .iter()
        .enumerate()
        .all(|(i, b)| *b == payload_byte(i as i64)));
    assert!(!temp_path(&dest).exists());
    assert!(!meta_path(&dest).exists());
}

#[tokio::test]
async fn filling_out_of_order_coalesces_to_one_range() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("coalesce.bin");
    let block: i64 = 32;
    let total = block * 10;

    let rf = RangeFile::new(total, block);
    rf.open(&dest).await.unwrap();

    let mut ranges = Vec::new();
    while let Some(range) = rf.allocate().await {
        ranges.push(range);
    }
    assert_eq!(ranges.len(), 10);

    // deallocate in a scrambled order
    for index in [3usize, 7, 0, 9, 5, 1, 8, 2, 6, 4] {
        let mut range = ranges[index];
        let bytes = payload(&range.span);
        rf.fill(&mut range, &bytes).await.unwrap();
        assert_eq!(range.state, FillState::Filled);
        assert!(rf.deallocate(range).await);
    }

    let meta = snapshot(&rf, &dest).await;
    assert_eq!(meta.finished.len(), 1);
    let only = &meta.finished[0];
    assert_eq!(only.span, Interval::new(0, total - 1));
    assert_eq!(only.position, total);
    assert_eq!(rf.set_sizes().await, (0, 0, 1));
    assert!(rf.is_full().await);

    rf.close(true).await.unwrap();
}

#[tokio::test]
async fn partial_fill_splits_into_prefix_and_tail() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("partial.bin");
    let block: i64 = 128;

    let rf = RangeFile::new(block, block);
    rf.open(&dest).await.unwrap();

    let mut range = rf.allocate().await.unwrap();
    let half = (block / 2) as usize;
    let bytes = payload(&range.span);
    rf.fill(&mut range, &bytes[..half]).await.unwrap();
    assert_eq!(range.state, FillState::Partial);
    assert!(rf.deallocate(range).await);

    let meta = snapshot(&rf, &dest).await;
    assert_eq!(meta.processed, half as i64);
    assert_eq!(meta.finished.len(), 1);
    assert_eq!(meta.finished[0].span, Interval::new(0, half as i64 - 1));
    assert_eq!(meta.finished[0].state, FillState::Filled);
    assert_eq!(meta.available.len(), 1);
    assert_eq!(
        meta.available[0].span,
        Interval::new(half as i64, block - 1)
    );
    assert_eq!(meta.available[0].state, FillState::Unfilled);

    // the tail comes straight back on the next allocation
    let tail = rf.allocate().await.unwrap();
    assert_eq!(tail.span, Interval::new(half as i64, block - 1));

    rf.deallocate(tail).await;
    rf.close(false).await.unwrap();
}

#[tokio::test]
async fn pending_range_returns_whole() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("pending.bin");

    let rf = RangeFile::new(256, 64);
    rf.open(&dest).await.unwrap();

    let range = rf.allocate().await.unwrap();
    let span = range.span;
    assert!(rf.deallocate(range).await);

    // deallocating something we no longer hold fails
    let stale = TrackedInterval::unfilled(span);
    assert!(!rf.deallocate(stale).await);

    let again = rf.allocate().await.unwrap();
    assert_eq!(again.span, span);

    rf.deallocate(again).await;
    rf.close(false).await.unwrap();
}

#[tokio::test]
async fn restore_drops_in_flight_ranges() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("restore.bin");
    let block: i64 = 64;
    let total = block * 4;

    // fabricate the on-disk state of an interrupted download: one finished
    // block, one mid-flight allocation at position start + 16, rest untouched
    std::fs::write(temp_path(&dest), vec![0u8; total as usize]).unwrap();
    let meta = Metadata {
        block_hint: block,
        bytes_total: total,
        processed: block + 16,
        available: vec![
            TrackedInterval::unfilled(Interval::new(block * 2, block * 3 - 1)),
            TrackedInterval::unfilled(Interval::new(block * 3, total - 1)),
        ],
        allocated: vec![TrackedInterval {
            span: Interval::new(block, block * 2 - 1),
            position: block + 16,
            state: FillState::Partial,
        }],
        finished: vec![TrackedInterval::filled(Interval::new(0, block - 1))],
    };
    std::fs::write(meta_path(&dest), meta.encode().unwrap()).unwrap();

    let rf = RangeFile::new(total, block);
    rf.open(&dest).await.unwrap();

    // in-flight prefix discarded: processed drops by position - start
    assert_eq!(rf.processed(), block);

    let restored = snapshot(&rf, &dest).await;
    assert!(restored.allocated.is_empty());
    assert!(restored
        .available
        .iter()
        .any(|r| r.span == Interval::new(block, block * 2 - 1)
            && r.state == FillState::Unfilled));
    assert_eq!(restored.finished.len(), 1);
    assert_eq!(restored.finished[0].span, Interval::new(0, block - 1));

    // first allocation hands out the dropped range again
    let range = rf.allocate().await.unwrap();
    assert_eq!(range.span, Interval::new(block, block * 2 - 1));

    rf.deallocate(range).await;
    rf.close(false).await.unwrap();
}

#[tokio::test]
async fn restore_rejects_inconsistent_coverage() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("badmeta.bin");
    let total: i64 = 256;

    std::fs::write(temp_path(&dest), vec![0u8; total as usize]).unwrap();
    // snapshot only covers half the file
    let meta = Metadata {
        block_hint: 64,
        bytes_total: total,
        processed: 0,
        available: vec![TrackedInterval::unfilled(Interval::new(0, 127))],
        allocated: vec![],
        finished: vec![],
    };
    std::fs::write(meta_path(&dest), meta.encode().unwrap()).unwrap();

    let rf = RangeFile::new(total, 64);
    rf.open(&dest).await.unwrap();

    // discarded: a fresh allocation pass tiles the whole file again
    assert_eq!(rf.processed(), 0);
    let mut count = 0;
    let mut ranges = Vec::new();
    while let Some(range) = rf.allocate().await {
        count += 1;
        ranges.push(range);
    }
    assert_eq!(count, 4);

    for range in ranges {
        rf.deallocate(range).await;
    }
    rf.close(false).await.unwrap();
}

#[tokio::test]
async fn size_mismatch_discards_metadata() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("resize.bin");

    // stale artifacts from a download of a different size
    std::fs::write(temp_path(&dest), vec![0u8; 100]).unwrap();
    let meta = Metadata {
        block_hint: 64,
        bytes_total: 100,
        processed: 0,
        available: vec![TrackedInterval::unfilled(Interval::new(0, 99))],
        allocated: vec![],
        finished: vec![],
    };
    std::fs::write(meta_path(&dest), meta.encode().unwrap()).unwrap();

    let rf = RangeFile::new(256, 64);
    rf.open(&dest).await.unwrap();

    assert!(!meta_path(&dest).exists());
    assert_eq!(
        std::fs::metadata(temp_path(&dest)).unwrap().len(),
        256,
        "temp file resized to the new total"
    );

    rf.close(false).await.unwrap();
}

#[tokio::test]
async fn dump_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("dump.bin");

    let rf = RangeFile::new(512, 128);
    rf.open(&dest).await.unwrap();

    let mut range = rf.allocate().await.unwrap();
    let bytes = payload(&range.span);
    rf.fill(&mut range, &bytes).await.unwrap();
    rf.deallocate(range).await;

    rf.dump().await.unwrap();
    let first = std::fs::read(meta_path(&dest)).unwrap();
    rf.dump().await.unwrap();
    let second = std::fs::read(meta_path(&dest)).unwrap();
    assert_eq!(first, second);

    rf.close(false).await.unwrap();
}

#[tokio::test]
async fn close_unfinished_preserves_artifacts() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("keep.bin");

    let rf = RangeFile::new(256, 64);
    rf.open(&dest).await.unwrap();

    let mut range = rf.allocate().await.unwrap();
    let bytes = payload(&range.span);
    rf.fill(&mut range, &bytes).await.unwrap();
    rf.deallocate(range).await;
    rf.dump().await.unwrap();

    rf.close(false).await.unwrap();

    assert!(!dest.exists());
    assert!(temp_path(&dest).exists());
    assert!(meta_path(&dest).exists());
}

#[tokio::test]
async fn close_finished_with_missing_bytes_fails() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("short.bin");

    let rf = RangeFile::new(256, 64);
    rf.open(&dest).await.unwrap();

    let mut range = rf.allocate().await.unwrap();
    let bytes = payload(&range.span);
    rf.fill(&mut range, &bytes).await.unwrap();
    rf.deallocate(range).await;

    assert!(!rf.is_full().await);
    assert!(rf.close(true).await.is_err());
    // the temp artifact was not promoted
    assert!(!dest.exists());
}

#[tokio::test]
async fn sequential_fill_tracks_a_growing_prefix() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("stream.bin");
    let total: i64 = 96;

    let rf = RangeFile::new(total, 1024);
    rf.open(&dest).await.unwrap();

    let body: Vec<u8> = (0..total).map(payload_byte).collect();
    rf.fill_sequential(&body[..32]).await.unwrap();
    rf.fill_sequential(&body[32..]).await.unwrap();

    assert_eq!(rf.processed(), total);
    assert!(rf.is_full().await);

    rf.close(true).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn rewind_restarts_the_streaming_prefix() {
    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("rewind.bin");
    let total: i64 = 64;

    let rf = RangeFile::new(total, 1024);
    rf.open(&dest).await.unwrap();

    rf.fill_sequential(&vec![0xAA; 40]).await.unwrap();
    assert_eq!(rf.processed(), 40);

    rf.rewind().await.unwrap();
    assert_eq!(rf.processed(), 0);
    assert!(!rf.is_full().await);

    let body: Vec<u8> = (0..total).map(payload_byte).collect();
    rf.fill_sequential(&body).await.unwrap();
    assert_eq!(rf.processed(), total);

    rf.close(true).await.unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}
