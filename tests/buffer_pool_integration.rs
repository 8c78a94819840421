//! Integration tests for the buffer pool manager.
//!
//! These tests verify cross-component behavior that the unit tests
//! alongside each module don't cover: durability across eviction cycles,
//! durability across BPM restarts, and stats under concurrent load.

use pagepool::buffer::BufferPoolManager;
use pagepool::common::{AccessType, PageId};
use pagepool::storage::DiskManager;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

fn create_bpm(pool_size: usize) -> (BufferPoolManager, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let dm = DiskManager::create(&path).unwrap();
    (BufferPoolManager::new(pool_size, dm, 2, None), dir)
}

#[test]
fn test_data_persistence_across_evictions() {
    let (bpm, _dir) = create_bpm(2);

    let mut page_ids = vec![];
    for i in 0u8..5 {
        let pid = bpm.new_page();
        {
            let mut guard = bpm.fetch_write(pid, AccessType::Unknown).unwrap();
            guard.as_mut_slice()[0] = i;
            guard.as_mut_slice()[1] = i.wrapping_mul(3);
        }
        page_ids.push(pid);
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_read(pid, AccessType::Unknown).unwrap();
        assert_eq!(guard.as_slice()[0], i as u8);
        assert_eq!(guard.as_slice()[1], (i as u8).wrapping_mul(3));
    }
}

#[test]
fn test_flush_and_reload() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let data = b"persistent!";

    let pid;

    {
        let dm = DiskManager::create(&path).unwrap();
        let bpm = BufferPoolManager::new(10, dm, 2, None);

        pid = bpm.new_page();
        {
            let mut guard = bpm.fetch_write(pid, AccessType::Unknown).unwrap();
            guard.as_mut_slice()[..data.len()].copy_from_slice(data);
        }

        bpm.flush_all();
    }

    {
        let dm = DiskManager::open(&path).unwrap();
        let bpm = BufferPoolManager::new(10, dm, 2, None);

        let guard = bpm.fetch_read(pid, AccessType::Unknown).unwrap();
        assert_eq!(&guard.as_slice()[..data.len()], data);
    }
}

#[test]
fn test_concurrent_writers() {
    let (bpm, _dir) = create_bpm(10);
    let bpm = Arc::new(bpm);

    let page_ids: Vec<PageId> = (0..5).map(|_| bpm.new_page()).collect();

    let mut handles = vec![];

    for (i, pid) in page_ids.iter().enumerate() {
        let bpm_clone = Arc::clone(&bpm);
        let pid = *pid;

        handles.push(thread::spawn(move || {
            for j in 0..50 {
                let mut guard = bpm_clone.fetch_write(pid, AccessType::Unknown).unwrap();
                guard.as_mut_slice()[0] = ((i * 50 + j) % 256) as u8;
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    for (i, &pid) in page_ids.iter().enumerate() {
        let guard = bpm.fetch_read(pid, AccessType::Unknown).unwrap();
        assert_eq!(guard.as_slice()[0], ((i * 50 + 49) % 256) as u8);
    }
}

#[test]
fn test_stats_accuracy() {
    let (bpm, _dir) = create_bpm(2);

    let pid = bpm.new_page();

    for _ in 0..5 {
        drop(bpm.fetch_read(pid, AccessType::Unknown).unwrap());
    }

    let stats = bpm.stats();
    assert!(stats.cache_hits >= 5);

    let _ = bpm.new_page();
    drop(bpm.fetch_read(bpm.new_page(), AccessType::Unknown));

    let stats = bpm.stats();
    assert!(stats.evictions >= 1);
}

#[test]
fn test_pin_count_sum_matches_live_guards() {
    let (bpm, _dir) = create_bpm(4);
    let pid = bpm.new_page();

    let g1 = bpm.fetch_read(pid, AccessType::Unknown).unwrap();
    let g2 = bpm.fetch_read(pid, AccessType::Unknown).unwrap();
    let g3 = bpm.fetch_read(pid, AccessType::Unknown).unwrap();
    assert_eq!(bpm.pin_count(pid), Some(3));

    drop(g2);
    assert_eq!(bpm.pin_count(pid), Some(2));
    drop(g1);
    drop(g3);
    assert_eq!(bpm.pin_count(pid), Some(0));
}

#[test]
fn test_delete_then_no_stale_read() {
    let (bpm, _dir) = create_bpm(4);
    let pid = bpm.new_page();
    {
        let mut guard = bpm.fetch_write(pid, AccessType::Unknown).unwrap();
        guard.as_mut_slice()[0] = 0xEE;
    }
    assert!(bpm.delete_page(pid));

    assert!(bpm.fetch_read(pid, AccessType::Unknown).is_none());
    assert!(bpm.fetch_write(pid, AccessType::Unknown).is_none());
}

#[test]
fn test_next_page_id_strictly_monotonic() {
    let (bpm, _dir) = create_bpm(4);
    let mut prev = None;
    for _ in 0..20 {
        let pid = bpm.new_page();
        if let Some(prev) = prev {
            assert!(pid.0 > prev);
        }
        prev = Some(pid.0);
    }
}
