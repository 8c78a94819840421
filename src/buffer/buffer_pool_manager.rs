//! BufferPoolManager - the cache between the query layer and disk.
//!
//! The buffer pool manager owns a fixed-size array of [`Frame`]s. Callers
//! fetch pages by ID and get back an RAII guard; the manager handles
//! bringing pages in from disk, choosing eviction victims via
//! [`LruKReplacer`], and writing dirty pages back out.
//!
//! # Locking
//! There is exactly one lock protecting the manager's bookkeeping: the BPM
//! mutex, [`SharedInner::state`], which bundles the page table and the free
//! list. It is always acquired to find or claim a frame, and released
//! again before a guard's replacer bookkeeping or frame latch is touched -
//! with one accepted exception: when claiming a frame requires evicting a
//! dirty victim, the mutex stays held across the synchronous flush of that
//! victim, so the old page's removal from the table and the new page's
//! installation happen as one atomic step. Loading a freshly-claimed
//! frame's contents in from disk on a cache miss happens after the mutex
//! is released.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{AccessType, Error, FrameId, PageId, Result};
use crate::recovery::LogManager;
use crate::storage::disk_scheduler::{create_promise, DiskRequest, DiskScheduler};
use crate::storage::DiskManager;

use super::frame::Frame;
use super::page_guard::{PageReadGuard, PageWriteGuard};
use super::replacer::LruKReplacer;
use super::stats::{BufferPoolStats, StatsSnapshot};

/// Bookkeeping protected by the single BPM mutex.
struct BpmState {
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
}

/// State shared between the `BufferPoolManager` handle and every live page
/// guard.
///
/// Guards hold this behind an `Arc` rather than borrowing the manager, so a
/// guard stays valid regardless of how many `BufferPoolManager` handles
/// still exist.
pub(crate) struct SharedInner {
    frames: Vec<Frame>,
    state: Mutex<BpmState>,
    replacer: LruKReplacer,
    disk_scheduler: DiskScheduler,
    stats: BufferPoolStats,
    #[allow(dead_code)]
    log_manager: Option<Arc<LogManager>>,
}

/// Cheaply-cloned handle to [`SharedInner`], the type guards actually hold.
pub(crate) type Shared = Arc<SharedInner>;

impl SharedInner {
    pub(crate) fn flush_frame(&self, frame_id: FrameId, page_id: PageId) -> Result<bool> {
        let frame = &self.frames[frame_id.0];
        if frame.page_id() != Some(page_id) {
            // The frame has since been recycled for a different page; there
            // is nothing of this page's left to flush.
            return Ok(false);
        }
        if !frame.is_dirty() {
            return Ok(false);
        }

        let (promise, future) = create_promise();
        self.disk_scheduler.schedule(DiskRequest {
            is_write: true,
            page_id,
            buffer: frame.page_arc(),
            promise,
        });
        let result = future.wait();
        if result.is_ok() {
            frame.clear_dirty();
            self.stats.pages_written.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(?page_id, "flushed page");
        } else {
            tracing::error!(?page_id, "flush failed");
        }
        result
    }

    pub(crate) fn mark_dirty(&self, frame_id: FrameId) {
        self.frames[frame_id.0].mark_dirty();
    }

    pub(crate) fn unpin(&self, frame_id: FrameId, dirty: bool) {
        let frame = &self.frames[frame_id.0];
        if dirty {
            frame.mark_dirty();
        }
        let pin_count = frame.unpin();
        if pin_count == 0 {
            let _ = self.replacer.set_evictable(frame_id, true);
        }
    }
}

/// The buffer pool manager: a fixed-size cache of pages backed by disk.
pub struct BufferPoolManager {
    inner: Shared,
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create a new buffer pool with `pool_size` frames, backed by
    /// `disk_manager` and using backward distance `k` for eviction.
    pub fn new(
        pool_size: usize,
        disk_manager: DiskManager,
        k: usize,
        log_manager: Option<Arc<LogManager>>,
    ) -> Self {
        let frames = (0..pool_size).map(|i| Frame::new(FrameId::new(i))).collect();
        let free_list = (0..pool_size).map(FrameId::new).collect();

        let inner = Arc::new(SharedInner {
            frames,
            state: Mutex::new(BpmState {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruKReplacer::new(pool_size, k),
            disk_scheduler: DiskScheduler::new(disk_manager),
            stats: BufferPoolStats::new(),
            log_manager,
        });

        Self { inner, pool_size }
    }

    /// Number of frames in the pool.
    #[inline]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Point-in-time statistics snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Number of frames on the free list (never yet used).
    pub fn free_frame_count(&self) -> usize {
        self.inner.state.lock().free_list.len()
    }

    /// Number of pages currently resident in the pool.
    pub fn page_count(&self) -> usize {
        self.inner.state.lock().page_table.len()
    }

    /// Current pin count of a resident page, or `None` if it isn't in the
    /// pool right now.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.inner.state.lock();
        let frame_id = *state.page_table.get(&page_id)?;
        Some(self.inner.frames[frame_id.0].pin_count())
    }

    // ========================================================================
    // Frame acquisition
    // ========================================================================

    /// Obtain a frame to hold `page_id`, either from the free list or by
    /// evicting a victim. Returns the frame id with the page already
    /// installed in the page table and pinned once, together with whether
    /// the page was already resident - the caller needs that to decide
    /// cache hit vs. miss, and it has to come from this same lock
    /// acquisition rather than a separate check beforehand, or a racing
    /// eviction between the two could make the decision stale.
    ///
    /// If the returned frame previously held a different dirty page, that
    /// page is flushed to disk before reuse, with the BPM mutex held across
    /// the flush. This is the accepted synchronous-I/O-under-the-mutex
    /// exception: it keeps "evict, flush, remove the old mapping, install
    /// the new one" one atomic step, so no other thread can observe the
    /// old page still mapped to a frame that's mid-eviction and pin it out
    /// from under the new page. The alternative (drop the mutex around the
    /// flush) needs a per-frame "I/O in progress" flag to stay correct,
    /// which isn't implemented.
    fn obtain_frame(&self, page_id: PageId) -> Result<(FrameId, bool)> {
        let mut state = self.inner.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.inner.frames[frame_id.0];
            if frame.pin() == 1 {
                let _ = self.inner.replacer.set_evictable(frame_id, false);
            }
            return Ok((frame_id, true));
        }

        let frame_id = if let Some(frame_id) = state.free_list.pop() {
            frame_id
        } else {
            let victim = self.inner.replacer.evict().ok_or(Error::OutOfMemory)?;
            let frame = &self.inner.frames[victim.0];
            let evicted_page_id = frame.page_id();
            if let Some(old_page_id) = evicted_page_id {
                if frame.is_dirty() {
                    self.inner.flush_frame(victim, old_page_id)?;
                }
                state.page_table.remove(&old_page_id);
            }
            self.inner.stats.evictions.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(frame_id = ?victim, ?evicted_page_id, new_page_id = ?page_id, "evicted frame for reuse");
            victim
        };

        state.page_table.insert(page_id, frame_id);
        let frame = &self.inner.frames[frame_id.0];
        frame.reset();
        frame.set_page_id(Some(page_id));
        frame.pin();

        Ok((frame_id, false))
    }

    fn read_page_from_disk(&self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        let frame = &self.inner.frames[frame_id.0];
        let (promise, future) = create_promise();
        self.inner.disk_scheduler.schedule(DiskRequest {
            is_write: false,
            page_id,
            buffer: frame.page_arc(),
            promise,
        });
        future.wait()?;
        self.inner.stats.pages_read.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Shared implementation for `fetch_read`/`fetch_write`: find or load
    /// `page_id` into a frame, recording the access and returning the
    /// frame id the caller should build a guard around.
    fn fetch_frame(&self, page_id: PageId, access_type: AccessType) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id.0));
        }

        // `already_resident` comes back from the same lock acquisition that
        // claims the frame, so a racing eviction between "check residency"
        // and "claim the frame" can't make this decision stale.
        let (frame_id, already_resident) = self.obtain_frame(page_id)?;

        if already_resident {
            self.inner.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(?page_id, "cache hit");
        } else {
            self.inner.stats.cache_misses.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(?page_id, "cache miss, loading from disk");
            if let Err(e) = self.read_page_from_disk(frame_id, page_id) {
                tracing::debug!(?page_id, error = %e, "page load failed, rolling back frame claim");
                // Roll back: the frame was claimed for a page we couldn't
                // actually load.
                let frame = &self.inner.frames[frame_id.0];
                frame.unpin();
                let mut state = self.inner.state.lock();
                state.page_table.remove(&page_id);
                state.free_list.push(frame_id);
                let _ = self.inner.replacer.remove(frame_id);
                return Err(e);
            }
        }

        let _ = self.inner.replacer.record_access(frame_id, access_type);
        Ok(frame_id)
    }

    /// Fetch a page for reading. Returns `None` if the page id is invalid
    /// or every frame is pinned.
    pub fn fetch_read(&self, page_id: PageId, access_type: AccessType) -> Option<PageReadGuard> {
        let frame_id = self.fetch_frame(page_id, access_type).ok()?;
        let lock = self.inner.frames[frame_id.0].page_arc().read_arc();
        Some(PageReadGuard::new(Arc::clone(&self.inner), frame_id, page_id, lock))
    }

    /// Fetch a page for writing. Returns `None` if the page id is invalid
    /// or every frame is pinned.
    pub fn fetch_write(&self, page_id: PageId, access_type: AccessType) -> Option<PageWriteGuard> {
        let frame_id = self.fetch_frame(page_id, access_type).ok()?;
        let lock = self.inner.frames[frame_id.0].page_arc().write_arc();
        Some(PageWriteGuard::new(Arc::clone(&self.inner), frame_id, page_id, lock))
    }

    /// Convenience wrapper over [`Self::fetch_read`] for callers that treat
    /// an unavailable page as a fatal error.
    ///
    /// # Panics
    /// Panics if the page can't be fetched.
    pub fn read_page(&self, page_id: PageId) -> PageReadGuard {
        self.fetch_read(page_id, AccessType::Unknown)
            .expect("page fetch failed")
    }

    /// Convenience wrapper over [`Self::fetch_write`]; see [`Self::read_page`].
    pub fn write_page(&self, page_id: PageId) -> PageWriteGuard {
        self.fetch_write(page_id, AccessType::Unknown)
            .expect("page fetch failed")
    }

    #[cfg(test)]
    fn read_page_write(&self, page_id: PageId) -> PageWriteGuard {
        self.write_page(page_id)
    }

    // ========================================================================
    // Lifecycle operations
    // ========================================================================

    /// Allocate a brand-new page and return its id. The page is not pinned
    /// on return; fetch it normally to access it.
    ///
    /// The id comes from the disk scheduler, not a locally-tracked counter:
    /// the disk manager lives on the scheduler's worker thread, and it's the
    /// one that actually grows the file and knows what's been allocated.
    pub fn new_page(&self) -> PageId {
        let page_id = match self.inner.disk_scheduler.allocate_page() {
            Ok(page_id) => page_id,
            Err(_) => return PageId::INVALID,
        };

        let frame_id = match self.obtain_frame(page_id) {
            Ok((frame_id, _already_resident)) => frame_id,
            Err(_) => return PageId::INVALID,
        };

        let _ = self.inner.replacer.record_access(frame_id, AccessType::Unknown);
        self.inner.frames[frame_id.0].unpin();
        let _ = self.inner.replacer.set_evictable(frame_id, true);

        page_id
    }

    /// Delete a page. Fails (returns `false`) if the page is pinned;
    /// otherwise evicts it from the pool (if resident), deallocates its
    /// on-disk slot, and returns `true`. Deleting a page that was never
    /// resident still succeeds.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut state = self.inner.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.inner.frames[frame_id.0];
            if frame.is_pinned() {
                return false;
            }

            state.page_table.remove(&page_id);
            let _ = self.inner.replacer.remove(frame_id);
            frame.reset();
            state.free_list.push(frame_id);
        }
        drop(state);

        self.inner.disk_scheduler.deallocate_page(page_id);
        true
    }

    /// Flush a single page to disk if it's resident and dirty.
    ///
    /// Returns `true` if a write actually happened.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let frame_id = {
            let state = self.inner.state.lock();
            match state.page_table.get(&page_id) {
                Some(&frame_id) => frame_id,
                None => return false,
            }
        };
        self.inner.flush_frame(frame_id, page_id).unwrap_or(false)
    }

    /// Flush every dirty resident page to disk.
    pub fn flush_all(&self) {
        let entries: Vec<(PageId, FrameId)> = {
            let state = self.inner.state.lock();
            state.page_table.iter().map(|(&p, &f)| (p, f)).collect()
        };
        for (page_id, frame_id) in entries {
            let _ = self.inner.flush_frame(frame_id, page_id);
        }
    }
}
