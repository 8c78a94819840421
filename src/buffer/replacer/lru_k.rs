//! LRU-K eviction policy.
//!
//! Approximates the LRU-K algorithm of O'Neil et al. at frame granularity.
//! A frame with fewer than `k` recorded accesses has an undefined (i.e.
//! infinite) backward-k-distance and is always preferred as a victim over
//! one with `k` or more; among those "cold" frames, the oldest by insertion
//! order goes first. Once a frame has accumulated `k` accesses it moves into
//! the "hot" set, where victims are chosen by largest backward-k-distance.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::common::{AccessType, Error, FrameId, Result};

struct Node {
    /// Up to `k` most recent access timestamps, oldest first.
    history: VecDeque<u64>,
    is_evictable: bool,
}

struct Inner {
    k: usize,
    num_frames: usize,
    current_timestamp: u64,
    nodes: HashMap<FrameId, Node>,
    /// Frames with `history.len() < k`, in first-access order.
    cold_set: VecDeque<FrameId>,
    /// Frames with `history.len() == k`, in order of promotion from cold.
    hot_set: VecDeque<FrameId>,
    evictable_count: usize,
}

impl Inner {
    fn check_frame_id(&self, frame_id: FrameId) -> Result<()> {
        if frame_id.0 >= self.num_frames {
            return Err(Error::InvalidFrameId(frame_id.0));
        }
        Ok(())
    }
}

/// Tracks access history for up to `num_frames` frames and picks eviction
/// victims by the LRU-K policy.
///
/// All operations are serialized behind a single internal mutex.
pub struct LruKReplacer {
    inner: Mutex<Inner>,
}

impl LruKReplacer {
    /// Create a replacer tracking at most `num_frames` frames with backward
    /// distance `k`.
    ///
    /// # Panics
    /// Panics if `k` is 0.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k > 0, "k must be > 0");
        Self {
            inner: Mutex::new(Inner {
                k,
                num_frames,
                current_timestamp: 0,
                nodes: HashMap::new(),
                cold_set: VecDeque::new(),
                hot_set: VecDeque::new(),
                evictable_count: 0,
            }),
        }
    }

    /// Register an access to `frame_id` at the next logical timestamp.
    pub fn record_access(&self, frame_id: FrameId, _access_type: AccessType) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_frame_id(frame_id)?;

        inner.current_timestamp += 1;
        let ts = inner.current_timestamp;
        let k = inner.k;

        match inner.nodes.get_mut(&frame_id) {
            None => {
                let mut history = VecDeque::with_capacity(k);
                history.push_back(ts);
                inner.nodes.insert(
                    frame_id,
                    Node {
                        history,
                        is_evictable: false,
                    },
                );
                inner.cold_set.push_back(frame_id);
            }
            Some(node) => {
                let was_cold = node.history.len() < k;
                node.history.push_back(ts);
                if node.history.len() > k {
                    node.history.pop_front();
                }
                if was_cold && node.history.len() == k {
                    inner.cold_set.retain(|&fid| fid != frame_id);
                    inner.hot_set.push_back(frame_id);
                }
            }
        }

        Ok(())
    }

    /// Toggle whether `frame_id` may be chosen as a victim.
    ///
    /// A no-op if the frame has no recorded access yet.
    pub fn set_evictable(&self, frame_id: FrameId, evictable: bool) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_frame_id(frame_id)?;

        if let Some(node) = inner.nodes.get_mut(&frame_id) {
            if node.is_evictable != evictable {
                node.is_evictable = evictable;
                if evictable {
                    inner.evictable_count += 1;
                } else {
                    inner.evictable_count -= 1;
                }
            }
        }

        Ok(())
    }

    /// Pick and remove an evictable victim frame.
    pub fn evict(&self) -> Option<FrameId> {
        let mut inner = self.inner.lock();

        if let Some(pos) = inner
            .cold_set
            .iter()
            .position(|fid| inner.nodes[fid].is_evictable)
        {
            let frame_id = inner.cold_set.remove(pos).unwrap();
            inner.nodes.remove(&frame_id);
            inner.evictable_count -= 1;
            return Some(frame_id);
        }

        let current_timestamp = inner.current_timestamp;
        let mut best: Option<(FrameId, u64)> = None;
        for &frame_id in inner.hot_set.iter() {
            let node = &inner.nodes[&frame_id];
            if !node.is_evictable {
                continue;
            }
            let distance = current_timestamp - node.history.front().copied().unwrap_or(0);
            if best.map(|(_, best_distance)| distance > best_distance).unwrap_or(true) {
                best = Some((frame_id, distance));
            }
        }

        let (frame_id, _) = best?;
        inner.hot_set.retain(|&fid| fid != frame_id);
        inner.nodes.remove(&frame_id);
        inner.evictable_count -= 1;
        Some(frame_id)
    }

    /// Unconditionally drop a known frame's tracking state.
    ///
    /// Silent no-op if the frame isn't tracked; fails if it is tracked but
    /// not evictable.
    pub fn remove(&self, frame_id: FrameId) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.check_frame_id(frame_id)?;

        let Some(node) = inner.nodes.get(&frame_id) else {
            return Ok(());
        };
        if !node.is_evictable {
            return Err(Error::NotEvictable(frame_id.0));
        }

        inner.nodes.remove(&frame_id);
        inner.cold_set.retain(|&fid| fid != frame_id);
        inner.hot_set.retain(|&fid| fid != frame_id);
        inner.evictable_count -= 1;

        Ok(())
    }

    /// Number of frames currently evictable.
    pub fn size(&self) -> usize {
        self.inner.lock().evictable_count
    }
}
