//! Error types for the buffer pool.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors raised by the buffer pool and its collaborators.
///
/// `OutOfMemory` and `IoFailure` are recoverable: callers are expected to
/// check for them and react (the BPM surfaces them as `None`/`Err` rather
/// than panicking). `InvalidFrameId`, `NotEvictable`, and `InvalidGuard`
/// indicate a caller violated an invariant the type system couldn't enforce
/// (an out-of-range frame id, a malformed replacer call, a use-after-move
/// guard); library code still returns them as `Result` so tests can assert
/// on them, but every BPM-internal call site that should never observe one
/// unwraps with `.expect(...)`, which is this crate's rendition of "fatal
/// errors abort the process."
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested page does not exist on disk.
    #[error("page {0} not found")]
    PageNotFound(u32),

    /// Every frame is pinned; no victim is available for eviction.
    #[error("no free frames available in buffer pool")]
    OutOfMemory,

    /// The provided page ID is invalid (e.g. the sentinel value).
    #[error("invalid page id: {0}")]
    InvalidPageId(u32),

    /// A replacer call referenced a frame id outside `[0, num_frames)`.
    #[error("frame id {0} is out of range")]
    InvalidFrameId(usize),

    /// `Replacer::remove` was called on a frame that is not evictable.
    #[error("frame {0} is not evictable and cannot be removed from the replacer")]
    NotEvictable(usize),

    /// An operation was attempted on a moved-from or already-dropped guard.
    #[error("operation attempted on an invalid page guard")]
    InvalidGuard,

    /// The disk scheduler's completion handle resolved to failure.
    #[error("disk I/O request failed for page {0}")]
    IoFailure(u32),

    /// Attempted to unpin a page that wasn't pinned.
    #[error("page {0} is not pinned")]
    PageNotPinned(u32),
}
