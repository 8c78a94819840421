//! Write-ahead logging placeholder.
//!
//! The buffer pool manager accepts an optional [`LogManager`] handle and
//! threads it through its constructor, matching the original design's
//! `LogManager *log_manager` parameter, but never calls into it. Recovery
//! and WAL are out of scope here; this type exists so the constructor
//! signature has somewhere real to point.

/// Stands in for a write-ahead-log manager.
///
/// Held by the buffer pool manager as `Option<Arc<LogManager>>` but never
/// exercised by any buffer pool operation.
#[derive(Debug, Default)]
pub struct LogManager {
    _private: (),
}

impl LogManager {
    pub fn new() -> Self {
        Self { _private: () }
    }
}
