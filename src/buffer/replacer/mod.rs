//! Eviction policy implementations (replacers).
//!
//! [`LruKReplacer`] is the buffer pool's eviction policy.

mod lru_k;

pub use lru_k::LruKReplacer;