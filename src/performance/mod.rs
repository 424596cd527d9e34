//! Performance layer
//!
//! - Fragment-level memoization of checking results
//! - Parallel checking of independent documents

pub mod cache;
pub mod parallel;

pub use cache::{CacheEntry, CacheKey, CacheStats, CheckCache, ContentHash};
pub use parallel::{check_documents, CheckReport, ParallelChecker};
