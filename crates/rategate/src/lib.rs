//! rategate: request-coalescing read-through cache engine
//!
//! # Features
//!
//! - **Leader/follower coalescing**: at most one upstream call per key per
//!   validity window, across processes
//! - **Fenced distributed lock** with a self-renewing lease
//! - **Blocking wait/notify channel** from the leader to its followers
//! - **Circuit breaker** with time-based recovery in front of the upstream
//! - **Stale fallback** when the upstream is failing or the breaker is open

mod breaker;
mod cache;
mod lock;
mod waiter;

// Re-export core
pub use rategate_core::*;

// Re-export stores
#[cfg(feature = "memory")]
pub use rategate_store::MemoryStore;

#[cfg(feature = "redis")]
pub use rategate_store::{RedisConfig, RedisStore};

pub use breaker::{BreakerState, CircuitBreaker};
pub use cache::{CacheConfig, CoalescingCache, stale_key};
pub use lock::{DistributedLock, LockConfig};
pub use waiter::{Waiter, waiters_key};
