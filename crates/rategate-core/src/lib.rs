//! rategate-core: Core traits and types for the rategate workspace
//!
//! This crate provides the error taxonomy, the key-value store capability
//! trait, and the request tuple / cache key derivation shared by the engine
//! and the service crates.

mod error;
mod key;
mod store;

pub use error::{LockErrorKind, RateError, Result, TimeoutKind};
pub use key::{FRESH_KEY_PREFIX, RateQuery, cache_key};
pub use store::KvStore;
