//! # Quorum Signal Cache
//!
//! Memoizes analyst results so that re-running a pipeline over the same data
//! window never recomputes a signal.
//!
//! ## Architectural Principles
//! - **Content addressed:** a key is (node, instrument, fingerprint of the consumed
//!   data window and run parameters). Identical inputs give identical keys.
//! - **Single flight:** concurrent callers for one key share one computation.
//! - **Bounded:** least-recently-used completed entries are evicted past capacity;
//!   entries still being computed are never evicted.
//!
//! This is the only shared mutable component of a run. Its lock guards bookkeeping
//! only and is never held across an await.

pub mod cache;
pub mod error;
pub mod key;

pub use cache::{CacheStats, SignalCache};
pub use error::CacheError;
pub use key::{CacheKey, Fingerprint, FingerprintBuilder};
