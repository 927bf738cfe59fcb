//! Zero-allocation plumbing for the market-data hot path.
//!
//! Sessions decode frames into pool-backed records and hand them to the
//! strategy consumer over lock-free ring queues; nothing here takes a lock
//! or allocates on the steady-state path.
//!
//! - [`SpscQueue`]: single-producer/single-consumer ring.
//! - [`MpscQueue`]: multi-producer/single-consumer ring (slot-turn design).
//! - [`ObjectPool`] / [`Pooled`]: fixed-count recycling with heap fallback.
//! - [`TokenBucket`] / [`RateLimitManager`]: API budgets per venue.
//! - [`AdaptiveWait`]: spin, then yield, then sleep.

pub mod mpsc;
pub mod pool;
pub mod rate_limit;
pub mod spsc;
pub mod wait;

pub use mpsc::MpscQueue;
pub use pool::{ObjectPool, Pooled};
pub use rate_limit::{ApiKind, RateLimitManager, TokenBucket, VenueRateLimits};
pub use spsc::SpscQueue;
pub use wait::AdaptiveWait;
