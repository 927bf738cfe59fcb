//! Per-venue streaming sessions.
//!
//! One [`VenueSession`] per venue owns the WebSocket connection, speaks the
//! venue's subscribe protocol and heartbeat cadence, decodes every inbound
//! frame through `kimp-codec`, and hands normalized records (pool-backed,
//! no per-message allocation) to the strategy consumer over an SPSC queue.
//!
//! Connection loss reconnects with `min(60s, 2^n)` exponential backoff;
//! the attempt counter resets once the session is streaming again.

pub mod backoff;
pub mod event;
pub mod session;
pub mod subscribe;

pub use backoff::ReconnectBackoff;
pub use event::SessionEvent;
pub use session::{SessionConfig, SessionState, SessionStats, StreamFlags, VenueSession};
