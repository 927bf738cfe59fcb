//! Market state, the global FX cell, and the premium matrix.
//!
//! The strategy consumer thread is the only writer; the premium engine,
//! planner, and any observability path read concurrently. Records are
//! copied whole under a reader/writer lock so a reader never sees half an
//! order book.

pub mod fx;
pub mod premium;
pub mod state;

pub use fx::{CachedFxSource, FxCell, FxSource};
pub use premium::{PremiumEngine, PremiumInfo};
pub use state::MarketState;
