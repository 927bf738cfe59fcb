//! Venue wire codecs.
//!
//! One decoder per venue turns a raw WebSocket frame into normalized
//! records. Three venues speak UTF-8 JSON; MEXC pushes market data as
//! length-delimited binary with tag/wire-type framing (see [`mexc::pb`]).
//!
//! Decoders are pure: they never touch the network, never panic on bad
//! input, and report malformed frames as [`kimp_core::Error::Parse`].

pub mod binance;
pub mod bithumb;
pub mod mexc;
pub mod symbol;
pub mod upbit;

use kimp_core::{OrderBook, Ticker, Trade};

/// A decoded, venue-normalized message.
#[derive(Debug, Clone)]
pub enum VenueMessage {
    Ticker(Ticker),
    Book(OrderBook),
    Trade(Trade),
    /// Subscription acknowledged by the venue (MEXC sends one per stream).
    SubscribeAck { id: i64 },
    /// Application-level pong.
    Pong,
    /// Valid frame with nothing the engine consumes (status, snapshots...).
    Ignore,
}

impl VenueMessage {
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            VenueMessage::Ticker(_) | VenueMessage::Book(_) | VenueMessage::Trade(_)
        )
    }
}
