//! Session output events.

use kimp_core::{OrderBook, Ticker, Trade};
use kimp_primitives::Pooled;

/// Uniform output of every venue session.
///
/// Ticker and book records are borrowed from the session's object pools;
/// dropping the event returns them. The consumer therefore never frees or
/// allocates anything on the data path.
pub enum SessionEvent {
    Connected,
    Disconnected,
    Error(String),
    Ticker(Pooled<Ticker>),
    Book(Pooled<OrderBook>),
    Trade(Trade),
}

impl SessionEvent {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Connected => "connected",
            SessionEvent::Disconnected => "disconnected",
            SessionEvent::Error(_) => "error",
            SessionEvent::Ticker(_) => "ticker",
            SessionEvent::Book(_) => "book",
            SessionEvent::Trade(_) => "trade",
        }
    }

    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            SessionEvent::Ticker(_) | SessionEvent::Book(_) | SessionEvent::Trade(_)
        )
    }
}

impl std::fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionEvent::Error(msg) => write!(f, "Error({msg})"),
            SessionEvent::Ticker(t) => write!(f, "Ticker({} {})", t.symbol, t.price),
            SessionEvent::Book(b) => {
                write!(f, "Book({} {}x{})", b.symbol, b.bid_count, b.ask_count)
            }
            SessionEvent::Trade(t) => write!(f, "Trade({} {})", t.symbol, t.price),
            other => f.write_str(other.kind()),
        }
    }
}
