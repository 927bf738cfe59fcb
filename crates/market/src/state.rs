//! Latest ticker and order book per venue.

use parking_lot::RwLock;

use kimp_core::{OrderBook, Ticker, Venue};

#[derive(Default, Clone, Copy)]
struct VenueSlot {
    ticker: Option<Ticker>,
    book: Option<OrderBook>,
}

/// Venue-indexed latest market data.
///
/// Writes are rare relative to reads and each record is at most ~1 KiB,
/// so whole-record copies under a per-venue `RwLock` keep readers
/// consistent without RCU machinery.
pub struct MarketState {
    slots: [RwLock<VenueSlot>; 4],
}

impl MarketState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| RwLock::new(VenueSlot::default())),
        }
    }

    pub fn update_ticker(&self, ticker: &Ticker) {
        self.slots[ticker.venue.index()].write().ticker = Some(*ticker);
    }

    pub fn update_book(&self, book: &OrderBook) {
        self.slots[book.venue.index()].write().book = Some(*book);
    }

    /// Latest ticker for `venue`, copied out.
    #[must_use]
    pub fn ticker(&self, venue: Venue) -> Option<Ticker> {
        self.slots[venue.index()].read().ticker
    }

    /// Latest order book for `venue`, copied out.
    #[must_use]
    pub fn book(&self, venue: Venue) -> Option<OrderBook> {
        self.slots[venue.index()].read().book
    }

    /// Last trade price for `venue`.
    #[must_use]
    pub fn last_price(&self, venue: Venue) -> Option<f64> {
        self.ticker(venue).map(|t| t.price)
    }

    /// Venues that have delivered at least one ticker.
    #[must_use]
    pub fn live_venues(&self) -> Vec<Venue> {
        Venue::ALL
            .into_iter()
            .filter(|v| self.slots[v.index()].read().ticker.is_some())
            .collect()
    }
}

impl Default for MarketState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kimp_core::Symbol;

    fn ticker(venue: Venue, price: f64) -> Ticker {
        Ticker {
            venue,
            symbol: Symbol::new("XRP"),
            price,
            bid: price - 1.0,
            ask: price + 1.0,
            volume_24h: 0.0,
            timestamp_us: 0,
        }
    }

    #[test]
    fn test_ticker_round_trip() {
        let state = MarketState::new();
        assert!(state.ticker(Venue::UpbitKrw).is_none());
        state.update_ticker(&ticker(Venue::UpbitKrw, 3100.0));
        let got = state.ticker(Venue::UpbitKrw).unwrap();
        assert_eq!(got.price, 3100.0);
        assert_eq!(state.last_price(Venue::UpbitKrw), Some(3100.0));
        assert!(state.ticker(Venue::BithumbKrw).is_none());
    }

    #[test]
    fn test_book_copy_is_whole_record() {
        let state = MarketState::new();
        let mut book = OrderBook::new(Venue::BinanceUsdt, "XRPUSDT");
        book.push_bid(2.149, 100.0);
        book.push_ask(2.151, 150.0);
        state.update_book(&book);

        let copy = state.book(Venue::BinanceUsdt).unwrap();
        assert_eq!(copy.best_bid(), 2.149);
        assert_eq!(copy.best_ask(), 2.151);

        // Overwriting the slot does not affect the copy already taken.
        let mut book2 = OrderBook::new(Venue::BinanceUsdt, "XRPUSDT");
        book2.push_bid(9.0, 1.0);
        book2.push_ask(9.1, 1.0);
        state.update_book(&book2);
        assert_eq!(copy.best_bid(), 2.149);
    }

    #[test]
    fn test_live_venues() {
        let state = MarketState::new();
        assert!(state.live_venues().is_empty());
        state.update_ticker(&ticker(Venue::MexcUsdt, 2.14));
        assert_eq!(state.live_venues(), vec![Venue::MexcUsdt]);
    }
}
