//! Fixed-size market-data and order records.
//!
//! These records cross lock-free queues and live in object pools, so they
//! are `Copy`, `#[repr(C)]`, cache-line aligned where they sit on the hot
//! path, and carry inline NUL-terminated string buffers instead of heap
//! strings.

use serde::{Deserialize, Serialize};

use crate::venue::Venue;

/// Maximum order-book depth kept per side.
pub const MAX_DEPTH: usize = 20;

// =============================================================================
// Inline strings
// =============================================================================

/// A NUL-terminated string inlined into a fixed `N`-byte buffer.
///
/// Content longer than `N - 1` bytes is truncated at a character boundary.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct InlineStr<const N: usize> {
    buf: [u8; N],
}

/// Inline symbol buffer (`"XRP"`, `"XRPUSDT"`, ...), 16 bytes.
pub type Symbol = InlineStr<16>;

impl<const N: usize> InlineStr<N> {
    /// Empty string.
    #[must_use]
    pub const fn empty() -> Self {
        Self { buf: [0u8; N] }
    }

    /// Builds from `s`, truncating to `N - 1` bytes at a UTF-8 boundary.
    #[must_use]
    pub fn new(s: &str) -> Self {
        let mut out = Self::empty();
        out.set(s);
        out
    }

    /// Replaces the contents with `s`, truncating as in [`InlineStr::new`].
    pub fn set(&mut self, s: &str) {
        let mut end = s.len().min(N - 1);
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        self.buf = [0u8; N];
        self.buf[..end].copy_from_slice(&s.as_bytes()[..end]);
    }

    /// Bytes before the first NUL.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.iter().position(|&b| b == 0).unwrap_or(N)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf[0] == 0
    }

    /// String view of the contents.
    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.buf[..self.len()]).unwrap_or("")
    }
}

impl<const N: usize> Default for InlineStr<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> From<&str> for InlineStr<N> {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> PartialEq<str> for InlineStr<N> {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl<const N: usize> PartialEq<&str> for InlineStr<N> {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl<const N: usize> std::fmt::Debug for InlineStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl<const N: usize> std::fmt::Display for InlineStr<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> Serialize for InlineStr<N> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, const N: usize> Deserialize<'de> for InlineStr<N> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::new(&s))
    }
}

// =============================================================================
// Market data
// =============================================================================

/// Latest price snapshot for one venue/symbol.
///
/// Exactly one cache line so a pool slot never straddles two lines.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[repr(C, align(64))]
pub struct Ticker {
    pub venue: Venue,
    pub symbol: Symbol,
    /// Last trade price, venue currency.
    pub price: f64,
    /// Best bid.
    pub bid: f64,
    /// Best ask.
    pub ask: f64,
    /// Rolling 24-hour volume.
    pub volume_24h: f64,
    /// Event time, microseconds since the Unix epoch.
    pub timestamp_us: i64,
}

const _: () = assert!(std::mem::size_of::<Ticker>() == 64);

impl Ticker {
    #[must_use]
    pub fn mid_price(&self) -> f64 {
        (self.bid + self.ask) / 2.0
    }

    #[must_use]
    pub fn spread(&self) -> f64 {
        self.ask - self.bid
    }
}

/// One price level of an order book: 16 bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[repr(C)]
pub struct PriceLevel {
    pub price: f64,
    pub quantity: f64,
}

const _: () = assert!(std::mem::size_of::<PriceLevel>() == 16);

impl PriceLevel {
    #[must_use]
    pub const fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }

    #[must_use]
    pub fn notional(&self) -> f64 {
        self.price * self.quantity
    }
}

/// Fixed-depth order book: up to [`MAX_DEPTH`] levels per side, bids sorted
/// descending and asks ascending.
#[derive(Debug, Clone, Copy, Serialize)]
#[repr(C, align(64))]
pub struct OrderBook {
    pub venue: Venue,
    pub symbol: Symbol,
    pub bids: [PriceLevel; MAX_DEPTH],
    pub asks: [PriceLevel; MAX_DEPTH],
    pub bid_count: u16,
    pub ask_count: u16,
    /// Event time, microseconds since the Unix epoch.
    pub timestamp_us: i64,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self {
            venue: Venue::default(),
            symbol: Symbol::empty(),
            bids: [PriceLevel::default(); MAX_DEPTH],
            asks: [PriceLevel::default(); MAX_DEPTH],
            bid_count: 0,
            ask_count: 0,
            timestamp_us: 0,
        }
    }
}

impl OrderBook {
    #[must_use]
    pub fn new(venue: Venue, symbol: &str) -> Self {
        Self {
            venue,
            symbol: Symbol::new(symbol),
            ..Self::default()
        }
    }

    /// Appends a bid level; levels must arrive best-first (descending).
    /// Levels beyond capacity are dropped.
    pub fn push_bid(&mut self, price: f64, quantity: f64) {
        if (self.bid_count as usize) < MAX_DEPTH {
            self.bids[self.bid_count as usize] = PriceLevel::new(price, quantity);
            self.bid_count += 1;
        }
    }

    /// Appends an ask level; levels must arrive best-first (ascending).
    pub fn push_ask(&mut self, price: f64, quantity: f64) {
        if (self.ask_count as usize) < MAX_DEPTH {
            self.asks[self.ask_count as usize] = PriceLevel::new(price, quantity);
            self.ask_count += 1;
        }
    }

    pub fn clear(&mut self) {
        self.bid_count = 0;
        self.ask_count = 0;
    }

    #[must_use]
    pub fn bid_levels(&self) -> &[PriceLevel] {
        &self.bids[..self.bid_count as usize]
    }

    #[must_use]
    pub fn ask_levels(&self) -> &[PriceLevel] {
        &self.asks[..self.ask_count as usize]
    }

    /// Best bid, or 0 when the side is empty.
    #[must_use]
    pub fn best_bid(&self) -> f64 {
        if self.bid_count > 0 {
            self.bids[0].price
        } else {
            0.0
        }
    }

    /// Best ask, or 0 when the side is empty.
    #[must_use]
    pub fn best_ask(&self) -> f64 {
        if self.ask_count > 0 {
            self.asks[0].price
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn mid_price(&self) -> f64 {
        (self.best_bid() + self.best_ask()) / 2.0
    }

    #[must_use]
    pub fn spread(&self) -> f64 {
        self.best_ask() - self.best_bid()
    }

    /// Book invariant: `best_bid < best_ask` when both sides are populated,
    /// bids strictly descending, asks strictly ascending.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.bid_count > 0 && self.ask_count > 0 && self.best_bid() >= self.best_ask() {
            return false;
        }
        let bids = self.bid_levels();
        if bids.windows(2).any(|w| w[0].price <= w[1].price) {
            return false;
        }
        let asks = self.ask_levels();
        if asks.windows(2).any(|w| w[0].price >= w[1].price) {
            return false;
        }
        true
    }
}

/// One trade print.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[repr(C)]
pub struct Trade {
    pub venue: Venue,
    pub symbol: Symbol,
    pub price: f64,
    pub quantity: f64,
    pub timestamp_us: i64,
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    #[default]
    Buy,
    Sell,
}

impl OrderSide {
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    #[default]
    Limit,
    Market,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum OrderStatus {
    #[default]
    Pending,
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Failed,
}

impl OrderStatus {
    /// No further fills can arrive in this state.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Failed
        )
    }
}

/// An order to be placed on one venue.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, align(64))]
pub struct OrderRequest {
    pub venue: Venue,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub symbol: Symbol,
    pub quantity: f64,
    /// Limit price; `0.0` for market orders.
    pub price: f64,
    /// Optional client-supplied id.
    pub client_id: InlineStr<40>,
}

impl OrderRequest {
    #[must_use]
    pub fn limit(venue: Venue, side: OrderSide, symbol: &str, quantity: f64, price: f64) -> Self {
        Self {
            venue,
            side,
            order_type: OrderType::Limit,
            symbol: Symbol::new(symbol),
            quantity,
            price,
            client_id: InlineStr::empty(),
        }
    }

    #[must_use]
    pub fn market(venue: Venue, side: OrderSide, symbol: &str, quantity: f64) -> Self {
        Self {
            venue,
            side,
            order_type: OrderType::Market,
            symbol: Symbol::new(symbol),
            quantity,
            price: 0.0,
            client_id: InlineStr::empty(),
        }
    }

    #[must_use]
    pub fn is_market(&self) -> bool {
        self.order_type == OrderType::Market
    }
}

/// The venue's view of an order after submission.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, align(64))]
pub struct OrderResult {
    /// Venue-issued order id.
    pub order_id: InlineStr<40>,
    pub status: OrderStatus,
    pub filled_qty: f64,
    pub avg_price: f64,
    pub commission: f64,
    /// Event time, microseconds since the Unix epoch.
    pub timestamp_us: i64,
    /// Optional human-readable message (rejection reason etc).
    pub message: InlineStr<64>,
}

impl OrderResult {
    #[must_use]
    pub fn filled(order_id: &str, qty: f64, avg_price: f64) -> Self {
        Self {
            order_id: InlineStr::new(order_id),
            status: OrderStatus::Filled,
            filled_qty: qty,
            avg_price,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn pending(order_id: &str) -> Self {
        Self {
            order_id: InlineStr::new(order_id),
            status: OrderStatus::Pending,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failed(message: &str) -> Self {
        Self {
            status: OrderStatus::Failed,
            message: InlineStr::new(message),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self.status, OrderStatus::Failed | OrderStatus::Canceled)
    }

    #[must_use]
    pub fn fill_notional(&self) -> f64 {
        self.filled_qty * self.avg_price
    }
}

// =============================================================================
// Account
// =============================================================================

/// Balance of one currency on one venue.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct Balance {
    pub currency: InlineStr<16>,
    pub available: f64,
    pub locked: f64,
}

impl Balance {
    #[must_use]
    pub fn new(currency: &str, available: f64, locked: f64) -> Self {
        Self {
            currency: InlineStr::new(currency),
            available,
            locked,
        }
    }

    #[must_use]
    pub fn total(&self) -> f64 {
        self.available + self.locked
    }
}

// =============================================================================
// FX
// =============================================================================

/// Where an FX observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FxSourceTag {
    #[default]
    Investing,
    Bok,
    Fallback,
    /// Served from the local cache after the live source failed.
    Cached,
}

impl FxSourceTag {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FxSourceTag::Investing => "investing",
            FxSourceTag::Bok => "bok",
            FxSourceTag::Fallback => "fallback",
            FxSourceTag::Cached => "cached",
        }
    }
}

/// KRW-per-USD rate with provenance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FxRate {
    pub rate: f64,
    pub source: FxSourceTag,
    /// Capture time, microseconds since the Unix epoch.
    pub timestamp_us: i64,
}

impl FxRate {
    #[must_use]
    pub fn new(rate: f64, source: FxSourceTag, timestamp_us: i64) -> Self {
        Self {
            rate,
            source,
            timestamp_us,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.rate > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_str_basics() {
        let s: Symbol = Symbol::new("XRP");
        assert_eq!(s.as_str(), "XRP");
        assert_eq!(s.len(), 3);
        assert!(!s.is_empty());
        assert_eq!(s, "XRP");
        assert!(Symbol::empty().is_empty());
    }

    #[test]
    fn test_inline_str_truncates() {
        let s: InlineStr<8> = InlineStr::new("ABCDEFGHIJ");
        assert_eq!(s.as_str(), "ABCDEFG");
        assert_eq!(s.len(), 7);
    }

    #[test]
    fn test_ticker_is_one_cache_line() {
        assert_eq!(std::mem::size_of::<Ticker>(), 64);
        assert_eq!(std::mem::align_of::<Ticker>(), 64);
    }

    #[test]
    fn test_orderbook_push_and_caps() {
        let mut ob = OrderBook::new(Venue::UpbitKrw, "XRP");
        for i in 0..30 {
            ob.push_bid(3100.0 - i as f64, 1.0);
            ob.push_ask(3101.0 + i as f64, 1.0);
        }
        assert_eq!(ob.bid_count as usize, MAX_DEPTH);
        assert_eq!(ob.ask_count as usize, MAX_DEPTH);
        assert_eq!(ob.best_bid(), 3100.0);
        assert_eq!(ob.best_ask(), 3101.0);
        assert!(ob.is_valid());
    }

    #[test]
    fn test_orderbook_invariant_detects_crossed_book() {
        let mut ob = OrderBook::new(Venue::UpbitKrw, "XRP");
        ob.push_bid(3102.0, 1.0);
        ob.push_ask(3101.0, 1.0);
        assert!(!ob.is_valid());
    }

    #[test]
    fn test_orderbook_invariant_detects_unsorted_levels() {
        let mut ob = OrderBook::new(Venue::UpbitKrw, "XRP");
        ob.push_bid(3100.0, 1.0);
        ob.push_bid(3100.5, 1.0);
        assert!(!ob.is_valid());
    }

    #[test]
    fn test_order_request_constructors() {
        let req = OrderRequest::market(Venue::BinanceUsdt, OrderSide::Sell, "XRPUSDT", 100.0);
        assert!(req.is_market());
        assert_eq!(req.price, 0.0);
        let req = OrderRequest::limit(Venue::UpbitKrw, OrderSide::Buy, "XRP", 10.0, 3100.0);
        assert!(!req.is_market());
    }

    #[test]
    fn test_order_result_helpers() {
        let r = OrderResult::filled("abc", 100.0, 2.15);
        assert!(r.is_filled());
        assert!((r.fill_notional() - 215.0).abs() < 1e-9);
        assert!(OrderResult::failed("nope").is_failed());
    }

    #[test]
    fn test_order_status_terminal() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Open.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }

    #[test]
    fn test_fx_rate_validity() {
        assert!(FxRate::new(1400.0, FxSourceTag::Investing, 0).is_valid());
        assert!(!FxRate::new(0.0, FxSourceTag::Fallback, 0).is_valid());
    }
}
