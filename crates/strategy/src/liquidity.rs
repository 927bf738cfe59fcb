//! Order-book liquidity metrics.

use kimp_core::{time::now_us, OrderBook, OrderSide, PriceLevel, Symbol, Venue, MAX_DEPTH};

/// One step of a depth walk, with running totals.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthLevel {
    pub price: f64,
    pub quantity: f64,
    pub cumulative_qty: f64,
    pub cumulative_value: f64,
    /// VWAP of everything filled up to and including this level.
    pub vwap: f64,
    /// Distance from the touch, percent, signed so adverse is positive.
    pub distance_pct: f64,
    pub level: usize,
}

/// Liquidity snapshot for one venue book.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C, align(64))]
pub struct LiquidityMetrics {
    pub venue: Venue,
    pub symbol: Symbol,
    pub best_bid: f64,
    pub best_ask: f64,
    pub spread: f64,
    pub spread_bps: f64,
    /// Quantity resting within the depth band below the best bid.
    pub bid_depth: f64,
    /// Quantity resting within the depth band above the best ask.
    pub ask_depth: f64,
    /// Notional within the band, bid side.
    pub bid_value: f64,
    /// Notional within the band, ask side.
    pub ask_value: f64,
    /// `(bid - ask) / (bid + ask)` in [-1, +1].
    pub imbalance: f64,
    pub bid_levels: u32,
    pub ask_levels: u32,
    pub timestamp_us: i64,
}

impl LiquidityMetrics {
    #[must_use]
    pub fn mid_price(&self) -> f64 {
        (self.best_bid + self.best_ask) / 2.0
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.best_bid > 0.0 && self.best_ask > 0.0 && self.best_bid < self.best_ask
    }

    #[must_use]
    pub fn has_sufficient_liquidity(&self, min_value: f64) -> bool {
        self.bid_value >= min_value && self.ask_value >= min_value
    }
}

/// Liquidity warnings raised by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidityAlert {
    LowBidDepth,
    LowAskDepth,
    WideSpread,
    HighImbalance,
}

impl LiquidityAlert {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            LiquidityAlert::LowBidDepth => "LowBidDepth",
            LiquidityAlert::LowAskDepth => "LowAskDepth",
            LiquidityAlert::WideSpread => "WideSpread",
            LiquidityAlert::HighImbalance => "HighImbalance",
        }
    }
}

/// Computes [`LiquidityMetrics`] from a book.
#[derive(Debug, Clone)]
pub struct LiquidityCalculator {
    /// Width of the depth band around the touch, percent of the touch.
    depth_range_pct: f64,
}

impl Default for LiquidityCalculator {
    fn default() -> Self {
        Self {
            depth_range_pct: 1.0,
        }
    }
}

impl LiquidityCalculator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_depth_range_pct(mut self, pct: f64) -> Self {
        self.depth_range_pct = pct;
        self
    }

    #[must_use]
    pub fn depth_range_pct(&self) -> f64 {
        self.depth_range_pct
    }

    /// Walks both sides of the band and fills in the metrics.
    #[must_use]
    pub fn calculate(&self, book: &OrderBook) -> LiquidityMetrics {
        let mut metrics = LiquidityMetrics {
            venue: book.venue,
            symbol: book.symbol,
            best_bid: book.best_bid(),
            best_ask: book.best_ask(),
            ..LiquidityMetrics::default()
        };

        if metrics.best_bid <= 0.0 || metrics.best_ask <= 0.0 {
            return metrics;
        }

        metrics.spread = metrics.best_ask - metrics.best_bid;
        let mid = metrics.mid_price();
        if mid > 0.0 {
            metrics.spread_bps = metrics.spread / mid * 10_000.0;
        }

        let bid_floor = metrics.best_bid * (1.0 - self.depth_range_pct / 100.0);
        for level in book.bid_levels() {
            if level.price < bid_floor {
                break;
            }
            metrics.bid_depth += level.quantity;
            metrics.bid_value += level.notional();
            metrics.bid_levels += 1;
        }

        let ask_ceiling = metrics.best_ask * (1.0 + self.depth_range_pct / 100.0);
        for level in book.ask_levels() {
            if level.price > ask_ceiling {
                break;
            }
            metrics.ask_depth += level.quantity;
            metrics.ask_value += level.notional();
            metrics.ask_levels += 1;
        }

        metrics.imbalance = imbalance(metrics.bid_depth, metrics.ask_depth);
        metrics.timestamp_us = now_us();
        metrics
    }

    /// Records the per-level fill path for `quantity` against the side the
    /// order would cross. Returns the number of levels written into `out`.
    #[must_use]
    pub fn analyze_depth(
        &self,
        book: &OrderBook,
        side: OrderSide,
        quantity: f64,
        out: &mut [DepthLevel; MAX_DEPTH],
    ) -> usize {
        let (levels, best): (&[PriceLevel], f64) = match side {
            OrderSide::Buy => (book.ask_levels(), book.best_ask()),
            OrderSide::Sell => (book.bid_levels(), book.best_bid()),
        };
        if best <= 0.0 {
            return 0;
        }

        let mut cumulative_qty = 0.0;
        let mut cumulative_value = 0.0;
        let mut count = 0usize;
        for level in levels {
            if level.price <= 0.0 || level.quantity <= 0.0 {
                continue;
            }
            let fill_qty = level.quantity.min(quantity - cumulative_qty);
            cumulative_qty += fill_qty;
            cumulative_value += level.price * fill_qty;

            out[count] = DepthLevel {
                price: level.price,
                quantity: fill_qty,
                cumulative_qty,
                cumulative_value,
                vwap: cumulative_value / cumulative_qty,
                distance_pct: match side {
                    OrderSide::Buy => (level.price - best) / best * 100.0,
                    OrderSide::Sell => (best - level.price) / best * 100.0,
                },
                level: count,
            };
            count += 1;
            if cumulative_qty >= quantity {
                break;
            }
        }
        count
    }
}

/// `(bid - ask) / (bid + ask)`; 0 when both sides are empty.
#[must_use]
pub fn imbalance(bid_depth: f64, ask_depth: f64) -> f64 {
    let total = bid_depth + ask_depth;
    if total <= 0.0 {
        0.0
    } else {
        (bid_depth - ask_depth) / total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        let mut book = OrderBook::new(Venue::UpbitKrw, "XRP");
        book.push_bid(3100.0, 10.0);
        book.push_bid(3095.0, 20.0);
        book.push_bid(3000.0, 500.0); // outside the 1% band
        book.push_ask(3102.0, 12.0);
        book.push_ask(3110.0, 25.0);
        book.push_ask(3200.0, 500.0); // outside the 1% band
        book
    }

    #[test]
    fn test_depth_band_excludes_far_levels() {
        let metrics = LiquidityCalculator::new().calculate(&book());
        assert_eq!(metrics.bid_levels, 2);
        assert_eq!(metrics.ask_levels, 2);
        assert!((metrics.bid_depth - 30.0).abs() < 1e-9);
        assert!((metrics.ask_depth - 37.0).abs() < 1e-9);
        assert!((metrics.bid_value - (3100.0 * 10.0 + 3095.0 * 20.0)).abs() < 1e-6);
    }

    #[test]
    fn test_spread_bps() {
        let metrics = LiquidityCalculator::new().calculate(&book());
        let mid = (3100.0 + 3102.0) / 2.0;
        assert!((metrics.spread - 2.0).abs() < 1e-9);
        assert!((metrics.spread_bps - 2.0 / mid * 10_000.0).abs() < 1e-9);
    }

    #[test]
    fn test_imbalance_range() {
        assert_eq!(imbalance(0.0, 0.0), 0.0);
        assert_eq!(imbalance(10.0, 0.0), 1.0);
        assert_eq!(imbalance(0.0, 10.0), -1.0);
        assert!((imbalance(30.0, 10.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_empty_book_is_invalid() {
        let metrics = LiquidityCalculator::new().calculate(&OrderBook::default());
        assert!(!metrics.is_valid());
        assert_eq!(metrics.bid_levels, 0);
    }

    #[test]
    fn test_analyze_depth_records_path() {
        let mut path = [DepthLevel::default(); MAX_DEPTH];
        let n = LiquidityCalculator::new().analyze_depth(&book(), OrderSide::Buy, 20.0, &mut path);
        assert_eq!(n, 2);
        assert_eq!(path[0].price, 3102.0);
        assert_eq!(path[0].quantity, 12.0);
        assert_eq!(path[1].quantity, 8.0);
        assert!((path[1].cumulative_qty - 20.0).abs() < 1e-9);
        assert!(path[1].distance_pct > 0.0);
    }

    #[test]
    fn test_wider_band_includes_more() {
        let metrics = LiquidityCalculator::new()
            .with_depth_range_pct(5.0)
            .calculate(&book());
        assert_eq!(metrics.bid_levels, 3);
        assert_eq!(metrics.ask_levels, 3);
    }
}
