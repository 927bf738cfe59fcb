//! Taker slippage and maker placement models.

use kimp_core::{OrderBook, OrderSide, PriceLevel, Venue, MAX_DEPTH};

use crate::liquidity::DepthLevel;

/// Result of walking the book for a taker order.
#[derive(Debug, Clone, Copy)]
#[repr(C, align(64))]
pub struct SlippageEstimate {
    pub venue: Venue,
    pub side: OrderSide,
    /// Requested quantity.
    pub quantity: f64,
    pub best_price: f64,
    /// VWAP over the levels consumed.
    pub expected_avg_price: f64,
    /// Last level touched.
    pub worst_price: f64,
    /// Adverse motion relative to the touch, basis points, >= 0.
    pub slippage_bps: f64,
    /// Slippage in notional terms.
    pub slippage_value: f64,
    pub levels_consumed: usize,
    pub fillable_qty: f64,
    /// `min(1, fillable / requested)`.
    pub fill_ratio: f64,
    pub fully_fillable: bool,
    pub execution_path: [DepthLevel; MAX_DEPTH],
    pub execution_path_len: usize,
}

impl SlippageEstimate {
    fn empty(venue: Venue, side: OrderSide, quantity: f64) -> Self {
        Self {
            venue,
            side,
            quantity,
            best_price: 0.0,
            expected_avg_price: 0.0,
            worst_price: 0.0,
            slippage_bps: 0.0,
            slippage_value: 0.0,
            levels_consumed: 0,
            fillable_qty: 0.0,
            fill_ratio: 0.0,
            fully_fillable: false,
            execution_path: [DepthLevel::default(); MAX_DEPTH],
            execution_path_len: 0,
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.quantity > 0.0 && self.best_price > 0.0
    }

    #[must_use]
    pub fn slippage_pct(&self) -> f64 {
        self.slippage_bps / 100.0
    }

    #[must_use]
    pub fn path(&self) -> &[DepthLevel] {
        &self.execution_path[..self.execution_path_len]
    }
}

/// Suggested resting price for a maker order.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakerPriceEstimate {
    pub venue: Venue,
    pub side: OrderSide,
    pub best_price: f64,
    pub recommended_price: f64,
    pub distance_from_best_bps: f64,
    pub estimated_fill_prob: f64,
    pub estimated_wait_sec: f64,
}

impl MakerPriceEstimate {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.best_price > 0.0 && self.recommended_price > 0.0
    }
}

/// Book-walk slippage model.
#[derive(Debug, Clone)]
pub struct SlippageModel {
    /// Seconds a resting order waits per level of queue ahead of it.
    fill_time_per_level: f64,
}

impl Default for SlippageModel {
    fn default() -> Self {
        Self {
            fill_time_per_level: 1.0,
        }
    }
}

impl SlippageModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fill_time_per_level(mut self, sec: f64) -> Self {
        self.fill_time_per_level = sec;
        self
    }

    /// Walks the crossed side of the book greedily from the touch and
    /// prices a market order of `quantity`.
    #[must_use]
    pub fn estimate_taker_slippage(
        &self,
        book: &OrderBook,
        side: OrderSide,
        quantity: f64,
    ) -> SlippageEstimate {
        let mut est = SlippageEstimate::empty(book.venue, side, quantity);
        if quantity <= 0.0 {
            return est;
        }

        let levels: &[PriceLevel] = match side {
            OrderSide::Buy => {
                est.best_price = book.best_ask();
                book.ask_levels()
            }
            OrderSide::Sell => {
                est.best_price = book.best_bid();
                book.bid_levels()
            }
        };
        if est.best_price <= 0.0 || levels.is_empty() {
            return est;
        }

        let mut cumulative_qty = 0.0;
        let mut cumulative_value = 0.0;
        for level in levels {
            if level.price <= 0.0 || level.quantity <= 0.0 {
                continue;
            }
            let fill_qty = level.quantity.min(quantity - cumulative_qty);
            cumulative_qty += fill_qty;
            cumulative_value += level.price * fill_qty;

            est.execution_path[est.execution_path_len] = DepthLevel {
                price: level.price,
                quantity: fill_qty,
                cumulative_qty,
                cumulative_value,
                vwap: cumulative_value / cumulative_qty,
                distance_pct: match side {
                    OrderSide::Buy => (level.price - est.best_price) / est.best_price * 100.0,
                    OrderSide::Sell => (est.best_price - level.price) / est.best_price * 100.0,
                },
                level: est.execution_path_len,
            };
            est.execution_path_len += 1;
            est.worst_price = level.price;
            est.levels_consumed += 1;

            if cumulative_qty >= quantity {
                break;
            }
        }

        est.fillable_qty = cumulative_qty;
        est.fill_ratio = (cumulative_qty / quantity).min(1.0);
        est.fully_fillable = cumulative_qty >= quantity;
        if cumulative_qty > 0.0 {
            est.expected_avg_price = cumulative_value / cumulative_qty;
        }
        if est.expected_avg_price > 0.0 {
            let adverse = match side {
                OrderSide::Buy => est.expected_avg_price - est.best_price,
                OrderSide::Sell => est.best_price - est.expected_avg_price,
            };
            est.slippage_bps = adverse / est.best_price * 10_000.0;
            est.slippage_value = adverse * cumulative_qty;
        }
        est
    }

    /// Walks the book up to `limit_price` instead of a target quantity:
    /// how much could be taken without crossing past the limit.
    #[must_use]
    pub fn estimate_slippage_to_price(
        &self,
        book: &OrderBook,
        side: OrderSide,
        limit_price: f64,
    ) -> SlippageEstimate {
        let mut est = SlippageEstimate::empty(book.venue, side, 0.0);
        if limit_price <= 0.0 {
            return est;
        }

        let levels: &[PriceLevel] = match side {
            OrderSide::Buy => {
                est.best_price = book.best_ask();
                book.ask_levels()
            }
            OrderSide::Sell => {
                est.best_price = book.best_bid();
                book.bid_levels()
            }
        };
        if est.best_price <= 0.0 || levels.is_empty() {
            return est;
        }

        let mut cumulative_qty = 0.0;
        let mut cumulative_value = 0.0;
        for level in levels {
            if level.price <= 0.0 || level.quantity <= 0.0 {
                continue;
            }
            match side {
                OrderSide::Buy if level.price > limit_price => break,
                OrderSide::Sell if level.price < limit_price => break,
                _ => {}
            }
            cumulative_qty += level.quantity;
            cumulative_value += level.notional();
            est.worst_price = level.price;
            est.levels_consumed += 1;
        }

        est.quantity = cumulative_qty;
        est.fillable_qty = cumulative_qty;
        est.fill_ratio = 1.0;
        est.fully_fillable = true;
        if cumulative_qty > 0.0 {
            est.expected_avg_price = cumulative_value / cumulative_qty;
            let adverse = match side {
                OrderSide::Buy => est.expected_avg_price - est.best_price,
                OrderSide::Sell => est.best_price - est.expected_avg_price,
            };
            est.slippage_bps = adverse / est.best_price * 10_000.0;
            est.slippage_value = adverse * cumulative_qty;
        }
        est
    }

    /// Places a maker order at `(1 - target_fill_prob) * spread` inside the
    /// book from the touch: probability 0.8 rests near the touch, 0.5 near
    /// mid. Wait time scales with the distance in ~10 bps levels, capped.
    #[must_use]
    pub fn optimal_maker_price(
        &self,
        book: &OrderBook,
        side: OrderSide,
        target_fill_prob: f64,
        max_wait_sec: f64,
    ) -> MakerPriceEstimate {
        let mut est = MakerPriceEstimate {
            venue: book.venue,
            side,
            ..MakerPriceEstimate::default()
        };
        est.best_price = match side {
            OrderSide::Buy => book.best_bid(),
            OrderSide::Sell => book.best_ask(),
        };
        if est.best_price <= 0.0 {
            return est;
        }

        let spread = book.spread();
        let mid = book.mid_price();
        if mid <= 0.0 {
            est.recommended_price = est.best_price;
            est.estimated_fill_prob = 0.5;
            return est;
        }

        let offset = spread * (1.0 - target_fill_prob.clamp(0.0, 1.0));
        est.recommended_price = match side {
            OrderSide::Buy => est.best_price - offset,
            OrderSide::Sell => est.best_price + offset,
        };
        est.distance_from_best_bps = offset / est.best_price * 10_000.0;
        est.estimated_fill_prob = target_fill_prob;

        let levels_to_cross = (est.distance_from_best_bps / 10.0) as usize;
        est.estimated_wait_sec =
            (levels_to_cross as f64 * self.fill_time_per_level).min(max_wait_sec);
        est
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Asks (2.15, 100), (2.16, 200), (2.17, 300).
    fn ask_book() -> OrderBook {
        let mut book = OrderBook::new(Venue::BinanceUsdt, "XRPUSDT");
        book.push_ask(2.15, 100.0);
        book.push_ask(2.16, 200.0);
        book.push_ask(2.17, 300.0);
        book.push_bid(2.14, 100.0);
        book
    }

    #[test]
    fn test_buy_walk_vwap() {
        // 500 filled as 100@2.15 + 200@2.16 + 200@2.17 -> VWAP 2.162.
        let est = SlippageModel::new().estimate_taker_slippage(&ask_book(), OrderSide::Buy, 500.0);
        assert!(est.is_valid());
        assert_eq!(est.best_price, 2.15);
        assert!((est.expected_avg_price - 2.162).abs() < 1e-12);
        assert_eq!(est.worst_price, 2.17);
        assert_eq!(est.levels_consumed, 3);
        assert!(est.fully_fillable);
        assert!((est.fill_ratio - 1.0).abs() < 1e-12);
        // (2.162 - 2.15) / 2.15 * 10000 = 55.81 bps.
        assert!((est.slippage_bps - 55.813953488372093).abs() < 1e-6);
    }

    #[test]
    fn test_partial_fill_ratio() {
        let est = SlippageModel::new().estimate_taker_slippage(&ask_book(), OrderSide::Buy, 1000.0);
        assert!(!est.fully_fillable);
        assert!((est.fillable_qty - 600.0).abs() < 1e-9);
        assert!((est.fill_ratio - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_sell_walk_uses_bids() {
        let mut book = OrderBook::new(Venue::UpbitKrw, "XRP");
        book.push_bid(3100.0, 50.0);
        book.push_bid(3099.0, 50.0);
        book.push_ask(3101.0, 10.0);
        let est = SlippageModel::new().estimate_taker_slippage(&book, OrderSide::Sell, 80.0);
        assert_eq!(est.best_price, 3100.0);
        // Adverse for a sell is avg below best.
        assert!(est.expected_avg_price <= est.best_price);
        assert!(est.slippage_bps >= 0.0);
    }

    #[test]
    fn test_vwap_monotone_in_quantity() {
        let model = SlippageModel::new();
        let book = ask_book();
        let mut prev_avg = 0.0;
        let mut prev_ratio = f64::INFINITY;
        for qty in [50.0, 100.0, 250.0, 500.0, 600.0, 900.0] {
            let est = model.estimate_taker_slippage(&book, OrderSide::Buy, qty);
            assert!(
                est.expected_avg_price >= prev_avg,
                "VWAP regressed at qty {qty}"
            );
            assert!(est.fill_ratio <= prev_ratio, "fill ratio rose at qty {qty}");
            prev_avg = est.expected_avg_price;
            prev_ratio = est.fill_ratio;
        }
    }

    #[test]
    fn test_execution_path_recorded() {
        let est = SlippageModel::new().estimate_taker_slippage(&ask_book(), OrderSide::Buy, 150.0);
        let path = est.path();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].price, 2.15);
        assert_eq!(path[0].quantity, 100.0);
        assert_eq!(path[1].quantity, 50.0);
        assert!((path[1].vwap - est.expected_avg_price).abs() < 1e-12);
    }

    #[test]
    fn test_to_price_walk_stops_at_limit() {
        let est =
            SlippageModel::new().estimate_slippage_to_price(&ask_book(), OrderSide::Buy, 2.16);
        assert_eq!(est.levels_consumed, 2);
        assert!((est.fillable_qty - 300.0).abs() < 1e-9);
        assert_eq!(est.worst_price, 2.16);
    }

    #[test]
    fn test_zero_quantity_invalid() {
        let est = SlippageModel::new().estimate_taker_slippage(&ask_book(), OrderSide::Buy, 0.0);
        assert!(!est.is_valid());
        assert_eq!(est.levels_consumed, 0);
    }

    #[test]
    fn test_maker_price_inside_spread() {
        let mut book = OrderBook::new(Venue::BinanceUsdt, "XRPUSDT");
        book.push_bid(2.140, 100.0);
        book.push_ask(2.150, 100.0);
        let model = SlippageModel::new();

        // High probability rests near the touch.
        let near = model.optimal_maker_price(&book, OrderSide::Buy, 0.8, 30.0);
        assert!(near.is_valid());
        assert!((near.recommended_price - (2.140 - 0.010 * 0.2)).abs() < 1e-12);

        // 50% rests near mid.
        let mid = model.optimal_maker_price(&book, OrderSide::Buy, 0.5, 30.0);
        assert!(mid.recommended_price < near.recommended_price);
        assert!((mid.recommended_price - 2.135).abs() < 1e-12);
        assert_eq!(mid.estimated_fill_prob, 0.5);
    }

    #[test]
    fn test_maker_wait_capped() {
        let mut book = OrderBook::new(Venue::BinanceUsdt, "XRPUSDT");
        book.push_bid(1.0, 100.0);
        book.push_ask(2.0, 100.0); // absurd spread -> many levels
        let est = SlippageModel::new().optimal_maker_price(&book, OrderSide::Buy, 0.1, 30.0);
        assert!((est.estimated_wait_sec - 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_maker_sell_rests_above_ask() {
        let mut book = OrderBook::new(Venue::BinanceUsdt, "XRPUSDT");
        book.push_bid(2.140, 100.0);
        book.push_ask(2.150, 100.0);
        let est = SlippageModel::new().optimal_maker_price(&book, OrderSide::Sell, 0.5, 30.0);
        assert!(est.recommended_price > 2.150);
    }
}
