//! Maker+taker dual-order planning.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use kimp_core::{fees, OrderBook, OrderSide, Venue};

use crate::liquidity::{LiquidityAlert, LiquidityCalculator, LiquidityMetrics};
use crate::slippage::{SlippageEstimate, SlippageModel};

/// A priced two-leg plan: maker buy on the foreign venue, taker sell on
/// the domestic venue, with the premium net of fees and slippage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DualOrderPlan {
    pub maker_venue: Venue,
    pub maker_side: OrderSide,
    pub maker_price: f64,
    pub maker_quantity: f64,
    pub maker_fee_rate: f64,
    pub expected_fill_time_sec: f64,

    pub taker_venue: Venue,
    pub taker_side: OrderSide,
    /// Expected VWAP over the walked levels.
    pub taker_price: f64,
    pub taker_quantity: f64,
    pub taker_fee_rate: f64,
    pub taker_slippage_bps: f64,
    pub taker_slippage_value: f64,

    /// Both trading fees, KRW.
    pub total_fee_value: f64,
    pub total_slippage_value: f64,
    pub gross_premium_pct: f64,
    /// Gross minus fees and slippage as a share of the buy notional.
    pub net_premium_pct: f64,
    /// Expected profit, KRW.
    pub expected_profit_value: f64,
}

impl DualOrderPlan {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.maker_price > 0.0 && self.taker_price > 0.0 && self.maker_quantity > 0.0
    }

    #[must_use]
    pub fn is_profitable(&self) -> bool {
        self.is_valid() && self.net_premium_pct > 0.0
    }
}

/// Analyzer tuning.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    /// Minimum band notional before a depth alert fires (KRW).
    pub min_depth_value: f64,
    /// Maximum tolerated spread before an alert fires.
    pub max_spread_bps: f64,
    /// Target maker fill probability for planning.
    pub maker_fill_probability: f64,
    pub maker_max_wait_sec: f64,
    /// |imbalance| above this raises an alert.
    pub imbalance_alert: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_depth_value: 50_000_000.0,
            max_spread_bps: 30.0,
            maker_fill_probability: 0.8,
            maker_max_wait_sec: 30.0,
            imbalance_alert: 0.7,
        }
    }
}

/// Statistics counters for the analyzer.
#[derive(Debug, Default)]
pub struct AnalyzerStats {
    pub updates: AtomicU64,
    pub queries: AtomicU64,
    pub alerts: AtomicU64,
}

type AlertCallback = Box<dyn Fn(Venue, LiquidityAlert, &LiquidityMetrics) + Send + Sync>;

/// Per-venue book cache plus the planning entry points.
pub struct BookAnalyzer {
    config: AnalyzerConfig,
    books: RwLock<[Option<OrderBook>; 4]>,
    metrics: RwLock<[Option<LiquidityMetrics>; 4]>,
    liquidity: LiquidityCalculator,
    slippage: SlippageModel,
    alert_callback: RwLock<Option<AlertCallback>>,
    stats: AnalyzerStats,
}

impl BookAnalyzer {
    #[must_use]
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config,
            books: RwLock::new([None; 4]),
            metrics: RwLock::new([None; 4]),
            liquidity: LiquidityCalculator::new(),
            slippage: SlippageModel::new(),
            alert_callback: RwLock::new(None),
            stats: AnalyzerStats::default(),
        }
    }

    pub fn on_alert(
        &self,
        cb: impl Fn(Venue, LiquidityAlert, &LiquidityMetrics) + Send + Sync + 'static,
    ) {
        *self.alert_callback.write() = Some(Box::new(cb));
    }

    #[must_use]
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    #[must_use]
    pub fn stats(&self) -> &AnalyzerStats {
        &self.stats
    }

    /// Stores the latest book and refreshes the venue's liquidity metrics.
    pub fn update(&self, book: &OrderBook) {
        let metrics = self.liquidity.calculate(book);
        {
            let mut books = self.books.write();
            books[book.venue.index()] = Some(*book);
            self.metrics.write()[book.venue.index()] = Some(metrics);
        }
        self.stats.updates.fetch_add(1, Ordering::Relaxed);
        self.check_alerts(book.venue, &metrics);
    }

    #[must_use]
    pub fn book(&self, venue: Venue) -> Option<OrderBook> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        self.books.read()[venue.index()]
    }

    #[must_use]
    pub fn liquidity(&self, venue: Venue) -> Option<LiquidityMetrics> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        self.metrics.read()[venue.index()]
    }

    /// Taker slippage for `quantity` on `venue`'s cached book.
    #[must_use]
    pub fn estimate_slippage(
        &self,
        venue: Venue,
        side: OrderSide,
        quantity: f64,
    ) -> Option<SlippageEstimate> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        let book = self.books.read()[venue.index()]?;
        Some(self.slippage.estimate_taker_slippage(&book, side, quantity))
    }

    /// Builds the maker-buy / taker-sell plan.
    ///
    /// The maker price comes from the buy venue's book at the configured
    /// fill probability; the taker price is the sell venue's walk VWAP for
    /// `quantity`. Both prices are normalized to KRW via `fx_rate`, fees
    /// and the taker's slippage are charged, and the net premium is gross
    /// minus total cost as a share of the buy notional.
    #[must_use]
    pub fn plan_maker_taker_order(
        &self,
        buy: Venue,
        sell: Venue,
        quantity: f64,
        fx_rate: f64,
    ) -> DualOrderPlan {
        let mut plan = DualOrderPlan::default();
        if quantity <= 0.0 || buy == sell {
            return plan;
        }
        self.stats.queries.fetch_add(1, Ordering::Relaxed);

        let (buy_book, sell_book) = {
            let books = self.books.read();
            match (books[buy.index()], books[sell.index()]) {
                (Some(b), Some(s)) => (b, s),
                _ => return plan,
            }
        };

        let maker = self.slippage.optimal_maker_price(
            &buy_book,
            OrderSide::Buy,
            self.config.maker_fill_probability,
            self.config.maker_max_wait_sec,
        );
        let taker = self
            .slippage
            .estimate_taker_slippage(&sell_book, OrderSide::Sell, quantity);

        plan.maker_venue = buy;
        plan.maker_side = OrderSide::Buy;
        plan.maker_price = maker.recommended_price;
        plan.maker_quantity = quantity;
        plan.maker_fee_rate = fees::maker_fee(buy);
        plan.expected_fill_time_sec = maker.estimated_wait_sec;

        plan.taker_venue = sell;
        plan.taker_side = OrderSide::Sell;
        plan.taker_price = taker.expected_avg_price;
        plan.taker_quantity = quantity;
        plan.taker_fee_rate = fees::taker_fee(sell);
        plan.taker_slippage_bps = taker.slippage_bps;
        plan.taker_slippage_value = taker.slippage_value;

        if !plan.is_valid() {
            return plan;
        }

        let to_krw = |venue: Venue, price: f64| {
            if venue.is_krw() {
                price
            } else {
                price * fx_rate
            }
        };
        let buy_price_krw = to_krw(buy, plan.maker_price);
        let sell_price_krw = to_krw(sell, plan.taker_price);
        let buy_value_krw = buy_price_krw * quantity;
        let sell_value_krw = sell_price_krw * quantity;
        if buy_price_krw <= 0.0 {
            return plan;
        }

        plan.total_fee_value =
            buy_value_krw * plan.maker_fee_rate + sell_value_krw * plan.taker_fee_rate;
        plan.total_slippage_value = to_krw(sell, plan.taker_slippage_value);

        plan.gross_premium_pct = (sell_price_krw - buy_price_krw) / buy_price_krw * 100.0;
        let total_cost_pct =
            (plan.total_fee_value + plan.total_slippage_value) / buy_value_krw * 100.0;
        plan.net_premium_pct = plan.gross_premium_pct - total_cost_pct;
        plan.expected_profit_value =
            sell_value_krw - buy_value_krw - plan.total_fee_value - plan.total_slippage_value;

        debug!(
            buy = %buy,
            sell = %sell,
            gross = plan.gross_premium_pct,
            net = plan.net_premium_pct,
            "planned dual order"
        );
        plan
    }

    /// Smallest premium (%) worth planning for this pair: maker fee in,
    /// taker fee out, plus the safety slippage margin.
    #[must_use]
    pub fn breakeven_premium(&self, buy: Venue, sell: Venue) -> f64 {
        (fees::maker_fee(buy) + fees::taker_fee(sell) + fees::SAFETY_MARGIN) * 100.0
    }

    fn check_alerts(&self, venue: Venue, metrics: &LiquidityMetrics) {
        let guard = self.alert_callback.read();
        let Some(cb) = guard.as_ref() else { return };

        let alert = if metrics.bid_value < self.config.min_depth_value {
            Some(LiquidityAlert::LowBidDepth)
        } else if metrics.ask_value < self.config.min_depth_value {
            Some(LiquidityAlert::LowAskDepth)
        } else if metrics.spread_bps > self.config.max_spread_bps {
            Some(LiquidityAlert::WideSpread)
        } else if metrics.imbalance.abs() > self.config.imbalance_alert {
            Some(LiquidityAlert::HighImbalance)
        } else {
            None
        };

        if let Some(alert) = alert {
            self.stats.alerts.fetch_add(1, Ordering::Relaxed);
            cb(venue, alert, metrics);
        }
    }
}

impl Default for BookAnalyzer {
    fn default() -> Self {
        Self::new(AnalyzerConfig::default())
    }
}
