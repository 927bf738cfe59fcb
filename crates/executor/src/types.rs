//! Dual-order request/result types and executor statistics.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use kimp_core::{time::now_us, Error, OrderRequest, OrderResult, OrderSide, Result, Venue};

use crate::recovery::RecoveryResult;

/// The two legs of an arbitrage trade, dispatched simultaneously.
#[derive(Debug, Clone, Copy)]
pub struct DualOrderRequest {
    /// Buy leg (typically the foreign venue).
    pub buy_order: OrderRequest,
    /// Sell leg (typically the domestic venue).
    pub sell_order: OrderRequest,
    /// Premium expected when the trade was planned, percent.
    pub expected_premium_pct: f64,
    /// RTT compensation: hold the buy submission back this long.
    pub buy_delay: Duration,
    /// RTT compensation: hold the sell submission back this long.
    pub sell_delay: Duration,
    pub request_id: i64,
}

impl DualOrderRequest {
    #[must_use]
    pub fn new(buy_order: OrderRequest, sell_order: OrderRequest) -> Self {
        Self {
            buy_order,
            sell_order,
            expected_premium_pct: 0.0,
            buy_delay: Duration::ZERO,
            sell_delay: Duration::ZERO,
            request_id: now_us(),
        }
    }

    #[must_use]
    pub fn with_expected_premium(mut self, pct: f64) -> Self {
        self.expected_premium_pct = pct;
        self
    }

    #[must_use]
    pub fn with_delays(mut self, buy: Duration, sell: Duration) -> Self {
        self.buy_delay = buy;
        self.sell_delay = sell;
        self
    }

    /// Structural checks: distinct venues, correct sides, positive sizes.
    pub fn validate(&self) -> Result<()> {
        if self.buy_order.venue == self.sell_order.venue {
            return Err(Error::invalid_request("legs share a venue"));
        }
        if self.buy_order.side != OrderSide::Buy {
            return Err(Error::invalid_request("buy leg is not a buy"));
        }
        if self.sell_order.side != OrderSide::Sell {
            return Err(Error::invalid_request("sell leg is not a sell"));
        }
        if self.buy_order.quantity <= 0.0 || self.sell_order.quantity <= 0.0 {
            return Err(Error::invalid_request("non-positive leg quantity"));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Outcome of one leg.
#[derive(Debug, Clone)]
pub struct LegResult {
    pub venue: Venue,
    pub outcome: Result<OrderResult>,
    /// Submission time (before the RTT-compensation delay).
    pub started_at: Instant,
    pub finished_at: Instant,
    /// place_order round trip, excluding the RTT delay.
    pub latency: Duration,
}

impl LegResult {
    #[must_use]
    pub fn error(venue: Venue, error: Error) -> Self {
        let now = Instant::now();
        Self {
            venue,
            outcome: Err(error),
            started_at: now,
            finished_at: now,
            latency: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(&self.outcome, Ok(r) if !r.is_failed())
    }

    #[must_use]
    pub fn is_filled(&self) -> bool {
        matches!(&self.outcome, Ok(r) if r.is_filled())
    }

    #[must_use]
    pub fn is_failed(&self) -> bool {
        match &self.outcome {
            Ok(r) => r.is_failed(),
            Err(_) => true,
        }
    }

    #[must_use]
    pub fn filled_qty(&self) -> f64 {
        self.outcome.as_ref().map_or(0.0, |r| r.filled_qty)
    }

    #[must_use]
    pub fn avg_price(&self) -> f64 {
        self.outcome.as_ref().map_or(0.0, |r| r.avg_price)
    }

    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match &self.outcome {
            Ok(r) if r.message.is_empty() => None,
            Ok(r) => Some(r.message.as_str().to_string()),
            Err(e) => Some(e.to_string()),
        }
    }
}

/// Outcome of a dual-order dispatch.
#[derive(Debug, Clone)]
pub struct DualOrderResult {
    pub request_id: i64,
    pub buy: LegResult,
    pub sell: LegResult,
    pub started_at: Instant,
    pub finished_at: Instant,
    /// Premium realized from actual fill prices, percent.
    pub actual_premium_pct: f64,
    /// Present when auto-recovery ran for this result.
    pub recovery: Option<RecoveryResult>,
}

impl DualOrderResult {
    #[must_use]
    pub fn both_success(&self) -> bool {
        self.buy.is_success() && self.sell.is_success()
    }

    #[must_use]
    pub fn both_filled(&self) -> bool {
        self.buy.is_filled() && self.sell.is_filled()
    }

    #[must_use]
    pub fn both_failed(&self) -> bool {
        self.buy.is_failed() && self.sell.is_failed()
    }

    /// Exactly one leg succeeded; recovery territory.
    #[must_use]
    pub fn partial_fill(&self) -> bool {
        self.buy.is_success() != self.sell.is_success()
    }

    #[must_use]
    pub fn any_success(&self) -> bool {
        self.buy.is_success() || self.sell.is_success()
    }

    #[must_use]
    pub fn total_latency(&self) -> Duration {
        self.finished_at.duration_since(self.started_at)
    }

    #[must_use]
    pub fn max_leg_latency(&self) -> Duration {
        self.buy.latency.max(self.sell.latency)
    }

    /// Buy-leg cost in KRW.
    #[must_use]
    pub fn total_buy_cost(&self, fx_rate: f64) -> f64 {
        let cost = self.buy.filled_qty() * self.buy.avg_price();
        if self.buy.venue.is_krw() {
            cost
        } else {
            cost * fx_rate
        }
    }

    /// Sell-leg revenue in KRW.
    #[must_use]
    pub fn total_sell_revenue(&self, fx_rate: f64) -> f64 {
        let revenue = self.sell.filled_qty() * self.sell.avg_price();
        if self.sell.venue.is_krw() {
            revenue
        } else {
            revenue * fx_rate
        }
    }

    /// Revenue minus cost, before fees.
    #[must_use]
    pub fn gross_profit(&self, fx_rate: f64) -> f64 {
        self.total_sell_revenue(fx_rate) - self.total_buy_cost(fx_rate)
    }

    /// Fills in `actual_premium_pct` from the fill prices.
    pub fn calculate_actual_premium(&mut self, fx_rate: f64) {
        let buy_price = self.buy.avg_price();
        let sell_price = self.sell.avg_price();
        if buy_price <= 0.0 || sell_price <= 0.0 {
            return;
        }
        let to_krw = |venue: Venue, price: f64| {
            if venue.is_krw() {
                price
            } else {
                price * fx_rate
            }
        };
        let buy_krw = to_krw(self.buy.venue, buy_price);
        let sell_krw = to_krw(self.sell.venue, sell_price);
        if buy_krw > 0.0 {
            self.actual_premium_pct = (sell_krw - buy_krw) / buy_krw * 100.0;
        }
    }
}

/// Cache-aligned executor counters; min/max maintained by CAS loops.
#[repr(C, align(64))]
#[derive(Debug)]
pub struct ExecutorStats {
    pub total_requests: AtomicU64,
    pub both_success: AtomicU64,
    pub partial_fills: AtomicU64,
    pub both_failed: AtomicU64,
    pub recovery_attempts: AtomicU64,
    pub recovery_successes: AtomicU64,
    pub total_latency_us: AtomicI64,
    pub max_latency_us: AtomicI64,
    pub min_latency_us: AtomicI64,
}

impl ExecutorStats {
    #[must_use]
    pub fn new() -> Self {
        Self {
            total_requests: AtomicU64::new(0),
            both_success: AtomicU64::new(0),
            partial_fills: AtomicU64::new(0),
            both_failed: AtomicU64::new(0),
            recovery_attempts: AtomicU64::new(0),
            recovery_successes: AtomicU64::new(0),
            total_latency_us: AtomicI64::new(0),
            max_latency_us: AtomicI64::new(0),
            min_latency_us: AtomicI64::new(i64::MAX),
        }
    }

    pub fn record_result(&self, result: &DualOrderResult) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        if result.both_success() {
            self.both_success.fetch_add(1, Ordering::Relaxed);
        } else if result.partial_fill() {
            self.partial_fills.fetch_add(1, Ordering::Relaxed);
        } else {
            self.both_failed.fetch_add(1, Ordering::Relaxed);
        }

        let latency_us = result.total_latency().as_micros() as i64;
        self.total_latency_us.fetch_add(latency_us, Ordering::Relaxed);

        let mut current = self.max_latency_us.load(Ordering::Relaxed);
        while latency_us > current {
            match self.max_latency_us.compare_exchange_weak(
                current,
                latency_us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }

        let mut current = self.min_latency_us.load(Ordering::Relaxed);
        while latency_us < current {
            match self.min_latency_us.compare_exchange_weak(
                current,
                latency_us,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(c) => current = c,
            }
        }
    }

    pub fn record_recovery(&self, success: bool) {
        self.recovery_attempts.fetch_add(1, Ordering::Relaxed);
        if success {
            self.recovery_successes.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Fraction of requests where both legs succeeded, percent.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.both_success.load(Ordering::Relaxed) as f64 / total as f64 * 100.0
    }

    /// Fraction of recovery attempts that succeeded, percent.
    #[must_use]
    pub fn recovery_rate(&self) -> f64 {
        let attempts = self.recovery_attempts.load(Ordering::Relaxed);
        if attempts == 0 {
            return 0.0;
        }
        self.recovery_successes.load(Ordering::Relaxed) as f64 / attempts as f64 * 100.0
    }

    #[must_use]
    pub fn avg_latency_us(&self) -> f64 {
        let total = self.total_requests.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.total_latency_us.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn reset(&self) {
        self.total_requests.store(0, Ordering::Relaxed);
        self.both_success.store(0, Ordering::Relaxed);
        self.partial_fills.store(0, Ordering::Relaxed);
        self.both_failed.store(0, Ordering::Relaxed);
        self.recovery_attempts.store(0, Ordering::Relaxed);
        self.recovery_successes.store(0, Ordering::Relaxed);
        self.total_latency_us.store(0, Ordering::Relaxed);
        self.max_latency_us.store(0, Ordering::Relaxed);
        self.min_latency_us.store(i64::MAX, Ordering::Relaxed);
    }
}

impl Default for ExecutorStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kimp_core::OrderType;

    fn request() -> DualOrderRequest {
        DualOrderRequest::new(
            OrderRequest::limit(Venue::BinanceUsdt, OrderSide::Buy, "XRPUSDT", 100.0, 2.15),
            OrderRequest::market(Venue::UpbitKrw, OrderSide::Sell, "XRP", 100.0),
        )
    }

    fn leg(venue: Venue, outcome: Result<OrderResult>) -> LegResult {
        let now = Instant::now();
        LegResult {
            venue,
            outcome,
            started_at: now,
            finished_at: now,
            latency: Duration::from_millis(10),
        }
    }

    fn result(buy: LegResult, sell: LegResult) -> DualOrderResult {
        let now = Instant::now();
        DualOrderResult {
            request_id: 1,
            buy,
            sell,
            started_at: now,
            finished_at: now + Duration::from_millis(50),
            actual_premium_pct: 0.0,
            recovery: None,
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request().is_valid());

        let mut bad = request();
        bad.sell_order.venue = Venue::BinanceUsdt;
        assert!(matches!(bad.validate(), Err(Error::InvalidRequest(_))));

        let mut bad = request();
        bad.buy_order.side = OrderSide::Sell;
        assert!(!bad.is_valid());

        let mut bad = request();
        bad.buy_order.quantity = 0.0;
        assert!(!bad.is_valid());

        let mut bad = request();
        bad.buy_order.order_type = OrderType::Market;
        assert!(bad.is_valid());
    }

    #[test]
    fn test_outcome_classification() {
        let ok = || leg(Venue::BinanceUsdt, Ok(OrderResult::filled("a", 100.0, 2.15)));
        let fail = || leg(Venue::UpbitKrw, Err(Error::ConnectionTimeout));

        let r = result(ok(), leg(Venue::UpbitKrw, Ok(OrderResult::filled("b", 100.0, 3100.0))));
        assert!(r.both_success() && r.both_filled() && !r.partial_fill());

        let r = result(ok(), fail());
        assert!(r.partial_fill() && !r.both_success() && !r.both_failed());

        let r = result(
            leg(Venue::BinanceUsdt, Err(Error::ConnectionTimeout)),
            fail(),
        );
        assert!(r.both_failed() && !r.partial_fill());
    }

    #[test]
    fn test_actual_premium_from_fills() {
        let mut r = result(
            leg(Venue::BinanceUsdt, Ok(OrderResult::filled("a", 100.0, 2.15))),
            leg(Venue::UpbitKrw, Ok(OrderResult::filled("b", 100.0, 3100.0))),
        );
        r.calculate_actual_premium(1400.0);
        let expected = (3100.0 - 2.15 * 1400.0) / (2.15 * 1400.0) * 100.0;
        assert!((r.actual_premium_pct - expected).abs() < 1e-9);
        assert!((r.gross_profit(1400.0) - (310_000.0 - 301_000.0)).abs() < 1e-6);
    }

    #[test]
    fn test_premium_skipped_without_fills() {
        let mut r = result(
            leg(Venue::BinanceUsdt, Err(Error::ConnectionTimeout)),
            leg(Venue::UpbitKrw, Ok(OrderResult::filled("b", 100.0, 3100.0))),
        );
        r.calculate_actual_premium(1400.0);
        assert_eq!(r.actual_premium_pct, 0.0);
    }

    #[test]
    fn test_stats_accumulation() {
        let stats = ExecutorStats::new();
        let ok = leg(Venue::BinanceUsdt, Ok(OrderResult::filled("a", 1.0, 1.0)));
        let fail = leg(Venue::UpbitKrw, Err(Error::ConnectionTimeout));

        stats.record_result(&result(ok.clone(), ok.clone()));
        stats.record_result(&result(ok.clone(), fail.clone()));
        stats.record_result(&result(fail.clone(), fail));

        assert_eq!(stats.total_requests.load(Ordering::Relaxed), 3);
        assert_eq!(stats.both_success.load(Ordering::Relaxed), 1);
        assert_eq!(stats.partial_fills.load(Ordering::Relaxed), 1);
        assert_eq!(stats.both_failed.load(Ordering::Relaxed), 1);
        assert!((stats.success_rate() - 100.0 / 3.0).abs() < 1e-9);
        assert!(stats.avg_latency_us() > 0.0);
        assert!(stats.max_latency_us.load(Ordering::Relaxed) >= 50_000);
        assert!(stats.min_latency_us.load(Ordering::Relaxed) <= 51_000);

        stats.record_recovery(true);
        stats.record_recovery(false);
        assert!((stats.recovery_rate() - 50.0).abs() < 1e-9);

        stats.reset();
        assert_eq!(stats.total_requests.load(Ordering::Relaxed), 0);
        assert_eq!(stats.min_latency_us.load(Ordering::Relaxed), i64::MAX);
    }
}
