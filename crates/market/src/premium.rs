//! The 4x4 premium matrix.
//!
//! Cell `[buy][sell]` is the percentage gained by buying at `buy` and
//! selling at `sell`, with USDT prices normalized to KRW first:
//! `(sell_krw - buy_krw) / buy_krw * 100`. The diagonal is zero; any cell
//! with a missing input is NaN.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use kimp_core::{time::now_us, Venue};

/// A premium observation handed to threshold callbacks.
#[derive(Debug, Clone, Copy)]
pub struct PremiumInfo {
    pub buy: Venue,
    pub sell: Venue,
    pub premium_pct: f64,
    pub buy_price_krw: f64,
    pub sell_price_krw: f64,
    pub fx: f64,
    pub timestamp_us: i64,
}

/// The matrix value type.
pub type PremiumMatrix = [[f64; 4]; 4];

type PremiumCallback = Box<dyn Fn(&PremiumInfo) + Send + Sync>;

struct Inner {
    matrix: PremiumMatrix,
    /// Whether each cell was above the threshold at the last evaluation;
    /// callbacks fire only on upward crossings.
    above: [[bool; 4]; 4],
}

/// Incremental premium calculator.
///
/// Price and FX cells are plain atomics so the consumer thread can write
/// them without contention; the matrix itself sits behind a reader/writer
/// lock and is recomputed on every update. Callbacks are invoked after the
/// lock is dropped, so they may freely query the engine.
pub struct PremiumEngine {
    prices: [AtomicU64; 4],
    fx_bits: AtomicU64,
    threshold_bits: AtomicU64,
    inner: RwLock<Inner>,
    callback: RwLock<Option<PremiumCallback>>,
}

impl PremiumEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            prices: std::array::from_fn(|_| AtomicU64::new(0f64.to_bits())),
            fx_bits: AtomicU64::new(0f64.to_bits()),
            threshold_bits: AtomicU64::new(0f64.to_bits()),
            inner: RwLock::new(Inner {
                matrix: [[f64::NAN; 4]; 4],
                above: [[false; 4]; 4],
            }),
            callback: RwLock::new(None),
        }
    }

    /// Updates one venue's price and recomputes the matrix.
    pub fn update_price(&self, venue: Venue, price: f64) {
        self.prices[venue.index()].store(price.to_bits(), Ordering::Release);
        self.recalculate();
    }

    /// Updates the FX rate and recomputes the matrix.
    pub fn update_fx(&self, rate: f64) {
        self.fx_bits.store(rate.to_bits(), Ordering::Release);
        self.recalculate();
    }

    /// Alert threshold in percent; a cell crossing strictly above it fires
    /// the callback once per crossing.
    pub fn set_threshold(&self, pct: f64) {
        self.threshold_bits.store(pct.to_bits(), Ordering::Release);
    }

    pub fn on_premium_change(&self, cb: impl Fn(&PremiumInfo) + Send + Sync + 'static) {
        *self.callback.write() = Some(Box::new(cb));
    }

    #[must_use]
    pub fn fx(&self) -> f64 {
        f64::from_bits(self.fx_bits.load(Ordering::Acquire))
    }

    fn price(&self, venue: Venue) -> f64 {
        f64::from_bits(self.prices[venue.index()].load(Ordering::Acquire))
    }

    fn to_krw(&self, venue: Venue, price: f64, fx: f64) -> f64 {
        if venue.is_krw() {
            price
        } else {
            price * fx
        }
    }

    fn recalculate(&self) {
        let fx = self.fx();
        let threshold = f64::from_bits(self.threshold_bits.load(Ordering::Acquire));
        let ts = now_us();
        let mut crossings: Vec<PremiumInfo> = Vec::new();

        {
            let mut inner = self.inner.write();
            for buy in Venue::ALL {
                for sell in Venue::ALL {
                    let (bi, si) = (buy.index(), sell.index());
                    if bi == si {
                        inner.matrix[bi][si] = 0.0;
                        continue;
                    }

                    let buy_raw = self.price(buy);
                    let sell_raw = self.price(sell);
                    let buy_krw = self.to_krw(buy, buy_raw, fx);
                    let sell_krw = self.to_krw(sell, sell_raw, fx);

                    let premium = if buy_krw > 0.0 && sell_krw > 0.0 {
                        (sell_krw - buy_krw) / buy_krw * 100.0
                    } else {
                        f64::NAN
                    };
                    inner.matrix[bi][si] = premium;

                    let is_above = premium.is_finite() && premium > threshold;
                    if is_above && !inner.above[bi][si] {
                        crossings.push(PremiumInfo {
                            buy,
                            sell,
                            premium_pct: premium,
                            buy_price_krw: buy_krw,
                            sell_price_krw: sell_krw,
                            fx,
                            timestamp_us: ts,
                        });
                    }
                    inner.above[bi][si] = is_above;
                }
            }
        }

        // Lock dropped: the callback may call back into get_matrix().
        if !crossings.is_empty() {
            if let Some(cb) = self.callback.read().as_ref() {
                for info in &crossings {
                    cb(info);
                }
            }
        }
    }

    /// Snapshot of the whole matrix.
    #[must_use]
    pub fn get_matrix(&self) -> PremiumMatrix {
        self.inner.read().matrix
    }

    /// One cell; NaN when inputs are missing, 0 on the diagonal.
    #[must_use]
    pub fn get_premium(&self, buy: Venue, sell: Venue) -> f64 {
        self.inner.read().matrix[buy.index()][sell.index()]
    }

    /// The maximum finite off-diagonal cell.
    #[must_use]
    pub fn best_opportunity(&self) -> Option<PremiumInfo> {
        let fx = self.fx();
        let inner = self.inner.read();
        let mut best: Option<(Venue, Venue, f64)> = None;
        for buy in Venue::ALL {
            for sell in Venue::ALL {
                if buy == sell {
                    continue;
                }
                let premium = inner.matrix[buy.index()][sell.index()];
                if premium.is_finite() && best.map_or(true, |(_, _, b)| premium > b) {
                    best = Some((buy, sell, premium));
                }
            }
        }
        drop(inner);
        best.map(|(buy, sell, premium)| PremiumInfo {
            buy,
            sell,
            premium_pct: premium,
            buy_price_krw: self.to_krw(buy, self.price(buy), fx),
            sell_price_krw: self.to_krw(sell, self.price(sell), fx),
            fx,
            timestamp_us: now_us(),
        })
    }

    /// All off-diagonal cells at or above `min_pct`, best first.
    #[must_use]
    pub fn opportunities(&self, min_pct: f64) -> Vec<PremiumInfo> {
        let fx = self.fx();
        let matrix = self.get_matrix();
        let ts = now_us();
        let mut out: Vec<PremiumInfo> = Vec::new();
        for buy in Venue::ALL {
            for sell in Venue::ALL {
                if buy == sell {
                    continue;
                }
                let premium = matrix[buy.index()][sell.index()];
                if premium.is_finite() && premium >= min_pct {
                    out.push(PremiumInfo {
                        buy,
                        sell,
                        premium_pct: premium,
                        buy_price_krw: self.to_krw(buy, self.price(buy), fx),
                        sell_price_krw: self.to_krw(sell, self.price(sell), fx),
                        fx,
                        timestamp_us: ts,
                    });
                }
            }
        }
        out.sort_by(|a, b| b.premium_pct.total_cmp(&a.premium_pct));
        out
    }
}

impl Default for PremiumEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn seeded_engine() -> PremiumEngine {
        // The canonical four-venue snapshot: FX 1400, Upbit 3100 KRW,
        // Bithumb 3099 KRW, Binance 2.15 USDT, Mexc 2.14 USDT.
        let engine = PremiumEngine::new();
        engine.update_fx(1400.0);
        engine.update_price(Venue::UpbitKrw, 3100.0);
        engine.update_price(Venue::BithumbKrw, 3099.0);
        engine.update_price(Venue::BinanceUsdt, 2.15);
        engine.update_price(Venue::MexcUsdt, 2.14);
        engine
    }

    #[test]
    fn test_premium_formula() {
        let engine = seeded_engine();
        // Binance -> Upbit: (3100 - 3010) / 3010 * 100.
        let expected = (3100.0 - 2.15 * 1400.0) / (2.15 * 1400.0) * 100.0;
        let got = engine.get_premium(Venue::BinanceUsdt, Venue::UpbitKrw);
        assert!((got - expected).abs() < 1e-9);
        assert!((got - 2.9900).abs() < 1e-3);

        // The reverse direction is negative.
        let reverse = engine.get_premium(Venue::UpbitKrw, Venue::BinanceUsdt);
        assert!(reverse < 0.0);
    }

    #[test]
    fn test_diagonal_is_zero() {
        let engine = seeded_engine();
        for venue in Venue::ALL {
            assert_eq!(engine.get_premium(venue, venue), 0.0);
        }
    }

    #[test]
    fn test_missing_price_is_nan() {
        let engine = PremiumEngine::new();
        engine.update_fx(1400.0);
        engine.update_price(Venue::UpbitKrw, 3100.0);
        assert!(engine
            .get_premium(Venue::BinanceUsdt, Venue::UpbitKrw)
            .is_nan());
    }

    #[test]
    fn test_zero_fx_suppresses_usdt_cells() {
        let engine = seeded_engine();
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);
        engine.on_premium_change(move |_| {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        });
        engine.update_fx(0.0);
        assert!(engine
            .get_premium(Venue::BinanceUsdt, Venue::UpbitKrw)
            .is_nan());
        // KRW-to-KRW cells survive.
        assert!(engine
            .get_premium(Venue::BithumbKrw, Venue::UpbitKrw)
            .is_finite());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_best_opportunity_is_mexc_to_upbit() {
        let engine = seeded_engine();
        let best = engine.best_opportunity().unwrap();
        assert_eq!(best.buy, Venue::MexcUsdt);
        assert_eq!(best.sell, Venue::UpbitKrw);
        let expected = (3100.0 - 2.14 * 1400.0) / (2.14 * 1400.0) * 100.0;
        assert!((best.premium_pct - expected).abs() < 1e-9);
        assert_eq!(best.fx, 1400.0);
    }

    #[test]
    fn test_opportunities_sorted_descending() {
        let engine = seeded_engine();
        let opps = engine.opportunities(1.0);
        assert!(!opps.is_empty());
        for pair in opps.windows(2) {
            assert!(pair[0].premium_pct >= pair[1].premium_pct);
        }
        assert_eq!(opps[0].buy, Venue::MexcUsdt);
        assert_eq!(opps[0].sell, Venue::UpbitKrw);
    }

    #[test]
    fn test_callback_fires_once_per_upward_crossing() {
        let engine = PremiumEngine::new();
        engine.set_threshold(2.0);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);
        engine.on_premium_change(move |info| {
            assert!(info.premium_pct > 2.0);
            fired_cb.fetch_add(1, Ordering::SeqCst);
        });

        engine.update_fx(1400.0);
        engine.update_price(Venue::BinanceUsdt, 2.15);
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        // Crossing: Binance -> Upbit rises above 2%.
        engine.update_price(Venue::UpbitKrw, 3100.0);
        let after_cross = fired.load(Ordering::SeqCst);
        assert!(after_cross >= 1);

        // Staying above the threshold does not re-fire that cell.
        engine.update_price(Venue::UpbitKrw, 3101.0);
        assert_eq!(fired.load(Ordering::SeqCst), after_cross);

        // Dropping below and crossing again fires again.
        engine.update_price(Venue::UpbitKrw, 3010.0);
        engine.update_price(Venue::UpbitKrw, 3100.0);
        assert!(fired.load(Ordering::SeqCst) > after_cross);
    }

    #[test]
    fn test_threshold_is_strictly_above() {
        // Threshold equal to the only positive cell: equality is not a
        // crossing, so nothing fires.
        let premium = (3100.0 - 2.15 * 1400.0) / (2.15 * 1400.0) * 100.0;
        let engine = PremiumEngine::new();
        engine.set_threshold(premium);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_cb = Arc::clone(&fired);
        engine.on_premium_change(move |_| {
            fired_cb.fetch_add(1, Ordering::SeqCst);
        });
        engine.update_fx(1400.0);
        engine.update_price(Venue::BinanceUsdt, 2.15);
        engine.update_price(Venue::UpbitKrw, 3100.0);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_callback_may_query_engine() {
        let engine = Arc::new(PremiumEngine::new());
        engine.set_threshold(1.0);
        let engine_cb = Arc::clone(&engine);
        let ok = Arc::new(AtomicUsize::new(0));
        let ok_cb = Arc::clone(&ok);
        engine.on_premium_change(move |info| {
            // Deadlock-free: the engine lock is not held during callbacks.
            let matrix = engine_cb.get_matrix();
            assert!(matrix[info.buy.index()][info.sell.index()].is_finite());
            ok_cb.fetch_add(1, Ordering::SeqCst);
        });
        engine.update_fx(1400.0);
        engine.update_price(Venue::BinanceUsdt, 2.15);
        engine.update_price(Venue::UpbitKrw, 3100.0);
        assert!(ok.load(Ordering::SeqCst) >= 1);
    }
}
