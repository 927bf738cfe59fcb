//! End-to-end strategy-to-execution wiring over mock venues.
//!
//! Seeds the premium engine with the canonical four-venue snapshot, plans
//! a maker+taker trade off real book walks, executes both legs against
//! mock clients, and drives the recovery path on a one-legged fill.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kimp_core::{OrderBook, OrderRequest, OrderSide, Venue};
use kimp_executor::{
    DualOrderExecutor, DualOrderRequest, MockOrderClient, OrderClient, RecoveryAction,
    RecoveryManager,
};
use kimp_market::PremiumEngine;
use kimp_strategy::BookAnalyzer;

const FX: f64 = 1400.0;

fn seeded_engine() -> PremiumEngine {
    let engine = PremiumEngine::new();
    engine.update_fx(FX);
    engine.update_price(Venue::UpbitKrw, 3100.0);
    engine.update_price(Venue::BithumbKrw, 3099.0);
    engine.update_price(Venue::BinanceUsdt, 2.15);
    engine.update_price(Venue::MexcUsdt, 2.14);
    engine
}

fn seeded_analyzer() -> BookAnalyzer {
    let analyzer = BookAnalyzer::default();

    let mut binance = OrderBook::new(Venue::BinanceUsdt, "XRPUSDT");
    binance.push_bid(2.149, 10_000.0);
    binance.push_ask(2.151, 10_000.0);
    analyzer.update(&binance);

    let mut upbit = OrderBook::new(Venue::UpbitKrw, "XRP");
    upbit.push_bid(3100.0, 10_000.0);
    upbit.push_ask(3101.0, 10_000.0);
    analyzer.update(&upbit);

    analyzer
}

fn mock_clients(
    latency: Duration,
) -> (
    HashMap<Venue, Arc<dyn OrderClient>>,
    Arc<MockOrderClient>,
    Arc<MockOrderClient>,
) {
    let binance = Arc::new(
        MockOrderClient::new(Venue::BinanceUsdt)
            .with_latency(latency)
            .with_fill_price(2.15),
    );
    let upbit = Arc::new(
        MockOrderClient::new(Venue::UpbitKrw)
            .with_latency(latency)
            .with_fill_price(3100.0),
    );
    let mut map: HashMap<Venue, Arc<dyn OrderClient>> = HashMap::new();
    map.insert(Venue::BinanceUsdt, Arc::clone(&binance) as Arc<dyn OrderClient>);
    map.insert(Venue::UpbitKrw, Arc::clone(&upbit) as Arc<dyn OrderClient>);
    (map, binance, upbit)
}

#[tokio::test]
async fn plan_then_execute_profitable_opportunity() {
    let engine = seeded_engine();
    let analyzer = seeded_analyzer();

    // The matrix agrees there is an opportunity buying foreign.
    let best = engine.best_opportunity().expect("seeded matrix");
    assert_eq!(best.sell, Venue::UpbitKrw);
    assert!(best.premium_pct > 2.0);

    // Planner prices the pair off the books and clears break-even.
    let plan = analyzer.plan_maker_taker_order(Venue::BinanceUsdt, Venue::UpbitKrw, 100.0, FX);
    assert!(plan.is_profitable());
    assert!(plan.net_premium_pct > analyzer.breakeven_premium(Venue::BinanceUsdt, Venue::UpbitKrw));

    // Execute both legs against the mocks.
    let (clients, binance, upbit) = mock_clients(Duration::ZERO);
    let executor = DualOrderExecutor::new(clients);
    let request = DualOrderRequest::new(
        OrderRequest::limit(
            plan.maker_venue,
            OrderSide::Buy,
            "XRPUSDT",
            plan.maker_quantity,
            plan.maker_price,
        ),
        OrderRequest::market(plan.taker_venue, OrderSide::Sell, "XRP", plan.taker_quantity),
    )
    .with_expected_premium(plan.net_premium_pct);

    let result = executor.execute(&request, FX).await;
    assert!(result.both_filled());
    assert_eq!(binance.orders_placed(), 1);
    assert_eq!(upbit.orders_placed(), 1);
    // Realized premium comes out of the mock fill prices.
    let expected = (3100.0 - 2.15 * FX) / (2.15 * FX) * 100.0;
    assert!((result.actual_premium_pct - expected).abs() < 1e-9);
}

#[tokio::test]
async fn parallel_dispatch_beats_serial() {
    // Both venues at 50ms: parallel execution must finish well under the
    // 100ms a serial dispatch would take, and leg starts must coincide.
    let latency = Duration::from_millis(50);
    let (clients, _, _) = mock_clients(latency);
    let executor = DualOrderExecutor::new(clients);
    let request = DualOrderRequest::new(
        OrderRequest::limit(Venue::BinanceUsdt, OrderSide::Buy, "XRPUSDT", 100.0, 2.15),
        OrderRequest::market(Venue::UpbitKrw, OrderSide::Sell, "XRP", 100.0),
    );

    let started = Instant::now();
    let result = executor.execute(&request, FX).await;
    let wall = started.elapsed();

    assert!(result.both_success());
    assert!(wall <= Duration::from_millis(80), "took {wall:?}");
    let skew = if result.buy.started_at > result.sell.started_at {
        result.buy.started_at - result.sell.started_at
    } else {
        result.sell.started_at - result.buy.started_at
    };
    assert!(skew < Duration::from_millis(10), "leg skew {skew:?}");
}

#[tokio::test]
async fn one_legged_fill_is_recovered() {
    // Buy on Binance fills 100 XRP, the Upbit sell dies: the recovery
    // classifier must market-sell those 100 XRP back on Binance.
    let (clients, binance, upbit) = mock_clients(Duration::ZERO);
    upbit.set_failing(true);

    let recovery = Arc::new(RecoveryManager::new(clients.clone()));
    let executor = DualOrderExecutor::new(clients).with_recovery(recovery);
    let request = DualOrderRequest::new(
        OrderRequest::limit(Venue::BinanceUsdt, OrderSide::Buy, "XRPUSDT", 100.0, 2.15),
        OrderRequest::market(Venue::UpbitKrw, OrderSide::Sell, "XRP", 100.0),
    );

    let result = executor.execute(&request, FX).await;
    assert!(result.partial_fill());

    let recovery_result = result.recovery.expect("auto recovery ran");
    assert!(recovery_result.success);
    assert_eq!(recovery_result.plan.action, RecoveryAction::SellBought);
    let corrective = recovery_result.plan.order.expect("corrective order");
    assert_eq!(corrective.venue, Venue::BinanceUsdt);
    assert_eq!(corrective.side, OrderSide::Sell);
    assert_eq!(corrective.quantity, 100.0);

    // Original buy + corrective sell both hit Binance.
    assert_eq!(binance.orders_placed(), 2);
    assert_eq!(executor.stats().recovery_attempts.load(Ordering::Relaxed), 1);
}
