//! Engine wiring: sessions in, strategy in the middle, orders out.
//!
//! One reactor runtime runs every venue session and the execution tasks;
//! one dedicated consumer thread drains the session queues, updates market
//! state and the premium engine, and forwards threshold crossings to the
//! execution task over a channel.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use kimp_core::config::{AppConfig, RiskConfig, StrategyConfig, SymbolConfig};
use kimp_core::{fees, OrderRequest, OrderSide, Venue};
use kimp_executor::{
    BinanceClient, DualOrderExecutor, DualOrderRequest, MockOrderClient, OrderClient,
    RecoveryManager, UpbitClient,
};
use kimp_market::{fx, CachedFxSource, FxCell, MarketState, PremiumEngine, PremiumInfo};
use kimp_primitives::{AdaptiveWait, RateLimitManager};
use kimp_session::{SessionConfig, SessionEvent, VenueSession};
use kimp_strategy::BookAnalyzer;

use crate::fx_source::RestFxSource;
use crate::observer::CsvObserver;

pub async fn run(config: AppConfig, dry_run: bool, out_dir: &str) -> Result<()> {
    fees::validate().context("fee table")?;
    config.validate().context("config")?;

    let traded = config
        .primary_symbols()
        .first()
        .cloned()
        .cloned()
        .context("no enabled primary symbol configured")?;
    info!(symbol = %traded.symbol, dry_run, "starting engine");

    // FX: refreshed in the background, cached against source outages.
    let fx_cell = Arc::new(FxCell::new());
    let fx_source: Arc<dyn kimp_market::FxSource> =
        Arc::new(CachedFxSource::new(RestFxSource::new()));
    let fx_task = fx::spawn_refresh(fx_source, Arc::clone(&fx_cell), Duration::from_secs(60));

    // Strategy state.
    let state = Arc::new(MarketState::new());
    let premium = Arc::new(PremiumEngine::new());
    premium.set_threshold(config.strategy.min_premium_pct);
    let analyzer = Arc::new(BookAnalyzer::default());
    analyzer.on_alert(|venue, alert, metrics| {
        warn!(%venue, alert = alert.as_str(), spread_bps = metrics.spread_bps, "liquidity alert");
    });

    // Execution side.
    let clients = build_clients(&config, dry_run);
    let recovery = Arc::new(RecoveryManager::new(clients.clone()).with_dry_run(dry_run));
    let executor = Arc::new(
        DualOrderExecutor::new(clients)
            .with_recovery(recovery)
            .with_leg_timeout(Duration::from_millis(config.strategy.order_timeout_ms)),
    );

    let observer = Arc::new(Mutex::new(
        CsvObserver::open(out_dir).context("observer sinks")?,
    ));

    // Threshold crossings flow from the consumer thread to the execution
    // task over this channel.
    let (opportunity_tx, opportunity_rx) = mpsc::channel::<PremiumInfo>(64);
    {
        let observer = Arc::clone(&observer);
        premium.on_premium_change(move |info| {
            if let Err(err) = observer.lock().record_premium_alert(info) {
                warn!(%err, "premium alert sink failed");
            }
            if opportunity_tx.try_send(*info).is_err() {
                warn!("execution backlog full, dropping opportunity");
            }
        });
    }

    let execution_task = tokio::spawn(execution_loop(
        opportunity_rx,
        Arc::clone(&analyzer),
        Arc::clone(&executor),
        Arc::clone(&fx_cell),
        config.strategy.clone(),
        config.risk.clone(),
        traded.clone(),
    ));

    // Venue sessions on the reactor runtime.
    let sessions = spawn_sessions(&config);
    if sessions.is_empty() {
        anyhow::bail!("no venue sessions enabled");
    }

    // The consumer never blocks on I/O: it only drains queues and updates
    // shared state.
    let shutdown = Arc::new(AtomicBool::new(false));
    let consumer = {
        let sessions = sessions.clone();
        let state = Arc::clone(&state);
        let premium = Arc::clone(&premium);
        let analyzer = Arc::clone(&analyzer);
        let fx_cell = Arc::clone(&fx_cell);
        let observer = Arc::clone(&observer);
        let shutdown = Arc::clone(&shutdown);
        std::thread::Builder::new()
            .name("kimp-consumer".into())
            .spawn(move || {
                consumer_loop(
                    &sessions, &state, &premium, &analyzer, &fx_cell, &observer, &shutdown,
                );
            })
            .context("spawn consumer thread")?
    };

    // Periodic snapshots.
    let snapshot_task = {
        let observer = Arc::clone(&observer);
        let premium = Arc::clone(&premium);
        let fx_cell = Arc::clone(&fx_cell);
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(30)).await;
                let guard = observer.lock();
                if let Err(err) = guard.snapshot_fx(&fx_cell.load()) {
                    warn!(%err, "fx snapshot failed");
                }
                if let Err(err) = guard.snapshot_summary(&premium, &state) {
                    warn!(%err, "summary snapshot failed");
                }
            }
        })
    };

    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("shutting down");

    for session in &sessions {
        session.disconnect();
    }
    shutdown.store(true, Ordering::Release);
    let _ = consumer.join();
    snapshot_task.abort();
    fx_task.abort();
    execution_task.abort();

    let stats = executor.stats();
    info!(
        requests = stats.total_requests.load(Ordering::Relaxed),
        success_rate = stats.success_rate(),
        avg_latency_us = stats.avg_latency_us(),
        "executor summary"
    );
    Ok(())
}

fn build_clients(config: &AppConfig, dry_run: bool) -> HashMap<Venue, Arc<dyn OrderClient>> {
    let mut clients: HashMap<Venue, Arc<dyn OrderClient>> = HashMap::new();
    if dry_run {
        for venue in Venue::ALL {
            clients.insert(venue, Arc::new(MockOrderClient::new(venue)));
        }
        return clients;
    }

    let limits = Arc::new(RateLimitManager::new());
    let upbit = config.venue(Venue::UpbitKrw);
    if upbit.enabled && !upbit.access_key.is_empty() {
        let mut client = UpbitClient::new(&upbit.access_key, &upbit.secret_key)
            .with_rate_limits(Arc::clone(&limits));
        if !upbit.rest_url.is_empty() {
            client = client.with_base_url(&upbit.rest_url);
        }
        clients.insert(Venue::UpbitKrw, Arc::new(client));
    }
    let binance = config.venue(Venue::BinanceUsdt);
    if binance.enabled && !binance.access_key.is_empty() {
        let mut client = BinanceClient::new(&binance.access_key, &binance.secret_key)
            .with_rate_limits(limits);
        if !binance.rest_url.is_empty() {
            client = client.with_base_url(&binance.rest_url);
        }
        clients.insert(Venue::BinanceUsdt, Arc::new(client));
    }
    clients
}

fn spawn_sessions(config: &AppConfig) -> Vec<Arc<VenueSession>> {
    let mut sessions = Vec::new();
    for venue in Venue::ALL {
        let venue_config = config.venue(venue);
        if !venue_config.enabled || venue_config.ws_url.is_empty() {
            continue;
        }
        let codes = config.codes_for(venue);
        if codes.is_empty() {
            continue;
        }
        let session = Arc::new(VenueSession::new(SessionConfig::new(
            venue,
            venue_config.ws_url.clone(),
            codes,
        )));
        let _ = session.spawn();
        info!(%venue, "session started");
        sessions.push(session);
    }
    sessions
}

fn consumer_loop(
    sessions: &[Arc<VenueSession>],
    state: &MarketState,
    premium: &PremiumEngine,
    analyzer: &BookAnalyzer,
    fx_cell: &FxCell,
    observer: &Mutex<CsvObserver>,
    shutdown: &AtomicBool,
) {
    let mut waiter = AdaptiveWait::new();
    let mut last_fx = 0.0;

    while !shutdown.load(Ordering::Acquire) {
        let fx = fx_cell.rate();
        if fx > 0.0 && fx != last_fx {
            premium.update_fx(fx);
            last_fx = fx;
        }

        let mut drained = false;
        for session in sessions {
            while let Some(event) = session.events().pop() {
                drained = true;
                match event {
                    SessionEvent::Ticker(ticker) => {
                        state.update_ticker(&ticker);
                        premium.update_price(ticker.venue, ticker.price);
                        if let Err(err) = observer.lock().record_ticker(&ticker) {
                            warn!(%err, "price sink failed");
                        }
                    }
                    SessionEvent::Book(book) => {
                        state.update_book(&book);
                        analyzer.update(&book);
                    }
                    SessionEvent::Trade(trade) => {
                        debug!(venue = %trade.venue, price = trade.price, "trade");
                    }
                    SessionEvent::Connected => {
                        info!(venue = %session.venue(), "session connected");
                    }
                    SessionEvent::Disconnected => {
                        info!(venue = %session.venue(), "session disconnected");
                    }
                    SessionEvent::Error(message) => {
                        warn!(venue = %session.venue(), %message, "session error");
                    }
                }
            }
        }

        if drained {
            waiter.reset();
        } else {
            waiter.wait();
        }
    }
}

async fn execution_loop(
    mut opportunities: mpsc::Receiver<PremiumInfo>,
    analyzer: Arc<BookAnalyzer>,
    executor: Arc<DualOrderExecutor>,
    fx_cell: Arc<FxCell>,
    strategy: StrategyConfig,
    risk: RiskConfig,
    traded: SymbolConfig,
) {
    let mut realized_pnl_krw = 0.0;
    let mut halted = false;

    while let Some(info) = opportunities.recv().await {
        if halted {
            continue;
        }
        if info.premium_pct > strategy.max_premium_pct {
            warn!(
                premium = info.premium_pct,
                "premium above maximum, treating as stale data"
            );
            continue;
        }
        let breakeven = analyzer.breakeven_premium(info.buy, info.sell);
        if info.premium_pct <= breakeven {
            debug!(premium = info.premium_pct, breakeven, "below break-even");
            continue;
        }

        let fx = fx_cell.rate();
        let quantity = strategy.min_order_qty;
        let plan = analyzer.plan_maker_taker_order(info.buy, info.sell, quantity, fx);
        if !plan.is_profitable() {
            debug!(
                buy = %info.buy,
                sell = %info.sell,
                net = plan.net_premium_pct,
                "plan not profitable after costs"
            );
            continue;
        }

        let request = DualOrderRequest::new(
            OrderRequest::limit(
                plan.maker_venue,
                OrderSide::Buy,
                traded.code_for(plan.maker_venue),
                plan.maker_quantity.min(strategy.max_order_qty),
                plan.maker_price,
            ),
            OrderRequest::market(
                plan.taker_venue,
                OrderSide::Sell,
                traded.code_for(plan.taker_venue),
                plan.taker_quantity.min(strategy.max_order_qty),
            ),
        )
        .with_expected_premium(plan.net_premium_pct);

        let result = executor.execute(&request, fx).await;
        if result.both_success() {
            realized_pnl_krw += result.gross_profit(fx);
            info!(
                request_id = result.request_id,
                premium = result.actual_premium_pct,
                pnl_krw = realized_pnl_krw,
                "trade complete"
            );
        } else {
            warn!(
                request_id = result.request_id,
                partial = result.partial_fill(),
                recovered = result.recovery.as_ref().is_some_and(|r| r.success),
                "trade degraded"
            );
        }

        if risk.kill_switch_enabled && realized_pnl_krw < -risk.daily_loss_limit_krw {
            error!(
                pnl_krw = realized_pnl_krw,
                limit = risk.daily_loss_limit_krw,
                "daily loss limit breached, halting execution"
            );
            halted = true;
        }
    }
}
