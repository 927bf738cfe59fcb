//! One-legged fill recovery.
//!
//! When a dual order ends with exactly one filled leg, the position is
//! directional and must be flattened fast. The classifier picks the
//! corrective action from the leg outcomes; execution retries a market
//! order a bounded number of times.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tracing::{info, warn};

use kimp_core::{Error, OrderRequest, OrderSide, Venue};

use crate::client::OrderClient;
use crate::types::{DualOrderRequest, DualOrderResult, LegResult};

/// What to do about a one-legged outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Both legs agree (both filled or both failed); nothing to undo.
    None,
    /// Buy filled, sell failed: market-sell the bought quantity back on
    /// the buy venue.
    SellBought,
    /// Sell filled, buy failed: market-buy the sold quantity back on the
    /// sell venue.
    BuySold,
    /// Cancel both resting legs.
    CancelBoth,
    /// Outcome cannot be sized programmatically; a human decides.
    ManualIntervention,
}

impl RecoveryAction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RecoveryAction::None => "None",
            RecoveryAction::SellBought => "SellBought",
            RecoveryAction::BuySold => "BuySold",
            RecoveryAction::CancelBoth => "CancelBoth",
            RecoveryAction::ManualIntervention => "ManualIntervention",
        }
    }
}

impl std::fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A corrective order plus its retry budget.
#[derive(Debug, Clone)]
pub struct RecoveryPlan {
    pub action: RecoveryAction,
    pub order: Option<OrderRequest>,
    pub reason: String,
    pub retry_count: u32,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl RecoveryPlan {
    fn noop(action: RecoveryAction, reason: impl Into<String>) -> Self {
        Self {
            action,
            order: None,
            reason: reason.into(),
            retry_count: 0,
            max_retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn needs_execution(&self) -> bool {
        !matches!(
            self.action,
            RecoveryAction::None | RecoveryAction::ManualIntervention
        )
    }

    #[must_use]
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}

/// Outcome of executing (or declining to execute) a plan.
#[derive(Debug, Clone)]
pub struct RecoveryResult {
    pub plan: RecoveryPlan,
    pub order_result: Option<LegResult>,
    pub success: bool,
    pub message: String,
}

/// Recovery counters.
#[derive(Debug, Default)]
pub struct RecoveryStats {
    pub total_plans: AtomicU64,
    pub sell_bought_plans: AtomicU64,
    pub buy_sold_plans: AtomicU64,
    pub manual_plans: AtomicU64,
    pub executions: AtomicU64,
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub retries: AtomicU64,
}

impl RecoveryStats {
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let executions = self.executions.load(Ordering::Relaxed);
        if executions == 0 {
            return 0.0;
        }
        self.successes.load(Ordering::Relaxed) as f64 / executions as f64 * 100.0
    }
}

/// Plans and executes corrective orders.
pub struct RecoveryManager {
    clients: HashMap<Venue, Arc<dyn OrderClient>>,
    max_retries: u32,
    retry_delay: Duration,
    dry_run: bool,
    stats: RecoveryStats,
}

impl RecoveryManager {
    #[must_use]
    pub fn new(clients: HashMap<Venue, Arc<dyn OrderClient>>) -> Self {
        Self {
            clients,
            max_retries: 3,
            retry_delay: Duration::from_millis(100),
            dry_run: false,
            stats: RecoveryStats::default(),
        }
    }

    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Short-circuits execution to synthetic success; for tests and
    /// rehearsals.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn stats(&self) -> &RecoveryStats {
        &self.stats
    }

    /// Classifies the leg outcomes into a corrective plan.
    ///
    /// The corrective order is always a market order for the successful
    /// leg's *filled* quantity, on the opposite side, on the venue that
    /// filled; a "successful" leg that reported no fill cannot be sized
    /// and escalates to manual intervention.
    #[must_use]
    pub fn create_plan(
        &self,
        request: &DualOrderRequest,
        result: &DualOrderResult,
    ) -> RecoveryPlan {
        self.stats.total_plans.fetch_add(1, Ordering::Relaxed);

        let buy_ok = result.buy.is_success();
        let sell_ok = result.sell.is_success();

        match (buy_ok, sell_ok) {
            (true, true) => RecoveryPlan::noop(RecoveryAction::None, "both legs succeeded"),
            (false, false) => {
                RecoveryPlan::noop(RecoveryAction::None, "both legs failed, nothing to undo")
            }
            (true, false) => {
                self.stats.sell_bought_plans.fetch_add(1, Ordering::Relaxed);
                self.directional_plan(
                    RecoveryAction::SellBought,
                    request.buy_order.venue,
                    request.buy_order.symbol.as_str(),
                    OrderSide::Sell,
                    result.buy.filled_qty(),
                    "buy filled but sell failed, liquidating bought position",
                )
            }
            (false, true) => {
                self.stats.buy_sold_plans.fetch_add(1, Ordering::Relaxed);
                self.directional_plan(
                    RecoveryAction::BuySold,
                    request.sell_order.venue,
                    request.sell_order.symbol.as_str(),
                    OrderSide::Buy,
                    result.sell.filled_qty(),
                    "sell filled but buy failed, covering sold position",
                )
            }
        }
    }

    fn directional_plan(
        &self,
        action: RecoveryAction,
        venue: Venue,
        symbol: &str,
        side: OrderSide,
        filled_qty: f64,
        reason: &str,
    ) -> RecoveryPlan {
        if filled_qty <= 0.0 {
            self.stats.manual_plans.fetch_add(1, Ordering::Relaxed);
            return RecoveryPlan::noop(
                RecoveryAction::ManualIntervention,
                "successful leg reported no filled quantity",
            );
        }
        RecoveryPlan {
            action,
            order: Some(OrderRequest::market(venue, side, symbol, filled_qty)),
            reason: reason.to_string(),
            retry_count: 0,
            max_retries: self.max_retries,
            retry_delay: self.retry_delay,
        }
    }

    /// Executes a plan with bounded retries.
    pub async fn execute(&self, mut plan: RecoveryPlan) -> RecoveryResult {
        if !plan.needs_execution() {
            let message = match plan.action {
                RecoveryAction::ManualIntervention => "manual intervention required".to_string(),
                _ => "no execution needed".to_string(),
            };
            let success = plan.action == RecoveryAction::None;
            return RecoveryResult {
                plan,
                order_result: None,
                success,
                message,
            };
        }

        self.stats.executions.fetch_add(1, Ordering::Relaxed);

        if self.dry_run {
            self.stats.successes.fetch_add(1, Ordering::Relaxed);
            return RecoveryResult {
                plan,
                order_result: None,
                success: true,
                message: "dry run, order not sent".to_string(),
            };
        }

        let Some(order) = plan.order.take() else {
            return RecoveryResult {
                plan,
                order_result: None,
                success: false,
                message: "plan carries no corrective order".to_string(),
            };
        };
        while plan.can_retry() {
            let leg = self.place(&order).await;
            if leg.is_success() {
                info!(
                    action = %plan.action,
                    venue = %order.venue,
                    qty = order.quantity,
                    "recovery order executed"
                );
                self.stats.successes.fetch_add(1, Ordering::Relaxed);
                plan.order = Some(order);
                return RecoveryResult {
                    plan,
                    order_result: Some(leg),
                    success: true,
                    message: "recovery order executed".to_string(),
                };
            }

            plan.retry_count += 1;
            self.stats.retries.fetch_add(1, Ordering::Relaxed);
            warn!(
                action = %plan.action,
                venue = %order.venue,
                attempt = plan.retry_count,
                error = ?leg.error_message(),
                "recovery attempt failed"
            );
            if plan.can_retry() {
                tokio::time::sleep(plan.retry_delay).await;
            }
        }

        self.stats.failures.fetch_add(1, Ordering::Relaxed);
        let message = format!("recovery failed after {} attempts", plan.max_retries);
        plan.order = Some(order);
        RecoveryResult {
            plan,
            order_result: None,
            success: false,
            message,
        }
    }

    async fn place(&self, order: &OrderRequest) -> LegResult {
        let Some(client) = self.clients.get(&order.venue) else {
            return LegResult::error(
                order.venue,
                Error::invalid_request(format!("venue not configured: {}", order.venue)),
            );
        };
        let started_at = Instant::now();
        let outcome = client.place_order(order).await;
        let finished_at = Instant::now();
        LegResult {
            venue: order.venue,
            outcome,
            started_at,
            finished_at,
            latency: finished_at.duration_since(started_at),
        }
    }
}

// =============================================================================
// Async recovery queue
// =============================================================================

type RecoveryCallback = Box<dyn Fn(&RecoveryResult) + Send + Sync>;

/// Bounded queue with a dedicated worker for post-hoc recovery, used when
/// the executor should not block on the corrective order.
pub struct RecoveryQueue {
    tx: mpsc::Sender<RecoveryPlan>,
    worker: tokio::task::JoinHandle<()>,
}

impl RecoveryQueue {
    #[must_use]
    pub fn spawn(
        manager: Arc<RecoveryManager>,
        capacity: usize,
        callback: Option<RecoveryCallback>,
    ) -> Self {
        let (tx, mut rx) = mpsc::channel::<RecoveryPlan>(capacity);
        let worker = tokio::spawn(async move {
            while let Some(plan) = rx.recv().await {
                let result = manager.execute(plan).await;
                if let Some(cb) = &callback {
                    cb(&result);
                }
            }
        });
        Self { tx, worker }
    }

    /// Enqueues a plan; fails when the queue is full or shut down.
    pub fn enqueue(&self, plan: RecoveryPlan) -> kimp_core::Result<()> {
        self.tx
            .try_send(plan)
            .map_err(|e| Error::InvalidState(format!("recovery queue: {e}")))
    }

    /// Stops accepting plans and waits for in-flight recoveries.
    pub async fn shutdown(self) {
        drop(self.tx);
        let _ = self.worker.await;
    }
}
