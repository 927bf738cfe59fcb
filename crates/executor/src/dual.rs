//! Simultaneous two-leg dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use kimp_core::{Error, OrderRequest, Venue};

use crate::client::OrderClient;
use crate::recovery::{RecoveryAction, RecoveryManager, RecoveryResult};
use crate::types::{DualOrderRequest, DualOrderResult, ExecutorStats, LegResult};

/// Default per-leg timeout.
const DEFAULT_LEG_TIMEOUT: Duration = Duration::from_secs(30);

/// Dispatches both legs of a [`DualOrderRequest`] in parallel.
///
/// Each leg runs as its own task: sleep its RTT-compensation delay, place
/// the order under the leg timeout, record latency from a steady clock.
/// Validation failures never reach the network; both legs carry the error.
pub struct DualOrderExecutor {
    clients: HashMap<Venue, Arc<dyn OrderClient>>,
    recovery: Option<Arc<RecoveryManager>>,
    stats: Arc<ExecutorStats>,
    leg_timeout: Duration,
    auto_recovery: bool,
}

impl DualOrderExecutor {
    #[must_use]
    pub fn new(clients: HashMap<Venue, Arc<dyn OrderClient>>) -> Self {
        Self {
            clients,
            recovery: None,
            stats: Arc::new(ExecutorStats::new()),
            leg_timeout: DEFAULT_LEG_TIMEOUT,
            auto_recovery: false,
        }
    }

    /// Attaches a recovery manager and enables auto-recovery of partial
    /// fills.
    #[must_use]
    pub fn with_recovery(mut self, recovery: Arc<RecoveryManager>) -> Self {
        self.recovery = Some(recovery);
        self.auto_recovery = true;
        self
    }

    #[must_use]
    pub fn with_leg_timeout(mut self, timeout: Duration) -> Self {
        self.leg_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_auto_recovery(mut self, enabled: bool) -> Self {
        self.auto_recovery = enabled;
        self
    }

    #[must_use]
    pub fn stats(&self) -> &ExecutorStats {
        &self.stats
    }

    #[must_use]
    pub fn supported_venues(&self) -> Vec<Venue> {
        self.clients.keys().copied().collect()
    }

    /// Runs both legs and assembles the result. `fx_rate` is used only to
    /// derive the realized premium from the fill prices.
    pub async fn execute(&self, request: &DualOrderRequest, fx_rate: f64) -> DualOrderResult {
        let started_at = Instant::now();

        if let Err(err) = request.validate() {
            return self.rejected(request, started_at, err);
        }
        for order in [&request.buy_order, &request.sell_order] {
            if !self.clients.contains_key(&order.venue) {
                return self.rejected(
                    request,
                    started_at,
                    Error::invalid_request(format!("venue not configured: {}", order.venue)),
                );
            }
        }

        let buy_client = Arc::clone(&self.clients[&request.buy_order.venue]);
        let sell_client = Arc::clone(&self.clients[&request.sell_order.venue]);
        let timeout = self.leg_timeout;

        let buy_task = tokio::spawn(execute_leg(
            buy_client,
            request.buy_order,
            request.buy_delay,
            timeout,
        ));
        let sell_task = tokio::spawn(execute_leg(
            sell_client,
            request.sell_order,
            request.sell_delay,
            timeout,
        ));

        let (buy_join, sell_join) = tokio::join!(buy_task, sell_task);
        let buy = buy_join.unwrap_or_else(|e| {
            LegResult::error(
                request.buy_order.venue,
                Error::InvalidState(format!("buy leg task failed: {e}")),
            )
        });
        let sell = sell_join.unwrap_or_else(|e| {
            LegResult::error(
                request.sell_order.venue,
                Error::InvalidState(format!("sell leg task failed: {e}")),
            )
        });

        let mut result = DualOrderResult {
            request_id: request.request_id,
            buy,
            sell,
            started_at,
            finished_at: Instant::now(),
            actual_premium_pct: 0.0,
            recovery: None,
        };
        result.calculate_actual_premium(fx_rate);
        self.stats.record_result(&result);

        if result.both_success() {
            info!(
                request_id = result.request_id,
                premium = result.actual_premium_pct,
                latency_us = result.total_latency().as_micros() as u64,
                "dual order complete"
            );
        } else {
            warn!(
                request_id = result.request_id,
                buy_ok = result.buy.is_success(),
                sell_ok = result.sell.is_success(),
                "dual order degraded"
            );
        }

        if result.partial_fill() && self.auto_recovery {
            if let Some(recovery) = &self.recovery {
                result.recovery = Some(self.run_recovery(recovery, request, &result).await);
            }
        }

        result
    }

    async fn run_recovery(
        &self,
        recovery: &RecoveryManager,
        request: &DualOrderRequest,
        result: &DualOrderResult,
    ) -> RecoveryResult {
        let plan = recovery.create_plan(request, result);
        if plan.action == RecoveryAction::ManualIntervention {
            warn!(request_id = request.request_id, "recovery needs manual intervention");
            return recovery.execute(plan).await;
        }
        let outcome = recovery.execute(plan).await;
        self.stats.record_recovery(outcome.success);
        outcome
    }

    fn rejected(
        &self,
        request: &DualOrderRequest,
        started_at: Instant,
        err: Error,
    ) -> DualOrderResult {
        DualOrderResult {
            request_id: request.request_id,
            buy: LegResult::error(request.buy_order.venue, err.clone()),
            sell: LegResult::error(request.sell_order.venue, err),
            started_at,
            finished_at: Instant::now(),
            actual_premium_pct: 0.0,
            recovery: None,
        }
    }
}

/// One leg: RTT delay, then the order under a deadline.
async fn execute_leg(
    client: Arc<dyn OrderClient>,
    order: OrderRequest,
    delay: Duration,
    timeout: Duration,
) -> LegResult {
    let started_at = Instant::now();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    let submit_at = Instant::now();
    let outcome = match tokio::time::timeout(timeout, client.place_order(&order)).await {
        Ok(outcome) => outcome,
        Err(_) => Err(Error::ConnectionTimeout),
    };
    let finished_at = Instant::now();
    LegResult {
        venue: order.venue,
        outcome,
        started_at,
        finished_at,
        latency: finished_at.duration_since(submit_at),
    }
}
