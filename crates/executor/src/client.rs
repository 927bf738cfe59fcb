//! The per-venue order client seam.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use kimp_core::{Balance, Error, OrderRequest, OrderResult, Result, Venue};

use crate::transfer::{TransferRequest, TransferStatus};

/// Everything the executor and transfer manager need from a venue.
///
/// Implementations are internally synchronized: the two legs of a dual
/// order call `place_order` concurrently.
#[async_trait]
pub trait OrderClient: Send + Sync {
    fn venue(&self) -> Venue;

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<OrderResult>;

    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<OrderResult>;

    async fn get_balance(&self, currency: &str) -> Result<Balance>;

    /// Submits a withdraw and returns the venue-issued transfer id.
    async fn withdraw(&self, request: &TransferRequest) -> Result<String>;

    async fn withdraw_status(&self, transfer_id: &str) -> Result<TransferStatus>;

    /// Blockchain tx hash once the venue exposes it.
    async fn withdraw_tx_hash(&self, transfer_id: &str) -> Result<Option<String>>;

    /// True once `tx_hash` has landed on this venue's deposit history.
    async fn confirm_deposit(&self, tx_hash: &str) -> Result<bool>;
}

// =============================================================================
// Mock client
// =============================================================================

/// Deterministic in-memory client for tests and rehearsals.
pub struct MockOrderClient {
    venue: Venue,
    latency: Duration,
    fill_price: f64,
    failing: AtomicBool,
    orders_placed: AtomicU64,
    withdraws_requested: AtomicU64,
    withdraw_polls: AtomicU64,
    /// Polls of `withdraw_status` before it reports `Completed`.
    complete_after_polls: u64,
}

impl MockOrderClient {
    #[must_use]
    pub fn new(venue: Venue) -> Self {
        Self {
            venue,
            latency: Duration::ZERO,
            fill_price: 0.0,
            failing: AtomicBool::new(false),
            orders_placed: AtomicU64::new(0),
            withdraws_requested: AtomicU64::new(0),
            withdraw_polls: AtomicU64::new(0),
            complete_after_polls: 1,
        }
    }

    /// Simulated venue round-trip time.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Price every order fills at (falls back to the request's limit).
    #[must_use]
    pub fn with_fill_price(mut self, price: f64) -> Self {
        self.fill_price = price;
        self
    }

    #[must_use]
    pub fn with_complete_after_polls(mut self, polls: u64) -> Self {
        self.complete_after_polls = polls;
        self
    }

    /// Starts in the failing state.
    #[must_use]
    pub fn failing(self) -> Self {
        self.set_failing(true);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    #[must_use]
    pub fn orders_placed(&self) -> u64 {
        self.orders_placed.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn withdraws_requested(&self) -> u64 {
        self.withdraws_requested.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderClient for MockOrderClient {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.orders_placed.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Exchange(format!(
                "{}: mock order rejected",
                self.venue
            )));
        }
        let price = if self.fill_price > 0.0 {
            self.fill_price
        } else {
            request.price
        };
        let id = uuid::Uuid::new_v4().to_string();
        Ok(OrderResult::filled(&id, request.quantity, price))
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<OrderResult> {
        let mut result = OrderResult::pending(order_id);
        result.status = kimp_core::OrderStatus::Canceled;
        Ok(result)
    }

    async fn get_order(&self, _symbol: &str, order_id: &str) -> Result<OrderResult> {
        Ok(OrderResult::filled(order_id, 0.0, self.fill_price))
    }

    async fn get_balance(&self, currency: &str) -> Result<Balance> {
        Ok(Balance::new(currency, 1_000_000.0, 0.0))
    }

    async fn withdraw(&self, request: &TransferRequest) -> Result<String> {
        self.withdraws_requested.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Exchange(format!(
                "{}: mock withdraw rejected",
                self.venue
            )));
        }
        Ok(format!("mock-{}-{}", self.venue, request.request_id))
    }

    async fn withdraw_status(&self, _transfer_id: &str) -> Result<TransferStatus> {
        let polls = self.withdraw_polls.fetch_add(1, Ordering::SeqCst) + 1;
        if polls >= self.complete_after_polls {
            Ok(TransferStatus::Completed)
        } else {
            Ok(TransferStatus::Processing)
        }
    }

    async fn withdraw_tx_hash(&self, transfer_id: &str) -> Result<Option<String>> {
        Ok(Some(format!("0xmock{transfer_id}")))
    }

    async fn confirm_deposit(&self, _tx_hash: &str) -> Result<bool> {
        Ok(true)
    }
}
