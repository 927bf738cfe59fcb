//! Dual-order execution with recovery and inter-venue transfers.
//!
//! [`DualOrderExecutor`] dispatches the two legs of an arbitrage trade in
//! parallel, one venue each, with per-leg RTT compensation and timeouts.
//! When exactly one leg fills, [`RecoveryManager`] classifies the outcome
//! and issues a bounded-retry corrective market order. [`TransferManager`]
//! moves coin inventory between venues to rebalance.
//!
//! Venue REST clients live in [`rest`]; both authentication styles the
//! venues use (JWT-per-request and signed query strings) are built from
//! the primitives in [`signing`].

pub mod client;
pub mod dual;
pub mod recovery;
pub mod rest;
pub mod signing;
pub mod transfer;
pub mod types;

pub use client::{MockOrderClient, OrderClient};
pub use dual::DualOrderExecutor;
pub use recovery::{RecoveryAction, RecoveryManager, RecoveryPlan, RecoveryQueue, RecoveryResult};
pub use rest::{BinanceClient, UpbitClient};
pub use transfer::{TransferManager, TransferRequest, TransferResult, TransferStatus, WithdrawAddress};
pub use types::{DualOrderRequest, DualOrderResult, ExecutorStats, LegResult};
