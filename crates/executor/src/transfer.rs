//! Inter-venue coin transfers.
//!
//! Withdraw on the source venue, poll until the venue reports a terminal
//! state or the deadline passes, then pick up the blockchain tx hash and
//! optionally confirm the deposit on the destination venue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{info, warn};

use kimp_core::{fees, time::now_us, Error, Result, Venue};

use crate::client::OrderClient;

/// Transfer lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Withdraw submitted, not yet picked up by the venue.
    Pending,
    /// On-chain processing.
    Processing,
    Completed,
    Failed,
    /// Deadline elapsed while still pending/processing.
    Timeout,
    Cancelled,
}

impl TransferStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TransferStatus::Pending => "Pending",
            TransferStatus::Processing => "Processing",
            TransferStatus::Completed => "Completed",
            TransferStatus::Failed => "Failed",
            TransferStatus::Timeout => "Timeout",
            TransferStatus::Cancelled => "Cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, TransferStatus::Pending | TransferStatus::Processing)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deposit address on some venue.
#[derive(Debug, Clone)]
pub struct WithdrawAddress {
    pub venue: Venue,
    pub address: String,
    /// Required for XRP: shared venue wallets route on the tag, and an
    /// untagged transfer strands the funds.
    pub destination_tag: Option<String>,
    pub network: String,
    pub whitelisted: bool,
}

impl WithdrawAddress {
    #[must_use]
    pub fn new(venue: Venue, address: impl Into<String>) -> Self {
        Self {
            venue,
            address: address.into(),
            destination_tag: None,
            network: "XRP".to_string(),
            whitelisted: false,
        }
    }

    #[must_use]
    pub fn with_destination_tag(mut self, tag: impl Into<String>) -> Self {
        self.destination_tag = Some(tag.into());
        self
    }

    #[must_use]
    pub fn has_destination_tag(&self) -> bool {
        self.destination_tag.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// A request to move coin between venues.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub from: Venue,
    pub to: Venue,
    pub coin: String,
    pub amount: f64,
    pub address: WithdrawAddress,
    pub request_id: i64,
}

impl TransferRequest {
    #[must_use]
    pub fn new(from: Venue, to: Venue, coin: &str, amount: f64, address: WithdrawAddress) -> Self {
        Self {
            from,
            to,
            coin: coin.to_string(),
            amount,
            address,
            request_id: now_us(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.from == self.to {
            return Err(Error::invalid_request("source and destination venues match"));
        }
        if self.amount <= 0.0 {
            return Err(Error::invalid_request("non-positive transfer amount"));
        }
        let min = fees::min_withdraw(self.from, &self.coin);
        if self.amount < min {
            return Err(Error::invalid_request(format!(
                "amount {} below the {} {} minimum on {}",
                self.amount, min, self.coin, self.from
            )));
        }
        if self.address.address.is_empty() {
            return Err(Error::invalid_request("empty destination address"));
        }
        if self.coin == "XRP" && !self.address.has_destination_tag() {
            return Err(Error::invalid_request(
                "XRP transfer requires a destination tag",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Final state of one transfer.
#[derive(Debug, Clone)]
pub struct TransferResult {
    /// Venue-issued withdraw id.
    pub transfer_id: String,
    pub tx_hash: Option<String>,
    pub status: TransferStatus,
    pub amount: f64,
    /// Withdraw fee, coin units.
    pub fee: f64,
    pub elapsed: Duration,
    pub error: Option<String>,
}

impl TransferResult {
    fn failed(amount: f64, message: String, elapsed: Duration) -> Self {
        Self {
            transfer_id: String::new(),
            tx_hash: None,
            status: TransferStatus::Failed,
            amount,
            fee: 0.0,
            elapsed,
            error: Some(message),
        }
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TransferStatus::Completed
    }
}

/// Transfer counters.
#[derive(Debug, Default)]
pub struct TransferStats {
    pub total: AtomicU64,
    pub successful: AtomicU64,
    pub failed: AtomicU64,
    pub timeouts: AtomicU64,
    pub total_elapsed_us: AtomicI64,
}

impl TransferStats {
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let total = self.total.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.successful.load(Ordering::Relaxed) as f64 / total as f64 * 100.0
    }
}

type StatusCallback = Box<dyn Fn(&str, TransferStatus) + Send + Sync>;

/// Drives the withdraw/poll/confirm state machine.
pub struct TransferManager {
    clients: HashMap<Venue, Arc<dyn OrderClient>>,
    deposit_addresses: RwLock<HashMap<Venue, WithdrawAddress>>,
    poll_interval: Duration,
    default_timeout: Duration,
    dry_run: bool,
    status_callback: RwLock<Option<StatusCallback>>,
    stats: TransferStats,
}

impl TransferManager {
    #[must_use]
    pub fn new(clients: HashMap<Venue, Arc<dyn OrderClient>>) -> Self {
        Self {
            clients,
            deposit_addresses: RwLock::new(HashMap::new()),
            poll_interval: Duration::from_secs(10),
            default_timeout: Duration::from_secs(30 * 60),
            dry_run: false,
            status_callback: RwLock::new(None),
            stats: TransferStats::default(),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn on_status_change(&self, cb: impl Fn(&str, TransferStatus) + Send + Sync + 'static) {
        *self.status_callback.write() = Some(Box::new(cb));
    }

    #[must_use]
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn register_deposit_address(&self, address: WithdrawAddress) {
        self.deposit_addresses.write().insert(address.venue, address);
    }

    #[must_use]
    pub fn deposit_address(&self, venue: Venue) -> Option<WithdrawAddress> {
        self.deposit_addresses.read().get(&venue).cloned()
    }

    #[must_use]
    pub fn is_whitelisted(&self, to: Venue) -> bool {
        self.deposit_addresses
            .read()
            .get(&to)
            .is_some_and(|a| a.whitelisted)
    }

    fn notify(&self, transfer_id: &str, status: TransferStatus) {
        if let Some(cb) = self.status_callback.read().as_ref() {
            cb(transfer_id, status);
        }
    }

    /// Runs the full transfer: validate, withdraw, poll to terminal state,
    /// pick up the tx hash, confirm the deposit when possible.
    ///
    /// Invalid requests fail before any API call; all failures are folded
    /// into the returned result rather than bubbling as errors.
    pub async fn initiate(&self, request: &TransferRequest) -> TransferResult {
        let started = Instant::now();
        self.stats.total.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = request.validate() {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return TransferResult::failed(request.amount, err.to_string(), started.elapsed());
        }

        let Some(client) = self.clients.get(&request.from) else {
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return TransferResult::failed(
                request.amount,
                format!("withdraw venue not configured: {}", request.from),
                started.elapsed(),
            );
        };

        if self.dry_run {
            self.stats.successful.fetch_add(1, Ordering::Relaxed);
            let transfer_id = format!("DRY-{}-{}", request.from, request.request_id);
            self.notify(&transfer_id, TransferStatus::Completed);
            return TransferResult {
                transfer_id,
                tx_hash: Some(format!("0xdry{:x}", request.request_id)),
                status: TransferStatus::Completed,
                amount: request.amount,
                fee: fees::withdraw_fee(request.from, &request.coin),
                elapsed: started.elapsed(),
                error: None,
            };
        }

        let transfer_id = match client.withdraw(request).await {
            Ok(id) => id,
            Err(err) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                return TransferResult::failed(request.amount, err.to_string(), started.elapsed());
            }
        };
        info!(
            from = %request.from,
            to = %request.to,
            coin = %request.coin,
            amount = request.amount,
            transfer_id = %transfer_id,
            "withdraw submitted"
        );
        self.notify(&transfer_id, TransferStatus::Pending);

        let mut result = TransferResult {
            transfer_id: transfer_id.clone(),
            tx_hash: None,
            status: TransferStatus::Pending,
            amount: request.amount,
            fee: fees::withdraw_fee(request.from, &request.coin),
            elapsed: Duration::ZERO,
            error: None,
        };

        let deadline = started + self.default_timeout;
        loop {
            tokio::time::sleep(self.poll_interval).await;

            match client.withdraw_status(&transfer_id).await {
                Ok(status) => {
                    if status != result.status {
                        self.notify(&transfer_id, status);
                        result.status = status;
                    }
                    if status.is_terminal() {
                        break;
                    }
                }
                Err(err) => warn!(%transfer_id, %err, "withdraw status poll failed"),
            }

            if Instant::now() >= deadline {
                result.status = TransferStatus::Timeout;
                result.error = Some("transfer did not complete before the deadline".to_string());
                self.notify(&transfer_id, TransferStatus::Timeout);
                break;
            }
        }

        if result.status == TransferStatus::Completed {
            match client.withdraw_tx_hash(&transfer_id).await {
                Ok(hash) => result.tx_hash = hash,
                Err(err) => warn!(%transfer_id, %err, "tx hash lookup failed"),
            }
            if let (Some(hash), Some(dest)) = (&result.tx_hash, self.clients.get(&request.to)) {
                match dest.confirm_deposit(hash).await {
                    Ok(confirmed) => {
                        info!(%transfer_id, confirmed, "deposit check on destination")
                    }
                    Err(err) => warn!(%transfer_id, %err, "deposit check failed"),
                }
            }
        }

        result.elapsed = started.elapsed();
        match result.status {
            TransferStatus::Completed => {
                self.stats.successful.fetch_add(1, Ordering::Relaxed);
                self.stats
                    .total_elapsed_us
                    .fetch_add(result.elapsed.as_micros() as i64, Ordering::Relaxed);
            }
            TransferStatus::Timeout => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockOrderClient;
    use std::sync::atomic::AtomicUsize;

    fn clients() -> HashMap<Venue, Arc<dyn OrderClient>> {
        let mut map: HashMap<Venue, Arc<dyn OrderClient>> = HashMap::new();
        map.insert(
            Venue::BinanceUsdt,
            Arc::new(MockOrderClient::new(Venue::BinanceUsdt)) as Arc<dyn OrderClient>,
        );
        map.insert(
            Venue::UpbitKrw,
            Arc::new(MockOrderClient::new(Venue::UpbitKrw)) as Arc<dyn OrderClient>,
        );
        map
    }

    fn tagged_address() -> WithdrawAddress {
        WithdrawAddress::new(Venue::UpbitKrw, "rUpbitDepositWallet").with_destination_tag("12345")
    }

    fn manager() -> TransferManager {
        TransferManager::new(clients()).with_poll_interval(Duration::from_millis(1))
    }

    #[test]
    fn test_xrp_without_tag_is_invalid() {
        let req = TransferRequest::new(
            Venue::BinanceUsdt,
            Venue::UpbitKrw,
            "XRP",
            100.0,
            WithdrawAddress::new(Venue::UpbitKrw, "rUpbitDepositWallet"),
        );
        assert!(!req.is_valid());

        let tagged = TransferRequest::new(
            Venue::BinanceUsdt,
            Venue::UpbitKrw,
            "XRP",
            100.0,
            tagged_address(),
        );
        assert!(tagged.is_valid());
    }

    #[test]
    fn test_same_venue_rejected() {
        let req = TransferRequest::new(
            Venue::BinanceUsdt,
            Venue::BinanceUsdt,
            "XRP",
            100.0,
            tagged_address(),
        );
        assert!(!req.is_valid());
    }

    #[tokio::test]
    async fn test_below_minimum_fails_before_any_api_call() {
        // 5 XRP from Binance: below the 20 XRP minimum.
        let mock = Arc::new(MockOrderClient::new(Venue::BinanceUsdt));
        let mut map: HashMap<Venue, Arc<dyn OrderClient>> = HashMap::new();
        map.insert(Venue::BinanceUsdt, Arc::clone(&mock) as Arc<dyn OrderClient>);
        let manager = TransferManager::new(map).with_poll_interval(Duration::from_millis(1));

        let req = TransferRequest::new(
            Venue::BinanceUsdt,
            Venue::UpbitKrw,
            "XRP",
            5.0,
            tagged_address(),
        );
        let result = manager.initiate(&req).await;
        assert_eq!(result.status, TransferStatus::Failed);
        let message = result.error.unwrap();
        assert!(message.contains("below the 20 XRP minimum"), "{message}");
        assert_eq!(mock.withdraws_requested(), 0);
        assert_eq!(manager.stats().failed.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_transfer_completes_with_tx_hash() {
        let manager = manager();
        let transitions = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let transitions_cb = Arc::clone(&transitions);
        manager.on_status_change(move |_, status| {
            transitions_cb.lock().push(status);
        });

        let req = TransferRequest::new(
            Venue::BinanceUsdt,
            Venue::UpbitKrw,
            "XRP",
            100.0,
            tagged_address(),
        );
        let result = manager.initiate(&req).await;
        assert!(result.is_completed());
        assert!(result.tx_hash.is_some());
        assert_eq!(result.fee, 0.25);
        assert_eq!(manager.stats().successful.load(Ordering::Relaxed), 1);

        let seen = transitions.lock().clone();
        assert_eq!(seen.first(), Some(&TransferStatus::Pending));
        assert_eq!(seen.last(), Some(&TransferStatus::Completed));
    }

    #[tokio::test]
    async fn test_transfer_times_out() {
        let mock = Arc::new(
            MockOrderClient::new(Venue::BinanceUsdt).with_complete_after_polls(u64::MAX),
        );
        let mut map: HashMap<Venue, Arc<dyn OrderClient>> = HashMap::new();
        map.insert(Venue::BinanceUsdt, Arc::clone(&mock) as Arc<dyn OrderClient>);
        let manager = TransferManager::new(map)
            .with_poll_interval(Duration::from_millis(1))
            .with_timeout(Duration::from_millis(20));

        let req = TransferRequest::new(
            Venue::BinanceUsdt,
            Venue::UpbitKrw,
            "XRP",
            100.0,
            tagged_address(),
        );
        let result = manager.initiate(&req).await;
        assert_eq!(result.status, TransferStatus::Timeout);
        assert_eq!(manager.stats().timeouts.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_dry_run_is_synthetic() {
        let mock = Arc::new(MockOrderClient::new(Venue::BinanceUsdt));
        let mut map: HashMap<Venue, Arc<dyn OrderClient>> = HashMap::new();
        map.insert(Venue::BinanceUsdt, Arc::clone(&mock) as Arc<dyn OrderClient>);
        let manager = TransferManager::new(map).with_dry_run(true);

        let req = TransferRequest::new(
            Venue::BinanceUsdt,
            Venue::UpbitKrw,
            "XRP",
            100.0,
            tagged_address(),
        );
        let result = manager.initiate(&req).await;
        assert!(result.is_completed());
        assert!(result.transfer_id.starts_with("DRY-binance-"));
        assert_eq!(mock.withdraws_requested(), 0);
    }

    #[test]
    fn test_deposit_address_registry() {
        let manager = manager();
        assert!(manager.deposit_address(Venue::UpbitKrw).is_none());
        let mut addr = tagged_address();
        addr.whitelisted = true;
        manager.register_deposit_address(addr);
        assert!(manager.deposit_address(Venue::UpbitKrw).is_some());
        assert!(manager.is_whitelisted(Venue::UpbitKrw));
        assert!(!manager.is_whitelisted(Venue::BinanceUsdt));
    }

    #[tokio::test]
    async fn test_status_counter_usage() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter_cb = Arc::clone(&counter);
        let manager = manager();
        manager.on_status_change(move |_, _| {
            counter_cb.fetch_add(1, Ordering::SeqCst);
        });
        let req = TransferRequest::new(
            Venue::BinanceUsdt,
            Venue::UpbitKrw,
            "XRP",
            100.0,
            tagged_address(),
        );
        manager.initiate(&req).await;
        assert!(counter.load(Ordering::SeqCst) >= 2);
    }
}
