//! Binance REST client: signed-querystring authentication.
//!
//! Every signed call appends `timestamp` to the query, signs the whole
//! string with HMAC-SHA256, appends the `signature` parameter, and sends
//! the API key in the `X-MBX-APIKEY` header.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use kimp_core::{
    Balance, Error, InlineStr, OrderRequest, OrderResult, OrderSide, OrderStatus, OrderType,
    Result, Venue,
};
use kimp_primitives::{ApiKind, RateLimitManager};

use crate::client::OrderClient;
use crate::rest::api_error;
use crate::signing;
use crate::transfer::{TransferRequest, TransferStatus};

const DEFAULT_BASE_URL: &str = "https://api.binance.com";
const RECV_WINDOW_MS: u64 = 5_000;

pub struct BinanceClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    secret_key: String,
    limits: Option<Arc<RateLimitManager>>,
}

impl BinanceClient {
    #[must_use]
    pub fn new(api_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            limits: None,
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_rate_limits(mut self, limits: Arc<RateLimitManager>) -> Self {
        self.limits = Some(limits);
        self
    }

    async fn throttle(&self, kind: ApiKind) {
        if let Some(limits) = &self.limits {
            while !limits.try_acquire(Venue::BinanceUsdt, kind, 1) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }

    /// Appends the timestamp and the HMAC signature to a query.
    fn sign(&self, mut params: Vec<(&'static str, String)>) -> String {
        params.push(("recvWindow", RECV_WINDOW_MS.to_string()));
        params.push(("timestamp", signing::now_ms().to_string()));
        let query = signing::query_string(&params);
        let signature = signing::hmac_sha256_hex(&self.secret_key, &query);
        format!("{query}&signature={signature}")
    }

    async fn request(&self, method: reqwest::Method, path: &str, signed_query: &str) -> Result<String> {
        let url = format!("{}{path}?{signed_query}", self.base_url);
        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| Error::network(e.to_string()))?;
        if (200..300).contains(&status) {
            Ok(body)
        } else {
            Err(api_error(status, body))
        }
    }

    fn order_params(request: &OrderRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", request.symbol.as_str().to_string()),
            (
                "side",
                match request.side {
                    OrderSide::Buy => "BUY".to_string(),
                    OrderSide::Sell => "SELL".to_string(),
                },
            ),
        ];
        match request.order_type {
            OrderType::Limit => {
                params.push(("type", "LIMIT".to_string()));
                params.push(("timeInForce", "GTC".to_string()));
                params.push(("quantity", format!("{}", request.quantity)));
                params.push(("price", format!("{}", request.price)));
            }
            OrderType::Market => {
                params.push(("type", "MARKET".to_string()));
                params.push(("quantity", format!("{}", request.quantity)));
            }
        }
        if !request.client_id.is_empty() {
            params.push(("newClientOrderId", request.client_id.as_str().to_string()));
        }
        params
    }
}

#[derive(Deserialize)]
struct RawOrder {
    #[serde(rename = "orderId")]
    order_id: i64,
    #[serde(default)]
    status: String,
    #[serde(default, rename = "executedQty")]
    executed_qty: Option<String>,
    #[serde(default, rename = "cummulativeQuoteQty")]
    cummulative_quote_qty: Option<String>,
}

fn parse_num(s: &Option<String>) -> f64 {
    s.as_deref()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn map_status(status: &str) -> OrderStatus {
    match status {
        "NEW" => OrderStatus::Open,
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "PENDING_CANCEL" => OrderStatus::Canceled,
        "REJECTED" | "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Failed,
        _ => OrderStatus::Pending,
    }
}

fn order_from_raw(raw: &RawOrder) -> OrderResult {
    let executed = parse_num(&raw.executed_qty);
    let quote = parse_num(&raw.cummulative_quote_qty);
    OrderResult {
        order_id: InlineStr::new(&raw.order_id.to_string()),
        status: map_status(&raw.status),
        filled_qty: executed,
        avg_price: if executed > 0.0 { quote / executed } else { 0.0 },
        commission: 0.0,
        timestamp_us: signing::now_us(),
        message: InlineStr::empty(),
    }
}

#[derive(Deserialize)]
struct RawBalanceEntry {
    asset: String,
    free: String,
    locked: String,
}

#[derive(Deserialize)]
struct RawAccount {
    balances: Vec<RawBalanceEntry>,
}

#[derive(Deserialize)]
struct RawWithdrawApply {
    id: String,
}

#[derive(Deserialize)]
struct RawWithdrawRecord {
    id: String,
    /// 0 email sent, 1 cancelled, 2 awaiting approval, 3 rejected,
    /// 4 processing, 5 failure, 6 completed.
    status: i64,
    #[serde(default, rename = "txId")]
    tx_id: Option<String>,
}

fn map_withdraw_status(status: i64) -> TransferStatus {
    match status {
        0 | 2 => TransferStatus::Pending,
        4 => TransferStatus::Processing,
        6 => TransferStatus::Completed,
        1 => TransferStatus::Cancelled,
        _ => TransferStatus::Failed,
    }
}

#[derive(Deserialize)]
struct RawDepositRecord {
    #[serde(default, rename = "txId")]
    tx_id: Option<String>,
    /// 0 pending, 6 credited but cannot withdraw, 1 success.
    status: i64,
}

#[async_trait]
impl OrderClient for BinanceClient {
    fn venue(&self) -> Venue {
        Venue::BinanceUsdt
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        self.throttle(ApiKind::Order).await;
        let signed = self.sign(Self::order_params(request));
        debug!(symbol = %request.symbol, "binance order");
        let body = self
            .request(reqwest::Method::POST, "/api/v3/order", &signed)
            .await?;
        let raw: RawOrder =
            serde_json::from_str(&body).map_err(|e| Error::parse(format!("binance order: {e}")))?;
        Ok(order_from_raw(&raw))
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<OrderResult> {
        self.throttle(ApiKind::Order).await;
        let signed = self.sign(vec![
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ]);
        let body = self
            .request(reqwest::Method::DELETE, "/api/v3/order", &signed)
            .await?;
        let raw: RawOrder = serde_json::from_str(&body)
            .map_err(|e| Error::parse(format!("binance cancel: {e}")))?;
        Ok(order_from_raw(&raw))
    }

    async fn get_order(&self, symbol: &str, order_id: &str) -> Result<OrderResult> {
        self.throttle(ApiKind::Query).await;
        let signed = self.sign(vec![
            ("symbol", symbol.to_string()),
            ("orderId", order_id.to_string()),
        ]);
        let body = self
            .request(reqwest::Method::GET, "/api/v3/order", &signed)
            .await?;
        let raw: RawOrder =
            serde_json::from_str(&body).map_err(|e| Error::parse(format!("binance order: {e}")))?;
        Ok(order_from_raw(&raw))
    }

    async fn get_balance(&self, currency: &str) -> Result<Balance> {
        self.throttle(ApiKind::Query).await;
        let signed = self.sign(Vec::new());
        let body = self
            .request(reqwest::Method::GET, "/api/v3/account", &signed)
            .await?;
        let account: RawAccount = serde_json::from_str(&body)
            .map_err(|e| Error::parse(format!("binance account: {e}")))?;
        account
            .balances
            .iter()
            .find(|b| b.asset == currency)
            .map(|b| {
                Balance::new(
                    currency,
                    b.free.parse().unwrap_or(0.0),
                    b.locked.parse().unwrap_or(0.0),
                )
            })
            .ok_or_else(|| Error::InsufficientBalance(format!("no {currency} balance")))
    }

    async fn withdraw(&self, request: &TransferRequest) -> Result<String> {
        self.throttle(ApiKind::Order).await;
        let mut params = vec![
            ("coin", request.coin.clone()),
            ("network", request.address.network.clone()),
            ("address", request.address.address.clone()),
            ("amount", format!("{}", request.amount)),
        ];
        if let Some(tag) = &request.address.destination_tag {
            params.push(("addressTag", tag.clone()));
        }
        let signed = self.sign(params);
        let body = self
            .request(reqwest::Method::POST, "/sapi/v1/capital/withdraw/apply", &signed)
            .await?;
        let raw: RawWithdrawApply = serde_json::from_str(&body)
            .map_err(|e| Error::parse(format!("binance withdraw: {e}")))?;
        Ok(raw.id)
    }

    async fn withdraw_status(&self, transfer_id: &str) -> Result<TransferStatus> {
        Ok(self
            .withdraw_record(transfer_id)
            .await?
            .map_or(TransferStatus::Pending, |r| map_withdraw_status(r.status)))
    }

    async fn withdraw_tx_hash(&self, transfer_id: &str) -> Result<Option<String>> {
        Ok(self
            .withdraw_record(transfer_id)
            .await?
            .and_then(|r| r.tx_id))
    }

    async fn confirm_deposit(&self, tx_hash: &str) -> Result<bool> {
        self.throttle(ApiKind::Query).await;
        let signed = self.sign(Vec::new());
        let body = self
            .request(reqwest::Method::GET, "/sapi/v1/capital/deposit/hisrec", &signed)
            .await?;
        let records: Vec<RawDepositRecord> = serde_json::from_str(&body)
            .map_err(|e| Error::parse(format!("binance deposits: {e}")))?;
        Ok(records
            .iter()
            .any(|r| r.tx_id.as_deref() == Some(tx_hash) && r.status == 1))
    }
}

impl BinanceClient {
    async fn withdraw_record(&self, transfer_id: &str) -> Result<Option<RawWithdrawRecord>> {
        self.throttle(ApiKind::Query).await;
        let signed = self.sign(Vec::new());
        let body = self
            .request(
                reqwest::Method::GET,
                "/sapi/v1/capital/withdraw/history",
                &signed,
            )
            .await?;
        let records: Vec<RawWithdrawRecord> = serde_json::from_str(&body)
            .map_err(|e| Error::parse(format!("binance withdraws: {e}")))?;
        Ok(records.into_iter().find(|r| r.id == transfer_id))
    }
}
