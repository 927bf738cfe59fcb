//! Upbit REST client: JWT-per-request authentication.
//!
//! Every call carries `Authorization: Bearer <jwt>` where the JWT claims
//! hold the access key, a UUID nonce, a millisecond timestamp, and (when
//! the request has parameters) a SHA-512 hash of the query string.

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

const DEFAULT_BASE_URL: &str = "https://api.upbit.com";

pub struct UpbitClient {
    http: reqwest::Client,
    base_url: String,
    access_key: String,
    secret_key: String,
    limits: Option<Arc<RateLimitManager>>,
}

impl UpbitClient {
    #[must_use]
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            access_key: access_key.into(),
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

    /// Waits for an API token without blocking the runtime.
    async fn throttle(&self, kind: ApiKind) {
        if let Some(limits) = &self.limits {
            while !limits.try_acquire(Venue::UpbitKrw, kind, 1) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }

    fn bearer(&self, query: &str) -> String {
        let mut claims = serde_json::json!({
            "access_key": self.access_key,
            "nonce": signing::uuid_v4(),
            "timestamp": signing::now_ms(),
        });
        if !query.is_empty() {
            claims["query_hash"] = serde_json::Value::from(signing::sha512_hex(query));
            claims["query_hash_alg"] = serde_json::Value::from("SHA512");
        }
        format!("Bearer {}", signing::jwt_hs256(&claims, &self.secret_key))
    }

    async fn get(&self, path: &str, query: &str) -> Result<String> {
        let url = if query.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{query}", self.base_url)
        };
        let response = self
            .http
            .get(&url)
            .header("Authorization", self.bearer(query))
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;
        Self::read_body(response).await
    }

    async fn post_form(&self, path: &str, query: &str) -> Result<String> {
        let response = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header("Authorization", self.bearer(query))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(query.to_string())
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;
        Self::read_body(response).await
    }

    async fn delete(&self, path: &str, query: &str) -> Result<String> {
        let response = self
            .http
            .delete(format!("{}{path}?{query}", self.base_url))
            .header("Authorization", self.bearer(query))
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?;
        Self::read_body(response).await
    }

    async fn read_body(response: reqwest::Response) -> Result<String> {
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

    /// `XRP` -> `KRW-XRP`; market codes pass through unchanged.
    fn market_code(symbol: &str) -> String {
        if symbol.contains('-') {
            symbol.to_string()
        } else {
            format!("KRW-{symbol}")
        }
    }

    fn order_params(request: &OrderRequest) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("market", Self::market_code(request.symbol.as_str())),
            (
                "side",
                match request.side {
                    OrderSide::Buy => "bid".to_string(),
                    OrderSide::Sell => "ask".to_string(),
                },
            ),
        ];
        match request.order_type {
            OrderType::Limit => {
                params.push(("ord_type", "limit".to_string()));
                params.push(("price", format!("{}", request.price)));
                params.push(("volume", format!("{}", request.quantity)));
            }
            OrderType::Market => {
                // Market buys spend a KRW notional; market sells a volume.
                if request.side == OrderSide::Buy && request.price > 0.0 {
                    params.push(("ord_type", "price".to_string()));
                    params.push(("price", format!("{}", request.price * request.quantity)));
                } else {
                    params.push(("ord_type", "market".to_string()));
                    params.push(("volume", format!("{}", request.quantity)));
                }
            }
        }
        if !request.client_id.is_empty() {
            params.push(("identifier", request.client_id.as_str().to_string()));
        }
        params
    }
}

#[derive(Deserialize)]
struct RawOrder {
    uuid: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    executed_volume: Option<String>,
    #[serde(default)]
    paid_fee: Option<String>,
    #[serde(default)]
    avg_price: Option<String>,
}

fn parse_num(s: &Option<String>) -> f64 {
    s.as_deref()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

fn map_state(state: &str, executed: f64) -> OrderStatus {
    match state {
        "wait" | "watch" if executed > 0.0 => OrderStatus::PartiallyFilled,
        "wait" | "watch" => OrderStatus::Open,
        "done" => OrderStatus::Filled,
        "cancel" => OrderStatus::Canceled,
        "" => OrderStatus::Pending,
        _ => OrderStatus::Failed,
    }
}

fn order_from_raw(raw: &RawOrder) -> OrderResult {
    let executed = parse_num(&raw.executed_volume);
    OrderResult {
        order_id: InlineStr::new(&raw.uuid),
        status: map_state(&raw.state, executed),
        filled_qty: executed,
        avg_price: parse_num(&raw.avg_price),
        commission: parse_num(&raw.paid_fee),
        timestamp_us: signing::now_us(),
        message: InlineStr::empty(),
    }
}

#[derive(Deserialize)]
struct RawAccount {
    currency: String,
    balance: String,
    locked: String,
}

#[derive(Deserialize)]
struct RawWithdraw {
    uuid: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    txid: Option<String>,
}

fn map_withdraw_state(state: &str) -> TransferStatus {
    match state {
        "submitting" | "submitted" | "almost_accepted" | "accepted" => TransferStatus::Pending,
        "processing" => TransferStatus::Processing,
        "done" => TransferStatus::Completed,
        "canceled" => TransferStatus::Cancelled,
        _ => TransferStatus::Failed,
    }
}

#[async_trait]
impl OrderClient for UpbitClient {
    fn venue(&self) -> Venue {
        Venue::UpbitKrw
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        self.throttle(ApiKind::Order).await;
        let query = signing::query_string(&Self::order_params(request));
        debug!(%query, "upbit order");
        let body = self.post_form("/v1/orders", &query).await?;
        let raw: RawOrder =
            serde_json::from_str(&body).map_err(|e| Error::parse(format!("upbit order: {e}")))?;
        Ok(order_from_raw(&raw))
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<OrderResult> {
        self.throttle(ApiKind::Order).await;
        let query = signing::query_string(&[("uuid", order_id.to_string())]);
        let body = self.delete("/v1/order", &query).await?;
        let raw: RawOrder =
            serde_json::from_str(&body).map_err(|e| Error::parse(format!("upbit cancel: {e}")))?;
        Ok(order_from_raw(&raw))
    }

    async fn get_order(&self, _symbol: &str, order_id: &str) -> Result<OrderResult> {
        self.throttle(ApiKind::Query).await;
        let query = signing::query_string(&[("uuid", order_id.to_string())]);
        let body = self.get("/v1/order", &query).await?;
        let raw: RawOrder =
            serde_json::from_str(&body).map_err(|e| Error::parse(format!("upbit order: {e}")))?;
        Ok(order_from_raw(&raw))
    }

    async fn get_balance(&self, currency: &str) -> Result<Balance> {
        self.throttle(ApiKind::Query).await;
        let body = self.get("/v1/accounts", "").await?;
        let accounts: Vec<RawAccount> = serde_json::from_str(&body)
            .map_err(|e| Error::parse(format!("upbit accounts: {e}")))?;
        accounts
            .iter()
            .find(|a| a.currency == currency)
            .map(|a| {
                Balance::new(
                    currency,
                    a.balance.parse().unwrap_or(0.0),
                    a.locked.parse().unwrap_or(0.0),
                )
            })
            .ok_or_else(|| Error::InsufficientBalance(format!("no {currency} account")))
    }

    async fn withdraw(&self, request: &TransferRequest) -> Result<String> {
        self.throttle(ApiKind::Order).await;
        let mut params = vec![
            ("currency", request.coin.clone()),
            ("net_type", request.address.network.clone()),
            ("amount", format!("{}", request.amount)),
            ("address", request.address.address.clone()),
        ];
        if let Some(tag) = &request.address.destination_tag {
            params.push(("secondary_address", tag.clone()));
        }
        let query = signing::query_string(&params);
        let body = self.post_form("/v1/withdraws/coin", &query).await?;
        let raw: RawWithdraw = serde_json::from_str(&body)
            .map_err(|e| Error::parse(format!("upbit withdraw: {e}")))?;
        Ok(raw.uuid)
    }

    async fn withdraw_status(&self, transfer_id: &str) -> Result<TransferStatus> {
        self.throttle(ApiKind::Query).await;
        let query = signing::query_string(&[("uuid", transfer_id.to_string())]);
        let body = self.get("/v1/withdraw", &query).await?;
        let raw: RawWithdraw = serde_json::from_str(&body)
            .map_err(|e| Error::parse(format!("upbit withdraw: {e}")))?;
        Ok(map_withdraw_state(&raw.state))
    }

    async fn withdraw_tx_hash(&self, transfer_id: &str) -> Result<Option<String>> {
        self.throttle(ApiKind::Query).await;
        let query = signing::query_string(&[("uuid", transfer_id.to_string())]);
        let body = self.get("/v1/withdraw", &query).await?;
        let raw: RawWithdraw = serde_json::from_str(&body)
            .map_err(|e| Error::parse(format!("upbit withdraw: {e}")))?;
        Ok(raw.txid)
    }

    async fn confirm_deposit(&self, tx_hash: &str) -> Result<bool> {
        self.throttle(ApiKind::Query).await;
        let query = signing::query_string(&[("txid", tx_hash.to_string())]);
        match self.get("/v1/deposit", &query).await {
            Ok(_) => Ok(true),
            Err(Error::Api { status: 404, .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn test_market_code() {
        assert_eq!(UpbitClient::market_code("XRP"), "KRW-XRP");
        assert_eq!(UpbitClient::market_code("KRW-XRP"), "KRW-XRP");
    }

    #[test]
    fn test_limit_order_params() {
        let req = OrderRequest::limit(Venue::UpbitKrw, OrderSide::Buy, "XRP", 10.0, 3100.0);
        let params = UpbitClient::order_params(&req);
        assert!(params.contains(&("market", "KRW-XRP".to_string())));
        assert!(params.contains(&("side", "bid".to_string())));
        assert!(params.contains(&("ord_type", "limit".to_string())));
        assert!(params.contains(&("volume", "10".to_string())));
    }

    #[test]
    fn test_market_sell_uses_volume() {
        let req = OrderRequest::market(Venue::UpbitKrw, OrderSide::Sell, "XRP", 25.0);
        let params = UpbitClient::order_params(&req);
        assert!(params.contains(&("side", "ask".to_string())));
        assert!(params.contains(&("ord_type", "market".to_string())));
        assert!(params.contains(&("volume", "25".to_string())));
    }

    #[test]
    fn test_order_state_mapping() {
        assert_eq!(map_state("wait", 0.0), OrderStatus::Open);
        assert_eq!(map_state("wait", 5.0), OrderStatus::PartiallyFilled);
        assert_eq!(map_state("done", 10.0), OrderStatus::Filled);
        assert_eq!(map_state("cancel", 0.0), OrderStatus::Canceled);
        assert_eq!(map_state("", 0.0), OrderStatus::Pending);
    }

    #[test]
    fn test_withdraw_state_mapping() {
        assert_eq!(map_withdraw_state("processing"), TransferStatus::Processing);
        assert_eq!(map_withdraw_state("done"), TransferStatus::Completed);
        assert_eq!(map_withdraw_state("canceled"), TransferStatus::Cancelled);
        assert_eq!(map_withdraw_state("rejected"), TransferStatus::Failed);
    }

    #[test]
    fn test_order_parse_from_response() {
        let body = r#"{"uuid":"abc-123","state":"done",
            "executed_volume":"100.0","avg_price":"3100.0","paid_fee":"155.0"}"#;
        let raw: RawOrder = serde_json::from_str(body).unwrap();
        let result = order_from_raw(&raw);
        assert_eq!(result.order_id, "abc-123");
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.filled_qty, 100.0);
        assert_eq!(result.avg_price, 3100.0);
        assert_eq!(result.commission, 155.0);
    }

    #[test]
    fn test_bearer_carries_query_hash() {
        let client = UpbitClient::new("ak", "sk");
        let token = client.bearer("market=KRW-XRP");
        let jwt = token.strip_prefix("Bearer ").unwrap();
        let payload_b64 = jwt.split('.').nth(1).unwrap();
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload_b64)
            .unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert_eq!(claims["access_key"], "ak");
        assert_eq!(claims["query_hash_alg"], "SHA512");
        assert_eq!(
            claims["query_hash"].as_str().unwrap(),
            signing::sha512_hex("market=KRW-XRP")
        );
        assert_eq!(claims["nonce"].as_str().unwrap().len(), 36);
    }

    #[test]
    fn test_bearer_without_query_omits_hash() {
        let client = UpbitClient::new("ak", "sk");
        let jwt = client.bearer("");
        let payload_b64 = jwt
            .strip_prefix("Bearer ")
            .unwrap()
            .split('.')
            .nth(1)
            .unwrap();
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(payload_b64)
            .unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&payload).unwrap();
        assert!(claims.get("query_hash").is_none());
    }
}
