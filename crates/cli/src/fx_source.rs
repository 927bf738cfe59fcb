//! KRW/USD rate fetcher backing the engine's FX cell.

use async_trait::async_trait;

use kimp_core::{time::now_us, Error, FxRate, FxSourceTag, Result};
use kimp_market::FxSource;

const FALLBACK_URL: &str = "https://open.er-api.com/v6/latest/USD";

/// Public exchange-rate API source. The engine wraps it in
/// [`kimp_market::CachedFxSource`], so a transient outage serves the last
/// good value for up to five minutes.
pub struct RestFxSource {
    http: reqwest::Client,
    url: String,
}

impl RestFxSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            url: FALLBACK_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

impl Default for RestFxSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FxSource for RestFxSource {
    async fn fetch(&self) -> Result<FxRate> {
        let body: serde_json::Value = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| Error::network(e.to_string()))?
            .json()
            .await
            .map_err(|e| Error::parse(e.to_string()))?;

        let rate = body
            .pointer("/rates/KRW")
            .and_then(serde_json::Value::as_f64)
            .ok_or_else(|| Error::parse("fx response missing rates.KRW"))?;
        if rate <= 0.0 {
            return Err(Error::parse(format!("non-positive fx rate {rate}")));
        }
        Ok(FxRate::new(rate, FxSourceTag::Fallback, now_us()))
    }
}
