//! Parsed engine configuration.
//!
//! The engine only ever sees these structs; loading merges a TOML file with
//! `KIMP_`-prefixed environment overrides so credentials can stay out of
//! the file.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::venue::Venue;

/// Per-venue connectivity, credentials, and rate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub ws_url: String,
    pub rest_url: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Order-API token refill rate, tokens per second.
    #[serde(default = "default_order_rate")]
    pub order_rate: f64,
    #[serde(default = "default_order_burst")]
    pub order_burst: u32,
    /// Query-API token refill rate, tokens per second.
    #[serde(default = "default_query_rate")]
    pub query_rate: f64,
    #[serde(default = "default_query_burst")]
    pub query_burst: u32,
}

fn default_true() -> bool {
    true
}
fn default_order_rate() -> f64 {
    8.0
}
fn default_order_burst() -> u32 {
    10
}
fn default_query_rate() -> f64 {
    30.0
}
fn default_query_burst() -> u32 {
    50
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            ws_url: String::new(),
            rest_url: String::new(),
            access_key: String::new(),
            secret_key: String::new(),
            enabled: true,
            order_rate: default_order_rate(),
            order_burst: default_order_burst(),
            query_rate: default_query_rate(),
            query_burst: default_query_burst(),
        }
    }
}

/// Strategy entry thresholds and order bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Premium (%) required to enter.
    pub min_premium_pct: f64,
    /// Premium (%) above which entries are rejected as stale/suspicious.
    pub max_premium_pct: f64,
    pub min_order_qty: f64,
    pub max_order_qty: f64,
    pub max_slippage_pct: f64,
    pub order_timeout_ms: u64,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            min_premium_pct: 3.0,
            max_premium_pct: 10.0,
            min_order_qty: 10.0,
            max_order_qty: 10_000.0,
            max_slippage_pct: 0.5,
            order_timeout_ms: 30_000,
        }
    }
}

/// Hard risk limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub daily_loss_limit_krw: f64,
    pub max_transfer_amount: f64,
    pub max_concurrent_orders: u32,
    pub kill_switch_enabled: bool,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            daily_loss_limit_krw: 500_000.0,
            max_transfer_amount: 50_000.0,
            max_concurrent_orders: 4,
            kill_switch_enabled: true,
        }
    }
}

/// One tradable coin with its per-venue market codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolConfig {
    /// Common symbol, e.g. `XRP`.
    pub symbol: String,
    /// Upbit market code, e.g. `KRW-XRP`.
    pub upbit: String,
    /// Bithumb market code (v2 form), e.g. `KRW-XRP`.
    pub bithumb: String,
    /// Binance symbol, e.g. `XRPUSDT`.
    pub binance: String,
    /// MEXC symbol, e.g. `XRPUSDT`.
    pub mexc: String,
    /// Primary symbols trade; secondary symbols are only monitored.
    #[serde(default)]
    pub primary: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SymbolConfig {
    /// The venue-specific market code for this coin.
    #[must_use]
    pub fn code_for(&self, venue: Venue) -> &str {
        match venue {
            Venue::UpbitKrw => &self.upbit,
            Venue::BithumbKrw => &self.bithumb,
            Venue::BinanceUsdt => &self.binance,
            Venue::MexcUsdt => &self.mexc,
        }
    }
}

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub upbit: VenueConfig,
    #[serde(default)]
    pub bithumb: VenueConfig,
    #[serde(default)]
    pub binance: VenueConfig,
    #[serde(default)]
    pub mexc: VenueConfig,
    #[serde(default)]
    pub strategy: StrategyConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub symbols: Vec<SymbolConfig>,
}

impl AppConfig {
    /// Loads `path` merged with `KIMP_`-prefixed environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("KIMP_").split("__"))
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    #[must_use]
    pub fn venue(&self, venue: Venue) -> &VenueConfig {
        match venue {
            Venue::UpbitKrw => &self.upbit,
            Venue::BithumbKrw => &self.bithumb,
            Venue::BinanceUsdt => &self.binance,
            Venue::MexcUsdt => &self.mexc,
        }
    }

    /// Enabled symbols flagged for live trading.
    #[must_use]
    pub fn primary_symbols(&self) -> Vec<&SymbolConfig> {
        self.symbols
            .iter()
            .filter(|s| s.enabled && s.primary)
            .collect()
    }

    /// Enabled monitor-only symbols.
    #[must_use]
    pub fn secondary_symbols(&self) -> Vec<&SymbolConfig> {
        self.symbols
            .iter()
            .filter(|s| s.enabled && !s.primary)
            .collect()
    }

    /// Market codes subscribed on `venue`.
    #[must_use]
    pub fn codes_for(&self, venue: Venue) -> Vec<String> {
        self.symbols
            .iter()
            .filter(|s| s.enabled)
            .map(|s| s.code_for(venue).to_string())
            .collect()
    }

    /// Sanity checks that cannot be expressed in serde defaults.
    pub fn validate(&self) -> Result<()> {
        if self.strategy.min_premium_pct >= self.strategy.max_premium_pct {
            return Err(Error::Config(
                "min_premium_pct must be below max_premium_pct".into(),
            ));
        }
        if self.strategy.min_order_qty > self.strategy.max_order_qty {
            return Err(Error::Config(
                "min_order_qty must not exceed max_order_qty".into(),
            ));
        }
        for sym in &self.symbols {
            if sym.symbol.is_empty() {
                return Err(Error::Config("symbol entry with empty name".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xrp() -> SymbolConfig {
        SymbolConfig {
            symbol: "XRP".into(),
            upbit: "KRW-XRP".into(),
            bithumb: "KRW-XRP".into(),
            binance: "XRPUSDT".into(),
            mexc: "XRPUSDT".into(),
            primary: true,
            enabled: true,
        }
    }

    #[test]
    fn test_symbol_code_lookup() {
        let sym = xrp();
        assert_eq!(sym.code_for(Venue::UpbitKrw), "KRW-XRP");
        assert_eq!(sym.code_for(Venue::BinanceUsdt), "XRPUSDT");
    }

    #[test]
    fn test_defaults_validate() {
        let mut cfg = AppConfig::default();
        cfg.symbols.push(xrp());
        cfg.validate().unwrap();
        assert_eq!(cfg.primary_symbols().len(), 1);
        assert!(cfg.secondary_symbols().is_empty());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut cfg = AppConfig::default();
        cfg.strategy.min_premium_pct = 11.0;
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_codes_for_skips_disabled() {
        let mut cfg = AppConfig::default();
        cfg.symbols.push(xrp());
        let mut btc = xrp();
        btc.symbol = "BTC".into();
        btc.enabled = false;
        cfg.symbols.push(btc);
        assert_eq!(cfg.codes_for(Venue::MexcUsdt), vec!["XRPUSDT".to_string()]);
    }
}
