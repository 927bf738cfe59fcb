//! CSV/JSON observability sinks.
//!
//! The core emits structured events; these writers persist them for
//! offline analysis. None of this sits on the hot path: the consumer loop
//! calls in at most once per drained event.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Result;

use kimp_core::{time::now_us, FxRate, Ticker, Venue};
use kimp_market::{MarketState, PremiumEngine, PremiumInfo};

pub struct CsvObserver {
    prices: csv::Writer<File>,
    premiums: csv::Writer<File>,
    out_dir: PathBuf,
}

impl CsvObserver {
    pub fn open(out_dir: &str) -> Result<Self> {
        fs::create_dir_all(out_dir)?;
        let out_dir = Path::new(out_dir).to_path_buf();

        let mut prices = csv::Writer::from_path(out_dir.join("prices.csv"))?;
        prices.write_record(["timestamp", "venue", "symbol", "price", "currency"])?;

        let mut premiums = csv::Writer::from_path(out_dir.join("premium_alerts.csv"))?;
        premiums.write_record([
            "timestamp",
            "buy_venue",
            "sell_venue",
            "premium_pct",
            "buy_krw",
            "sell_krw",
            "fx",
        ])?;

        Ok(Self {
            prices,
            premiums,
            out_dir,
        })
    }

    pub fn record_ticker(&mut self, ticker: &Ticker) -> Result<()> {
        let currency = if ticker.venue.is_krw() { "KRW" } else { "USDT" };
        self.prices.write_record([
            ticker.timestamp_us.to_string(),
            ticker.venue.to_string(),
            ticker.symbol.to_string(),
            format!("{}", ticker.price),
            currency.to_string(),
        ])?;
        self.prices.flush()?;
        Ok(())
    }

    pub fn record_premium_alert(&mut self, info: &PremiumInfo) -> Result<()> {
        self.premiums.write_record([
            info.timestamp_us.to_string(),
            info.buy.to_string(),
            info.sell.to_string(),
            format!("{:.6}", info.premium_pct),
            format!("{:.2}", info.buy_price_krw),
            format!("{:.2}", info.sell_price_krw),
            format!("{:.2}", info.fx),
        ])?;
        self.premiums.flush()?;
        Ok(())
    }

    /// Writes the current FX observation as JSON.
    pub fn snapshot_fx(&self, fx: &FxRate) -> Result<()> {
        let path = self.out_dir.join("fx_snapshot.json");
        let mut file = File::create(path)?;
        file.write_all(serde_json::to_string_pretty(fx)?.as_bytes())?;
        Ok(())
    }

    /// Writes a venue/matrix summary as JSON.
    pub fn snapshot_summary(&self, engine: &PremiumEngine, state: &MarketState) -> Result<()> {
        let mut venues = serde_json::Map::new();
        for venue in Venue::ALL {
            let entry = match state.ticker(venue) {
                Some(ticker) => serde_json::json!({
                    "symbol": ticker.symbol.as_str(),
                    "price": ticker.price,
                    "bid": ticker.bid,
                    "ask": ticker.ask,
                    "timestamp_us": ticker.timestamp_us,
                }),
                None => serde_json::Value::Null,
            };
            venues.insert(venue.to_string(), entry);
        }

        let matrix = engine.get_matrix();
        let mut cells = serde_json::Map::new();
        for buy in Venue::ALL {
            for sell in Venue::ALL {
                if buy == sell {
                    continue;
                }
                let value = matrix[buy.index()][sell.index()];
                let key = format!("{buy}->{sell}");
                cells.insert(
                    key,
                    if value.is_finite() {
                        serde_json::Value::from(value)
                    } else {
                        serde_json::Value::Null
                    },
                );
            }
        }
        let summary = serde_json::json!({
            "timestamp_us": now_us(),
            "fx": engine.fx(),
            "venues": venues,
            "premium_matrix": cells,
        });
        let mut file = File::create(self.out_dir.join("summary.json"))?;
        file.write_all(serde_json::to_string_pretty(&summary)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kimp_core::{FxSourceTag, Symbol};

    fn temp_dir(name: &str) -> String {
        let dir = std::env::temp_dir().join(format!("kimp-observer-{name}-{}", std::process::id()));
        dir.to_string_lossy().into_owned()
    }

    #[test]
    fn test_csv_files_created_with_headers() {
        let dir = temp_dir("headers");
        let mut observer = CsvObserver::open(&dir).unwrap();
        observer
            .record_ticker(&Ticker {
                venue: Venue::UpbitKrw,
                symbol: Symbol::new("XRP"),
                price: 3100.0,
                bid: 3099.0,
                ask: 3101.0,
                volume_24h: 0.0,
                timestamp_us: 1,
            })
            .unwrap();

        let contents = fs::read_to_string(Path::new(&dir).join("prices.csv")).unwrap();
        let mut lines = contents.lines();
        assert_eq!(
            lines.next().unwrap(),
            "timestamp,venue,symbol,price,currency"
        );
        assert_eq!(lines.next().unwrap(), "1,upbit,XRP,3100,KRW");
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_fx_snapshot_round_trips() {
        let dir = temp_dir("fx");
        let observer = CsvObserver::open(&dir).unwrap();
        let fx = FxRate::new(1400.0, FxSourceTag::Investing, 42);
        observer.snapshot_fx(&fx).unwrap();
        let raw = fs::read_to_string(Path::new(&dir).join("fx_snapshot.json")).unwrap();
        let back: FxRate = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.rate, 1400.0);
        assert_eq!(back.source, FxSourceTag::Investing);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_summary_keys_by_venue_and_cell() {
        let dir = temp_dir("summary");
        let observer = CsvObserver::open(&dir).unwrap();
        let engine = PremiumEngine::new();
        engine.update_fx(1400.0);
        engine.update_price(Venue::UpbitKrw, 3100.0);
        engine.update_price(Venue::BinanceUsdt, 2.15);
        let state = MarketState::new();
        state.update_ticker(&Ticker {
            venue: Venue::UpbitKrw,
            symbol: Symbol::new("XRP"),
            price: 3100.0,
            bid: 3099.0,
            ask: 3101.0,
            volume_24h: 0.0,
            timestamp_us: 7,
        });
        observer.snapshot_summary(&engine, &state).unwrap();

        let raw = fs::read_to_string(Path::new(&dir).join("summary.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert!(value["premium_matrix"]["binance->upbit"].is_f64());
        // Cells with missing inputs serialize as null, not NaN.
        assert!(value["premium_matrix"]["mexc->upbit"].is_null());
        assert_eq!(value["venues"]["upbit"]["price"], 3100.0);
        assert!(value["venues"]["mexc"].is_null());
        fs::remove_dir_all(&dir).ok();
    }
}
