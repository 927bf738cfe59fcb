//! Bithumb v2 JSON decoder.
//!
//! The v2 stream is Upbit-shaped (`KRW-XRP` codes, the same field names)
//! with two extras: connection-status frames and a `stream_type` marker
//! that distinguishes realtime prints from snapshots.

use kimp_core::{Error, OrderBook, Result, Ticker, Trade, Venue};
use serde::Deserialize;

use crate::symbol::normalize_krw;
use crate::VenueMessage;

#[derive(Deserialize)]
struct RawTrade {
    code: String,
    trade_price: f64,
    #[serde(default)]
    trade_volume: f64,
    /// Milliseconds.
    #[serde(default)]
    trade_timestamp: i64,
    #[serde(default)]
    stream_type: String,
}

#[derive(Deserialize)]
struct RawTicker {
    code: String,
    trade_price: f64,
    #[serde(default)]
    best_bid_price: f64,
    #[serde(default)]
    best_ask_price: f64,
    #[serde(default)]
    acc_trade_volume_24h: f64,
    #[serde(default)]
    timestamp: i64,
}

#[derive(Deserialize)]
struct RawBookUnit {
    ask_price: f64,
    bid_price: f64,
    ask_size: f64,
    bid_size: f64,
}

#[derive(Deserialize)]
struct RawBook {
    code: String,
    orderbook_units: Vec<RawBookUnit>,
    #[serde(default)]
    timestamp: i64,
}

/// Decodes one Bithumb text frame.
pub fn decode(text: &str) -> Result<Vec<VenueMessage>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::parse(format!("bithumb: {e}")))?;

    if value.get("error").is_some() {
        return Err(Error::Exchange(format!("bithumb: {value}")));
    }
    // Connection status frames carry no type field.
    let Some(kind) = value.get("type").and_then(|t| t.as_str()) else {
        return Ok(vec![VenueMessage::Ignore]);
    };

    match kind {
        "trade" => {
            let raw: RawTrade = serde_json::from_value(value)
                .map_err(|e| Error::parse(format!("bithumb trade: {e}")))?;
            if raw.stream_type == "SNAPSHOT" {
                return Ok(vec![VenueMessage::Ignore]);
            }
            let trade = Trade {
                venue: Venue::BithumbKrw,
                symbol: normalize_krw(&raw.code).into(),
                price: raw.trade_price,
                quantity: raw.trade_volume,
                timestamp_us: raw.trade_timestamp * 1000,
            };
            // Trade prints double as the price feed on this venue.
            let ticker = Ticker {
                venue: Venue::BithumbKrw,
                symbol: trade.symbol,
                price: trade.price,
                bid: trade.price,
                ask: trade.price,
                volume_24h: raw.trade_volume,
                timestamp_us: trade.timestamp_us,
            };
            Ok(vec![
                VenueMessage::Trade(trade),
                VenueMessage::Ticker(ticker),
            ])
        }
        "ticker" => {
            let raw: RawTicker = serde_json::from_value(value)
                .map_err(|e| Error::parse(format!("bithumb ticker: {e}")))?;
            let bid = if raw.best_bid_price > 0.0 {
                raw.best_bid_price
            } else {
                raw.trade_price
            };
            let ask = if raw.best_ask_price > 0.0 {
                raw.best_ask_price
            } else {
                raw.trade_price
            };
            Ok(vec![VenueMessage::Ticker(Ticker {
                venue: Venue::BithumbKrw,
                symbol: normalize_krw(&raw.code).into(),
                price: raw.trade_price,
                bid,
                ask,
                volume_24h: raw.acc_trade_volume_24h,
                timestamp_us: raw.timestamp * 1000,
            })])
        }
        "orderbook" => {
            let raw: RawBook = serde_json::from_value(value)
                .map_err(|e| Error::parse(format!("bithumb orderbook: {e}")))?;
            let mut book = OrderBook::new(Venue::BithumbKrw, normalize_krw(&raw.code));
            for unit in &raw.orderbook_units {
                book.push_ask(unit.ask_price, unit.ask_size);
                book.push_bid(unit.bid_price, unit.bid_size);
            }
            book.timestamp_us = raw.timestamp * 1000;
            Ok(vec![VenueMessage::Book(book)])
        }
        _ => Ok(vec![VenueMessage::Ignore]),
    }
}
