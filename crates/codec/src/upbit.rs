//! Upbit JSON decoder (ticker / orderbook / trade streams).

use kimp_core::{Error, OrderBook, Result, Ticker, Trade, Venue};
use serde::Deserialize;

use crate::symbol::normalize_krw;
use crate::VenueMessage;

#[derive(Deserialize)]
struct RawTicker {
    code: String,
    trade_price: f64,
    #[serde(default)]
    bid_price: f64,
    #[serde(default)]
    ask_price: f64,
    #[serde(default)]
    acc_trade_volume_24h: f64,
    /// Milliseconds.
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

#[derive(Deserialize)]
struct RawTrade {
    code: String,
    trade_price: f64,
    trade_volume: f64,
    #[serde(default)]
    trade_timestamp: i64,
}

/// Decodes one Upbit text frame.
pub fn decode(text: &str) -> Result<Vec<VenueMessage>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::parse(format!("upbit: {e}")))?;

    match value.get("type").and_then(|t| t.as_str()) {
        Some("ticker") => {
            let raw: RawTicker = serde_json::from_value(value)
                .map_err(|e| Error::parse(format!("upbit ticker: {e}")))?;
            Ok(vec![VenueMessage::Ticker(ticker_from(&raw))])
        }
        Some("orderbook") => {
            let raw: RawBook = serde_json::from_value(value)
                .map_err(|e| Error::parse(format!("upbit orderbook: {e}")))?;
            Ok(vec![VenueMessage::Book(book_from(&raw))])
        }
        Some("trade") => {
            let raw: RawTrade = serde_json::from_value(value)
                .map_err(|e| Error::parse(format!("upbit trade: {e}")))?;
            Ok(vec![VenueMessage::Trade(trade_from(&raw))])
        }
        _ => Ok(vec![VenueMessage::Ignore]),
    }
}

fn ticker_from(raw: &RawTicker) -> Ticker {
    Ticker {
        venue: Venue::UpbitKrw,
        symbol: normalize_krw(&raw.code).into(),
        price: raw.trade_price,
        bid: raw.bid_price,
        ask: raw.ask_price,
        volume_24h: raw.acc_trade_volume_24h,
        timestamp_us: raw.timestamp * 1000,
    }
}

fn book_from(raw: &RawBook) -> OrderBook {
    let mut book = OrderBook::new(Venue::UpbitKrw, normalize_krw(&raw.code));
    for unit in &raw.orderbook_units {
        book.push_ask(unit.ask_price, unit.ask_size);
        book.push_bid(unit.bid_price, unit.bid_size);
    }
    book.timestamp_us = raw.timestamp * 1000;
    book
}

fn trade_from(raw: &RawTrade) -> Trade {
    Trade {
        venue: Venue::UpbitKrw,
        symbol: normalize_krw(&raw.code).into(),
        price: raw.trade_price,
        quantity: raw.trade_volume,
        timestamp_us: raw.trade_timestamp * 1000,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ticker() {
        let frame = r#"{"type":"ticker","code":"KRW-XRP","trade_price":3100.0,
            "bid_price":3099.0,"ask_price":3101.0,
            "acc_trade_volume_24h":1234.5,"timestamp":1700000000000}"#;
        let msgs = decode(frame).unwrap();
        assert_eq!(msgs.len(), 1);
        match &msgs[0] {
            VenueMessage::Ticker(t) => {
                assert_eq!(t.venue, Venue::UpbitKrw);
                assert_eq!(t.symbol, "XRP");
                assert_eq!(t.price, 3100.0);
                assert_eq!(t.bid, 3099.0);
                assert_eq!(t.ask, 3101.0);
                assert_eq!(t.volume_24h, 1234.5);
                assert_eq!(t.timestamp_us, 1_700_000_000_000_000);
            }
            other => panic!("expected ticker, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_orderbook() {
        let frame = r#"{"type":"orderbook","code":"KRW-XRP","timestamp":1700000000000,
            "orderbook_units":[
                {"ask_price":3101.0,"bid_price":3100.0,"ask_size":10.0,"bid_size":20.0},
                {"ask_price":3102.0,"bid_price":3099.0,"ask_size":11.0,"bid_size":21.0}
            ]}"#;
        let msgs = decode(frame).unwrap();
        match &msgs[0] {
            VenueMessage::Book(b) => {
                assert_eq!(b.symbol, "XRP");
                assert_eq!(b.bid_count, 2);
                assert_eq!(b.ask_count, 2);
                assert_eq!(b.best_bid(), 3100.0);
                assert_eq!(b.best_ask(), 3101.0);
                assert!(b.is_valid());
            }
            other => panic!("expected book, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_trade() {
        let frame = r#"{"type":"trade","code":"KRW-XRP","trade_price":3100.5,
            "trade_volume":42.0,"trade_timestamp":1700000000123}"#;
        let msgs = decode(frame).unwrap();
        match &msgs[0] {
            VenueMessage::Trade(t) => {
                assert_eq!(t.price, 3100.5);
                assert_eq!(t.quantity, 42.0);
            }
            other => panic!("expected trade, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_ignored() {
        let msgs = decode(r#"{"type":"mystery"}"#).unwrap();
        assert!(matches!(msgs[0], VenueMessage::Ignore));
    }

    #[test]
    fn test_malformed_frame_is_parse_error() {
        assert!(matches!(decode("{not json"), Err(Error::Parse(_))));
        // Truncated: right type, missing required fields.
        assert!(matches!(
            decode(r#"{"type":"ticker","code":"KRW-XRP"}"#),
            Err(Error::Parse(_))
        ));
    }
}
