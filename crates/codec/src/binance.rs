//! Binance combined-stream JSON decoder.
//!
//! Combined frames wrap the payload as `{"stream": "...", "data": {...}}`;
//! numeric fields arrive as strings. The partial-depth stream omits the
//! symbol, so it is recovered from the stream name.

use kimp_core::{Error, OrderBook, Result, Ticker, Trade, Venue};
use serde::Deserialize;

use crate::VenueMessage;

#[derive(Deserialize)]
struct RawTicker {
    s: String,
    /// Last price.
    c: String,
    /// Best bid.
    b: String,
    /// Best ask.
    a: String,
    /// 24h base volume.
    v: String,
    /// Event time, milliseconds.
    #[serde(default, rename = "E")]
    event_time: i64,
}

#[derive(Deserialize)]
struct RawDepth {
    #[serde(default)]
    bids: Vec<[String; 2]>,
    #[serde(default)]
    asks: Vec<[String; 2]>,
    #[serde(default, rename = "E")]
    event_time: i64,
}

#[derive(Deserialize)]
struct RawTrade {
    s: String,
    p: String,
    q: String,
    /// Trade time, milliseconds.
    #[serde(default, rename = "T")]
    trade_time: i64,
}

fn num(s: &str, what: &str) -> Result<f64> {
    s.parse::<f64>()
        .map_err(|_| Error::parse(format!("binance {what}: bad number {s:?}")))
}

/// Decodes one Binance combined-stream text frame.
pub fn decode(text: &str) -> Result<Vec<VenueMessage>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::parse(format!("binance: {e}")))?;

    let (Some(stream), Some(data)) = (
        value.get("stream").and_then(|s| s.as_str()),
        value.get("data"),
    ) else {
        return Ok(vec![VenueMessage::Ignore]);
    };

    // "xrpusdt@depth20" -> symbol "XRPUSDT".
    let stream_symbol = stream
        .split('@')
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    if stream.contains("@ticker") {
        let raw: RawTicker = serde_json::from_value(data.clone())
            .map_err(|e| Error::parse(format!("binance ticker: {e}")))?;
        Ok(vec![VenueMessage::Ticker(Ticker {
            venue: Venue::BinanceUsdt,
            symbol: raw.s.as_str().into(),
            price: num(&raw.c, "ticker.c")?,
            bid: num(&raw.b, "ticker.b")?,
            ask: num(&raw.a, "ticker.a")?,
            volume_24h: num(&raw.v, "ticker.v")?,
            timestamp_us: raw.event_time * 1000,
        })])
    } else if stream.contains("@depth") {
        let raw: RawDepth = serde_json::from_value(data.clone())
            .map_err(|e| Error::parse(format!("binance depth: {e}")))?;
        let mut book = OrderBook::new(Venue::BinanceUsdt, &stream_symbol);
        for [price, qty] in &raw.bids {
            book.push_bid(num(price, "depth.bid")?, num(qty, "depth.bid_qty")?);
        }
        for [price, qty] in &raw.asks {
            book.push_ask(num(price, "depth.ask")?, num(qty, "depth.ask_qty")?);
        }
        book.timestamp_us = raw.event_time * 1000;
        Ok(vec![VenueMessage::Book(book)])
    } else if stream.contains("@trade") || stream.contains("@aggTrade") {
        let raw: RawTrade = serde_json::from_value(data.clone())
            .map_err(|e| Error::parse(format!("binance trade: {e}")))?;
        Ok(vec![VenueMessage::Trade(Trade {
            venue: Venue::BinanceUsdt,
            symbol: raw.s.as_str().into(),
            price: num(&raw.p, "trade.p")?,
            quantity: num(&raw.q, "trade.q")?,
            timestamp_us: raw.trade_time * 1000,
        })])
    } else {
        Ok(vec![VenueMessage::Ignore])
    }
}
