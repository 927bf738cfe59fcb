//! Per-venue subscribe payload builders.

use serde_json::json;

/// Application-level ping sent to MEXC.
pub const MEXC_PING: &str = r#"{"method":"PING"}"#;

/// Upbit subscribe: a JSON array opening with a ticket object, followed by
/// one object per stream with the market codes.
#[must_use]
pub fn upbit(ticket: &str, ticker: &[String], book: &[String], trade: &[String]) -> String {
    let mut parts = vec![json!({ "ticket": ticket })];
    if !trade.is_empty() {
        parts.push(json!({ "type": "trade", "codes": trade, "isOnlyRealtime": true }));
    }
    if !ticker.is_empty() {
        parts.push(json!({ "type": "ticker", "codes": ticker, "isOnlyRealtime": true }));
    }
    if !book.is_empty() {
        parts.push(json!({ "type": "orderbook", "codes": book, "isOnlyRealtime": true }));
    }
    serde_json::Value::Array(parts).to_string()
}

/// Bithumb v2 subscribe: `[{ticket}, {type...}, {format}]` with exactly one
/// stream per message. `stream` is `trade`, `ticker`, or `orderbook`; the
/// caller subscribes the most specific stream it needs.
#[must_use]
pub fn bithumb(ticket: &str, stream: &str, codes: &[String]) -> String {
    serde_json::Value::Array(vec![
        json!({ "ticket": ticket }),
        json!({ "type": stream, "codes": codes, "isOnlyRealtime": true }),
        json!({ "format": "DEFAULT" }),
    ])
    .to_string()
}

/// Binance expresses combined-stream subscriptions in the URL target; no
/// subscribe message is sent after connecting.
#[must_use]
pub fn binance_target(symbols: &[String], depth: usize, with_trades: bool) -> String {
    let mut streams = Vec::new();
    for symbol in symbols {
        let lower = symbol.to_ascii_lowercase();
        streams.push(format!("{lower}@ticker"));
        streams.push(format!("{lower}@depth{depth}"));
        if with_trades {
            streams.push(format!("{lower}@trade"));
        }
    }
    format!("/stream?streams={}", streams.join("/"))
}

/// MEXC sends one `SUBSCRIPTION` envelope per `(stream, symbol)` pair.
/// The session sends these sequentially, advancing on each ack.
#[must_use]
pub fn mexc_envelopes(symbols: &[String], depth: usize) -> Vec<String> {
    let mut id = 1i64;
    let mut out = Vec::new();
    for symbol in symbols {
        out.push(
            json!({
                "method": "SUBSCRIPTION",
                "params": [format!("spot@public.aggre.deals.v3.api.pb@100ms@{symbol}")],
                "id": id,
            })
            .to_string(),
        );
        id += 1;
        out.push(
            json!({
                "method": "SUBSCRIPTION",
                "params": [format!("spot@public.limit.depth.v3.api.pb@{symbol}@{depth}")],
                "id": id,
            })
            .to_string(),
        );
        id += 1;
    }
    out
}
