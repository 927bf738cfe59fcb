//! MEXC decoder: JSON control frames and binary market data.
//!
//! Control traffic (subscription acks, pongs) is JSON; market data arrives
//! as binary frames with protobuf-style tag/wire-type framing, handled by
//! the [`pb`] module.

use kimp_core::{Error, Result};

use crate::VenueMessage;

/// Decodes one MEXC text frame (acks and pongs only).
pub fn decode_text(text: &str) -> Result<Vec<VenueMessage>> {
    let value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| Error::parse(format!("mexc: {e}")))?;

    if value.get("msg").and_then(|m| m.as_str()) == Some("PONG")
        || value.get("pong").is_some()
    {
        return Ok(vec![VenueMessage::Pong]);
    }
    // Subscription ack: {"id":N,"code":0,"msg":"spot@..."}.
    if value.get("code").and_then(serde_json::Value::as_i64) == Some(0) {
        let id = value
            .get("id")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(0);
        return Ok(vec![VenueMessage::SubscribeAck { id }]);
    }
    if let Some(code) = value.get("code").and_then(serde_json::Value::as_i64) {
        return Err(Error::Exchange(format!(
            "mexc subscribe rejected (code {code}): {value}"
        )));
    }
    Ok(vec![VenueMessage::Ignore])
}

pub mod pb {
    //! Tag/wire-type scanner for MEXC binary push frames.
    //!
    //! The outer envelope carries the channel name in field 1 and the
    //! symbol in field 3; field 313 holds the aggregated depth payload and
    //! field 314 the aggregated deals payload. Inner messages omit the
    //! symbol, so it is carried down from the envelope.

    use kimp_core::{Error, OrderBook, Result, Ticker, Trade, Venue};

    use crate::VenueMessage;

    const WIRE_VARINT: u64 = 0;
    const WIRE_FIXED64: u64 = 1;
    const WIRE_LEN: u64 = 2;
    const WIRE_FIXED32: u64 = 5;

    /// Channel field of the outer envelope.
    pub const TAG_CHANNEL: u32 = 1;
    /// Symbol field of the outer envelope.
    pub const TAG_SYMBOL: u32 = 3;
    /// Aggregated book payload.
    pub const TAG_AGGRE_DEPTH: u32 = 313;
    /// Aggregated deals payload.
    pub const TAG_AGGRE_DEALS: u32 = 314;

    /// One decoded field value.
    #[derive(Debug, Clone, Copy)]
    pub enum FieldValue<'a> {
        Varint(u64),
        Fixed32(u32),
        Fixed64(u64),
        Bytes(&'a [u8]),
    }

    /// Sequential reader over one message's fields.
    pub struct WireReader<'a> {
        buf: &'a [u8],
        pos: usize,
    }

    impl<'a> WireReader<'a> {
        #[must_use]
        pub fn new(buf: &'a [u8]) -> Self {
            Self { buf, pos: 0 }
        }

        #[must_use]
        pub fn done(&self) -> bool {
            self.pos >= self.buf.len()
        }

        fn read_varint(&mut self) -> Result<u64> {
            let mut result = 0u64;
            let mut shift = 0u32;
            loop {
                let byte = *self
                    .buf
                    .get(self.pos)
                    .ok_or_else(|| Error::parse("mexc pb: truncated varint"))?;
                self.pos += 1;
                result |= u64::from(byte & 0x7F) << shift;
                if byte & 0x80 == 0 {
                    return Ok(result);
                }
                shift += 7;
                if shift >= 64 {
                    return Err(Error::parse("mexc pb: varint too large"));
                }
            }
        }

        fn take(&mut self, n: usize) -> Result<&'a [u8]> {
            let end = self
                .pos
                .checked_add(n)
                .filter(|&end| end <= self.buf.len())
                .ok_or_else(|| Error::parse("mexc pb: truncated payload"))?;
            let slice = &self.buf[self.pos..end];
            self.pos = end;
            Ok(slice)
        }

        /// Reads the next `(tag, value)` pair.
        pub fn read_field(&mut self) -> Result<(u32, FieldValue<'a>)> {
            let key = self.read_varint()?;
            let tag = (key >> 3) as u32;
            let value = match key & 0x07 {
                WIRE_VARINT => FieldValue::Varint(self.read_varint()?),
                WIRE_FIXED64 => {
                    let bytes = self.take(8)?;
                    FieldValue::Fixed64(u64::from_le_bytes(bytes.try_into().unwrap()))
                }
                WIRE_LEN => {
                    let len = self.read_varint()?;
                    FieldValue::Bytes(self.take(len as usize)?)
                }
                WIRE_FIXED32 => {
                    let bytes = self.take(4)?;
                    FieldValue::Fixed32(u32::from_le_bytes(bytes.try_into().unwrap()))
                }
                wire => return Err(Error::parse(format!("mexc pb: unknown wire type {wire}"))),
            };
            Ok((tag, value))
        }
    }

    fn utf8<'a>(bytes: &'a [u8], what: &str) -> Result<&'a str> {
        std::str::from_utf8(bytes).map_err(|_| Error::parse(format!("mexc pb: {what} not utf-8")))
    }

    fn decimal(bytes: &[u8], what: &str) -> Result<f64> {
        let s = utf8(bytes, what)?;
        s.parse::<f64>()
            .map_err(|_| Error::parse(format!("mexc pb: {what} bad number {s:?}")))
    }

    /// Decodes one binary push frame into normalized records.
    pub fn decode_frame(data: &[u8]) -> Result<Vec<VenueMessage>> {
        let mut reader = WireReader::new(data);
        let mut symbol = "";
        let mut depth: Option<&[u8]> = None;
        let mut deals: Option<&[u8]> = None;

        while !reader.done() {
            let (tag, value) = reader.read_field()?;
            match (tag, value) {
                (TAG_CHANNEL, FieldValue::Bytes(bytes)) => {
                    // Channel name informs routing but 313/314 already
                    // disambiguate the payload kind.
                    let _ = utf8(bytes, "channel")?;
                }
                (TAG_SYMBOL, FieldValue::Bytes(bytes)) => symbol = utf8(bytes, "symbol")?,
                (TAG_AGGRE_DEPTH, FieldValue::Bytes(bytes)) => depth = Some(bytes),
                (TAG_AGGRE_DEALS, FieldValue::Bytes(bytes)) => deals = Some(bytes),
                _ => {}
            }
        }

        let mut out = Vec::new();
        if let Some(bytes) = depth {
            out.push(VenueMessage::Book(decode_depth(symbol, bytes)?));
        }
        if let Some(bytes) = deals {
            decode_deals(symbol, bytes, &mut out)?;
        }
        if out.is_empty() {
            out.push(VenueMessage::Ignore);
        }
        Ok(out)
    }

    /// Aggregated depth: field 1 = ask levels, 2 = bid levels, 3 = version.
    /// Each level: field 1 = price (decimal string), 2 = quantity.
    fn decode_depth(symbol: &str, data: &[u8]) -> Result<OrderBook> {
        let mut book = OrderBook::new(Venue::MexcUsdt, symbol);
        let mut reader = WireReader::new(data);
        while !reader.done() {
            let (tag, value) = reader.read_field()?;
            match (tag, value) {
                (1, FieldValue::Bytes(level)) => {
                    let (price, qty) = decode_level(level)?;
                    if qty > 0.0 {
                        book.push_ask(price, qty);
                    }
                }
                (2, FieldValue::Bytes(level)) => {
                    let (price, qty) = decode_level(level)?;
                    if qty > 0.0 {
                        book.push_bid(price, qty);
                    }
                }
                (3, FieldValue::Varint(_version)) => {}
                _ => {}
            }
        }
        Ok(book)
    }

    fn decode_level(data: &[u8]) -> Result<(f64, f64)> {
        let mut reader = WireReader::new(data);
        let mut price = 0.0;
        let mut qty = 0.0;
        while !reader.done() {
            let (tag, value) = reader.read_field()?;
            match (tag, value) {
                (1, FieldValue::Bytes(bytes)) => price = decimal(bytes, "level.price")?,
                (2, FieldValue::Bytes(bytes)) => qty = decimal(bytes, "level.quantity")?,
                _ => {}
            }
        }
        Ok((price, qty))
    }

    /// Aggregated deals: repeated field 1, each deal carrying price (1),
    /// quantity (2), taker side (3), timestamp ms (4). The latest deal also
    /// refreshes the ticker since this venue has no separate ticker stream.
    fn decode_deals(symbol: &str, data: &[u8], out: &mut Vec<VenueMessage>) -> Result<()> {
        let mut reader = WireReader::new(data);
        let mut last_trade: Option<Trade> = None;
        while !reader.done() {
            let (tag, value) = reader.read_field()?;
            if let (1, FieldValue::Bytes(deal)) = (tag, value) {
                let trade = decode_deal(symbol, deal)?;
                out.push(VenueMessage::Trade(trade));
                last_trade = Some(trade);
            }
        }
        if let Some(trade) = last_trade {
            out.push(VenueMessage::Ticker(Ticker {
                venue: Venue::MexcUsdt,
                symbol: trade.symbol,
                price: trade.price,
                bid: trade.price,
                ask: trade.price,
                volume_24h: 0.0,
                timestamp_us: trade.timestamp_us,
            }));
        }
        Ok(())
    }

    fn decode_deal(symbol: &str, data: &[u8]) -> Result<Trade> {
        let mut reader = WireReader::new(data);
        let mut trade = Trade {
            venue: Venue::MexcUsdt,
            symbol: symbol.into(),
            ..Trade::default()
        };
        while !reader.done() {
            let (tag, value) = reader.read_field()?;
            match (tag, value) {
                (1, FieldValue::Bytes(bytes)) => trade.price = decimal(bytes, "deal.price")?,
                (2, FieldValue::Bytes(bytes)) => trade.quantity = decimal(bytes, "deal.quantity")?,
                (4, FieldValue::Varint(ts_ms)) => trade.timestamp_us = (ts_ms as i64) * 1000,
                _ => {}
            }
        }
        Ok(trade)
    }
}
