//! Symbol normalization.
//!
//! KRW venues name markets `KRW-XRP` (Upbit, Bithumb v2) or `XRP_KRW`
//! (Bithumb v1 leftovers); both normalize to the bare coin `XRP`. USDT
//! venues keep their concatenated form (`XRPUSDT`) unchanged.

/// Normalizes a KRW-venue market code to the bare coin symbol.
#[must_use]
pub fn normalize_krw(code: &str) -> &str {
    if let Some(coin) = code.strip_prefix("KRW-") {
        return coin;
    }
    if let Some(coin) = code.strip_suffix("_KRW") {
        return coin;
    }
    code
}

/// Converts a bare coin symbol to the Upbit/Bithumb-v2 market code form.
#[must_use]
pub fn to_krw_code(coin: &str) -> String {
    if coin.starts_with("KRW-") {
        coin.to_string()
    } else {
        format!("KRW-{coin}")
    }
}
