//! Venue REST clients.
//!
//! Two authentication styles cover the four venues: Upbit signs a JWT per
//! request; Binance (and MEXC, which clones its API surface) signs the
//! query string with HMAC-SHA256 and sends the key in a header.

pub mod binance;
pub mod upbit;

pub use binance::BinanceClient;
pub use upbit::UpbitClient;

use kimp_core::Error;

/// Maps a non-success HTTP response to the engine error taxonomy.
pub(crate) fn api_error(status: u16, body: String) -> Error {
    match status {
        401 | 403 => Error::AuthenticationFailed(body),
        429 => Error::RateLimited,
        _ => Error::Api { status, body },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_mapping() {
        assert!(matches!(
            api_error(401, "bad jwt".into()),
            Error::AuthenticationFailed(_)
        ));
        assert!(matches!(api_error(429, String::new()), Error::RateLimited));
        assert!(matches!(
            api_error(500, "boom".into()),
            Error::Api { status: 500, .. }
        ));
    }
}
