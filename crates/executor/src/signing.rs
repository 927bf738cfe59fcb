//! Signing primitives for venue REST authentication.
//!
//! Two styles are built from these: a per-request JWT with an optional
//! SHA-512 query hash (Upbit), and an HMAC-SHA256-signed query string with
//! an API-key header (Binance/MEXC).

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

pub use kimp_core::time::{now_ms, now_us};

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

#[must_use]
pub fn hmac_sha256(secret: &str, data: &str) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

#[must_use]
pub fn hmac_sha256_hex(secret: &str, data: &str) -> String {
    hex::encode(hmac_sha256(secret, data))
}

#[must_use]
pub fn hmac_sha512(secret: &str, data: &str) -> Vec<u8> {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).expect("hmac accepts any key size");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

#[must_use]
pub fn hmac_sha512_hex(secret: &str, data: &str) -> String {
    hex::encode(hmac_sha512(secret, data))
}

#[must_use]
pub fn sha256_hex(data: &str) -> String {
    hex::encode(Sha256::digest(data.as_bytes()))
}

#[must_use]
pub fn sha512_hex(data: &str) -> String {
    hex::encode(Sha512::digest(data.as_bytes()))
}

#[must_use]
pub fn base64_standard(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// URL-safe base64 without padding, as JWT segments use.
#[must_use]
pub fn base64_url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

#[must_use]
pub fn uuid_v4() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Builds an HS256 JWT over `claims`.
#[must_use]
pub fn jwt_hs256(claims: &serde_json::Value, secret: &str) -> String {
    let header = base64_url(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = base64_url(claims.to_string().as_bytes());
    let message = format!("{header}.{payload}");
    let signature = base64_url(&hmac_sha256(secret, &message));
    format!("{message}.{signature}")
}

/// Percent-encodes a query value (RFC 3986 unreserved set).
#[must_use]
pub fn url_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

/// Joins `(key, value)` pairs into a canonical query string.
#[must_use]
pub fn query_string(params: &[(&str, String)]) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{k}={}", url_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}
