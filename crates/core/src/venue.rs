//! Venue identifiers and their KRW/USDT classification.

use serde::{Deserialize, Serialize};

/// The four venues the engine trades across.
///
/// Two are KRW-denominated (domestic), two are USDT-denominated (foreign).
/// The discriminant doubles as the index into every venue-keyed array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum Venue {
    /// Upbit, KRW markets.
    #[default]
    #[serde(rename = "upbit")]
    UpbitKrw = 0,
    /// Bithumb, KRW markets.
    #[serde(rename = "bithumb")]
    BithumbKrw = 1,
    /// Binance spot, USDT markets.
    #[serde(rename = "binance")]
    BinanceUsdt = 2,
    /// MEXC spot, USDT markets.
    #[serde(rename = "mexc")]
    MexcUsdt = 3,
}

/// Number of venues; the fixed dimension of every venue-keyed table.
pub const VENUE_COUNT: usize = 4;

impl Venue {
    /// All venues in index order.
    pub const ALL: [Venue; VENUE_COUNT] = [
        Venue::UpbitKrw,
        Venue::BithumbKrw,
        Venue::BinanceUsdt,
        Venue::MexcUsdt,
    ];

    /// Array index of this venue.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Venue for an array index, if in range.
    #[must_use]
    pub const fn from_index(idx: usize) -> Option<Venue> {
        match idx {
            0 => Some(Venue::UpbitKrw),
            1 => Some(Venue::BithumbKrw),
            2 => Some(Venue::BinanceUsdt),
            3 => Some(Venue::MexcUsdt),
            _ => None,
        }
    }

    /// True for the KRW-denominated venues. FX normalization applies to
    /// everything that is not KRW.
    #[must_use]
    pub const fn is_krw(self) -> bool {
        matches!(self, Venue::UpbitKrw | Venue::BithumbKrw)
    }

    /// True for the USDT-denominated venues.
    #[must_use]
    pub const fn is_usdt(self) -> bool {
        !self.is_krw()
    }

    /// Human-readable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Venue::UpbitKrw => "upbit",
            Venue::BithumbKrw => "bithumb",
            Venue::BinanceUsdt => "binance",
            Venue::MexcUsdt => "mexc",
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
