//! Per-venue fee tables and break-even arithmetic.
//!
//! Default rates; live accounts may differ by VIP tier or promotions, so
//! these serve as the conservative floor for break-even filtering. Call
//! [`validate`] at startup to bounds-check the tables.

use crate::error::{Error, Result};
use crate::venue::{Venue, VENUE_COUNT};

/// Maker fee rate per venue (fraction, e.g. `0.0005` = 0.05%).
pub const MAKER_FEE: [f64; VENUE_COUNT] = [
    0.0005, // upbit
    0.0004, // bithumb (coupon rate)
    0.0010, // binance
    0.0000, // mexc (maker free)
];

/// Taker fee rate per venue.
pub const TAKER_FEE: [f64; VENUE_COUNT] = [
    0.0005, // upbit
    0.0004, // bithumb
    0.0010, // binance
    0.0002, // mexc
];

/// XRP withdraw fee per venue, in coin units.
pub const WITHDRAW_FEE_XRP: [f64; VENUE_COUNT] = [1.0, 1.0, 0.25, 0.25];

/// Minimum XRP withdraw amount per venue, in coin units.
pub const MIN_WITHDRAW_XRP: [f64; VENUE_COUNT] = [21.0, 25.0, 20.0, 20.0];

/// Safety margin folded into the break-even premium (0.1%), covering
/// expected slippage.
pub const SAFETY_MARGIN: f64 = 0.001;

/// Target profit over break-even for the suggested entry threshold (0.5%).
pub const TARGET_PROFIT: f64 = 0.005;

#[must_use]
pub const fn maker_fee(venue: Venue) -> f64 {
    MAKER_FEE[venue as usize]
}

#[must_use]
pub const fn taker_fee(venue: Venue) -> f64 {
    TAKER_FEE[venue as usize]
}

/// Maker or taker fee rate.
#[must_use]
pub const fn fee(venue: Venue, is_maker: bool) -> f64 {
    if is_maker {
        maker_fee(venue)
    } else {
        taker_fee(venue)
    }
}

/// Withdraw fee for `coin` on `venue`, in coin units. Only XRP is tabled;
/// other coins fall back to zero and must be configured explicitly.
#[must_use]
pub fn withdraw_fee(venue: Venue, coin: &str) -> f64 {
    match coin {
        "XRP" => WITHDRAW_FEE_XRP[venue.index()],
        _ => 0.0,
    }
}

/// Minimum withdraw amount for `coin` on `venue`, in coin units.
#[must_use]
pub fn min_withdraw(venue: Venue, coin: &str) -> f64 {
    match coin {
        "XRP" => MIN_WITHDRAW_XRP[venue.index()],
        _ => 0.0,
    }
}

/// Fee charged on `amount`.
#[must_use]
pub const fn calculate_fee(amount: f64, venue: Venue, is_maker: bool) -> f64 {
    amount * fee(venue, is_maker)
}

/// `amount` net of the trading fee.
#[must_use]
pub const fn after_fee(amount: f64, venue: Venue, is_maker: bool) -> f64 {
    amount * (1.0 - fee(venue, is_maker))
}

/// Taker-in, taker-out round-trip fee rate for a venue pair.
#[must_use]
pub const fn round_trip_fee(buy: Venue, sell: Venue) -> f64 {
    taker_fee(buy) + taker_fee(sell)
}

/// Smallest premium (fraction) at which a round trip is non-loss after
/// fees plus the safety margin.
#[must_use]
pub const fn breakeven(buy: Venue, sell: Venue) -> f64 {
    round_trip_fee(buy, sell) + SAFETY_MARGIN
}

/// Suggested entry threshold: break-even plus the target profit.
#[must_use]
pub const fn optimal_threshold(buy: Venue, sell: Venue) -> f64 {
    breakeven(buy, sell) + TARGET_PROFIT
}

/// Bounds-checks every table entry (0 <= fee <= 1%). Run once at startup.
pub fn validate() -> Result<()> {
    for venue in Venue::ALL {
        let idx = venue.index();
        for (name, rate) in [("maker", MAKER_FEE[idx]), ("taker", TAKER_FEE[idx])] {
            if !(0.0..=0.01).contains(&rate) {
                return Err(Error::Config(format!(
                    "{name} fee for {venue} out of range: {rate}"
                )));
            }
        }
        if WITHDRAW_FEE_XRP[idx] < 0.0 || MIN_WITHDRAW_XRP[idx] < 0.0 {
            return Err(Error::Config(format!("negative XRP table entry for {venue}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_validate() {
        validate().unwrap();
    }

    #[test]
    fn test_fee_lookup() {
        assert_eq!(maker_fee(Venue::MexcUsdt), 0.0);
        assert_eq!(taker_fee(Venue::BinanceUsdt), 0.0010);
        assert_eq!(fee(Venue::UpbitKrw, true), 0.0005);
        assert_eq!(fee(Venue::UpbitKrw, false), 0.0005);
    }

    #[test]
    fn test_withdraw_tables() {
        assert_eq!(withdraw_fee(Venue::BinanceUsdt, "XRP"), 0.25);
        assert_eq!(withdraw_fee(Venue::UpbitKrw, "XRP"), 1.0);
        assert_eq!(min_withdraw(Venue::BinanceUsdt, "XRP"), 20.0);
        assert_eq!(min_withdraw(Venue::BithumbKrw, "XRP"), 25.0);
        assert_eq!(withdraw_fee(Venue::UpbitKrw, "BTC"), 0.0);
    }

    #[test]
    fn test_breakeven_composition() {
        let be = breakeven(Venue::BinanceUsdt, Venue::UpbitKrw);
        let expected = TAKER_FEE[2] + TAKER_FEE[0] + SAFETY_MARGIN;
        assert!((be - expected).abs() < 1e-12);
        assert!(optimal_threshold(Venue::BinanceUsdt, Venue::UpbitKrw) > be);
    }

    #[test]
    fn test_fee_arithmetic() {
        let amount = 1_000_000.0;
        assert!((calculate_fee(amount, Venue::UpbitKrw, false) - 500.0).abs() < 1e-9);
        assert!((after_fee(amount, Venue::UpbitKrw, false) - 999_500.0).abs() < 1e-9);
    }
}
