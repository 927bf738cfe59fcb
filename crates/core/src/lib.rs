//! Core types for the cross-venue arbitrage engine.
//!
//! Everything that more than one crate needs lives here: the [`Venue`]
//! enumeration, the fixed-size market-data and order records, the error
//! type, the parsed configuration, and the compile-time fee table.
//!
//! The record types (`Ticker`, `OrderBook`, `OrderRequest`, ...) are plain
//! `Copy` structs with inline string buffers so they can live in object
//! pools and cross lock-free queues without touching the allocator.

pub mod config;
pub mod error;
pub mod fees;
pub mod time;
pub mod types;
pub mod venue;

pub use error::{Error, Result};
pub use types::{
    Balance, FxRate, FxSourceTag, InlineStr, OrderBook, OrderRequest, OrderResult, OrderSide,
    OrderStatus, OrderType, PriceLevel, Symbol, Ticker, Trade, MAX_DEPTH,
};
pub use venue::Venue;
