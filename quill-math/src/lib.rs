//! Arbitrary-precision decimal arithmetic for the Quill accounting engine.
//!
//! Every monetary or quantitative value in a ledger is an [`Amount`]: an
//! exact decimal built on an unbounded integer mantissa, tagged with an
//! optional [`Commodity`]. Commodities live in a caller-owned
//! [`CommodityPool`] that records display style inferred from parsed
//! input, unit-conversion chains, and time-indexed price history. The
//! crate also provides the amount parser and formatter pair and a binary
//! quantity codec with cross-reference deduplication.

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod amount;
pub mod commodity;
pub mod formatting;
pub mod parsing;
pub mod quantity;
pub mod serialize;

// Re-export main types
pub use amount::{Amount, AmountError, AmountResult, EXTEND_BY_DIGITS};
pub use commodity::{
    Commodity, CommodityFlags, CommodityId, CommodityPool, PriceHistory, PriceUpdater,
};
pub use formatting::AmountDisplay;
pub use parsing::ParseFlags;
pub use quantity::{Precision, Quantity};
pub use serialize::{read_quantity, QuantityArena, QuantityWriter};

// Re-export for convenience
pub use num_bigint::BigInt;
pub use rust_decimal::Decimal;
