//! The [`Amount`] value type: an exact decimal quantity tagged with an
//! optional commodity.
//!
//! Amounts are copy-on-write pairs of a shared [`Quantity`] cell and a
//! [`CommodityId`]. Cloning an amount shares its cell; any mutating
//! operation duplicates the cell first when it is shared, so clones are
//! never disturbed. An amount without a cell is *the* zero amount, and a
//! zero amount never carries a commodity.
//!
//! Operations that consult commodity state (display precision while
//! trimming products and quotients, conversion chains, price history)
//! take the owning [`CommodityPool`] as an argument; nothing in this
//! crate is process-global.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use num_bigint::BigInt;
use num_traits::{FromPrimitive, Signed, ToPrimitive, Zero};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commodity::{CommodityFlags, CommodityId, CommodityPool};
use crate::formatting::AmountDisplay;
use crate::parsing::{self, ParseFlags};
use crate::quantity::{pow10, Precision, Quantity};

/// Extra fractional digits carried beyond a commodity's display
/// precision, so that chains of multiplications and divisions keep
/// guard digits before display rounding.
pub const EXTEND_BY_DIGITS: Precision = 6;

/// Errors surfaced by amount operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    /// Adding or subtracting amounts whose commodities differ.
    #[error("Cannot combine amounts with different commodities")]
    CommodityMismatch,
    /// The right operand of a division was the zero amount.
    #[error("Divide by zero")]
    DivideByZero,
    /// The parser rejected its input.
    #[error("{0}")]
    Syntax(String),
}

/// Result type for amount operations.
pub type AmountResult<T> = Result<T, AmountError>;

/// A signed decimal value in some unit.
///
/// The numeric value is `mantissa / 10^precision`, held exactly in an
/// unbounded integer. `quantity` absent means zero; `commodity` is an
/// index into the [`CommodityPool`] the amount was parsed or built
/// against.
#[derive(Clone)]
pub struct Amount {
    pub(crate) quantity: Option<Arc<Quantity>>,
    pub(crate) commodity: Option<CommodityId>,
}

impl Amount {
    /// The zero amount: no quantity, no commodity.
    pub fn zero() -> Self {
        Self { quantity: None, commodity: None }
    }

    pub(crate) fn from_parts(
        quantity: Option<Arc<Quantity>>,
        commodity: Option<CommodityId>,
    ) -> Self {
        Self { quantity, commodity }
    }

    fn from_mantissa(mantissa: BigInt) -> Self {
        if mantissa.is_zero() {
            Self::zero()
        } else {
            Self { quantity: Some(Arc::new(Quantity::new(mantissa, 0))), commodity: None }
        }
    }

    /// Build an amount from a float, truncating any fractional part
    /// toward zero. Returns `None` for NaN or infinite input.
    pub fn from_f64(value: f64) -> Option<Self> {
        if value == 0.0 {
            return Some(Self::zero());
        }
        BigInt::from_f64(value).map(|mantissa| Self {
            quantity: Some(Arc::new(Quantity::new(mantissa, 0))),
            commodity: None,
        })
    }

    /// Parse an amount, interning its commodity into `pool` and letting
    /// the occurrence shape the commodity's display style.
    pub fn parse(input: &str, pool: &mut CommodityPool) -> AmountResult<Self> {
        parsing::parse_amount(input, ParseFlags::empty(), pool)
    }

    /// [`parse`](Self::parse) with explicit parser flags.
    pub fn parse_with_flags(
        input: &str,
        flags: ParseFlags,
        pool: &mut CommodityPool,
    ) -> AmountResult<Self> {
        parsing::parse_amount(input, flags, pool)
    }

    /// The raw mantissa, when a quantity is present.
    pub fn mantissa(&self) -> Option<&BigInt> {
        self.quantity.as_deref().map(Quantity::mantissa)
    }

    /// Stored precision: fractional digits currently carried. Zero for
    /// the zero amount.
    pub fn precision(&self) -> Precision {
        self.quantity.as_deref().map_or(0, Quantity::precision)
    }

    /// The commodity this amount is denominated in, if any.
    pub fn commodity(&self) -> Option<CommodityId> {
        self.commodity
    }

    /// Whether a commodity is attached.
    pub fn has_commodity(&self) -> bool {
        self.commodity.is_some()
    }

    /// Attach a commodity. An amount without a quantity is given an
    /// explicit zero cell first, keeping it structurally valid.
    pub fn set_commodity(&mut self, commodity: CommodityId) {
        if self.quantity.is_none() {
            self.quantity = Some(Arc::new(Quantity::default()));
        }
        self.commodity = Some(commodity);
    }

    /// Detach the commodity, leaving the bare quantity.
    pub fn clear_commodity(&mut self) {
        self.commodity = None;
    }

    /// A copy of this amount without its commodity.
    pub fn number(&self) -> Self {
        let mut result = self.clone();
        result.clear_commodity();
        result
    }

    /// Structural invariant check: a commodity requires a quantity.
    pub fn valid(&self) -> bool {
        self.quantity.is_some() || self.commodity.is_none()
    }

    /// Sign of the value: -1, 0, or +1.
    pub fn sign(&self) -> i32 {
        self.quantity.as_deref().map_or(0, Quantity::sign)
    }

    /// Whether the exact value is zero, at full stored precision.
    pub fn is_realzero(&self) -> bool {
        self.sign() == 0
    }

    /// Whether the value is nonzero once truncated to the commodity's
    /// display precision. A residue smaller than the display precision
    /// counts as zero here even though [`is_realzero`](Self::is_realzero)
    /// is false.
    pub fn is_nonzero(&self, pool: &CommodityPool) -> bool {
        let Some(cell) = self.quantity.as_deref() else {
            return false;
        };
        let display = pool.display_precision(self.commodity);
        if cell.precision <= display {
            return !cell.mantissa.is_zero();
        }
        let dropped = if self.commodity.is_some() {
            cell.precision - display
        } else {
            cell.precision
        };
        !(&cell.mantissa / pow10(dropped)).is_zero()
    }

    /// Inverse of [`is_nonzero`](Self::is_nonzero).
    pub fn is_zero(&self, pool: &CommodityPool) -> bool {
        !self.is_nonzero(pool)
    }

    /// Whether both amounts share one quantity cell.
    pub fn shares_quantity(&self, other: &Amount) -> bool {
        match (&self.quantity, &other.quantity) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Add `other` in place. Zero on the right is a no-op; zero on the
    /// left takes over the right operand wholesale.
    pub fn add_amount(&mut self, other: &Amount) -> AmountResult<()> {
        let Some(rhs) = other.quantity.as_deref() else {
            return Ok(());
        };
        let Some(arc) = self.quantity.as_mut() else {
            *self = other.clone();
            return Ok(());
        };
        if self.commodity != other.commodity {
            return Err(AmountError::CommodityMismatch);
        }
        let cell = Arc::make_mut(arc);
        match cell.precision.cmp(&rhs.precision) {
            Ordering::Equal => cell.mantissa += &rhs.mantissa,
            Ordering::Less => {
                cell.resize(rhs.precision);
                cell.mantissa += &rhs.mantissa;
            }
            Ordering::Greater => {
                cell.mantissa += &rhs.mantissa * pow10(cell.precision - rhs.precision);
            }
        }
        Ok(())
    }

    /// Subtract `other` in place. Zero on the right is a no-op; zero on
    /// the left becomes the negated right operand.
    pub fn sub_amount(&mut self, other: &Amount) -> AmountResult<()> {
        let Some(rhs) = other.quantity.as_deref() else {
            return Ok(());
        };
        let Some(arc) = self.quantity.as_mut() else {
            *self = other.negated();
            return Ok(());
        };
        if self.commodity != other.commodity {
            return Err(AmountError::CommodityMismatch);
        }
        let cell = Arc::make_mut(arc);
        match cell.precision.cmp(&rhs.precision) {
            Ordering::Equal => cell.mantissa -= &rhs.mantissa,
            Ordering::Less => {
                cell.resize(rhs.precision);
                cell.mantissa -= &rhs.mantissa;
            }
            Ordering::Greater => {
                cell.mantissa -= &rhs.mantissa * pow10(cell.precision - rhs.precision);
            }
        }
        Ok(())
    }

    /// Multiply by `other` in place. The commodity stays the left
    /// operand's; precisions add, then the result is rounded back to
    /// the commodity's display precision plus [`EXTEND_BY_DIGITS`]
    /// guard digits when it grew past that.
    pub fn mul_amount(&mut self, other: &Amount, pool: &CommodityPool) {
        let Some(rhs) = other.quantity.as_deref() else {
            self.quantity = None;
            self.commodity = None;
            return;
        };
        let Some(arc) = self.quantity.as_mut() else {
            return;
        };
        let cell = Arc::make_mut(arc);
        cell.mantissa *= &rhs.mantissa;
        cell.precision += rhs.precision;

        let limit = pool.display_precision(self.commodity) + EXTEND_BY_DIGITS;
        if cell.precision > limit {
            cell.round_to(limit);
        }
    }

    /// Divide by `other` in place. The dividend is scaled up by the
    /// divisor's precision plus [`EXTEND_BY_DIGITS`] before a truncating
    /// divide, then trimmed like a product.
    pub fn div_amount(&mut self, other: &Amount, pool: &CommodityPool) -> AmountResult<()> {
        let rhs = match other.quantity.as_deref() {
            Some(rhs) => rhs,
            None => return Err(AmountError::DivideByZero),
        };
        if !other.is_nonzero(pool) {
            return Err(AmountError::DivideByZero);
        }
        let Some(arc) = self.quantity.as_mut() else {
            return Ok(());
        };
        let cell = Arc::make_mut(arc);
        cell.mantissa *= pow10(rhs.precision + EXTEND_BY_DIGITS);
        cell.mantissa = &cell.mantissa / &rhs.mantissa;
        cell.precision += EXTEND_BY_DIGITS;

        let limit = pool.display_precision(self.commodity) + EXTEND_BY_DIGITS;
        if cell.precision > limit {
            cell.round_to(limit);
        }
        Ok(())
    }

    /// Product of `self` and `other`.
    pub fn mul(&self, other: &Amount, pool: &CommodityPool) -> Amount {
        let mut result = self.clone();
        result.mul_amount(other, pool);
        result
    }

    /// Quotient of `self` over `other`.
    pub fn div(&self, other: &Amount, pool: &CommodityPool) -> AmountResult<Amount> {
        let mut result = self.clone();
        result.div_amount(other, pool)?;
        Ok(result)
    }

    /// Flip the sign in place.
    pub fn in_place_negate(&mut self) {
        if let Some(arc) = self.quantity.as_mut() {
            let cell = Arc::make_mut(arc);
            cell.mantissa = -std::mem::take(&mut cell.mantissa);
        }
    }

    /// The negated value.
    pub fn negated(&self) -> Self {
        let mut result = self.clone();
        result.in_place_negate();
        result
    }

    /// The absolute value.
    pub fn abs(&self) -> Self {
        if self.sign() < 0 {
            self.negated()
        } else {
            self.clone()
        }
    }

    /// Round half-away-from-zero to `precision` fractional digits.
    /// Amounts already at or below that precision are returned
    /// unchanged.
    pub fn round(&self, precision: Precision) -> Self {
        let mut result = self.clone();
        if let Some(arc) = result.quantity.as_mut() {
            if arc.precision() > precision {
                Arc::make_mut(arc).round_to(precision);
            }
        }
        result
    }

    /// Rewrite in the smallest unit of the commodity's conversion
    /// chain, multiplying through each `smaller` link.
    pub fn in_place_reduce(&mut self, pool: &CommodityPool) {
        loop {
            let Some(id) = self.commodity else { break };
            let Some(smaller) = pool[id].smaller() else { break };
            let next = smaller.commodity();
            self.mul_amount(smaller, pool);
            self.commodity = next;
        }
    }

    /// [`in_place_reduce`](Self::in_place_reduce) on a copy.
    pub fn reduced(&self, pool: &CommodityPool) -> Self {
        let mut result = self.clone();
        result.in_place_reduce(pool);
        result
    }

    /// Market value at `moment` (`None` for the latest quote). Amounts
    /// in a `NOMARKET` commodity, and amounts for which no nonzero
    /// quote is on file, are returned as-is; otherwise the price times
    /// self, rounded to the price commodity's display precision.
    pub fn value(&self, moment: Option<DateTime<Utc>>, pool: &mut CommodityPool) -> Amount {
        if self.quantity.is_none() {
            return self.clone();
        }
        let commodity = self.commodity.unwrap_or(CommodityId::NULL);
        if pool[commodity].has_flags(CommodityFlags::NOMARKET) {
            return self.clone();
        }
        let price = pool.price(commodity, moment);
        if price.is_nonzero(pool) {
            let display = pool.display_precision(price.commodity());
            price.mul(self, pool).round(display)
        } else {
            self.clone()
        }
    }

    /// Truncate to a whole number of units. `None` when the result does
    /// not fit in an `i64`.
    pub fn to_i64(&self) -> Option<i64> {
        match self.quantity.as_deref() {
            None => Some(0),
            Some(cell) => (&cell.mantissa / pow10(cell.precision)).to_i64(),
        }
    }

    /// Best-effort conversion through a decimal string; precision
    /// beyond what an `f64` holds is lost.
    pub fn to_f64(&self) -> f64 {
        let Some(cell) = self.quantity.as_deref() else {
            return 0.0;
        };
        let divisor = pow10(cell.precision);
        let magnitude = cell.mantissa.abs();
        let int_part = &magnitude / &divisor;
        let frac_part = &magnitude % &divisor;
        let text = format!(
            "{}{}.{:0>width$}",
            if cell.sign() < 0 { "-" } else { "" },
            int_part,
            frac_part,
            width = cell.precision as usize
        );
        text.parse().unwrap_or(0.0)
    }

    /// Displayable form of this amount, rendered with the commodity
    /// styles recorded in `pool`.
    pub fn display<'a>(&'a self, pool: &'a CommodityPool) -> AmountDisplay<'a> {
        AmountDisplay::new(self, pool)
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::zero()
    }
}

/// Comparison between amounts.
///
/// When either side is the zero amount, the result is the ordering of
/// the *other* side's sign against zero, whichever side was zero; this
/// preserves the historical predicate behavior rather than a strict
/// numeric ordering. Amounts in different non-null commodities are
/// incomparable: `partial_cmp` returns `None`, so every relational
/// predicate, equality included, is false for them.
impl PartialOrd for Amount {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.quantity.as_deref(), other.quantity.as_deref()) {
            (None, None) => Some(Ordering::Equal),
            (None, Some(cell)) | (Some(cell), None) => Some(match cell.sign() {
                s if s < 0 => Ordering::Less,
                0 => Ordering::Equal,
                _ => Ordering::Greater,
            }),
            (Some(lhs), Some(rhs)) => {
                let lc = self.commodity.filter(|id| !id.is_null());
                let rc = other.commodity.filter(|id| !id.is_null());
                if let (Some(a), Some(b)) = (lc, rc) {
                    if a != b {
                        return None;
                    }
                }
                Some(match lhs.precision.cmp(&rhs.precision) {
                    Ordering::Equal => lhs.mantissa.cmp(&rhs.mantissa),
                    Ordering::Less => (&lhs.mantissa * pow10(rhs.precision - lhs.precision))
                        .cmp(&rhs.mantissa),
                    Ordering::Greater => lhs
                        .mantissa
                        .cmp(&(&rhs.mantissa * pow10(lhs.precision - rhs.precision))),
                })
            }
        }
    }
}

// Equality follows partial_cmp, so amounts in different commodities are
// never equal, not even to themselves. Eq, Ord, and Hash are therefore
// left unimplemented.
impl PartialEq for Amount {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl fmt::Debug for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.quantity.as_deref() {
            None => write!(f, "Amount(0)"),
            Some(cell) => {
                write!(f, "Amount({}e-{}", cell.mantissa, cell.precision)?;
                if let Some(id) = self.commodity {
                    write!(f, ", commodity #{}", id.0)?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<bool> for Amount {
    fn from(value: bool) -> Self {
        if value {
            Self::from_mantissa(BigInt::from(1))
        } else {
            Self::zero()
        }
    }
}

impl From<i32> for Amount {
    fn from(value: i32) -> Self {
        Self::from_mantissa(BigInt::from(value))
    }
}

impl From<i64> for Amount {
    fn from(value: i64) -> Self {
        Self::from_mantissa(BigInt::from(value))
    }
}

impl From<u32> for Amount {
    fn from(value: u32) -> Self {
        Self::from_mantissa(BigInt::from(value))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self::from_mantissa(BigInt::from(value))
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        if value.is_zero() {
            return Self::zero();
        }
        let mantissa = BigInt::from(value.mantissa());
        Self {
            quantity: Some(Arc::new(Quantity::new(mantissa, value.scale() as Precision))),
            commodity: None,
        }
    }
}

// Fallible arithmetic does not fit AddAssign/SubAssign; use the
// *_amount methods for in-place work. Multiplication and division also
// need the commodity pool for display-precision trimming, so they are
// inherent methods rather than operator impls.

impl std::ops::Add for Amount {
    type Output = AmountResult<Amount>;

    fn add(mut self, other: Amount) -> Self::Output {
        self.add_amount(&other)?;
        Ok(self)
    }
}

impl std::ops::Add<&Amount> for Amount {
    type Output = AmountResult<Amount>;

    fn add(mut self, other: &Amount) -> Self::Output {
        self.add_amount(other)?;
        Ok(self)
    }
}

impl std::ops::Add<Amount> for &Amount {
    type Output = AmountResult<Amount>;

    fn add(self, other: Amount) -> Self::Output {
        let mut result = self.clone();
        result.add_amount(&other)?;
        Ok(result)
    }
}

impl std::ops::Add<&Amount> for &Amount {
    type Output = AmountResult<Amount>;

    fn add(self, other: &Amount) -> Self::Output {
        let mut result = self.clone();
        result.add_amount(other)?;
        Ok(result)
    }
}

impl std::ops::Sub for Amount {
    type Output = AmountResult<Amount>;

    fn sub(mut self, other: Amount) -> Self::Output {
        self.sub_amount(&other)?;
        Ok(self)
    }
}

impl std::ops::Sub<&Amount> for Amount {
    type Output = AmountResult<Amount>;

    fn sub(mut self, other: &Amount) -> Self::Output {
        self.sub_amount(other)?;
        Ok(self)
    }
}

impl std::ops::Sub<Amount> for &Amount {
    type Output = AmountResult<Amount>;

    fn sub(self, other: Amount) -> Self::Output {
        let mut result = self.clone();
        result.sub_amount(&other)?;
        Ok(result)
    }
}

impl std::ops::Sub<&Amount> for &Amount {
    type Output = AmountResult<Amount>;

    fn sub(self, other: &Amount) -> Self::Output {
        let mut result = self.clone();
        result.sub_amount(other)?;
        Ok(result)
    }
}

impl std::ops::Neg for Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        self.negated()
    }
}

impl std::ops::Neg for &Amount {
    type Output = Amount;

    fn neg(self) -> Amount {
        self.negated()
    }
}

#[derive(Serialize, Deserialize)]
struct AmountRepr {
    mantissa: Option<String>,
    precision: Precision,
}

// The commodity is a pool-relative index and is not serialized; callers
// re-attach commodities against their own pool, as the journal layer
// does for amounts loaded from caches.
impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let repr = match self.quantity.as_deref() {
            None => AmountRepr { mantissa: None, precision: 0 },
            Some(cell) => AmountRepr {
                mantissa: Some(cell.mantissa.to_string()),
                precision: cell.precision,
            },
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let repr = AmountRepr::deserialize(deserializer)?;
        match repr.mantissa {
            None => Ok(Self::zero()),
            Some(text) => {
                let mantissa: BigInt = text.parse().map_err(serde::de::Error::custom)?;
                Ok(Self {
                    quantity: Some(Arc::new(Quantity::new(mantissa, repr.precision))),
                    commodity: None,
                })
            }
        }
    }
}
