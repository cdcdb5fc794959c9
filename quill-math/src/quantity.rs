//! Quantity cells: the mantissa/precision pairs behind every [`Amount`].
//!
//! A cell stores an unbounded signed mantissa together with the number of
//! implied fractional decimal digits, so the numeric value is
//! `mantissa / 10^precision`. Cells are shared between amounts through
//! `Arc`; mutation always goes through `Arc::make_mut`, which duplicates
//! the cell when it is shared.
//!
//! [`Amount`]: crate::amount::Amount

use num_bigint::{BigInt, Sign};
use num_traits::Zero;

/// Count of implied fractional decimal digits carried by a cell.
pub type Precision = u16;

/// Upper bound on cell precision; exceeding it is a programmer error.
pub(crate) const MAX_PRECISION: Precision = 256;

/// `10^digits` as a big integer.
pub(crate) fn pow10(digits: Precision) -> BigInt {
    BigInt::from(10u8).pow(u32::from(digits))
}

/// A reference-counted decimal cell: unbounded mantissa plus implied
/// fractional digit count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantity {
    pub(crate) mantissa: BigInt,
    pub(crate) precision: Precision,
}

impl Quantity {
    /// Create a cell from a raw mantissa and precision.
    pub fn new(mantissa: BigInt, precision: Precision) -> Self {
        debug_assert!(precision < MAX_PRECISION);
        Self { mantissa, precision }
    }

    /// The raw mantissa.
    pub fn mantissa(&self) -> &BigInt {
        &self.mantissa
    }

    /// The implied fractional digit count.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Sign of the mantissa: -1, 0, or +1.
    pub fn sign(&self) -> i32 {
        match self.mantissa.sign() {
            Sign::Minus => -1,
            Sign::NoSign => 0,
            Sign::Plus => 1,
        }
    }

    /// Rescale to exactly `precision` fractional digits. Shrinking
    /// truncates toward zero; growing multiplies by a power of ten.
    pub(crate) fn resize(&mut self, precision: Precision) {
        debug_assert!(precision < MAX_PRECISION);
        if precision == self.precision {
            return;
        }
        if precision < self.precision {
            self.mantissa = &self.mantissa / pow10(self.precision - precision);
        } else {
            self.mantissa *= pow10(precision - self.precision);
        }
        self.precision = precision;
    }

    /// Round half-away-from-zero down to `precision` fractional digits.
    /// Only ever called with fewer digits than the cell carries.
    pub(crate) fn round_to(&mut self, precision: Precision) {
        debug_assert!(self.precision > precision);
        self.mantissa = round_mantissa(&self.mantissa, self.precision, precision);
        self.precision = precision;
    }
}

/// Round `value`, carrying `value_prec` fractional digits, to a mantissa
/// carrying `round_prec` digits, half-away-from-zero.
pub(crate) fn round_mantissa(
    value: &BigInt,
    value_prec: Precision,
    round_prec: Precision,
) -> BigInt {
    debug_assert!(value_prec > round_prec);

    let divisor = pow10(value_prec - round_prec);
    let remainder = value % &divisor;
    // Half of the divisor, the round-away threshold.
    let threshold = &divisor / 10u8 * 5u8;

    let adjusted = if remainder.sign() == Sign::Minus {
        if remainder < -&threshold {
            value - (&divisor + &remainder)
        } else {
            value - &remainder
        }
    } else if remainder >= threshold {
        value + (&divisor - &remainder)
    } else {
        value - &remainder
    };

    // Chop off the (now zero) rounded digits.
    adjusted / divisor
}

impl Default for Quantity {
    fn default() -> Self {
        Self { mantissa: BigInt::zero(), precision: 0 }
    }
}
