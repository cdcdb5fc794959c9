//! Amount rendering.
//!
//! Rendering consults the commodity recorded in the pool: symbol
//! placement and quoting, decimal mark and thousands grouping, display
//! precision, and the `larger` conversion chain, which promotes an
//! amount to the largest unit whose magnitude still reads as at least
//! one (so 5400 seconds prints as `1.5h`).

use std::fmt;

use num_bigint::{BigInt, Sign};
use num_traits::Zero;

use crate::amount::Amount;
use crate::commodity::{Commodity, CommodityFlags, CommodityId, CommodityPool};
use crate::quantity::{pow10, round_mantissa, Precision};

/// Borrowing adapter that renders an [`Amount`] against a
/// [`CommodityPool`], obtained from [`Amount::display`].
///
/// The amount is built to a string before being written, so a width or
/// fill on the formatter applies to the whole amount rather than its
/// first segment.
pub struct AmountDisplay<'a> {
    amount: &'a Amount,
    pool: &'a CommodityPool,
}

impl<'a> AmountDisplay<'a> {
    pub(crate) fn new(amount: &'a Amount, pool: &'a CommodityPool) -> Self {
        Self { amount, pool }
    }
}

impl fmt::Display for AmountDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&render(self.amount, self.pool))
    }
}

/// Walk up the `larger` conversion chain, stopping one step before the
/// magnitude drops below one unit.
fn promote(amount: &Amount, pool: &CommodityPool) -> Amount {
    let start = amount.commodity().unwrap_or(CommodityId::NULL);
    if pool[start].larger().is_none() {
        return amount.clone();
    }
    let one = Amount::from(1i64);
    let mut base = amount.clone();
    let mut last = amount.clone();
    loop {
        let id = last.commodity().unwrap_or(CommodityId::NULL);
        let Some(larger) = pool[id].larger() else { break };
        let next = larger.commodity();
        if last.div_amount(larger, pool).is_err() {
            break;
        }
        last.commodity = next;
        if last.abs() < one {
            break;
        }
        base = last.clone();
    }
    base
}

fn push_symbol(out: &mut String, commodity: &Commodity) {
    if commodity.is_quoted() {
        out.push('"');
        out.push_str(commodity.symbol());
        out.push('"');
    } else {
        out.push_str(commodity.symbol());
    }
}

fn render(amount: &Amount, pool: &CommodityPool) -> String {
    if amount.quantity.is_none() {
        return "0".to_string();
    }
    let base = promote(amount, pool);
    let Some(cell) = base.quantity.as_deref() else {
        return "0".to_string();
    };

    let comm_id = base.commodity.unwrap_or(CommodityId::NULL);
    let comm = &pool[comm_id];
    let stored = cell.precision;

    // The value is rounded to the commodity's precision before being
    // split into integer and fractional digits; the null commodity and
    // VARIABLE commodities show the stored precision as-is.
    let (mantissa, precision): (BigInt, Precision) =
        if comm_id.is_null() || comm.has_flags(CommodityFlags::VARIABLE) {
            (cell.mantissa.clone(), stored)
        } else if comm.precision() < stored {
            (round_mantissa(&cell.mantissa, stored, comm.precision()), comm.precision())
        } else if comm.precision() > stored {
            (&cell.mantissa * pow10(comm.precision() - stored), comm.precision())
        } else {
            (cell.mantissa.clone(), stored)
        };

    let divisor = pow10(precision);
    let quotient = &mantissa / &divisor;
    let remainder = &mantissa % &divisor;
    let negative = quotient.sign() == Sign::Minus || remainder.sign() == Sign::Minus;

    if quotient.is_zero() && remainder.is_zero() {
        return "0".to_string();
    }

    let flags = comm.flags();
    let mut out = String::new();

    if !flags.contains(CommodityFlags::SUFFIXED) {
        push_symbol(&mut out, comm);
        if flags.contains(CommodityFlags::SEPARATED) {
            out.push(' ');
        }
    }

    if negative {
        out.push('-');
    }

    let int_digits = quotient.magnitude().to_string();
    if quotient.is_zero() {
        out.push('0');
    } else if !flags.contains(CommodityFlags::THOUSANDS) {
        out.push_str(&int_digits);
    } else {
        let separator = if flags.contains(CommodityFlags::EUROPEAN) { '.' } else { ',' };
        for (i, digit) in int_digits.chars().enumerate() {
            if i > 0 && (int_digits.len() - i) % 3 == 0 {
                out.push(separator);
            }
            out.push(digit);
        }
    }

    if precision > 0 {
        let padded = format!(
            "{:0>width$}",
            remainder.magnitude().to_string(),
            width = precision as usize
        );
        // Strip trailing zeros, but never below the commodity's display
        // precision.
        let significant = padded.trim_end_matches('0').len();
        let keep = if significant == padded.len() {
            padded.len()
        } else if significant < comm.precision() as usize {
            (comm.precision() as usize).min(padded.len())
        } else {
            significant
        };
        let fraction = &padded[..keep];
        if !fraction.is_empty() {
            out.push(if flags.contains(CommodityFlags::EUROPEAN) { ',' } else { '.' });
            out.push_str(fraction);
        }
    }

    if flags.contains(CommodityFlags::SUFFIXED) {
        if flags.contains(CommodityFlags::SEPARATED) {
            out.push(' ');
        }
        push_symbol(&mut out, comm);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_renders_bare() {
        let pool = CommodityPool::new();
        assert_eq!(Amount::zero().display(&pool).to_string(), "0");
    }

    #[test]
    fn test_width_applies_to_whole_amount() {
        let mut pool = CommodityPool::new();
        let amount = Amount::parse("$100.00", &mut pool).unwrap();
        assert_eq!(format!("{:>10}", amount.display(&pool)), "   $100.00");
        assert_eq!(format!("{:<10}", amount.display(&pool)), "$100.00   ");
    }

    #[test]
    fn test_thousands_grouping() {
        let mut pool = CommodityPool::new();
        let amount = Amount::parse("$1,234,567.89", &mut pool).unwrap();
        assert_eq!(amount.display(&pool).to_string(), "$1,234,567.89");
    }

    #[test]
    fn test_european_grouping() {
        let mut pool = CommodityPool::new();
        let amount = Amount::parse("1.234.567,89 EUR", &mut pool).unwrap();
        assert_eq!(amount.display(&pool).to_string(), "1.234.567,89 EUR");
    }

    #[test]
    fn test_display_rounds_to_commodity_precision() {
        let mut pool = CommodityPool::new();
        Amount::parse("$1.00", &mut pool).unwrap();
        let ten = Amount::parse("$10", &mut pool).unwrap();
        let three = Amount::parse("$3", &mut pool).unwrap();
        let quotient = ten.div(&three, &pool).unwrap();
        assert_eq!(quotient.precision(), 6);
        assert_eq!(quotient.display(&pool).to_string(), "$3.33");
    }

    #[test]
    fn test_fraction_trailing_zeros_stripped_to_display_precision() {
        let mut pool = CommodityPool::new();
        // Null commodity with migrated precision 2; a stored third digit
        // of zero is stripped back to two digits.
        let amount = Amount::parse("1.250", &mut pool).unwrap();
        let null = crate::commodity::CommodityId::NULL;
        assert_eq!(pool[null].precision(), 3);
        assert_eq!(amount.display(&pool).to_string(), "1.250");
    }

    #[test]
    fn test_promotes_seconds_to_hours() {
        let mut pool = CommodityPool::new();
        let amount = Amount::parse("1.5h", &mut pool).unwrap();
        assert_eq!(amount.to_i64(), Some(5400));
        assert_eq!(amount.display(&pool).to_string(), "1.5h");
    }
}
