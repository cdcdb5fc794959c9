//! Textual amount parsing.
//!
//! The accepted syntax for a single amount is either number-first or
//! symbol-first:
//!
//! ```text
//! [-]NUM[ ]SYM
//! SYM[ ][-]NUM
//! ```
//!
//! where `NUM` draws from digits, `-`, `.`, and `,`, and `SYM` is either
//! a run of characters containing no whitespace, digits, `-`, or `.`, or
//! any text inside double quotes. Punctuation observed in the number
//! decides the commodity's decimal mark, thousands grouping, and
//! precision; the first occurrence of a commodity shapes its display
//! style, and later occurrences may still raise its precision unless
//! migration is suppressed.

use std::sync::Arc;

use bitflags::bitflags;
use num_bigint::BigInt;

use crate::amount::{Amount, AmountError, AmountResult};
use crate::commodity::{CommodityFlags, CommodityPool};
use crate::quantity::{Precision, Quantity};

bitflags! {
    /// Flags controlling a single parse.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ParseFlags: u8 {
        /// Do not alter an existing commodity's display flags or
        /// precision. A newly created commodity still takes its style
        /// from this occurrence.
        const NO_MIGRATE = 0x01;
        /// Skip the conversion-chain reduction normally applied after
        /// parsing.
        const NO_REDUCE = 0x02;
    }
}

struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self { input: input.as_bytes(), pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) {
        self.pos += 1;
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b) if b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, keep: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if keep(b)) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }
}

fn is_quantity_byte(b: u8) -> bool {
    b.is_ascii_digit() || b == b'-' || b == b'.' || b == b','
}

fn scan_quantity<'a>(scanner: &mut Scanner<'a>) -> &'a str {
    scanner.skip_whitespace();
    let bytes = scanner.take_while(is_quantity_byte);
    std::str::from_utf8(bytes).unwrap_or_default()
}

fn scan_commodity(scanner: &mut Scanner<'_>) -> AmountResult<String> {
    scanner.skip_whitespace();
    if scanner.peek() == Some(b'"') {
        scanner.bump();
        let bytes = scanner.take_while(|b| b != b'"');
        if scanner.peek() != Some(b'"') {
            return Err(AmountError::Syntax(
                "Quoted commodity symbol lacks closing quote".to_string(),
            ));
        }
        scanner.bump();
        Ok(String::from_utf8_lossy(bytes).into_owned())
    } else {
        let bytes = scanner.take_while(|b| {
            !b.is_ascii_whitespace() && !b.is_ascii_digit() && b != b'-' && b != b'.'
        });
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

pub(crate) fn parse_amount(
    input: &str,
    flags: ParseFlags,
    pool: &mut CommodityPool,
) -> AmountResult<Amount> {
    let mut scanner = Scanner::new(input);
    let mut comm_flags = CommodityFlags::empty();
    let mut negative = false;

    scanner.skip_whitespace();
    if scanner.peek() == Some(b'-') {
        negative = true;
        scanner.bump();
        scanner.skip_whitespace();
    }

    let symbol;
    let quant;
    match scanner.peek() {
        Some(b) if b.is_ascii_digit() || b == b'.' => {
            quant = scan_quantity(&mut scanner);
            match scanner.peek() {
                Some(next) if next != b'\n' => {
                    if next.is_ascii_whitespace() {
                        comm_flags |= CommodityFlags::SEPARATED;
                    }
                    symbol = scan_commodity(&mut scanner)?;
                    if !symbol.is_empty() {
                        comm_flags |= CommodityFlags::SUFFIXED;
                    }
                }
                _ => symbol = String::new(),
            }
        }
        _ => {
            symbol = scan_commodity(&mut scanner)?;
            if matches!(scanner.peek(), Some(b) if b.is_ascii_whitespace()) {
                comm_flags |= CommodityFlags::SEPARATED;
            }
            quant = scan_quantity(&mut scanner);
        }
    }

    if !quant.bytes().any(|b| b.is_ascii_digit()) {
        return Err(AmountError::Syntax("No quantity specified for amount".to_string()));
    }

    // Create the commodity if it has not already been seen, and update
    // its precision if something finer was used for the quantity.
    let newly_created = pool.find(&symbol).is_none();
    let commodity = pool.find_or_create(&symbol);

    // The precision of the amount follows from how comma and period
    // were used: the later of the two is the decimal mark.
    let last_comma = quant.rfind(',');
    let last_period = quant.rfind('.');

    let mut precision: Precision = 0;
    match (last_comma, last_period) {
        (Some(comma), Some(period)) => {
            comm_flags |= CommodityFlags::THOUSANDS;
            if comma > period {
                comm_flags |= CommodityFlags::EUROPEAN;
                precision = (quant.len() - comma - 1) as Precision;
            } else {
                precision = (quant.len() - period - 1) as Precision;
            }
        }
        (Some(comma), None) => {
            let default_is_european = match pool.default_commodity() {
                None => true,
                Some(id) => pool[id].has_flags(CommodityFlags::EUROPEAN),
            };
            if default_is_european {
                comm_flags |= CommodityFlags::EUROPEAN;
                precision = (quant.len() - comma - 1) as Precision;
            }
        }
        (None, Some(period)) => {
            if !pool[commodity].has_flags(CommodityFlags::EUROPEAN) {
                precision = (quant.len() - period - 1) as Precision;
            }
        }
        (None, None) => {}
    }

    if newly_created || !flags.contains(ParseFlags::NO_MIGRATE) {
        let entry = pool.commodity_mut(commodity);
        entry.add_flags(comm_flags);
        if precision > entry.precision() {
            entry.set_precision(precision);
        }
    }

    let digits: String = quant.chars().filter(|&c| c != ',' && c != '.').collect();
    let mantissa = BigInt::parse_bytes(digits.as_bytes(), 10)
        .ok_or_else(|| AmountError::Syntax("No quantity specified for amount".to_string()))?;

    let mut amount = Amount::from_parts(
        Some(Arc::new(Quantity::new(mantissa, precision))),
        Some(commodity),
    );
    if negative {
        amount.in_place_negate();
    }
    if !flags.contains(ParseFlags::NO_REDUCE) {
        amount.in_place_reduce(pool);
    }
    Ok(amount)
}
