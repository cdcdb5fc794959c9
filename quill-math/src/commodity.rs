//! Commodities and the commodity registry.
//!
//! A commodity is a named unit (currency, share, hour) with display
//! style, display precision, optional links to neighboring units in a
//! conversion chain, and an optional price history. Commodities are
//! owned by a [`CommodityPool`] and addressed by a small [`CommodityId`]
//! index; amounts carry ids, never pointers, so the conversion graph
//! stays a plain tree inside the pool.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Index;

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use log::{debug, trace};

use crate::amount::{Amount, AmountResult};
use crate::quantity::Precision;

bitflags! {
    /// Display-style and behavior flags for a commodity.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CommodityFlags: u16 {
        /// Symbol is printed after the number.
        const SUFFIXED  = 0x01;
        /// One space between number and symbol.
        const SEPARATED = 0x02;
        /// `,` is the decimal mark and `.` groups thousands.
        const EUROPEAN  = 0x04;
        /// Emit group separators in the integer part.
        const THOUSANDS = 0x08;
        /// Never apply market valuation to this commodity.
        const NOMARKET  = 0x10;
        /// Created by the pool itself (`s`, `m`, `h`).
        const BUILTIN   = 0x20;
        /// Ignore the display precision when formatting; show the
        /// stored precision instead.
        const VARIABLE  = 0x40;
    }
}

/// Index of a commodity inside its [`CommodityPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommodityId(pub(crate) u32);

impl CommodityId {
    /// The null commodity: empty symbol, present in every pool at index 0.
    pub const NULL: CommodityId = CommodityId(0);

    /// Whether this id names the null commodity.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// Time-ordered price quotes for one commodity.
#[derive(Debug, Clone, Default)]
pub struct PriceHistory {
    prices: BTreeMap<DateTime<Utc>, Amount>,
}

impl PriceHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the quote at `when`.
    pub fn insert(&mut self, when: DateTime<Utc>, price: Amount) {
        self.prices.insert(when, price);
    }

    /// The most recent quote, if any.
    pub fn latest(&self) -> Option<(&DateTime<Utc>, &Amount)> {
        self.prices.last_key_value()
    }

    /// The newest quote not later than `moment`; `None` for `moment`
    /// requests the latest quote. Quotes strictly after an explicit
    /// `moment` are never returned.
    pub fn at_or_before(
        &self,
        moment: Option<DateTime<Utc>>,
    ) -> Option<(&DateTime<Utc>, &Amount)> {
        match moment {
            None => self.latest(),
            Some(m) => self.prices.range(..=m).next_back(),
        }
    }

    /// Number of quotes recorded.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether no quotes are recorded.
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

/// Hook invoked on every price query, letting an external provider
/// refresh or override the looked-up quote.
pub trait PriceUpdater {
    /// Called with the commodity being valued, the requested `moment`
    /// (`None` means "latest"), the timestamp of the quote found
    /// (`age`), the timestamp of the newest quote on file (`latest`),
    /// and the quote itself, which may be replaced in place.
    fn update(
        &self,
        commodity: &mut Commodity,
        moment: Option<DateTime<Utc>>,
        age: Option<DateTime<Utc>>,
        latest: Option<DateTime<Utc>>,
        price: &mut Amount,
    );
}

/// A named unit with display style, precision, conversion links, and
/// price history.
#[derive(Debug, Clone, Default)]
pub struct Commodity {
    symbol: String,
    quote: bool,
    precision: Precision,
    flags: CommodityFlags,
    smaller: Option<Amount>,
    larger: Option<Amount>,
    history: Option<PriceHistory>,
}

impl Default for CommodityFlags {
    fn default() -> Self {
        CommodityFlags::empty()
    }
}

impl Commodity {
    /// Create a commodity with the given symbol. Symbols containing
    /// whitespace, digits, `-`, or `.` must be quoted when printed.
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        let quote = symbol
            .chars()
            .any(|c| c.is_whitespace() || c.is_ascii_digit() || c == '-' || c == '.');
        Self { symbol, quote, ..Self::default() }
    }

    /// The textual symbol; empty for the null commodity.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Whether the symbol must be printed inside double quotes.
    pub fn is_quoted(&self) -> bool {
        self.quote
    }

    /// Display precision in fractional decimal digits.
    pub fn precision(&self) -> Precision {
        self.precision
    }

    /// Set the display precision.
    pub fn set_precision(&mut self, precision: Precision) {
        self.precision = precision;
    }

    /// The current flag set.
    pub fn flags(&self) -> CommodityFlags {
        self.flags
    }

    /// Whether all of `flags` are set.
    pub fn has_flags(&self, flags: CommodityFlags) -> bool {
        self.flags.contains(flags)
    }

    /// Set flags in addition to those already present.
    pub fn add_flags(&mut self, flags: CommodityFlags) {
        self.flags |= flags;
    }

    /// Clear the given flags.
    pub fn drop_flags(&mut self, flags: CommodityFlags) {
        self.flags &= !flags;
    }

    pub(crate) fn set_flags(&mut self, flags: CommodityFlags) {
        self.flags = flags;
    }

    /// One unit of this commodity expressed in the next smaller unit of
    /// its conversion chain, when one exists.
    pub fn smaller(&self) -> Option<&Amount> {
        self.smaller.as_ref()
    }

    /// One unit of the next larger commodity expressed in this one,
    /// when one exists.
    pub fn larger(&self) -> Option<&Amount> {
        self.larger.as_ref()
    }

    pub(crate) fn set_smaller(&mut self, amount: Amount) {
        self.smaller = Some(amount);
    }

    pub(crate) fn set_larger(&mut self, amount: Amount) {
        self.larger = Some(amount);
    }

    /// The recorded price history, if any quote was ever added.
    pub fn history(&self) -> Option<&PriceHistory> {
        self.history.as_ref()
    }

    /// Record a price quote for this commodity at `when`, overwriting
    /// any quote already recorded at that instant.
    pub fn add_price(&mut self, when: DateTime<Utc>, price: Amount) {
        self.history.get_or_insert_with(PriceHistory::new).insert(when, price);
    }
}

impl fmt::Display for Commodity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.quote {
            write!(f, "\"{}\"", self.symbol)
        } else {
            f.write_str(&self.symbol)
        }
    }
}

/// Registry of every commodity seen by a parsing session, addressed by
/// symbol or by [`CommodityId`].
///
/// A fresh pool contains the null commodity (empty symbol) and the
/// built-in time units `s`, `m`, and `h`, chained so that parsed time
/// amounts reduce to seconds and report in the largest unit that still
/// reads as at least one.
pub struct CommodityPool {
    commodities: Vec<Commodity>,
    by_symbol: HashMap<String, CommodityId>,
    default_commodity: Option<CommodityId>,
    updater: Option<Box<dyn PriceUpdater>>,
}

impl CommodityPool {
    /// Create a pool holding the null commodity and the built-in time
    /// units.
    pub fn new() -> Self {
        let mut pool = Self {
            commodities: Vec::new(),
            by_symbol: HashMap::new(),
            default_commodity: None,
            updater: None,
        };
        pool.intern("");

        // Time conversions, so that timelogs may be parsed in terms of
        // seconds but reported as minutes or hours.
        let seconds = pool.find_or_create("s");
        pool.commodity_mut(seconds)
            .add_flags(CommodityFlags::NOMARKET | CommodityFlags::BUILTIN);
        pool.parse_conversion("1.0m", "60s")
            .expect("built-in time conversion must parse");
        pool.parse_conversion("1.0h", "60m")
            .expect("built-in time conversion must parse");

        pool
    }

    fn intern(&mut self, symbol: &str) -> CommodityId {
        let id = CommodityId(self.commodities.len() as u32);
        self.commodities.push(Commodity::new(symbol));
        self.by_symbol.insert(symbol.to_string(), id);
        debug!("interned commodity {:?} as #{}", symbol, id.0);
        id
    }

    /// Look up a commodity by symbol without creating it.
    pub fn find(&self, symbol: &str) -> Option<CommodityId> {
        self.by_symbol.get(symbol).copied()
    }

    /// Look up a commodity by symbol, creating it on first sight. A
    /// newly created commodity starts from the default commodity's
    /// flags, minus `THOUSANDS` and `NOMARKET`.
    pub fn find_or_create(&mut self, symbol: &str) -> CommodityId {
        if let Some(id) = self.find(symbol) {
            return id;
        }
        let id = self.intern(symbol);
        if let Some(default) = self.default_commodity {
            let inherited = self.commodities[default.0 as usize].flags()
                & !(CommodityFlags::THOUSANDS | CommodityFlags::NOMARKET);
            self.commodities[id.0 as usize].set_flags(inherited);
        }
        id
    }

    /// Shared access to a commodity.
    pub fn commodity(&self, id: CommodityId) -> &Commodity {
        &self.commodities[id.0 as usize]
    }

    /// Exclusive access to a commodity.
    pub fn commodity_mut(&mut self, id: CommodityId) -> &mut Commodity {
        &mut self.commodities[id.0 as usize]
    }

    /// Iterate over every commodity in creation order.
    pub fn commodities(&self) -> impl Iterator<Item = &Commodity> {
        self.commodities.iter()
    }

    /// Number of commodities in the pool, the null commodity included.
    pub fn commodity_count(&self) -> usize {
        self.commodities.len()
    }

    /// The commodity whose style governs bare numbers, when one was set.
    pub fn default_commodity(&self) -> Option<CommodityId> {
        self.default_commodity
    }

    /// Set the commodity whose style governs bare numbers.
    pub fn set_default_commodity(&mut self, id: CommodityId) {
        self.default_commodity = Some(id);
    }

    /// Install the hook consulted on every price query.
    pub fn set_updater(&mut self, updater: Box<dyn PriceUpdater>) {
        self.updater = Some(updater);
    }

    /// Display precision of `commodity`, falling back to the null
    /// commodity when an amount carries none.
    pub(crate) fn display_precision(&self, commodity: Option<CommodityId>) -> Precision {
        self.commodity(commodity.unwrap_or(CommodityId::NULL)).precision()
    }

    /// Look up the price of `id` at `moment` (`None` for the latest
    /// quote), then give the updater hook a chance to refresh or
    /// override it. Returns the zero amount when no quote applies.
    pub fn price(&mut self, id: CommodityId, moment: Option<DateTime<Utc>>) -> Amount {
        let (mut price, age, latest) = match self.commodity(id).history() {
            Some(history) => {
                let latest = history.latest().map(|(when, _)| *when);
                match history.at_or_before(moment) {
                    Some((when, quote)) => (quote.clone(), Some(*when), latest),
                    None => (Amount::zero(), None, latest),
                }
            }
            None => (Amount::zero(), None, None),
        };
        trace!(
            "price lookup for {:?} at {:?}: age {:?}",
            self.commodity(id).symbol(),
            moment,
            age
        );
        if let Some(updater) = &self.updater {
            updater.update(&mut self.commodities[id.0 as usize], moment, age, latest, &mut price);
        }
        price
    }

    /// Parse a unit-conversion pair such as `("1.0h", "60m")` and link
    /// the two commodities: the larger unit learns its expansion into
    /// the smaller, the smaller learns the product amount that stands
    /// for one larger unit.
    pub fn parse_conversion(&mut self, larger_str: &str, smaller_str: &str) -> AmountResult<()> {
        use crate::parsing::ParseFlags;

        let mut larger = Amount::parse_with_flags(larger_str, ParseFlags::NO_REDUCE, self)?;
        let smaller = Amount::parse_with_flags(smaller_str, ParseFlags::NO_REDUCE, self)?;

        larger.mul_amount(&smaller, self);

        if let Some(id) = larger.commodity().filter(|id| !id.is_null()) {
            let inherited = self
                .commodity(smaller.commodity().unwrap_or(CommodityId::NULL))
                .flags();
            let commodity = self.commodity_mut(id);
            commodity.set_smaller(smaller.clone());
            commodity.set_flags(inherited | CommodityFlags::NOMARKET);
        }
        if let Some(id) = smaller.commodity().filter(|id| !id.is_null()) {
            self.commodity_mut(id).set_larger(larger);
        }
        Ok(())
    }
}

impl Default for CommodityPool {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<CommodityId> for CommodityPool {
    type Output = Commodity;

    fn index(&self, id: CommodityId) -> &Commodity {
        self.commodity(id)
    }
}

impl fmt::Debug for CommodityPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommodityPool")
            .field("commodities", &self.commodities)
            .field("default_commodity", &self.default_commodity)
            .field("updater", &self.updater.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_pool_has_null_and_time_units() {
        let pool = CommodityPool::new();
        assert_eq!(pool.find(""), Some(CommodityId::NULL));
        let s = pool.find("s").unwrap();
        assert!(pool[s].has_flags(CommodityFlags::NOMARKET | CommodityFlags::BUILTIN));
        assert!(pool.find("m").is_some());
        assert!(pool.find("h").is_some());
    }

    #[test]
    fn test_find_or_create_interns_once() {
        let mut pool = CommodityPool::new();
        let a = pool.find_or_create("USD");
        let b = pool.find_or_create("USD");
        assert_eq!(a, b);
    }

    #[test]
    fn test_quote_detection() {
        assert!(!Commodity::new("USD").is_quoted());
        assert!(Commodity::new("MY STOCK").is_quoted());
        assert!(Commodity::new("X.Y").is_quoted());
        assert!(Commodity::new("4WD").is_quoted());
    }

    #[test]
    fn test_conversion_links() {
        let pool = CommodityPool::new();
        let m = pool.find("m").unwrap();
        let s = pool.find("s").unwrap();
        assert!(pool[m].smaller().is_some());
        assert!(pool[s].larger().is_some());
        assert!(pool[m].has_flags(CommodityFlags::NOMARKET));
    }

    #[test]
    fn test_price_history_lookup() {
        let mut history = PriceHistory::new();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        history.insert(t1, Amount::from(10i64));
        history.insert(t2, Amount::from(20i64));

        assert_eq!(history.latest().map(|(t, _)| *t), Some(t2));
        assert_eq!(history.at_or_before(None).map(|(t, _)| *t), Some(t2));

        let mid = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(history.at_or_before(Some(mid)).map(|(t, _)| *t), Some(t1));

        let before = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert!(history.at_or_before(Some(before)).is_none());
    }
}
