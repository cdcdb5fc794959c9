// Parser scenarios: style inference, migration, and conversion chains.

use quill_math::{Amount, AmountError, BigInt, CommodityFlags, CommodityId, CommodityPool, ParseFlags};

mod style_inference {
    use super::*;

    #[test]
    fn test_dollar_prefixed() {
        let mut pool = CommodityPool::new();
        let amount = Amount::parse("$100.00", &mut pool).unwrap();
        assert_eq!(amount.mantissa().unwrap(), &BigInt::from(10000));
        assert_eq!(amount.precision(), 2);

        let dollar = pool.find("$").unwrap();
        assert_eq!(amount.commodity(), Some(dollar));
        assert!(!pool[dollar].has_flags(CommodityFlags::SUFFIXED));
        assert!(!pool[dollar].has_flags(CommodityFlags::SEPARATED));
        assert_eq!(pool[dollar].precision(), 2);
    }

    #[test]
    fn test_european_suffixed() {
        let mut pool = CommodityPool::new();
        let amount = Amount::parse("1.000,00 EUR", &mut pool).unwrap();
        assert_eq!(amount.mantissa().unwrap(), &BigInt::from(100000));
        assert_eq!(amount.precision(), 2);

        let eur = pool.find("EUR").unwrap();
        assert!(pool[eur].has_flags(
            CommodityFlags::EUROPEAN
                | CommodityFlags::THOUSANDS
                | CommodityFlags::SUFFIXED
                | CommodityFlags::SEPARATED
        ));
    }

    #[test]
    fn test_bare_european_number() {
        let mut pool = CommodityPool::new();
        let amount = Amount::parse("-0,50", &mut pool).unwrap();
        assert_eq!(amount.commodity(), Some(CommodityId::NULL));
        assert_eq!(amount.mantissa().unwrap(), &BigInt::from(-50));
        assert_eq!(amount.precision(), 2);
        assert!(pool[CommodityId::NULL].has_flags(CommodityFlags::EUROPEAN));
    }

    #[test]
    fn test_period_is_grouping_for_european_commodity() {
        let mut pool = CommodityPool::new();
        Amount::parse("1,50 EUR", &mut pool).unwrap();
        // EUR is now European, so a lone period groups thousands.
        let amount = Amount::parse("1.000 EUR", &mut pool).unwrap();
        assert_eq!(amount.precision(), 0);
        assert_eq!(amount.mantissa().unwrap(), &BigInt::from(1000));
    }

    #[test]
    fn test_first_occurrence_shapes_style() {
        let mut pool = CommodityPool::new();
        Amount::parse("100.000 CAD", &mut pool).unwrap();
        let cad = pool.find("CAD").unwrap();
        assert_eq!(pool[cad].precision(), 3);
        assert!(pool[cad].has_flags(CommodityFlags::SUFFIXED | CommodityFlags::SEPARATED));

        // Migration only ever raises precision.
        Amount::parse("5.0 CAD", &mut pool).unwrap();
        assert_eq!(pool[cad].precision(), 3);
    }

    #[test]
    fn test_no_migrate_still_applies_to_new_commodity() {
        let mut pool = CommodityPool::new();
        Amount::parse_with_flags("10.25 NOK", ParseFlags::NO_MIGRATE, &mut pool).unwrap();
        let nok = pool.find("NOK").unwrap();
        assert_eq!(pool[nok].precision(), 2);
        assert!(pool[nok].has_flags(CommodityFlags::SUFFIXED));

        Amount::parse_with_flags("1.0000 NOK", ParseFlags::NO_MIGRATE, &mut pool).unwrap();
        assert_eq!(pool[nok].precision(), 2);
    }

    #[test]
    fn test_quoted_symbol_round_trip() {
        let mut pool = CommodityPool::new();
        let amount = Amount::parse("\"DE 0005557508\" 100", &mut pool).unwrap();
        let telekom = pool.find("DE 0005557508").unwrap();
        assert!(pool[telekom].is_quoted());
        assert_eq!(amount.display(&pool).to_string(), "\"DE 0005557508\" 100");
    }

    #[test]
    fn test_default_commodity_shapes_new_symbols() {
        let mut pool = CommodityPool::new();
        Amount::parse("1.000,00 EUR", &mut pool).unwrap();
        let eur = pool.find("EUR").unwrap();
        pool.set_default_commodity(eur);

        // New commodities inherit style, minus grouping.
        Amount::parse("5 GBP", &mut pool).unwrap();
        let gbp = pool.find("GBP").unwrap();
        assert!(pool[gbp].has_flags(CommodityFlags::EUROPEAN));
        assert!(!pool[gbp].has_flags(CommodityFlags::THOUSANDS));
    }
}

mod errors {
    use super::*;

    #[test]
    fn test_missing_quantity() {
        let mut pool = CommodityPool::new();
        for input in ["", "   ", "USD", "\"quoted\""] {
            let err = Amount::parse(input, &mut pool).unwrap_err();
            assert_eq!(
                err,
                AmountError::Syntax("No quantity specified for amount".to_string()),
                "input {input:?}"
            );
        }
    }

    #[test]
    fn test_unterminated_quote() {
        let mut pool = CommodityPool::new();
        let err = Amount::parse("\"open 100", &mut pool).unwrap_err();
        assert_eq!(
            err,
            AmountError::Syntax("Quoted commodity symbol lacks closing quote".to_string())
        );
    }
}

mod conversions {
    use super::*;

    #[test]
    fn test_time_units_reduce_to_seconds() {
        let mut pool = CommodityPool::new();
        let hours = Amount::parse("1.5h", &mut pool).unwrap();
        assert_eq!(hours.commodity(), pool.find("s"));
        assert_eq!(hours.to_i64(), Some(5400));
    }

    #[test]
    fn test_no_reduce_keeps_parsed_unit() {
        let mut pool = CommodityPool::new();
        let hours =
            Amount::parse_with_flags("1.5h", ParseFlags::NO_REDUCE, &mut pool).unwrap();
        assert_eq!(hours.commodity(), pool.find("h"));

        let mut reduced = hours.clone();
        reduced.in_place_reduce(&pool);
        assert_eq!(reduced.commodity(), pool.find("s"));
        assert_eq!(reduced.to_i64(), Some(5400));
    }

    #[test]
    fn test_custom_conversion_chain() {
        let mut pool = CommodityPool::new();
        pool.parse_conversion("1.00 Kb", "1024 b").unwrap();
        pool.parse_conversion("1.00 Mb", "1024 Kb").unwrap();

        let mb = Amount::parse("2 Mb", &mut pool).unwrap();
        assert_eq!(mb.commodity(), pool.find("b"));
        assert_eq!(mb.to_i64(), Some(2 * 1024 * 1024));

        let kb = pool.find("Kb").unwrap();
        assert!(pool[kb].has_flags(CommodityFlags::NOMARKET));
    }

    #[test]
    fn test_builtin_units_exist() {
        let pool = CommodityPool::new();
        let s = pool.find("s").unwrap();
        assert!(pool[s].has_flags(CommodityFlags::BUILTIN | CommodityFlags::NOMARKET));
        assert!(pool[pool.find("m").unwrap()].smaller().is_some());
        assert!(pool[pool.find("h").unwrap()].smaller().is_some());
        assert!(pool[s].larger().is_some());
    }
}
