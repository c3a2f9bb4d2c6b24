use proptest::prelude::*;
use qf_core::{is_squarefree, FieldIndex, InvariantOracle};
use qf_oracle::{expand, FundamentalUnit, NativeOracle};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn period_product_is_a_unit(d in 2u64..3000) {
        prop_assume!(is_squarefree(d));
        let expansion = expand(FieldIndex::new(d).unwrap()).unwrap();
        prop_assert!(expansion.unit.is_unit());
        prop_assert!(expansion.regulator > 0.0);
        let ln = expansion.unit.ln();
        prop_assert!((ln - expansion.regulator).abs() < 1e-9 * ln.max(1.0));
    }

    #[test]
    fn oracle_output_parses_back(d in 2u64..1500) {
        prop_assume!(is_squarefree(d));
        let inv = NativeOracle::new().invariants(FieldIndex::new(d).unwrap()).unwrap();
        let unit: FundamentalUnit = inv.fundamental_unit.parse().unwrap();
        prop_assert_eq!(unit.d, d);
        prop_assert!(inv.class_number >= 1);
        let expected = if d % 4 == 1 { d as i64 } else { 4 * d as i64 };
        prop_assert_eq!(inv.discriminant, expected);
    }
}
