use qf_core::{is_squarefree, FieldIndex, InvariantRecord, Invariants, QfError};
use proptest::prelude::*;

fn naive_squarefree(n: u64) -> bool {
    (2..=n).take_while(|k| k * k <= n).all(|k| n % (k * k) != 0)
}

#[test]
fn small_squarefree_values() {
    let found: Vec<u64> = (2..20).filter(|&n| is_squarefree(n)).collect();
    assert_eq!(found, vec![2, 3, 5, 6, 7, 10, 11, 13, 14, 15, 17, 19]);
    assert!(!is_squarefree(0));
    assert!(is_squarefree(1));
}

#[test]
fn field_index_rejects_inadmissible_values() {
    for value in [0u64, 1, 4, 8, 9, 12, 18, 50] {
        match FieldIndex::new(value) {
            Err(QfError::Range(_)) => {}
            other => panic!("{value}: unexpected {other:?}"),
        }
    }
    assert!(FieldIndex::new(FieldIndex::MAX + 1).is_err());
    assert_eq!(FieldIndex::new(30).expect("squarefree").get(), 30);
}

#[test]
fn field_index_serde_validates() {
    let d: FieldIndex = serde_json::from_str("15").expect("parse");
    assert_eq!(d.get(), 15);
    assert!(serde_json::from_str::<FieldIndex>("16").is_err());
    assert_eq!(serde_json::to_string(&d).expect("serialize"), "15");
}

#[test]
fn record_rows_roundtrip() {
    let record = InvariantRecord::new(
        FieldIndex::new(5).expect("index"),
        Invariants {
            discriminant: 5,
            class_number: 1,
            fundamental_unit: "1/2 + 1/2*sqrt(5)".to_string(),
            regulator: 0.48121182505960347,
            minkowski_bound: 1.118033988749895,
        },
    );
    let row = record.to_row();
    assert_eq!(row[0], "5");
    assert_eq!(row[4], "0.48121182505960347");
    let back = InvariantRecord::from_row(&row).expect("parse row");
    assert_eq!(back, record);
}

#[test]
fn record_rows_reject_bad_width() {
    let err = InvariantRecord::from_row(&["2", "8"]).unwrap_err();
    assert_eq!(err.info().code, "row-width");
}

proptest! {
    #[test]
    fn trial_division_matches_naive(n in 0u64..200_000) {
        prop_assert_eq!(is_squarefree(n), n != 0 && naive_squarefree(n));
    }
}
