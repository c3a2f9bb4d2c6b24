use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Mutex;

use proptest::prelude::*;
use qf_batch::{dispatch, DispatchOpts, FailurePolicy};
use qf_core::errors::{ErrorInfo, QfError};
use qf_core::{is_squarefree, FieldIndex, InvariantOracle, Invariants};

fn stub_invariants(d: FieldIndex) -> Invariants {
    Invariants {
        discriminant: -(d.get() as i64),
        class_number: 1,
        fundamental_unit: "1".to_string(),
        regulator: 1.0,
        minkowski_bound: 1.0,
    }
}

#[derive(Default)]
struct StubOracle {
    fail_on: HashSet<u64>,
    panic_on: HashSet<u64>,
}

impl InvariantOracle for StubOracle {
    fn name(&self) -> &str {
        "stub"
    }

    fn invariants(&self, d: FieldIndex) -> Result<Invariants, QfError> {
        if self.panic_on.contains(&d.get()) {
            panic!("stub panic at {d}");
        }
        if self.fail_on.contains(&d.get()) {
            return Err(QfError::Oracle(ErrorInfo::new("stub", "boom")));
        }
        Ok(stub_invariants(d))
    }
}

/// Fails the first `failures` attempts for every index.
struct FlakyOracle {
    failures: u32,
    attempts: Mutex<HashMap<u64, u32>>,
}

impl InvariantOracle for FlakyOracle {
    fn name(&self) -> &str {
        "flaky"
    }

    fn invariants(&self, d: FieldIndex) -> Result<Invariants, QfError> {
        let mut attempts = self.attempts.lock().expect("attempts lock");
        let seen = attempts.entry(d.get()).or_insert(0);
        *seen += 1;
        if *seen <= self.failures {
            return Err(QfError::Oracle(ErrorInfo::new("flaky", "not yet")));
        }
        Ok(stub_invariants(d))
    }
}

fn indices(values: &[u64]) -> Vec<FieldIndex> {
    values
        .iter()
        .map(|d| FieldIndex::new(*d).expect("squarefree"))
        .collect()
}

fn opts(workers: usize, chunk_size: usize, failure_policy: FailurePolicy) -> DispatchOpts {
    DispatchOpts {
        workers,
        chunk_size,
        max_retries: 0,
        failure_policy,
    }
}

#[test]
fn every_index_gets_its_own_record() {
    let input = indices(&[2, 3, 5, 6, 7, 10, 11, 13, 14, 15, 17, 19]);
    let outcome = dispatch(&input, &StubOracle::default(), &opts(4, 2, FailurePolicy::Abort))
        .expect("dispatch");
    assert_eq!(outcome.records.len(), input.len());
    assert!(outcome.failures.is_empty());
    for (d, record) in &outcome.records {
        assert_eq!(record.d, *d);
        assert_eq!(record.invariants.discriminant, -(d.get() as i64));
    }
}

#[test]
fn empty_input_is_fine() {
    let outcome =
        dispatch(&[], &StubOracle::default(), &DispatchOpts::default()).expect("dispatch");
    assert!(outcome.records.is_empty());
    assert!(outcome.failures.is_empty());
}

#[test]
fn abort_policy_fails_the_batch() {
    let oracle = StubOracle {
        fail_on: [7, 13].into_iter().collect(),
        ..StubOracle::default()
    };
    let input = indices(&[2, 3, 5, 6, 7, 10, 11, 13]);
    let err = dispatch(&input, &oracle, &opts(2, 3, FailurePolicy::Abort)).expect_err("abort");
    assert!(matches!(err, QfError::Oracle(_)));
    let info = err.info();
    assert_eq!(info.code, "oracle-failed");
    assert_eq!(info.context.get("d").map(String::as_str), Some("7"));
    assert_eq!(info.context.get("failures").map(String::as_str), Some("2"));
    assert_eq!(info.message, "boom");
    assert_eq!(info.context.get("cause").map(String::as_str), Some("stub"));
}

#[test]
fn skip_policy_reports_failures_next_to_records() {
    let oracle = StubOracle {
        fail_on: [7, 13].into_iter().collect(),
        ..StubOracle::default()
    };
    let input = indices(&[2, 3, 5, 6, 7, 10, 11, 13]);
    let outcome = dispatch(&input, &oracle, &opts(3, 1, FailurePolicy::Skip)).expect("skip");
    assert_eq!(outcome.records.len(), 6);
    let failed: Vec<u64> = outcome.failures.iter().map(|f| f.d.get()).collect();
    assert_eq!(failed, vec![7, 13]);
    assert!(outcome.failures.iter().all(|f| f.attempts == 1));
    let first = outcome.failures[0].error.info();
    assert_eq!(first.code, "stub");
    assert_eq!(first.message, "boom");
}

#[test]
fn panics_become_failures() {
    let oracle = StubOracle {
        panic_on: [11].into_iter().collect(),
        ..StubOracle::default()
    };
    let input = indices(&[2, 3, 5, 11]);
    let outcome = dispatch(&input, &oracle, &opts(2, 1, FailurePolicy::Skip)).expect("skip");
    assert_eq!(outcome.records.len(), 3);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].d.get(), 11);
    let info = outcome.failures[0].error.info();
    assert_eq!(info.code, "oracle-panic");
    assert_eq!(info.message, "oracle panicked: stub panic at 11");
    assert_eq!(info.context.get("d").map(String::as_str), Some("11"));
}

#[test]
fn retries_recover_transient_failures() {
    let oracle = FlakyOracle {
        failures: 2,
        attempts: Mutex::new(HashMap::new()),
    };
    let input = indices(&[2, 3, 5]);
    let outcome = dispatch(
        &input,
        &oracle,
        &DispatchOpts {
            workers: 3,
            chunk_size: 1,
            max_retries: 2,
            failure_policy: FailurePolicy::Abort,
        },
    )
    .expect("retried dispatch");
    assert_eq!(outcome.records.len(), 3);
    let attempts = oracle.attempts.lock().expect("attempts lock");
    assert!(attempts.values().all(|count| *count == 3));
}

#[test]
fn retries_are_bounded() {
    let oracle = FlakyOracle {
        failures: 5,
        attempts: Mutex::new(HashMap::new()),
    };
    let input = indices(&[2]);
    let outcome = dispatch(
        &input,
        &oracle,
        &DispatchOpts {
            workers: 1,
            chunk_size: 1,
            max_retries: 1,
            failure_policy: FailurePolicy::Skip,
        },
    )
    .expect("dispatch");
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].attempts, 2);
}

#[test]
fn duplicate_input_is_rejected() {
    let input = indices(&[2, 3, 2]);
    let err = dispatch(&input, &StubOracle::default(), &DispatchOpts::default())
        .expect_err("duplicate");
    assert_eq!(err.info().code, "duplicate-index");
}

#[test]
fn zero_workers_or_chunk_is_a_config_error() {
    let input = indices(&[2]);
    let err = dispatch(&input, &StubOracle::default(), &opts(0, 1, FailurePolicy::Abort))
        .expect_err("workers");
    assert!(matches!(err, QfError::Config(_)));
    let err = dispatch(&input, &StubOracle::default(), &opts(1, 0, FailurePolicy::Abort))
        .expect_err("chunk");
    assert!(matches!(err, QfError::Config(_)));
}

#[test]
fn trait_objects_dispatch() {
    let oracle: Box<dyn InvariantOracle> = Box::new(StubOracle::default());
    let input = indices(&[2, 3]);
    let outcome = dispatch(&input, oracle.as_ref(), &DispatchOpts::default()).expect("dispatch");
    assert_eq!(outcome.records.len(), 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn output_keys_and_failures_partition_the_input(
        raw in proptest::collection::hash_set(2u64..5_000, 0..300),
        workers in 1usize..6,
        chunk_size in 1usize..40,
        fail_mod in 3u64..11,
    ) {
        let input: Vec<FieldIndex> = raw
            .into_iter()
            .filter(|d| is_squarefree(*d))
            .map(FieldIndex::new_unchecked)
            .collect();
        let oracle = StubOracle {
            fail_on: input.iter().map(|d| d.get()).filter(|d| d % fail_mod == 0).collect(),
            ..StubOracle::default()
        };
        let outcome = dispatch(&input, &oracle, &opts(workers, chunk_size, FailurePolicy::Skip))
            .expect("dispatch");

        let expected: BTreeSet<FieldIndex> = input.iter().copied().collect();
        let produced: BTreeSet<FieldIndex> = outcome.records.keys().copied().collect();
        let failed: BTreeSet<FieldIndex> = outcome.failures.iter().map(|f| f.d).collect();
        prop_assert!(produced.is_disjoint(&failed));
        prop_assert_eq!(outcome.records.len() + outcome.failures.len(), input.len());
        let union: BTreeSet<FieldIndex> = produced.union(&failed).copied().collect();
        prop_assert_eq!(union, expected);
        prop_assert!(failed.iter().all(|d| d.get() % fail_mod == 0));
    }
}
