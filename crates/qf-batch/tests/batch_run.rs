use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use proptest::prelude::*;
use qf_batch::{
    read_batch, read_batch_csv, run, verify_run, BatchPlan, FailurePolicy, OutputFormat,
    RunParams, RunReport, Sizing, RUN_REPORT_FILE,
};
use qf_core::errors::{ErrorInfo, QfError};
use qf_core::{is_squarefree, FieldIndex, InvariantOracle, Invariants};
use qf_oracle::NativeOracle;

#[derive(Default)]
struct StubOracle {
    fail_on: HashSet<u64>,
}

impl InvariantOracle for StubOracle {
    fn name(&self) -> &str {
        "stub"
    }

    fn invariants(&self, d: FieldIndex) -> Result<Invariants, QfError> {
        if self.fail_on.contains(&d.get()) {
            return Err(QfError::Oracle(ErrorInfo::new("stub", "boom")));
        }
        Ok(Invariants {
            discriminant: -(d.get() as i64),
            class_number: 1,
            fundamental_unit: "1".to_string(),
            regulator: 1.0,
            minkowski_bound: 1.0,
        })
    }
}

fn params(dir: &Path, total_fields: u64, workers: usize, per_worker: u64) -> RunParams {
    let mut params = RunParams::new(total_fields);
    params.workers = Some(workers);
    params.batch_size_per_worker = per_worker;
    params.dispatch_chunk_size = 3;
    params.output.dir = dir.to_path_buf();
    params
}

fn first_fields(count: usize) -> Vec<u64> {
    (2u64..).filter(|n| is_squarefree(*n)).take(count).collect()
}

fn indices_in(path: &Path) -> Vec<u64> {
    read_batch_csv(path)
        .expect("read batch")
        .iter()
        .map(|record| record.d.get())
        .collect()
}

#[test]
fn single_batch_holds_every_field() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let params = params(dir.path(), 12, 1, 12);
    let report = run(&params, &StubOracle::default(), |_| {}).expect("run");
    assert_eq!(report.batches.len(), 1);
    assert_eq!(report.total_records, 12);

    let mut written = indices_in(&dir.path().join("invariants_0001.csv"));
    written.sort_unstable();
    assert_eq!(written, first_fields(12));
    assert_eq!(report.batches[0].start, 2);
    assert_eq!(report.batches[0].end, 20);
}

#[test]
fn two_batches_are_disjoint_and_contiguous() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let params = params(dir.path(), 24, 2, 6);
    let mut labels = Vec::new();
    let report = run(&params, &StubOracle::default(), |batch| {
        labels.push(format!("{}/{}", batch.index, batch.total));
    })
    .expect("run");
    assert_eq!(labels, vec!["1/2", "2/2"]);
    assert_eq!(report.batches[0].end, report.batches[1].start);

    let first: BTreeSet<u64> = indices_in(&dir.path().join("invariants_0001.csv"))
        .into_iter()
        .collect();
    let second: BTreeSet<u64> = indices_in(&dir.path().join("invariants_0002.csv"))
        .into_iter()
        .collect();
    assert_eq!(first.len(), 12);
    assert_eq!(second.len(), 12);
    assert!(first.is_disjoint(&second));
    let union: Vec<u64> = first.union(&second).copied().collect();
    assert_eq!(union, first_fields(24));
}

#[test]
fn last_batch_holds_the_remainder() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let params = params(dir.path(), 25, 1, 10);
    let plan = BatchPlan::new(&params).expect("plan");
    assert_eq!(plan.total(), 3);
    let batches: Vec<_> = plan.collect::<Result<_, _>>().expect("batches");
    let sizes: Vec<usize> = batches.iter().map(|b| b.indices.len()).collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    for pair in batches.windows(2) {
        assert_eq!(pair[0].end, pair[1].start);
    }
    assert_eq!(batches[2].label(), "3/3");
}

#[test]
fn raw_sizing_splits_the_integer_range() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let mut params = params(dir.path(), 20, 1, 8);
    params.sizing = Sizing::Raw;
    let report = run(&params, &StubOracle::default(), |_| {}).expect("run");
    let spans: Vec<(u64, u64)> = report.batches.iter().map(|b| (b.start, b.end)).collect();
    assert_eq!(spans, vec![(2, 10), (10, 18), (18, 22)]);

    let mut all = Vec::new();
    for batch in &report.batches {
        all.extend(indices_in(&dir.path().join(&batch.file)));
    }
    all.sort_unstable();
    let expected: Vec<u64> = (2..22).filter(|n| is_squarefree(*n)).collect();
    assert_eq!(all, expected);
    verify_run(dir.path()).expect("verify");
}

#[test]
fn abort_keeps_completed_batches_on_disk() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let params = params(dir.path(), 36, 1, 12);
    let oracle = StubOracle {
        fail_on: [29].into_iter().collect(),
    };
    let mut done = 0;
    let err = run(&params, &oracle, |_| done += 1).expect_err("abort");
    assert_eq!(done, 1);
    let info = err.info();
    assert_eq!(info.code, "oracle-failed");
    assert_eq!(info.context.get("batch").map(String::as_str), Some("2/3"));
    assert_eq!(info.context.get("d").map(String::as_str), Some("29"));

    assert_eq!(indices_in(&dir.path().join("invariants_0001.csv")).len(), 12);
    assert!(!dir.path().join("invariants_0002.csv").exists());
    assert!(!dir.path().join(RUN_REPORT_FILE).exists());
}

#[test]
fn aborted_rerun_leaves_no_report_behind() {
    let dir = tempfile::tempdir().expect("tmp dir");
    run(&params(dir.path(), 24, 1, 12), &StubOracle::default(), |_| {}).expect("first run");
    assert!(dir.path().join(RUN_REPORT_FILE).exists());

    let oracle = StubOracle {
        fail_on: [29].into_iter().collect(),
    };
    run(&params(dir.path(), 36, 1, 12), &oracle, |_| {}).expect_err("abort");
    assert!(!dir.path().join(RUN_REPORT_FILE).exists());
    assert!(verify_run(dir.path()).is_err());
}

#[test]
fn clean_rerun_drops_old_failures_file() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let mut skipping = params(dir.path(), 24, 2, 6);
    skipping.failure_policy = FailurePolicy::Skip;
    let oracle = StubOracle {
        fail_on: [7].into_iter().collect(),
    };
    run(&skipping, &oracle, |_| {}).expect("skip run");
    let failures = dir.path().join("invariants_0001.failures.csv");
    assert!(failures.exists());

    let report = run(&skipping, &StubOracle::default(), |_| {}).expect("clean run");
    assert!(!failures.exists());
    assert!(report.batches.iter().all(|b| b.failures_file.is_none()));
    let summary = verify_run(dir.path()).expect("verify");
    assert_eq!(summary.failures, 0);
    assert_eq!(summary.records, 24);
}

#[test]
fn unset_workers_are_recorded_in_the_report() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let mut params = RunParams::new(5);
    params.output.dir = dir.path().to_path_buf();
    assert_eq!(params.workers, None);

    let report = run(&params, &StubOracle::default(), |_| {}).expect("run");
    let workers = report.params.workers.expect("resolved workers");
    assert!(workers >= 1);
    assert_eq!(
        report.provenance.params_hash,
        report.params.params_hash().expect("hash")
    );
    let loaded = RunReport::load(dir.path()).expect("load report");
    assert_eq!(loaded.params.workers, Some(workers));
    assert_eq!(loaded.params.batch_size(), workers as u64 * 10_000);
}

#[test]
fn skip_writes_failures_and_still_verifies() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let mut params = params(dir.path(), 24, 2, 6);
    params.failure_policy = FailurePolicy::Skip;
    let oracle = StubOracle {
        fail_on: [7, 29].into_iter().collect(),
    };
    let report = run(&params, &oracle, |_| {}).expect("run");
    assert_eq!(report.total_records, 22);
    assert_eq!(report.total_failures, 2);
    let failures = report.batches[0]
        .failures_file
        .as_ref()
        .expect("failures file");
    let text = fs::read_to_string(dir.path().join(failures)).expect("read failures");
    assert!(text.starts_with("d,attempts,code,error\n7,1,"));

    let summary = verify_run(dir.path()).expect("verify");
    assert_eq!(summary.batches, 2);
    assert_eq!(summary.records, 22);
    assert_eq!(summary.failures, 2);
}

#[test]
fn report_hashes_match_written_files() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let params = params(dir.path(), 30, 2, 5);
    let report = run(&params, &StubOracle::default(), |_| {}).expect("run");
    let loaded = RunReport::load(dir.path()).expect("load report");
    assert_eq!(loaded, report);
    assert_eq!(loaded.provenance.oracle, "stub");
    assert_eq!(loaded.provenance.params_hash, params.params_hash().expect("hash"));

    let summary = verify_run(dir.path()).expect("verify");
    assert_eq!(summary.batches, 3);
    assert_eq!(summary.records, 30);

    fs::write(dir.path().join("invariants_0002.csv"), "d,dK,hK,fu,rK,mb\n").expect("tamper");
    let err = verify_run(dir.path()).expect_err("tampered");
    assert_eq!(err.info().code, "verify-hash");
}

#[test]
fn rerunning_overwrites_identically() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let mut params = params(dir.path(), 20, 2, 5);
    params.output.sort_rows = true;
    run(&params, &StubOracle::default(), |_| {}).expect("first run");
    let first = fs::read(dir.path().join("invariants_0001.csv")).expect("first bytes");
    run(&params, &StubOracle::default(), |_| {}).expect("second run");
    let second = fs::read(dir.path().join("invariants_0001.csv")).expect("second bytes");
    assert_eq!(first, second);
}

#[test]
fn native_oracle_run_in_json() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let mut params = params(dir.path(), 30, 2, 8);
    params.output.format = OutputFormat::Json;
    params.output.sort_rows = true;
    let report = run(&params, &NativeOracle::new(), |_| {}).expect("run");
    assert_eq!(report.batches.len(), 2);
    assert_eq!(report.batches[0].file, "invariants_0001.json");

    let records = read_batch(&dir.path().join("invariants_0001.json"), OutputFormat::Json)
        .expect("read back");
    let first = &records[0];
    assert_eq!(first.d.get(), 2);
    assert_eq!(first.invariants.discriminant, 8);
    assert_eq!(first.invariants.class_number, 1);
    assert_eq!(first.invariants.fundamental_unit, "1 + 1*sqrt(2)");
    verify_run(dir.path()).expect("verify");
}

#[test]
fn invalid_parameters_fail_before_any_output() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let out = dir.path().join("out");
    let params = params(&out, 0, 1, 10);
    let err = run(&params, &StubOracle::default(), |_| {}).expect_err("invalid");
    assert!(matches!(err, QfError::Range(_)));
    assert!(!out.exists());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn batch_files_cover_the_range_exactly_once(
        total_fields in 1u64..60,
        workers in 1usize..4,
        per_worker in 1u64..20,
        raw in any::<bool>(),
    ) {
        let dir = tempfile::tempdir().expect("tmp dir");
        let mut params = params(dir.path(), total_fields, workers, per_worker);
        if raw {
            params.sizing = Sizing::Raw;
        }
        let report = run(&params, &StubOracle::default(), |_| {}).expect("run");
        let batch_size = workers as u64 * per_worker;
        prop_assert_eq!(report.batches.len() as u64, total_fields.div_ceil(batch_size));

        let mut written = Vec::new();
        for batch in &report.batches {
            written.extend(indices_in(&dir.path().join(&batch.file)));
        }
        written.sort_unstable();
        let expected: Vec<u64> = if raw {
            (2..2 + total_fields).filter(|n| is_squarefree(*n)).collect()
        } else {
            first_fields(total_fields as usize)
        };
        prop_assert_eq!(written, expected);
        prop_assert!(verify_run(dir.path()).is_ok());
    }
}
