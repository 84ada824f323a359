//! Integration tests for job group runs.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use futures_util::FutureExt;
use gather_core::{
    GroupSettings, JobGroup, MemorySink, NotFoundError, NullSink, TraceLine, Unit, run_units,
};

fn sleeper<T>(ms: u64, outcome: Result<T, String>) -> Unit<T, String>
where
    T: Send + 'static,
{
    Unit::blocking(move || {
        thread::sleep(Duration::from_millis(ms));
        outcome
    })
}

fn quiet<T, E>() -> JobGroup<T, E>
where
    T: Send + Sync + 'static,
    E: std::fmt::Display + Send + Sync + 'static,
{
    JobGroup::new().with_sink(Arc::new(NullSink))
}

#[tokio::test(flavor = "multi_thread")]
async fn mixed_outcomes_are_reported_in_submission_order() {
    let mut group = quiet::<&'static str, String>();
    group.extend([
        sleeper(10, Ok("a")),
        sleeper(5, Err("E".to_string())),
        sleeper(1, Ok("c")),
    ]);

    group
        .run_within(Duration::from_secs(1))
        .await
        .expect("all units finish in time");

    assert_eq!(group.data(), vec![Some(&"a"), None, Some(&"c")]);
    assert_eq!(
        group.errors(),
        vec![Ok(None), Ok(Some(&"E".to_string())), Ok(None)]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn deadline_returns_timeout_and_leaves_slow_slot_unfound() {
    let mut group = quiet::<(), String>();
    group.add(sleeper(2000, Ok(()))).add_blocking(|| Ok(()));

    let err = group
        .run_within(Duration::from_millis(50))
        .await
        .expect_err("slow unit outlives the deadline");

    assert_eq!(err.outstanding(), &[0]);
    assert_eq!(err.total(), 2);
    assert_eq!(err.deadline(), Duration::from_millis(50));

    let errors = group.errors();
    assert_eq!(errors[1], Ok(None));
    assert_eq!(errors[0], Err(NotFoundError::new(0)));
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_group_succeeds_immediately() {
    let mut group = quiet::<String, String>();

    group
        .run_within(Duration::from_millis(1))
        .await
        .expect("nothing to wait for");

    assert!(group.data().is_empty());
    assert!(group.errors().is_empty());
    assert!(group.results().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn results_follow_submission_not_completion_order() {
    let mut group = quiet::<usize, String>();
    for index in 0..8_usize {
        let delay = (8 - index as u64) * 5;
        group.add(sleeper(delay, Ok(index)));
    }

    group.run_within(Duration::from_secs(2)).await.unwrap();

    let values: Vec<usize> = group.data().into_iter().flatten().copied().collect();
    assert_eq!(values, (0..8).collect::<Vec<_>>());
    assert_eq!(group.len(), 8);
}

#[tokio::test(flavor = "multi_thread")]
async fn unit_errors_do_not_fail_the_run() {
    let mut group = quiet::<(), String>();
    group
        .add_blocking(|| Err("disk full".to_string()))
        .add_blocking(|| Err("no route".to_string()));

    assert!(group.run_within(Duration::from_secs(1)).await.is_ok());
    assert_eq!(
        group.result(0).unwrap().as_ref().unwrap_err(),
        "disk full"
    );
    assert_eq!(group.result(1).unwrap().as_ref().unwrap_err(), "no route");
    assert_eq!(group.result(2).unwrap_err(), NotFoundError::new(2));
}

#[tokio::test(flavor = "multi_thread")]
async fn async_and_blocking_units_share_one_group() {
    let mut group = quiet::<u32, String>();
    group
        .add_async(async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(1)
        })
        .add_blocking(|| Ok(2))
        .add_async(async { Err("refused".to_string()) });

    group.run_within(Duration::from_secs(1)).await.unwrap();

    assert_eq!(group.data(), vec![Some(&1), Some(&2), None]);
    assert!(group.elapsed(0).unwrap() >= Duration::from_millis(20));
}

#[tokio::test(flavor = "multi_thread")]
async fn rerun_replaces_slots_instead_of_accumulating() {
    let mut group = quiet::<u8, String>();
    group.extend([sleeper(1, Ok(1)), sleeper(1, Ok(2)), sleeper(1, Ok(3))]);
    group.run_within(Duration::from_secs(1)).await.unwrap();
    assert_eq!(group.len(), 3);
    assert_eq!(group.pending_len(), 0);

    group.extend([sleeper(1, Ok(9)), sleeper(1, Ok(8))]);
    group.run_within(Duration::from_secs(1)).await.unwrap();

    assert_eq!(group.len(), 2);
    assert_eq!(group.data(), vec![Some(&9), Some(&8)]);
}

#[tokio::test(flavor = "multi_thread")]
async fn stragglers_fill_their_own_run_only() {
    let mut group = quiet::<&'static str, String>();
    group.add(sleeper(150, Ok("late")));
    assert!(group.run_within(Duration::from_millis(10)).await.is_err());

    group.add_blocking(|| Ok("second"));
    group.run_within(Duration::from_secs(1)).await.unwrap();

    // Let the first run's worker finish and write into its orphaned map.
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(group.len(), 1);
    assert_eq!(group.data(), vec![Some(&"second")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn finished_straggler_becomes_readable_after_timeout() {
    let mut group = quiet::<&'static str, String>();
    group.add(sleeper(100, Ok("eventually")));

    assert!(group.run_within(Duration::from_millis(10)).await.is_err());
    assert_eq!(group.result(0).unwrap_err(), NotFoundError::new(0));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(group.data(), vec![Some(&"eventually")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn run_uses_configured_deadline() {
    let settings = GroupSettings::new(Duration::from_millis(30), Duration::from_secs(1)).unwrap();
    let mut group: JobGroup<(), String> =
        JobGroup::with_settings(settings).with_sink(Arc::new(NullSink));
    group.add(sleeper(500, Ok(())));

    let err = group.run().await.unwrap_err();
    assert_eq!(err.deadline(), Duration::from_millis(30));
}

#[tokio::test(flavor = "multi_thread")]
async fn report_lists_failed_slow_and_timed_out_units() {
    let sink = Arc::new(MemorySink::new());
    let settings =
        GroupSettings::new(Duration::from_millis(200), Duration::from_millis(20)).unwrap();
    let mut group: JobGroup<(), String> = JobGroup::with_settings(settings).with_sink(sink.clone());
    group.extend([
        sleeper(0, Ok(())),
        sleeper(0, Err("bad input".to_string())),
        sleeper(60, Ok(())),
        sleeper(1500, Ok(())),
    ]);

    assert!(group.run().await.is_err());

    let report = sink.last().expect("one report per run");
    assert_eq!(report.units(), 4);
    assert!(report.caller().file().ends_with("group.rs"));
    assert_eq!(report.failed().collect::<Vec<_>>(), vec![1]);
    assert_eq!(report.timed_out().collect::<Vec<_>>(), vec![3]);
    assert!(
        report
            .lines()
            .iter()
            .any(|line| matches!(line, TraceLine::Slow { index: 2, .. }))
    );
    assert!(!report.lines().iter().any(|line| line.index() == 0));

    let rendered = report.to_string();
    assert!(rendered.contains("Start 4 units ..."));
    assert!(rendered.contains(" -> Run 1 unit time: "));
    assert!(rendered.contains("Error: bad input"));
    assert!(rendered.contains(" -> Warning: Run 3 unit timeout"));
    assert!(rendered.contains(" -> Total time spent: "));
}

#[tokio::test(flavor = "multi_thread")]
async fn each_run_emits_exactly_one_report() {
    let sink = Arc::new(MemorySink::new());
    let mut group: JobGroup<(), String> = JobGroup::new().with_sink(sink.clone());

    group.run_within(Duration::from_millis(10)).await.unwrap();
    group.add_blocking(|| Ok(()));
    group.run_within(Duration::from_secs(1)).await.unwrap();

    let units: Vec<usize> = sink.reports().iter().map(|r| r.units()).collect();
    assert_eq!(units, vec![0, 1]);
    assert!(sink.reports()[1].lines().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn run_and_data_returns_values_or_timeout() {
    let mut group = quiet::<u8, String>();
    group.extend([sleeper(1, Ok(4)), sleeper(1, Err("x".to_string()))]);
    let data = group.run_and_data(Duration::from_secs(1)).await.unwrap();
    assert_eq!(data, vec![Some(&4), None]);

    group.add(sleeper(500, Ok(5)));
    assert!(
        group
            .run_and_data(Duration::from_millis(10))
            .await
            .is_err()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn run_and_results_returns_every_outcome() {
    let mut group = quiet::<u8, String>();
    group.extend([sleeper(3, Ok(1)), sleeper(1, Err("nope".to_string()))]);

    let results = group.run_and_results(Duration::from_secs(1)).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0], &Ok(1));
    assert_eq!(results[1], &Err("nope".to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn run_units_hands_back_the_group() {
    let sink = Arc::new(MemorySink::new());
    let (group, status) = run_units(
        [sleeper(1, Ok('x')), sleeper(1, Ok('y'))],
        GroupSettings::default(),
        sink.clone(),
    )
    .await;

    assert!(status.is_ok());
    assert_eq!(group.data(), vec![Some(&'x'), Some(&'y')]);
    assert_eq!(sink.reports().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_unit_is_resumed_after_the_others_finish() {
    let finished = Arc::new(AtomicUsize::new(0));
    let mut group = quiet::<(), String>();
    for _ in 0..3 {
        let finished = Arc::clone(&finished);
        group.add_blocking(move || {
            thread::sleep(Duration::from_millis(10));
            finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    group.add_blocking(|| panic!("unit exploded"));

    let caught = AssertUnwindSafe(group.run_within(Duration::from_secs(1)))
        .catch_unwind()
        .await;

    let payload = caught.expect_err("panic is resumed on the caller");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"unit exploded"));
    assert_eq!(finished.load(Ordering::SeqCst), 3);
    assert_eq!(group.result(3).unwrap_err(), NotFoundError::new(3));
    assert!(group.result(0).is_ok());
}

async fn explode() -> Result<(), String> {
    panic!("async unit exploded")
}

#[tokio::test(flavor = "multi_thread")]
async fn panicking_async_unit_is_resumed_on_the_caller() {
    let mut group = quiet::<(), String>();
    group.add_async(explode()).add_async(async { Ok(()) });

    let caught = AssertUnwindSafe(group.run_within(Duration::from_secs(1)))
        .catch_unwind()
        .await;

    let payload = caught.expect_err("panic is resumed on the caller");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"async unit exploded"));
    assert_eq!(group.result(0).unwrap_err(), NotFoundError::new(0));
    assert_eq!(group.result(1).unwrap(), &Ok(()));
}

#[tokio::test(flavor = "multi_thread")]
async fn straggler_panic_does_not_leak_into_the_next_run() {
    let mut group = quiet::<&'static str, String>();
    group.add_blocking(|| {
        thread::sleep(Duration::from_millis(100));
        panic!("late explosion")
    });
    assert!(group.run_within(Duration::from_millis(10)).await.is_err());

    // Let the straggler panic inside the first run's state.
    tokio::time::sleep(Duration::from_millis(300)).await;

    group.add_blocking(|| Ok("fresh"));
    let second = AssertUnwindSafe(group.run_within(Duration::from_secs(1)))
        .catch_unwind()
        .await
        .expect("earlier panic stays with its own run");

    assert!(second.is_ok());
    assert_eq!(group.data(), vec![Some(&"fresh")]);
}

#[tokio::test(flavor = "multi_thread")]
async fn label_appears_in_report_header() {
    let sink = Arc::new(MemorySink::new());
    let mut group: JobGroup<(), String> = JobGroup::new()
        .with_sink(sink.clone())
        .with_label("fetch_profiles");
    group.add_blocking(|| Ok(()));

    group.run_within(Duration::from_secs(1)).await.unwrap();

    let report = sink.last().expect("one report per run");
    assert_eq!(report.label(), Some("fetch_profiles"));
    assert!(report.to_string().starts_with("[Group] fetch_profiles "));
}
