mod common;

use common::harness;
use notifier::scheduler::run_periodic_sync;
use std::{sync::atomic::Ordering, time::Duration};

#[tokio::test(start_paused = true)]
async fn runs_immediately_then_every_interval() {
    let h = harness();
    let interval = Duration::from_secs(5 * 60);
    let task = tokio::spawn(run_periodic_sync(h.engine.clone(), interval));

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(h.source.fetch_calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(interval).await;
    assert_eq!(h.source.fetch_calls.load(Ordering::SeqCst), 2);

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn keeps_running_after_failed_cycles() {
    let h = harness();
    h.source
        .fail_next(notifier::source::SourceError::Transient("timeout".to_string()));
    let interval = Duration::from_secs(60);
    let task = tokio::spawn(run_periodic_sync(h.engine.clone(), interval));

    tokio::time::sleep(Duration::from_secs(150)).await;
    assert_eq!(h.source.fetch_calls.load(Ordering::SeqCst), 3);

    task.abort();
}
