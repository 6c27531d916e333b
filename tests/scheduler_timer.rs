// tests/scheduler_timer.rs
//
// Timer behaviour, on tokio's paused clock. Every await here stays busy
// (no task parks on anything but the clock) so time only moves through
// `time::advance`.

mod common;
use crate::common::builders::{plan, remote_for};
use crate::common::{with_timeout, FakeRunner, FakeSourceControl, Harness};

use std::error::Error;

use tokio::time::{self, Duration, Instant};

use habitat::engine::{RuntimeOptions, SchedulerOptions};
use habitat::types::SchedulerState;

type TestResult = Result<(), Box<dyn Error>>;

const TIP: &str = "abcdefabcdefabcdefabcdefabcdefabcdefabcd";

fn timer_options(initial_delay: u64, interval: u64) -> SchedulerOptions {
    SchedulerOptions {
        initial_delay: Duration::from_secs(initial_delay),
        interval: Duration::from_secs(interval),
        ..SchedulerOptions::default()
    }
}

/// Give the scheduler task a chance to handle anything already due.
async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn first_tick_waits_for_initial_delay_then_follows_interval() -> TestResult {
    let h = Harness::start_with_options(
        Vec::new(),
        FakeSourceControl::new(),
        FakeRunner::new(),
        timer_options(10, 30),
    );
    // The ticker is armed once the loop has answered a request.
    h.handle.plans().await?;

    time::advance(Duration::from_secs(9)).await;
    settle().await;
    assert_eq!(h.handle.status().evaluated_ticks, 0);

    time::advance(Duration::from_secs(1)).await;
    with_timeout(h.handle.wait_for(|s| s.evaluated_ticks == 1)).await?;

    time::advance(Duration::from_secs(29)).await;
    settle().await;
    assert_eq!(h.handle.status().evaluated_ticks, 1);

    time::advance(Duration::from_secs(1)).await;
    with_timeout(h.handle.wait_for(|s| s.evaluated_ticks == 2)).await?;

    h.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn timer_tick_during_an_update_is_skipped() -> TestResult {
    let scm = FakeSourceControl::new();
    scm.set_branch(&remote_for("api"), "master", TIP);
    let h = Harness::start_with_options(
        vec![plan("api")],
        scm,
        FakeRunner::gated(),
        timer_options(10, 30),
    );
    h.handle.plans().await?;

    time::advance(Duration::from_secs(10)).await;
    with_timeout(h.handle.wait_for(|s| s.state == SchedulerState::Updating)).await?;
    assert_eq!(h.handle.status().evaluated_ticks, 1);

    // Next scheduled tick lands while the build is still blocked.
    time::advance(Duration::from_secs(30)).await;
    settle().await;
    let status = h.handle.status();
    assert_eq!(status.state, SchedulerState::Updating);
    assert_eq!(status.evaluated_ticks, 1);

    h.runner.release(2);
    let status = with_timeout(
        h.handle
            .wait_for(|s| s.completed_batches == 1 && s.state == SchedulerState::Idle),
    )
    .await?;
    assert_eq!(status.evaluated_ticks, 1);
    assert_eq!(h.runner.scripts().len(), 2);

    h.shutdown().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn once_mode_ticks_without_the_initial_delay() -> TestResult {
    let start = Instant::now();
    let h = Harness::start_with(
        Vec::new(),
        FakeSourceControl::new(),
        FakeRunner::new(),
        RuntimeOptions {
            exit_when_idle: true,
        },
    );

    with_timeout(h.task).await??;

    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(h.handle.status().evaluated_ticks, 1);
    Ok(())
}
