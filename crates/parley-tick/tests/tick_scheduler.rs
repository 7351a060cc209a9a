//! Integration tests for the poll pacer.
//!
//! Uses paused Tokio time so `sleep_until` resolves as soon as the runtime
//! has nothing else to do.

use std::time::Duration;

use parley_tick::{PollMetrics, TickConfig, TickPolicy, TickScheduler};

// =========================================================================
// TickConfig
// =========================================================================

#[test]
fn test_default_config_polls_at_20hz() {
    let cfg = TickConfig::default();
    assert_eq!(cfg.poll_rate_hz, 20);
    assert_eq!(cfg.poll_period(), Duration::from_millis(50));
    assert_eq!(cfg.policy, TickPolicy::Skip);
}

#[test]
fn test_validated_clamps_zero_rate_to_one() {
    let cfg = TickConfig::with_rate(0).validated();
    assert_eq!(cfg.poll_rate_hz, 1);
}

#[test]
fn test_validated_clamps_rate_above_tick_clock() {
    let cfg = TickConfig::with_rate(500).validated();
    assert_eq!(cfg.poll_rate_hz, TickConfig::MAX_POLL_RATE_HZ);
}

#[test]
fn test_validated_clamps_threshold() {
    let cfg = TickConfig {
        budget_warn_threshold: 4.0,
        ..TickConfig::default()
    }
    .validated();
    assert_eq!(cfg.budget_warn_threshold, 1.0);
}

// =========================================================================
// Scheduler
// =========================================================================

#[test]
fn test_scheduler_initial_state() {
    let s = TickScheduler::with_rate(10);
    assert_eq!(s.polls(), 0);
    assert_eq!(s.poll_rate_hz(), 10);
    assert_eq!(s.poll_period(), Duration::from_millis(100));
    assert_eq!(s.metrics(), PollMetrics::default());
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_fires_and_increments() {
    let mut s = TickScheduler::new(TickConfig::default());

    let info = s.wait_for_tick().await;
    assert_eq!(info.poll, 1);
    assert!(!info.late);
    assert_eq!(info.skipped, 0);
    assert_eq!(s.polls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_for_tick_respects_period() {
    let mut s = TickScheduler::new(TickConfig::default());
    let start = tokio::time::Instant::now();

    for _ in 0..4 {
        s.wait_for_tick().await;
    }

    assert_eq!(start.elapsed(), Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_skip_policy_reports_skipped_polls_after_stall() {
    let mut s = TickScheduler::new(TickConfig::default());
    s.wait_for_tick().await;

    // Stall the loop for three and a half periods.
    tokio::time::advance(Duration::from_millis(225)).await;

    let info = s.wait_for_tick().await;
    assert!(info.late);
    assert_eq!(info.skipped, 3);
    assert_eq!(s.metrics().skipped, 3);
    assert_eq!(s.metrics().late_wakeups, 1);
    assert_eq!(s.metrics().polls, 2);
}

#[tokio::test(start_paused = true)]
async fn test_drop_policy_keeps_original_cadence() {
    let mut s = TickScheduler::new(TickConfig {
        policy: TickPolicy::Drop,
        ..TickConfig::default()
    });
    let start = tokio::time::Instant::now();
    s.wait_for_tick().await;

    tokio::time::advance(Duration::from_millis(120)).await;
    let late = s.wait_for_tick().await;
    assert!(late.late);
    assert_eq!(late.skipped, 0);

    // The third poll was due at 150 ms, which has already passed.
    s.wait_for_tick().await;
    assert!(start.elapsed() < Duration::from_millis(200));
}

#[tokio::test(start_paused = true)]
async fn test_record_poll_end_without_wait_is_noop() {
    let mut s = TickScheduler::new(TickConfig::default());
    s.record_poll_end();
    assert_eq!(s.metrics().slow_polls, 0);
}

#[tokio::test(start_paused = true)]
async fn test_record_poll_end_flags_slow_poll() {
    let mut s = TickScheduler::new(TickConfig {
        budget_warn_threshold: 0.0,
        ..TickConfig::default()
    });
    s.wait_for_tick().await;
    s.record_poll_end();
    assert_eq!(s.metrics().slow_polls, 1);
}

// =========================================================================
// Driver loop shape
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_commands_are_seen_on_the_next_poll() {
    let mut pacer = TickScheduler::new(TickConfig::default());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<&str>();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(160)).await;
        let _ = tx.send("ready");
    });

    // Polls at 50, 100, 150 ms find nothing; the one at 200 ms sees the
    // command sent at 160 ms.
    let seen_on = loop {
        let info = pacer.wait_for_tick().await;
        if let Ok(command) = rx.try_recv() {
            assert_eq!(command, "ready");
            break info.poll;
        }
        pacer.record_poll_end();
    };

    assert_eq!(seen_on, 4);
}
