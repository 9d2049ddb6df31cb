//! End-to-end tests of the library API: grace period, escalation across
//! restarts, bans, sweeping and the request facade. All run against the
//! noop packet filter.

use chrono::{DateTime, Duration, TimeZone, Utc};
use pathwarden::clock::{Clock, ManualClock};
use pathwarden::config::Config;
use pathwarden::engine::Escalation;
use pathwarden::guard::{client_address, Action, Guard};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap()
}

fn config(dir: &TempDir) -> Config {
    Config {
        storage_file: dir.path().join("blocked_ips.json"),
        system_type: "noop".to_string(),
        timeout_duration: "1h".to_string(),
        cleanup_enabled: false,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_grace_period_then_timed_block() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let guard = Guard::start_with_clock(&config(&dir), clock.clone()).await.unwrap();

    for _ in 0..3 {
        assert!(!guard.decide("203.0.113.5", "/.env").await.is_blocked());
    }
    assert!(guard.decide("203.0.113.5", "/.env").await.is_blocked());
    assert!(guard.decide("203.0.113.5", "/").await.is_blocked());

    let record = guard.engine().record("203.0.113.5").unwrap();
    assert_eq!(record.request_count, 4);
    assert_eq!(record.timeout_count, 1);
    assert_eq!(record.blocked_until, Some(t0() + Duration::hours(1)));

    clock.advance(StdDuration::from_secs(3601));
    assert!(!guard.decide("203.0.113.5", "/").await.is_blocked());

    guard.shutdown().await;
}

#[tokio::test]
async fn test_escalation_survives_restart() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let config = Config {
        grace_period: 0,
        escalation: Escalation::Geometric,
        ..config(&dir)
    };

    let guard = Guard::start_with_clock(&config, clock.clone()).await.unwrap();
    assert!(guard.decide("198.51.100.7", "/wp-login.php").await.is_blocked());
    guard.shutdown().await;

    // Restart while still blocked: the block is restored
    clock.advance(StdDuration::from_secs(30 * 60));
    let guard = Guard::start_with_clock(&config, clock.clone()).await.unwrap();
    assert_eq!(guard.restore_report().restored, 1);
    assert!(guard.decide("198.51.100.7", "/").await.is_blocked());
    guard.shutdown().await;

    // Restart after expiry without a sweep: history is kept and the next
    // block is twice as long
    clock.advance(StdDuration::from_secs(3600));
    let guard = Guard::start_with_clock(&config, clock.clone()).await.unwrap();
    assert_eq!(guard.restore_report().skipped, 1);
    assert!(guard.decide("198.51.100.7", "/.git/HEAD").await.is_blocked());

    let record = guard.engine().record("198.51.100.7").unwrap();
    assert_eq!(record.timeout_count, 2);
    assert_eq!(record.blocked_until, Some(clock.now() + Duration::hours(2)));
    guard.shutdown().await;
}

#[tokio::test]
async fn test_ban_is_never_swept() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let config = Config {
        grace_period: 1,
        timeout_enabled: false,
        ..config(&dir)
    };

    let guard = Guard::start_with_clock(&config, clock.clone()).await.unwrap();
    assert!(!guard.decide("2001:db8::7", "/admin").await.is_blocked());
    assert!(guard.decide("2001:db8::7", "/admin").await.is_blocked());

    clock.advance(StdDuration::from_secs(365 * 86_400));
    let report = guard.engine().sweep().await;
    assert_eq!(report.removed, 0);
    assert!(guard.decide("2001:db8:0::7", "/").await.is_blocked());

    assert!(guard.engine().unblock("2001:db8::7").await.unwrap());
    assert!(!guard.decide("2001:db8::7", "/").await.is_blocked());
    guard.shutdown().await;
}

#[tokio::test]
async fn test_sweep_forgets_expired_blocks() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let config = Config {
        grace_period: 0,
        ..config(&dir)
    };

    let guard = Guard::start_with_clock(&config, clock.clone()).await.unwrap();
    assert!(guard.decide("203.0.113.20", "/phpmyadmin").await.is_blocked());
    assert!(guard.decide("203.0.113.21", "/phpmyadmin").await.is_blocked());

    clock.advance(StdDuration::from_secs(2 * 3600));
    let report = guard.engine().sweep().await;
    assert_eq!(report.removed, 2);
    assert!(report.first_error.is_none());
    assert!(guard.engine().records().is_empty());

    // A fresh block starts from the base timeout again
    assert!(guard.decide("203.0.113.20", "/phpmyadmin").await.is_blocked());
    let record = guard.engine().record("203.0.113.20").unwrap();
    assert_eq!(record.timeout_count, 1);
    assert_eq!(record.blocked_until, Some(clock.now() + Duration::hours(1)));
    guard.shutdown().await;
}

#[tokio::test]
async fn test_request_guard_with_forwarded_headers() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(t0()));
    let config = Config {
        grace_period: 0,
        ..config(&dir)
    };

    let guard = Guard::start_with_clock(&config, clock).await.unwrap();
    let requests = guard.request_guard();

    let client = client_address(Some("203.0.113.50, 10.0.0.1"), None, Some("10.0.0.1:4431")).unwrap();
    assert_eq!(requests.check(&client, "/.ENV").await, Action::Forbid);

    // The proxy itself is not blocked
    let proxy = client_address(None, None, Some("10.0.0.1:4431")).unwrap();
    assert_eq!(requests.check(&proxy, "/").await, Action::Continue);

    // Loopback is whitelisted by default
    assert_eq!(requests.check("127.0.0.1", "/.git/config").await, Action::Continue);

    drop(requests);
    guard.shutdown().await;
}

#[tokio::test]
async fn test_second_guard_on_same_store_fails() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    let first = Guard::start(&config).await.unwrap();
    assert!(Guard::start(&config).await.is_err());
    first.shutdown().await;

    let again = Guard::start(&config).await.unwrap();
    again.shutdown().await;
}
