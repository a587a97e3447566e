//! End-to-end behaviour of the retry scheduler and the wake entry point.
//!
//! Everything here runs against a scripted connector on paused tokio time,
//! except `test_live_wake`, which needs a real server:
//!
//! ```bash
//! export MSSQL_HOST=myserver.database.windows.net
//! export MSSQL_USER=app
//! export MSSQL_PASSWORD=secret
//! export MSSQL_DATABASE=orders
//!
//! cargo test -p wakeup-core --test wake -- --ignored
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use wakeup_core::retry::retry;
use wakeup_core::{
    AttemptOutcome, CancelReason, Connect, ConnectError, ConnectionParameters, ConnectionString,
    Error, RetryPolicy,
};

const PAUSED: &str = "Database 'orders' on server 'myserver' is not currently available. \
    Please retry the connection later. (40613)";

#[derive(Debug, Clone)]
enum Step {
    Paused,
    Fatal(&'static str),
    Ok,
}

/// Connector that replays a fixed script, then repeats its last step.
struct ScriptedConnector {
    script: Mutex<VecDeque<Step>>,
    last: Step,
    calls: AtomicU32,
    started_at: Mutex<Vec<Instant>>,
    seen: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    fn new(script: impl IntoIterator<Item = Step>, then: Step) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            last: then,
            calls: AtomicU32::new(0),
            started_at: Mutex::new(Vec::new()),
            seen: Mutex::new(Vec::new()),
        }
    }

    fn always(step: Step) -> Self {
        Self::new([], step)
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of non-zero gaps between consecutive attempts.
    fn backoff_sleeps(&self) -> usize {
        self.started_at
            .lock()
            .unwrap()
            .windows(2)
            .filter(|w| w[1] > w[0])
            .count()
    }

    fn gaps(&self) -> Vec<Duration> {
        self.started_at
            .lock()
            .unwrap()
            .windows(2)
            .map(|w| w[1] - w[0])
            .collect()
    }
}

#[async_trait]
impl Connect for ScriptedConnector {
    type Handle = u32;

    async fn connect_and_verify(
        &self,
        conn: &ConnectionString,
        _verify_timeout: Duration,
    ) -> AttemptOutcome<u32> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.started_at.lock().unwrap().push(Instant::now());
        self.seen.lock().unwrap().push(conn.as_str().to_owned());

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.last.clone());
        match step {
            Step::Paused => AttemptOutcome::from_failure(ConnectError::message(PAUSED)),
            Step::Fatal(msg) => AttemptOutcome::from_failure(ConnectError::message(msg)),
            Step::Ok => AttemptOutcome::Success(attempt),
        }
    }
}

fn params() -> ConnectionParameters {
    ConnectionParameters::new()
        .server("myserver.database.windows.net")
        .database("orders")
        .credentials("app", "secret")
}

fn policy() -> RetryPolicy {
    RetryPolicy::default()
        .base_delay(Duration::from_secs(1))
        .jitter_fraction(0.0)
}

#[tokio::test(start_paused = true)]
async fn test_two_transient_failures_then_success() {
    let connector = ScriptedConnector::new([Step::Paused, Step::Paused], Step::Ok);

    let handle = wakeup_core::wake_with(&connector, &params(), &policy(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(handle, 3);
    assert_eq!(connector.calls(), 3);
    assert_eq!(connector.backoff_sleeps(), 2);
    assert_eq!(connector.gaps(), vec![Duration::from_secs(1); 2]);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_failure_stops_immediately() {
    let connector = ScriptedConnector::always(Step::Fatal("bad password"));
    let start = Instant::now();

    let err = wakeup_core::wake_with(&connector, &params(), &policy(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(connector.calls(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    match err {
        Error::Fatal {
            attempt: 1, source, ..
        } => assert_eq!(source.to_string(), "bad password"),
        other => panic!("expected fatal error, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_after_max_attempts() {
    let connector = ScriptedConnector::always(Step::Paused);
    let policy = policy().max_attempts(15);

    let err = wakeup_core::wake_with(&connector, &params(), &policy, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(connector.calls(), 15);
    assert_eq!(connector.backoff_sleeps(), 14);
    match err {
        Error::Exhausted {
            attempts: 15,
            source,
            elapsed,
        } => {
            assert!(source.to_string().contains("40613"));
            assert_eq!(elapsed, Duration::from_secs(14));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_exponential_policy_doubles_gaps() {
    let connector = ScriptedConnector::always(Step::Paused);
    let policy = RetryPolicy::exponential()
        .base_delay(Duration::from_secs(1))
        .jitter_fraction(0.0);

    let err = wakeup_core::wake_with(&connector, &params(), &policy, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Exhausted { attempts: 6, .. }));
    assert_eq!(
        connector.gaps(),
        [1, 2, 4, 8, 16].map(Duration::from_secs).to_vec()
    );
}

#[tokio::test(start_paused = true)]
async fn test_jittered_gaps_stay_in_bounds() {
    let connector = ScriptedConnector::always(Step::Paused);
    let policy = policy().max_attempts(8).jitter_fraction(0.5);

    let _ = wakeup_core::wake_with(&connector, &params(), &policy, &CancellationToken::new()).await;

    let gaps = connector.gaps();
    assert_eq!(gaps.len(), 7);
    for gap in gaps {
        assert!(gap >= Duration::from_secs(1), "{gap:?}");
        assert!(gap <= Duration::from_millis(1500), "{gap:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_backoff_returns_promptly() {
    let connector = ScriptedConnector::always(Step::Paused);
    let policy = policy().base_delay(Duration::from_secs(60));
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(2)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = wakeup_core::wake_with(&connector, &params(), &policy, &cancel)
        .await
        .unwrap_err();

    assert!(start.elapsed() < Duration::from_secs(3));
    assert_eq!(connector.calls(), 1);
    match err {
        Error::Cancelled {
            reason: CancelReason::Signal,
            attempts: 1,
            last: Some(_),
            ..
        } => {}
        other => panic!("expected cancellation, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_before_first_attempt() {
    let connector = ScriptedConnector::always(Step::Ok);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = wakeup_core::wake_with(&connector, &params(), &policy(), &cancel)
        .await
        .unwrap_err();

    assert_eq!(connector.calls(), 0);
    assert!(matches!(
        err,
        Error::Cancelled {
            reason: CancelReason::Signal,
            attempts: 0,
            ..
        }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_empty_parameters_fail_without_attempt() {
    let connector = ScriptedConnector::always(Step::Ok);

    let err = wakeup_core::wake_with(
        &connector,
        &ConnectionParameters::new(),
        &policy(),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();

    assert!(err.is_configuration());
    assert_eq!(connector.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_raw_dsn_reaches_connector_unchanged() {
    let connector = ScriptedConnector::always(Step::Ok);
    let params = params().raw_dsn("sqlserver://u:p@host/instance");

    wakeup_core::wake_with(&connector, &params, &policy(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(
        *connector.seen.lock().unwrap(),
        vec!["sqlserver://u:p@host/instance".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_attempts_never_exceed_budget() {
    for max_attempts in 1..=6 {
        let calls = AtomicU32::new(0);
        let policy = policy().max_attempts(max_attempts);

        let result: wakeup_core::Result<()> = retry(&policy, &CancellationToken::new(), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { AttemptOutcome::from_failure(ConnectError::message(PAUSED)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), max_attempts);
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_attempt_is_cut_by_deadline() {
    let policy = policy().overall_deadline(Duration::from_secs(10));
    let start = Instant::now();

    let result: wakeup_core::Result<()> = retry(&policy, &CancellationToken::new(), |_| async {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        AttemptOutcome::Success(())
    })
    .await;

    assert!(matches!(
        result,
        Err(Error::Cancelled {
            reason: CancelReason::Deadline,
            attempts: 1,
            ..
        })
    ));
    assert_eq!(start.elapsed(), Duration::from_secs(10));
}

#[tokio::test]
#[ignore = "requires a reachable SQL Server"]
async fn test_live_wake() {
    let var = |name: &str| std::env::var(name).unwrap_or_default();
    let mut params = ConnectionParameters::new()
        .server(var("MSSQL_HOST"))
        .credentials(var("MSSQL_USER"), var("MSSQL_PASSWORD"));
    let database = var("MSSQL_DATABASE");
    if !database.is_empty() {
        params = params.database(database);
    }

    let handle = wakeup_core::wake(&params, &RetryPolicy::default(), &CancellationToken::new())
        .await
        .expect("database should wake up");
    handle.ping(Duration::from_secs(30)).await.unwrap();
    handle.close();
}
