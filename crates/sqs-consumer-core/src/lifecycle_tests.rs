//! Tests for the start / stop controller.
//!
//! These run on real time with millisecond budgets; the assertions on
//! elapsed time leave generous headroom.

use super::*;
use crate::budget::ShutdownBudget;
use crate::test_support::{
    BlockingHandler, BlockingReceiveClient, PendingHandler, RecordingHandler, ScriptedClient,
};
use sqs_consumer_transport::{SessionConfig, SessionQueueClient};

fn settings(poll_wait_ms: u64, graceful_ms: u64, forced_ms: u64) -> ConsumerSettings {
    ConsumerSettings {
        poll_wait: Duration::from_millis(poll_wait_ms),
        max_batch_size: 10,
        budget: ShutdownBudget::with_graceful(
            Duration::from_millis(graceful_ms + forced_ms),
            Duration::from_millis(graceful_ms),
        )
        .expect("valid budget"),
    }
}

fn idle_consumer(client: &Arc<ScriptedClient>) -> Consumer {
    Consumer::new(
        client.clone(),
        Arc::new(RecordingHandler::new()),
        settings(50, 1_000, 1_000),
    )
}

// ============================================================================
// Start Tests
// ============================================================================

mod start_tests {
    use super::*;

    #[tokio::test]
    async fn test_start_moves_to_running() {
        let client = Arc::new(ScriptedClient::new());
        let consumer = idle_consumer(&client);
        assert_eq!(consumer.state(), LifecycleState::Idle);

        consumer.start().expect("start should succeed");

        assert_eq!(consumer.state(), LifecycleState::Running);
        consumer.stop().await;
    }

    #[tokio::test]
    async fn test_second_start_is_rejected() {
        let client = Arc::new(ScriptedClient::new());
        let consumer = idle_consumer(&client);
        consumer.start().expect("first start");

        let result = consumer.start();

        assert!(matches!(
            result,
            Err(LifecycleError::AlreadyStarted {
                state: LifecycleState::Running
            })
        ));
        consumer.stop().await;
    }

    /// A consumer is single-use: it cannot be restarted after a stop
    #[tokio::test]
    async fn test_start_after_stop_is_rejected() {
        let client = Arc::new(ScriptedClient::new());
        let consumer = idle_consumer(&client);
        consumer.start().expect("start");
        consumer.stop().await;

        let result = consumer.start();

        assert!(matches!(
            result,
            Err(LifecycleError::AlreadyStarted {
                state: LifecycleState::Stopped
            })
        ));
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let client = Arc::new(ScriptedClient::new());
        let consumer = idle_consumer(&client);

        assert!(matches!(consumer.start(), Err(LifecycleError::NoRuntime)));
        assert_eq!(consumer.state(), LifecycleState::Idle);
    }
}

// ============================================================================
// Stop Tests
// ============================================================================

mod stop_tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_before_start() {
        let client = Arc::new(ScriptedClient::new());
        let consumer = idle_consumer(&client);

        let report = consumer.stop().await;

        assert_eq!(report.outcome, ShutdownOutcome::AlreadyStopped);
        assert_eq!(consumer.state(), LifecycleState::Stopped);
        assert_eq!(client.close_calls.load(Ordering::SeqCst), 0);
    }

    /// Verify an idle consumer stops gracefully within one poll wait
    #[tokio::test]
    async fn test_idle_consumer_stops_gracefully() {
        // Arrange
        let client = Arc::new(ScriptedClient::new());
        let consumer = idle_consumer(&client);
        consumer.start().expect("start");
        tokio::time::sleep(Duration::from_millis(120)).await;

        // Act
        let report = consumer.stop().await;

        // Assert
        assert_eq!(report.outcome, ShutdownOutcome::Graceful);
        assert!(report.outcome.is_success());
        assert!(report.elapsed < Duration::from_millis(900));
        assert!(report.close_error.is_none());
        assert_eq!(consumer.state(), LifecycleState::Stopped);
        assert_eq!(client.close_calls.load(Ordering::SeqCst), 1);
        assert!(consumer.stats().polls >= 1);
    }

    /// Verify stop is idempotent and closes the client only once
    #[tokio::test]
    async fn test_stop_twice() {
        let client = Arc::new(ScriptedClient::new());
        let consumer = idle_consumer(&client);
        consumer.start().expect("start");

        let first = consumer.stop().await;
        let second = consumer.stop().await;

        assert_eq!(first.outcome, ShutdownOutcome::Graceful);
        assert_eq!(second.outcome, ShutdownOutcome::AlreadyStopped);
        assert_eq!(client.close_calls.load(Ordering::SeqCst), 1);
    }

    /// Verify concurrent stops both return and only one does the work
    #[tokio::test]
    async fn test_concurrent_stops() {
        let client = Arc::new(ScriptedClient::new());
        let consumer = idle_consumer(&client);
        consumer.start().expect("start");

        let (a, b) = tokio::join!(consumer.stop(), consumer.stop());

        let mut outcomes = vec![a.outcome, b.outcome];
        outcomes.sort_by_key(|o| *o == ShutdownOutcome::AlreadyStopped);
        assert_eq!(
            outcomes,
            vec![ShutdownOutcome::Graceful, ShutdownOutcome::AlreadyStopped]
        );
        assert_eq!(client.close_calls.load(Ordering::SeqCst), 1);
    }

    /// Verify a worker stuck at an await point is aborted in the forced phase
    #[tokio::test]
    async fn test_stuck_handler_is_aborted() {
        // Arrange
        let client = Arc::new(ScriptedClient::new().with_batch(&["A"]));
        let consumer = Consumer::new(
            client.clone(),
            Arc::new(PendingHandler),
            settings(50, 100, 1_000),
        );
        consumer.start().expect("start");
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Act
        let report = consumer.stop().await;

        // Assert
        assert_eq!(report.outcome, ShutdownOutcome::Forced);
        assert!(report.elapsed >= Duration::from_millis(100));
        assert!(report.elapsed < Duration::from_millis(1_000));
        assert!(client.acknowledged().is_empty());
        assert_eq!(consumer.state(), LifecycleState::Stopped);
        assert_eq!(client.close_calls.load(Ordering::SeqCst), 1);
    }

    /// Verify a worker blocking its thread is reported and abandoned, and a
    /// later stop picks it up once it finally exits
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocked_worker_reports_forced_timeout() {
        // Arrange
        let client = Arc::new(ScriptedClient::new().with_batch(&["A"]));
        let consumer = Consumer::new(
            client.clone(),
            Arc::new(BlockingHandler(Duration::from_millis(600))),
            settings(50, 100, 100),
        );
        consumer.start().expect("start");
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Act
        let first = consumer.stop().await;

        // Assert
        assert_eq!(first.outcome, ShutdownOutcome::ForcedTimeout);
        assert!(!first.outcome.is_success());
        assert!(first.elapsed >= Duration::from_millis(200));
        assert!(first.elapsed < Duration::from_millis(500));
        assert_eq!(consumer.state(), LifecycleState::ShuttingDown);
        assert_eq!(client.close_calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(700)).await;
        let second = consumer.stop().await;

        assert_eq!(second.outcome, ShutdownOutcome::Forced);
        assert_eq!(consumer.state(), LifecycleState::Stopped);
        assert_eq!(client.close_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_failure_does_not_change_outcome() {
        let client = Arc::new(ScriptedClient::new().failing_close());
        let consumer = idle_consumer(&client);
        consumer.start().expect("start");

        let report = consumer.stop().await;

        assert_eq!(report.outcome, ShutdownOutcome::Graceful);
        assert!(matches!(
            report.close_error,
            Some(QueueError::ConnectionFailed { .. })
        ));
    }

    /// Verify a client that never closes cannot hold a stop past its budget
    #[tokio::test]
    async fn test_hanging_close_is_bounded_by_budget() {
        // Arrange
        let client = Arc::new(ScriptedClient::new().hanging_close());
        let consumer = Consumer::new(
            client.clone(),
            Arc::new(RecordingHandler::new()),
            settings(50, 200, 200),
        );
        consumer.start().expect("start");

        // Act
        let report = consumer.stop().await;

        // Assert
        assert_eq!(report.outcome, ShutdownOutcome::Graceful);
        assert!(report.elapsed < Duration::from_millis(800));
        assert!(matches!(
            report.close_error,
            Some(QueueError::Timeout { .. })
        ));
        assert_eq!(client.close_calls.load(Ordering::SeqCst), 1);
    }

    /// Verify closing a session does not wait on a worker abandoned inside
    /// the provider receive
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_abandoned_session_receive_does_not_delay_stop() {
        // Arrange
        let inner = Arc::new(BlockingReceiveClient(Duration::from_millis(1_500)));
        let session = Arc::new(SessionQueueClient::new(
            inner,
            SessionConfig { prefetch: 10 },
        ));
        let consumer = Consumer::new(
            session.clone(),
            Arc::new(RecordingHandler::new()),
            settings(50, 100, 100),
        );
        consumer.start().expect("start");
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Act
        let report = consumer.stop().await;

        // Assert
        assert_eq!(report.outcome, ShutdownOutcome::ForcedTimeout);
        assert!(report.elapsed < Duration::from_millis(600));
        assert!(report.close_error.is_none());
        assert!(session.is_closed());
    }

    /// Verify messages handled before the stop were acknowledged
    #[tokio::test]
    async fn test_work_before_stop_is_acknowledged() {
        let client = Arc::new(ScriptedClient::new().with_batch(&["A", "B"]));
        let consumer = idle_consumer(&client);
        consumer.start().expect("start");
        tokio::time::sleep(Duration::from_millis(100)).await;

        let report = consumer.stop().await;

        assert_eq!(report.outcome, ShutdownOutcome::Graceful);
        assert_eq!(client.acknowledged(), vec!["A", "B"]);
        assert_eq!(consumer.stats().acknowledged, 2);
    }
}

// ============================================================================
// Interrupt Tests
// ============================================================================

mod interrupt_tests {
    use super::*;

    #[tokio::test]
    async fn test_interrupt_during_stop_aborts_worker() {
        // Arrange
        let client = Arc::new(ScriptedClient::new().with_batch(&["A"]));
        let consumer = Consumer::new(
            client.clone(),
            Arc::new(PendingHandler),
            settings(50, 5_000, 5_000),
        );
        consumer.start().expect("start");
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Act
        let result = consumer
            .stop_with_interrupt(tokio::time::sleep(Duration::from_millis(50)))
            .await;

        // Assert
        match result {
            Err(ShutdownError::Interrupted { elapsed }) => {
                assert!(elapsed < Duration::from_secs(5));
            }
            other => panic!("expected Interrupted, got {:?}", other),
        }
        assert_eq!(consumer.state(), LifecycleState::Stopped);
        assert_eq!(client.close_calls.load(Ordering::SeqCst), 0);
        assert_eq!(consumer.stop().await.outcome, ShutdownOutcome::AlreadyStopped);
    }

    /// Verify an interrupt that never fires leaves the normal outcome
    #[tokio::test]
    async fn test_unfired_interrupt() {
        let client = Arc::new(ScriptedClient::new());
        let consumer = idle_consumer(&client);
        consumer.start().expect("start");

        let result = consumer
            .stop_with_interrupt(tokio::time::sleep(Duration::from_secs(30)))
            .await;

        assert_eq!(
            result.expect("stop should not be interrupted").outcome,
            ShutdownOutcome::Graceful
        );
    }
}
