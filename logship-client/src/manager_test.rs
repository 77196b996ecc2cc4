#[cfg(test)]
mod tests {
    use std::time::Duration;

    use logship_core::{Endpoint, MemoryTransport, StreamTransport};

    use crate::manager::EventManager;

    async fn memory_manager(backends: &[&str]) -> (EventManager, MemoryTransport) {
        let transport = MemoryTransport::new();
        let manager = manager_with(backends, &transport).await;
        (manager, transport)
    }

    async fn manager_with(backends: &[&str], transport: &MemoryTransport) -> EventManager {
        let manager = EventManager::builder()
            .backends(backends.iter().copied())
            .with_transport(StreamTransport::InMemory(transport.clone()))
            .build()
            .await
            .expect("manager builds");
        manager.start().await.expect("manager starts");
        manager
    }

    /// Lets spawned drain tasks run between assertions.
    async fn settle() {
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
    }

    /// Test: logger registry identity
    ///
    /// Purpose
    /// - Validate that repeated acquisition without release returns the
    ///   same registered logger
    ///
    /// Flow
    /// - Acquire a logger twice for one event id
    ///
    /// Expected
    /// - Both handles share the same registration
    #[tokio::test]
    async fn repeated_get_returns_same_logger() {
        let (manager, _transport) = memory_manager(&["a"]).await;

        let first = manager.get_logger("build-1");
        let second = manager.get_logger("build-1");
        assert!(first.same_instance(&second));
        assert_eq!(manager.test_logger_count(), 1);

        manager.close();
    }

    /// Test: release then re-acquire
    ///
    /// Expected
    /// - A released event id yields a distinct logger with a fresh
    ///   creation time
    #[tokio::test(start_paused = true)]
    async fn release_then_get_creates_fresh_logger() {
        let (manager, _transport) = memory_manager(&["a"]).await;

        let first = manager.get_logger("build-1");
        tokio::time::advance(Duration::from_secs(1)).await;
        manager.release_logger(&first);

        let second = manager.get_logger("build-1");
        assert!(!first.same_instance(&second));
        assert!(second.created_at() > first.created_at());

        manager.close();
    }

    /// Test: releasing a stale clone is a no-op
    #[tokio::test]
    async fn release_of_stale_logger_keeps_current_registration() {
        let (manager, _transport) = memory_manager(&["a"]).await;

        let stale = manager.get_logger("build-1");
        manager.release_logger(&stale);
        let current = manager.get_logger("build-1");

        // the stale handle no longer matches the registration
        manager.release_logger(&stale);
        let again = manager.get_logger("build-1");
        assert!(current.same_instance(&again));

        manager.close();
    }

    /// Test: blank event ids collapse onto the reserved system event
    #[tokio::test]
    async fn blank_event_id_normalizes_to_system() {
        let (manager, _transport) = memory_manager(&["a"]).await;

        let empty = manager.get_logger("");
        let blank = manager.get_logger("   ");
        assert_eq!(empty.event_id(), "system");
        assert!(empty.same_instance(&blank));

        manager.close();
    }

    /// Test: selection rotates over healthy servers
    ///
    /// Expected
    /// - With servers [a, b] healthy and the cursor at zero, four
    ///   consecutive selections yield a, b, a, b
    #[tokio::test]
    async fn round_robin_over_healthy_servers() {
        let (manager, _transport) = memory_manager(&["a", "b"]).await;

        let picks: Vec<_> = (0..4).filter_map(|_| manager.test_pick_server()).collect();
        assert_eq!(picks, vec!["a", "b", "a", "b"]);

        manager.close();
    }

    /// Test: abnormal servers are skipped by selection
    #[tokio::test]
    async fn abnormal_server_is_skipped() {
        let (manager, _transport) = memory_manager(&["a", "b"]).await;
        manager.test_mark_abnormal("a");

        for _ in 0..3 {
            assert_eq!(manager.test_pick_server().as_deref(), Some("b"));
        }

        manager.close();
    }

    /// Test: with every server abnormal, selection degrades to any
    /// registered queue instead of none
    #[tokio::test]
    async fn all_abnormal_falls_back_to_any_handle() {
        let (manager, _transport) = memory_manager(&["a", "b"]).await;
        manager.test_mark_abnormal("a");
        manager.test_mark_abnormal("b");

        let pick = manager.test_pick_server();
        assert!(matches!(pick.as_deref(), Some("a") | Some("b")));

        manager.close();
    }

    /// Test: an empty handle registry yields no queue and loggers
    /// still construct, with emits as no-ops
    #[tokio::test]
    async fn empty_registry_yields_no_queue() {
        let (manager, transport) = memory_manager(&["a"]).await;
        manager.test_mark_abnormal("a");
        manager.test_drop_handle("a");

        assert_eq!(manager.test_pick_server(), None);

        let logger = manager.get_logger("orphan");
        logger.info("goes nowhere", None);
        settle().await;
        assert_eq!(transport.delivered_count("a"), 0);

        manager.close();
    }

    /// Test: selection lazily materializes a missing handle
    #[tokio::test]
    async fn selection_lazily_recreates_handle() {
        let (manager, _transport) = memory_manager(&["a"]).await;
        manager.test_drop_handle("a");
        assert!(manager.test_handle_servers().is_empty());

        assert_eq!(manager.test_pick_server().as_deref(), Some("a"));
        assert_eq!(manager.test_handle_servers(), vec!["a"]);

        manager.close();
    }

    /// Test: endpoint reconciliation
    ///
    /// Purpose
    /// - Validate handle-set reconciliation against a membership
    ///   snapshot with partial overlap
    ///
    /// Flow
    /// - Start with [a, b], mark a abnormal, update to [b, c, d]
    ///
    /// Expected
    /// - Exactly the new addresses have handles, b's queue survives
    ///   untouched, and the abnormal set is emptied
    #[tokio::test]
    async fn update_endpoints_reconciles_handles() {
        let (manager, _transport) = memory_manager(&["a", "b"]).await;
        manager.test_mark_abnormal("a");
        let b_queue = manager.test_queue_for("b").expect("b handle");

        manager.update_endpoints(&[
            Endpoint::new("backend-b", "b"),
            Endpoint::new("backend-c", "c"),
            Endpoint::new("backend-d", "d"),
        ]);

        assert_eq!(manager.test_servers(), vec!["b", "c", "d"]);
        assert_eq!(manager.test_handle_servers(), vec!["b", "c", "d"]);
        assert!(manager.test_abnormal().is_empty());
        let b_after = manager.test_queue_for("b").expect("b handle kept");
        assert!(b_after.same_channel(&b_queue));

        manager.close();
    }

    /// Test: empty endpoint input is ignored
    #[tokio::test]
    async fn update_endpoints_empty_input_is_noop() {
        let (manager, _transport) = memory_manager(&["a", "b"]).await;
        manager.test_mark_abnormal("a");

        manager.update_endpoints(&[]);

        assert_eq!(manager.test_servers(), vec!["a", "b"]);
        assert_eq!(manager.test_abnormal(), vec!["a"]);

        manager.close();
    }

    /// Test: failover migrates bound loggers
    ///
    /// Expected
    /// - Discarding a queue marks its server abnormal, drops the
    ///   handle, and rebinds only the loggers that pointed at it
    #[tokio::test]
    async fn failover_migrates_bound_loggers() {
        let (manager, _transport) = memory_manager(&["a", "b"]).await;

        let on_a = manager.get_logger("ev-a");
        let on_b = manager.get_logger("ev-b");
        let a_queue = manager.test_queue_for("a").expect("a handle");
        let b_queue = manager.test_queue_for("b").expect("b handle");
        assert!(on_a.queue().expect("bound").same_channel(&a_queue));

        manager.discard_queue(&a_queue);

        assert_eq!(manager.test_abnormal(), vec!["a"]);
        assert_eq!(manager.test_handle_servers(), vec!["b"]);
        assert!(on_a.queue().expect("rebound").same_channel(&b_queue));
        assert!(on_b.queue().expect("untouched").same_channel(&b_queue));

        manager.close();
    }

    /// Test: GC sweep reclaims unreleased loggers
    ///
    /// Flow
    /// - Acquire a logger and let virtual time pass one full sweep
    ///   beyond the 60 second age limit
    ///
    /// Expected
    /// - The logger registry is empty without an explicit release
    #[tokio::test(start_paused = true)]
    async fn gc_releases_stale_loggers() {
        let (manager, _transport) = memory_manager(&["a"]).await;

        let _stale = manager.get_logger("forgotten");
        assert_eq!(manager.test_logger_count(), 1);

        for _ in 0..5 {
            tokio::time::advance(Duration::from_secs(20)).await;
            settle().await;
        }
        assert_eq!(manager.test_logger_count(), 0);

        manager.close();
    }

    /// Test: connect failures retry on the fixed interval
    ///
    /// Expected
    /// - An unreachable backend sees a connect attempt roughly every
    ///   three seconds, giving at least two retries within seven
    #[tokio::test(start_paused = true)]
    async fn connect_failures_retry_on_fixed_interval() {
        let transport = MemoryTransport::new();
        transport.refuse_connect("a", usize::MAX);
        let manager = manager_with(&["a"], &transport).await;

        settle().await;
        assert_eq!(transport.connect_attempts("a"), 1);

        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(transport.connect_attempts("a"), 2);

        tokio::time::advance(Duration::from_secs(3)).await;
        settle().await;
        assert_eq!(transport.connect_attempts("a"), 3);

        manager.close();
        tokio::time::advance(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(transport.connect_attempts("a"), 3);
    }

    /// Test: a stream send failure is terminal for its handle
    ///
    /// Expected
    /// - No reconnect on the failed handle, the server lands in the
    ///   abnormal set, and the handle leaves the registry
    #[tokio::test]
    async fn stream_send_failure_never_retries() {
        let transport = MemoryTransport::new();
        transport.fail_sends_after("a", 0);
        let manager = manager_with(&["a"], &transport).await;

        let logger = manager.get_logger("ev");
        logger.info("lost to the failing stream", None);
        settle().await;

        assert_eq!(transport.connect_attempts("a"), 1);
        assert_eq!(transport.delivered_count("a"), 0);
        assert_eq!(manager.test_abnormal(), vec!["a"]);
        assert!(manager.test_handle_servers().is_empty());

        manager.close();
    }

    /// Test: a stream-open failure after a successful connect is also
    /// terminal, not retried
    #[tokio::test]
    async fn stream_open_failure_discards_backend() {
        let transport = MemoryTransport::new();
        transport.fail_stream_open("a", 1);
        let manager = manager_with(&["a"], &transport).await;

        settle().await;

        assert_eq!(transport.connect_attempts("a"), 1);
        assert_eq!(manager.test_abnormal(), vec!["a"]);
        assert!(manager.test_handle_servers().is_empty());

        manager.close();
    }
}
