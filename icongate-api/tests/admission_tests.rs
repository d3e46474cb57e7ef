//! Admission behaviour of searches that miss the cache: the concurrency cap,
//! FIFO start order and failure accounting.

mod support;

use std::time::Duration;

use icongate_core::GatewayError;
use icongate_test_utils::{fixtures, StubSessionFactory};
use support::*;

/// Spawn one search per query, each only after the previous one has been
/// submitted, so submission order is the order of `queries`.
async fn spawn_in_order(
    state: &icongate_api::AppState,
    queries: &[&str],
) -> Vec<tokio::task::JoinHandle<Result<bool, String>>> {
    let mut handles = Vec::new();
    for (i, query) in queries.iter().enumerate() {
        let search = state.search.clone();
        let query = query.to_string();
        handles.push(tokio::spawn(async move {
            search
                .search_params(Some(&query), Some("10"))
                .await
                .map(|outcome| outcome.cached)
                .map_err(|e| e.to_string())
        }));

        // Misses are submitted once they are counted.
        while (state.search.stats().cache_misses as usize) < i + 1 {
            tokio::task::yield_now().await;
        }
    }
    handles
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_never_exceeds_limit() -> Result<(), String> {
    let factory = StubSessionFactory::new().with_latency(Duration::from_millis(200));
    let state = test_state(&factory);

    let queries = ["a", "b", "c", "d", "e", "f", "g"];
    let handles = spawn_in_order(&state, &queries).await;
    // Let the pump hand out the free slots.
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }

    let snapshot = state.queue.snapshot();
    assert_eq!(snapshot.in_flight, 2);
    assert_eq!(snapshot.pending, queries.len() - 2);

    for handle in handles {
        let cached = handle.await.map_err(|e| e.to_string())??;
        assert!(!cached);
    }

    assert_eq!(factory.peak_in_flight(), 2);
    assert_eq!(factory.fetch_calls(), queries.len());
    assert_eq!(state.queue.in_flight(), 0);
    assert_eq!(state.queue.pending(), 0);
    assert_eq!(state.search.stats().active_requests, 0);
    assert_eq!(state.search.cache_len(), queries.len());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_tasks_start_in_submission_order() -> Result<(), String> {
    let factory = StubSessionFactory::new().with_latency(Duration::from_millis(50));
    let mut config = test_config();
    config.max_concurrent = 1;
    let state = test_state_with(
        &factory,
        config,
        std::sync::Arc::new(icongate_test_utils::ScriptedSampler::new(1024)),
    );

    let queries = ["first", "second", "third", "fourth", "fifth"];
    let handles = spawn_in_order(&state, &queries).await;
    for handle in handles {
        handle.await.map_err(|e| e.to_string())??;
    }

    assert_eq!(factory.fetch_log(), queries.to_vec());
    assert_eq!(factory.peak_in_flight(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_active_requests_track_queued_misses() -> Result<(), String> {
    let factory = StubSessionFactory::new().with_latency(Duration::from_secs(1));
    let state = test_state(&factory);

    let handles = spawn_in_order(&state, &["a", "b", "c"]).await;
    assert_eq!(state.search.stats().active_requests, 3);

    for handle in handles {
        handle.await.map_err(|e| e.to_string())??;
    }
    assert_eq!(state.search.stats().active_requests, 0);
    Ok(())
}

#[tokio::test]
async fn test_failed_fetch_releases_slot() -> Result<(), String> {
    let factory = StubSessionFactory::new()
        .with_query_payload("broken", fixtures::error_payload("rate limited"));
    let state = test_state(&factory);

    let err = state
        .search
        .search_params(Some("broken"), None)
        .await
        .err()
        .ok_or("expected the reported error to fail the search")?;
    assert!(matches!(err, GatewayError::Upstream(_)));

    let stats = state.search.stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.active_requests, 0);
    assert_eq!(state.queue.in_flight(), 0);
    assert_eq!(state.search.cache_len(), 0);

    // Failures are not cached; other queries proceed.
    let outcome = state
        .search
        .search_params(Some("home"), None)
        .await
        .map_err(|e| e.to_string())?;
    assert!(!outcome.cached);
    assert!(state.search.search_params(Some("broken"), None).await.is_err());
    assert_eq!(state.search.stats().errors, 2);
    assert_eq!(factory.fetch_calls(), 3);
    Ok(())
}

#[tokio::test]
async fn test_panicking_task_is_reported_and_released() -> Result<(), String> {
    let factory = StubSessionFactory::new();
    let state = test_state(&factory);

    factory.panic_on_fetch(true);
    let err = state
        .search
        .search_params(Some("home"), None)
        .await
        .err()
        .ok_or("expected the panicking task to fail the search")?;
    assert!(matches!(err, GatewayError::TaskAborted { .. }));

    let stats = state.search.stats();
    assert_eq!(stats.errors, 1);
    assert_eq!(stats.active_requests, 0);
    assert_eq!(state.queue.in_flight(), 0);
    assert_eq!(state.queue.snapshot().aborted, 1);

    factory.panic_on_fetch(false);
    let outcome = state
        .search
        .search_params(Some("home"), None)
        .await
        .map_err(|e| e.to_string())?;
    assert!(!outcome.cached);
    Ok(())
}

#[tokio::test]
async fn test_closed_queue_rejects_new_misses() -> Result<(), String> {
    let factory = StubSessionFactory::new();
    let state = test_state(&factory);

    state
        .search
        .search_params(Some("home"), Some("10"))
        .await
        .map_err(|e| e.to_string())?;
    state.shutdown().await;

    // Hits are still answered from the cache.
    let outcome = state
        .search
        .search_params(Some("home"), Some("10"))
        .await
        .map_err(|e| e.to_string())?;
    assert!(outcome.cached);

    let err = state
        .search
        .search_params(Some("star"), Some("10"))
        .await
        .err()
        .ok_or("expected a closed queue to reject the miss")?;
    assert!(matches!(err, GatewayError::QueueClosed));
    assert_eq!(state.search.stats().errors, 1);
    assert_eq!(state.search.stats().active_requests, 0);
    Ok(())
}
