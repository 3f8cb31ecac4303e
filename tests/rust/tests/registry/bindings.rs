//! Binding registration and construction failures

use hostpool_core::PoolError;
use pretty_assertions::assert_eq;
use tests::mocks::{mock_binding, CountingBinding};
use tests::{test_key, PoolRegistry, RecordingBuilder};

#[tokio::test]
async fn test_binding_required_before_first_use() {
    let registry = PoolRegistry::<usize>::new();

    let err = registry.get(&test_key()).await.unwrap_err();
    assert!(err.is_binding_missing());
    assert!(registry.is_empty());

    let binding = CountingBinding::new();
    registry.set_func(test_key(), binding.factory(), binding.closer());

    assert_eq!(registry.get(&test_key()).await.unwrap(), 1);
    assert!(registry.contains(&test_key()));
}

#[tokio::test]
async fn test_half_binding_reports_missing_closer() {
    let registry = PoolRegistry::<usize>::new();
    registry.set_factory(test_key(), CountingBinding::new().factory());

    let err = registry.get(&test_key()).await.unwrap_err();
    assert!(matches!(err, PoolError::CloserMissing(_)));
    assert!(err.is_binding_missing());

    registry.set_closer(test_key(), CountingBinding::new().closer());
    assert!(registry.get(&test_key()).await.is_ok());
}

#[tokio::test]
async fn test_rebinding_does_not_touch_live_entry() {
    let registry = PoolRegistry::<usize>::new();
    let initial = CountingBinding::new();
    let replacement = CountingBinding::new();
    registry.set_binding(test_key(), initial.binding());

    let _first = registry.get(&test_key()).await.unwrap();
    registry.set_func(test_key(), replacement.factory(), replacement.closer());
    let _second = registry.get(&test_key()).await.unwrap();

    assert_eq!(initial.dialed(), 2);
    assert_eq!(replacement.dialed(), 0);
}

#[tokio::test]
async fn test_removed_binding_keeps_live_entry() {
    let registry = PoolRegistry::<usize>::new();
    let binding = CountingBinding::new();
    registry.set_binding(test_key(), binding.binding());

    let conn = registry.get(&test_key()).await.unwrap();
    assert!(registry.remove_binding(&test_key()));
    assert!(!registry.has_binding(&test_key()));

    registry.put(&test_key(), conn).await.unwrap();
    assert_eq!(registry.get(&test_key()).await.unwrap(), conn);
}

#[tokio::test]
async fn test_construction_failure_publishes_nothing() {
    let builder = RecordingBuilder::new();
    let registry = PoolRegistry::with_builder(Default::default(), builder.clone());
    registry.set_binding(test_key(), mock_binding());

    builder.fail_next();
    let err = registry.get(&test_key()).await.unwrap_err();

    match &err {
        PoolError::ConstructionFailed { key, source } => {
            assert_eq!(key, &test_key());
            assert!(matches!(**source, PoolError::ConnectionDialFailed(_)));
        }
        other => panic!("expected ConstructionFailed, got {other:?}"),
    }
    assert!(registry.is_empty());
    assert_eq!(registry.stats().construction_failures, 1);

    // The next caller retries construction from scratch
    let conn = registry.get(&test_key()).await.unwrap();
    assert_eq!(conn.pool_id, 0);
    assert_eq!(registry.stats().pools_created, 1);
}
