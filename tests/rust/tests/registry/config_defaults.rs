//! Configuration resolution at construction time

use std::time::Duration;

use hostpool_core::{
    PoolConfig, DEFAULT_ALIVE_DURATION, DEFAULT_IDLE_TIMEOUT, DEFAULT_INITIAL_CAPACITY,
    DEFAULT_MAX_CAPACITY,
};
use pretty_assertions::assert_eq;
use tests::mocks::mock_binding;
use tests::{test_key, PoolRegistry, RecordingBuilder};

#[tokio::test]
async fn test_unset_values_use_defaults() {
    let builder = RecordingBuilder::new();
    let registry = PoolRegistry::with_builder(PoolConfig::new(), builder.clone());
    registry.set_binding(test_key(), mock_binding());

    registry.get(&test_key()).await.unwrap();

    let settings = builder.last_settings().unwrap();
    assert_eq!(settings.initial_capacity, DEFAULT_INITIAL_CAPACITY);
    assert_eq!(settings.max_capacity, DEFAULT_MAX_CAPACITY);
    assert_eq!(settings.idle_timeout, DEFAULT_IDLE_TIMEOUT);
    assert_eq!(settings.acquire_timeout, None);

    let info = registry.entry_info(&test_key()).unwrap();
    assert_eq!(info.alive_duration, DEFAULT_ALIVE_DURATION);
    assert_eq!(DEFAULT_ALIVE_DURATION, Duration::from_secs(300));
    assert_eq!(DEFAULT_IDLE_TIMEOUT, Duration::from_secs(15));
    assert_eq!((DEFAULT_INITIAL_CAPACITY, DEFAULT_MAX_CAPACITY), (0, 30));
}

#[tokio::test]
async fn test_zero_values_fall_back_to_defaults() {
    let builder = RecordingBuilder::new();
    let registry = PoolRegistry::with_builder(
        PoolConfig::new()
            .with_max_capacity(0)
            .with_idle_timeout(Duration::ZERO)
            .with_alive_duration(Duration::ZERO),
        builder.clone(),
    );
    registry.set_binding(test_key(), mock_binding());

    registry.get(&test_key()).await.unwrap();

    let settings = builder.last_settings().unwrap();
    assert_eq!(settings.max_capacity, DEFAULT_MAX_CAPACITY);
    assert_eq!(settings.idle_timeout, DEFAULT_IDLE_TIMEOUT);
    assert_eq!(
        registry.entry_info(&test_key()).unwrap().alive_duration,
        DEFAULT_ALIVE_DURATION
    );
}

#[tokio::test]
async fn test_setters_apply_to_later_constructions() {
    let builder = RecordingBuilder::new();
    let registry = PoolRegistry::with_builder(PoolConfig::new(), builder.clone());
    let other = tests::key_for("localhost:9001");
    registry.set_binding(test_key(), mock_binding());
    registry.set_binding(other.clone(), mock_binding());

    registry.get(&test_key()).await.unwrap();

    registry.set_initial_capacity(2);
    registry.set_max_capacity(8);
    registry.set_idle_timeout(Duration::from_secs(3));
    registry.set_alive_duration(Duration::from_secs(90));
    registry.set_acquire_timeout(Duration::from_millis(250));
    registry.get(&other).await.unwrap();

    let builds = builder.builds();
    assert_eq!(builds[0].settings.max_capacity, DEFAULT_MAX_CAPACITY);

    let later = &builds[1].settings;
    assert_eq!(builds[1].key, other);
    assert_eq!(later.initial_capacity, 2);
    assert_eq!(later.max_capacity, 8);
    assert_eq!(later.idle_timeout, Duration::from_secs(3));
    assert_eq!(later.acquire_timeout, Some(Duration::from_millis(250)));

    assert_eq!(
        registry.entry_info(&test_key()).unwrap().alive_duration,
        DEFAULT_ALIVE_DURATION
    );
    assert_eq!(
        registry.entry_info(&other).unwrap().alive_duration,
        Duration::from_secs(90)
    );
}

#[tokio::test]
async fn test_config_loaded_from_lookup() {
    let config = PoolConfig::from_lookup(|name| match name {
        "HOSTPOOL_MAX_CAPACITY" => Some("4".to_string()),
        "HOSTPOOL_ALIVE_DURATION_MS" => Some("1500".to_string()),
        _ => None,
    });
    let builder = RecordingBuilder::new();
    let registry = PoolRegistry::with_builder(config, builder.clone());
    registry.set_binding(test_key(), mock_binding());

    registry.get(&test_key()).await.unwrap();

    assert_eq!(builder.last_settings().unwrap().max_capacity, 4);
    assert_eq!(
        registry.entry_info(&test_key()).unwrap().alive_duration,
        Duration::from_millis(1500)
    );
}
