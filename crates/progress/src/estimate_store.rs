//! Learned duration estimates, one per key.
//!
//! Each successful run blends its observed duration into the stored value
//! with a fixed-weight exponential moving average. Storage faults never
//! surface: reads fall back to the caller's default, writes become no-ops.

use std::sync::Arc;

use etabar_core::{
    blend, ConfigError, EstimateBounds, EstimateKey, ProgressConfig, SMOOTHING_WEIGHT,
};
use etabar_storage::Storage;
use tracing::{debug, info, warn};

/// Keyed estimate store over a [`Storage`] backend.
#[derive(Clone)]
pub struct EstimateStore {
    storage: Arc<dyn Storage>,
    bounds: EstimateBounds,
    weight: f64,
}

impl EstimateStore {
    /// Create a store with the default bounds and weight.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            bounds: EstimateBounds::default(),
            weight: SMOOTHING_WEIGHT,
        }
    }

    /// Apply bounds and weight from a configuration.
    pub fn with_config(mut self, config: &ProgressConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.bounds = config.bounds();
        self.weight = config.smoothing_weight;
        Ok(self)
    }

    /// Bounds every value is clamped into.
    pub fn bounds(&self) -> EstimateBounds {
        self.bounds
    }

    /// Current estimate for `key`, or `default_ms` when nothing usable is stored.
    ///
    /// The result is always clamped.
    pub async fn read(&self, key: &EstimateKey, default_ms: u64) -> u64 {
        self.peek(key)
            .await
            .unwrap_or_else(|| self.bounds.clamp(default_ms))
    }

    /// Stored estimate for `key` without falling back to a default.
    pub async fn peek(&self, key: &EstimateKey) -> Option<u64> {
        match self.load(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Estimate for {} unavailable: {}", key, e);
                None
            }
        }
    }

    /// Storage faults are errors; missing or invalid values are `Ok(None)`.
    async fn load(&self, key: &EstimateKey) -> etabar_storage::Result<Option<u64>> {
        let Some(raw) = self.storage.get(key.as_str()).await? else {
            return Ok(None);
        };

        let parsed = self.bounds.parse(&raw);
        if parsed.is_none() {
            warn!("Ignoring invalid persisted estimate {:?} for {}", raw, key);
        }
        Ok(parsed)
    }

    /// Blend an observed duration into the estimate for `key` and persist it.
    ///
    /// With nothing stored yet the observation itself is the previous value.
    /// Returns the new estimate, or `None` when storage could not be read or
    /// written, in which case nothing is learned.
    pub async fn update(&self, key: &EstimateKey, observed_ms: u64) -> Option<u64> {
        self.update_from(key, observed_ms, observed_ms).await
    }

    /// Like [`update`](Self::update), but blends against `fallback_ms` when
    /// nothing usable is stored. A run passes the estimate it counted down
    /// from, so the very first observation is blended with the default.
    pub async fn update_from(
        &self,
        key: &EstimateKey,
        observed_ms: u64,
        fallback_ms: u64,
    ) -> Option<u64> {
        let previous = match self.load(key).await {
            Ok(stored) => stored.unwrap_or_else(|| self.bounds.clamp(fallback_ms)),
            Err(e) => {
                warn!("Skipping estimate update for {}: {}", key, e);
                return None;
            }
        };
        let next = self
            .bounds
            .clamp_f64(blend(previous, observed_ms, self.weight))
            .unwrap_or(previous);

        match self.storage.set(key.as_str(), &next.to_string()).await {
            Ok(()) => {
                info!(
                    "Estimate for {}: {}ms -> {}ms (observed {}ms)",
                    key, previous, next, observed_ms
                );
                Some(next)
            }
            Err(e) => {
                warn!("Could not persist estimate for {}: {}", key, e);
                None
            }
        }
    }

    /// Forget the estimate for `key`.
    pub async fn clear(&self, key: &EstimateKey) {
        match self.storage.remove(key.as_str()).await {
            Ok(()) => debug!("Cleared estimate for {}", key),
            Err(e) => warn!("Could not clear estimate for {}: {}", key, e),
        }
    }

    /// Every stored estimate that parses, sorted by key.
    pub async fn entries(&self) -> Vec<(EstimateKey, u64)> {
        let keys = match self.storage.keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("Could not list estimates: {}", e);
                return Vec::new();
            }
        };

        let mut entries = Vec::with_capacity(keys.len());
        for key in keys.into_iter().map(EstimateKey::from) {
            if let Some(ms) = self.peek(&key).await {
                entries.push((key, ms));
            }
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use etabar_core::{MAX_ESTIMATE_MS, MIN_ESTIMATE_MS};
    use etabar_storage::{MemoryStorage, StorageError};

    struct UnavailableStorage;

    #[async_trait::async_trait]
    impl Storage for UnavailableStorage {
        async fn get(&self, _key: &str) -> etabar_storage::Result<Option<String>> {
            Err(StorageError::Unavailable("disk gone".to_string()))
        }
        async fn set(&self, _key: &str, _value: &str) -> etabar_storage::Result<()> {
            Err(StorageError::Unavailable("disk gone".to_string()))
        }
        async fn remove(&self, _key: &str) -> etabar_storage::Result<()> {
            Err(StorageError::Unavailable("disk gone".to_string()))
        }
        async fn keys(&self) -> etabar_storage::Result<Vec<String>> {
            Err(StorageError::Unavailable("disk gone".to_string()))
        }
    }

    fn store_with(entries: &[(&str, &str)]) -> (Arc<MemoryStorage>, EstimateStore) {
        let storage = Arc::new(MemoryStorage::with_entries(entries.iter().copied()));
        (storage.clone(), EstimateStore::new(storage))
    }

    #[tokio::test]
    async fn test_read_falls_back_to_clamped_default() {
        let (_, store) = store_with(&[]);
        let key = EstimateKey::from("eta-zip");

        assert_eq!(store.read(&key, 60_000).await, 60_000);
        assert_eq!(store.read(&key, 1_000).await, MIN_ESTIMATE_MS);
        assert_eq!(store.read(&key, 5_000_000).await, MAX_ESTIMATE_MS);
    }

    #[tokio::test]
    async fn test_read_clamps_persisted_value() {
        let (_, store) = store_with(&[("low", "10"), ("high", "99999999"), ("ok", "42000")]);

        assert_eq!(store.read(&"low".into(), 60_000).await, MIN_ESTIMATE_MS);
        assert_eq!(store.read(&"high".into(), 60_000).await, MAX_ESTIMATE_MS);
        assert_eq!(store.read(&"ok".into(), 60_000).await, 42_000);
    }

    #[tokio::test]
    async fn test_non_numeric_value_uses_default() {
        let (_, store) = store_with(&[("eta-zip", "abc")]);
        assert_eq!(store.read(&"eta-zip".into(), 60_000).await, 60_000);
        assert_eq!(store.peek(&"eta-zip".into()).await, None);
    }

    #[tokio::test]
    async fn test_update_blends_with_previous() {
        let (storage, store) = store_with(&[("eta-zip", "10000")]);
        let key = EstimateKey::from("eta-zip");

        assert_eq!(store.update(&key, 20_000).await, Some(14_000));
        assert_eq!(storage.get("eta-zip").await.unwrap().as_deref(), Some("14000"));
    }

    #[tokio::test]
    async fn test_first_update_uses_observation() {
        let (storage, store) = store_with(&[]);
        let key = EstimateKey::from("eta-zip");

        assert_eq!(store.update(&key, 30_000).await, Some(30_000));
        assert_eq!(store.update(&key, 1_000).await, Some(18_400));
        assert_eq!(storage.get("eta-zip").await.unwrap().as_deref(), Some("18400"));
    }

    #[tokio::test]
    async fn test_update_from_blends_with_fallback() {
        let (_, store) = store_with(&[]);
        let key = EstimateKey::from("eta-generate-zip");

        assert_eq!(store.update_from(&key, 80_000, 120_000).await, Some(104_000));
        // Stored value wins over the fallback once present
        assert_eq!(store.update_from(&key, 104_000, 999_999).await, Some(104_000));
    }

    #[tokio::test]
    async fn test_update_clamps_result() {
        let (_, store) = store_with(&[("eta-zip", "900000")]);
        let key = EstimateKey::from("eta-zip");

        assert_eq!(store.update(&key, 5_000_000).await, Some(MAX_ESTIMATE_MS));
    }

    #[tokio::test]
    async fn test_clear_restores_default() {
        let (_, store) = store_with(&[("eta-zip", "42000")]);
        let key = EstimateKey::from("eta-zip");

        store.clear(&key).await;
        assert_eq!(store.read(&key, 60_000).await, 60_000);
    }

    #[tokio::test]
    async fn test_custom_weight() {
        let storage = Arc::new(MemoryStorage::with_entries([("k", "10000")]));
        let config = ProgressConfig::new().with_smoothing_weight(1.0);
        let store = EstimateStore::new(storage).with_config(&config).unwrap();

        assert_eq!(store.update(&"k".into(), 20_000).await, Some(20_000));
    }

    #[test]
    fn test_with_config_rejects_inverted_bounds() {
        let storage = Arc::new(MemoryStorage::new());
        let config = ProgressConfig::new().with_bounds(10_000, 5_000);

        assert!(matches!(
            EstimateStore::new(storage).with_config(&config),
            Err(ConfigError::InvertedBounds { min_ms: 10_000, max_ms: 5_000 })
        ));
    }

    #[tokio::test]
    async fn test_unavailable_storage_degrades() {
        let store = EstimateStore::new(Arc::new(UnavailableStorage));
        let key = EstimateKey::from("eta-zip");

        assert_eq!(store.read(&key, 60_000).await, 60_000);
        assert_eq!(store.update(&key, 20_000).await, None);
        store.clear(&key).await;
        assert!(store.entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_entries_skip_invalid_values() {
        let (_, store) = store_with(&[("a", "7000"), ("b", "abc"), ("c", "8000")]);
        let entries = store.entries().await;

        assert_eq!(
            entries,
            vec![(EstimateKey::from("a"), 7_000), (EstimateKey::from("c"), 8_000)]
        );
    }
}
