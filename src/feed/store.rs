//! Shared per-home measurement state

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::model::LiveData;

/// Live records per home, in arrival order.
///
/// Cloning shares the underlying state. With a capacity set, the oldest
/// records of a home are dropped once it is exceeded.
#[derive(Debug, Clone, Default)]
pub struct MeasurementStore {
    inner: Arc<RwLock<HashMap<String, Vec<LiveData>>>>,
    capacity: Option<usize>,
}

impl MeasurementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append a record; returns the number held for the home
    pub async fn append(&self, home_id: &str, record: LiveData) -> usize {
        let mut inner = self.inner.write().await;
        let records = inner.entry(home_id.to_string()).or_default();
        records.push(record);

        if let Some(capacity) = self.capacity {
            if records.len() > capacity {
                let excess = records.len() - capacity;
                records.drain(..excess);
            }
        }

        records.len()
    }

    pub async fn measurements(&self, home_id: &str) -> Vec<LiveData> {
        self.inner
            .read()
            .await
            .get(home_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn latest(&self, home_id: &str) -> Option<LiveData> {
        self.inner
            .read()
            .await
            .get(home_id)
            .and_then(|records| records.last().cloned())
    }

    pub async fn len(&self, home_id: &str) -> usize {
        self.inner.read().await.get(home_id).map_or(0, Vec::len)
    }

    pub async fn clear(&self, home_id: &str) {
        self.inner.write().await.remove(home_id);
    }

    pub async fn homes(&self) -> Vec<String> {
        let mut homes: Vec<String> = self.inner.read().await.keys().cloned().collect();
        homes.sort();
        homes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(second: u32, power: f64) -> LiveData {
        LiveData {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 2, 12, 0, second).unwrap(),
            power,
            power_production: 0.0,
            accumulated_consumption: 0.0,
            accumulated_production: 0.0,
        }
    }

    #[tokio::test]
    async fn test_arrival_order_per_home() {
        let store = MeasurementStore::new();
        // Out-of-order timestamps keep arrival order
        store.append("a", record(5, 1.0)).await;
        store.append("a", record(1, 2.0)).await;
        store.append("b", record(0, 9.0)).await;

        let powers: Vec<f64> = store.measurements("a").await.iter().map(|r| r.power).collect();
        assert_eq!(powers, vec![1.0, 2.0]);
        assert_eq!(store.latest("a").await.unwrap().power, 2.0);
        assert_eq!(store.len("b").await, 1);
        assert_eq!(store.homes().await, vec!["a", "b"]);
        assert!(store.measurements("c").await.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_drops_oldest() {
        let store = MeasurementStore::with_capacity(2);
        for i in 0..4 {
            store.append("a", record(i, i as f64)).await;
        }
        let powers: Vec<f64> = store.measurements("a").await.iter().map(|r| r.power).collect();
        assert_eq!(powers, vec![2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let store = MeasurementStore::new();
        let view = store.clone();
        store.append("a", record(0, 1.0)).await;
        assert_eq!(view.len("a").await, 1);

        view.clear("a").await;
        assert!(store.latest("a").await.is_none());
    }
}
