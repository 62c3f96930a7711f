//! Shared per-case community aggregates.
//!
//! Each aggregate is replaced whole under the write lock, so a reader sees
//! either the snapshot before a sample or the one after it, never a count
//! that disagrees with the average.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use gil_core::model::CommunityStatistic;
use gil_core::traits::CommunityStore;

#[derive(Default)]
pub struct InMemoryCommunityStore {
    stats: RwLock<HashMap<String, CommunityStatistic>>,
}

impl InMemoryCommunityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every aggregate, ordered by case id.
    pub async fn snapshot(&self) -> Vec<CommunityStatistic> {
        let mut all: Vec<CommunityStatistic> = self.stats.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.case_id.cmp(&b.case_id));
        all
    }
}

#[async_trait]
impl CommunityStore for InMemoryCommunityStore {
    async fn get_stats(&self, case_id: &str) -> anyhow::Result<CommunityStatistic> {
        Ok(self
            .stats
            .read()
            .await
            .get(case_id)
            .cloned()
            .unwrap_or_else(|| CommunityStatistic::empty(case_id)))
    }

    async fn record_sample(
        &self,
        case_id: &str,
        own_assessment: f64,
        peer_prediction: f64,
    ) -> anyhow::Result<CommunityStatistic> {
        let mut stats = self.stats.write().await;
        let current = stats
            .get(case_id)
            .cloned()
            .unwrap_or_else(|| CommunityStatistic::empty(case_id));
        let next = current.with_sample(own_assessment, peer_prediction);
        stats.insert(case_id.to_string(), next.clone());

        tracing::debug!(
            case = case_id,
            samples = next.sample_count,
            average = next.community_average,
            "community sample recorded"
        );
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::join_all;

    use super::*;

    #[tokio::test]
    async fn unknown_case_is_empty() {
        let store = InMemoryCommunityStore::new();
        let stat = store.get_stats("c1").await.unwrap();
        assert_eq!(stat.sample_count, 0);
        assert_eq!(stat.case_id, "c1");
    }

    #[tokio::test]
    async fn samples_accumulate() {
        let store = InMemoryCommunityStore::new();
        store.record_sample("c1", 80.0, 50.0).await.unwrap();
        let stat = store.record_sample("c1", 60.0, 70.0).await.unwrap();
        assert_eq!(stat.sample_count, 2);
        assert!((stat.community_average - 70.0).abs() < 1e-9);
        assert_eq!(store.get_stats("c1").await.unwrap(), stat);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_keep_count_and_mean_consistent() {
        let store = Arc::new(InMemoryCommunityStore::new());

        let writers = (0..200).map(|i| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let own = if i % 2 == 0 { 100.0 } else { 0.0 };
                store.record_sample("shared", own, 50.0).await.unwrap();
            })
        });
        let readers = (0..200).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                let s = store.get_stats("shared").await.unwrap();
                // Versions and counts move together with the mean.
                assert_eq!(s.version, s.sample_count as u64);
                assert!((0.0..=100.0).contains(&s.community_average));
            })
        });

        for result in join_all(writers.chain(readers).collect::<Vec<_>>()).await {
            result.unwrap();
        }

        let s = store.get_stats("shared").await.unwrap();
        assert_eq!(s.sample_count, 200);
        assert_eq!(s.version, 200);
        assert!((s.community_average - 50.0).abs() < 1e-9);
        assert!((s.mean_peer_prediction - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn snapshot_is_ordered_by_case() {
        let store = InMemoryCommunityStore::new();
        store.record_sample("b", 64.0, 50.0).await.unwrap();
        store.record_sample("a", 10.0, 20.0).await.unwrap();

        let all = store.snapshot().await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].case_id, "a");
        assert_eq!(all[1], store.get_stats("b").await.unwrap());
    }
}
