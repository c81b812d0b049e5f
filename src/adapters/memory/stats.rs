//! In-memory daily stats

use crate::adapters::database::traits::{DailyStats, StatsStore};
use crate::domain::ids::ClientId;
use crate::domain::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct InMemoryStatsStore {
    days: Mutex<HashMap<(ClientId, NaiveDate), DailyStats>>,
}

impl InMemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update(&self, client_id: &ClientId, date: NaiveDate, f: impl FnOnce(&mut DailyStats)) {
        let mut days = self.days.lock().await;
        let entry = days
            .entry((client_id.clone(), date))
            .or_insert_with(|| DailyStats::empty(client_id.clone(), date));
        f(entry);
    }
}

#[async_trait]
impl StatsStore for InMemoryStatsStore {
    async fn record_received(&self, client_id: &ClientId, date: NaiveDate) -> Result<()> {
        self.update(client_id, date, |s| s.received += 1).await;
        Ok(())
    }

    async fn record_processed(
        &self,
        client_id: &ClientId,
        date: NaiveDate,
        is_valid: bool,
        latency_ms: u64,
    ) -> Result<()> {
        self.update(client_id, date, |s| s.record_processed(is_valid, latency_ms))
            .await;
        Ok(())
    }

    async fn record_dead(&self, client_id: &ClientId, date: NaiveDate) -> Result<()> {
        self.update(client_id, date, |s| s.failed += 1).await;
        Ok(())
    }

    async fn daily(&self, client_id: &ClientId, date: NaiveDate) -> Result<Option<DailyStats>> {
        Ok(self
            .days
            .lock()
            .await
            .get(&(client_id.clone(), date))
            .cloned())
    }
}
