//! 永続化コラボレータのインターフェースとインメモリ実装
//!
//! 本番のストレージエンジンはこのクレートの外側にある。
//! [`MemoryStore`] はテストとデモ用の参照実装。

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::fields::VehicleFields;
use crate::plate::Plate;
use crate::types::{BatchJob, JobId, JobState, VehicleRecord};

/// 車両レコードの永続化（プレート単位のupsert）
#[async_trait]
pub trait VehicleStore: Send + Sync {
    async fn find_by_plate(&self, plate: &Plate) -> Result<Option<VehicleRecord>, StoreError>;

    /// 既存レコードがあればマージ、無ければ新規作成
    async fn upsert(&self, plate: &Plate, fields: &VehicleFields) -> Result<VehicleRecord, StoreError>;
}

/// バッチジョブの進捗記録
#[async_trait]
pub trait ProgressLedger: Send + Sync {
    async fn create_job(&self, total_items: usize) -> Result<JobId, StoreError>;

    async fn increment_processed(&self, job: JobId) -> Result<(), StoreError>;

    /// 終了時刻を記録して completed にする
    async fn finalize(&self, job: JobId) -> Result<(), StoreError>;
}

/// インメモリストア
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Plate, VehicleRecord>>,
    jobs: RwLock<BTreeMap<JobId, BatchJob>>,
    next_job_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn job(&self, id: JobId) -> Option<BatchJob> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn jobs(&self) -> Vec<BatchJob> {
        self.jobs.read().await.values().cloned().collect()
    }

    /// プレート順に全レコードを返す
    pub async fn records(&self) -> Vec<VehicleRecord> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by(|a, b| a.plate.cmp(&b.plate));
        records
    }
}

#[async_trait]
impl VehicleStore for MemoryStore {
    async fn find_by_plate(&self, plate: &Plate) -> Result<Option<VehicleRecord>, StoreError> {
        Ok(self.records.read().await.get(plate).cloned())
    }

    async fn upsert(&self, plate: &Plate, fields: &VehicleFields) -> Result<VehicleRecord, StoreError> {
        let now = Utc::now();
        let mut records = self.records.write().await;
        let record = records
            .entry(plate.clone())
            .and_modify(|r| r.merge(fields, now))
            .or_insert_with(|| VehicleRecord::new(plate.clone(), fields.clone(), now));
        Ok(record.clone())
    }
}

#[async_trait]
impl ProgressLedger for MemoryStore {
    async fn create_job(&self, total_items: usize) -> Result<JobId, StoreError> {
        let id = JobId(self.next_job_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.jobs.write().await.insert(id, BatchJob::new(id, total_items));
        Ok(id)
    }

    async fn increment_processed(&self, job: JobId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job).ok_or(StoreError::JobNotFound(job))?;
        entry.processed_items = (entry.processed_items + 1).min(entry.total_items);
        Ok(())
    }

    async fn finalize(&self, job: JobId) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        let entry = jobs.get_mut(&job).ok_or(StoreError::JobNotFound(job))?;
        entry.finished_at = Some(Utc::now());
        entry.state = JobState::Completed;
        Ok(())
    }
}
