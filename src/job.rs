//! バッチジョブ制御
//!
//! - 単一実行ガード（同時に走るバッチは1つだけ）
//! - 巡回ペーシング（項目間の待機時間を固定列で繰り返す）
//! - 協調的キャンセル（項目ごとに停止要求を確認。ペーシング待機は即座に打ち切る）
//! - 進捗台帳の記録と、どの経路で終わっても必ず行う終了処理

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::error::{ItemError, JobError};
use crate::orchestrator::{AttemptSink, Orchestrator, TracingSink};
use crate::plate::Plate;
use crate::store::{ProgressLedger, VehicleStore};
use crate::types::JobId;

/// 項目間の待機時間の列（末尾まで行ったら先頭に戻る）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacingSchedule(Vec<Duration>);

impl Default for PacingSchedule {
    fn default() -> Self {
        Self::from_secs(&[30, 45, 65, 48])
    }
}

impl PacingSchedule {
    pub fn new(delays: Vec<Duration>) -> Self {
        Self(delays)
    }

    pub fn from_secs(secs: &[u64]) -> Self {
        Self(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// 待機なし
    pub fn none() -> Self {
        Self(Vec::new())
    }

    /// `index` 番目の待機時間
    pub fn delay(&self, index: usize) -> Duration {
        if self.0.is_empty() {
            Duration::ZERO
        } else {
            self.0[index % self.0.len()]
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// 単一実行ガード
#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Idle → Running。既に実行中なら None
    pub fn try_acquire(self: &Arc<Self>) -> Option<FlightPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit {
                flight: Arc::clone(self),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// 実行権。ドロップ時にのみ実行中フラグを解除する
#[derive(Debug)]
pub struct FlightPermit {
    flight: Arc<SingleFlight>,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.flight.running.store(false, Ordering::Release);
    }
}

/// 停止要求ハンドル
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    requested: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl StopHandle {
    /// 冪等。ループが気付くのを待たずに戻る
    pub fn request_stop(&self) {
        self.requested.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_stop_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }

    /// 停止要求が出るまで待つ（既に出ていれば即座に戻る）
    pub async fn stopped(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_stop_requested() {
            return;
        }
        notified.await;
    }

    fn reset(&self) {
        self.requested.store(false, Ordering::Release);
    }
}

/// 1件の処理結果
enum ItemOutcome {
    Stored,
    NoData,
}

#[derive(Debug, Default)]
struct Tally {
    stored: usize,
    no_data: usize,
    failed: usize,
    cancelled: bool,
}

/// バックグラウンドで動く部分
#[derive(Clone)]
struct Worker {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn VehicleStore>,
    ledger: Arc<dyn ProgressLedger>,
    sink: Arc<dyn AttemptSink>,
    pacing: PacingSchedule,
    stop: StopHandle,
}

impl Worker {
    async fn run(self, job: JobId, identifiers: Vec<String>, permit: FlightPermit) {
        // 終了処理の後にドロップされる（実行中フラグの唯一の解除箇所）
        let _permit = permit;
        let mut tally = Tally::default();

        let result = AssertUnwindSafe(self.process_all(job, &identifiers, &mut tally))
            .catch_unwind()
            .await;
        if result.is_err() {
            error!(job = %job, "Batch loop panicked; finalizing");
        }

        if let Err(e) = self.ledger.finalize(job).await {
            error!(job = %job, "Failed to finalize job: {}", e);
        }

        info!(
            job = %job,
            total = identifiers.len(),
            stored = tally.stored,
            no_data = tally.no_data,
            failed = tally.failed,
            cancelled = tally.cancelled,
            "Batch finished"
        );
    }

    async fn process_all(&self, job: JobId, identifiers: &[String], tally: &mut Tally) {
        let total = identifiers.len();

        for (index, raw) in identifiers.iter().enumerate() {
            if self.stop.is_stop_requested() {
                info!(job = %job, "Stop requested; {} of {} processed", index, total);
                tally.cancelled = true;
                break;
            }

            info!(job = %job, "Processing {}/{}: {}", index + 1, total, raw);

            match AssertUnwindSafe(self.process_item(raw)).catch_unwind().await {
                Ok(Ok(ItemOutcome::Stored)) => tally.stored += 1,
                Ok(Ok(ItemOutcome::NoData)) => {
                    info!(job = %job, "No data for {}", raw);
                    tally.no_data += 1;
                }
                Ok(Err(e)) => {
                    warn!(job = %job, "Item {} failed: {}", raw, e);
                    tally.failed += 1;
                }
                Err(_) => {
                    error!(job = %job, "Item {} panicked", raw);
                    tally.failed += 1;
                }
            }

            // 結果に関わらず「処理済み」として数える
            if let Err(e) = self.ledger.increment_processed(job).await {
                warn!(job = %job, "Failed to record progress: {}", e);
            }

            if index + 1 < total {
                let delay = self.pacing.delay(index);
                if !delay.is_zero() {
                    debug!(job = %job, "Waiting {:?} before next plate", delay);
                    // 停止要求が来たら待機を打ち切る（次のループ先頭で抜ける）
                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = self.stop.stopped() => {}
                    }
                }
            }
        }
    }

    async fn process_item(&self, raw: &str) -> Result<ItemOutcome, ItemError> {
        let plate = Plate::parse(raw)?;
        match self.orchestrator.resolve(&plate, self.sink.as_ref()).await {
            // フィールドなしの抽出は保存しない
            Some(extraction) if extraction.fields.is_empty() => {
                debug!(
                    "{} returned no fields for {} ({:?})",
                    extraction.strategy, plate, extraction.confidence
                );
                Ok(ItemOutcome::NoData)
            }
            Some(extraction) => {
                let record = self.store.upsert(&plate, &extraction.fields).await?;
                info!(
                    "Saved {} ({:?}, {} fields via {})",
                    plate,
                    record.status,
                    extraction.fields.len(),
                    extraction.strategy
                );
                Ok(ItemOutcome::Stored)
            }
            None => Ok(ItemOutcome::NoData),
        }
    }
}

/// バッチジョブコントローラ
pub struct JobController {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn VehicleStore>,
    ledger: Arc<dyn ProgressLedger>,
    sink: Arc<dyn AttemptSink>,
    pacing: PacingSchedule,
    flight: Arc<SingleFlight>,
    stop: StopHandle,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl JobController {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn VehicleStore>,
        ledger: Arc<dyn ProgressLedger>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            ledger,
            sink: Arc::new(TracingSink),
            pacing: PacingSchedule::default(),
            flight: SingleFlight::new(),
            stop: StopHandle::default(),
            worker: Mutex::new(None),
        }
    }

    pub fn with_pacing(mut self, pacing: PacingSchedule) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn AttemptSink>) -> Self {
        self.sink = sink;
        self
    }

    /// バッチを投入してすぐに戻る
    pub async fn submit<I, S>(&self, identifiers: I) -> Result<JobId, JobError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.flight.is_running() {
            return Err(JobError::AlreadyRunning);
        }
        let identifiers: Vec<String> = identifiers.into_iter().map(Into::into).collect();
        if identifiers.is_empty() {
            return Err(JobError::EmptyBatch);
        }

        let permit = self.flight.try_acquire().ok_or(JobError::AlreadyRunning)?;
        self.stop.reset();

        // 失敗時は permit がドロップされて Idle に戻る
        let job = self.ledger.create_job(identifiers.len()).await?;
        info!(job = %job, "Starting batch of {} plates", identifiers.len());

        let worker = Worker {
            orchestrator: Arc::clone(&self.orchestrator),
            store: Arc::clone(&self.store),
            ledger: Arc::clone(&self.ledger),
            sink: Arc::clone(&self.sink),
            pacing: self.pacing.clone(),
            stop: self.stop.clone(),
        };
        let handle = tokio::spawn(worker.run(job, identifiers, permit));
        *self.worker.lock().await = Some(handle);

        Ok(job)
    }

    pub fn request_stop(&self) {
        info!("Stop requested");
        self.stop.request_stop();
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_running(&self) -> bool {
        self.flight.is_running()
    }

    /// 実行中のワーカーの終了を待つ
    pub async fn join(&self) {
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Batch worker terminated abnormally: {}", e);
            }
        }
    }

    /// 停止要求を出して終了を待つ
    pub async fn shutdown(&self) {
        self.request_stop();
        self.join().await;
    }
}
