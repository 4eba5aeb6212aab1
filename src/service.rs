use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use tower::Service;
use tracing::info;

use crate::config::ScraperConfig;
use crate::error::{JobError, LookupError, ScraperError};
use crate::job::JobController;
use crate::orchestrator::{AttemptSink, Orchestrator, OrchestratorStatus, TracingSink};
use crate::plate::Plate;
use crate::store::{ProgressLedger, VehicleStore};
use crate::types::{JobId, VehicleRecord};

/// 単体照会リクエスト
#[derive(Debug, Clone)]
pub struct LookupRequest {
    pub plate: String,
    /// true なら保存済みレコードがあっても再取得する
    pub refresh: bool,
}

impl LookupRequest {
    pub fn new(plate: impl Into<String>) -> Self {
        Self {
            plate: plate.into(),
            refresh: false,
        }
    }

    pub fn with_refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }
}

/// 単体照会とバッチ投入の入口
///
/// tower::Service<LookupRequest> も実装している。
#[derive(Clone)]
pub struct PlateService {
    orchestrator: Arc<Orchestrator>,
    store: Arc<dyn VehicleStore>,
    jobs: Arc<JobController>,
    sink: Arc<dyn AttemptSink>,
}

impl PlateService {
    pub fn new<S>(orchestrator: Orchestrator, store: Arc<S>) -> Self
    where
        S: VehicleStore + ProgressLedger + 'static,
    {
        let orchestrator = Arc::new(orchestrator);
        let jobs = JobController::new(Arc::clone(&orchestrator), store.clone(), store.clone());
        Self::from_parts(orchestrator, store, jobs)
    }

    /// バッチ側のペーシングやシンクを差し替えたい場合
    pub fn from_parts(
        orchestrator: Arc<Orchestrator>,
        store: Arc<dyn VehicleStore>,
        jobs: JobController,
    ) -> Self {
        Self {
            orchestrator,
            store,
            jobs: Arc::new(jobs),
            sink: Arc::new(TracingSink),
        }
    }

    /// 設定からアダプタを初期化してサービスを作成
    pub async fn launch<S>(config: &ScraperConfig, store: Arc<S>) -> Result<Self, ScraperError>
    where
        S: VehicleStore + ProgressLedger + 'static,
    {
        let orchestrator = Arc::new(Orchestrator::launch(config).await?);
        let jobs = JobController::new(Arc::clone(&orchestrator), store.clone(), store.clone())
            .with_pacing(config.pacing.clone());
        Ok(Self::from_parts(orchestrator, store, jobs))
    }

    pub fn with_sink(mut self, sink: Arc<dyn AttemptSink>) -> Self {
        self.sink = sink;
        self
    }

    pub async fn submit_batch<I, T>(&self, plates: I) -> Result<JobId, JobError>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.jobs.submit(plates).await
    }

    pub fn request_stop(&self) {
        self.jobs.request_stop();
    }

    pub fn is_running(&self) -> bool {
        self.jobs.is_running()
    }

    pub fn jobs(&self) -> &JobController {
        &self.jobs
    }

    pub fn status(&self) -> OrchestratorStatus {
        self.orchestrator.status()
    }

    pub async fn lookup_single(&self, plate: &str) -> Result<VehicleRecord, LookupError> {
        self.lookup(LookupRequest::new(plate)).await
    }

    /// 保存済みならそれを返し、無ければ抽出して保存する
    pub async fn lookup(&self, request: LookupRequest) -> Result<VehicleRecord, LookupError> {
        let plate = Plate::parse(&request.plate)?;

        let cached = self.store.find_by_plate(&plate).await?;
        if !request.refresh {
            if let Some(record) = cached {
                info!("Returning stored record for {}", plate);
                return Ok(record);
            }
        }

        match self.orchestrator.resolve(&plate, self.sink.as_ref()).await {
            Some(extraction) if !extraction.fields.is_empty() => {
                let record = self.store.upsert(&plate, &extraction.fields).await?;
                info!(
                    "Stored {} via {} ({:?})",
                    plate, extraction.strategy, record.status
                );
                Ok(record)
            }
            // フィールドなしの抽出は保存しない。再取得に失敗しても保存済みのものは返す
            _ => cached.ok_or(LookupError::NotFound(plate)),
        }
    }

    /// 実行中のバッチを止めてからアダプタを閉じる
    pub async fn close(&self) {
        self.jobs.shutdown().await;
        self.orchestrator.close().await;
    }
}

impl Service<LookupRequest> for PlateService {
    type Response = VehicleRecord;
    type Error = LookupError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: LookupRequest) -> Self::Future {
        info!("Lookup request: plate={}, refresh={}", req.plate, req.refresh);

        let service = self.clone();
        Box::pin(async move { service.lookup(req).await })
    }
}
