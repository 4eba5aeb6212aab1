//! テスト用の台本付きアダプタとシンク

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{ScraperError, StoreError};
use crate::fields::{CanonicalField, VehicleFields};
use crate::orchestrator::{AttemptSink, Strategy};
use crate::plate::Plate;
use crate::store::{MemoryStore, ProgressLedger};
use crate::traits::Extractor;
use crate::types::{Confidence, Extraction, ExtractionAttempt, JobId};

/// プレートごとの振る舞い
#[derive(Clone)]
pub enum Script {
    Record(VehicleFields),
    NoData,
    Fail,
    Panic,
    /// `entered` を通知してから `release` を待ち、その後 `then` を実行
    Gate {
        entered: Arc<Notify>,
        release: Arc<Notify>,
        then: Box<Script>,
    },
}

impl Script {
    pub fn record(pairs: &[(CanonicalField, &str)]) -> Self {
        Script::Record(pairs.iter().map(|(f, v)| (*f, v.to_string())).collect())
    }
}

#[derive(Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct ScriptedExtractor {
    strategy: Strategy,
    default: Script,
    overrides: HashMap<String, Script>,
    calls: CallCounter,
    seen: Arc<Mutex<Vec<String>>>,
}

impl ScriptedExtractor {
    pub fn new(strategy: Strategy, default: Script) -> Self {
        Self {
            strategy,
            default,
            overrides: HashMap::new(),
            calls: CallCounter::default(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn on(mut self, plate: &str, script: Script) -> Self {
        self.overrides.insert(plate.to_string(), script);
        self
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }

    /// 呼び出されたプレートの順序
    pub fn seen(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.seen)
    }

    pub fn boxed(self) -> Box<dyn Extractor> {
        Box::new(self)
    }

    async fn run(&self, script: &Script, plate: &Plate) -> Result<Option<Extraction>, ScraperError> {
        let mut script = script;
        loop {
            match script {
                Script::Record(fields) => {
                    return Ok(Some(Extraction::new(
                        self.strategy,
                        plate,
                        fields.clone(),
                        Confidence::High,
                    )))
                }
                Script::NoData => return Ok(None),
                Script::Fail => return Err(ScraperError::Timeout("scripted failure".to_string())),
                Script::Panic => panic!("scripted panic for {}", plate),
                Script::Gate {
                    entered,
                    release,
                    then,
                } => {
                    entered.notify_one();
                    release.notified().await;
                    script = then;
                }
            }
        }
    }
}

#[async_trait]
impl Extractor for ScriptedExtractor {
    fn strategy(&self) -> Strategy {
        self.strategy
    }

    async fn extract(&self, plate: &Plate) -> Result<Option<Extraction>, ScraperError> {
        self.calls.0.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(plate.to_string());
        }
        let script = self.overrides.get(plate.as_str()).unwrap_or(&self.default);
        self.run(script, plate).await
    }
}

#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<ExtractionAttempt>>);

impl RecordingSink {
    pub fn attempts(&self) -> Vec<ExtractionAttempt> {
        self.0.lock().unwrap().clone()
    }
}

impl AttemptSink for RecordingSink {
    fn record(&self, attempt: &ExtractionAttempt) {
        self.0.lock().unwrap().push(attempt.clone());
    }
}

/// 台帳の故障の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerFault {
    /// 最初の create_job だけ失敗
    CreateFailsOnce,
    /// increment_processed が常に失敗
    IncrementFails,
    /// increment_processed でパニック
    IncrementPanics,
}

/// 故障を注入できる台帳。それ以外は MemoryStore に委譲
pub struct FaultyLedger {
    inner: Arc<MemoryStore>,
    fault: LedgerFault,
    tripped: AtomicBool,
}

impl FaultyLedger {
    pub fn new(inner: Arc<MemoryStore>, fault: LedgerFault) -> Self {
        Self {
            inner,
            fault,
            tripped: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl ProgressLedger for FaultyLedger {
    async fn create_job(&self, total_items: usize) -> Result<JobId, StoreError> {
        if self.fault == LedgerFault::CreateFailsOnce && !self.tripped.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Backend("scripted create failure".to_string()));
        }
        self.inner.create_job(total_items).await
    }

    async fn increment_processed(&self, job: JobId) -> Result<(), StoreError> {
        match self.fault {
            LedgerFault::IncrementFails => Err(StoreError::Backend("scripted increment failure".to_string())),
            LedgerFault::IncrementPanics => panic!("scripted ledger panic for job {}", job),
            LedgerFault::CreateFailsOnce => self.inner.increment_processed(job).await,
        }
    }

    async fn finalize(&self, job: JobId) -> Result<(), StoreError> {
        self.inner.finalize(job).await
    }
}
