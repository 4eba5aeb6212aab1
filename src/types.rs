//! 車両レコード・バッチジョブ・抽出結果の型定義

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fields::VehicleFields;
use crate::orchestrator::Strategy;
use crate::plate::{Plate, PlateFormat};

/// レコード状態（初回登録 / 既存レコードへのマージ）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    Updated,
}

/// 車両レコード
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleRecord {
    pub plate: Plate,
    pub fields: VehicleFields,
    pub status: RecordStatus,
    pub observed_at: DateTime<Utc>,
}

impl VehicleRecord {
    /// 初回抽出からレコードを作成
    pub fn new(plate: Plate, fields: VehicleFields, observed_at: DateTime<Utc>) -> Self {
        Self {
            plate,
            fields,
            status: RecordStatus::Pending,
            observed_at,
        }
    }

    /// 再抽出結果をマージ。新しい抽出に無いフィールドは消さない
    pub fn merge(&mut self, fields: &VehicleFields, observed_at: DateTime<Utc>) {
        self.fields.merge_from(fields);
        self.status = RecordStatus::Updated;
        self.observed_at = observed_at;
    }
}

/// バッチジョブID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
}

/// バッチ実行1回分の記録
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: JobId,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub total_items: usize,
    pub processed_items: usize,
    pub state: JobState,
}

impl BatchJob {
    pub fn new(id: JobId, total_items: usize) -> Self {
        Self {
            id,
            started_at: Utc::now(),
            finished_at: None,
            total_items,
            processed_items: 0,
            state: JobState::Running,
        }
    }
}

/// 抽出結果の確度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// メタデータのみ（フィールド未取得）
    Low,
    /// テキストパターンから取得
    Medium,
    /// 結果テーブルから取得
    High,
}

/// アダプタ1回分の抽出結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub strategy: Strategy,
    pub fields: VehicleFields,
    pub confidence: Confidence,
    pub plate_format: PlateFormat,
    /// 取得元（URL または取得元名）
    pub source: Option<String>,
}

impl Extraction {
    pub fn new(strategy: Strategy, plate: &Plate, fields: VehicleFields, confidence: Confidence) -> Self {
        Self {
            strategy,
            fields,
            confidence,
            plate_format: plate.format(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// 試行結果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum AttemptOutcome {
    Record { fields: usize },
    NoData,
    Error(String),
}

/// アダプタ呼び出し1回分の記録（永続化しない）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    pub plate: Plate,
    pub strategy: Strategy,
    pub outcome: AttemptOutcome,
    pub duration: Duration,
}
