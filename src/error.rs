use thiserror::Error;

use crate::plate::Plate;
use crate::types::JobId;

/// 抽出アダプタ・オーケストレータのエラー
#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("ブラウザ初期化エラー: {0}")]
    BrowserInit(String),

    #[error("ナビゲーションエラー: {0}")]
    Navigation(String),

    #[error("JavaScript実行エラー: {0}")]
    JavaScript(String),

    #[error("HTTPエラー: {0}")]
    Http(#[source] reqwest::Error),

    #[error("タイムアウト: {0}")]
    Timeout(String),

    #[error("解析エラー: {0}")]
    Parse(String),

    #[error("JSONパースエラー: {0}")]
    Json(String),

    #[error("利用可能な抽出アダプタがありません")]
    NoAdapters,
}

impl From<reqwest::Error> for ScraperError {
    fn from(e: reqwest::Error) -> Self {
        // タイムアウトだけは区別して返す
        if e.is_timeout() {
            ScraperError::Timeout(e.to_string())
        } else {
            ScraperError::Http(e)
        }
    }
}

/// プレート形式の検証エラー
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlateError {
    #[error("プレート形式が不正です: {0:?}")]
    InvalidFormat(String),
}

/// 永続化コラボレータのエラー
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("ストレージエラー: {0}")]
    Backend(String),

    #[error("ジョブが見つかりません: {0}")]
    JobNotFound(JobId),
}

/// バッチ投入時に呼び出し元へ返すエラー
#[derive(Error, Debug)]
pub enum JobError {
    #[error("バッチは既に実行中です")]
    AlreadyRunning,

    #[error("プレートが指定されていません")]
    EmptyBatch,

    #[error("ジョブ記録の作成に失敗: {0}")]
    Ledger(#[from] StoreError),
}

/// 単体照会のエラー
#[derive(Error, Debug)]
pub enum LookupError {
    #[error(transparent)]
    InvalidPlate(#[from] PlateError),

    #[error("車両情報が見つかりません: {0}")]
    NotFound(Plate),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// バッチ内の1件分の失敗（ループ外には出さない）
#[derive(Error, Debug)]
pub enum ItemError {
    #[error(transparent)]
    InvalidPlate(#[from] PlateError),

    #[error("保存に失敗: {0}")]
    Store(#[from] StoreError),
}
