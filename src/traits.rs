use async_trait::async_trait;

use crate::error::ScraperError;
use crate::orchestrator::Strategy;
use crate::plate::Plate;
use crate::types::Extraction;

/// 抽出アダプタ共通インターフェース
///
/// `Ok(Some(_))` がレコード、`Ok(None)` がデータなし（エラーではない）、
/// `Err(_)` がアダプタエラー。いずれもオーケストレータ側でフォールバックに回す。
#[async_trait]
pub trait Extractor: Send + Sync {
    /// このアダプタの戦略
    fn strategy(&self) -> Strategy;

    /// プレート1件を抽出
    async fn extract(&self, plate: &Plate) -> Result<Option<Extraction>, ScraperError>;

    /// リソース解放（ブラウザセッションなど）
    async fn close(&self) -> Result<(), ScraperError> {
        Ok(())
    }
}
