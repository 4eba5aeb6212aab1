//! ナンバープレート車両情報スクレイパー
//!
//! - プレート番号から公開照会サイトの車両情報を抽出
//! - 抽出戦略（HTTP直接取得 / 汎用パターン / ブラウザ自動化）を優先順に切り替え
//! - 大量のプレートをバックグラウンドのバッチジョブで処理
//!
//! # 単体照会の使用例
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use plate_scraper::{LookupRequest, MemoryStore, PlateService, ScraperConfig};
//! use tower::Service;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ScraperConfig::new().with_headless(true);
//!     let store = Arc::new(MemoryStore::new());
//!     let mut service = PlateService::launch(&config, store).await.unwrap();
//!
//!     let record = service.call(LookupRequest::new("ABC1D23")).await.unwrap();
//!     println!("Brand: {:?}", record.fields.get(plate_scraper::CanonicalField::Brand));
//!
//!     service.close().await;
//! }
//! ```
//!
//! # バッチ処理の使用例
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use plate_scraper::{MemoryStore, PlateService, ScraperConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let service = PlateService::launch(&ScraperConfig::new(), store.clone())
//!         .await
//!         .unwrap();
//!
//!     let job = service.submit_batch(["ABC1234", "DEF5G67"]).await.unwrap();
//!     service.jobs().join().await;
//!     println!("{:?}", store.job(job).await);
//! }
//! ```

pub mod config;
pub mod error;
pub mod extract;
pub mod fields;
pub mod job;
pub mod orchestrator;
pub mod plate;
pub mod service;
pub mod store;
pub mod traits;
pub mod types;

#[cfg(test)]
mod test_support;

// 主要な型をリエクスポート
pub use config::{PatternSource, ScraperConfig, SourceMethod};
pub use error::{ItemError, JobError, LookupError, PlateError, ScraperError, StoreError};
pub use fields::{CanonicalField, VehicleFields};
pub use job::{JobController, PacingSchedule, StopHandle};
pub use orchestrator::{AttemptSink, Orchestrator, OrchestratorStatus, Preference, Strategy, TracingSink};
pub use plate::{generate_test_plates, Plate, PlateFormat};
pub use service::{LookupRequest, PlateService};
pub use store::{MemoryStore, ProgressLedger, VehicleStore};
pub use traits::Extractor;
pub use types::{
    AttemptOutcome, BatchJob, Confidence, Extraction, ExtractionAttempt, JobId, JobState,
    RecordStatus, VehicleRecord,
};
