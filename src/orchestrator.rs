//! 戦略オーケストレータ
//!
//! 利用可能なアダプタを優先順位リストに従って呼び出し、最初に得られた
//! レコードを返す。選択順とフォールバック順はコードではなくデータ
//! （[`Strategy::AUTO_ORDER`] と [`Strategy::fallback_order`]）で決まる。

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Mutex;
use std::time::Instant;

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::extract::{BrowserExtractor, HttpExtractor, PatternExtractor};
use crate::plate::Plate;
use crate::traits::Extractor;
use crate::types::{AttemptOutcome, Extraction, ExtractionAttempt};

/// 抽出戦略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// 直接HTTP（最も軽い）
    Http,
    /// 汎用パターン
    Pattern,
    /// ブラウザ自動化（最も重いが互換性が高い）
    Browser,
}

impl Strategy {
    /// auto モードの優先順（軽い順）
    pub const AUTO_ORDER: [Strategy; 3] = [Strategy::Http, Strategy::Pattern, Strategy::Browser];

    /// この戦略が失敗した後に試す順序
    pub fn fallback_order(self) -> [Strategy; 2] {
        match self {
            Strategy::Http => [Strategy::Pattern, Strategy::Browser],
            Strategy::Pattern => [Strategy::Http, Strategy::Browser],
            Strategy::Browser => [Strategy::Http, Strategy::Pattern],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Http => "http",
            Strategy::Pattern => "pattern",
            Strategy::Browser => "browser",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Strategy::Http),
            "pattern" => Ok(Strategy::Pattern),
            "browser" => Ok(Strategy::Browser),
            other => Err(ScraperError::Parse(format!("unknown strategy: {}", other))),
        }
    }
}

/// 戦略の選択モード
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preference {
    #[default]
    Auto,
    /// 利用可能ならこの戦略を最初に使う。無ければ auto と同じ
    Forced(Strategy),
}

impl FromStr for Preference {
    type Err = ScraperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            Ok(Preference::Auto)
        } else {
            s.parse().map(Preference::Forced)
        }
    }
}

/// 試行結果の通知先。制御フローには影響しない
pub trait AttemptSink: Send + Sync {
    fn record(&self, attempt: &ExtractionAttempt);
}

/// tracing にログ出力するだけのシンク
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AttemptSink for TracingSink {
    fn record(&self, attempt: &ExtractionAttempt) {
        match &attempt.outcome {
            AttemptOutcome::Record { fields } => info!(
                plate = %attempt.plate,
                strategy = %attempt.strategy,
                elapsed_ms = attempt.duration.as_millis() as u64,
                "Extracted {} fields", fields
            ),
            AttemptOutcome::NoData => info!(
                plate = %attempt.plate,
                strategy = %attempt.strategy,
                elapsed_ms = attempt.duration.as_millis() as u64,
                "No data"
            ),
            AttemptOutcome::Error(reason) => warn!(
                plate = %attempt.plate,
                strategy = %attempt.strategy,
                elapsed_ms = attempt.duration.as_millis() as u64,
                "Attempt failed: {}", reason
            ),
        }
    }
}

impl AttemptSink for tokio::sync::mpsc::UnboundedSender<ExtractionAttempt> {
    fn record(&self, attempt: &ExtractionAttempt) {
        // 受信側が閉じていても無視
        let _ = self.send(attempt.clone());
    }
}

/// オーケストレータの状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    pub preference: Preference,
    pub available: Vec<Strategy>,
    pub last_strategy: Option<Strategy>,
}

pub struct Orchestrator {
    adapters: Vec<Box<dyn Extractor>>,
    preference: Preference,
    last_strategy: Mutex<Option<Strategy>>,
}

impl Orchestrator {
    /// アダプタが1つも無ければ起動時エラー
    pub fn new(
        adapters: Vec<Box<dyn Extractor>>,
        preference: Preference,
    ) -> Result<Self, ScraperError> {
        let mut unique: Vec<Box<dyn Extractor>> = Vec::with_capacity(adapters.len());
        for adapter in adapters {
            if unique.iter().any(|a| a.strategy() == adapter.strategy()) {
                warn!("Duplicate {} adapter ignored", adapter.strategy());
                continue;
            }
            unique.push(adapter);
        }

        if unique.is_empty() {
            return Err(ScraperError::NoAdapters);
        }

        Ok(Self {
            adapters: unique,
            preference,
            last_strategy: Mutex::new(None),
        })
    }

    /// 設定された戦略のアダプタを初期化。失敗したものは単に除外する
    pub async fn launch(config: &ScraperConfig) -> Result<Self, ScraperError> {
        let mut adapters: Vec<Box<dyn Extractor>> = Vec::new();

        for strategy in &config.strategies {
            let adapter: Result<Box<dyn Extractor>, ScraperError> = match strategy {
                Strategy::Http => HttpExtractor::new(config.clone()).map(|a| Box::new(a) as Box<dyn Extractor>),
                Strategy::Pattern => PatternExtractor::new(config.clone()).map(|a| Box::new(a) as Box<dyn Extractor>),
                Strategy::Browser => BrowserExtractor::launch(config.clone())
                    .await
                    .map(|a| Box::new(a) as Box<dyn Extractor>),
            };
            match adapter {
                Ok(adapter) => {
                    info!("{} adapter initialized", strategy);
                    adapters.push(adapter);
                }
                Err(e) => warn!("{} adapter unavailable: {}", strategy, e),
            }
        }

        let orchestrator = Self::new(adapters, config.preference)?;
        info!(
            "Orchestrator ready: preference={:?}, available={:?}",
            orchestrator.preference,
            orchestrator.available()
        );
        Ok(orchestrator)
    }

    fn adapter(&self, strategy: Strategy) -> Option<&dyn Extractor> {
        self.adapters
            .iter()
            .find(|a| a.strategy() == strategy)
            .map(|a| a.as_ref())
    }

    fn is_available(&self, strategy: Strategy) -> bool {
        self.adapter(strategy).is_some()
    }

    /// 利用可能な戦略（auto 順）
    pub fn available(&self) -> Vec<Strategy> {
        Strategy::AUTO_ORDER
            .into_iter()
            .filter(|s| self.is_available(*s))
            .collect()
    }

    /// 最初に使う戦略
    pub fn primary(&self) -> Strategy {
        match self.preference {
            Preference::Forced(s) if self.is_available(s) => s,
            _ => self
                .available()
                .first()
                .copied()
                .unwrap_or_else(|| self.adapters[0].strategy()),
        }
    }

    /// 1回の解決で試す順序（重複なし）
    pub fn plan(&self) -> Vec<Strategy> {
        let primary = self.primary();
        std::iter::once(primary)
            .chain(primary.fallback_order())
            .filter(|s| self.is_available(*s))
            .collect()
    }

    /// プレート1件を解決。最初に得られたレコードを返し、全滅なら None
    pub async fn resolve(&self, plate: &Plate, sink: &dyn AttemptSink) -> Option<Extraction> {
        for strategy in self.plan() {
            let Some(adapter) = self.adapter(strategy) else {
                continue;
            };
            if let Ok(mut last) = self.last_strategy.lock() {
                *last = Some(strategy);
            }

            let start = Instant::now();
            let result = AssertUnwindSafe(adapter.extract(plate)).catch_unwind().await;
            let duration = start.elapsed();

            let (outcome, extraction) = match result {
                Ok(Ok(Some(extraction))) => (
                    AttemptOutcome::Record {
                        fields: extraction.fields.len(),
                    },
                    Some(extraction),
                ),
                Ok(Ok(None)) => (AttemptOutcome::NoData, None),
                Ok(Err(e)) => (AttemptOutcome::Error(e.to_string()), None),
                Err(_) => (AttemptOutcome::Error("adapter panicked".to_string()), None),
            };

            sink.record(&ExtractionAttempt {
                plate: plate.clone(),
                strategy,
                outcome,
                duration,
            });

            if extraction.is_some() {
                return extraction;
            }
        }

        info!("All strategies exhausted for {}", plate);
        None
    }

    pub fn status(&self) -> OrchestratorStatus {
        OrchestratorStatus {
            preference: self.preference,
            available: self.available(),
            last_strategy: self.last_strategy.lock().ok().and_then(|g| *g),
        }
    }

    /// 全アダプタのリソースを解放
    pub async fn close(&self) {
        for adapter in &self.adapters {
            if let Err(e) = adapter.close().await {
                warn!("Failed to close {} adapter: {}", adapter.strategy(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::CanonicalField;
    use crate::test_support::{RecordingSink, Script, ScriptedExtractor};

    fn plate() -> Plate {
        Plate::parse("ABC1234").unwrap()
    }

    #[tokio::test]
    async fn test_first_success_wins_and_later_adapters_are_skipped() {
        let http = ScriptedExtractor::new(Strategy::Http, Script::NoData);
        let pattern = ScriptedExtractor::new(Strategy::Pattern, Script::record(&[(CanonicalField::Brand, "Fiat")]));
        let browser = ScriptedExtractor::new(Strategy::Browser, Script::record(&[(CanonicalField::Brand, "VW")]));
        let browser_calls = browser.calls();

        let orchestrator =
            Orchestrator::new(vec![browser.boxed(), pattern.boxed(), http.boxed()], Preference::Auto).unwrap();
        let sink = RecordingSink::default();
        let extraction = orchestrator.resolve(&plate(), &sink).await.unwrap();

        assert_eq!(extraction.strategy, Strategy::Pattern);
        assert_eq!(extraction.fields.get(CanonicalField::Brand), Some("Fiat"));
        assert_eq!(browser_calls.count(), 0);

        let attempts = sink.attempts();
        assert_eq!(attempts.len(), 2);
        assert_eq!(attempts[0].strategy, Strategy::Http);
        assert_eq!(attempts[0].outcome, AttemptOutcome::NoData);
        assert_eq!(attempts[1].outcome, AttemptOutcome::Record { fields: 1 });
        assert_eq!(orchestrator.status().last_strategy, Some(Strategy::Pattern));
    }

    #[tokio::test]
    async fn test_all_failures_return_none_after_one_call_each() {
        let http = ScriptedExtractor::new(Strategy::Http, Script::Fail);
        let pattern = ScriptedExtractor::new(Strategy::Pattern, Script::Panic);
        let browser = ScriptedExtractor::new(Strategy::Browser, Script::NoData);
        let counters = [http.calls(), pattern.calls(), browser.calls()];

        let orchestrator =
            Orchestrator::new(vec![http.boxed(), pattern.boxed(), browser.boxed()], Preference::Auto).unwrap();
        let sink = RecordingSink::default();
        assert!(orchestrator.resolve(&plate(), &sink).await.is_none());

        for counter in counters {
            assert_eq!(counter.count(), 1);
        }
        let attempts = sink.attempts();
        assert!(matches!(attempts[0].outcome, AttemptOutcome::Error(_)));
        assert_eq!(attempts[1].outcome, AttemptOutcome::Error("adapter panicked".to_string()));
    }

    fn all_adapters() -> Vec<Box<dyn Extractor>> {
        Strategy::AUTO_ORDER
            .into_iter()
            .map(|s| ScriptedExtractor::new(s, Script::NoData).boxed())
            .collect()
    }

    #[test]
    fn test_plans() {
        let auto = Orchestrator::new(all_adapters(), Preference::Auto).unwrap();
        assert_eq!(auto.plan(), vec![Strategy::Http, Strategy::Pattern, Strategy::Browser]);

        let browser = Orchestrator::new(all_adapters(), Preference::Forced(Strategy::Browser)).unwrap();
        assert_eq!(browser.plan(), vec![Strategy::Browser, Strategy::Http, Strategy::Pattern]);

        let pattern = Orchestrator::new(all_adapters(), Preference::Forced(Strategy::Pattern)).unwrap();
        assert_eq!(pattern.plan(), vec![Strategy::Pattern, Strategy::Http, Strategy::Browser]);
    }

    #[test]
    fn test_forced_unavailable_falls_back_to_auto() {
        let adapters = vec![
            ScriptedExtractor::new(Strategy::Browser, Script::NoData).boxed(),
            ScriptedExtractor::new(Strategy::Pattern, Script::NoData).boxed(),
        ];
        let orchestrator = Orchestrator::new(adapters, Preference::Forced(Strategy::Http)).unwrap();
        assert_eq!(orchestrator.plan(), vec![Strategy::Pattern, Strategy::Browser]);
        assert_eq!(orchestrator.status().available, vec![Strategy::Pattern, Strategy::Browser]);
    }

    #[test]
    fn test_no_adapters_is_fatal() {
        assert!(matches!(
            Orchestrator::new(Vec::new(), Preference::Auto),
            Err(ScraperError::NoAdapters)
        ));
    }

    #[test]
    fn test_preference_parsing() {
        assert_eq!("auto".parse::<Preference>().unwrap(), Preference::Auto);
        assert_eq!("Browser".parse::<Preference>().unwrap(), Preference::Forced(Strategy::Browser));
        assert!("selenium".parse::<Preference>().is_err());
    }

    #[tokio::test]
    async fn test_channel_sink_receives_attempts() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let orchestrator = Orchestrator::new(
            vec![ScriptedExtractor::new(Strategy::Http, Script::NoData).boxed()],
            Preference::Auto,
        )
        .unwrap();
        orchestrator.resolve(&plate(), &tx).await;
        let attempt = rx.recv().await.unwrap();
        assert_eq!(attempt.strategy, Strategy::Http);
        assert_eq!(attempt.outcome, AttemptOutcome::NoData);
    }
}
