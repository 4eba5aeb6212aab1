//! 戦略ベンチマーク
//!
//! 同じプレート列を戦略ごとに強制して、成功率と所要時間を比較する。
//!
//! 実行方法:
//! ```
//! PLATES=ABC1234,DEF5G67 cargo run --example benchmark
//! ```

use std::time::Duration;

use plate_scraper::{
    generate_test_plates, AttemptOutcome, ExtractionAttempt, Orchestrator, Plate, Preference,
    ScraperConfig, Strategy,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct StrategyReport {
    strategy: Strategy,
    plates: usize,
    records: usize,
    no_data: usize,
    errors: usize,
    success_rate: f64,
    average_ms: u128,
}

impl StrategyReport {
    fn from_attempts(strategy: Strategy, plates: usize, attempts: &[ExtractionAttempt]) -> Self {
        // 強制した戦略の試行だけを数える（フォールバック分は除外）
        let own: Vec<_> = attempts.iter().filter(|a| a.strategy == strategy).collect();
        let records = own
            .iter()
            .filter(|a| matches!(a.outcome, AttemptOutcome::Record { .. }))
            .count();
        let no_data = own
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::NoData)
            .count();
        let total: Duration = own.iter().map(|a| a.duration).sum();

        Self {
            strategy,
            plates,
            records,
            no_data,
            errors: own.len() - records - no_data,
            success_rate: if own.is_empty() {
                0.0
            } else {
                records as f64 / own.len() as f64
            },
            average_ms: if own.is_empty() {
                0
            } else {
                total.as_millis() / own.len() as u128
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ログ設定
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let plates: Vec<Plate> = match std::env::var("PLATES") {
        Ok(list) => list
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(|p| Plate::parse(p.trim()))
            .collect::<Result<_, _>>()?,
        Err(_) => generate_test_plates(5),
    };

    println!("=== Strategy Benchmark ===");
    println!("Plates: {}", plates.len());
    println!();

    let mut reports = Vec::new();

    for strategy in Strategy::AUTO_ORDER {
        let config = ScraperConfig::new()
            .with_strategies([strategy])
            .with_preference(Preference::Forced(strategy));

        let orchestrator = match Orchestrator::launch(&config).await {
            Ok(orchestrator) => orchestrator,
            Err(e) => {
                eprintln!("✗ {}: {}", strategy, e);
                continue;
            }
        };

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for plate in &plates {
            orchestrator.resolve(plate, &tx).await;
        }
        drop(tx);
        orchestrator.close().await;

        let mut attempts = Vec::new();
        while let Some(attempt) = rx.recv().await {
            attempts.push(attempt);
        }

        let report = StrategyReport::from_attempts(strategy, plates.len(), &attempts);
        println!(
            "{:<8} success {:>5.1}%  avg {:>6} ms  ({} records, {} no data, {} errors)",
            strategy.as_str(),
            report.success_rate * 100.0,
            report.average_ms,
            report.records,
            report.no_data,
            report.errors
        );
        reports.push(report);
    }

    println!();
    println!("{}", serde_json::to_string_pretty(&reports)?);
    Ok(())
}
