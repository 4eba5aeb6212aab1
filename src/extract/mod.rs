//! 抽出アダプタ
//!
//! - `browser`: ヘッドレスブラウザで照会フォームを操作
//! - `http`: セッション確立GET → フォームPOST → 結果テーブル解析
//! - `pattern`: 生マークアップに対する正規表現 + テーブル走査（最終手段）

mod browser;
mod http;
mod pattern;
pub mod table;

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{self, HeaderMap, HeaderValue};
use tokio::time::sleep;

pub use browser::BrowserExtractor;
pub use http::HttpExtractor;
pub use pattern::{extract_generic, PatternExtractor};

use crate::config::ScraperConfig;
use crate::error::ScraperError;

/// ブラウザに近いヘッダを持つHTTPクライアントを作成（Cookie保持あり）
pub(crate) fn build_client(config: &ScraperConfig) -> Result<reqwest::Client, ScraperError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        HeaderValue::from_static("pt-BR,pt;q=0.9,en;q=0.8"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=0"));

    let client = reqwest::Client::builder()
        .cookie_store(true)
        .timeout(config.request_timeout)
        .redirect(reqwest::redirect::Policy::limited(5))
        .user_agent(config.user_agent.as_str())
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// 範囲内のランダムな時間だけ待機
pub(crate) async fn random_delay(range_ms: &RangeInclusive<u64>) {
    let ms = if range_ms.start() >= range_ms.end() {
        *range_ms.start()
    } else {
        rand::thread_rng().gen_range(range_ms.clone())
    };
    if ms > 0 {
        sleep(Duration::from_millis(ms)).await;
    }
}

/// 本文に失敗マーカーが含まれるか（大文字小文字無視）
pub(crate) fn has_failure_marker(body: &str, markers: &[String]) -> bool {
    let body = body.to_lowercase();
    markers.iter().any(|m| body.contains(&m.to_lowercase()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_marker_is_case_insensitive() {
        let markers = vec!["não encontrada".to_string(), "not found".to_string()];
        assert!(has_failure_marker("<p>Placa NÃO ENCONTRADA</p>", &markers));
        assert!(has_failure_marker("Not Found", &markers));
        assert!(!has_failure_marker("<table></table>", &markers));
    }

    #[tokio::test]
    async fn test_zero_delay_returns_immediately() {
        let start = std::time::Instant::now();
        random_delay(&(0..=0)).await;
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
