//! ブラウザ自動化アダプタ
//!
//! ブラウザはアダプタの生存期間中1つだけ起動し、照会ごとにページを開いて
//! 終了時（成功・データなし・エラーのいずれでも）必ず閉じる。

use std::path::PathBuf;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Element, Page};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::fields::VehicleFields;
use crate::orchestrator::Strategy;
use crate::plate::Plate;
use crate::traits::Extractor;
use crate::types::{Confidence, Extraction};

const PLATE_INPUT_SELECTOR: &str = "#sPlaca";
const SUBMIT_SELECTOR: &str = "button[type='submit']";
const RESULT_TABLE_SELECTOR: &str = "table.fipeTablePriceDetail";
const ELEMENT_POLL_INTERVAL_MS: u64 = 500;

/// 結果テーブルの各行を [ラベル, 値] の配列（JSON文字列）で返す
const EXTRACT_ROWS_SCRIPT: &str = r#"
    (function() {
        var table = document.querySelector('table.fipeTablePriceDetail');
        if (!table) return '[]';
        var rows = [];
        table.querySelectorAll('tr').forEach(function(tr) {
            var cells = tr.querySelectorAll('td');
            if (cells.length >= 2) {
                rows.push([cells[0].innerText.trim(), cells[1].innerText.trim()]);
            }
        });
        return JSON.stringify(rows);
    })()
"#;

pub struct BrowserExtractor {
    config: ScraperConfig,
    browser: Mutex<Option<Browser>>,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    user_data_dir: PathBuf,
}

impl BrowserExtractor {
    /// ブラウザを起動してアダプタを作成
    pub async fn launch(config: ScraperConfig) -> Result<Self, ScraperError> {
        info!("Launching browser for plate lookups...");

        // ユニークなユーザーデータディレクトリを生成
        let unique_id = format!(
            "{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let user_data_dir = std::env::temp_dir().join(format!("plate-scraper-{}", unique_id));

        let chrome_path = config
            .chrome_path
            .clone()
            .or_else(|| std::env::var_os("CHROME_PATH").map(PathBuf::from))
            .or_else(|| std::env::var_os("CHROMIUM_PATH").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("chromium"));

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .user_data_dir(&user_data_dir)
            .window_size(1920, 1080);

        if !config.headless {
            builder = builder.with_head();
        }

        builder = builder
            .no_sandbox()
            .request_timeout(config.request_timeout)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg(format!("--user-agent={}", config.user_agent));

        if config.debug {
            builder = builder.arg("--enable-logging=stderr").arg("--v=1");
        }

        let browser_config = builder.build().map_err(ScraperError::BrowserInit)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))?;

        // ハンドラータスクを起動
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                debug!("Browser event: {:?}", event);
            }
        });

        info!("Browser launched");
        Ok(Self {
            config,
            browser: Mutex::new(Some(browser)),
            handler_task: Mutex::new(Some(handler_task)),
            user_data_dir,
        })
    }

    async fn open_page(&self) -> Result<Page, ScraperError> {
        let guard = self.browser.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| ScraperError::BrowserInit("Browser not initialized".to_string()))?;
        browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScraperError::BrowserInit(e.to_string()))
    }

    /// 照会フォームを送信して結果テーブルを読む。要素が出なければ None
    async fn query(&self, page: &Page, plate: &Plate) -> Result<Option<VehicleFields>, ScraperError> {
        let timeout = self.config.timeout;

        page.goto(self.config.base_url.as_str())
            .await
            .map_err(|e| ScraperError::Navigation(e.to_string()))?;

        let Some(input) = wait_for_element(page, PLATE_INPUT_SELECTOR, timeout).await else {
            info!("Plate input not found within {:?}", timeout);
            return Ok(None);
        };

        let clear_script = format!("document.querySelector('{}').value = ''", PLATE_INPUT_SELECTOR);
        page.evaluate(clear_script.as_str())
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?;
        input
            .click()
            .await
            .map_err(|e| ScraperError::JavaScript(format!("plate input click: {}", e)))?;
        input
            .type_str(plate.as_str())
            .await
            .map_err(|e| ScraperError::JavaScript(format!("plate input: {}", e)))?;
        debug!("Typed plate {}", plate);

        let Some(submit) = wait_for_element(page, SUBMIT_SELECTOR, timeout).await else {
            info!("Submit button not found within {:?}", timeout);
            return Ok(None);
        };
        submit
            .click()
            .await
            .map_err(|e| ScraperError::JavaScript(format!("submit click: {}", e)))?;

        if wait_for_element(page, RESULT_TABLE_SELECTOR, timeout).await.is_none() {
            info!("No result table for {} within {:?}", plate, timeout);
            self.log_debug_screenshot(page).await;
            return Ok(None);
        }

        let json_str = page
            .evaluate(EXTRACT_ROWS_SCRIPT)
            .await
            .map_err(|e| ScraperError::JavaScript(e.to_string()))?
            .into_value::<String>()
            .unwrap_or_default();
        let rows: Vec<(String, String)> =
            serde_json::from_str(&json_str).map_err(|e| ScraperError::Json(e.to_string()))?;
        debug!("Result table has {} rows", rows.len());

        let fields = VehicleFields::from_rows(rows.iter().map(|(l, v)| (l.as_str(), v.as_str())));
        Ok((!fields.is_empty()).then_some(fields))
    }

    /// デバッグスクリーンショット
    async fn log_debug_screenshot(&self, page: &Page) {
        if !self.config.debug {
            return;
        }
        if let Ok(screenshot) = page
            .screenshot(ScreenshotParams::builder().full_page(true).build())
            .await
        {
            use base64::Engine;
            let encoded = base64::engine::general_purpose::STANDARD.encode(&screenshot);
            debug!("No-result screenshot: data:image/png;base64,{}", encoded);
        }
    }
}

/// セレクタに一致する要素が現れるまでポーリング
async fn wait_for_element(page: &Page, selector: &str, timeout: Duration) -> Option<Element> {
    let start = Instant::now();
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Some(element);
        }
        if start.elapsed() >= timeout {
            return None;
        }
        sleep(Duration::from_millis(ELEMENT_POLL_INTERVAL_MS)).await;
    }
}

#[async_trait]
impl Extractor for BrowserExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::Browser
    }

    async fn extract(&self, plate: &Plate) -> Result<Option<Extraction>, ScraperError> {
        let page = self.open_page().await?;

        let result = self.query(&page, plate).await;

        // 結果に関わらずページを閉じる
        if let Err(e) = page.close().await {
            debug!("Failed to close page: {}", e);
        }

        Ok(result?.map(|fields| {
            Extraction::new(Strategy::Browser, plate, fields, Confidence::High)
                .with_source(self.config.base_url.clone())
        }))
    }

    async fn close(&self) -> Result<(), ScraperError> {
        info!("Closing browser...");

        if let Some(mut browser) = self.browser.lock().await.take() {
            if let Err(e) = browser.close().await {
                debug!("Browser close failed: {}", e);
            }
            if let Err(e) = browser.wait().await {
                debug!("Browser wait failed: {}", e);
            }
        }
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }

        if self.user_data_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&self.user_data_dir) {
                warn!("Failed to remove {:?}: {}", self.user_data_dir, e);
            }
        }

        info!("Browser closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::CanonicalField;

    #[tokio::test]
    #[ignore] // 実環境テスト用: PLATE=ABC1234 cargo test test_browser_lookup -- --ignored --nocapture
    async fn test_browser_lookup() {
        tracing_subscriber::fmt()
            .with_env_filter("info,plate_scraper=debug")
            .init();

        let plate = Plate::parse(&std::env::var("PLATE").expect("PLATE not set")).unwrap();
        let config = ScraperConfig::new().with_debug(true);

        let extractor = BrowserExtractor::launch(config)
            .await
            .expect("Failed to launch browser");
        let result = extractor.extract(&plate).await;
        extractor.close().await.unwrap();

        match result {
            Ok(Some(extraction)) => {
                println!("Fields: {}", extraction.fields.len());
                println!("Brand: {:?}", extraction.fields.get(CanonicalField::Brand));
            }
            Ok(None) => println!("No data for {}", plate),
            Err(e) => panic!("Lookup failed: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_missing_executable_fails_to_launch() {
        let config = ScraperConfig::new().with_chrome_path("/nonexistent/chromium-binary");
        assert!(matches!(
            BrowserExtractor::launch(config).await,
            Err(ScraperError::BrowserInit(_))
        ));
    }
}
