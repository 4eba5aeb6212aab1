//! 直接HTTPアダプタ
//!
//! トップページへのGETでCookieを取得し、少し待ってから既知のパスへ順に
//! プレートをフォームPOSTする。最初に結果テーブルが取れたパスで終了。

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::{build_client, has_failure_marker, random_delay, table};
use crate::config::ScraperConfig;
use crate::error::ScraperError;
use crate::fields::VehicleFields;
use crate::orchestrator::Strategy;
use crate::plate::Plate;
use crate::traits::Extractor;
use crate::types::{Confidence, Extraction};

pub struct HttpExtractor {
    config: ScraperConfig,
    client: reqwest::Client,
}

impl HttpExtractor {
    pub fn new(config: ScraperConfig) -> Result<Self, ScraperError> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    /// セッション確立（Cookie取得）。200以外なら false
    async fn warm_session(&self) -> Result<bool, ScraperError> {
        let url = self.config.endpoint_url("/");
        debug!("Warming session: {}", url);
        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            warn!("Entry page returned {}: {}", status, url);
            return Ok(false);
        }
        Ok(true)
    }

    /// 1つのエンドポイントにPOSTして結果テーブルを解析
    async fn query_endpoint(
        &self,
        url: &str,
        plate: &Plate,
    ) -> Result<Option<VehicleFields>, ScraperError> {
        let form = [
            ("placa", plate.as_str()),
            ("sPlaca", plate.as_str()),
            ("search", plate.as_str()),
            ("submit", "Consultar"),
            ("buscar", "Consultar"),
        ];
        let response = self.client.post(url).form(&form).send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            debug!("Endpoint {} returned {}", url, status);
            return Ok(None);
        }

        let body = response.text().await?;
        debug!("Endpoint {} returned {} bytes", url, body.len());

        if has_failure_marker(&body, &self.config.failure_markers) {
            info!("Source reported no result for {} at {}", plate, url);
            return Ok(None);
        }

        let rows = table::result_table_rows(&body);
        let fields = VehicleFields::from_rows(table::borrowed(&rows));
        if fields.is_empty() {
            debug!("No usable table at {} ({} rows)", url, rows.len());
            return Ok(None);
        }
        Ok(Some(fields))
    }
}

#[async_trait]
impl Extractor for HttpExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::Http
    }

    async fn extract(&self, plate: &Plate) -> Result<Option<Extraction>, ScraperError> {
        if !self.warm_session().await? {
            return Ok(None);
        }

        random_delay(&self.config.warmup_delay_ms).await;

        // どのパスからも応答が得られなかった場合のみエラーとして返す
        let mut last_error = None;
        let mut responded = false;

        for path in &self.config.endpoint_paths {
            let url = self.config.endpoint_url(path);
            match self.query_endpoint(&url, plate).await {
                Ok(Some(fields)) => {
                    info!("Extracted {} fields for {} from {}", fields.len(), plate, url);
                    let extraction = Extraction::new(Strategy::Http, plate, fields, Confidence::High)
                        .with_source(url);
                    return Ok(Some(extraction));
                }
                Ok(None) => responded = true,
                Err(e) => {
                    warn!("Request to {} failed: {}", url, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !responded => Err(e),
            _ => Ok(None),
        }
    }
}
