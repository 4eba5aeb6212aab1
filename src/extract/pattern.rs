//! 汎用パターンアダプタ
//!
//! 構造解析が効かない取得元向けの最終手段。生マークアップに対して
//! 「ラベル: 値」形式の正規表現とテーブル走査を行う。
//! どの取得元からも取れなければ、プレート形式から推定したメタデータだけの
//! 低確度レコードを返す（ハード失敗にはしない）。

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use super::{build_client, random_delay, table};
use crate::config::{PatternSource, ScraperConfig, SourceMethod};
use crate::error::ScraperError;
use crate::fields::{normalize_value, CanonicalField, VehicleFields};
use crate::orchestrator::Strategy;
use crate::plate::Plate;
use crate::traits::Extractor;
use crate::types::{Confidence, Extraction};

/// 正規表現, フィールド, この語が直前にあれば不一致扱い
const FIELD_PATTERNS: &[(&str, CanonicalField, Option<&str>)] = &[
    (r"(?i)\bano\s+modelo[:\s]+(\d{4})", CanonicalField::ModelYear, None),
    (r"(?i)\bmarca[:\s]+([^\n\r<]+)", CanonicalField::Brand, None),
    (r"(?i)\bmodelo[:\s]+([^\n\r<]+)", CanonicalField::Model, Some("ano")),
    (r"(?i)\bano[:\s]+(\d{4})", CanonicalField::ManufactureYear, None),
    (r"(?i)\bcor[:\s]+([^\n\r<]+)", CanonicalField::Color, None),
    (r"(?i)\bcombust[íi]vel[:\s]+([^\n\r<]+)", CanonicalField::FuelType, None),
    (r"(?i)\bchassi[:\s]+([^\n\r<]+)", CanonicalField::ChassisNumber, None),
    (r"(?i)\bmotor[:\s]+([^\n\r<]+)", CanonicalField::EngineNumber, None),
    (r"(?i)\bpassageiros[:\s]+(\d+)", CanonicalField::SeatingCapacity, None),
    (r"\b(?i:uf)[:\s]+([A-Z]{2})\b", CanonicalField::RegionCode, None),
    (r"(?i)\bmunic[íi]pio[:\s]+([^\n\r<]+)", CanonicalField::Municipality, None),
    (r"(?i)\bcilindrada[:\s]+([^\n\r<]+)", CanonicalField::EngineDisplacement, None),
    (r"(?i)\bimportado[:\s]+([^\n\r<]+)", CanonicalField::Imported, None),
    (r"(?i)\bgen[ée]rico[:\s]+([^\n\r<]+)", CanonicalField::GenericName, None),
];

static COMPILED_PATTERNS: LazyLock<Vec<(Regex, CanonicalField, Option<&'static str>)>> =
    LazyLock::new(|| {
        FIELD_PATTERNS
            .iter()
            .filter_map(|(pattern, field, reject)| match Regex::new(pattern) {
                Ok(re) => Some((re, *field, *reject)),
                Err(e) => {
                    warn!("Invalid field pattern {}: {}", pattern, e);
                    None
                }
            })
            .collect()
    });

/// 生マークアップから汎用的にフィールドを抽出
///
/// テーブル行が正規表現より優先される。
pub fn extract_generic(html: &str) -> VehicleFields {
    let rows = table::all_table_rows(html);
    let mut fields = VehicleFields::from_rows(table::borrowed(&rows));

    for (re, field, reject) in COMPILED_PATTERNS.iter() {
        if fields.get(*field).is_some() {
            continue;
        }
        if let Some(value) = first_match(html, re, *reject) {
            fields.insert(*field, value);
        }
    }
    fields
}

fn first_match(text: &str, re: &Regex, reject_after: Option<&str>) -> Option<String> {
    re.captures_iter(text)
        .filter(|caps| {
            let Some(reject) = reject_after else {
                return true;
            };
            let start = caps.get(0).map_or(0, |m| m.start());
            !text[..start].trim_end().to_lowercase().ends_with(reject)
        })
        .find_map(|caps| caps.get(1).and_then(|m| normalize_value(m.as_str())))
}

pub struct PatternExtractor {
    config: ScraperConfig,
    client: reqwest::Client,
}

impl PatternExtractor {
    pub fn new(config: ScraperConfig) -> Result<Self, ScraperError> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    async fn try_source(
        &self,
        source: &PatternSource,
        plate: &Plate,
    ) -> Result<Option<VehicleFields>, ScraperError> {
        let params = [(source.plate_param.as_str(), plate.as_str())];
        let request = match source.method {
            SourceMethod::Get => self.client.get(&source.url).query(&params),
            SourceMethod::Post => self.client.post(&source.url).form(&params),
        };

        let response = request.send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            debug!("{} returned {}", source.name, status);
            return Ok(None);
        }

        let body = response.text().await?;
        let fields = extract_generic(&body);
        Ok((!fields.is_empty()).then_some(fields))
    }

    /// フィールドなし・形式メタデータのみのレコード
    fn minimal_record(plate: &Plate) -> Extraction {
        let format = plate.format();
        info!(
            "No labelled data for {}; returning {} plate metadata (est. {})",
            plate,
            format.as_str(),
            format.estimated_years()
        );
        Extraction::new(Strategy::Pattern, plate, VehicleFields::new(), Confidence::Low)
            .with_source("plate-format")
    }
}

#[async_trait]
impl Extractor for PatternExtractor {
    fn strategy(&self) -> Strategy {
        Strategy::Pattern
    }

    async fn extract(&self, plate: &Plate) -> Result<Option<Extraction>, ScraperError> {
        let sources = &self.config.pattern_sources;

        for (i, source) in sources.iter().enumerate() {
            debug!("Trying source {} for {}", source.name, plate);
            match self.try_source(source, plate).await {
                Ok(Some(fields)) => {
                    info!("Extracted {} fields for {} from {}", fields.len(), plate, source.name);
                    let extraction =
                        Extraction::new(Strategy::Pattern, plate, fields, Confidence::Medium)
                            .with_source(source.name.clone());
                    return Ok(Some(extraction));
                }
                Ok(None) => debug!("Nothing extracted from {}", source.name),
                Err(e) => warn!("Source {} failed: {}", source.name, e),
            }

            if i + 1 < sources.len() {
                random_delay(&self.config.source_delay_ms).await;
            }
        }

        Ok(Some(Self::minimal_record(plate)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate::PlateFormat;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_label_colon_value_patterns() {
        let html = "<div><p>Marca: Fiat</p><p>Ano Modelo: 2015</p><p>Ano: 2014</p>\
                    <p>Combustivel: Flex</p><p>UF: MG</p><p>Cor: -</p></div>";
        let fields = extract_generic(html);
        assert_eq!(fields.get(CanonicalField::Brand), Some("Fiat"));
        assert_eq!(fields.get(CanonicalField::ModelYear), Some("2015"));
        assert_eq!(fields.get(CanonicalField::ManufactureYear), Some("2014"));
        assert_eq!(fields.get(CanonicalField::FuelType), Some("Flex"));
        assert_eq!(fields.get(CanonicalField::RegionCode), Some("MG"));
        // "Ano Modelo" の "Modelo" はモデル名として拾わない
        assert_eq!(fields.get(CanonicalField::Model), None);
        assert_eq!(fields.get(CanonicalField::Color), None);
    }

    #[test]
    fn test_table_rows_win_over_text() {
        let html = "<p>Marca: Texto</p><table><tr><td>Marca</td><td>Tabela</td></tr></table>";
        let fields = extract_generic(html);
        assert_eq!(fields.get(CanonicalField::Brand), Some("Tabela"));
    }

    fn config(sources: Vec<PatternSource>) -> ScraperConfig {
        ScraperConfig::new().with_pattern_sources(sources).without_delays()
    }

    #[tokio::test]
    async fn test_first_source_with_data_wins() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>nada</p>"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .and(query_param("placa", "ABC1D23"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<p>Modelo: ONIX</p>"))
            .mount(&server)
            .await;

        let extractor = PatternExtractor::new(config(vec![
            PatternSource::get("empty", format!("{}/empty", server.uri())),
            PatternSource::get("data", format!("{}/data", server.uri())),
        ]))
        .unwrap();

        let plate = Plate::parse("ABC1D23").unwrap();
        let extraction = extractor.extract(&plate).await.unwrap().unwrap();
        assert_eq!(extraction.confidence, Confidence::Medium);
        assert_eq!(extraction.source.as_deref(), Some("data"));
        assert_eq!(extraction.fields.get(CanonicalField::Model), Some("ONIX"));
    }

    #[tokio::test]
    async fn test_minimal_record_when_nothing_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let extractor = PatternExtractor::new(config(vec![
            PatternSource::post("broken", format!("{}/consulta", server.uri())),
            PatternSource::get("unreachable", "http://127.0.0.1:1/consulta"),
        ]))
        .unwrap();

        let plate = Plate::parse("ABC1D23").unwrap();
        let extraction = extractor.extract(&plate).await.unwrap().unwrap();
        assert_eq!(extraction.confidence, Confidence::Low);
        assert!(extraction.fields.is_empty());
        assert_eq!(extraction.plate_format, PlateFormat::Mercosul);
    }
}
