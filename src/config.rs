use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

use crate::job::PacingSchedule;
use crate::orchestrator::{Preference, Strategy};

const DEFAULT_BASE_URL: &str = "https://placafipe.com";
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// パターン抽出で巡回する取得元のリクエスト方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMethod {
    Get,
    Post,
}

/// パターン抽出の取得元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternSource {
    pub name: String,
    pub url: String,
    pub method: SourceMethod,
    /// プレートを載せるパラメータ名
    pub plate_param: String,
}

impl PatternSource {
    pub fn get(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            method: SourceMethod::Get,
            plate_param: "placa".to_string(),
        }
    }

    pub fn post(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: SourceMethod::Post,
            ..Self::get(name, url)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScraperConfig {
    /// 照会元サイトのベースURL（末尾スラッシュなし）
    pub base_url: String,
    pub headless: bool,
    /// ブラウザでの要素待機タイムアウト
    pub timeout: Duration,
    /// HTTPリクエストのタイムアウト
    pub request_timeout: Duration,
    pub user_agent: String,
    /// 未指定なら CHROME_PATH / CHROMIUM_PATH 環境変数、最後に "chromium"
    pub chrome_path: Option<PathBuf>,
    /// デバッグモード（結果なし時にスクリーンショットをログ出力）
    pub debug: bool,
    /// 初期化を試みる戦略
    pub strategies: Vec<Strategy>,
    pub preference: Preference,
    /// 直接HTTPで試すPOST先パス（順番に試行）
    pub endpoint_paths: Vec<String>,
    /// レスポンス本文にこれらが含まれれば「データなし」
    pub failure_markers: Vec<String>,
    /// セッション確立GET後のランダム待機（ミリ秒）
    pub warmup_delay_ms: RangeInclusive<u64>,
    pub pattern_sources: Vec<PatternSource>,
    /// パターン抽出の取得元間のランダム待機（ミリ秒）
    pub source_delay_ms: RangeInclusive<u64>,
    pub pacing: PacingSchedule,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            headless: true,
            timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            chrome_path: None,
            debug: false,
            strategies: vec![Strategy::Http, Strategy::Pattern, Strategy::Browser],
            preference: Preference::Auto,
            endpoint_paths: ["/consulta", "/buscar", "/", "/index.php"]
                .into_iter()
                .map(String::from)
                .collect(),
            failure_markers: ["não encontrada", "nao encontrada", "not found", "erro na consulta"]
                .into_iter()
                .map(String::from)
                .collect(),
            warmup_delay_ms: 1000..=3000,
            pattern_sources: vec![
                PatternSource::get("Placa FIPE", format!("{}/consulta", DEFAULT_BASE_URL)),
                PatternSource::get(
                    "Detran SP",
                    "https://www.detran.sp.gov.br/veiculos/consultas/consulta-veiculo",
                ),
            ],
            source_delay_ms: 2000..=5000,
            pacing: PacingSchedule::default(),
        }
    }
}

impl ScraperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_strategies(mut self, strategies: impl IntoIterator<Item = Strategy>) -> Self {
        self.strategies = strategies.into_iter().collect();
        self
    }

    pub fn with_preference(mut self, preference: Preference) -> Self {
        self.preference = preference;
        self
    }

    pub fn with_endpoint_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.endpoint_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pattern_sources(mut self, sources: Vec<PatternSource>) -> Self {
        self.pattern_sources = sources;
        self
    }

    /// ランダム待機をすべて無効化（テスト・ローカル検証用）
    pub fn without_delays(mut self) -> Self {
        self.warmup_delay_ms = 0..=0;
        self.source_delay_ms = 0..=0;
        self
    }

    pub fn with_pacing(mut self, pacing: PacingSchedule) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn endpoint_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}
