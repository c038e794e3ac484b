//! Application configuration for tenderflow.
//!
//! User config lives at `~/.tenderflow/tenderflow.toml`.
//! Environment variables override config file values, which override defaults.
//! Credentials are never stored in the file, only the names of the env vars
//! that hold them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TenderflowError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "tenderflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".tenderflow";

/// Category keywords that make a tender irrelevant (French + English).
const DEFAULT_EXCLUDED_KEYWORDS: &[&str] = &[
    "construction",
    "installation",
    "recrutement",
    "travaux",
    "fourniture",
    "achat",
    "equipement",
    "maintenance",
    "works",
    "goods",
    "supply",
    "acquisition",
    "recruitment",
    "nettoyage",
    "gardiennage",
];

// ---------------------------------------------------------------------------
// Config structs (matching tenderflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tender portal settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Downstream webhook.
    #[serde(default)]
    pub sink: SinkConfig,

    /// Bundle download and landing zones.
    #[serde(default)]
    pub download: DownloadConfig,

    /// Text extraction tuning.
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Tender and file denylists.
    #[serde(default)]
    pub filters: FilterConfig,

    /// Run artifacts.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Portal login page.
    #[serde(default)]
    pub login_url: Option<String>,

    /// Portal advanced-search page.
    #[serde(default)]
    pub search_url: Option<String>,

    /// Name of the env var holding the portal username.
    #[serde(default = "default_username_env")]
    pub username_env: String,

    /// Name of the env var holding the portal password.
    #[serde(default = "default_password_env")]
    pub password_env: String,

    /// Results requested per search page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Attempts at connecting + listing before giving up.
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Fixed delay between connection attempts, in seconds.
    #[serde(default = "default_connect_backoff")]
    pub connect_backoff_secs: u64,

    /// Per-request (page readiness) timeout, in seconds.
    #[serde(default = "default_page_timeout")]
    pub page_timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            login_url: None,
            search_url: None,
            username_env: default_username_env(),
            password_env: default_password_env(),
            page_size: default_page_size(),
            connect_attempts: default_connect_attempts(),
            connect_backoff_secs: default_connect_backoff(),
            page_timeout_secs: default_page_timeout(),
        }
    }
}

fn default_username_env() -> String {
    "TENDERFLOW_USERNAME".into()
}
fn default_password_env() -> String {
    "TENDERFLOW_PASSWORD".into()
}
fn default_page_size() -> u32 {
    500
}
fn default_connect_attempts() -> u32 {
    3
}
fn default_connect_backoff() -> u64 {
    5
}
fn default_page_timeout() -> u64 {
    60
}

/// `[sink]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Webhook receiving one JSON record per tender. Disabled when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_sink_timeout")]
    pub timeout_secs: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: default_sink_timeout(),
        }
    }
}

fn default_sink_timeout() -> u64 {
    30
}

/// `[download]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory under which per-tender landing zones are created.
    #[serde(default = "default_landing_root")]
    pub landing_root: String,

    /// How long to wait for a completed bundle once the download has been
    /// triggered, in seconds.
    #[serde(default = "default_download_timeout")]
    pub timeout_secs: u64,

    /// Delay between two looks at the landing zone, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// File name suffixes marking a download still being written.
    #[serde(default = "default_partial_suffixes")]
    pub partial_suffixes: Vec<String>,

    /// File name prefixes marking a download still being written.
    #[serde(default = "default_partial_prefixes")]
    pub partial_prefixes: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            landing_root: default_landing_root(),
            timeout_secs: default_download_timeout(),
            poll_interval_ms: default_poll_interval(),
            partial_suffixes: default_partial_suffixes(),
            partial_prefixes: default_partial_prefixes(),
        }
    }
}

fn default_landing_root() -> String {
    "downloads_temp".into()
}
fn default_download_timeout() -> u64 {
    90
}
fn default_poll_interval() -> u64 {
    1000
}
fn default_partial_suffixes() -> Vec<String> {
    [".crdownload", ".part", ".partial", ".download", ".tmp"]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}
fn default_partial_prefixes() -> Vec<String> {
    [".com.google.Chrome", "."]
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

/// `[extraction]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Maximum PDF pages read (text layer and OCR alike).
    #[serde(default = "default_pdf_page_limit")]
    pub pdf_page_limit: u32,

    /// Below this many characters of text layer, a PDF is treated as scanned.
    #[serde(default = "default_ocr_min_text_chars")]
    pub ocr_min_text_chars: usize,

    /// Tesseract language set.
    #[serde(default = "default_ocr_languages")]
    pub ocr_languages: String,

    /// Rendering resolution for OCR.
    #[serde(default = "default_ocr_dpi")]
    pub ocr_dpi: u32,

    /// PDF rasterizer executable.
    #[serde(default = "default_pdftoppm_cmd")]
    pub pdftoppm_cmd: String,

    /// OCR executable.
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,

    /// Legacy `.doc` text dumper.
    #[serde(default = "default_antiword_cmd")]
    pub antiword_cmd: String,

    /// How many archive levels are expanded (1 = no nested expansion).
    #[serde(default = "default_max_archive_depth")]
    pub max_archive_depth: u32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            pdf_page_limit: default_pdf_page_limit(),
            ocr_min_text_chars: default_ocr_min_text_chars(),
            ocr_languages: default_ocr_languages(),
            ocr_dpi: default_ocr_dpi(),
            pdftoppm_cmd: default_pdftoppm_cmd(),
            tesseract_cmd: default_tesseract_cmd(),
            antiword_cmd: default_antiword_cmd(),
            max_archive_depth: default_max_archive_depth(),
        }
    }
}

fn default_pdf_page_limit() -> u32 {
    10
}
fn default_ocr_min_text_chars() -> usize {
    50
}
fn default_ocr_languages() -> String {
    "fra+ara+eng".into()
}
fn default_ocr_dpi() -> u32 {
    300
}
fn default_pdftoppm_cmd() -> String {
    "pdftoppm".into()
}
fn default_tesseract_cmd() -> String {
    "tesseract".into()
}
fn default_antiword_cmd() -> String {
    "antiword".into()
}
fn default_max_archive_depth() -> u32 {
    2
}

/// `[filters]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Tenders whose subject contains any of these are dropped before download.
    #[serde(default = "default_excluded_keywords")]
    pub excluded_keywords: Vec<String>,

    /// Bundle files whose name contains any of these are never extracted.
    #[serde(default = "default_file_denylist")]
    pub file_denylist: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            excluded_keywords: default_excluded_keywords(),
            file_denylist: default_file_denylist(),
        }
    }
}

fn default_excluded_keywords() -> Vec<String> {
    DEFAULT_EXCLUDED_KEYWORDS
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}
fn default_file_denylist() -> Vec<String> {
    vec!["cps".into()]
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// CSV summary written at the end of every run.
    #[serde(default = "default_summary_path")]
    pub summary_path: String,

    /// Also write a JSON dump next to the CSV.
    #[serde(default)]
    pub write_json: bool,

    /// Keep a copy of every raw bundle here (disabled when unset).
    #[serde(default)]
    pub archive_dir: Option<String>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            summary_path: default_summary_path(),
            write_json: false,
            archive_dir: None,
        }
    }
}

fn default_summary_path() -> String {
    "tender_results_summary.csv".into()
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Portal login, resolved from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Environment overrides
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the process env in production).
    ///
    /// The first name of each pair wins; the second is the name used by the
    /// older deployment scripts.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |names: &[&str]| -> Option<String> {
            names
                .iter()
                .filter_map(|name| lookup(name))
                .map(|v| v.trim().to_string())
                .find(|v| !v.is_empty())
        };

        if let Some(v) = get(&["TENDERFLOW_LOGIN_URL", "URL1"]) {
            self.source.login_url = Some(v);
        }
        if let Some(v) = get(&["TENDERFLOW_SEARCH_URL", "URL2"]) {
            self.source.search_url = Some(v);
        }
        if let Some(v) = get(&["TENDERFLOW_WEBHOOK_URL", "N8N_WEBHOOK_URL"]) {
            self.sink.webhook_url = Some(v);
        }
        if let Some(v) = get(&["TENDERFLOW_DOWNLOAD_TIMEOUT_SECS"]) {
            parse_into(&v, "TENDERFLOW_DOWNLOAD_TIMEOUT_SECS", &mut self.download.timeout_secs);
        }
        if let Some(v) = get(&["TENDERFLOW_PAGE_TIMEOUT_SECS"]) {
            parse_into(&v, "TENDERFLOW_PAGE_TIMEOUT_SECS", &mut self.source.page_timeout_secs);
        }
        if let Some(v) = get(&["TENDERFLOW_PDF_PAGE_LIMIT"]) {
            parse_into(&v, "TENDERFLOW_PDF_PAGE_LIMIT", &mut self.extraction.pdf_page_limit);
        }
        if let Some(v) = get(&["TENDERFLOW_OCR_LANGUAGES"]) {
            self.extraction.ocr_languages = v;
        }
        if let Some(v) = get(&["TENDERFLOW_EXCLUDED_KEYWORDS"]) {
            self.filters.excluded_keywords = split_list(&v);
        }
        if let Some(v) = get(&["TENDERFLOW_FILE_DENYLIST"]) {
            self.filters.file_denylist = split_list(&v);
        }
    }

    /// Resolve portal credentials from the environment.
    pub fn credentials(&self) -> Result<Credentials> {
        self.credentials_from(|key| std::env::var(key).ok())
    }

    /// Resolve portal credentials using `lookup`, falling back to the legacy
    /// `USERNAME` / `PASSWORD` variables.
    pub fn credentials_from(&self, lookup: impl Fn(&str) -> Option<String>) -> Result<Credentials> {
        let resolve = |primary: &str, legacy: &str| -> Result<String> {
            [primary, legacy]
                .iter()
                .filter_map(|name| lookup(name))
                .find(|v| !v.is_empty())
                .ok_or_else(|| {
                    TenderflowError::config(format!(
                        "portal credentials not found. Set the {primary} environment variable."
                    ))
                })
        };

        Ok(Credentials {
            username: resolve(&self.source.username_env, "USERNAME")?,
            password: resolve(&self.source.password_env, "PASSWORD")?,
        })
    }

    /// Copy of the config safe to print: webhook paths often embed secrets.
    pub fn redacted(&self) -> AppConfig {
        let mut copy = self.clone();
        if let Some(raw) = &self.sink.webhook_url {
            copy.sink.webhook_url = Some(match url::Url::parse(raw) {
                Ok(u) => format!("{}://{}/***", u.scheme(), u.host_str().unwrap_or("?")),
                Err(_) => "***".into(),
            });
        }
        copy
    }
}

fn parse_into<T: std::str::FromStr>(raw: &str, name: &str, slot: &mut T) {
    match raw.parse::<T>() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(var = name, value = raw, "ignoring unparsable env override"),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.tenderflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| TenderflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.tenderflow/tenderflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| TenderflowError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        TenderflowError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| TenderflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| TenderflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| TenderflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that portal credentials are present in the environment.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    config.credentials().map(|_| ())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("pdf_page_limit"));
        assert!(toml_str.contains("TENDERFLOW_PASSWORD"));
        assert!(toml_str.contains("gardiennage"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.extraction.pdf_page_limit, 10);
        assert_eq!(parsed.extraction.ocr_min_text_chars, 50);
        assert_eq!(parsed.download.timeout_secs, 90);
        assert_eq!(parsed.filters.file_denylist, vec!["cps".to_string()]);
    }

    #[test]
    fn partial_file_sections() {
        let toml_str = r#"
[extraction]
pdf_page_limit = 15

[filters]
excluded_keywords = ["travaux"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.extraction.pdf_page_limit, 15);
        assert_eq!(config.extraction.ocr_languages, "fra+ara+eng");
        assert_eq!(config.filters.excluded_keywords, vec!["travaux".to_string()]);
        assert_eq!(config.filters.file_denylist, vec!["cps".to_string()]);
    }

    #[test]
    fn env_overrides_prefer_new_names() {
        let vars = env(&[
            ("URL1", "https://legacy.example/login"),
            ("TENDERFLOW_LOGIN_URL", "https://portal.example/login"),
            ("URL2", "https://portal.example/search"),
            ("N8N_WEBHOOK_URL", "https://hooks.example/abc"),
            ("TENDERFLOW_PDF_PAGE_LIMIT", "15"),
            ("TENDERFLOW_DOWNLOAD_TIMEOUT_SECS", "not-a-number"),
            ("TENDERFLOW_EXCLUDED_KEYWORDS", "travaux, achat ,,"),
        ]);

        let mut config = AppConfig::default();
        config.apply_overrides_from(|k| vars.get(k).cloned());

        assert_eq!(config.source.login_url.as_deref(), Some("https://portal.example/login"));
        assert_eq!(config.source.search_url.as_deref(), Some("https://portal.example/search"));
        assert_eq!(config.sink.webhook_url.as_deref(), Some("https://hooks.example/abc"));
        assert_eq!(config.extraction.pdf_page_limit, 15);
        assert_eq!(config.download.timeout_secs, 90);
        assert_eq!(config.filters.excluded_keywords, vec!["travaux", "achat"]);
    }

    #[test]
    fn credentials_fall_back_to_legacy_names() {
        let vars = env(&[("USERNAME", "alice"), ("TENDERFLOW_PASSWORD", "s3cret")]);
        let config = AppConfig::default();
        let creds = config.credentials_from(|k| vars.get(k).cloned()).unwrap();
        assert_eq!(creds.username, "alice");
        assert_eq!(creds.password, "s3cret");
        assert!(!format!("{creds:?}").contains("s3cret"));
    }

    #[test]
    fn missing_credentials_name_the_variable() {
        let config = AppConfig::default();
        let err = config.credentials_from(|_| None).unwrap_err();
        assert!(err.to_string().contains("TENDERFLOW_USERNAME"));
    }

    #[test]
    fn redacted_hides_webhook_path() {
        let mut config = AppConfig::default();
        config.sink.webhook_url = Some("https://hooks.example/webhook/8f2c-secret".into());
        let shown = config.redacted();
        assert_eq!(shown.sink.webhook_url.as_deref(), Some("https://hooks.example/***"));
    }
}
