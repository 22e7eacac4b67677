use crate::fetch::HttpMethod;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Page-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub client: ClientConfig,
    pub output: OutputConfig,
    pub listing: ListingConfig,
    /// Per-unit document request; when absent every listing record is a result row
    #[serde(default)]
    pub document: Option<DocumentConfig>,
}

/// Pagination and concurrency settings
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Maximum number of document fetches in flight within one page
    pub concurrency: u32,

    /// First page to process (pages are 1-indexed)
    #[serde(rename = "start-page", default = "default_start_page")]
    pub start_page: u32,

    /// Last page to process; unbounded when absent
    #[serde(rename = "end-page", default)]
    pub end_page: Option<u32>,

    /// Records requested per listing page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Consecutive failed pages tolerated before the run halts
    #[serde(
        rename = "max-consecutive-page-failures",
        default = "default_max_consecutive_page_failures"
    )]
    pub max_consecutive_page_failures: u32,

    /// Stop once the progress file records this many completed units
    #[serde(rename = "max-records", default)]
    pub max_records: Option<u64>,
}

/// Retry policy for transient fetch failures
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per page or unit, including the first one
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(rename = "base-delay-ms", default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(rename = "max-delay-ms", default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Which transport carries the requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    /// Requests go straight to the target site
    #[default]
    Http,
    /// Requests are wrapped in jobs for a third-party extraction API
    ExtractApi,
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub backend: Backend,

    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Whole-request timeout (seconds)
    #[serde(rename = "timeout-secs", default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Extraction API endpoint, required for the `extract-api` backend
    #[serde(rename = "extract-endpoint", default)]
    pub extract_endpoint: Option<String>,

    /// Name of the environment variable holding the API key
    #[serde(rename = "api-key-env", default)]
    pub api_key_env: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            extract_endpoint: None,
            api_key_env: None,
        }
    }
}

/// Output dataset format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Jsonl,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the JSON progress checkpoint
    #[serde(rename = "progress-path")]
    pub progress_path: String,

    /// Path to the append-only output dataset
    #[serde(rename = "output-path")]
    pub output_path: String,

    #[serde(default)]
    pub format: OutputFormat,

    /// Column order of the output dataset, fixed when the file is created
    pub columns: Vec<String>,
}

/// A request with `{page}`, `{page_size}`, `{offset}` and `{id}` placeholders
#[derive(Debug, Clone, Deserialize)]
pub struct RequestTemplate {
    pub url: String,

    #[serde(default)]
    pub method: HttpMethod,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Option<String>,

    /// Ask the extraction API for the browser-rendered HTML instead of the raw body
    #[serde(default)]
    pub render: bool,
}

/// Listing page request and how to read its records
#[derive(Debug, Clone, Deserialize)]
pub struct ListingConfig {
    pub request: RequestTemplate,
    pub parser: ParserConfig,
}

/// How a listing payload is turned into work units
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ParserConfig {
    /// JSON payload with an array of record objects
    Json {
        /// JSON pointer to the records array (e.g. "/data/data")
        #[serde(rename = "records-pointer")]
        records_pointer: String,

        /// Record field holding the unit identifier
        #[serde(rename = "id-field")]
        id_field: String,

        /// JSON pointer to the total record count, if the listing reports one
        #[serde(rename = "total-pointer", default)]
        total_pointer: Option<String>,
    },

    /// HTML payload where each table row is a record
    HtmlTable {
        /// CSS selector matching the record rows
        #[serde(rename = "row-selector")]
        row_selector: String,

        /// Names given to the row's cells, in cell order
        columns: Vec<String>,

        /// Column holding the unit identifier
        #[serde(rename = "id-column")]
        id_column: String,
    },
}

/// Per-unit document request
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentConfig {
    pub request: RequestTemplate,

    /// Output column that receives the document body, or its file path
    /// when `save-dir` is set
    #[serde(default = "default_document_column")]
    pub column: String,

    /// Directory for documents saved as files (binary payloads such as PDFs)
    #[serde(rename = "save-dir", default)]
    pub save_dir: Option<String>,

    /// Extension appended to saved file names, without the dot
    #[serde(rename = "file-extension", default)]
    pub file_extension: Option<String>,
}

fn default_start_page() -> u32 {
    1
}

fn default_page_size() -> u32 {
    10
}

fn default_max_consecutive_page_failures() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    format!("page-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_document_column() -> String {
    "document".to_string()
}
