use crate::config::types::{
    Backend, ClientConfig, Config, DocumentConfig, HarvestConfig, OutputConfig, ParserConfig,
    RequestTemplate, RetryConfig,
};
use crate::fetch::HttpMethod;
use crate::harvest::TemplateVars;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_harvest_config(&config.harvest)?;
    validate_retry_config(&config.retry)?;
    validate_client_config(&config.client)?;
    validate_output_config(&config.output)?;
    validate_request_template(&config.listing.request, "listing", false, config.harvest.page_size)?;
    validate_parser_config(&config.listing.parser)?;
    validate_rendering(&config.listing.request, "listing", &config.client)?;
    if let Some(document) = &config.document {
        validate_document_config(document, &config.output, config.harvest.page_size)?;
        validate_rendering(&document.request, "document", &config.client)?;
    }
    Ok(())
}

/// Validates pagination and concurrency settings
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency must be between 1 and 64, got {}",
            config.concurrency
        )));
    }

    if config.start_page < 1 {
        return Err(ConfigError::Validation(
            "start-page must be >= 1 (pages are 1-indexed)".to_string(),
        ));
    }

    if let Some(end_page) = config.end_page {
        if end_page < config.start_page {
            return Err(ConfigError::Validation(format!(
                "end-page ({}) must not be before start-page ({})",
                end_page, config.start_page
            )));
        }
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation(format!(
            "page-size must be >= 1, got {}",
            config.page_size
        )));
    }

    if config.max_records == Some(0) {
        return Err(ConfigError::Validation(
            "max-records must be >= 1 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 20 {
        return Err(ConfigError::Validation(format!(
            "max-attempts must be between 1 and 20, got {}",
            config.max_attempts
        )));
    }

    if config.base_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "base-delay-ms ({}) must not exceed max-delay-ms ({})",
            config.base_delay_ms, config.max_delay_ms
        )));
    }

    Ok(())
}

/// Validates HTTP client configuration
fn validate_client_config(config: &ClientConfig) -> Result<(), ConfigError> {
    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.timeout_secs < 1 || config.connect_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout-secs and connect-timeout-secs must be >= 1".to_string(),
        ));
    }

    if let Some(var) = &config.api_key_env {
        if var.trim().is_empty() {
            return Err(ConfigError::Validation(
                "api-key-env cannot be empty when set".to_string(),
            ));
        }
    }

    if config.backend == Backend::ExtractApi {
        let endpoint = config.extract_endpoint.as_deref().ok_or_else(|| {
            ConfigError::Validation(
                "extract-endpoint is required for the extract-api backend".to_string(),
            )
        })?;
        validate_http_url(endpoint, "extract-endpoint")?;

        if config.api_key_env.is_none() {
            return Err(ConfigError::Validation(
                "api-key-env is required for the extract-api backend".to_string(),
            ));
        }
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.progress_path.is_empty() {
        return Err(ConfigError::Validation(
            "progress-path cannot be empty".to_string(),
        ));
    }

    if config.output_path.is_empty() {
        return Err(ConfigError::Validation(
            "output-path cannot be empty".to_string(),
        ));
    }

    if config.progress_path == config.output_path {
        return Err(ConfigError::Validation(
            "progress-path and output-path must differ".to_string(),
        ));
    }

    if config.columns.is_empty() {
        return Err(ConfigError::Validation(
            "output columns cannot be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for column in &config.columns {
        if column.is_empty() {
            return Err(ConfigError::Validation(
                "output column names cannot be empty".to_string(),
            ));
        }
        if !seen.insert(column.as_str()) {
            return Err(ConfigError::Validation(format!(
                "duplicate output column '{}'",
                column
            )));
        }
    }

    Ok(())
}

/// Expands a request template with sample values and checks the resulting URL
fn validate_request_template(
    template: &RequestTemplate,
    name: &str,
    has_unit: bool,
    page_size: u32,
) -> Result<(), ConfigError> {
    let vars = TemplateVars {
        page: 1,
        page_size,
        id: has_unit.then_some("0"),
    };

    let request = template
        .build(&vars)
        .map_err(|e| ConfigError::Validation(format!("{} request: {}", name, e)))?;

    validate_http_url(&request.url, &format!("{} request url", name))
}

fn validate_http_url(raw: &str, what: &str) -> Result<(), ConfigError> {
    let url = Url::parse(raw)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", what, raw, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            what, raw
        )));
    }

    Ok(())
}

/// Validates listing parser settings
fn validate_parser_config(config: &ParserConfig) -> Result<(), ConfigError> {
    match config {
        ParserConfig::Json {
            records_pointer,
            id_field,
            total_pointer,
        } => {
            validate_json_pointer(records_pointer)?;
            if let Some(pointer) = total_pointer {
                validate_json_pointer(pointer)?;
            }
            if id_field.is_empty() {
                return Err(ConfigError::Validation(
                    "id-field cannot be empty".to_string(),
                ));
            }
        }
        ParserConfig::HtmlTable {
            row_selector,
            columns,
            id_column,
        } => {
            scraper::Selector::parse(row_selector).map_err(|e| {
                ConfigError::InvalidSelector(format!("'{}': {:?}", row_selector, e))
            })?;
            if columns.is_empty() {
                return Err(ConfigError::Validation(
                    "html-table parser needs at least one column".to_string(),
                ));
            }
            if !columns.contains(id_column) {
                return Err(ConfigError::Validation(format!(
                    "id-column '{}' is not one of the table columns",
                    id_column
                )));
            }
        }
    }
    Ok(())
}

/// JSON pointers are either empty (whole document) or start with '/'
fn validate_json_pointer(pointer: &str) -> Result<(), ConfigError> {
    if !pointer.is_empty() && !pointer.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "JSON pointer '{}' must be empty or start with '/'",
            pointer
        )));
    }
    Ok(())
}

fn validate_document_config(
    config: &DocumentConfig,
    output: &OutputConfig,
    page_size: u32,
) -> Result<(), ConfigError> {
    validate_request_template(&config.request, "document", true, page_size)?;

    if !output.columns.contains(&config.column) {
        return Err(ConfigError::Validation(format!(
            "document column '{}' is not one of the output columns",
            config.column
        )));
    }

    if let Some(dir) = &config.save_dir {
        if dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "save-dir cannot be empty when set".to_string(),
            ));
        }
    }

    if let Some(extension) = &config.file_extension {
        if config.save_dir.is_none() {
            return Err(ConfigError::Validation(
                "file-extension requires save-dir".to_string(),
            ));
        }
        if extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::Validation(format!(
                "file-extension '{}' must be alphanumeric, without the dot",
                extension
            )));
        }
    }

    Ok(())
}

/// Rendered requests go through the extraction API as plain GETs
fn validate_rendering(
    template: &RequestTemplate,
    name: &str,
    client: &ClientConfig,
) -> Result<(), ConfigError> {
    if !template.render {
        return Ok(());
    }

    if client.backend != Backend::ExtractApi {
        return Err(ConfigError::Validation(format!(
            "{} request: render needs the extract-api backend",
            name
        )));
    }

    let plain_get =
        template.method == HttpMethod::Get && template.body.is_none() && template.headers.is_empty();
    if !plain_get {
        return Err(ConfigError::Validation(format!(
            "{} request: render supports only GET requests without body or headers",
            name
        )));
    }

    Ok(())
}
