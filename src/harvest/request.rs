//! Request templates
//!
//! Listing and document requests are configured as templates with
//! placeholders that are filled in per page or per unit:
//!
//! | Placeholder | Value |
//! |-------------|-------|
//! | `{page}` | 1-indexed page number |
//! | `{page_size}` | records per page |
//! | `{offset}` | `(page - 1) * page_size` |
//! | `{id}` | unit identifier (document requests only) |
//!
//! Braces that do not enclose a bare lowercase name are copied verbatim, so
//! JSON bodies need no escaping.

use crate::config::RequestTemplate;
use crate::fetch::FetchRequest;
use thiserror::Error;

/// Errors produced while expanding a template
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),

    #[error("placeholder {{{0}}} has no value here")]
    MissingValue(String),
}

/// Values available to a template
#[derive(Debug, Clone, Copy)]
pub struct TemplateVars<'a> {
    pub page: u32,
    pub page_size: u32,
    pub id: Option<&'a str>,
}

impl TemplateVars<'_> {
    fn lookup(&self, name: &str) -> Result<String, TemplateError> {
        match name {
            "page" => Ok(self.page.to_string()),
            "page_size" => Ok(self.page_size.to_string()),
            "offset" => {
                let offset = u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size);
                Ok(offset.to_string())
            }
            "id" => self
                .id
                .map(str::to_string)
                .ok_or_else(|| TemplateError::MissingValue(name.to_string())),
            _ => Err(TemplateError::UnknownPlaceholder(name.to_string())),
        }
    }
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c == '_')
}

/// Expands every `{name}` placeholder in `text`
pub fn render(text: &str, vars: &TemplateVars<'_>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];

        match after.find('}') {
            Some(close) if is_placeholder_name(&after[..close]) => {
                out.push_str(&vars.lookup(&after[..close])?);
                rest = &after[close + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);

    Ok(out)
}

impl RequestTemplate {
    /// Builds a concrete request for one page or unit
    pub fn build(&self, vars: &TemplateVars<'_>) -> Result<FetchRequest, TemplateError> {
        let headers = self
            .headers
            .iter()
            .map(|(name, value)| Ok((name.clone(), render(value, vars)?)))
            .collect::<Result<Vec<_>, TemplateError>>()?;

        let body = self
            .body
            .as_deref()
            .map(|body| render(body, vars))
            .transpose()?;

        Ok(FetchRequest {
            url: render(&self.url, vars)?,
            method: self.method,
            headers,
            body,
            render: self.render,
        })
    }
}
