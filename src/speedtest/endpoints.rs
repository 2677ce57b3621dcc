//! Endpoint templates for probes and ping samples.
//!
//! A template may contain a `{bytes}` placeholder which is replaced by the
//! probe size when the endpoint is resolved.

use crate::errors::SpeedTestError;
use url::Url;

const BYTES_PLACEHOLDER: &str = "{bytes}";

/// httpbin serves at most 100 KiB from `stream-bytes`, so a probe that
/// falls back to it moves less than it asked for. Throughput is computed
/// from the bytes actually received, which keeps the reading honest.
const DOWNLOAD_ENDPOINTS: &[&str] = &[
    "https://speed.cloudflare.com/__down?bytes={bytes}",
    "https://httpbin.org/stream-bytes/{bytes}",
];

const UPLOAD_ENDPOINTS: &[&str] = &[
    "https://speed.cloudflare.com/__up",
    "https://httpbin.org/post",
    "https://postman-echo.com/post",
];

const PING_ENDPOINTS: &[&str] = &[
    "https://www.cloudflare.com/favicon.ico",
    "https://www.google.com/favicon.ico",
    "https://github.com/favicon.ico",
];

/// A remote endpoint, possibly parameterized by transfer size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    template: String,
}

impl Endpoint {
    /// Parse an endpoint template, rejecting anything that does not
    /// resolve to an http(s) URL.
    pub fn new(template: impl Into<String>) -> Result<Self, SpeedTestError> {
        let endpoint = Self { template: template.into() };
        let url = endpoint.resolve(0)?;

        match url.scheme() {
            "http" | "https" => Ok(endpoint),
            scheme => Err(SpeedTestError::config(format!(
                "unsupported scheme '{}' in endpoint {}",
                scheme, endpoint.template
            ))),
        }
    }

    /// Substitute the transfer size and parse the result.
    pub fn resolve(&self, bytes: u64) -> Result<Url, SpeedTestError> {
        let raw = self.template.replace(BYTES_PLACEHOLDER, &bytes.to_string());

        Url::parse(&raw).map_err(|e| {
            SpeedTestError::config(format!("invalid endpoint '{}': {}", raw, e))
                .with_source(e)
        })
    }

    /// Host name for log lines.
    pub fn host(&self) -> String {
        self.resolve(0)
            .ok()
            .and_then(|url| url.host_str().map(str::to_string))
            .unwrap_or_else(|| self.template.clone())
    }

    #[cfg(test)]
    pub fn template(&self) -> &str {
        &self.template
    }
}

fn builtin(templates: &[&str]) -> Vec<Endpoint> {
    templates
        .iter()
        .map(|template| Endpoint { template: (*template).to_string() })
        .collect()
}

pub fn default_download_endpoints() -> Vec<Endpoint> {
    builtin(DOWNLOAD_ENDPOINTS)
}

pub fn default_upload_endpoints() -> Vec<Endpoint> {
    builtin(UPLOAD_ENDPOINTS)
}

pub fn default_ping_endpoints() -> Vec<Endpoint> {
    builtin(PING_ENDPOINTS)
}
