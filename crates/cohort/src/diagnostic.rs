//! Endpoint diagnostic.
//!
//! Probes a list of API endpoints one after another, in the configured
//! order, and reports how each answered. Probes never overlap, so the
//! timings in a report are not skewed by one another.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use reqwest::redirect::Policy;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;

/// HTTP method used to probe an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    /// Full request.
    #[default]
    Get,
    /// Headers only.
    Head,
}

impl std::fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Head => write!(f, "HEAD"),
        }
    }
}

/// One endpoint to probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointCheck {
    /// Label shown in reports.
    pub name: String,
    /// Path relative to the API base URL, starting with `/`.
    pub path: String,
    /// Request method, GET unless configured.
    #[serde(default)]
    pub method: ProbeMethod,
}

impl EndpointCheck {
    /// Describe an endpoint probe.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>, method: ProbeMethod) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            method,
        }
    }
}

/// How a probe ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// 2xx response.
    Ok,
    /// 4xx response.
    ClientError,
    /// 5xx response.
    ServerError,
    /// Any other status code.
    Unexpected,
    /// No response within the timeout.
    Timeout,
    /// Connection failed.
    Unreachable,
    /// Not probed because an earlier probe failed.
    Skipped,
}

impl Outcome {
    /// Categorize an HTTP status code.
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Ok,
            400..=499 => Self::ClientError,
            500..=599 => Self::ServerError,
            _ => Self::Unexpected,
        }
    }

    /// Only [`Outcome::Ok`] passes.
    #[must_use]
    pub fn is_pass(self) -> bool {
        self == Self::Ok
    }

    fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::ClientError => "CLIENT ERROR",
            Self::ServerError => "SERVER ERROR",
            Self::Unexpected => "UNEXPECTED",
            Self::Timeout => "TIMEOUT",
            Self::Unreachable => "UNREACHABLE",
            Self::Skipped => "SKIPPED",
        }
    }
}

/// Result of probing one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResult {
    /// Endpoint label.
    pub name: String,
    /// Method used.
    pub method: ProbeMethod,
    /// Full URL probed.
    pub url: String,
    /// How the probe ended.
    pub outcome: Outcome,
    /// HTTP status, when a response arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Time until the response or error.
    pub elapsed_ms: u64,
    /// Transport error message, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregated results of a diagnostic run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    /// API base URL the paths were appended to.
    pub base_url: String,
    /// Results in probe order.
    pub results: Vec<CheckResult>,
    /// Probes that passed.
    pub passed: usize,
    /// Probes that ran and did not pass.
    pub failed: usize,
    /// Probes not run because of `stop_on_failure`.
    pub skipped: usize,
    /// Wall time of the whole run.
    pub total_ms: u64,
}

impl DiagnosticReport {
    /// Whether every probe that ran passed.
    #[must_use]
    pub fn healthy(&self) -> bool {
        self.failed == 0
    }

    /// Render the report as an aligned plain-text table.
    #[must_use]
    pub fn render_text(&self) -> String {
        let width = self
            .results
            .iter()
            .map(|r| r.name.len())
            .max()
            .unwrap_or(0)
            .max("ENDPOINT".len());

        let mut out = String::new();
        let _ = writeln!(out, "Diagnostic for {}", self.base_url);
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:<width$}  {:<6} {:<13} {:>6} {:>9}",
            "ENDPOINT", "METHOD", "RESULT", "STATUS", "TIME"
        );
        for r in &self.results {
            let status = r.status.map_or_else(|| "-".to_string(), |s| s.to_string());
            let time = if r.outcome == Outcome::Skipped {
                "-".to_string()
            } else {
                format!("{}ms", r.elapsed_ms)
            };
            let _ = writeln!(
                out,
                "{:<width$}  {:<6} {:<13} {:>6} {:>9}",
                r.name,
                r.method.to_string(),
                r.outcome.label(),
                status,
                time
            );
            if let Some(detail) = &r.detail {
                let _ = writeln!(out, "{:<width$}  -> {detail}", "");
            }
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} passed, {} failed, {} skipped in {}ms: {}",
            self.passed,
            self.failed,
            self.skipped,
            self.total_ms,
            if self.healthy() { "HEALTHY" } else { "UNHEALTHY" }
        );
        out
    }
}

/// Sequential endpoint prober.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    http: reqwest::Client,
    base_url: String,
    stop_on_failure: bool,
}

impl Diagnostic {
    /// Create a prober for `base_url`.
    ///
    /// Redirects are not followed, so a 3xx answer is reported as
    /// [`Outcome::Unexpected`].
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration, stop_on_failure: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(Policy::none())
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            stop_on_failure,
        })
    }

    /// Create a prober from configuration, optionally overriding the API URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &Config, url: Option<&str>) -> Result<Self> {
        Self::new(
            url.unwrap_or(&config.client.api_url),
            config.diagnostic_timeout(),
            config.diagnostic.stop_on_failure,
        )
    }

    /// Probe every check in order.
    pub async fn run(&self, checks: &[EndpointCheck]) -> DiagnosticReport {
        let started = Instant::now();
        let mut results = Vec::with_capacity(checks.len());
        let mut stopped = false;

        for check in checks {
            if stopped {
                results.push(self.skipped(check));
                continue;
            }
            let result = self.probe(check).await;
            if !result.outcome.is_pass() {
                warn!(
                    endpoint = %check.name,
                    outcome = ?result.outcome,
                    "Endpoint check failed"
                );
                stopped = self.stop_on_failure;
            }
            results.push(result);
        }

        let passed = results.iter().filter(|r| r.outcome.is_pass()).count();
        let skipped = results
            .iter()
            .filter(|r| r.outcome == Outcome::Skipped)
            .count();
        let report = DiagnosticReport {
            base_url: self.base_url.clone(),
            failed: results.len() - passed - skipped,
            passed,
            skipped,
            results,
            total_ms: millis(started.elapsed()),
        };
        info!(
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            "Diagnostic finished"
        );
        report
    }

    async fn probe(&self, check: &EndpointCheck) -> CheckResult {
        let url = format!("{}{}", self.base_url, check.path);
        let request = match check.method {
            ProbeMethod::Get => self.http.get(&url),
            ProbeMethod::Head => self.http.head(&url),
        };

        let started = Instant::now();
        let response = request.send().await;
        let elapsed_ms = millis(started.elapsed());

        let (outcome, status, detail) = match response {
            Ok(response) => {
                let status = response.status().as_u16();
                (Outcome::from_status(status), Some(status), None)
            }
            Err(e) if e.is_timeout() => (Outcome::Timeout, None, Some(e.to_string())),
            Err(e) => (Outcome::Unreachable, None, Some(e.to_string())),
        };
        debug!(endpoint = %check.name, %url, ?outcome, elapsed_ms, "Probed endpoint");

        CheckResult {
            name: check.name.clone(),
            method: check.method,
            url,
            outcome,
            status,
            elapsed_ms,
            detail,
        }
    }

    fn skipped(&self, check: &EndpointCheck) -> CheckResult {
        CheckResult {
            name: check.name.clone(),
            method: check.method,
            url: format!("{}{}", self.base_url, check.path),
            outcome: Outcome::Skipped,
            status: None,
            elapsed_ms: 0,
            detail: None,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
