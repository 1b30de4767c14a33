use std::{
    fmt,
    net::{SocketAddr, ToSocketAddrs},
    path::Path,
};

use http::Uri;

use crate::TilecacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Loading continues; the issue is logged.
    Warning,
    /// Loading fails.
    Error,
}

/// One finding, tagged with the config section it belongs to.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub section: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.section, self.message)
    }
}

/// Validation output for a loaded configuration.
#[derive(Debug, Default)]
pub struct ConfigReport {
    issues: Vec<ConfigIssue>,
}

impl ConfigReport {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ConfigIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
    }

    /// One line per issue, errors first.
    pub fn format(&self) -> String {
        let mut out = String::new();
        for severity in [Severity::Error, Severity::Warning] {
            let label = match severity {
                Severity::Error => "error",
                Severity::Warning => "warning",
            };
            for issue in self.issues.iter().filter(|i| i.severity == severity) {
                out.push_str(&format!("{label}: {issue}\n"));
            }
        }
        out
    }

    fn warn(&mut self, section: &'static str, message: impl Into<String>) {
        self.push(Severity::Warning, section, message.into());
    }

    fn error(&mut self, section: &'static str, message: impl Into<String>) {
        self.push(Severity::Error, section, message.into());
    }

    fn push(&mut self, severity: Severity, section: &'static str, message: String) {
        self.issues.push(ConfigIssue {
            severity,
            section,
            message,
        });
    }
}

/// Validate a configuration and return a report of issues.
pub fn validate(cfg: &TilecacheConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    validate_server(cfg, &mut report);
    validate_upstream(cfg, &mut report);
    validate_cache(cfg, &mut report);

    report
}

fn validate_server(cfg: &TilecacheConfig, report: &mut ConfigReport) {
    let listen = cfg.server.listen.trim();
    if listen.parse::<SocketAddr>().is_ok() {
        return;
    }
    match listen
        .to_socket_addrs()
        .map(|mut addrs| addrs.next().is_some())
    {
        Ok(true) => {}
        Ok(false) => report.error(
            "server",
            format!("listen '{listen}' resolves to no address"),
        ),
        Err(e) => report.error(
            "server",
            format!("listen '{listen}' is not a usable host:port ({e})"),
        ),
    }
}

fn validate_upstream(cfg: &TilecacheConfig, report: &mut ConfigReport) {
    let url = cfg.upstream.url.trim();
    match url.parse::<Uri>() {
        Ok(uri) => {
            if !matches!(uri.scheme_str(), Some("http") | Some("https")) {
                report.error(
                    "upstream",
                    format!("url '{url}' must use http or https"),
                );
            }
            if uri.authority().is_none() {
                report.error("upstream", format!("url '{url}' has no host"));
            }
        }
        Err(e) => report.error("upstream", format!("url '{url}' is not a valid URL: {e}")),
    }

    if cfg.upstream.api_keys.is_empty() {
        report.warn(
            "upstream",
            "api_keys is empty; requests are forwarded without a key",
        );
    } else if cfg.upstream.key_param.trim().is_empty() {
        report.error("upstream", "key_param is empty but api keys are configured");
    }
}

fn validate_cache(cfg: &TilecacheConfig, report: &mut ConfigReport) {
    let Some(dir) = cfg.cache.dir() else {
        report.warn("cache", "dir is empty; responses are cached in memory only");
        return;
    };

    let path = Path::new(dir);
    if path.exists() {
        if !path.is_dir() {
            report.error(
                "cache",
                format!("dir '{dir}' exists but is not a directory"),
            );
        }
    } else {
        report.warn(
            "cache",
            format!("dir '{dir}' does not exist; it will be created at startup"),
        );
    }
}
