//! Reporter configuration and the ignore rules compiled from it.

use crate::{ReporterError, ReporterResult};
use exception_outbox::{SenderConfig, WorkerConfig};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default endpoint base URL.
pub const DEFAULT_URL: &str = "http://localhost:8086";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Environment variable prefix for overrides.
const ENV_PREFIX: &str = "EXCEPTION_REPORTER_";

/// Reporter configuration.
///
/// Read-only once a [`Reporter`](crate::Reporter) is built from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// API key sent with every batch.
    pub api_key: String,
    /// Application identifier; with `environment` it names the target database.
    pub application_id: String,
    /// Human-readable application name written into event context.
    pub application_name: String,
    /// Current runtime environment (e.g. "production").
    pub environment: String,
    /// Endpoint base URL.
    pub url: String,
    /// Environments in which nothing is reported.
    pub ignored_environments: Vec<String>,
    /// Error type names that are never reported.
    pub ignored_exceptions: Vec<String>,
    /// Message patterns (regular expressions) that are never reported.
    pub ignored_exception_messages: Vec<String>,
    /// Maximum queued events before the oldest is evicted.
    pub queue_capacity: usize,
    /// Maximum events per transmission.
    pub max_batch: usize,
    /// Worker poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// HTTP request timeout in milliseconds.
    pub http_timeout_ms: u64,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            application_id: String::new(),
            application_name: "application".to_string(),
            environment: "development".to_string(),
            url: DEFAULT_URL.to_string(),
            ignored_environments: vec![
                "test".to_string(),
                "cucumber".to_string(),
                "selenium".to_string(),
            ],
            ignored_exceptions: Vec::new(),
            ignored_exception_messages: Vec::new(),
            queue_capacity: exception_outbox::DEFAULT_QUEUE_CAPACITY,
            max_batch: exception_outbox::DEFAULT_MAX_BATCH,
            poll_interval_ms: exception_outbox::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            http_timeout_ms: exception_outbox::DEFAULT_TIMEOUT.as_millis() as u64,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl Configuration {
    /// Defaults overridden from the process environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load configuration from a JSON file. Missing keys keep their defaults.
    pub fn load_from_file(path: &Path) -> ReporterResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Configuration = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> ReporterResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Override fields from `EXCEPTION_REPORTER_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Override fields from any variable lookup. Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let read = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}")).filter(|value| !value.trim().is_empty())
        };

        if let Some(value) = read("API_KEY") {
            self.api_key = value;
        }
        if let Some(value) = read("APPLICATION_ID") {
            self.application_id = value;
        }
        if let Some(value) = read("APPLICATION_NAME") {
            self.application_name = value;
        }
        if let Some(value) = read("ENV") {
            self.environment = value;
        }
        if let Some(value) = read("URL") {
            self.url = value;
        }
        if let Some(value) = read("LOG_LEVEL") {
            self.log_level = value;
        }
    }

    /// True when the current environment is in the ignore list.
    pub fn ignore_current_environment(&self) -> bool {
        self.ignored_environments
            .iter()
            .any(|env| env == &self.environment)
    }

    /// Database the points are written to.
    pub fn database(&self) -> String {
        format!("{}{}", self.application_id, self.environment)
    }

    /// Check the fields needed to reach the HTTP endpoint.
    pub fn validate_transport(&self) -> ReporterResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(ReporterError::Config("api_key is required".to_string()));
        }
        if self.application_id.trim().is_empty() {
            return Err(ReporterError::Config(
                "application_id is required".to_string(),
            ));
        }
        if self.url.trim().is_empty() {
            return Err(ReporterError::Config("url is required".to_string()));
        }
        Ok(())
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            base_url: self.url.clone(),
            database: self.database(),
            api_key: self.api_key.clone(),
            timeout: Duration::from_millis(self.http_timeout_ms.max(1)),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            max_batch: self.max_batch.max(1),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(10)),
        }
    }

    pub fn effective_queue_capacity(&self) -> usize {
        self.queue_capacity.max(1)
    }
}

/// Ignore rules compiled once from a [`Configuration`].
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    ignore_environment: bool,
    exceptions: Vec<String>,
    message_patterns: Vec<Regex>,
}

impl IgnoreRules {
    /// Compile the message patterns. An invalid pattern is matched literally.
    pub fn from_config(config: &Configuration) -> Self {
        let message_patterns = config
            .ignored_exception_messages
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    warn!(pattern = %pattern, error = %err, "Invalid ignore pattern, matching literally");
                    Regex::new(&regex::escape(pattern)).ok()
                }
            })
            .collect();

        Self {
            ignore_environment: config.ignore_current_environment(),
            exceptions: config.ignored_exceptions.clone(),
            message_patterns,
        }
    }

    pub fn ignores_environment(&self) -> bool {
        self.ignore_environment
    }

    /// True if the concrete type path or its last segment is ignored.
    ///
    /// References and `Box`, `Arc` or `Rc` wrappers are looked through.
    pub fn ignores_type(&self, full_type_name: &str) -> bool {
        let full = concrete_type_name(full_type_name);
        let short = short_type_name(full);
        self.exceptions
            .iter()
            .any(|name| name == full || name == short)
    }

    pub fn ignores_message(&self, message: &str) -> bool {
        self.message_patterns.iter().any(|re| re.is_match(message))
    }

    pub fn is_ignorable(&self, full_type_name: &str, message: &str) -> bool {
        self.ignore_environment || self.ignores_message(message) || self.ignores_type(full_type_name)
    }
}

/// Smart pointers whose type parameter is the error actually raised.
const POINTER_TYPES: &[&str] = &[
    "alloc::boxed::Box",
    "alloc::sync::Arc",
    "alloc::rc::Rc",
    "std::boxed::Box",
    "std::sync::Arc",
    "std::rc::Rc",
];

/// Type path of the innermost error behind references and smart pointers.
///
/// `&alloc::boxed::Box<my_app::TimeoutError>` → `my_app::TimeoutError`.
pub fn concrete_type_name(full_type_name: &str) -> &str {
    let mut name = full_type_name.trim();
    loop {
        if let Some(rest) = name.strip_prefix('&') {
            name = rest.trim_start();
            name = name.strip_prefix("mut ").unwrap_or(name).trim_start();
            continue;
        }
        match pointee(name) {
            Some(inner) => name = inner,
            None => return name,
        }
    }
}

/// `Box<T>` → `T`, also skipping a trailing allocator argument.
fn pointee(name: &str) -> Option<&str> {
    let (base, rest) = name.split_once('<')?;
    if !POINTER_TYPES.contains(&base) {
        return None;
    }
    let args = rest.strip_suffix('>')?;
    let mut depth = 0usize;
    for (idx, ch) in args.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => return Some(args[..idx].trim()),
            _ => {}
        }
    }
    Some(args.trim())
}

/// Last path segment of the concrete type name, ignoring generic arguments.
///
/// `std::io::error::Error` → `Error`, `my_app::Wrapper<alloc::string::String>` → `Wrapper`,
/// `alloc::boxed::Box<my_app::TimeoutError>` → `TimeoutError`.
pub fn short_type_name(full_type_name: &str) -> &str {
    let concrete = concrete_type_name(full_type_name);
    let base = concrete.split_once('<').map_or(concrete, |(base, _)| base);
    base.rsplit("::").next().unwrap_or(base)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Configuration::default();
        assert_eq!(config.environment, "development");
        assert_eq!(config.url, DEFAULT_URL);
        assert_eq!(config.queue_capacity, 10_000);
        assert_eq!(config.max_batch, 200);
        assert_eq!(config.poll_interval_ms, 2_000);
        assert_eq!(config.http_timeout_ms, 5_000);
        assert_eq!(config.ignored_environments, vec!["test", "cucumber", "selenium"]);
        assert!(!config.ignore_current_environment());
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("reporter.json");
        std::fs::write(
            &path,
            r#"{
                "api_key": "abc",
                "application_id": "app1",
                "environment": "production",
                "ignored_exceptions": ["TimeoutError"]
            }"#,
        )
        .unwrap();

        let config = Configuration::load_from_file(&path).unwrap();
        assert_eq!(config.api_key, "abc");
        assert_eq!(config.database(), "app1production");
        assert_eq!(config.ignored_exceptions, vec!["TimeoutError"]);
        // Unspecified keys keep defaults.
        assert_eq!(config.max_batch, 200);
    }

    #[test]
    fn test_config_save_and_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("reporter.json");
        let config = Configuration {
            api_key: "k".to_string(),
            queue_capacity: 5,
            ..Default::default()
        };

        config.save(&path).unwrap();
        assert_eq!(Configuration::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_config_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = Configuration::load_from_file(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ReporterError::Io(_)));
    }

    #[test]
    fn test_overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("EXCEPTION_REPORTER_API_KEY", "from-env"),
            ("EXCEPTION_REPORTER_ENV", "staging"),
            ("EXCEPTION_REPORTER_URL", "  "),
        ]
        .into_iter()
        .collect();

        let mut config = Configuration::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.environment, "staging");
        assert_eq!(config.url, DEFAULT_URL);
    }

    #[test]
    fn test_validate_transport() {
        let mut config = Configuration::default();
        assert!(config.validate_transport().is_err());
        config.api_key = "k".to_string();
        assert!(config.validate_transport().is_err());
        config.application_id = "app".to_string();
        assert!(config.validate_transport().is_ok());
    }

    #[test]
    fn test_worker_config_clamps() {
        let config = Configuration {
            max_batch: 0,
            poll_interval_ms: 0,
            queue_capacity: 0,
            ..Default::default()
        };
        let worker = config.worker_config();
        assert_eq!(worker.max_batch, 1);
        assert_eq!(worker.poll_interval, Duration::from_millis(10));
        assert_eq!(config.effective_queue_capacity(), 1);
    }

    #[test]
    fn ignored_environment() {
        let config = Configuration {
            environment: "test".to_string(),
            ..Default::default()
        };
        let rules = IgnoreRules::from_config(&config);
        assert!(rules.ignores_environment());
        assert!(rules.is_ignorable("app::AnyError", "anything"));
    }

    #[test]
    fn ignored_type_matches_full_or_short_name() {
        let config = Configuration {
            ignored_exceptions: vec!["TimeoutError".to_string(), "std::io::error::Error".to_string()],
            ..Default::default()
        };
        let rules = IgnoreRules::from_config(&config);
        assert!(rules.ignores_type("my_app::net::TimeoutError"));
        assert!(rules.ignores_type("std::io::error::Error"));
        assert!(!rules.ignores_type("my_app::net::ConnectError"));
    }

    #[test]
    fn ignored_message_patterns_are_unanchored_regexes() {
        let config = Configuration {
            ignored_exception_messages: vec!["connection reset".to_string(), "^user \\d+ not found$".to_string()],
            ..Default::default()
        };
        let rules = IgnoreRules::from_config(&config);
        assert!(rules.ignores_message("upstream: connection reset by peer"));
        assert!(rules.ignores_message("user 42 not found"));
        assert!(!rules.ignores_message("user bob not found"));
    }

    #[test]
    fn invalid_pattern_matches_literally() {
        let config = Configuration {
            ignored_exception_messages: vec!["unclosed (group".to_string()],
            ..Default::default()
        };
        let rules = IgnoreRules::from_config(&config);
        assert!(rules.ignores_message("error: unclosed (group here"));
        assert!(!rules.ignores_message("unclosed group"));
    }

    #[test]
    fn short_type_names() {
        assert_eq!(short_type_name("std::io::error::Error"), "Error");
        assert_eq!(short_type_name("TimeoutError"), "TimeoutError");
        assert_eq!(short_type_name("app::Wrapper<alloc::string::String>"), "Wrapper");
        assert_eq!(short_type_name("alloc::boxed::Box<app::TimeoutError>"), "TimeoutError");
    }

    #[test]
    fn concrete_type_looks_through_pointers() {
        assert_eq!(
            concrete_type_name("&alloc::sync::Arc<alloc::boxed::Box<app::TimeoutError>>"),
            "app::TimeoutError"
        );
        assert_eq!(
            concrete_type_name("alloc::boxed::Box<app::Wrapper<u8>, alloc::alloc::Global>"),
            "app::Wrapper<u8>"
        );
        assert_eq!(concrete_type_name("&mut alloc::rc::Rc<app::E>"), "app::E");
        assert_eq!(concrete_type_name("app::Boxed<app::E>"), "app::Boxed<app::E>");
    }

    #[test]
    fn ignored_type_matches_through_box() {
        let config = Configuration {
            ignored_exceptions: vec!["TimeoutError".to_string(), "app::ConnectError".to_string()],
            ..Default::default()
        };
        let rules = IgnoreRules::from_config(&config);
        assert!(rules.ignores_type("alloc::boxed::Box<app::net::TimeoutError>"));
        assert!(rules.ignores_type("alloc::sync::Arc<app::ConnectError>"));
        assert!(!rules.ignores_type("alloc::boxed::Box<app::OtherError>"));
    }
}
