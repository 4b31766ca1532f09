//! Turns an error into the `{value, context, dimensions}` record that is queued.

use crate::config::{concrete_type_name, short_type_name};
use crate::{Configuration, ReporterResult};
use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error as StdError;

/// Caller-supplied context for one report (request data, user id, ...).
pub type ReportContext = Map<String, Value>;

/// What the pipeline knows about one error occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    /// Short type name, e.g. `TimeoutError`.
    pub class_name: String,
    /// Full type path from `std::any::type_name`, behind any `Box`, `Arc` or `Rc`.
    pub full_type_name: String,
    /// `Display` output of the error.
    pub message: String,
    /// `Display` output of each error in the `source()` chain.
    pub causes: Vec<String>,
}

impl ExceptionInfo {
    pub fn from_error<E>(error: &E) -> Self
    where
        E: StdError + 'static,
    {
        let full_type_name = concrete_type_name(std::any::type_name::<E>()).to_string();
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            causes.push(cause.to_string());
            source = cause.source();
        }

        Self {
            class_name: short_type_name(&full_type_name).to_string(),
            full_type_name,
            message: error.to_string(),
            causes,
        }
    }
}

/// The formatted record before it becomes a queued event.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedEvent {
    pub value: i64,
    /// Context object; serialized to a string when queued.
    pub context: Value,
    pub dimensions: BTreeMap<String, String>,
}

/// Builds the queued record for an error.
pub trait EventFormatter: Send + Sync {
    fn format(
        &self,
        info: &ExceptionInfo,
        context: Option<&ReportContext>,
    ) -> ReporterResult<FormattedEvent>;
}

#[derive(Serialize)]
struct ExceptionContext<'a> {
    time: i64,
    application_name: &'a str,
    exception_class: &'a str,
    message: &'a str,
    causes: &'a [String],
    hostname: &'a str,
    environment: &'a str,
    language: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    custom_data: Option<&'a ReportContext>,
}

/// Formatter used unless the host supplies its own.
#[derive(Debug, Clone)]
pub struct DefaultFormatter {
    application_name: String,
    environment: String,
    hostname: String,
}

impl DefaultFormatter {
    pub fn new(config: &Configuration) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|name| name.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self::with_hostname(config, hostname)
    }

    pub fn with_hostname(config: &Configuration, hostname: impl Into<String>) -> Self {
        Self {
            application_name: config.application_name.clone(),
            environment: config.environment.clone(),
            hostname: hostname.into(),
        }
    }
}

impl EventFormatter for DefaultFormatter {
    fn format(
        &self,
        info: &ExceptionInfo,
        context: Option<&ReportContext>,
    ) -> ReporterResult<FormattedEvent> {
        let body = ExceptionContext {
            time: Utc::now().timestamp(),
            application_name: &self.application_name,
            exception_class: &info.class_name,
            message: &info.message,
            causes: &info.causes,
            hostname: &self.hostname,
            environment: &self.environment,
            language: "Rust",
            custom_data: context,
        };

        let mut dimensions = BTreeMap::new();
        dimensions.insert("class".to_string(), info.class_name.clone());
        dimensions.insert("server".to_string(), self.hostname.clone());
        if let Some(method) = context.and_then(handler_method) {
            dimensions.insert("method".to_string(), method);
        }

        Ok(FormattedEvent {
            value: 1,
            context: serde_json::to_value(&body)?,
            dimensions,
        })
    }
}

/// `controller#action` when both are present in the context.
fn handler_method(context: &ReportContext) -> Option<String> {
    let controller = context.get("controller")?.as_str()?;
    let action = context.get("action")?.as_str()?;
    Some(format!("{controller}#{action}"))
}
