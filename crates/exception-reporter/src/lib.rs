//! # exception-reporter
//!
//! Captures application errors and ships them to a telemetry endpoint
//! through [`exception_outbox`].
//!
//! ## Design
//!
//! Reporting must never disturb the application. The calls here decide
//! whether an error is worth reporting, format it, and push it on a bounded
//! queue. A background worker does the network I/O. Anything that goes wrong
//! inside the pipeline ends as a log line, never as an error or panic in the
//! caller.
//!
//! An error is ignorable when:
//!
//! - the current environment is in `ignored_environments`,
//! - its message matches one of `ignored_exception_messages`, or
//! - its type name is in `ignored_exceptions`.
//!
//! ## Usage
//!
//! Own the reporter explicitly:
//!
//! ```rust,ignore
//! let reporter = exception_reporter::Reporter::new(Configuration::from_env())?;
//!
//! if let Err(err) = handle_request(&req) {
//!     reporter.report_exception(&err, Some(&request_context));
//! }
//!
//! let parsed = reporter.rescue_and_reraise(|| parse_order(&body))?;
//! ```
//!
//! Or configure the process-wide instance once at startup:
//!
//! ```rust,ignore
//! fn main() {
//!     exception_reporter::logging::init_logging("info");
//!     let reporter = exception_reporter::configure(Configuration::from_env())
//!         .expect("exception reporter");
//!     exception_reporter::install_panic_hook(reporter);
//!
//!     exception_reporter::rescue(|| run_job());
//! }
//! ```

mod config;
mod error;
pub mod logging;
mod panic;
mod presenter;
mod reporter;

pub use config::{
    concrete_type_name, short_type_name, Configuration, IgnoreRules, DEFAULT_LOG_LEVEL, DEFAULT_URL,
};
pub use error::{ReporterError, ReporterResult};
pub use panic::{install_panic_hook, PANIC_CLASS};
pub use presenter::{DefaultFormatter, EventFormatter, ExceptionInfo, FormattedEvent, ReportContext};
pub use reporter::{ReportOutcome, Reporter, ReporterBuilder};

use std::error::Error as StdError;
use std::sync::OnceLock;

static REPORTER: OnceLock<Reporter> = OnceLock::new();

/// Build the process-wide reporter. Only the first call succeeds.
pub fn configure(config: Configuration) -> ReporterResult<&'static Reporter> {
    configure_with(Reporter::builder(config))
}

/// Like [`configure`] with a customized builder (transport, formatter).
pub fn configure_with(builder: ReporterBuilder) -> ReporterResult<&'static Reporter> {
    if REPORTER.get().is_some() {
        return Err(ReporterError::AlreadyConfigured);
    }
    let reporter = builder.build()?;
    // A concurrent configure may have won; the loser's reporter is dropped.
    REPORTER
        .set(reporter)
        .map_err(|_| ReporterError::AlreadyConfigured)?;
    REPORTER.get().ok_or(ReporterError::AlreadyConfigured)
}

/// The process-wide reporter, if [`configure`] has run.
pub fn reporter() -> Option<&'static Reporter> {
    REPORTER.get()
}

/// Report through the process-wide reporter. `Ignored` before `configure`.
pub fn report_exception<E>(error: &E, context: Option<&ReportContext>) -> ReportOutcome
where
    E: StdError + 'static,
{
    match reporter() {
        Some(reporter) => reporter.report_exception(error, context),
        None => ReportOutcome::Ignored,
    }
}

/// [`Reporter::rescue`] on the process-wide reporter.
///
/// Before `configure` the error is returned unreported.
pub fn rescue<T, E, F>(work: F) -> Result<Option<T>, E>
where
    F: FnOnce() -> Result<T, E>,
    E: StdError + 'static,
{
    match reporter() {
        Some(reporter) => reporter.rescue(work),
        None => work().map(Some),
    }
}

/// [`Reporter::rescue_and_reraise`] on the process-wide reporter.
pub fn rescue_and_reraise<T, E, F>(work: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: StdError + 'static,
{
    match reporter() {
        Some(reporter) => reporter.rescue_and_reraise(work),
        None => work(),
    }
}
