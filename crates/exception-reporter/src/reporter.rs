//! The reporting facade.
//!
//! Everything here runs on the caller's thread and does only the work needed
//! to decide whether to report, format the event, and push it on the queue.
//! Transmission happens on the delivery worker.

use crate::presenter::{DefaultFormatter, EventFormatter, ExceptionInfo, ReportContext};
use crate::{Configuration, IgnoreRules, ReporterResult};
use exception_outbox::{
    panic_message, DeliveryQueue, DeliveryWorker, Event, HttpTransport, StatsSnapshot, Transport,
};
use std::cell::Cell;
use std::error::Error as StdError;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Maximum characters of event JSON written to the log.
const LOGGED_EVENT_CHARS: usize = 512;

thread_local! {
    static REPORTING: Cell<bool> = const { Cell::new(false) };
}

/// True while this thread is inside a report.
///
/// The panic hook checks this: a panic raised by the pipeline itself must
/// not be reported again from inside the hook.
pub(crate) fn is_reporting() -> bool {
    REPORTING.with(Cell::get)
}

/// Marks the current thread as reporting until dropped.
struct ReportingGuard {
    previous: bool,
}

impl ReportingGuard {
    fn enter() -> Self {
        Self {
            previous: REPORTING.with(|flag| flag.replace(true)),
        }
    }
}

impl Drop for ReportingGuard {
    fn drop(&mut self) {
        REPORTING.with(|flag| flag.set(self.previous));
    }
}

/// What happened to one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The event was queued for delivery.
    Enqueued,
    /// An ignore rule matched; nothing was queued.
    Ignored,
    /// Building the event failed; the failure was logged.
    Failed,
}

/// Captures errors and feeds them to the delivery queue.
///
/// Owns the queue and its worker. Dropping the reporter (or calling
/// [`shutdown`](Self::shutdown)) flushes what is queued, best effort.
pub struct Reporter {
    config: Arc<Configuration>,
    rules: IgnoreRules,
    formatter: Box<dyn EventFormatter>,
    queue: Arc<DeliveryQueue>,
    worker: DeliveryWorker,
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("environment", &self.config.environment)
            .field("queue_size", &self.queue.size())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Reporter`].
pub struct ReporterBuilder {
    config: Configuration,
    transport: Option<Arc<dyn Transport>>,
    formatter: Option<Box<dyn EventFormatter>>,
}

impl ReporterBuilder {
    /// Use a custom transport instead of HTTP.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom formatter instead of [`DefaultFormatter`].
    pub fn formatter(mut self, formatter: Box<dyn EventFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Create the queue and start the delivery worker.
    pub fn build(self) -> ReporterResult<Reporter> {
        let config = Arc::new(self.config);

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => {
                config.validate_transport()?;
                Arc::new(HttpTransport::new(config.sender_config())?)
            }
        };
        let formatter = self
            .formatter
            .unwrap_or_else(|| Box::new(DefaultFormatter::new(&config)));
        let rules = IgnoreRules::from_config(&config);
        let queue = Arc::new(DeliveryQueue::new(config.effective_queue_capacity()));
        let worker = DeliveryWorker::spawn(queue.clone(), transport, config.worker_config())?;

        info!(
            environment = %config.environment,
            environment_ignored = rules.ignores_environment(),
            queue_capacity = queue.capacity(),
            "Exception reporter configured"
        );

        Ok(Reporter {
            config,
            rules,
            formatter,
            queue,
            worker,
        })
    }
}

impl Reporter {
    pub fn builder(config: Configuration) -> ReporterBuilder {
        ReporterBuilder {
            config,
            transport: None,
            formatter: None,
        }
    }

    /// Build with the HTTP transport and default formatter.
    pub fn new(config: Configuration) -> ReporterResult<Self> {
        Self::builder(config).build()
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// True if the error matches an ignore rule.
    pub fn is_ignorable<E>(&self, error: &E) -> bool
    where
        E: StdError + 'static,
    {
        self.rules
            .is_ignorable(std::any::type_name::<E>(), &error.to_string())
    }

    /// Queue `error` for delivery unless it is ignorable.
    ///
    /// Never panics and never fails the caller; problems are logged.
    pub fn report_exception<E>(&self, error: &E, context: Option<&ReportContext>) -> ReportOutcome
    where
        E: StdError + 'static,
    {
        guarded(|| self.try_report(&ExceptionInfo::from_error(error), context))
    }

    /// Like [`report_exception`](Self::report_exception) for a prebuilt [`ExceptionInfo`].
    pub fn report_info(&self, info: &ExceptionInfo, context: Option<&ReportContext>) -> ReportOutcome {
        guarded(|| self.try_report(info, context))
    }

    /// Run `work`, reporting and swallowing its error.
    ///
    /// When the current environment is ignored the error is handed back
    /// unreported.
    pub fn rescue<T, E, F>(&self, work: F) -> Result<Option<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: StdError + 'static,
    {
        match work() {
            Ok(value) => Ok(Some(value)),
            Err(err) if self.rules.ignores_environment() => Err(err),
            Err(err) => {
                self.report_exception(&err, None);
                Ok(None)
            }
        }
    }

    /// Run `work`, reporting its error and returning it unchanged.
    pub fn rescue_and_reraise<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        E: StdError + 'static,
    {
        work().inspect_err(|err| {
            self.report_exception(err, None);
        })
    }

    /// Events waiting for the worker.
    pub fn queue_size(&self) -> usize {
        self.queue.size()
    }

    /// Events evicted because the queue was full.
    pub fn dropped_events(&self) -> u64 {
        self.queue.dropped()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.worker.stats()
    }

    /// Stop the worker after a final flush. Later reports are queued but
    /// not sent.
    pub fn shutdown(&self) {
        self.worker.shutdown();
    }

    fn try_report(
        &self,
        info: &ExceptionInfo,
        context: Option<&ReportContext>,
    ) -> ReporterResult<ReportOutcome> {
        if self.rules.is_ignorable(&info.full_type_name, &info.message) {
            debug!(class = %info.class_name, "Ignoring exception");
            return Ok(ReportOutcome::Ignored);
        }

        let formatted = self.formatter.format(info, context)?;
        let context_json = serde_json::to_string(&formatted.context)?;
        info!(
            "Exception: {}...",
            truncate_chars(&context_json, LOGGED_EVENT_CHARS)
        );

        self.queue
            .push(Event::new(formatted.value, context_json, formatted.dimensions));
        Ok(ReportOutcome::Enqueued)
    }
}

/// The single point where pipeline failures stop: log and map to `Failed`.
fn guarded(report: impl FnOnce() -> ReporterResult<ReportOutcome>) -> ReportOutcome {
    let _reporting = ReportingGuard::enter();
    match panic::catch_unwind(AssertUnwindSafe(report)) {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            warn!(error = %err, "Exception report failed");
            ReportOutcome::Failed
        }
        Err(payload) => {
            warn!(panic = panic_message(payload.as_ref()), "Exception report panicked");
            ReportOutcome::Failed
        }
    }
}

fn truncate_chars(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
