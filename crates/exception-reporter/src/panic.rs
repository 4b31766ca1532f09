//! Report panics through a process-wide panic hook.

use crate::presenter::{ExceptionInfo, ReportContext};
use crate::reporter::is_reporting;
use crate::Reporter;
use exception_outbox::{panic_message, WORKER_THREAD_NAME};
use serde_json::Value;
use std::any::Any;

/// Class name used for panics.
pub const PANIC_CLASS: &str = "panic";

/// Chain a hook that reports every panic before running the previous hook.
///
/// Panics on the delivery worker thread are skipped so a failing transport
/// cannot feed its own queue. Panics raised while a report is in progress on
/// the same thread are skipped too; the report's own guard turns them into
/// [`ReportOutcome::Failed`](crate::ReportOutcome::Failed).
pub fn install_panic_hook(reporter: &'static Reporter) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |hook_info| {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("<unnamed>");
        if thread_name != WORKER_THREAD_NAME && !is_reporting() {
            let location = hook_info
                .location()
                .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()));
            report_panic(reporter, hook_info.payload(), location, thread_name);
        }
        previous(hook_info);
    }));
}

fn report_panic(
    reporter: &Reporter,
    payload: &(dyn Any + Send),
    location: Option<String>,
    thread_name: &str,
) {
    let info = panic_info(payload, location.as_deref());

    let mut context = ReportContext::new();
    context.insert("thread".to_string(), Value::from(thread_name));
    if let Some(location) = location {
        context.insert("location".to_string(), Value::from(location));
    }

    reporter.report_info(&info, Some(&context));
}

fn panic_info(payload: &(dyn Any + Send), location: Option<&str>) -> ExceptionInfo {
    ExceptionInfo {
        class_name: PANIC_CLASS.to_string(),
        full_type_name: PANIC_CLASS.to_string(),
        message: panic_message(payload).to_string(),
        causes: location.map(str::to_string).into_iter().collect(),
    }
}
