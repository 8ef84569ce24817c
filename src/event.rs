use std::fmt::Debug;

use crate::Error;

/// Severity of a structured event, matching the propagation policy: failures
/// before Init is spawned are reported directly, failures after spawn are
/// observed through the handshake or the wait status but still logged here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Error,
    Fatal,
}

/// A single structured log line: which component failed, what happened, and
/// the underlying cause, if any.
#[derive(Debug)]
pub struct Event<'a> {
    pub severity: Severity,
    pub component: &'static str,
    pub message: &'a str,
    pub cause: Option<&'a Error>,
}

/// Destination for structured events emitted during a launch.
///
/// The core never chooses a logging transport itself; callers inject one.
/// `TracingSink` is provided as the default, built on `tracing` the way
/// other isolation engines in this space report diagnostics.
pub trait Sink: Send + Sync + Debug {
    fn emit(&self, event: &Event);
}

/// Emits events as `tracing` spans/events, structured by component.
#[derive(Debug, Default)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn emit(&self, event: &Event) {
        match event.severity {
            Severity::Debug => {
                tracing::debug!(component = event.component, cause = ?event.cause, "{}", event.message)
            }
            Severity::Error => {
                tracing::error!(component = event.component, cause = ?event.cause, "{}", event.message)
            }
            Severity::Fatal => {
                tracing::error!(component = event.component, fatal = true, cause = ?event.cause, "{}", event.message)
            }
        }
    }
}

pub(crate) fn emit(sink: &dyn Sink, severity: Severity, component: &'static str, message: &str) {
    sink.emit(&Event {
        severity,
        component,
        message,
        cause: None,
    });
}

pub(crate) fn emit_err(
    sink: &dyn Sink,
    severity: Severity,
    component: &'static str,
    message: &str,
    cause: &Error,
) {
    sink.emit(&Event {
        severity,
        component,
        message,
        cause: Some(cause),
    });
}
