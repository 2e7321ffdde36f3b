//! Purpose: Collaborator hooks the multiplexer calls on business exceptions and bad replies.
//! Exports: `ExceptionReporter`, `LogExceptionReporter`, `TransportErrorHandler`.
//! Role: Seam to presentation code (exception dialogs, retry prompts) without coupling to it.
//! Invariants: Hooks observe; they never decide whether a handle resolves.

use super::envelope::{ApiRequest, ApiResponse};
use super::transport::TransportReply;
use std::sync::Arc;

pub trait ExceptionReporter: Send + Sync {
    fn report(&self, request: &ApiRequest, response: &ApiResponse);
}

/// Default reporter: logs the exception. With `verbose`, the server's
/// exception details are included in the log record.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogExceptionReporter {
    pub verbose: bool,
}

impl ExceptionReporter for LogExceptionReporter {
    fn report(&self, request: &ApiRequest, response: &ApiResponse) {
        if self.verbose {
            tracing::error!(
                module = request.module(),
                action = request.action(),
                exception = ?response.exception(),
                "server API exception"
            );
        } else {
            tracing::error!(
                module = request.module(),
                action = request.action(),
                "server API exception; it has been recorded server-side"
            );
        }
    }
}

impl<F> ExceptionReporter for F
where
    F: Fn(&ApiRequest, &ApiResponse) + Send + Sync,
{
    fn report(&self, request: &ApiRequest, response: &ApiResponse) {
        self(request, response)
    }
}

/// Called with the raw reply text when it is not valid JSON.
pub type TransportErrorHandler = Arc<dyn Fn(&str, &TransportReply) + Send + Sync>;
