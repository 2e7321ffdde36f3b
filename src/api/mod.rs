//! Purpose: Define the public API-client surface: envelopes, multiplexer, transports, hooks.
//! Exports: Request/response types, `Multiplexer`, transports, hooks, bus, keep-alive.
//! Role: Everything a store or application needs to issue batched API calls.
//! Invariants: Wire encoding and reply decoding stay private to this module tree.

mod bus;
mod envelope;
mod hooks;
mod keepalive;
mod multiplexer;
mod transport;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use bus::{Bus, TopicMessage};
pub use envelope::{
    ApiCall, ApiRequest, ApiResponse, PING_ACTION, PING_MODULE, RAW_BODY_FIELD, Status,
};
pub use hooks::{ExceptionReporter, LogExceptionReporter, TransportErrorHandler};
pub use keepalive::KeepAlive;
pub use multiplexer::{FlushReport, Multiplexer, RequestOptions};
pub use transport::{HttpTransport, Transport, TransportFuture, TransportReply, TransportRequest};
