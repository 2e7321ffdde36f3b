//! Purpose: Carry one serialized batch to the API endpoint and return the raw reply.
//! Exports: `Transport`, `TransportFuture`, `TransportRequest`, `TransportReply`, `HttpTransport`.
//! Role: Seam between the multiplexer and the network; swappable in tests.
//! Invariants: Transports return raw text; JSON decoding belongs to the multiplexer.
//! Invariants: Non-2xx HTTP statuses are transport failures, not business errors.
//! Invariants: Endpoint paths resolve against an http(s) base URL.
#![allow(clippy::result_large_err)]

use crate::core::error::{Error, ErrorKind};
use serde_json::{Map, Value};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use url::Url;

pub type TransportFuture =
    Pin<Box<dyn Future<Output = Result<TransportReply, Error>> + Send + 'static>>;

#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    /// Endpoint as configured or overridden per request; may be relative.
    pub url: String,
    pub body: String,
    /// Caller settings forwarded verbatim from the batch's request options.
    pub settings: Map<String, Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransportReply {
    pub status: u16,
    pub body: String,
}

pub trait Transport: Send + Sync + 'static {
    fn post(&self, request: TransportRequest) -> TransportFuture;
}

/// Blocking `ureq` agent driven from tokio's blocking pool.
///
/// Recognized settings: `headers` (object of string values) and
/// `timeout_ms` (overall request timeout).
#[derive(Clone)]
pub struct HttpTransport {
    base_url: Url,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self, Error> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            agent: ureq::AgentBuilder::new().build(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn resolve_endpoint(&self, endpoint: &str) -> Result<Url, Error> {
        self.base_url.join(endpoint).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("invalid API endpoint {endpoint:?}"))
                .with_source(err)
        })
    }

    fn send(&self, request: TransportRequest) -> Result<TransportReply, Error> {
        let url = self.resolve_endpoint(&request.url)?;
        let mut call = self
            .agent
            .post(url.as_str())
            .set("Accept", "application/json")
            .set("Content-Type", "application/json");
        if let Some(Value::Object(headers)) = request.settings.get("headers") {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    call = call.set(name, value);
                }
            }
        }
        if let Some(timeout_ms) = request.settings.get("timeout_ms").and_then(Value::as_u64) {
            call = call.timeout(Duration::from_millis(timeout_ms));
        }

        match call.send_string(&request.body) {
            Ok(response) => {
                let status = response.status();
                let body = response.into_string().map_err(|err| {
                    Error::new(ErrorKind::Transport)
                        .with_message("failed to read response body")
                        .with_source(err)
                })?;
                Ok(TransportReply { status, body })
            }
            Err(ureq::Error::Status(code, _response)) => Err(Error::new(ErrorKind::Transport)
                .with_message(format!("endpoint {url} answered status {code}"))),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Transport)
                .with_message(format!("request to {url} failed"))
                .with_source(err)),
        }
    }
}

impl Transport for HttpTransport {
    fn post(&self, request: TransportRequest) -> TransportFuture {
        let transport = self.clone();
        Box::pin(async move {
            tokio::task::spawn_blocking(move || transport.send(request))
                .await
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("transport worker failed")
                        .with_source(err)
                })?
        })
    }
}

fn normalize_base_url(raw: String) -> Result<Url, Error> {
    let mut url = Url::parse(&raw).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid API base url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(
            Error::new(ErrorKind::Usage).with_message("API base url must use http or https scheme")
        );
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::{HttpTransport, normalize_base_url};
    use crate::core::error::ErrorKind;

    #[test]
    fn normalize_base_url_adds_trailing_slash() {
        let url = normalize_base_url("http://localhost:8080".to_string()).expect("url");
        assert_eq!(url.as_str(), "http://localhost:8080/");
        let url = normalize_base_url("https://example.org/app?x=1".to_string()).expect("url");
        assert_eq!(url.as_str(), "https://example.org/app/");
    }

    #[test]
    fn normalize_base_url_rejects_other_schemes() {
        let err = normalize_base_url("ftp://example.org".to_string()).expect_err("err");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn endpoint_resolution_handles_absolute_and_relative_paths() {
        let transport = HttpTransport::new("http://localhost:8080/app").expect("transport");
        assert_eq!(
            transport.resolve_endpoint("/api").expect("abs").as_str(),
            "http://localhost:8080/api"
        );
        assert_eq!(
            transport.resolve_endpoint("api").expect("rel").as_str(),
            "http://localhost:8080/app/api"
        );
        assert_eq!(
            transport
                .resolve_endpoint("https://other.example/rpc")
                .expect("full")
                .as_str(),
            "https://other.example/rpc"
        );
    }
}
