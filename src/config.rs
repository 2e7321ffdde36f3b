//! Purpose: Configuration surface for the API client.
//! Exports: `ApiConfig`, `DEFAULT_URL`, `DEFAULT_NOTICE_TOPIC`, `DEFAULT_PING_DELAY`.
//! Role: Built from JSON (camelCase keys) or with `with_*` builders; read-only afterwards.
//! Invariants: Missing keys take defaults; a zero or null `pingDelay` disables keep-alive.
#![allow(clippy::result_large_err)]

use crate::core::error::{Error, ErrorKind};
use crate::json::parse;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_URL: &str = "/api";
pub const DEFAULT_NOTICE_TOPIC: &str = "jig/api/request";
pub const DEFAULT_PING_DELAY: Duration = Duration::from_secs(300);

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL the endpoint resolves against when the default HTTP transport is used.
    pub base_url: Option<String>,
    /// Endpoint path (or absolute URL) every batch is posted to.
    pub url: String,
    /// Merged into every outgoing request, overriding same-named fields.
    pub request_common_params: Map<String, Value>,
    /// Extra wait before a scheduled flush, in milliseconds on the wire.
    #[serde(deserialize_with = "millis")]
    pub debug_delay: Duration,
    /// Idle time before a keep-alive ping, in seconds on the wire.
    #[serde(deserialize_with = "optional_secs")]
    pub ping_delay: Option<Duration>,
    pub notice_topic: String,
    pub show_exceptions: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            url: DEFAULT_URL.to_string(),
            request_common_params: Map::new(),
            debug_delay: Duration::ZERO,
            ping_delay: Some(DEFAULT_PING_DELAY),
            notice_topic: DEFAULT_NOTICE_TOPIC.to_string(),
            show_exceptions: false,
        }
    }
}

impl ApiConfig {
    pub fn from_json_str(input: &str) -> Result<Self, Error> {
        parse::from_str(input).map_err(|err| {
            Error::new(ErrorKind::Config)
                .with_message("invalid API configuration")
                .with_hint(parse::hint_for_error(&err, "config"))
                .with_source(err)
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            Error::new(ErrorKind::Config)
                .with_message(format!("failed to read config file {}", path.display()))
                .with_source(err)
        })?;
        Self::from_json_str(&text)
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_common_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.request_common_params.insert(key.into(), value.into());
        self
    }

    pub fn with_debug_delay(mut self, delay: Duration) -> Self {
        self.debug_delay = delay;
        self
    }

    pub fn with_ping_delay(mut self, delay: Option<Duration>) -> Self {
        self.ping_delay = delay.filter(|delay| !delay.is_zero());
        self
    }

    pub fn with_notice_topic(mut self, topic: impl Into<String>) -> Self {
        self.notice_topic = topic.into();
        self
    }

    pub fn with_show_exceptions(mut self, show: bool) -> Self {
        self.show_exceptions = show;
        self
    }
}

fn millis<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    u64::deserialize(deserializer).map(Duration::from_millis)
}

fn optional_secs<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = Option::<u64>::deserialize(deserializer)?;
    Ok(secs.filter(|secs| *secs > 0).map(Duration::from_secs))
}
