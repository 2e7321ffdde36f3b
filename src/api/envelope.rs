//! Purpose: Define the typed request/response envelopes carried over the API endpoint.
//! Exports: `ApiRequest`, `ApiCall`, `ApiResponse`, `Status`.
//! Role: Closed set of request kinds over a schemaless JSON wire format.
//! Invariants: Only business fields reach the wire; handles/options never serialize.
//! Invariants: Common params merge last, so they override per-request fields.
//! Invariants: Unknown response statuses are preserved verbatim, never rejected.
//! Invariants: Every reply entry decodes to a response; non-objects land under `body`.

use crate::core::ids::WindowId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

pub const PING_MODULE: &str = "user";
pub const PING_ACTION: &str = "ping";
/// Field holding a reply entry that was not a JSON object.
pub const RAW_BODY_FIELD: &str = "body";

#[derive(Clone, Debug, PartialEq)]
pub enum ApiRequest {
    Call(ApiCall),
    /// Session keep-alive; carries no arguments.
    Ping,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiCall {
    pub module: String,
    pub action: String,
    #[serde(flatten)]
    pub args: Map<String, Value>,
}

impl ApiCall {
    pub fn new(module: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            action: action.into(),
            args: Map::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args.extend(args);
        self
    }
}

impl From<ApiCall> for ApiRequest {
    fn from(call: ApiCall) -> Self {
        ApiRequest::Call(call)
    }
}

impl ApiRequest {
    pub fn call(module: impl Into<String>, action: impl Into<String>) -> Self {
        ApiRequest::Call(ApiCall::new(module, action))
    }

    pub fn module(&self) -> &str {
        match self {
            ApiRequest::Call(call) => &call.module,
            ApiRequest::Ping => PING_MODULE,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            ApiRequest::Call(call) => &call.action,
            ApiRequest::Ping => PING_ACTION,
        }
    }

    pub(crate) fn to_wire(&self, window_id: &WindowId, common: &Map<String, Value>) -> Value {
        let mut fields = Map::new();
        if let ApiRequest::Call(call) = self {
            for (key, value) in &call.args {
                fields.insert(key.clone(), value.clone());
            }
        }
        fields.insert("module".to_string(), Value::from(self.module()));
        fields.insert("action".to_string(), Value::from(self.action()));
        fields.insert("windowId".to_string(), Value::from(window_id.as_str()));
        for (key, value) in common {
            fields.insert(key.clone(), value.clone());
        }
        Value::Object(fields)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub enum Status {
    Ok,
    Error,
    Exception,
    /// Any other value sent by the server.
    Other(String),
    #[default]
    Missing,
}

impl From<String> for Status {
    fn from(value: String) -> Self {
        match value.as_str() {
            "ok" => Status::Ok,
            "error" => Status::Error,
            "exception" => Status::Exception,
            _ => Status::Other(value),
        }
    }
}

impl From<Status> for String {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => "ok".to_string(),
            Status::Error => "error".to_string(),
            Status::Exception => "exception".to_string(),
            Status::Other(value) => value,
            Status::Missing => String::new(),
        }
    }
}

impl Status {
    pub fn is_success(&self) -> bool {
        matches!(self, Status::Ok)
    }

    /// `null` reads as `Missing`; other non-strings keep their JSON text.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => Status::Missing,
            Value::String(text) => Status::from(text),
            other => Status::Other(other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Status::from_json)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub status: Status,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ApiResponse {
    pub fn new(status: Status) -> Self {
        Self {
            status,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Server-side exception details, present when `status` is `exception`.
    pub fn exception(&self) -> Option<&Value> {
        self.fields.get("exception")
    }

    pub fn to_value(&self) -> Value {
        let mut fields = self.fields.clone();
        fields.insert("status".to_string(), Value::from(String::from(self.status.clone())));
        Value::Object(fields)
    }

    pub(crate) fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut fields) => {
                let status = fields
                    .remove("status")
                    .map(Status::from_json)
                    .unwrap_or_default();
                Self { status, fields }
            }
            other => Self::new(Status::Missing).with_field(RAW_BODY_FIELD, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiCall, ApiRequest, ApiResponse, Status};
    use crate::core::ids::WindowId;
    use serde_json::{Map, Value, json};

    #[test]
    fn wire_payload_merges_window_and_common_params() {
        let request: ApiRequest = ApiCall::new("layer", "query")
            .with_arg("filter", json!({"name": "roads"}))
            .with_arg("locale", "en")
            .into();
        let mut common = Map::new();
        common.insert("locale".to_string(), json!("fr"));
        let window = WindowId::from("w-1".to_string());

        let wire = request.to_wire(&window, &common);
        assert_eq!(
            wire,
            json!({
                "module": "layer",
                "action": "query",
                "filter": {"name": "roads"},
                "locale": "fr",
                "windowId": "w-1",
            })
        );
    }

    #[test]
    fn explicit_module_wins_over_colliding_arg() {
        let request: ApiRequest = ApiCall::new("user", "login")
            .with_arg("module", "evil")
            .into();
        let wire = request.to_wire(&WindowId::from("w".to_string()), &Map::new());
        assert_eq!(wire.get("module"), Some(&json!("user")));
    }

    #[test]
    fn ping_serializes_as_user_ping() {
        let wire = ApiRequest::Ping.to_wire(&WindowId::from("w".to_string()), &Map::new());
        assert_eq!(wire, json!({"module": "user", "action": "ping", "windowId": "w"}));
    }

    #[test]
    fn response_keeps_unknown_status_and_fields() {
        let response = ApiResponse::from_value(json!({"status": "partial", "rows": [1, 2]}));
        assert_eq!(response.status, Status::Other("partial".to_string()));
        assert_eq!(response.get("rows"), Some(&json!([1, 2])));

        let missing = ApiResponse::from_value(json!({"rows": []}));
        assert_eq!(missing.status, Status::Missing);
    }

    #[test]
    fn odd_statuses_and_bodies_still_decode() {
        let null = ApiResponse::from_value(json!({"status": null, "rows": []}));
        assert_eq!(null.status, Status::Missing);
        assert_eq!(null.get("rows"), Some(&json!([])));
        assert!(null.get("status").is_none());

        let numeric = ApiResponse::from_value(json!({"status": 1}));
        assert_eq!(numeric.status, Status::Other("1".to_string()));

        let scalar = ApiResponse::from_value(json!("done"));
        assert_eq!(scalar.status, Status::Missing);
        assert_eq!(scalar.get("body"), Some(&json!("done")));
    }

    #[test]
    fn serde_decoding_is_as_lenient_as_routing() {
        let response: ApiResponse =
            serde_json::from_value(json!({"status": false, "n": 2})).expect("decode");
        assert_eq!(response.status, Status::Other("false".to_string()));
        assert_eq!(response.get("n"), Some(&json!(2)));
    }

    #[test]
    fn exception_payload_is_exposed() {
        let response = ApiResponse::from_value(json!({
            "status": "exception",
            "exception": {"message": "boom"}
        }));
        assert_eq!(response.status, Status::Exception);
        assert_eq!(
            response.exception().and_then(|value| value.get("message")),
            Some(&Value::from("boom"))
        );
        assert_eq!(response.to_value().get("status"), Some(&json!("exception")));
    }
}
