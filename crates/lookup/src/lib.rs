//! Client for the Handshake marketplace `getTLD` endpoint.

use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;
use url::Url;

use hns_scout_core::CheckState;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";
const BROWSER_USER_AGENT: &str = "Mozilla/5.0";

/// Client that asks the marketplace about one name at a time.
#[derive(Clone)]
pub struct MarketplaceClient {
    http: Client,
    endpoint: Url,
    origin: String,
}

impl MarketplaceClient {
    /// Creates a client posting to `endpoint`. Timeouts come from the supplied `http` client.
    pub fn new(endpoint: Url, http: Client) -> Self {
        let origin = endpoint.origin().ascii_serialization();
        Self {
            http,
            endpoint,
            origin,
        }
    }

    /// Fetches the marketplace record for `name` (already in ASCII form).
    pub async fn lookup(&self, name: &str) -> Result<TldInfo, LookupError> {
        // The endpoint expects a JSON document under a form content type.
        let payload = json!({ "action": "getTLD", "tld": name }).to_string();

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(header::ACCEPT, "*/*")
            .header(header::CONTENT_TYPE, FORM_CONTENT_TYPE)
            .header(header::USER_AGENT, BROWSER_USER_AGENT)
            .header(header::ORIGIN, &self.origin)
            .header(header::REFERER, format!("{}/domain/{name}", self.origin))
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<unavailable>"));
            return Err(LookupError::Status { status, body });
        }

        let body = response.text().await?;
        TldInfo::from_response_body(&body)
    }

    /// Classifies `name`, folding every failure into an error state.
    pub async fn check(&self, name: &str) -> CheckState {
        match self.lookup(name).await.and_then(|info| info.classify()) {
            Ok(state) => state,
            Err(err) => {
                debug!(stage = "lookup", %name, error = %err, "lookup failed");
                err.state()
            }
        }
    }
}

/// Fields of the marketplace record that decide availability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TldInfo {
    pub reserved: bool,
    pub openable: Option<bool>,
    pub auction_status: Option<String>,
}

impl TldInfo {
    /// Parses a raw response body of the shape `{success, data: {reserved?, openable?, auction?}}`.
    pub fn from_response_body(body: &str) -> Result<Self, LookupError> {
        let envelope: Envelope = serde_json::from_str(body)?;
        if !envelope.success.as_ref().is_some_and(is_truthy) {
            return Err(LookupError::Rejected);
        }
        let data = envelope
            .data
            .filter(Value::is_object)
            .ok_or(LookupError::Rejected)?;

        Ok(Self {
            reserved: data.get("reserved").is_some_and(is_truthy),
            openable: data.get("openable").and_then(Value::as_bool),
            auction_status: data
                .get("auction")
                .and_then(|auction| auction.get("status"))
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    /// Maps the record onto a [`CheckState`]. Reserved wins over everything else.
    pub fn classify(&self) -> Result<CheckState, LookupError> {
        if self.reserved {
            return Ok(CheckState::Reserved);
        }
        match self.openable {
            Some(true) => Ok(CheckState::Available),
            Some(false) => Ok(CheckState::from_auction_status(
                self.auction_status.as_deref(),
            )),
            None => Err(LookupError::Incomplete),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

/// Loose truthiness matching how the marketplace encodes flags.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Errors produced by the marketplace client.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("response is not valid json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("marketplace reported failure or returned no data")]
    Rejected,
    #[error("marketplace record has no openable flag")]
    Incomplete,
}

impl LookupError {
    /// Transport failures map to `NETWORK_ERROR`; anything the service said but we
    /// could not use maps to `API_ERROR`.
    pub fn state(&self) -> CheckState {
        match self {
            Self::Http(_) | Self::Status { .. } => CheckState::NetworkError,
            Self::Decode(_) | Self::Rejected | Self::Incomplete => CheckState::ApiError,
        }
    }
}
