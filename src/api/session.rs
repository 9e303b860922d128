//! Purpose: Authenticated access to the service's read endpoints.
//! Exports: `Session`, `SessionKind`, `SESSION_HEADER`.
//! Role: Owns the transport and session key; turns raw responses into JSON or typed errors.
//! Invariants: Only GET is issued; every call carries `Session-ID` once a key is held.
//! Invariants: An html reply, a 401, or a non-json body is never returned as data.
use crate::api::config::ClientConfig;
use crate::api::transport::{Headers, HttpResponse, Request, Transport, UreqTransport};
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::page::Params;
use crate::core::sequence::Gateway;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub const SESSION_HEADER: &str = "Session-ID";

const LOGIN_TEMPORARY: &str = "/api/Session";
const LOGIN_PERMANENT: &str = "/api/Session/Permanent";
const PING: &str = "/api/Session/Ping";
const MALFORMED_SESSION_ID: &str = "Guid should contain 32 digits";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SessionKind {
    /// Expires after a period of inactivity.
    #[default]
    Temporary,
    Permanent,
}

impl SessionKind {
    fn endpoint(self) -> &'static str {
        match self {
            SessionKind::Temporary => LOGIN_TEMPORARY,
            SessionKind::Permanent => LOGIN_PERMANENT,
        }
    }
}

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    key: Option<String>,
}

#[derive(Deserialize)]
struct LoginReply {
    #[serde(rename = "SessionID")]
    session_id: String,
}

#[derive(Deserialize)]
struct PingReply {
    #[serde(rename = "StatusCode", default)]
    status_code: Option<String>,
    #[serde(rename = "ErrorCode", default)]
    error_code: Option<i64>,
    #[serde(rename = "Messages", default)]
    messages: Vec<String>,
}

impl Session {
    /// Unauthenticated session over the default `ureq` transport.
    pub fn connect(config: ClientConfig) -> ApiResult<Self> {
        let transport = UreqTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }

    pub fn with_transport(config: ClientConfig, transport: impl Transport + 'static) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config,
                transport: Arc::new(transport),
                key: None,
            }),
        }
    }

    pub(crate) fn with_key(&self, key: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                config: self.inner.config.clone(),
                transport: Arc::clone(&self.inner.transport),
                key: Some(key.into()),
            }),
        }
    }

    /// Exchanges credentials for a new session key.
    pub fn login(&self, user: &str, password: &str, kind: SessionKind) -> ApiResult<Self> {
        let credentials = BASE64.encode(format!("{user}:{password}"));
        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), format!("Basic {credentials}"));
        let endpoint = kind.endpoint();
        let reply = self
            .request(endpoint, &Params::new(), &headers, false)
            .map_err(|err| match err.kind() {
                ErrorKind::Authorization => err.with_hint("Check the user name and password."),
                _ => err,
            })?;
        let reply: LoginReply = serde_json::from_value(reply).map_err(|err| {
            Error::new(ErrorKind::Protocol)
                .with_message("login reply has no session id")
                .with_endpoint(endpoint)
                .with_source(err)
        })?;
        tracing::info!(user, ?kind, "logged in");
        Ok(self.with_key(reply.session_id))
    }

    /// Adopts an existing session key after checking it with a ping.
    pub fn resume(&self, session_id: &str) -> ApiResult<Self> {
        let session = self.with_key(session_id.trim());
        session.ping().map_err(|err| match err.kind() {
            ErrorKind::Authorization => err.with_hint("The session id has expired or was revoked."),
            _ => err,
        })?;
        tracing::info!("resumed session");
        Ok(session)
    }

    pub fn ping(&self) -> ApiResult<()> {
        let reply = self.get(PING, &Params::new())?;
        let reply: PingReply = serde_json::from_value(reply).map_err(|err| {
            Error::new(ErrorKind::Protocol)
                .with_message("unexpected ping reply")
                .with_endpoint(PING)
                .with_source(err)
        })?;
        if reply.status_code.as_deref() == Some("OK") && reply.error_code.unwrap_or(0) == 0 {
            return Ok(());
        }
        if reply
            .messages
            .iter()
            .any(|message| message.contains(MALFORMED_SESSION_ID))
        {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("session id is not valid")
                .with_endpoint(PING)
                .with_hint("Session ids are 32 hex digits."));
        }
        Err(Error::new(ErrorKind::Protocol)
            .with_message(format!(
                "ping failed: {}",
                reply
                    .messages
                    .first()
                    .map(String::as_str)
                    .unwrap_or("no status")
            ))
            .with_endpoint(PING))
    }

    pub fn key(&self) -> Option<&str> {
        self.inner.key.as_deref()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn page_size(&self) -> usize {
        self.inner.config.page_size()
    }

    pub fn get(&self, endpoint: &str, params: &Params) -> ApiResult<Value> {
        self.call(endpoint, "GET", params, &Headers::new())
    }

    pub fn call(
        &self,
        endpoint: &str,
        method: &str,
        params: &Params,
        headers: &Headers,
    ) -> ApiResult<Value> {
        if !method.eq_ignore_ascii_case("GET") {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("unsupported api call method {method}"))
                .with_endpoint(endpoint));
        }
        self.request(endpoint, params, headers, true)
    }

    fn request(
        &self,
        endpoint: &str,
        params: &Params,
        headers: &Headers,
        with_session: bool,
    ) -> ApiResult<Value> {
        let url = self.inner.config.endpoint_url(endpoint, params)?;
        let mut headers = headers.clone();
        if with_session {
            if let Some(key) = &self.inner.key {
                headers.insert(SESSION_HEADER.to_string(), key.clone());
            }
        }
        tracing::debug!(endpoint, query = url.query().unwrap_or(""), "GET");
        let request = Request {
            method: "GET",
            url: &url,
            headers: &headers,
        };
        let response = self
            .inner
            .transport
            .send(&request)
            .map_err(|err| err.with_endpoint(endpoint))?;
        interpret(endpoint, response)
    }
}

fn interpret(endpoint: &str, response: HttpResponse) -> ApiResult<Value> {
    let status = response.status;
    if response
        .content_type
        .to_ascii_lowercase()
        .starts_with("text/html")
    {
        return Err(Error::new(ErrorKind::Protocol)
            .with_message("returned html, probably an error page")
            .with_endpoint(endpoint)
            .with_status(status));
    }
    if status == 401 {
        return Err(Error::new(ErrorKind::Authorization)
            .with_message(format!("not authorized to GET {endpoint}"))
            .with_endpoint(endpoint)
            .with_status(status));
    }
    if status >= 400 {
        return Err(Error::new(ErrorKind::Remote)
            .with_message(remote_message(status, &response.body))
            .with_endpoint(endpoint)
            .with_status(status));
    }
    serde_json::from_str(&response.body).map_err(|err| {
        Error::new(ErrorKind::Protocol)
            .with_message("invalid response json")
            .with_endpoint(endpoint)
            .with_status(status)
            .with_source(err)
    })
}

fn remote_message(status: u16, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|value| {
        value
            .get("Messages")
            .and_then(Value::as_array)
            .and_then(|messages| messages.first())
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    match detail {
        Some(detail) => format!("remote error status {status}: {detail}"),
        None => format!("remote error status {status}"),
    }
}

impl Gateway for Session {
    fn get_json(&self, endpoint: &str, params: &Params) -> ApiResult<Value> {
        self.get(endpoint, params)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.inner.config.host())
            .field("authenticated", &self.inner.key.is_some())
            .finish()
    }
}
