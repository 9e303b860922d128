//! Purpose: Send one HTTP request and hand back the raw status, content type, and body.
//! Exports: `Transport`, `Request`, `HttpResponse`, `Headers`, `UreqTransport`.
//! Role: Seam between the session and the network; tests swap in fakes.
//! Invariants: Non-2xx statuses are responses, not errors; only I/O failures are errors.
//! Invariants: Response interpretation (html pages, 401, json) belongs to the session.
use crate::api::config::ClientConfig;
use crate::core::error::{ApiResult, Error, ErrorKind};
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use url::Url;

pub type Headers = BTreeMap<String, String>;

#[derive(Clone, Debug)]
pub struct Request<'a> {
    pub method: &'a str,
    pub url: &'a Url,
    pub headers: &'a Headers,
}

impl Request<'_> {
    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn query(&self, name: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl HttpResponse {
    pub fn json(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type: "application/json".to_string(),
            body: body.into(),
        }
    }
}

pub trait Transport: Send + Sync {
    fn send(&self, request: &Request<'_>) -> ApiResult<HttpResponse>;
}

/// Blocking transport over a shared `ureq` agent.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(config: &ClientConfig) -> ApiResult<Self> {
        let mut builder = ureq::AgentBuilder::new()
            .timeout(config.timeout())
            .user_agent(config.user_agent());
        if let Some(path) = config.tls_ca_file() {
            builder = builder.tls_config(load_ca_bundle(path)?);
        }
        Ok(Self {
            agent: builder.build(),
        })
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &Request<'_>) -> ApiResult<HttpResponse> {
        let mut call = self
            .agent
            .request(request.method, request.url.as_str())
            .set("Accept", "application/json");
        for (name, value) in request.headers {
            call = call.set(name, value);
        }
        match call.call() {
            Ok(resp) => read_response(resp),
            Err(ureq::Error::Status(_, resp)) => read_response(resp),
            Err(ureq::Error::Transport(err)) => {
                let host = request.url.host_str().unwrap_or("service").to_string();
                let error = Error::new(ErrorKind::Transport)
                    .with_message(format!("request to {host} failed"))
                    .with_source(err);
                Err(error)
            }
        }
    }
}

fn read_response(response: ureq::Response) -> ApiResult<HttpResponse> {
    let status = response.status();
    let content_type = response.content_type().to_string();
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Transport)
            .with_message("failed to read response body")
            .with_status(status)
            .with_source(err)
    })?;
    Ok(HttpResponse {
        status,
        content_type,
        body,
    })
}

fn load_ca_bundle(path: &Path) -> ApiResult<Arc<ureq::rustls::ClientConfig>> {
    let shown = path.display();
    let cert_bytes = std::fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Configuration)
            .with_message(format!("failed to read TLS CA file {shown}"))
            .with_source(err)
    })?;
    let mut cert_reader = Cursor::new(cert_bytes);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            Error::new(ErrorKind::Configuration)
                .with_message(format!("failed to parse TLS CA file {shown}"))
                .with_source(err)
        })?;

    let _ = ureq::rustls::crypto::aws_lc_rs::default_provider().install_default();
    let mut root_store = ureq::rustls::RootCertStore::empty();
    let (added, _) = root_store.add_parsable_certificates(certs);
    if added == 0 {
        return Err(Error::new(ErrorKind::Configuration)
            .with_message(format!("TLS CA file {shown} contains no usable certificates")));
    }

    let tls_config = ureq::rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(Arc::new(tls_config))
}

#[cfg(test)]
mod tests {
    use super::{Headers, Request, UreqTransport};
    use crate::api::config::ClientConfig;
    use crate::core::error::ErrorKind;
    use std::io::Write;
    use url::Url;

    #[test]
    fn request_exposes_query_and_headers() {
        let url = Url::parse("http://localhost/api/Customer?%24top=5&%24skip=10").expect("url");
        let mut headers = Headers::new();
        headers.insert("Session-ID".to_string(), "abc".to_string());
        let request = Request {
            method: "GET",
            url: &url,
            headers: &headers,
        };
        assert_eq!(request.path(), "/api/Customer");
        assert_eq!(request.query("$skip").as_deref(), Some("10"));
        assert_eq!(request.query("$filter"), None);
        assert_eq!(request.header("session-id"), Some("abc"));
    }

    #[test]
    fn missing_ca_file_is_configuration_error() {
        let config = ClientConfig::new("https://sp.example.com")
            .expect("config")
            .with_tls_ca_file("/nonexistent/salespad-ca.pem");
        let err = UreqTransport::new(&config).err().expect("err");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn ca_file_without_certificates_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        writeln!(file, "not a certificate").expect("write");
        let config = ClientConfig::new("https://sp.example.com")
            .expect("config")
            .with_tls_ca_file(file.path());
        let err = UreqTransport::new(&config).err().expect("err");
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }
}
