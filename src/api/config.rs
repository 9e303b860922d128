//! Purpose: Connection settings for one service host.
//! Exports: `ClientConfig` and the default constants.
//! Role: Built by the application or CLI; consumed by the transport and session.
//! Invariants: The host is an http(s) URL stored without a trailing slash.
//! Invariants: Page size is at least 1; it is both `$top` and the squash page size.
use crate::core::error::{ApiResult, Error, ErrorKind};
use crate::core::page::Params;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_PAGE_SIZE: usize = 100;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_USER_AGENT: &str = concat!("salespad-client/", env!("CARGO_PKG_VERSION"));

pub const ENV_HOST: &str = "SALESPAD_HOST";
pub const ENV_PAGE_SIZE: &str = "SALESPAD_PAGE_SIZE";
pub const ENV_TIMEOUT_SECS: &str = "SALESPAD_TIMEOUT_SECS";
pub const ENV_TLS_CA_FILE: &str = "SALESPAD_TLS_CA_FILE";

#[derive(Clone, Debug)]
pub struct ClientConfig {
    host: String,
    timeout: Duration,
    page_size: usize,
    user_agent: String,
    tls_ca_file: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>) -> ApiResult<Self> {
        Ok(Self {
            host: normalize_host(host.into())?,
            timeout: DEFAULT_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            tls_ca_file: None,
        })
    }

    pub fn from_env() -> ApiResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let host = lookup(ENV_HOST).ok_or_else(|| {
            Error::new(ErrorKind::Usage)
                .with_message(format!("{ENV_HOST} is not set"))
                .with_hint("Set it to the service base url, e.g. https://salespad.example.com.")
        })?;
        let mut config = Self::new(host)?;
        if let Some(raw) = lookup(ENV_PAGE_SIZE) {
            config = config.with_page_size(parse_number(ENV_PAGE_SIZE, &raw)? as usize)?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            config = config.with_timeout(Duration::from_secs(parse_number(ENV_TIMEOUT_SECS, &raw)?));
        }
        if let Some(path) = lookup(ENV_TLS_CA_FILE) {
            config = config.with_tls_ca_file(path);
        }
        Ok(config)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> ApiResult<Self> {
        if page_size == 0 {
            return Err(Error::new(ErrorKind::Usage).with_message("page size must be at least 1"));
        }
        self.page_size = page_size;
        Ok(self)
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_tls_ca_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls_ca_file = Some(path.into());
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn tls_ca_file(&self) -> Option<&Path> {
        self.tls_ca_file.as_deref()
    }

    pub fn endpoint_url(&self, endpoint: &str, params: &Params) -> ApiResult<Url> {
        let mut url = Url::parse(&format!("{}{endpoint}", self.host)).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid endpoint url")
                .with_endpoint(endpoint)
                .with_source(err)
        })?;
        if !params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in params {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }
}

fn normalize_host(raw: String) -> ApiResult<String> {
    let mut url = Url::parse(raw.trim()).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message("invalid service host url")
            .with_source(err)
    })?;
    let scheme = url.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(
            Error::new(ErrorKind::Usage).with_message("service host must use http or https scheme")
        );
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn parse_number(name: &str, raw: &str) -> ApiResult<u64> {
    raw.trim().parse::<u64>().map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!("{name} must be a non-negative integer"))
            .with_source(err)
    })
}
