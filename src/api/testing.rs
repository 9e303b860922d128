//! In-memory transport for unit tests of the api layer.
use crate::api::config::ClientConfig;
use crate::api::session::Session;
use crate::api::transport::{HttpResponse, Request, Transport};
use crate::core::error::ApiResult;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

type Handler = Box<dyn Fn(&Request<'_>) -> HttpResponse + Send + Sync>;

#[derive(Clone, Debug)]
pub struct SeenRequest {
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
pub struct FakeTransport {
    routes: Arc<Mutex<Vec<(String, Handler)>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F>(self, path: &str, handler: F) -> Self
    where
        F: Fn(&Request<'_>) -> HttpResponse + Send + Sync + 'static,
    {
        self.routes
            .lock()
            .expect("routes")
            .push((path.to_string(), Box::new(handler)));
        self
    }

    /// Serves `rows` as an offset-paged collection honoring `$top` and `$skip`.
    pub fn paged(self, path: &str, rows: Vec<Value>) -> Self {
        self.route(path, move |request| {
            let skip: usize = request
                .query("$skip")
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let top: usize = request
                .query("$top")
                .and_then(|v| v.parse().ok())
                .unwrap_or(rows.len());
            let page: Vec<Value> = rows.iter().skip(skip).take(top).cloned().collect();
            HttpResponse::json(200, json!({ "Items": page }).to_string())
        })
    }

    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().expect("seen").clone()
    }

    pub fn seen_for(&self, path: &str) -> Vec<SeenRequest> {
        self.seen()
            .into_iter()
            .filter(|request| request.path == path)
            .collect()
    }

    pub fn session(&self, page_size: usize) -> Session {
        let config = ClientConfig::new("http://salespad.test")
            .expect("config")
            .with_page_size(page_size)
            .expect("page size");
        Session::with_transport(config, self.clone()).with_key("0123456789abcdef0123456789abcdef")
    }
}

impl Transport for FakeTransport {
    fn send(&self, request: &Request<'_>) -> ApiResult<HttpResponse> {
        self.seen.lock().expect("seen").push(SeenRequest {
            path: request.path().to_string(),
            query: request.url.query_pairs().into_owned().collect(),
            headers: request.headers.clone(),
        });
        let routes = self.routes.lock().expect("routes");
        let response = routes
            .iter()
            .find(|(path, _)| path == request.path())
            .map(|(_, handler)| handler(request))
            .unwrap_or_else(|| HttpResponse::json(404, r#"{"Messages":["not found"]}"#));
        Ok(response)
    }
}
