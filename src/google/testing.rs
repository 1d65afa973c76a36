//! Scripted transport for unit tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{ApiRequest, ApiResponse, HttpTransport, TransportError};

struct Route {
    suffix: String,
    query: Vec<(String, String)>,
    replies: VecDeque<Result<ApiResponse, TransportError>>,
}

impl Route {
    fn matches(&self, request: &ApiRequest) -> bool {
        request.url.ends_with(&self.suffix)
            && self
                .query
                .iter()
                .all(|(k, v)| request.query_value(k) == Some(v.as_str()))
    }
}

/// Replies to requests by URL suffix (and optional query parameters).
///
/// Each route replays its replies in order; the last one repeats forever.
/// Unmatched requests get a 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, suffix: &str, query: &[(&str, &str)], reply: Result<ApiResponse, TransportError>) {
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut routes = self.routes.lock().unwrap();
        if let Some(route) = routes.iter_mut().find(|r| r.suffix == suffix && r.query == query) {
            route.replies.push_back(reply);
        } else {
            routes.push(Route {
                suffix: suffix.to_string(),
                query,
                replies: VecDeque::from([reply]),
            });
        }
    }

    pub fn respond(&self, suffix: &str, response: ApiResponse) {
        self.push(suffix, &[], Ok(response));
    }

    pub fn respond_json(&self, suffix: &str, body: serde_json::Value) {
        self.push(suffix, &[], Ok(ApiResponse::new(200, body.to_string())));
    }

    /// Reply only when every given query parameter matches
    pub fn respond_to_query(&self, suffix: &str, query: &[(&str, &str)], response: ApiResponse) {
        self.push(suffix, query, Ok(response));
    }

    pub fn fail(&self, suffix: &str, message: &str) {
        self.push(suffix, &[], Err(TransportError(message.to_string())));
    }

    /// Every request seen so far, in order
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }

    /// Number of requests whose URL ends with `suffix`
    pub fn calls(&self, suffix: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url.ends_with(suffix))
            .count()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.log.lock().unwrap().push(request.clone());

        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .iter_mut()
            .filter(|r| r.matches(request))
            .max_by_key(|r| r.query.len());

        match route {
            Some(route) if route.replies.len() > 1 => route.replies.pop_front().unwrap(),
            Some(route) => route.replies.front().cloned().unwrap(),
            None => Ok(ApiResponse::new(404, google_error(404, "unscripted"))),
        }
    }
}

/// Google-style JSON error body
pub fn google_error(code: u16, reason: &str) -> String {
    serde_json::json!({
        "error": {
            "code": code,
            "message": reason,
            "errors": [{ "reason": reason, "domain": "youtube" }]
        }
    })
    .to_string()
}
