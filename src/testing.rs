//! In-memory [`Transport`] for tests
//!
//! A [`MockTransport`] routes each request to a handler registered for its
//! method and path, and remembers every request it received.
//!
//! ```rust
//! use remora::api::Method;
//! use remora::testing::{MockResponse, MockTransport};
//! use serde_json::json;
//!
//! let transport = MockTransport::new()
//!     .reply(Method::Get, "/categories", json!({"categories": []}))
//!     .route(Method::Get, "/posts/{id}", |_, params| {
//!         MockResponse::ok(json!({"postFound": {"_id": params["id"]}}))
//!     });
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use matchit::Router;
use serde_json::{json, Value};

use crate::api::{Method, Request, Response, Transport};
use crate::error::Error;
use crate::errors::NetworkError;

/// Canned answer of a mock route
#[derive(Debug, Clone)]
pub struct MockResponse {
    outcome: Result<Response, String>,
    delay: Option<Duration>,
}

impl MockResponse {
    pub fn ok(body: Value) -> Self {
        Self::status(200, body)
    }

    pub fn status(status: u16, body: Value) -> Self {
        Self {
            outcome: Ok(Response { status, body }),
            delay: None,
        }
    }

    /// Fail the request as if the server could not be reached
    pub fn network_error(reason: impl Into<String>) -> Self {
        Self {
            outcome: Err(reason.into()),
            delay: None,
        }
    }

    /// Wait before answering
    pub fn with_delay(self, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..self
        }
    }
}

type Handler = Arc<dyn Fn(&Request, &HashMap<String, String>) -> MockResponse + Send + Sync>;

struct Routes {
    get: Router<Handler>,
    post: Router<Handler>,
    put: Router<Handler>,
    delete: Router<Handler>,
}

impl Default for Routes {
    fn default() -> Self {
        Self {
            get: Router::new(),
            post: Router::new(),
            put: Router::new(),
            delete: Router::new(),
        }
    }
}

impl Routes {
    fn for_method(&mut self, method: Method) -> &mut Router<Handler> {
        match method {
            Method::Get => &mut self.get,
            Method::Post => &mut self.post,
            Method::Put => &mut self.put,
            Method::Delete => &mut self.delete,
        }
    }
}

/// Transport answering from registered routes
///
/// Routes use the `matchit` syntax, e.g. `/posts/{id}`. Requests with no
/// matching route get a 404. Clones share the routes and the request log.
#[cfg_attr(docsrs, doc(cfg(debug_assertions)))]
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<Routes>>,
    log: Arc<Mutex<Vec<Request>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer requests to the route with the handler
    ///
    /// # Panics
    ///
    /// This function will panic if the route is malformed or conflicts with
    /// a route already registered for the method
    pub fn route<F>(self, method: Method, route: &str, handler: F) -> Self
    where
        F: Fn(&Request, &HashMap<String, String>) -> MockResponse + Send + Sync + 'static,
    {
        {
            let mut routes = self.routes.lock().expect("mock routes poisoned");
            routes
                .for_method(method)
                .insert(route, Arc::new(handler) as Handler)
                .expect("invalid mock route");
        }
        self
    }

    /// Answer requests to the route with a fixed 200 response
    pub fn reply(self, method: Method, route: &str, body: Value) -> Self {
        self.route(method, route, move |_, _| MockResponse::ok(body.clone()))
    }

    /// Every request received so far, in order
    pub fn requests(&self) -> Vec<Request> {
        self.log.lock().expect("mock log poisoned").clone()
    }

    /// Number of requests received for the exact method and path
    pub fn count(&self, method: Method, path: &str) -> usize {
        self.log
            .lock()
            .expect("mock log poisoned")
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    /// Requests received for the exact method and path
    pub fn requests_to(&self, method: Method, path: &str) -> Vec<Request> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    fn respond(&self, request: &Request) -> MockResponse {
        let found = {
            let mut routes = self.routes.lock().expect("mock routes poisoned");
            routes
                .for_method(request.method)
                .at(&request.path)
                .ok()
                .map(|matched| {
                    let params: HashMap<String, String> = matched
                        .params
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect();
                    (matched.value.clone(), params)
                })
        };

        match found {
            // the lock is released so handlers may use the transport
            Some((handler, params)) => handler(request, &params),
            None => MockResponse::status(404, json!({"message": "Route not found"})),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        self.log
            .lock()
            .expect("mock log poisoned")
            .push(request.clone());

        let MockResponse { outcome, delay } = self.respond(&request);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome.map_err(|reason| NetworkError::new(reason).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn it_routes_by_method_and_path() {
        let transport = MockTransport::new()
            .route(Method::Get, "/posts/{id}", |_, params| {
                MockResponse::ok(json!({"id": params["id"]}))
            })
            .reply(Method::Put, "/posts/{id}", json!({"message": "updated"}))
            .reply(Method::Post, "/posts/create", json!({"message": "created"}));

        let res = transport
            .send(Request::new(Method::Get, "/posts/p1"))
            .await
            .unwrap();
        assert_eq!(res.body, json!({"id": "p1"}));

        let res = transport
            .send(Request::new(Method::Post, "/posts/create"))
            .await
            .unwrap();
        assert_eq!(res.body, json!({"message": "created"}));

        let res = transport
            .send(Request::new(Method::Delete, "/posts/p1"))
            .await
            .unwrap();
        assert_eq!(res.status, 404);

        assert_eq!(transport.count(Method::Get, "/posts/p1"), 1);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn it_simulates_unreachable_servers() {
        let transport = MockTransport::new().route(Method::Get, "/profile", |_, _| {
            MockResponse::network_error("connection refused")
        });
        let err = transport
            .send(Request::new(Method::Get, "/profile"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
