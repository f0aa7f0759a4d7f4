//! Radix-tree route table.
//!
//! One tree per HTTP method plus one for method-less patterns. O(path-length)
//! lookup. The table knows nothing about middleware or error handlers; it maps
//! a pattern to an [`Endpoint`] and dispatches to it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use http::header::{self, HeaderValue};
use http::{Method, StatusCode};
use http_body_util::Full;
use matchit::Router as MatchitRouter;
use tracing::debug;

use crate::error::BoxError;
use crate::handler::{BoxFuture, Endpoint};
use crate::pattern::Pattern;
use crate::request::{Params, Request, boxed};
use crate::response::Response;

/// The route table.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve)
/// or call it directly with [`Router::call`]. After that it is only read, so
/// it can be shared by every connection without locking.
#[derive(Default)]
pub struct Router {
    methods: HashMap<Method, MatchitRouter<Endpoint>>,
    any: MatchitRouter<Endpoint>,
}

enum Lookup {
    Found(Endpoint, Params),
    MethodNotAllowed(Vec<Method>),
    NotFound,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint for `pattern` (`"/path"` or `"METHOD /path"`).
    ///
    /// # Panics
    ///
    /// Panics if the pattern is malformed or conflicts with one already
    /// registered. Both are programming errors caught at startup.
    pub fn handle(&mut self, pattern: &str, endpoint: Endpoint) -> &mut Self {
        let pattern = Pattern::parse(pattern)
            .unwrap_or_else(|e| panic!("invalid pattern `{pattern}`: {e}"));
        self.insert(&pattern, endpoint);
        self
    }

    /// Registers a plain async function. See [`Router::handle`].
    pub fn handle_fn<F>(&mut self, pattern: &str, f: F) -> &mut Self
    where
        F: Fn(Request) -> BoxFuture<'static, Response> + Send + Sync + 'static,
    {
        self.handle(pattern, Arc::new(f))
    }

    pub(crate) fn insert(&mut self, pattern: &Pattern, endpoint: Endpoint) {
        let tree = match pattern.method() {
            Some(method) => self.methods.entry(method.clone()).or_default(),
            None => &mut self.any,
        };
        tree.insert(pattern.route_path(), endpoint)
            .unwrap_or_else(|e| panic!("invalid route `{pattern}`: {e}"));
        debug!(%pattern, "route registered");
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup {
        let exact = self.methods.get(method);
        let fallback = (*method == Method::HEAD).then(|| self.methods.get(&Method::GET)).flatten();

        for tree in [exact, fallback, Some(&self.any)].into_iter().flatten() {
            if let Ok(matched) = tree.at(path) {
                let params = matched.params.iter()
                    .map(|(k, v)| (k.to_owned(), v.to_owned()))
                    .collect();
                return Lookup::Found(Arc::clone(matched.value), params);
            }
        }

        let mut allowed: Vec<Method> = self.methods.iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(m, _)| m.clone())
            .collect();
        if allowed.is_empty() {
            return Lookup::NotFound;
        }
        if allowed.contains(&Method::GET) && !allowed.contains(&Method::HEAD) {
            allowed.push(Method::HEAD);
        }
        allowed.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Lookup::MethodNotAllowed(allowed)
    }

    /// Dispatches one request: routes it and runs the matched endpoint.
    ///
    /// Unmatched paths get `404`; paths registered only under other methods
    /// get `405` with an `Allow` header. The returned future does not borrow
    /// the router.
    pub fn call<B>(&self, req: http::Request<B>) -> BoxFuture<'static, Response>
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        match self.lookup(req.method(), req.uri().path()) {
            Lookup::Found(endpoint, params) => endpoint(Request::new(req.map(boxed), params)),
            Lookup::MethodNotAllowed(allowed) => {
                let allow = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
                let mut res = plain(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed\n");
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    res.headers_mut().insert(header::ALLOW, value);
                }
                Box::pin(async move { res })
            }
            Lookup::NotFound => {
                let res = plain(StatusCode::NOT_FOUND, "404 page not found\n");
                Box::pin(async move { res })
            }
        }
    }
}

fn plain(status: StatusCode, body: &'static str) -> Response {
    let mut res = http::Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *res.status_mut() = status;
    res.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    res.headers_mut().insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    res
}

// ── Registration table ────────────────────────────────────────────────────────

/// The route table while a [`Mux`](crate::Mux) and its groups are still
/// registering routes.
///
/// Shared by the mux and every group derived from it. Freezing hands the
/// table to whoever serves it; registering afterwards panics, since routes
/// may not change once traffic can arrive.
#[derive(Clone)]
pub(crate) struct RouteTable(Arc<Mutex<Option<Router>>>);

impl RouteTable {
    pub(crate) fn new(router: Router) -> Self {
        Self(Arc::new(Mutex::new(Some(router))))
    }

    pub(crate) fn insert(&self, pattern: &Pattern, endpoint: Endpoint) {
        let mut table = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        match table.as_mut() {
            Some(router) => router.insert(pattern, endpoint),
            None => panic!("route `{pattern}` registered after the mux was handed over for serving"),
        }
    }

    /// Takes the table out for serving.
    pub(crate) fn freeze(&self) -> Router {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::{BodyExt, Empty};

    fn text(body: &'static str) -> Endpoint {
        Arc::new(move |_req: Request| -> BoxFuture<'static, Response> {
            Box::pin(async move { http::Response::new(Full::new(Bytes::from_static(body.as_bytes()))) })
        })
    }

    async fn get(router: &Router, method: Method, path: &str) -> (StatusCode, String, Option<String>) {
        let req = http::Request::builder()
            .method(method)
            .uri(path)
            .body(Empty::<Bytes>::new())
            .unwrap();
        let res = router.call(req).await;
        let status = res.status();
        let allow = res.headers().get(header::ALLOW).map(|v| v.to_str().unwrap().to_owned());
        let body = res.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap(), allow)
    }

    #[tokio::test]
    async fn method_trees_and_fallbacks() {
        let mut router = Router::new();
        router
            .handle("GET /users/{id}", text("get"))
            .handle("POST /users/{id}", text("post"))
            .handle("/any", text("any"));

        assert_eq!(get(&router, Method::GET, "/users/1").await.1, "get");
        assert_eq!(get(&router, Method::POST, "/users/1").await.1, "post");
        assert_eq!(get(&router, Method::HEAD, "/users/1").await.0, StatusCode::OK);
        assert_eq!(get(&router, Method::PATCH, "/any").await.1, "any");
    }

    #[tokio::test]
    async fn unmatched_requests() {
        let mut router = Router::new();
        router.handle("GET /users/{id}", text("get"));

        let (status, body, _) = get(&router, Method::GET, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "404 page not found\n");

        let (status, _, allow) = get(&router, Method::DELETE, "/users/1").await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(allow.as_deref(), Some("GET, HEAD"));
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic() {
        let mut router = Router::new();
        router.handle("GET /x", text("a")).handle("GET /x", text("b"));
    }

    #[test]
    #[should_panic(expected = "after the mux was handed over")]
    fn frozen_table_rejects_routes() {
        let table = RouteTable::new(Router::new());
        let _router = table.freeze();
        table.insert(&Pattern::parse("/late").unwrap(), text("late"));
    }
}
