//! Incoming request as the route table hands it to an endpoint.

use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;

use crate::error::BoxError;

/// Type-erased request body. Single-pass: once read, it is gone.
pub type Body = UnsyncBoxBody<Bytes, BoxError>;

/// Matched path parameters in pattern order.
pub type Params = Vec<(String, String)>;

/// Erases any `hyper`-compatible body into a [`Body`].
pub fn boxed<B>(body: B) -> Body
where
    B: hyper::body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// Peer socket address of the connection a request arrived on.
///
/// The [`Server`](crate::Server) inserts it into every request's extensions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PeerAddr(pub SocketAddr);

/// An incoming HTTP request together with the parameters its route matched.
pub struct Request {
    pub(crate) inner: http::Request<Body>,
    pub(crate) params: Params,
}

impl Request {
    pub fn new(inner: http::Request<Body>, params: Params) -> Self {
        Self { inner, params }
    }

    pub fn method(&self) -> &http::Method { self.inner.method() }
    pub fn uri(&self) -> &http::Uri { self.inner.uri() }
    pub fn headers(&self) -> &http::HeaderMap { self.inner.headers() }
    pub fn params(&self) -> &[(String, String)] { &self.params }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn into_parts(self) -> (http::request::Parts, Body, Params) {
        let (parts, body) = self.inner.into_parts();
        (parts, body, self.params)
    }
}
