//! Per-request facade handed to every handler and middleware.
//!
//! A [`Context`] owns one request: its head and single-pass body, the path
//! parameters its route matched, the [`ResponseSink`] the response is written
//! into, the request's [`Ambient`] scope, and a small key-value store that
//! middleware use to pass data down the chain.
//!
//! Nothing in a `Context` is shared with other requests, so none of it is
//! synchronised. The store is only allocated on the first [`set`]; reading
//! before that behaves exactly like reading an empty store.
//!
//! The typed writers (`write_json`, `write_csv`, ...) live in
//! [`response`](crate::response).
//!
//! [`set`]: Context::set

use std::any::{Any, type_name};
use std::cell::OnceCell;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use http::{Extensions, Method, Uri};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ambient::Ambient;
use crate::error::Error;
use crate::parse::{self, Complex, ParseError};
use crate::request::{Body, Params, PeerAddr, Request};
use crate::response::{Response, ResponseSink, csv_separator};

/// Header consulted before the peer address by [`Context::true_client_ip`].
pub const TRUE_CLIENT_IP: HeaderName = HeaderName::from_static("true-client-ip");

type Values = HashMap<String, Box<dyn Any + Send + Sync>>;

/// Request and response of one in-flight request.
pub struct Context {
    parts: http::request::Parts,
    body: Option<Body>,
    params: Params,
    ambient: Ambient,
    values: Option<Values>,
    form: OnceCell<Vec<(String, String)>>,
    form_parsed: bool,
    pub(crate) response: ResponseSink,
}

impl Context {
    /// Builds the context for `req`. Its [`Ambient`] is a child of the one in
    /// the request extensions, or a fresh root.
    pub fn new(req: Request) -> Self {
        let (parts, body, params) = req.into_parts();
        let ambient = parts
            .extensions
            .get::<Ambient>()
            .map(Ambient::child)
            .unwrap_or_default();
        Self {
            parts,
            body: Some(body),
            params,
            ambient,
            values: None,
            form: OnceCell::new(),
            form_parsed: false,
            response: ResponseSink::new(),
        }
    }

    /// Consumes the context and produces what was written to it.
    pub fn into_response(self) -> Response {
        self.response.into_response()
    }

    // ── Request head ─────────────────────────────────────────────────────────

    pub fn method(&self) -> &Method { &self.parts.method }
    pub fn uri(&self) -> &Uri { &self.parts.uri }
    pub fn path(&self) -> &str { self.parts.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.parts.headers }
    pub fn extensions(&self) -> &Extensions { &self.parts.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.parts.extensions }

    /// First value of a request header, if it is valid text.
    pub fn header(&self, name: impl header::AsHeaderName) -> Option<&str> {
        self.parts.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Peer address recorded by the server, if any.
    pub fn remote_addr(&self) -> Option<std::net::SocketAddr> {
        self.parts.extensions.get::<PeerAddr>().map(|p| p.0)
    }

    /// The `True-Client-IP` header set by a trusted proxy, else the peer
    /// address (`ip:port`), else an empty string.
    pub fn true_client_ip(&self) -> String {
        if let Some(ip) = self.header(TRUE_CLIENT_IP) {
            return ip.to_owned();
        }
        self.remote_addr().map(|a| a.to_string()).unwrap_or_default()
    }

    /// Value of the request cookie `name`. Surrounding double quotes are
    /// stripped.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().find(|(k, _)| *k == name).map(|(_, v)| v)
    }

    /// Every `name=value` pair of every `Cookie` header, in order. Pairs
    /// without `=` or with an empty name are skipped.
    pub fn cookies(&self) -> impl Iterator<Item = (&str, &str)> {
        self.parts
            .headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|line| line.split(';'))
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                let value = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                (!name.is_empty()).then_some((name, value))
            })
    }

    // ── Response head ────────────────────────────────────────────────────────

    /// Response headers. Edits after the status was written are dropped.
    pub fn header_mut(&mut self) -> &mut HeaderMap {
        self.response.headers_mut()
    }

    pub fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.response.headers_mut().insert(name, value);
    }

    /// Commits the status line. Only the first call has an effect.
    pub fn write_header(&mut self, status: http::StatusCode) {
        self.response.write_header(status);
    }

    pub fn response(&self) -> &ResponseSink {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut ResponseSink {
        &mut self.response
    }

    // ── Key-value store ──────────────────────────────────────────────────────

    /// Stores `value` under `key`, replacing any previous entry.
    pub fn set<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.values
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), Box::new(value));
    }

    /// Looks `key` up in the store, then in the ambient value chain.
    ///
    /// Returns `None` when the key is absent or holds something other than a
    /// `T`. A store entry of the wrong type hides an ambient value under the
    /// same key.
    pub fn value<T: Any>(&self, key: &str) -> Option<&T> {
        self.lookup(key)?.downcast_ref()
    }

    /// Like [`value`](Context::value) but says why nothing came back.
    pub fn try_value<T: Any>(&self, key: &str) -> Result<&T, Error> {
        self.lookup(key)
            .ok_or_else(|| Error::MissingValue(key.to_owned()))?
            .downcast_ref()
            .ok_or_else(|| Error::ValueType { key: key.to_owned(), expected: type_name::<T>() })
    }

    fn lookup(&self, key: &str) -> Option<&(dyn Any + Send + Sync)> {
        if let Some(v) = self.values.as_ref().and_then(|m| m.get(key)) {
            return Some(&**v);
        }
        self.ambient.value(key)
    }

    // ── Ambient scope ────────────────────────────────────────────────────────

    pub fn ambient(&self) -> &Ambient {
        &self.ambient
    }

    /// Derives the request's ambient scope with `key` bound to `value`.
    ///
    /// Unlike [`set`](Context::set), the value travels with
    /// [`ambient`](Context::ambient) into whatever the handler passes it to.
    pub fn with_value<T>(&mut self, key: impl Into<String>, value: T) -> &mut Self
    where
        T: Any + Send + Sync,
    {
        self.ambient = self.ambient.with_value(key, value);
        self
    }

    pub fn with_deadline(&mut self, deadline: Instant) -> &mut Self {
        self.ambient = self.ambient.with_deadline(deadline);
        self
    }

    pub fn with_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.ambient = self.ambient.with_timeout(timeout);
        self
    }

    /// Fires when the request finishes, its client goes away, or it is
    /// cancelled explicitly.
    pub fn cancellation_token(&self) -> &CancellationToken {
        self.ambient.token()
    }

    pub fn is_done(&self) -> bool {
        self.ambient.is_done()
    }

    /// Resolves once the request is cancelled or past its deadline.
    ///
    /// The future owns a handle to the scope, so a handler can await it
    /// without keeping the context borrowed.
    pub fn done(&self) -> impl Future<Output = ()> + Send + 'static {
        let ambient = self.ambient.clone();
        async move { ambient.done().await }
    }

    // ── Path and form parameters ─────────────────────────────────────────────

    /// A path parameter matched by the route, e.g. `id` in `/users/{id}`.
    pub fn path_value(&self, name: &str) -> Option<&str> {
        self.params.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// First value of a form field.
    ///
    /// Reads the query string until [`parse_form`](Context::parse_form) ran;
    /// from then on values from an urlencoded body come first. Use
    /// [`form`](Context::form) to have the body parsed on demand.
    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .get_or_init(|| query_pairs(&self.parts.uri))
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Merges an `application/x-www-form-urlencoded` body of a POST, PUT or
    /// PATCH request ahead of the query string for
    /// [`form_value`](Context::form_value). Other requests keep the query
    /// string only, and their body stays unread.
    pub async fn parse_form(&mut self) -> Result<(), Error> {
        let mut pairs: Vec<(String, String)> = Vec::new();
        if self.has_form_body() {
            let bytes = self.body_bytes().await?;
            pairs = serde_urlencoded::from_bytes(&bytes)?;
        }
        pairs.extend(query_pairs(&self.parts.uri));
        self.form = OnceCell::from(pairs);
        self.form_parsed = true;
        Ok(())
    }

    /// First value of a form field, running [`parse_form`](Context::parse_form)
    /// first if it has not run yet.
    pub async fn form(&mut self, name: &str) -> Result<Option<&str>, Error> {
        if !self.form_parsed {
            self.parse_form().await?;
        }
        Ok(self.form_value(name))
    }

    fn has_form_body(&self) -> bool {
        let method = &self.parts.method;
        if !(method == Method::POST || method == Method::PUT || method == Method::PATCH) {
            return false;
        }
        self.header(header::CONTENT_TYPE)
            .and_then(|ct| ct.split(';').next())
            .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/x-www-form-urlencoded"))
    }

    pub fn path_int(&self, name: &str, base: u32, bits: u32) -> Result<i64, ParseError> {
        parse::parse_int(self.path_value(name).unwrap_or_default(), base, bits)
    }

    pub fn path_uint(&self, name: &str, base: u32, bits: u32) -> Result<u64, ParseError> {
        parse::parse_uint(self.path_value(name).unwrap_or_default(), base, bits)
    }

    pub fn path_float(&self, name: &str, bits: u32) -> Result<f64, ParseError> {
        parse::parse_float(self.path_value(name).unwrap_or_default(), bits)
    }

    pub fn path_bool(&self, name: &str) -> Result<bool, ParseError> {
        parse::parse_bool(self.path_value(name).unwrap_or_default())
    }

    pub fn path_complex(&self, name: &str, bits: u32) -> Result<Complex, ParseError> {
        parse::parse_complex(self.path_value(name).unwrap_or_default(), bits)
    }

    /// Like [`path_int`](Context::path_int) for a form field. An urlencoded
    /// body is only seen after [`parse_form`](Context::parse_form).
    pub fn form_int(&self, name: &str, base: u32, bits: u32) -> Result<i64, ParseError> {
        parse::parse_int(self.form_value(name).unwrap_or_default(), base, bits)
    }

    /// Form counterpart of [`path_uint`](Context::path_uint); query string
    /// only until [`parse_form`](Context::parse_form) ran.
    pub fn form_uint(&self, name: &str, base: u32, bits: u32) -> Result<u64, ParseError> {
        parse::parse_uint(self.form_value(name).unwrap_or_default(), base, bits)
    }

    /// Query string only until [`parse_form`](Context::parse_form) ran.
    pub fn form_float(&self, name: &str, bits: u32) -> Result<f64, ParseError> {
        parse::parse_float(self.form_value(name).unwrap_or_default(), bits)
    }

    /// Query string only until [`parse_form`](Context::parse_form) ran.
    pub fn form_bool(&self, name: &str) -> Result<bool, ParseError> {
        parse::parse_bool(self.form_value(name).unwrap_or_default())
    }

    /// Query string only until [`parse_form`](Context::parse_form) ran.
    pub fn form_complex(&self, name: &str, bits: u32) -> Result<Complex, ParseError> {
        parse::parse_complex(self.form_value(name).unwrap_or_default(), bits)
    }

    // ── Body readers ─────────────────────────────────────────────────────────

    /// Reads the whole body. The body is single-pass: a second read of any
    /// kind fails with [`Error::BodyConsumed`].
    pub async fn body_bytes(&mut self) -> Result<Bytes, Error> {
        let body = self.body.take().ok_or(Error::BodyConsumed)?;
        let collected = body.collect().await.map_err(Error::Body)?;
        Ok(collected.to_bytes())
    }

    pub async fn read_text(&mut self) -> Result<String, Error> {
        let bytes = self.body_bytes().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    pub async fn read_json<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let bytes = self.body_bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn read_xml<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let bytes = self.body_bytes().await?;
        Ok(quick_xml::de::from_reader(&bytes[..])?)
    }

    /// Reads an urlencoded body into `T`, ignoring the query string.
    pub async fn read_form<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        let bytes = self.body_bytes().await?;
        Ok(serde_urlencoded::from_bytes(&bytes)?)
    }

    /// Reads CSV records without a header row. Every record must have as
    /// many fields as the first one.
    pub async fn read_csv(&mut self, separator: char) -> Result<Vec<Vec<String>>, Error> {
        let delimiter = csv_separator(separator)?;
        let bytes = self.body_bytes().await?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .from_reader(&bytes[..]);
        reader
            .records()
            .map(|record| -> Result<Vec<String>, Error> {
                Ok(record?.iter().map(str::to_owned).collect())
            })
            .collect()
    }

    /// Reads CSV with a header row, deserializing each record into `T` by
    /// column name.
    pub async fn read_csv_as<T: DeserializeOwned>(&mut self, separator: char) -> Result<Vec<T>, Error> {
        let delimiter = csv_separator(separator)?;
        let bytes = self.body_bytes().await?;
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .from_reader(&bytes[..]);
        reader
            .deserialize::<T>()
            .map(|record| record.map_err(Error::from))
            .collect()
    }
}

/// Query string pairs. A malformed query reads as empty.
fn query_pairs(uri: &Uri) -> Vec<(String, String)> {
    uri.query()
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default()
}
