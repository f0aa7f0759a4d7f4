//! Outgoing response: the [`ResponseSink`] a [`Context`] writes into, and the
//! typed writers built on top of it.
//!
//! The sink behaves like a streaming response writer. Headers can be edited
//! until the status is committed; the first [`write_header`] wins; the first
//! body write commits `200 OK` if nothing was committed yet. Bytes written are
//! never taken back.
//!
//! JSON and XML are encoded in full before anything is committed, so an
//! encoder error leaves the response untouched for the error handler. CSV
//! streams record by record; a record failing halfway keeps the records
//! already written.
//!
//! [`write_header`]: ResponseSink::write_header

use std::io;

use bytes::{BufMut, Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderValue};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;
use tracing::warn;

use crate::context::Context;
use crate::error::Error;

/// The response type every endpoint produces.
pub type Response = http::Response<Full<Bytes>>;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Content types set by the typed writers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Csv,  // text/csv
    Html, // application/html
    Json, // application/json
    Text, // text/plain
    Xml,  // application/xml
}

impl ContentType {
    /// Wire value of the content type.
    ///
    /// `Html` is `application/html`, not the registered `text/html`. Clients
    /// of earlier releases match on that exact value; write `text/html`
    /// yourself through [`Context::header_mut`] where that matters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv  => "text/csv",
            Self::Html => "application/html",
            Self::Json => "application/json",
            Self::Text => "text/plain",
            Self::Xml  => "application/xml",
        }
    }

    fn header_value(self) -> HeaderValue {
        HeaderValue::from_static(self.as_str())
    }
}

// ── ResponseSink ──────────────────────────────────────────────────────────────

/// Buffered response writer owned by one request.
#[derive(Debug, Default)]
pub struct ResponseSink {
    headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
}

impl ResponseSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Headers that will be sent with the status line.
    ///
    /// After the status is committed, edits land in a scratch map and never
    /// reach the client.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn headers(&self) -> &HeaderMap {
        match &self.committed {
            Some((_, headers)) => headers,
            None => &self.headers,
        }
    }

    /// Commits the status line together with the current headers.
    pub fn write_header(&mut self, status: StatusCode) {
        if let Some((sent, _)) = &self.committed {
            warn!(%sent, ignored = %status, "superfluous write_header call");
            return;
        }
        self.committed = Some((status, std::mem::take(&mut self.headers)));
    }

    /// Appends body bytes, committing `200 OK` first if needed.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        if self.committed.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.body.put_slice(buf);
        buf.len()
    }

    /// The committed status, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.committed.as_ref().map(|(status, _)| *status)
    }

    pub fn is_committed(&self) -> bool {
        self.committed.is_some()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Finishes the response. Nothing committed means an empty `200 OK`
    /// carrying whatever headers were set.
    pub fn into_response(self) -> Response {
        let (status, headers) = self.committed.unwrap_or((StatusCode::OK, self.headers));
        let mut res = http::Response::new(Full::new(self.body.freeze()));
        *res.status_mut() = status;
        *res.headers_mut() = headers;
        res
    }
}

impl io::Write for ResponseSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(ResponseSink::write(self, buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// ── Typed writers ─────────────────────────────────────────────────────────────

/// CSV separators must fit in one byte and cannot collide with quoting or
/// record terminators.
pub(crate) fn csv_separator(separator: char) -> Result<u8, Error> {
    match u8::try_from(separator) {
        Ok(b) if b.is_ascii() && !matches!(b, b'"' | b'\r' | b'\n') => Ok(b),
        _ => Err(Error::CsvSeparator(separator)),
    }
}

impl Context {
    /// Commits `status` with no body.
    pub fn no_content(&mut self, status: StatusCode) -> Result<(), Error> {
        self.response.write_header(status);
        Ok(())
    }

    /// Sets `Location: url` and commits `status`.
    pub fn redirect(&mut self, status: StatusCode, url: &str) -> Result<(), Error> {
        let location = HeaderValue::try_from(url).map_err(Error::new)?;
        self.response.headers_mut().insert(header::LOCATION, location);
        self.response.write_header(status);
        Ok(())
    }

    /// Writes `value` as JSON followed by a newline.
    pub fn write_json<T>(&mut self, status: StatusCode, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        let mut body = serde_json::to_vec(value)?;
        body.push(b'\n');
        self.start(status, ContentType::Json);
        self.response.write(&body);
        Ok(())
    }

    /// Writes `value` as XML. The root element is named after the value's
    /// type, so `value` must be a struct or an enum.
    pub fn write_xml<T>(&mut self, status: StatusCode, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        let xml = quick_xml::se::to_string(value)?;
        self.start(status, ContentType::Xml);
        self.response.write(xml.as_bytes());
        Ok(())
    }

    /// Writes `value` as XML under an explicit root element. Use this for
    /// maps and sequences.
    pub fn write_xml_with_root<T>(
        &mut self,
        status: StatusCode,
        root: &str,
        value: &T,
    ) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        let xml = quick_xml::se::to_string_with_root(root, value)?;
        self.start(status, ContentType::Xml);
        self.response.write(xml.as_bytes());
        Ok(())
    }

    /// Writes `rows` as CSV records separated by `separator`, terminated by
    /// `\r\n` when `crlf` is set and `\n` otherwise. Rows may differ in length.
    ///
    /// An unusable separator is rejected before anything is written.
    ///
    /// Quoting follows the `csv` crate: a record made of a single empty
    /// field is written as `""` so it survives a round trip, and fields with
    /// leading spaces are left unquoted.
    pub fn write_csv<I, R, F>(
        &mut self,
        status: StatusCode,
        crlf: bool,
        separator: char,
        rows: I,
    ) -> Result<(), Error>
    where
        I: IntoIterator<Item = R>,
        R: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let delimiter = csv_separator(separator)?;
        self.start(status, ContentType::Csv);

        let terminator = if crlf { csv::Terminator::CRLF } else { csv::Terminator::Any(b'\n') };
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .terminator(terminator)
            .flexible(true)
            .from_writer(&mut self.response);
        for row in rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn write_html(&mut self, status: StatusCode, html: &str) -> Result<(), Error> {
        self.start(status, ContentType::Html);
        self.response.write(html.as_bytes());
        Ok(())
    }

    pub fn write_text(&mut self, status: StatusCode, text: &str) -> Result<(), Error> {
        self.start(status, ContentType::Text);
        self.response.write(text.as_bytes());
        Ok(())
    }

    /// Writes `msg` and a newline as a plain-text error body with `status`.
    pub fn error(&mut self, status: StatusCode, msg: &str) {
        let headers = self.response.headers_mut();
        headers.remove(header::CONTENT_LENGTH);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        headers.insert(header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
        self.response.write_header(status);
        self.response.write(msg.as_bytes());
        self.response.write(b"\n");
    }

    /// Raw body write. Commits `200 OK` if no status was written yet.
    pub fn write(&mut self, buf: &[u8]) -> usize {
        self.response.write(buf)
    }

    pub fn write_str(&mut self, s: &str) -> usize {
        self.response.write(s.as_bytes())
    }

    /// Sets the content type, then commits the status: header edits must
    /// precede the status line.
    fn start(&mut self, status: StatusCode, content_type: ContentType) {
        self.response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type.header_value());
        self.response.write_header(status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_status_wins() {
        let mut sink = ResponseSink::new();
        sink.write_header(StatusCode::CREATED);
        sink.write_header(StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(sink.into_response().status(), StatusCode::CREATED);
    }

    #[test]
    fn body_write_commits_ok() {
        let mut sink = ResponseSink::new();
        sink.write(b"hi");
        assert_eq!(sink.status(), Some(StatusCode::OK));
        sink.write_header(StatusCode::NOT_FOUND);
        assert_eq!(sink.status(), Some(StatusCode::OK));
    }

    #[test]
    fn headers_after_commit_do_not_reach_the_response() {
        let mut sink = ResponseSink::new();
        sink.headers_mut().insert("x-before", HeaderValue::from_static("1"));
        sink.write_header(StatusCode::ACCEPTED);
        sink.headers_mut().insert("x-after", HeaderValue::from_static("1"));

        let res = sink.into_response();
        assert!(res.headers().contains_key("x-before"));
        assert!(!res.headers().contains_key("x-after"));
    }

    #[test]
    fn untouched_sink_is_empty_ok() {
        let res = ResponseSink::new().into_response();
        assert_eq!(res.status(), StatusCode::OK);
        assert!(res.headers().is_empty());
    }

    #[test]
    fn separators() {
        assert_eq!(csv_separator(',').unwrap(), b',');
        assert_eq!(csv_separator('\t').unwrap(), b'\t');
        assert!(csv_separator('"').is_err());
        assert!(csv_separator('\n').is_err());
        assert!(csv_separator('é').is_err());
    }
}
