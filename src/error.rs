//! Unified error type.

use std::fmt;

use crate::parse::ParseError;

/// A boxed, thread-safe error from a foreign source (body streams, user code).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The error type returned by handlers, middleware and the [`Context`]
/// helpers.
///
/// Whatever a handler returns is routed to exactly one error-handler call for
/// that request. The default handler writes `to_string()` of the error as a
/// plain-text `500`, so the `Display` output of every variant is what a client
/// ends up reading.
///
/// [`Context`]: crate::Context
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A typed path or form accessor could not parse its input.
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    XmlDecode(#[from] quick_xml::DeError),

    #[error(transparent)]
    XmlEncode(#[from] quick_xml::SeError),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Form(#[from] serde_urlencoded::de::Error),

    /// CSV separators must be a single byte and cannot be a quote or newline.
    #[error("invalid csv separator {0:?}")]
    CsvSeparator(char),

    /// The request body stream failed while it was being read.
    #[error("reading request body: {0}")]
    Body(#[source] BoxError),

    /// The request body is single-pass and was already read.
    #[error("request body already consumed")]
    BodyConsumed,

    #[error("request body is not valid utf-8")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("no value stored under key {0:?}")]
    MissingValue(String),

    #[error("value stored under key {key:?} is not a {expected}")]
    ValueType { key: String, expected: &'static str },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Free-form message, see [`Error::msg`].
    #[error("{0}")]
    Message(String),

    /// Any other error, see [`Error::new`].
    #[error(transparent)]
    Other(BoxError),
}

impl Error {
    /// An error that displays exactly as `msg`.
    ///
    /// ```rust
    /// let err = pipemux::Error::msg("error");
    /// assert_eq!(err.to_string(), "error");
    /// ```
    pub fn msg(msg: impl fmt::Display) -> Self {
        Self::Message(msg.to_string())
    }

    /// Wraps a foreign error, keeping its `Display` output and source chain.
    pub fn new<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(err))
    }
}

impl From<BoxError> for Error {
    fn from(err: BoxError) -> Self {
        Self::Other(err)
    }
}
