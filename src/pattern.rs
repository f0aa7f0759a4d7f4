//! Route patterns: `"[METHOD ]/path"`.
//!
//! Path segments may be `{name}` (one segment) or, last, `{name...}` (the rest
//! of the path). A trailing `{$}` is accepted and means what every pattern
//! means here anyway: match the path exactly.

use std::fmt;
use std::str::FromStr;

use http::Method;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("empty pattern")]
    Empty,
    #[error("invalid method {0:?}")]
    Method(String),
    #[error("path {0:?} must start with '/'")]
    Path(String),
}

/// A parsed route pattern.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pattern {
    method: Option<Method>,
    path: String,
}

impl Pattern {
    pub fn parse(s: &str) -> Result<Self, PatternError> {
        let s = s.trim();
        if s.is_empty() {
            return Err(PatternError::Empty);
        }

        let (method, path) = match s.split_once(char::is_whitespace) {
            Some((method, path)) => {
                let method = Method::from_bytes(method.as_bytes())
                    .map_err(|_| PatternError::Method(method.to_owned()))?;
                (Some(method), path.trim_start())
            }
            None => (None, s),
        };

        if !path.starts_with('/') {
            return Err(PatternError::Path(path.to_owned()));
        }
        Ok(Self { method, path: path.to_owned() })
    }

    /// `None` matches every method.
    pub fn method(&self) -> Option<&Method> {
        self.method.as_ref()
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Puts `prefix` in front of the path, keeping the method.
    pub fn with_prefix(&self, prefix: &str) -> Self {
        Self { method: self.method.clone(), path: format!("{prefix}{}", self.path) }
    }

    /// The path in the route table's syntax: `{name...}` becomes `{*name}`
    /// and a trailing `{$}` is dropped.
    pub(crate) fn route_path(&self) -> String {
        let path = self.path.strip_suffix("{$}").unwrap_or(&self.path);
        path.split('/')
            .map(|segment| {
                match segment.strip_prefix('{').and_then(|s| s.strip_suffix("...}")) {
                    Some(name) => format!("{{*{name}}}"),
                    None => segment.to_owned(),
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl FromStr for Pattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{method} {}", self.path),
            None => f.write_str(&self.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_method_and_path() {
        let p = Pattern::parse("GET /users/{id}").unwrap();
        assert_eq!(p.method(), Some(&Method::GET));
        assert_eq!(p.path(), "/users/{id}");

        let p = Pattern::parse("/static").unwrap();
        assert_eq!(p.method(), None);
        assert_eq!(p.to_string(), "/static");
    }

    #[test]
    fn rejects_malformed_patterns() {
        assert_eq!(Pattern::parse("  "), Err(PatternError::Empty));
        assert_eq!(Pattern::parse("GET users"), Err(PatternError::Path("users".into())));
        assert!(matches!(Pattern::parse("G(T /x"), Err(PatternError::Method(_))));
    }

    #[test]
    fn prefix_goes_after_the_method() {
        let prefixed = |pattern: &str, prefix: &str| {
            Pattern::parse(pattern).unwrap().with_prefix(prefix).to_string()
        };
        assert_eq!(prefixed("GET /yoo", "/group"), "GET /group/yoo");
        assert_eq!(prefixed("/yoo", "/group"), "/group/yoo");
        assert_eq!(prefixed("POST  /c", "/a/b"), "POST /a/b/c");
        assert_eq!(prefixed("DELETE /x", "/api"), "DELETE /api/x");
    }

    #[test]
    fn translates_wildcards() {
        assert_eq!(Pattern::parse("/files/{path...}").unwrap().route_path(), "/files/{*path}");
        assert_eq!(Pattern::parse("/users/{id}").unwrap().route_path(), "/users/{id}");
        assert_eq!(Pattern::parse("/{$}").unwrap().route_path(), "/");
    }
}
