//! # pipemux
//!
//! Middleware composition, grouped routes and centralized error handling on
//! top of hyper. Nothing more. Nothing less.
//!
//! ## The contract
//!
//! Handlers and middleware share one shape: they get the request's
//! [`Context`] and return `Result<(), Error>`. They never write error
//! responses themselves; an error from anywhere in the chain ends the request
//! and goes to the scope's error handler, which by default writes the message
//! as a plain-text `500`.
//!
//! For every request the dispatch pipeline:
//!
//! 1. builds a fresh [`Context`],
//! 2. runs the middleware in registration order, stopping at the first error,
//! 3. runs the route's handler,
//! 4. hands any error to the error handler, exactly once.
//!
//! What the host stack already owns, pipemux reuses as is:
//!
//! - Routing: radix trees via [`matchit`], one per method
//! - Connections: hyper, HTTP/1.1 and HTTP/2
//! - Codecs: serde_json, quick-xml, csv, serde_urlencoded
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use pipemux::{Error, Mux, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut mux = Mux::new();
//!
//!     mux.pre(|ctx| Box::pin(async move {
//!         if ctx.header("x-api-key").is_none() {
//!             return Err(Error::msg("missing api key"));
//!         }
//!         Ok(())
//!     }));
//!
//!     let mut users = mux.group("/users");
//!     users.handle_func("GET /{id}", |ctx| Box::pin(async move {
//!         let id = ctx.path_int("id", 10, 64)?;
//!         ctx.write_json(StatusCode::OK, &serde_json::json!({ "id": id }))
//!     }));
//!
//!     Server::bind("0.0.0.0:3000").serve(mux).await.unwrap();
//! }
//! ```
//!
//! ## Scopes
//!
//! A [`Mux`] and the [`Group`]s derived from it are scopes: a path prefix, a
//! middleware chain and an error handler. Every registration and every derived
//! group takes a snapshot of the chain, so adding middleware later never
//! changes routes or groups that already exist. There is no process-wide
//! default mux; build one and pass it where it is needed.

mod ambient;
mod context;
mod error;
mod group;
mod handler;
mod mux;
mod pattern;
mod pipeline;
mod request;
mod router;
mod server;

pub mod parse;
pub mod response;

pub use ambient::Ambient;
pub use context::{Context, TRUE_CLIENT_IP};
pub use error::{BoxError, Error};
pub use group::Group;
pub use handler::{
    BoxFuture, BoxedHandler, Endpoint, ErrorHandler, Handler, HandlerResult, adapt,
    default_error_handler, handler,
};
pub use http::{Method, StatusCode};
pub use mux::Mux;
pub use parse::{Complex, ParseError};
pub use pattern::{Pattern, PatternError};
pub use request::{Body, Params, PeerAddr, Request, boxed};
pub use response::{ContentType, Response, ResponseSink};
pub use router::Router;
pub use server::Server;
