//! Handler contract, error handlers, and adaptation to the route table.
//!
//! # Shape of a handler
//!
//! A handler borrows the request's [`Context`] mutably and reports failure by
//! returning an [`Error`] instead of writing an error response itself:
//!
//! ```text
//! for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Result<(), Error>>
//! ```
//!
//! Closures get there with `Box::pin`:
//!
//! ```rust
//! use pipemux::{Mux, StatusCode};
//!
//! let mut mux = Mux::new();
//! mux.handle_func("GET /hello", |ctx| Box::pin(async move {
//!     ctx.write_text(StatusCode::OK, "hello")
//! }));
//! ```
//!
//! Middleware have the same shape; they are just handlers that run first.
//!
//! # How handlers are stored
//!
//! Chains hold handlers of different concrete types, so every handler is
//! stored as a [`BoxedHandler`] (`Arc<dyn Handler>`). The per-request cost is
//! one virtual call and one boxed future per handler in the chain.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;
use tracing::debug;

use crate::context::Context;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// A heap-allocated, type-erased future.
///
/// `Send` so tokio may move a request between worker threads across `.await`
/// points.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler or middleware returns.
pub type HandlerResult = Result<(), Error>;

/// A terminal handler or middleware.
///
/// Implemented for every `Fn(&mut Context) -> BoxFuture<'_, HandlerResult>`.
/// Implement it on your own type when a middleware carries configuration:
///
/// ```rust
/// use pipemux::{BoxFuture, Context, Error, Handler, HandlerResult};
///
/// struct RequireHeader(&'static str);
///
/// impl Handler for RequireHeader {
///     fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
///         Box::pin(async move {
///             match ctx.header(self.0) {
///                 Some(_) => Ok(()),
///                 None => Err(Error::msg(format!("missing {} header", self.0))),
///             }
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, HandlerResult> {
        (self)(ctx)
    }
}

/// A type-erased handler shared by every route that uses it.
pub type BoxedHandler = Arc<dyn Handler>;

/// Boxes a closure as a [`BoxedHandler`], e.g. to pass several middleware to
/// [`Mux::pre_all`](crate::Mux::pre_all) at once.
pub fn handler<F>(f: F) -> BoxedHandler
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
{
    Arc::new(f)
}

// ── Error handlers ────────────────────────────────────────────────────────────

/// Turns an error surfaced by a handler or middleware into a response.
pub type ErrorHandler = Arc<dyn Fn(&mut Context, Error) + Send + Sync>;

/// Writes the error message and a newline as a plain-text `500`.
pub fn default_error_handler(ctx: &mut Context, err: Error) {
    ctx.error(StatusCode::INTERNAL_SERVER_ERROR, &err.to_string());
}

// ── Adaptation ────────────────────────────────────────────────────────────────

/// A route table entry: request in, response out. Shared across requests.
pub type Endpoint = Arc<dyn Fn(Request) -> BoxFuture<'static, Response> + Send + Sync>;

/// Adapts a handler to an [`Endpoint`] without any middleware or error
/// handler. An error the handler returns is logged and dropped; the response
/// is whatever the handler wrote before failing. The request's cancellation
/// token fires once the handler is done.
pub fn adapt<H: Handler>(handler: H) -> Endpoint {
    let handler = Arc::new(handler);
    Arc::new(move |req: Request| -> BoxFuture<'static, Response> {
        let handler = Arc::clone(&handler);
        Box::pin(async move {
            let mut ctx = Context::new(req);
            let _cancel_on_exit = ctx.cancellation_token().clone().drop_guard();
            if let Err(err) = handler.call(&mut ctx).await {
                debug!(error = %err, "handler error discarded");
            }
            ctx.into_response()
        })
    })
}
