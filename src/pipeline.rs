//! Per-route dispatch: middleware chain, terminal handler, error handler.
//!
//! ```text
//! request ─► Context::new ─► mw[0] ─► mw[1] ─► … ─► handler ─► response
//!                              │        │              │
//!                              └────────┴── Err ───────┴─► error handler ─► response
//! ```
//!
//! The first error stops the request: later middleware and the handler never
//! run, and the error handler runs exactly once. Nothing is retried.

use std::sync::Arc;

use tracing::{Instrument, debug, debug_span};

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedHandler, Endpoint, ErrorHandler};
use crate::request::Request;
use crate::response::Response;

/// An immutable, shareable middleware chain.
///
/// Extending a chain builds a new one, so a chain captured by a route or a
/// group never changes afterwards.
#[derive(Clone, Default)]
pub(crate) struct Chain(Arc<[BoxedHandler]>);

impl Chain {
    /// A copy of this chain with `handlers` appended.
    pub(crate) fn extended(&self, handlers: impl IntoIterator<Item = BoxedHandler>) -> Self {
        Self(self.0.iter().cloned().chain(handlers).collect())
    }

    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }
}

/// Everything a registered route runs for one request.
pub(crate) struct Pipeline {
    middleware: Chain,
    handler: BoxedHandler,
    error_handler: ErrorHandler,
}

impl Pipeline {
    pub(crate) fn new(middleware: Chain, handler: BoxedHandler, error_handler: ErrorHandler) -> Self {
        Self { middleware, handler, error_handler }
    }

    /// Runs the chain and the handler against `ctx`, routing the first error
    /// to the error handler.
    pub(crate) async fn run(&self, ctx: &mut Context) {
        for (index, middleware) in self.middleware.0.iter().enumerate() {
            if let Err(err) = middleware.call(ctx).await {
                debug!(middleware = index, error = %err, "middleware failed");
                (self.error_handler)(ctx, err);
                return;
            }
        }

        if let Err(err) = self.handler.call(ctx).await {
            debug!(error = %err, "handler failed");
            (self.error_handler)(ctx, err);
        }
    }

    /// Binds the pipeline into a route table entry.
    ///
    /// The request's cancellation token fires when dispatch finishes or when
    /// the connection drops the future early.
    pub(crate) fn into_endpoint(self) -> Endpoint {
        let pipeline = Arc::new(self);
        Arc::new(move |req: Request| -> BoxFuture<'static, Response> {
            let pipeline = Arc::clone(&pipeline);
            let span = debug_span!("request", method = %req.method(), path = %req.uri().path());
            Box::pin(
                async move {
                    let mut ctx = Context::new(req);
                    let _cancel_on_exit = ctx.cancellation_token().clone().drop_guard();
                    pipeline.run(&mut ctx).await;
                    ctx.into_response()
                }
                .instrument(span),
            )
        })
    }
}
