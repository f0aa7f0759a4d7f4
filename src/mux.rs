//! The root registration scope.

use std::sync::Arc;

use tracing::debug;

use crate::context::Context;
use crate::error::Error;
use crate::group::Group;
use crate::handler::{
    BoxFuture, BoxedHandler, ErrorHandler, Handler, HandlerResult, default_error_handler,
};
use crate::pattern::Pattern;
use crate::pipeline::{Chain, Pipeline};
use crate::router::{RouteTable, Router};

/// State shared by [`Mux`] and [`Group`]: where routes go, what prefix they
/// get, which middleware run first, and who handles errors.
#[derive(Clone)]
pub(crate) struct Scope {
    table: RouteTable,
    prefix: String,
    chain: Chain,
    error_handler: ErrorHandler,
}

impl Scope {
    fn root(router: Router) -> Self {
        Self {
            table: RouteTable::new(router),
            prefix: String::new(),
            chain: Chain::default(),
            error_handler: Arc::new(default_error_handler),
        }
    }

    pub(crate) fn pre(&mut self, handlers: impl IntoIterator<Item = BoxedHandler>) {
        self.chain = self.chain.extended(handlers);
    }

    /// Binds `handler` to the prefixed pattern with the chain and error
    /// handler in effect right now.
    pub(crate) fn register(&self, pattern: &str, handler: BoxedHandler) {
        let pattern = Pattern::parse(pattern)
            .unwrap_or_else(|e| panic!("invalid pattern `{pattern}`: {e}"))
            .with_prefix(&self.prefix);
        debug!(%pattern, middleware = self.chain.len(), "binding pipeline");
        let pipeline = Pipeline::new(self.chain.clone(), handler, Arc::clone(&self.error_handler));
        self.table.insert(&pattern, pipeline.into_endpoint());
    }

    /// A child scope. Its chain is the current chain; later additions to
    /// either side stay on that side.
    pub(crate) fn derive(&self, prefix: &str) -> Self {
        Self {
            table: self.table.clone(),
            prefix: format!("{}{prefix}", self.prefix),
            chain: self.chain.clone(),
            error_handler: Arc::clone(&self.error_handler),
        }
    }

    pub(crate) fn set_error_handler(&mut self, handler: ErrorHandler) {
        self.error_handler = handler;
    }

    pub(crate) fn prefix(&self) -> &str {
        &self.prefix
    }

    pub(crate) fn freeze(&self) -> Router {
        self.table.freeze()
    }
}

/// Route registration with middleware and centralized error handling.
///
/// ```rust
/// use pipemux::{Error, Mux, StatusCode};
///
/// let mut mux = Mux::new();
///
/// // Middleware go in before the routes that should run them.
/// mux.pre(|ctx| Box::pin(async move {
///     let user = ctx.header("x-user").ok_or_else(|| Error::msg("who are you?"))?.to_owned();
///     ctx.set("user", user);
///     Ok(())
/// }));
///
/// mux.handle_func("GET /me", |ctx| Box::pin(async move {
///     let user = ctx.try_value::<String>("user")?.clone();
///     ctx.write_json(StatusCode::OK, &serde_json::json!({ "user": user }))
/// }));
///
/// let mut api = mux.group("/api");
/// api.handle_func("GET /ping", |ctx| Box::pin(async move {
///     ctx.write_text(StatusCode::OK, "pong")
/// }));
/// ```
///
/// Every registration captures the middleware chain and error handler in
/// effect at that moment. Middleware added later do not reach routes or
/// groups created earlier.
pub struct Mux {
    scope: Scope,
}

impl Mux {
    pub fn new() -> Self {
        Self::with_router(Router::new())
    }

    /// A mux that registers into an existing route table.
    pub fn with_router(router: Router) -> Self {
        Self { scope: Scope::root(router) }
    }

    /// Appends a middleware to the chain of routes registered from now on.
    pub fn pre<F>(&mut self, middleware: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.scope.pre([Arc::new(middleware) as BoxedHandler]);
        self
    }

    /// Appends several middleware, in order.
    pub fn pre_all(&mut self, middleware: impl IntoIterator<Item = BoxedHandler>) -> &mut Self {
        self.scope.pre(middleware);
        self
    }

    /// Registers a closure for `pattern` (`"/path"` or `"METHOD /path"`).
    ///
    /// # Panics
    ///
    /// Panics on a malformed or conflicting pattern, or once the mux was
    /// turned into a [`Router`].
    pub fn handle_func<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.handle(pattern, handler)
    }

    /// Registers any [`Handler`] for `pattern`. See [`Mux::handle_func`].
    pub fn handle(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.scope.register(pattern, Arc::new(handler));
        self
    }

    /// Derives a group whose routes live under `prefix`.
    pub fn group(&self, prefix: &str) -> Group {
        Group::new(self.scope.derive(prefix))
    }

    /// Replaces the error handler for routes registered from now on.
    pub fn set_error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut Context, Error) + Send + Sync + 'static,
    {
        self.scope.set_error_handler(Arc::new(handler));
        self
    }

    /// Hands the route table over for serving. Groups still alive cannot
    /// register anything afterwards.
    pub fn into_router(self) -> Router {
        self.scope.freeze()
    }
}

impl Default for Mux {
    fn default() -> Self { Self::new() }
}

impl From<Mux> for Router {
    fn from(mux: Mux) -> Self {
        mux.into_router()
    }
}
