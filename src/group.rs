//! Prefixed child scopes of a [`Mux`](crate::Mux).

use std::sync::Arc;

use crate::context::Context;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler, HandlerResult};
use crate::mux::Scope;

/// A view on a mux with a path prefix, its own middleware chain and its own
/// error handler.
///
/// A group starts with a snapshot of its parent's chain and error handler.
/// From then on the two are independent: `pre` or `set_error_handler` on
/// either one never reaches the other, nor sibling groups.
///
/// ```rust
/// use pipemux::{Mux, StatusCode};
///
/// let mux = Mux::new();
/// let v1 = mux.group("/v1");
/// let mut users = v1.group("/users");
///
/// // Registered as "GET /v1/users/{id}".
/// users.handle_func("GET /{id}", |ctx| Box::pin(async move {
///     let id = ctx.path_int("id", 10, 64)?;
///     ctx.write_json(StatusCode::OK, &id)
/// }));
/// ```
#[derive(Clone)]
pub struct Group {
    scope: Scope,
}

impl Group {
    pub(crate) fn new(scope: Scope) -> Self {
        Self { scope }
    }

    /// The accumulated prefix of this group.
    pub fn prefix(&self) -> &str {
        self.scope.prefix()
    }

    /// Appends a middleware to this group's chain.
    pub fn pre<F>(&mut self, middleware: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.scope.pre([Arc::new(middleware) as BoxedHandler]);
        self
    }

    pub fn pre_all(&mut self, middleware: impl IntoIterator<Item = BoxedHandler>) -> &mut Self {
        self.scope.pre(middleware);
        self
    }

    /// Registers a closure under this group's prefix. For `"METHOD /path"`
    /// the prefix goes between the method and the path.
    ///
    /// # Panics
    ///
    /// See [`Mux::handle_func`](crate::Mux::handle_func).
    pub fn handle_func<F>(&mut self, pattern: &str, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, HandlerResult> + Send + Sync + 'static,
    {
        self.handle(pattern, handler)
    }

    pub fn handle(&mut self, pattern: &str, handler: impl Handler) -> &mut Self {
        self.scope.register(pattern, Arc::new(handler));
        self
    }

    /// A nested group: prefixes concatenate, chain and error handler are
    /// snapshotted.
    pub fn group(&self, prefix: &str) -> Group {
        Group::new(self.scope.derive(prefix))
    }

    /// Overrides the error handler for this group's routes registered from
    /// now on. The parent and siblings keep theirs.
    pub fn set_error_handler<F>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&mut Context, Error) + Send + Sync + 'static,
    {
        self.scope.set_error_handler(Arc::new(handler));
        self
    }
}
