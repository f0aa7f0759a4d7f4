//! Request-scoped cancellation, deadline and value propagation.
//!
//! An [`Ambient`] is what a handler hands down to deeper library calls: a
//! [`CancellationToken`] that fires when the request is over, an optional
//! deadline, and an immutable chain of string-keyed values. Deriving a new
//! `Ambient` never mutates the old one; values added by a derived scope are
//! invisible to its parent.
//!
//! Each request gets a child of the `Ambient` found in the request extensions
//! (or a fresh root when there is none), so an outer layer can seed values by
//! inserting an `Ambient` before the request reaches the [`Router`].
//!
//! [`Router`]: crate::Router

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token, deadline and inherited values of one request.
#[derive(Clone, Default)]
pub struct Ambient {
    token: CancellationToken,
    deadline: Option<Instant>,
    values: Option<Arc<Entry>>,
}

struct Entry {
    key: String,
    value: Arc<dyn Any + Send + Sync>,
    parent: Option<Arc<Entry>>,
}

impl Ambient {
    /// A root scope: never cancelled unless [`cancel`](Ambient::cancel) is
    /// called, no deadline, no values.
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope that is cancelled together with `self` but can also be
    /// cancelled on its own.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
            values: self.values.clone(),
        }
    }

    /// Derives a scope where `key` resolves to `value`, shadowing any value
    /// the parent holds under the same key.
    pub fn with_value<T>(&self, key: impl Into<String>, value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            token: self.token.clone(),
            deadline: self.deadline,
            values: Some(Arc::new(Entry {
                key: key.into(),
                value: Arc::new(value),
                parent: self.values.clone(),
            })),
        }
    }

    /// Derives a child scope that is done at `deadline` at the latest. An
    /// earlier inherited deadline is kept.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut child = self.child();
        child.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        child
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Walks the value chain from the most recent entry to the root.
    pub fn value(&self, key: &str) -> Option<&(dyn Any + Send + Sync)> {
        let mut entry = self.values.as_deref();
        while let Some(e) = entry {
            if e.key == key {
                return Some(&*e.value);
            }
            entry = e.parent.as_deref();
        }
        None
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Cancels this scope and every scope derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the scope was cancelled or its deadline has passed.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once the scope is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

impl fmt::Debug for Ambient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys = Vec::new();
        let mut entry = self.values.as_deref();
        while let Some(e) = entry {
            keys.push(e.key.as_str());
            entry = e.parent.as_deref();
        }
        f.debug_struct("Ambient")
            .field("cancelled", &self.token.is_cancelled())
            .field("deadline", &self.deadline)
            .field("keys", &keys)
            .finish()
    }
}
