//! TCP front end: accepts connections, hands each request to a [`Router`],
//! and stops gracefully.
//!
//! Stopping means: the accept loop exits as soon as the shutdown future
//! resolves, connections already accepted keep running until they close, and
//! only then does [`Server::serve`] return. Without an explicit shutdown
//! future the server stops on SIGTERM (what an orchestrator sends before
//! killing the process) or Ctrl-C.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::error::Error;
use crate::handler::BoxFuture;
use crate::request::PeerAddr;
use crate::router::Router;

enum Listen {
    Addr(String),
    Bound(TcpListener),
}

/// Serves a [`Router`] (or a [`Mux`](crate::Mux)) over HTTP/1.1 and HTTP/2.
///
/// ```rust,no_run
/// use pipemux::{Mux, Server};
///
/// # async fn run(mux: Mux) -> Result<(), pipemux::Error> {
/// Server::bind("0.0.0.0:3000").serve(mux).await
/// # }
/// ```
pub struct Server {
    listen: Listen,
    shutdown: Option<BoxFuture<'static, ()>>,
}

impl Server {
    /// A server that binds `addr` (`host:port`) once [`serve`](Server::serve)
    /// runs. Resolution and bind errors are returned from `serve`.
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { listen: Listen::Addr(addr.into()), shutdown: None }
    }

    /// A server on a listener the caller already bound, e.g. to port 0.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { listen: Listen::Bound(listener), shutdown: None }
    }

    /// The bound address. `None` until bound.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listen {
            Listen::Addr(_) => None,
            Listen::Bound(listener) => listener.local_addr().ok(),
        }
    }

    /// Stops when `signal` resolves instead of on SIGTERM or Ctrl-C.
    pub fn with_shutdown(mut self, signal: impl Future<Output = ()> + Send + 'static) -> Self {
        self.shutdown = Some(Box::pin(signal));
        self
    }

    /// Runs until shutdown, then waits for open connections to finish.
    pub async fn serve(self, app: impl Into<Router>) -> Result<(), Error> {
        let router = Arc::new(app.into());
        let listener = match self.listen {
            Listen::Addr(addr) => TcpListener::bind(addr).await?,
            Listen::Bound(listener) => listener,
        };
        let mut stop = self.shutdown.unwrap_or_else(|| Box::pin(os_shutdown_signal()));

        info!(addr = %listener.local_addr()?, "pipemux listening");

        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                // Shutdown wins over queued connections.
                biased;

                () = &mut stop => break,

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(serve_connection(stream, peer, Arc::clone(&router)));
                    }
                    Err(e) => error!("accept failed: {e}"),
                },

                // Reap finished connections on long-lived servers.
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        info!(open = connections.len(), "shutting down, waiting for open connections");
        while connections.join_next().await.is_some() {}
        info!("pipemux stopped");
        Ok(())
    }
}

/// Drives one connection, whichever protocol the client negotiates.
async fn serve_connection(stream: TcpStream, peer: SocketAddr, router: Arc<Router>) {
    debug!(%peer, "connection accepted");
    let service = service_fn(move |mut req: hyper::Request<Incoming>| {
        req.extensions_mut().insert(PeerAddr(peer));
        let response = router.call(req);
        async move { Ok::<_, Infallible>(response.await) }
    });

    let result = ConnBuilder::new(TokioExecutor::new())
        .serve_connection(TokioIo::new(stream), service)
        .await;
    if let Err(e) = result {
        error!(%peer, "connection failed: {e}");
    }
}

/// First of SIGTERM (Unix only) and Ctrl-C. A signal whose handler cannot be
/// installed is logged and never fires.
async fn os_shutdown_signal() {
    let interrupt = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("received Ctrl-C"),
            Err(e) => {
                error!("cannot listen for Ctrl-C: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("received SIGTERM");
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}
