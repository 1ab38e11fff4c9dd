use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;

use axum_server::Handle;
use harvest_config::Config;
use harvest_system::{Controller, Service, Shutdown};
use tokio::net::TcpSocket;

use crate::service::ServiceState;
use crate::statsd::ServerCounters;

/// Maximum number of pending connections on the control API socket.
const LISTEN_BACKLOG: u32 = 128;

/// Indicates the type of failure of the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Binding failed.
    #[error("bind to interface failed")]
    BindFailed(#[from] std::io::Error),
}

fn listen(addr: SocketAddr) -> Result<TcpListener, ServerError> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4(),
        SocketAddr::V6(_) => TcpSocket::new_v6(),
    }?;

    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuseport(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(LISTEN_BACKLOG)?.into_std()?)
}

async fn serve(listener: TcpListener, app: axum::Router) -> std::io::Result<()> {
    let handle = Handle::new();
    let server = axum_server::from_tcp(listener).handle(handle.clone());

    harvest_system::spawn!(async move {
        let Shutdown { timeout } = Controller::shutdown_handle().notified().await;
        harvest_log::info!("shutting down control api");

        match timeout {
            Some(timeout) => handle.graceful_shutdown(Some(timeout)),
            None => handle.shutdown(),
        }
    });

    server.serve(app.into_make_service()).await
}

/// Control API server.
///
/// Serves the [endpoints](crate::endpoints) on `http.listen` and stops when a [`Shutdown`] is
/// triggered. The socket is bound in [`HttpServer::new`], so that a busy port fails startup.
#[derive(Debug)]
pub struct HttpServer {
    config: Arc<Config>,
    service: ServiceState,
    listener: TcpListener,
}

impl HttpServer {
    /// Binds the control API socket.
    pub fn new(config: Arc<Config>, service: ServiceState) -> Result<Self, ServerError> {
        let listener = listen(config.listen_addr())?;

        Ok(Self {
            config,
            service,
            listener,
        })
    }
}

impl Service for HttpServer {
    async fn run(self) {
        let Self {
            config,
            service,
            listener,
        } = self;

        harvest_log::info!("spawning control api");
        harvest_log::info!("  listening on http://{}/", config.listen_addr());
        harvest_statsd::metric!(counter(ServerCounters::ServerStarting) += 1);

        let app = crate::endpoints::routes().with_state(service);
        if let Err(error) = serve(listener, app).await {
            harvest_log::error!(
                error = &error as &dyn std::error::Error,
                "control api terminated"
            );
        }
    }
}
