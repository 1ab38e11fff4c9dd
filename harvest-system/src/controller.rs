use std::sync::LazyLock;
use std::time::Duration;

use tokio::sync::watch;

/// Shutdown request message sent by the [`Controller`] to subscribed services.
///
/// A handler has to ensure that it doesn't take longer than `timeout` to resolve the future.
/// Ideally, open work is persisted or finished in an orderly manner but no new requests are
/// accepted anymore.
///
/// The `timeout` is `None` for an immediate shutdown, in which case services should exit as
/// soon as possible without finishing pending work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shutdown {
    /// The timeout for this shutdown. `None` indicates an immediate forced shutdown.
    pub timeout: Option<Duration>,
}

static SHUTDOWN: LazyLock<watch::Sender<Option<Shutdown>>> =
    LazyLock::new(|| watch::channel(None).0);

/// Notifies a service about an upcoming shutdown.
///
/// Obtain a handle through [`Controller::shutdown_handle`].
#[derive(Debug)]
pub struct ShutdownHandle(watch::Receiver<Option<Shutdown>>);

impl ShutdownHandle {
    /// Returns the current shutdown state, if any.
    pub fn get(&self) -> Option<Shutdown> {
        *self.0.borrow()
    }

    /// Waits for the shutdown signal.
    ///
    /// Resolves immediately if the shutdown has already been requested. This makes it safe to
    /// poll in a `tokio::select!` loop: once triggered, every subsequent call completes.
    pub async fn notified(&mut self) -> Shutdown {
        loop {
            if let Some(shutdown) = *self.0.borrow_and_update() {
                return shutdown;
            }

            // The sender is static and never dropped.
            if self.0.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Service to start and gracefully stop the system runtime.
///
/// The controller listens for `SIGINT` and `SIGTERM` once started and turns them into a
/// [`Shutdown`] which is broadcast to every [`ShutdownHandle`]. A second signal while shutting
/// down forces an immediate shutdown.
///
/// ### Example
///
/// ```
/// use std::time::Duration;
/// use harvest_system::{Controller, Shutdown};
///
/// # #[tokio::main(flavor = "current_thread")] async fn main() {
/// let mut handle = Controller::shutdown_handle();
/// Controller::shutdown(Some(Duration::from_secs(1)));
///
/// let Shutdown { timeout } = handle.notified().await;
/// assert_eq!(timeout, Some(Duration::from_secs(1)));
/// # }
/// ```
#[derive(Debug)]
pub struct Controller;

impl Controller {
    /// Starts listening for process signals.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(shutdown_timeout: Duration) {
        crate::spawn!(monitor_signals(shutdown_timeout));
    }

    /// Returns a handle to await the shutdown signal.
    pub fn shutdown_handle() -> ShutdownHandle {
        ShutdownHandle(SHUTDOWN.subscribe())
    }

    /// Triggers a shutdown with the given timeout.
    ///
    /// Pass `None` to request an immediate shutdown.
    pub fn shutdown(timeout: Option<Duration>) {
        SHUTDOWN.send_replace(Some(Shutdown { timeout }));
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(terminate) => terminate,
        Err(error) => {
            harvest_log::error!(
                error = &error as &dyn std::error::Error,
                "failed to register SIGTERM handler"
            );
            tokio::signal::ctrl_c().await.ok();
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => harvest_log::info!("received SIGINT"),
        _ = terminate.recv() => harvest_log::info!("received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    tokio::signal::ctrl_c().await.ok();
    harvest_log::info!("received interrupt");
}

async fn monitor_signals(timeout: Duration) {
    wait_for_signal().await;
    harvest_log::info!("shutting down gracefully, timeout {}s", timeout.as_secs());
    Controller::shutdown(Some(timeout));

    wait_for_signal().await;
    harvest_log::warn!("received second signal, shutting down immediately");
    Controller::shutdown(None);
}
