use std::future::Future;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::task::JoinHandle;

use crate::TaskId;

/// A long running part of the daemon.
///
/// Services own their state and run until they observe the [`Controller`](crate::Controller)'s
/// shutdown signal. Shared state, such as the intake queue or the host list, is passed into the
/// service when it is constructed.
///
/// # Implementing a Service
///
/// ```
/// use std::time::Duration;
/// use harvest_system::{Controller, Service};
///
/// struct Heartbeat;
///
/// impl Service for Heartbeat {
///     async fn run(self) {
///         let mut ticker = tokio::time::interval(Duration::from_secs(1));
///         let mut shutdown = Controller::shutdown_handle();
///
///         loop {
///             tokio::select! {
///                 biased;
///
///                 _ = shutdown.notified() => break,
///                 _ = ticker.tick() => (),
///             }
///         }
///     }
/// }
/// ```
pub trait Service: Send + Sized + 'static {
    /// Runs the service until shutdown.
    fn run(self) -> impl Future<Output = ()> + Send + 'static;

    /// Returns a unique name for this service implementation.
    ///
    /// This is used for internal diagnostics and uses the fully qualified type name of the
    /// service implementor by default.
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Keeps track of running services.
///
/// Exposes information about crashed services.
#[derive(Debug, Default)]
pub struct ServiceRunner(FuturesUnordered<JoinHandle<()>>);

impl ServiceRunner {
    /// Creates a new service runner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a service and starts tracking its join handle.
    pub fn start<S: Service>(&mut self, service: S) {
        harvest_log::debug!(service = S::name(), "starting service");
        let handle = crate::spawn(TaskId::for_service::<S>(), service.run());
        self.0.push(handle);
    }

    /// Returns the number of services that have not terminated yet.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no service is running.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Waits until all services have terminated.
    ///
    /// A panic inside a service is propagated to the caller.
    pub async fn join(&mut self) {
        while let Some(result) = self.0.next().await {
            if let Err(error) = result
                && error.is_panic()
            {
                std::panic::resume_unwind(error.into_panic());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Counting(Arc<AtomicUsize>);

    impl Service for Counting {
        async fn run(self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_runner_joins_all_services() {
        let count = Arc::new(AtomicUsize::new(0));

        let mut runner = ServiceRunner::new();
        runner.start(Counting(count.clone()));
        runner.start(Counting(count.clone()));
        assert_eq!(runner.len(), 2);

        runner.join().await;
        assert!(runner.is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    #[should_panic(expected = "service crashed")]
    async fn test_runner_propagates_panics() {
        struct Crashing;

        impl Service for Crashing {
            async fn run(self) {
                panic!("service crashed");
            }
        }

        let mut runner = ServiceRunner::new();
        runner.start(Crashing);
        runner.join().await;
    }

    #[test]
    fn test_default_name() {
        assert!(Counting::name().ends_with("Counting"));
    }
}
