//! A StatsD client for Harvest's own health: scrape outcomes, queue depth, sink writes.
//!
//! ## Defining Metrics
//!
//! Metrics are declared as enums implementing one of the metric traits: [`CounterMetric`],
//! [`GaugeMetric`] or [`TimerMetric`]. The traits only provide a type safe name, so a counter can
//! never be recorded as a timer by accident. Every crate that records metrics keeps its enums in
//! a `statsd` module.
//!
//! ## Initializing the Client
//!
//! Recording metrics without a configured client is a noop. Call [`init`] once during startup to
//! report to a StatsD server over UDP.
//!
//! ```no_run
//! # use std::collections::BTreeMap;
//! harvest_statsd::init(harvest_statsd::MetricsClientConfig {
//!     prefix: "harvest",
//!     host: "localhost:8125",
//!     default_tags: BTreeMap::new(),
//!     default_sample_rate: 1.0.into(),
//! })
//! .ok();
//! ```
//!
//! ## Macro Usage
//!
//! ```
//! use harvest_statsd::{metric, CounterMetric};
//!
//! struct FetchOk;
//!
//! impl CounterMetric for FetchOk {
//!     fn name(&self) -> &'static str {
//!         "beat.ok.count"
//!     }
//! }
//!
//! metric!(counter(FetchOk) += 1, host = "localhost:8080");
//! ```
use std::collections::BTreeMap;
use std::net::{ToSocketAddrs, UdpSocket};
use std::ops::Deref;
use std::sync::Arc;
use std::{fmt, io};

use cadence::{BufferedUdpMetricSink, Metric, MetricBuilder, QueuingMetricSink, StatsdClient};
use parking_lot::RwLock;
use rand::Rng;
use rand::distr::StandardUniform;

/// Maximum number of metric events that can be queued before we start dropping them.
const METRICS_MAX_QUEUE_SIZE: usize = 10_000;

/// A sample rate between `0.0` and `1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRate(f64);

impl From<f64> for SampleRate {
    fn from(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }
}

impl From<SampleRate> for f64 {
    fn from(value: SampleRate) -> Self {
        value.0
    }
}

/// Client configuration object to store globally.
#[derive(Debug)]
pub struct MetricsClient {
    /// The raw statsd client.
    pub statsd_client: StatsdClient,
    /// Default tags to apply to every metric.
    pub default_tags: BTreeMap<String, String>,
    /// Global sample rate.
    pub default_sample_rate: SampleRate,
}

/// Client configuration used for initialization of [`MetricsClient`].
#[derive(Debug)]
pub struct MetricsClientConfig<'a, A> {
    /// Prefix which is prepended to all metric names.
    pub prefix: &'a str,
    /// Host of the metrics upstream.
    pub host: A,
    /// Tags that are added to all metrics.
    pub default_tags: BTreeMap<String, String>,
    /// Default sample rate for metrics, between 0.0 (= 0%) and 1.0 (= 100%).
    pub default_sample_rate: SampleRate,
}

/// Failure to set up the StatsD client.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// The host did not resolve to any address.
    #[error("statsd host {0} did not resolve")]
    Unresolved(String),
    /// Creating the UDP socket failed.
    #[error("failed to create statsd socket")]
    Io(#[from] io::Error),
    /// Creating the metric sink failed.
    #[error("failed to create statsd sink")]
    Sink(#[from] cadence::MetricError),
}

impl Deref for MetricsClient {
    type Target = StatsdClient;

    fn deref(&self) -> &StatsdClient {
        &self.statsd_client
    }
}

impl MetricsClient {
    /// Send a metric with the default tags defined on this `MetricsClient`.
    #[inline(always)]
    pub fn send_metric<'a, T>(&'a self, mut metric: MetricBuilder<'a, '_, T>)
    where
        T: Metric + From<String>,
    {
        let sample_rate = self.default_sample_rate.0;
        if !Self::should_send(sample_rate) {
            return;
        }

        for (k, v) in &self.default_tags {
            metric = metric.with_tag(k, v);
        }

        if sample_rate < 1.0 {
            metric = metric.with_sampling_rate(sample_rate);
        }

        if let Err(error) = metric.try_send() {
            harvest_log::error!(
                error = &error as &dyn std::error::Error,
                maximum_capacity = METRICS_MAX_QUEUE_SIZE,
                "error sending a metric",
            );
        }
    }

    fn should_send(sample_rate: f64) -> bool {
        if sample_rate <= 0.0 {
            false
        } else if sample_rate >= 1.0 {
            true
        } else {
            let s: f64 = rand::rng().sample(StandardUniform);
            s <= sample_rate
        }
    }
}

static METRICS_CLIENT: RwLock<Option<Arc<MetricsClient>>> = RwLock::new(None);

thread_local! {
    static CURRENT_CLIENT: std::cell::RefCell<Option<Arc<MetricsClient>>> =
        METRICS_CLIENT.read().clone().into();
}

/// Internal prelude for the macro.
#[doc(hidden)]
pub mod _pred {
    pub use cadence::prelude::*;
}

fn set_client(client: MetricsClient) {
    *METRICS_CLIENT.write() = Some(Arc::new(client));
    CURRENT_CLIENT.with(|cell| cell.replace(METRICS_CLIENT.read().clone()));
}

/// Set a test client for the period of the called function (only affects the current thread).
///
/// Returns the captured metrics in StatsD line format.
pub fn with_capturing_test_client(f: impl FnOnce()) -> Vec<String> {
    let (rx, sink) = cadence::SpyMetricSink::new();
    let test_client = MetricsClient {
        statsd_client: StatsdClient::from_sink("", sink),
        default_tags: Default::default(),
        default_sample_rate: 1.0.into(),
    };

    CURRENT_CLIENT.with(|cell| {
        let old_client = cell.replace(Some(Arc::new(test_client)));
        f();
        cell.replace(old_client);
    });

    rx.iter()
        .map(|x| String::from_utf8_lossy(&x).into_owned())
        .collect()
}

/// Tell the metrics system to report to statsd.
pub fn init<A>(config: MetricsClientConfig<A>) -> Result<(), InitError>
where
    A: ToSocketAddrs + fmt::Display,
{
    let addr = config
        .host
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| InitError::Unresolved(config.host.to_string()))?;

    harvest_log::info!("reporting metrics to statsd at {addr}");

    let sample_rate: f64 = config.default_sample_rate.into();
    if sample_rate == 0.0 {
        harvest_log::debug!("metrics sample rate is 0, no metrics will be reported");
    }

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_nonblocking(true)?;
    let udp_sink = BufferedUdpMetricSink::from(addr, socket)?;
    let queuing_sink = QueuingMetricSink::with_capacity(udp_sink, METRICS_MAX_QUEUE_SIZE);

    set_client(MetricsClient {
        statsd_client: StatsdClient::from_sink(config.prefix, queuing_sink),
        default_tags: config.default_tags,
        default_sample_rate: config.default_sample_rate,
    });

    Ok(())
}

/// Invoke a callback with the current statsd client.
///
/// If statsd is not configured the callback is not invoked. For the most part the [`metric!`]
/// macro should be used instead.
#[inline(always)]
pub fn with_client<F, R>(f: F) -> R
where
    F: FnOnce(&MetricsClient) -> R,
    R: Default,
{
    CURRENT_CLIENT.with(|client| {
        if let Some(client) = client.borrow().as_deref() {
            f(client)
        } else {
            R::default()
        }
    })
}

/// A metric for capturing timings.
///
/// Timings are reported in milliseconds, for instance the duration of an endpoint fetch or a
/// bulk write.
///
/// ## Example
///
/// ```
/// use harvest_statsd::{metric, TimerMetric};
///
/// enum MyTimer {
///     Fetch,
/// }
///
/// impl TimerMetric for MyTimer {
///     fn name(&self) -> &'static str {
///         match self {
///             Self::Fetch => "beat.time",
///         }
///     }
/// }
///
/// // measure the time of a code block, tags go before the block
/// let body = metric!(timer(MyTimer::Fetch), host = "localhost", { "# HELP ..." });
/// ```
pub trait TimerMetric {
    /// Returns the timer metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing counters.
///
/// Counters are incremented by the client, and the server derives rates from them.
///
/// ## Example
///
/// ```
/// use harvest_statsd::{metric, CounterMetric};
///
/// struct Enqueued;
///
/// impl CounterMetric for Enqueued {
///     fn name(&self) -> &'static str {
///         "in.queue.count"
///     }
/// }
///
/// # let samples = [(), ()];
/// metric!(counter(Enqueued) += samples.len() as i64);
/// ```
pub trait CounterMetric {
    /// Returns the counter metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// A metric for capturing gauges.
///
/// Gauge values are an instantaneous measurement, such as the number of samples waiting in the
/// intake queue.
///
/// ## Example
///
/// ```
/// use harvest_statsd::{metric, GaugeMetric};
///
/// struct QueueSize;
///
/// impl GaugeMetric for QueueSize {
///     fn name(&self) -> &'static str {
///         "queue.size"
///     }
/// }
///
/// metric!(gauge(QueueSize) = 12);
/// ```
pub trait GaugeMetric {
    /// Returns the gauge metric name that will be sent to statsd.
    fn name(&self) -> &'static str;
}

/// Emits a metric.
///
/// See [crate-level documentation](self) for examples.
#[macro_export]
macro_rules! metric {
    // counter increment
    (counter($id:expr) += $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        match $value {
            value if value != 0 => {
                $crate::with_client(|client| {
                    use $crate::_pred::*;
                    client.send_metric(
                        client.count_with_tags(&$crate::CounterMetric::name(&$id), value)
                        $(.with_tag(stringify!($($k).*), $v))*
                    )
                })
            },
            _ => {},
        };
    };

    // gauge set
    (gauge($id:expr) = $value:expr $(, $($k:ident).* = $v:expr)* $(,)?) => {
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.gauge_with_tags(&$crate::GaugeMetric::name(&$id), $value)
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        })
    };

    // timed block
    (timer($id:expr), $($($k:ident).* = $v:expr,)* $block:block) => {{
        let now = std::time::Instant::now();
        let rv = {$block};
        $crate::with_client(|client| {
            use $crate::_pred::*;
            client.send_metric(
                client.time_with_tags(&$crate::TimerMetric::name(&$id), now.elapsed())
                    $(.with_tag(stringify!($($k).*), $v))*
            )
        });
        rv
    }};
}
