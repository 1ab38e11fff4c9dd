use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::format::{Item, StrftimeItems};
use harvest_log::LogConfig;
use harvest_metrics::{EndpointFormat, ParserRegistry};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// File name of the composer cache snapshot in the user's home directory.
const DEFAULT_CACHE_FILE: &str = ".harvest-composer-cache";

/// Defines the source of a config error.
#[derive(Debug, Default)]
enum ConfigErrorSource {
    /// An error occurring independently.
    #[default]
    None,
    /// An error originating from a configuration file.
    File(PathBuf),
    /// An error originating in a field override (an env var, or a CLI parameter).
    FieldOverride(String),
}

impl fmt::Display for ConfigErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigErrorSource::None => Ok(()),
            ConfigErrorSource::File(file_name) => {
                write!(f, " (from file {})", file_name.display())
            }
            ConfigErrorSource::FieldOverride(name) => write!(f, " (in field {name})"),
        }
    }
}

/// Indicates config related errors.
#[derive(Debug)]
pub struct ConfigError {
    source: ConfigErrorSource,
    kind: ConfigErrorKind,
    cause: Option<Box<dyn Error + Send + Sync + 'static>>,
}

impl ConfigError {
    #[inline]
    fn wrap<E>(cause: E, kind: ConfigErrorKind) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            source: ConfigErrorSource::None,
            kind,
            cause: Some(Box::new(cause)),
        }
    }

    #[inline]
    fn field(field: &'static str) -> Self {
        Self {
            source: ConfigErrorSource::FieldOverride(field.to_owned()),
            kind: ConfigErrorKind::InvalidValue,
            cause: None,
        }
    }

    #[inline]
    fn for_field<E>(cause: E, field: &'static str) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self {
            source: ConfigErrorSource::FieldOverride(field.to_owned()),
            kind: ConfigErrorKind::InvalidValue,
            cause: Some(Box::new(cause)),
        }
    }

    #[inline]
    fn file(mut self, path: impl AsRef<Path>) -> Self {
        self.source = ConfigErrorSource::File(path.as_ref().to_path_buf());
        self
    }

    /// Returns the error kind of the error.
    pub fn kind(&self) -> ConfigErrorKind {
        self.kind
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind, self.source)
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause.as_deref().map(|cause| cause as &(dyn Error + 'static))
    }
}

/// Indicates config related errors.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigErrorKind {
    /// Failed to open the file.
    #[error("could not open config file")]
    CouldNotOpenFile,
    /// Parsing YAML failed.
    #[error("could not parse yaml config file")]
    BadYaml,
    /// Parsing a JSON config value failed.
    #[error("could not parse json config value")]
    BadJson,
    /// Invalid config value.
    #[error("invalid config value")]
    InvalidValue,
}

trait ConfigObject: DeserializeOwned + Serialize + Default {
    /// The basename of the config file.
    fn name() -> &'static str;

    /// The full filename of the YAML config file.
    fn path(base: &Path) -> PathBuf {
        base.join(format!("{}.yml", Self::name()))
    }

    /// Loads the config file from a file within the given directory location.
    ///
    /// A missing file yields the default configuration.
    fn load(base: &Path) -> Result<Self, ConfigError> {
        let path = Self::path(base);

        let f = match fs::File::open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::wrap(e, ConfigErrorKind::CouldNotOpenFile).file(&path));
            }
        };

        serde_yaml::from_reader(io::BufReader::new(f))
            .map_err(|e| ConfigError::wrap(e, ConfigErrorKind::BadYaml).file(&path))
    }
}

/// Structure used to hold information about configuration overrides via
/// CLI parameters or environment variables.
#[derive(Debug, Default)]
pub struct OverridableConfig {
    /// The scrape period in seconds.
    pub period: Option<String>,
    /// The address of the control API.
    pub listen: Option<String>,
    /// The log level.
    pub log_level: Option<String>,
    /// The statsd host for self-metrics.
    pub statsd: Option<String>,
    /// Comma separated list of static endpoint URLs, replacing the configured ones.
    pub hosts: Option<String>,
}

/// A path on a scraped service and the format served there.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct EndpointConfig {
    /// The exact URL path, for instance `/actuator/prometheus`.
    pub path: String,
    /// The wire format served at the path.
    pub format: EndpointFormat,
}

fn default_endpoints() -> Vec<EndpointConfig> {
    ParserRegistry::default()
        .iter()
        .map(|(path, format)| EndpointConfig {
            path: path.to_owned(),
            format,
        })
        .collect()
}

/// Service registry discovery.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct Eureka {
    /// URL of the registry's application list, discovery is disabled when unset.
    url: Option<String>,
    /// Seconds between two registry queries.
    refresh_interval: u64,
    /// Timeout of the HEAD probe against a discovered service, in seconds.
    probe_timeout: u64,
}

impl Default for Eureka {
    fn default() -> Self {
        Self {
            url: None,
            refresh_interval: 10,
            probe_timeout: 2,
        }
    }
}

/// Scraping of instrumentation endpoints.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct Beat {
    /// Minimum seconds between two scrapes.
    period: u64,
    /// Fetch timeout in seconds.
    timeout: u64,
    /// Statically configured endpoint URLs.
    hosts: Vec<String>,
    /// Metric names which are never admitted.
    excludes: Vec<String>,
    /// Ordered registry of endpoint paths and their formats.
    endpoints: Vec<EndpointConfig>,
    eureka: Eureka,
}

impl Default for Beat {
    fn default() -> Self {
        Self {
            period: 10,
            timeout: 5,
            hosts: Vec::new(),
            excludes: Vec::new(),
            endpoints: default_endpoints(),
            eureka: Eureka::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct MemQueue {
    /// Capacity of the intake queue in raw samples.
    events: usize,
}

impl Default for MemQueue {
    fn default() -> Self {
        Self { events: 4096 }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
struct Queue {
    mem: MemQueue,
}

/// Persistence of the composer cache.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct Cache {
    /// Snapshot file, defaults to a file in the user's home directory.
    path: Option<PathBuf>,
    /// Seconds after which an entry that has not been updated is evicted.
    retention: u64,
    /// Seconds between two snapshots.
    snapshot_interval: u64,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            path: None,
            retention: 1800,
            snapshot_interval: 10,
        }
    }
}

/// Bulk indexing sink.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct Elasticsearch {
    enabled: bool,
    /// `host:port` pairs, one is picked at random per write.
    hosts: Vec<String>,
    /// strftime pattern for the index name.
    index: String,
    /// Attempts per bulk request.
    max_retries: u32,
    /// Request timeout in seconds.
    timeout: u64,
    /// Skip metrics with a value of exactly zero.
    omit_zero: bool,
}

impl Default for Elasticsearch {
    fn default() -> Self {
        Self {
            enabled: false,
            hosts: vec!["localhost:9200".to_owned()],
            index: "metrics-%Y.%m.%d".to_owned(),
            max_retries: 3,
            timeout: 30,
            omit_zero: false,
        }
    }
}

/// Rolling JSON lines file sink.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct FileOutput {
    enabled: bool,
    /// Path prefix of the dated files.
    name: PathBuf,
    /// strftime pattern whose finest field sets the rolling period.
    file_name_pattern: String,
    /// Dated files to keep, `0` keeps all.
    max_history: usize,
}

impl Default for FileOutput {
    fn default() -> Self {
        Self {
            enabled: false,
            name: PathBuf::from("metrics"),
            file_name_pattern: "%Y-%m-%d".to_owned(),
            max_history: 0,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct Output {
    /// Number of sink worker tasks.
    worker: usize,
    /// Maximum raw samples drained from the intake queue per batch.
    bulk_max_size: usize,
    elasticsearch: Elasticsearch,
    file: FileOutput,
}

impl Default for Output {
    fn default() -> Self {
        Self {
            worker: 1,
            bulk_max_size: 50,
            elasticsearch: Elasticsearch::default(),
            file: FileOutput::default(),
        }
    }
}

/// The control API.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct Http {
    listen: SocketAddr,
    /// Seconds to wait for services to finish on shutdown.
    shutdown_timeout: u64,
}

impl Default for Http {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 3030)),
            shutdown_timeout: 10,
        }
    }
}

/// Controls internal reporting to a StatsD server.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
struct Metrics {
    /// Hostname and port of the statsd server, self-metrics are disabled when unset.
    statsd: Option<String>,
    /// Common prefix that should be added to all metrics.
    prefix: String,
    /// Default tags that should be attached to all outgoing statsd metrics.
    default_tags: BTreeMap<String, String>,
    /// Tag name to report the hostname to for each metric. Defaults to not sending such a tag.
    hostname_tag: Option<String>,
    /// Global sample rate for all emitted metrics between `0.0` and `1.0`.
    sample_rate: f64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            statsd: None,
            prefix: "harvest".to_owned(),
            default_tags: BTreeMap::new(),
            hostname_tag: None,
            sample_rate: 1.0,
        }
    }
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct ConfigValues {
    #[serde(default)]
    beat: Beat,
    #[serde(default)]
    queue: Queue,
    #[serde(default)]
    cache: Cache,
    #[serde(default)]
    output: Output,
    #[serde(default)]
    http: Http,
    #[serde(default)]
    logging: LogConfig,
    #[serde(default)]
    metrics: Metrics,
}

impl ConfigObject for ConfigValues {
    fn name() -> &'static str {
        "config"
    }
}

/// Checks that a strftime pattern does not contain invalid specifiers.
fn is_valid_date_pattern(pattern: &str) -> bool {
    !pattern.is_empty() && !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

/// Config struct.
pub struct Config {
    values: ConfigValues,
    path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            values: ConfigValues::default(),
            path: PathBuf::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("path", &self.path)
            .field("values", &self.values)
            .finish()
    }
}

impl Config {
    /// Loads a config from a given config folder.
    ///
    /// A folder without `config.yml` yields the default configuration.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let path = std::env::current_dir()
            .map(|x| x.join(path.as_ref()))
            .unwrap_or_else(|_| path.as_ref().to_path_buf());

        let config = Config {
            values: ConfigValues::load(&path)?,
            path,
        };

        config.validate().map_err(|e| e.file(ConfigValues::path(&config.path)))?;
        Ok(config)
    }

    /// Creates a config from a JSON value.
    ///
    /// This is mostly useful for tests.
    pub fn from_json_value(value: serde_json::Value) -> Result<Config, ConfigError> {
        let config = Config {
            values: serde_json::from_value(value)
                .map_err(|err| ConfigError::wrap(err, ConfigErrorKind::BadJson))?,
            path: PathBuf::new(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Override configuration with values coming from other sources (e.g. env variables or
    /// command line parameters).
    pub fn apply_override(
        &mut self,
        overrides: OverridableConfig,
    ) -> Result<&mut Self, ConfigError> {
        if let Some(period) = overrides.period {
            self.values.beat.period = period
                .parse()
                .map_err(|err| ConfigError::for_field(err, "period"))?;
        }

        if let Some(listen) = overrides.listen {
            self.values.http.listen = listen
                .parse()
                .map_err(|err| ConfigError::for_field(err, "listen"))?;
        }

        if let Some(level) = overrides.log_level {
            self.values.logging.level = level
                .parse()
                .map_err(|err| ConfigError::for_field(err, "log_level"))?;
        }

        if let Some(statsd) = overrides.statsd {
            self.values.metrics.statsd = Some(statsd).filter(|s| !s.is_empty());
        }

        if let Some(hosts) = overrides.hosts {
            self.values.beat.hosts = hosts
                .split(',')
                .map(str::trim)
                .filter(|host| !host.is_empty())
                .map(str::to_owned)
                .collect();
        }

        self.validate()?;
        Ok(self)
    }

    /// Checks value ranges that cannot be expressed in the schema.
    fn validate(&self) -> Result<(), ConfigError> {
        let values = &self.values;

        if values.beat.period == 0 {
            return Err(ConfigError::field("beat.period"));
        }
        if values.beat.timeout == 0 {
            return Err(ConfigError::field("beat.timeout"));
        }
        if values.queue.mem.events == 0 {
            return Err(ConfigError::field("queue.mem.events"));
        }
        if values.output.worker == 0 {
            return Err(ConfigError::field("output.worker"));
        }
        if values.output.bulk_max_size == 0 {
            return Err(ConfigError::field("output.bulk_max_size"));
        }
        if values.cache.snapshot_interval == 0 {
            return Err(ConfigError::field("cache.snapshot_interval"));
        }

        for endpoint in &values.beat.endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(ConfigError::field("beat.endpoints"));
            }
        }

        let eureka = &values.beat.eureka;
        if let Some(ref url) = eureka.url {
            url::Url::parse(url).map_err(|err| ConfigError::for_field(err, "beat.eureka.url"))?;
            if eureka.refresh_interval == 0 {
                return Err(ConfigError::field("beat.eureka.refresh_interval"));
            }
            if eureka.probe_timeout == 0 {
                return Err(ConfigError::field("beat.eureka.probe_timeout"));
            }
        }

        let elasticsearch = &values.output.elasticsearch;
        if elasticsearch.enabled {
            if elasticsearch.hosts.is_empty() {
                return Err(ConfigError::field("output.elasticsearch.hosts"));
            }
            if elasticsearch.max_retries == 0 {
                return Err(ConfigError::field("output.elasticsearch.max_retries"));
            }
            if elasticsearch.timeout == 0 {
                return Err(ConfigError::field("output.elasticsearch.timeout"));
            }
            if !is_valid_date_pattern(&elasticsearch.index) {
                return Err(ConfigError::field("output.elasticsearch.index"));
            }
        }

        let file = &values.output.file;
        if file.enabled && !is_valid_date_pattern(&file.file_name_pattern) {
            return Err(ConfigError::field("output.file.file_name_pattern"));
        }

        Ok(())
    }

    /// Returns the path of the config folder.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the minimum time between two scrapes.
    pub fn beat_period(&self) -> Duration {
        Duration::from_secs(self.values.beat.period)
    }

    /// Returns the timeout for fetching an endpoint.
    pub fn beat_timeout(&self) -> Duration {
        Duration::from_secs(self.values.beat.timeout)
    }

    /// Returns the statically configured endpoint URLs.
    pub fn static_hosts(&self) -> &[String] {
        &self.values.beat.hosts
    }

    /// Returns the metric names that are never admitted to the intake queue.
    pub fn excludes(&self) -> &[String] {
        &self.values.beat.excludes
    }

    /// Returns the ordered registry of endpoint paths and their formats.
    pub fn parser_registry(&self) -> ParserRegistry {
        self.values
            .beat
            .endpoints
            .iter()
            .map(|endpoint| (endpoint.path.clone(), endpoint.format))
            .collect()
    }

    /// Returns the URL of the service registry, if discovery is enabled.
    pub fn eureka_url(&self) -> Option<&str> {
        self.values.beat.eureka.url.as_deref()
    }

    /// Returns the interval between two registry queries.
    pub fn eureka_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.values.beat.eureka.refresh_interval)
    }

    /// Returns the timeout for probing a discovered endpoint.
    pub fn eureka_probe_timeout(&self) -> Duration {
        Duration::from_secs(self.values.beat.eureka.probe_timeout)
    }

    /// Returns the capacity of the intake queue.
    pub fn queue_capacity(&self) -> usize {
        self.values.queue.mem.events
    }

    /// Returns the path of the composer cache snapshot.
    ///
    /// Defaults to a file in the user's home directory, or the working directory if the home
    /// directory cannot be determined.
    pub fn cache_path(&self) -> PathBuf {
        match self.values.cache.path {
            Some(ref path) => path.clone(),
            None => dirs::home_dir()
                .unwrap_or_default()
                .join(DEFAULT_CACHE_FILE),
        }
    }

    /// Returns the time after which a stale composer cache entry is evicted.
    pub fn cache_retention(&self) -> Duration {
        Duration::from_secs(self.values.cache.retention)
    }

    /// Returns the interval between two composer cache snapshots.
    pub fn cache_snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.values.cache.snapshot_interval)
    }

    /// Returns the number of sink worker tasks.
    pub fn sink_workers(&self) -> usize {
        self.values.output.worker
    }

    /// Returns the maximum number of raw samples drained per batch.
    pub fn bulk_max_size(&self) -> usize {
        self.values.output.bulk_max_size
    }

    /// Returns `true` if the bulk indexing sink is enabled.
    pub fn elasticsearch_enabled(&self) -> bool {
        self.values.output.elasticsearch.enabled
    }

    /// Returns the `host:port` pairs of the indexing store.
    pub fn elasticsearch_hosts(&self) -> &[String] {
        &self.values.output.elasticsearch.hosts
    }

    /// Returns the strftime pattern of the index name.
    pub fn elasticsearch_index(&self) -> &str {
        &self.values.output.elasticsearch.index
    }

    /// Returns the number of attempts per bulk request.
    pub fn elasticsearch_max_retries(&self) -> u32 {
        self.values.output.elasticsearch.max_retries
    }

    /// Returns the timeout of a bulk request.
    pub fn elasticsearch_timeout(&self) -> Duration {
        Duration::from_secs(self.values.output.elasticsearch.timeout)
    }

    /// Returns `true` if metrics with a zero value are skipped.
    pub fn elasticsearch_omit_zero(&self) -> bool {
        self.values.output.elasticsearch.omit_zero
    }

    /// Returns `true` if the file sink is enabled.
    pub fn file_enabled(&self) -> bool {
        self.values.output.file.enabled
    }

    /// Returns the path prefix of the dated metrics files.
    pub fn file_name(&self) -> &Path {
        &self.values.output.file.name
    }

    /// Returns the strftime pattern that determines the rolling period.
    pub fn file_name_pattern(&self) -> &str {
        &self.values.output.file.file_name_pattern
    }

    /// Returns the number of dated files to keep, `0` for all.
    pub fn file_max_history(&self) -> usize {
        self.values.output.file.max_history
    }

    /// Returns the socket address of the control API.
    pub fn listen_addr(&self) -> SocketAddr {
        self.values.http.listen
    }

    /// Returns the time services get to finish on shutdown.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.values.http.shutdown_timeout)
    }

    /// Returns the logging configuration.
    pub fn logging(&self) -> &LogConfig {
        &self.values.logging
    }

    /// Returns the socket address of statsd if configured.
    pub fn statsd_addr(&self) -> Option<&str> {
        self.values.metrics.statsd.as_deref()
    }

    /// Returns the prefix that should be added to all metrics.
    pub fn metrics_prefix(&self) -> &str {
        &self.values.metrics.prefix
    }

    /// Returns the default tags for statsd metrics.
    pub fn metrics_default_tags(&self) -> &BTreeMap<String, String> {
        &self.values.metrics.default_tags
    }

    /// Returns the name of the hostname tag that should be attached to each outgoing metric.
    pub fn metrics_hostname_tag(&self) -> Option<&str> {
        self.values.metrics.hostname_tag.as_deref()
    }

    /// Returns the global sample rate for all metrics.
    pub fn metrics_sample_rate(&self) -> f64 {
        self.values.metrics.sample_rate
    }
}
