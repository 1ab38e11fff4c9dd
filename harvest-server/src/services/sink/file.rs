use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use harvest_config::Config;
use harvest_metrics::OutputMetric;
use parking_lot::Mutex;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};

use crate::services::sink::{DeliveryError, Sink};
use crate::statsd::{ServerCounters, SinkKind};

const MINUTE_SPECIFIERS: &[&str] = &["%M", "%R", "%T", "%X", "%c", "%r", "%s"];
const HOUR_SPECIFIERS: &[&str] = &["%H", "%I", "%k", "%l"];

/// Returns the finest rotation the date pattern of rolled file names can distinguish.
///
/// Periods coarser than a day roll daily. A pattern without any date field never rolls.
fn rotation_for(pattern: &str) -> Rotation {
    if MINUTE_SPECIFIERS.iter().any(|s| pattern.contains(s)) {
        Rotation::MINUTELY
    } else if HOUR_SPECIFIERS.iter().any(|s| pattern.contains(s)) {
        Rotation::HOURLY
    } else if pattern.contains('%') {
        Rotation::DAILY
    } else {
        Rotation::NEVER
    }
}

fn appender(
    path: &Path,
    pattern: &str,
    max_history: usize,
) -> Result<RollingFileAppender, InitError> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let prefix = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut builder = RollingFileAppender::builder()
        .rotation(rotation_for(pattern))
        .filename_prefix(prefix)
        .filename_suffix("txt");
    if max_history > 0 {
        builder = builder.max_log_files(max_history);
    }

    builder.build(directory)
}

/// Appends metrics as JSON lines to a date-rolled file.
///
/// Files are named `<name>.<date>.txt` next to the configured name, where the date has the
/// granularity of `file_name_pattern`. Only the newest `max_history` files are kept.
#[derive(Debug)]
pub struct FileSink {
    file: Arc<Mutex<RollingFileAppender>>,
}

impl FileSink {
    /// Creates the sink from the `output.file` section.
    ///
    /// Fails if the directory of the metrics file cannot be created.
    pub fn new(config: &Config) -> Result<Self, InitError> {
        let file = appender(
            config.file_name(),
            config.file_name_pattern(),
            config.file_max_history(),
        )?;

        Ok(Self {
            file: Arc::new(Mutex::new(file)),
        })
    }

    async fn write(&self, metrics: &[OutputMetric]) -> Result<(), DeliveryError> {
        let mut buffer = Vec::new();
        for metric in metrics {
            serde_json::to_writer(&mut buffer, metric)?;
            buffer.push(b'\n');
        }

        let file = self.file.clone();
        tokio::task::spawn_blocking(move || {
            let mut file = file.lock();
            file.write_all(&buffer)?;
            file.flush()
        })
        .await??;
        Ok(())
    }
}

#[async_trait::async_trait]
impl Sink for FileSink {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn deliver(&self, metrics: &[OutputMetric]) -> Result<(), DeliveryError> {
        let result = self.write(metrics).await;

        let count = metrics.len() as i64;
        match result {
            Ok(()) => {
                harvest_statsd::metric!(counter(ServerCounters::WriteOk(SinkKind::File)) += count);
            }
            Err(_) => {
                harvest_statsd::metric!(
                    counter(ServerCounters::WriteError(SinkKind::File)) += count
                );
            }
        }

        result
    }
}
