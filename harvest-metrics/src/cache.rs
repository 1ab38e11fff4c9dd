use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

use crate::statsd::MetricCounters;
use crate::{RawSample, SampleKey};

/// An error returned when the composer cache snapshot cannot be written or read.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Accessing the snapshot file failed.
    #[error("failed to access snapshot file {}", .path.display())]
    Io {
        /// The file that could not be accessed.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// A sample could not be serialized.
    #[error("failed to serialize sample")]
    Serialize(#[from] serde_json::Error),
}

impl SnapshotError {
    fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Outcome of [`ComposerCache::load`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    /// Entries restored into the cache.
    pub loaded: usize,
    /// Lines that could not be parsed.
    pub skipped: usize,
    /// Entries older than the retention period.
    pub expired: usize,
}

/// Last observation of every counter and summary series.
///
/// The cache is shared between all sink workers. Concurrent updates of the same series are
/// resolved by last write wins.
#[derive(Debug, Default)]
pub struct ComposerCache {
    entries: papaya::HashMap<SampleKey, RawSample>,
}

fn retention_delta(retention: Duration) -> TimeDelta {
    TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX)
}

impl ComposerCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the sample as the latest observation of its series and returns the previous one.
    pub fn swap(&self, sample: RawSample) -> Option<RawSample> {
        let entries = self.entries.pin();
        entries.insert(sample.key(), sample).cloned()
    }

    /// Returns the latest observation of a series.
    pub fn get(&self, key: &SampleKey) -> Option<RawSample> {
        self.entries.pin().get(key).cloned()
    }

    /// Returns the number of cached series.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the cache holds no series.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes all entries that were not updated within `retention` before `now`.
    ///
    /// Returns the number of removed entries.
    pub fn evict(&self, now: DateTime<Utc>, retention: Duration) -> usize {
        let retention = retention_delta(retention);
        let mut evicted = 0;

        let entries = self.entries.pin();
        entries.retain(|_, sample| {
            let keep = now - sample.timestamp <= retention;
            if !keep {
                evicted += 1;
            }
            keep
        });

        harvest_statsd::metric!(counter(MetricCounters::CacheEvicted) += evicted as i64);
        evicted
    }

    /// Writes all entries to `path` as JSON lines.
    ///
    /// The snapshot is written to a sibling file first and then moved over `path`, so an
    /// interrupted write never leaves a truncated snapshot behind. An empty cache produces an
    /// empty file.
    pub fn save(&self, path: &Path) -> Result<usize, SnapshotError> {
        let mut temp_name = OsString::from(path.as_os_str());
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);

        let file = fs::File::create(&temp_path).map_err(SnapshotError::io(&temp_path))?;
        let mut writer = BufWriter::new(file);
        let mut written = 0;

        for (_, sample) in self.entries.pin().iter() {
            serde_json::to_writer(&mut writer, sample)?;
            writer
                .write_all(b"\n")
                .map_err(SnapshotError::io(&temp_path))?;
            written += 1;
        }

        writer.flush().map_err(SnapshotError::io(&temp_path))?;
        drop(writer);

        fs::rename(&temp_path, path).map_err(SnapshotError::io(path))?;
        Ok(written)
    }

    /// Restores entries from a snapshot written by [`save`](Self::save).
    ///
    /// A missing file restores nothing. Lines that cannot be parsed are skipped, entries older
    /// than `retention` before `now` are not restored.
    pub fn load(
        &self,
        path: &Path,
        now: DateTime<Utc>,
        retention: Duration,
    ) -> Result<LoadSummary, SnapshotError> {
        let mut summary = LoadSummary::default();

        let file = match fs::File::open(path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(summary),
            Err(error) => return Err(SnapshotError::io(path)(error)),
        };

        let retention = retention_delta(retention);
        let entries = self.entries.pin();

        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader
                .read_until(b'\n', &mut line)
                .map_err(SnapshotError::io(path))?;
            if read == 0 {
                break;
            }
            if line.trim_ascii().is_empty() {
                continue;
            }

            let sample: RawSample = match serde_json::from_slice(&line) {
                Ok(sample) => sample,
                Err(error) => {
                    harvest_log::warn!(
                        error = &error as &dyn std::error::Error,
                        "skipping unreadable composer cache entry"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            if now - sample.timestamp > retention {
                summary.expired += 1;
                continue;
            }

            entries.insert(sample.key(), sample);
            summary.loaded += 1;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::TimeZone;

    use super::*;
    use crate::SampleValue;

    fn sample(name: &str, secs: i64, value: f64) -> RawSample {
        let mut sample = RawSample::new(
            name,
            BTreeMap::from([("instance".to_owned(), "a".to_owned())]),
            SampleValue::Counter(value),
        );
        sample.stamp("app", 8080, Utc.timestamp_opt(secs, 0).unwrap());
        sample
    }

    #[test]
    fn test_swap_returns_previous() {
        let cache = ComposerCache::new();
        assert_eq!(cache.swap(sample("c", 0, 1.0)), None);

        let previous = cache.swap(sample("c", 10, 5.0)).unwrap();
        assert_eq!(previous.value, SampleValue::Counter(1.0));
        assert_eq!(cache.len(), 1);

        let key = sample("c", 0, 0.0).key();
        assert_eq!(cache.get(&key).unwrap().value, SampleValue::Counter(5.0));
    }

    #[test]
    fn test_evict() {
        let cache = ComposerCache::new();
        cache.swap(sample("old", 0, 1.0));
        cache.swap(sample("fresh", 1000, 1.0));

        let now = Utc.timestamp_opt(1800, 0).unwrap();
        let evicted = cache.evict(now, Duration::from_secs(1000));

        assert_eq!(evicted, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&sample("fresh", 0, 0.0).key()).is_some());
    }

    #[test]
    fn test_evict_counts_metric() {
        let cache = ComposerCache::new();
        cache.swap(sample("a", 0, 1.0));
        cache.swap(sample("b", 0, 1.0));

        let captures = harvest_statsd::with_capturing_test_client(|| {
            cache.evict(Utc.timestamp_opt(100, 0).unwrap(), Duration::from_secs(10));
        });
        assert_eq!(captures, ["cache.evicted.count:2|c"]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");

        let cache = ComposerCache::new();
        cache.swap(sample("a", 100, 1.0));
        cache.swap(sample("b", 1000, 2.0));
        assert_eq!(cache.save(&path).unwrap(), 2);
        assert!(!dir.path().join("cache.tmp").exists());

        let restored = ComposerCache::new();
        let summary = restored
            .load(
                &path,
                Utc.timestamp_opt(1500, 0).unwrap(),
                Duration::from_secs(1000),
            )
            .unwrap();

        assert_eq!(
            summary,
            LoadSummary {
                loaded: 1,
                skipped: 0,
                expired: 1,
            }
        );

        let key = sample("b", 0, 0.0).key();
        similar_asserts::assert_eq!(restored.get(&key), cache.get(&key));
    }

    #[test]
    fn test_save_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");
        fs::write(&path, "stale").unwrap();

        assert_eq!(ComposerCache::new().save(&path).unwrap(), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_load_skips_garbage() {
        harvest_log::init_test!();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");

        let good = serde_json::to_string(&sample("a", 100, 1.0)).unwrap();
        fs::write(&path, format!("{good}\n{{\"broken\n\n")).unwrap();

        let cache = ComposerCache::new();
        let summary = cache
            .load(
                &path,
                Utc.timestamp_opt(100, 0).unwrap(),
                Duration::from_secs(60),
            )
            .unwrap();

        assert_eq!(summary.loaded, 1);
        assert_eq!(summary.skipped, 1);
    }

    #[test]
    fn test_load_skips_invalid_utf8() {
        harvest_log::init_test!();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache");

        let mut content = serde_json::to_vec(&sample("a", 100, 1.0)).unwrap();
        content.extend_from_slice(b"\n\xff\xfe garbage\n");
        content.extend(serde_json::to_vec(&sample("b", 100, 2.0)).unwrap());
        content.push(b'\n');
        fs::write(&path, content).unwrap();

        let cache = ComposerCache::new();
        let summary = cache
            .load(
                &path,
                Utc.timestamp_opt(100, 0).unwrap(),
                Duration::from_secs(60),
            )
            .unwrap();

        assert_eq!(summary.loaded, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let summary = ComposerCache::new()
            .load(&dir.path().join("nope"), Utc::now(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(summary, LoadSummary::default());
    }
}
