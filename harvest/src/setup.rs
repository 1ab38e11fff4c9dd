use anyhow::Result;
use harvest_config::Config;
use harvest_statsd::MetricsClientConfig;

/// Checks for configurations that load but cannot run.
pub fn check_config(config: &Config) -> Result<()> {
    if !config.elasticsearch_enabled() && !config.file_enabled() {
        anyhow::bail!(
            "no output is enabled, enable output.elasticsearch or output.file in the config"
        );
    }

    if config.static_hosts().is_empty() && config.eureka_url().is_none() {
        harvest_log::warn!(
            "no hosts configured and discovery disabled, add hosts through the control api"
        );
    }

    Ok(())
}

/// Print spawn infos to the log.
pub fn dump_spawn_infos(config: &Config) {
    if config.path().as_os_str().is_empty() {
        harvest_log::info!("launching harvest without config folder");
    } else {
        harvest_log::info!(
            "launching harvest from config folder {}",
            config.path().display()
        );
    }

    harvest_log::info!("  log level: {}", config.logging().level);
    harvest_log::info!("  scrape period: {}s", config.beat_period().as_secs());
    harvest_log::info!("  static hosts: {}", config.static_hosts().len());
    match config.eureka_url() {
        Some(url) => harvest_log::info!("  discovery: {url}"),
        None => harvest_log::info!("  discovery: -"),
    }

    if config.elasticsearch_enabled() {
        harvest_log::info!(
            "  output: elasticsearch at {}",
            config.elasticsearch_hosts().join(", ")
        );
    }
    if config.file_enabled() {
        harvest_log::info!("  output: file {}", config.file_name().display());
    }
}

/// Initialize the metric system.
pub fn init_metrics(config: &Config) -> Result<()> {
    let Some(host) = config.statsd_addr() else {
        return Ok(());
    };

    let mut default_tags = config.metrics_default_tags().clone();
    if let Some(hostname_tag) = config.metrics_hostname_tag()
        && let Some(hostname) = hostname::get().ok().and_then(|s| s.into_string().ok())
    {
        default_tags.insert(hostname_tag.to_owned(), hostname);
    }

    harvest_statsd::init(MetricsClientConfig {
        prefix: config.metrics_prefix(),
        host,
        default_tags,
        default_sample_rate: config.metrics_sample_rate().into(),
    })?;

    Ok(())
}
