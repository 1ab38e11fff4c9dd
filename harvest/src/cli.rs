use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::ArgMatches;
use harvest_config::{Config, OverridableConfig};

use crate::cliapp::make_app;
use crate::setup;

/// Default config folder relative to the working directory.
const DEFAULT_CONFIG_DIR: &str = ".harvest";

/// Runs the command line application.
pub fn execute() -> Result<()> {
    let app = make_app();
    let matches = app.get_matches();
    let config_path = matches
        .get_one::<PathBuf>("config")
        .map_or(Path::new(DEFAULT_CONFIG_DIR), PathBuf::as_path);

    let mut config = Config::from_path(config_path)?;

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            config.apply_override(extract_config_args(run_matches))?;
            run(config)
        }
        _ => unreachable!(),
    }
}

/// Extracts config overrides from the arguments and environment of `run`.
pub fn extract_config_args(matches: &ArgMatches) -> OverridableConfig {
    OverridableConfig {
        period: matches.get_one("period").cloned(),
        listen: matches.get_one("listen").cloned(),
        log_level: matches.get_one("log_level").cloned(),
        statsd: matches.get_one("statsd").cloned(),
        hosts: matches.get_one("hosts").cloned(),
    }
}

pub fn run(config: Config) -> Result<()> {
    harvest_log::init(config.logging());
    setup::init_metrics(&config)?;
    setup::dump_spawn_infos(&config);
    setup::check_config(&config)?;

    harvest_server::run(config)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_overrides() {
        let matches = make_app().get_matches_from([
            "harvest",
            "run",
            "--period",
            "30",
            "--statsd",
            "",
            "--hosts",
            "http://a/metrics, http://b/prometheus",
        ]);

        let (_, run_matches) = matches.subcommand().unwrap();
        let overrides = extract_config_args(run_matches);
        assert_eq!(overrides.period.as_deref(), Some("30"));
        assert_eq!(overrides.statsd.as_deref(), Some(""));
        assert_eq!(overrides.listen, None);

        let mut config = Config::default();
        config.apply_override(overrides).unwrap();
        assert_eq!(config.beat_period().as_secs(), 30);
        assert_eq!(config.statsd_addr(), None);
        assert_eq!(
            config.static_hosts(),
            ["http://a/metrics", "http://b/prometheus"]
        );
    }

    #[test]
    fn test_config_is_global() {
        let matches = make_app().get_matches_from(["harvest", "run", "--config", "/etc/harvest"]);
        assert_eq!(
            matches.get_one::<PathBuf>("config"),
            Some(&PathBuf::from("/etc/harvest"))
        );
    }

    #[test]
    fn test_invalid_override() {
        let matches = make_app().get_matches_from(["harvest", "run", "--period", "0"]);
        let (_, run_matches) = matches.subcommand().unwrap();

        let mut config = Config::default();
        assert!(config.apply_override(extract_config_args(run_matches)).is_err());
    }
}
