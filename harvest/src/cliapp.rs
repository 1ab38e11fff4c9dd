//! This module implements the definition of the command line app.

use clap::builder::ValueParser;
use clap::{Arg, Command};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Harvest scrapes application metrics and ships them as deltas.";

pub fn make_app() -> Command {
    Command::new("harvest")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(ValueParser::path_buf())
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("run")
                .about("Run the daemon")
                .after_help(
                    "This runs the daemon in the foreground until it's shut down. It scrapes \
                     the configured and discovered endpoints and serves the control API on \
                     the configured address.",
                )
                .arg(
                    Arg::new("period")
                        .long("period")
                        .value_name("SECS")
                        .env("HARVEST_PERIOD")
                        .help("The scrape period in seconds."),
                )
                .arg(
                    Arg::new("listen")
                        .long("listen")
                        .value_name("ADDR")
                        .env("HARVEST_LISTEN")
                        .help("The address the control API binds to."),
                )
                .arg(
                    Arg::new("log_level")
                        .long("log-level")
                        .value_name("LEVEL")
                        .env("HARVEST_LOG_LEVEL")
                        .help("The log level (off, error, warn, info, debug, trace)."),
                )
                .arg(
                    Arg::new("statsd")
                        .long("statsd")
                        .value_name("ADDR")
                        .env("HARVEST_STATSD")
                        .help("The statsd host for self-metrics, empty to disable."),
                )
                .arg(
                    Arg::new("hosts")
                        .long("hosts")
                        .value_name("URLS")
                        .env("HARVEST_HOSTS")
                        .help("Comma separated endpoint URLs, replacing the configured hosts."),
                ),
        )
}
