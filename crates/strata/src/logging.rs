//! Tracing initialisation: human-readable stderr output plus an optional
//! daily-rotated JSON file.

use anyhow::Result;
use strata_config::LoggingSection;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

const VERBOSE_FILTER: &str =
    "strata=debug,strata_session=debug,strata_sqlite=debug,strata_server=debug,strata_config=debug,info";

const FILE_FILTER: &str =
    "strata=trace,strata_session=trace,strata_sqlite=trace,strata_server=trace,strata_config=trace,info";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `--verbose`, which wins over `[logging].filter`.
/// Keep the returned guard alive for the life of the process so buffered
/// file output is flushed.
pub fn init(config: &LoggingSection, verbose: bool) -> Result<Option<WorkerGuard>> {
    let console_filter = EnvFilter::try_from_default_env().or_else(|_| {
        EnvFilter::try_new(if verbose {
            VERBOSE_FILTER
        } else {
            config.filter.as_str()
        })
    })?;

    let (file_layer, guard) = match &config.json_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "strata.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new(FILE_FILTER));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}
