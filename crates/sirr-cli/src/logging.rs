use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::error::CliError;

/// `RUST_LOG` when it names a level, otherwise `info` for verbose runs and
/// `warn` for quiet ones
pub fn level(verbose: bool) -> LevelFilter {
    std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| value.trim().parse().ok())
        .unwrap_or(if verbose {
            LevelFilter::Info
        } else {
            LevelFilter::Warn
        })
}

/// Route all log records to stderr so stdout carries only the report
pub fn init(level: LevelFilter) -> Result<(), CliError> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(
            "{d(%H:%M:%S%.3f)} {h({l:<5})} {t} - {m}{n}",
        )))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|e| CliError::Logging(e.to_string()))?;

    log4rs::init_config(config).map_err(|e| CliError::Logging(e.to_string()))?;
    Ok(())
}
