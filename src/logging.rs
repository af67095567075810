use std::str::FromStr;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use crate::error::{BackendError, Result};

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S)} [{l}] {t} - {m}{n}";

pub fn parse_level(level: &str) -> Result<LevelFilter> {
    LevelFilter::from_str(level.trim())
        .map_err(|_| BackendError::Config(format!("unknown log level '{level}'")))
}

/// Sends all log output to stderr so stdout stays free for command output.
pub fn init_logger(level: &str) -> Result<()> {
    let level = parse_level(level)?;
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr)))
        .build(Root::builder().appender("stderr").build(level))
        .map_err(|err| BackendError::Config(format!("invalid logging config: {err}")))?;

    log4rs::init_config(config)
        .map_err(|err| BackendError::Config(format!("logger init failed: {err}")))?;
    Ok(())
}
