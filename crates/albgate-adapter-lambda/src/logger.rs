use std::str::FromStr;

use log::LevelFilter;
use simple_logger::SimpleLogger;

/// Level variable set by Lambda's advanced logging controls.
pub const LAMBDA_LOG_LEVEL_ENV: &str = "AWS_LAMBDA_LOG_LEVEL";
pub const RUST_LOG_ENV: &str = "RUST_LOG";

/// Logging settings for a function instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LambdaLogging {
    pub level: LevelFilter,
    pub echo_stdout: bool,
}

impl Default for LambdaLogging {
    fn default() -> Self {
        Self {
            level: LevelFilter::Info,
            echo_stdout: true,
        }
    }
}

impl LambdaLogging {
    /// Read the level from `AWS_LAMBDA_LOG_LEVEL`, then `RUST_LOG`, defaulting to `info`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let level = [LAMBDA_LOG_LEVEL_ENV, RUST_LOG_ENV]
            .into_iter()
            .filter_map(|key| lookup(key))
            .find_map(|raw| parse_level(&raw))
            .unwrap_or(LevelFilter::Info);

        Self {
            level,
            ..Self::default()
        }
    }

    pub fn effective_level(&self) -> LevelFilter {
        if self.echo_stdout {
            self.level
        } else {
            LevelFilter::Off
        }
    }
}

fn parse_level(raw: &str) -> Option<LevelFilter> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("fatal") {
        return Some(LevelFilter::Error);
    }
    LevelFilter::from_str(raw).ok()
}

pub fn init_logger(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    SimpleLogger::new().with_level(level).init()
}
