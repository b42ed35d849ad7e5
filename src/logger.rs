use crate::config::AppConfig;
use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

/// Target of the structured per-operation query log.
pub const QUERY_TARGET: &str = "bookstore::query";

const ROLL_SIZE: u64 = 10 * 1024 * 1024;

fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

fn rolling(
    base: &Path,
    stem: &str,
    pattern: &str,
    keep: u32,
) -> Result<RollingFileAppender, Box<dyn std::error::Error>> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Build the log4rs config: `app.log` for the root logger and `query.log` for
/// [`QUERY_TARGET`], which carries one JSON object per line.
///
/// # Errors
/// Returns an error if the directory or appenders cannot be created.
pub fn build_config(
    dir: &Path,
    level: Option<&str>,
    retention: Option<u32>,
) -> Result<Config, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(dir)?;
    let keep = retention.unwrap_or(7);
    let lvl = parse_level(level);
    let app = rolling(dir, "app", "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}", keep)?;
    let query = rolling(dir, "query", "{m}{n}", keep)?;
    Ok(Config::builder()
        .appender(Appender::builder().build("app", Box::new(app)))
        .appender(Appender::builder().build("query", Box::new(query)))
        .logger(Logger::builder().appender("query").additive(false).build(QUERY_TARGET, lvl))
        .build(Root::builder().appender("app").build(lvl))?)
}

/// Install the global logger. A second call, or any failure, is reported and otherwise ignored.
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, retention: Option<u32>) {
    let base = dir
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join("logs"));
    match build_config(&base, level, retention) {
        Ok(config) => {
            if let Err(e) = log4rs::init_config(config) {
                eprintln!("logging already initialised: {e}");
            }
        }
        Err(e) => eprintln!("logging disabled: {e}"),
    }
}

/// Configure logging from the resolved application config.
pub fn configure_from_config(cfg: &AppConfig) {
    configure_logging(cfg.log_dir.as_deref(), cfg.log_level.as_deref(), cfg.log_retention);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_are_case_insensitive() {
        assert_eq!(parse_level(Some("DEBUG")), LevelFilter::Debug);
        assert_eq!(parse_level(Some("bogus")), LevelFilter::Info);
        assert_eq!(parse_level(None), LevelFilter::Info);
    }

    #[test]
    fn build_config_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        assert!(build_config(&logs, Some("warn"), Some(2)).is_ok());
        assert!(logs.is_dir());
    }
}
