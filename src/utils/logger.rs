//! log4rs setup: rolling `app`, `audit` and `metrics` files, plus an optional `dev6` file.

use log::LevelFilter;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::{Path, PathBuf};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const ROLL_SIZE: u64 = 10 * 1024 * 1024;
const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";

fn parse_level(level: Option<&str>) -> LevelFilter {
    match level.unwrap_or("info").to_ascii_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Info,
    }
}

/// `{base}/{stem}.log`, rolled to `{base}/{stem}.{n}.log` keeping `keep` files.
fn rolling(base: &Path, stem: &str, keep: u32) -> Result<RollingFileAppender, BoxError> {
    let roller = FixedWindowRoller::builder().build(&format!("{}", base.join(format!("{stem}.{{}}.log")).display()), keep)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_SIZE)), Box::new(roller));
    Ok(RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build(base.join(format!("{stem}.log")), Box::new(policy))?)
}

/// Configure logging globally for the process.
/// - dir: base directory for logs; if None, current directory.
/// - level: error|warn|info|debug|trace|off
/// - retention: number of rolled files to keep (default 7)
///
/// # Errors
/// Returns an error if the directory cannot be created or an appender fails to build.
pub fn configure_logging(dir: Option<&Path>, level: Option<&str>, retention: Option<usize>) -> Result<(), BoxError> {
    configure_logging_with_dev(dir, level, retention, false)
}

/// As [`configure_logging`]; with `enable_dev6`, lines from the `dev6!` macro (target
/// `objrepo::dev6`) are also persisted to a rolling `dev6.log`.
///
/// Only the first successful call in a process installs the logger; later calls are no-ops.
///
/// # Errors
/// As [`configure_logging`].
pub fn configure_logging_with_dev(
    dir: Option<&Path>,
    level: Option<&str>,
    retention: Option<usize>,
    enable_dev6: bool,
) -> Result<(), BoxError> {
    let base = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    std::fs::create_dir_all(&base)?;
    let keep = u32::try_from(retention.unwrap_or(7)).unwrap_or(u32::MAX);
    let lvl = parse_level(level);

    let mut builder = Config::builder()
        .appender(Appender::builder().build("app", Box::new(rolling(&base, "app", keep)?)))
        .appender(Appender::builder().build("audit", Box::new(rolling(&base, "audit", keep)?)))
        .appender(Appender::builder().build("metrics", Box::new(rolling(&base, "metrics", keep)?)))
        .logger(Logger::builder().appender("audit").additive(false).build("objrepo::audit", lvl))
        .logger(Logger::builder().appender("metrics").additive(false).build("objrepo::metrics", lvl));

    builder = if enable_dev6 {
        builder
            .appender(Appender::builder().build("dev6", Box::new(rolling(&base, "dev6", keep)?)))
            .logger(Logger::builder().appender("dev6").additive(false).build("objrepo::dev6", LevelFilter::Trace))
    } else {
        // swallow dev6 lines instead of letting them reach the app log
        builder.logger(Logger::builder().additive(false).build("objrepo::dev6", LevelFilter::Off))
    };

    let config = builder.build(Root::builder().appender("app").build(lvl))?;
    if log4rs::init_config(config).is_err() {
        log::debug!("logger already installed; keeping the existing configuration");
    }
    Ok(())
}

/// Configure logging from `OBJREPO_LOG_DIR`, `OBJREPO_LOG_LEVEL`, `OBJREPO_LOG_RETENTION` and
/// `OBJREPO_DEV6`.
///
/// # Errors
/// As [`configure_logging`], or a config error for an unparsable variable.
pub fn configure_from_env() -> Result<(), BoxError> {
    let cfg = crate::config::EngineConfig::default().with_env_overrides()?;
    configure_logging_with_dev(cfg.log_dir.as_deref(), Some(&cfg.log_level), Some(cfg.log_retention), cfg.dev_log)
}
