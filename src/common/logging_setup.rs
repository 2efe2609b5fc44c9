use crate::config_loader::MasterConfig;
use env_logger::Builder;
use log::LevelFilter;
use std::io::Write;

/// Env var with `env_logger` directives (e.g. `owlwatch::detection=trace`), applied on top.
pub const LOG_ENV_VAR: &str = "OWLWATCH_LOG";

/// Level from CLI, then config, then default.
pub fn resolve_level(debug_flag: bool, config: Option<&MasterConfig>) -> LevelFilter {
    if debug_flag {
        return LevelFilter::Debug;
    }
    let log_level_str = config
        .and_then(|c| c.app_settings.log_level.clone())
        .unwrap_or_else(|| "info".to_string());

    match log_level_str.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        s => {
            eprintln!("Unrecognized log level '{}', defaulting to info.", s);
            LevelFilter::Info
        }
    }
}

pub fn initialize_logging(config: Option<&MasterConfig>, cli_matches: &clap::ArgMatches) {
    let mut builder = Builder::new();
    builder.filter_level(resolve_level(cli_matches.get_flag("debug"), config));
    if let Ok(directives) = std::env::var(LOG_ENV_VAR) {
        builder.parse_filters(&directives);
    }

    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} [{}] {} - {}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    });

    // A second call (tests, repeated init) keeps the first logger.
    builder.try_init().unwrap_or_else(|e| {
        eprintln!("Failed to initialize logger: {}. Logging might not work as expected.", e);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_wins_over_config() {
        let mut cfg = MasterConfig::default();
        cfg.app_settings.log_level = Some("error".to_string());
        assert_eq!(resolve_level(true, Some(&cfg)), LevelFilter::Debug);
        assert_eq!(resolve_level(false, Some(&cfg)), LevelFilter::Error);
    }

    #[test]
    fn unknown_or_missing_level_falls_back_to_info() {
        let mut cfg = MasterConfig::default();
        cfg.app_settings.log_level = Some("chatty".to_string());
        assert_eq!(resolve_level(false, Some(&cfg)), LevelFilter::Info);
        assert_eq!(resolve_level(false, None), LevelFilter::Info);
    }

    #[test]
    fn repeated_initialization_keeps_the_first_logger() {
        let matches = crate::cli::build_cli().get_matches_from(["owlwatch", "--debug"]);
        initialize_logging(None, &matches);
        initialize_logging(Some(&MasterConfig::default()), &matches);
        log::debug!("still logging");
    }
}
