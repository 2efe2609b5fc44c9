use clap::{Arg, ArgAction, Command};
use log::debug;
use std::time::Instant;

pub const DEFAULT_CONFIG_PATH: &str = "config/owlwatch.yaml";

fn cameras_arg() -> Arg {
    Arg::new("cameras")
        .long("cameras")
        .value_name("CAM_IDS")
        .help("Comma-separated list of camera ids (default: all)")
        .action(ArgAction::Set)
}

pub fn build_cli() -> Command {
    debug!("⚙️ Building CLI interface...");
    let start_time = Instant::now();
    let cmd = Command::new("owlwatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multi-camera monitoring with motion, fire and intrusion alerts.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Sets a custom configuration file")
                .default_value(DEFAULT_CONFIG_PATH)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("debug")
                .short('d')
                .long("debug")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("monitor")
                .about("Starts every camera pipeline and logs alerts until Ctrl-C")
                .arg(
                    Arg::new("duration")
                        .long("duration")
                        .value_name("SECONDS")
                        .help("Stop automatically after this many seconds")
                        .value_parser(clap::value_parser!(u64))
                        .action(ArgAction::Set),
                ),
        )
        .subcommand(Command::new("list-cameras").about("Lists configured cameras in registration order"))
        .subcommand(
            Command::new("test")
                .about("Probes each camera: open the source, read one frame, close it")
                .arg(cameras_arg()),
        );
    debug!("✅ CLI interface built in {:?}", start_time.elapsed());
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monitor_duration_is_parsed() {
        let matches = build_cli().get_matches_from(["owlwatch", "-d", "monitor", "--duration", "30"]);
        assert!(matches.get_flag("debug"));
        assert_eq!(matches.get_one::<String>("config").unwrap(), DEFAULT_CONFIG_PATH);
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, "monitor");
        assert_eq!(sub.get_one::<u64>("duration"), Some(&30));
    }

    #[test]
    fn test_accepts_camera_selection() {
        let matches = build_cli().get_matches_from(["owlwatch", "-c", "site.yaml", "test", "--cameras", "cam-1,cam-2"]);
        assert_eq!(matches.get_one::<String>("config").unwrap(), "site.yaml");
        let (_, sub) = matches.subcommand().unwrap();
        assert_eq!(sub.get_one::<String>("cameras").unwrap(), "cam-1,cam-2");
    }
}
