use crate::multitouch::DisplaySize;
use crate::protocol::DEFAULT_PORT;
use crate::reaper::TOUCH_WAIT_TIME_MS;
use crate::transport::DisconnectPolicy;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Panel resolution of the HP TouchSmart the relay was built for.
pub const DEFAULT_DISPLAY: DisplaySize = DisplaySize::new(1920.0, 1080.0);

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(
    name = "touch-relay",
    version,
    about = "Relays two-touch panel events to a gesture server"
)]
pub struct Cli {
    /// Echo every event on stdout as a replayable Jmol script line
    #[arg(short, long)]
    pub test: bool,

    /// Run without connecting to the gesture server
    #[arg(long, alias = "nosocket")]
    pub no_socket: bool,

    /// Print raw hardware reports instead of relaying events
    #[arg(long)]
    pub raw: bool,

    /// Exit when the gesture server connection is lost
    #[arg(long, alias = "exitondisconnect")]
    pub exit_on_disconnect: bool,

    /// Gesture server host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Gesture server port
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Width of the raw coordinate space (defaults to the panel's display)
    #[arg(long, value_parser = positive_f32)]
    pub width: Option<f32>,

    /// Height of the raw coordinate space (defaults to the panel's display)
    #[arg(long, value_parser = positive_f32)]
    pub height: Option<f32>,

    /// Milliseconds without reports before a touch is declared dead
    #[arg(long, default_value_t = TOUCH_WAIT_TIME_MS)]
    pub idle_timeout_ms: u64,

    /// Replay a capture recorded with --raw instead of reading hardware
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Pace the replay by its recorded timestamps
    #[arg(long, requires = "replay")]
    pub realtime: bool,

    /// Touchscreen event device (Linux; discovered via udev by default)
    #[arg(long, value_name = "PATH")]
    pub device: Option<PathBuf>,

    /// Grab the touchscreen so it stops driving the pointer (Linux)
    #[arg(long)]
    pub grab: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn positive_f32(s: &str) -> Result<f32, String> {
    let value: f32 = s.parse().map_err(|e| format!("{}", e))?;
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(format!("{} is not a positive size", s))
    }
}

/// Default log filter for a `-v` count; `RUST_LOG` takes precedence.
pub fn log_filter(verbose: u8) -> String {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    format!("touch_relay={}", level)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Runtime settings of the relay, resolved from the command line.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub server: Option<ServerConfig>,
    pub transcript: bool,
    pub raw: bool,
    pub disconnect_policy: DisconnectPolicy,
    pub idle_timeout_ms: u64,
    width: Option<f32>,
    height: Option<f32>,
}

impl RelayConfig {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            server: (!cli.no_socket).then(|| ServerConfig {
                host: cli.host.clone(),
                port: cli.port,
            }),
            transcript: cli.test,
            raw: cli.raw,
            disconnect_policy: if cli.exit_on_disconnect {
                DisconnectPolicy::Exit
            } else {
                DisconnectPolicy::Reconnect
            },
            idle_timeout_ms: cli.idle_timeout_ms,
            width: cli.width,
            height: cli.height,
        }
    }

    /// Coordinate space to normalize against: explicit sizes win over what
    /// the device reports, which wins over the default panel.
    pub fn display(&self, detected: Option<DisplaySize>) -> DisplaySize {
        let base = detected.unwrap_or(DEFAULT_DISPLAY);
        DisplaySize::new(
            self.width.unwrap_or(base.width),
            self.height.unwrap_or(base.height),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["touch-relay"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_connect_locally_and_stay_up() {
        let config = RelayConfig::from_cli(&parse(&[]));
        assert_eq!(
            config.server,
            Some(ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5947
            })
        );
        assert_eq!(config.disconnect_policy, DisconnectPolicy::Reconnect);
        assert_eq!(config.idle_timeout_ms, 75);
        assert!(!config.transcript);
        assert!(!config.raw);
    }

    #[test]
    fn legacy_flag_spellings_are_accepted() {
        let config = RelayConfig::from_cli(&parse(&["--test", "--nosocket", "--exitondisconnect"]));
        assert!(config.server.is_none());
        assert!(config.transcript);
        assert_eq!(config.disconnect_policy, DisconnectPolicy::Exit);
    }

    #[test]
    fn explicit_sizes_override_detected_display() {
        let config = RelayConfig::from_cli(&parse(&["--width", "1000"]));
        let display = config.display(Some(DisplaySize::new(800.0, 600.0)));
        assert_eq!(display, DisplaySize::new(1000.0, 600.0));
        assert_eq!(
            RelayConfig::from_cli(&parse(&[])).display(None),
            DEFAULT_DISPLAY
        );
    }

    #[test]
    fn rejects_non_positive_sizes_and_orphan_realtime() {
        assert!(Cli::try_parse_from(["touch-relay", "--width", "0"]).is_err());
        assert!(Cli::try_parse_from(["touch-relay", "--height", "-3"]).is_err());
        assert!(Cli::try_parse_from(["touch-relay", "--realtime"]).is_err());
    }

    #[test]
    fn verbosity_maps_to_filter() {
        assert_eq!(log_filter(0), "touch_relay=warn");
        assert_eq!(log_filter(2), "touch_relay=debug");
        assert_eq!(log_filter(9), "touch_relay=trace");
    }
}
