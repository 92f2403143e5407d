mod clock;
mod command;
mod config;
mod discovery;
mod input;
mod multitouch;
mod normalizer;
mod protocol;
mod reaper;
mod registry;
mod relay;
mod transcript;
mod transport;

use clap::Parser;
use clock::{Clock, MonotonicClock};
use command::Command;
use config::{Cli, RelayConfig, ServerConfig, CONNECT_TIMEOUT};
use input::replay_backend::{Pacing, ReplayBackend};
use input::{InputBackend, InputError};
use relay::Relay;
use std::io::Write;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use transport::{DisconnectPolicy, TcpTransport};

/// How often a lost gesture server connection is retried.
const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);
const COMMAND_POLL: Duration = Duration::from_millis(200);
const IDLE_POLL: Duration = Duration::from_millis(5);

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = RelayConfig::from_cli(&cli);
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let recorded = cli.replay.is_some() && !cli.realtime;

    let backend = match open_backend(&cli, &clock) {
        Ok(opened) => opened,
        Err(e) => {
            error!(error = %e, "no touch device available");
            std::process::exit(1);
        }
    };

    let display = config.display(backend.display_size());
    let output: Box<dyn Write + Send> = Box::new(std::io::stdout());
    let relay = Arc::new(Relay::new(&config, display, clock, Some(output)));
    relay.write_header();
    info!(
        width = relay.display().width,
        height = relay.display().height,
        "normalizing against display"
    );
    if cli.raw {
        relay.note("raw mode: hardware reports only, no events relayed");
    }

    if let Some(server) = &config.server {
        connect(&relay, server);
        if !relay.is_connected() && config.disconnect_policy == DisconnectPolicy::Exit {
            error!("no gesture server; use --no-socket to run without one");
            std::process::exit(1);
        }
    }

    // A recording carries its own timeline; the input thread reaps along it.
    let reaper = (!recorded).then(|| relay::spawn_reaper(relay.clone()));
    let input = spawn_input_thread(relay.clone(), backend, cli.grab, recorded);
    let commands = command::spawn_console_reader();
    info!("type quit to exit or reinit to reconnect");

    run_console(&relay, &config, &commands);

    info!("closing");
    relay.stop();
    let _ = input.join();
    if let Some(reaper) = reaper {
        let _ = reaper.join();
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config::log_filter(verbose)));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn open_backend(cli: &Cli, clock: &Arc<dyn Clock>) -> Result<Box<dyn InputBackend>, InputError> {
    if let Some(path) = &cli.replay {
        info!(path = %path.display(), realtime = cli.realtime, "replaying capture");
        let pacing = if cli.realtime {
            Pacing::Realtime
        } else {
            Pacing::Recorded
        };
        return Ok(Box::new(ReplayBackend::open(path, pacing)?));
    }
    open_hardware(cli, clock)
}

#[cfg(target_os = "linux")]
fn open_hardware(cli: &Cli, _clock: &Arc<dyn Clock>) -> Result<Box<dyn InputBackend>, InputError> {
    use discovery::udev_discovery::UdevDiscovery;
    use discovery::{DeviceDiscovery, DeviceLocator};
    use input::evdev_backend::EvdevBackend;

    let path = match &cli.device {
        Some(path) => path.clone(),
        None => {
            let devices = UdevDiscovery::find_touchscreens()
                .map_err(|e| InputError::OpenFailed(e.to_string()))?;
            let device = &devices[0];
            info!(name = %device.name, locator = %device.locator, "found touchscreen");
            match &device.locator {
                DeviceLocator::Path(path) => path.clone(),
                DeviceLocator::Serial(_) => {
                    return Err(InputError::OpenFailed(format!(
                        "{} is not an event node",
                        device.locator
                    )))
                }
            }
        }
    };
    Ok(Box::new(EvdevBackend::open(&path)?))
}

#[cfg(target_os = "windows")]
fn open_hardware(cli: &Cli, clock: &Arc<dyn Clock>) -> Result<Box<dyn InputBackend>, InputError> {
    use discovery::nextwindow_discovery::NextWindowDiscovery;
    use discovery::{DeviceDiscovery, DeviceLocator};
    use input::nextwindow_backend::NextWindowBackend;

    if cli.device.is_some() {
        warn!("--device is ignored; panels are opened through the NextWindow SDK");
    }
    let devices = NextWindowDiscovery::find_touchscreens()
        .map_err(|e| InputError::OpenFailed(e.to_string()))?;
    let device = &devices[0];
    info!(name = %device.name, locator = %device.locator, "found touchscreen");
    match device.locator {
        DeviceLocator::Serial(serial) => {
            Ok(Box::new(NextWindowBackend::open(serial, clock.clone())?))
        }
        DeviceLocator::Path(_) => Err(InputError::OpenFailed(format!(
            "{} is not a panel serial",
            device.locator
        ))),
    }
}

#[cfg(not(any(target_os = "linux", target_os = "windows")))]
fn open_hardware(_cli: &Cli, _clock: &Arc<dyn Clock>) -> Result<Box<dyn InputBackend>, InputError> {
    Err(InputError::OpenFailed(
        "no touch hardware support on this platform; use --replay".to_string(),
    ))
}

fn connect(relay: &Relay, server: &ServerConfig) {
    match TcpTransport::connect(&server.host, server.port, CONNECT_TIMEOUT) {
        Ok(transport) => {
            relay.note(&format!("Connection succeeded: {}", transport.peer()));
            relay.attach(Box::new(transport));
        }
        Err(e) => warn!(error = %e, "gesture server unavailable"),
    }
}

fn spawn_input_thread(
    relay: Arc<Relay>,
    mut backend: Box<dyn InputBackend>,
    grab: bool,
    recorded: bool,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        if grab {
            if let Err(e) = backend.grab() {
                warn!(error = %e, "could not grab touchscreen");
            }
        }

        while relay.is_running() {
            match backend.poll_tick() {
                Ok(Some(tick)) if recorded => {
                    relay.handle_recorded_tick(&tick);
                }
                Ok(Some(tick)) => {
                    relay.handle_tick(&tick);
                }
                Ok(None) => thread::sleep(IDLE_POLL),
                Err(InputError::Closed) => {
                    info!("touch source finished");
                    if recorded {
                        relay.finish_recording();
                    }
                    relay.stop();
                }
                Err(e) => {
                    error!(error = %e, "input error");
                    relay.stop();
                }
            }
        }
    })
}

/// Serve console commands until the relay stops, retrying a lost server
/// connection when the disconnect policy allows it.
fn run_console(relay: &Relay, config: &RelayConfig, commands: &mpsc::Receiver<Command>) {
    let mut last_attempt = Instant::now();

    while relay.is_running() {
        if let Some(server) = &config.server {
            if !relay.is_connected()
                && config.disconnect_policy == DisconnectPolicy::Reconnect
                && last_attempt.elapsed() >= RECONNECT_INTERVAL
            {
                connect(relay, server);
                last_attempt = Instant::now();
            }
        }

        match commands.recv_timeout(COMMAND_POLL) {
            Ok(Command::Quit) => relay.stop(),
            Ok(Command::Reconnect) => match &config.server {
                Some(server) => {
                    info!("reinitializing gesture server connection");
                    relay.detach();
                    connect(relay, server);
                    last_attempt = Instant::now();
                }
                None => warn!("no gesture server configured"),
            },
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => thread::sleep(COMMAND_POLL),
        }
    }
}
