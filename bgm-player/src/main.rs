//! Background music player (bgm-player) - CLI host
//!
//! Hosts the playback service the way an application would: components are
//! shown, hidden and closed with line commands on stdin, and the coordinator
//! turns those transitions into playback commands. Playback events are printed
//! to stdout as JSON lines.

use std::io::BufRead;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use bgm_common::config::{resolve_assets_dir, BgmSettings, TomlConfig};
use bgm_common::events::{event_channel, EventReceiver, DEFAULT_EVENT_CAPACITY};
use bgm_common::PlaybackState;
use bgm_player::assets::{AssetProvider, DirectoryAssets};
use bgm_player::player::{PlayerFactory, SymphoniaPlayerFactory};
use bgm_player::{BackgroundPlaybackCoordinator, BgmServiceBinder, ComponentId, Music, WorkerConfig};
use clap::Parser;
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments for bgm-player
#[derive(Parser, Debug)]
#[command(name = "bgm-player")]
#[command(about = "Background music player driven by component visibility")]
#[command(version)]
struct Args {
    /// Folder containing track files
    #[arg(short, long, env = "BGM_ASSETS_DIR")]
    assets_dir: Option<PathBuf>,

    /// Track started when the service connects
    #[arg(short, long)]
    track: Option<String>,

    /// Configuration file (default: ~/.config/bgm/config.toml, then /etc/bgm/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Discard audio instead of opening an output device
    #[arg(long)]
    null_output: bool,

    /// Log level for bgm crates (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

/// Line command read from stdin
#[derive(Debug, Clone, PartialEq, Eq)]
enum CliCommand {
    Start(String),
    Pause,
    Resume,
    Stop,
    Release,
    Show(ComponentId),
    Hide(ComponentId),
    Close(ComponentId),
    Status,
    Quit,
}

impl FromStr for CliCommand {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };
        let argument = words.next();

        let component = |argument: Option<&str>| -> Result<ComponentId> {
            let raw = argument.context("missing component id")?;
            let id = raw
                .parse::<u64>()
                .with_context(|| format!("invalid component id '{}'", raw))?;
            Ok(ComponentId(id))
        };

        let command = match verb {
            "start" => CliCommand::Start(argument.context("missing file name")?.to_string()),
            "pause" => CliCommand::Pause,
            "resume" => CliCommand::Resume,
            "stop" => CliCommand::Stop,
            "release" => CliCommand::Release,
            "show" => CliCommand::Show(component(argument)?),
            "hide" => CliCommand::Hide(component(argument)?),
            "close" => CliCommand::Close(component(argument)?),
            "status" => CliCommand::Status,
            "quit" | "exit" => CliCommand::Quit,
            other => bail!("unknown command '{}'", other),
        };
        Ok(command)
    }
}

/// Snapshot printed by the `status` command
#[derive(Debug, Serialize)]
struct StatusReport {
    bound: bool,
    state: PlaybackState,
    file: Option<String>,
    playing: bool,
    playable: bool,
    track: String,
    created: usize,
    visible: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Tracing comes up before config loading so its warnings are visible
    let env_filter = EnvFilter::try_from_default_env().ok();
    let explicit_level = env_filter.is_some() || args.log_level.is_some();
    let initial = env_filter.unwrap_or_else(|| crate_filter(args.log_level.as_deref().unwrap_or("info")));
    let (filter, filter_handle) = reload::Layer::new(initial);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = TomlConfig::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    // RUST_LOG and --log-level win over the config file
    if !explicit_level {
        if let Err(e) = filter_handle.reload(crate_filter(&config.logging.level)) {
            warn!("Failed to apply configured log level: {}", e);
        }
    }

    info!(
        "Starting bgm-player v{} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("BGM_GIT_HASH"),
        env!("BGM_BUILD_TIMESTAMP"),
        env!("BGM_BUILD_PROFILE")
    );

    if args.null_output {
        config.output.null_output = true;
    }
    if let Some(track) = args.track {
        config.track = track;
    }

    let assets_dir = resolve_assets_dir(args.assets_dir.as_deref(), &config);
    info!("Assets directory: {}", assets_dir.display());
    info!("Track: {}", config.track);

    let (events, _) = event_channel(DEFAULT_EVENT_CAPACITY);
    let printer = tokio::spawn(print_events(events.subscribe()));

    let assets: Arc<dyn AssetProvider> = Arc::new(DirectoryAssets::new(assets_dir));
    let factory: Arc<dyn PlayerFactory> = Arc::new(SymphoniaPlayerFactory::new(config.output.clone()));
    let binder = Arc::new(BgmServiceBinder::new(
        WorkerConfig::from(&config),
        assets,
        factory,
        events.clone(),
    ));
    let mut coordinator = BackgroundPlaybackCoordinator::new(BgmSettings::from(&config), binder.clone());

    // The main component comes up with the application
    coordinator.connect().context("Failed to bind playback service")?;
    show(&mut coordinator, ComponentId(1));

    info!("Commands: start <file>, pause, resume, stop, release, show <id>, hide <id>, close <id>, status, quit");

    let mut lines = spawn_stdin_reader().context("Failed to start stdin reader")?;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.recv() => match line {
                Some(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match line.parse::<CliCommand>() {
                        Ok(CliCommand::Quit) => break,
                        Ok(command) => handle(&mut coordinator, &binder, command),
                        Err(e) => warn!("{}", e),
                    }
                }
                None => {
                    info!("End of input, shutting down");
                    break;
                }
            },
            _ = &mut shutdown => break,
        }
    }

    coordinator.disconnect();
    // Closing every sender ends the printer after the final events
    drop(coordinator);
    drop(binder);
    drop(events);
    if let Err(e) = printer.await {
        warn!("Event printer failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Filter applying `level` to the bgm crates
fn crate_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("bgm_player={level},bgm_common={level}"))
}

fn handle(coordinator: &mut BackgroundPlaybackCoordinator, binder: &BgmServiceBinder, command: CliCommand) {
    match command {
        CliCommand::Start(file) => coordinator.set_track(file),
        CliCommand::Pause | CliCommand::Resume | CliCommand::Stop | CliCommand::Release => {
            let Some(service) = coordinator.service() else {
                warn!("Playback service not bound");
                return;
            };
            match command {
                CliCommand::Pause => service.pause(),
                CliCommand::Resume => service.resume(),
                CliCommand::Stop => service.stop(),
                _ => service.release(),
            }
        }
        CliCommand::Show(id) => show(coordinator, id),
        CliCommand::Hide(id) => hide(coordinator, id),
        CliCommand::Close(id) => {
            hide(coordinator, id);
            coordinator.on_destroyed(id, false);
        }
        CliCommand::Status => {
            let live = binder.service();
            let report = StatusReport {
                bound: coordinator.is_bound(),
                state: live.as_ref().map(|s| s.state()).unwrap_or(PlaybackState::Idle),
                file: live.as_ref().and_then(|s| s.current_file()),
                playing: live.as_ref().is_some_and(|s| s.is_playing()),
                playable: live.as_ref().is_some_and(|s| s.is_playable()),
                track: coordinator.settings().file_name().to_string(),
                created: coordinator.created_count(),
                visible: coordinator.visible_count(),
            };
            match serde_json::to_string(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Failed to encode status: {}", e),
            }
        }
        CliCommand::Quit => {}
    }
}

fn show(coordinator: &mut BackgroundPlaybackCoordinator, id: ComponentId) {
    if !coordinator.is_created(id) {
        coordinator.on_created(id);
    }
    if !coordinator.is_visible(id) {
        coordinator.on_started(id);
        coordinator.on_resumed(id);
    }
}

fn hide(coordinator: &mut BackgroundPlaybackCoordinator, id: ComponentId) {
    if coordinator.is_visible(id) {
        coordinator.on_paused(id);
        coordinator.on_stopped(id, false);
    }
}

/// Read stdin lines on a plain thread
///
/// A blocking stdin read would otherwise hold up runtime shutdown after
/// Ctrl+C; the detached thread ends with the process.
fn spawn_stdin_reader() -> std::io::Result<mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name("bgm-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

async fn print_events(mut events: EventReceiver) {
    loop {
        match events.recv().await {
            Ok(event) => match event.to_json() {
                Ok(json) => println!("{}", json),
                Err(e) => warn!("Failed to encode event: {}", e),
            },
            Err(RecvError::Lagged(skipped)) => warn!("Event printer lagged, {} events skipped", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
