use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::{never, select, tick, unbounded, Receiver, Sender};
use global_hotkey::GlobalHotKeyEvent;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use spice_rack::audio::{CaptureSettings, MicrophoneSource};
use spice_rack::config::{Config, VoiceConfig};
use spice_rack::console::{self, Command, Flow};
use spice_rack::input::ListenHotkey;
use spice_rack::panel::{position_label, Panel};
use spice_rack::positions::{stored_positions, PositionStore, SharedNames};
use spice_rack::store::{DocumentStore, MemoryStore, StoreHandle};
use spice_rack::telemetry;
use spice_rack::transcription::{Transcriber, TranscriptionEngine};
use spice_rack::voice::{VoiceEvent, VoiceSession};

/// Panel refresh interval (long-press detection and voice results)
const TICK_INTERVAL: Duration = Duration::from_millis(20);

/// Spice Rack - touch and voice control for a spice-dispensing rack
#[derive(Parser)]
#[command(name = "spice-rack")]
#[command(about = "Kiosk controller for a spice-dispensing rack", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file path (default: ~/.spice-rack.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep state in memory instead of the remote store
    #[arg(long)]
    offline: bool,

    /// Skip loading the speech model
    #[arg(long)]
    no_voice: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the kiosk panel (default)
    Run,
    /// Print the stored positions and exit
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, created) = Config::load(cli.config.as_deref())?;
    telemetry::init(&config.telemetry)?;
    info!("spice-rack starting");
    if let Some(path) = created {
        info!(path = %path.display(), "wrote default config");
    }

    if cli.offline {
        info!("offline mode: using in-memory store");
        dispatch(&cli, &config, MemoryStore::new())?;
    } else {
        let store = StoreHandle::open(&config.store).context("failed to open store")?;
        let store = dispatch(&cli, &config, store)?;
        store.close();
    }

    info!("spice-rack stopped");
    Ok(())
}

fn dispatch<S: DocumentStore>(cli: &Cli, config: &Config, store: S) -> Result<S> {
    match cli.command {
        Some(Commands::List) => {
            list(&store)?;
            Ok(store)
        }
        Some(Commands::Run) | None => run_kiosk(config, store, !cli.no_voice),
    }
}

fn list<S: DocumentStore>(store: &S) -> Result<()> {
    let document = store.fetch_root().context("failed to fetch positions")?;
    for position in stored_positions(&document) {
        let marker = if position.selected { '*' } else { ' ' };
        println!("{marker}{}", position_label(position.index, &position.name));
    }
    Ok(())
}

fn run_kiosk<S: DocumentStore>(config: &Config, store: S, voice_enabled: bool) -> Result<S> {
    let rack = PositionStore::open(store, config.panel.indices())
        .context("failed to load rack state")?;

    let (voice_tx, voice_rx) = unbounded();
    let mut panel = Panel::new(rack, &config.panel, voice_rx);
    if voice_enabled {
        match build_voice(&config.voice, panel.rack().shared_names(), voice_tx) {
            Ok(session) => panel = panel.with_voice(session),
            Err(e) => warn!("voice control disabled: {e:#}"),
        }
    }

    let hotkey = if config.hotkey.enabled {
        ListenHotkey::new(&config.hotkey)
            .map_err(|e| warn!("listen hotkey unavailable: {e:#}"))
            .ok()
    } else {
        None
    };

    let (shutdown_tx, shutdown_rx) = unbounded();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("failed to install Ctrl-C handler")?;

    event_loop(&mut panel, hotkey.as_ref(), &shutdown_rx);

    drop(hotkey);
    Ok(panel.into_rack().into_inner())
}

fn build_voice(
    config: &VoiceConfig,
    names: SharedNames,
    events: Sender<VoiceEvent>,
) -> Result<VoiceSession> {
    let engine = TranscriptionEngine::from_config(config)?;
    let source = MicrophoneSource::new(CaptureSettings::from_config(config)?);
    let transcriber = Transcriber::new(Arc::new(engine));

    Ok(VoiceSession::new(
        Arc::new(source),
        Arc::new(transcriber),
        names,
        events,
    ))
}

enum Input {
    Line(String),
    Closed,
    Shutdown,
    Tick,
}

fn event_loop<S: DocumentStore>(
    panel: &mut Panel<S>,
    hotkey: Option<&ListenHotkey>,
    shutdown: &Receiver<()>,
) {
    let ticker = tick(TICK_INTERVAL);
    let mut lines = spawn_stdin_reader();

    info!("event loop starting (type 'help' for commands, Ctrl+C to exit)");
    println!("{}", panel.render());

    loop {
        let mut redraw = false;

        let input = select! {
            recv(lines) -> line => line.map_or(Input::Closed, Input::Line),
            recv(shutdown) -> _ => Input::Shutdown,
            recv(ticker) -> _ => Input::Tick,
        };

        match input {
            Input::Line(line) => {
                redraw = true;
                match console::parse(&line) {
                    Ok(Command::Help) => println!("{}", console::HELP),
                    Ok(command) => {
                        if console::apply(panel, command, Instant::now()) == Flow::Quit {
                            break;
                        }
                    }
                    Err(e) => println!("{e}"),
                }
            }
            Input::Closed => {
                info!("stdin closed, console input disabled");
                lines = never();
            }
            Input::Shutdown => {
                info!("shutdown signal received");
                break;
            }
            Input::Tick => {}
        }

        if let Some(hotkey) = hotkey {
            while let Ok(event) = GlobalHotKeyEvent::receiver().try_recv() {
                if hotkey.is_trigger(&event) && panel.start_listening() {
                    redraw = true;
                }
            }
        }

        let editing = panel.editor().is_some();
        if panel.tick(Instant::now()) > 0 || panel.editor().is_some() != editing {
            redraw = true;
        }

        if redraw {
            println!("{}", panel.render());
        }
    }

    println!("\nShutting down...");
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = unbounded();
    let spawned = std::thread::Builder::new()
        .name("console-input".to_owned())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

    if let Err(e) = spawned {
        warn!("console input unavailable: {e}");
        return never();
    }
    rx
}
