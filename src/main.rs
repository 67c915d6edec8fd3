//! voxlive command-line entry point.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voxlive::config::{get_config_path, load_config, save_config, Config};
use voxlive::tools::default_declarations;

#[derive(Parser)]
#[command(name = "voxlive", version, about = "Live voice conversation sessions")]
struct Cli {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a live conversation session
    Run,
    /// List the builtin tool surface
    Tools,
    /// Print the effective configuration
    Config,
    /// Write a default configuration file
    Init,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref());

    match cli.command {
        Commands::Run => run_session(config).await,
        Commands::Tools => {
            for decl in default_declarations() {
                println!("{:24} {}", decl.name, decl.description);
            }
            Ok(())
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Init => {
            let path = cli.config.unwrap_or_else(get_config_path);
            save_config(&Config::default(), Some(&path))?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

#[cfg(not(feature = "devices"))]
async fn run_session(_config: Config) -> Result<()> {
    anyhow::bail!(
        "this build has no audio device support; rebuild with `--features devices` to run sessions"
    )
}

#[cfg(feature = "devices")]
async fn run_session(config: Config) -> Result<()> {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::watch;

    use voxlive::audio::cpal_backend::{CpalMic, CpalSpeaker};
    use voxlive::audio::{AudioCapture, PlaybackScheduler};
    use voxlive::live::{SessionController, SessionState, WsTransport};
    use voxlive::tools::builtin::BuiltinToolExecutor;
    use voxlive::tools::reminders::{AnnounceFn, ReminderScheduler};
    use voxlive::tools::ToolDispatcher;

    let speaker = CpalSpeaker::open(config.session.output_sample_rate)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
    let playback = PlaybackScheduler::new(Box::new(speaker));
    let capture = AudioCapture::new(Box::new(CpalMic::new(config.session.input_sample_rate)));
    let transport = Arc::new(WsTransport::new(&config.provider.live_endpoint));

    // The reminder scheduler and the controller reference each other
    // (announcements go through the session; liveness comes from the
    // controller), so the liveness channel and the announce slot are
    // created first and wired afterwards.
    let (alive_tx, alive_rx) = watch::channel(false);
    let controller_slot: Arc<Mutex<Option<Arc<SessionController>>>> = Arc::new(Mutex::new(None));
    let announce_slot = controller_slot.clone();
    let announce: AnnounceFn = Arc::new(move |text| {
        let slot = announce_slot.clone();
        Box::pin(async move {
            let controller = slot.lock().unwrap_or_else(|e| e.into_inner()).clone();
            if let Some(controller) = controller {
                controller.announce(&text);
            }
        })
    });
    let (reminders, mut reminder_events) = ReminderScheduler::new(announce, alive_rx);

    let executor = BuiltinToolExecutor::new(
        config.provider.clone(),
        config.tools.clone(),
        reminders.clone(),
    );
    let dispatcher = ToolDispatcher::new(Arc::new(executor));
    let controller = Arc::new(SessionController::new(
        config, transport, dispatcher, playback, capture, alive_tx,
    ));
    *controller_slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(controller.clone());

    tokio::spawn(async move {
        while let Some(event) = reminder_events.recv().await {
            tracing::info!("reminder event: {event:?}");
        }
    });

    // Surface state transitions and committed turns on the console.
    let mut snapshots = controller.subscribe();
    tokio::spawn(async move {
        let mut last_state = SessionState::Idle;
        let mut shown_turns = 0;
        while snapshots.changed().await.is_ok() {
            let (state, new_turns, error) = {
                let s = snapshots.borrow_and_update();
                shown_turns = shown_turns.min(s.history.len());
                (s.state, s.history[shown_turns..].to_vec(), s.error.clone())
            };
            if state != last_state {
                println!("[{state:?}]");
                last_state = state;
            }
            for turn in &new_turns {
                if !turn.user.is_empty() {
                    println!("  you:   {}", turn.user);
                }
                if !turn.model.is_empty() {
                    println!("  model: {}", turn.model);
                }
            }
            shown_turns += new_turns.len();
            if state == SessionState::Error {
                if let Some(message) = error {
                    eprintln!("error: {message}");
                }
            }
        }
    });

    println!("Starting session. Commands: m = mute, i = interrupt, q = quit.");
    controller.start().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line?.as_deref().map(str::trim) {
                    Some("m") => { controller.toggle_mute(); }
                    Some("i") => controller.interrupt(),
                    Some("q") | None => break,
                    Some(other) if !other.is_empty() => {
                        println!("unknown command '{other}'");
                    }
                    Some(_) => {}
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    controller.stop().await;
    Ok(())
}
