use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use storyreel_core::project::{load_clips_from_file, save_clips_to_file, seed_state};
use storyreel_core::store::{Command, Store};
use storyreel_core::types::{EditorSettings, EditorState};
use storyreel_session::backend::MockBackend;
use storyreel_session::error::SessionError;
use storyreel_session::session::Session;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::watch;

/// Drive the timeline editor with JSON intents on stdin; every new state is
/// written to stdout as one JSON line.
#[derive(Parser, Debug)]
#[command(name = "storyreel", version)]
struct Cli {
    /// Editor settings JSON. Built-in defaults when omitted.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Clip document to open instead of the built-in reel.
    #[arg(long)]
    clips: Option<PathBuf>,

    /// Save the clip document here on exit.
    #[arg(long)]
    save: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = open_store(&cli)?;
    let backend = Arc::new(MockBackend::new(store.settings().clone()));
    let handle = Session::spawn(store, backend);

    let printer = tokio::spawn(print_states(handle.subscribe()));

    let sender = handle.sender();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match sender.send_line(line).await {
            Ok(()) => {}
            Err(SessionError::Json(e)) => tracing::warn!(error = %e, "unreadable intent skipped"),
            Err(e) => return Err(e).context("session stopped"),
        }
    }

    let state = handle.shutdown().await.context("stopping session")?;
    printer.await.context("state printer panicked")??;

    if let Some(path) = &cli.save {
        let written = save_clips_to_file(&state.clips, path)
            .with_context(|| format!("saving clips to {}", path.display()))?;
        tracing::info!(path = %written.display(), "clip document saved");
    }
    Ok(())
}

fn open_store(cli: &Cli) -> anyhow::Result<Store> {
    let settings = match &cli.settings {
        Some(path) => EditorSettings::load_from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => EditorSettings::default(),
    };

    let mut store = Store::new(seed_state(&settings), settings);
    if let Some(path) = &cli.clips {
        let clips = load_clips_from_file(path)
            .with_context(|| format!("loading clips from {}", path.display()))?;
        tracing::info!(path = %path.display(), clips = clips.len(), "clip document opened");
        store.dispatch(Command::RestoreClips(clips));
    }
    Ok(store)
}

async fn print_states(mut states: watch::Receiver<EditorState>) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    loop {
        let json = serde_json::to_string(&*states.borrow_and_update())?;
        stdout.write_all(json.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
        if states.changed().await.is_err() {
            return Ok(());
        }
    }
}
