use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;

use fable_core::{Duration, FableConfig};
use fable_engine::{BundleLoader, Controller, HeadlessRenderer, NullMedia, SignalBus};
use fable_ir::{validate_presentation, Message, Presentation};

const DEFAULT_CONFIG: &str = "fable.toml";

#[derive(Parser)]
#[command(
    name = "fable",
    version,
    about = "Fable: scripted, paced presentations",
    long_about = "Fable plays a presentation script one beat at a time.\nPages of text, images, 3D entities and media-synced cues appear and retire on their own schedules while you advance."
)]
struct Cli {
    /// Path to a fable.toml (default: ./fable.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a presentation script with headless output
    Play {
        /// Path to the .json script
        #[arg()]
        file: PathBuf,

        /// Directory resource names resolve against (overrides [bundle].root)
        #[arg(short, long)]
        bundle: Option<PathBuf>,

        /// Wait for the first command instead of starting automatically
        #[arg(long)]
        manual: bool,

        /// Treat media of unknown length as ending after this many seconds
        #[arg(long, value_name = "SECONDS")]
        media_length: Option<f64>,
    },

    /// Check a script for structural errors and print its tree
    Check {
        /// Path to the .json script
        #[arg()]
        file: PathBuf,

        /// Also resolve every resource against this directory
        #[arg(short, long)]
        bundle: Option<PathBuf>,
    },

    /// Show version and engine settings
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Play {
            file,
            bundle,
            manual,
            media_length,
        } => run_async(cmd_play(file, bundle, manual, media_length, config)),
        Commands::Check { file, bundle } => cmd_check(file, bundle),
        Commands::Info => cmd_info(&config),
    }
}

fn run_async<F>(future: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;
    runtime.block_on(future)
}

fn load_config(path: Option<&Path>) -> Result<FableConfig> {
    match path {
        Some(path) => FableConfig::load_from_file(path)
            .with_context(|| format!("failed to load config: {}", path.display())),
        // Best-effort: running without a project config is allowed.
        None => Ok(FableConfig::load_from_file(Path::new(DEFAULT_CONFIG)).unwrap_or_default()),
    }
}

fn read_script(file: &Path) -> Result<Presentation> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read script: {}", file.display()))?;
    Presentation::from_json(&source)
        .with_context(|| format!("failed to parse script: {}", file.display()))
}

async fn cmd_play(
    file: PathBuf,
    bundle: Option<PathBuf>,
    manual: bool,
    media_length: Option<f64>,
    config: FableConfig,
) -> Result<()> {
    let presentation = read_script(&file)?;
    let root = bundle.unwrap_or_else(|| PathBuf::from(&config.bundle.root));
    let mut engine = config.engine.clone();
    if manual {
        engine.auto_start = false;
    }

    let bus = Arc::new(SignalBus::new());
    // Without a decoder, media of unknown length only ends when told to.
    let media = match media_length {
        Some(seconds) => {
            NullMedia::ending_after(Arc::clone(&bus), Duration::from_seconds(seconds))
        }
        None => NullMedia::new(),
    };
    let mut controller = Controller::new(
        presentation,
        engine,
        Arc::clone(&bus),
        Arc::new(HeadlessRenderer::new()),
        Arc::new(media),
    );
    controller
        .start(&BundleLoader::new(&root))
        .await
        .with_context(|| format!("failed to start {}", file.display()))?;

    println!(
        "Playing '{}' ({} steps). Enter/n: next, p: pause, r: resume, q: quit",
        controller.presentation().title,
        controller.presentation().step_count()
    );

    let (quit_tx, mut quit_rx) = oneshot::channel();
    let input = tokio::spawn(read_commands(Arc::clone(&bus), quit_tx));

    tokio::select! {
        _ = controller.run() => {}
        _ = &mut quit_rx => {}
        _ = tokio::signal::ctrl_c() => {}
    }

    input.abort();
    tracing::debug!("stopped in state {}", controller.state());
    controller.shutdown().await;
    Ok(())
}

#[derive(Debug, PartialEq)]
enum Command {
    Send(Message),
    Quit,
    Unknown,
}

fn parse_command(line: &str) -> Command {
    match line.trim() {
        "" | "n" | "next" => Command::Send(Message::Proceed),
        "p" | "pause" => Command::Send(Message::PauseMedia),
        "r" | "resume" => Command::Send(Message::ResumeMedia),
        "q" | "quit" => Command::Quit,
        _ => Command::Unknown,
    }
}

// Stdin drives playback through the bus, like any other external actor.
async fn read_commands(bus: Arc<SignalBus>, quit: oneshot::Sender<()>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_command(&line) {
                Command::Send(message) => bus.broadcast(message),
                Command::Quit => break,
                Command::Unknown => eprintln!("unknown command '{}' (n, p, r, q)", line.trim()),
            },
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("failed to read stdin: {}", e);
                break;
            }
        }
    }
    let _ = quit.send(());
}

fn cmd_check(file: PathBuf, bundle: Option<PathBuf>) -> Result<()> {
    let presentation = read_script(&file)?;
    println!("Checking {}", file.display());

    if let Err(errors) = validate_presentation(&presentation) {
        for error in &errors {
            println!("   ✗ {}", error);
        }
        anyhow::bail!("{} problem(s) in {}", errors.len(), file.display());
    }
    println!("   ✓ Structure OK");

    if let Some(root) = bundle {
        let loader = BundleLoader::new(&root);
        run_async(async {
            fable_engine::preload(&presentation, &loader)
                .await
                .with_context(|| format!("resources missing from {}", root.display()))?;
            Ok(())
        })?;
        println!("   ✓ Resources OK");
    }

    println!();
    print!("{}", presentation.describe());
    Ok(())
}

fn cmd_info(config: &FableConfig) -> Result<()> {
    let engine = &config.engine;
    println!("Fable Presentation Engine");
    println!("   Version:             {}", env!("CARGO_PKG_VERSION"));
    println!("   Bundle root:         {}", config.bundle.root);
    println!("   Log filter:          {}", config.logging.filter);
    println!("   Media tick:          {}", engine.media_tick());
    println!("   GC interval:         {}", engine.gc_interval());
    println!("   Appearance timeout:  {}", engine.appearance_timeout());
    println!(
        "   Auto start:          {}",
        if engine.auto_start {
            format!("after {}", engine.start_delay())
        } else {
            "off".to_string()
        }
    );
    Ok(())
}
