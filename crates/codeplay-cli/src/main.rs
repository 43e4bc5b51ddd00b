//! Codeplay CLI
//!
//! Serves the code playground over WebSocket, or runs a single program
//! interactively in the local terminal.

use std::io::Write;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codeplay::{Config, EXAMPLE_CONFIG, ServerEvent, Session, StreamKind, event_channel};
use tokio::sync::mpsc;
use tracing::{Level, debug, info};
use tracing_subscriber::EnvFilter;

mod server;

#[derive(Parser)]
#[command(name = "codeplay")]
#[command(about = "An interactive multi-language code execution engine")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new configuration file
    Init {
        /// Output path (default: codeplay.toml)
        #[arg(short, long, default_value = "codeplay.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Start the WebSocket server
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:5000")]
        bind: SocketAddr,
    },

    /// Run a program in this terminal (compile if needed, then execute)
    Run {
        /// Source file to run
        #[arg(value_name = "FILE")]
        source: PathBuf,

        /// Language ID (e.g., python, cpp, rust)
        #[arg(short, long)]
        language: String,
    },

    /// List available languages
    Languages,

    /// Show the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = if let Some(ref path) = cli.config {
        info!(?path, "loading configuration");
        Config::from_file(path).context("failed to load configuration")?
    } else {
        debug!("using default configuration");
        Config::default()
    };

    match cli.command {
        Commands::Init { output, force } => init_config(&output, force).await,
        Commands::Serve { bind } => server::serve(config, bind).await,
        Commands::Run { source, language } => run_local(config, &source, &language).await,
        Commands::Languages => {
            list_languages(&config);
            Ok(())
        }
        Commands::ShowConfig => {
            show_config(&config);
            Ok(())
        }
    }
}

async fn run_local(config: Config, source: &Path, language_id: &str) -> Result<()> {
    let code = tokio::fs::read_to_string(source)
        .await
        .with_context(|| format!("failed to read source file '{}'", source.display()))?;

    let (tx, mut events) = event_channel(config.event_buffer);
    let session = Session::open(Arc::new(config), tx)
        .await
        .context("failed to create workspace")?;

    info!(language = language_id, "running program");
    let started = session.run_code(language_id, &code).await.is_ok();

    // stdin is read on a plain thread; tokio's stdin would keep the runtime
    // alive after the program ends
    let (input_tx, mut input) = mpsc::channel::<String>(16);
    if started {
        std::thread::spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if input_tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    }

    let mut success = false;
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(ServerEvent::TermOutput { data, stream }) => match stream {
                    StreamKind::Stdout => print!("{data}"),
                    StreamKind::Stderr => eprint!("{data}"),
                },
                Some(ServerEvent::TermStop { data, success: ok }) => {
                    eprintln!("{data}");
                    success = ok;
                    break;
                }
                None => break,
            },
            Some(line) = input.recv() => {
                session.send_input(&line).await;
            }
        }
        let _ = std::io::stdout().flush();
    }

    session.close().await;

    if success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn list_languages(config: &Config) {
    println!("Available languages:\n");

    for id in config.language_ids() {
        let Some(lang) = config.languages.get(id) else {
            continue;
        };
        let lang_type = if lang.is_compiled() {
            "compiled"
        } else {
            "interpreted"
        };
        println!("  {:<15} {} ({})", id, lang.name, lang_type);
    }
}

fn show_config(config: &Config) {
    println!("Workspace root: {}", config.workspace_root.display());
    println!("Compile timeout: {:?}", config.compile_timeout());
    println!("Stderr marks failure: {}", config.stderr_marks_failure);
    println!("Event buffer: {}", config.event_buffer);
    println!();
    println!("Relay:");
    println!("  Flush threshold: {}", config.relay.flush_threshold);
    println!("  Flush interval: {} ms", config.relay.flush_interval_ms);
    println!("  Read buffer: {} bytes", config.relay.read_buffer);
    println!("  Drain grace: {} ms", config.relay.drain_grace_ms);
    println!("  Max backlog: {} bytes", config.relay.max_backlog);
    println!();
    if config.env.full_env {
        println!("Environment: inherit all");
    } else {
        println!("Environment: {}", config.env.passthrough.join(", "));
    }
    println!();
    println!("Languages configured: {}", config.languages.len());
}

async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "Configuration file already exists at '{}'. Use --force to overwrite.",
            output.display()
        );
    }

    tokio::fs::write(output, EXAMPLE_CONFIG)
        .await
        .context("failed to write configuration file")?;

    println!("Created configuration file at '{}'", output.display());
    Ok(())
}
