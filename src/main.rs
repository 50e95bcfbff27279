use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod cmd;

#[derive(Parser)]
#[command(name = "artifact-host")]
#[command(version, about = "Detect, track and sandbox-render interactive artifacts in assistant replies")]
pub struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract artifacts from a markdown file
    Parse {
        /// Markdown file, or `-` for stdin
        file: PathBuf,

        /// Message id to scope artifact ids
        #[arg(long)]
        message_id: Option<String>,
    },
    /// Replay a transport NDJSON stream through the stream bridge
    Replay {
        /// File with one transport event per line
        events: PathBuf,

        /// Render the selected artifact in the sandbox afterwards
        #[arg(long)]
        render: bool,
    },
    /// Render one artifact source file in the configured sandbox
    Render {
        /// Component source file, or `-` for stdin
        file: PathBuf,
    },
    /// Run the isolated artifact runner over stdin/stdout
    Runner,
    /// Serve the runner document and the registry API
    Serve {
        /// Port to serve on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Enable dev mode (permissive CORS, bind all interfaces)
        #[arg(long)]
        dev: bool,
    },
    /// Show the effective configuration
    Config,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    match &cli.command {
        Commands::Parse { file, message_id } => {
            cmd::cmd_parse(&project_dir, file, message_id.as_deref())?
        }
        Commands::Replay { events, render } => {
            cmd::cmd_replay(&project_dir, events, *render).await?
        }
        Commands::Render { file } => cmd::cmd_render(&project_dir, file).await?,
        Commands::Runner => cmd::cmd_runner().await?,
        Commands::Serve { port, dev } => cmd::cmd_serve(&project_dir, *port, *dev).await?,
        Commands::Config => cmd::cmd_config(&project_dir)?,
    }

    Ok(())
}
