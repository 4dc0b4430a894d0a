mod commands;
mod manifest;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tokenflow")]
#[command(about = "Declarative Cloudflare user tokens", long_about = None)]
struct Cli {
    /// Manifest path (defaults to tokens.yaml discovery)
    #[arg(short, long, env = "TOKENFLOW_MANIFEST", global = true)]
    manifest: Option<PathBuf>,

    /// Directory holding .tokenflow/state.json
    #[arg(long, env = "TOKENFLOW_STATE_DIR", global = true, default_value = ".")]
    state_dir: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a token defined in the manifest and start tracking it
    Create {
        /// Token address in the manifest
        address: String,
    },
    /// Refresh tracked tokens from Cloudflare
    Refresh {
        /// Token address (all tracked tokens if omitted)
        address: Option<String>,
    },
    /// Push the manifest's name and policies to a tracked token
    Update {
        /// Token address in the manifest
        address: String,
    },
    /// Delete a tracked token
    Destroy {
        /// Token address
        address: String,
    },
    /// Show tracked state
    Show {
        /// Token address (all tracked tokens if omitted)
        address: Option<String>,
        /// Print the secret value
        #[arg(long)]
        reveal: bool,
    },
    /// Check the configured Cloudflare credentials
    Verify,
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let ctx = commands::Context::new(cli.manifest, &cli.state_dir);

    match cli.command {
        Commands::Create { address } => commands::create::handle(&ctx, &address).await,
        Commands::Refresh { address } => commands::refresh::handle(&ctx, address.as_deref()).await,
        Commands::Update { address } => commands::update::handle(&ctx, &address).await,
        Commands::Destroy { address } => commands::destroy::handle(&ctx, &address).await,
        Commands::Show { address, reveal } => {
            commands::show::handle(&ctx, address.as_deref(), reveal).await
        }
        Commands::Verify => commands::verify::handle(&ctx).await,
        Commands::Version => {
            println!("tokenflow {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
