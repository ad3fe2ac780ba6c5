use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use idp_reconciler::config::{AppConfig, LoggingConfig};
use idp_reconciler::present::{Presenter, TerminalPresenter};
use idp_reconciler::provider::Credential;
use idp_reconciler::submission::{Document, MediaType};

#[derive(Parser)]
#[command(
    name = "idp-reconciler",
    about = "Submit documents for analysis and track each job to its result",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Bind address (overrides server.bind)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Submit a document and wait for its result
    Submit {
        /// Document to analyze (PNG, JPG, TIFF or PDF, max 10 MB)
        path: PathBuf,

        /// Declared media type; guessed from the extension when omitted
        #[arg(long)]
        media_type: Option<String>,

        /// IDP token
        #[arg(long, env = "IDP_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Re-check an execution awaiting manual validation
    Refresh {
        /// Execution id from the history
        execution_id: String,

        /// IDP token
        #[arg(long, env = "IDP_TOKEN", hide_env_values = true)]
        token: String,
    },

    /// Show the recent executions
    History {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    // The logging section is not known yet; config-loading warnings go to stderr.
    let bootstrap = tracing_subscriber::fmt().with_writer(std::io::stderr).finish();
    let mut config = tracing::subscriber::with_default(bootstrap, || {
        AppConfig::resolve(cli.config.as_deref())
    })?;
    init_tracing(&config.logging);

    let mut presenter = TerminalPresenter::new(std::io::stdout());

    match cli.command {
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, "Starting idp-reconciler server");
            idp_reconciler::serve(&config).await?;
        }
        Commands::Submit {
            path,
            media_type,
            token,
        } => {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Document".to_string());
            let declared = media_type
                .or_else(|| MediaType::guess_mime(&name).map(str::to_string))
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let document = Document::new(name, declared, bytes);

            let reconciler = idp_reconciler::build_reconciler(&config)?;
            let inflight = reconciler.inflight().clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    inflight.cancel_all();
                }
            });

            println!(
                "Submitting {} ({} bytes); polling every {}s...",
                document.name,
                document.size(),
                config.polling.interval_secs
            );
            let outcome = reconciler
                .submit_and_reconcile(&document, Credential::new(token))
                .await?;
            presenter.render_outcome(&outcome)?;
            println!();
            presenter.render_history(&reconciler.history().list()?)?;
        }
        Commands::Refresh {
            execution_id,
            token,
        } => {
            let reconciler = idp_reconciler::build_reconciler(&config)?;
            let result = reconciler
                .reprobe(&execution_id, Credential::new(token))
                .await?;
            presenter.render_reprobe(&result)?;
        }
        Commands::History { json } => {
            let history = idp_reconciler::storage::HistoryStore::open(&config.history)?;
            let entries = history.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                presenter.render_history(&entries)?;
            }
        }
    }

    Ok(())
}
