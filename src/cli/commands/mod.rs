//! CLI commands implementation.
//!
//! This module contains the CLI parser and dispatches to command-specific modules.

mod documents;
mod init;
mod resolve;
mod serve;
mod upload;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions};

#[derive(Parser)]
#[command(name = "arcus")]
#[command(about = "Floor-plan document ingestion and detection-layer service")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory holding arcus.db and published images
    #[arg(long, global = true)]
    data: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory and database
    Init,

    /// Start the HTTP API server
    Serve {
        /// Address to bind: port, host, or host:port (default from config)
        bind: Option<String>,
    },

    /// Render a PDF and upload it to a running server in batches
    Upload {
        /// PDF file to upload
        file: PathBuf,
        /// Document name (defaults to the file stem)
        #[arg(short, long)]
        name: Option<String>,
        /// Pages per batch
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Batches in flight at once
        #[arg(long)]
        concurrency: Option<usize>,
        /// Server base URL
        #[arg(long, env = "ARCUS_API_URL")]
        api_url: Option<String>,
        /// Owner id sent with every request
        #[arg(short, long, env = "ARCUS_USER_ID")]
        user: Option<String>,
    },

    /// Inspect stored documents
    Documents {
        #[command(subcommand)]
        command: DocumentCommands,
    },

    /// Show which overlay image the viewer would display for a page
    Resolve {
        /// Document ID
        id: String,
        /// 0-based page (defaults to the stored current page)
        #[arg(short, long)]
        page: Option<usize>,
        /// Show single door detections
        #[arg(long)]
        single_doors: bool,
        /// Show double door detections
        #[arg(long)]
        double_doors: bool,
        /// Show window detections
        #[arg(long)]
        windows: bool,
    },
}

#[derive(Subcommand)]
enum DocumentCommands {
    /// List documents across all owners
    List {
        /// Output format: table or json
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Show one document's status and layer coverage
    Show {
        /// Document ID
        id: String,
    },
    /// Delete a document
    Delete {
        /// Document ID
        id: String,
        /// Owner of the document (defaults to the stored owner)
        #[arg(long)]
        owner: Option<String>,
    },
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config,
        data: cli.data,
    };
    let (settings, _config) = load_settings_with_options(options).await;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| settings.bind.clone());
            serve::cmd_serve(&settings, &bind).await
        }
        Commands::Upload {
            file,
            name,
            chunk_size,
            concurrency,
            api_url,
            user,
        } => {
            let options = upload::UploadOptions {
                name,
                chunk_size,
                concurrency,
                api_url,
                user,
            };
            upload::cmd_upload(&settings, &file, options).await
        }
        Commands::Documents { command } => match command {
            DocumentCommands::List { format } => {
                documents::cmd_list(&settings, &format).await
            }
            DocumentCommands::Show { id } => documents::cmd_show(&settings, &id).await,
            DocumentCommands::Delete { id, owner } => {
                documents::cmd_delete(&settings, &id, owner.as_deref()).await
            }
        },
        Commands::Resolve {
            id,
            page,
            single_doors,
            double_doors,
            windows,
        } => {
            let toggles = crate::models::ViewerToggles {
                single_doors,
                double_doors,
                windows,
            };
            resolve::cmd_resolve(&settings, &id, page, toggles).await
        }
    }
}
