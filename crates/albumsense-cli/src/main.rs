//! AlbumSense CLI — entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use albumsense::Modality;
use albumsense_cli::config::DataPaths;
use albumsense_cli::service::RetrievalService;

#[derive(Parser)]
#[command(
    name = "albumsense",
    about = "AlbumSense — find albums by cover image or melody",
    version
)]
struct Cli {
    /// Data directory (catalog folders, mapper.json, indexes, results).
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    /// Engine config file (JSON).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and save the index for one modality.
    Build {
        /// image or audio.
        #[arg(short, long)]
        modality: Modality,
    },

    /// Search albums by cover image.
    SearchImage {
        /// Image file to search with.
        #[arg(required_unless_present = "base64", conflicts_with = "base64")]
        path: Option<PathBuf>,

        /// Base64-encoded image instead of a file.
        #[arg(long)]
        base64: Option<String>,

        /// Media type of the base64 image.
        #[arg(long, default_value = "image/png", requires = "base64")]
        mime: String,

        /// Do not copy matched covers and songs into the result folder.
        #[arg(long)]
        no_export: bool,
    },

    /// Search albums by melody (a pitch JSON file).
    SearchMelody {
        /// `[60, 62, ...]` or `{"pitches": [...]}`.
        notes: PathBuf,

        /// Do not copy matched covers and songs into the result folder.
        #[arg(long)]
        no_export: bool,
    },

    /// Print loaded indexes and data paths as JSON.
    Info,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   albumsense completions bash > ~/.local/share/bash-completion/completions/albumsense
    ///   albumsense completions zsh > ~/.zfunc/_albumsense
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },

    /// Launch interactive REPL mode.
    Repl,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let paths = DataPaths::resolve(cli.data.as_deref(), cli.config.as_deref());

    match cli.command.unwrap_or(Commands::Info) {
        Commands::Build { modality } => {
            let service = RetrievalService::open(paths)?;
            let report = service.build(modality)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::SearchImage {
            path,
            base64,
            mime,
            no_export,
        } => {
            let mut service = RetrievalService::open(paths)?;
            service.set_export_media(!no_export);
            let artifact = match (path, base64) {
                (Some(path), _) => service.search_image_file(&path)?,
                (None, Some(data)) => service.search_image_base64(&data, &mime)?,
                (None, None) => anyhow::bail!("Provide an image path or --base64"),
            };
            println!("{}", artifact.to_json()?);
        }

        Commands::SearchMelody { notes, no_export } => {
            let mut service = RetrievalService::open(paths)?;
            service.set_export_media(!no_export);
            let artifact = service.search_melody_file(&notes)?;
            println!("{}", artifact.to_json()?);
        }

        Commands::Info => {
            let service = RetrievalService::open(paths)?;
            println!("{}", serde_json::to_string_pretty(&service.info())?);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "albumsense", &mut std::io::stdout());
        }

        Commands::Repl => {
            albumsense_cli::repl::run(paths)?;
        }
    }

    Ok(())
}
