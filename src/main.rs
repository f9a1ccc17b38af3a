use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::BufReader;
use tracing::{error, info};

use stream_resolver::api::ErrorResponse;
use stream_resolver::metadata::DEFAULT_SEARCH_LIMIT;
use stream_resolver::serve;
use stream_resolver::sources::{SearchFilter, YtDlpProvider};
use stream_resolver::{Config, Engine, ResolveError};

#[derive(Parser)]
#[command(name = "stream-resolver")]
#[command(about = "Resolve media ids to playable audio stream URLs", version)]
struct Cli {
    /// Check that the extractor binary responds and exit
    #[arg(long)]
    health_check: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one or more ids to stream URLs
    Resolve {
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Read ids from stdin, one per line, sharing one cache
    Serve,
    /// Search the metadata provider
    Search {
        query: String,
        #[arg(short, long, default_value = "songs")]
        filter: SearchFilter,
        #[arg(short, long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Song details
    Song { id: String },
    /// Playlist tracks
    Playlist { id: String },
    /// Music charts
    Charts,
    /// Download an id into the audio directory
    Download { id: String },
    /// Details of a downloaded file
    Info { id: String },
    /// List downloaded files
    Files,
    /// Delete a downloaded file
    Delete { id: String },
    /// Delete every downloaded file
    ClearFiles,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stream_resolver=debug".parse()?)
                .add_directive("reqwest=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Stream Resolver v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();

    // Cargar configuración
    let config = Config::load()?;

    if cli.health_check {
        return health_check(&config).await;
    }

    info!("{}", config.summary());

    let engine = Engine::from_config(&config).await?;
    let sweeper = engine.spawn_cache_sweeper(&config);

    let outcome = match cli.command.unwrap_or(Command::Serve) {
        Command::Resolve { ids } => {
            for id in ids {
                print_result(engine.resolve(&id).await)?;
            }
            Ok(())
        }
        Command::Serve => {
            info!("🚀 Leyendo ids desde stdin (Ctrl+C para salir)");
            serve::run(
                &engine,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
                shutdown_signal(),
            )
            .await
        }
        Command::Search {
            query,
            filter,
            limit,
        } => print_result(engine.search(&query, filter, limit).await),
        Command::Song { id } => print_result(engine.song(&id).await),
        Command::Playlist { id } => print_result(engine.playlist(&id).await),
        Command::Charts => print_result(engine.charts().await),
        Command::Download { id } => print_result(engine.download(&id).await),
        Command::Info { id } => print_result(engine.file_info(&id).await),
        Command::Files => print_result(engine.list_files().await),
        Command::Delete { id } => print_result(engine.delete_file(&id).await),
        Command::ClearFiles => print_result(engine.clear_files().await),
    };

    if let Some(handle) = sweeper {
        handle.abort();
    }

    outcome
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ No se pudo escuchar Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn print_result<T: Serialize>(result: Result<T, ResolveError>) -> Result<()> {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => {
            error!("❌ {}", e);
            print_json(&ErrorResponse::from(&e))
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let extractor = YtDlpProvider::new(config.ytdlp_path.clone());
    match extractor.version().await {
        Ok(version) => {
            println!("OK yt-dlp {version}");
            Ok(())
        }
        Err(e) => anyhow::bail!("Dependencias faltantes: {e}"),
    }
}
