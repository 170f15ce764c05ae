use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docsync::{
    api, config, logging,
    pipeline::{self, Pipeline, PipelineApi},
};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(Parser)]
#[command(
    name = "docsync",
    about = "Keep a vector search index in sync with document trees"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP triggers.
    Serve,
    /// Walk every configured root and persist detected changes.
    Sync {
        /// Drop all persisted roots first.
        #[arg(long)]
        clean: bool,
    },
    /// Admit pending documents into the work queue.
    Check,
    /// Process queued documents.
    Work {
        /// Stop after this many messages.
        #[arg(long)]
        max: Option<usize>,
    },
    /// Sync, admit, and process in one go.
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    config::init_config();
    logging::init_tracing();
    let config = config::get_config();

    match cli.command {
        Command::Serve => {
            let pipeline = Pipeline::from_config(config).context("Failed to build pipeline")?;
            let app = api::create_router(Arc::new(pipeline));
            let (listener, port) = bind_listener().await.context("Failed to bind listener")?;
            tracing::info!("Listening on http://0.0.0.0:{}", port);
            axum::serve(listener, app).await.context("Server stopped")?;
        }
        Command::Sync { clean } => {
            let service = pipeline::sync_service_from_config(config);
            let report = if clean {
                service.clean_sync().await.context("Clean sync failed")?
            } else {
                service.sync_all().await
            };
            println!("{}", report.summary());
        }
        Command::Check => {
            let service = pipeline::sync_service_from_config(config);
            let admitted = service.check_queue().await.context("Queue check failed")?;
            println!("{admitted} document(s) queued");
        }
        Command::Work { max } => {
            let pipeline = Pipeline::from_config(config).context("Failed to build pipeline")?;
            let report = pipeline.run_worker(max).await.context("Worker failed")?;
            println!(
                "processed {} message(s): {} succeeded, {} failed",
                report.received, report.succeeded, report.failed
            );
        }
        Command::Run => {
            let pipeline = Pipeline::from_config(config).context("Failed to build pipeline")?;
            let report = pipeline.start_sync().await;
            println!("{}", report.summary());
            let admitted = pipeline.check_queue().await.context("Queue check failed")?;
            println!("{admitted} document(s) queued");
            let report = pipeline.run_worker(None).await.context("Worker failed")?;
            println!(
                "processed {} message(s): {} succeeded, {} failed",
                report.received, report.succeeded, report.failed
            );
        }
    }
    Ok(())
}

async fn bind_listener() -> Result<(TcpListener, u16), std::io::Error> {
    use std::net::Ipv4Addr;

    let config = config::get_config();
    if let Some(port) = config.server_port {
        return TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
            .await
            .map(|listener| (listener, port));
    }

    const PORT_RANGE: std::ops::RangeInclusive<u16> = 4300..=4399;
    for port in PORT_RANGE {
        match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).await {
            Ok(listener) => {
                tracing::debug!(port, "Bound server port");
                return Ok((listener, port));
            }
            Err(err) if err.kind() == std::io::ErrorKind::AddrInUse => {
                tracing::debug!(port, "Port already in use; trying next");
                continue;
            }
            Err(err) => return Err(err),
        }
    }

    Err(std::io::Error::new(
        std::io::ErrorKind::AddrNotAvailable,
        "No available port found in range 4300-4399",
    ))
}
