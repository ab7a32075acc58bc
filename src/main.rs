use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use rangefetch::download::client::HttpRangeClient;
use rangefetch::download::config::Config;
use rangefetch::download::downloader::{Downloader, DownloaderConfig};
use rangefetch::download::error::DownloadEndCause;
use rangefetch::download::logger::setup_logger;
use crate::cli::CliArgs;

mod cli;

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("rangefetch: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: CliArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::load_from_file(path)?,
        None => Config::default(),
    };
    if let Some(connections) = args.connections {
        config.connections = connections;
    }
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
    }
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if args.log_file.is_some() {
        config.log_file = args.log_file;
    }

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::from_str(&config.log_level)
            .with_context(|| format!("Unknown log level {}", config.log_level))?
    };
    setup_logger(level, config.log_file.as_deref())?;

    let cancel_token = CancellationToken::new();
    {
        let cancel_token = cancel_token.clone();
        tokio::spawn(async move {
            match shutdown_signal().await {
                Ok(()) => {
                    warn!("Interrupted, stopping all connections");
                    cancel_token.cancel();
                }
                Err(err) => {
                    error!("{:#}", err);
                    return;
                }
            }

            if shutdown_signal().await.is_ok() {
                warn!("Interrupted again, exiting without saving");
                std::process::exit(130);
            }
        });
    }

    let client = HttpRangeClient::new(reqwest::Client::new(), config.user_agent.clone());
    let downloader_config = DownloaderConfig {
        url: args.url,
        data_dir: config.data_dir,
        output_dir: config.output_dir,
        connection_count: config.connections,
    };
    let downloader = Downloader::new(downloader_config, Arc::new(client), cancel_token);

    match downloader.download().await? {
        DownloadEndCause::Finished { output } => info!("Saved to {}", output.display()),
        DownloadEndCause::Empty => info!("Remote file is empty, nothing was written"),
        DownloadEndCause::Paused { checkpoint } => {
            println!("Download paused, run the same command again to resume ({})", checkpoint.display());
        }
        DownloadEndCause::Cancelled => warn!("Download cancelled, the server does not support resuming"),
    }

    Ok(())
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    #[cfg(unix)]
    {
        let mut term = signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?;
        let mut hup = signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
        tokio::select! {
            _ = &mut ctrl_c => {},
            _ = term.recv() => {},
            _ = hup.recv() => {},
        }
        return Ok(());
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("Failed to listen for Ctrl-C")?;
        Ok(())
    }
}
