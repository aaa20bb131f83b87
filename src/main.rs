use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tubedrop::cli::{Cli, Commands};
use tubedrop::config::Config;
use tubedrop::console::{self, ConsoleReporter};
use tubedrop::downloader::{DownloadOptions, MediaFormat, YtDlpDownloader};
use tubedrop::queue::DownloadQueue;
use tubedrop::{gui, utils};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "tubedrop=debug"
    } else {
        "tubedrop=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().await?;

    // Warn early about missing external tools (hard error comes at start())
    if !matches!(cli.command, Commands::Check) {
        let missing = utils::check_dependencies(&config).await;
        if !missing.is_empty() {
            eprintln!("⚠️  Dependency check warnings:");
            for dep in missing {
                eprintln!("   • {}", dep);
            }
            eprintln!("   (Downloads will fail until these are installed)");
        }
    }

    match cli.command {
        Commands::Download {
            urls,
            format,
            bitrate,
            output,
        } => {
            run_download(&config, urls, format, bitrate, output, cli.quiet).await?;
        }
        Commands::Gui => {
            gui::run(config).map_err(|e| anyhow::anyhow!("GUI error: {}", e))?;
        }
        Commands::Config { show } => {
            if show {
                config.display();
            } else {
                println!("Edit the config file manually:");
                println!("  {}", Config::config_path()?.display());
            }
        }
        Commands::Check => {
            let missing = utils::check_dependencies(&config).await;
            if missing.is_empty() {
                println!("All required external tools are available.");
            } else {
                println!("Missing external tools:");
                for dep in &missing {
                    println!("  • {}", dep);
                }
                anyhow::bail!("{} required tool(s) missing", missing.len());
            }
        }
    }

    Ok(())
}

/// Console variant: enqueue the given (or prompted) URLs, run the queue to
/// completion, and exit non-zero when any job failed.
async fn run_download(
    config: &Config,
    urls: Vec<String>,
    format: Option<MediaFormat>,
    bitrate: Option<u32>,
    output: Option<PathBuf>,
    quiet: bool,
) -> Result<()> {
    let raw = if urls.is_empty() {
        console::prompt_for_urls().context("Failed to read URLs")?
    } else {
        urls.join("\n")
    };

    let url_list = console::parse_url_list(&raw);
    if url_list.is_empty() {
        println!("No URLs provided.");
        return Ok(());
    }

    let format = format.unwrap_or(config.downloads.format);
    let bitrate = bitrate.or(Some(config.downloads.bitrate));
    let output_dir = output.unwrap_or_else(|| config.downloads.output_dir.clone());
    let options = DownloadOptions::new(format, bitrate, output_dir);

    let downloader = Arc::new(YtDlpDownloader::from_config(config));
    let queue = DownloadQueue::new(downloader);

    let reporter = ConsoleReporter::new(quiet);
    {
        let reporter = Arc::clone(&reporter);
        queue.on_status_change(move |event| reporter.handle(event));
    }

    for url in &url_list {
        if !utils::looks_like_url(url) {
            tracing::warn!(
                "\"{}\" does not look like an HTTP(S) URL, handing it to yt-dlp anyway",
                url
            );
        }
        queue
            .enqueue(url, options.clone())
            .with_context(|| format!("Rejected URL: {}", url))?;
    }

    queue
        .start()
        .context("Could not start the download queue")?;
    queue.join().await;

    let failed = console::print_summary(&queue.jobs());
    if failed > 0 {
        anyhow::bail!("{} download(s) failed", failed);
    }
    Ok(())
}
