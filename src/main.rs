use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use webwitness::browser::ChromiumDriver;
use webwitness::cli::{read_urls_from_file, setup_logging, Cli, Commands};
use webwitness::config::{Options, ScreenshotFormat};
use webwitness::driver::Driver;
use webwitness::fingerprint::BuiltinFingerprintEngine;
use webwitness::runner::Runner;
use webwitness::writer::{JsonLinesWriter, SharedWriter, StdoutWriter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();
    let options = load_options(&args).await?;

    setup_logging(&options.logging)?;
    info!("starting webwitness v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Validate { config } = &args.command {
        let loaded = Options::load_file(config).await?;
        loaded.validate()?;
        println!("configuration is valid:");
        println!("  workers: {}", loaded.scan.workers);
        println!("  timeout: {}s", loaded.scan.timeout_seconds);
        println!("  screenshot format: {:?}", loaded.scan.screenshot_format);
        println!(
            "  screenshot path: {}",
            loaded.scan.screenshot_path.display()
        );
        return Ok(());
    }

    let options = Arc::new(options);

    let mut writers: Vec<SharedWriter> = Vec::new();
    if options.writer.stdout {
        writers.push(Arc::new(StdoutWriter));
    }
    if let Some(path) = &options.writer.jsonl_path {
        writers.push(Arc::new(JsonLinesWriter::create(path.clone()).await?));
    }

    let driver: Arc<dyn Driver> = Arc::new(ChromiumDriver::new(
        options.clone(),
        Arc::new(BuiltinFingerprintEngine::new()),
    ));

    let runner = Arc::new(Runner::new(driver.clone(), writers, options.clone()));

    let (tx, rx) = tokio::sync::mpsc::channel(options.scan.workers * 2);

    let feed = match &args.command {
        Commands::Single { url } => {
            let url = url.clone();
            tokio::spawn(async move {
                let _ = tx.send(url).await;
            })
        }
        Commands::Batch { input } => {
            let input = input.clone();
            tokio::spawn(async move {
                match read_urls_from_file(&input).await {
                    Ok(urls) => {
                        info!("loaded {} urls from {}", urls.len(), input.display());
                        for url in urls {
                            if tx.send(url).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => error!("failed to read {}: {e}", input.display()),
                }
            })
        }
        Commands::Validate { .. } => unreachable!("handled above"),
    };

    let shutdown = setup_shutdown_handler(runner.cancellation_token());

    runner.run(rx).await;
    feed.abort();
    shutdown.abort();

    info!("webwitness stopped");
    Ok(())
}

async fn load_options(args: &Cli) -> Result<Options, Box<dyn std::error::Error>> {
    let mut options = if let Some(path) = &args.config {
        Options::load_file(path).await?
    } else {
        Options::default()
    };

    if let Some(workers) = args.workers {
        options.scan.workers = workers;
    }
    if let Some(timeout) = args.timeout {
        options.scan.timeout_seconds = timeout;
    }
    if args.verbose {
        options.logging.debug = true;
    }
    if let Some(chrome_path) = &args.chrome_path {
        options.chrome.binary_path = Some(chrome_path.clone());
    }
    if let Some(wss_url) = &args.wss_url {
        options.chrome.wss_url = Some(wss_url.clone());
    }
    if let Some(path) = &args.screenshot_path {
        options.scan.screenshot_path = path.clone();
    }
    if let Some(format) = &args.screenshot_format {
        options.scan.screenshot_format = format.parse::<ScreenshotFormat>()?;
    }
    if let Some(path) = &args.jsonl_output {
        options.writer.jsonl_path = Some(path.clone());
    }

    if matches!(args.command, Commands::Validate { .. }) {
        return Ok(options);
    }

    Ok(options.finalize().await?)
}

fn setup_shutdown_handler(cancellation: tokio_util::sync::CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
            .expect("failed to install SIGINT handler");
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }

        cancellation.cancel();
    })
}
