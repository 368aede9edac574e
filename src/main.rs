use clap::Parser;
use listing_harvest::{Harvest, HarvestError, HarvestReport};
use tokio_util::sync::CancellationToken;

mod args;
use args::Args;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init();

    // Parse command-line arguments
    let args = Args::parse();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        ::log::warn!("Interrupt received, finishing the current item and writing output");
        ::log::warn!("Press Ctrl-C again to quit immediately");
        on_signal.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            ::log::error!("Second interrupt, exiting without writing output");
            std::process::exit(130);
        }
    });

    match run(args, cancel).await {
        Ok(report) => {
            println!(
                "Wrote {} records to {} ({} without details, {} listing pages, {})",
                report.records.len(),
                report.output_path.display(),
                report.absent_items,
                report.pages_visited,
                report.walk_end
            );
        }
        Err(e) => {
            ::log::error!("Harvest failed: {}", e);
            if let HarvestError::RuntimeUnavailable { .. } = e {
                eprintln!("Note: harvesting requires a WebDriver server (e.g., ChromeDriver).");
                eprintln!(
                    "Set WEBDRIVER_URL or --webdriver-url if not using the default http://localhost:4444"
                );
            }
            std::process::exit(1);
        }
    }
}

async fn run(args: Args, cancel: CancellationToken) -> Result<HarvestReport, HarvestError> {
    let mut harvest = match &args.base_url {
        Some(url) => Harvest::new(url),
        None => Harvest::unconfigured(),
    };
    if let Some(path) = &args.config {
        harvest = harvest.with_config_file(path)?;
    }
    if let Some(max_pages) = args.max_pages {
        harvest = harvest.with_max_pages(max_pages);
    }
    if let Some(output) = &args.output {
        harvest = harvest.with_output(output);
    }
    if let Some(concurrency) = args.concurrency {
        harvest = harvest.with_detail_concurrency(concurrency);
    }
    if let Some(url) = &args.webdriver_url {
        harvest = harvest.with_webdriver_url(url);
    }

    harvest
        .with_headless(args.headless)
        .with_cancellation(cancel)
        .run()
        .await
}
