use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "listing-harvest")]
#[command(about = "Walks a paginated catalog listing and harvests every item's detail page")]
#[command(version)]
pub struct Args {
    /// URL of the first listing page (optional when the config file sets one)
    pub base_url: Option<String>,

    /// Maximum number of listing pages to walk
    #[arg(short = 'p', long)]
    pub max_pages: Option<u32>,

    /// Where to write the JSON array of records
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of detail pages fetched at once
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// WebDriver endpoint (defaults to WEBDRIVER_URL or http://localhost:4444)
    #[arg(long)]
    pub webdriver_url: Option<String>,

    /// Run the browser without a window
    #[arg(long)]
    pub headless: bool,
}
