// Command-line page fetcher.
// Loads a store configuration, fetches one page range and prints it as JSON.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use catalog_cache::{HttpTransport, Store, StoreConfig};

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "catalog-cache", about = "Fetch pages from a remote catalog listing")]
struct Cli {
    /// Path to a store configuration file (JSON).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Resource name appended to the entry point.
    #[arg(long)]
    command: String,

    #[arg(long)]
    entry_point: Option<String>,

    #[arg(long)]
    search_entry_point: Option<String>,

    /// Search query; switches the store to search requests.
    #[arg(short, long)]
    query: Option<String>,

    #[arg(long)]
    language: Option<String>,

    /// First page to fetch.
    #[arg(long, default_value_t = 0)]
    page: usize,

    /// Number of pages to fetch.
    #[arg(long, default_value_t = 1)]
    pages: usize,

    #[arg(long)]
    page_size: Option<usize>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "catalog_cache=debug"
    } else {
        "catalog_cache=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = match &cli.config {
        Some(path) => StoreConfig::load(path)?,
        None => StoreConfig::default(),
    };
    if cli.entry_point.is_some() {
        config.entry_point = cli.entry_point.clone();
    }
    if cli.search_entry_point.is_some() {
        config.search_entry_point = cli.search_entry_point.clone();
    }
    if cli.query.is_some() {
        config.query = cli.query.clone();
    }
    if cli.language.is_some() {
        config.language = cli.language.clone();
    }
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }

    let store = Store::new(cli.command.clone(), HttpTransport::new()?, config);
    let result = store.get_page(cli.page, cli.pages).await?;

    info!(
        first_page = result.first_page,
        pages = result.pages.len(),
        item_count = result.item_count,
        "Fetched"
    );
    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
