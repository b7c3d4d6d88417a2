// gtrend command-line entry point.
// Fetches GitHub trending listings through the two-tier cache.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use gtrend::app::{App, DynStore};
use gtrend::cache::{FileStore, MemoryStore, paths};
use gtrend::config::Config;
use gtrend::error::{GtrendError, Result};
use gtrend::github::{Category, Since, TrendingItem};
use gtrend::trending::Query;

/// Cached GitHub trending listings
#[derive(Parser, Debug)]
#[command(name = "gtrend")]
#[command(about = "GitHub trending listings with a local two-tier cache")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to a JSON configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for the persistent cache store
    #[arg(long, global = true, value_name = "DIR")]
    store_dir: Option<PathBuf>,

    /// Keep the cache in memory only for this run
    #[arg(long, global = true, conflicts_with = "store_dir")]
    ephemeral: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a trending listing
    Fetch {
        /// Language to include; repeat for several, omit for all languages
        #[arg(short, long = "lang", value_name = "LANG")]
        languages: Vec<String>,

        /// Time window: daily, weekly or monthly
        #[arg(short, long, default_value = "daily")]
        since: Since,

        /// Listing kind: repositories or developers
        #[arg(short = 't', long = "type", default_value = "repositories")]
        category: Category,

        /// Print the listing as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show cache occupancy
    Stats,
    /// Purge expired cache entries now
    Sweep,
    /// Remove every cache entry
    Clear,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(verbose))
        .init();
}

fn open_store(cli: &Cli) -> Result<DynStore> {
    if cli.ephemeral {
        return Ok(Box::new(MemoryStore::new()));
    }

    let dir = match &cli.store_dir {
        Some(dir) => dir.clone(),
        None => paths::store_dir()
            .ok_or_else(|| GtrendError::Config("no cache directory available".into()))?,
    };
    Ok(Box::new(FileStore::new(dir)))
}

fn load_config(cli: &Cli) -> Result<Config> {
    match cli.config.as_ref().cloned().or_else(paths::config_path) {
        Some(path) => Config::load(&path),
        None => Ok(Config::default()),
    }
}

fn print_items(items: &[TrendingItem], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(items)?);
        return Ok(());
    }

    for item in items {
        match item.url() {
            Some(url) => println!("{:>6}  {}  {}", item.added, item.title(), url),
            None => println!("{:>6}  {}", item.added, item.title()),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let store = open_store(&cli)?;
    let mut app = App::new(&config, store)?;

    match &cli.command {
        Command::Fetch {
            languages,
            since,
            category,
            json,
        } => {
            app.start_sweeping();
            let query = Query::new(languages.iter().cloned(), Some(*since), *category);
            let result = app.fetch(&query).await;
            app.stop_sweeping().await;
            print_items(&result?.items, *json)?;
        }
        Command::Stats => {
            let stats = app.stats();
            println!("memory items:  {}/{}", stats.memory_items, stats.max_items);
            println!("default ttl:   {}s", stats.default_ttl.as_secs());
        }
        Command::Sweep => {
            let report = app.sweep();
            println!(
                "purged {} from memory, {} from the persistent store",
                report.memory_purged, report.persisted_purged
            );
        }
        Command::Clear => {
            app.clear();
            println!("cache cleared");
        }
    }

    Ok(())
}
