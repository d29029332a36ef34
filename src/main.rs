use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info};

use query_attribution::cache::CacheStore;
use query_attribution::config::{Config, DEFAULT_CONFIG_PATH};
use query_attribution::constants::MAX_LOOKBACK_DAYS;
use query_attribution::{logging, metrics, AttributionCombiner};

#[derive(Parser)]
#[command(name = "query-attribution")]
#[command(about = "Attribute GA4 revenue to Search Console queries")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to the TOML config
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Account id from the config (defaults to the first account)
    #[arg(long)]
    account: Option<String>,

    /// Days of data to analyze
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(i64).range(1..=MAX_LOOKBACK_DAYS))]
    days: i64,

    /// Ignore cached entries and refetch (results are still cached)
    #[arg(long)]
    refresh: bool,

    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query-level rows with attributed conversions and revenue
    Combine,
    /// Queries ranked by attributed revenue
    RevenueQueries {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Attributed performance per page category
    Categories,
    /// Well-ranked, clicked queries whose pages earn nothing
    Opportunities {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Per-page outcomes with top queries
    Pages,
    /// Raw GA4 preset reports
    Ga4 {
        #[command(subcommand)]
        report: Ga4Report,
    },
    /// Raw Search Console preset reports
    Gsc {
        #[command(subcommand)]
        report: GscReport,
    },
    /// List configured accounts
    Accounts,
    /// Inspect or clean the local cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum Ga4Report {
    Overview,
    LandingPages {
        #[arg(long, default_value_t = 100)]
        limit: u32,
    },
    OrganicLandingPages,
    Trends,
    ByDevice,
    ByGeo {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    TrafficSources {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

#[derive(Subcommand)]
enum GscReport {
    Overview,
    TopQueries {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    TopPages {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    QueryPages,
    Trends,
    ByDevice,
    ByCountry {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Page one/two rankings with low CTR
    Opportunities {
        #[arg(long, default_value_t = 100.0)]
        min_impressions: f64,
    },
    /// Queries where several pages compete
    Cannibalization {
        #[arg(long, default_value_t = 10.0)]
        min_impressions: f64,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    Stats,
    List,
    Clear,
    ClearExpired,
    /// Remove one entry by key
    Invalidate { key: String },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let days = cli.days;
    let account = cli.account.as_deref();

    match cli.command {
        Commands::Accounts => {
            let accounts: Vec<_> = config
                .accounts
                .iter()
                .map(|a| {
                    serde_json::json!({
                        "id": a.id,
                        "name": a.display_name(),
                        "ga4_property": a.ga4_property,
                        "gsc_site_url": a.gsc_site_url,
                    })
                })
                .collect();
            print_json(&accounts)?;
        }
        Commands::Cache { action } => {
            let store = CacheStore::from_config(&config.cache, config.account(account)?);
            match action {
                CacheAction::Stats => print_json(&store.stats())?,
                CacheAction::List => print_json(&store.list())?,
                CacheAction::Clear => {
                    let removed = store.clear();
                    eprintln!("🧹 Removed {} cache entries from {}", removed, store.dir().display());
                }
                CacheAction::ClearExpired => {
                    let removed = store.clear_expired();
                    eprintln!("🧹 Removed {} expired cache entries", removed);
                }
                CacheAction::Invalidate { key } => {
                    if store.invalidate(&key) {
                        eprintln!("🗑️  Removed {}", key);
                    } else {
                        eprintln!("⚠️  No cache entry named {}", key);
                    }
                }
            }
        }
        command => {
            let combiner = AttributionCombiner::for_account(&config, account, cli.refresh)?;
            info!(days, "running report");
            match command {
                Commands::Combine => print_json(&combiner.combine(days).await?)?,
                Commands::RevenueQueries { limit } => {
                    print_json(&combiner.revenue_queries(days, limit).await?)?
                }
                Commands::Categories => print_json(&combiner.category_performance(days).await?)?,
                Commands::Opportunities { limit } => {
                    print_json(&combiner.content_opportunities(days, limit).await?)?
                }
                Commands::Pages => print_json(&combiner.page_summary(days).await?)?,
                Commands::Ga4 { report } => {
                    let ga4 = combiner.analytics();
                    let fetched = match report {
                        Ga4Report::Overview => ga4.overview(days).await?,
                        Ga4Report::LandingPages { limit } => ga4.landing_pages(days, limit).await?,
                        Ga4Report::OrganicLandingPages => ga4.organic_landing_pages(days).await?,
                        Ga4Report::Trends => ga4.trends(days).await?,
                        Ga4Report::ByDevice => ga4.by_device(days).await?,
                        Ga4Report::ByGeo { limit } => ga4.by_geo(days, limit).await?,
                        Ga4Report::TrafficSources { limit } => ga4.traffic_sources(days, limit).await?,
                    };
                    print_json(&fetched)?
                }
                Commands::Gsc { report } => {
                    let gsc = combiner.search_console();
                    match report {
                        GscReport::Overview => print_json(&gsc.overview(days).await?)?,
                        GscReport::TopQueries { limit } => print_json(&gsc.top_queries(days, limit).await?)?,
                        GscReport::TopPages { limit } => print_json(&gsc.top_pages(days, limit).await?)?,
                        GscReport::QueryPages => print_json(&gsc.query_pages(days).await?)?,
                        GscReport::Trends => print_json(&gsc.trends(days).await?)?,
                        GscReport::ByDevice => print_json(&gsc.by_device(days).await?)?,
                        GscReport::ByCountry { limit } => print_json(&gsc.by_country(days, limit).await?)?,
                        GscReport::Opportunities { min_impressions } => {
                            print_json(&gsc.opportunities(days, min_impressions).await?)?
                        }
                        GscReport::Cannibalization { min_impressions } => {
                            print_json(&gsc.cannibalization(days, min_impressions).await?)?
                        }
                    }
                }
                Commands::Accounts | Commands::Cache { .. } => unreachable!("handled above"),
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    dotenv::dotenv().ok();
    let _log_guard = logging::init_logging(&cli.log_dir);
    metrics::init_metrics();

    let config = Config::load(&cli.config)?;

    if let Err(e) = run(cli, config).await {
        error!("Run failed: {}", e);
        eprintln!("❌ {}", e);
        return Err(e);
    }
    Ok(())
}
