use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use subreddit_archiver::clock::SystemClock;
use subreddit_archiver::config::{ArchiveFormat, Config};
use subreddit_archiver::pipeline::RunController;
use subreddit_archiver::reddit::RedditClient;
use subreddit_archiver::s3::{MemoryStore, ObjectStore, S3Client};
use subreddit_archiver::trigger::{signal_successor, DownstreamTrigger, HttpTrigger, LogTrigger};

/// Archive new subreddit posts and comments to S3.
#[derive(Debug, Parser)]
#[command(name = "subreddit-archiver", version, about)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    /// Upstream request ceiling per minute
    #[arg(long = "max-req-per-min")]
    max_req_per_min: Option<u32>,

    /// Maximum posts to read from each listing
    #[arg(long)]
    post_limit: Option<usize>,

    /// Subreddits to process, in order
    #[arg(long, num_args = 1.., value_delimiter = ',')]
    subreddits: Vec<String>,

    /// Process a single subreddit (takes precedence over --subreddits)
    #[arg(long)]
    subreddit: Option<String>,

    /// Archive formats to write
    #[arg(long = "format", value_enum)]
    formats: Vec<ArchiveFormat>,

    /// Keep archives in memory and print the keys instead of uploading
    #[arg(long)]
    dry_run: bool,

    /// Do not signal the downstream job after the run
    #[arg(long)]
    no_trigger: bool,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(rate) = self.max_req_per_min {
            config.max_requests_per_minute = rate;
        }
        if let Some(limit) = self.post_limit {
            config.post_limit = limit;
        }
        if let Some(one) = &self.subreddit {
            config.subreddits = vec![one.clone()];
        } else if !self.subreddits.is_empty() {
            config.subreddits.clone_from(&self.subreddits);
        }
        if !self.formats.is_empty() {
            config.formats.clone_from(&self.formats);
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();

    init_tracing()?;

    let cli = Cli::parse();

    info!("Starting subreddit-archiver");

    let mut config = Config::load(&cli.config).context("Failed to load configuration")?;
    cli.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    config
        .validate_credentials(!cli.dry_run)
        .context("Missing credentials")?;

    info!(
        subreddits = ?config.subreddits,
        max_requests_per_minute = config.max_requests_per_minute,
        post_limit = config.post_limit,
        dry_run = cli.dry_run,
        "Configuration loaded"
    );

    let memory = Arc::new(MemoryStore::new());
    let store: Arc<dyn ObjectStore> = if cli.dry_run {
        Arc::clone(&memory) as Arc<dyn ObjectStore>
    } else {
        let s3 = S3Client::new(&config).context("Failed to initialize S3 client")?;
        info!(bucket = %s3.bucket_name(), "S3 client initialized");
        Arc::new(s3)
    };

    let api = RedditClient::new(&config).context("Failed to initialize Reddit client")?;

    let controller =
        RunController::from_config(&config, Arc::new(api), store, Arc::new(SystemClock));
    let summary = controller.run(&config.subreddits).await?;

    if cli.dry_run {
        for key in memory.keys().await {
            println!("{key}");
        }
    }

    let http = if cli.no_trigger || cli.dry_run {
        None
    } else {
        HttpTrigger::from_config(&config).context("Failed to initialize trigger")?
    };
    let trigger: &dyn DownstreamTrigger = match &http {
        Some(http) => http,
        None => &LogTrigger,
    };
    signal_successor(trigger, &config.trigger_successor, &config.stage_id).await?;

    info!(
        posts = summary.total_posts(),
        comments = summary.total_comments(),
        "Run complete"
    );

    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,subreddit_archiver=debug"));

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
