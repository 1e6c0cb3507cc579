mod queue;

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};

use adboard_core::{Environment, JobKind, QueueFamily};
use adboard_pipeline::{
    get_brand_pipeline_status, BrandMetaCache, JobCountersCache, JobIndexRegistry,
    PipelineContext,
};

#[derive(Debug, Parser)]
#[command(name = "adboard-cli")]
#[command(about = "adboard operator command line interface")]
struct Cli {
    /// Target environment (production or stage)
    #[arg(long, global = true, default_value = "production")]
    env: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Queue mutations: add, bulk-add, move, move-all, clear, cleanup
    Queue {
        #[command(subcommand)]
        command: queue::QueueCommands,
    },
    /// Pipeline status for one brand
    Status {
        /// Brand id in the relational store
        brand_id: i64,

        /// Target date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Job-queue sub-collection counters for a (family, kind)
    Jobs {
        /// Queue family (regular or watchlist)
        family: String,

        /// Job kind (brand-processing or ad-update)
        kind: String,
    },
    /// Currently-processing scrape entries
    Processing,
}

/// Connections for one CLI invocation against one environment.
pub(crate) struct CliContext {
    pub env: Environment,
    pub pool: sqlx::PgPool,
    pub conn: redis::aio::ConnectionManager,
}

async fn build_context(env: Environment) -> anyhow::Result<CliContext> {
    let config = adboard_core::load_app_config()?;
    let pool_config = adboard_db::PoolConfig::from_app_config(&config);
    let pool = adboard_db::connect_pool(config.database_url(env), pool_config).await?;
    let conn = adboard_queue::connect(config.redis_url(env)).await?;
    Ok(CliContext { env, pool, conn })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let env = Environment::parse(&cli.env).map_err(|e| anyhow::anyhow!(e))?;
    let ctx = build_context(env).await?;

    match cli.command {
        Commands::Queue { command } => queue::run(ctx, command).await,
        Commands::Status { brand_id, date } => {
            run_status(ctx, brand_id, date.unwrap_or_else(|| Utc::now().date_naive())).await
        }
        Commands::Jobs { family, kind } => run_jobs(ctx, &family, &kind).await,
        Commands::Processing => run_processing(ctx).await,
    }
}

fn pipeline_context(ctx: &CliContext) -> PipelineContext {
    PipelineContext {
        env: ctx.env,
        pool: ctx.pool.clone(),
        global: ctx.conn.clone(),
        regular: ctx.conn.clone(),
        watchlist: ctx.conn.clone(),
        jobs: Arc::new(JobIndexRegistry::default()),
        brands: Arc::new(BrandMetaCache::default()),
        counters: Arc::new(JobCountersCache::new(Duration::from_secs(10))),
        status_fanout_limit: adboard_pipeline::DEFAULT_FANOUT_LIMIT,
    }
}

async fn run_status(ctx: CliContext, brand_id: i64, date: NaiveDate) -> anyhow::Result<()> {
    let pipeline = pipeline_context(&ctx);
    let report = get_brand_pipeline_status(&pipeline, brand_id, date).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run_jobs(mut ctx: CliContext, family: &str, kind: &str) -> anyhow::Result<()> {
    let family = QueueFamily::parse(family)
        .ok_or_else(|| anyhow::anyhow!("unknown queue family '{family}'"))?;
    let kind =
        JobKind::parse(kind).ok_or_else(|| anyhow::anyhow!("unknown job kind '{kind}'"))?;

    let counts = adboard_queue::job_counts(&mut ctx.conn, ctx.env, family, kind).await?;
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}

async fn run_processing(ctx: CliContext) -> anyhow::Result<()> {
    let pipeline = pipeline_context(&ctx);
    let views = adboard_pipeline::list_currently_processing(&pipeline).await?;
    if views.is_empty() {
        println!("no entries currently processing");
        return Ok(());
    }
    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}
