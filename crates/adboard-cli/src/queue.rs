//! Queue mutation handlers for the CLI. Thin wrappers over the same core
//! calls the server's admin routes use.

use clap::Subcommand;

use adboard_core::{QueueFamily, QueueRole};
use adboard_db::BrandFilter;
use adboard_queue::{BulkAddItem, MoveDirection};

use crate::CliContext;

const BULK_CHUNK_SIZE: usize = 500;

#[derive(Debug, Subcommand)]
pub enum QueueCommands {
    /// Queue one brand by page id
    Add {
        /// Queue family (regular or watchlist)
        family: String,
        page_id: String,

        /// Priority score; higher is scraped earlier
        #[arg(long)]
        score: Option<f64>,
    },
    /// Queue many brands from a JSON file of [{"pageId": ..., "score": ...}]
    BulkAdd {
        family: String,
        /// Path to the JSON batch file
        file: std::path::PathBuf,
    },
    /// Queue every brand matching a relational filter
    AddAll {
        family: String,
        /// all, active, inactive, watchlist_all, regular_active, ...
        #[arg(long)]
        filter: Option<String>,
    },
    /// Move one entry between the pending set and the failed list
    Move {
        family: String,
        page_id: String,
        /// to-failed or requeue
        direction: String,
    },
    /// Move every entry between the pending set and the failed list
    MoveAll {
        family: String,
        /// to-failed or requeue
        direction: String,
    },
    /// Delete every entry in one queue
    Clear {
        family: String,
        /// pending or failed
        role: String,
    },
    /// Remove corrupted members from the failed list
    Cleanup { family: String },
}

fn parse_family(raw: &str) -> anyhow::Result<QueueFamily> {
    QueueFamily::parse(raw).ok_or_else(|| anyhow::anyhow!("unknown queue family '{raw}'"))
}

fn parse_direction(raw: &str) -> anyhow::Result<MoveDirection> {
    MoveDirection::parse(raw).ok_or_else(|| anyhow::anyhow!("unknown move direction '{raw}'"))
}

pub async fn run(mut ctx: CliContext, command: QueueCommands) -> anyhow::Result<()> {
    match command {
        QueueCommands::Add {
            family,
            page_id,
            score,
        } => {
            let family = parse_family(&family)?;
            let entry = adboard_queue::add_pending(
                &mut ctx.conn,
                &ctx.pool,
                ctx.env,
                family,
                &page_id,
                score,
            )
            .await?;
            println!("queued brand {} (page_id {})", entry.brand_id, entry.page_id);
        }
        QueueCommands::BulkAdd { family, file } => {
            let family = parse_family(&family)?;
            let raw = std::fs::read_to_string(&file)?;
            let items: Vec<BulkItemFile> = serde_json::from_str(&raw)?;
            let items: Vec<BulkAddItem> = items
                .into_iter()
                .map(|item| BulkAddItem {
                    page_id: item.page_id,
                    score: item.score,
                })
                .collect();

            let outcome =
                adboard_queue::add_bulk(&mut ctx.conn, &ctx.pool, ctx.env, family, &items)
                    .await?;
            println!(
                "queued {} / skipped {} / failed {}",
                outcome.success.len(),
                outcome.skipped.len(),
                outcome.failed.len()
            );
            for failure in &outcome.failed {
                println!("  failed {}: {}", failure.page_id, failure.reason);
            }
        }
        QueueCommands::AddAll { family, filter } => {
            let family = parse_family(&family)?;
            let filter = BrandFilter::parse(filter.as_deref())
                .ok_or_else(|| anyhow::anyhow!("unknown brand filter"))?;
            let report = adboard_queue::add_all_matching(
                &mut ctx.conn,
                &ctx.pool,
                ctx.env,
                family,
                filter,
                BULK_CHUNK_SIZE,
            )
            .await?;
            println!("queued {} (skipped {} already pending)", report.queued, report.skipped);
        }
        QueueCommands::Move {
            family,
            page_id,
            direction,
        } => {
            let family = parse_family(&family)?;
            match parse_direction(&direction)? {
                MoveDirection::PendingToFailed => {
                    adboard_queue::move_to_failed(&mut ctx.conn, ctx.env, family, &page_id)
                        .await?;
                }
                MoveDirection::FailedToPending => {
                    adboard_queue::move_to_pending(&mut ctx.conn, ctx.env, family, &page_id, None)
                        .await?;
                }
            }
            println!("moved {page_id}");
        }
        QueueCommands::MoveAll { family, direction } => {
            let family = parse_family(&family)?;
            let direction = parse_direction(&direction)?;
            let moved = adboard_queue::move_all(&mut ctx.conn, ctx.env, family, direction).await?;
            println!("moved {moved} entries");
        }
        QueueCommands::Clear { family, role } => {
            let family = parse_family(&family)?;
            let role = QueueRole::parse(&role)
                .ok_or_else(|| anyhow::anyhow!("unknown queue role '{role}'"))?;
            let cleared = adboard_queue::clear(&mut ctx.conn, ctx.env, family, role).await?;
            println!("cleared {cleared} entries from the {role} queue");
        }
        QueueCommands::Cleanup { family } => {
            let family = parse_family(&family)?;
            let report = adboard_queue::cleanup_corrupted(&mut ctx.conn, ctx.env, family).await?;
            println!(
                "removed {} corrupted members ({} valid kept)",
                report.corrupted, report.valid
            );
        }
    }
    Ok(())
}

#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct BulkItemFile {
    page_id: String,
    #[serde(default)]
    score: Option<f64>,
}
