use anyhow::{anyhow, bail, Result};
use clap::{Parser, Subcommand};
use roster_sync::assign::render_updates;
use roster_sync::pipeline::render_inspection;
use roster_sync::{
    recent_reports_markdown, DeletionOutcome, ExecutionResult, Pipeline, RestorePolicy, SyncConfig, LISTING_CAP,
};
use tracing::info;
use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "roster-cli")]
#[command(about = "Reconcile outreach spreadsheets with the hosted roster")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compare sources with remote companies: missing, extra, duplicates, caller conflicts.
    Analyze {
        /// Source ids from sources.yaml; every enabled source when omitted.
        #[arg(long = "source")]
        sources: Vec<String>,
    },
    /// Insert source companies (and their contacts) that are not yet remote.
    Import {
        #[arg(long = "source", required = true)]
        sources: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Recreate companies that have contacts in the source but are missing remotely.
    Restore {
        #[arg(long = "companies", required = true)]
        company_sources: Vec<String>,
        #[arg(long = "contacts", required = true)]
        contact_sources: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Attach source contacts to companies that already exist remotely.
    ImportContacts {
        #[arg(long = "source", required = true)]
        sources: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Bring remote `assigned_to` in line with the source callers.
    AssignCallers {
        #[arg(long = "source", required = true)]
        sources: Vec<String>,
        #[arg(long)]
        dry_run: bool,
    },
    /// List companies without contacts.
    Orphans,
    /// Delete companies without contacts. Prints a token on the first run; pass it back with --confirm.
    CleanupOrphans {
        #[arg(long)]
        confirm: Option<String>,
    },
    /// Exact remote company count against a paginated fetch.
    Count,
    /// Case-insensitive company name search, with contacts.
    Inspect { pattern: String },
    /// Index of recent run reports.
    Reports {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to initialize tracing: {e}"))
}

/// Prints and records the result; failed batches make the command fail.
async fn finish(pipeline: &Pipeline, command: &str, result: &ExecutionResult) -> Result<()> {
    let summary = result.render();
    println!("{summary}");
    let dir = pipeline.write_report(command, false, result, &summary).await?;
    println!("report: {}", dir.display());
    if !result.failed_batches.is_empty() {
        bail!("{command}: {} batches failed", result.failed_batches.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    init_tracing("info")?;
    let cli = Cli::parse();

    if let Commands::Reports { runs } = &cli.command {
        println!("{}", recent_reports_markdown(*runs, &SyncConfig::from_env().reports_dir)?);
        return Ok(());
    }

    let pipeline = Pipeline::from_env().await?;
    info!(run_id = %pipeline.run_id(), "run started");

    match cli.command {
        Commands::Analyze { sources } => {
            let analysis = pipeline.analyze(&sources).await?;
            let summary = analysis.render(LISTING_CAP);
            println!("{summary}");
            pipeline.write_report("analyze", true, &analysis, &summary).await?;
        }
        Commands::Import { sources, dry_run } => {
            let plan = pipeline
                .plan_restore(&sources, &sources, RestorePolicy::IMPORT)
                .await?;
            let summary = plan.render(LISTING_CAP);
            println!("{summary}");
            if dry_run || plan.is_empty() {
                pipeline.write_report("import", true, &plan, &summary).await?;
                return Ok(());
            }
            let result = pipeline.execute_restore(&plan, "import").await;
            finish(&pipeline, "import", &result).await?;
        }
        Commands::Restore {
            company_sources,
            contact_sources,
            dry_run,
        } => {
            let plan = pipeline
                .plan_restore(&company_sources, &contact_sources, RestorePolicy::RESTORE)
                .await?;
            let summary = plan.render(LISTING_CAP);
            println!("{summary}");
            if dry_run || plan.is_empty() {
                pipeline.write_report("restore", true, &plan, &summary).await?;
                return Ok(());
            }
            let result = pipeline.execute_restore(&plan, "restore").await;
            finish(&pipeline, "restore", &result).await?;
        }
        Commands::ImportContacts { sources, dry_run } => {
            let plan = pipeline.plan_contact_backfill(&sources).await?;
            let summary = plan.render(LISTING_CAP);
            println!("{summary}");
            if dry_run || plan.contacts.is_empty() {
                pipeline.write_report("import-contacts", true, &plan, &summary).await?;
                return Ok(());
            }
            let result = pipeline.execute_contact_backfill(&plan).await;
            finish(&pipeline, "import-contacts", &result).await?;
        }
        Commands::AssignCallers { sources, dry_run } => {
            let updates = pipeline.plan_assignments(&sources).await?;
            let summary = render_updates(&updates, LISTING_CAP);
            println!("{summary}");
            if dry_run || updates.is_empty() {
                pipeline.write_report("assign-callers", true, &updates, &summary).await?;
                return Ok(());
            }
            let result = pipeline.execute_assignments(&updates).await;
            finish(&pipeline, "assign-callers", &result).await?;
        }
        Commands::Orphans => {
            let summary = pipeline.orphan_summary().await?;
            println!("{}", summary.render(LISTING_CAP));
        }
        Commands::CleanupOrphans { confirm } => match pipeline.plan_orphan_cleanup().await? {
            DeletionOutcome::Blocked(block) => {
                pipeline
                    .write_report("cleanup-orphans", true, &block, &block.to_string())
                    .await?;
                bail!("{block}");
            }
            DeletionOutcome::Planned(plan) if plan.is_empty() => {
                println!("No companies without contacts; nothing to delete.");
            }
            DeletionOutcome::Planned(plan) => {
                println!("{}", plan.render(LISTING_CAP));
                let Some(token) = confirm else {
                    println!(
                        "Nothing deleted. Re-run with `cleanup-orphans --confirm {}` to proceed.",
                        plan.fingerprint
                    );
                    return Ok(());
                };
                let confirmed = plan.confirm(&token)?;
                let result = pipeline.execute_deletion(confirmed).await;
                finish(&pipeline, "cleanup-orphans", &result).await?;
            }
        },
        Commands::Count => {
            println!("{}", pipeline.count_check().await?.render());
        }
        Commands::Inspect { pattern } => {
            let found = pipeline.inspect(&pattern).await?;
            println!("{}", render_inspection(&pattern, &found));
        }
        Commands::Reports { .. } => {}
    }

    Ok(())
}
