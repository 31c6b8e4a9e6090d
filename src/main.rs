use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod aggregate;
mod error;
mod form;
mod identity;
mod models;
mod period;
mod report;
mod source;

use aggregate::{AggregateOptions, DedupConfig};
use models::{ActorKey, IntentAction, ParsedIntent, PeriodSpec, RosterMember};
use source::JsonlEventSource;

#[derive(Parser)]
#[command(name = "engagement-report")]
#[command(about = "Community engagement aggregation and CSV reporting", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the multi-section engagement report as CSV
    Report {
        /// Directory holding one <source>.jsonl event file per source
        #[arg(long)]
        events_dir: PathBuf,
        /// Roster JSON supplied by the roster provider
        #[arg(long)]
        roster: PathBuf,
        /// Source id to aggregate; repeatable
        #[arg(long = "source", required = true)]
        sources: Vec<String>,
        /// Period literal (YYYY-MM / this / last / -N / all / range)
        #[arg(long, default_value = "this")]
        period: String,
        /// Restrict post counting to one roster member id
        #[arg(long)]
        actor: Option<u64>,
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Endorsement kind counted as "received"
        #[arg(long, default_value = "❤️")]
        endorsement: String,
        /// Number of top posts to rank; 0 disables the section
        #[arg(long, default_value_t = 5)]
        top: usize,
        #[arg(long)]
        dedup_posts: bool,
        #[arg(long)]
        no_form_dedup: bool,
    },
    /// Show one member's counters for a period
    Query {
        #[arg(long)]
        events_dir: PathBuf,
        #[arg(long)]
        roster: PathBuf,
        #[arg(long = "source", required = true)]
        sources: Vec<String>,
        #[arg(long, default_value = "this")]
        period: String,
        #[arg(long)]
        actor: u64,
    },
    /// Execute the structured output of the intent-parsing collaborator
    Intent {
        #[arg(long)]
        events_dir: PathBuf,
        #[arg(long)]
        roster: PathBuf,
        #[arg(long = "source", required = true)]
        sources: Vec<String>,
        /// Parsed-intent JSON file
        #[arg(long)]
        json: PathBuf,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Report {
            events_dir,
            roster,
            sources,
            period,
            actor,
            out,
            endorsement,
            top,
            dedup_posts,
            no_form_dedup,
        } => {
            let roster = load_roster(&roster)?;
            let spec = period::parse(&period)?;
            let opts = AggregateOptions {
                endorsement_kind: endorsement,
                actor_filter: actor,
                dedup: DedupConfig {
                    posts: dedup_posts,
                    forms: !no_form_dedup,
                },
                top_posts: top,
            };
            run_report(&events_dir, &roster, &sources, &spec, &opts, &out).await
        }
        Commands::Query {
            events_dir,
            roster,
            sources,
            period,
            actor,
        } => {
            let roster = load_roster(&roster)?;
            let spec = period::parse(&period)?;
            run_query(&events_dir, &roster, &sources, &spec, actor).await
        }
        Commands::Intent {
            events_dir,
            roster,
            sources,
            json,
            out,
        } => {
            let roster = load_roster(&roster)?;
            run_intent(&events_dir, &roster, &sources, &json, &out).await
        }
    }
}

async fn run_report(
    events_dir: &Path,
    roster: &[RosterMember],
    sources: &[String],
    spec: &PeriodSpec,
    opts: &AggregateOptions,
    out_dir: &Path,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let window = period::resolve(spec, now)?;
    let label = period::format(spec, now)?;

    let source = JsonlEventSource::new(events_dir);
    let result = aggregate::aggregate(&source, sources, &window, roster, opts).await?;

    if result.is_empty() {
        println!("{label} のデータがありませんでした。");
        return Ok(());
    }

    let table = report::build_table(&result, roster);
    let artifact = report::render_csv(&table)?;
    let filename = period::report_filename(spec, now)?;
    let path = out_dir.join(&filename);
    std::fs::write(&path, &artifact)
        .with_context(|| format!("failed to write {}", path.display()))?;

    info!(
        actors = result.actors.len(),
        duplicates_skipped = result.diagnostics.duplicates_skipped,
        malformed_submissions = result.diagnostics.malformed_submissions,
        "report written"
    );
    println!("{}", report::summary_digest(&result, roster.len(), &label));
    println!("Report written to {}.", path.display());
    Ok(())
}

async fn run_query(
    events_dir: &Path,
    roster: &[RosterMember],
    sources: &[String],
    spec: &PeriodSpec,
    actor_id: u64,
) -> anyhow::Result<()> {
    let member = roster
        .iter()
        .find(|member| member.id == actor_id)
        .with_context(|| format!("メンバー ID {actor_id} がロスターに見つかりません。"))?;

    let now = Utc::now();
    let window = period::resolve(spec, now)?;
    let label = period::format(spec, now)?;

    let opts = AggregateOptions {
        actor_filter: Some(actor_id),
        top_posts: 0,
        ..AggregateOptions::default()
    };
    let source = JsonlEventSource::new(events_dir);
    let result = aggregate::aggregate(&source, sources, &window, roster, &opts).await?;

    match result.actors.get(&ActorKey::Member(actor_id)) {
        Some(stats) if stats.posts > 0 || stats.received > 0 || stats.given > 0 => {
            println!("{}", report::actor_digest(stats, &label));
        }
        _ => {
            let name = identity::extract_personal_name(&member.raw_label);
            println!("{label} の {name} さんのデータがありませんでした。");
        }
    }
    Ok(())
}

async fn run_intent(
    events_dir: &Path,
    roster: &[RosterMember],
    sources: &[String],
    json: &Path,
    out_dir: &Path,
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(json)
        .with_context(|| format!("failed to read intent JSON {}", json.display()))?;
    let intent: ParsedIntent =
        serde_json::from_str(&raw).context("intent JSON could not be parsed")?;

    if let Some(error) = intent.error.filter(|e| !e.is_empty()) {
        println!("解析エラー: {error}");
        return Ok(());
    }

    let spec = intent.period.unwrap_or(PeriodSpec::ThisPeriod);
    match intent.action {
        IntentAction::Unknown => {
            println!(
                "すみません、リクエストを理解できませんでした。\n\
例: 「先月のレポート」「田中さんのいいね数」「2024年1月の集計」"
            );
            Ok(())
        }
        IntentAction::Report => {
            run_report(
                events_dir,
                roster,
                sources,
                &spec,
                &AggregateOptions::default(),
                out_dir,
            )
            .await
        }
        IntentAction::ActorQuery => match intent.target_actor_id {
            Some(actor_id) => run_query(events_dir, roster, sources, &spec, actor_id).await,
            None => {
                println!("対象メンバーを特定できませんでした。");
                Ok(())
            }
        },
    }
}

fn load_roster(path: &Path) -> anyhow::Result<Vec<RosterMember>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read roster {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid roster JSON in {}", path.display()))
}
