//! scopus-harvest - Scopus Search to CSV
//!
//! Harvests Scopus search results into CSV and refreshes citation counts in
//! previously harvested files.
//!
//! ## Usage
//!
//! ### Harvest by author ids
//! ```bash
//! SCOPUS_API_KEY=... scopus-harvest search --ids au-ids.txt --out pubs.csv --start 2019-01-01
//! ```
//!
//! ### Refresh citation counts
//! ```bash
//! SCOPUS_API_KEY=... scopus-harvest update-citations --input pubs.csv --output pubs_updated.csv
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scopus_harvest::{
    config::Config,
    output::{self, RecordWriter},
    pipeline,
    query::{self, Grouping, IdentifierKind, Query},
    record::PiPolicy,
    scopus::ScopusClient,
    ScopusError,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Scopus Search harvester - paginated queries to CSV
#[derive(Parser)]
#[command(name = "scopus-harvest")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Fixed pause between requests, in milliseconds
    #[arg(long, global = true, default_value = "0")]
    delay_ms: u64,

    /// Entries requested per page
    #[arg(long, global = true)]
    page_size: Option<u32>,

    /// Result view (STANDARD or COMPLETE)
    #[arg(long, global = true)]
    view: Option<String>,

    /// Comma-separated fields to request on search pages
    #[arg(long, global = true)]
    fields: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Harvest search results into CSV
    Search {
        /// File with identifiers to query ('#' lines start owner blocks)
        #[arg(long, conflicts_with = "query", required_unless_present = "query")]
        ids: Option<PathBuf>,

        /// Raw Scopus search expression instead of an id file
        #[arg(long)]
        query: Option<String>,

        /// Output CSV filename
        #[arg(long)]
        out: PathBuf,

        /// Only records loaded after this date (YYYY-MM-DD or YYYYMMDD)
        #[arg(long)]
        start: Option<String>,

        /// Identifier type in the id file
        #[arg(long, value_enum, default_value = "au-id")]
        kind: KindArg,

        /// One query for all ids, or one per owner block
        #[arg(long, value_enum, default_value = "combined")]
        grouping: GroupingArg,

        /// PI selection rule
        #[arg(long, default_value = "reverse-scan")]
        pi_policy: PiPolicy,

        /// Side file for entries that could not be flattened
        #[arg(long, default_value = "missed_eids.txt")]
        missed: PathBuf,
    },

    /// Look up individual EIDs listed with their PI in a CSV
    Lookup {
        /// CSV with EID and PI (or SearchedAuthor) columns
        #[arg(long)]
        ids: PathBuf,

        /// Output CSV filename
        #[arg(long)]
        out: PathBuf,

        /// Side file for EIDs that could not be retrieved
        #[arg(long, default_value = "missed_eids.txt")]
        missed: PathBuf,
    },

    /// Re-query citation counts and rewrite an existing CSV
    UpdateCitations {
        /// Existing CSV with EID and Cited-By Count columns
        #[arg(long)]
        input: PathBuf,

        /// Rewritten CSV
        #[arg(long)]
        output: PathBuf,

        /// Side file for EIDs still failing after all retry passes
        #[arg(long, default_value = "missed_citations.txt")]
        missed: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    AuId,
    Eid,
}

impl From<KindArg> for IdentifierKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::AuId => IdentifierKind::AuthorId,
            KindArg::Eid => IdentifierKind::Eid,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupingArg {
    Combined,
    PerOwner,
}

impl From<GroupingArg> for Grouping {
    fn from(grouping: GroupingArg) -> Self {
        match grouping {
            GroupingArg::Combined => Grouping::Combined,
            GroupingArg::PerOwner => Grouping::PerOwner,
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let mut config = match Config::from_env() {
        Ok(config) => config,
        Err(ScopusError::Config(msg)) => {
            eprintln!("{}", msg);
            std::process::exit(1);
        }
        Err(e) => return Err(e).context("Invalid configuration"),
    };
    config.request_delay = Duration::from_millis(cli.delay_ms);
    if let Some(page_size) = cli.page_size {
        config.page_size = page_size;
    }
    if let Some(view) = cli.view {
        config.view = view;
    }
    config.fields = cli.fields;

    let client = ScopusClient::new(config).context("Failed to create Scopus client")?;

    match cli.command {
        Commands::Search {
            ids,
            query,
            out,
            start,
            kind,
            grouping,
            pi_policy,
            missed,
        } => {
            run_search(
                &client, ids, query, out, start, kind.into(), grouping.into(), pi_policy, missed,
            )
            .await
        }
        Commands::Lookup { ids, out, missed } => run_lookup(&client, ids, out, missed).await,
        Commands::UpdateCitations {
            input,
            output,
            missed,
        } => run_update(&client, input, output, missed).await,
    }
}

// ============================================================================
// Commands
// ============================================================================

#[allow(clippy::too_many_arguments)]
async fn run_search(
    client: &ScopusClient,
    ids: Option<PathBuf>,
    raw_query: Option<String>,
    out: PathBuf,
    start: Option<String>,
    kind: IdentifierKind,
    grouping: Grouping,
    policy: PiPolicy,
    missed_path: PathBuf,
) -> Result<()> {
    let since = start
        .as_deref()
        .map(query::parse_since)
        .transpose()
        .context("Invalid --start date")?;

    let queries: Vec<Query> = match (ids, raw_query) {
        (Some(path), _) => {
            let blocks = query::read_id_file(&path)
                .with_context(|| format!("Failed to read id file {}", path.display()))?;
            query::build_queries(&blocks, kind, since, grouping)
        }
        (None, Some(raw)) => {
            let raw = raw.trim();
            if raw.is_empty() {
                anyhow::bail!("query string must be non-empty");
            }
            let expression = match since {
                Some(date) => format!("({}) AND LOAD-DATE AFT {}", raw, date.format("%Y%m%d")),
                None => raw.to_string(),
            };
            vec![Query::raw(expression)]
        }
        (None, None) => anyhow::bail!("either --ids or --query is required"),
    };

    if queries.is_empty() {
        println!("No usable identifiers found.");
        return Ok(());
    }

    println!(
        "Running {} quer{} (PI policy: {})",
        queries.len(),
        if queries.len() == 1 { "y" } else { "ies" },
        policy
    );

    let mut writer = RecordWriter::create(&out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    let summary = pipeline::harvest(client, &queries, policy, &mut writer).await?;
    writer.finish().context("Failed to flush CSV")?;

    output::write_missed(&missed_path, &summary.missed).context("Failed to write missed list")?;

    println!(
        "{} results on {} pages, {} written to {}",
        summary.entries,
        summary.pages,
        summary.written,
        out.display()
    );
    if summary.failed_queries > 0 {
        println!("{} queries failed; see log for details", summary.failed_queries);
    }
    if !summary.missed.is_empty() {
        println!("{} entries missed, listed in {}", summary.missed.len(), missed_path.display());
    }
    Ok(())
}

async fn run_lookup(
    client: &ScopusClient,
    ids: PathBuf,
    out: PathBuf,
    missed_path: PathBuf,
) -> Result<()> {
    println!("[+] Gathering EIDs");
    let rows = query::read_eid_pi_csv(&ids)
        .with_context(|| format!("Failed to read {}", ids.display()))?;
    info!(rows = rows.len(), "Loaded EID rows");

    let mut writer = RecordWriter::create(&out)
        .with_context(|| format!("Failed to create {}", out.display()))?;
    let summary = pipeline::lookup_eids(client, &rows, &mut writer).await?;
    writer.finish().context("Failed to flush CSV")?;

    output::write_missed(&missed_path, &summary.missed).context("Failed to write missed list")?;

    println!("{} of {} EIDs written to {}", summary.written, rows.len(), out.display());
    if !summary.missed.is_empty() {
        println!("{} EIDs missed, listed in {}", summary.missed.len(), missed_path.display());
    }
    Ok(())
}

async fn run_update(
    client: &ScopusClient,
    input: PathBuf,
    output_path: PathBuf,
    missed_path: PathBuf,
) -> Result<()> {
    let summary = pipeline::refresh_citations(client, &input, &output_path)
        .await
        .with_context(|| format!("Failed to refresh {}", input.display()))?;

    output::write_missed(&missed_path, &summary.missed).context("Failed to write missed list")?;

    println!(
        "{} rows: {} updated, {} unchanged ({} passes)",
        summary.merge.rows, summary.merge.updated, summary.merge.unchanged, summary.passes
    );
    if !summary.missed.is_empty() {
        println!(
            "{} EIDs still failing, listed in {}",
            summary.missed.len(),
            missed_path.display()
        );
    }
    println!("Saved: {}", output_path.display());
    Ok(())
}
