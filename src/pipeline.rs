//! Harvest, EID lookup and citation refresh pipelines.
//!
//! Each pipeline ties the client, the flattener and the CSV writer together.
//! Failures of a single query are logged and skipped so one bad query does
//! not end a multi-query run.

use crate::error::Result;
use crate::output::{self, MergeSummary, RecordWriter};
use crate::query::{EidRow, Query};
use crate::record::{PiContext, PiPolicy, Record};
use crate::scopus::ScopusClient;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Counters reported at the end of a harvest or lookup run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestSummary {
    pub queries: usize,
    pub failed_queries: usize,
    pub pages: usize,
    pub entries: usize,
    pub written: usize,
    pub duplicates: usize,
    /// Labels of entries that could not be flattened
    pub missed: Vec<String>,
}

/// Outcome of a citation refresh run.
#[derive(Debug, Clone, Default)]
pub struct RefreshSummary {
    pub merge: MergeSummary,
    pub not_found: Vec<String>,
    pub missed: Vec<String>,
    pub passes: u32,
}

/// Run every query to exhaustion and write flattened records.
pub async fn harvest<W: Write>(
    client: &ScopusClient,
    queries: &[Query],
    policy: PiPolicy,
    writer: &mut RecordWriter<W>,
) -> Result<HarvestSummary> {
    let mut summary = HarvestSummary {
        queries: queries.len(),
        ..Default::default()
    };

    for (idx, query) in queries.iter().enumerate() {
        info!(
            query = idx + 1,
            total = queries.len(),
            owner = query.owner.as_deref().unwrap_or("-"),
            "Running query"
        );

        let outcome = match client.search(&query.expression).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(query = %query.expression, error = %e, "Query aborted");
                summary.failed_queries += 1;
                continue;
            }
        };
        summary.pages += outcome.pages;
        summary.entries += outcome.entries.len();

        let ctx = PiContext {
            policy,
            ids: &query.ids,
            owner: query.owner.as_deref(),
            owners: &query.owners,
        };
        for entry in &outcome.entries {
            match Record::from_entry(entry, &ctx) {
                Ok(record) => {
                    if writer.write(&record)? {
                        summary.written += 1;
                    } else {
                        summary.duplicates += 1;
                    }
                }
                Err(e) => {
                    warn!(entry = %entry.label(), error = %e, "Entry not flattened");
                    push_unique(&mut summary.missed, entry.label());
                }
            }
        }
    }

    info!(
        written = summary.written,
        pages = summary.pages,
        failed_queries = summary.failed_queries,
        missed = summary.missed.len(),
        "Harvest complete"
    );
    Ok(summary)
}

/// Query each EID on its own, taking the PI from the input row.
///
/// Missed items are `EID,PI` so the side file can be fed back in.
pub async fn lookup_eids<W: Write>(
    client: &ScopusClient,
    rows: &[EidRow],
    writer: &mut RecordWriter<W>,
) -> Result<HarvestSummary> {
    let mut summary = HarvestSummary {
        queries: rows.len(),
        ..Default::default()
    };
    let no_ids = BTreeSet::new();
    let no_owners = BTreeMap::new();

    for row in rows {
        let missed_label = format!("{},{}", row.eid, row.pi);
        let outcome = match client.search(&format!("EID({})", row.eid)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(eid = %row.eid, error = %e, "Lookup aborted");
                summary.failed_queries += 1;
                push_unique(&mut summary.missed, missed_label);
                continue;
            }
        };
        summary.pages += outcome.pages;
        summary.entries += outcome.entries.len();

        let Some(entry) = outcome.entries.first() else {
            warn!(eid = %row.eid, "No entry returned");
            push_unique(&mut summary.missed, missed_label);
            continue;
        };

        let ctx = PiContext {
            policy: PiPolicy::Owner,
            ids: &no_ids,
            owner: Some(row.pi.as_str()),
            owners: &no_owners,
        };
        match Record::from_entry(entry, &ctx) {
            Ok(mut record) => {
                if record.eid.is_empty() {
                    record.eid = row.eid.clone();
                }
                if writer.write(&record)? {
                    summary.written += 1;
                } else {
                    summary.duplicates += 1;
                }
            }
            Err(e) => {
                warn!(eid = %row.eid, error = %e, "Entry not flattened");
                push_unique(&mut summary.missed, missed_label);
            }
        }
    }

    info!(
        written = summary.written,
        missed = summary.missed.len(),
        "EID lookup complete"
    );
    Ok(summary)
}

/// Re-query cited-by counts for every EID in `input` and write the merged
/// CSV to `output`.
pub async fn refresh_citations(
    client: &ScopusClient,
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
) -> Result<RefreshSummary> {
    let input = input.as_ref();
    let output = output.as_ref();

    // Held in memory so the output may overwrite the input.
    let existing = std::fs::read(input)?;
    let eids = output::read_eids(existing.as_slice())?;
    info!(path = %input.display(), eids = eids.len(), "Read existing CSV");

    let fetch = client.fetch_citation_counts(&eids).await;

    let merge =
        output::merge_citation_counts(existing.as_slice(), File::create(output)?, &fetch.counts)?;
    info!(
        path = %output.display(),
        rows = merge.rows,
        updated = merge.updated,
        unchanged = merge.unchanged,
        "Saved refreshed CSV"
    );

    Ok(RefreshSummary {
        merge,
        not_found: fetch.not_found,
        missed: fetch.missed,
        passes: fetch.passes,
    })
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}
