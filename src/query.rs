//! Query construction from identifier files.
//!
//! Identifier files are newline-delimited. A line starting with `#` opens a
//! new owner block labelled with the comment text; identifiers that precede
//! any comment belong to an unlabelled block.

use crate::error::{Result, ScopusError};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Which Scopus field the identifiers belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    /// Scopus author identifier, queried with `AU-ID(..)`
    AuthorId,
    /// Scopus record identifier, queried with `EID(..)`
    Eid,
}

impl IdentifierKind {
    /// Search field code for this kind.
    pub fn field_code(self) -> &'static str {
        match self {
            IdentifierKind::AuthorId => "AU-ID",
            IdentifierKind::Eid => "EID",
        }
    }

    /// Whether `id` has the shape the API expects for this kind.
    pub fn is_valid(self, id: &str) -> bool {
        static AUTHOR_ID: OnceLock<Option<Regex>> = OnceLock::new();
        static EID: OnceLock<Option<Regex>> = OnceLock::new();

        let re = match self {
            IdentifierKind::AuthorId => AUTHOR_ID.get_or_init(|| Regex::new(r"^\d+$").ok()),
            IdentifierKind::Eid => EID.get_or_init(|| Regex::new(r"^2-s2\.0-[0-9A-Za-z]+$").ok()),
        };
        re.as_ref().map(|re| re.is_match(id)).unwrap_or(false)
    }
}

/// How owner blocks map to queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Grouping {
    /// Every identifier in one query
    #[default]
    Combined,
    /// One query per owner block
    PerOwner,
}

/// Identifiers listed under one owner comment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdBlock {
    pub owner: Option<String>,
    pub ids: Vec<String>,
}

/// A ready-to-send search expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    /// Owner label of the block this query came from
    pub owner: Option<String>,
    /// Identifiers included in the expression
    pub ids: BTreeSet<String>,
    /// Owner label of each identifier that came from a labelled block
    pub owners: BTreeMap<String, String>,
    /// Full boolean expression
    pub expression: String,
}

impl Query {
    /// Wrap a raw search expression with no identifier set.
    pub fn raw(expression: impl Into<String>) -> Self {
        Self {
            owner: None,
            ids: BTreeSet::new(),
            owners: BTreeMap::new(),
            expression: expression.into(),
        }
    }
}

/// Parse identifier text into owner blocks.
pub fn parse_id_list(text: &str) -> Vec<IdBlock> {
    let mut blocks = vec![IdBlock::default()];
    let mut seen: HashSet<String> = HashSet::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(comment) = line.strip_prefix('#') {
            let owner = comment.trim();
            blocks.push(IdBlock {
                owner: (!owner.is_empty()).then(|| owner.to_string()),
                ids: Vec::new(),
            });
            seen.clear();
            continue;
        }
        if seen.insert(line.to_string()) {
            if let Some(block) = blocks.last_mut() {
                block.ids.push(line.to_string());
            }
        }
    }

    blocks.retain(|b| !b.ids.is_empty());
    blocks
}

/// Read an identifier file into owner blocks.
pub fn read_id_file(path: impl AsRef<Path>) -> Result<Vec<IdBlock>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let blocks = parse_id_list(&text);
    info!(
        path = %path.display(),
        blocks = blocks.len(),
        ids = blocks.iter().map(|b| b.ids.len()).sum::<usize>(),
        "Read identifier file"
    );
    Ok(blocks)
}

/// Parse a load-date threshold given as `YYYY-MM-DD` or `YYYYMMDD`.
pub fn parse_since(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .map_err(|e| ScopusError::Validation(format!("Invalid date '{}': {}", s, e)))
}

/// Build OR-joined query expressions from owner blocks.
///
/// Identifiers that do not fit `kind` are skipped. Blocks left empty produce
/// no query. Every query keeps the owner label of each of its identifiers, so
/// a combined query can still attribute an author to its block. An identifier
/// listed under several owners keeps the first.
pub fn build_queries(
    blocks: &[IdBlock],
    kind: IdentifierKind,
    since: Option<NaiveDate>,
    grouping: Grouping,
) -> Vec<Query> {
    let groups: Vec<(Option<String>, Vec<&IdBlock>)> = match grouping {
        Grouping::PerOwner => blocks.iter().map(|b| (b.owner.clone(), vec![b])).collect(),
        Grouping::Combined => vec![(None, blocks.iter().collect())],
    };

    let mut queries = Vec::new();
    for (owner, group) in groups {
        let mut ordered: Vec<&str> = Vec::new();
        let mut id_set = BTreeSet::new();
        let mut owners = BTreeMap::new();
        for block in group {
            for id in &block.ids {
                if !kind.is_valid(id) {
                    warn!(id = %id, kind = kind.field_code(), "Skipping malformed identifier");
                    continue;
                }
                if !id_set.insert(id.clone()) {
                    continue;
                }
                ordered.push(id);
                if let Some(label) = &block.owner {
                    owners.insert(id.clone(), label.clone());
                }
            }
        }
        if ordered.is_empty() {
            continue;
        }

        let expression = build_expression(&ordered, kind, since);
        debug!(owner = ?owner, ids = ordered.len(), "Built query");
        queries.push(Query {
            owner,
            ids: id_set,
            owners,
            expression,
        });
    }
    queries
}

fn build_expression(ids: &[&str], kind: IdentifierKind, since: Option<NaiveDate>) -> String {
    let field = kind.field_code();
    let mut expression = ids
        .iter()
        .map(|id| format!("{}({})", field, id))
        .collect::<Vec<_>>()
        .join(" OR ");

    if let Some(date) = since {
        if ids.len() > 1 {
            expression = format!("({})", expression);
        }
        expression.push_str(&format!(" AND LOAD-DATE AFT {}", date.format("%Y%m%d")));
    }
    expression
}

/// One row of an EID/PI lookup file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EidRow {
    pub eid: String,
    pub pi: String,
}

/// Read a CSV with `EID` and `PI` (or `SearchedAuthor`) columns.
pub fn read_eid_pi_csv(path: impl AsRef<Path>) -> Result<Vec<EidRow>> {
    let file = std::fs::File::open(path.as_ref())?;
    parse_eid_pi_csv(file)
}

/// Parse EID/PI rows from any CSV reader.
pub fn parse_eid_pi_csv<R: std::io::Read>(reader: R) -> Result<Vec<EidRow>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();

    let eid_idx = headers
        .iter()
        .position(|h| h.trim() == "EID")
        .ok_or_else(|| ScopusError::Validation("input CSV has no 'EID' column".to_string()))?;
    let pi_idx = headers
        .iter()
        .position(|h| h.trim() == "PI")
        .or_else(|| headers.iter().position(|h| h.trim() == "SearchedAuthor"))
        .ok_or_else(|| {
            ScopusError::Validation("input CSV has no 'PI' or 'SearchedAuthor' column".to_string())
        })?;

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let eid = record.get(eid_idx).unwrap_or_default().trim().to_string();
        if eid.is_empty() {
            continue;
        }
        rows.push(EidRow {
            eid,
            pi: record.get(pi_idx).unwrap_or_default().trim().to_string(),
        });
    }
    Ok(rows)
}
