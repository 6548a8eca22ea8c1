//! Flattening of Scopus search entries into fixed CSV records.

use crate::de::{null_as_default, opt_count, opt_string};
use crate::error::{Result, ScopusError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

/// CSV column order for harvested records
pub const CSV_COLUMNS: &[&str] = &[
    "Title",
    "PI",
    "Authors",
    "Date",
    "Cited-By Count",
    "Source Title",
    "Page Range",
    "DOI",
    "PubMed ID",
    "Scopus ID",
    "EID",
    "Type",
    "Funding Agency",
    "Abstract Link",
    "Scopus Link",
    "Cited-By Link",
];

/// Column holding the record identifier.
pub const EID_COLUMN: &str = "EID";

/// Column holding the citation count.
pub const CITED_BY_COLUMN: &str = "Cited-By Count";

/// Separator between author names in the `Authors` column.
pub const AUTHOR_SEPARATOR: &str = ";";

// === Scopus API Entry Types ===

/// One record from a `search-results.entry` list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Entry {
    #[serde(rename = "dc:identifier", default, deserialize_with = "opt_string")]
    pub identifier: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub eid: Option<String>,
    #[serde(rename = "dc:title", default, deserialize_with = "opt_string")]
    pub title: Option<String>,
    #[serde(rename = "prism:coverDate", default, deserialize_with = "opt_string")]
    pub cover_date: Option<String>,
    #[serde(rename = "citedby-count", default, deserialize_with = "opt_count")]
    pub cited_by_count: Option<u64>,
    #[serde(rename = "prism:publicationName", default, deserialize_with = "opt_string")]
    pub publication_name: Option<String>,
    #[serde(rename = "prism:pageRange", default, deserialize_with = "opt_string")]
    pub page_range: Option<String>,
    #[serde(rename = "prism:doi", default, deserialize_with = "opt_string")]
    pub doi: Option<String>,
    #[serde(rename = "pubmed-id", default, deserialize_with = "opt_string")]
    pub pubmed_id: Option<String>,
    #[serde(rename = "subtypeDescription", default, deserialize_with = "opt_string")]
    pub subtype_description: Option<String>,
    #[serde(rename = "fund-acr", default, deserialize_with = "opt_string")]
    pub fund_acr: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub author: Vec<EntryAuthor>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub link: Vec<EntryLink>,
    /// Set on the placeholder entry of an empty result set
    #[serde(default, deserialize_with = "opt_string")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryAuthor {
    #[serde(default, deserialize_with = "opt_string")]
    pub authid: Option<String>,
    #[serde(rename = "given-name", default, deserialize_with = "opt_string")]
    pub given_name: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub surname: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub authname: Option<String>,
}

impl EntryAuthor {
    /// "given surname", falling back to the indexed name.
    pub fn display_name(&self) -> String {
        let name = format!(
            "{} {}",
            self.given_name.as_deref().unwrap_or_default(),
            self.surname.as_deref().unwrap_or_default()
        )
        .trim()
        .to_string();

        if name.is_empty() {
            self.authname.clone().unwrap_or_default().trim().to_string()
        } else {
            name
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EntryLink {
    #[serde(rename = "@ref", default, deserialize_with = "opt_string")]
    pub rel: Option<String>,
    #[serde(rename = "@href", default, deserialize_with = "opt_string")]
    pub href: Option<String>,
}

impl Entry {
    /// Placeholder entries carry only an `error` message.
    pub fn is_placeholder(&self) -> bool {
        self.error.is_some()
    }

    /// Best available label for logs and the missed list.
    pub fn label(&self) -> String {
        self.eid
            .clone()
            .or_else(|| self.identifier.clone())
            .or_else(|| self.title.clone())
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    fn link(&self, rel: &str) -> String {
        self.link
            .iter()
            .rev()
            .find(|l| l.rel.as_deref() == Some(rel))
            .and_then(|l| l.href.clone())
            .unwrap_or_default()
    }
}

/// Rule for deriving the principal investigator from the author list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PiPolicy {
    /// First author, if their id is in the query set
    FirstAuthor,
    /// Last author, if their id is in the query set
    LastAuthor,
    /// Last-to-first scan for any author in the query set
    #[default]
    ReverseScan,
    /// Owner label of the query (or the PI column of a lookup row). A combined
    /// query takes the label of the block holding the last matching author.
    Owner,
}

impl FromStr for PiPolicy {
    type Err = ScopusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" | "first-author" => Ok(PiPolicy::FirstAuthor),
            "last" | "last-author" => Ok(PiPolicy::LastAuthor),
            "reverse-scan" | "scan" => Ok(PiPolicy::ReverseScan),
            "owner" => Ok(PiPolicy::Owner),
            other => Err(ScopusError::Validation(format!("Unknown PI policy: {}", other))),
        }
    }
}

impl fmt::Display for PiPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PiPolicy::FirstAuthor => "first",
            PiPolicy::LastAuthor => "last",
            PiPolicy::ReverseScan => "reverse-scan",
            PiPolicy::Owner => "owner",
        };
        f.write_str(name)
    }
}

/// Per-query inputs to PI selection.
#[derive(Debug, Clone, Copy)]
pub struct PiContext<'a> {
    pub policy: PiPolicy,
    pub ids: &'a BTreeSet<String>,
    pub owner: Option<&'a str>,
    /// Identifier to owner label, used when `owner` is unset
    pub owners: &'a BTreeMap<String, String>,
}

impl PiContext<'_> {
    /// Pick the PI name for `authors` under this context's policy.
    pub fn select(&self, authors: &[EntryAuthor]) -> String {
        let matches = |a: &&EntryAuthor| {
            a.authid
                .as_deref()
                .map(|id| self.ids.contains(id.trim()))
                .unwrap_or(false)
        };

        let chosen = match self.policy {
            PiPolicy::FirstAuthor => authors.first().filter(matches),
            PiPolicy::LastAuthor => authors.last().filter(matches),
            PiPolicy::ReverseScan => authors.iter().rev().find(matches),
            PiPolicy::Owner => return self.owner_label(authors),
        };
        chosen.map(EntryAuthor::display_name).unwrap_or_default()
    }

    fn owner_label(&self, authors: &[EntryAuthor]) -> String {
        if let Some(owner) = self.owner {
            return owner.to_string();
        }
        authors
            .iter()
            .rev()
            .filter_map(|a| a.authid.as_deref())
            .find_map(|id| self.owners.get(id.trim()))
            .cloned()
            .unwrap_or_default()
    }
}

/// Flattened output row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "PI")]
    pub pi: String,
    #[serde(rename = "Authors")]
    pub authors: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Cited-By Count")]
    pub cited_by_count: u64,
    #[serde(rename = "Source Title")]
    pub source_title: String,
    #[serde(rename = "Page Range")]
    pub page_range: String,
    #[serde(rename = "DOI")]
    pub doi: String,
    #[serde(rename = "PubMed ID")]
    pub pubmed_id: String,
    #[serde(rename = "Scopus ID")]
    pub scopus_id: String,
    #[serde(rename = "EID")]
    pub eid: String,
    #[serde(rename = "Type")]
    pub doc_type: String,
    #[serde(rename = "Funding Agency")]
    pub funding_agency: String,
    #[serde(rename = "Abstract Link")]
    pub abstract_link: String,
    #[serde(rename = "Scopus Link")]
    pub scopus_link: String,
    #[serde(rename = "Cited-By Link")]
    pub cited_by_link: String,
}

impl Record {
    /// Flatten an API entry.
    ///
    /// # Errors
    ///
    /// Returns `Parse` if `dc:identifier` is missing or has no `SCOPUS_ID:` value.
    pub fn from_entry(entry: &Entry, ctx: &PiContext<'_>) -> Result<Self> {
        let scopus_id = parse_scopus_id(entry.identifier.as_deref().unwrap_or_default())
            .ok_or_else(|| {
                ScopusError::Parse(format!(
                    "unparsable dc:identifier {:?} on {}",
                    entry.identifier,
                    entry.label()
                ))
            })?;

        Ok(Self {
            title: entry.title.clone().unwrap_or_default(),
            pi: ctx.select(&entry.author),
            authors: dedup_authors(&entry.author).join(AUTHOR_SEPARATOR),
            date: entry.cover_date.clone().unwrap_or_default(),
            cited_by_count: entry.cited_by_count.unwrap_or(0),
            source_title: entry.publication_name.clone().unwrap_or_default(),
            page_range: entry.page_range.clone().unwrap_or_default(),
            doi: entry.doi.clone().unwrap_or_default(),
            pubmed_id: entry.pubmed_id.clone().unwrap_or_default(),
            scopus_id,
            eid: entry.eid.clone().unwrap_or_default(),
            doc_type: entry.subtype_description.clone().unwrap_or_default(),
            funding_agency: entry.fund_acr.clone().unwrap_or_default(),
            abstract_link: entry.link("self"),
            scopus_link: entry.link("scopus"),
            cited_by_link: entry.link("scopus-citedby"),
        })
    }

    /// Key used to drop repeated records within a run.
    pub fn dedup_key(&self) -> &str {
        if self.eid.is_empty() {
            &self.scopus_id
        } else {
            &self.eid
        }
    }
}

/// `SCOPUS_ID:85012345678` -> `85012345678`
fn parse_scopus_id(identifier: &str) -> Option<String> {
    identifier
        .split_once(':')
        .map(|(_, id)| id.trim())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Author display names without repeats, in first-seen order.
pub fn dedup_authors(authors: &[EntryAuthor]) -> Vec<String> {
    let mut seen = HashSet::new();
    authors
        .iter()
        .map(EntryAuthor::display_name)
        .filter(|name| !name.is_empty())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}
