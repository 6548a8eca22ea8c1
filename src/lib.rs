//! # scopus-harvest
//!
//! Scopus Search harvester: paginated queries flattened to CSV, plus a
//! citation count refresh for existing CSVs.
//!
//! ## Modules
//!
//! - [`query`] - Identifier files and OR-joined query expressions
//! - [`scopus`] - Scopus Search API client (pagination, citation counts)
//! - [`record`] - Entry flattening and PI selection
//! - [`output`] - CSV writer and citation merge
//! - [`pipeline`] - Harvest, lookup and refresh runs
//! - [`config`] - Client configuration
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scopus_harvest::{
//!     config::Config, output::RecordWriter, pipeline, query, record::PiPolicy,
//!     scopus::ScopusClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ScopusClient::new(Config::from_env()?)?;
//!     let blocks = query::read_id_file("au-ids.txt")?;
//!     let kind = query::IdentifierKind::AuthorId;
//!     let queries = query::build_queries(&blocks, kind, None, Default::default());
//!     let mut writer = RecordWriter::create("out.csv")?;
//!     let summary = pipeline::harvest(&client, &queries, PiPolicy::default(), &mut writer).await?;
//!     println!("Wrote {} records", summary.written);
//!     Ok(())
//! }
//! ```

pub mod config;
mod de;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod query;
pub mod record;
pub mod scopus;

pub use error::{Result, ScopusError};
