use crate::aggregate::{Pipeline, aggregate};
use crate::catalog::{load_catalog, sample_catalog, seed_collection};
use crate::errors::DbError;
use crate::index::IndexDescriptor;
use crate::query::{self, FindOptions};
use crate::runner::{OutputMode, StepOutput, run_all};
use crate::{Database, Session};
use bson::{Bson, Document as BsonDocument};
use std::io::Write;
use std::path::Path;

use super::command::Command;
use super::util::{parse_projection, parse_sort};

fn to_json(docs: Vec<BsonDocument>) -> Vec<serde_json::Value> {
    docs.into_iter().map(|d| Bson::Document(d).into_relaxed_extjson()).collect()
}

fn seed(session: &Session, file: Option<&Path>, reset: bool) -> Result<usize, DbError> {
    let books = match file {
        Some(path) => load_catalog(path)?,
        None => sample_catalog()?,
    };
    seed_collection(session.collection(), &books, reset)
}

/// Execute `cmd` against the session's collection, writing results to `out`.
/// Mutating commands flush the database afterwards.
///
/// # Errors
/// Returns any parse, query or I/O failure.
pub fn run_with_format(
    db: &Database,
    session: &Session,
    cmd: Command,
    mode: OutputMode,
    out: &mut impl Write,
) -> Result<(), Box<dyn std::error::Error>> {
    let col = session.collection();
    let mutates = cmd.mutates();
    match cmd {
        Command::Run { seed_file } => {
            if col.is_empty() {
                let n = seed(session, seed_file.as_deref(), false)?;
                log::info!("collection was empty; seeded {n} books before running");
            }
            run_all(session, out, mode)?;
        }
        Command::Seed { file, reset } => {
            let inserted = seed(session, file.as_deref(), reset)?;
            StepOutput::new("Seeded", &serde_json::json!({"inserted": inserted, "total": col.len()}))?
                .write_to(out, mode)?;
        }
        Command::Find { filter_json, project, sort, skip, limit } => {
            let filter = query::parse_filter_json(filter_json.as_deref().unwrap_or(""))?;
            let mut opts = FindOptions { skip, limit, ..FindOptions::default() };
            if let Some(p) = project {
                opts.projection = Some(parse_projection(&p));
            }
            if let Some(s) = sort {
                let specs = parse_sort(&s)?;
                if !specs.is_empty() {
                    opts.sort = Some(specs);
                }
            }
            let docs = query::find_docs(col, &filter, &opts).into_bodies();
            StepOutput::new("Found", &to_json(docs))?.write_to(out, mode)?;
        }
        Command::UpdateOne { filter_json, update_json } => {
            let filter = query::parse_filter_json(&filter_json)?;
            let update = query::parse_update_json(&update_json)?;
            StepOutput::new("Updated", &query::update_one(col, &filter, &update))?.write_to(out, mode)?;
        }
        Command::DeleteOne { filter_json } => {
            let filter = query::parse_filter_json(&filter_json)?;
            StepOutput::new("Deleted", &query::delete_one(col, &filter))?.write_to(out, mode)?;
        }
        Command::Aggregate { pipeline_json } => {
            let pipeline = Pipeline::from_json(&pipeline_json)?;
            StepOutput::new("Aggregated", &to_json(aggregate(col, &pipeline)))?.write_to(out, mode)?;
        }
        Command::CreateIndex { keys_json } => {
            let keys = query::document_from_json(&keys_json)?;
            let name = col.create_index(IndexDescriptor::from_document(&keys)?);
            StepOutput::new("Index created", &name)?.write_to(out, mode)?;
        }
        Command::Indexes => {
            let indexes: Vec<serde_json::Value> = col
                .index_stats()
                .into_iter()
                .map(|(d, stats)| {
                    serde_json::json!({
                        "name": d.name,
                        "key": Bson::Document(d.key_pattern()).into_relaxed_extjson(),
                        "stats": stats,
                    })
                })
                .collect();
            StepOutput::new("Indexes", &indexes)?.write_to(out, mode)?;
        }
        Command::Explain { filter_json } => {
            let filter = query::parse_filter_json(&filter_json)?;
            StepOutput::new("Explain", &query::explain(col, session.namespace(), &filter))?.write_to(out, mode)?;
        }
    }
    if mutates {
        db.flush()?;
    }
    Ok(())
}

/// Human-readable output to stdout.
///
/// # Errors
/// See [`run_with_format`].
pub fn run(db: &Database, session: &Session, cmd: Command) -> Result<(), Box<dyn std::error::Error>> {
    run_with_format(db, session, cmd, OutputMode::Human, &mut std::io::stdout().lock())
}
