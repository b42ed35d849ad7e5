use crate::collection::Collection;
use crate::document::Document;
use crate::index::{FieldPredicate, IndexKeyKind, IndexScan, key_from_bson};
use crate::types::DocumentId;
use bson::Bson;
use std::collections::HashMap;
use std::ops::Bound;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::cursor::Cursor;
use super::eval::{compare_docs, eval_filter, project_fields};
use super::types::{
    CmpOp, DeleteReport, Filter, FindOptions, MAX_LIMIT, MAX_SORT_FIELDS, UpdateDoc, UpdateReport,
};

/// How candidates were produced for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessPath {
    CollScan,
    IndexScan { index_name: String },
}

/// Counters gathered while executing a find; the raw material for explain output.
#[derive(Debug, Clone)]
pub struct ExecStats {
    pub access: AccessPath,
    pub keys_examined: usize,
    pub docs_examined: usize,
    pub n_returned: usize,
    pub elapsed: Duration,
}

pub(crate) fn log_event(op: &str, col: &Collection, detail: serde_json::Value) {
    let line = serde_json::json!({
        "op": op,
        "collection": col.name_str(),
        "detail": detail,
    });
    log::info!(target: "bookstore::query", "{line}");
}

/// Per-field predicates the index planner can use: top-level comparisons,
/// either alone or as direct children of an `And`. `$ne` never qualifies.
pub(crate) fn index_predicates(filter: &Filter) -> HashMap<String, FieldPredicate> {
    fn add(out: &mut HashMap<String, FieldPredicate>, path: &str, op: CmpOp, value: &Bson) {
        let Some(key) = key_from_bson(value) else { return };
        let pred = match op {
            CmpOp::Eq => FieldPredicate::Eq(key),
            CmpOp::Gt => FieldPredicate::Range { upper: key.bracket_high(), lower: Bound::Excluded(key) },
            CmpOp::Gte => FieldPredicate::Range { upper: key.bracket_high(), lower: Bound::Included(key) },
            CmpOp::Lt => FieldPredicate::Range { lower: Bound::Included(key.bracket_low()), upper: Bound::Excluded(key) },
            CmpOp::Lte => FieldPredicate::Range { lower: Bound::Included(key.bracket_low()), upper: Bound::Included(key) },
            CmpOp::Ne => return,
        };
        // first predicate per field wins, except that an equality replaces a range
        let replace = match out.get(path) {
            None => true,
            Some(FieldPredicate::Eq(_)) => false,
            Some(FieldPredicate::Range { .. }) => matches!(pred, FieldPredicate::Eq(_)),
        };
        if replace {
            out.insert(path.to_string(), pred);
        }
    }
    let mut out = HashMap::new();
    match filter {
        Filter::Cmp { path, op, value } => add(&mut out, path, *op, value),
        Filter::And(fs) => {
            for f in fs {
                if let Filter::Cmp { path, op, value } = f {
                    add(&mut out, path, *op, value);
                }
            }
        }
        _ => {}
    }
    // a null equality must also match documents missing the field, which the index stores as null
    out.retain(|_, p| !matches!(p, FieldPredicate::Eq(IndexKeyKind::Null)));
    out
}

/// Candidate ids in natural order, plus the index scan that produced them (if any).
fn plan_candidates(col: &Arc<Collection>, filter: &Filter) -> (Vec<DocumentId>, Option<IndexScan>) {
    let preds = index_predicates(filter);
    if !preds.is_empty() {
        let mut mgr = col.indexes.write();
        if let Some(name) = mgr.choose(&preds)
            && let Some(scan) = mgr.scan(&name, &preds)
        {
            drop(mgr);
            let ids = col.natural_order(scan.ids.clone());
            return (ids, Some(scan));
        }
    }
    (col.list_ids(), None)
}

/// Run a find and return matching (sorted, sliced, projected) documents with execution counters.
pub fn execute_find(col: &Arc<Collection>, filter: &Filter, opts: &FindOptions) -> (Vec<Document>, ExecStats) {
    let start = Instant::now();
    let (ids, scan) = plan_candidates(col, filter);
    let docs_examined = ids.len();
    let mut docs: Vec<Document> = ids
        .into_iter()
        .filter_map(|id| col.find_document(&id))
        .filter(|d| eval_filter(&d.data.0, filter))
        .collect();

    if let Some(sort) = &opts.sort {
        if sort.len() > MAX_SORT_FIELDS {
            log::warn!("sort spec too long: {}", sort.len());
        }
        // stable: ties keep natural order
        docs.sort_by(|a, b| compare_docs(&a.data.0, &b.data.0, sort));
    }

    let skip = opts.skip.unwrap_or(0);
    // only an explicit limit is clamped; no limit means every match
    let limit = opts.limit.map_or(usize::MAX, |l| l.min(MAX_LIMIT));
    let mut docs: Vec<Document> = docs.into_iter().skip(skip).take(limit).collect();

    if let Some(projection) = &opts.projection {
        for d in &mut docs {
            d.data.0 = project_fields(&d.data.0, projection);
        }
    }

    let stats = ExecStats {
        access: scan
            .as_ref()
            .map_or(AccessPath::CollScan, |s| AccessPath::IndexScan { index_name: s.index_name.clone() }),
        keys_examined: scan.as_ref().map_or(0, |s| s.keys_examined),
        docs_examined,
        n_returned: docs.len(),
        elapsed: start.elapsed(),
    };
    (docs, stats)
}

pub fn find_docs(col: &Arc<Collection>, filter: &Filter, opts: &FindOptions) -> Cursor {
    let (docs, stats) = execute_find(col, filter, opts);
    log_event(
        "find",
        col,
        serde_json::json!({
            "plan": match &stats.access { AccessPath::CollScan => "COLLSCAN".to_string(), AccessPath::IndexScan { index_name } => format!("IXSCAN {index_name}") },
            "docs_examined": stats.docs_examined,
            "returned": stats.n_returned,
            "skip": opts.skip,
            "limit": opts.limit,
            "duration_ms": u64::try_from(stats.elapsed.as_millis()).unwrap_or(u64::MAX),
        }),
    );
    Cursor::new(docs)
}

#[must_use]
pub fn count_docs(col: &Arc<Collection>, filter: &Filter) -> usize {
    let (ids, _) = plan_candidates(col, filter);
    ids.iter()
        .filter_map(|id| col.find_document(id))
        .filter(|d| eval_filter(&d.data.0, filter))
        .count()
}

fn matching_ids(col: &Arc<Collection>, filter: &Filter) -> Vec<DocumentId> {
    let (ids, _) = plan_candidates(col, filter);
    ids.into_iter()
        .filter(|id| col.find_document(id).is_some_and(|d| eval_filter(&d.data.0, filter)))
        .collect()
}

fn first_matching_id(col: &Arc<Collection>, filter: &Filter) -> Option<DocumentId> {
    let (ids, _) = plan_candidates(col, filter);
    ids.into_iter()
        .find(|id| col.find_document(id).is_some_and(|d| eval_filter(&d.data.0, filter)))
}

pub fn update_many(col: &Arc<Collection>, filter: &Filter, update: &UpdateDoc) -> UpdateReport {
    let mut matched = 0u64;
    let mut modified = 0u64;
    for id in matching_ids(col, filter) {
        if let Some(mut doc) = col.find_document(&id) {
            matched += 1;
            if apply_update(&mut doc, update) {
                modified += 1;
                col.update_document(&id, doc);
            }
        }
    }
    log_event("update_many", col, serde_json::json!({"matched": matched, "modified": modified}));
    UpdateReport { matched, modified }
}

/// Update the first matching document in natural order.
pub fn update_one(col: &Arc<Collection>, filter: &Filter, update: &UpdateDoc) -> UpdateReport {
    let report = if let Some(id) = first_matching_id(col, filter)
        && let Some(mut doc) = col.find_document(&id)
    {
        let changed = apply_update(&mut doc, update);
        if changed {
            col.update_document(&id, doc);
        }
        UpdateReport { matched: 1, modified: u64::from(changed) }
    } else {
        UpdateReport::default()
    };
    log_event("update_one", col, serde_json::json!({"matched": report.matched, "modified": report.modified}));
    report
}

pub fn delete_many(col: &Arc<Collection>, filter: &Filter) -> DeleteReport {
    let mut deleted = 0u64;
    for id in matching_ids(col, filter) {
        if col.delete_document(&id) {
            deleted += 1;
        }
    }
    log_event("delete_many", col, serde_json::json!({"deleted": deleted}));
    DeleteReport { deleted }
}

/// Delete the first matching document in natural order.
pub fn delete_one(col: &Arc<Collection>, filter: &Filter) -> DeleteReport {
    let deleted = first_matching_id(col, filter).map_or(0, |id| u64::from(col.delete_document(&id)));
    log_event("delete_one", col, serde_json::json!({"deleted": deleted}));
    DeleteReport { deleted }
}

/// Apply `$set`/`$inc`/`$unset` to a document; returns whether anything changed.
pub fn apply_update(doc: &mut Document, upd: &UpdateDoc) -> bool {
    fn ensure_subdoc<'a>(root: &'a mut bson::Document, key: &str) -> &'a mut bson::Document {
        if !matches!(root.get(key), Some(Bson::Document(_))) {
            root.insert(key.to_string(), Bson::Document(bson::Document::new()));
        }
        match root.get_mut(key) {
            Some(Bson::Document(d)) => d,
            _ => unreachable!("sub-document inserted above"),
        }
    }
    fn traverse_to_parent<'a>(root: &'a mut bson::Document, path: &str) -> (&'a mut bson::Document, String) {
        let mut cur = root;
        let mut iter = path.split('.').peekable();
        let mut last = String::new();
        while let Some(seg) = iter.next() {
            if iter.peek().is_none() {
                last = seg.to_string();
                break;
            }
            cur = ensure_subdoc(cur, seg);
        }
        (cur, last)
    }
    fn set_path(root: &mut bson::Document, path: &str, value: Bson) -> bool {
        let (parent, last) = traverse_to_parent(root, path);
        let old = parent.insert(last, value.clone());
        old.as_ref() != Some(&value)
    }
    fn unset_path(root: &mut bson::Document, path: &str) -> bool {
        let mut cur = root;
        let parts: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = parts.split_last() else { return false };
        for seg in parents {
            match cur.get_mut(*seg) {
                Some(Bson::Document(d)) => cur = d,
                _ => return false,
            }
        }
        cur.remove(*last).is_some()
    }
    fn inc_path(root: &mut bson::Document, path: &str, by: f64) -> bool {
        let cur = super::eval::get_path(root, path).cloned();
        let newv = match cur {
            #[allow(clippy::cast_possible_truncation)]
            Some(Bson::Int32(i)) if by.fract() == 0.0 => Bson::Int32(i + by as i32),
            #[allow(clippy::cast_possible_truncation)]
            Some(Bson::Int64(i)) if by.fract() == 0.0 => Bson::Int64(i + by as i64),
            Some(ref v) => match super::eval::as_f64(v) {
                Some(f) => Bson::Double(f + by),
                None => return false,
            },
            None => Bson::Double(by),
        };
        set_path(root, path, newv)
    }

    if upd.set.iter().any(|(k, _)| k == "_id") {
        log::warn!("ignoring $set on _id");
    }
    let mut changed = false;
    for (k, v) in upd.set.iter().filter(|(k, _)| k != "_id") {
        changed |= set_path(&mut doc.data.0, k, v.clone());
    }
    for (k, inc) in &upd.inc {
        changed |= inc_path(&mut doc.data.0, k, *inc);
    }
    for k in &upd.unset {
        changed |= unset_path(&mut doc.data.0, k);
    }
    if changed {
        doc.touch();
    }
    changed
}
