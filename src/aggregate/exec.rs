use crate::collection::Collection;
use crate::query::{
    FindOptions, Filter, as_f64, compare_bson, compare_docs, eval_filter, execute_find, get_path, insert_path,
    log_event,
};
use bson::{Bson, Document as BsonDocument};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use super::expr::{is_integral, numeric_result};
use super::stage::{Accumulator, GroupStage, Pipeline, ProjectField, ProjectStage, Stage};

enum AccState {
    Sum { total: f64, integral: bool },
    Avg { sum: f64, count: u64 },
    Min(Option<Bson>),
    Max(Option<Bson>),
    First(Option<Bson>),
}

impl AccState {
    const fn for_acc(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Sum(_) => Self::Sum { total: 0.0, integral: true },
            Accumulator::Avg(_) => Self::Avg { sum: 0.0, count: 0 },
            Accumulator::Min(_) => Self::Min(None),
            Accumulator::Max(_) => Self::Max(None),
            Accumulator::First(_) => Self::First(None),
        }
    }

    fn feed(&mut self, acc: &Accumulator, doc: &BsonDocument) {
        match (acc, self) {
            (Accumulator::Sum(e), Self::Sum { total, integral }) => {
                let v = e.eval(doc);
                if let Some(x) = as_f64(&v) {
                    *total += x;
                    *integral &= is_integral(&v);
                }
            }
            (Accumulator::Avg(e), Self::Avg { sum, count }) => {
                if let Some(x) = as_f64(&e.eval(doc)) {
                    *sum += x;
                    *count += 1;
                }
            }
            (Accumulator::Min(e), Self::Min(cur)) => keep_extreme(cur, e.eval(doc), Ordering::Less),
            (Accumulator::Max(e), Self::Max(cur)) => keep_extreme(cur, e.eval(doc), Ordering::Greater),
            (Accumulator::First(e), Self::First(cur)) => {
                if cur.is_none() {
                    *cur = Some(e.eval(doc));
                }
            }
            _ => {}
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn finish(self) -> Bson {
        match self {
            Self::Sum { total, integral } => numeric_result(total, integral),
            Self::Avg { count: 0, .. } => Bson::Null,
            Self::Avg { sum, count } => Bson::Double(sum / count as f64),
            Self::Min(v) | Self::Max(v) | Self::First(v) => v.unwrap_or(Bson::Null),
        }
    }
}

fn keep_extreme(cur: &mut Option<Bson>, candidate: Bson, want: Ordering) {
    if matches!(candidate, Bson::Null | Bson::Undefined) {
        return;
    }
    let replace = cur.as_ref().is_none_or(|c| compare_bson(&candidate, c) == want);
    if replace {
        *cur = Some(candidate);
    }
}

/// Grouping key normalised so that numerically equal keys share a group.
fn group_key(v: &Bson) -> String {
    as_f64(v).map_or_else(|| format!("{v:?}"), |f| format!("#num:{f}"))
}

fn run_group(docs: Vec<BsonDocument>, group: &GroupStage) -> Vec<BsonDocument> {
    let accs = group.accumulators();
    let mut order: Vec<(Bson, Vec<AccState>)> = Vec::new();
    let mut slots: HashMap<String, usize> = HashMap::new();
    for doc in &docs {
        let key = group.key().eval(doc);
        let slot = *slots.entry(group_key(&key)).or_insert_with(|| {
            order.push((key, accs.iter().map(|(_, a)| AccState::for_acc(a)).collect()));
            order.len() - 1
        });
        for ((_, acc), state) in accs.iter().zip(order[slot].1.iter_mut()) {
            state.feed(acc, doc);
        }
    }
    order
        .into_iter()
        .map(|(key, states)| {
            let mut out = BsonDocument::new();
            out.insert("_id", key);
            for ((name, _), state) in accs.iter().zip(states) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect()
}

fn run_project(doc: &BsonDocument, project: &ProjectStage) -> BsonDocument {
    let mut out = BsonDocument::new();
    if project.include_id()
        && let Some(id) = doc.get("_id")
    {
        out.insert("_id", id.clone());
    }
    for (name, field) in project.fields() {
        match field {
            ProjectField::Include => {
                if let Some(v) = get_path(doc, name) {
                    insert_path(&mut out, name, v.clone());
                }
            }
            ProjectField::Compute(e) => insert_path(&mut out, name, e.eval(doc)),
        }
    }
    out
}

fn run_stage(docs: Vec<BsonDocument>, stage: &Stage) -> Vec<BsonDocument> {
    match stage {
        Stage::Match(filter) => docs.into_iter().filter(|d| eval_filter(d, filter)).collect(),
        Stage::Group(group) => run_group(docs, group),
        Stage::Sort(keys) => {
            let mut docs = docs;
            docs.sort_by(|a, b| compare_docs(a, b, keys));
            docs
        }
        Stage::Limit(n) => docs.into_iter().take(*n).collect(),
        Stage::Project(p) => docs.iter().map(|d| run_project(d, p)).collect(),
    }
}

/// Run `pipeline` over the collection. A leading `$match` goes through the
/// query planner so it can use an index.
pub fn aggregate(col: &Arc<Collection>, pipeline: &Pipeline) -> Vec<BsonDocument> {
    let start = Instant::now();
    let (seed_filter, rest) = match pipeline.stages().split_first() {
        Some((Stage::Match(f), rest)) => (f.clone(), rest),
        _ => (Filter::True, pipeline.stages()),
    };
    let (seed, stats) = execute_find(col, &seed_filter, &FindOptions::default());
    let mut docs: Vec<BsonDocument> = seed.into_iter().map(|d| d.data.0).collect();
    for stage in rest {
        docs = run_stage(docs, stage);
    }
    log_event(
        "aggregate",
        col,
        serde_json::json!({
            "stages": pipeline.stages().iter().map(Stage::name).collect::<Vec<_>>(),
            "docs_examined": stats.docs_examined,
            "returned": docs.len(),
            "duration_ms": u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
        }),
    );
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Expr;
    use crate::document::Document;
    use crate::query::SortSpec;
    use bson::doc;

    fn col() -> Arc<Collection> {
        let c = Arc::new(Collection::new("agg".into()));
        for (g, p, y) in [("A", 10.0, 1993), ("B", 4.0, 2001), ("A", 20.0, 1999), ("C", 7.5, 1851)] {
            c.insert_document(Document::new(doc! {"genre": g, "price": p, "published_year": y}));
        }
        c
    }

    #[test]
    fn group_average_in_first_seen_order() {
        let p = Pipeline::new().then(
            Stage::group(Expr::field("genre"), vec![("avg".into(), Accumulator::Avg(Expr::field("price")))]).unwrap(),
        );
        let out = aggregate(&col(), &p);
        let keys: Vec<&str> = out.iter().map(|d| d.get_str("_id").unwrap()).collect();
        assert_eq!(keys, ["A", "B", "C"]);
        assert!((out[0].get_f64("avg").unwrap() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn decade_buckets_and_counts() {
        let p = Pipeline::new()
            .then(Stage::group(Expr::decade_of("published_year"), vec![("count".into(), Accumulator::count())]).unwrap())
            .then(Stage::sort(vec![SortSpec::asc("_id")]).unwrap());
        let out = aggregate(&col(), &p);
        assert_eq!(out[0], doc! {"_id": 1850, "count": 1});
        assert_eq!(out[1], doc! {"_id": 1990, "count": 2});
        assert_eq!(out[2], doc! {"_id": 2000, "count": 1});
    }

    #[test]
    fn avg_without_numbers_is_null_and_min_max_skip_missing() {
        let p = Pipeline::new().then(
            Stage::group(
                Expr::lit(Bson::Null),
                vec![
                    ("avg".into(), Accumulator::Avg(Expr::field("missing"))),
                    ("lo".into(), Accumulator::Min(Expr::field("price"))),
                    ("hi".into(), Accumulator::Max(Expr::field("price"))),
                    ("first".into(), Accumulator::First(Expr::field("genre"))),
                ],
            )
            .unwrap(),
        );
        let out = aggregate(&col(), &p);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].get("avg"), Some(&Bson::Null));
        assert_eq!(out[0].get_f64("lo").unwrap(), 4.0);
        assert_eq!(out[0].get_f64("hi").unwrap(), 20.0);
        assert_eq!(out[0].get_str("first").unwrap(), "A");
    }

    #[test]
    fn project_nests_dotted_fields() {
        let c = Arc::new(Collection::new("pub".into()));
        c.insert_document(Document::new(doc! {"title": "Dune", "publisher": {"city": "Philadelphia", "zip": "19106"}}));
        let p = Pipeline::from_documents(&[doc! {"$project": {"_id": 0, "publisher.city": 1, "title": 1}}]).unwrap();
        assert_eq!(aggregate(&c, &p), vec![doc! {"publisher": {"city": "Philadelphia"}, "title": "Dune"}]);
    }

    #[test]
    fn group_sees_the_whole_collection() {
        let c = Arc::new(Collection::new("big".into()));
        for i in 0..crate::query::MAX_LIMIT + 5 {
            c.insert_document(Document::new(doc! {"parity": i64::try_from(i % 2).unwrap()}));
        }
        let p = Pipeline::new()
            .then(Stage::group(Expr::lit(Bson::Null), vec![("n".into(), Accumulator::count())]).unwrap());
        let out = aggregate(&c, &p);
        let expected = i32::try_from(crate::query::MAX_LIMIT + 5).unwrap();
        assert_eq!(out[0].get("n"), Some(&Bson::Int32(expected)));
    }

    #[test]
    fn leading_match_then_project_and_limit() {
        let p = Pipeline::from_documents(&[
            doc! {"$match": {"genre": "A"}},
            doc! {"$project": {"_id": 0, "genre": 1, "decade": {"$subtract": ["$published_year", {"$mod": ["$published_year", 10]}]}}},
            doc! {"$limit": 1},
        ])
        .unwrap();
        assert_eq!(aggregate(&col(), &p), vec![doc! {"genre": "A", "decade": 1990}]);
    }
}
