use bookstore::collection::Collection;
use bookstore::document::Document;
use bookstore::index::IndexDescriptor;
use bookstore::query::{CmpOp, Filter, FindOptions, Order, SortSpec, execute_find};
use bson::Bson;
use proptest::prelude::*;
use std::sync::Arc;

fn collection(rows: &[(i32, i64)]) -> Arc<Collection> {
    let col = Arc::new(Collection::new("prop".into()));
    for (year, price) in rows {
        col.insert_document(Document::new(bson::doc! {"year": *year, "price": *price}));
    }
    col
}

fn ids(docs: &[Document]) -> Vec<String> {
    docs.iter().map(|d| d.id.to_string()).collect()
}

fn op_strategy() -> impl Strategy<Value = CmpOp> {
    prop_oneof![Just(CmpOp::Eq), Just(CmpOp::Gt), Just(CmpOp::Gte), Just(CmpOp::Lt), Just(CmpOp::Lte), Just(CmpOp::Ne)]
}

const TAGS: [&str; 3] = ["a", "b", "c"];

fn year_value() -> impl Strategy<Value = Bson> {
    prop_oneof![
        4 => (1800i32..2030).prop_map(Bson::Int32),
        1 => Just(Bson::Document(bson::doc! {"approx": 1937})),
        1 => Just(Bson::Array(vec![Bson::Int32(1937)])),
        1 => Just(Bson::String("unknown".into())),
        1 => Just(Bson::Null),
    ]
}

proptest! {
    #[test]
    fn prop_index_scan_matches_collection_scan(
        rows in proptest::collection::vec((1800i32..2030, -50i64..50), 0..40),
        op in op_strategy(),
        pivot in 1800i32..2030,
    ) {
        let col = collection(&rows);
        let filter = Filter::cmp("year", op, pivot);
        let (plain, _) = execute_find(&col, &filter, &FindOptions::default());
        col.create_index(IndexDescriptor::from_document(&bson::doc! {"year": 1}).unwrap());
        let (indexed, _) = execute_find(&col, &filter, &FindOptions::default());
        prop_assert_eq!(ids(&plain), ids(&indexed));
    }

    #[test]
    fn prop_multi_key_sort_non_decreasing(rows in proptest::collection::vec((1800i32..2030, -50i64..50), 0..50)) {
        let col = collection(&rows);
        let opts = FindOptions {
            sort: Some(vec![SortSpec { field: "year".into(), order: Order::Asc }, SortSpec::desc("price")]),
            ..FindOptions::default()
        };
        let (docs, _) = execute_find(&col, &Filter::True, &opts);
        prop_assert_eq!(docs.len(), rows.len());
        for w in docs.windows(2) {
            let (y0, p0) = (w[0].body().get_i32("year").unwrap(), w[0].body().get_i64("price").unwrap());
            let (y1, p1) = (w[1].body().get_i32("year").unwrap(), w[1].body().get_i64("price").unwrap());
            prop_assert!(y0 < y1 || (y0 == y1 && p0 >= p1));
        }
    }

    #[test]
    fn prop_skip_limit_is_a_window(
        rows in proptest::collection::vec((1800i32..2030, -50i64..50), 0..30),
        skip in 0usize..35,
        limit in 1usize..10,
    ) {
        let col = collection(&rows);
        let (all, _) = execute_find(&col, &Filter::True, &FindOptions::default());
        let opts = FindOptions { skip: Some(skip), limit: Some(limit), ..FindOptions::default() };
        let (page, _) = execute_find(&col, &Filter::True, &opts);
        let expected: Vec<String> = ids(&all).into_iter().skip(skip).take(limit).collect();
        prop_assert_eq!(ids(&page), expected);
    }

    #[test]
    fn prop_compound_index_matches_collection_scan(
        rows in proptest::collection::vec((0usize..3, year_value(), any::<bool>()), 0..40),
        op in op_strategy(),
        pivot in 1800i32..2030,
        tag in 0usize..3,
        with_year in any::<bool>(),
    ) {
        let col = Arc::new(Collection::new("prop_compound".into()));
        for (t, year, present) in &rows {
            let mut body = bson::doc! {"tag": TAGS[*t]};
            if *present {
                body.insert("year", year.clone());
            }
            col.insert_document(Document::new(body));
        }
        let filter = if with_year {
            Filter::and(vec![Filter::eq("tag", TAGS[tag]), Filter::cmp("year", op, pivot)])
        } else {
            Filter::eq("tag", TAGS[tag])
        };
        let (plain, _) = execute_find(&col, &filter, &FindOptions::default());
        col.create_index(IndexDescriptor::from_document(&bson::doc! {"tag": 1, "year": 1}).unwrap());
        let (indexed, _) = execute_find(&col, &filter, &FindOptions::default());
        prop_assert_eq!(ids(&plain), ids(&indexed));
    }
}
