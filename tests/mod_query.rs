mod common;

use bookstore::index::IndexDescriptor;
use bookstore::query::{
    AccessPath, Filter, FindOptions, Order, SortSpec, count_docs, execute_find, explain, parse_filter_json,
};
use bookstore::runner;
use bson::doc;
use common::seeded_session;

#[test]
fn explain_switches_from_collscan_to_ixscan() {
    let s = seeded_session();
    let filter = doc! {"title": "The Hobbit"};
    let before = runner::explain_query(&s, &filter).unwrap();
    assert_eq!(before.query_planner.winning_plan.stage, "COLLSCAN");
    assert_eq!(before.execution_stats.total_docs_examined, 12);
    assert_eq!(before.execution_stats.total_keys_examined, 0);

    assert_eq!(runner::create_index(&s, &doc! {"title": 1}).unwrap(), "title_1");
    let after = runner::explain_query(&s, &filter).unwrap();
    assert_eq!(after.used_index(), Some("title_1"));
    assert_eq!(after.execution_stats.n_returned, 1);
    assert_eq!(after.execution_stats.total_keys_examined, 1);
    assert_eq!(after.execution_stats.total_docs_examined, 1);
    assert_eq!(after.query_planner.namespace, "plp_bookstore.books");
}

#[test]
fn compound_index_serves_author_and_year() {
    let s = seeded_session();
    runner::create_index(&s, &doc! {"title": 1}).unwrap();
    runner::create_index(&s, &doc! {"author": 1, "published_year": 1}).unwrap();
    let r = runner::explain_query(&s, &doc! {"author": "J.R.R. Tolkien", "published_year": 1937}).unwrap();
    assert_eq!(r.used_index(), Some("author_1_published_year_1"));
    assert_eq!(r.execution_stats.n_returned, 1);
    assert_eq!(r.execution_stats.total_keys_examined, 1);

    // leading field alone still uses the compound index
    let r = runner::explain_query(&s, &doc! {"author": "J.R.R. Tolkien"}).unwrap();
    assert_eq!(r.used_index(), Some("author_1_published_year_1"));
    assert_eq!(r.execution_stats.n_returned, 2);

    // a non-leading field cannot
    let r = runner::explain_query(&s, &doc! {"published_year": 1937}).unwrap();
    assert_eq!(r.query_planner.winning_plan.stage, "COLLSCAN");
}

#[test]
fn indexes_follow_updates_and_deletes() {
    let s = seeded_session();
    let col = s.collection();
    col.create_index(IndexDescriptor::from_document(&doc! {"price": 1}).unwrap());
    runner::update_price(&s, "The Hobbit", 17.99).unwrap();
    runner::delete_by_title(&s, "Moby Dick").unwrap();

    let f = parse_filter_json(r#"{"price": {"$gte": 12.5}}"#).unwrap();
    let (docs, stats) = execute_find(col, &f, &FindOptions::default());
    assert_eq!(stats.access, AccessPath::IndexScan { index_name: "price_1".into() });
    let titles: Vec<&str> = docs.iter().map(|d| d.body().get_str("title").unwrap()).collect();
    assert_eq!(titles, ["To Kill a Mockingbird", "The Hobbit", "The Lord of the Rings"]);
    assert_eq!(count_docs(col, &f), 3);
}

#[test]
fn range_filters_agree_with_and_without_index() {
    let s = seeded_session();
    let col = s.collection();
    let filters = [
        r#"{"published_year": {"$gt": 1900, "$lte": 1951}}"#,
        r#"{"published_year": {"$lt": 1900}}"#,
        r#"{"published_year": {"$ne": 1949}}"#,
        r#"{"$or": [{"genre": "Fantasy"}, {"price": {"$lt": 9}}]}"#,
        r#"{"genre": {"$in": ["Fiction", "Romance"]}, "in_stock": true}"#,
    ];
    let run = |json: &str| {
        let f = parse_filter_json(json).unwrap();
        let opts = FindOptions { sort: Some(vec![SortSpec::asc("title")]), ..FindOptions::default() };
        execute_find(col, &f, &opts).0.into_iter().map(|d| d.data.0).collect::<Vec<_>>()
    };
    let before: Vec<_> = filters.iter().map(|f| run(f)).collect();
    col.create_index(IndexDescriptor::from_document(&doc! {"published_year": -1}).unwrap());
    col.create_index(IndexDescriptor::from_document(&doc! {"genre": 1}).unwrap());
    let after: Vec<_> = filters.iter().map(|f| run(f)).collect();
    assert_eq!(before, after);
    assert_eq!(before[0].len(), 6);
}

#[test]
fn sort_skip_limit_compose() {
    let s = seeded_session();
    let opts = FindOptions {
        sort: Some(vec![SortSpec { field: "price".into(), order: Order::Desc }]),
        skip: Some(1),
        limit: Some(2),
        ..FindOptions::default()
    };
    let (docs, _) = execute_find(s.collection(), &Filter::True, &opts);
    let prices: Vec<f64> = docs.iter().map(|d| d.body().get_f64("price").unwrap()).collect();
    assert_eq!(prices, [14.99, 12.99]);
    let r = explain(s.collection(), s.namespace(), &Filter::True);
    assert_eq!(r.execution_stats.n_returned, 12);
}
