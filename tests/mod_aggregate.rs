mod common;

use bookstore::aggregate::{Pipeline, aggregate};
use bookstore::runner;
use common::{book, seeded_session, session_with};

#[test]
fn genre_averages_match_manual_means() {
    let s = session_with(&[
        book("a1", "Alpha", 1990, 10.0),
        book("b1", "Beta", 1991, 3.25),
        book("a2", "Alpha", 1992, 12.5),
        book("g1", "Gamma", 1993, 7.0),
        book("b2", "Beta", 1994, 4.75),
        book("a3", "Alpha", 1995, 8.1),
    ]);
    let avgs = runner::average_price_by_genre(&s).unwrap();
    let genres: Vec<_> = avgs.iter().map(|a| a.genre.as_deref().unwrap()).collect();
    assert_eq!(genres, ["Alpha", "Beta", "Gamma"]);
    let expect = [(10.0 + 12.5 + 8.1) / 3.0, (3.25 + 4.75) / 2.0, 7.0];
    for (got, want) in avgs.iter().zip(expect) {
        assert!((got.avg_price.unwrap() - want).abs() < 1e-9);
    }
}

#[test]
fn decade_bucket_for_1993_is_1990() {
    let s = session_with(&[book("x", "A", 1993, 1.0), book("y", "A", 1990, 1.0), book("z", "A", 2001, 1.0)]);
    let buckets = runner::books_by_decade(&s).unwrap();
    let pairs: Vec<(i32, i64)> = buckets.iter().map(|b| (b.decade.unwrap(), b.count)).collect();
    assert_eq!(pairs, [(1990, 2), (2000, 1)]);
}

#[test]
fn seeded_catalog_decades_are_sorted() {
    let s = seeded_session();
    let buckets = runner::books_by_decade(&s).unwrap();
    assert_eq!(buckets.first().and_then(|b| b.decade), Some(1810));
    assert!(buckets.windows(2).all(|w| w[0].decade < w[1].decade));
    assert_eq!(buckets.iter().map(|b| b.count).sum::<i64>(), 12);
}

#[test]
fn most_prolific_author_has_two_books() {
    let s = seeded_session();
    let top = runner::most_prolific_author(&s).unwrap().unwrap();
    assert_eq!(top.book_count, 2);
    assert!(matches!(top.author.as_deref(), Some("George Orwell" | "J.R.R. Tolkien")));
    let empty = session_with(&[]);
    assert!(runner::most_prolific_author(&empty).unwrap().is_none());
}

#[test]
fn json_pipeline_matches_builder_pipeline() {
    let s = seeded_session();
    let p = Pipeline::from_json(
        r#"[
            {"$match": {"in_stock": true}},
            {"$group": {"_id": "$genre", "avgPrice": {"$avg": "$price"}, "n": {"$sum": 1}}},
            {"$sort": {"n": -1, "_id": 1}},
            {"$limit": 2}
        ]"#,
    )
    .unwrap();
    let out = aggregate(s.collection(), &p);
    assert_eq!(out.len(), 2);
    assert_eq!(out[0].get_str("_id").unwrap(), "Fiction");
    assert_eq!(out[0].get_i32("n").unwrap(), 4);
    assert_eq!(out[1].get_str("_id").unwrap(), "Fantasy");
}

#[test]
fn invalid_stages_are_rejected_before_running() {
    for bad in [
        r#"[{"$group": {"_id": "$genre"}}]"#,
        r#"[{"$limit": 0}]"#,
        r#"[{"$sort": {}}]"#,
        r#"[{"$project": {}}]"#,
        r#"[{"$group": {"_id": "$genre", "$x": {"$sum": 1}}}]"#,
        r#"{"$limit": 1}"#,
    ] {
        assert!(Pipeline::from_json(bad).is_err(), "{bad}");
    }
}
