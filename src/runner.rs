//! The fixed bookstore query sequence. Every operation takes the session
//! explicitly and returns typed results; `run_all` executes them in order.

use crate::Session;
use crate::aggregate::{Accumulator, Expr, Pipeline, Stage, aggregate};
use crate::catalog::{Book, BookView};
use crate::errors::DbError;
use crate::index::IndexDescriptor;
use crate::query::{
    CmpOp, DeleteReport, ExplainReport, Filter, FindOptions, Order, Projection, SortSpec, UpdateDoc,
    UpdateReport, explain, filter_from_document, find_docs,
};
use bson::{Document as BsonDocument, doc};
use serde::{Deserialize, Serialize};
use std::io::Write;

pub const FANTASY_GENRE: &str = "Fantasy";
pub const RECENT_YEAR: i32 = 2000;
pub const TOLKIEN: &str = "J.R.R. Tolkien";
pub const REPRICED_TITLE: &str = "The Hobbit";
pub const NEW_PRICE: f64 = 17.99;
pub const DELETED_TITLE: &str = "The Alchemist";
pub const IN_STOCK_YEAR: i32 = 2010;
pub const PAGE_SIZE: usize = 5;
pub const PAGE_SKIP: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreAverage {
    #[serde(rename = "_id")]
    pub genre: Option<String>,
    #[serde(rename = "avgPrice")]
    pub avg_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
    #[serde(rename = "_id")]
    pub author: Option<String>,
    #[serde(rename = "bookCount")]
    pub book_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecadeCount {
    #[serde(rename = "_id")]
    pub decade: Option<i32>,
    pub count: i64,
}

fn find_books(session: &Session, filter: &Filter, opts: &FindOptions) -> Result<Vec<Book>, DbError> {
    find_docs(session.collection(), filter, opts).into_bodies().iter().map(Book::from_document).collect()
}

fn decode_all<T: serde::de::DeserializeOwned>(docs: Vec<BsonDocument>) -> Result<Vec<T>, DbError> {
    docs.into_iter().map(|d| Ok(bson::deserialize_from_document(d)?)).collect()
}

/// `{genre: <genre>}`
///
/// # Errors
/// Fails if a stored document is not a valid book.
pub fn find_by_genre(session: &Session, genre: &str) -> Result<Vec<Book>, DbError> {
    find_books(session, &Filter::eq("genre", genre), &FindOptions::default())
}

/// `{published_year: {$gt: <year>}}` (strictly later).
///
/// # Errors
/// Fails if a stored document is not a valid book.
pub fn find_published_after(session: &Session, year: i32) -> Result<Vec<Book>, DbError> {
    find_books(session, &Filter::gt("published_year", year), &FindOptions::default())
}

/// # Errors
/// Fails if a stored document is not a valid book.
pub fn find_by_author(session: &Session, author: &str) -> Result<Vec<Book>, DbError> {
    find_books(session, &Filter::eq("author", author), &FindOptions::default())
}

/// `$set` the price of the first book with `title`.
///
/// # Errors
/// Currently infallible; kept fallible like the other operations.
pub fn update_price(session: &Session, title: &str, price: f64) -> Result<UpdateReport, DbError> {
    Ok(crate::query::update_one(session.collection(), &Filter::eq("title", title), &UpdateDoc::set("price", price)))
}

/// Delete the first book with `title`.
///
/// # Errors
/// Currently infallible; kept fallible like the other operations.
pub fn delete_by_title(session: &Session, title: &str) -> Result<DeleteReport, DbError> {
    Ok(crate::query::delete_one(session.collection(), &Filter::eq("title", title)))
}

/// `{in_stock: true, published_year: {$gt: <year>}}`
///
/// # Errors
/// Fails if a stored document is not a valid book.
pub fn find_in_stock_after(session: &Session, year: i32) -> Result<Vec<Book>, DbError> {
    let filter = Filter::and(vec![Filter::eq("in_stock", true), Filter::cmp("published_year", CmpOp::Gt, year)]);
    find_books(session, &filter, &FindOptions::default())
}

/// Every book reduced to title, author and price, without `_id`.
///
/// # Errors
/// Fails if a projected field has the wrong type.
pub fn projected_titles(session: &Session) -> Result<Vec<BookView>, DbError> {
    let opts = FindOptions {
        projection: Some(Projection::include(["title", "author", "price"]).without_id()),
        ..FindOptions::default()
    };
    find_docs(session.collection(), &Filter::True, &opts).into_bodies().iter().map(BookView::from_document).collect()
}

/// # Errors
/// Fails if a stored document is not a valid book.
pub fn sorted_by_price(session: &Session, order: Order) -> Result<Vec<Book>, DbError> {
    let opts = FindOptions { sort: Some(vec![SortSpec { field: "price".into(), order }]), ..FindOptions::default() };
    find_books(session, &Filter::True, &opts)
}

/// Natural order, skipping `skip` and returning at most `limit` books.
///
/// # Errors
/// Fails if a stored document is not a valid book.
pub fn paginate(session: &Session, skip: usize, limit: usize) -> Result<Vec<Book>, DbError> {
    let opts = FindOptions { skip: Some(skip), limit: Some(limit), ..FindOptions::default() };
    find_books(session, &Filter::True, &opts)
}

/// One record per genre with the mean price, in first-seen genre order.
///
/// # Errors
/// Fails if the pipeline cannot be built or its output does not decode.
pub fn average_price_by_genre(session: &Session) -> Result<Vec<GenreAverage>, DbError> {
    let pipeline = Pipeline::new()
        .then(Stage::group(Expr::field("genre"), vec![("avgPrice".into(), Accumulator::Avg(Expr::field("price")))])?);
    decode_all(aggregate(session.collection(), &pipeline))
}

/// The author with the most books; ties keep first-seen order.
///
/// # Errors
/// Fails if the pipeline cannot be built or its output does not decode.
pub fn most_prolific_author(session: &Session) -> Result<Option<AuthorCount>, DbError> {
    let pipeline = Pipeline::new()
        .then(Stage::group(Expr::field("author"), vec![("bookCount".into(), Accumulator::count())])?)
        .then(Stage::sort(vec![SortSpec::desc("bookCount")])?)
        .then(Stage::limit(1)?);
    Ok(decode_all(aggregate(session.collection(), &pipeline))?.into_iter().next())
}

/// Book counts per decade (`year - year % 10`), ascending.
///
/// # Errors
/// Fails if the pipeline cannot be built or its output does not decode.
pub fn books_by_decade(session: &Session) -> Result<Vec<DecadeCount>, DbError> {
    let pipeline = Pipeline::new()
        .then(Stage::group(Expr::decade_of("published_year"), vec![("count".into(), Accumulator::count())])?)
        .then(Stage::sort(vec![SortSpec::asc("_id")])?);
    decode_all(aggregate(session.collection(), &pipeline))
}

/// Create an index from a key document such as `{author: 1, published_year: 1}`.
///
/// # Errors
/// Returns `DbError::IndexError` for an invalid key document.
pub fn create_index(session: &Session, keys: &BsonDocument) -> Result<String, DbError> {
    Ok(session.collection().create_index(IndexDescriptor::from_document(keys)?))
}

/// Execution statistics for a find with `filter`.
///
/// # Errors
/// Returns `DbError::QueryError` for a malformed filter.
pub fn explain_query(session: &Session, filter: &BsonDocument) -> Result<ExplainReport, DbError> {
    Ok(explain(session.collection(), session.namespace(), &filter_from_document(filter)?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Human,
    Json,
}

/// One printed step of the sequence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutput {
    pub label: String,
    pub result: serde_json::Value,
}

impl StepOutput {
    /// # Errors
    /// Fails if `result` cannot be rendered as JSON.
    pub fn new(label: &str, result: &impl Serialize) -> Result<Self, DbError> {
        Ok(Self { label: label.to_string(), result: serde_json::to_value(result)? })
    }

    /// # Errors
    /// Returns an I/O or JSON error if writing fails.
    pub fn write_to(&self, out: &mut impl Write, mode: OutputMode) -> Result<(), DbError> {
        match mode {
            OutputMode::Human => writeln!(out, "{}\n{}", self.label, serde_json::to_string_pretty(&self.result)?)?,
            OutputMode::Json => writeln!(out, "{}", serde_json::to_string(self)?)?,
        }
        Ok(())
    }
}

/// Run the whole sequence in order, printing each step as it completes.
/// The first failure aborts the run.
///
/// # Errors
/// Propagates the first operation or output error.
pub fn run_all(session: &Session, out: &mut impl Write, mode: OutputMode) -> Result<Vec<StepOutput>, DbError> {
    let mut steps = Vec::new();
    let mut emit = |step: StepOutput| -> Result<(), DbError> {
        step.write_to(out, mode)?;
        steps.push(step);
        Ok(())
    };
    log::info!("running query sequence against {}", session.namespace());

    emit(StepOutput::new("Fantasy books:", &find_by_genre(session, FANTASY_GENRE)?)?)?;
    emit(StepOutput::new("Books published after 2000:", &find_published_after(session, RECENT_YEAR)?)?)?;
    emit(StepOutput::new("Books by J.R.R. Tolkien:", &find_by_author(session, TOLKIEN)?)?)?;
    emit(StepOutput::new("Updated price for The Hobbit", &update_price(session, REPRICED_TITLE, NEW_PRICE)?)?)?;
    emit(StepOutput::new("Deleted 'The Alchemist'", &delete_by_title(session, DELETED_TITLE)?)?)?;
    emit(StepOutput::new("In-stock books published after 2010:", &find_in_stock_after(session, IN_STOCK_YEAR)?)?)?;
    emit(StepOutput::new("Books with projected fields:", &projected_titles(session)?)?)?;
    emit(StepOutput::new("Books sorted by price (ascending):", &sorted_by_price(session, Order::Asc)?)?)?;
    emit(StepOutput::new("Books sorted by price (descending):", &sorted_by_price(session, Order::Desc)?)?)?;
    emit(StepOutput::new("Page 2 results (5 items):", &paginate(session, PAGE_SKIP, PAGE_SIZE)?)?)?;
    emit(StepOutput::new("Average price by genre:", &average_price_by_genre(session)?)?)?;
    emit(StepOutput::new("Author with most books:", &most_prolific_author(session)?.into_iter().collect::<Vec<_>>())?)?;
    emit(StepOutput::new("Books by publication decade:", &books_by_decade(session)?)?)?;
    let created = [create_index(session, &doc! {"title": 1})?, create_index(session, &doc! {"author": 1, "published_year": 1})?];
    emit(StepOutput::new("Indexes created on title and author+published_year", &created)?)?;
    emit(StepOutput::new(
        "Execution stats for title query:",
        &explain_query(session, &doc! {"title": REPRICED_TITLE})?,
    )?)?;
    emit(StepOutput::new(
        "Execution stats for author+year query:",
        &explain_query(session, &doc! {"author": TOLKIEN, "published_year": 1937})?,
    )?)?;
    Ok(steps)
}
