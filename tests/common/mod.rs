#![allow(dead_code)]

use bookstore::catalog::{Book, sample_catalog, seed_collection};
use bookstore::{Database, Session};

pub fn seeded_session() -> Session {
    let db = Database::open_in_memory("plp_bookstore");
    let session = Session::connect(&db, "books");
    seed_collection(session.collection(), &sample_catalog().unwrap(), false).unwrap();
    session
}

pub fn book(title: &str, genre: &str, year: i32, price: f64) -> Book {
    Book {
        title: title.into(),
        author: format!("Author of {title}"),
        genre: genre.into(),
        published_year: year,
        price,
        in_stock: true,
    }
}

pub fn session_with(books: &[Book]) -> Session {
    let db = Database::open_in_memory("plp_bookstore");
    let session = Session::connect(&db, "books");
    seed_collection(session.collection(), books, false).unwrap();
    session
}

pub fn titles(books: &[Book]) -> Vec<&str> {
    books.iter().map(|b| b.title.as_str()).collect()
}
