use crate::errors::DbError;
use bson::{Bson, Document as BsonDocument};

use super::types::{CmpOp, Filter, MAX_IN_SET, Order, Projection, SortSpec, UpdateDoc};

/// Parse a MongoDB-style filter document: `{genre: "Fantasy"}`,
/// `{published_year: {$gt: 2000}}`, `{$or: [...]}`. Sibling clauses are ANDed.
///
/// # Errors
/// Returns `DbError::QueryError` for unknown operators or malformed operands.
pub fn filter_from_document(doc: &BsonDocument) -> Result<Filter, DbError> {
    let mut clauses = Vec::with_capacity(doc.len());
    for (key, value) in doc {
        match key.as_str() {
            "$and" => clauses.push(Filter::And(sub_filters(key, value)?)),
            "$or" => clauses.push(Filter::Or(sub_filters(key, value)?)),
            "$nor" => clauses.push(Filter::Not(Box::new(Filter::Or(sub_filters(key, value)?)))),
            k if k.starts_with('$') => {
                return Err(DbError::QueryError(format!("unknown top-level operator {k}")));
            }
            field => clauses.push(field_clause(field, value)?),
        }
    }
    Ok(match clauses.len() {
        0 => Filter::True,
        1 => clauses.remove(0),
        _ => Filter::And(clauses),
    })
}

fn sub_filters(op: &str, value: &Bson) -> Result<Vec<Filter>, DbError> {
    let Bson::Array(items) = value else {
        return Err(DbError::QueryError(format!("{op} expects an array")));
    };
    if items.is_empty() {
        return Err(DbError::QueryError(format!("{op} expects a non-empty array")));
    }
    items
        .iter()
        .map(|item| match item {
            Bson::Document(d) => filter_from_document(d),
            other => Err(DbError::QueryError(format!("{op} entries must be documents, got {other}"))),
        })
        .collect()
}

fn is_operator_doc(d: &BsonDocument) -> bool {
    !d.is_empty() && d.keys().all(|k| k.starts_with('$'))
}

fn field_clause(field: &str, value: &Bson) -> Result<Filter, DbError> {
    match value {
        Bson::Document(ops) if is_operator_doc(ops) => operator_clause(field, ops),
        // a BSON regex value, e.g. extended JSON `$regularExpression`
        #[cfg(feature = "regex")]
        Bson::RegularExpression(re) => Ok(Filter::Regex {
            path: field.to_string(),
            pattern: re.pattern.as_str().to_string(),
            case_insensitive: re.options.as_str().contains('i'),
        }),
        #[cfg(not(feature = "regex"))]
        Bson::RegularExpression(_) => Err(DbError::QueryError(format!("regex on '{field}' needs the regex feature"))),
        other => Ok(Filter::Cmp { path: field.to_string(), op: CmpOp::Eq, value: other.clone() }),
    }
}

fn operator_clause(field: &str, ops: &BsonDocument) -> Result<Filter, DbError> {
    let path = field.to_string();
    let mut parts = Vec::with_capacity(ops.len());
    for (op, operand) in ops {
        let clause = match op.as_str() {
            "$eq" => Filter::Cmp { path: path.clone(), op: CmpOp::Eq, value: operand.clone() },
            "$ne" => Filter::Cmp { path: path.clone(), op: CmpOp::Ne, value: operand.clone() },
            "$gt" => Filter::Cmp { path: path.clone(), op: CmpOp::Gt, value: operand.clone() },
            "$gte" => Filter::Cmp { path: path.clone(), op: CmpOp::Gte, value: operand.clone() },
            "$lt" => Filter::Cmp { path: path.clone(), op: CmpOp::Lt, value: operand.clone() },
            "$lte" => Filter::Cmp { path: path.clone(), op: CmpOp::Lte, value: operand.clone() },
            "$in" | "$nin" => {
                let Bson::Array(values) = operand else {
                    return Err(DbError::QueryError(format!("{op} on '{field}' expects an array")));
                };
                let values: Vec<Bson> = values.iter().take(MAX_IN_SET).cloned().collect();
                if op == "$in" {
                    Filter::In { path: path.clone(), values }
                } else {
                    Filter::Nin { path: path.clone(), values }
                }
            }
            "$exists" => {
                let exists = match operand {
                    Bson::Boolean(b) => *b,
                    Bson::Int32(i) => *i != 0,
                    Bson::Int64(i) => *i != 0,
                    other => {
                        return Err(DbError::QueryError(format!("$exists expects a boolean, got {other}")));
                    }
                };
                Filter::Exists { path: path.clone(), exists }
            }
            "$not" => match operand {
                Bson::Document(inner) if is_operator_doc(inner) => {
                    Filter::Not(Box::new(operator_clause(field, inner)?))
                }
                _ => return Err(DbError::QueryError("$not expects an operator document".into())),
            },
            #[cfg(feature = "regex")]
            "$regex" => {
                let Bson::String(pattern) = operand else {
                    return Err(DbError::QueryError("$regex expects a string".into()));
                };
                let case_insensitive =
                    matches!(ops.get("$options"), Some(Bson::String(o)) if o.contains('i'));
                Filter::Regex { path: path.clone(), pattern: pattern.clone(), case_insensitive }
            }
            #[cfg(feature = "regex")]
            "$options" => continue,
            other => {
                return Err(DbError::QueryError(format!("unsupported operator {other} on '{field}'")));
            }
        };
        parts.push(clause);
    }
    match parts.len() {
        0 => Err(DbError::QueryError(format!("no operator to apply on '{field}'"))),
        1 => Ok(parts.remove(0)),
        _ => Ok(Filter::And(parts)),
    }
}

/// Render a filter back to MongoDB syntax, as shown in explain output.
#[must_use]
pub fn filter_to_document(filter: &Filter) -> BsonDocument {
    let list = |fs: &[Filter]| Bson::Array(fs.iter().map(|f| Bson::Document(filter_to_document(f))).collect());
    let mut out = BsonDocument::new();
    match filter {
        Filter::True => {}
        Filter::And(fs) => {
            out.insert("$and", list(fs));
        }
        Filter::Or(fs) => {
            out.insert("$or", list(fs));
        }
        Filter::Not(f) => {
            out.insert("$nor", list(std::slice::from_ref(f.as_ref())));
        }
        Filter::Exists { path, exists } => {
            out.insert(path.clone(), bson::doc! {"$exists": *exists});
        }
        Filter::In { path, values } => {
            out.insert(path.clone(), bson::doc! {"$in": values.clone()});
        }
        Filter::Nin { path, values } => {
            out.insert(path.clone(), bson::doc! {"$nin": values.clone()});
        }
        Filter::Cmp { path, op, value } => {
            let mut inner = BsonDocument::new();
            inner.insert(op.as_operator(), value.clone());
            out.insert(path.clone(), inner);
        }
        #[cfg(feature = "regex")]
        Filter::Regex { path, pattern, case_insensitive } => {
            let options = if *case_insensitive { "i" } else { "" };
            out.insert(path.clone(), bson::doc! {"$regex": pattern.clone(), "$options": options});
        }
    }
    out
}

/// Parse `{$set: {...}, $inc: {...}, $unset: {...}}`.
///
/// # Errors
/// Returns `DbError::QueryError` for unknown operators, non-numeric `$inc`
/// operands or an update that changes nothing.
pub fn update_from_document(doc: &BsonDocument) -> Result<UpdateDoc, DbError> {
    let mut out = UpdateDoc::default();
    for (op, operand) in doc {
        let Bson::Document(fields) = operand else {
            return Err(DbError::QueryError(format!("{op} expects a document")));
        };
        match op.as_str() {
            "$set" => {
                for (k, v) in fields.iter().take(128) {
                    out.set.push((k.clone(), v.clone()));
                }
            }
            "$inc" => {
                for (k, v) in fields.iter().take(128) {
                    let f = super::eval::as_f64(v)
                        .ok_or_else(|| DbError::QueryError("$inc requires numeric".into()))?;
                    out.inc.push((k.clone(), f));
                }
            }
            "$unset" => out.unset.extend(fields.keys().take(128).cloned()),
            other => return Err(DbError::QueryError(format!("unsupported update operator {other}"))),
        }
    }
    if out.set.is_empty() && out.inc.is_empty() && out.unset.is_empty() {
        return Err(DbError::QueryError("update document has no operators".into()));
    }
    Ok(out)
}

/// Parse `{title: 1, author: 1, _id: 0}`. Only inclusion projections are supported,
/// apart from suppressing `_id`.
///
/// # Errors
/// Returns `DbError::QueryError` for exclusions of fields other than `_id`.
pub fn projection_from_document(doc: &BsonDocument) -> Result<Projection, DbError> {
    let mut projection = Projection::include(Vec::<String>::new());
    for (field, flag) in doc {
        let on = match flag {
            Bson::Boolean(b) => *b,
            v => super::eval::as_f64(v)
                .map(|f| f != 0.0)
                .ok_or_else(|| DbError::QueryError(format!("projection flag for '{field}' must be 0/1")))?,
        };
        if field == "_id" {
            projection.include_id = on;
        } else if on {
            projection.fields.push(field.clone());
        } else {
            return Err(DbError::QueryError(format!("exclusion of '{field}' is not supported")));
        }
    }
    Ok(projection)
}

/// Parse `{price: -1, title: 1}`.
///
/// # Errors
/// Returns `DbError::QueryError` when a direction is not `1` or `-1`.
pub fn sort_from_document(doc: &BsonDocument) -> Result<Vec<SortSpec>, DbError> {
    doc.iter()
        .map(|(field, dir)| match super::eval::as_f64(dir) {
            Some(d) if d > 0.0 => Ok(SortSpec { field: field.clone(), order: Order::Asc }),
            Some(d) if d < 0.0 => Ok(SortSpec { field: field.clone(), order: Order::Desc }),
            _ => Err(DbError::QueryError(format!("sort direction for '{field}' must be 1 or -1"))),
        })
        .collect()
}

/// Parse JSON text into a BSON document (`{"genre": "Fantasy"}`).
///
/// # Errors
/// Returns an error if the text is not a JSON object.
pub fn document_from_json(json: &str) -> Result<BsonDocument, DbError> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return Ok(BsonDocument::new());
    }
    Ok(serde_json::from_str::<BsonDocument>(trimmed)?)
}

/// # Errors
/// Returns an error if the JSON string cannot be parsed into a filter structure.
pub fn parse_filter_json(json: &str) -> Result<Filter, DbError> {
    filter_from_document(&document_from_json(json)?)
}

/// # Errors
/// Returns an error if the JSON string cannot be parsed into an update structure.
pub fn parse_update_json(json: &str) -> Result<UpdateDoc, DbError> {
    update_from_document(&document_from_json(json)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn parse_equality_and_ranges() {
        let f = filter_from_document(&doc! {"genre": "Fantasy"}).unwrap();
        assert_eq!(f, Filter::eq("genre", "Fantasy"));
        let f = filter_from_document(&doc! {"in_stock": true, "published_year": {"$gt": 2010}}).unwrap();
        assert_eq!(f, Filter::And(vec![Filter::eq("in_stock", true), Filter::gt("published_year", 2010)]));
        assert_eq!(filter_from_document(&doc! {}).unwrap(), Filter::True);
    }

    #[test]
    fn embedded_documents_without_operators_are_equality() {
        let f = filter_from_document(&doc! {"publisher": {"city": "London"}}).unwrap();
        assert!(matches!(f, Filter::Cmp { op: CmpOp::Eq, .. }));
    }

    #[test]
    fn rejects_unknown_operators() {
        assert!(filter_from_document(&doc! {"price": {"$near": 3}}).is_err());
        assert!(filter_from_document(&doc! {"$where": "1"}).is_err());
        assert!(filter_from_document(&doc! {"$or": []}).is_err());
        assert!(update_from_document(&doc! {"$rename": {"a": "b"}}).is_err());
        assert!(update_from_document(&doc! {"$inc": {"price": "x"}}).is_err());
    }

    #[test]
    fn parse_json_filter_update_and_projection() {
        let f = parse_filter_json(r#"{"published_year": {"$gt": 2000}}"#).unwrap();
        assert!(matches!(f, Filter::Cmp { ref path, op: CmpOp::Gt, .. } if path == "published_year"));
        let u = parse_update_json(r#"{"$set": {"price": 17.99}}"#).unwrap();
        assert_eq!(u.set, vec![("price".to_string(), Bson::Double(17.99))]);
        let p = projection_from_document(&doc! {"title": 1, "author": 1, "price": 1, "_id": 0}).unwrap();
        assert_eq!(p.fields, vec!["title", "author", "price"]);
        assert!(!p.include_id);
        assert!(projection_from_document(&doc! {"title": 0}).is_err());
        let s = sort_from_document(&doc! {"price": -1}).unwrap();
        assert_eq!(s, vec![SortSpec::desc("price")]);
    }

    #[test]
    fn filter_renders_back_to_mongo_syntax() {
        let f = filter_from_document(&doc! {"author": "J.R.R. Tolkien", "published_year": {"$gte": 1937}}).unwrap();
        assert_eq!(
            filter_to_document(&f),
            doc! {"$and": [{"author": {"$eq": "J.R.R. Tolkien"}}, {"published_year": {"$gte": 1937}}]}
        );
        assert_eq!(filter_from_document(&filter_to_document(&f)).unwrap(), f);
    }

    #[cfg(feature = "regex")]
    #[test]
    fn regex_operator_and_value_forms() {
        let f = filter_from_document(&doc! {"title": {"$regex": "^the", "$options": "i"}}).unwrap();
        assert_eq!(f, Filter::Regex { path: "title".into(), pattern: "^the".into(), case_insensitive: true });
        assert_eq!(filter_to_document(&f), doc! {"title": {"$regex": "^the", "$options": "i"}});
        assert_eq!(filter_from_document(&filter_to_document(&f)).unwrap(), f);

        let f = parse_filter_json(r#"{"title": {"$regex": "Hobbit"}}"#).unwrap();
        assert!(matches!(f, Filter::Regex { case_insensitive: false, .. }));

        let f = parse_filter_json(r#"{"title": {"$regularExpression": {"pattern": "^the", "options": "i"}}}"#).unwrap();
        assert_eq!(f, Filter::Regex { path: "title".into(), pattern: "^the".into(), case_insensitive: true });

        assert!(filter_from_document(&doc! {"title": {"$regex": 5}}).is_err());
        assert!(filter_from_document(&doc! {"title": {"$options": "i"}}).is_err());
    }
}
