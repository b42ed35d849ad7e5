use crate::errors::DbError;
use crate::query::{Order, Projection, SortSpec};

/// `title,author,-_id` style projection list; `-_id` drops the id.
pub fn parse_projection(s: &str) -> Projection {
    let mut include_id = true;
    let fields: Vec<String> = s
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .filter(|f| {
            if *f == "-_id" {
                include_id = false;
                false
            } else {
                true
            }
        })
        .map(ToString::to_string)
        .collect();
    let p = Projection::include(fields);
    if include_id { p } else { p.without_id() }
}

/// Sort spec comma-separated: `-price,+title` or `price:desc,title:asc`.
///
/// # Errors
/// Returns `DbError::QueryError` for an unknown direction suffix.
pub fn parse_sort(s: &str) -> Result<Vec<SortSpec>, DbError> {
    let mut specs = Vec::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (order, field) = if let Some((field, dir)) = part.split_once(':') {
            let order = match dir.to_ascii_lowercase().as_str() {
                "asc" | "1" => Order::Asc,
                "desc" | "-1" => Order::Desc,
                other => return Err(DbError::QueryError(format!("unknown sort direction '{other}'"))),
            };
            (order, field)
        } else if let Some(rest) = part.strip_prefix('-') {
            (Order::Desc, rest)
        } else if let Some(rest) = part.strip_prefix('+') {
            (Order::Asc, rest)
        } else {
            (Order::Asc, part)
        };
        specs.push(SortSpec { field: field.to_string(), order });
    }
    Ok(specs)
}
