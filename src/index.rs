use crate::errors::DbError;
use crate::query::{as_f64, get_path};
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexDirection {
    Asc,
    Desc,
}

impl IndexDirection {
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Asc => 1,
            Self::Desc => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexKeySpec {
    pub field: String,
    pub direction: IndexDirection,
}

/// Name plus ordered key list of an index, e.g. `author_1_published_year_1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub keys: Vec<IndexKeySpec>,
}

impl IndexDescriptor {
    /// # Errors
    /// Returns `DbError::IndexError` for an empty key list or a repeated field.
    pub fn new(keys: Vec<IndexKeySpec>) -> Result<Self, DbError> {
        if keys.is_empty() {
            return Err(DbError::IndexError("index needs at least one key".into()));
        }
        let mut seen = BTreeSet::new();
        for k in &keys {
            if k.field.is_empty() || k.field.starts_with('$') {
                return Err(DbError::IndexError(format!("invalid index field '{}'", k.field)));
            }
            if !seen.insert(k.field.as_str()) {
                return Err(DbError::IndexError(format!("field '{}' repeated in index", k.field)));
            }
        }
        let name = keys
            .iter()
            .map(|k| format!("{}_{}", k.field, k.direction.as_i32()))
            .collect::<Vec<_>>()
            .join("_");
        Ok(Self { name, keys })
    }

    /// Parse a key document such as `{author: 1, published_year: 1}`.
    ///
    /// # Errors
    /// Returns `DbError::IndexError` when a direction is not `1` or `-1`.
    pub fn from_document(spec: &BsonDocument) -> Result<Self, DbError> {
        let mut keys = Vec::with_capacity(spec.len());
        for (field, dir) in spec {
            let direction = match dir {
                Bson::Int32(1) | Bson::Int64(1) => IndexDirection::Asc,
                Bson::Int32(-1) | Bson::Int64(-1) => IndexDirection::Desc,
                Bson::Double(d) if *d == 1.0 => IndexDirection::Asc,
                Bson::Double(d) if *d == -1.0 => IndexDirection::Desc,
                other => {
                    return Err(DbError::IndexError(format!(
                        "index direction for '{field}' must be 1 or -1, got {other}"
                    )));
                }
            };
            keys.push(IndexKeySpec { field: field.clone(), direction });
        }
        Self::new(keys)
    }

    #[must_use]
    pub fn fields(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.field.as_str()).collect()
    }

    #[must_use]
    pub fn key_pattern(&self) -> BsonDocument {
        let mut out = BsonDocument::new();
        for k in &self.keys {
            out.insert(k.field.clone(), k.direction.as_i32());
        }
        out
    }
}

/// One component of an index key. Variant order is the cross-type sort order;
/// `MinKey`/`MaxKey` only appear in scan bounds. `Other` holds values no
/// predicate can target (arrays, sub-documents, dates), keyed by their rendering.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKeyKind {
    MinKey,
    Null,
    Num(OrderedFloat<f64>),
    Str(String),
    Bool(bool),
    Other(String),
    MaxKey,
}

impl IndexKeyKind {
    /// Lowest key of the same type bracket.
    #[must_use]
    pub fn bracket_low(&self) -> Self {
        match self {
            Self::Num(_) => Self::Num(OrderedFloat(f64::NEG_INFINITY)),
            Self::Str(_) => Self::Str(String::new()),
            Self::Bool(_) => Self::Bool(false),
            other => other.clone(),
        }
    }

    /// Highest key of the same type bracket.
    #[must_use]
    pub fn bracket_high(&self) -> Bound<Self> {
        match self {
            Self::Num(_) => Bound::Included(Self::Num(OrderedFloat(f64::INFINITY))),
            Self::Str(_) => Bound::Excluded(Self::Bool(false)),
            Self::Bool(_) => Bound::Included(Self::Bool(true)),
            other => Bound::Included(other.clone()),
        }
    }
}

#[must_use]
pub fn key_from_bson(v: &Bson) -> Option<IndexKeyKind> {
    match v {
        Bson::Null => Some(IndexKeyKind::Null),
        Bson::String(s) => Some(IndexKeyKind::Str(s.clone())),
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_) => {
            as_f64(v).map(|f| IndexKeyKind::Num(OrderedFloat(f)))
        }
        Bson::Boolean(b) => Some(IndexKeyKind::Bool(*b)),
        _ => None,
    }
}

/// Key stored for a document value. Never fails, so every document gets an entry.
fn stored_key(v: &Bson) -> IndexKeyKind {
    key_from_bson(v).unwrap_or_else(|| IndexKeyKind::Other(v.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompoundKey(pub Vec<IndexKeyKind>);

/// Predicate on one indexed field, as extracted from a filter by the planner.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldPredicate {
    Eq(IndexKeyKind),
    Range { lower: Bound<IndexKeyKind>, upper: Bound<IndexKeyKind> },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexStats {
    pub keys: usize,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub build_time_ms: u64,
}

/// Result of an index scan: candidate ids plus the number of index entries visited.
#[derive(Debug, Clone, Default)]
pub struct IndexScan {
    pub index_name: String,
    pub ids: Vec<DocumentId>,
    pub keys_examined: usize,
}

#[derive(Debug, Clone)]
pub struct BTreeIndex {
    pub descriptor: IndexDescriptor,
    pub map: BTreeMap<CompoundKey, BTreeSet<DocumentId>>,
    pub stats: IndexStats,
}

impl BTreeIndex {
    #[must_use]
    pub const fn new(descriptor: IndexDescriptor) -> Self {
        Self { descriptor, map: BTreeMap::new(), stats: IndexStats { keys: 0, entries: 0, hits: 0, misses: 0, build_time_ms: 0 } }
    }

    /// Missing fields index as null.
    fn key_for(&self, doc: &BsonDocument) -> CompoundKey {
        CompoundKey(
            self.descriptor
                .keys
                .iter()
                .map(|k| get_path(doc, &k.field).map_or(IndexKeyKind::Null, stored_key))
                .collect(),
        )
    }

    pub fn insert(&mut self, doc: &BsonDocument, id: &DocumentId) {
        let k = self.key_for(doc);
        let set = self.map.entry(k).or_default();
        if set.insert(id.clone()) {
            self.stats.entries += 1;
        }
        self.stats.keys = self.map.len();
    }

    pub fn remove(&mut self, doc: &BsonDocument, id: &DocumentId) {
        let k = self.key_for(doc);
        if let Some(set) = self.map.get_mut(&k) {
            if set.remove(id) {
                self.stats.entries = self.stats.entries.saturating_sub(1);
            }
            if set.is_empty() {
                self.map.remove(&k);
            }
            self.stats.keys = self.map.len();
        }
    }

    /// Equality prefix length and whether a range follows it, or `None` when the
    /// leading field has no usable predicate.
    #[must_use]
    pub fn usable_prefix(&self, preds: &HashMap<String, FieldPredicate>) -> Option<(usize, bool)> {
        let mut eq_len = 0usize;
        for k in &self.descriptor.keys {
            match preds.get(&k.field) {
                Some(FieldPredicate::Eq(_)) => eq_len += 1,
                Some(FieldPredicate::Range { .. }) => return Some((eq_len, true)),
                None => break,
            }
        }
        if eq_len == 0 { None } else { Some((eq_len, false)) }
    }

    /// Scan the entries selected by an equality prefix followed by at most one range.
    pub fn scan(&mut self, preds: &HashMap<String, FieldPredicate>) -> IndexScan {
        let width = self.descriptor.keys.len();
        let mut prefix: Vec<IndexKeyKind> = Vec::new();
        let mut range: Option<(Bound<IndexKeyKind>, Bound<IndexKeyKind>)> = None;
        for k in &self.descriptor.keys {
            match preds.get(&k.field) {
                Some(FieldPredicate::Eq(v)) => prefix.push(v.clone()),
                Some(FieldPredicate::Range { lower, upper }) => {
                    range = Some((lower.clone(), upper.clone()));
                    break;
                }
                None => break,
            }
        }
        let (lower, upper) = scan_bounds(&prefix, range, width);
        let mut out = IndexScan { index_name: self.descriptor.name.clone(), ..IndexScan::default() };
        if bounds_are_empty(&lower, &upper) {
            self.stats.misses += 1;
            return out;
        }
        for (_k, set) in self.map.range((lower, upper)) {
            out.keys_examined += set.len();
            out.ids.extend(set.iter().cloned());
        }
        if out.ids.is_empty() {
            self.stats.misses += 1;
        } else {
            self.stats.hits += 1;
        }
        out
    }
}

fn pad(mut parts: Vec<IndexKeyKind>, width: usize, with: &IndexKeyKind) -> CompoundKey {
    while parts.len() < width {
        parts.push(with.clone());
    }
    CompoundKey(parts)
}

fn scan_bounds(
    prefix: &[IndexKeyKind],
    range: Option<(Bound<IndexKeyKind>, Bound<IndexKeyKind>)>,
    width: usize,
) -> (Bound<CompoundKey>, Bound<CompoundKey>) {
    let with = |v: &IndexKeyKind| {
        let mut p = prefix.to_vec();
        p.push(v.clone());
        p
    };
    match range {
        None => (
            Bound::Included(pad(prefix.to_vec(), width, &IndexKeyKind::MinKey)),
            Bound::Included(pad(prefix.to_vec(), width, &IndexKeyKind::MaxKey)),
        ),
        Some((lo, hi)) => {
            let lower = match lo {
                Bound::Included(v) => Bound::Included(pad(with(&v), width, &IndexKeyKind::MinKey)),
                Bound::Excluded(v) => Bound::Excluded(pad(with(&v), width, &IndexKeyKind::MaxKey)),
                Bound::Unbounded => Bound::Included(pad(prefix.to_vec(), width, &IndexKeyKind::MinKey)),
            };
            let upper = match hi {
                Bound::Included(v) => Bound::Included(pad(with(&v), width, &IndexKeyKind::MaxKey)),
                Bound::Excluded(v) => Bound::Excluded(pad(with(&v), width, &IndexKeyKind::MinKey)),
                Bound::Unbounded => Bound::Included(pad(prefix.to_vec(), width, &IndexKeyKind::MaxKey)),
            };
            (lower, upper)
        }
    }
}

/// `BTreeMap::range` panics on inverted or doubly-excluded equal bounds.
fn bounds_are_empty(lower: &Bound<CompoundKey>, upper: &Bound<CompoundKey>) -> bool {
    match (lower, upper) {
        (Bound::Included(a), Bound::Included(b)) => a > b,
        (Bound::Included(a) | Bound::Excluded(a), Bound::Excluded(b))
        | (Bound::Excluded(a), Bound::Included(b)) => a >= b,
        _ => false,
    }
}

#[derive(Debug, Default)]
pub struct IndexManager {
    pub indexes: HashMap<String, BTreeIndex>, // key: index name
}

impl IndexManager {
    #[must_use]
    pub fn new() -> Self {
        Self { indexes: HashMap::new() }
    }

    /// Returns `false` when an index with the same name already exists.
    pub fn create_index(&mut self, descriptor: IndexDescriptor) -> bool {
        if self.indexes.contains_key(&descriptor.name) {
            return false;
        }
        self.indexes.insert(descriptor.name.clone(), BTreeIndex::new(descriptor));
        true
    }

    pub fn drop_index(&mut self, name: &str) -> bool {
        self.indexes.remove(name).is_some()
    }

    #[must_use]
    pub fn descriptors(&self) -> Vec<IndexDescriptor> {
        let mut out: Vec<IndexDescriptor> =
            self.indexes.values().map(|i| i.descriptor.clone()).collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    /// Pick the index with the longest equality prefix (a trailing range counts
    /// as half a field); ties go to the lexically smallest name.
    #[must_use]
    pub fn choose(&self, preds: &HashMap<String, FieldPredicate>) -> Option<String> {
        let mut best: Option<(usize, &str)> = None;
        for (name, idx) in &self.indexes {
            if let Some((eq_len, has_range)) = idx.usable_prefix(preds) {
                let score = eq_len * 2 + usize::from(has_range);
                let better = match best {
                    None => true,
                    Some((s, n)) => score > s || (score == s && name.as_str() < n),
                };
                if better {
                    best = Some((score, name.as_str()));
                }
            }
        }
        best.map(|(_, n)| n.to_string())
    }

    pub fn scan(&mut self, name: &str, preds: &HashMap<String, FieldPredicate>) -> Option<IndexScan> {
        self.indexes.get_mut(name).map(|idx| idx.scan(preds))
    }
}

pub fn index_insert_all(mgr: &mut IndexManager, doc: &BsonDocument, id: &DocumentId) {
    for idx in mgr.indexes.values_mut() {
        idx.insert(doc, id);
    }
}

pub fn index_remove_all(mgr: &mut IndexManager, doc: &BsonDocument, id: &DocumentId) {
    for idx in mgr.indexes.values_mut() {
        idx.remove(doc, id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn num(v: f64) -> IndexKeyKind {
        IndexKeyKind::Num(OrderedFloat(v))
    }

    #[test]
    fn descriptor_names_follow_key_pattern() {
        let d = IndexDescriptor::from_document(&doc! {"author": 1, "published_year": -1}).unwrap();
        assert_eq!(d.name, "author_1_published_year_-1");
        assert_eq!(d.fields(), vec!["author", "published_year"]);
        assert!(IndexDescriptor::from_document(&doc! {}).is_err());
        assert!(IndexDescriptor::from_document(&doc! {"title": 2}).is_err());
    }

    #[test]
    fn compound_scan_uses_equality_prefix_then_range() {
        let d = IndexDescriptor::from_document(&doc! {"author": 1, "published_year": 1}).unwrap();
        let mut idx = BTreeIndex::new(d);
        let a = DocumentId::new();
        let b = DocumentId::new();
        let c = DocumentId::new();
        idx.insert(&doc! {"author": "Tolkien", "published_year": 1937}, &a);
        idx.insert(&doc! {"author": "Tolkien", "published_year": 1954}, &b);
        idx.insert(&doc! {"author": "Orwell", "published_year": 1949}, &c);

        let mut preds = HashMap::new();
        preds.insert("author".to_string(), FieldPredicate::Eq(IndexKeyKind::Str("Tolkien".into())));
        preds.insert("published_year".to_string(), FieldPredicate::Eq(num(1937.0)));
        let scan = idx.scan(&preds);
        assert_eq!(scan.ids, vec![a.clone()]);
        assert_eq!(scan.keys_examined, 1);

        preds.insert(
            "published_year".to_string(),
            FieldPredicate::Range { lower: Bound::Excluded(num(1940.0)), upper: Bound::Unbounded },
        );
        let scan = idx.scan(&preds);
        assert_eq!(scan.ids, vec![b]);
    }

    #[test]
    fn inverted_range_is_empty_not_a_panic() {
        let d = IndexDescriptor::from_document(&doc! {"price": 1}).unwrap();
        let mut idx = BTreeIndex::new(d);
        idx.insert(&doc! {"price": 5.0}, &DocumentId::new());
        let mut preds = HashMap::new();
        preds.insert(
            "price".to_string(),
            FieldPredicate::Range { lower: Bound::Excluded(num(5.0)), upper: Bound::Excluded(num(5.0)) },
        );
        assert!(idx.scan(&preds).ids.is_empty());
    }

    #[test]
    fn remove_drops_empty_keys() {
        let d = IndexDescriptor::from_document(&doc! {"title": 1}).unwrap();
        let mut idx = BTreeIndex::new(d);
        let id = DocumentId::new();
        let body = doc! {"title": "Emma"};
        idx.insert(&body, &id);
        assert_eq!(idx.stats.entries, 1);
        idx.remove(&body, &id);
        assert!(idx.map.is_empty());
        assert_eq!(idx.stats.keys, 0);
    }

    #[test]
    fn non_scalar_values_still_get_entries() {
        let d = IndexDescriptor::from_document(&doc! {"author": 1, "published_year": 1}).unwrap();
        let mut idx = BTreeIndex::new(d);
        let a = DocumentId::new();
        let b = DocumentId::new();
        idx.insert(&doc! {"author": "X", "published_year": 1937}, &a);
        let odd = doc! {"author": "X", "published_year": {"approx": 1937}};
        idx.insert(&odd, &b);
        assert_eq!(idx.stats.entries, 2);

        let mut preds = HashMap::new();
        preds.insert("author".to_string(), FieldPredicate::Eq(IndexKeyKind::Str("X".into())));
        assert_eq!(idx.scan(&preds).ids.len(), 2);
        preds.insert(
            "published_year".to_string(),
            FieldPredicate::Range { lower: Bound::Included(num(1900.0)), upper: num(1900.0).bracket_high() },
        );
        assert_eq!(idx.scan(&preds).ids, vec![a]);

        idx.remove(&odd, &b);
        assert_eq!(idx.stats.entries, 1);
    }

    #[test]
    fn chooser_prefers_longer_prefix() {
        let mut mgr = IndexManager::new();
        mgr.create_index(IndexDescriptor::from_document(&doc! {"author": 1}).unwrap());
        mgr.create_index(
            IndexDescriptor::from_document(&doc! {"author": 1, "published_year": 1}).unwrap(),
        );
        let mut preds = HashMap::new();
        preds.insert("author".to_string(), FieldPredicate::Eq(IndexKeyKind::Str("x".into())));
        assert_eq!(mgr.choose(&preds).as_deref(), Some("author_1"));
        preds.insert("published_year".to_string(), FieldPredicate::Eq(num(1.0)));
        assert_eq!(mgr.choose(&preds).as_deref(), Some("author_1_published_year_1"));
        assert!(!mgr.create_index(IndexDescriptor::from_document(&doc! {"author": 1}).unwrap()));
    }
}
