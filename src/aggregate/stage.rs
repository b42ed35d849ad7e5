use crate::errors::DbError;
use crate::query::{Filter, SortSpec, filter_from_document, sort_from_document};
use bson::{Bson, Document as BsonDocument};

use super::expr::{Expr, parse_expr};

#[derive(Debug, Clone, PartialEq)]
pub enum Accumulator {
    Sum(Expr),
    Avg(Expr),
    Min(Expr),
    Max(Expr),
    First(Expr),
}

impl Accumulator {
    /// `{$sum: 1}`
    #[must_use]
    pub fn count() -> Self {
        Self::Sum(Expr::lit(1))
    }

    /// # Errors
    /// Returns `DbError::InvalidPipeline` unless `spec` is a single known accumulator operator.
    pub fn from_document(spec: &BsonDocument) -> Result<Self, DbError> {
        let mut it = spec.iter();
        let (Some((op, arg)), None) = (it.next(), it.next()) else {
            return Err(DbError::InvalidPipeline("accumulator must have exactly one operator".into()));
        };
        let e = parse_expr(arg)?;
        match op.as_str() {
            "$sum" => Ok(Self::Sum(e)),
            "$avg" => Ok(Self::Avg(e)),
            "$min" => Ok(Self::Min(e)),
            "$max" => Ok(Self::Max(e)),
            "$first" => Ok(Self::First(e)),
            other => Err(DbError::InvalidPipeline(format!("unknown accumulator {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupStage {
    key: Expr,
    accumulators: Vec<(String, Accumulator)>,
}

impl GroupStage {
    /// # Errors
    /// Fails without accumulators, or when an output name is empty, `_id`,
    /// `$`-prefixed, dotted or repeated.
    pub fn new(key: Expr, accumulators: Vec<(String, Accumulator)>) -> Result<Self, DbError> {
        if accumulators.is_empty() {
            return Err(DbError::InvalidPipeline("$group needs at least one accumulator".into()));
        }
        for (i, (name, _)) in accumulators.iter().enumerate() {
            if name.is_empty() || name == "_id" || name.starts_with('$') || name.contains('.') {
                return Err(DbError::InvalidPipeline(format!("invalid $group output name '{name}'")));
            }
            if accumulators[..i].iter().any(|(n, _)| n == name) {
                return Err(DbError::InvalidPipeline(format!("duplicate $group output name '{name}'")));
            }
        }
        Ok(Self { key, accumulators })
    }

    #[must_use]
    pub const fn key(&self) -> &Expr {
        &self.key
    }

    #[must_use]
    pub fn accumulators(&self) -> &[(String, Accumulator)] {
        &self.accumulators
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectField {
    Include,
    Compute(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectStage {
    fields: Vec<(String, ProjectField)>,
    include_id: bool,
}

impl ProjectStage {
    /// # Errors
    /// Fails when no field is projected.
    pub fn new(fields: Vec<(String, ProjectField)>, include_id: bool) -> Result<Self, DbError> {
        if fields.is_empty() {
            return Err(DbError::InvalidPipeline("$project needs at least one field".into()));
        }
        Ok(Self { fields, include_id })
    }

    #[must_use]
    pub fn fields(&self) -> &[(String, ProjectField)] {
        &self.fields
    }

    #[must_use]
    pub const fn include_id(&self) -> bool {
        self.include_id
    }
}

/// A pipeline stage. Construct through the validating helpers on `Stage`.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Group(GroupStage),
    Sort(Vec<SortSpec>),
    Limit(usize),
    Project(ProjectStage),
}

impl Stage {
    #[must_use]
    pub const fn matching(filter: Filter) -> Self {
        Self::Match(filter)
    }

    /// # Errors
    /// See [`GroupStage::new`].
    pub fn group(key: Expr, accumulators: Vec<(String, Accumulator)>) -> Result<Self, DbError> {
        GroupStage::new(key, accumulators).map(Self::Group)
    }

    /// # Errors
    /// Fails on an empty sort specification.
    pub fn sort(keys: Vec<SortSpec>) -> Result<Self, DbError> {
        if keys.is_empty() {
            return Err(DbError::InvalidPipeline("$sort needs at least one key".into()));
        }
        Ok(Self::Sort(keys))
    }

    /// # Errors
    /// Fails when `n` is zero.
    pub fn limit(n: usize) -> Result<Self, DbError> {
        if n == 0 {
            return Err(DbError::InvalidPipeline("$limit must be positive".into()));
        }
        Ok(Self::Limit(n))
    }

    /// # Errors
    /// See [`ProjectStage::new`].
    pub fn project(fields: Vec<(String, ProjectField)>, include_id: bool) -> Result<Self, DbError> {
        ProjectStage::new(fields, include_id).map(Self::Project)
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Match(_) => "$match",
            Self::Group(_) => "$group",
            Self::Sort(_) => "$sort",
            Self::Limit(_) => "$limit",
            Self::Project(_) => "$project",
        }
    }

    /// Parse one MongoDB stage document such as `{$group: {_id: "$genre", avg: {$avg: "$price"}}}`.
    ///
    /// # Errors
    /// Returns `DbError::InvalidPipeline` (or `QueryError` for a bad `$match`) when malformed.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_document(doc: &BsonDocument) -> Result<Self, DbError> {
        let mut it = doc.iter();
        let (Some((name, body)), None) = (it.next(), it.next()) else {
            return Err(DbError::InvalidPipeline("a stage must have exactly one key".into()));
        };
        match (name.as_str(), body) {
            ("$match", Bson::Document(f)) => Ok(Self::matching(filter_from_document(f)?)),
            ("$group", Bson::Document(g)) => {
                let key = g
                    .get("_id")
                    .ok_or_else(|| DbError::InvalidPipeline("$group requires an _id".into()))?;
                let key = parse_expr(key)?;
                let mut accumulators = Vec::with_capacity(g.len().saturating_sub(1));
                for (out, spec) in g.iter().filter(|(k, _)| k.as_str() != "_id") {
                    let Bson::Document(spec) = spec else {
                        return Err(DbError::InvalidPipeline(format!("accumulator '{out}' must be a document")));
                    };
                    accumulators.push((out.clone(), Accumulator::from_document(spec)?));
                }
                Self::group(key, accumulators)
            }
            ("$sort", Bson::Document(s)) => {
                Self::sort(sort_from_document(s).map_err(|e| DbError::InvalidPipeline(e.to_string()))?)
            }
            ("$limit", n) => {
                let n = match n {
                    Bson::Int32(i) => i64::from(*i),
                    Bson::Int64(i) => *i,
                    Bson::Double(f) if f.fract() == 0.0 => *f as i64,
                    other => return Err(DbError::InvalidPipeline(format!("$limit expects an integer, got {other}"))),
                };
                Self::limit(usize::try_from(n).map_err(|_| DbError::InvalidPipeline("$limit must be positive".into()))?)
            }
            ("$project", Bson::Document(p)) => {
                let mut include_id = true;
                let mut fields = Vec::with_capacity(p.len());
                for (field, spec) in p {
                    let flag = match spec {
                        Bson::Boolean(b) => Some(*b),
                        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
                            crate::query::as_f64(spec).map(|f| f != 0.0)
                        }
                        _ => None,
                    };
                    match (field.as_str(), flag) {
                        ("_id", Some(on)) => include_id = on,
                        (_, Some(true)) => fields.push((field.clone(), ProjectField::Include)),
                        (_, Some(false)) => {
                            return Err(DbError::InvalidPipeline(format!("exclusion of '{field}' is not supported")));
                        }
                        (_, None) => fields.push((field.clone(), ProjectField::Compute(parse_expr(spec)?))),
                    }
                }
                Self::project(fields, include_id)
            }
            (other @ ("$match" | "$group" | "$sort" | "$project"), _) => {
                Err(DbError::InvalidPipeline(format!("{other} expects a document")))
            }
            (other, _) => Err(DbError::InvalidPipeline(format!("unsupported stage {other}"))),
        }
    }
}

/// An ordered list of validated stages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    #[must_use]
    pub const fn new() -> Self {
        Self { stages: Vec::new() }
    }

    #[must_use]
    pub fn then(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// # Errors
    /// Fails on the first malformed stage.
    pub fn from_documents(docs: &[BsonDocument]) -> Result<Self, DbError> {
        docs.iter()
            .map(Stage::from_document)
            .collect::<Result<Vec<_>, _>>()
            .map(|stages| Self { stages })
    }

    /// Parse a JSON array of stage documents.
    ///
    /// # Errors
    /// Fails when the text is not an array of objects or a stage is malformed.
    pub fn from_json(json: &str) -> Result<Self, DbError> {
        let docs: Vec<BsonDocument> = serde_json::from_str(json.trim())?;
        Self::from_documents(&docs)
    }
}
