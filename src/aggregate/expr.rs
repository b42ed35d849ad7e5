use crate::errors::DbError;
use crate::query::{as_f64, get_path};
use bson::{Bson, Document as BsonDocument};

/// Aggregation expression evaluated against one document.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `"$published_year"`
    Field(String),
    Literal(Bson),
    Add(Vec<Expr>),
    Subtract(Box<Expr>, Box<Expr>),
    Multiply(Vec<Expr>),
    Mod(Box<Expr>, Box<Expr>),
    /// `{author: "$author", year: "$published_year"}`
    Object(Vec<(String, Expr)>),
}

impl Expr {
    pub fn field(path: impl Into<String>) -> Self {
        Self::Field(path.into())
    }

    pub fn lit(value: impl Into<Bson>) -> Self {
        Self::Literal(value.into())
    }

    #[must_use]
    pub fn subtract(a: Self, b: Self) -> Self {
        Self::Subtract(Box::new(a), Box::new(b))
    }

    #[must_use]
    pub fn modulo(a: Self, b: Self) -> Self {
        Self::Mod(Box::new(a), Box::new(b))
    }

    /// The decade of a year field: `year - (year mod 10)`.
    pub fn decade_of(path: impl Into<String>) -> Self {
        let path = path.into();
        Self::subtract(Self::field(path.clone()), Self::modulo(Self::field(path), Self::lit(10)))
    }

    /// Evaluate against `doc`. Missing fields and non-numeric arithmetic operands yield null.
    #[must_use]
    pub fn eval(&self, doc: &BsonDocument) -> Bson {
        match self {
            Self::Field(path) => get_path(doc, path).cloned().unwrap_or(Bson::Null),
            Self::Literal(v) => v.clone(),
            Self::Add(items) => fold_numeric(items, doc, 0.0, |acc, x| acc + x),
            Self::Multiply(items) => fold_numeric(items, doc, 1.0, |acc, x| acc * x),
            Self::Subtract(a, b) => {
                let (a, b) = (a.eval(doc), b.eval(doc));
                match (as_f64(&a), as_f64(&b)) {
                    (Some(x), Some(y)) => numeric_result(x - y, is_integral(&a) && is_integral(&b)),
                    _ => Bson::Null,
                }
            }
            Self::Mod(a, b) => {
                let (a, b) = (a.eval(doc), b.eval(doc));
                match (as_f64(&a), as_f64(&b)) {
                    (Some(x), Some(y)) if y != 0.0 => numeric_result(x % y, is_integral(&a) && is_integral(&b)),
                    _ => Bson::Null,
                }
            }
            Self::Object(fields) => {
                let mut out = BsonDocument::new();
                for (k, e) in fields {
                    out.insert(k.clone(), e.eval(doc));
                }
                Bson::Document(out)
            }
        }
    }
}

fn fold_numeric(items: &[Expr], doc: &BsonDocument, init: f64, f: impl Fn(f64, f64) -> f64) -> Bson {
    let mut acc = init;
    let mut integral = true;
    for e in items {
        let v = e.eval(doc);
        let Some(x) = as_f64(&v) else { return Bson::Null };
        integral &= is_integral(&v);
        acc = f(acc, x);
    }
    numeric_result(acc, integral)
}

pub(crate) const fn is_integral(v: &Bson) -> bool {
    matches!(v, Bson::Int32(_) | Bson::Int64(_))
}

/// Integer inputs keep an integer result (`1993 - 3` stays `Int32(1990)`).
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub(crate) fn numeric_result(value: f64, integral: bool) -> Bson {
    if integral && value.fract() == 0.0 {
        if value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX) {
            return Bson::Int32(value as i32);
        }
        if value >= i64::MIN as f64 && value <= i64::MAX as f64 {
            return Bson::Int64(value as i64);
        }
    }
    Bson::Double(value)
}

/// Parse a MongoDB expression: `"$field"`, `{$subtract: [a, b]}`, `{$mod: [a, b]}`,
/// `{$add: [...]}`, `{$multiply: [...]}`, `{$literal: v}`, an object of expressions,
/// or any other value as a literal.
///
/// # Errors
/// Returns `DbError::InvalidPipeline` for unknown operators or wrong arity.
pub fn parse_expr(value: &Bson) -> Result<Expr, DbError> {
    match value {
        Bson::String(s) if s.starts_with('$') => {
            let path = &s[1..];
            if path.is_empty() || path.starts_with('$') {
                return Err(DbError::InvalidPipeline(format!("invalid field path '{s}'")));
            }
            Ok(Expr::Field(path.to_string()))
        }
        Bson::Document(d) if d.len() == 1 && d.keys().all(|k| k.starts_with('$')) => {
            let Some((op, arg)) = d.iter().next() else {
                return Err(DbError::InvalidPipeline("empty expression".into()));
            };
            if op == "$literal" {
                return Ok(Expr::Literal(arg.clone()));
            }
            let args = match arg {
                Bson::Array(items) => items.iter().map(parse_expr).collect::<Result<Vec<_>, _>>()?,
                other => vec![parse_expr(other)?],
            };
            match op.as_str() {
                "$add" | "$multiply" if args.is_empty() => {
                    Err(DbError::InvalidPipeline(format!("{op} expects at least one argument")))
                }
                "$add" => Ok(Expr::Add(args)),
                "$multiply" => Ok(Expr::Multiply(args)),
                "$subtract" | "$mod" => {
                    let [a, b]: [Expr; 2] = args
                        .try_into()
                        .map_err(|_| DbError::InvalidPipeline(format!("{op} expects exactly two arguments")))?;
                    Ok(if op == "$subtract" { Expr::subtract(a, b) } else { Expr::modulo(a, b) })
                }
                other => Err(DbError::InvalidPipeline(format!("unsupported expression operator {other}"))),
            }
        }
        Bson::Document(d) if d.keys().any(|k| k.starts_with('$')) => {
            Err(DbError::InvalidPipeline("expression objects take exactly one operator".into()))
        }
        Bson::Document(d) => Ok(Expr::Object(
            d.iter().map(|(k, v)| Ok((k.clone(), parse_expr(v)?))).collect::<Result<_, DbError>>()?,
        )),
        other => Ok(Expr::Literal(other.clone())),
    }
}
