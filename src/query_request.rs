//! The fetch request the planner consumes: a root entity, an ordered list of
//! include paths with per-path modifiers, root-level operators, and an optional
//! projection.
//!
//! Everything here is already-validated *abstract* input from the query-authoring
//! layer — plain data, no behavior. Name resolution against the model catalog is
//! the planner's job, not the request's. `First`/`FirstOrDefault`/`Single` are
//! expressed by the authoring layer as `take(1)` / `take(2)`.

use serde::{Deserialize, Serialize};

/// A literal value appearing in a predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
}

/// Scalar expressions are deliberately closed: a column reference (path-relative
/// to the expression's anchor entity) or a literal. Root filters/orderings anchor
/// at the root entity; per-include filters/orderings anchor at the included
/// entity and may only reference its own columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScalarExpr {
    Column { path: Vec<String>, name: String },
    Literal(Literal),
}

impl ScalarExpr {
    /// Column on the anchor entity itself (empty path).
    pub fn column(name: impl Into<String>) -> Self {
        ScalarExpr::Column {
            path: Vec::new(),
            name: name.into(),
        }
    }

    pub fn literal(value: Literal) -> Self {
        ScalarExpr::Literal(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    Compare {
        lhs: ScalarExpr,
        op: CompareOp,
        rhs: ScalarExpr,
    },
    Like {
        expr: ScalarExpr,
        pattern: String,
    },
    IsNull(ScalarExpr),
    IsNotNull(ScalarExpr),
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn compare(lhs: ScalarExpr, op: CompareOp, rhs: ScalarExpr) -> Self {
        Predicate::Compare { lhs, op, rhs }
    }

    pub fn and(self, other: Predicate) -> Self {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Self {
        Predicate::Or(Box::new(self), Box::new(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub expr: ScalarExpr,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        SortKey {
            expr: ScalarExpr::column(column),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        SortKey {
            expr: ScalarExpr::column(column),
            direction: SortDirection::Desc,
        }
    }
}

/// One declared include: the navigation segments from the root (e.g.
/// `["Orders", "OrderDetails"]`) plus modifiers applying to the terminal
/// segment's related set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludePath {
    pub segments: Vec<String>,
    pub filter: Option<Predicate>,
    pub ordering: Vec<SortKey>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub distinct: bool,
}

impl IncludePath {
    /// Parse a dotted path like `"Orders.OrderDetails"` into segments.
    pub fn parse(path: &str) -> Self {
        IncludePath {
            segments: path.split('.').map(str::to_string).collect(),
            filter: None,
            ordering: Vec::new(),
            skip: None,
            take: None,
            distinct: false,
        }
    }

    pub fn filtered(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn ordered_by(mut self, key: SortKey) -> Self {
        self.ordering.push(key);
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    /// Dotted display form, used in error messages.
    pub fn dotted(&self) -> String {
        self.segments.join(".")
    }
}

/// A column requested by an explicit projection. `path` is empty for root
/// columns, otherwise the navigation segments leading to the owning entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionColumn {
    pub path: Vec<String>,
    pub column: String,
}

/// An explicit result shape. When present, the plan projects exactly these
/// columns; include branches whose key columns are projected away are pruned
/// from the plan (projection wins over include).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub columns: Vec<ProjectionColumn>,
}

impl Projection {
    pub fn root_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Projection {
            columns: columns
                .into_iter()
                .map(|c| ProjectionColumn {
                    path: Vec::new(),
                    column: c.into(),
                })
                .collect(),
        }
    }

    pub fn with(mut self, path: &[&str], column: impl Into<String>) -> Self {
        self.columns.push(ProjectionColumn {
            path: path.iter().map(|s| s.to_string()).collect(),
            column: column.into(),
        });
        self
    }
}

/// The complete fetch request: what to load and how the root set is restricted,
/// ordered, and paged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchQuery {
    pub root_entity: String,
    pub includes: Vec<IncludePath>,
    pub filter: Option<Predicate>,
    pub ordering: Vec<SortKey>,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub distinct: bool,
    pub projection: Option<Projection>,
    pub no_tracking: bool,
}

impl FetchQuery {
    pub fn new(root_entity: impl Into<String>) -> Self {
        FetchQuery {
            root_entity: root_entity.into(),
            includes: Vec::new(),
            filter: None,
            ordering: Vec::new(),
            skip: None,
            take: None,
            distinct: false,
            projection: None,
            no_tracking: false,
        }
    }

    /// Add an include by dotted path, e.g. `.include("Orders.OrderDetails")`.
    pub fn include(mut self, path: &str) -> Self {
        self.includes.push(IncludePath::parse(path));
        self
    }

    pub fn include_path(mut self, path: IncludePath) -> Self {
        self.includes.push(path);
        self
    }

    pub fn filtered(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn ordered_by(mut self, key: SortKey) -> Self {
        self.ordering.push(key);
        self
    }

    pub fn skip(mut self, n: u64) -> Self {
        self.skip = Some(n);
        self
    }

    pub fn take(mut self, n: u64) -> Self {
        self.take = Some(n);
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn select(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    pub fn no_tracking(mut self) -> Self {
        self.no_tracking = true;
        self
    }

    /// True when any operator restricts or reorders the root row set. Together
    /// with a collection include this is what forces the paged-subquery rewrite.
    pub fn restricts_root_rows(&self) -> bool {
        self.skip.is_some() || self.take.is_some() || self.distinct || !self.ordering.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotted_include_path() {
        let path = IncludePath::parse("Orders.OrderDetails.Product");
        assert_eq!(path.segments, vec!["Orders", "OrderDetails", "Product"]);
        assert_eq!(path.dotted(), "Orders.OrderDetails.Product");
    }

    #[test]
    fn builder_accumulates_includes_in_order() {
        let query = FetchQuery::new("Customer")
            .include("Orders")
            .include("Orders.OrderDetails");
        assert_eq!(query.includes.len(), 2);
        assert_eq!(query.includes[0].segments, vec!["Orders"]);
    }

    #[test]
    fn restricts_root_rows_covers_all_operators() {
        assert!(!FetchQuery::new("Customer").restricts_root_rows());
        assert!(FetchQuery::new("Customer").take(5).restricts_root_rows());
        assert!(FetchQuery::new("Customer").skip(2).restricts_root_rows());
        assert!(FetchQuery::new("Customer").distinct().restricts_root_rows());
        assert!(FetchQuery::new("Customer")
            .ordered_by(SortKey::asc("City"))
            .restricts_root_rows());
    }
}
