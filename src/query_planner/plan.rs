//! The abstract query plan: the planner's finished output.
//!
//! A plan is consumed purely structurally — the SQL renderer must never need to
//! re-derive join kinds, aliases, or ordering, and the row-to-object stitcher
//! reads the column-run annotations to detect entity boundaries via key-changed
//! comparisons between successive rows. Everything a consumer needs is resolved
//! and frozen here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::query_request::{CompareOp, Literal, SortDirection};

/// A column reference or literal resolved against plan aliases. The planner
/// converts request expressions (navigation-path relative) into this form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanExpr {
    Column { alias: String, column: String },
    Literal(Literal),
}

impl PlanExpr {
    pub fn column(alias: impl Into<String>, column: impl Into<String>) -> Self {
        PlanExpr::Column {
            alias: alias.into(),
            column: column.into(),
        }
    }
}

/// Predicates with every column resolved to an `alias.column` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlanPredicate {
    Compare {
        lhs: PlanExpr,
        op: CompareOp,
        rhs: PlanExpr,
    },
    Like {
        expr: PlanExpr,
        pattern: String,
    },
    IsNull(PlanExpr),
    IsNotNull(PlanExpr),
    And(Box<PlanPredicate>, Box<PlanPredicate>),
    Or(Box<PlanPredicate>, Box<PlanPredicate>),
    Not(Box<PlanPredicate>),
}

/// Join kinds are a tagged variant, not a hierarchy: the kind is chosen per
/// navigation edge (required reference ⇒ Inner, optional reference and every
/// collection ⇒ LeftOuter) and is never inherited or demoted from the parent
/// edge. Cross is part of the plan contract; the include translator itself
/// only emits Inner and LeftOuter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    Cross,
}

/// Per-parent pagination of a related set (filtered-include skip/take). Stated
/// structurally: the renderer decides how to realize it (e.g. ROW_NUMBER
/// partitioned by `partition_by`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionLimit {
    pub partition_by: Vec<String>,
    pub ordering: Vec<OrderingItem>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// What the right side of a join ranges over. A bare table when no per-include
/// modifiers apply; otherwise the table pre-restricted *before* the join so
/// LEFT OUTER semantics stay correct (filter before join, never after).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinSource {
    pub schema: String,
    pub table: String,
    pub pre_filter: Option<PlanPredicate>,
    pub distinct: bool,
    pub partition_limit: Option<PartitionLimit>,
}

impl JoinSource {
    pub fn table(schema: impl Into<String>, table: impl Into<String>) -> Self {
        JoinSource {
            schema: schema.into(),
            table: table.into(),
            pre_filter: None,
            distinct: false,
            partition_limit: None,
        }
    }

    pub fn is_plain_table(&self) -> bool {
        self.pre_filter.is_none() && !self.distinct && self.partition_limit.is_none()
    }
}

/// One join clause. `on` pairs left columns with right columns positionally;
/// `right_alias` is unique within its plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinClause {
    pub left_alias: String,
    pub right_alias: String,
    pub kind: JoinKind,
    pub source: JoinSource,
    /// Equality pairs: (column on `left_alias`, column on `right_alias`).
    pub on: Vec<(String, String)>,
}

/// Where the plan's root rows come from: the raw root table, or the paged/
/// ordered derived table produced by the pagination rewrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RootSource {
    Table {
        schema: String,
        table: String,
        alias: String,
    },
    Derived {
        alias: String,
        plan: Box<AbstractQueryPlan>,
    },
}

impl RootSource {
    pub fn alias(&self) -> &str {
        match self {
            RootSource::Table { alias, .. } => alias,
            RootSource::Derived { alias, .. } => alias,
        }
    }
}

/// One output column: its source, its collision-free output name, and the
/// navigation path it belongs to (empty path = the root entity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedColumn {
    pub source_alias: String,
    pub expr: ProjectedExpr,
    pub output_name: String,
    pub navigation: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectedExpr {
    /// A plain column of the source.
    Column(String),
    /// A synthesized expression (e.g. an ordering expression re-exposed by the
    /// pagination rewrite under an output name like "c").
    Expr(PlanExpr),
}

/// A contiguous run of projected columns belonging to one navigation level,
/// annotated for the stitcher: `key_ordinals` are absolute projection indexes
/// of this level's key columns, the ones compared row-over-row to detect
/// entity boundaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRun {
    pub navigation: Vec<String>,
    /// Alias of the source this run reads from — unique per plan, so it also
    /// disambiguates duplicate include branches with identical paths.
    pub alias: String,
    pub entity: String,
    pub start: usize,
    pub len: usize,
    pub key_ordinals: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderingItem {
    pub expr: PlanExpr,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pagination {
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// A single finalized query: root source, ordered joins, depth-first
/// projection with stitching runs, restriction, total ordering, pagination,
/// and distinct-ness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbstractQueryPlan {
    pub root: RootSource,
    pub joins: Vec<JoinClause>,
    pub projection: Vec<ProjectedColumn>,
    pub column_runs: Vec<ColumnRun>,
    pub restriction: Option<PlanPredicate>,
    pub ordering: Vec<OrderingItem>,
    pub pagination: Option<Pagination>,
    pub distinct: bool,
    pub no_tracking: bool,
}

impl AbstractQueryPlan {
    /// Every alias visible at this plan's level (root + join right sides).
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.root.alias()).chain(self.joins.iter().map(|j| j.right_alias.as_str()))
    }
}

/// An ordered set of split plans. The first plan produces the root rows (plus
/// reference data); each subsequent plan correlates back to the same root row
/// set and carries one collection branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitQueryPlan {
    pub plans: Vec<AbstractQueryPlan>,
}

/// The compilation result: one combined plan, or a split sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryPlanSet {
    Single(AbstractQueryPlan),
    Split(SplitQueryPlan),
}

impl QueryPlanSet {
    pub fn plans(&self) -> &[AbstractQueryPlan] {
        match self {
            QueryPlanSet::Single(plan) => std::slice::from_ref(plan),
            QueryPlanSet::Split(split) => &split.plans,
        }
    }
}

// ============================================================================
// Display — readable plan trees for logs and test failure output
// ============================================================================

impl fmt::Display for PlanExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanExpr::Column { alias, column } => write!(f, "{alias}.{column}"),
            PlanExpr::Literal(lit) => match lit {
                Literal::Int(v) => write!(f, "{v}"),
                Literal::Float(v) => write!(f, "{v}"),
                Literal::Str(v) => write!(f, "'{v}'"),
                Literal::Bool(v) => write!(f, "{v}"),
                Literal::Null => write!(f, "NULL"),
            },
        }
    }
}

impl fmt::Display for PlanPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanPredicate::Compare { lhs, op, rhs } => {
                let op = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Ne => "<>",
                    CompareOp::Lt => "<",
                    CompareOp::Le => "<=",
                    CompareOp::Gt => ">",
                    CompareOp::Ge => ">=",
                };
                write!(f, "{lhs} {op} {rhs}")
            }
            PlanPredicate::Like { expr, pattern } => write!(f, "{expr} LIKE '{pattern}'"),
            PlanPredicate::IsNull(expr) => write!(f, "{expr} IS NULL"),
            PlanPredicate::IsNotNull(expr) => write!(f, "{expr} IS NOT NULL"),
            PlanPredicate::And(a, b) => write!(f, "({a} AND {b})"),
            PlanPredicate::Or(a, b) => write!(f, "({a} OR {b})"),
            PlanPredicate::Not(p) => write!(f, "NOT ({p})"),
        }
    }
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinKind::Inner => write!(f, "Inner"),
            JoinKind::LeftOuter => write!(f, "LeftOuter"),
            JoinKind::Cross => write!(f, "Cross"),
        }
    }
}

impl AbstractQueryPlan {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match &self.root {
            RootSource::Table {
                schema,
                table,
                alias,
            } => writeln!(f, "{pad}Plan root={schema}.{table} AS {alias}")?,
            RootSource::Derived { alias, plan } => {
                writeln!(f, "{pad}Plan root=(derived) AS {alias}")?;
                plan.fmt_indented(f, indent + 1)?;
            }
        }
        for join in &self.joins {
            let on = join
                .on
                .iter()
                .map(|(l, r)| format!("{}.{l} = {}.{r}", join.left_alias, join.right_alias))
                .collect::<Vec<_>>()
                .join(" AND ");
            write!(
                f,
                "{pad}  Join {} {}.{} AS {} ON {on}",
                join.kind, join.source.schema, join.source.table, join.right_alias
            )?;
            if let Some(filter) = &join.source.pre_filter {
                write!(f, " PREFILTER {filter}")?;
            }
            if join.source.distinct {
                write!(f, " DISTINCT")?;
            }
            if let Some(pl) = &join.source.partition_limit {
                write!(
                    f,
                    " PARTITION({}) offset={:?} limit={:?}",
                    pl.partition_by.join(", "),
                    pl.offset,
                    pl.limit
                )?;
            }
            writeln!(f)?;
        }
        let cols = self
            .projection
            .iter()
            .map(|c| match &c.expr {
                ProjectedExpr::Column(name) if *name == c.output_name => {
                    format!("{}.{name}", c.source_alias)
                }
                ProjectedExpr::Column(name) => {
                    format!("{}.{name} AS {}", c.source_alias, c.output_name)
                }
                ProjectedExpr::Expr(expr) => format!("{expr} AS {}", c.output_name),
            })
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(
            f,
            "{pad}  Project{} [{cols}]",
            if self.distinct { " DISTINCT" } else { "" }
        )?;
        if let Some(restriction) = &self.restriction {
            writeln!(f, "{pad}  Where {restriction}")?;
        }
        if !self.ordering.is_empty() {
            let order = self
                .ordering
                .iter()
                .map(|o| {
                    format!(
                        "{} {}",
                        o.expr,
                        match o.direction {
                            SortDirection::Asc => "asc",
                            SortDirection::Desc => "desc",
                        }
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "{pad}  OrderBy [{order}]")?;
        }
        if let Some(page) = &self.pagination {
            writeln!(f, "{pad}  Page offset={:?} limit={:?}", page.offset, page.limit)?;
        }
        Ok(())
    }
}

impl fmt::Display for AbstractQueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

impl fmt::Display for QueryPlanSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPlanSet::Single(plan) => plan.fmt(f),
            QueryPlanSet::Split(split) => {
                for (i, plan) in split.plans.iter().enumerate() {
                    writeln!(f, "-- split query {i} --")?;
                    plan.fmt(f)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_table_source_has_no_modifiers() {
        let source = JoinSource::table("dbo", "Orders");
        assert!(source.is_plain_table());
    }

    #[test]
    fn display_renders_join_line() {
        let plan = AbstractQueryPlan {
            root: RootSource::Table {
                schema: "dbo".into(),
                table: "Customers".into(),
                alias: "c".into(),
            },
            joins: vec![JoinClause {
                left_alias: "c".into(),
                right_alias: "o".into(),
                kind: JoinKind::LeftOuter,
                source: JoinSource::table("dbo", "Orders"),
                on: vec![("CustomerID".into(), "CustomerID".into())],
            }],
            projection: vec![ProjectedColumn {
                source_alias: "c".into(),
                expr: ProjectedExpr::Column("CustomerID".into()),
                output_name: "CustomerID".into(),
                navigation: vec![],
            }],
            column_runs: vec![],
            restriction: None,
            ordering: vec![],
            pagination: None,
            distinct: false,
            no_tracking: false,
        };
        let rendered = plan.to_string();
        assert!(rendered.contains("Join LeftOuter dbo.Orders AS o ON c.CustomerID = o.CustomerID"));
    }
}
