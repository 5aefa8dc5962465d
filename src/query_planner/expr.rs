//! Lowering of request expressions into alias-resolved plan expressions.
//!
//! Request expressions reference columns relative to an anchor entity (the root
//! for root filters/orderings, the included entity for per-include modifiers).
//! Lowering pins every column to a concrete table alias and validates it against
//! the anchor's schema. Column references that traverse a navigation path are
//! not accepted here — include translation restricts filter/ordering columns to
//! the anchor entity's own columns.

use crate::model_catalog::EntitySchema;
use crate::query_planner::errors::QueryPlannerError;
use crate::query_planner::plan::{OrderingItem, PlanExpr, PlanPredicate};
use crate::query_request::{Predicate, ScalarExpr, SortKey};

pub fn scalar_to_plan(
    expr: &ScalarExpr,
    alias: &str,
    entity: &EntitySchema,
) -> Result<PlanExpr, QueryPlannerError> {
    match expr {
        ScalarExpr::Column { path, name } => {
            if !path.is_empty() {
                return Err(QueryPlannerError::UnsupportedExpression(format!(
                    "column reference '{}.{name}' traverses a navigation path; only columns of '{}' are allowed here",
                    path.join("."),
                    entity.name
                )));
            }
            if !entity.has_column(name) {
                return Err(QueryPlannerError::UnknownColumn {
                    entity: entity.name.clone(),
                    column: name.clone(),
                });
            }
            Ok(PlanExpr::column(alias, name))
        }
        ScalarExpr::Literal(lit) => Ok(PlanExpr::Literal(lit.clone())),
    }
}

pub fn predicate_to_plan(
    predicate: &Predicate,
    alias: &str,
    entity: &EntitySchema,
) -> Result<PlanPredicate, QueryPlannerError> {
    Ok(match predicate {
        Predicate::Compare { lhs, op, rhs } => PlanPredicate::Compare {
            lhs: scalar_to_plan(lhs, alias, entity)?,
            op: *op,
            rhs: scalar_to_plan(rhs, alias, entity)?,
        },
        Predicate::Like { expr, pattern } => PlanPredicate::Like {
            expr: scalar_to_plan(expr, alias, entity)?,
            pattern: pattern.clone(),
        },
        Predicate::IsNull(expr) => PlanPredicate::IsNull(scalar_to_plan(expr, alias, entity)?),
        Predicate::IsNotNull(expr) => {
            PlanPredicate::IsNotNull(scalar_to_plan(expr, alias, entity)?)
        }
        Predicate::And(a, b) => PlanPredicate::And(
            Box::new(predicate_to_plan(a, alias, entity)?),
            Box::new(predicate_to_plan(b, alias, entity)?),
        ),
        Predicate::Or(a, b) => PlanPredicate::Or(
            Box::new(predicate_to_plan(a, alias, entity)?),
            Box::new(predicate_to_plan(b, alias, entity)?),
        ),
        Predicate::Not(p) => PlanPredicate::Not(Box::new(predicate_to_plan(p, alias, entity)?)),
    })
}

pub fn sort_keys_to_plan(
    keys: &[SortKey],
    alias: &str,
    entity: &EntitySchema,
) -> Result<Vec<OrderingItem>, QueryPlannerError> {
    keys.iter()
        .map(|key| {
            Ok(OrderingItem {
                expr: scalar_to_plan(&key.expr, alias, entity)?,
                direction: key.direction,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_catalog::ColumnSchema;
    use crate::query_request::{CompareOp, Literal};

    fn entity() -> EntitySchema {
        EntitySchema {
            name: "Order".into(),
            schema: "dbo".into(),
            table: "Orders".into(),
            columns: vec![ColumnSchema {
                name: "OrderID".into(),
            }],
            key: vec!["OrderID".into()],
            navigations: vec![],
        }
    }

    #[test]
    fn lowers_column_against_alias() {
        let lowered = scalar_to_plan(&ScalarExpr::column("OrderID"), "o", &entity()).unwrap();
        assert_eq!(lowered, PlanExpr::column("o", "OrderID"));
    }

    #[test]
    fn rejects_unknown_column() {
        let err = scalar_to_plan(&ScalarExpr::column("Nope"), "o", &entity()).unwrap_err();
        assert!(matches!(err, QueryPlannerError::UnknownColumn { .. }));
    }

    #[test]
    fn rejects_pathed_column() {
        let expr = ScalarExpr::Column {
            path: vec!["Customer".into()],
            name: "City".into(),
        };
        let err = scalar_to_plan(&expr, "o", &entity()).unwrap_err();
        assert!(matches!(err, QueryPlannerError::UnsupportedExpression(_)));
    }

    #[test]
    fn lowers_compound_predicate() {
        let predicate = Predicate::compare(
            ScalarExpr::column("OrderID"),
            CompareOp::Gt,
            ScalarExpr::literal(Literal::Int(10)),
        )
        .and(Predicate::IsNotNull(ScalarExpr::column("OrderID")));
        let lowered = predicate_to_plan(&predicate, "o", &entity()).unwrap();
        assert!(matches!(lowered, PlanPredicate::And(_, _)));
    }
}
