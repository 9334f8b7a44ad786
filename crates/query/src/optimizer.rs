//! Bottom-up rewrite rules turning an [`Expression`] into an index-aware
//! [`PhysicalPlan`] (spec.md §4.6).
//!
//! The rewrite is purely structural: it never consults live data, only the
//! set of field names an [`IndexRegistry`] currently has indexes for. A
//! predicate on an indexed field becomes a direct lookup; everything else
//! falls back to a [`PhysicalPlan::WherePlan`] scan.

use crate::expression::{CmpOp, Expression};
use crate::plan::{DataSource, PhysicalPlan};
use protobase_core::value::Value;
use protobase_primitives::IndexRegistry;

/// Rewrite `expr` into the cheapest plan `indexes` can support.
pub fn optimize(expr: &Expression, indexes: &IndexRegistry) -> PhysicalPlan {
    match try_indexed(expr, indexes) {
        Some(plan) => plan,
        None => {
            tracing::warn!(predicate = ?expr, "no index covers this predicate, falling back to a full scan");
            PhysicalPlan::WherePlan {
                input: Box::new(PhysicalPlan::ListPlan),
                predicate: expr.clone(),
            }
        }
    }
}

/// Attempt to satisfy `expr` entirely from indexes, without a fallback scan.
/// `None` means some part of `expr` cannot be answered from an index alone.
fn try_indexed(expr: &Expression, indexes: &IndexRegistry) -> Option<PhysicalPlan> {
    match expr {
        Expression::Cmp { op, left, right } => indexed_cmp(*op, left, right, indexes),
        Expression::And(children) => and_plan(children, indexes),
        Expression::Or(children) => {
            let mut plans = children.iter().map(|c| try_indexed(c, indexes));
            let first = plans.next()??;
            plans.try_fold(first, |acc, next| {
                Some(PhysicalPlan::OrMerge(Box::new(acc), Box::new(next?)))
            })
        }
        Expression::Field(_) | Expression::Const(_) | Expression::Not(_) => None,
    }
}

/// An empty [`DataSource`] used only to evaluate indexed sub-plans for their
/// reference-set size; `IndexedSearchPlan`/`IndexedRangeSearchPlan`/
/// `AndMerge`/`OrMerge` never call `field`/`all_records`, so this is safe to
/// pass wherever [`try_indexed`] has already produced a plan.
struct NullSource;

impl DataSource for NullSource {
    fn all_records(&self) -> Vec<Value> {
        Vec::new()
    }

    fn field(&self, _record: &Value, _field: &str) -> Option<Value> {
        None
    }
}

/// Build each conjunct's plan, order them by ascending reference-set
/// cardinality, and fold into a left-deep `AndMerge` chain (spec.md §4.6
/// rule 2). Equal cardinalities break ties toward the index with fewer
/// total keys, i.e. the more selective index overall (rule 4).
fn and_plan(children: &[Expression], indexes: &IndexRegistry) -> Option<PhysicalPlan> {
    let mut candidates = Vec::with_capacity(children.len());
    for child in children {
        let plan = try_indexed(child, indexes)?;
        let cardinality = plan.execute(&NullSource, indexes).len();
        let total_keys = plan_total_keys(&plan, indexes);
        candidates.push((plan, cardinality, total_keys));
    }
    candidates.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));

    let mut plans = candidates.into_iter().map(|(plan, ..)| plan);
    let first = plans.next()?;
    Some(plans.fold(first, |acc, next| PhysicalPlan::AndMerge(Box::new(acc), Box::new(next))))
}

/// Sum of the distinct key counts of every index this plan reads from, used
/// as the rule-4 selectivity tie-break.
fn plan_total_keys(plan: &PhysicalPlan, indexes: &IndexRegistry) -> u64 {
    match plan {
        PhysicalPlan::IndexedSearchPlan { field, .. }
        | PhysicalPlan::IndexedRangeSearchPlan { field, .. } => indexes.key_count(field),
        PhysicalPlan::AndMerge(left, right) | PhysicalPlan::OrMerge(left, right) => {
            plan_total_keys(left, indexes) + plan_total_keys(right, indexes)
        }
        _ => 0,
    }
}

/// `field < value` and `value < field` are not the same predicate — when the
/// constant sits on the left, the comparison direction must flip (`5 < x`
/// means `x > 5`) before it can be treated as a plain `field OP value` test.
fn flip(op: CmpOp) -> CmpOp {
    match op {
        CmpOp::Lt => CmpOp::Gt,
        CmpOp::Le => CmpOp::Ge,
        CmpOp::Gt => CmpOp::Lt,
        CmpOp::Ge => CmpOp::Le,
        CmpOp::Eq | CmpOp::Ne => op,
    }
}

fn indexed_cmp(
    op: CmpOp,
    left: &Expression,
    right: &Expression,
    indexes: &IndexRegistry,
) -> Option<PhysicalPlan> {
    let (op, field, value) = match (left, right) {
        (Expression::Field(f), Expression::Const(v)) => (op, f, v),
        (Expression::Const(v), Expression::Field(f)) => (flip(op), f, v),
        _ => return None,
    };
    if !indexes.has_index(field) {
        return None;
    }
    match op {
        CmpOp::Eq => Some(PhysicalPlan::IndexedSearchPlan {
            field: field.clone(),
            value: value.clone(),
        }),
        CmpOp::Lt => Some(PhysicalPlan::IndexedRangeSearchPlan {
            field: field.clone(),
            from: None,
            to: Some(value.clone()),
        }),
        CmpOp::Ge => Some(PhysicalPlan::IndexedRangeSearchPlan {
            field: field.clone(),
            from: Some(value.clone()),
            to: None,
        }),
        // `<=` and `>` need an exclusive/inclusive bound flip the half-open
        // `[from, to)` range lookup cannot express directly; leave these to
        // the scan fallback rather than approximate them.
        CmpOp::Le | CmpOp::Gt | CmpOp::Ne => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_primitives::IndexDefinition;

    #[test]
    fn equality_on_indexed_field_becomes_direct_lookup() {
        let indexes = IndexRegistry::new().define_index(&IndexDefinition::new("category"));
        let plan = optimize(&Expression::eq("category", Value::from("tools")), &indexes);
        assert!(matches!(plan, PhysicalPlan::IndexedSearchPlan { .. }));
    }

    #[test]
    fn predicate_on_unindexed_field_falls_back_to_scan() {
        let indexes = IndexRegistry::new();
        let plan = optimize(&Expression::eq("category", Value::from("tools")), &indexes);
        assert!(matches!(plan, PhysicalPlan::WherePlan { .. }));
    }

    #[test]
    fn and_of_two_indexed_predicates_becomes_and_merge() {
        let indexes = IndexRegistry::new()
            .define_index(&IndexDefinition::new("category"))
            .define_index(&IndexDefinition::new("in_stock"));
        let expr = Expression::eq("category", Value::from("tools"))
            .and(Expression::eq("in_stock", Value::Bool(true)));
        let plan = optimize(&expr, &indexes);
        assert!(matches!(plan, PhysicalPlan::AndMerge(_, _)));
    }

    #[test]
    fn and_with_one_unindexed_branch_falls_back_entirely() {
        let indexes = IndexRegistry::new().define_index(&IndexDefinition::new("category"));
        let expr = Expression::eq("category", Value::from("tools"))
            .and(Expression::eq("description", Value::from("anything")));
        let plan = optimize(&expr, &indexes);
        assert!(matches!(plan, PhysicalPlan::WherePlan { .. }));
    }

    #[test]
    fn range_predicate_on_indexed_field_becomes_range_lookup() {
        let indexes = IndexRegistry::new().define_index(&IndexDefinition::new("price"));
        let plan = optimize(&Expression::ge("price", Value::Int(10)), &indexes);
        assert!(matches!(plan, PhysicalPlan::IndexedRangeSearchPlan { .. }));
    }

    #[test]
    fn constant_on_the_left_flips_the_comparison_direction() {
        let indexes = IndexRegistry::new().define_index(&IndexDefinition::new("price"));
        // `5 < price` means `price > 5`, i.e. a lower bound, not an upper one.
        let expr = Expression::Cmp {
            op: CmpOp::Lt,
            left: Box::new(Expression::Const(Value::Int(5))),
            right: Box::new(Expression::Field("price".to_string())),
        };
        let plan = optimize(&expr, &indexes);
        match plan {
            PhysicalPlan::IndexedRangeSearchPlan { field, from, to } => {
                assert_eq!(field, "price");
                assert_eq!(from, Some(Value::Int(5)));
                assert_eq!(to, None);
            }
            other => panic!("expected IndexedRangeSearchPlan, got {other:?}"),
        }
    }

    #[test]
    fn and_merge_orders_terms_by_ascending_cardinality() {
        let mut indexes = IndexRegistry::new()
            .define_index(&IndexDefinition::new("a"))
            .define_index(&IndexDefinition::new("b"))
            .define_index(&IndexDefinition::new("c"));
        indexes = indexes.index_insert("a", Value::Int(1), Value::Int(1));
        for i in 0..5 {
            indexes = indexes.index_insert("b", Value::Int(1), Value::Int(100 + i));
        }
        for i in 0..10 {
            indexes = indexes.index_insert("c", Value::Int(1), Value::Int(200 + i));
        }

        // Written in descending-cardinality order; the optimizer must still
        // nest the smallest reference set innermost regardless.
        let expr = Expression::eq("c", Value::Int(1))
            .and(Expression::eq("a", Value::Int(1)))
            .and(Expression::eq("b", Value::Int(1)));
        let plan = optimize(&expr, &indexes);

        let PhysicalPlan::AndMerge(outer_left, outer_right) = plan else {
            panic!("expected an AndMerge");
        };
        assert!(matches!(*outer_right, PhysicalPlan::IndexedSearchPlan { field, .. } if field == "c"));
        let PhysicalPlan::AndMerge(inner_left, inner_right) = *outer_left else {
            panic!("expected a nested AndMerge");
        };
        assert!(matches!(*inner_left, PhysicalPlan::IndexedSearchPlan { field, .. } if field == "a"));
        assert!(matches!(*inner_right, PhysicalPlan::IndexedSearchPlan { field, .. } if field == "b"));
    }

    #[test]
    fn and_merge_breaks_cardinality_ties_by_fewer_total_keys() {
        let mut indexes = IndexRegistry::new()
            .define_index(&IndexDefinition::new("wide"))
            .define_index(&IndexDefinition::new("narrow"));
        // Both fields match exactly one record (equal cardinality), but
        // `wide` has far more distinct keys overall, so it's less selective.
        indexes = indexes.index_insert("wide", Value::Int(1), Value::Int(1));
        for i in 1..20 {
            indexes = indexes.index_insert("wide", Value::Int(i + 1), Value::Int(1000 + i));
        }
        indexes = indexes.index_insert("narrow", Value::Int(1), Value::Int(1));

        let expr = Expression::eq("wide", Value::Int(1)).and(Expression::eq("narrow", Value::Int(1)));
        let plan = optimize(&expr, &indexes);

        let PhysicalPlan::AndMerge(left, right) = plan else {
            panic!("expected an AndMerge");
        };
        assert!(matches!(*left, PhysicalPlan::IndexedSearchPlan { field, .. } if field == "narrow"));
        assert!(matches!(*right, PhysicalPlan::IndexedSearchPlan { field, .. } if field == "wide"));
    }
}
