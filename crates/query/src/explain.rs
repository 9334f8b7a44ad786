//! Human-readable plan trees (`explain()`, a supplemented feature beyond
//! the distilled planner spec): turns a [`PhysicalPlan`] into an indented
//! tree a caller can print to understand why a query took the path it did.

use crate::plan::PhysicalPlan;
use std::fmt;

/// A single node of an explained plan tree.
pub struct PlanNode {
    label: String,
    children: Vec<PlanNode>,
}

impl PlanNode {
    fn leaf(label: impl Into<String>) -> Self {
        Self { label: label.into(), children: Vec::new() }
    }

    fn with_children(label: impl Into<String>, children: Vec<PlanNode>) -> Self {
        Self { label: label.into(), children }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{}{}", "  ".repeat(depth), self.label)?;
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for PlanNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

/// Build an explain tree for `plan`.
pub fn explain(plan: &PhysicalPlan) -> PlanNode {
    match plan {
        PhysicalPlan::ListPlan => PlanNode::leaf("ListPlan"),
        PhysicalPlan::WherePlan { input, predicate } => PlanNode::with_children(
            format!("WherePlan({predicate:?})"),
            vec![explain(input)],
        ),
        PhysicalPlan::IndexedSearchPlan { field, value } => {
            PlanNode::leaf(format!("IndexedSearchPlan({field} = {value:?})"))
        }
        PhysicalPlan::IndexedRangeSearchPlan { field, from, to } => PlanNode::leaf(format!(
            "IndexedRangeSearchPlan({field} in [{from:?}, {to:?}))"
        )),
        PhysicalPlan::AndMerge(left, right) => {
            PlanNode::with_children("AndMerge".to_string(), vec![explain(left), explain(right)])
        }
        PhysicalPlan::OrMerge(left, right) => {
            PlanNode::with_children("OrMerge".to_string(), vec![explain(left), explain(right)])
        }
        PhysicalPlan::LimitPlan { input, limit } => {
            PlanNode::with_children(format!("LimitPlan({limit})"), vec![explain(input)])
        }
        PhysicalPlan::OffsetPlan { input, offset } => {
            PlanNode::with_children(format!("OffsetPlan({offset})"), vec![explain(input)])
        }
        PhysicalPlan::OrderByPlan { input, field, descending } => PlanNode::with_children(
            format!("OrderByPlan({field}, descending={descending})"),
            vec![explain(input)],
        ),
        PhysicalPlan::JoinPlan { left, right, left_field, right_field, kind } => {
            PlanNode::with_children(
                format!("JoinPlan({left_field} = {right_field}, kind={kind:?})"),
                vec![explain(left), explain(right)],
            )
        }
        PhysicalPlan::GroupByPlan { input, key_field, aggregates } => PlanNode::with_children(
            format!("GroupByPlan({key_field}, aggregates={aggregates:?})"),
            vec![explain(input)],
        ),
        PhysicalPlan::SelectPlan { input, projection } => {
            PlanNode::with_children(format!("SelectPlan({projection:?})"), vec![explain(input)])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::optimizer::optimize;
    use protobase_core::value::Value;
    use protobase_primitives::{IndexDefinition, IndexRegistry};

    #[test]
    fn explain_renders_indexed_search_as_a_leaf() {
        let indexes = IndexRegistry::new().define_index(&IndexDefinition::new("category"));
        let plan = optimize(&Expression::eq("category", Value::from("tools")), &indexes);
        let rendered = explain(&plan).to_string();
        assert!(rendered.contains("IndexedSearchPlan(category"));
    }

    #[test]
    fn explain_nests_where_plan_under_its_input() {
        let plan = PhysicalPlan::WherePlan {
            input: Box::new(PhysicalPlan::ListPlan),
            predicate: Expression::eq("x", Value::Int(1)),
        };
        let rendered = explain(&plan).to_string();
        let mut lines = rendered.lines();
        assert!(lines.next().unwrap().starts_with("WherePlan"));
        assert!(lines.next().unwrap().trim_start() == "ListPlan");
    }
}
