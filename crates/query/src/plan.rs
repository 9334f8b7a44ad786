//! Physical query plans (spec.md §4.6): the executable tree the optimizer
//! produces from an [`Expression`](crate::expression::Expression).

use crate::expression::Expression;
use protobase_core::value::Value;
use protobase_primitives::IndexRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Join kind for [`PhysicalPlan::JoinPlan`] (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// Only rows with a match on both sides.
    Inner,
    /// Every left row, paired with a match or `None`.
    Left,
    /// Every right row, paired with a match or `None`.
    Right,
    /// Every row from either side, matched where possible.
    Outer,
}

/// An aggregate function computed over one group's members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    /// Number of members in the group.
    Count,
    /// Sum of a numeric field across members.
    Sum,
    /// Mean of a numeric field across members.
    Avg,
    /// Minimum of a numeric field across members.
    Min,
    /// Maximum of a numeric field across members.
    Max,
}

/// One aggregate to compute per group, reported under `alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    /// Output field name for this aggregate.
    pub alias: String,
    /// Field to aggregate. Unused (and may be omitted) for [`AggregateOp::Count`].
    pub field: Option<String>,
    /// Which aggregate function to apply.
    pub op: AggregateOp,
}

impl AggregateSpec {
    /// A `count(*)`-style aggregate with no source field.
    pub fn count(alias: impl Into<String>) -> Self {
        Self { alias: alias.into(), field: None, op: AggregateOp::Count }
    }

    /// An aggregate over `field`.
    pub fn over(alias: impl Into<String>, field: impl Into<String>, op: AggregateOp) -> Self {
        Self { alias: alias.into(), field: Some(field.into()), op }
    }
}

/// A joined pair, as produced by [`PhysicalPlan::JoinPlan`] and carried
/// record-to-record through [`Value::Bytes`] (spec.md §3: `Value` has no
/// composite variant, so a synthetic row is JSON-encoded the same way
/// `protobase-engine` flattens collections into atoms).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct JoinedRow {
    left: Option<Value>,
    right: Option<Value>,
}

/// One group's key and computed aggregates, as produced by
/// [`PhysicalPlan::GroupByPlan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GroupedRow {
    key: Value,
    aggregates: Vec<(String, Value)>,
}

/// A record reduced to its selected fields, as produced by
/// [`PhysicalPlan::SelectPlan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ProjectedRow {
    fields: Vec<(String, Value)>,
}

/// Encode a synthetic composite row (join pair, group, or projection) into a
/// `Value::Bytes` the way `protobase-engine` encodes flattened collections.
/// Infallible in practice: these rows contain only plain `Value`s with no
/// cycles, so `serde_json` never fails to serialize them.
fn encode_row<T: Serialize>(row: &T) -> Value {
    Value::Bytes(serde_json::to_vec(row).expect("composite query row is always serializable"))
}

/// Resolves record fields and the full record set a scan starts from.
/// Implemented by whatever owns the actual storage (`protobase-engine`);
/// this crate only consumes it.
pub trait DataSource: Send + Sync {
    /// Every record pointer currently visible to the query (spec.md §5
    /// "full scan" baseline).
    fn all_records(&self) -> Vec<Value>;
    /// Resolve `field` on the record identified by `record`.
    fn field(&self, record: &Value, field: &str) -> Option<Value>;
}

/// An executable physical plan node.
#[derive(Debug, Clone)]
pub enum PhysicalPlan {
    /// Every record, unfiltered (the fallback full scan).
    ListPlan,
    /// Filter `input` by `predicate` via a per-record scan.
    WherePlan {
        /// Upstream plan providing candidate records.
        input: Box<PhysicalPlan>,
        /// Predicate evaluated per record.
        predicate: Expression,
    },
    /// Equality lookup on `field` via its index, bypassing a scan entirely.
    IndexedSearchPlan {
        /// Indexed field name.
        field: String,
        /// Value the field must equal.
        value: Value,
    },
    /// Half-open range lookup `[from, to)` on `field` via its index.
    IndexedRangeSearchPlan {
        /// Indexed field name.
        field: String,
        /// Inclusive lower bound, if any.
        from: Option<Value>,
        /// Exclusive upper bound, if any.
        to: Option<Value>,
    },
    /// Intersection of two plans' record sets (rewritten `AND` over two
    /// indexed conjuncts).
    AndMerge(Box<PhysicalPlan>, Box<PhysicalPlan>),
    /// Union of two plans' record sets (rewritten `OR` over two indexed
    /// disjuncts).
    OrMerge(Box<PhysicalPlan>, Box<PhysicalPlan>),
    /// Restrict `input` to `limit` records.
    LimitPlan {
        /// Upstream plan.
        input: Box<PhysicalPlan>,
        /// Maximum records to return.
        limit: usize,
    },
    /// Skip the first `offset` records of `input`.
    OffsetPlan {
        /// Upstream plan.
        input: Box<PhysicalPlan>,
        /// Records to skip.
        offset: usize,
    },
    /// Sort `input` by `field`, ascending unless `descending`.
    OrderByPlan {
        /// Upstream plan.
        input: Box<PhysicalPlan>,
        /// Sort key field.
        field: String,
        /// Reverse the sort order.
        descending: bool,
    },
    /// Join `left` and `right` on `left_field == right_field`. Each output
    /// row is a synthetic `Value::Bytes`-encoded pair, not a raw record
    /// pointer (spec.md §4.6 `JoinPlan(left, right, condition, kind)`).
    JoinPlan {
        /// Left-side plan.
        left: Box<PhysicalPlan>,
        /// Right-side plan.
        right: Box<PhysicalPlan>,
        /// Field compared on the left side's records.
        left_field: String,
        /// Field compared on the right side's records.
        right_field: String,
        /// How to treat rows with no match on the other side.
        kind: JoinKind,
    },
    /// Group `input` by `key_field` and compute `aggregates` per group.
    /// Each output row is a synthetic `Value::Bytes`-encoded group (spec.md
    /// §4.6 `GroupByPlan(key_fn, aggregates)`).
    GroupByPlan {
        /// Upstream plan.
        input: Box<PhysicalPlan>,
        /// Field to group by.
        key_field: String,
        /// Aggregates to compute per group.
        aggregates: Vec<AggregateSpec>,
    },
    /// Project `input`'s records down to `projection`'s fields. Each output
    /// row is a synthetic `Value::Bytes`-encoded projection (spec.md §4.6
    /// `SelectPlan(projection)`).
    SelectPlan {
        /// Upstream plan.
        input: Box<PhysicalPlan>,
        /// Field names to keep, in order.
        projection: Vec<String>,
    },
}

impl PhysicalPlan {
    /// Execute this plan against `source` and `indexes`, returning the
    /// matching record pointers.
    pub fn execute(&self, source: &dyn DataSource, indexes: &IndexRegistry) -> Vec<Value> {
        match self {
            PhysicalPlan::ListPlan => source.all_records(),
            PhysicalPlan::WherePlan { input, predicate } => input
                .execute(source, indexes)
                .into_iter()
                .filter(|r| predicate.eval_bool(&|field| source.field(r, field)))
                .collect(),
            PhysicalPlan::IndexedSearchPlan { field, value } => {
                indexes.lookup_eq(field, value).as_iterable()
            }
            PhysicalPlan::IndexedRangeSearchPlan { field, from, to } => indexes
                .lookup_range(field, from.as_ref(), to.as_ref())
                .as_iterable(),
            PhysicalPlan::AndMerge(left, right) => {
                let left = left.execute(source, indexes);
                let right_set = right.execute(source, indexes);
                left.into_iter().filter(|r| right_set.contains(r)).collect()
            }
            PhysicalPlan::OrMerge(left, right) => {
                let mut result = left.execute(source, indexes);
                for r in right.execute(source, indexes) {
                    if !result.contains(&r) {
                        result.push(r);
                    }
                }
                result
            }
            PhysicalPlan::LimitPlan { input, limit } => {
                let mut rows = input.execute(source, indexes);
                rows.truncate(*limit);
                rows
            }
            PhysicalPlan::OffsetPlan { input, offset } => {
                let mut rows = input.execute(source, indexes);
                if *offset >= rows.len() {
                    Vec::new()
                } else {
                    rows.split_off(*offset)
                }
            }
            PhysicalPlan::OrderByPlan { input, field, descending } => {
                let mut rows = input.execute(source, indexes);
                rows.sort_by(|a, b| {
                    let av = source.field(a, field);
                    let bv = source.field(b, field);
                    let ord = match (av, bv) {
                        (Some(av), Some(bv)) => av.total_cmp(&bv),
                        (Some(_), None) => std::cmp::Ordering::Less,
                        (None, Some(_)) => std::cmp::Ordering::Greater,
                        (None, None) => std::cmp::Ordering::Equal,
                    };
                    if *descending {
                        ord.reverse()
                    } else {
                        ord
                    }
                });
                rows
            }
            PhysicalPlan::JoinPlan { left, right, left_field, right_field, kind } => {
                let left_rows = left.execute(source, indexes);
                let right_rows = right.execute(source, indexes);
                join_rows(source, &left_rows, &right_rows, left_field, right_field, *kind)
            }
            PhysicalPlan::GroupByPlan { input, key_field, aggregates } => {
                let rows = input.execute(source, indexes);
                group_rows(source, &rows, key_field, aggregates)
            }
            PhysicalPlan::SelectPlan { input, projection } => {
                let rows = input.execute(source, indexes);
                rows.into_iter()
                    .map(|row| {
                        let fields = projection
                            .iter()
                            .map(|field| {
                                (field.clone(), source.field(&row, field).unwrap_or(Value::Null))
                            })
                            .collect();
                        encode_row(&ProjectedRow { fields })
                    })
                    .collect()
            }
        }
    }
}

/// Nested-loop equi-join. Record sets from indexed lookups or scans are
/// small enough in practice (spec.md §8's seed scenarios top out in the
/// low thousands) that a hash-join's setup cost buys nothing here.
fn join_rows(
    source: &dyn DataSource,
    left_rows: &[Value],
    right_rows: &[Value],
    left_field: &str,
    right_field: &str,
    kind: JoinKind,
) -> Vec<Value> {
    let mut result = Vec::new();
    let mut right_matched = vec![false; right_rows.len()];

    for l in left_rows {
        let left_key = source.field(l, left_field);
        let mut matched_any = false;
        if left_key.is_some() {
            for (i, r) in right_rows.iter().enumerate() {
                if source.field(r, right_field) == left_key {
                    matched_any = true;
                    right_matched[i] = true;
                    result.push(encode_row(&JoinedRow {
                        left: Some(l.clone()),
                        right: Some(r.clone()),
                    }));
                }
            }
        }
        if !matched_any && matches!(kind, JoinKind::Left | JoinKind::Outer) {
            result.push(encode_row(&JoinedRow { left: Some(l.clone()), right: None }));
        }
    }

    if matches!(kind, JoinKind::Right | JoinKind::Outer) {
        for (i, r) in right_rows.iter().enumerate() {
            if !right_matched[i] {
                result.push(encode_row(&JoinedRow { left: None, right: Some(r.clone()) }));
            }
        }
    }

    result
}

fn group_rows(
    source: &dyn DataSource,
    rows: &[Value],
    key_field: &str,
    aggregates: &[AggregateSpec],
) -> Vec<Value> {
    let mut groups: Vec<(Value, Vec<Value>)> = Vec::new();
    for row in rows {
        let key = source.field(row, key_field).unwrap_or(Value::Null);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row.clone()),
            None => groups.push((key, vec![row.clone()])),
        }
    }

    groups
        .into_iter()
        .map(|(key, members)| {
            let computed = aggregates
                .iter()
                .map(|spec| (spec.alias.clone(), compute_aggregate(source, &members, spec)))
                .collect();
            encode_row(&GroupedRow { key, aggregates: computed })
        })
        .collect()
}

fn compute_aggregate(source: &dyn DataSource, members: &[Value], spec: &AggregateSpec) -> Value {
    if spec.op == AggregateOp::Count {
        return Value::Int(members.len() as i64);
    }
    let Some(field) = &spec.field else { return Value::Null };
    let values: Vec<f64> = members
        .iter()
        .filter_map(|m| source.field(m, field))
        .filter_map(|v| numeric(&v))
        .collect();
    if values.is_empty() {
        return Value::Null;
    }
    let result = match spec.op {
        AggregateOp::Sum => values.iter().sum(),
        AggregateOp::Avg => values.iter().sum::<f64>() / values.len() as f64,
        AggregateOp::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
        AggregateOp::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        AggregateOp::Count => unreachable!("handled above"),
    };
    Value::Float(result)
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// A thread-safe handle used by callers that build plans incrementally
/// (e.g. the engine's query builder) without cloning `DataSource` impls.
pub type SharedDataSource = Arc<dyn DataSource>;

#[cfg(test)]
mod tests {
    use super::*;
    use protobase_primitives::IndexRegistry;
    use std::collections::HashMap;

    struct MapSource {
        records: Vec<Value>,
        fields: HashMap<i64, HashMap<String, Value>>,
    }

    impl DataSource for MapSource {
        fn all_records(&self) -> Vec<Value> {
            self.records.clone()
        }

        fn field(&self, record: &Value, field: &str) -> Option<Value> {
            let Value::Int(id) = record else { return None };
            self.fields.get(id)?.get(field).cloned()
        }
    }

    fn orders_and_departments() -> MapSource {
        let mut fields = HashMap::new();
        let mut row = |id: i64, kv: &[(&str, Value)]| {
            fields.insert(id, kv.iter().map(|(k, v)| (k.to_string(), v.clone())).collect());
        };
        row(1, &[("kind", Value::from("order")), ("dept", Value::from("eng")), ("amount", Value::Int(10))]);
        row(2, &[("kind", Value::from("order")), ("dept", Value::from("eng")), ("amount", Value::Int(20))]);
        row(3, &[("kind", Value::from("order")), ("dept", Value::from("sales")), ("amount", Value::Int(5))]);
        row(4, &[("kind", Value::from("order")), ("amount", Value::Int(1))]);
        row(100, &[("kind", Value::from("department")), ("dept_key", Value::from("eng"))]);
        row(101, &[("kind", Value::from("department")), ("dept_key", Value::from("ops"))]);
        MapSource { records: (1..=4).chain([100, 101]).map(Value::Int).collect(), fields }
    }

    fn orders_plan() -> PhysicalPlan {
        PhysicalPlan::WherePlan {
            input: Box::new(PhysicalPlan::ListPlan),
            predicate: Expression::eq("kind", Value::from("order")),
        }
    }

    fn departments_plan() -> PhysicalPlan {
        PhysicalPlan::WherePlan {
            input: Box::new(PhysicalPlan::ListPlan),
            predicate: Expression::eq("kind", Value::from("department")),
        }
    }

    fn decode_joins(rows: Vec<Value>) -> Vec<JoinedRow> {
        rows.into_iter()
            .map(|v| {
                let Value::Bytes(bytes) = v else { panic!("expected an encoded join row") };
                serde_json::from_slice(&bytes).unwrap()
            })
            .collect()
    }

    #[test]
    fn inner_join_only_includes_matched_pairs() {
        let source = orders_and_departments();
        let indexes = IndexRegistry::new();
        let plan = PhysicalPlan::JoinPlan {
            left: Box::new(orders_plan()),
            right: Box::new(departments_plan()),
            left_field: "dept".to_string(),
            right_field: "dept_key".to_string(),
            kind: JoinKind::Inner,
        };
        let rows = decode_joins(plan.execute(&source, &indexes));
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.left.is_some() && r.right.is_some()));
    }

    #[test]
    fn left_join_keeps_unmatched_left_rows_with_none() {
        let source = orders_and_departments();
        let indexes = IndexRegistry::new();
        let plan = PhysicalPlan::JoinPlan {
            left: Box::new(orders_plan()),
            right: Box::new(departments_plan()),
            left_field: "dept".to_string(),
            right_field: "dept_key".to_string(),
            kind: JoinKind::Left,
        };
        let rows = decode_joins(plan.execute(&source, &indexes));
        // 2 eng matches + sales unmatched + missing-field order unmatched.
        assert_eq!(rows.len(), 4);
        assert_eq!(rows.iter().filter(|r| r.right.is_none()).count(), 2);
    }

    #[test]
    fn outer_join_also_keeps_unmatched_right_rows() {
        let source = orders_and_departments();
        let indexes = IndexRegistry::new();
        let plan = PhysicalPlan::JoinPlan {
            left: Box::new(orders_plan()),
            right: Box::new(departments_plan()),
            left_field: "dept".to_string(),
            right_field: "dept_key".to_string(),
            kind: JoinKind::Outer,
        };
        let rows = decode_joins(plan.execute(&source, &indexes));
        // left join's 4 rows, plus the unmatched "ops" department.
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().any(|r| r.left.is_none() && r.right.is_some()));
    }

    #[test]
    fn group_by_computes_sum_and_count_per_key() {
        let source = orders_and_departments();
        let indexes = IndexRegistry::new();
        let plan = PhysicalPlan::GroupByPlan {
            input: Box::new(orders_plan()),
            key_field: "dept".to_string(),
            aggregates: vec![
                AggregateSpec::count("n"),
                AggregateSpec::over("total", "amount", AggregateOp::Sum),
            ],
        };
        let rows: Vec<GroupedRow> = plan
            .execute(&source, &indexes)
            .into_iter()
            .map(|v| {
                let Value::Bytes(bytes) = v else { panic!("expected an encoded group row") };
                serde_json::from_slice(&bytes).unwrap()
            })
            .collect();
        assert_eq!(rows.len(), 3); // eng, sales, and the missing-field group (Value::Null)
        let eng = rows.iter().find(|r| r.key == Value::from("eng")).unwrap();
        let n = eng.aggregates.iter().find(|(k, _)| k == "n").unwrap();
        assert_eq!(n.1, Value::Int(2));
        let total = eng.aggregates.iter().find(|(k, _)| k == "total").unwrap();
        assert_eq!(total.1, Value::Float(30.0));
    }

    #[test]
    fn select_plan_projects_only_the_requested_fields() {
        let source = orders_and_departments();
        let indexes = IndexRegistry::new();
        let plan = PhysicalPlan::SelectPlan {
            input: Box::new(orders_plan()),
            projection: vec!["dept".to_string()],
        };
        let rows = plan.execute(&source, &indexes);
        assert_eq!(rows.len(), 4);
        let Value::Bytes(bytes) = &rows[0] else { panic!("expected an encoded projected row") };
        let projected: ProjectedRow = serde_json::from_slice(bytes).unwrap();
        assert_eq!(projected.fields, vec![("dept".to_string(), Value::from("eng"))]);
    }
}
