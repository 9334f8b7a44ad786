//! End-to-end versions of the concrete seed scenarios (spec.md §8).

use protobase::{Config, Error, Expression, Space, TransactionStatus, Value};

fn memory_space() -> Space {
    Space::open_in_memory(Config::default()).unwrap()
}

#[test]
fn snapshot_isolation_across_concurrent_transactions() {
    let space = memory_space();
    let ctx = space.context();

    let mut t0 = ctx.begin().unwrap();
    assert_eq!(t0.get("users"), None);

    let mut t1 = ctx.begin().unwrap();
    t1.set("users", Value::from("{alice:1}"));
    ctx.commit(&mut t1).unwrap();

    // t0 started before t1 committed; it must not observe the change.
    assert_eq!(t0.get("users"), None);

    t0.set("tasks", Value::from("unrelated"));
    ctx.commit(&mut t0).unwrap();

    let mut check = ctx.begin().unwrap();
    assert_eq!(check.get("users"), Some(Value::from("{alice:1}")));
    assert_eq!(check.get("tasks"), Some(Value::from("unrelated")));
}

#[test]
fn commit_conflict_on_same_field_aborts() {
    let space = memory_space();
    let ctx = space.context();

    let mut seed = ctx.begin().unwrap();
    seed.set("counter", Value::Int(5));
    ctx.commit(&mut seed).unwrap();

    let mut t1 = ctx.begin().unwrap();
    let mut t2 = ctx.begin().unwrap();
    assert_eq!(t1.get("counter"), Some(Value::Int(5)));
    assert_eq!(t2.get("counter"), Some(Value::Int(5)));

    t1.set("counter", Value::Int(6));
    ctx.commit(&mut t1).unwrap();

    t2.set("counter", Value::Int(7));
    let result = ctx.commit(&mut t2);
    assert!(matches!(result, Err(Error::Conflict(_))));
    assert!(matches!(t2.status(), TransactionStatus::Aborted { .. }));
}

#[test]
fn indexed_and_plus_range_matches_a_linear_filter() {
    let space = memory_space();
    let ctx = space.context();

    ctx.define_index("category");
    ctx.define_index("status");
    ctx.define_index("value");

    let categories = ["A", "B", "C"];
    let statuses = ["active", "inactive"];
    let mut records = Vec::new();
    for i in 0..600i64 {
        let category = categories[(i % 3) as usize];
        let status = statuses[(i % 2) as usize];
        let value = i % 1000;
        let pointer = Value::Int(i);
        ctx.index_insert("category", Value::from(category), pointer.clone());
        ctx.index_insert("status", Value::from(status), pointer.clone());
        ctx.index_insert("value", Value::Int(value), pointer.clone());
        records.push((pointer, category, status, value));
    }

    let expr = Expression::eq("category", Value::from("A"))
        .and(Expression::eq("status", Value::from("active")))
        .and(Expression::ge("value", Value::Int(100)))
        .and(Expression::lt("value", Value::Int(110)));

    let plan_text = ctx.explain_query(&expr).to_string();
    assert!(plan_text.contains("AndMerge"));
    assert!(plan_text.contains("IndexedRangeSearchPlan"));

    let record_pointers: Vec<Value> = records.iter().map(|(p, ..)| p.clone()).collect();
    let mut matched = ctx.query(&expr, record_pointers);
    matched.sort_by_key(|v| match v {
        Value::Int(i) => *i,
        _ => unreachable!(),
    });

    let mut expected: Vec<Value> = records
        .iter()
        .filter(|(_, category, status, value)| {
            *category == "A" && *status == "active" && *value >= 100 && *value < 110
        })
        .map(|(p, ..)| p.clone())
        .collect();
    expected.sort_by_key(|v| match v {
        Value::Int(i) => *i,
        _ => unreachable!(),
    });

    assert_eq!(matched, expected);
    assert!(!expected.is_empty());
}
