//! Predicate AST (spec.md §4.6): the surface language the optimizer
//! rewrites into an index-aware [`crate::plan::PhysicalPlan`].

use protobase_core::value::Value;
use serde::{Deserialize, Serialize};

/// Comparison operator used by [`Expression::Cmp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
}

/// A predicate or scalar expression over a record's fields.
///
/// `Cmp` never coerces types across `Value` variants (spec.md §4.6 "no
/// implicit string coercion") — comparing a `Str` field against an `Int`
/// constant always evaluates to `false`, it does not error or convert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    /// Reference to a record field by name.
    Field(String),
    /// A literal value.
    Const(Value),
    /// Binary comparison.
    Cmp {
        /// Comparison operator.
        op: CmpOp,
        /// Left operand.
        left: Box<Expression>,
        /// Right operand.
        right: Box<Expression>,
    },
    /// Conjunction: true iff every child is true.
    And(Vec<Expression>),
    /// Disjunction: true iff any child is true.
    Or(Vec<Expression>),
    /// Negation.
    Not(Box<Expression>),
}

impl Expression {
    /// `field == value`.
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(CmpOp::Eq, field, value)
    }

    /// `field < value`.
    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(CmpOp::Lt, field, value)
    }

    /// `field <= value`.
    pub fn le(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(CmpOp::Le, field, value)
    }

    /// `field > value`.
    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(CmpOp::Gt, field, value)
    }

    /// `field >= value`.
    pub fn ge(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::cmp(CmpOp::Ge, field, value)
    }

    fn cmp(op: CmpOp, field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Cmp {
            op,
            left: Box::new(Self::Field(field.into())),
            right: Box::new(Self::Const(value.into())),
        }
    }

    /// `self && other`, flattening nested conjunctions.
    pub fn and(self, other: Expression) -> Self {
        match (self, other) {
            (Expression::And(mut a), Expression::And(b)) => {
                a.extend(b);
                Expression::And(a)
            }
            (Expression::And(mut a), other) => {
                a.push(other);
                Expression::And(a)
            }
            (this, Expression::And(mut b)) => {
                b.insert(0, this);
                Expression::And(b)
            }
            (this, other) => Expression::And(vec![this, other]),
        }
    }

    /// `self || other`, flattening nested disjunctions.
    pub fn or(self, other: Expression) -> Self {
        match (self, other) {
            (Expression::Or(mut a), Expression::Or(b)) => {
                a.extend(b);
                Expression::Or(a)
            }
            (Expression::Or(mut a), other) => {
                a.push(other);
                Expression::Or(a)
            }
            (this, Expression::Or(mut b)) => {
                b.insert(0, this);
                Expression::Or(b)
            }
            (this, other) => Expression::Or(vec![this, other]),
        }
    }

    /// Evaluate this expression against `lookup`, a callback resolving a
    /// record's field by name. Scalar subexpressions (`Field`, `Const`)
    /// resolve to `Some(value)`/`None`; boolean subexpressions evaluate via
    /// [`Expression::eval_bool`] and are not meaningful here.
    fn eval_value(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> Option<Value> {
        match self {
            Expression::Field(name) => lookup(name),
            Expression::Const(v) => Some(v.clone()),
            _ => None,
        }
    }

    /// Evaluate this predicate against `lookup`. A missing field value
    /// (absent from the record) makes any `Cmp` touching it evaluate to
    /// `false`, never an error — consistent with `Error::Expression` being
    /// reserved for compile-time issues like unresolved field names in a
    /// validated schema, not runtime absence.
    pub fn eval_bool(&self, lookup: &dyn Fn(&str) -> Option<Value>) -> bool {
        match self {
            Expression::Field(_) | Expression::Const(_) => false,
            Expression::Cmp { op, left, right } => {
                match (left.eval_value(lookup), right.eval_value(lookup)) {
                    (Some(l), Some(r)) => eval_cmp(*op, &l, &r),
                    _ => false,
                }
            }
            Expression::And(children) => children.iter().all(|c| c.eval_bool(lookup)),
            Expression::Or(children) => children.iter().any(|c| c.eval_bool(lookup)),
            Expression::Not(inner) => !inner.eval_bool(lookup),
        }
    }
}

fn eval_cmp(op: CmpOp, left: &Value, right: &Value) -> bool {
    use std::cmp::Ordering;
    if std::mem::discriminant(left) != std::mem::discriminant(right) {
        return op == CmpOp::Ne;
    }
    let ord = left.total_cmp(right);
    match op {
        CmpOp::Eq => ord == Ordering::Equal,
        CmpOp::Ne => ord != Ordering::Equal,
        CmpOp::Lt => ord == Ordering::Less,
        CmpOp::Le => ord != Ordering::Greater,
        CmpOp::Gt => ord == Ordering::Greater,
        CmpOp::Ge => ord != Ordering::Less,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(pairs: &[(&'static str, Value)]) -> impl Fn(&str) -> Option<Value> {
        let pairs = pairs.to_vec();
        move |name| pairs.iter().find(|(k, _)| *k == name).map(|(_, v)| v.clone())
    }

    #[test]
    fn no_implicit_coercion_across_types() {
        let expr = Expression::eq("count", Value::Int(1));
        let f = lookup(&[("count", Value::Str("1".to_string()))]);
        assert!(!expr.eval_bool(&f));
    }

    #[test]
    fn and_short_circuits_to_false() {
        let expr = Expression::eq("a", Value::Int(1)).and(Expression::eq("b", Value::Int(2)));
        let f = lookup(&[("a", Value::Int(1)), ("b", Value::Int(99))]);
        assert!(!expr.eval_bool(&f));
    }

    #[test]
    fn or_true_if_any_branch_matches() {
        let expr = Expression::eq("a", Value::Int(1)).or(Expression::eq("b", Value::Int(2)));
        let f = lookup(&[("a", Value::Int(0)), ("b", Value::Int(2))]);
        assert!(expr.eval_bool(&f));
    }

    #[test]
    fn missing_field_is_false_not_error() {
        let expr = Expression::eq("missing", Value::Int(1));
        let f = lookup(&[]);
        assert!(!expr.eval_bool(&f));
    }
}
