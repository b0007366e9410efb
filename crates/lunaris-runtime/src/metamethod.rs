//! Operator overloading protocol
//!
//! The processor never looks metamethods up by arbitrary name: every hook is
//! one variant of [`Operator`], resolved against a metatable (per value for
//! tables, per data type otherwise) and, for user data, against the
//! object's descriptor.

use crate::shared::RuntimeShared;
use crate::table::TableRef;
use crate::value::Value;

/// Closed set of metatable hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Unm,
    Concat,
    Len,
    Eq,
    Lt,
    Le,
    Index,
    NewIndex,
    Call,
    ToString,
    Metatable,
    Pairs,
}

impl Operator {
    pub const ALL: [Operator; 18] = [
        Operator::Add,
        Operator::Sub,
        Operator::Mul,
        Operator::Div,
        Operator::Mod,
        Operator::Pow,
        Operator::Unm,
        Operator::Concat,
        Operator::Len,
        Operator::Eq,
        Operator::Lt,
        Operator::Le,
        Operator::Index,
        Operator::NewIndex,
        Operator::Call,
        Operator::ToString,
        Operator::Metatable,
        Operator::Pairs,
    ];

    /// Metatable field name (`__add`, ...)
    pub fn name(self) -> &'static str {
        match self {
            Operator::Add => "__add",
            Operator::Sub => "__sub",
            Operator::Mul => "__mul",
            Operator::Div => "__div",
            Operator::Mod => "__mod",
            Operator::Pow => "__pow",
            Operator::Unm => "__unm",
            Operator::Concat => "__concat",
            Operator::Len => "__len",
            Operator::Eq => "__eq",
            Operator::Lt => "__lt",
            Operator::Le => "__le",
            Operator::Index => "__index",
            Operator::NewIndex => "__newindex",
            Operator::Call => "__call",
            Operator::ToString => "__tostring",
            Operator::Metatable => "__metatable",
            Operator::Pairs => "__pairs",
        }
    }

    pub fn from_name(name: &str) -> Option<Operator> {
        Operator::ALL.into_iter().find(|op| op.name() == name)
    }

    /// Source-level symbol used in arithmetic error messages
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Sub | Operator::Unm => "-",
            Operator::Mul => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
            Operator::Pow => "^",
            Operator::Concat => "..",
            Operator::Len => "#",
            Operator::Eq => "==",
            Operator::Lt => "<",
            Operator::Le => "<=",
            _ => "?",
        }
    }

    /// Numeric evaluation for the arithmetic operators
    pub fn apply_numeric(self, a: f64, b: f64) -> Option<f64> {
        Some(match self {
            Operator::Add => a + b,
            Operator::Sub => a - b,
            Operator::Mul => a * b,
            Operator::Div => a / b,
            Operator::Mod => a - (a / b).floor() * b,
            Operator::Pow => a.powf(b),
            Operator::Unm => -a,
            _ => return None,
        })
    }
}

/// Metatable attached to `value`: its own for tables, the type's otherwise
pub fn metatable_of(value: &Value, shared: &RuntimeShared) -> Option<TableRef> {
    match value {
        Value::Table(t) => t.metatable(),
        other => shared.type_metatable(other.data_type()),
    }
}

/// Non-nil `op` entry of the value's metatable
pub fn metatable_lookup(value: &Value, op: Operator, shared: &RuntimeShared) -> Option<Value> {
    let meta = metatable_of(value, shared)?;
    let handler = meta.get_str(op.name());
    (!handler.is_nil()).then_some(handler)
}

/// Descriptor-level hook of a user data value
pub fn descriptor_lookup(value: &Value, op: Operator) -> Option<Value> {
    match value {
        Value::UserData(u) => u
            .descriptor()
            .meta_method(u, op)
            .filter(|handler| !handler.is_nil()),
        _ => None,
    }
}

/// Unary lookup: metatable first, then descriptor
pub fn lookup(value: &Value, op: Operator, shared: &RuntimeShared) -> Option<Value> {
    metatable_lookup(value, op, shared).or_else(|| descriptor_lookup(value, op))
}

/// Binary lookup order: left metatable, right metatable, left descriptor,
/// right descriptor
pub fn lookup_binary(
    left: &Value,
    right: &Value,
    op: Operator,
    shared: &RuntimeShared,
) -> Option<Value> {
    metatable_lookup(left, op, shared)
        .or_else(|| metatable_lookup(right, op, shared))
        .or_else(|| descriptor_lookup(left, op))
        .or_else(|| descriptor_lookup(right, op))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_names_round_trip() {
        for op in Operator::ALL {
            assert_eq!(Operator::from_name(op.name()), Some(op));
        }
        assert_eq!(Operator::from_name("__gc"), None);
    }

    #[rstest]
    #[case(Operator::Mod, 5.5, 2.0, 1.5)]
    #[case(Operator::Mod, -5.0, 3.0, 1.0)]
    #[case(Operator::Mod, 5.0, -3.0, -1.0)]
    #[case(Operator::Pow, 2.0, 10.0, 1024.0)]
    #[case(Operator::Div, 7.0, 2.0, 3.5)]
    fn test_apply_numeric(#[case] op: Operator, #[case] a: f64, #[case] b: f64, #[case] expected: f64) {
        assert_eq!(op.apply_numeric(a, b), Some(expected));
    }

    #[test]
    fn test_division_by_zero_is_ieee() {
        assert_eq!(Operator::Div.apply_numeric(1.0, 0.0), Some(f64::INFINITY));
        assert!(Operator::Mod.apply_numeric(1.0, 0.0).is_some_and(f64::is_nan));
    }

    #[test]
    fn test_non_arithmetic_has_no_numeric_form() {
        assert_eq!(Operator::Index.apply_numeric(1.0, 2.0), None);
    }
}
