//! `proptest` strategies for values and tuples, for property tests over
//! encode/decode round trips and heap operations.

use catalog::TableSchema;
use proptest::prelude::*;
use types::{SqlType, Value};

/// Any value, of any type including `Null`.
pub fn arb_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::Int),
        "[a-zA-Z0-9 ]{0,32}".prop_map(Value::Text),
        any::<bool>().prop_map(Value::Bool),
        Just(Value::Null),
    ]
}

/// A value matching a specific column type — never `Null`, since a
/// not-null column fixture shouldn't generate one.
pub fn arb_value_of(ty: SqlType) -> BoxedStrategy<Value> {
    match ty {
        SqlType::Int => any::<i64>().prop_map(Value::Int).boxed(),
        SqlType::Text => "[a-zA-Z0-9 ]{0,32}".prop_map(Value::Text).boxed(),
        SqlType::Bool => any::<bool>().prop_map(Value::Bool).boxed(),
    }
}

/// A tuple matching `schema`'s column types in order.
pub fn arb_tuple(schema: &TableSchema) -> BoxedStrategy<Vec<Value>> {
    let column_types: Vec<SqlType> = schema.columns.iter().map(|c| c.ty.clone()).collect();
    column_types.into_iter().fold(
        Just(Vec::new()).boxed() as BoxedStrategy<Vec<Value>>,
        |acc, ty| {
            acc.prop_flat_map(move |built| {
                arb_value_of(ty.clone()).prop_map(move |v| {
                    let mut built = built.clone();
                    built.push(v);
                    built
                })
            })
            .boxed()
        },
    )
}
