//! Table schema and tuple builders for heap/WAL/recovery tests.

use catalog::{Column, TableSchema};
use types::{SqlType, Value};

pub fn int_tuple(values: &[i64]) -> Vec<Value> {
    values.iter().map(|&v| Value::Int(v)).collect()
}

pub fn text_tuple(values: &[&str]) -> Vec<Value> {
    values.iter().map(|&v| Value::Text(v.to_string())).collect()
}

pub fn bool_tuple(values: &[bool]) -> Vec<Value> {
    values.iter().map(|&v| Value::Bool(v)).collect()
}

pub fn null_tuple(count: usize) -> Vec<Value> {
    vec![Value::Null; count]
}

/// Common table schemas for testing.
pub mod schemas {
    use super::*;

    /// `(id: Int, name: Text, age: Int)`.
    pub fn users_schema() -> TableSchema {
        TableSchema::try_new(vec![
            Column::new("id", SqlType::Int),
            Column::new("name", SqlType::Text),
            Column::new("age", SqlType::Int),
        ])
        .expect("valid schema")
    }

    /// `(id: Int, name: Text, price: Int)`.
    pub fn products_schema() -> TableSchema {
        TableSchema::try_new(vec![
            Column::new("id", SqlType::Int),
            Column::new("name", SqlType::Text),
            Column::new("price", SqlType::Int),
        ])
        .expect("valid schema")
    }

    /// `(id: Int, user_id: Int, product_id: Int, quantity: Int)`.
    pub fn orders_schema() -> TableSchema {
        TableSchema::try_new(vec![
            Column::new("id", SqlType::Int),
            Column::new("user_id", SqlType::Int),
            Column::new("product_id", SqlType::Int),
            Column::new("quantity", SqlType::Int),
        ])
        .expect("valid schema")
    }
}

/// Sample tuple sets matching the schemas above.
pub mod data {
    use super::*;

    pub fn sample_users() -> Vec<Vec<Value>> {
        vec![
            vec![Value::Int(1), Value::Text("Alice".into()), Value::Int(30)],
            vec![Value::Int(2), Value::Text("Bob".into()), Value::Int(25)],
            vec![Value::Int(3), Value::Text("Charlie".into()), Value::Int(35)],
        ]
    }

    pub fn sample_products() -> Vec<Vec<Value>> {
        vec![
            vec![Value::Int(1), Value::Text("Laptop".into()), Value::Int(1000)],
            vec![Value::Int(2), Value::Text("Mouse".into()), Value::Int(25)],
            vec![Value::Int(3), Value::Text("Keyboard".into()), Value::Int(75)],
        ]
    }

    pub fn sample_orders() -> Vec<Vec<Value>> {
        vec![
            int_tuple(&[1, 1, 1, 1]),
            int_tuple(&[2, 1, 2, 2]),
            int_tuple(&[3, 2, 3, 1]),
        ]
    }
}
