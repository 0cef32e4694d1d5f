//! Assertions shaped around pages, tuples, and recovery outcomes rather
//! than query results — there is no executor in this workspace to assert
//! rows against.

use common::{DbResult, Lsn};
use pretty_assertions::assert_eq;
use types::Value;

/// Assert that `result` is an `Err` whose message contains `needle`.
pub fn assert_error_contains<T: std::fmt::Debug>(result: DbResult<T>, needle: &str) {
    match result {
        Ok(value) => panic!("expected an error containing {needle:?}, got Ok({value:?})"),
        Err(err) => {
            let message = err.to_string();
            assert!(
                message.contains(needle),
                "error {message:?} does not contain {needle:?}"
            );
        }
    }
}

/// Assert two tuples are equal value-for-value, with a readable diff on
/// mismatch.
pub fn assert_tuple_eq(actual: &[Value], expected: &[Value]) {
    assert_eq!(actual, expected);
}

/// Assert a full table scan (in page order) matches `expected` exactly.
pub fn assert_tuples_eq(actual: &[Vec<Value>], expected: &[Vec<Value>]) {
    assert_eq!(actual, expected);
}

/// Assert recovery left nothing more to redo or undo: `firstLsn` caught up
/// to `nextLsn`.
pub fn assert_recovered_clean(first_lsn: Lsn, next_lsn: Lsn) {
    assert_eq!(
        first_lsn, next_lsn,
        "firstLsn should converge to nextLsn once recovery finishes"
    );
}
