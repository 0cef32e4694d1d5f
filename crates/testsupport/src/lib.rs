//! Fixtures and assertions for exercising the storage and recovery core.
//!
//! Scoped to what this workspace is: a heap file format, a buffer manager,
//! a write-ahead log, and a transaction manager — there is no query engine
//! here, so there is no SQL-script runner or executor-result assertions to
//! provide, unlike a full database's test-support crate. What's here is a
//! disposable on-disk environment ([`context::TestContext`]), table/tuple
//! builders, and assertions shaped around pages, tuples, and recovery
//! outcomes.

pub mod assertions;
pub mod context;
pub mod fixtures;
pub mod proptest_generators;

pub mod prelude {
    pub use crate::assertions::*;
    pub use crate::context::TestContext;
    pub use crate::fixtures::*;
}
