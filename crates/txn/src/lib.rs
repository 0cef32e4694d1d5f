//! Transaction manager and ARIES-style recovery.
//!
//! Built on `wal`'s pattern of a `Mutex`-guarded state struct behind `&self`
//! methods, and on `buffer::Pinned`'s pattern of wrapping one
//! `storage::PagePinner` inside another to add behavior at the pin/unpin
//! seam without `storage` or `buffer` knowing this crate exists.
//!
//! [`TransactionHandle`] is explicit, caller-held transaction context in
//! place of thread-local or global transaction state: every
//! [`TransactionManager`] method that needs one takes it as an argument.

pub mod manager;
pub mod state_file;

pub use manager::{
    LoggingPinner, RecoveryInfo, TransactionHandle, TransactionManager, WalForcingHook,
};
pub use state_file::{TxnStateContents, TxnStateFile};
