//! Clearance storage abstractions.
//!
//! This crate defines the storage contract for the clearance engine:
//! - stage records per department, keyed by group or student
//! - group and student read models
//! - directory data (profiles, groups, course results)
//! - the append-only ledger
//! - atomic multi-record commits through [`UnitOfWork`]
//!
//! Every write goes through [`UnitOfWorkStore::commit`] except course
//! results, which are plain upserts.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod traits;
mod unit_of_work;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryClearanceStore;
pub use traits::{
    AggregateStore, ClearanceStorage, DirectoryStore, LedgerStore, StageStore, UnitOfWorkStore,
};
pub use unit_of_work::{CommitReceipt, UnitOfWork};
