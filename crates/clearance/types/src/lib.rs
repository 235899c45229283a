//! Graduation clearance domain types
//!
//! A student graduates only after five departments approve them, in a
//! fixed order. This crate holds the shapes every other clearance crate
//! works with.
//!
//! # Key Concepts
//!
//! - **Department**: one clearance gate. Faculty, Library and Lab decide
//!   for a whole group; Finance and Examination decide per student.
//! - **StageRecord**: one department's decision for one group or student,
//!   with its checklist and an append-only history of transitions.
//! - **Checklist**: a tagged variant, one struct per department.
//! - **GroupAggregate** / **StudentClearanceAggregate**: read models that
//!   mirror stage decisions per group and per student.
//! - **LedgerEntry**: an append-only charge or payment, in minor units.
//! - **ClearanceEvent**: announced after every committed transition.
//!
//! # Transition Rules
//!
//! 1. `Pending → Approved`, `Pending → Rejected`, `Rejected → Pending`.
//! 2. Approved is terminal.
//! 3. Every transition appends exactly one history entry.

#![deny(unsafe_code)]

mod aggregate;
mod checklist;
mod department;
mod directory;
mod errors;
mod event;
mod ids;
mod ledger;
mod stage;

pub use aggregate::*;
pub use checklist::*;
pub use department::*;
pub use directory::*;
pub use errors::*;
pub use event::*;
pub use ids::*;
pub use ledger::*;
pub use stage::*;
