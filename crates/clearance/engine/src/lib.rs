//! Graduation clearance workflow engine
//!
//! The engine advances thesis groups and their students through five
//! ordered department approvals. It validates each decision against the
//! stage state machine, propagates it to every affected read model in one
//! atomic commit, gates the Examination hand-off on eligibility, and
//! announces committed transitions to an event sink.
//!
//! # Architecture
//!
//! [`ClearanceService`] composes specialized components:
//!
//! - [`PropagationEngine`]: plans the fan-out of a decision as one unit of work
//! - [`EligibilityEvaluator`]: the phase-one and graduation-fee gates
//! - [`FinanceLedger`](clearance_ledger::FinanceLedger): charges, payments, balances
//! - [`EventSink`]: best-effort announcement of committed transitions
//!
//! # Example
//!
//! ```rust
//! use clearance_engine::{ClearanceService, EngineConfig};
//! use clearance_types::*;
//!
//! # tokio_test_block(async {
//! let service = ClearanceService::in_memory(EngineConfig::default()).unwrap();
//! service
//!     .register_student(StudentProfile::new(StudentId::new("s1"), "Ana", 4, 4))
//!     .await
//!     .unwrap();
//! service
//!     .register_group(Group::new(GroupId::new("g1"), "Thesis A").with_member(StudentId::new("s1")))
//!     .await
//!     .unwrap();
//!
//! let actor = ActorId::new("faculty-1");
//! let faculty = service
//!     .start_clearance(Subject::Group(GroupId::new("g1")), Department::Faculty, &actor)
//!     .await
//!     .unwrap();
//! assert!(faculty.is_pending());
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

#![deny(unsafe_code)]

pub mod config;
pub mod eligibility;
pub mod propagation;
pub mod service;
pub mod sink;

pub use config::{EngineConfig, FeeConfig, PropagationConfig};
pub use eligibility::{EligibilityEvaluator, EligibilityReport};
pub use propagation::{PropagationContext, PropagationEngine, PropagationPlan};
pub use service::{ClearanceService, SYSTEM_ACTOR};
pub use sink::{BroadcastSink, EventSink, NoopSink, RecordingSink, SinkError};

pub use clearance_ledger::{EntryRequest, LedgerStatement};
