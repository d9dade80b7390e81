//! Service layer
//!
//! Services contain the business logic of the monitor: the verification
//! coordinator, the operation guard it applies to user triggers, and the
//! local history of past results.
//!
//! External collaborators (HTTP API, general refresh, key-value store) are
//! injected as traits to enable testing with scripted fakes.

pub mod coordinator;
pub mod guard;
pub mod history;

pub use coordinator::{CoordinatorSettings, RefreshReport, TriggerOutcome, VerificationCoordinator};
pub use guard::{Admission, OperationKind, OperationLock, OperationPermit};
pub use history::{
    FileStore, HistoryEntry, HistoryError, InMemoryStore, KeyValueStore, VerificationHistory,
};
