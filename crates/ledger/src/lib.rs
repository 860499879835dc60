//! Execution session ledger.
//!
//! Every fan-out run gets a named [`Session`]; each per-target outcome is
//! appended as a [`LogRow`] carrying the session's id, so a run's rows can be
//! read back exactly.

mod error;
mod store;
mod types;

pub use error::{LedgerError, Result};
pub use store::Ledger;
pub use types::{session_name, LogRow, Session, SessionMode, SESSION_TIME_FORMAT};
