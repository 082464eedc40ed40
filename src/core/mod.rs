//! Core types shared across the codebase: the managed unit and process-wide
//! runtime state.

mod state;
mod unit;

pub use state::{setup_shutdown_handler, shutdown_flag};
pub use unit::{ManagedUnit, SyncResult};

#[cfg(test)]
pub(crate) use unit::test_unit;
