pub mod commitment;
pub mod locks;
#[cfg(test)]
pub mod memory;
pub mod models;
pub mod repository;

pub use commitment::{CommitmentLedger, Credit};
pub use locks::{AccountGuard, AccountLocks};
pub use repository::{AccountStore, LedgerRepository};
