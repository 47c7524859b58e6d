pub mod keys;
pub mod service;

pub use service::{AccountService, SignupOutcome, Withdrawal, YieldPreview};
