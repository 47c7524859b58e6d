pub mod chain;
pub mod confirm;
pub mod executor;
pub mod funder;
pub mod gas;
pub mod scroll;
pub mod units;

pub use chain::{ChainClient, ContractAddresses};
pub use confirm::ConfirmationPolicy;
pub use executor::{DepositReceipt, TransactionExecutor};
pub use funder::WalletFunder;
pub use scroll::ScrollClient;
