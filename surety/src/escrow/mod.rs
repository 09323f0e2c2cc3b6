//! Escrow - passenger policies, payout credit and withdrawals.

mod ledger;
mod transfer;

pub use ledger::{EscrowLedger, Policy, Settlement, Solvency};
pub use transfer::{InMemoryTransfer, PayoutTransfer, TransferError};
