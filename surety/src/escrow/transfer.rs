//! Outbound payout transfers.
//!
//! The ledger never moves funds itself; it hands withdrawals to a
//! [`PayoutTransfer`] and compensates when the transfer fails.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use surety_core::{Address, Amount};

/// Error types for payout transfers.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Recipient refused the transfer
    #[error("Transfer rejected: {0}")]
    Rejected(String),

    /// Transfer rail unreachable
    #[error("Transfer rail unavailable: {0}")]
    Unavailable(String),
}

/// Moves withdrawn funds out of escrow.
#[async_trait]
pub trait PayoutTransfer: Send + Sync {
    /// Transfer `amount` to `recipient`.
    async fn transfer(&self, recipient: &Address, amount: Amount) -> Result<(), TransferError>;
}

/// In-process transfer rail that records what it paid out.
///
/// Can be switched to fail, for exercising the compensation path.
pub struct InMemoryTransfer {
    paid: RwLock<HashMap<Address, Amount>>,
    failing: AtomicBool,
}

impl InMemoryTransfer {
    /// Create a working rail.
    pub fn new() -> Self {
        Self {
            paid: RwLock::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// Make subsequent transfers fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total transferred to `recipient`.
    pub async fn paid_to(&self, recipient: &Address) -> Amount {
        self.paid.read().await.get(recipient).copied().unwrap_or(0)
    }

    /// Total transferred to everyone.
    pub async fn total_paid(&self) -> Amount {
        self.paid.read().await.values().sum()
    }
}

impl Default for InMemoryTransfer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PayoutTransfer for InMemoryTransfer {
    async fn transfer(&self, recipient: &Address, amount: Amount) -> Result<(), TransferError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransferError::Unavailable("rail offline".to_string()));
        }
        let mut paid = self.paid.write().await;
        *paid.entry(recipient.clone()).or_insert(0) += amount;
        Ok(())
    }
}
