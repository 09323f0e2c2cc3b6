//! Error kinds reported to callers.

use crate::types::Amount;

/// Error types for Flight Surety operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SuretyError {
    /// Mutations are switched off by the owner
    #[error("Contract is not operational")]
    NotOperational,

    /// Caller lacks the required role, funding or index assignment
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unknown airline, flight, oracle or request
    #[error("Not found: {0}")]
    NotFound(String),

    /// Entity already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Airline or oracle already registered
    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    /// Flight status was already finalized
    #[error("Already finalized: {0}")]
    AlreadyFinalized(String),

    /// Coverage can no longer be bought on a finalized flight
    #[error("Flight already finalized: {0}")]
    FlightAlreadyFinalized(String),

    /// Funding below the participation minimum
    #[error("Insufficient funds: required {required}, provided {provided}")]
    InsufficientFunds { required: Amount, provided: Amount },

    /// Oracle stake below the registration minimum
    #[error("Insufficient stake: required {required}, provided {provided}")]
    InsufficientStake { required: Amount, provided: Amount },

    /// Premium outside (0, max]
    #[error("Invalid premium {provided}: must be in (0, {max}]")]
    InvalidPremium { max: Amount, provided: Amount },

    /// Status code that is unknown or not a valid verdict
    #[error("Invalid status code: {0}")]
    InvalidStatus(u8),

    /// Payout transfer could not complete
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, SuretyError>;
