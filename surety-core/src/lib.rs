//! Shared foundation for the Flight Surety workspace.
//!
//! Every component crate builds on the types defined here:
//!
//! - [`Address`], [`Amount`], [`FlightKey`], [`FlightStatus`]: the vocabulary
//!   of the marketplace
//! - [`CallContext`]: explicit caller identity and attached value
//! - [`SuretyError`]: the error kinds reported synchronously to callers
//! - [`EventBus`]: decoupled publication of [`SuretyEvent`]s to subscribers
//! - [`SuretyConfig`]: policy constants, loadable from YAML

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::{
    AdmissionPolicy, EscrowConfig, GeneralConfig, MembershipConfig, OracleConfig, Rounding,
    SuretyConfig,
};
pub use error::{Result, SuretyError};
pub use events::{EventBus, EventRecord, SuretyEvent};
pub use types::*;
