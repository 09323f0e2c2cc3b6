//! Flight Surety - flight delay insurance core.
//!
//! Airlines join through a membership registry, register flights, and
//! passengers buy coverage on them. Independent oracles report each flight's
//! status; once a quorum agrees, the verdict is applied exactly once and
//! late-airline verdicts credit passengers, who withdraw through a
//! [`PayoutTransfer`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        FlightSurety                          │
//! │                                                              │
//! │  ┌────────────┐  ┌───────────┐  ┌────────────┐  ┌─────────┐  │
//! │  │ Membership │─►│ Directory │─►│ Aggregator │─►│ Escrow  │  │
//! │  └────────────┘  └───────────┘  └────────────┘  └─────────┘  │
//! │                                                     │        │
//! │                        EventBus ◄───────────────────┘        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod call;
pub mod escrow;
pub mod service;

pub use call::{Call, Outcome};
pub use escrow::{EscrowLedger, InMemoryTransfer, PayoutTransfer, Policy, TransferError};
pub use service::{FlightSurety, FlightSuretyBuilder};

// Re-export the component crates
pub use surety_core::{
    ether, Address, Amount, CallContext, EventBus, EventRecord, FlightKey, FlightStatus, Result,
    SuretyConfig, SuretyError, SuretyEvent,
};
pub use surety_oracle::{RequestState, StatusRequest, SubmissionOutcome};
pub use surety_registry::{Admission, Flight};
